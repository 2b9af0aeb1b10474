//! Normalization of raw entities before equality comparison.
//!
//! Instances disagree on audit stamps, auto-incremented ids, presentation
//! metadata and linkage arrays even when the configuration is the same.
//! [`IGNORED_FIELDS`] lists those keys per kind; they are removed at every
//! depth from a cloned value.

use crate::types::Kind;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// A key stripped by [`normalize`] for the listed kinds.
#[derive(Debug, Clone, Copy)]
pub struct IgnoreRule {
    pub field: &'static str,
    pub kinds: &'static [Kind],
}

const ALL: &[Kind] = &[Kind::Collection, Kind::Flow, Kind::Role, Kind::Policy];
const COLLECTION: &[Kind] = &[Kind::Collection];
const FLOW: &[Kind] = &[Kind::Flow];
const ROLE_AND_POLICY: &[Kind] = &[Kind::Role, Kind::Policy];
const ROLE: &[Kind] = &[Kind::Role];
const POLICY: &[Kind] = &[Kind::Policy];

const fn rule(field: &'static str, kinds: &'static [Kind]) -> IgnoreRule {
    IgnoreRule { field, kinds }
}

/// Keys that never count as drift.
pub const IGNORED_FIELDS: &[IgnoreRule] = &[
    // Audit
    rule("date_created", ALL),
    rule("date_updated", ALL),
    rule("timestamp", ALL),
    rule("user_created", ALL),
    rule("user_updated", ALL),
    // Auto-generated ids (field ids, permission ids)
    rule("id", ALL),
    // Collection and field presentation
    rule("group", COLLECTION),
    rule("width", COLLECTION),
    rule("sort", COLLECTION),
    rule("translations", COLLECTION),
    rule("conditions", COLLECTION),
    rule("required", COLLECTION),
    rule("readonly", COLLECTION),
    rule("hidden", COLLECTION),
    rule("display", COLLECTION),
    rule("display_options", COLLECTION),
    rule("validation", COLLECTION),
    rule("validation_message", COLLECTION),
    // Column attributes
    rule("foreign_key_schema", COLLECTION),
    rule("foreign_key_table", COLLECTION),
    rule("foreign_key_column", COLLECTION),
    rule("default_value", COLLECTION),
    rule("max_length", COLLECTION),
    rule("is_nullable", COLLECTION),
    rule("is_unique", COLLECTION),
    rule("is_primary_key", COLLECTION),
    rule("has_auto_increment", COLLECTION),
    rule("numeric_precision", COLLECTION),
    rule("numeric_scale", COLLECTION),
    rule("comment", COLLECTION),
    // Compared by field name instead
    rule("schema", COLLECTION),
    rule("fields", COLLECTION),
    // Operation graph is replaced wholesale on apply
    rule("operation", FLOW),
    rule("operations", FLOW),
    // Linkage arrays
    rule("users", ROLE_AND_POLICY),
    rule("policies", ROLE),
    rule("children", ROLE),
    rule("roles", POLICY),
    rule("permissions", POLICY),
];

/// Whether `field` is ignored for `kind`.
pub fn is_ignored(field: &str, kind: Kind) -> bool {
    IGNORED_FIELDS
        .iter()
        .any(|r| r.field == field && r.kinds.contains(&kind))
}

/// Return a copy of `entity` with every ignored key removed at every depth.
pub fn normalize(entity: &Value, kind: Kind) -> Value {
    match entity {
        Value::Object(map) => {
            let cleaned: Map<String, Value> = map
                .iter()
                .filter(|(key, _)| !is_ignored(key, kind))
                .map(|(key, value)| (key.clone(), normalize(value, kind)))
                .collect();
            Value::Object(cleaned)
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| normalize(v, kind)).collect()),
        other => other.clone(),
    }
}

/// Sorted field names of a raw collection entity carrying a `fields` array.
pub fn field_names(collection: &Value) -> Vec<String> {
    let mut names: Vec<String> = collection
        .get("fields")
        .and_then(Value::as_array)
        .map(|fields| {
            fields
                .iter()
                .filter_map(|f| f.get("field").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

/// Kind-aware equality used by the remote comparison.
///
/// Collections are equal when they carry the same set of field names; field
/// types, meta and schema are not compared. Other kinds are equal when their
/// normalized values are.
pub fn equivalent(local: &Value, remote: &Value, kind: Kind) -> bool {
    match kind {
        Kind::Collection => field_names(local) == field_names(remote),
        _ => normalize(local, kind) == normalize(remote, kind),
    }
}

/// Human-readable reasons two entities are not [`equivalent`].
pub fn describe_differences(local: &Value, remote: &Value, kind: Kind) -> Vec<String> {
    if kind == Kind::Collection {
        let local_names: BTreeSet<String> = field_names(local).into_iter().collect();
        let remote_names: BTreeSet<String> = field_names(remote).into_iter().collect();
        let mut diff = Vec::new();
        let only_local: Vec<&str> = local_names.difference(&remote_names).map(String::as_str).collect();
        let only_remote: Vec<&str> = remote_names.difference(&local_names).map(String::as_str).collect();
        if !only_local.is_empty() {
            diff.push(format!("Only local field(s): {}", only_local.join(", ")));
        }
        if !only_remote.is_empty() {
            diff.push(format!("Only remote field(s): {}", only_remote.join(", ")));
        }
        return diff;
    }

    let local = normalize(local, kind);
    let remote = normalize(remote, kind);
    let empty = Map::new();
    let local_map = local.as_object().unwrap_or(&empty);
    let remote_map = remote.as_object().unwrap_or(&empty);
    let keys: BTreeSet<&String> = local_map.keys().chain(remote_map.keys()).collect();
    keys.into_iter()
        .filter(|key| local_map.get(*key) != remote_map.get(*key))
        .map(|key| format!("\"{key}\" differs"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_removes_audit_fields_at_depth() {
        let raw = json!({
            "id": "f1",
            "name": "Notify",
            "date_created": "2024-01-01",
            "options": {"nested": {"user_updated": "u1", "keep": 1}},
            "list": [{"timestamp": 3, "value": "x"}]
        });
        let out = normalize(&raw, Kind::Flow);
        assert_eq!(
            out,
            json!({"name": "Notify", "options": {"nested": {"keep": 1}}, "list": [{"value": "x"}]})
        );
    }

    #[test]
    fn test_normalize_does_not_mutate_input() {
        let raw = json!({"id": "r1", "users": ["u1"], "name": "Editor"});
        let before = raw.clone();
        let _ = normalize(&raw, Kind::Role);
        assert_eq!(raw, before);
    }

    #[test]
    fn test_rules_are_kind_aware() {
        assert!(is_ignored("hidden", Kind::Collection));
        assert!(!is_ignored("hidden", Kind::Flow));
        assert!(is_ignored("permissions", Kind::Policy));
        assert!(!is_ignored("permissions", Kind::Role));
        assert!(is_ignored("date_updated", Kind::Role));
    }

    #[test]
    fn test_collections_compare_by_field_names() {
        let local = json!({
            "collection": "articles",
            "fields": [{"field": "title", "type": "string"}, {"field": "id", "type": "integer"}]
        });
        let remote = json!({
            "collection": "articles",
            "meta": {"icon": "article"},
            "fields": [{"field": "id", "type": "uuid"}, {"field": "title", "type": "text"}]
        });
        assert!(equivalent(&local, &remote, Kind::Collection));

        let extra = json!({"collection": "articles", "fields": [{"field": "id"}]});
        assert!(!equivalent(&local, &extra, Kind::Collection));
        assert_eq!(
            describe_differences(&local, &extra, Kind::Collection),
            vec!["Only local field(s): title"]
        );
    }

    #[test]
    fn test_roles_ignore_linkage() {
        let local = json!({"id": "r1", "name": "Editor", "users": ["a"], "policies": ["x"]});
        let remote = json!({"id": "r1", "name": "Editor", "users": [], "children": ["r2"]});
        assert!(equivalent(&local, &remote, Kind::Role));
    }

    #[test]
    fn test_describe_differences_names_keys() {
        let local = json!({"id": "p1", "name": "Editors", "admin_access": false, "permissions": [1]});
        let remote = json!({"id": "p1", "name": "Writers", "admin_access": true, "permissions": [9]});
        assert!(!equivalent(&local, &remote, Kind::Policy));
        assert_eq!(
            describe_differences(&local, &remote, Kind::Policy),
            vec!["\"admin_access\" differs", "\"name\" differs"]
        );
    }
}
