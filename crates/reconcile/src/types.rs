//! Core types: resource kinds, selections, manifest items and the manifest.
//!
//! Item structs keep the instance's wire names (`position_x`, `ip_access`,
//! ...) so a manifest is the same JSON the store speaks. `meta`, `schema`
//! and `options` are store-defined extension points and stay opaque
//! [`serde_json::Value`]s.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Current manifest format version.
pub const MANIFEST_VERSION: &str = "1.0.0";

/// Collections whose name starts with this prefix belong to the instance itself.
pub const SYSTEM_COLLECTION_PREFIX: &str = "directus_";

// =============================================================================
// Kinds and selection
// =============================================================================

/// One of the four resource categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Collection,
    Flow,
    Role,
    Policy,
}

impl Kind {
    /// Order in which kinds are applied. Roles precede policies.
    pub const APPLY_ORDER: [Self; 4] = [Self::Collection, Self::Role, Self::Policy, Self::Flow];

    /// Order in which categories are presented.
    pub const TREE_ORDER: [Self; 4] = [Self::Collection, Self::Flow, Self::Role, Self::Policy];

    /// Selection id prefix (`collection`, `flow`, `role`, `policy`).
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Collection => "collection",
            Self::Flow => "flow",
            Self::Role => "role",
            Self::Policy => "policy",
        }
    }

    /// Parse a selection id prefix.
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "collection" => Some(Self::Collection),
            "flow" => Some(Self::Flow),
            "role" => Some(Self::Role),
            "policy" => Some(Self::Policy),
            _ => None,
        }
    }

    /// Id of the tree category holding this kind.
    pub fn category_id(&self) -> &'static str {
        match self {
            Self::Collection => "data-model",
            Self::Flow => "flows",
            Self::Role => "roles",
            Self::Policy => "policies",
        }
    }

    /// Display name of the tree category holding this kind.
    pub fn category_name(&self) -> &'static str {
        match self {
            Self::Collection => "Data Model",
            Self::Flow => "Flows",
            Self::Role => "User Roles",
            Self::Policy => "Access Policies",
        }
    }

    /// Name of the identity attribute on raw entities.
    pub fn identity_key(&self) -> &'static str {
        match self {
            Self::Collection => "collection",
            Self::Flow | Self::Role | Self::Policy => "id",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// A kind-prefixed item id such as `collection:articles`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SelectionId {
    pub kind: Kind,
    pub identity: String,
}

impl SelectionId {
    pub fn new(kind: Kind, identity: impl Into<String>) -> Self {
        Self {
            kind,
            identity: identity.into(),
        }
    }
}

impl FromStr for SelectionId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (prefix, identity) = s
            .split_once(':')
            .ok_or_else(|| Error::InvalidRequest(format!("'{s}' is not a <kind>:<id> selection")))?;
        let kind = Kind::from_prefix(prefix)
            .ok_or_else(|| Error::InvalidRequest(format!("unknown kind '{prefix}' in '{s}'")))?;
        if identity.is_empty() {
            return Err(Error::InvalidRequest(format!("'{s}' has an empty identity")));
        }
        Ok(Self::new(kind, identity))
    }
}

impl Serialize for SelectionId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl fmt::Display for SelectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.prefix(), self.identity)
    }
}

/// The set of items a compare/apply/push/pull call acts on.
///
/// Unprefixed or unrecognized ids are dropped; duplicates keep their first
/// position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    ids: Vec<SelectionId>,
}

impl Selection {
    /// Build a selection from raw id strings.
    pub fn parse<I, S>(raw: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for item in raw {
            match item.as_ref().parse::<SelectionId>() {
                Ok(id) => {
                    if seen.insert(id.clone()) {
                        ids.push(id);
                    }
                }
                Err(e) => log::debug!("Ignoring selection id: {e}"),
            }
        }
        Self { ids }
    }

    /// Identities of one kind, in selection order.
    pub fn of_kind(&self, kind: Kind) -> Vec<&str> {
        self.ids
            .iter()
            .filter(|id| id.kind == kind)
            .map(|id| id.identity.as_str())
            .collect()
    }

    pub fn contains(&self, kind: Kind, identity: &str) -> bool {
        self.ids
            .iter()
            .any(|id| id.kind == kind && id.identity == identity)
    }

    pub fn ids(&self) -> &[SelectionId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl FromIterator<SelectionId> for Selection {
    fn from_iter<T: IntoIterator<Item = SelectionId>>(iter: T) -> Self {
        let mut seen = HashSet::new();
        let ids = iter
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .collect();
        Self { ids }
    }
}

// =============================================================================
// Manifest items
// =============================================================================

/// A field of a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldItem {
    pub field: String,
    #[serde(rename = "type", default)]
    pub field_type: Option<String>,
    #[serde(default)]
    pub meta: Value,
    #[serde(default)]
    pub schema: Value,
}

impl FieldItem {
    /// Full field payload as the store expects it.
    pub fn payload(&self) -> Value {
        serde_json::json!({
            "field": self.field,
            "type": self.field_type,
            "meta": self.meta,
            "schema": self.schema,
        })
    }
}

/// A data-model collection with its fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionItem {
    pub collection: String,
    #[serde(default)]
    pub meta: Value,
    #[serde(default)]
    pub schema: Value,
    #[serde(default)]
    pub fields: Vec<FieldItem>,
}

impl CollectionItem {
    /// Build from a raw collection entity and its raw fields.
    pub fn from_entity(mut raw: Value, fields: Vec<Value>) -> Result<Self> {
        if let Some(map) = raw.as_object_mut() {
            map.remove("fields");
        }
        let mut item: Self = serde_json::from_value(raw)?;
        item.fields = fields
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<_, _>>()?;
        Ok(item)
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.field.as_str()).collect()
    }
}

/// An operation inside a flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationItem {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub key: String,
    #[serde(rename = "type")]
    pub operation_type: String,
    #[serde(default)]
    pub position_x: i64,
    #[serde(default)]
    pub position_y: i64,
    #[serde(default)]
    pub options: Value,
    #[serde(default)]
    pub resolve: Option<String>,
    #[serde(default)]
    pub reject: Option<String>,
}

impl OperationItem {
    /// Creation payload without `resolve`/`reject`.
    pub fn unlinked_payload(&self, flow_id: &str) -> Value {
        serde_json::json!({
            "id": self.id,
            "flow": flow_id,
            "name": self.name,
            "key": self.key,
            "type": self.operation_type,
            "position_x": self.position_x,
            "position_y": self.position_y,
            "options": self.options,
        })
    }

    /// Outgoing transitions as `(via, target)` pairs.
    pub fn transitions(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [("resolve", self.resolve.as_deref()), ("reject", self.reject.as_deref())]
            .into_iter()
            .filter_map(|(via, target)| target.map(|t| (via, t)))
    }
}

/// An automation flow with its operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowItem {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub trigger: Option<String>,
    #[serde(default)]
    pub accountability: Option<String>,
    #[serde(default)]
    pub options: Value,
    #[serde(default)]
    pub operations: Vec<OperationItem>,
}

impl FlowItem {
    /// Build from a raw flow entity and its raw operations.
    ///
    /// Raw flows list their operations as ids; those are replaced by the
    /// full operation records.
    pub fn from_entity(mut raw: Value, operations: Vec<Value>) -> Result<Self> {
        if let Some(map) = raw.as_object_mut() {
            map.remove("operations");
        }
        let mut item: Self = serde_json::from_value(raw)?;
        item.operations = operations
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<_, _>>()?;
        Ok(item)
    }

    /// Mutable flow attributes (everything but id, operations and entry).
    pub fn attributes(&self) -> Value {
        serde_json::json!({
            "name": self.name,
            "icon": self.icon,
            "color": self.color,
            "description": self.description,
            "status": self.status,
            "trigger": self.trigger,
            "accountability": self.accountability,
            "options": self.options,
        })
    }
}

/// An access role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleItem {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parent: Option<String>,
}

impl RoleItem {
    pub fn attributes(&self) -> Value {
        serde_json::json!({
            "name": self.name,
            "icon": self.icon,
            "description": self.description,
            "parent": self.parent,
        })
    }
}

/// A permission row owned by a policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionItem {
    pub collection: String,
    pub action: String,
    #[serde(default)]
    pub permissions: Value,
    #[serde(default)]
    pub validation: Value,
    #[serde(default)]
    pub presets: Value,
    #[serde(default)]
    pub fields: Option<Vec<String>>,
}

impl PermissionItem {
    pub fn payload(&self, policy_id: &str) -> Value {
        serde_json::json!({
            "policy": policy_id,
            "collection": self.collection,
            "action": self.action,
            "permissions": self.permissions,
            "validation": self.validation,
            "presets": self.presets,
            "fields": self.fields,
        })
    }
}

/// An access policy with its permissions and attached roles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyItem {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub ip_access: Value,
    #[serde(default)]
    pub enforce_tfa: bool,
    #[serde(default)]
    pub admin_access: bool,
    #[serde(default)]
    pub app_access: bool,
    #[serde(default)]
    pub permissions: Vec<PermissionItem>,
    /// Roles this policy is attached to. Exported, never written back.
    #[serde(default)]
    pub roles: Vec<String>,
}

impl PolicyItem {
    /// Build from a raw policy entity, its raw permissions and attached role ids.
    pub fn from_entity(mut raw: Value, permissions: Vec<Value>, roles: Vec<String>) -> Result<Self> {
        if let Some(map) = raw.as_object_mut() {
            for key in ["permissions", "roles", "users"] {
                map.remove(key);
            }
        }
        let mut item: Self = serde_json::from_value(raw)?;
        item.permissions = permissions
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<_, _>>()?;
        item.roles = roles;
        Ok(item)
    }

    pub fn attributes(&self) -> Value {
        serde_json::json!({
            "name": self.name,
            "icon": self.icon,
            "description": self.description,
            "ip_access": self.ip_access,
            "enforce_tfa": self.enforce_tfa,
            "admin_access": self.admin_access,
            "app_access": self.app_access,
        })
    }
}

/// Any manifest item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ManifestItem {
    Collection(CollectionItem),
    Flow(FlowItem),
    Role(RoleItem),
    Policy(PolicyItem),
}

impl ManifestItem {
    pub fn kind(&self) -> Kind {
        match self {
            Self::Collection(_) => Kind::Collection,
            Self::Flow(_) => Kind::Flow,
            Self::Role(_) => Kind::Role,
            Self::Policy(_) => Kind::Policy,
        }
    }

    /// Natural key within the kind.
    pub fn identity(&self) -> &str {
        match self {
            Self::Collection(c) => &c.collection,
            Self::Flow(f) => &f.id,
            Self::Role(r) => &r.id,
            Self::Policy(p) => &p.id,
        }
    }

    /// Human-readable label: the name, falling back to the identity.
    pub fn label(&self) -> &str {
        let name = match self {
            Self::Collection(c) => &c.collection,
            Self::Flow(f) => &f.name,
            Self::Role(r) => &r.name,
            Self::Policy(p) => &p.name,
        };
        if name.is_empty() { self.identity() } else { name }
    }

    pub fn selection_id(&self) -> SelectionId {
        SelectionId::new(self.kind(), self.identity())
    }
}

// =============================================================================
// Manifest
// =============================================================================

/// The four ordered item lists of a manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestContents {
    #[serde(default)]
    pub collections: Vec<CollectionItem>,
    #[serde(default)]
    pub flows: Vec<FlowItem>,
    #[serde(default)]
    pub roles: Vec<RoleItem>,
    #[serde(default)]
    pub policies: Vec<PolicyItem>,
}

/// Portable, versioned snapshot of selected configuration items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(rename = "version", alias = "formatVersion")]
    pub format_version: String,
    pub exported_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directus_version: Option<String>,
    pub contents: ManifestContents,
}

impl Manifest {
    /// Create an empty manifest stamped with the current time.
    pub fn new() -> Self {
        Self {
            format_version: MANIFEST_VERSION.to_string(),
            exported_at: Utc::now(),
            directus_version: None,
            contents: ManifestContents::default(),
        }
    }

    /// Parse and validate a manifest from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        let manifest: Self = serde_json::from_str(text)
            .map_err(|e| Error::InvalidRequest(format!("invalid manifest: {e}")))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Load and validate a manifest file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Write the manifest as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check the format version and identity uniqueness within each kind.
    pub fn validate(&self) -> Result<()> {
        let major = self.format_version.split('.').next().unwrap_or_default();
        if major != "1" {
            return Err(Error::InvalidRequest(format!(
                "unsupported manifest version {}",
                self.format_version
            )));
        }
        for kind in Kind::TREE_ORDER {
            let mut seen = HashSet::new();
            for item in self.items(kind) {
                if !seen.insert(item.identity().to_string()) {
                    return Err(Error::InvalidRequest(format!(
                        "duplicate {} '{}' in manifest",
                        kind,
                        item.identity()
                    )));
                }
            }
        }
        Ok(())
    }

    /// All items of one kind, in manifest order.
    pub fn items(&self, kind: Kind) -> Vec<ManifestItem> {
        let c = &self.contents;
        match kind {
            Kind::Collection => c.collections.iter().cloned().map(ManifestItem::Collection).collect(),
            Kind::Flow => c.flows.iter().cloned().map(ManifestItem::Flow).collect(),
            Kind::Role => c.roles.iter().cloned().map(ManifestItem::Role).collect(),
            Kind::Policy => c.policies.iter().cloned().map(ManifestItem::Policy).collect(),
        }
    }

    /// Find one item by kind and identity.
    pub fn item(&self, kind: Kind, identity: &str) -> Option<ManifestItem> {
        let c = &self.contents;
        match kind {
            Kind::Collection => c
                .collections
                .iter()
                .find(|i| i.collection == identity)
                .cloned()
                .map(ManifestItem::Collection),
            Kind::Flow => c
                .flows
                .iter()
                .find(|i| i.id == identity)
                .cloned()
                .map(ManifestItem::Flow),
            Kind::Role => c
                .roles
                .iter()
                .find(|i| i.id == identity)
                .cloned()
                .map(ManifestItem::Role),
            Kind::Policy => c
                .policies
                .iter()
                .find(|i| i.id == identity)
                .cloned()
                .map(ManifestItem::Policy),
        }
    }

    /// Append an item to its kind's list.
    pub fn push(&mut self, item: ManifestItem) {
        let c = &mut self.contents;
        match item {
            ManifestItem::Collection(i) => c.collections.push(i),
            ManifestItem::Flow(i) => c.flows.push(i),
            ManifestItem::Role(i) => c.roles.push(i),
            ManifestItem::Policy(i) => c.policies.push(i),
        }
    }

    /// Selection ids of every item, in apply order.
    pub fn selection(&self) -> Selection {
        Kind::APPLY_ORDER
            .iter()
            .flat_map(|kind| self.items(*kind))
            .map(|item| item.selection_id())
            .collect()
    }

    /// Total number of items.
    pub fn len(&self) -> usize {
        let c = &self.contents;
        c.collections.len() + c.flows.len() + c.roles.len() + c.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new()
    }
}

/// Read a string attribute of a raw entity.
pub fn entity_str<'a>(entity: &'a Value, key: &str) -> Option<&'a str> {
    entity.get(key).and_then(Value::as_str)
}

/// Read an id attribute that may be a string or a number.
pub fn entity_id(entity: &Value, key: &str) -> Option<String> {
    match entity.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_selection_id_parse() {
        let id: SelectionId = "collection:articles".parse().unwrap();
        assert_eq!(id.kind, Kind::Collection);
        assert_eq!(id.identity, "articles");
        assert_eq!(id.to_string(), "collection:articles");

        assert!("articles".parse::<SelectionId>().is_err());
        assert!("widget:x".parse::<SelectionId>().is_err());
        assert!("flow:".parse::<SelectionId>().is_err());
    }

    #[test]
    fn test_selection_identity_keeps_colons() {
        let id: SelectionId = "flow:a:b".parse().unwrap();
        assert_eq!(id.identity, "a:b");
    }

    #[test]
    fn test_selection_ignores_unknown_and_dedups() {
        let selection = Selection::parse([
            "role:r1",
            "nonsense",
            "widget:w",
            "collection:articles",
            "role:r1",
            "role:r2",
        ]);
        assert_eq!(selection.len(), 3);
        assert_eq!(selection.of_kind(Kind::Role), vec!["r1", "r2"]);
        assert_eq!(selection.of_kind(Kind::Collection), vec!["articles"]);
        assert!(selection.of_kind(Kind::Flow).is_empty());
        assert!(selection.contains(Kind::Role, "r2"));
    }

    #[test]
    fn test_kind_orders() {
        assert_eq!(
            Kind::APPLY_ORDER,
            [Kind::Collection, Kind::Role, Kind::Policy, Kind::Flow]
        );
        assert_eq!(Kind::Role.category_name(), "User Roles");
        assert_eq!(Kind::from_prefix("policy"), Some(Kind::Policy));
    }

    #[test]
    fn test_manifest_wire_names() {
        let text = r#"{
            "version": "1.0.0",
            "exportedAt": "2024-05-01T10:00:00.000Z",
            "contents": {
                "collections": [
                    {"collection": "articles", "meta": null, "schema": {"name": "articles"},
                     "fields": [{"field": "id", "type": "integer", "meta": null, "schema": null}]}
                ],
                "flows": [
                    {"id": "f1", "name": "Notify", "icon": "bolt", "color": null, "description": null,
                     "status": "active", "trigger": "event", "accountability": "all", "options": {},
                     "operations": [{"id": "o1", "name": "Log", "key": "log", "type": "log",
                                     "position_x": 19, "position_y": 1, "options": {},
                                     "resolve": null, "reject": null}]}
                ],
                "roles": [],
                "policies": [
                    {"id": "p1", "name": "Editors", "icon": "badge", "description": null,
                     "ip_access": null, "enforce_tfa": false, "admin_access": false, "app_access": true,
                     "permissions": [], "roles": ["r1"]}
                ]
            }
        }"#;
        let manifest = Manifest::from_json(text).unwrap();
        assert_eq!(manifest.len(), 3);
        assert_eq!(manifest.contents.flows[0].operations[0].position_x, 19);
        assert_eq!(manifest.contents.policies[0].roles, vec!["r1"]);

        let out = serde_json::to_value(&manifest).unwrap();
        assert_eq!(out["version"], "1.0.0");
        assert!(out.get("exportedAt").is_some());
        assert_eq!(out["contents"]["collections"][0]["fields"][0]["type"], "integer");
    }

    #[test]
    fn test_manifest_accepts_format_version_alias() {
        let text = r#"{"formatVersion": "1.2.0", "exportedAt": "2024-05-01T10:00:00Z", "contents": {}}"#;
        let manifest = Manifest::from_json(text).unwrap();
        assert_eq!(manifest.format_version, "1.2.0");
        assert!(manifest.is_empty());
    }

    #[test]
    fn test_manifest_rejects_duplicates_and_versions() {
        let mut manifest = Manifest::new();
        let role = RoleItem {
            id: "r1".into(),
            name: "Editor".into(),
            icon: None,
            description: None,
            parent: None,
        };
        manifest.push(ManifestItem::Role(role.clone()));
        assert!(manifest.validate().is_ok());
        manifest.push(ManifestItem::Role(role));
        assert!(manifest.validate().is_err());

        let mut manifest = Manifest::new();
        manifest.format_version = "2.0.0".into();
        assert!(matches!(manifest.validate(), Err(Error::InvalidRequest(_))));
    }

    #[test]
    fn test_manifest_missing_contents_is_invalid() {
        let err = Manifest::from_json(r#"{"version": "1.0.0", "exportedAt": "2024-05-01T10:00:00Z"}"#)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[test]
    fn test_manifest_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        let mut manifest = Manifest::new();
        manifest.push(ManifestItem::Collection(CollectionItem {
            collection: "tags".into(),
            meta: json!({"icon": "label"}),
            schema: json!({"name": "tags"}),
            fields: vec![],
        }));
        manifest.save(&path).unwrap();

        let loaded = Manifest::load(&path).unwrap();
        assert_eq!(loaded, manifest);
    }

    #[test]
    fn test_flow_from_entity_replaces_operation_ids() {
        let raw = json!({
            "id": "f1", "name": "Notify", "status": "active", "trigger": "manual",
            "operation": "o1", "operations": ["o1"], "date_created": "2024-01-01"
        });
        let ops = vec![json!({"id": "o1", "key": "log", "type": "log", "flow": "f1", "resolve": null})];
        let flow = FlowItem::from_entity(raw, ops).unwrap();
        assert_eq!(flow.operations.len(), 1);
        assert_eq!(flow.operations[0].key, "log");
    }

    #[test]
    fn test_policy_from_entity_drops_junction_ids() {
        let raw = json!({"id": "p1", "name": "Editors", "app_access": true,
                         "permissions": [1, 2], "roles": ["access-1"], "users": []});
        let perms = vec![json!({"id": 7, "policy": "p1", "collection": "articles", "action": "read",
                                "fields": ["*"]})];
        let policy = PolicyItem::from_entity(raw, perms, vec!["r1".into()]).unwrap();
        assert!(policy.app_access);
        assert_eq!(policy.permissions[0].fields, Some(vec!["*".to_string()]));
        assert_eq!(policy.roles, vec!["r1"]);
    }

    #[test]
    fn test_manifest_item_label_falls_back_to_id() {
        let item = ManifestItem::Role(RoleItem {
            id: "r9".into(),
            name: String::new(),
            icon: None,
            description: None,
            parent: None,
        });
        assert_eq!(item.label(), "r9");
        assert_eq!(item.selection_id().to_string(), "role:r9");
    }

    #[test]
    fn test_operation_transitions() {
        let op = OperationItem {
            id: "a".into(),
            name: None,
            key: "a".into(),
            operation_type: "log".into(),
            position_x: 0,
            position_y: 0,
            options: Value::Null,
            resolve: Some("b".into()),
            reject: None,
        };
        let transitions: Vec<_> = op.transitions().collect();
        assert_eq!(transitions, vec![("resolve", "b")]);
        let payload = op.unlinked_payload("f1");
        assert!(payload.get("resolve").is_none());
        assert_eq!(payload["flow"], "f1");
    }

    #[test]
    fn test_entity_id_accepts_numbers() {
        let entity = json!({"id": 42, "name": "x"});
        assert_eq!(entity_id(&entity, "id").as_deref(), Some("42"));
        assert_eq!(entity_str(&entity, "name"), Some("x"));
    }
}
