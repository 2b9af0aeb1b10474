//! Classification of manifest items and remote entities against local state.

use crate::error::Result;
use crate::normalize;
use crate::snapshot::{Entity, Snapshot};
use crate::store::ConfigStore;
use crate::tree::{Comparison, ImportStatus, Payload, Tree, TreeNode};
use crate::types::{
    CollectionItem, FlowItem, Kind, Manifest, ManifestItem, PolicyItem, RoleItem, SelectionId,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

// =============================================================================
// Import comparison
// =============================================================================

/// Counts of an import comparison.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub new: usize,
    pub unchanged: usize,
    pub modified: usize,
}

impl ImportSummary {
    fn add(&mut self, status: ImportStatus) {
        match status {
            ImportStatus::New => self.new += 1,
            ImportStatus::Unchanged => self.unchanged += 1,
            ImportStatus::Modified => self.modified += 1,
            ImportStatus::Missing => {}
        }
    }

    /// Items that would change on import.
    pub fn changes(&self) -> usize {
        self.new + self.modified
    }
}

/// A manifest classified against the local store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportComparison {
    pub tree: Tree,
    pub summary: ImportSummary,
}

/// Classify every manifest item as new, unchanged or modified.
///
/// Items that are not unchanged start checked. Only a not-found read means
/// "new"; any other read failure aborts the comparison.
pub fn compare_manifest_against_local<S: ConfigStore + ?Sized>(
    store: &S,
    manifest: &Manifest,
) -> Result<ImportComparison> {
    let mut summary = ImportSummary::default();
    let mut categories = Vec::with_capacity(Kind::TREE_ORDER.len());

    for kind in Kind::TREE_ORDER {
        let mut children = Vec::new();
        for item in manifest.items(kind) {
            let diff = match item_diff(store, &item) {
                Ok(diff) => Some(diff),
                Err(e) if e.is_not_found() => None,
                Err(e) => return Err(e),
            };
            let status = match &diff {
                None => ImportStatus::New,
                Some(d) if d.is_empty() => ImportStatus::Unchanged,
                Some(_) => ImportStatus::Modified,
            };
            log::debug!("{}: {:?}", item.selection_id(), status);
            summary.add(status);
            children.push(
                TreeNode::item(&item.selection_id(), item.label(), status != ImportStatus::Unchanged)
                    .with_status(status)
                    .with_diff(diff.unwrap_or_default())
                    .with_payload(Payload::Item(item)),
            );
        }
        categories.push(TreeNode::category(kind, children));
    }

    Ok(ImportComparison {
        tree: Tree::new(categories),
        summary,
    })
}

fn item_diff<S: ConfigStore + ?Sized>(store: &S, item: &ManifestItem) -> Result<Vec<String>> {
    match item {
        ManifestItem::Collection(c) => {
            store.read_collection(&c.collection)?;
            let existing = store.list_fields(&c.collection)?;
            Ok(collection_diff(c, &existing))
        }
        ManifestItem::Flow(f) => Ok(flow_diff(&store.read_flow(&f.id)?, f)),
        ManifestItem::Role(r) => Ok(role_diff(&store.read_role(&r.id)?, r)),
        ManifestItem::Policy(p) => Ok(policy_diff(&store.read_policy(&p.id)?, p)),
    }
}

/// Render a value the way it reads in a change line: strings bare, null as `null`.
fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn attr<'a>(entity: &'a Value, key: &str) -> &'a Value {
    entity.get(key).unwrap_or(&Value::Null)
}

fn collection_diff(item: &CollectionItem, existing: &[Value]) -> Vec<String> {
    let existing_by_name: HashMap<&str, &Value> = existing
        .iter()
        .filter_map(|f| Some((f.get("field")?.as_str()?, f)))
        .collect();
    let import_names: HashSet<&str> = item.fields.iter().map(|f| f.field.as_str()).collect();

    let mut diff = Vec::new();
    for field in &item.fields {
        if let Some(current) = existing_by_name.get(field.field.as_str()) {
            let wanted = field.field_type.clone().map_or(Value::Null, Value::String);
            let current_type = attr(current, "type");
            if *current_type != wanted {
                diff.push(format!(
                    "Field \"{}\" type changed: {} → {}",
                    field.field,
                    display(current_type),
                    display(&wanted)
                ));
            }
        }
    }

    let added: Vec<&str> = item
        .fields
        .iter()
        .map(|f| f.field.as_str())
        .filter(|name| !existing_by_name.contains_key(name))
        .collect();
    if !added.is_empty() {
        diff.push(format!("{} new field(s): {}", added.len(), added.join(", ")));
    }

    let removed: Vec<&str> = existing
        .iter()
        .filter_map(|f| f.get("field").and_then(Value::as_str))
        .filter(|name| !import_names.contains(name))
        .collect();
    if !removed.is_empty() {
        diff.push(format!(
            "{} field(s) not in import: {}",
            removed.len(),
            removed.join(", ")
        ));
    }
    diff
}

/// Compare named attributes of an existing entity with their wanted values.
///
/// A key the entity omits reads as the empty value of the wanted type, so an
/// absent boolean matches `false` and an absent string matches `""` or null.
fn attribute_diff(existing: &Value, wanted: &[(&str, &str, Value)]) -> Vec<String> {
    wanted
        .iter()
        .filter_map(|(key, label, value)| {
            let current = existing
                .get(*key)
                .cloned()
                .unwrap_or_else(|| empty_like(value));
            if current == *value || (is_blank(&current) && is_blank(value)) {
                return None;
            }
            Some(if *key == "name" {
                format!("{label} changed: \"{}\" → \"{}\"", display(&current), display(value))
            } else {
                format!("{label} changed: {} → {}", display(&current), display(value))
            })
        })
        .collect()
}

fn empty_like(value: &Value) -> Value {
    match value {
        Value::Bool(_) => Value::Bool(false),
        Value::String(_) => Value::String(String::new()),
        _ => Value::Null,
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn opt(value: Option<&String>) -> Value {
    value.map_or(Value::Null, |s| Value::String(s.clone()))
}

fn flow_diff(existing: &Value, item: &FlowItem) -> Vec<String> {
    attribute_diff(
        existing,
        &[
            ("name", "Name", Value::String(item.name.clone())),
            ("status", "Status", Value::String(item.status.clone())),
            ("trigger", "Trigger", opt(item.trigger.as_ref())),
        ],
    )
}

fn role_diff(existing: &Value, item: &RoleItem) -> Vec<String> {
    attribute_diff(
        existing,
        &[
            ("name", "Name", Value::String(item.name.clone())),
            ("icon", "Icon", opt(item.icon.as_ref())),
        ],
    )
}

fn policy_diff(existing: &Value, item: &PolicyItem) -> Vec<String> {
    attribute_diff(
        existing,
        &[
            ("name", "Name", Value::String(item.name.clone())),
            ("admin_access", "Admin access", Value::Bool(item.admin_access)),
            ("app_access", "App access", Value::Bool(item.app_access)),
        ],
    )
}

// =============================================================================
// Remote comparison
// =============================================================================

/// One item classified across the local and remote instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncEntry {
    pub id: SelectionId,
    pub name: String,
    pub kind: Kind,
    pub comparison: Comparison,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diff: Vec<String>,
    #[serde(rename = "localData", skip_serializing_if = "Option::is_none")]
    pub local: Option<Value>,
    #[serde(rename = "remoteData", skip_serializing_if = "Option::is_none")]
    pub remote: Option<Value>,
}

/// Classify entities of one kind.
///
/// Entries follow local order, then the remote-only ones in remote order.
pub fn compare_local_and_remote(local: &[Entity], remote: &[Entity], kind: Kind) -> Vec<SyncEntry> {
    let remote_by_id: HashMap<&str, &Entity> = remote.iter().map(|e| (e.id.as_str(), e)).collect();
    let local_ids: HashSet<&str> = local.iter().map(|e| e.id.as_str()).collect();

    let mut entries = Vec::with_capacity(local.len() + remote.len());
    for entity in local {
        let entry = match remote_by_id.get(entity.id.as_str()) {
            None => SyncEntry {
                id: SelectionId::new(kind, &entity.id),
                name: entity.name.clone(),
                kind,
                comparison: Comparison::LocalOnly,
                diff: Vec::new(),
                local: Some(entity.data.clone()),
                remote: None,
            },
            Some(other) => {
                let same = normalize::equivalent(&entity.data, &other.data, kind);
                SyncEntry {
                    id: SelectionId::new(kind, &entity.id),
                    name: entity.name.clone(),
                    kind,
                    comparison: if same { Comparison::Identical } else { Comparison::Different },
                    diff: if same {
                        Vec::new()
                    } else {
                        normalize::describe_differences(&entity.data, &other.data, kind)
                    },
                    local: Some(entity.data.clone()),
                    remote: Some(other.data.clone()),
                }
            }
        };
        entries.push(entry);
    }

    for entity in remote.iter().filter(|e| !local_ids.contains(e.id.as_str())) {
        entries.push(SyncEntry {
            id: SelectionId::new(kind, &entity.id),
            name: entity.name.clone(),
            kind,
            comparison: Comparison::RemoteOnly,
            diff: Vec::new(),
            local: None,
            remote: Some(entity.data.clone()),
        });
    }
    entries
}

/// Counts of a remote comparison.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSummary {
    pub local_only: usize,
    pub remote_only: usize,
    pub matching: usize,
    pub different: usize,
}

impl RemoteSummary {
    pub fn total(&self) -> usize {
        self.local_only + self.remote_only + self.matching + self.different
    }
}

/// Classified entries for all four kinds.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RemoteComparison {
    pub collections: Vec<SyncEntry>,
    pub flows: Vec<SyncEntry>,
    pub roles: Vec<SyncEntry>,
    pub policies: Vec<SyncEntry>,
    pub summary: RemoteSummary,
}

impl RemoteComparison {
    pub fn entries(&self, kind: Kind) -> &[SyncEntry] {
        match kind {
            Kind::Collection => &self.collections,
            Kind::Flow => &self.flows,
            Kind::Role => &self.roles,
            Kind::Policy => &self.policies,
        }
    }

    /// Comparison tree. Everything except identical entries starts checked.
    pub fn tree(&self) -> Tree {
        let categories = Kind::TREE_ORDER
            .iter()
            .map(|kind| {
                let children = self
                    .entries(*kind)
                    .iter()
                    .map(|entry| {
                        let mut node = TreeNode::item(
                            &entry.id,
                            &entry.name,
                            entry.comparison != Comparison::Identical,
                        )
                        .with_comparison(entry.comparison)
                        .with_diff(entry.diff.clone());
                        if let Some(data) = entry.local.as_ref().or(entry.remote.as_ref()) {
                            node = node.with_payload(Payload::Entity(data.clone()));
                        }
                        node
                    })
                    .collect();
                TreeNode::category(*kind, children)
            })
            .collect();
        Tree::new(categories)
    }
}

/// Compare two snapshots across all four kinds.
pub fn compare_snapshots(local: &Snapshot, remote: &Snapshot) -> RemoteComparison {
    let mut result = RemoteComparison {
        collections: compare_local_and_remote(&local.collections, &remote.collections, Kind::Collection),
        flows: compare_local_and_remote(&local.flows, &remote.flows, Kind::Flow),
        roles: compare_local_and_remote(&local.roles, &remote.roles, Kind::Role),
        policies: compare_local_and_remote(&local.policies, &remote.policies, Kind::Policy),
        summary: RemoteSummary::default(),
    };
    let mut summary = RemoteSummary::default();
    for kind in Kind::TREE_ORDER {
        for entry in result.entries(kind) {
            match entry.comparison {
                Comparison::LocalOnly => summary.local_only += 1,
                Comparison::RemoteOnly => summary.remote_only += 1,
                Comparison::Identical => summary.matching += 1,
                Comparison::Different => summary.different += 1,
            }
        }
    }
    result.summary = summary;
    result
}

/// Read both instances concurrently and compare them.
///
/// A listing failure on either side fails the scan.
pub fn scan<L, R>(local: &L, remote: &R) -> Result<RemoteComparison>
where
    L: ConfigStore + ?Sized,
    R: ConfigStore + ?Sized,
{
    let (local, remote) = rayon::join(|| Snapshot::read(local), || Snapshot::read(remote));
    Ok(compare_snapshots(&local?, &remote?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use crate::store::{CollectionStore, FlowStore, MemoryStore, PolicyStore, RoleStore};
    use crate::types::FieldItem;
    use serde_json::json;

    fn field(name: &str, field_type: &str) -> FieldItem {
        FieldItem {
            field: name.into(),
            field_type: Some(field_type.into()),
            meta: Value::Null,
            schema: Value::Null,
        }
    }

    fn collection(name: &str, fields: Vec<FieldItem>) -> CollectionItem {
        CollectionItem {
            collection: name.into(),
            meta: Value::Null,
            schema: json!({"name": name}),
            fields,
        }
    }

    fn local_store() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .create_collection(&json!({"collection": "articles", "fields": [
                {"field": "id", "type": "integer"}, {"field": "title", "type": "string"}
            ]}))
            .unwrap();
        store
            .create_collection(&json!({"collection": "tags", "fields": [{"field": "id", "type": "integer"}]}))
            .unwrap();
        store
    }

    #[test]
    fn test_import_comparison_scenario() {
        let store = local_store();
        let mut manifest = Manifest::new();
        manifest.push(ManifestItem::Collection(collection(
            "articles",
            vec![field("id", "integer"), field("title", "string"), field("subtitle", "string")],
        )));
        manifest.push(ManifestItem::Collection(collection("comments", vec![field("id", "integer")])));

        let result = compare_manifest_against_local(&store, &manifest).unwrap();
        assert_eq!(
            result.summary,
            ImportSummary {
                new: 1,
                unchanged: 0,
                modified: 1
            }
        );
        let articles = result.tree.find("collection:articles").unwrap();
        assert_eq!(articles.status, Some(ImportStatus::Modified));
        assert_eq!(articles.diff, vec!["1 new field(s): subtitle"]);
        assert!(articles.checked);
        let comments = result.tree.find("collection:comments").unwrap();
        assert_eq!(comments.status, Some(ImportStatus::New));
        assert!(result.tree.find("data-model").unwrap().checked);
    }

    #[test]
    fn test_collection_diff_lines() {
        let existing = vec![
            json!({"field": "id", "type": "integer"}),
            json!({"field": "body", "type": "text"}),
            json!({"field": "legacy", "type": "string"}),
        ];
        let item = collection("articles", vec![field("id", "uuid"), field("body", "text")]);
        assert_eq!(
            collection_diff(&item, &existing),
            vec![
                "Field \"id\" type changed: integer → uuid",
                "1 field(s) not in import: legacy",
            ]
        );
    }

    #[test]
    fn test_unchanged_items_start_unchecked() {
        let store = local_store();
        store
            .create_role(&json!({"id": "r1", "name": "Editor", "icon": "edit"}))
            .unwrap();
        let mut manifest = Manifest::new();
        manifest.push(ManifestItem::Role(RoleItem {
            id: "r1".into(),
            name: "Editor".into(),
            icon: Some("edit".into()),
            description: None,
            parent: None,
        }));
        let result = compare_manifest_against_local(&store, &manifest).unwrap();
        assert_eq!(result.summary.unchanged, 1);
        let role = result.tree.find("role:r1").unwrap();
        assert!(!role.checked);
        assert!(!result.tree.find("roles").unwrap().checked);
        assert!(result.tree.selected_ids().is_empty());
    }

    #[test]
    fn test_attribute_diff_lines() {
        let existing = json!({"id": "f1", "name": "Old", "status": "active", "trigger": null});
        let item = FlowItem {
            id: "f1".into(),
            name: "New".into(),
            icon: None,
            color: None,
            description: None,
            status: "inactive".into(),
            trigger: Some("manual".into()),
            accountability: None,
            options: Value::Null,
            operations: vec![],
        };
        assert_eq!(
            flow_diff(&existing, &item),
            vec![
                "Name changed: \"Old\" → \"New\"",
                "Status changed: active → inactive",
                "Trigger changed: null → manual",
            ]
        );

        let policy = json!({"id": "p1", "name": "Editors", "admin_access": false, "app_access": false});
        let item = PolicyItem {
            id: "p1".into(),
            name: "Editors".into(),
            icon: None,
            description: None,
            ip_access: Value::Null,
            enforce_tfa: false,
            admin_access: true,
            app_access: false,
            permissions: vec![],
            roles: vec![],
        };
        assert_eq!(policy_diff(&policy, &item), vec!["Admin access changed: false → true"]);
    }

    #[test]
    fn test_absent_attributes_match_empty_values() {
        let existing = json!({"id": "p1", "name": "Editors"});
        let item = PolicyItem {
            id: "p1".into(),
            name: "Editors".into(),
            icon: None,
            description: None,
            ip_access: Value::Null,
            enforce_tfa: false,
            admin_access: false,
            app_access: true,
            permissions: vec![],
            roles: vec![],
        };
        assert_eq!(policy_diff(&existing, &item), vec!["App access changed: false → true"]);

        let role = json!({"id": "r1", "name": "Editor", "icon": ""});
        let item = RoleItem {
            id: "r1".into(),
            name: "Editor".into(),
            icon: None,
            description: None,
            parent: None,
        };
        assert!(role_diff(&role, &item).is_empty());
    }

    #[test]
    fn test_import_comparison_propagates_auth_failure() {
        let store = local_store();
        store.create_flow(&json!({"id": "f1", "name": "Flow"})).unwrap();
        store.fail_on("read_flow", "f1", ErrorCategory::Auth);
        let mut manifest = Manifest::new();
        manifest.push(ManifestItem::Flow(FlowItem {
            id: "f1".into(),
            name: "Flow".into(),
            icon: None,
            color: None,
            description: None,
            status: "active".into(),
            trigger: None,
            accountability: None,
            options: Value::Null,
            operations: vec![],
        }));
        let err = compare_manifest_against_local(&store, &manifest).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Auth);
    }

    fn entity(kind: Kind, data: Value) -> Entity {
        Entity::from_raw(kind, data).unwrap()
    }

    #[test]
    fn test_remote_comparison_partitions_ids() {
        let local = vec![
            entity(Kind::Role, json!({"id": "a", "name": "A"})),
            entity(Kind::Role, json!({"id": "b", "name": "B"})),
            entity(Kind::Role, json!({"id": "c", "name": "C", "users": ["u1"]})),
        ];
        let remote = vec![
            entity(Kind::Role, json!({"id": "d", "name": "D"})),
            entity(Kind::Role, json!({"id": "c", "name": "C", "users": []})),
            entity(Kind::Role, json!({"id": "b", "name": "Bee"})),
        ];
        let entries = compare_local_and_remote(&local, &remote, Kind::Role);
        let classes: Vec<(&str, Comparison)> = entries
            .iter()
            .map(|e| (e.id.identity.as_str(), e.comparison))
            .collect();
        assert_eq!(
            classes,
            vec![
                ("a", Comparison::LocalOnly),
                ("b", Comparison::Different),
                ("c", Comparison::Identical),
                ("d", Comparison::RemoteOnly),
            ]
        );
        assert_eq!(entries[1].diff, vec!["\"name\" differs"]);
    }

    #[test]
    fn test_collections_with_same_names_are_identical() {
        let local = vec![entity(
            Kind::Collection,
            json!({"collection": "articles", "fields": [{"field": "id", "type": "integer"}]}),
        )];
        let remote = vec![entity(
            Kind::Collection,
            json!({"collection": "articles", "fields": [{"field": "id", "type": "uuid"}]}),
        )];
        let entries = compare_local_and_remote(&local, &remote, Kind::Collection);
        assert_eq!(entries[0].comparison, Comparison::Identical);
    }

    #[test]
    fn test_scan_summary_counts_union() {
        let local = local_store();
        local.create_policy(&json!({"id": "p1", "name": "Editors"})).unwrap();
        let remote = MemoryStore::new();
        remote
            .create_collection(&json!({"collection": "tags", "fields": [{"field": "id"}]}))
            .unwrap();
        remote
            .create_collection(&json!({"collection": "events", "fields": []}))
            .unwrap();
        remote.create_policy(&json!({"id": "p1", "name": "Editors"})).unwrap();

        let result = scan(&local, &remote).unwrap();
        assert_eq!(
            result.summary,
            RemoteSummary {
                local_only: 1,
                remote_only: 1,
                matching: 2,
                different: 0
            }
        );
        // articles, tags, events, p1
        assert_eq!(result.summary.total(), 4);
        let tree = result.tree();
        assert_eq!(tree.selected_ids(), vec!["collection:articles", "collection:events"]);
    }

    #[test]
    fn test_compare_snapshots_tallies_every_kind() {
        let local = Snapshot {
            roles: vec![
                entity(Kind::Role, json!({"id": "r1", "name": "Editor"})),
                entity(Kind::Role, json!({"id": "r2", "name": "Viewer"})),
            ],
            flows: vec![entity(Kind::Flow, json!({"id": "f1", "name": "Notify"}))],
            ..Snapshot::default()
        };
        let remote = Snapshot {
            roles: vec![entity(Kind::Role, json!({"id": "r1", "name": "Editors"}))],
            policies: vec![entity(Kind::Policy, json!({"id": "p1", "name": "Admins"}))],
            ..Snapshot::default()
        };
        let result = compare_snapshots(&local, &remote);
        assert_eq!(
            result.summary,
            RemoteSummary {
                local_only: 2,
                remote_only: 1,
                matching: 0,
                different: 1
            }
        );
        assert_eq!(result.roles[0].diff, vec!["\"name\" differs"]);
    }

    #[test]
    fn test_scan_fails_on_remote_listing_error() {
        let local = local_store();
        let remote = MemoryStore::new();
        remote.fail_on("list_flows", "", ErrorCategory::Network);
        assert!(scan(&local, &remote).is_err());
    }

    #[test]
    fn test_export_then_compare_is_unchanged() {
        let store = local_store();
        store
            .create_flow(&json!({"id": "f1", "name": "Notify", "status": "active", "trigger": "manual"}))
            .unwrap();
        store
            .create_policy(&json!({"id": "p1", "name": "Editors", "admin_access": false, "app_access": true}))
            .unwrap();
        let selection = crate::types::Selection::parse(["collection:articles", "flow:f1", "policy:p1"]);
        let manifest = crate::executor::export_manifest(&store, &selection).unwrap();
        let result = compare_manifest_against_local(&store, &manifest).unwrap();
        assert_eq!(result.summary.unchanged, 3);
        assert_eq!(result.summary.changes(), 0);
    }
}
