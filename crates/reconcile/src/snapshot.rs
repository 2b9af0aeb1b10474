//! Snapshot of everything an instance holds, read with concurrent fan-out.

use crate::error::Result;
use crate::store::ConfigStore;
use crate::types::{Kind, SYSTEM_COLLECTION_PREFIX, entity_id, entity_str};
use rayon::prelude::*;
use serde::Serialize;
use serde_json::Value;

/// One raw entity with its identity and display name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    pub id: String,
    pub name: String,
    pub data: Value,
}

impl Entity {
    /// Wrap a raw entity of `kind`. Returns `None` when it has no identity.
    pub fn from_raw(kind: Kind, data: Value) -> Option<Self> {
        let id = entity_id(&data, kind.identity_key())?;
        let name = match kind {
            Kind::Collection => id.clone(),
            _ => entity_str(&data, "name")
                .filter(|n| !n.is_empty())
                .map_or_else(|| id.clone(), str::to_string),
        };
        Some(Self { id, name, data })
    }
}

/// All user-facing configuration of one instance.
///
/// System collections and the id-less public role are left out.
/// Collection entities carry their field list under `fields`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    pub collections: Vec<Entity>,
    pub flows: Vec<Entity>,
    pub roles: Vec<Entity>,
    pub policies: Vec<Entity>,
}

impl Snapshot {
    /// Read all four kinds concurrently, then every collection's fields.
    ///
    /// Any listing failure fails the whole snapshot. A failed field listing
    /// leaves that collection with no fields.
    pub fn read<S: ConfigStore + ?Sized>(store: &S) -> Result<Self> {
        let ((collections, flows), (roles, policies)) = rayon::join(
            || rayon::join(|| store.list_collections(), || store.list_flows()),
            || rayon::join(|| store.list_roles(), || store.list_policies()),
        );

        let collections: Vec<Entity> = collections?
            .into_par_iter()
            .filter(|c| {
                entity_str(c, "collection").is_some_and(|n| !n.starts_with(SYSTEM_COLLECTION_PREFIX))
            })
            .filter_map(|mut raw| {
                let name = entity_str(&raw, "collection")?.to_string();
                let fields = store.list_fields(&name).unwrap_or_else(|e| {
                    log::warn!("Failed to list fields of {name}: {e}");
                    Vec::new()
                });
                if let Some(map) = raw.as_object_mut() {
                    map.insert("fields".into(), Value::Array(fields));
                }
                Entity::from_raw(Kind::Collection, raw)
            })
            .collect();

        let wrap = |kind: Kind, raw: Vec<Value>| -> Vec<Entity> {
            raw.into_iter()
                .filter_map(|data| Entity::from_raw(kind, data))
                .collect()
        };

        let snapshot = Self {
            collections,
            flows: wrap(Kind::Flow, flows?),
            roles: wrap(Kind::Role, roles?),
            policies: wrap(Kind::Policy, policies?),
        };
        log::debug!(
            "Snapshot: {} collections, {} flows, {} roles, {} policies",
            snapshot.collections.len(),
            snapshot.flows.len(),
            snapshot.roles.len(),
            snapshot.policies.len()
        );
        Ok(snapshot)
    }

    /// Entities of one kind.
    pub fn entities(&self, kind: Kind) -> &[Entity] {
        match kind {
            Kind::Collection => &self.collections,
            Kind::Flow => &self.flows,
            Kind::Role => &self.roles,
            Kind::Policy => &self.policies,
        }
    }

    /// Total number of entities.
    pub fn len(&self) -> usize {
        Kind::TREE_ORDER.iter().map(|k| self.entities(*k).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use crate::store::{CollectionStore, FlowStore, MemoryStore, RoleStore};
    use serde_json::json;

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .create_collection(&json!({"collection": "articles", "fields": [{"field": "id"}]}))
            .unwrap();
        store
            .create_collection(&json!({"collection": "directus_users", "fields": []}))
            .unwrap();
        store.create_flow(&json!({"id": "f1", "name": ""})).unwrap();
        store.create_role(&json!({"id": "r1", "name": "Editor"})).unwrap();
        store
    }

    #[test]
    fn test_read_filters_system_collections() {
        let snapshot = Snapshot::read(&seeded()).unwrap();
        assert_eq!(snapshot.collections.len(), 1);
        assert_eq!(snapshot.collections[0].id, "articles");
        assert_eq!(snapshot.collections[0].data["fields"][0]["field"], "id");
        assert_eq!(snapshot.len(), 3);
    }

    #[test]
    fn test_names_fall_back_to_id() {
        let snapshot = Snapshot::read(&seeded()).unwrap();
        assert_eq!(snapshot.flows[0].name, "f1");
        assert_eq!(snapshot.roles[0].name, "Editor");
    }

    #[test]
    fn test_public_role_is_skipped() {
        assert!(Entity::from_raw(Kind::Role, json!({"id": null, "name": "Public"})).is_none());
    }

    #[test]
    fn test_field_listing_failure_is_tolerated() {
        let store = seeded();
        store.fail_on("list_fields", "articles", ErrorCategory::Network);
        let snapshot = Snapshot::read(&store).unwrap();
        assert_eq!(snapshot.collections[0].data["fields"], json!([]));
    }

    #[test]
    fn test_listing_failure_is_fatal() {
        let store = seeded();
        store.fail_on("list_policies", "", ErrorCategory::Network);
        assert!(Snapshot::read(&store).is_err());
    }
}
