//! In-memory store for tests and dry runs.
//!
//! Behaves like an instance where it matters to the engine: reads of unknown
//! items fail with `NotFound`, creates of existing items are rejected,
//! operations may only point at operations that exist, and deleting an
//! operation clears references to it.

use super::{CollectionStore, FlowStore, PolicyStore, RoleStore};
use crate::error::{Error, ErrorCategory, Result};
use crate::types::{entity_id, entity_str};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct State {
    collections: BTreeMap<String, Value>,
    fields: BTreeMap<String, Vec<Value>>,
    flows: BTreeMap<String, Value>,
    operations: BTreeMap<String, Value>,
    roles: BTreeMap<String, Value>,
    policies: BTreeMap<String, Value>,
    permissions: BTreeMap<u64, Value>,
    access: Vec<(String, String)>,
    next_id: u64,
    failures: HashMap<(String, String), ErrorCategory>,
    writes: Vec<String>,
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn check(&self, method: &str, identity: &str) -> Result<()> {
        match self.failures.get(&(method.to_string(), identity.to_string())) {
            None => Ok(()),
            Some(ErrorCategory::NotFound) => Err(Error::NotFound(format!("{method} {identity}"))),
            Some(ErrorCategory::Auth) => Err(Error::Unauthorized("Invalid user credentials.".into())),
            Some(ErrorCategory::Network) => Err(Error::Http {
                message: "connection refused".into(),
                status: None,
            }),
            Some(_) => Err(Error::Rejected(format!("{method} {identity} failed"))),
        }
    }

    fn record(&mut self, method: &str, identity: &str) {
        self.writes.push(format!("{method} {identity}"));
    }

    fn operation_exists(&self, id: Option<&str>) -> bool {
        id.is_none_or(|id| self.operations.contains_key(id))
    }
}

/// Thread-safe in-memory [`ConfigStore`](super::ConfigStore).
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make calls to `method` for `identity` fail with an error of `category`.
    pub fn fail_on(&self, method: &str, identity: &str, category: ErrorCategory) {
        self.state()
            .failures
            .insert((method.to_string(), identity.to_string()), category);
    }

    /// Attach a role to a policy in the access junction.
    pub fn attach_role(&self, policy: &str, role: &str) {
        self.state().access.push((role.to_string(), policy.to_string()));
    }

    /// Every write call so far, as `"<method> <identity>"`.
    pub fn writes(&self) -> Vec<String> {
        self.state().writes.clone()
    }

    /// Number of operations across all flows.
    pub fn operation_count(&self) -> usize {
        self.state().operations.len()
    }

    /// Number of permission rows across all policies.
    pub fn permission_count(&self) -> usize {
        self.state().permissions.len()
    }
}

fn required_str(payload: &Value, key: &str) -> Result<String> {
    entity_id(payload, key).ok_or_else(|| Error::Rejected(format!("payload is missing \"{key}\"")))
}

fn merge(target: &mut Value, patch: &Value) {
    if let (Some(target), Some(patch)) = (target.as_object_mut(), patch.as_object()) {
        for (key, value) in patch {
            target.insert(key.clone(), value.clone());
        }
    }
}

fn without(payload: &Value, keys: &[&str]) -> Value {
    let mut map: Map<String, Value> = payload.as_object().cloned().unwrap_or_default();
    for key in keys {
        map.remove(*key);
    }
    Value::Object(map)
}

impl CollectionStore for MemoryStore {
    fn list_collections(&self) -> Result<Vec<Value>> {
        let state = self.state();
        state.check("list_collections", "")?;
        Ok(state.collections.values().cloned().collect())
    }

    fn read_collection(&self, name: &str) -> Result<Value> {
        let state = self.state();
        state.check("read_collection", name)?;
        state
            .collections
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("collection {name}")))
    }

    fn create_collection(&self, payload: &Value) -> Result<()> {
        let mut state = self.state();
        let name = required_str(payload, "collection")?;
        state.check("create_collection", &name)?;
        if state.collections.contains_key(&name) {
            return Err(Error::Rejected(format!("collection \"{name}\" already exists")));
        }
        let mut fields = Vec::new();
        for field in payload.get("fields").and_then(Value::as_array).into_iter().flatten() {
            let mut field = field.clone();
            let id = state.next_id();
            merge(&mut field, &serde_json::json!({"collection": name, "id": id}));
            fields.push(field);
        }
        state.collections.insert(name.clone(), without(payload, &["fields"]));
        state.fields.insert(name.clone(), fields);
        state.record("create_collection", &name);
        Ok(())
    }

    fn update_collection(&self, name: &str, patch: &Value) -> Result<()> {
        let mut state = self.state();
        state.check("update_collection", name)?;
        let collection = state
            .collections
            .get_mut(name)
            .ok_or_else(|| Error::NotFound(format!("collection {name}")))?;
        merge(collection, patch);
        state.record("update_collection", name);
        Ok(())
    }

    fn list_fields(&self, collection: &str) -> Result<Vec<Value>> {
        let state = self.state();
        state.check("list_fields", collection)?;
        state
            .fields
            .get(collection)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("collection {collection}")))
    }

    fn read_field(&self, collection: &str, field: &str) -> Result<Value> {
        let state = self.state();
        state.check("read_field", &format!("{collection}.{field}"))?;
        state
            .fields
            .get(collection)
            .and_then(|fields| fields.iter().find(|f| entity_str(f, "field") == Some(field)))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("field {collection}.{field}")))
    }

    fn create_field(&self, collection: &str, payload: &Value) -> Result<()> {
        let mut state = self.state();
        let name = required_str(payload, "field")?;
        let key = format!("{collection}.{name}");
        state.check("create_field", &key)?;
        let id = state.next_id();
        let fields = state
            .fields
            .get_mut(collection)
            .ok_or_else(|| Error::NotFound(format!("collection {collection}")))?;
        if fields.iter().any(|f| entity_str(f, "field") == Some(name.as_str())) {
            return Err(Error::Rejected(format!("field \"{key}\" already exists")));
        }
        let mut field = payload.clone();
        merge(&mut field, &serde_json::json!({"collection": collection, "id": id}));
        fields.push(field);
        state.record("create_field", &key);
        Ok(())
    }

    fn update_field(&self, collection: &str, field: &str, payload: &Value) -> Result<()> {
        let mut state = self.state();
        let key = format!("{collection}.{field}");
        state.check("update_field", &key)?;
        let existing = state
            .fields
            .get_mut(collection)
            .and_then(|fields| fields.iter_mut().find(|f| entity_str(f, "field") == Some(field)))
            .ok_or_else(|| Error::NotFound(format!("field {key}")))?;
        merge(existing, &without(payload, &["field", "collection", "id"]));
        state.record("update_field", &key);
        Ok(())
    }

    fn update_field_meta(&self, collection: &str, field: &str, meta: &Value) -> Result<()> {
        let mut state = self.state();
        let key = format!("{collection}.{field}");
        state.check("update_field_meta", &key)?;
        let existing = state
            .fields
            .get_mut(collection)
            .and_then(|fields| fields.iter_mut().find(|f| entity_str(f, "field") == Some(field)))
            .ok_or_else(|| Error::NotFound(format!("field {key}")))?;
        merge(existing, &serde_json::json!({"meta": meta}));
        state.record("update_field_meta", &key);
        Ok(())
    }
}

impl FlowStore for MemoryStore {
    fn list_flows(&self) -> Result<Vec<Value>> {
        let state = self.state();
        state.check("list_flows", "")?;
        Ok(state.flows.values().cloned().collect())
    }

    fn read_flow(&self, id: &str) -> Result<Value> {
        let state = self.state();
        state.check("read_flow", id)?;
        let mut flow = state
            .flows
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("flow {id}")))?;
        let operations: Vec<Value> = state
            .operations
            .values()
            .filter(|op| entity_str(op, "flow") == Some(id))
            .filter_map(|op| op.get("id").cloned())
            .collect();
        merge(&mut flow, &serde_json::json!({"operations": operations}));
        Ok(flow)
    }

    fn create_flow(&self, payload: &Value) -> Result<()> {
        let mut state = self.state();
        let id = required_str(payload, "id")?;
        state.check("create_flow", &id)?;
        if state.flows.contains_key(&id) {
            return Err(Error::Rejected(format!("flow \"{id}\" already exists")));
        }
        let mut flow = without(payload, &["operations"]);
        if flow.get("operation").is_none() {
            merge(&mut flow, &serde_json::json!({"operation": null}));
        }
        state.flows.insert(id.clone(), flow);
        state.record("create_flow", &id);
        Ok(())
    }

    fn update_flow(&self, id: &str, patch: &Value) -> Result<()> {
        let mut state = self.state();
        state.check("update_flow", id)?;
        if !state.operation_exists(entity_str(patch, "operation")) {
            return Err(Error::Rejected(format!("flow {id} points at an unknown operation")));
        }
        let flow = state
            .flows
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("flow {id}")))?;
        merge(flow, &without(patch, &["id", "operations"]));
        state.record("update_flow", id);
        Ok(())
    }

    fn list_operations(&self, flow: &str) -> Result<Vec<Value>> {
        let state = self.state();
        state.check("list_operations", flow)?;
        Ok(state
            .operations
            .values()
            .filter(|op| entity_str(op, "flow") == Some(flow))
            .cloned()
            .collect())
    }

    fn create_operation(&self, payload: &Value) -> Result<()> {
        let mut state = self.state();
        let id = required_str(payload, "id")?;
        state.check("create_operation", &id)?;
        if state.operations.contains_key(&id) {
            return Err(Error::Rejected(format!("operation \"{id}\" already exists")));
        }
        let flow = required_str(payload, "flow")?;
        if !state.flows.contains_key(&flow) {
            return Err(Error::Rejected(format!("operation {id} belongs to unknown flow {flow}")));
        }
        if !state.operation_exists(entity_str(payload, "resolve"))
            || !state.operation_exists(entity_str(payload, "reject"))
        {
            return Err(Error::Rejected(format!("operation {id} points at an unknown operation")));
        }
        let mut op = payload.clone();
        for key in ["resolve", "reject"] {
            if op.get(key).is_none() {
                merge(&mut op, &serde_json::json!({ key: null }));
            }
        }
        state.operations.insert(id.clone(), op);
        state.record("create_operation", &id);
        Ok(())
    }

    fn update_operation(&self, id: &str, patch: &Value) -> Result<()> {
        let mut state = self.state();
        state.check("update_operation", id)?;
        if !state.operation_exists(entity_str(patch, "resolve"))
            || !state.operation_exists(entity_str(patch, "reject"))
        {
            return Err(Error::Rejected(format!("operation {id} points at an unknown operation")));
        }
        let op = state
            .operations
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("operation {id}")))?;
        merge(op, patch);
        state.record("update_operation", id);
        Ok(())
    }

    fn delete_operation(&self, id: &str) -> Result<()> {
        let mut state = self.state();
        state.check("delete_operation", id)?;
        if state.operations.remove(id).is_none() {
            return Err(Error::NotFound(format!("operation {id}")));
        }
        for op in state.operations.values_mut() {
            for key in ["resolve", "reject"] {
                if entity_str(op, key) == Some(id) {
                    merge(op, &serde_json::json!({ key: null }));
                }
            }
        }
        for flow in state.flows.values_mut() {
            if entity_str(flow, "operation") == Some(id) {
                merge(flow, &serde_json::json!({"operation": null}));
            }
        }
        state.record("delete_operation", id);
        Ok(())
    }
}

impl RoleStore for MemoryStore {
    fn list_roles(&self) -> Result<Vec<Value>> {
        let state = self.state();
        state.check("list_roles", "")?;
        Ok(state.roles.values().cloned().collect())
    }

    fn read_role(&self, id: &str) -> Result<Value> {
        let state = self.state();
        state.check("read_role", id)?;
        state
            .roles
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("role {id}")))
    }

    fn create_role(&self, payload: &Value) -> Result<()> {
        let mut state = self.state();
        let id = required_str(payload, "id")?;
        state.check("create_role", &id)?;
        if state.roles.contains_key(&id) {
            return Err(Error::Rejected(format!("role \"{id}\" already exists")));
        }
        state.roles.insert(id.clone(), payload.clone());
        state.record("create_role", &id);
        Ok(())
    }

    fn update_role(&self, id: &str, patch: &Value) -> Result<()> {
        let mut state = self.state();
        state.check("update_role", id)?;
        let role = state
            .roles
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("role {id}")))?;
        merge(role, &without(patch, &["id"]));
        state.record("update_role", id);
        Ok(())
    }
}

impl PolicyStore for MemoryStore {
    fn list_policies(&self) -> Result<Vec<Value>> {
        let state = self.state();
        state.check("list_policies", "")?;
        Ok(state.policies.values().cloned().collect())
    }

    fn read_policy(&self, id: &str) -> Result<Value> {
        let state = self.state();
        state.check("read_policy", id)?;
        let mut policy = state
            .policies
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("policy {id}")))?;
        let permissions: Vec<u64> = state
            .permissions
            .iter()
            .filter(|(_, p)| entity_str(p, "policy") == Some(id))
            .map(|(pid, _)| *pid)
            .collect();
        merge(&mut policy, &serde_json::json!({"permissions": permissions}));
        Ok(policy)
    }

    fn create_policy(&self, payload: &Value) -> Result<()> {
        let mut state = self.state();
        let id = required_str(payload, "id")?;
        state.check("create_policy", &id)?;
        if state.policies.contains_key(&id) {
            return Err(Error::Rejected(format!("policy \"{id}\" already exists")));
        }
        state
            .policies
            .insert(id.clone(), without(payload, &["permissions", "roles", "users"]));
        state.record("create_policy", &id);
        Ok(())
    }

    fn update_policy(&self, id: &str, patch: &Value) -> Result<()> {
        let mut state = self.state();
        state.check("update_policy", id)?;
        let policy = state
            .policies
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("policy {id}")))?;
        merge(policy, &without(patch, &["id", "permissions", "roles", "users"]));
        state.record("update_policy", id);
        Ok(())
    }

    fn list_permissions(&self, policy: &str) -> Result<Vec<Value>> {
        let state = self.state();
        state.check("list_permissions", policy)?;
        Ok(state
            .permissions
            .values()
            .filter(|p| entity_str(p, "policy") == Some(policy))
            .cloned()
            .collect())
    }

    fn create_permission(&self, payload: &Value) -> Result<()> {
        let mut state = self.state();
        let policy = required_str(payload, "policy")?;
        state.check("create_permission", &policy)?;
        if !state.policies.contains_key(&policy) {
            return Err(Error::Rejected(format!("permission for unknown policy {policy}")));
        }
        let id = state.next_id();
        let mut permission = payload.clone();
        merge(&mut permission, &serde_json::json!({"id": id}));
        state.permissions.insert(id, permission);
        state.record("create_permission", &policy);
        Ok(())
    }

    fn delete_permission(&self, id: &str) -> Result<()> {
        let mut state = self.state();
        state.check("delete_permission", id)?;
        let key: u64 = id
            .parse()
            .map_err(|_| Error::NotFound(format!("permission {id}")))?;
        if state.permissions.remove(&key).is_none() {
            return Err(Error::NotFound(format!("permission {id}")));
        }
        state.record("delete_permission", id);
        Ok(())
    }

    fn read_policy_roles(&self, policy: &str) -> Result<Vec<String>> {
        let state = self.state();
        state.check("read_policy_roles", policy)?;
        Ok(state
            .access
            .iter()
            .filter(|(_, p)| p == policy)
            .map(|(role, _)| role.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_read_unknown_is_not_found() {
        let store = MemoryStore::new();
        assert!(store.read_collection("articles").unwrap_err().is_not_found());
        assert!(store.read_field("articles", "title").unwrap_err().is_not_found());
        assert!(store.read_flow("f1").unwrap_err().is_not_found());
        assert!(store.read_policy("p1").unwrap_err().is_not_found());
    }

    #[test]
    fn test_create_collection_with_fields() {
        let store = MemoryStore::new();
        store
            .create_collection(&json!({
                "collection": "articles",
                "meta": null,
                "fields": [{"field": "id", "type": "integer"}, {"field": "title", "type": "string"}]
            }))
            .unwrap();
        let fields = store.list_fields("articles").unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[1]["collection"], "articles");
        assert!(store.read_collection("articles").unwrap().get("fields").is_none());
        assert!(store.create_collection(&json!({"collection": "articles"})).is_err());
    }

    #[test]
    fn test_operations_require_existing_targets() {
        let store = MemoryStore::new();
        store.create_flow(&json!({"id": "f1", "name": "Flow"})).unwrap();
        let err = store
            .create_operation(&json!({"id": "a", "flow": "f1", "resolve": "b"}))
            .unwrap_err();
        assert!(matches!(err, Error::Rejected(_)));

        store.create_operation(&json!({"id": "a", "flow": "f1"})).unwrap();
        store.create_operation(&json!({"id": "b", "flow": "f1"})).unwrap();
        store.update_operation("a", &json!({"resolve": "b"})).unwrap();
        assert_eq!(store.read_flow("f1").unwrap()["operations"], json!(["a", "b"]));

        store.update_flow("f1", &json!({"operation": "a"})).unwrap();
        store.delete_operation("b").unwrap();
        assert_eq!(store.list_operations("f1").unwrap()[0]["resolve"], Value::Null);
        store.delete_operation("a").unwrap();
        assert_eq!(store.read_flow("f1").unwrap()["operation"], Value::Null);
    }

    #[test]
    fn test_permissions_and_access() {
        let store = MemoryStore::new();
        store.create_policy(&json!({"id": "p1", "name": "Editors"})).unwrap();
        store
            .create_permission(&json!({"policy": "p1", "collection": "articles", "action": "read"}))
            .unwrap();
        assert_eq!(store.list_permissions("p1").unwrap().len(), 1);
        assert_eq!(store.read_policy("p1").unwrap()["permissions"], json!([1]));
        store.delete_permission("1").unwrap();
        assert_eq!(store.permission_count(), 0);

        store.attach_role("p1", "r1");
        assert_eq!(store.read_policy_roles("p1").unwrap(), vec!["r1"]);
    }

    #[test]
    fn test_fail_on_injects_errors() {
        let store = MemoryStore::new();
        store.create_role(&json!({"id": "r1", "name": "Editor"})).unwrap();
        store.fail_on("read_role", "r1", ErrorCategory::Auth);
        let err = store.read_role("r1").unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Auth);

        store.fail_on("list_roles", "", ErrorCategory::Network);
        assert!(store.list_roles().unwrap_err().is_retryable());
    }

    #[test]
    fn test_update_field_meta_leaves_schema() {
        let store = MemoryStore::new();
        store
            .create_collection(&json!({
                "collection": "articles",
                "fields": [{"field": "title", "type": "string", "meta": {"note": "a"}, "schema": {"max_length": 255}}]
            }))
            .unwrap();
        store
            .update_field_meta("articles", "title", &json!({"note": "b"}))
            .unwrap();
        let field = store.read_field("articles", "title").unwrap();
        assert_eq!(field["meta"]["note"], "b");
        assert_eq!(field["schema"]["max_length"], 255);
        assert_eq!(store.writes(), vec![
            "create_collection articles",
            "update_field_meta articles.title",
        ]);
    }
}
