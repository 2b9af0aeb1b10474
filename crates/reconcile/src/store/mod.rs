//! Store traits and implementations for reading and writing configuration.
//!
//! Each resource kind has its own trait ([`CollectionStore`], [`FlowStore`],
//! [`RoleStore`], [`PolicyStore`]). A transport implements all four and is
//! then usable as a [`ConfigStore`]. The primary implementation is
//! [`rest::RestStore`], which talks to an instance over its REST API.
//!
//! Payloads are raw JSON values as the instance represents them; the engine
//! converts them to typed items where it needs structure.
//!
//! # Testing
//!
//! Use [`MemoryStore`] for testing without network access:
//!
//! ```
//! use reconcile::store::{MemoryStore, RoleStore};
//! use serde_json::json;
//!
//! let store = MemoryStore::new();
//! store.create_role(&json!({"id": "r1", "name": "Editor"})).unwrap();
//! assert_eq!(store.list_roles().unwrap().len(), 1);
//! assert!(store.read_role("r2").unwrap_err().is_not_found());
//! ```

pub mod memory;
pub mod rest;

pub use memory::MemoryStore;
pub use rest::RestStore;

use crate::error::Result;
use serde_json::Value;

/// Collections and their fields.
pub trait CollectionStore {
    /// List every collection, system collections included.
    fn list_collections(&self) -> Result<Vec<Value>>;

    /// Read one collection by name.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the collection doesn't exist.
    fn read_collection(&self, name: &str) -> Result<Value>;

    /// Create a collection. The payload may carry a `fields` array.
    fn create_collection(&self, payload: &Value) -> Result<()>;

    /// Patch a collection's mutable attributes (`meta`).
    fn update_collection(&self, name: &str, patch: &Value) -> Result<()>;

    /// List the fields of one collection.
    fn list_fields(&self, collection: &str) -> Result<Vec<Value>>;

    /// Read one field.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the field doesn't exist.
    fn read_field(&self, collection: &str, field: &str) -> Result<Value>;

    /// Create a field in an existing collection.
    fn create_field(&self, collection: &str, payload: &Value) -> Result<()>;

    /// Update a field's type, meta and schema.
    fn update_field(&self, collection: &str, field: &str, payload: &Value) -> Result<()>;

    /// Update only a field's meta. Never touches the database column.
    fn update_field_meta(&self, collection: &str, field: &str, meta: &Value) -> Result<()>;
}

/// Flows and their operations.
pub trait FlowStore {
    fn list_flows(&self) -> Result<Vec<Value>>;

    /// Read one flow by id.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the flow doesn't exist.
    fn read_flow(&self, id: &str) -> Result<Value>;

    fn create_flow(&self, payload: &Value) -> Result<()>;

    fn update_flow(&self, id: &str, patch: &Value) -> Result<()>;

    /// List the operations belonging to one flow.
    fn list_operations(&self, flow: &str) -> Result<Vec<Value>>;

    fn create_operation(&self, payload: &Value) -> Result<()>;

    fn update_operation(&self, id: &str, patch: &Value) -> Result<()>;

    fn delete_operation(&self, id: &str) -> Result<()>;
}

/// Access roles.
pub trait RoleStore {
    /// List every role. The public role has no id.
    fn list_roles(&self) -> Result<Vec<Value>>;

    fn read_role(&self, id: &str) -> Result<Value>;

    fn create_role(&self, payload: &Value) -> Result<()>;

    fn update_role(&self, id: &str, patch: &Value) -> Result<()>;
}

/// Access policies and their permissions.
pub trait PolicyStore {
    fn list_policies(&self) -> Result<Vec<Value>>;

    fn read_policy(&self, id: &str) -> Result<Value>;

    fn create_policy(&self, payload: &Value) -> Result<()>;

    fn update_policy(&self, id: &str, patch: &Value) -> Result<()>;

    /// List the permission rows owned by one policy.
    fn list_permissions(&self, policy: &str) -> Result<Vec<Value>>;

    fn create_permission(&self, payload: &Value) -> Result<()>;

    fn delete_permission(&self, id: &str) -> Result<()>;

    /// Ids of the roles a policy is attached to, through the access junction.
    fn read_policy_roles(&self, policy: &str) -> Result<Vec<String>>;
}

/// A store covering all four kinds.
///
/// Blanket-implemented for every type that implements the per-kind traits.
/// `Sync` is required so snapshot reads can fan out across threads.
pub trait ConfigStore: CollectionStore + FlowStore + RoleStore + PolicyStore + Sync {}

impl<T> ConfigStore for T where T: CollectionStore + FlowStore + RoleStore + PolicyStore + Sync {}
