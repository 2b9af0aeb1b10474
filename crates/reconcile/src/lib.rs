//! # Reconcile
//!
//! Configuration reconciliation between content-management instances.
//!
//! This crate compares and copies four kinds of configuration (collections
//! with their fields, flows with their operations, roles, and policies with
//! their permissions) between a local instance and either an exported
//! manifest or a remote instance.
//!
//! ## Core Concepts
//!
//! - **Snapshot**: everything one instance holds, read with concurrent fan-out
//! - **Manifest**: a portable, versioned export of selected items
//! - **Normalization**: stripping instance-specific keys before comparing
//! - **Comparison**: classifying items as new/unchanged/modified (manifest)
//!   or local-only/remote-only/identical/different (remote)
//! - **Apply**: idempotent create-or-update of selected items, in the order
//!   collections, roles, policies, flows
//!
//! ## Example
//!
//! ```
//! use reconcile::store::MemoryStore;
//! use reconcile::{Manifest, NoProgress, Selection, compare_manifest_against_local, import_manifest};
//!
//! let local = MemoryStore::new();
//! let manifest = Manifest::from_json(
//!     r#"{"version": "1.0.0", "exportedAt": "2024-05-01T10:00:00Z",
//!         "contents": {"roles": [{"id": "r1", "name": "Editor"}]}}"#,
//! )?;
//!
//! let comparison = compare_manifest_against_local(&local, &manifest)?;
//! assert_eq!(comparison.summary.new, 1);
//!
//! let selection = Selection::parse(comparison.tree.selected_ids());
//! let report = import_manifest(&local, &manifest, &selection, &mut NoProgress)?;
//! assert_eq!(report.roles.created, 1);
//! # Ok::<(), reconcile::Error>(())
//! ```
//!
//! ## Stores
//!
//! The engine only talks to the per-kind traits in [`store`]. Use
//! [`store::RestStore`] for a live instance and [`store::MemoryStore`] for
//! tests.

pub mod context;
pub mod diff;
pub mod error;
pub mod executor;
pub mod normalize;
pub mod planner;
pub mod snapshot;
pub mod store;
pub mod tree;
pub mod types;

// Re-export main types at crate root
pub use context::{NoProgress, ProgressCallback, RecordingProgress};
pub use diff::{
    ImportComparison, ImportSummary, RemoteComparison, RemoteSummary, SyncEntry,
    compare_local_and_remote, compare_manifest_against_local, compare_snapshots, scan,
};
pub use error::{Error, ErrorCategory, Result};
pub use executor::{
    ApplyReport, Direction, FieldPolicy, ItemError, ItemOutcome, KindReport, apply_plan,
    export_manifest, import_manifest, pull, push, read_item,
};
pub use normalize::{equivalent, normalize};
pub use planner::{ApplyPlan, FlowPlan, PlannedItem};
pub use snapshot::{Entity, Snapshot};
pub use store::ConfigStore;
pub use tree::{Comparison, ImportStatus, NodeType, Payload, Tree, TreeNode, build_tree};
pub use types::{
    CollectionItem, FieldItem, FlowItem, Kind, MANIFEST_VERSION, Manifest, ManifestContents,
    ManifestItem, OperationItem, PermissionItem, PolicyItem, RoleItem, Selection, SelectionId,
};
