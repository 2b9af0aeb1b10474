//! Apply engine - writes selected items to a target store
//!
//! Every item is applied on its own: its existence is probed, it is created
//! or updated, and any failure is recorded against its kind before moving on
//! to the next item. Nothing is rolled back.

use crate::context::ProgressCallback;
use crate::error::Result;
use crate::planner::{ApplyPlan, FlowPlan, PlannedItem};
use crate::store::ConfigStore;
use crate::types::{
    CollectionItem, FlowItem, Kind, Manifest, ManifestItem, PolicyItem, RoleItem, Selection,
    SelectionId, entity_id,
};
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Which way items travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Manifest to local store.
    Import,
    /// Local store to remote store.
    Push,
    /// Remote store to local store.
    Pull,
}

impl Direction {
    /// How existing fields are updated in this direction.
    pub fn field_policy(&self) -> FieldPolicy {
        match self {
            Self::Import | Self::Push => FieldPolicy::Full,
            Self::Pull => FieldPolicy::MetaOnly,
        }
    }

    /// Past-tense verb for updated items.
    pub fn updated_verb(&self) -> &'static str {
        match self {
            Self::Import => "updated",
            Self::Push => "pushed",
            Self::Pull => "pulled",
        }
    }
}

/// How existing fields are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPolicy {
    /// Type, meta and schema.
    Full,
    /// Meta only; skipped when the source field has no meta.
    MetaOnly,
}

/// Result of applying one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Created,
    Updated,
    Failed { error: String },
}

impl ItemOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }
}

impl fmt::Display for ItemOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => f.write_str("created"),
            Self::Updated => f.write_str("updated"),
            Self::Failed { error } => write!(f, "failed: {error}"),
        }
    }
}

/// A failed item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemError {
    pub item: String,
    pub message: String,
}

/// Per-kind tallies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KindReport {
    pub created: usize,
    pub updated: usize,
    pub errors: Vec<ItemError>,
}

impl KindReport {
    fn record(&mut self, label: &str, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::Created => self.created += 1,
            ItemOutcome::Updated => self.updated += 1,
            ItemOutcome::Failed { error } => self.errors.push(ItemError {
                item: label.to_string(),
                message: error.clone(),
            }),
        }
    }
}

/// Result of one import, push or pull.
///
/// `success` is true whenever the request itself was valid; item failures
/// are only reported through each kind's `errors`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub success: bool,
    pub direction: Direction,
    pub collections: KindReport,
    pub roles: KindReport,
    pub policies: KindReport,
    pub flows: KindReport,
}

impl ApplyReport {
    pub fn new(direction: Direction) -> Self {
        Self {
            success: true,
            direction,
            collections: KindReport::default(),
            roles: KindReport::default(),
            policies: KindReport::default(),
            flows: KindReport::default(),
        }
    }

    pub fn kind(&self, kind: Kind) -> &KindReport {
        match kind {
            Kind::Collection => &self.collections,
            Kind::Flow => &self.flows,
            Kind::Role => &self.roles,
            Kind::Policy => &self.policies,
        }
    }

    fn kind_mut(&mut self, kind: Kind) -> &mut KindReport {
        match kind {
            Kind::Collection => &mut self.collections,
            Kind::Flow => &mut self.flows,
            Kind::Role => &mut self.roles,
            Kind::Policy => &mut self.policies,
        }
    }

    pub fn created(&self) -> usize {
        Kind::APPLY_ORDER.iter().map(|k| self.kind(*k).created).sum()
    }

    pub fn updated(&self) -> usize {
        Kind::APPLY_ORDER.iter().map(|k| self.kind(*k).updated).sum()
    }

    pub fn error_count(&self) -> usize {
        Kind::APPLY_ORDER.iter().map(|k| self.kind(*k).errors.len()).sum()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }
}

// =============================================================================
// Entry points
// =============================================================================

/// Apply the selected manifest items to the local store.
///
/// # Errors
///
/// Returns an error only if the manifest is invalid; item failures are
/// reported in the returned [`ApplyReport`].
pub fn import_manifest<S, P>(
    target: &S,
    manifest: &Manifest,
    selection: &Selection,
    progress: &mut P,
) -> Result<ApplyReport>
where
    S: ConfigStore + ?Sized,
    P: ProgressCallback + ?Sized,
{
    manifest.validate()?;
    let plan = ApplyPlan::from_manifest(manifest, selection);
    Ok(apply_plan(target, &plan, Direction::Import, progress))
}

/// Copy the selected items from the local store to a remote store.
pub fn push<L, R, P>(local: &L, remote: &R, selection: &Selection, progress: &mut P) -> ApplyReport
where
    L: ConfigStore + ?Sized,
    R: ConfigStore + ?Sized,
    P: ProgressCallback + ?Sized,
{
    transfer(local, remote, selection, Direction::Push, progress)
}

/// Copy the selected items from a remote store to the local store.
///
/// Existing fields only get their meta updated.
pub fn pull<R, L, P>(remote: &R, local: &L, selection: &Selection, progress: &mut P) -> ApplyReport
where
    R: ConfigStore + ?Sized,
    L: ConfigStore + ?Sized,
    P: ProgressCallback + ?Sized,
{
    transfer(remote, local, selection, Direction::Pull, progress)
}

/// Apply planned items in order.
pub fn apply_plan<S, P>(
    target: &S,
    plan: &ApplyPlan,
    direction: Direction,
    progress: &mut P,
) -> ApplyReport
where
    S: ConfigStore + ?Sized,
    P: ProgressCallback + ?Sized,
{
    let mut report = ApplyReport::new(direction);
    for kind in Kind::APPLY_ORDER {
        let items: Vec<&PlannedItem> = plan.of_kind(kind).collect();
        if items.is_empty() {
            continue;
        }
        progress.on_kind_start(kind, items.len());
        for planned in items {
            let item = &planned.item;
            let id = item.selection_id();
            progress.on_item_start(&id, item.label());
            let outcome = apply_item(target, item, direction.field_policy());
            report.kind_mut(kind).record(item.label(), &outcome);
            progress.on_item_complete(&id, &outcome);
        }
        progress.on_kind_complete(kind);
    }
    report
}

fn transfer<S, T, P>(
    source: &S,
    target: &T,
    selection: &Selection,
    direction: Direction,
    progress: &mut P,
) -> ApplyReport
where
    S: ConfigStore + ?Sized,
    T: ConfigStore + ?Sized,
    P: ProgressCallback + ?Sized,
{
    let mut report = ApplyReport::new(direction);
    for kind in Kind::APPLY_ORDER {
        let ids = selection.of_kind(kind);
        if ids.is_empty() {
            continue;
        }
        progress.on_kind_start(kind, ids.len());
        for identity in ids {
            let id = SelectionId::new(kind, identity);
            let (label, outcome) = match read_item(source, kind, identity) {
                Ok(item) => {
                    progress.on_item_start(&id, item.label());
                    let outcome = apply_item(target, &item, direction.field_policy());
                    (item.label().to_string(), outcome)
                }
                Err(e) => {
                    progress.on_item_start(&id, identity);
                    log::warn!("Failed to read {id} from source: {e}");
                    (identity.to_string(), ItemOutcome::Failed { error: e.to_string() })
                }
            };
            report.kind_mut(kind).record(&label, &outcome);
            progress.on_item_complete(&id, &outcome);
        }
        progress.on_kind_complete(kind);
    }
    report
}

/// Read one item in full: collection with fields, flow with operations,
/// policy with permissions and attached roles.
pub fn read_item<S: ConfigStore + ?Sized>(store: &S, kind: Kind, identity: &str) -> Result<ManifestItem> {
    match kind {
        Kind::Collection => {
            let raw = store.read_collection(identity)?;
            let fields = store.list_fields(identity)?;
            Ok(ManifestItem::Collection(CollectionItem::from_entity(raw, fields)?))
        }
        Kind::Flow => {
            let raw = store.read_flow(identity)?;
            let operations = store.list_operations(identity)?;
            Ok(ManifestItem::Flow(FlowItem::from_entity(raw, operations)?))
        }
        Kind::Role => Ok(ManifestItem::Role(serde_json::from_value(store.read_role(identity)?)?)),
        Kind::Policy => {
            let raw = store.read_policy(identity)?;
            let permissions = store.list_permissions(identity)?;
            let roles = store.read_policy_roles(identity).unwrap_or_else(|e| {
                log::warn!("Failed to read roles of policy {identity}: {e}");
                Vec::new()
            });
            Ok(ManifestItem::Policy(PolicyItem::from_entity(raw, permissions, roles)?))
        }
    }
}

/// Read the selected items into a new manifest.
///
/// Any read failure aborts the export.
pub fn export_manifest<S: ConfigStore + ?Sized>(store: &S, selection: &Selection) -> Result<Manifest> {
    let mut manifest = Manifest::new();
    for kind in Kind::TREE_ORDER {
        for identity in selection.of_kind(kind) {
            manifest.push(read_item(store, kind, identity)?);
        }
    }
    log::info!("Exported {} item(s)", manifest.len());
    Ok(manifest)
}

// =============================================================================
// Per-item apply
// =============================================================================

fn apply_item<S: ConfigStore + ?Sized>(target: &S, item: &ManifestItem, fields: FieldPolicy) -> ItemOutcome {
    let result = match item {
        ManifestItem::Collection(c) => apply_collection(target, c, fields),
        ManifestItem::Role(r) => apply_role(target, r),
        ManifestItem::Policy(p) => apply_policy(target, p),
        ManifestItem::Flow(f) => apply_flow(target, f),
    };
    match result {
        Ok(outcome) => {
            log::info!("{}: {outcome}", item.selection_id());
            outcome
        }
        Err(e) => {
            log::warn!("{} failed: {e}", item.selection_id());
            ItemOutcome::Failed { error: e.to_string() }
        }
    }
}

/// Interpret an existence probe. Only not-found means absent.
fn exists(probe: Result<Value>) -> Result<bool> {
    match probe {
        Ok(_) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}

fn with_key(mut attributes: Value, key: &str, value: Value) -> Value {
    if let Some(map) = attributes.as_object_mut() {
        map.insert(key.to_string(), value);
    }
    attributes
}

fn apply_collection<S: ConfigStore + ?Sized>(
    target: &S,
    item: &CollectionItem,
    policy: FieldPolicy,
) -> Result<ItemOutcome> {
    let name = item.collection.as_str();
    if !exists(target.read_collection(name))? {
        let fields: Vec<Value> = item.fields.iter().map(|f| f.payload()).collect();
        target.create_collection(&serde_json::json!({
            "collection": name,
            "meta": item.meta,
            "schema": item.schema,
            "fields": fields,
        }))?;
        return Ok(ItemOutcome::Created);
    }

    target.update_collection(name, &serde_json::json!({ "meta": item.meta }))?;
    for field in &item.fields {
        if exists(target.read_field(name, &field.field))? {
            match policy {
                FieldPolicy::Full => target.update_field(name, &field.field, &field.payload())?,
                FieldPolicy::MetaOnly if field.meta.is_null() => {
                    log::debug!("{name}.{} has no meta, skipping", field.field);
                }
                FieldPolicy::MetaOnly => target.update_field_meta(name, &field.field, &field.meta)?,
            }
        } else {
            log::debug!("Creating field {name}.{}", field.field);
            target.create_field(name, &field.payload())?;
        }
    }
    Ok(ItemOutcome::Updated)
}

fn apply_role<S: ConfigStore + ?Sized>(target: &S, item: &RoleItem) -> Result<ItemOutcome> {
    if exists(target.read_role(&item.id))? {
        target.update_role(&item.id, &item.attributes())?;
        Ok(ItemOutcome::Updated)
    } else {
        target.create_role(&with_key(item.attributes(), "id", Value::String(item.id.clone())))?;
        Ok(ItemOutcome::Created)
    }
}

fn apply_policy<S: ConfigStore + ?Sized>(target: &S, item: &PolicyItem) -> Result<ItemOutcome> {
    let outcome = if exists(target.read_policy(&item.id))? {
        target.update_policy(&item.id, &item.attributes())?;
        for existing in target.list_permissions(&item.id)? {
            if let Some(id) = entity_id(&existing, "id") {
                target.delete_permission(&id)?;
            }
        }
        ItemOutcome::Updated
    } else {
        target.create_policy(&with_key(item.attributes(), "id", Value::String(item.id.clone())))?;
        ItemOutcome::Created
    };
    for permission in &item.permissions {
        target.create_permission(&permission.payload(&item.id))?;
    }
    Ok(outcome)
}

fn apply_flow<S: ConfigStore + ?Sized>(target: &S, item: &FlowItem) -> Result<ItemOutcome> {
    let plan = FlowPlan::build(item)?;

    let outcome = if exists(target.read_flow(&item.id))? {
        target.update_flow(&item.id, &item.attributes())?;
        for existing in target.list_operations(&item.id)? {
            if let Some(id) = entity_id(&existing, "id") {
                target.delete_operation(&id)?;
            }
        }
        ItemOutcome::Updated
    } else {
        target.create_flow(&with_key(item.attributes(), "id", Value::String(item.id.clone())))?;
        ItemOutcome::Created
    };

    for payload in plan.create_payloads() {
        target.create_operation(&payload)?;
    }
    for (id, patch) in plan.link_patches() {
        target.update_operation(id, &patch)?;
    }
    if let Some(patch) = plan.entry_patch() {
        target.update_flow(&item.id, &patch)?;
    }
    Ok(outcome)
}
