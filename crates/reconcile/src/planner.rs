//! Apply planning - orders selected items and sequences flow operations

use crate::error::{Error, Result};
use crate::types::{FlowItem, Kind, Manifest, ManifestItem, Selection, SelectionId};
use serde_json::Value;
use std::collections::HashSet;

/// Write sequence for one flow's operation graph.
///
/// Operations reference each other through `resolve`/`reject`, possibly in
/// both directions, so they are written in phases: create every operation
/// unlinked, then patch the links, then point the flow at its entry.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowPlan<'a> {
    pub flow: &'a FlowItem,
    /// The operation no other operation resolves or rejects to.
    pub entry: Option<&'a str>,
}

impl<'a> FlowPlan<'a> {
    /// Validate the operation graph and find its entry.
    ///
    /// # Errors
    ///
    /// - `Error::DanglingReference` if a transition targets an operation
    ///   outside the flow.
    /// - `Error::NoUniqueEntry` if zero or several operations have no
    ///   incoming transition.
    pub fn build(flow: &'a FlowItem) -> Result<Self> {
        let ids: HashSet<&str> = flow.operations.iter().map(|op| op.id.as_str()).collect();
        let mut targeted = HashSet::new();
        for op in &flow.operations {
            for (via, target) in op.transitions() {
                if !ids.contains(target) {
                    return Err(Error::DanglingReference {
                        operation: op.id.clone(),
                        via,
                        target: target.to_string(),
                    });
                }
                targeted.insert(target);
            }
        }

        if flow.operations.is_empty() {
            return Ok(Self { flow, entry: None });
        }

        let candidates: Vec<&str> = flow
            .operations
            .iter()
            .map(|op| op.id.as_str())
            .filter(|id| !targeted.contains(id))
            .collect();
        match candidates.as_slice() {
            [entry] => Ok(Self {
                flow,
                entry: Some(*entry),
            }),
            _ => Err(Error::NoUniqueEntry {
                flow: flow.id.clone(),
                candidates: candidates.iter().map(|c| (*c).to_string()).collect(),
            }),
        }
    }

    /// Phase (a): operation payloads without `resolve`/`reject`.
    pub fn create_payloads(&self) -> Vec<Value> {
        self.flow
            .operations
            .iter()
            .map(|op| op.unlinked_payload(&self.flow.id))
            .collect()
    }

    /// Phase (b): `(operation id, patch)` for every operation with a transition.
    pub fn link_patches(&self) -> Vec<(&'a str, Value)> {
        self.flow
            .operations
            .iter()
            .filter(|op| op.resolve.is_some() || op.reject.is_some())
            .map(|op| {
                let mut patch = serde_json::Map::new();
                if let Some(resolve) = &op.resolve {
                    patch.insert("resolve".into(), Value::String(resolve.clone()));
                }
                if let Some(reject) = &op.reject {
                    patch.insert("reject".into(), Value::String(reject.clone()));
                }
                (op.id.as_str(), Value::Object(patch))
            })
            .collect()
    }

    /// Phase (c): the flow patch pointing at the entry operation.
    pub fn entry_patch(&self) -> Option<Value> {
        self.entry.map(|id| serde_json::json!({ "operation": id }))
    }
}

/// One item of an apply plan.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedItem {
    pub item: ManifestItem,
    /// Entry operation (flows only).
    pub entry: Option<String>,
    /// Validation failure that will fail this item before any write.
    pub problem: Option<String>,
}

impl PlannedItem {
    pub fn new(item: ManifestItem) -> Self {
        let (entry, problem) = match &item {
            ManifestItem::Flow(flow) => match FlowPlan::build(flow) {
                Ok(plan) => (plan.entry.map(str::to_string), None),
                Err(e) => (None, Some(e.to_string())),
            },
            _ => (None, None),
        };
        Self {
            item,
            entry,
            problem,
        }
    }
}

/// Selected items in apply order: collections, roles, policies, flows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyPlan {
    pub items: Vec<PlannedItem>,
    /// Selected ids the manifest does not contain.
    pub missing: Vec<SelectionId>,
}

impl ApplyPlan {
    /// Plan the selected items of a manifest.
    ///
    /// Within a kind, items keep selection order.
    pub fn from_manifest(manifest: &Manifest, selection: &Selection) -> Self {
        let mut plan = Self::default();
        for kind in Kind::APPLY_ORDER {
            for identity in selection.of_kind(kind) {
                match manifest.item(kind, identity) {
                    Some(item) => plan.items.push(PlannedItem::new(item)),
                    None => {
                        log::warn!("{kind}:{identity} is selected but not in the manifest");
                        plan.missing.push(SelectionId::new(kind, identity));
                    }
                }
            }
        }
        plan
    }

    /// Items of one kind, in order.
    pub fn of_kind(&self, kind: Kind) -> impl Iterator<Item = &PlannedItem> {
        self.items.iter().filter(move |p| p.item.kind() == kind)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items that will fail validation.
    pub fn problems(&self) -> impl Iterator<Item = &PlannedItem> {
        self.items.iter().filter(|p| p.problem.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OperationItem, RoleItem};

    fn op(id: &str, resolve: Option<&str>, reject: Option<&str>) -> OperationItem {
        OperationItem {
            id: id.into(),
            name: Some(id.to_uppercase()),
            key: id.into(),
            operation_type: "log".into(),
            position_x: 19,
            position_y: 1,
            options: Value::Null,
            resolve: resolve.map(Into::into),
            reject: reject.map(Into::into),
        }
    }

    fn flow(operations: Vec<OperationItem>) -> FlowItem {
        FlowItem {
            id: "f1".into(),
            name: "Flow".into(),
            icon: None,
            color: None,
            description: None,
            status: "active".into(),
            trigger: Some("manual".into()),
            accountability: None,
            options: Value::Null,
            operations,
        }
    }

    #[test]
    fn test_entry_is_unique_root() {
        let f = flow(vec![op("b", None, None), op("a", Some("b"), None)]);
        let plan = FlowPlan::build(&f).unwrap();
        assert_eq!(plan.entry, Some("a"));
        assert_eq!(plan.entry_patch(), Some(serde_json::json!({"operation": "a"})));
    }

    #[test]
    fn test_mutual_references_with_root() {
        let f = flow(vec![
            op("a", Some("b"), Some("c")),
            op("b", Some("c"), None),
            op("c", None, Some("b")),
        ]);
        let plan = FlowPlan::build(&f).unwrap();
        assert_eq!(plan.entry, Some("a"));
        let links = plan.link_patches();
        assert_eq!(links.len(), 3);
        assert_eq!(links[0], ("a", serde_json::json!({"resolve": "b", "reject": "c"})));
        assert!(plan.create_payloads().iter().all(|p| p.get("resolve").is_none()));
    }

    #[test]
    fn test_two_roots_are_rejected() {
        let f = flow(vec![op("a", None, None), op("b", None, None)]);
        match FlowPlan::build(&f) {
            Err(Error::NoUniqueEntry { flow, candidates }) => {
                assert_eq!(flow, "f1");
                assert_eq!(candidates, vec!["a", "b"]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_full_cycle_is_rejected() {
        let f = flow(vec![op("a", Some("b"), None), op("b", Some("a"), None)]);
        assert!(matches!(
            FlowPlan::build(&f),
            Err(Error::NoUniqueEntry { ref candidates, .. }) if candidates.is_empty()
        ));
    }

    #[test]
    fn test_dangling_reference_is_rejected() {
        let f = flow(vec![op("a", None, Some("zz"))]);
        assert!(matches!(
            FlowPlan::build(&f),
            Err(Error::DanglingReference { via: "reject", .. })
        ));
    }

    #[test]
    fn test_empty_flow_has_no_entry() {
        let f = flow(vec![]);
        let plan = FlowPlan::build(&f).unwrap();
        assert_eq!(plan.entry, None);
        assert!(plan.entry_patch().is_none());
    }

    #[test]
    fn test_apply_plan_orders_kinds() {
        let mut manifest = Manifest::new();
        manifest.push(ManifestItem::Flow(flow(vec![op("a", None, None)])));
        manifest.push(ManifestItem::Role(RoleItem {
            id: "r1".into(),
            name: "Editor".into(),
            icon: None,
            description: None,
            parent: None,
        }));
        let selection = Selection::parse(["flow:f1", "role:r1", "policy:gone"]);
        let plan = ApplyPlan::from_manifest(&manifest, &selection);

        let kinds: Vec<Kind> = plan.items.iter().map(|p| p.item.kind()).collect();
        assert_eq!(kinds, vec![Kind::Role, Kind::Flow]);
        assert_eq!(plan.items[1].entry.as_deref(), Some("a"));
        assert_eq!(plan.missing, vec![SelectionId::new(Kind::Policy, "gone")]);
        assert_eq!(plan.problems().count(), 0);
    }
}
