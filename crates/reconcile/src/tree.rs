//! Selectable four-category tree.
//!
//! A tree has one category node per kind, in [`Kind::TREE_ORDER`], each
//! holding item nodes whose ids are selection ids (`collection:articles`).
//! A category is checked exactly when at least one of its items is.

use crate::snapshot::Snapshot;
use crate::types::{Kind, ManifestItem, Selection, SelectionId};
use serde::Serialize;
use serde_json::Value;

/// Node role in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Category,
    Item,
}

/// Classification of a manifest item against the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportStatus {
    New,
    Unchanged,
    Modified,
    Missing,
}

/// Classification of an item across a local and a remote instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Comparison {
    Identical,
    Different,
    LocalOnly,
    RemoteOnly,
}

impl Comparison {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Identical => "identical",
            Self::Different => "different",
            Self::LocalOnly => "local-only",
            Self::RemoteOnly => "remote-only",
        }
    }
}

/// What an item node stands for.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Item(ManifestItem),
    Entity(Value),
}

/// One node of the tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeNode {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub checked: bool,
    pub expanded: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ImportStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparison: Option<Comparison>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diff: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
}

impl TreeNode {
    /// An item node.
    pub fn item(id: &SelectionId, name: impl Into<String>, checked: bool) -> Self {
        Self {
            id: id.to_string(),
            name: name.into(),
            node_type: NodeType::Item,
            checked,
            expanded: false,
            children: Vec::new(),
            status: None,
            comparison: None,
            diff: Vec::new(),
            payload: None,
        }
    }

    /// A category node for `kind`, checked iff any child is.
    pub fn category(kind: Kind, children: Vec<Self>) -> Self {
        Self {
            id: kind.category_id().to_string(),
            name: kind.category_name().to_string(),
            node_type: NodeType::Category,
            checked: children.iter().any(|c| c.checked),
            expanded: true,
            children,
            status: None,
            comparison: None,
            diff: Vec::new(),
            payload: None,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: ImportStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn with_comparison(mut self, comparison: Comparison) -> Self {
        self.comparison = Some(comparison);
        self
    }

    #[must_use]
    pub fn with_diff(mut self, diff: Vec<String>) -> Self {
        self.diff = diff;
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn is_category(&self) -> bool {
        self.node_type == NodeType::Category
    }
}

/// The category nodes of a tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Tree {
    categories: Vec<TreeNode>,
}

impl Tree {
    pub fn new(categories: Vec<TreeNode>) -> Self {
        Self { categories }
    }

    pub fn categories(&self) -> &[TreeNode] {
        &self.categories
    }

    /// Item nodes in tree order.
    pub fn items(&self) -> impl Iterator<Item = &TreeNode> {
        self.categories.iter().flat_map(|c| c.children.iter())
    }

    /// Find a category or item node by id.
    pub fn find(&self, id: &str) -> Option<&TreeNode> {
        self.categories
            .iter()
            .find(|c| c.id == id)
            .or_else(|| self.items().find(|n| n.id == id))
    }

    /// Check or uncheck a node. Returns `false` if no node has this id.
    ///
    /// Checking a category cascades to all its items; checking an item
    /// recomputes its category.
    pub fn set_checked(&mut self, id: &str, checked: bool) -> bool {
        for category in &mut self.categories {
            if category.id == id {
                for child in &mut category.children {
                    child.checked = checked;
                }
                category.checked = category.children.iter().any(|c| c.checked);
                return true;
            }
            if let Some(child) = category.children.iter_mut().find(|c| c.id == id) {
                child.checked = checked;
                category.checked = category.children.iter().any(|c| c.checked);
                return true;
            }
        }
        false
    }

    /// Ids of checked items in tree order.
    pub fn selected_ids(&self) -> Vec<String> {
        self.items()
            .filter(|n| n.checked)
            .map(|n| n.id.clone())
            .collect()
    }

    /// Checked items as a selection.
    pub fn selection(&self) -> Selection {
        Selection::parse(self.selected_ids())
    }

    pub fn item_count(&self) -> usize {
        self.items().count()
    }
}

/// Build the selectable tree of a snapshot. Every item starts checked.
pub fn build_tree(snapshot: &Snapshot) -> Tree {
    let categories = Kind::TREE_ORDER
        .iter()
        .map(|kind| {
            let children = snapshot
                .entities(*kind)
                .iter()
                .map(|entity| {
                    TreeNode::item(&SelectionId::new(*kind, &entity.id), &entity.name, true)
                        .with_payload(Payload::Entity(entity.data.clone()))
                })
                .collect();
            TreeNode::category(*kind, children)
        })
        .collect();
    Tree::new(categories)
}
