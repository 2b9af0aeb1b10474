//! Progress reporting
//!
//! The engine reports progress through [`ProgressCallback`] so it can be
//! driven without depending on a specific terminal UI.

use crate::executor::ItemOutcome;
use crate::types::{Kind, SelectionId};

/// Progress callback for apply operations
///
/// Implement this trait to receive progress updates while items are applied.
pub trait ProgressCallback: Send {
    /// Called before the items of one kind are applied
    fn on_kind_start(&mut self, kind: Kind, count: usize);

    /// Called when starting to apply a single item
    fn on_item_start(&mut self, id: &SelectionId, label: &str);

    /// Called when an item completes, successfully or not
    fn on_item_complete(&mut self, id: &SelectionId, outcome: &ItemOutcome);

    /// Called after the last item of a kind
    fn on_kind_complete(&mut self, kind: Kind);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_kind_start(&mut self, _kind: Kind, _count: usize) {}
    fn on_item_start(&mut self, _id: &SelectionId, _label: &str) {}
    fn on_item_complete(&mut self, _id: &SelectionId, _outcome: &ItemOutcome) {}
    fn on_kind_complete(&mut self, _kind: Kind) {}
}

/// Progress callback that records events, for tests and logs.
#[derive(Debug, Default)]
pub struct RecordingProgress {
    pub events: Vec<String>,
}

impl ProgressCallback for RecordingProgress {
    fn on_kind_start(&mut self, kind: Kind, count: usize) {
        self.events.push(format!("start {kind} ({count})"));
    }

    fn on_item_start(&mut self, id: &SelectionId, _label: &str) {
        self.events.push(format!("item {id}"));
    }

    fn on_item_complete(&mut self, id: &SelectionId, outcome: &ItemOutcome) {
        self.events.push(format!("done {id}: {outcome}"));
    }

    fn on_kind_complete(&mut self, kind: Kind) {
        self.events.push(format!("end {kind}"));
    }
}
