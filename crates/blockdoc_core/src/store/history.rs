//! Undo/redo history for local mutations.
//!
//! # Invariants
//! - Entries recorded between two `capture` calls form one undo unit.
//! - Recording a new entry invalidates the redo stack.
//! - `max_levels == 0` keeps every unit.

use crate::model::block::BlockId;
use crate::model::props::{PropMap, PropValue};
use crate::model::snapshot::BlockSnapshot;
use std::collections::BTreeMap;

/// Values replaced by a patch; `None` marks a field that was absent.
pub(crate) type PriorValues = BTreeMap<String, Option<PropValue>>;

/// One reversible store mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HistoryEntry {
    /// Subtree inserted at `index` under the first image's parent.
    /// Images are in pre-order.
    Added {
        subtree: Vec<BlockSnapshot>,
        index: usize,
    },
    /// Subtree removed from `index` under the first image's parent.
    Removed {
        subtree: Vec<BlockSnapshot>,
        index: usize,
    },
    /// Property patch with the values it replaced.
    Updated {
        id: BlockId,
        before: PriorValues,
        after: PropMap,
    },
}

/// Entries undone and redone together, in application order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct UndoUnit {
    pub(crate) entries: Vec<HistoryEntry>,
}

#[derive(Debug)]
pub(crate) struct History {
    undo_stack: Vec<UndoUnit>,
    redo_stack: Vec<UndoUnit>,
    current: Option<UndoUnit>,
    max_levels: usize,
}

impl History {
    pub(crate) fn new(max_levels: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            current: None,
            max_levels,
        }
    }

    pub(crate) fn record(&mut self, entry: HistoryEntry) {
        self.current.get_or_insert_with(UndoUnit::default).entries.push(entry);
        self.redo_stack.clear();
    }

    /// Closes the open unit, if any.
    pub(crate) fn capture(&mut self) {
        if let Some(unit) = self.current.take() {
            if !unit.entries.is_empty() {
                self.undo_stack.push(unit);
                if self.max_levels > 0 && self.undo_stack.len() > self.max_levels {
                    self.undo_stack.remove(0);
                }
            }
        }
    }

    pub(crate) fn take_undo(&mut self) -> Option<UndoUnit> {
        self.capture();
        self.undo_stack.pop()
    }

    pub(crate) fn take_redo(&mut self) -> Option<UndoUnit> {
        self.capture();
        self.redo_stack.pop()
    }

    pub(crate) fn push_undone(&mut self, unit: UndoUnit) {
        self.redo_stack.push(unit);
    }

    pub(crate) fn push_redone(&mut self, unit: UndoUnit) {
        self.undo_stack.push(unit);
    }

    pub(crate) fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
            || self
                .current
                .as_ref()
                .is_some_and(|unit| !unit.entries.is_empty())
    }

    pub(crate) fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Number of closed undo units.
    #[cfg(test)]
    pub(crate) fn undo_levels(&self) -> usize {
        self.undo_stack.len()
    }

    pub(crate) fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.current = None;
    }
}
