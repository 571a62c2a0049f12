//! Selection state over heterogeneous block kinds.
//!
//! # Responsibility
//! - Hold the ordered selection sequence of one editor session.
//! - Build typed selection values from kind + payload.
//!
//! # Invariants
//! - `update` is the only mutation path; it replaces the whole sequence.
//! - Listeners are notified once per `update`, after replacement, so no
//!   intermediate sequence is ever observable.
//! - `create` has no side effects.

use crate::disposable::{Disposable, DisposeHandle};
use crate::model::block::BlockId;
use log::debug;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Caret position or span inside one block's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRange {
    pub block_id: BlockId,
    pub index: usize,
    pub length: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSelection {
    pub from: TextRange,
    /// End of a multi-block range.
    pub to: Option<TextRange>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSelection {
    pub block_id: BlockId,
}

/// Selection of surface elements inside one surface block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceSelection {
    pub block_id: BlockId,
    pub elements: Vec<BlockId>,
    pub editing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectionKind {
    Text,
    Block,
    Surface,
}

impl SelectionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Block => "block",
            Self::Surface => "surface",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Selection {
    Text(TextSelection),
    Block(BlockSelection),
    Surface(SurfaceSelection),
}

impl Selection {
    pub fn kind(&self) -> SelectionKind {
        match self {
            Self::Text(_) => SelectionKind::Text,
            Self::Block(_) => SelectionKind::Block,
            Self::Surface(_) => SelectionKind::Surface,
        }
    }

    pub fn is(&self, kind: SelectionKind) -> bool {
        self.kind() == kind
    }

    /// Block the selection starts in.
    pub fn block_id(&self) -> &BlockId {
        match self {
            Self::Text(text) => &text.from.block_id,
            Self::Block(block) => &block.block_id,
            Self::Surface(surface) => &surface.block_id,
        }
    }
}

/// Construction input for `SelectionManager::create`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionPayload {
    Text {
        from: TextRange,
        to: Option<TextRange>,
    },
    Block {
        block_id: BlockId,
    },
    Surface {
        block_id: BlockId,
        elements: Vec<BlockId>,
        editing: bool,
    },
}

impl SelectionPayload {
    fn kind(&self) -> SelectionKind {
        match self {
            Self::Text { .. } => SelectionKind::Text,
            Self::Block { .. } => SelectionKind::Block,
            Self::Surface { .. } => SelectionKind::Surface,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    /// Payload shape does not belong to the requested kind.
    KindMismatch {
        expected: SelectionKind,
        found: SelectionKind,
    },
    EmptyBlockId,
}

impl Display for SelectionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KindMismatch { expected, found } => write!(
                f,
                "selection payload is {}, expected {}",
                found.as_str(),
                expected.as_str()
            ),
            Self::EmptyBlockId => write!(f, "selection block id must not be empty"),
        }
    }
}

impl Error for SelectionError {}

type SelectionListener = Box<dyn FnMut(&[Selection])>;

/// Current selection sequence plus change listeners.
#[derive(Default)]
pub struct SelectionManager {
    current: Vec<Selection>,
    listeners: Vec<(DisposeHandle, SelectionListener)>,
}

impl SelectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self) -> &[Selection] {
        &self.current
    }

    pub fn find(&self, kind: SelectionKind) -> Option<&Selection> {
        self.current.iter().find(|selection| selection.is(kind))
    }

    pub fn filter(&self, kind: SelectionKind) -> Vec<&Selection> {
        self.current
            .iter()
            .filter(|selection| selection.is(kind))
            .collect()
    }

    /// Builds a selection value without touching the current sequence.
    pub fn create(
        &self,
        kind: SelectionKind,
        payload: SelectionPayload,
    ) -> Result<Selection, SelectionError> {
        if payload.kind() != kind {
            return Err(SelectionError::KindMismatch {
                expected: kind,
                found: payload.kind(),
            });
        }
        let selection = match payload {
            SelectionPayload::Text { from, to } => Selection::Text(TextSelection { from, to }),
            SelectionPayload::Block { block_id } => Selection::Block(BlockSelection { block_id }),
            SelectionPayload::Surface {
                block_id,
                elements,
                editing,
            } => Selection::Surface(SurfaceSelection {
                block_id,
                elements,
                editing,
            }),
        };
        if selection.block_id().as_str().is_empty() {
            return Err(SelectionError::EmptyBlockId);
        }
        Ok(selection)
    }

    /// Replaces the sequence with `transform(current)` and notifies once.
    pub fn update<F>(&mut self, transform: F)
    where
        F: FnOnce(&[Selection]) -> Vec<Selection>,
    {
        self.current = transform(&self.current);
        debug!(
            "event=selection_update module=selection status=ok size={}",
            self.current.len()
        );
        self.listeners.retain(|(handle, _)| handle.is_active());
        for (handle, listener) in self.listeners.iter_mut() {
            if handle.is_active() {
                listener(&self.current);
            }
        }
    }

    pub fn clear(&mut self) {
        self.update(|_| Vec::new());
    }

    /// Registers a listener called with the new sequence after each update.
    pub fn subscribe(&mut self, listener: impl FnMut(&[Selection]) + 'static) -> Disposable {
        let handle = DisposeHandle::new();
        self.listeners.push((handle.clone(), Box::new(listener)));
        Disposable::from_handle(handle)
    }
}
