//! Controller for one list block.
//!
//! # Invariants
//! - On a read-only document, collapse state lives only in a local cell and
//!   never reaches the document.
//! - Every document write starts a new undo unit.
//! - The check feedback runs as a detached task; its failure never affects
//!   the toggle that spawned it.

use crate::binding::BindingError;
use crate::disposable::Disposable;
use crate::model::block::{flavours, BlockId, ListType};
use crate::model::props::{fields, PropPatch};
use crate::reactive::{LocalSignal, PropSignal};
use crate::selection::{Selection, SelectionKind, SelectionPayload};
use crate::services::{EditorMode, HostServices};
use crate::store::{DocStore, StoreError};
use log::debug;
use std::rc::Rc;

pub const CHECK_FEEDBACK_TASK: &str = "list-check-feedback";

/// Result of a click on the list icon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IconClickOutcome {
    Toggled { collapsed: bool },
    Checked { checked: bool },
    Selected,
    /// Todo click on a read-only document.
    Ignored,
}

pub struct ListBlockController {
    block_id: BlockId,
    services: HostServices,
    readonly_collapsed: LocalSignal<bool>,
    disposables: Disposable,
}

impl ListBlockController {
    /// Binds to an existing list block and starts mirroring `collapsed`.
    pub fn connect(
        store: &mut DocStore,
        block_id: BlockId,
        services: HostServices,
    ) -> Result<Self, BindingError> {
        let block = store
            .get_element_by_id(&block_id)
            .ok_or_else(|| StoreError::NotFound(block_id.clone()))?;
        if block.flavour() != flavours::LIST {
            return Err(BindingError::WrongFlavour {
                id: block_id.clone(),
                flavour: block.flavour().to_string(),
            });
        }

        let (readonly_collapsed, mut disposables) = store.scoped_local_signal(false);
        let collapsed = PropSignal::<bool>::new(block_id.clone(), fields::COLLAPSED);
        disposables.add(store.effect(&format!("list-collapsed:{block_id}"), move |cx| {
            if let Some(value) = collapsed.value(cx) {
                readonly_collapsed.set(cx.store(), value);
            }
            Ok(())
        }));

        Ok(Self {
            block_id,
            services,
            readonly_collapsed,
            disposables,
        })
    }

    pub fn block_id(&self) -> &BlockId {
        &self.block_id
    }

    /// Icon click: toggle collapses, todo checks, other types select.
    pub fn on_click_icon(&self, store: &mut DocStore) -> Result<IconClickOutcome, BindingError> {
        let list = store
            .get_element_by_id(&self.block_id)
            .and_then(|block| block.model().as_list())
            .ok_or_else(|| StoreError::NotFound(self.block_id.clone()))?;
        let (list_type, collapsed, checked) = (list.list_type, list.collapsed, list.checked);

        match list_type {
            ListType::Toggle => {
                let next = !self.is_collapsed_with(store, collapsed);
                self.set_collapsed(store, next)?;
                Ok(IconClickOutcome::Toggled { collapsed: next })
            }
            ListType::Todo => {
                if store.is_readonly() {
                    return Ok(IconClickOutcome::Ignored);
                }
                store.capture_sync();
                store.update_block(
                    &self.block_id,
                    PropPatch::new().set(fields::CHECKED, !checked),
                )?;
                let now_checked = PropSignal::<bool>::new(self.block_id.clone(), fields::CHECKED)
                    .peek(store)
                    .unwrap_or(false);
                if now_checked {
                    self.spawn_check_feedback();
                }
                Ok(IconClickOutcome::Checked {
                    checked: now_checked,
                })
            }
            ListType::Bulleted | ListType::Numbered => {
                self.select()?;
                Ok(IconClickOutcome::Selected)
            }
        }
    }

    /// Collapse toggle button.
    pub fn set_collapsed(&self, store: &mut DocStore, value: bool) -> Result<(), BindingError> {
        if store.is_readonly() {
            self.readonly_collapsed.set(store, value);
            return Ok(());
        }
        store.capture_sync();
        store.update_block(
            &self.block_id,
            PropPatch::new().set(fields::COLLAPSED, value),
        )?;
        Ok(())
    }

    /// Collapse state the view renders.
    pub fn is_collapsed(&self, store: &DocStore) -> bool {
        let stored = PropSignal::<bool>::new(self.block_id.clone(), fields::COLLAPSED)
            .peek(store)
            .unwrap_or(false);
        self.is_collapsed_with(store, stored)
    }

    fn is_collapsed_with(&self, store: &DocStore, stored: bool) -> bool {
        if store.is_readonly() {
            self.readonly_collapsed.peek(store).unwrap_or(stored)
        } else {
            stored
        }
    }

    /// Block hosting the editable region: the enclosing note in edgeless
    /// mode, the document root otherwise.
    pub fn top_contenteditable(&self, store: &DocStore) -> Option<BlockId> {
        match self.services.mode.editor_mode() {
            EditorMode::Edgeless => store
                .closest(&self.block_id, flavours::NOTE)
                .map(|note| note.id().clone()),
            EditorMode::Page => store.root().cloned(),
        }
    }

    /// Stops mirroring; safe to call repeatedly and after the block is gone.
    pub fn disconnect(&mut self) {
        self.disposables.dispose();
    }

    fn select(&self) -> Result<(), BindingError> {
        let mut selection = self.services.selection.borrow_mut();
        let block_selection = selection.create(
            SelectionKind::Block,
            SelectionPayload::Block {
                block_id: self.block_id.clone(),
            },
        )?;
        selection.update(|current| {
            current
                .iter()
                .filter(|existing| {
                    !existing.is(SelectionKind::Text) && !existing.is(SelectionKind::Block)
                })
                .cloned()
                .chain(std::iter::once(block_selection))
                .collect::<Vec<Selection>>()
        });
        Ok(())
    }

    fn spawn_check_feedback(&self) {
        let feedback = Rc::clone(&self.services.feedback);
        let block_id = self.block_id.to_string();
        self.services
            .tasks
            .borrow_mut()
            .spawn(CHECK_FEEDBACK_TASK, move || feedback.play_check(&block_id));
        debug!(
            "event=task_spawn module=binding status=ok task={} block_id={}",
            CHECK_FEEDBACK_TASK, self.block_id
        );
    }
}

impl Drop for ListBlockController {
    fn drop(&mut self) {
        self.disconnect();
    }
}
