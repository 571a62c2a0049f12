//! Host capabilities injected into view bindings.
//!
//! Bindings receive a `HostServices` bundle at construction instead of
//! looking services up by key at use time.

use crate::selection::SelectionManager;
use crate::task::{DetachedTaskError, DetachedTasks};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorMode {
    /// Linear document editing.
    Page,
    /// Freeform canvas editing.
    Edgeless,
}

pub trait DocModeProvider {
    fn editor_mode(&self) -> EditorMode;
}

/// Mode provider with a switchable mode.
#[derive(Debug)]
pub struct FixedDocMode(Cell<EditorMode>);

impl FixedDocMode {
    pub fn new(mode: EditorMode) -> Self {
        Self(Cell::new(mode))
    }

    pub fn set(&self, mode: EditorMode) {
        self.0.set(mode);
    }
}

impl DocModeProvider for FixedDocMode {
    fn editor_mode(&self) -> EditorMode {
        self.0.get()
    }
}

/// Plays the check feedback for a todo item.
pub trait FeedbackPlayer {
    fn play_check(&self, block_id: &str) -> Result<(), DetachedTaskError>;
}

/// Feedback player for headless hosts.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopFeedback;

impl FeedbackPlayer for NoopFeedback {
    fn play_check(&self, _block_id: &str) -> Result<(), DetachedTaskError> {
        Ok(())
    }
}

/// Services a view binding depends on.
#[derive(Clone)]
pub struct HostServices {
    pub mode: Rc<dyn DocModeProvider>,
    pub feedback: Rc<dyn FeedbackPlayer>,
    pub selection: Rc<RefCell<SelectionManager>>,
    /// Queue for side work that must not block a mutation.
    pub tasks: Rc<RefCell<DetachedTasks>>,
}

impl HostServices {
    pub fn new(
        mode: Rc<dyn DocModeProvider>,
        feedback: Rc<dyn FeedbackPlayer>,
        selection: Rc<RefCell<SelectionManager>>,
        tasks: Rc<RefCell<DetachedTasks>>,
    ) -> Self {
        Self {
            mode,
            feedback,
            selection,
            tasks,
        }
    }

    /// Page mode, silent feedback, fresh selection and task queue.
    pub fn headless() -> Self {
        Self::new(
            Rc::new(FixedDocMode::new(EditorMode::Page)),
            Rc::new(NoopFeedback),
            Rc::new(RefCell::new(SelectionManager::new())),
            Rc::new(RefCell::new(DetachedTasks::new())),
        )
    }
}
