//! In-memory change journal feeding the persistence layer.

use crate::disposable::Disposable;
use crate::store::{ChangeEvent, DocStore, EventFilter};
use crate::watcher::Watcher;
use std::cell::RefCell;
use std::rc::Rc;

pub const CHANGE_JOURNAL_WATCHER: &str = "change-journal";

/// Records every delivered change event until drained.
///
/// Clones share one buffer, so a service can keep a handle while the
/// registry owns the attachment.
#[derive(Debug, Clone, Default)]
pub struct ChangeJournal {
    entries: Rc<RefCell<Vec<ChangeEvent>>>,
}

impl ChangeJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn entries(&self) -> Vec<ChangeEvent> {
        self.entries.borrow().clone()
    }

    /// Takes every recorded event, oldest first.
    pub fn drain(&self) -> Vec<ChangeEvent> {
        std::mem::take(&mut *self.entries.borrow_mut())
    }

    /// Drops the `count` oldest events.
    pub fn discard(&self, count: usize) {
        let mut entries = self.entries.borrow_mut();
        let count = count.min(entries.len());
        entries.drain(..count);
    }
}

impl Watcher for ChangeJournal {
    fn name(&self) -> &str {
        CHANGE_JOURNAL_WATCHER
    }

    fn attach(&self, store: &mut DocStore) -> Disposable {
        let entries = Rc::clone(&self.entries);
        store.subscribe(CHANGE_JOURNAL_WATCHER, EventFilter::all(), move |_, event| {
            entries.borrow_mut().push(event.clone());
            Ok(())
        })
    }
}
