//! Release handles for subscriptions and reactive computations.
//!
//! # Invariants
//! - `Disposable::dispose` is idempotent.
//! - Disposing never touches the store directly; registrations are flagged
//!   inactive and pruned by their owner on next use, so disposal is safe
//!   after the watched node (or the whole store) is gone.

use std::cell::Cell;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

/// Shared liveness flag between a registration and its owner.
#[derive(Debug, Clone)]
pub struct DisposeHandle(Rc<Cell<bool>>);

impl DisposeHandle {
    pub(crate) fn new() -> Self {
        Self(Rc::new(Cell::new(true)))
    }

    pub fn is_active(&self) -> bool {
        self.0.get()
    }

    pub(crate) fn release(&self) {
        self.0.set(false);
    }
}

/// Group of registrations released together.
#[must_use]
#[derive(Default)]
pub struct Disposable {
    handles: Vec<DisposeHandle>,
    teardown: Vec<Box<dyn FnOnce()>>,
    children: Vec<Disposable>,
    disposed: bool,
}

impl Disposable {
    pub fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn from_handle(handle: DisposeHandle) -> Self {
        Self {
            handles: vec![handle],
            ..Self::default()
        }
    }

    /// Runs `teardown` once on first dispose.
    pub fn on_dispose(teardown: impl FnOnce() + 'static) -> Self {
        Self {
            teardown: vec![Box::new(teardown)],
            ..Self::default()
        }
    }

    /// Adopts `other`; it is released together with `self`.
    ///
    /// Adopting into an already disposed group releases `other` immediately.
    pub fn add(&mut self, mut other: Disposable) {
        if self.disposed {
            other.dispose();
            return;
        }
        self.children.push(other);
    }

    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        for handle in self.handles.drain(..) {
            handle.release();
        }
        for mut child in self.children.drain(..) {
            child.dispose();
        }
        for teardown in self.teardown.drain(..) {
            teardown();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl Debug for Disposable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disposable")
            .field("handles", &self.handles.len())
            .field("teardown", &self.teardown.len())
            .field("children", &self.children.len())
            .field("disposed", &self.disposed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{Disposable, DisposeHandle};
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn dispose_is_idempotent() {
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let handle = DisposeHandle::new();
        let mut disposable = Disposable::from_handle(handle.clone());
        disposable.add(Disposable::on_dispose(move || counter.set(counter.get() + 1)));

        disposable.dispose();
        disposable.dispose();

        assert!(!handle.is_active());
        assert_eq!(calls.get(), 1);
        assert!(disposable.is_disposed());
    }

    #[test]
    fn adopting_into_disposed_group_releases_immediately() {
        let mut parent = Disposable::empty();
        parent.dispose();

        let handle = DisposeHandle::new();
        parent.add(Disposable::from_handle(handle.clone()));
        assert!(!handle.is_active());
    }
}
