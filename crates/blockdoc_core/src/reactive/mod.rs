//! Reactive value layer.
//!
//! # Responsibility
//! - Track which cells a computation reads through an explicit
//!   `EvalContext` and re-run it when any of them changes.
//! - Keep local (non-document) cells for view state.
//!
//! # Invariants
//! - Dependencies are recorded per run; a run replaces the previous set.
//! - A write marks dependents dirty only when the stored value changes.
//! - Dirty computations run in registration order, once per mark.
//! - The runtime never calls into the store; `DocStore` drives it.
//! - A released local cell reads as absent and is dropped on the next prune.

pub mod signal;

pub use signal::{LocalSignal, PropSignal};

use crate::disposable::DisposeHandle;
use crate::model::block::BlockId;
use crate::model::props::PropValue;
use crate::store::DocStore;
use crate::watcher::WatcherError;
use std::collections::{BTreeMap, BTreeSet, HashMap};

pub type EffectId = u64;

pub(crate) type EffectFn = Box<dyn FnMut(&mut EvalContext<'_>) -> Result<(), WatcherError>>;

/// Cell identity a computation can depend on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum DepKey {
    Prop(BlockId, String),
    Local(u64),
}

struct EffectSlot {
    name: String,
    handle: DisposeHandle,
    runner: Option<EffectFn>,
    deps: Vec<DepKey>,
}

/// Dependency graph and dirty set owned by one `DocStore`.
#[derive(Default)]
pub(crate) struct Runtime {
    next_effect: EffectId,
    next_local: u64,
    effects: BTreeMap<EffectId, EffectSlot>,
    observers: HashMap<DepKey, BTreeSet<EffectId>>,
    dirty: BTreeSet<EffectId>,
    locals: HashMap<u64, PropValue>,
    local_owners: HashMap<u64, DisposeHandle>,
}

impl Runtime {
    /// Registers a computation and marks it for its first run.
    pub(crate) fn register(&mut self, name: &str, runner: EffectFn) -> DisposeHandle {
        self.next_effect += 1;
        let id = self.next_effect;
        let handle = DisposeHandle::new();
        self.effects.insert(
            id,
            EffectSlot {
                name: name.to_string(),
                handle: handle.clone(),
                runner: Some(runner),
                deps: Vec::new(),
            },
        );
        self.dirty.insert(id);
        handle
    }

    /// Marks every live observer of `key` dirty.
    pub(crate) fn notify(&mut self, key: &DepKey) {
        let Some(observers) = self.observers.get(key) else {
            return;
        };
        for id in observers {
            if self
                .effects
                .get(id)
                .is_some_and(|slot| slot.handle.is_active())
            {
                self.dirty.insert(*id);
            }
        }
    }

    /// Pops the oldest dirty computation, pruning disposed ones.
    pub(crate) fn pop_dirty(&mut self) -> Option<EffectId> {
        while let Some(id) = self.dirty.pop_first() {
            match self.effects.get(&id) {
                Some(slot) if slot.handle.is_active() => return Some(id),
                Some(_) => self.remove(id),
                None => {}
            }
        }
        None
    }

    /// Takes the runner out for execution. Returns `None` while it is already
    /// running (re-entrant mark).
    pub(crate) fn take_runner(&mut self, id: EffectId) -> Option<(String, EffectFn)> {
        let slot = self.effects.get_mut(&id)?;
        let runner = slot.runner.take()?;
        Some((slot.name.clone(), runner))
    }

    /// Puts a runner back and replaces its dependency set.
    pub(crate) fn restore_runner(&mut self, id: EffectId, runner: EffectFn, deps: Vec<DepKey>) {
        let active = match self.effects.get(&id) {
            Some(slot) => slot.handle.is_active(),
            None => return,
        };
        if !active {
            self.remove(id);
            return;
        }
        self.unlink(id);
        for key in &deps {
            self.observers.entry(key.clone()).or_default().insert(id);
        }
        if let Some(slot) = self.effects.get_mut(&id) {
            slot.runner = Some(runner);
            slot.deps = deps;
        }
    }

    fn unlink(&mut self, id: EffectId) {
        let Some(slot) = self.effects.get(&id) else {
            return;
        };
        for key in &slot.deps {
            if let Some(observers) = self.observers.get_mut(key) {
                observers.remove(&id);
                if observers.is_empty() {
                    self.observers.remove(key);
                }
            }
        }
    }

    fn remove(&mut self, id: EffectId) {
        self.unlink(id);
        self.effects.remove(&id);
        self.dirty.remove(&id);
    }

    /// Drops every disposed computation.
    pub(crate) fn prune(&mut self) {
        let disposed: Vec<EffectId> = self
            .effects
            .iter()
            .filter(|(_, slot)| !slot.handle.is_active())
            .map(|(id, _)| *id)
            .collect();
        for id in disposed {
            self.remove(id);
        }
        let released: Vec<u64> = self
            .local_owners
            .iter()
            .filter(|(_, handle)| !handle.is_active())
            .map(|(id, _)| *id)
            .collect();
        for id in released {
            self.local_owners.remove(&id);
            self.locals.remove(&id);
            self.observers.remove(&DepKey::Local(id));
        }
    }

    pub(crate) fn live_effects(&self) -> usize {
        self.effects
            .values()
            .filter(|slot| slot.handle.is_active())
            .count()
    }

    pub(crate) fn create_local(&mut self, value: PropValue) -> u64 {
        self.next_local += 1;
        self.locals.insert(self.next_local, value);
        self.next_local
    }

    /// Local cell freed once the returned handle is released.
    pub(crate) fn create_owned_local(&mut self, value: PropValue) -> (u64, DisposeHandle) {
        let id = self.create_local(value);
        let handle = DisposeHandle::new();
        self.local_owners.insert(id, handle.clone());
        (id, handle)
    }

    fn local_is_live(&self, id: u64) -> bool {
        self.locals.contains_key(&id)
            && self
                .local_owners
                .get(&id)
                .map_or(true, DisposeHandle::is_active)
    }

    pub(crate) fn local(&self, id: u64) -> Option<&PropValue> {
        if !self.local_is_live(id) {
            return None;
        }
        self.locals.get(&id)
    }

    pub(crate) fn live_locals(&self) -> usize {
        self.locals
            .keys()
            .filter(|id| self.local_is_live(**id))
            .count()
    }

    /// Stores a local value; returns whether it changed. Writes to released
    /// cells are ignored.
    pub(crate) fn set_local(&mut self, id: u64, value: PropValue) -> bool {
        if !self.local_is_live(id) {
            return false;
        }
        match self.locals.get_mut(&id) {
            Some(current) if *current != value => *current = value,
            _ => return false,
        }
        self.notify(&DepKey::Local(id));
        true
    }
}

/// Evaluation context handed to a running computation.
///
/// Tracked reads go through signals (`PropSignal::value`), untracked reads and
/// mutations through `store()`.
pub struct EvalContext<'a> {
    store: &'a mut DocStore,
    deps: Vec<DepKey>,
}

impl<'a> EvalContext<'a> {
    pub(crate) fn new(store: &'a mut DocStore) -> Self {
        Self {
            store,
            deps: Vec::new(),
        }
    }

    /// Store access that records no dependency.
    pub fn store(&mut self) -> &mut DocStore {
        self.store
    }

    pub fn peek_store(&self) -> &DocStore {
        self.store
    }

    pub(crate) fn track(&mut self, key: DepKey) {
        if !self.deps.contains(&key) {
            self.deps.push(key);
        }
    }

    pub(crate) fn into_deps(self) -> Vec<DepKey> {
        self.deps
    }
}

#[cfg(test)]
mod tests {
    use super::{DepKey, Runtime};
    use crate::model::block::BlockId;
    use crate::model::props::PropValue;

    fn noop() -> super::EffectFn {
        Box::new(|_| Ok(()))
    }

    #[test]
    fn notify_marks_only_linked_observers() {
        let mut runtime = Runtime::default();
        let _first = runtime.register("first", noop());
        let _second = runtime.register("second", noop());
        let key = DepKey::Prop(BlockId::new("l1"), "order".to_string());

        while let Some(id) = runtime.pop_dirty() {
            let (_, runner) = runtime.take_runner(id).expect("runner present");
            let deps = if id == 1 { vec![key.clone()] } else { vec![] };
            runtime.restore_runner(id, runner, deps);
        }

        runtime.notify(&key);
        assert_eq!(runtime.pop_dirty(), Some(1));
        assert_eq!(runtime.pop_dirty(), None);
    }

    #[test]
    fn disposed_effects_are_pruned_on_pop() {
        let mut runtime = Runtime::default();
        let handle = runtime.register("gone", noop());
        handle.release();
        assert_eq!(runtime.pop_dirty(), None);
        assert_eq!(runtime.live_effects(), 0);
    }

    #[test]
    fn released_local_is_dropped_on_prune() {
        let mut runtime = Runtime::default();
        let kept = runtime.create_local(PropValue::Bool(false));
        let (owned, handle) = runtime.create_owned_local(PropValue::Bool(true));
        assert_eq!(runtime.live_locals(), 2);

        handle.release();
        assert_eq!(runtime.live_locals(), 1);
        assert_eq!(runtime.local(owned), None);
        assert!(!runtime.set_local(owned, PropValue::Bool(false)));

        runtime.prune();
        assert!(runtime.locals.get(&owned).is_none());
        assert_eq!(runtime.local(kept), Some(&PropValue::Bool(false)));
    }

    #[test]
    fn unchanged_local_write_does_not_notify() {
        let mut runtime = Runtime::default();
        let id = runtime.create_local(PropValue::Bool(false));
        assert!(!runtime.set_local(id, PropValue::Bool(false)));
        assert!(runtime.set_local(id, PropValue::Bool(true)));
    }
}
