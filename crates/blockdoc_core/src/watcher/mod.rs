//! Invariant-enforcing watchers.
//!
//! # Responsibility
//! - Define the `Watcher` attach contract and the registry that owns attached
//!   watchers.
//! - Define the reaction-path error type. Reaction errors are contained and
//!   logged by the store, never returned to the mutator.
//!
//! # Invariants
//! - Each attached watcher is released exactly once, on `detach`,
//!   `dispose_all`, or registry drop.
//! - Watcher names are unique inside one registry.

pub mod group;
pub mod journal;
pub mod list;

pub use group::{GroupMembershipWatcher, GroupRelationWatcher};
pub use journal::ChangeJournal;
pub use list::{ListConsistencyWatcher, ListLifecycleWatcher};

use crate::disposable::Disposable;
use crate::model::block::BlockId;
use crate::store::{DocStore, StoreError};
use log::{info, warn};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Reaction-path failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatcherError {
    /// Watcher observed a state that must be unreachable.
    InvariantViolation { id: BlockId, details: String },
    /// Watcher-specific failure.
    Reaction { watcher: String, message: String },
    /// Corrective mutation was rejected by the store.
    Store(StoreError),
    /// Reaction panicked; payload is sanitized.
    Panicked(String),
}

impl WatcherError {
    pub fn reaction(watcher: &str, message: impl Into<String>) -> Self {
        Self::Reaction {
            watcher: watcher.to_string(),
            message: message.into(),
        }
    }

    /// Stable code used in log lines.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvariantViolation { .. } => "invariant_violation",
            Self::Reaction { .. } => "reaction_error",
            Self::Store(_) => "store_error",
            Self::Panicked(_) => "panicked",
        }
    }
}

impl Display for WatcherError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvariantViolation { id, details } => {
                write!(f, "invariant violated on {id}: {details}")
            }
            Self::Reaction { watcher, message } => write!(f, "watcher `{watcher}` failed: {message}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::Panicked(payload) => write!(f, "reaction panicked: {payload}"),
        }
    }
}

impl Error for WatcherError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for WatcherError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Rule attached to a store once; the returned disposable releases every
/// registration it made.
pub trait Watcher {
    fn name(&self) -> &str;
    fn attach(&self, store: &mut DocStore) -> Disposable;
}

/// Registry errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    DuplicateWatcher(String),
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateWatcher(name) => write!(f, "watcher already attached: {name}"),
        }
    }
}

impl Error for RegistryError {}

/// Attached watchers keyed by name.
#[derive(Debug, Default)]
pub struct WatcherRegistry {
    attached: BTreeMap<String, Disposable>,
}

impl WatcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with group eviction, group membership cleanup and list
    /// lifecycle attached.
    pub fn with_defaults(store: &mut DocStore) -> Self {
        let mut registry = Self::new();
        let defaults: [&dyn Watcher; 3] = [
            &GroupRelationWatcher,
            &GroupMembershipWatcher,
            &ListLifecycleWatcher,
        ];
        for watcher in defaults {
            if let Err(err) = registry.attach(store, watcher) {
                warn!(
                    "event=watcher_attach module=watcher status=error doc_id={} error={}",
                    store.doc_id(),
                    err
                );
            }
        }
        registry
    }

    pub fn attach(&mut self, store: &mut DocStore, watcher: &dyn Watcher) -> Result<(), RegistryError> {
        let name = watcher.name().to_string();
        if self.attached.contains_key(&name) {
            return Err(RegistryError::DuplicateWatcher(name));
        }
        let disposable = watcher.attach(store);
        info!(
            "event=watcher_attach module=watcher status=ok doc_id={} watcher={}",
            store.doc_id(),
            name
        );
        self.attached.insert(name, disposable);
        Ok(())
    }

    /// Disposes one watcher. Returns `false` when it was not attached.
    pub fn detach(&mut self, name: &str) -> bool {
        match self.attached.remove(name) {
            Some(mut disposable) => {
                disposable.dispose();
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.attached.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.attached.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.attached.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attached.is_empty()
    }

    pub fn dispose_all(&mut self) {
        for (_, mut disposable) in std::mem::take(&mut self.attached) {
            disposable.dispose();
        }
    }
}

impl Drop for WatcherRegistry {
    fn drop(&mut self) {
        self.dispose_all();
    }
}
