//! Core block-document model: store, reactivity, watchers and selection.
//! This crate is the single source of truth for document invariants.

pub mod binding;
pub mod config;
pub mod db;
pub mod disposable;
pub mod logging;
pub mod model;
pub mod reactive;
pub mod repo;
pub mod selection;
pub mod service;
pub mod services;
pub mod store;
pub mod task;
pub mod watcher;

pub use binding::{BindingError, IconClickOutcome, ListBlockController};
pub use config::{DocOptions, OptionsError};
pub use disposable::Disposable;
pub use logging::{default_log_level, init_logging, logging_status, LogTarget};
pub use model::block::{flavours, Block, BlockId, BlockKind, BlockModel, ListType};
pub use model::props::{fields, PropMap, PropPatch, PropValue};
pub use model::snapshot::{BlockSnapshot, DocSnapshot};
pub use reactive::{EvalContext, LocalSignal, PropSignal};
pub use repo::{ChangeRecord, DocRepoError, DocRepository, SqliteDocRepository};
pub use selection::{Selection, SelectionKind, SelectionManager, SelectionPayload};
pub use service::{DocService, DocServiceError, OpenDoc};
pub use services::{EditorMode, HostServices};
pub use store::{
    ChangeEvent, ChangeKind, DocStore, EventFilter, Origin, RemoteOp, StoreError, StoreResult,
};
pub use task::{DetachedTaskError, DetachedTasks, TaskReport};
pub use watcher::{ChangeJournal, Watcher, WatcherError, WatcherRegistry};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
