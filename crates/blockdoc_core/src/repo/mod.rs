//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define document-level data access contracts.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Repositories only accept connections with all migrations applied.

pub mod doc_repo;

pub use doc_repo::{ChangeRecord, DocRepoError, DocRepoResult, DocRepository, SqliteDocRepository};
