//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls and store setup into document-level APIs.
//! - Keep host layers decoupled from storage details.

pub mod doc_service;

pub use doc_service::{DocService, DocServiceError, OpenDoc};
