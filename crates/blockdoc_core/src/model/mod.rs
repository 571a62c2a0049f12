//! Block document domain model.
//!
//! # Responsibility
//! - Define block identity, typed per-flavour payloads and property values.
//! - Declare flavour placement rules through the schema registry.
//!
//! # Invariants
//! - Every block is identified by a stable `BlockId`.
//! - Node-kind dispatch is an exhaustive match over `BlockModel`.

pub mod block;
pub mod props;
pub mod schema;
pub mod snapshot;
