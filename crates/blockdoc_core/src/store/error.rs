//! Mutation-path errors of the document store.

use crate::model::block::{BlockId, PropError};
use crate::model::schema::SchemaError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned synchronously by store mutation and lookup APIs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Target block is absent (never existed or already deleted).
    NotFound(BlockId),
    /// Local mutation attempted on a read-only document.
    ReadOnly,
    /// Patch contains a property the block model rejects.
    InvalidProp { id: BlockId, source: PropError },
    /// Flavour is unknown or cannot be placed under the requested parent.
    Schema(SchemaError),
    /// A second root was inserted.
    RootExists(BlockId),
    /// Inserted block reuses a live id.
    DuplicateId(BlockId),
    /// Snapshot is internally inconsistent.
    CorruptSnapshot(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "block not found: {id}"),
            Self::ReadOnly => write!(f, "document is read-only"),
            Self::InvalidProp { id, source } => write!(f, "invalid patch for {id}: {source}"),
            Self::Schema(err) => write!(f, "{err}"),
            Self::RootExists(id) => write!(f, "document already has root {id}"),
            Self::DuplicateId(id) => write!(f, "block id already in use: {id}"),
            Self::CorruptSnapshot(details) => write!(f, "corrupt snapshot: {details}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidProp { source, .. } => Some(source),
            Self::Schema(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SchemaError> for StoreError {
    fn from(value: SchemaError) -> Self {
        Self::Schema(value)
    }
}
