//! View bindings: per-block controllers that turn user intents into store
//! mutations and expose the state a view renders.

pub mod list;

pub use list::{IconClickOutcome, ListBlockController};

use crate::model::block::BlockId;
use crate::selection::SelectionError;
use crate::store::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingError {
    Store(StoreError),
    /// Bound block exists but has another flavour.
    WrongFlavour { id: BlockId, flavour: String },
    Selection(SelectionError),
}

impl Display for BindingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "{err}"),
            Self::WrongFlavour { id, flavour } => {
                write!(f, "block {id} has flavour `{flavour}`")
            }
            Self::Selection(err) => write!(f, "{err}"),
        }
    }
}

impl Error for BindingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::Selection(err) => Some(err),
            Self::WrongFlavour { .. } => None,
        }
    }
}

impl From<StoreError> for BindingError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<SelectionError> for BindingError {
    fn from(value: SelectionError) -> Self {
        Self::Selection(value)
    }
}
