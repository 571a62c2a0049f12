//! Per-document options.
//!
//! # Invariants
//! - `history_limit == 0` means unlimited undo depth.
//! - `max_reaction_runs` is always positive; it bounds how often one
//!   reactive computation may run within one settle pass.

use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub const DEFAULT_HISTORY_LIMIT: usize = 100;
pub const DEFAULT_MAX_REACTION_RUNS: usize = 100;

/// Options applied when a `DocStore` is created.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DocOptions {
    /// Rejects every local mutation with `StoreError::ReadOnly`.
    pub readonly: bool,
    /// Maximum number of retained undo units.
    pub history_limit: usize,
    /// Runs allowed per computation and settle pass before it is cut off.
    pub max_reaction_runs: usize,
}

impl Default for DocOptions {
    fn default() -> Self {
        Self {
            readonly: false,
            history_limit: DEFAULT_HISTORY_LIMIT,
            max_reaction_runs: DEFAULT_MAX_REACTION_RUNS,
        }
    }
}

impl DocOptions {
    /// Parses options from a JSON object; missing keys take defaults.
    pub fn from_json(raw: &str) -> Result<Self, OptionsError> {
        let options: Self =
            serde_json::from_str(raw).map_err(|err| OptionsError::Parse(err.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.max_reaction_runs == 0 {
            return Err(OptionsError::InvalidValue {
                key: "max_reaction_runs",
                reason: "must be positive",
            });
        }
        Ok(())
    }

    pub fn readonly(mut self, value: bool) -> Self {
        self.readonly = value;
        self
    }
}

/// Option parsing and validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionsError {
    Parse(String),
    InvalidValue {
        key: &'static str,
        reason: &'static str,
    },
}

impl Display for OptionsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(message) => write!(f, "invalid document options: {message}"),
            Self::InvalidValue { key, reason } => write!(f, "option `{key}` {reason}"),
        }
    }
}

impl Error for OptionsError {}
