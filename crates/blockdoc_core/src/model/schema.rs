//! Block schema declarations and registry.
//!
//! # Responsibility
//! - Declare which flavours exist and where each may be placed in the tree.
//! - Reject malformed schema declarations before they reach the store.
//!
//! # Invariants
//! - Flavour names match `<namespace>:<name>` in lowercase kebab form.
//! - A `Root` schema never declares parents; other roles declare at least one.
//! - Flavour names are unique inside one registry.

use crate::model::block::flavours;
use log::error;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

static FLAVOUR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z][a-z0-9-]*:[a-z][a-z0-9-]*$").expect("valid flavour regex")
});

/// Returns whether `value` is a well-formed flavour name.
pub fn is_valid_flavour(value: &str) -> bool {
    FLAVOUR_RE.is_match(value)
}

/// Structural role of a flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BlockRole {
    /// Top-level document block; exactly one per document.
    Root,
    /// Container that hosts content or surface elements.
    Hub,
    /// Leaf or nested content.
    Content,
}

/// Placement contract for one flavour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSchema {
    pub flavour: String,
    pub version: u32,
    pub role: BlockRole,
    /// Flavours allowed as direct parent.
    pub parents: Vec<String>,
}

impl BlockSchema {
    pub fn new(flavour: &str, role: BlockRole, parents: &[&str]) -> Self {
        Self {
            flavour: flavour.to_string(),
            version: 1,
            role,
            parents: parents.iter().map(|value| value.to_string()).collect(),
        }
    }

    /// Validates declaration-level invariants.
    pub fn validate(&self) -> Result<(), SchemaValidationError> {
        if self.flavour.trim().is_empty() {
            return Err(SchemaValidationError::EmptyFlavour);
        }
        if !is_valid_flavour(&self.flavour) {
            return Err(SchemaValidationError::InvalidFlavour(self.flavour.clone()));
        }
        if self.version == 0 {
            return Err(SchemaValidationError::InvalidVersion(self.flavour.clone()));
        }

        match self.role {
            BlockRole::Root if !self.parents.is_empty() => {
                return Err(SchemaValidationError::RootWithParents(self.flavour.clone()));
            }
            BlockRole::Hub | BlockRole::Content if self.parents.is_empty() => {
                return Err(SchemaValidationError::MissingParents(self.flavour.clone()));
            }
            _ => {}
        }

        let mut dedup = BTreeSet::new();
        for parent in &self.parents {
            if !is_valid_flavour(parent) {
                return Err(SchemaValidationError::InvalidFlavour(parent.clone()));
            }
            if !dedup.insert(parent.as_str()) {
                return Err(SchemaValidationError::DuplicateParent(parent.clone()));
            }
        }
        Ok(())
    }
}

/// Schema declaration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaValidationError {
    EmptyFlavour,
    InvalidFlavour(String),
    InvalidVersion(String),
    RootWithParents(String),
    MissingParents(String),
    DuplicateParent(String),
}

impl Display for SchemaValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyFlavour => write!(f, "schema flavour must not be empty"),
            Self::InvalidFlavour(value) => write!(f, "schema flavour is invalid: {value}"),
            Self::InvalidVersion(value) => {
                write!(f, "schema version must be positive: {value}")
            }
            Self::RootWithParents(value) => {
                write!(f, "root schema must not declare parents: {value}")
            }
            Self::MissingParents(value) => {
                write!(f, "non-root schema must declare parents: {value}")
            }
            Self::DuplicateParent(value) => write!(f, "schema parent is duplicated: {value}"),
        }
    }
}

impl Error for SchemaValidationError {}

/// Registry and placement errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    Invalid(SchemaValidationError),
    DuplicateFlavour(String),
    UnknownFlavour(String),
    InvalidParent {
        flavour: String,
        parent: Option<String>,
    },
}

impl Display for SchemaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Invalid(err) => write!(f, "invalid block schema: {err}"),
            Self::DuplicateFlavour(value) => write!(f, "flavour already registered: {value}"),
            Self::UnknownFlavour(value) => write!(f, "flavour not registered: {value}"),
            Self::InvalidParent { flavour, parent } => match parent {
                Some(parent) => write!(f, "`{flavour}` cannot be placed under `{parent}`"),
                None => write!(f, "`{flavour}` cannot be placed at document root"),
            },
        }
    }
}

impl Error for SchemaError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Invalid(err) => Some(err),
            _ => None,
        }
    }
}

/// Registered flavour schemas with a role index.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    entries: BTreeMap<String, BlockSchema>,
    role_index: BTreeMap<BlockRole, BTreeSet<String>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the builtin flavours.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        let content_parents = [flavours::NOTE, flavours::PARAGRAPH, flavours::LIST];
        let builtin = [
            BlockSchema::new(flavours::PAGE, BlockRole::Root, &[]),
            BlockSchema::new(flavours::NOTE, BlockRole::Hub, &[flavours::PAGE]),
            BlockSchema::new(flavours::SURFACE, BlockRole::Hub, &[flavours::PAGE]),
            BlockSchema::new(flavours::PARAGRAPH, BlockRole::Content, &content_parents),
            BlockSchema::new(flavours::LIST, BlockRole::Content, &content_parents),
            BlockSchema::new(flavours::BOOKMARK, BlockRole::Content, &content_parents),
            BlockSchema::new(flavours::GROUP, BlockRole::Content, &[flavours::SURFACE]),
            BlockSchema::new(flavours::SHAPE, BlockRole::Content, &[flavours::SURFACE]),
        ];
        for schema in builtin {
            if let Err(err) = registry.register(schema) {
                error!(
                    "event=schema_register module=schema status=error error={}",
                    err
                );
            }
        }
        registry
    }

    /// Registers one schema after declaration validation.
    pub fn register(&mut self, schema: BlockSchema) -> Result<(), SchemaError> {
        schema.validate().map_err(SchemaError::Invalid)?;
        if self.entries.contains_key(schema.flavour.as_str()) {
            return Err(SchemaError::DuplicateFlavour(schema.flavour));
        }
        self.role_index
            .entry(schema.role)
            .or_default()
            .insert(schema.flavour.clone());
        self.entries.insert(schema.flavour.clone(), schema);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, flavour: &str) -> Option<&BlockSchema> {
        self.entries.get(flavour)
    }

    pub fn list_by_role(&self, role: BlockRole) -> Vec<&BlockSchema> {
        let Some(flavours) = self.role_index.get(&role) else {
            return vec![];
        };
        flavours
            .iter()
            .filter_map(|flavour| self.entries.get(flavour))
            .collect()
    }

    /// Checks that `flavour` may be placed under `parent_flavour`.
    ///
    /// `None` parent means the block becomes the document root.
    pub fn validate_placement(
        &self,
        flavour: &str,
        parent_flavour: Option<&str>,
    ) -> Result<(), SchemaError> {
        let schema = self
            .get(flavour)
            .ok_or_else(|| SchemaError::UnknownFlavour(flavour.to_string()))?;
        let allowed = match parent_flavour {
            None => schema.role == BlockRole::Root,
            Some(parent) => schema.parents.iter().any(|candidate| candidate == parent),
        };
        if allowed {
            Ok(())
        } else {
            Err(SchemaError::InvalidParent {
                flavour: flavour.to_string(),
                parent: parent_flavour.map(str::to_string),
            })
        }
    }
}
