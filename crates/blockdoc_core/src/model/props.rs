//! Property values and patches carried by block models.
//!
//! # Responsibility
//! - Define the closed set of values a block property can hold.
//! - Provide typed conversion in and out of `PropValue` for reactive reads.
//!
//! # Invariants
//! - Property names use wire spelling (`childIds`, `shapeType`).
//! - A `PropPatch` applies as one unit; field order inside it is irrelevant.

use crate::model::block::BlockId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Property names shared by builtin block models.
pub mod fields {
    pub const TYPE: &str = "type";
    pub const ORDER: &str = "order";
    pub const COLLAPSED: &str = "collapsed";
    pub const CHECKED: &str = "checked";
    pub const TEXT: &str = "text";
    pub const TITLE: &str = "title";
    pub const URL: &str = "url";
    pub const CAPTION: &str = "caption";
    pub const CHILD_IDS: &str = "childIds";
    pub const SHAPE_TYPE: &str = "shapeType";
    pub const XYWH: &str = "xywh";
}

/// Single property value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "snake_case")]
pub enum PropValue {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    IdSet(BTreeSet<BlockId>),
}

impl PropValue {
    /// Short type label used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Text(_) => "text",
            Self::IdSet(_) => "id_set",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for PropValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<Option<i64>> for PropValue {
    fn from(value: Option<i64>) -> Self {
        value.map_or(Self::Null, Self::Int)
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<BTreeSet<BlockId>> for PropValue {
    fn from(value: BTreeSet<BlockId>) -> Self {
        Self::IdSet(value)
    }
}

/// Typed extraction used by reactive cells.
///
/// Returns `None` when the stored value has a different shape.
pub trait FromPropValue: Sized {
    fn from_prop(value: &PropValue) -> Option<Self>;
}

impl FromPropValue for PropValue {
    fn from_prop(value: &PropValue) -> Option<Self> {
        Some(value.clone())
    }
}

impl FromPropValue for bool {
    fn from_prop(value: &PropValue) -> Option<Self> {
        match value {
            PropValue::Bool(inner) => Some(*inner),
            _ => None,
        }
    }
}

impl FromPropValue for i64 {
    fn from_prop(value: &PropValue) -> Option<Self> {
        match value {
            PropValue::Int(inner) => Some(*inner),
            _ => None,
        }
    }
}

/// Nullable integer: `Null` reads as `Some(None)`.
impl FromPropValue for Option<i64> {
    fn from_prop(value: &PropValue) -> Option<Self> {
        match value {
            PropValue::Null => Some(None),
            PropValue::Int(inner) => Some(Some(*inner)),
            _ => None,
        }
    }
}

impl FromPropValue for String {
    fn from_prop(value: &PropValue) -> Option<Self> {
        match value {
            PropValue::Text(inner) => Some(inner.clone()),
            _ => None,
        }
    }
}

impl FromPropValue for BTreeSet<BlockId> {
    fn from_prop(value: &PropValue) -> Option<Self> {
        match value {
            PropValue::IdSet(inner) => Some(inner.clone()),
            _ => None,
        }
    }
}

/// Ordered property map used for snapshots and change payloads.
pub type PropMap = BTreeMap<String, PropValue>;

/// Set of field assignments applied atomically by `DocStore::update_block`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropPatch(PropMap);

impl PropPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style assignment.
    pub fn set(mut self, field: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<PropValue>) {
        self.0.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&PropValue> {
        self.0.get(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PropValue)> {
        self.0.iter()
    }

    pub fn into_map(self) -> PropMap {
        self.0
    }
}

impl From<PropMap> for PropPatch {
    fn from(value: PropMap) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::{fields, FromPropValue, PropPatch, PropValue};
    use crate::model::block::BlockId;
    use std::collections::BTreeSet;

    #[test]
    fn nullable_int_distinguishes_null_from_wrong_shape() {
        assert_eq!(Option::<i64>::from_prop(&PropValue::Null), Some(None));
        assert_eq!(Option::<i64>::from_prop(&PropValue::Int(4)), Some(Some(4)));
        assert_eq!(Option::<i64>::from_prop(&PropValue::Bool(true)), None);
    }

    #[test]
    fn patch_builder_overwrites_duplicate_fields() {
        let patch = PropPatch::new()
            .set(fields::COLLAPSED, true)
            .set(fields::COLLAPSED, false)
            .set(fields::ORDER, None::<i64>);
        assert_eq!(patch.len(), 2);
        assert_eq!(patch.get(fields::COLLAPSED), Some(&PropValue::Bool(false)));
        assert!(patch.get(fields::ORDER).expect("order present").is_null());
    }

    #[test]
    fn id_set_serializes_with_tag() {
        let ids: BTreeSet<BlockId> = [BlockId::new("a"), BlockId::new("b")].into_iter().collect();
        let json = serde_json::to_value(PropValue::from(ids)).expect("serialize id set");
        assert_eq!(json["t"], "id_set");
        assert_eq!(json["v"], serde_json::json!(["a", "b"]));
    }
}
