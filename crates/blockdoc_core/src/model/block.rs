//! Block node domain model.
//!
//! # Responsibility
//! - Define block identity and the typed per-flavour property payloads.
//! - Translate between wire-named properties and typed model fields.
//!
//! # Invariants
//! - `BlockId` is stable and never reused inside one document.
//! - Every property write goes through `BlockModel::set`, which rejects
//!   unknown fields and mismatched value shapes for builtin flavours.
//! - `order` is meaningful only for numbered lists (enforced reactively by
//!   the list watcher, not here).

use crate::model::props::{fields, PropMap, PropValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Builtin flavour names.
pub mod flavours {
    pub const PAGE: &str = "doc:page";
    pub const NOTE: &str = "doc:note";
    pub const PARAGRAPH: &str = "doc:paragraph";
    pub const LIST: &str = "doc:list";
    pub const BOOKMARK: &str = "doc:bookmark";
    pub const SURFACE: &str = "doc:surface";
    pub const GROUP: &str = "surface:group";
    pub const SHAPE: &str = "surface:shape";
}

/// Stable block identifier, unique within one document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(String);

impl BlockId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Generates a fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for BlockId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BlockId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Node kind derived from flavour. Unregistered flavours map to `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Page,
    Note,
    Paragraph,
    List,
    Bookmark,
    Surface,
    Group,
    Shape,
    Other,
}

impl BlockKind {
    pub fn from_flavour(flavour: &str) -> Self {
        match flavour {
            flavours::PAGE => Self::Page,
            flavours::NOTE => Self::Note,
            flavours::PARAGRAPH => Self::Paragraph,
            flavours::LIST => Self::List,
            flavours::BOOKMARK => Self::Bookmark,
            flavours::SURFACE => Self::Surface,
            flavours::GROUP => Self::Group,
            flavours::SHAPE => Self::Shape,
            _ => Self::Other,
        }
    }
}

/// List presentation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListType {
    Bulleted,
    Numbered,
    Todo,
    Toggle,
}

impl ListType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bulleted => "bulleted",
            Self::Numbered => "numbered",
            Self::Todo => "todo",
            Self::Toggle => "toggle",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "bulleted" => Some(Self::Bulleted),
            "numbered" => Some(Self::Numbered),
            "todo" => Some(Self::Todo),
            "toggle" => Some(Self::Toggle),
            _ => None,
        }
    }
}

impl From<ListType> for PropValue {
    fn from(value: ListType) -> Self {
        PropValue::Text(value.as_str().to_string())
    }
}

impl crate::model::props::FromPropValue for ListType {
    fn from_prop(value: &PropValue) -> Option<Self> {
        match value {
            PropValue::Text(raw) => ListType::parse(raw),
            _ => None,
        }
    }
}

/// Property errors raised while writing a typed model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropError {
    UnknownField(String),
    TypeMismatch {
        field: String,
        expected: &'static str,
        found: &'static str,
    },
    InvalidValue {
        field: String,
        value: String,
    },
}

impl Display for PropError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownField(field) => write!(f, "unknown property `{field}`"),
            Self::TypeMismatch {
                field,
                expected,
                found,
            } => write!(
                f,
                "property `{field}` expects {expected}, got {found}"
            ),
            Self::InvalidValue { field, value } => {
                write!(f, "property `{field}` does not accept `{value}`")
            }
        }
    }
}

impl Error for PropError {}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageModel {
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParagraphModel {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListModel {
    pub list_type: ListType,
    pub text: String,
    pub checked: bool,
    pub collapsed: bool,
    pub order: Option<i64>,
}

impl Default for ListModel {
    fn default() -> Self {
        Self {
            list_type: ListType::Bulleted,
            text: String::new(),
            checked: false,
            collapsed: false,
            order: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BookmarkModel {
    pub url: String,
    pub caption: Option<String>,
}

/// Surface element that only aggregates references to other elements.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GroupModel {
    pub title: String,
    pub child_ids: BTreeSet<BlockId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShapeModel {
    pub shape_type: String,
    pub xywh: String,
}

/// Flavour-specific payload of a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockModel {
    Page(PageModel),
    Note,
    Paragraph(ParagraphModel),
    List(ListModel),
    Bookmark(BookmarkModel),
    Surface,
    Group(GroupModel),
    Shape(ShapeModel),
    /// Flavours contributed by extensions; properties stay opaque.
    Other(PropMap),
}

impl BlockModel {
    /// Returns the default payload for a flavour.
    pub fn for_flavour(flavour: &str) -> Self {
        match BlockKind::from_flavour(flavour) {
            BlockKind::Page => Self::Page(PageModel::default()),
            BlockKind::Note => Self::Note,
            BlockKind::Paragraph => Self::Paragraph(ParagraphModel::default()),
            BlockKind::List => Self::List(ListModel::default()),
            BlockKind::Bookmark => Self::Bookmark(BookmarkModel::default()),
            BlockKind::Surface => Self::Surface,
            BlockKind::Group => Self::Group(GroupModel::default()),
            BlockKind::Shape => Self::Shape(ShapeModel::default()),
            BlockKind::Other => Self::Other(PropMap::new()),
        }
    }

    pub fn kind(&self) -> BlockKind {
        match self {
            Self::Page(_) => BlockKind::Page,
            Self::Note => BlockKind::Note,
            Self::Paragraph(_) => BlockKind::Paragraph,
            Self::List(_) => BlockKind::List,
            Self::Bookmark(_) => BlockKind::Bookmark,
            Self::Surface => BlockKind::Surface,
            Self::Group(_) => BlockKind::Group,
            Self::Shape(_) => BlockKind::Shape,
            Self::Other(_) => BlockKind::Other,
        }
    }

    pub fn as_list(&self) -> Option<&ListModel> {
        match self {
            Self::List(list) => Some(list),
            _ => None,
        }
    }

    /// Returns the membership payload when this model is group-like.
    pub fn as_group_like(&self) -> Option<&GroupModel> {
        match self {
            Self::Group(group) => Some(group),
            _ => None,
        }
    }

    /// Reads one property by wire name.
    pub fn get(&self, field: &str) -> Option<PropValue> {
        match self {
            Self::Page(page) => match field {
                fields::TITLE => Some(page.title.clone().into()),
                _ => None,
            },
            Self::Note | Self::Surface => None,
            Self::Paragraph(paragraph) => match field {
                fields::TEXT => Some(paragraph.text.clone().into()),
                _ => None,
            },
            Self::List(list) => match field {
                fields::TYPE => Some(list.list_type.into()),
                fields::TEXT => Some(list.text.clone().into()),
                fields::CHECKED => Some(list.checked.into()),
                fields::COLLAPSED => Some(list.collapsed.into()),
                fields::ORDER => Some(list.order.into()),
                _ => None,
            },
            Self::Bookmark(bookmark) => match field {
                fields::URL => Some(bookmark.url.clone().into()),
                fields::CAPTION => Some(
                    bookmark
                        .caption
                        .clone()
                        .map_or(PropValue::Null, PropValue::Text),
                ),
                _ => None,
            },
            Self::Group(group) => match field {
                fields::TITLE => Some(group.title.clone().into()),
                fields::CHILD_IDS => Some(group.child_ids.clone().into()),
                _ => None,
            },
            Self::Shape(shape) => match field {
                fields::SHAPE_TYPE => Some(shape.shape_type.clone().into()),
                fields::XYWH => Some(shape.xywh.clone().into()),
                _ => None,
            },
            Self::Other(props) => props.get(field).cloned(),
        }
    }

    /// Writes one property by wire name.
    pub fn set(&mut self, field: &str, value: PropValue) -> Result<(), PropError> {
        match self {
            Self::Page(page) => match field {
                fields::TITLE => page.title = expect_text(field, value)?,
                _ => return Err(PropError::UnknownField(field.to_string())),
            },
            Self::Note | Self::Surface => {
                return Err(PropError::UnknownField(field.to_string()));
            }
            Self::Paragraph(paragraph) => match field {
                fields::TEXT => paragraph.text = expect_text(field, value)?,
                _ => return Err(PropError::UnknownField(field.to_string())),
            },
            Self::List(list) => match field {
                fields::TYPE => {
                    let raw = expect_text(field, value)?;
                    list.list_type =
                        ListType::parse(&raw).ok_or_else(|| PropError::InvalidValue {
                            field: field.to_string(),
                            value: raw.clone(),
                        })?;
                }
                fields::TEXT => list.text = expect_text(field, value)?,
                fields::CHECKED => list.checked = expect_bool(field, value)?,
                fields::COLLAPSED => list.collapsed = expect_bool(field, value)?,
                fields::ORDER => list.order = expect_nullable_int(field, value)?,
                _ => return Err(PropError::UnknownField(field.to_string())),
            },
            Self::Bookmark(bookmark) => match field {
                fields::URL => bookmark.url = expect_text(field, value)?,
                fields::CAPTION => bookmark.caption = expect_nullable_text(field, value)?,
                _ => return Err(PropError::UnknownField(field.to_string())),
            },
            Self::Group(group) => match field {
                fields::TITLE => group.title = expect_text(field, value)?,
                fields::CHILD_IDS => group.child_ids = expect_id_set(field, value)?,
                _ => return Err(PropError::UnknownField(field.to_string())),
            },
            Self::Shape(shape) => match field {
                fields::SHAPE_TYPE => shape.shape_type = expect_text(field, value)?,
                fields::XYWH => shape.xywh = expect_text(field, value)?,
                _ => return Err(PropError::UnknownField(field.to_string())),
            },
            Self::Other(props) => {
                props.insert(field.to_string(), value);
            }
        }
        Ok(())
    }

    /// Removes one property. Only extension payloads can lose a field;
    /// builtin payloads reset it through `set(field, Null)`.
    pub fn unset(&mut self, field: &str) -> Result<(), PropError> {
        match self {
            Self::Other(props) => {
                props.remove(field);
                Ok(())
            }
            _ => self.set(field, PropValue::Null),
        }
    }

    /// Returns every property of this model keyed by wire name.
    pub fn props(&self) -> PropMap {
        let names: &[&str] = match self {
            Self::Page(_) => &[fields::TITLE],
            Self::Note | Self::Surface => &[],
            Self::Paragraph(_) => &[fields::TEXT],
            Self::List(_) => &[
                fields::TYPE,
                fields::TEXT,
                fields::CHECKED,
                fields::COLLAPSED,
                fields::ORDER,
            ],
            Self::Bookmark(_) => &[fields::URL, fields::CAPTION],
            Self::Group(_) => &[fields::TITLE, fields::CHILD_IDS],
            Self::Shape(_) => &[fields::SHAPE_TYPE, fields::XYWH],
            Self::Other(props) => return props.clone(),
        };
        names
            .iter()
            .filter_map(|name| self.get(name).map(|value| (name.to_string(), value)))
            .collect()
    }
}

/// Block node as owned by the document store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub(crate) id: BlockId,
    pub(crate) flavour: String,
    pub(crate) parent: Option<BlockId>,
    pub(crate) children: Vec<BlockId>,
    pub(crate) model: BlockModel,
}

impl Block {
    pub(crate) fn new(id: BlockId, flavour: &str, model: BlockModel) -> Self {
        Self {
            id,
            flavour: flavour.to_string(),
            parent: None,
            children: Vec::new(),
            model,
        }
    }

    pub fn id(&self) -> &BlockId {
        &self.id
    }

    pub fn flavour(&self) -> &str {
        &self.flavour
    }

    pub fn parent(&self) -> Option<&BlockId> {
        self.parent.as_ref()
    }

    pub fn children(&self) -> &[BlockId] {
        &self.children
    }

    pub fn model(&self) -> &BlockModel {
        &self.model
    }

    pub fn kind(&self) -> BlockKind {
        self.model.kind()
    }

    pub fn get(&self, field: &str) -> Option<PropValue> {
        self.model.get(field)
    }
}

fn expect_text(field: &str, value: PropValue) -> Result<String, PropError> {
    match value {
        PropValue::Text(inner) => Ok(inner),
        other => Err(mismatch(field, "text", &other)),
    }
}

fn expect_nullable_text(field: &str, value: PropValue) -> Result<Option<String>, PropError> {
    match value {
        PropValue::Null => Ok(None),
        PropValue::Text(inner) => Ok(Some(inner)),
        other => Err(mismatch(field, "text or null", &other)),
    }
}

fn expect_bool(field: &str, value: PropValue) -> Result<bool, PropError> {
    match value {
        PropValue::Bool(inner) => Ok(inner),
        other => Err(mismatch(field, "bool", &other)),
    }
}

fn expect_nullable_int(field: &str, value: PropValue) -> Result<Option<i64>, PropError> {
    match value {
        PropValue::Null => Ok(None),
        PropValue::Int(inner) => Ok(Some(inner)),
        other => Err(mismatch(field, "int or null", &other)),
    }
}

fn expect_id_set(field: &str, value: PropValue) -> Result<BTreeSet<BlockId>, PropError> {
    match value {
        PropValue::IdSet(inner) => Ok(inner),
        other => Err(mismatch(field, "id_set", &other)),
    }
}

fn mismatch(field: &str, expected: &'static str, found: &PropValue) -> PropError {
    PropError::TypeMismatch {
        field: field.to_string(),
        expected,
        found: found.type_name(),
    }
}

#[cfg(test)]
mod tests {
    use super::{flavours, BlockKind, BlockModel, ListType, PropError};
    use crate::model::props::{fields, PropValue};

    #[test]
    fn list_model_round_trips_wire_fields() {
        let mut model = BlockModel::for_flavour(flavours::LIST);
        model
            .set(fields::TYPE, ListType::Numbered.into())
            .expect("type accepted");
        model.set(fields::ORDER, PropValue::Int(3)).expect("order accepted");

        let list = model.as_list().expect("list payload");
        assert_eq!(list.list_type, ListType::Numbered);
        assert_eq!(list.order, Some(3));
        assert_eq!(model.props().len(), 5);
    }

    #[test]
    fn rejects_wrong_shape_for_typed_field() {
        let mut model = BlockModel::for_flavour(flavours::GROUP);
        let err = model
            .set(fields::CHILD_IDS, PropValue::Null)
            .expect_err("null child ids must fail");
        assert!(matches!(err, PropError::TypeMismatch { expected: "id_set", .. }));
    }

    #[test]
    fn rejects_unknown_list_type() {
        let mut model = BlockModel::for_flavour(flavours::LIST);
        let err = model
            .set(fields::TYPE, PropValue::from("checkbox"))
            .expect_err("unknown list type must fail");
        assert!(matches!(err, PropError::InvalidValue { .. }));
    }

    #[test]
    fn unregistered_flavour_keeps_opaque_props() {
        let mut model = BlockModel::for_flavour("ext:embed-github");
        assert_eq!(model.kind(), BlockKind::Other);
        model
            .set("repo", PropValue::from("owner/name"))
            .expect("opaque props accept any field");
        assert_eq!(model.get("repo"), Some(PropValue::from("owner/name")));
    }
}
