//! Typed cells over block properties and local view state.

use crate::model::block::BlockId;
use crate::model::props::{FromPropValue, PropPatch, PropValue};
use crate::reactive::{DepKey, EvalContext};
use crate::store::{DocStore, StoreResult};
use std::fmt::{Debug, Formatter};
use std::marker::PhantomData;

/// Observable view of one block property.
///
/// Holds only the block id; the value is resolved through the store on every
/// read, so a signal never outlives the data it points at.
pub struct PropSignal<T> {
    block: BlockId,
    field: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T: FromPropValue> PropSignal<T> {
    pub fn new(block: BlockId, field: impl Into<String>) -> Self {
        Self {
            block,
            field: field.into(),
            _marker: PhantomData,
        }
    }

    pub fn block(&self) -> &BlockId {
        &self.block
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    /// Tracked read. `None` when the block is gone or the value has another
    /// shape.
    pub fn value(&self, cx: &mut EvalContext<'_>) -> Option<T> {
        cx.track(DepKey::Prop(self.block.clone(), self.field.clone()));
        self.peek(cx.peek_store())
    }

    /// Untracked read.
    pub fn peek(&self, store: &DocStore) -> Option<T> {
        let value = store.get_element_by_id(&self.block)?.get(&self.field)?;
        T::from_prop(&value)
    }

    /// Writes through `DocStore::update_block`.
    pub fn set(&self, store: &mut DocStore, value: impl Into<PropValue>) -> StoreResult<()> {
        store.update_block(
            &self.block,
            PropPatch::new().set(self.field.clone(), value),
        )
    }
}

impl<T> Clone for PropSignal<T> {
    fn clone(&self) -> Self {
        Self {
            block: self.block.clone(),
            field: self.field.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> Debug for PropSignal<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropSignal")
            .field("block", &self.block)
            .field("field", &self.field)
            .finish()
    }
}

/// Cell that lives in the store's runtime but not in the document.
///
/// Writes are not recorded in history and are allowed on read-only documents.
pub struct LocalSignal<T> {
    id: u64,
    _marker: PhantomData<fn() -> T>,
}

impl<T> LocalSignal<T>
where
    T: FromPropValue + Into<PropValue>,
{
    pub(crate) fn new(store: &mut DocStore, initial: T) -> Self {
        Self::from_id(store.runtime.create_local(initial.into()))
    }

    pub(crate) fn from_id(id: u64) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    pub fn value(&self, cx: &mut EvalContext<'_>) -> Option<T> {
        cx.track(DepKey::Local(self.id));
        self.peek(cx.peek_store())
    }

    pub fn peek(&self, store: &DocStore) -> Option<T> {
        store.runtime.local(self.id).and_then(T::from_prop)
    }

    pub fn set(&self, store: &mut DocStore, value: T) {
        store.set_local(self.id, value.into());
    }
}

impl<T> Clone for LocalSignal<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for LocalSignal<T> {}

impl<T> Debug for LocalSignal<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSignal").field("id", &self.id).finish()
    }
}
