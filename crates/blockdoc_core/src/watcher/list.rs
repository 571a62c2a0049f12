//! List consistency: `order` is an integer exactly when `type == numbered`.
//!
//! # Invariants
//! - A numbered list without order takes the next order after its previous
//!   numbered sibling; existing siblings are never renumbered.
//! - A non-numbered list always has a null order.
//! - Corrections only fire on a violating state, so a re-run on a consistent
//!   list issues no mutation.

use crate::disposable::Disposable;
use crate::model::block::{flavours, BlockId, ListType};
use crate::model::props::{fields, PropPatch, PropValue};
use crate::reactive::PropSignal;
use crate::store::{ChangeKind, DocStore, EventFilter, StoreResult};
use crate::watcher::Watcher;
use log::debug;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub const LIST_LIFECYCLE_WATCHER: &str = "list-lifecycle";

/// Correction required to restore the order invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderFix {
    /// Numbered without order: derive it from the previous sibling.
    FillFromPrev,
    /// Not numbered but ordered: clear it.
    Clear,
}

/// Returns the correction for a `(type, order)` pair, if any.
pub fn order_fix(list_type: ListType, order: Option<i64>) -> Option<OrderFix> {
    match (list_type, order) {
        (ListType::Numbered, None) => Some(OrderFix::FillFromPrev),
        (ListType::Numbered, Some(_)) => None,
        (_, Some(_)) => Some(OrderFix::Clear),
        (_, None) => None,
    }
}

/// Order a numbered list would take after its previous siblings.
///
/// Walks back over contiguous numbered siblings until one with an order is
/// found; starts at 1 when the run has no ordered member.
pub fn next_order_from_prev(store: &DocStore, id: &BlockId) -> i64 {
    let mut steps = 1;
    let mut cursor = store.prev_sibling(id);
    while let Some(block) = cursor {
        match block.model().as_list() {
            Some(list) if list.list_type == ListType::Numbered => {
                if let Some(order) = list.order {
                    return order + steps;
                }
                steps += 1;
                cursor = store.prev_sibling(block.id());
            }
            _ => break,
        }
    }
    steps
}

/// Assigns `id` the order following its previous numbered sibling.
pub fn correct_numbered_order_to_prev(store: &mut DocStore, id: &BlockId) -> StoreResult<i64> {
    let order = next_order_from_prev(store, id);
    store.update_block(id, PropPatch::new().set(fields::ORDER, order))?;
    Ok(order)
}

/// Applies the pending correction for one list, untracked.
///
/// Returns whether a mutation was issued.
pub fn reconcile_list_order(store: &mut DocStore, id: &BlockId) -> StoreResult<bool> {
    let fix = match store
        .get_element_by_id(id)
        .and_then(|block| block.model().as_list())
    {
        Some(list) => order_fix(list.list_type, list.order),
        None => return Ok(false),
    };
    match fix {
        Some(fix) => {
            apply_fix(store, id, fix)?;
            Ok(true)
        }
        None => Ok(false),
    }
}

fn apply_fix(store: &mut DocStore, id: &BlockId, fix: OrderFix) -> StoreResult<()> {
    match fix {
        OrderFix::FillFromPrev => {
            let order = correct_numbered_order_to_prev(store, id)?;
            debug!(
                "event=list_order_fill module=watcher status=ok doc_id={} block_id={} order={}",
                store.doc_id(),
                id,
                order
            );
        }
        OrderFix::Clear => {
            store.update_block(id, PropPatch::new().set(fields::ORDER, PropValue::Null))?;
            debug!(
                "event=list_order_clear module=watcher status=ok doc_id={} block_id={}",
                store.doc_id(),
                id
            );
        }
    }
    Ok(())
}

/// Per-block watcher: two computations over `(type, order)`, one per fix.
#[derive(Debug, Clone)]
pub struct ListConsistencyWatcher {
    block: BlockId,
    name: String,
}

impl ListConsistencyWatcher {
    pub fn new(block: BlockId) -> Self {
        let name = format!("list-consistency:{block}");
        Self { block, name }
    }

    fn computation(&self, store: &mut DocStore, wanted: OrderFix) -> Disposable {
        let block = self.block.clone();
        let list_type = PropSignal::<ListType>::new(block.clone(), fields::TYPE);
        let order = PropSignal::<Option<i64>>::new(block.clone(), fields::ORDER);
        store.effect(&self.name, move |cx| {
            // Both reads are tracked so either field re-triggers the check.
            let current_type = list_type.value(cx);
            let current_order = order.value(cx);
            // Tracked so that lifting read-only mode re-checks the list.
            let readonly = cx.peek_store().readonly_signal();
            if readonly.value(cx).unwrap_or(false) {
                return Ok(());
            }
            let (Some(current_type), Some(current_order)) = (current_type, current_order) else {
                return Ok(());
            };
            if order_fix(current_type, current_order) == Some(wanted) {
                apply_fix(cx.store(), &block, wanted)?;
            }
            Ok(())
        })
    }
}

impl Watcher for ListConsistencyWatcher {
    fn name(&self) -> &str {
        &self.name
    }

    fn attach(&self, store: &mut DocStore) -> Disposable {
        let mut disposable = self.computation(store, OrderFix::FillFromPrev);
        disposable.add(self.computation(store, OrderFix::Clear));
        disposable
    }
}

/// Attaches list consistency to every list block for as long as it exists.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListLifecycleWatcher;

type AttachedLists = Rc<RefCell<HashMap<BlockId, Disposable>>>;

fn track_list(store: &mut DocStore, attached: &AttachedLists, id: &BlockId) {
    if attached.borrow().contains_key(id) {
        return;
    }
    let disposable = ListConsistencyWatcher::new(id.clone()).attach(store);
    attached.borrow_mut().insert(id.clone(), disposable);
}

impl Watcher for ListLifecycleWatcher {
    fn name(&self) -> &str {
        LIST_LIFECYCLE_WATCHER
    }

    fn attach(&self, store: &mut DocStore) -> Disposable {
        let attached: AttachedLists = Rc::default();
        let existing: Vec<BlockId> = store
            .blocks_by_flavour(flavours::LIST)
            .into_iter()
            .map(|block| block.id().clone())
            .collect();
        for id in &existing {
            track_list(store, &attached, id);
        }

        let tracked = Rc::clone(&attached);
        let mut disposable = store.subscribe(
            LIST_LIFECYCLE_WATCHER,
            EventFilter::all().flavour(flavours::LIST),
            move |store, event| {
                match event.kind {
                    ChangeKind::Added => track_list(store, &tracked, &event.id),
                    ChangeKind::Deleted => {
                        let removed = tracked.borrow_mut().remove(&event.id);
                        if let Some(mut disposable) = removed {
                            disposable.dispose();
                        }
                    }
                    ChangeKind::Updated => {}
                }
                Ok(())
            },
        );
        disposable.add(Disposable::on_dispose(move || {
            for (_, mut disposable) in attached.borrow_mut().drain() {
                disposable.dispose();
            }
        }));
        disposable
    }
}
