//! Relational watchers for group-like surface elements.
//!
//! # Invariants
//! - A group-like element whose `childIds` becomes empty through a local
//!   edit is deleted in the same settle pass.
//! - Non-local edits never trigger eviction; the replayed transaction is
//!   responsible for its own deletions.
//! - A locally deleted element is removed from every group listing it.

use crate::disposable::Disposable;
use crate::model::block::BlockId;
use crate::model::props::{fields, PropPatch, PropValue};
use crate::store::{ChangeEvent, ChangeKind, DocStore, EventFilter};
use crate::watcher::{Watcher, WatcherError};
use log::info;
use std::collections::BTreeSet;

pub const GROUP_RELATION_WATCHER: &str = "group-relation";
pub const GROUP_MEMBERSHIP_WATCHER: &str = "group-membership";

/// Deletes group-like elements left without members by a local edit.
#[derive(Debug, Clone, Copy, Default)]
pub struct GroupRelationWatcher;

impl Watcher for GroupRelationWatcher {
    fn name(&self) -> &str {
        GROUP_RELATION_WATCHER
    }

    fn attach(&self, store: &mut DocStore) -> Disposable {
        store.subscribe(
            GROUP_RELATION_WATCHER,
            EventFilter::local_only().kind(ChangeKind::Updated),
            evict_empty_group,
        )
    }
}

fn evict_empty_group(store: &mut DocStore, event: &ChangeEvent) -> Result<(), WatcherError> {
    if !event.touches(fields::CHILD_IDS) {
        return Ok(());
    }
    // Already removed by an earlier reaction in this pass.
    let Some(element) = store.get_element_by_id(&event.id) else {
        return Ok(());
    };
    let empty = match element.get(fields::CHILD_IDS) {
        Some(PropValue::IdSet(members)) => members.is_empty(),
        other => {
            return Err(WatcherError::InvariantViolation {
                id: event.id.clone(),
                details: format!(
                    "childIds holds {} instead of an id set",
                    other.as_ref().map_or("nothing", PropValue::type_name)
                ),
            });
        }
    };
    if empty {
        store.delete_element(&event.id)?;
        info!(
            "event=group_evict module=watcher status=ok doc_id={} block_id={}",
            store.doc_id(),
            event.id
        );
    }
    Ok(())
}

/// Removes locally deleted elements from the groups that list them.
#[derive(Debug, Clone, Copy, Default)]
pub struct GroupMembershipWatcher;

impl Watcher for GroupMembershipWatcher {
    fn name(&self) -> &str {
        GROUP_MEMBERSHIP_WATCHER
    }

    fn attach(&self, store: &mut DocStore) -> Disposable {
        store.subscribe(
            GROUP_MEMBERSHIP_WATCHER,
            EventFilter::local_only().kind(ChangeKind::Deleted),
            drop_deleted_member,
        )
    }
}

fn drop_deleted_member(store: &mut DocStore, event: &ChangeEvent) -> Result<(), WatcherError> {
    let owners: Vec<(BlockId, BTreeSet<BlockId>)> = store
        .blocks()
        .into_iter()
        .filter_map(|block| match block.get(fields::CHILD_IDS) {
            Some(PropValue::IdSet(mut members)) => members
                .remove(&event.id)
                .then(|| (block.id().clone(), members)),
            _ => None,
        })
        .collect();
    for (group, members) in owners {
        store.update_block(&group, PropPatch::new().set(fields::CHILD_IDS, members))?;
    }
    Ok(())
}
