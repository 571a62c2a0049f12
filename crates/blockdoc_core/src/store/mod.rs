//! Document store: the single mutation gateway for one block document.
//!
//! # Responsibility
//! - Own every block of the document and its parent/children links.
//! - Apply mutations atomically, record undo history and queue change events.
//! - Settle after each mutation: deliver queued events to subscribers and
//!   re-run dirty reactive computations until nothing is pending.
//!
//! # Invariants
//! - A mutation is validated completely before any state changes; a failed
//!   call leaves the document untouched and emits nothing.
//! - `update_block` emits exactly one `Updated` event per call.
//! - Reaction failures (errors or panics in subscribers and computations) are
//!   logged and counted, never returned to the mutator.
//! - Events produced while settling are delivered in the same settle pass.
//! - Undo/redo replay and remote application emit non-local events and are
//!   not recorded in local history.

pub mod error;
pub mod event;
pub(crate) mod history;

pub use error::{StoreError, StoreResult};
pub use event::{ChangeEvent, ChangeKind, EventFilter, Origin};

use crate::config::DocOptions;
use crate::disposable::{Disposable, DisposeHandle};
use crate::logging::panic_payload_text;
use crate::model::block::{Block, BlockId, BlockModel};
use crate::model::props::{FromPropValue, PropMap, PropPatch, PropValue};
use crate::model::schema::SchemaRegistry;
use crate::model::snapshot::{BlockSnapshot, DocSnapshot};
use crate::reactive::{DepKey, EffectId, EvalContext, LocalSignal, PropSignal, Runtime};
use crate::watcher::WatcherError;
use event::Subscriber;
use history::{History, HistoryEntry, PriorValues, UndoUnit};
use log::{debug, error, warn};
use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};

/// Mutation received from a remote peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteOp {
    /// Insert one block under `block.parent`; `index` defaults to the end.
    Add {
        block: BlockSnapshot,
        index: Option<usize>,
    },
    Update {
        id: BlockId,
        patch: PropPatch,
    },
    Delete {
        id: BlockId,
    },
}

/// Owner of one block document.
pub struct DocStore {
    doc_id: String,
    options: DocOptions,
    schema: SchemaRegistry,
    blocks: HashMap<BlockId, Block>,
    root: Option<BlockId>,
    history: History,
    recording: bool,
    subscribers: Vec<Subscriber>,
    pending: VecDeque<ChangeEvent>,
    pub(crate) runtime: Runtime,
    readonly: LocalSignal<bool>,
    settling: bool,
    failed_reactions: usize,
}

impl DocStore {
    /// Creates an empty document with the builtin schema.
    pub fn new(doc_id: &str, options: DocOptions) -> Self {
        Self::with_schema(doc_id, options, SchemaRegistry::with_builtin())
    }

    pub fn with_schema(doc_id: &str, options: DocOptions, schema: SchemaRegistry) -> Self {
        let history = History::new(options.history_limit);
        let mut runtime = Runtime::default();
        let readonly = LocalSignal::from_id(runtime.create_local(options.readonly.into()));
        Self {
            doc_id: doc_id.to_string(),
            options,
            schema,
            blocks: HashMap::new(),
            root: None,
            history,
            recording: true,
            subscribers: Vec::new(),
            pending: VecDeque::new(),
            runtime,
            readonly,
            settling: false,
            failed_reactions: 0,
        }
    }

    /// Rebuilds a document from a snapshot with the builtin schema.
    ///
    /// No events are emitted; watchers attached afterwards see the loaded
    /// blocks as existing state.
    pub fn from_snapshot(snapshot: &DocSnapshot, options: DocOptions) -> StoreResult<Self> {
        Self::from_snapshot_with_schema(snapshot, options, SchemaRegistry::with_builtin())
    }

    pub fn from_snapshot_with_schema(
        snapshot: &DocSnapshot,
        options: DocOptions,
        schema: SchemaRegistry,
    ) -> StoreResult<Self> {
        let mut store = Self::with_schema(&snapshot.doc_id, options, schema);
        for image in &snapshot.blocks {
            if store.blocks.contains_key(&image.id) {
                return Err(StoreError::DuplicateId(image.id.clone()));
            }
            let block = image.restore().map_err(|source| StoreError::InvalidProp {
                id: image.id.clone(),
                source,
            })?;
            store.blocks.insert(block.id.clone(), block);
        }
        store.root = snapshot.root.clone();
        store.verify_links()?;
        Ok(store)
    }

    pub fn doc_id(&self) -> &str {
        &self.doc_id
    }

    pub fn options(&self) -> &DocOptions {
        &self.options
    }

    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    pub fn is_readonly(&self) -> bool {
        self.options.readonly
    }

    /// Toggles read-only mode. Computations that read `readonly_signal`
    /// re-run when the mode changes.
    pub fn set_readonly(&mut self, readonly: bool) {
        self.options.readonly = readonly;
        let cell = self.readonly;
        cell.set(self, readonly);
    }

    /// Tracked view of the read-only flag.
    pub fn readonly_signal(&self) -> LocalSignal<bool> {
        self.readonly
    }

    /// Non-failing lookup.
    pub fn get_element_by_id(&self, id: &BlockId) -> Option<&Block> {
        self.blocks.get(id)
    }

    pub fn contains(&self, id: &BlockId) -> bool {
        self.blocks.contains_key(id)
    }

    pub fn root(&self) -> Option<&BlockId> {
        self.root.as_ref()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn parent(&self, id: &BlockId) -> Option<&BlockId> {
        self.blocks.get(id)?.parent.as_ref()
    }

    /// Child ids in order; empty when `id` is absent.
    pub fn children(&self, id: &BlockId) -> &[BlockId] {
        self.blocks
            .get(id)
            .map_or(&[][..], |block| block.children.as_slice())
    }

    /// Position of `id` among its siblings.
    pub fn index_of(&self, id: &BlockId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|child| child == id)
    }

    pub fn prev_sibling(&self, id: &BlockId) -> Option<&Block> {
        let index = self.index_of(id)?;
        let parent = self.parent(id)?;
        let sibling = self.children(parent).get(index.checked_sub(1)?)?;
        self.blocks.get(sibling)
    }

    pub fn next_sibling(&self, id: &BlockId) -> Option<&Block> {
        let index = self.index_of(id)?;
        let parent = self.parent(id)?;
        let sibling = self.children(parent).get(index + 1)?;
        self.blocks.get(sibling)
    }

    /// Nearest block with `flavour`, starting at `id` itself.
    pub fn closest(&self, id: &BlockId, flavour: &str) -> Option<&Block> {
        let mut cursor = self.blocks.get(id);
        while let Some(block) = cursor {
            if block.flavour == flavour {
                return Some(block);
            }
            cursor = block.parent.as_ref().and_then(|parent| self.blocks.get(parent));
        }
        None
    }

    /// Every block reachable from the root, in pre-order.
    pub fn blocks(&self) -> Vec<&Block> {
        match &self.root {
            Some(root) => self
                .collect_subtree(root)
                .iter()
                .filter_map(|id| self.blocks.get(id))
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn blocks_by_flavour(&self, flavour: &str) -> Vec<&Block> {
        self.blocks()
            .into_iter()
            .filter(|block| block.flavour == flavour)
            .collect()
    }

    pub fn snapshot(&self) -> DocSnapshot {
        DocSnapshot {
            doc_id: self.doc_id.clone(),
            root: self.root.clone(),
            blocks: self.blocks().into_iter().map(BlockSnapshot::capture).collect(),
        }
    }

    /// Inserts a new block under `parent` (or as root) at `index`
    /// (default: last).
    pub fn add_block(
        &mut self,
        flavour: &str,
        props: PropPatch,
        parent: Option<&BlockId>,
        index: Option<usize>,
    ) -> StoreResult<BlockId> {
        self.ensure_writable()?;
        let mut model = BlockModel::for_flavour(flavour);
        let id = BlockId::generate();
        for (field, value) in props.iter() {
            model
                .set(field, value.clone())
                .map_err(|source| StoreError::InvalidProp {
                    id: id.clone(),
                    source,
                })?;
        }
        let image = BlockSnapshot {
            id: id.clone(),
            flavour: flavour.to_string(),
            parent: parent.cloned(),
            children: Vec::new(),
            props: model.props(),
        };
        let index = index
            .unwrap_or(usize::MAX)
            .min(parent.map_or(0, |parent| self.children(parent).len()));
        let subtree = vec![image];
        self.insert_subtree(&subtree, index, true)?;
        self.record(HistoryEntry::Added { subtree, index });
        debug!(
            "event=block_add module=store status=ok doc_id={} block_id={} flavour={}",
            self.doc_id, id, flavour
        );
        self.settle();
        Ok(id)
    }

    /// Applies `patch` to one block atomically.
    ///
    /// # Errors
    /// - `NotFound` when the block is absent.
    /// - `ReadOnly` on a read-only document.
    /// - `InvalidProp` when any field is rejected; nothing is applied.
    pub fn update_block(&mut self, id: &BlockId, patch: PropPatch) -> StoreResult<()> {
        self.ensure_writable()?;
        let before = self.patch_block(id, &patch, true)?;
        debug!(
            "event=block_update module=store status=ok doc_id={} block_id={} fields={}",
            self.doc_id,
            id,
            patch.len()
        );
        self.record(HistoryEntry::Updated {
            id: id.clone(),
            before,
            after: patch.into_map(),
        });
        self.settle();
        Ok(())
    }

    /// Detaches `id` from its parent and removes it with its descendants.
    ///
    /// Emits one `Deleted` event per removed block, descendants first.
    pub fn delete_element(&mut self, id: &BlockId) -> StoreResult<()> {
        self.ensure_writable()?;
        let (subtree, index) = self.remove_subtree(id, true)?;
        debug!(
            "event=block_delete module=store status=ok doc_id={} block_id={} removed={}",
            self.doc_id,
            id,
            subtree.len()
        );
        self.record(HistoryEntry::Removed { subtree, index });
        self.settle();
        Ok(())
    }

    /// Closes the current undo unit. Does not mutate data.
    pub fn capture_sync(&mut self) {
        self.history.capture();
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Rolls back the latest undo unit. Returns `false` when there is none.
    pub fn undo(&mut self) -> StoreResult<bool> {
        self.ensure_writable()?;
        let Some(unit) = self.history.take_undo() else {
            return Ok(false);
        };
        self.replay(&unit, false);
        self.history.push_undone(unit);
        Ok(true)
    }

    /// Re-applies the latest undone unit. Returns `false` when there is none.
    pub fn redo(&mut self) -> StoreResult<bool> {
        self.ensure_writable()?;
        let Some(unit) = self.history.take_redo() else {
            return Ok(false);
        };
        self.replay(&unit, true);
        self.history.push_redone(unit);
        Ok(true)
    }

    /// Applies remote operations in order as non-local changes.
    ///
    /// Stops at the first rejected operation; operations before it stay
    /// applied and their events are still delivered.
    pub fn apply_remote(&mut self, ops: Vec<RemoteOp>) -> StoreResult<()> {
        let previous = std::mem::replace(&mut self.recording, false);
        let total = ops.len();
        let mut result = Ok(());
        for op in ops {
            let applied = match op {
                RemoteOp::Add { mut block, index } => {
                    block.children.clear();
                    let len = block
                        .parent
                        .as_ref()
                        .map_or(0, |parent| self.children(parent).len());
                    let index = index.unwrap_or(len).min(len);
                    self.insert_subtree(&[block], index, false)
                }
                RemoteOp::Update { id, patch } => self.patch_block(&id, &patch, false).map(|_| ()),
                RemoteOp::Delete { id } => self.remove_subtree(&id, false).map(|_| ()),
            };
            if let Err(err) = applied {
                result = Err(err);
                break;
            }
        }
        self.settle();
        self.recording = previous;
        match &result {
            Ok(()) => debug!(
                "event=remote_apply module=store status=ok doc_id={} ops={}",
                self.doc_id, total
            ),
            Err(err) => warn!(
                "event=remote_apply module=store status=error doc_id={} ops={} error={}",
                self.doc_id, total, err
            ),
        }
        result
    }

    /// Subscribes `handler` to changes matching `filter`.
    ///
    /// Subscriptions added while an event is delivered start with the next
    /// event.
    pub fn subscribe<F>(&mut self, name: &str, filter: EventFilter, handler: F) -> Disposable
    where
        F: FnMut(&mut DocStore, &ChangeEvent) -> Result<(), WatcherError> + 'static,
    {
        let handle = DisposeHandle::new();
        self.subscribers.push(Subscriber {
            name: name.to_string(),
            handle: handle.clone(),
            filter,
            handler: Box::new(handler),
        });
        Disposable::from_handle(handle)
    }

    /// Registers a reactive computation, runs it and re-runs it whenever a
    /// cell it read changes.
    pub fn effect<F>(&mut self, name: &str, computation: F) -> Disposable
    where
        F: FnMut(&mut EvalContext<'_>) -> Result<(), WatcherError> + 'static,
    {
        let handle = self.runtime.register(name, Box::new(computation));
        self.settle();
        Disposable::from_handle(handle)
    }

    pub fn signal<T: FromPropValue>(&self, id: &BlockId, field: &str) -> PropSignal<T> {
        PropSignal::new(id.clone(), field)
    }

    pub fn local_signal<T>(&mut self, initial: T) -> LocalSignal<T>
    where
        T: FromPropValue + Into<PropValue>,
    {
        LocalSignal::new(self, initial)
    }

    /// Local cell released together with the returned disposer.
    pub fn scoped_local_signal<T>(&mut self, initial: T) -> (LocalSignal<T>, Disposable)
    where
        T: FromPropValue + Into<PropValue>,
    {
        let (id, handle) = self.runtime.create_owned_local(initial.into());
        (LocalSignal::from_id(id), Disposable::from_handle(handle))
    }

    pub(crate) fn set_local(&mut self, id: u64, value: PropValue) {
        if self.runtime.set_local(id, value) {
            self.settle();
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .iter()
            .filter(|subscriber| subscriber.handle.is_active())
            .count()
    }

    pub fn effect_count(&self) -> usize {
        self.runtime.live_effects()
    }

    /// Local cells not yet released, including the read-only flag.
    pub fn local_count(&self) -> usize {
        self.runtime.live_locals()
    }

    /// Reactions that returned an error or panicked since creation.
    pub fn failed_reactions(&self) -> usize {
        self.failed_reactions
    }

    fn ensure_writable(&self) -> StoreResult<()> {
        if self.options.readonly {
            return Err(StoreError::ReadOnly);
        }
        Ok(())
    }

    fn record(&mut self, entry: HistoryEntry) {
        if self.recording {
            self.history.record(entry);
        }
    }

    fn collect_subtree(&self, id: &BlockId) -> Vec<BlockId> {
        let mut ordered = Vec::new();
        let mut stack = vec![id.clone()];
        while let Some(next) = stack.pop() {
            if let Some(block) = self.blocks.get(&next) {
                stack.extend(block.children.iter().rev().cloned());
            }
            ordered.push(next);
        }
        ordered
    }

    fn notify_fields<'f>(&mut self, id: &BlockId, fields: impl Iterator<Item = &'f String>) {
        for field in fields {
            self.runtime.notify(&DepKey::Prop(id.clone(), field.clone()));
        }
    }

    /// Inserts pre-order images; the first image is attached to its parent at
    /// `index`, the rest keep their recorded links.
    fn insert_subtree(
        &mut self,
        subtree: &[BlockSnapshot],
        index: usize,
        local: bool,
    ) -> StoreResult<()> {
        let Some(top) = subtree.first() else {
            return Ok(());
        };
        if let Some(image) = subtree.iter().find(|image| self.blocks.contains_key(&image.id)) {
            return Err(StoreError::DuplicateId(image.id.clone()));
        }
        match &top.parent {
            Some(parent_id) => {
                let parent = self
                    .blocks
                    .get(parent_id)
                    .ok_or_else(|| StoreError::NotFound(parent_id.clone()))?;
                self.schema
                    .validate_placement(&top.flavour, Some(&parent.flavour))?;
            }
            None => {
                if let Some(root) = &self.root {
                    return Err(StoreError::RootExists(root.clone()));
                }
                self.schema.validate_placement(&top.flavour, None)?;
            }
        }
        let mut restored = Vec::with_capacity(subtree.len());
        for image in subtree {
            let block = image.restore().map_err(|source| StoreError::InvalidProp {
                id: image.id.clone(),
                source,
            })?;
            restored.push(block);
        }

        match &top.parent {
            Some(parent_id) => {
                if let Some(parent) = self.blocks.get_mut(parent_id) {
                    let at = index.min(parent.children.len());
                    parent.children.insert(at, top.id.clone());
                }
            }
            None => self.root = Some(top.id.clone()),
        }
        for block in restored {
            let props = block.model.props();
            self.notify_fields(&block.id, props.keys());
            self.pending.push_back(ChangeEvent {
                id: block.id.clone(),
                flavour: block.flavour.clone(),
                kind: ChangeKind::Added,
                props,
                local,
            });
            self.blocks.insert(block.id.clone(), block);
        }
        Ok(())
    }

    /// Removes `id` with its descendants; returns pre-order images and the
    /// former sibling index.
    fn remove_subtree(
        &mut self,
        id: &BlockId,
        local: bool,
    ) -> StoreResult<(Vec<BlockSnapshot>, usize)> {
        let parent = self
            .blocks
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?
            .parent
            .clone();
        let ordered = self.collect_subtree(id);
        let subtree: Vec<BlockSnapshot> = ordered
            .iter()
            .filter_map(|block_id| self.blocks.get(block_id))
            .map(BlockSnapshot::capture)
            .collect();

        let index = match &parent {
            Some(parent_id) => match self.blocks.get_mut(parent_id) {
                Some(parent) => {
                    let position = parent.children.iter().position(|child| child == id);
                    if let Some(position) = position {
                        parent.children.remove(position);
                    }
                    position.unwrap_or(parent.children.len())
                }
                None => 0,
            },
            None => {
                self.root = None;
                0
            }
        };

        for block_id in ordered.iter().rev() {
            if let Some(block) = self.blocks.remove(block_id) {
                let props = block.model.props();
                self.notify_fields(&block.id, props.keys());
                self.pending.push_back(ChangeEvent {
                    id: block.id,
                    flavour: block.flavour,
                    kind: ChangeKind::Deleted,
                    props,
                    local,
                });
            }
        }
        Ok((subtree, index))
    }

    /// Validates and applies a patch; returns the replaced values.
    fn patch_block(
        &mut self,
        id: &BlockId,
        patch: &PropPatch,
        local: bool,
    ) -> StoreResult<PriorValues> {
        let writes: PriorValues = patch
            .iter()
            .map(|(field, value)| (field.clone(), Some(value.clone())))
            .collect();
        self.write_props(id, &writes, local)
    }

    /// Applies field writes atomically; `None` removes the field. Emits one
    /// `Updated` event where removed fields appear as `Null`.
    fn write_props(
        &mut self,
        id: &BlockId,
        writes: &PriorValues,
        local: bool,
    ) -> StoreResult<PriorValues> {
        let block = self
            .blocks
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        let mut next = block.model.clone();
        let mut before = PriorValues::new();
        for (field, value) in writes {
            before.insert(field.clone(), block.model.get(field));
            let written = match value {
                Some(value) => next.set(field, value.clone()),
                None => next.unset(field),
            };
            written.map_err(|source| StoreError::InvalidProp {
                id: id.clone(),
                source,
            })?;
        }
        let changed: Vec<String> = writes
            .keys()
            .filter(|field| block.model.get(field) != next.get(field))
            .cloned()
            .collect();
        block.model = next;
        let props: PropMap = writes
            .iter()
            .map(|(field, value)| (field.clone(), value.clone().unwrap_or(PropValue::Null)))
            .collect();
        let event = ChangeEvent {
            id: id.clone(),
            flavour: block.flavour.clone(),
            kind: ChangeKind::Updated,
            props,
            local,
        };
        self.notify_fields(id, changed.iter());
        self.pending.push_back(event);
        Ok(before)
    }

    fn replay(&mut self, unit: &UndoUnit, forward: bool) {
        let previous = std::mem::replace(&mut self.recording, false);
        let entries: Vec<&HistoryEntry> = if forward {
            unit.entries.iter().collect()
        } else {
            unit.entries.iter().rev().collect()
        };
        for entry in entries {
            let result = if forward {
                self.reapply(entry)
            } else {
                self.revert(entry)
            };
            if let Err(err) = result {
                warn!(
                    "event=history_replay module=store status=skipped doc_id={} direction={} error={}",
                    self.doc_id,
                    if forward { "redo" } else { "undo" },
                    err
                );
            }
        }
        self.settle();
        self.recording = previous;
    }

    fn revert(&mut self, entry: &HistoryEntry) -> StoreResult<()> {
        match entry {
            HistoryEntry::Added { subtree, .. } => match subtree.first() {
                Some(top) => self.remove_subtree(&top.id, false).map(|_| ()),
                None => Ok(()),
            },
            HistoryEntry::Removed { subtree, index } => self.insert_subtree(subtree, *index, false),
            HistoryEntry::Updated { id, before, .. } => {
                self.write_props(id, before, false).map(|_| ())
            }
        }
    }

    fn reapply(&mut self, entry: &HistoryEntry) -> StoreResult<()> {
        match entry {
            HistoryEntry::Added { subtree, index } => self.insert_subtree(subtree, *index, false),
            HistoryEntry::Removed { subtree, .. } => match subtree.first() {
                Some(top) => self.remove_subtree(&top.id, false).map(|_| ()),
                None => Ok(()),
            },
            HistoryEntry::Updated { id, after, .. } => self
                .patch_block(id, &PropPatch::from(after.clone()), false)
                .map(|_| ()),
        }
    }

    fn verify_links(&self) -> StoreResult<()> {
        let corrupt = |details: String| -> StoreResult<()> {
            Err(StoreError::CorruptSnapshot(details))
        };
        match &self.root {
            Some(root) => match self.blocks.get(root) {
                Some(block) if block.parent.is_none() => {
                    self.schema.validate_placement(&block.flavour, None)?;
                }
                Some(_) => return corrupt(format!("root {root} has a parent")),
                None => return corrupt(format!("root {root} is missing")),
            },
            None if !self.blocks.is_empty() => return corrupt("blocks without root".to_string()),
            None => {}
        }
        for block in self.blocks.values() {
            match &block.parent {
                Some(parent_id) => {
                    let linked = self
                        .blocks
                        .get(parent_id)
                        .is_some_and(|parent| parent.children.contains(&block.id));
                    if !linked {
                        return corrupt(format!("{} is not linked from its parent", block.id));
                    }
                }
                None if self.root.as_ref() != Some(&block.id) => {
                    return corrupt(format!("{} has no parent", block.id));
                }
                None => {}
            }
            for child in &block.children {
                let owned = self
                    .blocks
                    .get(child)
                    .is_some_and(|candidate| candidate.parent.as_ref() == Some(&block.id));
                if !owned {
                    return corrupt(format!("{} lists foreign child {child}", block.id));
                }
            }
        }
        Ok(())
    }

    /// Delivers queued events and runs dirty computations until quiescent.
    ///
    /// Each computation may run at most `max_reaction_runs` times per pass;
    /// further marks are dropped and counted as failed reactions. The
    /// computation keeps its dependencies and re-runs on the next change.
    ///
    /// Re-entrant calls return immediately; the outer pass picks up their
    /// work.
    fn settle(&mut self) {
        if self.settling {
            return;
        }
        self.settling = true;
        let mut runs: HashMap<EffectId, usize> = HashMap::new();
        loop {
            if let Some(event) = self.pending.pop_front() {
                self.dispatch(&event);
                continue;
            }
            let Some(effect_id) = self.runtime.pop_dirty() else {
                break;
            };
            let count = runs.entry(effect_id).or_default();
            if *count >= self.options.max_reaction_runs {
                self.failed_reactions += 1;
                error!(
                    "event=reaction_budget_exceeded module=store status=error doc_id={} effect_id={} runs={}",
                    self.doc_id, effect_id, self.options.max_reaction_runs
                );
                continue;
            }
            *count += 1;
            self.run_effect(effect_id);
        }
        self.runtime.prune();
        self.settling = false;
    }

    fn dispatch(&mut self, event: &ChangeEvent) {
        let mut subscribers = std::mem::take(&mut self.subscribers);
        for subscriber in subscribers.iter_mut() {
            if !subscriber.handle.is_active() || !subscriber.filter.matches(event) {
                continue;
            }
            let handler = &mut subscriber.handler;
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(&mut *self, event)));
            self.report_reaction("subscriber", &subscriber.name, outcome);
        }
        let added = std::mem::replace(&mut self.subscribers, subscribers);
        self.subscribers.extend(added);
        self.subscribers
            .retain(|subscriber| subscriber.handle.is_active());
    }

    fn run_effect(&mut self, id: EffectId) {
        let Some((name, mut runner)) = self.runtime.take_runner(id) else {
            return;
        };
        let mut cx = EvalContext::new(self);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| runner(&mut cx)));
        let deps = cx.into_deps();
        self.runtime.restore_runner(id, runner, deps);
        self.report_reaction("effect", &name, outcome);
    }

    fn report_reaction(
        &mut self,
        source: &str,
        name: &str,
        outcome: std::thread::Result<Result<(), WatcherError>>,
    ) {
        let err = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(err)) => err,
            Err(payload) => WatcherError::Panicked(panic_payload_text(payload.as_ref())),
        };
        self.failed_reactions += 1;
        match &err {
            WatcherError::InvariantViolation { .. } | WatcherError::Panicked(_) => error!(
                "event=reaction_failed module=store status=error doc_id={} source={} name={} code={} error={}",
                self.doc_id,
                source,
                name,
                err.code(),
                err
            ),
            _ => warn!(
                "event=reaction_failed module=store status=error doc_id={} source={} name={} code={} error={}",
                self.doc_id,
                source,
                name,
                err.code(),
                err
            ),
        }
    }
}
