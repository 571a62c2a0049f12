//! Document lifecycle service.
//!
//! # Responsibility
//! - Open documents from persisted snapshots, or create them with a page
//!   root when nothing is stored yet.
//! - Attach the default watchers plus a change journal to every opened
//!   document.
//! - Save snapshots and flush journaled events to the change log.
//!
//! # Invariants
//! - Root creation for a new document is not undoable.
//! - Journaled events are removed only after the repository accepted them.

use crate::config::DocOptions;
use crate::model::block::{flavours, BlockId};
use crate::model::props::PropPatch;
use crate::repo::doc_repo::{DocRepoError, DocRepository};
use crate::store::{DocStore, StoreError};
use crate::watcher::{ChangeJournal, WatcherRegistry};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

#[derive(Debug)]
pub enum DocServiceError {
    Repo(DocRepoError),
    Store(StoreError),
}

impl Display for DocServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repo(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for DocServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::Store(err) => Some(err),
        }
    }
}

impl From<DocRepoError> for DocServiceError {
    fn from(value: DocRepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<StoreError> for DocServiceError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// An opened document with its watchers attached.
///
/// Field order matters on drop: watchers detach before the store goes away.
pub struct OpenDoc {
    watchers: WatcherRegistry,
    journal: ChangeJournal,
    store: DocStore,
}

impl OpenDoc {
    pub fn store(&self) -> &DocStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut DocStore {
        &mut self.store
    }

    pub fn journal(&self) -> &ChangeJournal {
        &self.journal
    }

    pub fn watchers(&self) -> &WatcherRegistry {
        &self.watchers
    }

    pub fn root(&self) -> Option<&BlockId> {
        self.store.root()
    }
}

/// Use-case service over a document repository.
pub struct DocService<R: DocRepository> {
    repo: R,
    options: DocOptions,
}

impl<R: DocRepository> DocService<R> {
    pub fn new(repo: R, options: DocOptions) -> Self {
        Self { repo, options }
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }

    /// Loads `doc_id`, or creates it with an empty page root.
    pub fn open(&self, doc_id: &str) -> Result<OpenDoc, DocServiceError> {
        let started_at = Instant::now();
        let stored = self
            .repo
            .load_snapshot(doc_id)?
            .filter(|snapshot| snapshot.root.is_some());
        let created = stored.is_none();

        let mut store = match stored {
            Some(snapshot) => DocStore::from_snapshot(&snapshot, self.options.clone())?,
            None => DocStore::new(doc_id, self.options.clone().readonly(false)),
        };

        let journal = ChangeJournal::new();
        let mut watchers = WatcherRegistry::with_defaults(&mut store);
        if let Err(err) = watchers.attach(&mut store, &journal) {
            warn!(
                "event=doc_open module=service status=degraded doc_id={} error={}",
                doc_id, err
            );
        }

        if created {
            store.add_block(flavours::PAGE, PropPatch::new(), None, None)?;
            store.clear_history();
            store.set_readonly(self.options.readonly);
        }

        info!(
            "event=doc_open module=service status=ok doc_id={} created={} blocks={} duration_ms={}",
            doc_id,
            created,
            store.len(),
            started_at.elapsed().as_millis()
        );
        Ok(OpenDoc {
            watchers,
            journal,
            store,
        })
    }

    /// Persists the current document image.
    pub fn save(&self, doc: &OpenDoc) -> Result<(), DocServiceError> {
        let snapshot = doc.store.snapshot();
        self.repo.save_snapshot(&snapshot).map_err(|err| {
            warn!(
                "event=doc_save module=service status=error doc_id={} error={}",
                snapshot.doc_id, err
            );
            err
        })?;
        info!(
            "event=doc_save module=service status=ok doc_id={} blocks={}",
            snapshot.doc_id,
            snapshot.blocks.len()
        );
        Ok(())
    }

    /// Writes journaled events to the change log and returns the row count.
    pub fn flush_journal(&self, doc: &OpenDoc) -> Result<usize, DocServiceError> {
        let pending = doc.journal.entries();
        let written = self.repo.append_changes(doc.store.doc_id(), &pending)?;
        doc.journal.discard(written);
        Ok(written)
    }

    /// Saves the snapshot, then flushes the journal.
    pub fn checkpoint(&self, doc: &OpenDoc) -> Result<usize, DocServiceError> {
        self.save(doc)?;
        self.flush_journal(doc)
    }
}
