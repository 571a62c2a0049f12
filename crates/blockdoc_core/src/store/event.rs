//! Change events emitted by the document store.
//!
//! # Invariants
//! - `update_block` emits exactly one `Updated` event per call.
//! - `Deleted` events carry the last known properties of the removed block.
//! - `local == false` marks events replayed from undo/redo or a remote source.

use crate::disposable::DisposeHandle;
use crate::model::block::BlockId;
use crate::model::props::PropMap;
use crate::store::DocStore;
use crate::watcher::WatcherError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Added,
    Updated,
    Deleted,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

/// One block-level change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub id: BlockId,
    pub flavour: String,
    pub kind: ChangeKind,
    /// Patched fields for `Updated`; full property map otherwise.
    pub props: PropMap,
    pub local: bool,
}

impl ChangeEvent {
    /// Returns whether this event carries `field`.
    pub fn touches(&self, field: &str) -> bool {
        self.props.contains_key(field)
    }
}

/// Origin predicate for subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Any,
    Local,
    Remote,
}

/// Filtered view over the change stream.
///
/// Empty `kinds` matches every kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
    origin: Origin,
    kinds: Vec<ChangeKind>,
    flavour: Option<String>,
}

impl EventFilter {
    pub fn all() -> Self {
        Self {
            origin: Origin::Any,
            kinds: Vec::new(),
            flavour: None,
        }
    }

    pub fn local_only() -> Self {
        Self {
            origin: Origin::Local,
            ..Self::all()
        }
    }

    pub fn remote_only() -> Self {
        Self {
            origin: Origin::Remote,
            ..Self::all()
        }
    }

    pub fn kind(mut self, kind: ChangeKind) -> Self {
        if !self.kinds.contains(&kind) {
            self.kinds.push(kind);
        }
        self
    }

    pub fn flavour(mut self, flavour: &str) -> Self {
        self.flavour = Some(flavour.to_string());
        self
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        let origin_ok = match self.origin {
            Origin::Any => true,
            Origin::Local => event.local,
            Origin::Remote => !event.local,
        };
        origin_ok
            && (self.kinds.is_empty() || self.kinds.contains(&event.kind))
            && self
                .flavour
                .as_deref()
                .map_or(true, |flavour| flavour == event.flavour)
    }
}

impl Default for EventFilter {
    fn default() -> Self {
        Self::all()
    }
}

pub(crate) type ChangeHandler =
    Box<dyn FnMut(&mut DocStore, &ChangeEvent) -> Result<(), WatcherError>>;

pub(crate) struct Subscriber {
    pub(crate) name: String,
    pub(crate) handle: DisposeHandle,
    pub(crate) filter: EventFilter,
    pub(crate) handler: ChangeHandler,
}

#[cfg(test)]
mod tests {
    use super::{ChangeEvent, ChangeKind, EventFilter};
    use crate::model::block::{flavours, BlockId};
    use crate::model::props::PropMap;

    fn event(kind: ChangeKind, local: bool) -> ChangeEvent {
        ChangeEvent {
            id: BlockId::new("g1"),
            flavour: flavours::GROUP.to_string(),
            kind,
            props: PropMap::new(),
            local,
        }
    }

    #[test]
    fn local_filter_rejects_replayed_events() {
        let filter = EventFilter::local_only().kind(ChangeKind::Updated);
        assert!(filter.matches(&event(ChangeKind::Updated, true)));
        assert!(!filter.matches(&event(ChangeKind::Updated, false)));
        assert!(!filter.matches(&event(ChangeKind::Deleted, true)));
    }

    #[test]
    fn flavour_filter_compares_exactly() {
        let filter = EventFilter::all().flavour(flavours::LIST);
        assert!(!filter.matches(&event(ChangeKind::Added, true)));
        assert!(EventFilter::all()
            .flavour(flavours::GROUP)
            .matches(&event(ChangeKind::Added, false)));
    }
}
