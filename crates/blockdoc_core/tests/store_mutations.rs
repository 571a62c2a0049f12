use blockdoc_core::model::schema::{BlockRole, BlockSchema, SchemaError, SchemaRegistry};
use blockdoc_core::{
    fields, flavours, BlockId, BlockSnapshot, ChangeEvent, ChangeKind, DocOptions, DocStore,
    EventFilter, PropPatch, PropValue, RemoteOp, StoreError,
};
use std::cell::RefCell;
use std::rc::Rc;

struct Fixture {
    store: DocStore,
    root: BlockId,
    note: BlockId,
}

fn fixture() -> Fixture {
    let mut store = DocStore::new("doc-test", DocOptions::default());
    let root = store
        .add_block(flavours::PAGE, PropPatch::new(), None, None)
        .unwrap();
    let note = store
        .add_block(flavours::NOTE, PropPatch::new(), Some(&root), None)
        .unwrap();
    store.clear_history();
    Fixture { store, root, note }
}

fn record_events(store: &mut DocStore, filter: EventFilter) -> Rc<RefCell<Vec<ChangeEvent>>> {
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    let _subscription = store.subscribe("test-recorder", filter, move |_, event| {
        sink.borrow_mut().push(event.clone());
        Ok(())
    });
    events
}

fn paragraph(store: &mut DocStore, parent: &BlockId, text: &str) -> BlockId {
    store
        .add_block(
            flavours::PARAGRAPH,
            PropPatch::new().set(fields::TEXT, text),
            Some(parent),
            None,
        )
        .unwrap()
}

#[test]
fn lookup_of_missing_block_is_none() {
    let fx = fixture();
    assert!(fx.store.get_element_by_id(&BlockId::new("nope")).is_none());
    assert!(fx.store.get_element_by_id(&fx.note).is_some());
}

#[test]
fn update_and_delete_report_not_found() {
    let mut fx = fixture();
    let missing = BlockId::new("nope");

    let err = fx
        .store
        .update_block(&missing, PropPatch::new().set(fields::TEXT, "x"))
        .unwrap_err();
    assert_eq!(err, StoreError::NotFound(missing.clone()));

    let err = fx.store.delete_element(&missing).unwrap_err();
    assert_eq!(err, StoreError::NotFound(missing));
}

#[test]
fn update_emits_exactly_one_event_with_patched_fields() {
    let mut fx = fixture();
    let item = fx
        .store
        .add_block(flavours::LIST, PropPatch::new(), Some(&fx.note), None)
        .unwrap();
    let events = record_events(&mut fx.store, EventFilter::all());

    fx.store
        .update_block(
            &item,
            PropPatch::new()
                .set(fields::TEXT, "buy milk")
                .set(fields::CHECKED, true),
        )
        .unwrap();

    let events = events.borrow();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, ChangeKind::Updated);
    assert!(events[0].local);
    assert_eq!(events[0].props.len(), 2);
    assert!(events[0].touches(fields::CHECKED));
}

#[test]
fn rejected_patch_leaves_block_untouched() {
    let mut fx = fixture();
    let item = fx
        .store
        .add_block(flavours::LIST, PropPatch::new(), Some(&fx.note), None)
        .unwrap();
    fx.store.clear_history();
    let events = record_events(&mut fx.store, EventFilter::all());

    let err = fx
        .store
        .update_block(
            &item,
            PropPatch::new()
                .set(fields::CHECKED, true)
                .set(fields::TYPE, "spiral"),
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidProp { .. }));

    let block = fx.store.get_element_by_id(&item).unwrap();
    assert_eq!(block.get(fields::CHECKED), Some(PropValue::Bool(false)));
    assert!(events.borrow().is_empty());
    assert!(!fx.store.can_undo());
}

#[test]
fn delete_removes_subtree_descendants_first() {
    let mut fx = fixture();
    let parent = fx
        .store
        .add_block(flavours::LIST, PropPatch::new(), Some(&fx.note), None)
        .unwrap();
    let child = paragraph(&mut fx.store, &parent, "nested");
    let sibling = paragraph(&mut fx.store, &fx.note, "kept");
    let events = record_events(&mut fx.store, EventFilter::all().kind(ChangeKind::Deleted));

    fx.store.delete_element(&parent).unwrap();

    assert!(!fx.store.contains(&parent));
    assert!(!fx.store.contains(&child));
    assert_eq!(fx.store.children(&fx.note), &[sibling][..]);
    let ids: Vec<BlockId> = events.borrow().iter().map(|event| event.id.clone()).collect();
    assert_eq!(ids, vec![child, parent]);
}

#[test]
fn placement_is_checked_against_schema() {
    let mut fx = fixture();
    let err = fx
        .store
        .add_block(flavours::SHAPE, PropPatch::new(), Some(&fx.note), None)
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::Schema(SchemaError::InvalidParent { .. })
    ));

    let err = fx
        .store
        .add_block(flavours::PAGE, PropPatch::new(), None, None)
        .unwrap_err();
    assert_eq!(err, StoreError::RootExists(fx.root.clone()));
}

#[test]
fn add_block_respects_index() {
    let mut fx = fixture();
    let last = paragraph(&mut fx.store, &fx.note, "b");
    let first = fx
        .store
        .add_block(
            flavours::PARAGRAPH,
            PropPatch::new().set(fields::TEXT, "a"),
            Some(&fx.note),
            Some(0),
        )
        .unwrap();
    assert_eq!(fx.store.children(&fx.note), &[first.clone(), last.clone()][..]);
    assert_eq!(fx.store.prev_sibling(&last).map(|b| b.id().clone()), Some(first));
    assert_eq!(fx.store.index_of(&last), Some(1));
}

#[test]
fn capture_sync_splits_undo_units() {
    let mut fx = fixture();
    let item = paragraph(&mut fx.store, &fx.note, "one");
    fx.store.capture_sync();
    fx.store
        .update_block(&item, PropPatch::new().set(fields::TEXT, "two"))
        .unwrap();
    fx.store
        .update_block(&item, PropPatch::new().set(fields::TEXT, "three"))
        .unwrap();

    assert!(fx.store.undo().unwrap());
    let text = |store: &DocStore| store.get_element_by_id(&item).and_then(|b| b.get(fields::TEXT));
    assert_eq!(text(&fx.store), Some(PropValue::Text("one".to_string())));

    assert!(fx.store.undo().unwrap());
    assert!(!fx.store.contains(&item));
    assert!(!fx.store.undo().unwrap());

    assert!(fx.store.redo().unwrap());
    assert!(fx.store.redo().unwrap());
    assert_eq!(text(&fx.store), Some(PropValue::Text("three".to_string())));
    assert!(!fx.store.can_redo());
}

#[test]
fn undo_restores_deleted_subtree_in_place() {
    let mut fx = fixture();
    let first = paragraph(&mut fx.store, &fx.note, "first");
    let parent = fx
        .store
        .add_block(flavours::LIST, PropPatch::new(), Some(&fx.note), None)
        .unwrap();
    let child = paragraph(&mut fx.store, &parent, "child");
    fx.store.capture_sync();

    fx.store.delete_element(&parent).unwrap();
    assert!(fx.store.undo().unwrap());

    assert_eq!(fx.store.children(&fx.note), &[first, parent.clone()][..]);
    assert_eq!(fx.store.children(&parent), &[child][..]);
}

#[test]
fn replayed_events_are_not_local() {
    let mut fx = fixture();
    let item = paragraph(&mut fx.store, &fx.note, "x");
    fx.store.capture_sync();
    let events = record_events(&mut fx.store, EventFilter::all());

    fx.store.undo().unwrap();

    let events = events.borrow();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].id, item);
    assert_eq!(events[0].kind, ChangeKind::Deleted);
    assert!(!events[0].local);
}

#[test]
fn readonly_document_rejects_mutations() {
    let mut fx = fixture();
    let item = paragraph(&mut fx.store, &fx.note, "x");
    fx.store.set_readonly(true);

    assert_eq!(
        fx.store
            .update_block(&item, PropPatch::new().set(fields::TEXT, "y"))
            .unwrap_err(),
        StoreError::ReadOnly
    );
    assert_eq!(fx.store.delete_element(&item).unwrap_err(), StoreError::ReadOnly);
    assert_eq!(fx.store.undo().unwrap_err(), StoreError::ReadOnly);
}

#[test]
fn remote_ops_apply_without_history() {
    let mut fx = fixture();
    let item = paragraph(&mut fx.store, &fx.note, "local");
    fx.store.clear_history();
    let events = record_events(&mut fx.store, EventFilter::remote_only());

    let incoming = BlockSnapshot {
        id: BlockId::new("remote-1"),
        flavour: flavours::PARAGRAPH.to_string(),
        parent: Some(fx.note.clone()),
        children: Vec::new(),
        props: PropPatch::new().set(fields::TEXT, "from peer").into_map(),
    };
    fx.store
        .apply_remote(vec![
            RemoteOp::Add {
                block: incoming,
                index: Some(0),
            },
            RemoteOp::Update {
                id: item.clone(),
                patch: PropPatch::new().set(fields::TEXT, "edited remotely"),
            },
        ])
        .unwrap();

    assert_eq!(fx.store.children(&fx.note)[0], BlockId::new("remote-1"));
    assert_eq!(events.borrow().len(), 2);
    assert!(!fx.store.can_undo());
}

#[test]
fn remote_batch_stops_at_first_rejected_op() {
    let mut fx = fixture();
    let item = paragraph(&mut fx.store, &fx.note, "x");

    let err = fx
        .store
        .apply_remote(vec![
            RemoteOp::Update {
                id: item.clone(),
                patch: PropPatch::new().set(fields::TEXT, "applied"),
            },
            RemoteOp::Delete {
                id: BlockId::new("ghost"),
            },
            RemoteOp::Delete { id: item.clone() },
        ])
        .unwrap_err();

    assert_eq!(err, StoreError::NotFound(BlockId::new("ghost")));
    assert_eq!(
        fx.store.get_element_by_id(&item).and_then(|b| b.get(fields::TEXT)),
        Some(PropValue::Text("applied".to_string()))
    );
}

#[test]
fn snapshot_rebuilds_equal_document() {
    let mut fx = fixture();
    let list = fx
        .store
        .add_block(
            flavours::LIST,
            PropPatch::new().set(fields::TYPE, "todo"),
            Some(&fx.note),
            None,
        )
        .unwrap();
    paragraph(&mut fx.store, &list, "nested");

    let snapshot = fx.store.snapshot();
    let rebuilt = DocStore::from_snapshot(&snapshot, DocOptions::default()).unwrap();

    assert_eq!(rebuilt.snapshot(), snapshot);
    assert_eq!(rebuilt.root(), Some(&fx.root));
    assert!(!rebuilt.can_undo());
}

#[test]
fn corrupt_snapshot_is_rejected() {
    let fx = fixture();
    let mut snapshot = fx.store.snapshot();
    snapshot.blocks[0].children.push(BlockId::new("dangling"));

    let err = DocStore::from_snapshot(&snapshot, DocOptions::default())
        .err()
        .unwrap();
    assert!(matches!(err, StoreError::CorruptSnapshot(_)));
}

#[test]
fn closest_walks_ancestors() {
    let mut fx = fixture();
    let list = fx
        .store
        .add_block(flavours::LIST, PropPatch::new(), Some(&fx.note), None)
        .unwrap();
    let nested = paragraph(&mut fx.store, &list, "deep");

    let note = fx.store.closest(&nested, flavours::NOTE).unwrap();
    assert_eq!(note.id(), &fx.note);
    assert!(fx.store.closest(&nested, flavours::SURFACE).is_none());
}

#[test]
fn undo_removes_field_added_to_extension_block() {
    let mut schema = SchemaRegistry::with_builtin();
    schema
        .register(BlockSchema::new("ext:callout", BlockRole::Content, &[flavours::NOTE]))
        .unwrap();
    let mut store = DocStore::with_schema("ext-doc", DocOptions::default(), schema);
    let root = store
        .add_block(flavours::PAGE, PropPatch::new(), None, None)
        .unwrap();
    let note = store
        .add_block(flavours::NOTE, PropPatch::new(), Some(&root), None)
        .unwrap();
    let callout = store
        .add_block(
            "ext:callout",
            PropPatch::new().set("tone", "info"),
            Some(&note),
            None,
        )
        .unwrap();
    store.clear_history();

    store
        .update_block(
            &callout,
            PropPatch::new().set("icon", "bulb").set("tone", "warn"),
        )
        .unwrap();
    assert!(store.undo().unwrap());

    let block = store.get_element_by_id(&callout).unwrap();
    assert_eq!(block.get("icon"), None);
    assert_eq!(block.get("tone"), Some(PropValue::from("info")));
    assert!(!block.model().props().contains_key("icon"));

    assert!(store.redo().unwrap());
    let block = store.get_element_by_id(&callout).unwrap();
    assert_eq!(block.get("icon"), Some(PropValue::from("bulb")));
}
