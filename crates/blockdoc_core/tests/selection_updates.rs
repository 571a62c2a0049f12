use blockdoc_core::selection::TextRange;
use blockdoc_core::{BlockId, Selection, SelectionKind, SelectionManager, SelectionPayload};
use std::cell::RefCell;
use std::rc::Rc;

fn text_payload(block: &str, index: usize) -> SelectionPayload {
    SelectionPayload::Text {
        from: TextRange {
            block_id: BlockId::new(block),
            index,
            length: 0,
        },
        to: None,
    }
}

fn seeded_manager() -> SelectionManager {
    let mut manager = SelectionManager::new();
    let first = manager
        .create(SelectionKind::Text, text_payload("p1", 0))
        .unwrap();
    let second = manager
        .create(SelectionKind::Text, text_payload("p2", 3))
        .unwrap();
    let surface = manager
        .create(
            SelectionKind::Surface,
            SelectionPayload::Surface {
                block_id: BlockId::new("surface"),
                elements: vec![BlockId::new("shape-1")],
                editing: false,
            },
        )
        .unwrap();
    manager.update(|_| vec![first, second, surface]);
    manager
}

#[test]
fn replacing_text_with_block_is_one_observable_step() {
    let mut manager = SelectionManager::new();
    let texts = vec![
        manager
            .create(SelectionKind::Text, text_payload("p1", 0))
            .unwrap(),
        manager
            .create(SelectionKind::Text, text_payload("p2", 4))
            .unwrap(),
    ];
    manager.update(|_| texts);

    let observed: Rc<RefCell<Vec<Vec<Selection>>>> = Rc::default();
    let sink = Rc::clone(&observed);
    let _listener = manager.subscribe(move |value| sink.borrow_mut().push(value.to_vec()));

    let block = manager
        .create(
            SelectionKind::Block,
            SelectionPayload::Block {
                block_id: BlockId::new("list-1"),
            },
        )
        .unwrap();
    manager.update(|current| {
        current
            .iter()
            .filter(|selection| !selection.is(SelectionKind::Text))
            .cloned()
            .chain(std::iter::once(block.clone()))
            .collect()
    });

    let observed = observed.borrow();
    assert_eq!(observed.len(), 1);
    assert_eq!(observed[0], vec![block]);
    assert_eq!(manager.value().len(), 1);
    assert!(manager.value()[0].is(SelectionKind::Block));
}

#[test]
fn filter_keeps_unrelated_kinds() {
    let mut manager = seeded_manager();
    assert_eq!(manager.filter(SelectionKind::Text).len(), 2);

    manager.update(|current| {
        current
            .iter()
            .filter(|selection| !selection.is(SelectionKind::Text))
            .cloned()
            .collect()
    });

    assert!(manager.find(SelectionKind::Text).is_none());
    let surface = manager.find(SelectionKind::Surface).unwrap();
    assert_eq!(surface.block_id(), &BlockId::new("surface"));
}

#[test]
fn disposed_listener_is_not_called() {
    let mut manager = seeded_manager();
    let calls = Rc::new(RefCell::new(0));
    let sink = Rc::clone(&calls);
    let mut listener = manager.subscribe(move |_| *sink.borrow_mut() += 1);

    manager.clear();
    listener.dispose();
    listener.dispose();
    manager.clear();

    assert_eq!(*calls.borrow(), 1);
    assert!(manager.value().is_empty());
}

#[test]
fn create_rejects_empty_block_id() {
    let manager = SelectionManager::new();
    let err = manager
        .create(
            SelectionKind::Block,
            SelectionPayload::Block {
                block_id: BlockId::new(""),
            },
        )
        .unwrap_err();
    assert_eq!(err, blockdoc_core::selection::SelectionError::EmptyBlockId);
}
