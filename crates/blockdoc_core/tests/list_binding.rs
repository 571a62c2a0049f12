use blockdoc_core::selection::TextRange;
use blockdoc_core::services::{FeedbackPlayer, FixedDocMode};
use blockdoc_core::{
    fields, flavours, BindingError, BlockId, DetachedTaskError, DetachedTasks, DocOptions,
    DocStore, EditorMode, HostServices, IconClickOutcome, ListBlockController, PropPatch,
    PropValue, RemoteOp, SelectionKind, SelectionManager, SelectionPayload, TaskReport,
    WatcherRegistry,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

struct Page {
    store: DocStore,
    root: BlockId,
    note: BlockId,
    _watchers: WatcherRegistry,
}

fn page() -> Page {
    let mut store = DocStore::new("binding", DocOptions::default());
    let root = store
        .add_block(flavours::PAGE, PropPatch::new(), None, None)
        .unwrap();
    let note = store
        .add_block(flavours::NOTE, PropPatch::new(), Some(&root), None)
        .unwrap();
    store.clear_history();
    let watchers = WatcherRegistry::with_defaults(&mut store);
    Page {
        store,
        root,
        note,
        _watchers: watchers,
    }
}

fn list(page: &mut Page, kind: &str) -> BlockId {
    page.store
        .add_block(
            flavours::LIST,
            PropPatch::new().set(fields::TYPE, kind),
            Some(&page.note),
            None,
        )
        .unwrap()
}

fn prop(store: &DocStore, id: &BlockId, field: &str) -> Option<PropValue> {
    store.get_element_by_id(id).and_then(|block| block.get(field))
}

struct BrokenSpeaker {
    calls: Cell<usize>,
}

impl FeedbackPlayer for BrokenSpeaker {
    fn play_check(&self, block_id: &str) -> Result<(), DetachedTaskError> {
        self.calls.set(self.calls.get() + 1);
        Err(DetachedTaskError::new(
            "list-check-feedback",
            format!("no audio device for {block_id}"),
        ))
    }
}

#[test]
fn connect_requires_a_list_block() {
    let mut pg = page();
    let note = pg.note.clone();
    let err = ListBlockController::connect(&mut pg.store, note.clone(), HostServices::headless())
        .err()
        .unwrap();
    assert!(matches!(err, BindingError::WrongFlavour { id, .. } if id == note));

    let err = ListBlockController::connect(
        &mut pg.store,
        BlockId::new("missing"),
        HostServices::headless(),
    )
    .err()
    .unwrap();
    assert!(matches!(err, BindingError::Store(_)));
}

#[test]
fn toggle_click_flips_collapsed_in_separate_undo_units() {
    let mut pg = page();
    let item = list(&mut pg, "toggle");
    let controller =
        ListBlockController::connect(&mut pg.store, item.clone(), HostServices::headless())
            .unwrap();

    let first = controller.on_click_icon(&mut pg.store).unwrap();
    let second = controller.on_click_icon(&mut pg.store).unwrap();
    assert_eq!(first, IconClickOutcome::Toggled { collapsed: true });
    assert_eq!(second, IconClickOutcome::Toggled { collapsed: false });

    assert!(pg.store.undo().unwrap());
    assert_eq!(prop(&pg.store, &item, fields::COLLAPSED), Some(PropValue::Bool(true)));
    assert!(controller.is_collapsed(&pg.store));
}

#[test]
fn todo_click_checks_and_survives_feedback_failure() {
    let mut pg = page();
    let item = list(&mut pg, "todo");
    let speaker = Rc::new(BrokenSpeaker {
        calls: Cell::new(0),
    });
    let tasks = Rc::new(RefCell::new(DetachedTasks::new()));
    let services = HostServices::new(
        Rc::new(FixedDocMode::new(EditorMode::Page)),
        speaker.clone(),
        Rc::new(RefCell::new(SelectionManager::new())),
        Rc::clone(&tasks),
    );
    let controller = ListBlockController::connect(&mut pg.store, item.clone(), services).unwrap();

    let outcome = controller.on_click_icon(&mut pg.store).unwrap();
    assert_eq!(outcome, IconClickOutcome::Checked { checked: true });
    assert_eq!(speaker.calls.get(), 0);

    let report = tasks.borrow_mut().run_pending();
    assert_eq!(report, TaskReport { completed: 0, failed: 1 });
    assert_eq!(speaker.calls.get(), 1);
    assert_eq!(prop(&pg.store, &item, fields::CHECKED), Some(PropValue::Bool(true)));

    let outcome = controller.on_click_icon(&mut pg.store).unwrap();
    assert_eq!(outcome, IconClickOutcome::Checked { checked: false });
    assert_eq!(tasks.borrow().pending(), 0);
}

#[test]
fn readonly_toggle_stays_local() {
    let mut pg = page();
    let item = list(&mut pg, "toggle");
    pg.store.set_readonly(true);
    let controller =
        ListBlockController::connect(&mut pg.store, item.clone(), HostServices::headless())
            .unwrap();

    let outcome = controller.on_click_icon(&mut pg.store).unwrap();
    assert_eq!(outcome, IconClickOutcome::Toggled { collapsed: true });
    assert!(controller.is_collapsed(&pg.store));
    assert_eq!(prop(&pg.store, &item, fields::COLLAPSED), Some(PropValue::Bool(false)));
}

#[test]
fn readonly_todo_click_is_ignored() {
    let mut pg = page();
    let item = list(&mut pg, "todo");
    pg.store.set_readonly(true);
    let controller =
        ListBlockController::connect(&mut pg.store, item.clone(), HostServices::headless())
            .unwrap();

    let outcome = controller.on_click_icon(&mut pg.store).unwrap();
    assert_eq!(outcome, IconClickOutcome::Ignored);
    assert_eq!(prop(&pg.store, &item, fields::CHECKED), Some(PropValue::Bool(false)));
}

#[test]
fn readonly_view_follows_remote_collapse() {
    let mut pg = page();
    let item = list(&mut pg, "toggle");
    pg.store.set_readonly(true);
    let controller =
        ListBlockController::connect(&mut pg.store, item.clone(), HostServices::headless())
            .unwrap();

    pg.store
        .apply_remote(vec![RemoteOp::Update {
            id: item.clone(),
            patch: PropPatch::new().set(fields::COLLAPSED, true),
        }])
        .unwrap();
    assert!(controller.is_collapsed(&pg.store));
}

#[test]
fn bulleted_click_replaces_text_selection_with_block() {
    let mut pg = page();
    let item = list(&mut pg, "bulleted");
    let services = HostServices::headless();
    {
        let mut selection = services.selection.borrow_mut();
        let text = selection
            .create(
                SelectionKind::Text,
                SelectionPayload::Text {
                    from: TextRange {
                        block_id: item.clone(),
                        index: 2,
                        length: 0,
                    },
                    to: None,
                },
            )
            .unwrap();
        let surface = selection
            .create(
                SelectionKind::Surface,
                SelectionPayload::Surface {
                    block_id: BlockId::new("surface"),
                    elements: Vec::new(),
                    editing: false,
                },
            )
            .unwrap();
        selection.update(|_| vec![text, surface]);
    }
    let controller =
        ListBlockController::connect(&mut pg.store, item.clone(), services.clone()).unwrap();

    let outcome = controller.on_click_icon(&mut pg.store).unwrap();
    assert_eq!(outcome, IconClickOutcome::Selected);

    let selection = services.selection.borrow();
    let kinds: Vec<SelectionKind> = selection.value().iter().map(|s| s.kind()).collect();
    assert_eq!(kinds, vec![SelectionKind::Surface, SelectionKind::Block]);
    assert_eq!(selection.value()[1].block_id(), &item);
}

#[test]
fn editable_host_depends_on_editor_mode() {
    let mut pg = page();
    let item = list(&mut pg, "bulleted");
    let mode = Rc::new(FixedDocMode::new(EditorMode::Page));
    let services = HostServices::new(
        mode.clone(),
        Rc::new(blockdoc_core::services::NoopFeedback),
        Rc::new(RefCell::new(SelectionManager::new())),
        Rc::new(RefCell::new(DetachedTasks::new())),
    );
    let controller = ListBlockController::connect(&mut pg.store, item, services).unwrap();

    assert_eq!(controller.top_contenteditable(&pg.store), Some(pg.root.clone()));
    mode.set(EditorMode::Edgeless);
    assert_eq!(controller.top_contenteditable(&pg.store), Some(pg.note.clone()));
}

#[test]
fn disconnect_is_idempotent_after_block_deletion() {
    let mut pg = page();
    let item = list(&mut pg, "toggle");
    let baseline = pg.store.effect_count();
    let locals = pg.store.local_count();
    let mut controller =
        ListBlockController::connect(&mut pg.store, item.clone(), HostServices::headless())
            .unwrap();
    assert_eq!(pg.store.effect_count(), baseline + 1);
    assert_eq!(pg.store.local_count(), locals + 1);

    pg.store.delete_element(&item).unwrap();
    controller.disconnect();
    controller.disconnect();
    assert!(controller.on_click_icon(&mut pg.store).is_err());
    assert_eq!(pg.store.local_count(), locals);
    drop(controller);
    assert_eq!(pg.store.effect_count(), baseline - 2);
}

#[test]
fn reconnecting_controllers_does_not_accumulate_local_cells() {
    let mut pg = page();
    let item = list(&mut pg, "toggle");
    let locals = pg.store.local_count();

    for _ in 0..5 {
        let controller =
            ListBlockController::connect(&mut pg.store, item.clone(), HostServices::headless())
                .unwrap();
        controller.on_click_icon(&mut pg.store).unwrap();
    }

    assert_eq!(pg.store.local_count(), locals);
}
