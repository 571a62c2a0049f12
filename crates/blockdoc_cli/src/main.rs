//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `blockdoc_core` linkage.
//! - Run a short scripted edit session against a document database.
//!
//! Usage: `blockdoc_cli [db-path]`. Without a path the session runs on an
//! in-memory database.

use blockdoc_core::db::{open_db, open_db_in_memory};
use blockdoc_core::{
    fields, flavours, init_logging, BlockId, DocOptions, DocService, LogTarget, PropPatch,
    PropValue, SqliteDocRepository,
};
use std::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("blockdoc_core ping={}", blockdoc_core::ping());
    println!("blockdoc_core version={}", blockdoc_core::core_version());

    if let Err(err) = init_logging("info", LogTarget::Stderr) {
        eprintln!("logging disabled: {err}");
    }

    match run_session(std::env::args().nth(1)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("session failed: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run_session(db_path: Option<String>) -> Result<(), Box<dyn Error>> {
    let conn = match db_path {
        Some(path) => open_db(path)?,
        None => open_db_in_memory()?,
    };
    let service = DocService::new(SqliteDocRepository::try_new(&conn)?, DocOptions::default());
    let mut doc = service.open("cli-demo")?;
    let root = doc.root().cloned().ok_or("document has no root")?;

    let store = doc.store_mut();
    let note = store.add_block(flavours::NOTE, PropPatch::new(), Some(&root), None)?;
    let numbered = PropPatch::new().set(fields::TYPE, "numbered");
    let mut items: Vec<BlockId> = Vec::new();
    for _ in 0..3 {
        items.push(store.add_block(flavours::LIST, numbered.clone(), Some(&note), None)?);
    }
    store.update_block(&items[1], PropPatch::new().set(fields::TYPE, "bulleted"))?;

    let surface = store.add_block(flavours::SURFACE, PropPatch::new(), Some(&root), None)?;
    let shape = store.add_block(flavours::SHAPE, PropPatch::new(), Some(&surface), None)?;
    let group = store.add_block(
        flavours::GROUP,
        PropPatch::new().set(
            fields::CHILD_IDS,
            PropValue::IdSet([shape.clone()].into_iter().collect()),
        ),
        Some(&surface),
        None,
    )?;
    store.delete_element(&shape)?;

    for item in &items {
        let block = store.get_element_by_id(item).ok_or("list item vanished")?;
        println!(
            "list {} type={:?} order={:?}",
            item,
            block.get(fields::TYPE),
            block.get(fields::ORDER)
        );
    }
    println!("group {} present={}", group, store.contains(&group));

    let written = service.checkpoint(&doc)?;
    println!("saved blocks={} changes={}", doc.store().len(), written);
    Ok(())
}
