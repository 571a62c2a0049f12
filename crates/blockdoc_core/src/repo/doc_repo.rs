//! Document repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist whole-document snapshots and an append-only change log.
//! - Keep SQL and JSON encoding details inside the persistence boundary.
//!
//! # Invariants
//! - `save_snapshot` replaces the stored image atomically.
//! - Read paths reject undecodable rows instead of skipping them.
//! - Change log sequence numbers are strictly increasing per database.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::block::BlockId;
use crate::model::props::PropMap;
use crate::model::snapshot::{BlockSnapshot, DocSnapshot};
use crate::store::{ChangeEvent, ChangeKind};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type DocRepoResult<T> = Result<T, DocRepoError>;

#[derive(Debug)]
pub enum DocRepoError {
    Db(DbError),
    InvalidData(String),
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
}

impl Display for DocRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted document data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "document connection is at schema version {actual_version}, expected {expected_version}"
            ),
            Self::MissingRequiredTable(table) => write!(f, "missing required table `{table}`"),
        }
    }
}

impl Error for DocRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for DocRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for DocRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for DocRepoError {
    fn from(value: serde_json::Error) -> Self {
        Self::InvalidData(value.to_string())
    }
}

/// One persisted change log row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    pub seq: i64,
    pub block_id: BlockId,
    pub flavour: String,
    pub kind: ChangeKind,
    pub props: PropMap,
    pub local: bool,
    /// Epoch milliseconds.
    pub created_at: i64,
}

pub trait DocRepository {
    fn save_snapshot(&self, snapshot: &DocSnapshot) -> DocRepoResult<()>;
    fn load_snapshot(&self, doc_id: &str) -> DocRepoResult<Option<DocSnapshot>>;
    /// Appends events in order and returns how many rows were written.
    fn append_changes(&self, doc_id: &str, changes: &[ChangeEvent]) -> DocRepoResult<usize>;
    /// Rows with `seq > after_seq`, oldest first.
    fn list_changes(
        &self,
        doc_id: &str,
        after_seq: i64,
        limit: u32,
    ) -> DocRepoResult<Vec<ChangeRecord>>;
    /// Removes the document, its blocks and its change log.
    fn delete_doc(&self, doc_id: &str) -> DocRepoResult<bool>;
}

/// SQLite-backed document repository.
pub struct SqliteDocRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteDocRepository<'conn> {
    /// Fails unless `conn` was opened through `db::open_db*`.
    pub fn try_new(conn: &'conn Connection) -> DocRepoResult<Self> {
        ensure_doc_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl DocRepository for SqliteDocRepository<'_> {
    fn save_snapshot(&self, snapshot: &DocSnapshot) -> DocRepoResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO docs (doc_id, root_id, block_count)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(doc_id) DO UPDATE SET
                root_id = excluded.root_id,
                block_count = excluded.block_count,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![
                snapshot.doc_id.as_str(),
                snapshot.root.as_ref().map(BlockId::as_str),
                snapshot.blocks.len() as i64,
            ],
        )?;
        tx.execute(
            "DELETE FROM blocks WHERE doc_id = ?1;",
            [snapshot.doc_id.as_str()],
        )?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO blocks (
                    doc_id,
                    block_id,
                    flavour,
                    parent_id,
                    position,
                    children_json,
                    props_json
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            )?;
            for (position, block) in snapshot.blocks.iter().enumerate() {
                insert.execute(params![
                    snapshot.doc_id.as_str(),
                    block.id.as_str(),
                    block.flavour.as_str(),
                    block.parent.as_ref().map(BlockId::as_str),
                    position as i64,
                    serde_json::to_string(&block.children)?,
                    serde_json::to_string(&block.props)?,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn load_snapshot(&self, doc_id: &str) -> DocRepoResult<Option<DocSnapshot>> {
        let root: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT root_id FROM docs WHERE doc_id = ?1;",
                [doc_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(root) = root else {
            return Ok(None);
        };

        let mut stmt = self.conn.prepare(
            "SELECT block_id, flavour, parent_id, children_json, props_json
             FROM blocks
             WHERE doc_id = ?1
             ORDER BY position ASC;",
        )?;
        let mut rows = stmt.query([doc_id])?;
        let mut blocks = Vec::new();
        while let Some(row) = rows.next()? {
            blocks.push(parse_block_row(row)?);
        }

        Ok(Some(DocSnapshot {
            doc_id: doc_id.to_string(),
            root: root.map(BlockId::new),
            blocks,
        }))
    }

    fn append_changes(&self, doc_id: &str, changes: &[ChangeEvent]) -> DocRepoResult<usize> {
        if changes.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT OR IGNORE INTO docs (doc_id, root_id) VALUES (?1, NULL);",
            [doc_id],
        )?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO change_log (doc_id, block_id, flavour, kind, props_json, is_local)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            )?;
            for change in changes {
                insert.execute(params![
                    doc_id,
                    change.id.as_str(),
                    change.flavour.as_str(),
                    change.kind.as_str(),
                    serde_json::to_string(&change.props)?,
                    bool_to_int(change.local),
                ])?;
            }
        }
        tx.commit()?;
        Ok(changes.len())
    }

    fn list_changes(
        &self,
        doc_id: &str,
        after_seq: i64,
        limit: u32,
    ) -> DocRepoResult<Vec<ChangeRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT seq, block_id, flavour, kind, props_json, is_local, created_at
             FROM change_log
             WHERE doc_id = ?1 AND seq > ?2
             ORDER BY seq ASC
             LIMIT ?3;",
        )?;
        let mut rows = stmt.query(params![doc_id, after_seq, i64::from(limit)])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(parse_change_row(row)?);
        }
        Ok(records)
    }

    fn delete_doc(&self, doc_id: &str) -> DocRepoResult<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM docs WHERE doc_id = ?1;", [doc_id])?;
        Ok(removed > 0)
    }
}

fn parse_block_row(row: &Row<'_>) -> DocRepoResult<BlockSnapshot> {
    let block_id: String = row.get(0)?;
    let children_json: String = row.get(3)?;
    let props_json: String = row.get(4)?;
    Ok(BlockSnapshot {
        id: BlockId::new(block_id),
        flavour: row.get(1)?,
        parent: row.get::<_, Option<String>>(2)?.map(BlockId::new),
        children: serde_json::from_str(&children_json)?,
        props: serde_json::from_str(&props_json)?,
    })
}

fn parse_change_row(row: &Row<'_>) -> DocRepoResult<ChangeRecord> {
    let block_id: String = row.get(1)?;
    let kind_raw: String = row.get(3)?;
    let props_json: String = row.get(4)?;
    let is_local: i64 = row.get(5)?;
    Ok(ChangeRecord {
        seq: row.get(0)?,
        block_id: BlockId::new(block_id),
        flavour: row.get(2)?,
        kind: change_kind_from_db(&kind_raw)?,
        props: serde_json::from_str(&props_json)?,
        local: int_to_bool(is_local)?,
        created_at: row.get(6)?,
    })
}

fn change_kind_from_db(value: &str) -> DocRepoResult<ChangeKind> {
    match value {
        "added" => Ok(ChangeKind::Added),
        "updated" => Ok(ChangeKind::Updated),
        "deleted" => Ok(ChangeKind::Deleted),
        other => Err(DocRepoError::InvalidData(format!(
            "unknown change kind `{other}`"
        ))),
    }
}

fn bool_to_int(value: bool) -> i64 {
    i64::from(value)
}

fn int_to_bool(value: i64) -> DocRepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(DocRepoError::InvalidData(format!(
            "invalid is_local value `{other}`"
        ))),
    }
}

fn ensure_doc_connection_ready(conn: &Connection) -> DocRepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(DocRepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for table in ["docs", "blocks", "change_log"] {
        if !table_exists(conn, table)? {
            return Err(DocRepoError::MissingRequiredTable(table));
        }
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> DocRepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

#[cfg(test)]
mod tests {
    use super::{DocRepoError, DocRepository, SqliteDocRepository};
    use crate::db::open_db_in_memory;
    use crate::model::block::BlockId;
    use crate::model::props::{PropMap, PropValue};
    use crate::model::snapshot::{BlockSnapshot, DocSnapshot};
    use crate::store::{ChangeEvent, ChangeKind};
    use rusqlite::Connection;

    fn sample_snapshot() -> DocSnapshot {
        let mut props = PropMap::new();
        props.insert("text".to_string(), PropValue::Text("hello".to_string()));
        DocSnapshot {
            doc_id: "doc-1".to_string(),
            root: Some(BlockId::new("root")),
            blocks: vec![
                BlockSnapshot {
                    id: BlockId::new("root"),
                    flavour: "doc:page".to_string(),
                    parent: None,
                    children: vec![BlockId::new("p1")],
                    props: PropMap::new(),
                },
                BlockSnapshot {
                    id: BlockId::new("p1"),
                    flavour: "doc:paragraph".to_string(),
                    parent: Some(BlockId::new("root")),
                    children: Vec::new(),
                    props,
                },
            ],
        }
    }

    #[test]
    fn rejects_unmigrated_connection() {
        let conn = Connection::open_in_memory().expect("raw connection");
        let err = SqliteDocRepository::try_new(&conn)
            .err()
            .expect("unmigrated connection must be rejected");
        assert!(matches!(
            err,
            DocRepoError::UninitializedConnection {
                actual_version: 0,
                ..
            }
        ));
    }

    #[test]
    fn snapshot_save_replaces_previous_image() {
        let conn = open_db_in_memory().expect("open db");
        let repo = SqliteDocRepository::try_new(&conn).expect("repo");
        let mut snapshot = sample_snapshot();
        repo.save_snapshot(&snapshot).expect("first save");

        snapshot.blocks.truncate(1);
        snapshot.blocks[0].children.clear();
        repo.save_snapshot(&snapshot).expect("second save");

        let loaded = repo
            .load_snapshot("doc-1")
            .expect("load")
            .expect("doc exists");
        assert_eq!(loaded, snapshot);
        assert!(repo.load_snapshot("missing").expect("load").is_none());
    }

    #[test]
    fn change_log_pages_by_sequence() {
        let conn = open_db_in_memory().expect("open db");
        let repo = SqliteDocRepository::try_new(&conn).expect("repo");
        let events: Vec<ChangeEvent> = ["a", "b", "c"]
            .into_iter()
            .map(|id| ChangeEvent {
                id: BlockId::new(id),
                flavour: "doc:paragraph".to_string(),
                kind: ChangeKind::Added,
                props: PropMap::new(),
                local: id != "c",
            })
            .collect();
        assert_eq!(repo.append_changes("doc-1", &events).expect("append"), 3);

        let first = repo.list_changes("doc-1", 0, 2).expect("first page");
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].block_id, BlockId::new("a"));
        let rest = repo
            .list_changes("doc-1", first[1].seq, 10)
            .expect("second page");
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].block_id, BlockId::new("c"));
        assert!(!rest[0].local);
    }

    #[test]
    fn delete_doc_cascades() {
        let conn = open_db_in_memory().expect("open db");
        let repo = SqliteDocRepository::try_new(&conn).expect("repo");
        repo.save_snapshot(&sample_snapshot()).expect("save");
        assert!(repo.delete_doc("doc-1").expect("delete"));
        assert!(!repo.delete_doc("doc-1").expect("delete again"));
        let blocks: i64 = conn
            .query_row("SELECT COUNT(*) FROM blocks;", [], |row| row.get(0))
            .expect("count");
        assert_eq!(blocks, 0);
    }
}
