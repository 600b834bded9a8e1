//! SQLite Record Store
//!
//! File-based persistent storage using SQLite. Every `WriteBatch` runs in one
//! `BEGIN IMMEDIATE` transaction; the transaction rolls back when dropped, so
//! any failed op leaves the tree exactly as it was.

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::{Backend, StorageConfig};
use crate::domain::{
    verify_rows, BatchOutcome, Field, NodeId, RangeFilter, RecordStore, TreeGroup, TreeNode,
    WriteBatch, WriteOp,
};
use crate::error::{ErrorKind, IndexError, Result};

const NODE_COLUMNS: &str = "id, tree_group, parent_id, level, left_bound, right_bound, name, attrs";

/// SQLite-based RecordStore implementation
#[derive(Clone)]
pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRecordStore {
    /// Create a new SQLite store at the given path
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref())?;
        info!(path = %db_path.as_ref().display(), "opened sqlite record store");
        Self::init(conn)
    }

    /// Create an in-memory SQLite store (for testing)
    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        if config.backend != Backend::Sqlite {
            return Err(IndexError::new(
                ErrorKind::Config,
                format!(
                    "Storage backend '{}' cannot open a SQLite store",
                    config.backend.as_str()
                ),
            ));
        }

        let store = match &config.path {
            Some(path) => Self::new(path)?,
            None => Self::in_memory()?,
        };
        store
            .conn
            .lock()
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        Ok(store)
    }

    fn init(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS tree_groups (
                tree_group INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS tree_nodes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tree_group INTEGER NOT NULL,
                parent_id INTEGER,
                level INTEGER NOT NULL,
                left_bound INTEGER NOT NULL,
                right_bound INTEGER NOT NULL,
                name TEXT NOT NULL,
                attrs TEXT
            )",
            [],
        )?;

        // Bounds are not UNIQUE: a shift passes through transient collisions
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_tree_nodes_left
             ON tree_nodes(tree_group, left_bound)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_tree_nodes_right
             ON tree_nodes(tree_group, right_bound)",
            [],
        )?;

        Ok(())
    }
}

fn column(field: Field) -> &'static str {
    match field {
        Field::Left => "left_bound",
        Field::Right => "right_bound",
        Field::Level => "level",
    }
}

/// `AND col op ?n` for each predicate; parameters start at `?2` (`?1` is the group)
fn where_clause(filter: &RangeFilter) -> String {
    filter
        .predicates
        .iter()
        .enumerate()
        .map(|(i, p)| format!(" AND {} {} ?{}", column(p.field), p.op.as_sql(), i + 2))
        .collect()
}

fn filter_params(group: TreeGroup, filter: &RangeFilter) -> Vec<i64> {
    std::iter::once(group)
        .chain(filter.predicates.iter().map(|p| p.value))
        .collect()
}

fn row_to_node(row: &Row<'_>) -> rusqlite::Result<TreeNode> {
    let attrs: Option<String> = row.get(7)?;
    let attrs = match attrs {
        Some(json) => serde_json::from_str(&json)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))?,
        None => serde_json::Value::Null,
    };

    Ok(TreeNode {
        id: row.get(0)?,
        tree_group: row.get(1)?,
        parent_id: row.get(2)?,
        level: row.get(3)?,
        left: row.get(4)?,
        right: row.get(5)?,
        name: row.get(6)?,
        attrs,
    })
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn allocate_group(&self) -> Result<TreeGroup> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO tree_groups (created_at) VALUES (strftime('%s', 'now'))",
            [],
        )?;
        Ok(conn.last_insert_rowid())
    }

    async fn get(&self, id: NodeId) -> Result<Option<TreeNode>> {
        let conn = self.conn.lock();
        let node = conn
            .query_row(
                &format!("SELECT {} FROM tree_nodes WHERE id = ?1", NODE_COLUMNS),
                params![id],
                row_to_node,
            )
            .optional()?;
        Ok(node)
    }

    async fn range_read(&self, group: TreeGroup, filter: &RangeFilter) -> Result<Vec<TreeNode>> {
        let mut sql = format!(
            "SELECT {} FROM tree_nodes WHERE tree_group = ?1{} ORDER BY left_bound ASC",
            NODE_COLUMNS,
            where_clause(filter)
        );
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let nodes = stmt
            .query_map(params_from_iter(filter_params(group, filter)), row_to_node)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(nodes)
    }

    async fn count(&self, group: TreeGroup, filter: &RangeFilter) -> Result<usize> {
        let sql = format!(
            "SELECT COUNT(*) FROM tree_nodes WHERE tree_group = ?1{}",
            where_clause(filter)
        );

        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            &sql,
            params_from_iter(filter_params(group, filter)),
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    async fn apply(&self, group: TreeGroup, batch: WriteBatch) -> Result<BatchOutcome> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut outcome = BatchOutcome::default();

        for op in batch.ops() {
            match op {
                WriteOp::Expect { id, left, right } => {
                    let current: Option<(i64, i64)> = tx
                        .query_row(
                            "SELECT left_bound, right_bound FROM tree_nodes
                             WHERE id = ?1 AND tree_group = ?2",
                            params![id, group],
                            |row| Ok((row.get(0)?, row.get(1)?)),
                        )
                        .optional()?;
                    match current {
                        None => return Err(IndexError::not_attached(*id, group)),
                        Some(bounds) if bounds != (*left, *right) => {
                            return Err(IndexError::concurrent(format!(
                                "Node {} moved from ({}, {}) to ({}, {})",
                                id, left, right, bounds.0, bounds.1
                            )));
                        }
                        Some(_) => {}
                    }
                }
                WriteOp::Shift(shift) => {
                    let col = column(Field::from(shift.bound));
                    let sql = format!(
                        "UPDATE tree_nodes SET {col} = {col} + ?1
                         WHERE tree_group = ?2 AND {col} {op} ?3",
                        col = col,
                        op = shift.op.as_sql()
                    );
                    outcome.shifted += tx.execute(&sql, params![shift.delta, group, shift.threshold])?;
                }
                WriteOp::Insert(drafts) => {
                    let mut stmt = tx.prepare_cached(
                        "INSERT INTO tree_nodes
                         (tree_group, parent_id, level, left_bound, right_bound, name, attrs)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    )?;
                    for draft in drafts {
                        if draft.tree_group != group {
                            return Err(IndexError::cross_group(group, draft.tree_group));
                        }
                        let attrs = match &draft.attrs {
                            serde_json::Value::Null => None,
                            value => Some(serde_json::to_string(value)?),
                        };
                        stmt.execute(params![
                            draft.tree_group,
                            draft.parent_id,
                            draft.level,
                            draft.left,
                            draft.right,
                            &draft.name,
                            attrs,
                        ])?;
                        outcome.inserted.push(draft.clone().attach(tx.last_insert_rowid()));
                    }
                }
                WriteOp::Delete(id) => {
                    let deleted = tx.execute(
                        "DELETE FROM tree_nodes WHERE id = ?1 AND tree_group = ?2",
                        params![id, group],
                    )?;
                    if deleted == 0 {
                        return Err(IndexError::not_attached(*id, group));
                    }
                    outcome.deleted += deleted;
                }
                WriteOp::Verify => {
                    let mut stmt = tx.prepare_cached(&format!(
                        "SELECT {} FROM tree_nodes WHERE tree_group = ?1",
                        NODE_COLUMNS
                    ))?;
                    let rows = stmt
                        .query_map(params![group], row_to_node)?
                        .collect::<rusqlite::Result<Vec<_>>>()?;
                    verify_rows(group, &rows).into_result()?;
                }
            }
        }

        tx.commit()?;
        Ok(outcome)
    }
}
