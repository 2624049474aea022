//! In-memory driver.
//!
//! The smallest honest implementation of the [`driver`](crate::driver)
//! traits: string-keyed tables of JSON rows, writes staged per transaction
//! and applied on commit. It backs the crate's tests and examples the way a
//! `:memory:` database backs a client-library test suite, and doubles as a
//! reference for wiring a real driver into the seam.
//!
//! Not a storage engine: no conflict detection (last commit wins), no
//! persistence. The connection counts commit/rollback calls and can be told
//! to fail them, so guard behavior is observable from tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::driver::{Connection, Driver, TxHandle};

/// Result type for memory driver operations.
pub type MemResult<T> = Result<T, MemError>;

/// Errors from the memory driver.
#[derive(Debug, Error)]
pub enum MemError {
    /// The connection string was not `:memory:`.
    #[error("unrecognized dsn: {0}")]
    BadDsn(String),

    /// Commit or rollback was called on an already finished transaction.
    #[error("transaction already finished")]
    Finished,

    /// A row value could not be serialized to JSON.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failure requested via `inject_commit_failure` / `inject_rollback_failure`.
    #[error("injected {0} failure")]
    Injected(&'static str),
}

type Table = BTreeMap<String, Value>;

/// The in-memory driver. Accepts only the `:memory:` connection string.
pub struct MemDriver;

impl Driver for MemDriver {
    type Error = MemError;
    type Conn = MemConn;

    fn open(dsn: &str) -> MemResult<MemConn> {
        if dsn != ":memory:" {
            return Err(MemError::BadDsn(dsn.to_string()));
        }
        Ok(MemConn::new())
    }
}

/// An in-memory database connection.
///
/// Clone this to share it across threads - it uses Arc internally.
#[derive(Clone, Default)]
pub struct MemConn {
    inner: Arc<MemConnInner>,
}

#[derive(Default)]
struct MemConnInner {
    tables: RwLock<BTreeMap<String, Table>>,
    commit_calls: AtomicUsize,
    rollback_calls: AtomicUsize,
    fail_commits: AtomicBool,
    fail_rollbacks: AtomicBool,
}

impl MemConn {
    /// Create an empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed value for a key, if any.
    pub fn get(&self, table: &str, key: &str) -> MemResult<Option<Value>> {
        let tables = self.inner.tables.read();
        Ok(tables.get(table).and_then(|rows| rows.get(key)).cloned())
    }

    /// Number of committed rows in a table (0 if the table doesn't exist).
    pub fn row_count(&self, table: &str) -> usize {
        self.inner
            .tables
            .read()
            .get(table)
            .map_or(0, |rows| rows.len())
    }

    /// How many transactions have committed on this connection.
    pub fn commit_count(&self) -> usize {
        self.inner.commit_calls.load(Ordering::SeqCst)
    }

    /// How many rollback calls this connection has received.
    pub fn rollback_count(&self) -> usize {
        self.inner.rollback_calls.load(Ordering::SeqCst)
    }

    /// Make subsequent commit calls fail until reset.
    pub fn inject_commit_failure(&self, fail: bool) {
        self.inner.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent rollback calls fail until reset.
    pub fn inject_rollback_failure(&self, fail: bool) {
        self.inner.fail_rollbacks.store(fail, Ordering::SeqCst);
    }
}

impl Connection for MemConn {
    type Error = MemError;
    type Tx = MemTx;

    fn begin(&self) -> MemResult<MemTx> {
        Ok(MemTx {
            conn: self.clone(),
            staged: Vec::new(),
            finished: false,
        })
    }
}

/// A staged mutation, applied to the connection on commit.
enum Op {
    Insert { table: String, key: String, row: Value },
    Delete { table: String, key: String },
}

/// A native memory transaction. Writes stay staged until commit.
pub struct MemTx {
    conn: MemConn,
    staged: Vec<Op>,
    finished: bool,
}

impl MemTx {
    /// Stage an insert or overwrite. Tables are created implicitly.
    pub fn insert(&mut self, table: &str, key: &str, row: impl Serialize) -> MemResult<()> {
        if self.finished {
            return Err(MemError::Finished);
        }
        let row = serde_json::to_value(row)?;
        self.staged.push(Op::Insert {
            table: table.to_string(),
            key: key.to_string(),
            row,
        });
        Ok(())
    }

    /// Stage a delete.
    pub fn delete(&mut self, table: &str, key: &str) -> MemResult<()> {
        if self.finished {
            return Err(MemError::Finished);
        }
        self.staged.push(Op::Delete {
            table: table.to_string(),
            key: key.to_string(),
        });
        Ok(())
    }

    /// Read through this transaction: staged writes overlay committed state.
    pub fn get(&self, table: &str, key: &str) -> MemResult<Option<Value>> {
        let mut value = self.conn.get(table, key)?;
        for op in &self.staged {
            match op {
                Op::Insert { table: t, key: k, row } if t == table && k == key => {
                    value = Some(row.clone());
                }
                Op::Delete { table: t, key: k } if t == table && k == key => {
                    value = None;
                }
                _ => {}
            }
        }
        Ok(value)
    }
}

impl TxHandle for MemTx {
    type Error = MemError;

    fn commit(&mut self) -> MemResult<()> {
        if self.finished {
            return Err(MemError::Finished);
        }
        if self.conn.inner.fail_commits.load(Ordering::SeqCst) {
            // The transaction is left unfinished; its fate is the caller's
            // problem, as with a driver whose commit failed ambiguously.
            return Err(MemError::Injected("commit"));
        }
        self.conn.inner.commit_calls.fetch_add(1, Ordering::SeqCst);
        let mut tables = self.conn.inner.tables.write();
        for op in self.staged.drain(..) {
            match op {
                Op::Insert { table, key, row } => {
                    tables.entry(table).or_default().insert(key, row);
                }
                Op::Delete { table, key } => {
                    if let Some(rows) = tables.get_mut(&table) {
                        rows.remove(&key);
                    }
                }
            }
        }
        self.finished = true;
        Ok(())
    }

    fn rollback(&mut self) -> MemResult<()> {
        if self.finished {
            return Err(MemError::Finished);
        }
        self.conn.inner.rollback_calls.fetch_add(1, Ordering::SeqCst);
        self.staged.clear();
        self.finished = true;
        if self.conn.inner.fail_rollbacks.load(Ordering::SeqCst) {
            return Err(MemError::Injected("rollback"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_open_rejects_unknown_dsn() {
        assert!(MemDriver::open(":memory:").is_ok());
        assert!(matches!(
            MemDriver::open("postgres://localhost"),
            Err(MemError::BadDsn(_))
        ));
    }

    #[test]
    fn test_staged_writes_apply_on_commit() {
        let conn = MemConn::new();
        let mut tx = conn.begin().unwrap();

        tx.insert("users", "1", "alice").unwrap();
        assert_eq!(conn.get("users", "1").unwrap(), None);

        tx.commit().unwrap();
        assert_eq!(conn.get("users", "1").unwrap(), Some(json!("alice")));
        assert_eq!(conn.row_count("users"), 1);
    }

    #[test]
    fn test_rollback_discards_staged_writes() {
        let conn = MemConn::new();
        let mut tx = conn.begin().unwrap();

        tx.insert("users", "1", "alice").unwrap();
        tx.rollback().unwrap();

        assert_eq!(conn.get("users", "1").unwrap(), None);
        assert_eq!(conn.rollback_count(), 1);
    }

    #[test]
    fn test_transaction_sees_own_writes() {
        let conn = MemConn::new();
        let mut tx = conn.begin().unwrap();

        tx.insert("users", "1", "alice").unwrap();
        assert_eq!(tx.get("users", "1").unwrap(), Some(json!("alice")));

        tx.delete("users", "1").unwrap();
        assert_eq!(tx.get("users", "1").unwrap(), None);
        tx.rollback().unwrap();
    }

    #[test]
    fn test_finished_transaction_rejects_further_calls() {
        let conn = MemConn::new();
        let mut tx = conn.begin().unwrap();
        tx.commit().unwrap();

        assert!(matches!(tx.commit(), Err(MemError::Finished)));
        assert!(matches!(tx.rollback(), Err(MemError::Finished)));
        assert!(matches!(tx.insert("users", "1", 1), Err(MemError::Finished)));
    }

    #[test]
    fn test_struct_rows_serialize() {
        #[derive(Serialize)]
        struct User {
            name: &'static str,
            admin: bool,
        }

        let conn = MemConn::new();
        let mut tx = conn.begin().unwrap();
        tx.insert("users", "1", User { name: "alice", admin: true }).unwrap();
        tx.commit().unwrap();

        assert_eq!(
            conn.get("users", "1").unwrap(),
            Some(json!({"name": "alice", "admin": true}))
        );
    }

    #[test]
    fn test_injected_failures() {
        let conn = MemConn::new();

        conn.inject_commit_failure(true);
        let mut tx = conn.begin().unwrap();
        assert!(matches!(tx.commit(), Err(MemError::Injected("commit"))));
        // A failed commit leaves the transaction unfinished.
        conn.inject_commit_failure(false);
        tx.commit().unwrap();

        conn.inject_rollback_failure(true);
        let mut tx = conn.begin().unwrap();
        assert!(matches!(tx.rollback(), Err(MemError::Injected("rollback"))));
        assert_eq!(conn.rollback_count(), 1);
    }
}
