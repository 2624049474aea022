//! The guarded transaction object.
//!
//! A [`Tx`] wraps a native driver transaction with a rollback guard and an
//! after-commit hook list. The state machine is {open, committed,
//! rolled-back}: exactly one terminal action ever reaches the driver, no
//! matter how commit, rollback, auto-rollback, and drop interleave.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::warn;

use crate::driver::TxHandle;
use crate::guard::{Guard, GuardStatus};
use crate::tx::error::{TxError, TxResult};

/// An after-commit hook. Hooks cannot report errors to the committer.
type Hook = Box<dyn Fn() + Send + Sync>;

/// A transaction that rolls itself back unless committed.
///
/// Dropping an open `Tx` rolls it back; [`commit`](Tx::commit) and
/// [`rollback`](Tx::rollback) each disarm that cleanup first, so the driver
/// sees the terminal call exactly once. The typical pattern:
///
/// ```
/// use txguard::mem::{MemConn, MemError};
/// use txguard::{Db, TxResult};
///
/// fn insert_user(db: &Db<MemConn>) -> TxResult<(), MemError> {
///     let tx = db.begin()?;
///     tx.with_tx(|native| native.insert("users", "1", "alice")).unwrap();
///     tx.commit()
///     // An early return before commit would have rolled back on drop.
/// }
/// ```
pub struct Tx<T: TxHandle> {
    /// The native transaction, shared with the rollback guard's action.
    inner: Arc<Mutex<T>>,
    /// One-shot auto-rollback trigger.
    guard: Guard<T::Error>,
    /// Hooks run after a successful commit, in insertion order.
    after_commit: RwLock<Vec<Hook>>,
    /// Debug name, `tx-<ulid>` unless overridden.
    name: String,
    /// When this transaction was created.
    started_at: DateTime<Utc>,
}

impl<T: TxHandle> Tx<T> {
    /// Wrap a freshly begun native transaction, arming the guard with its
    /// rollback call.
    pub(crate) fn new(native: T, name: String) -> Self {
        let inner = Arc::new(Mutex::new(native));
        let rollback_handle = Arc::clone(&inner);
        let guard = Guard::new(move || rollback_handle.lock().rollback());
        Self {
            inner,
            guard,
            after_commit: RwLock::new(Vec::new()),
            name,
            started_at: Utc::now(),
        }
    }

    /// Commit the transaction.
    ///
    /// The auto-rollback guard is cancelled before the driver commit is
    /// attempted: once a commit has been issued the transaction's fate
    /// belongs to the driver, and rolling back after a failed or ambiguous
    /// commit is invalid on some drivers. On driver failure the error is
    /// returned and after-commit hooks do not run; on success the hooks run
    /// in insertion order.
    pub fn commit(&self) -> TxResult<(), T::Error> {
        self.guard.cancel();
        self.inner.lock().commit().map_err(TxError::Commit)?;
        self.run_after_commit();
        Ok(())
    }

    /// Roll the transaction back explicitly.
    ///
    /// Cancels the guard first, then issues the driver rollback, returning
    /// its result. Terminal whether or not the driver call succeeds.
    pub fn rollback(&self) -> TxResult<(), T::Error> {
        self.guard.cancel();
        self.inner.lock().rollback().map_err(TxError::Rollback)
    }

    /// Roll back only if neither commit nor rollback has happened.
    ///
    /// This is the explicit form of what [`Drop`] does, for callers that
    /// want the rollback error:
    ///
    /// ```
    /// # use txguard::mem::{MemConn, MemError};
    /// # use txguard::{Db, TxResult};
    /// # fn work(db: &Db<MemConn>) -> TxResult<(), MemError> {
    /// let tx = db.begin()?;
    /// // ... work that may bail out early ...
    /// tx.auto_rollback()
    /// # }
    /// ```
    ///
    /// After a commit or an explicit rollback this is a no-op returning
    /// `Ok(())`.
    pub fn auto_rollback(&self) -> TxResult<(), T::Error> {
        self.guard.fire().map_err(TxError::Rollback)
    }

    /// Register a hook to run after a successful commit.
    ///
    /// Hooks run in registration order, at most once each, and never run if
    /// the commit fails or the transaction rolls back. They are
    /// fire-and-forget: a hook cannot fail the commit, and a panicking hook
    /// is caught and logged while the remaining hooks still run.
    pub fn add_after_commit<F>(&self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.after_commit.write().push(Box::new(hook));
    }

    /// Run the after-commit hooks. Only called from a successful commit.
    fn run_after_commit(&self) {
        let hooks = self.after_commit.read();
        for hook in hooks.iter() {
            if panic::catch_unwind(AssertUnwindSafe(|| hook())).is_err() {
                warn!(tx = %self.name, "after-commit hook panicked, continuing with remaining hooks");
            }
        }
    }

    /// Access the native transaction for queries and execution.
    ///
    /// The full driver surface stays available through this closure; the
    /// guard layer only intercepts commit and rollback.
    pub fn with_tx<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut native = self.inner.lock();
        f(&mut native)
    }

    /// Whether no terminal action has been taken yet.
    pub fn is_open(&self) -> bool {
        self.guard.status() == GuardStatus::Armed
    }

    /// Debug name of this transaction.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replace the generated debug name with a caller-supplied label.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// When this transaction was created.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

impl<T: TxHandle> Drop for Tx<T> {
    /// Scope exit without commit or rollback rolls the transaction back.
    ///
    /// Drop cannot return the rollback error, so a failure here is logged;
    /// callers that care use [`auto_rollback`](Tx::auto_rollback) before the
    /// end of scope.
    fn drop(&mut self) {
        if let Err(e) = self.guard.fire() {
            warn!(tx = %self.name, error = %e, "rollback on drop failed");
        }
    }
}

impl<T: TxHandle> std::fmt::Debug for Tx<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tx")
            .field("name", &self.name)
            .field("open", &self.is_open())
            .finish()
    }
}
