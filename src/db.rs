//! Connection wrapper.
//!
//! [`Db`] wraps a driver connection and is where guarded transactions come
//! from: [`begin`](Db::begin) delegates to the driver and arms the rollback
//! guard around the native transaction it returns.

use tracing::debug;
use ulid::Ulid;

use crate::driver::{Connection, Driver};
use crate::tx::{Tx, TxError, TxResult};

/// Open a connection through driver `D` and wrap it.
///
/// The driver's own error is wrapped with open context; nothing is
/// constructed on failure.
pub fn open<D: Driver>(dsn: &str) -> TxResult<Db<D::Conn>, D::Error> {
    let conn = D::open(dsn).map_err(TxError::Open)?;
    Ok(Db::wrap(conn))
}

/// A driver connection that hands out guarded transactions.
pub struct Db<C: Connection> {
    conn: C,
}

impl<C: Connection> Db<C> {
    /// Wrap an already open native connection.
    pub fn wrap(conn: C) -> Self {
        Self { conn }
    }

    /// The native connection, for everything the driver offers besides
    /// transactions.
    pub fn conn(&self) -> &C {
        &self.conn
    }

    /// Mutable access to the native connection.
    pub fn conn_mut(&mut self) -> &mut C {
        &mut self.conn
    }

    /// Unwrap back into the native connection.
    pub fn into_inner(self) -> C {
        self.conn
    }

    /// Begin a guarded transaction.
    ///
    /// On success the returned [`Tx`] is armed: dropping it without a
    /// commit or rollback rolls it back. On failure the driver error is
    /// propagated and nothing is armed.
    pub fn begin(&self) -> TxResult<Tx<C::Tx>, C::Error> {
        let native = self.conn.begin().map_err(TxError::Begin)?;
        let name = format!("tx-{}", Ulid::new().to_string().to_lowercase());
        debug!(tx = %name, "transaction started");
        Ok(Tx::new(native, name))
    }

    /// Run a closure inside a transaction.
    ///
    /// Commits when the closure returns `Ok`; when it returns `Err`, the
    /// transaction is dropped on the way out and the guard rolls it back.
    /// The closure's error type only has to absorb [`TxError`], so domain
    /// errors and lifecycle errors share one return path.
    pub fn with_transaction<F, R, E>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&Tx<C::Tx>) -> Result<R, E>,
        E: From<TxError<C::Error>>,
    {
        let tx = self.begin()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

impl<C: Connection> std::fmt::Debug for Db<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db").finish_non_exhaustive()
    }
}
