//! Boundary contract with the underlying database client library.
//!
//! This crate does not talk to a database itself. It wraps a client library
//! that can open connections, begin transactions, and commit or roll them
//! back; everything else about the driver (SQL dialect, pooling, timeouts)
//! stays on the driver's side of this seam.
//!
//! Where the original wrappers of this kind select a driver by name string
//! at runtime, here the driver is a type: `open::<SomeDriver>(dsn)`.

/// A database driver: a way to open connections from a connection string.
pub trait Driver {
    /// Error type shared by the driver's connection and transaction calls.
    type Error: std::error::Error + Send + 'static;
    /// The connection type this driver opens.
    type Conn: Connection<Error = Self::Error>;

    /// Open a connection. The connection string format is the driver's own.
    fn open(dsn: &str) -> Result<Self::Conn, Self::Error>;
}

/// An open connection that can begin native transactions.
pub trait Connection {
    /// Error type for begin and for the resulting transaction's calls.
    type Error: std::error::Error + Send + 'static;
    /// The native transaction type.
    type Tx: TxHandle<Error = Self::Error>;

    /// Begin a new native transaction.
    fn begin(&self) -> Result<Self::Tx, Self::Error>;
}

/// A native transaction: the two calls this layer needs from the driver.
///
/// `Send + 'static` because the guarded wrapper shares the handle with the
/// rollback guard, which may fire from another thread or at drop time.
pub trait TxHandle: Send + 'static {
    /// The driver's error type.
    type Error: std::error::Error + Send + 'static;

    /// Commit the transaction.
    fn commit(&mut self) -> Result<(), Self::Error>;

    /// Roll the transaction back.
    fn rollback(&mut self) -> Result<(), Self::Error>;
}
