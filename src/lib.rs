//! txguard - auto-rollback transaction guards.
//!
//! This crate wraps a relational database client so that every transaction
//! it begins is protected by a one-shot rollback guard: leave scope without
//! committing and the transaction rolls back; commit (or roll back
//! explicitly) and the guard stands down. Hooks registered with
//! [`Tx::add_after_commit`] run only once the commit has actually succeeded.
//!
//! # Example
//!
//! ```
//! use txguard::mem::MemDriver;
//!
//! let db = txguard::open::<MemDriver>(":memory:").unwrap();
//!
//! let tx = db.begin().unwrap();
//! tx.with_tx(|native| native.insert("users", "1", "alice")).unwrap();
//! tx.add_after_commit(|| println!("user saved"));
//! tx.commit().unwrap();
//! ```
//!
//! Had that function bailed out before `commit`, dropping `tx` would have
//! rolled the transaction back. Drivers plug in through the [`driver`]
//! traits; the bundled [`mem`] driver is the in-memory implementation the
//! tests and examples run against.

pub mod db;
pub mod driver;
pub mod guard;
pub mod mem;
pub mod tx;

pub use db::{open, Db};
pub use driver::{Connection, Driver, TxHandle};
pub use guard::{Guard, GuardStatus};
pub use tx::{Tx, TxError, TxResult};
