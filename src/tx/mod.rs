//! Guarded transactions.
//!
//! This module pairs a native driver transaction with a one-shot rollback
//! guard and an after-commit hook list:
//!
//! ```text
//!  ┌──────────────────────────────────────────────┐
//!  │                     Tx                       │
//!  │  (commit / rollback / auto-rollback / hooks) │
//!  └──────────────────────────────────────────────┘
//!            │                        │
//!            ▼                        ▼
//!     ┌─────────────┐        ┌─────────────────┐
//!     │    Guard    │        │ native TxHandle │
//!     │  (one-shot) │───────▶│  (driver side)  │
//!     └─────────────┘rollback└─────────────────┘
//! ```
//!
//! Whichever of commit, explicit rollback, explicit auto-rollback, or drop
//! happens first decides the transaction; everything after it is a no-op at
//! this layer.

mod context;
mod error;

pub use context::Tx;
pub use error::{TxError, TxResult};
