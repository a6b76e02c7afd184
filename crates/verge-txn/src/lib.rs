//! # verge-txn
//!
//! Optimistic MVCC transaction driver for VergeDB.
//!
//! A [`Transaction`] buffers reads and writes locally, then drives the
//! four-phase commit protocol against a
//! [`VersionDb`](verge_mvcc::VersionDb):
//!
//! 1. **Upload** — install tentative versions and claim predecessors via
//!    per-key CAS;
//! 2. **Timestamp** — allocate a commit timestamp ordered after every
//!    version the transaction observed;
//! 3. **Validate** — re-check the read set against the allocated
//!    timestamp, cooperatively pushing concurrent writers' lower bounds;
//! 4. **Status + post-processing** — flip the status row (the
//!    serialization point) and finalize or unwind the uploaded entries.
//!
//! No step blocks on another transaction; conflicts fail fast and
//! abandoned state is repaired lazily by whoever reads it next.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Transaction state machine
pub mod transaction;

pub use transaction::{AbortReason, Transaction, TxOutcome, TxPhase};
