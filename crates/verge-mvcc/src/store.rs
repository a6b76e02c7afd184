//! The narrow backend trait the whole protocol is built on.
//!
//! A version store must provide four per-key primitives over version
//! chains (get, insert-if-absent, compare-and-replace, atomic max-update)
//! and their equivalents on the transaction-status table. Every primitive
//! is a single atomic operation on one key; the protocol assumes
//! linearizability per key and nothing across keys.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │          VersionStore Trait             │
//! │  (get, insert_if_absent, cas_*, ...)    │
//! └─────────────────────────────────────────┘
//!              │                   │
//!              ▼                   ▼
//! ┌─────────────────────┐  ┌─────────────────────┐
//! │    MemoryStore      │  │     SledStore       │
//! │  (dashmap + mutex)  │  │ (sled native CAS)   │
//! └─────────────────────┘  └─────────────────────┘
//! ```
//!
//! Adapters live in `verge-store`; the façade (`VersionDb`) and the
//! transaction driver only ever see this trait.

use verge_common::error::VergeResult;
use verge_common::types::{CommitTs, Key, TableId, TxId, VersionKey};

use crate::entry::{VersionEntry, VersionStamp};
use crate::txtable::{TxStatus, TxTableEntry};

/// Atomic per-key storage for version chains and transaction-status rows.
///
/// The façade performs no retries on CAS mismatches; a mismatch is
/// reported to the caller (`None` / `false`), because only the caller
/// knows whether it means "abort" or "retry with fresh expected values".
/// `Err` is reserved for backend faults, after which the in-flight
/// operation is indeterminate.
pub trait VersionStore: Send + Sync {
    /// A short name for the adapter, used in errors and logs.
    fn name(&self) -> &'static str;

    // ======================================================================
    // Version chains
    // ======================================================================

    /// Returns every version entry currently stored for a record.
    ///
    /// No ordering guarantee; `version_key` is unique within the result.
    fn get(&self, table: TableId, key: &Key) -> VergeResult<Vec<VersionEntry>>;

    /// Inserts a version entry if its slot (`entry.version_key`) is
    /// absent. Returns `false` if the slot is already occupied.
    fn insert_if_absent(&self, table: TableId, key: &Key, entry: VersionEntry)
        -> VergeResult<bool>;

    /// Atomically replaces the `(begin, end, tx_id)` stamp of one version
    /// entry, succeeding only if the stored stamp equals `expected`.
    ///
    /// Returns the updated entry on success and `None` on mismatch (or if
    /// the slot does not exist).
    fn cas_replace(
        &self,
        table: TableId,
        key: &Key,
        version_key: VersionKey,
        expected: VersionStamp,
        new: VersionStamp,
    ) -> VergeResult<Option<VersionEntry>>;

    /// Atomically removes a version entry, succeeding only if its stored
    /// stamp equals `expected`. Returns `false` on mismatch or absence.
    fn cas_remove(
        &self,
        table: TableId,
        key: &Key,
        version_key: VersionKey,
        expected: VersionStamp,
    ) -> VergeResult<bool>;

    /// Atomically raises a version's `max_commit_ts` to
    /// `max(current, proposed)`. Returns the updated entry, or `None` if
    /// the slot does not exist.
    fn cas_max_commit_ts(
        &self,
        table: TableId,
        key: &Key,
        version_key: VersionKey,
        proposed: CommitTs,
    ) -> VergeResult<Option<VersionEntry>>;

    // ======================================================================
    // Transaction-status table
    // ======================================================================

    /// Inserts a status row if absent. Returns `false` if a row for this
    /// transaction id already exists.
    fn insert_tx_entry(&self, entry: TxTableEntry) -> VergeResult<bool>;

    /// Returns a transaction's status row, if any.
    fn get_tx_entry(&self, tx_id: TxId) -> VergeResult<Option<TxTableEntry>>;

    /// Atomically transitions a transaction's status, succeeding only if
    /// the stored status equals `expected`. Returns `false` on mismatch.
    ///
    /// Errors with `TransactionNotFound` if no row exists.
    fn cas_tx_status(&self, tx_id: TxId, expected: TxStatus, new: TxStatus) -> VergeResult<bool>;

    /// First-writer-wins allocation of a transaction's commit timestamp.
    ///
    /// If no timestamp has been allocated, stores
    /// `max(proposed, commit_lower_bound)` and returns it; otherwise
    /// returns the already-allocated timestamp (idempotent).
    ///
    /// Errors with `TransactionNotFound` if no row exists.
    fn set_and_get_commit_ts(&self, tx_id: TxId, proposed: CommitTs) -> VergeResult<CommitTs>;

    /// Atomically raises a transaction's `commit_lower_bound` to
    /// `max(current, bound)`.
    ///
    /// Returns the transaction's commit timestamp if one is already
    /// allocated (the bound no longer matters and the caller can stop
    /// pushing), else `CommitTs::NONE`.
    ///
    /// Errors with `TransactionNotFound` if no row exists.
    fn push_commit_lower_bound(&self, tx_id: TxId, bound: CommitTs) -> VergeResult<CommitTs>;
}
