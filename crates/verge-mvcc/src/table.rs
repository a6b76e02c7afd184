//! The storage façade: `VersionDb` and `VersionTable`.
//!
//! `VersionDb` wraps an explicit store handle (there is deliberately no
//! process-wide singleton), allocates transaction ids, owns the
//! transaction-status operations and the engine counters. `VersionTable`
//! is a per-table view exposing the version-chain primitives plus the
//! reconciled read path.
//!
//! Every write issued here is a single atomic backend operation; the
//! façade never retries a CAS mismatch on behalf of the caller.

use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, trace};

use verge_common::constants::FIRST_TX_ID;
use verge_common::error::{VergeError, VergeResult};
use verge_common::types::{CommitTs, Key, TableId, TxId, VersionKey};

use crate::entry::{VersionEntry, VersionStamp};
use crate::reconcile::{reconcile, Reconciled};
use crate::store::VersionStore;
use crate::txtable::{TxStatus, TxTableEntry};

/// Upper bound on re-read passes while reconciling a chain. Each pass
/// only repeats when a cleanup CAS actually landed, so the bound is a
/// backstop, not a correctness requirement.
const MAX_RECONCILE_PASSES: usize = 3;

/// Engine-wide statistics counters.
#[derive(Debug, Default)]
pub struct EngineStats {
    /// Transactions begun.
    pub begun: AtomicU64,
    /// Transactions committed.
    pub committed: AtomicU64,
    /// Transactions aborted (conflicts and explicit aborts).
    pub aborted: AtomicU64,
    /// Uploads that failed on a write-write conflict.
    pub upload_conflicts: AtomicU64,
    /// Validations that failed on a read-write conflict.
    pub validation_conflicts: AtomicU64,
    /// Stale entries repaired on behalf of dead transactions.
    pub lazy_cleanups: AtomicU64,
}

impl EngineStats {
    /// Creates zeroed stats.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// A database handle over one version store.
pub struct VersionDb {
    /// The backend adapter.
    store: Arc<dyn VersionStore>,
    /// Next transaction id to try.
    next_tx_id: AtomicI64,
    /// Statistics.
    stats: EngineStats,
}

impl VersionDb {
    /// Creates a database handle over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn VersionStore>) -> Self {
        Self::with_first_tx_id(store, FIRST_TX_ID)
    }

    /// Creates a database handle that allocates transaction ids starting
    /// at `first_tx_id`.
    ///
    /// Engines reopening a persistent store pass a floor above every id
    /// already present, so allocation does not have to walk over old
    /// status rows.
    #[must_use]
    pub fn with_first_tx_id(store: Arc<dyn VersionStore>, first_tx_id: i64) -> Self {
        Self {
            store,
            next_tx_id: AtomicI64::new(first_tx_id),
            stats: EngineStats::new(),
        }
    }

    /// Returns the underlying store handle.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn VersionStore> {
        &self.store
    }

    /// Returns the engine statistics.
    #[must_use]
    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Returns a per-table view.
    #[must_use]
    pub fn table(&self, table: TableId) -> VersionTable<'_> {
        VersionTable { db: self, table }
    }

    /// Allocates a fresh transaction id and installs its `Ongoing`
    /// status row.
    pub fn begin_transaction(&self) -> VergeResult<TxId> {
        loop {
            let tx_id = TxId::new(self.next_tx_id.fetch_add(1, Ordering::SeqCst));
            if self.store.insert_tx_entry(TxTableEntry::new(tx_id))? {
                self.stats.begun.fetch_add(1, Ordering::Relaxed);
                debug!(%tx_id, "transaction begun");
                return Ok(tx_id);
            }
            // Row already present (engine reopened an existing store);
            // skip forward.
            trace!(%tx_id, "transaction id in use, skipping");
        }
    }

    /// Returns a transaction's status row, if any.
    pub fn tx_entry(&self, tx_id: TxId) -> VergeResult<Option<TxTableEntry>> {
        self.store.get_tx_entry(tx_id)
    }

    /// Transitions a transaction's status row out of `Ongoing`.
    ///
    /// Returns `false` if the row was no longer `Ongoing` (some other
    /// party already decided the outcome). Transitioning *to* `Ongoing`
    /// is a protocol error.
    pub fn update_tx_status(&self, tx_id: TxId, status: TxStatus) -> VergeResult<bool> {
        if status == TxStatus::Ongoing {
            return Err(VergeError::illegal(
                "transaction status can only move from Ongoing to a terminal state",
            ));
        }
        let moved = self
            .store
            .cas_tx_status(tx_id, TxStatus::Ongoing, status)?;
        debug!(%tx_id, %status, moved, "transaction status transition");
        Ok(moved)
    }

    /// First-writer-wins allocation of a commit timestamp, clamped to the
    /// transaction's `commit_lower_bound`. Idempotent.
    pub fn set_and_get_commit_time(&self, tx_id: TxId, proposed: CommitTs) -> VergeResult<CommitTs> {
        let allocated = self.store.set_and_get_commit_ts(tx_id, proposed)?;
        trace!(%tx_id, %proposed, %allocated, "commit timestamp allocation");
        Ok(allocated)
    }

    /// Raises another transaction's `commit_lower_bound`.
    ///
    /// Returns the transaction's commit timestamp when one is already
    /// allocated (the push is moot), else `CommitTs::NONE`.
    pub fn update_commit_lower_bound(&self, tx_id: TxId, bound: CommitTs) -> VergeResult<CommitTs> {
        let allocated = self.store.push_commit_lower_bound(tx_id, bound)?;
        trace!(%tx_id, %bound, %allocated, "commit lower bound push");
        Ok(allocated)
    }
}

impl fmt::Debug for VersionDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionDb")
            .field("store", &self.store.name())
            .field(
                "begun",
                &self.stats.begun.load(Ordering::Relaxed),
            )
            .finish()
    }
}

/// A per-table view over the version store.
#[derive(Clone, Copy)]
pub struct VersionTable<'a> {
    db: &'a VersionDb,
    table: TableId,
}

impl VersionTable<'_> {
    /// Returns the table id of this view.
    #[must_use]
    pub fn table_id(&self) -> TableId {
        self.table
    }

    /// Returns the full current version chain for a record.
    pub fn get_version_list(&self, key: &Key) -> VergeResult<Vec<VersionEntry>> {
        self.db.store.get(self.table, key)
    }

    /// Installs a brand-new version slot; `false` if the slot is taken.
    pub fn upload_new_version_entry(&self, key: &Key, entry: VersionEntry) -> VergeResult<bool> {
        self.db.store.insert_if_absent(self.table, key, entry)
    }

    /// Atomic compare-and-replace of one version's stamp; `None` on
    /// mismatch.
    pub fn replace_version_entry(
        &self,
        key: &Key,
        version_key: VersionKey,
        expected: VersionStamp,
        new: VersionStamp,
    ) -> VergeResult<Option<VersionEntry>> {
        self.db
            .store
            .cas_replace(self.table, key, version_key, expected, new)
    }

    /// Guarded removal of one version slot; `false` on mismatch.
    pub fn delete_version_entry(
        &self,
        key: &Key,
        version_key: VersionKey,
        expected: VersionStamp,
    ) -> VergeResult<bool> {
        self.db
            .store
            .cas_remove(self.table, key, version_key, expected)
    }

    /// Atomically raises one version's `max_commit_ts`.
    pub fn update_version_max_commit_ts(
        &self,
        key: &Key,
        version_key: VersionKey,
        proposed: CommitTs,
    ) -> VergeResult<Option<VersionEntry>> {
        self.db
            .store
            .cas_max_commit_ts(self.table, key, version_key, proposed)
    }

    /// Installs the initial committed placeholder for an empty chain.
    ///
    /// Returns `false` when the first slot already exists (including the
    /// case where a concurrent transaction initialized it first).
    pub fn initialize_chain(&self, key: &Key) -> VergeResult<bool> {
        let installed = self
            .db
            .store
            .insert_if_absent(self.table, key, VersionEntry::initial())?;
        if installed {
            debug!(table = %self.table, ?key, "chain initialized");
        }
        Ok(installed)
    }

    /// Returns the current committed version of a record, lazily
    /// repairing stale entries left behind by dead transactions.
    ///
    /// `None` means the chain is empty or has no current committed
    /// version; tombstones are returned as entries (the caller decides
    /// what "deleted" means).
    pub fn fetch_visible(&self, key: &Key) -> VergeResult<Option<VersionEntry>> {
        let mut pass = 0;
        loop {
            let entries = self.get_version_list(key)?;
            let mut acted = false;
            let mut current = None;

            for entry in &entries {
                if entry.is_held() {
                    let holder = self.db.tx_entry(entry.tx_id)?;
                    let decision = reconcile(entry, holder.as_ref());
                    if decision != Reconciled::Keep {
                        self.apply_reconcile(key, entry, decision)?;
                        acted = true;
                        continue;
                    }
                    // Held by a live transaction: a claimed predecessor
                    // still carries the committed value; a tentative
                    // version is invisible to everyone but its creator.
                    if entry.is_visible_head() {
                        current = Some(entry.clone());
                    }
                } else if entry.is_current() {
                    current = Some(entry.clone());
                }
            }

            pass += 1;
            if !acted || pass >= MAX_RECONCILE_PASSES {
                return Ok(current);
            }
            // A repair landed; re-read so the finalized entries are
            // observed in their committed shape.
        }
    }

    /// Applies a reconcile decision with a single guarded operation.
    ///
    /// Losing the CAS is fine: somebody else repaired the entry first.
    pub fn apply_reconcile(
        &self,
        key: &Key,
        entry: &VersionEntry,
        decision: Reconciled,
    ) -> VergeResult<()> {
        match decision {
            Reconciled::Keep => {}
            Reconciled::Finalize { stamp, raise_max } => {
                let replaced =
                    self.replace_version_entry(key, entry.version_key, entry.stamp(), stamp)?;
                if replaced.is_some() {
                    if let Some(ts) = raise_max {
                        self.update_version_max_commit_ts(key, entry.version_key, ts)?;
                    }
                    self.db.stats.lazy_cleanups.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        table = %self.table,
                        ?key,
                        version_key = %entry.version_key,
                        holder = %entry.tx_id,
                        %stamp,
                        "finalized stale entry"
                    );
                }
            }
            Reconciled::Remove => {
                if self.delete_version_entry(key, entry.version_key, entry.stamp())? {
                    self.db.stats.lazy_cleanups.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        table = %self.table,
                        ?key,
                        version_key = %entry.version_key,
                        holder = %entry.tx_id,
                        "removed tentative entry of aborted transaction"
                    );
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for VersionTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionTable")
            .field("table", &self.table)
            .finish()
    }
}
