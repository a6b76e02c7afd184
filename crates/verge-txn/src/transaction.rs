//! The client-facing transaction orchestrator.
//!
//! # Transaction Phases
//!
//! ```text
//! ┌────────┐ upload  ┌──────────┐ timestamp ┌─────────────┐
//! │ Active │────────▶│ Uploaded │──────────▶│ Timestamped │
//! └────────┘         └──────────┘           └─────────────┘
//!      │                   │                       │ validate
//!      │                   │                       ▼
//!      │                   │                ┌───────────┐
//!      │                   │                │ Validated │
//!      │                   │                └───────────┘
//!      │                   │                       │ status CAS
//!      ▼                   ▼                       ▼
//! ┌─────────────────────────────┐          ┌───────────┐
//! │           Aborted           │          │ Committed │
//! └─────────────────────────────┘          └───────────┘
//! ```
//!
//! The phase is a local guard against protocol misuse; the authoritative
//! outcome lives in the status row, whose `Ongoing -> terminal` CAS is
//! the serialization point other transactions observe.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::{debug, trace};

use verge_common::constants::{MAX_KEY_SIZE, MAX_VALUE_SIZE, MAX_WRITE_SET_SIZE};
use verge_common::error::{VergeError, VergeResult};
use verge_common::types::{CommitTs, Key, TableId, TxId, Value, VersionKey};
use verge_mvcc::entry::{VersionEntry, VersionStamp};
use verge_mvcc::reconcile::{reconcile, Reconciled};
use verge_mvcc::table::{VersionDb, VersionTable};
use verge_mvcc::txtable::TxStatus;

/// Local phase of a transaction.
///
/// Phases only advance; operations issued against the wrong phase fail
/// fast with [`VergeError::IllegalOperation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxPhase {
    /// Buffering reads and writes.
    Active,
    /// Writes installed in the store.
    Uploaded,
    /// Commit timestamp allocated.
    Timestamped,
    /// Read set certified against the commit timestamp.
    Validated,
    /// Terminal: committed.
    Committed,
    /// Terminal: aborted.
    Aborted,
}

impl TxPhase {
    /// Returns true once the transaction has reached a terminal phase.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TxPhase::Committed | TxPhase::Aborted)
    }
}

impl fmt::Display for TxPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxPhase::Active => write!(f, "Active"),
            TxPhase::Uploaded => write!(f, "Uploaded"),
            TxPhase::Timestamped => write!(f, "Timestamped"),
            TxPhase::Validated => write!(f, "Validated"),
            TxPhase::Committed => write!(f, "Committed"),
            TxPhase::Aborted => write!(f, "Aborted"),
        }
    }
}

/// Why a transaction aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// A write could not be installed (write-write conflict).
    UploadConflict,
    /// The read set no longer held at the commit timestamp
    /// (read-write conflict).
    ValidationConflict,
    /// Aborted by request: the caller's own `abort()`, or an out-of-band
    /// abort of this transaction's status row.
    Requested,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::UploadConflict => write!(f, "upload conflict"),
            AbortReason::ValidationConflict => write!(f, "validation conflict"),
            AbortReason::Requested => write!(f, "requested"),
        }
    }
}

/// The definite outcome of `commit()` / `abort()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome {
    /// The transaction committed at the given timestamp.
    Committed {
        /// Position in the total commit order.
        commit_ts: CommitTs,
    },
    /// The transaction aborted.
    Aborted {
        /// Why it aborted.
        reason: AbortReason,
    },
}

impl TxOutcome {
    /// Returns true if the transaction committed.
    #[must_use]
    pub fn is_committed(&self) -> bool {
        matches!(self, TxOutcome::Committed { .. })
    }
}

/// A buffered mutation, one per record key.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PendingWrite {
    /// Create a record (or revive a tombstone).
    Insert(Value),
    /// Replace a record's payload.
    Update(Value),
    /// Delete a record (uploads a tombstone version).
    Delete,
}

impl PendingWrite {
    fn payload(&self) -> Option<&Value> {
        match self {
            PendingWrite::Insert(value) | PendingWrite::Update(value) => Some(value),
            PendingWrite::Delete => None,
        }
    }
}

/// Bookkeeping for a write that reached the store during upload.
///
/// Partial uploads are deliberate: a failed upload leaves earlier writes
/// installed and abort post-processing unwinds exactly this list.
#[derive(Debug, Clone)]
struct InstalledWrite {
    table: TableId,
    key: Key,
    /// The claimed predecessor slot and its pre-claim stamp, if any.
    predecessor: Option<(VersionKey, VersionStamp)>,
    /// Slot of the tentative new version.
    new_version: VersionKey,
    /// Whether the tentative entry itself landed (the predecessor claim
    /// may succeed while the insert after it fails).
    new_installed: bool,
}

/// An optimistic MVCC transaction.
///
/// Reads and writes buffer locally; nothing touches the backend until
/// [`Transaction::commit`] (or the individual protocol methods, for
/// callers that drive the phases themselves).
pub struct Transaction {
    id: TxId,
    db: Arc<VersionDb>,
    phase: TxPhase,
    commit_ts: CommitTs,
    read_set: HashMap<(TableId, Key), VersionEntry>,
    write_set: HashMap<(TableId, Key), PendingWrite>,
    /// Keys in first-write order, for deterministic uploads.
    write_order: Vec<(TableId, Key)>,
    installed: Vec<InstalledWrite>,
}

impl Transaction {
    /// Begins a new transaction: allocates an id and installs its
    /// `Ongoing` status row.
    pub fn begin(db: Arc<VersionDb>) -> VergeResult<Self> {
        let id = db.begin_transaction()?;
        Ok(Self {
            id,
            db,
            phase: TxPhase::Active,
            commit_ts: CommitTs::NONE,
            read_set: HashMap::new(),
            write_set: HashMap::new(),
            write_order: Vec::new(),
            installed: Vec::new(),
        })
    }

    /// Returns the transaction id.
    #[must_use]
    pub fn id(&self) -> TxId {
        self.id
    }

    /// Returns the current local phase.
    #[must_use]
    pub fn phase(&self) -> TxPhase {
        self.phase
    }

    /// Returns the allocated commit timestamp, `NONE` before allocation.
    #[must_use]
    pub fn commit_ts(&self) -> CommitTs {
        self.commit_ts
    }

    /// Number of distinct keys read so far.
    #[must_use]
    pub fn read_set_len(&self) -> usize {
        self.read_set.len()
    }

    /// Number of distinct keys with buffered writes.
    #[must_use]
    pub fn write_set_len(&self) -> usize {
        self.write_set.len()
    }

    // ======================================================================
    // Buffering operations
    // ======================================================================

    /// Reads a record's current value.
    ///
    /// Buffered writes are read back first; otherwise the first read of a
    /// key fixes the version this transaction will be certified against,
    /// and repeated reads return it unchanged. `None` means the record
    /// does not exist (no chain, or a tombstone).
    pub fn read(&mut self, table: TableId, key: &Key) -> VergeResult<Option<Value>> {
        self.ensure_phase(TxPhase::Active, "read")?;
        check_key(key)?;

        let set_key = (table, key.clone());
        if let Some(write) = self.write_set.get(&set_key) {
            return Ok(write.payload().cloned());
        }
        if let Some(entry) = self.read_set.get(&set_key) {
            return Ok(entry.payload.clone());
        }

        let Some(entry) = self.db.table(table).fetch_visible(key)? else {
            return Ok(None);
        };
        trace!(tx_id = %self.id, %table, ?key, version_key = %entry.version_key, "read");
        let payload = entry.payload.clone();
        self.read_set.insert(set_key, entry);
        Ok(payload)
    }

    /// Like [`read`](Self::read), but installs the initial committed
    /// placeholder when the chain is empty, so a subsequent `insert` on
    /// this key has a well-defined predecessor.
    pub fn read_and_initialize(&mut self, table: TableId, key: &Key) -> VergeResult<Option<Value>> {
        self.ensure_phase(TxPhase::Active, "read_and_initialize")?;
        check_key(key)?;

        let set_key = (table, key.clone());
        if let Some(write) = self.write_set.get(&set_key) {
            return Ok(write.payload().cloned());
        }
        if let Some(entry) = self.read_set.get(&set_key) {
            return Ok(entry.payload.clone());
        }

        let vt = self.db.table(table);
        let entry = match vt.fetch_visible(key)? {
            Some(entry) => entry,
            None => {
                // Lost initializations are fine: somebody else's
                // placeholder is as good as ours.
                vt.initialize_chain(key)?;
                vt.fetch_visible(key)?.ok_or_else(|| {
                    VergeError::internal("chain empty immediately after initialization")
                })?
            }
        };
        let payload = entry.payload.clone();
        self.read_set.insert(set_key, entry);
        Ok(payload)
    }

    /// Buffers an insert. The record must not currently exist: a prior
    /// read of this key, if any, must have seen a tombstone.
    pub fn insert(&mut self, table: TableId, key: &Key, value: Value) -> VergeResult<()> {
        self.ensure_phase(TxPhase::Active, "insert")?;
        check_key(key)?;
        check_value(&value)?;

        let set_key = (table, key.clone());
        match self.write_set.get(&set_key) {
            Some(PendingWrite::Insert(_) | PendingWrite::Update(_)) => {
                return Err(VergeError::illegal(format!(
                    "insert of {key:?}: already written in this transaction"
                )));
            }
            Some(PendingWrite::Delete) => {
                // Delete then insert of a pre-existing record nets out to
                // an update of it.
                self.write_set.insert(set_key, PendingWrite::Update(value));
                return Ok(());
            }
            None => {}
        }

        if let Some(read) = self.read_set.get(&set_key) {
            if !read.is_tombstone() {
                return Err(VergeError::illegal(format!(
                    "insert of {key:?}: record already exists"
                )));
            }
        }

        self.buffer_write(set_key, PendingWrite::Insert(value))
    }

    /// Buffers an update. Requires a prior read of the key that saw a
    /// live record (the read version is the predecessor the upload will
    /// claim).
    pub fn update(&mut self, table: TableId, key: &Key, value: Value) -> VergeResult<()> {
        self.ensure_phase(TxPhase::Active, "update")?;
        check_key(key)?;
        check_value(&value)?;

        let set_key = (table, key.clone());
        match self.write_set.get(&set_key) {
            Some(PendingWrite::Insert(_)) => {
                self.write_set.insert(set_key, PendingWrite::Insert(value));
                return Ok(());
            }
            Some(PendingWrite::Update(_)) => {
                self.write_set.insert(set_key, PendingWrite::Update(value));
                return Ok(());
            }
            Some(PendingWrite::Delete) => {
                return Err(VergeError::illegal(format!(
                    "update of {key:?}: deleted earlier in this transaction"
                )));
            }
            None => {}
        }

        self.require_live_read(&set_key, "update")?;
        self.buffer_write(set_key, PendingWrite::Update(value))
    }

    /// Buffers a delete. Requires a prior read of the key that saw a
    /// live record; uploads as a tombstone version.
    pub fn delete(&mut self, table: TableId, key: &Key) -> VergeResult<()> {
        self.ensure_phase(TxPhase::Active, "delete")?;
        check_key(key)?;

        let set_key = (table, key.clone());
        match self.write_set.get(&set_key) {
            Some(PendingWrite::Insert(_)) => {
                // The record never existed outside this transaction.
                self.write_set.remove(&set_key);
                self.write_order.retain(|k| k != &set_key);
                return Ok(());
            }
            Some(PendingWrite::Update(_)) => {
                self.write_set.insert(set_key, PendingWrite::Delete);
                return Ok(());
            }
            Some(PendingWrite::Delete) => {
                return Err(VergeError::illegal(format!(
                    "delete of {key:?}: already deleted in this transaction"
                )));
            }
            None => {}
        }

        self.require_live_read(&set_key, "delete")?;
        self.buffer_write(set_key, PendingWrite::Delete)
    }

    fn require_live_read(&self, set_key: &(TableId, Key), op: &str) -> VergeResult<()> {
        match self.read_set.get(set_key) {
            None => Err(VergeError::illegal(format!(
                "{op} of {:?}: requires a prior read in this transaction",
                set_key.1
            ))),
            Some(read) if read.is_tombstone() => Err(VergeError::illegal(format!(
                "{op} of {:?}: record does not exist",
                set_key.1
            ))),
            Some(_) => Ok(()),
        }
    }

    fn buffer_write(&mut self, set_key: (TableId, Key), write: PendingWrite) -> VergeResult<()> {
        if self.write_set.len() >= MAX_WRITE_SET_SIZE {
            return Err(VergeError::WriteSetFull {
                size: self.write_set.len(),
                limit: MAX_WRITE_SET_SIZE,
            });
        }
        self.write_order.push(set_key.clone());
        self.write_set.insert(set_key, write);
        Ok(())
    }

    // ======================================================================
    // Commit protocol
    // ======================================================================

    /// Installs every buffered write in the store.
    ///
    /// Returns `false` on the first conflict. Installed writes are left
    /// in place either way; a failed upload must be followed by abort
    /// post-processing, which unwinds exactly what landed.
    pub fn upload_local_write_records(&mut self) -> VergeResult<bool> {
        self.ensure_phase(TxPhase::Active, "upload_local_write_records")?;

        let db = Arc::clone(&self.db);
        for set_key in self.write_order.clone() {
            let (table, key) = &set_key;
            let write = self.write_set[&set_key].clone();
            let vt = db.table(*table);

            let predecessor = self.read_set.get(&set_key).cloned();
            let installed = match predecessor {
                Some(predecessor) => {
                    self.upload_with_predecessor(&vt, key, &predecessor, &write)?
                }
                None => self.upload_fresh_chain(&vt, key, &write)?,
            };

            if !installed {
                self.db
                    .stats()
                    .upload_conflicts
                    .fetch_add(1, Ordering::Relaxed);
                debug!(tx_id = %self.id, table = %table, ?key, "upload conflict");
                return Ok(false);
            }
        }

        self.phase = TxPhase::Uploaded;
        debug!(tx_id = %self.id, writes = self.installed.len(), "upload complete");
        Ok(true)
    }

    /// Two linked CAS steps: claim the predecessor, then install the
    /// tentative successor.
    fn upload_with_predecessor(
        &mut self,
        vt: &VersionTable<'_>,
        key: &Key,
        predecessor: &VersionEntry,
        write: &PendingWrite,
    ) -> VergeResult<bool> {
        let Some(pre_claim) = self.claim_predecessor(vt, key, predecessor)? else {
            return Ok(false);
        };

        let new_version = predecessor.version_key.next();
        // Record the claim before attempting the insert so abort
        // post-processing releases it even if the insert fails.
        self.installed.push(InstalledWrite {
            table: vt.table_id(),
            key: key.clone(),
            predecessor: Some((predecessor.version_key, pre_claim)),
            new_version,
            new_installed: false,
        });

        let tentative = VersionEntry::tentative(new_version, self.id, write.payload().cloned());
        if !vt.upload_new_version_entry(key, tentative)? {
            return Ok(false);
        }

        if let Some(last) = self.installed.last_mut() {
            last.new_installed = true;
        }
        Ok(true)
    }

    /// Installs a brand-new chain head (insert with no prior chain).
    fn upload_fresh_chain(
        &mut self,
        vt: &VersionTable<'_>,
        key: &Key,
        write: &PendingWrite,
    ) -> VergeResult<bool> {
        if !matches!(write, PendingWrite::Insert(_)) {
            // Buffering rules guarantee a predecessor for update/delete.
            return Err(VergeError::internal(format!(
                "buffered {write:?} of {key:?} has no predecessor in the read set"
            )));
        }

        let tentative =
            VersionEntry::tentative(VersionKey::FIRST, self.id, write.payload().cloned());
        if !vt.upload_new_version_entry(key, tentative)? {
            // A concurrent transaction created or claimed this head; not
            // retried.
            return Ok(false);
        }

        self.installed.push(InstalledWrite {
            table: vt.table_id(),
            key: key.clone(),
            predecessor: None,
            new_version: VersionKey::FIRST,
            new_installed: true,
        });
        Ok(true)
    }

    /// Stamps the predecessor's `tx_id` from `NONE` to this transaction,
    /// leaving its interval untouched.
    ///
    /// On a mismatch, inspects the current holder: an `Aborted` holder is
    /// rolled back and the claim retried once; `Committed` and `Ongoing`
    /// holders fail the claim (a real conflict and a fail-fast,
    /// respectively). Returns the pre-claim stamp on success.
    fn claim_predecessor(
        &self,
        vt: &VersionTable<'_>,
        key: &Key,
        predecessor: &VersionEntry,
    ) -> VergeResult<Option<VersionStamp>> {
        // The read may have recorded the predecessor while another
        // transaction held it; the claim still only takes over from an
        // unclaimed stamp.
        let unclaimed = VersionStamp::new(predecessor.begin_ts, predecessor.end_ts, TxId::NONE);
        let claimed = unclaimed.held_by(self.id);

        for attempt in 0..2 {
            if vt
                .replace_version_entry(key, predecessor.version_key, unclaimed, claimed)?
                .is_some()
            {
                return Ok(Some(unclaimed));
            }

            let chain = vt.get_version_list(key)?;
            let Some(current) = chain
                .iter()
                .find(|v| v.version_key == predecessor.version_key)
            else {
                return Ok(None);
            };

            if current.tx_id == self.id {
                // Already claimed by us (a retried upload).
                return Ok(Some(unclaimed));
            }
            if current.stamp() != unclaimed.held_by(current.tx_id) {
                // The interval itself moved: a concurrent writer
                // committed over this version.
                return Ok(None);
            }
            if !current.is_held() {
                // Released between our CAS and the re-read; loop to try
                // again.
                continue;
            }

            let holder = self.db.tx_entry(current.tx_id)?;
            match reconcile(current, holder.as_ref()) {
                decision @ (Reconciled::Finalize { .. } | Reconciled::Remove) => {
                    if attempt > 0 {
                        return Ok(None);
                    }
                    vt.apply_reconcile(key, current, decision)?;
                    // Retry the claim once against the repaired entry.
                }
                Reconciled::Keep => {
                    // Holder is live (ongoing or committed): fail fast.
                    return Ok(None);
                }
            }
        }
        Ok(None)
    }

    /// Allocates this transaction's commit timestamp.
    ///
    /// The candidate is one past everything the transaction observed:
    /// the `max_commit_ts` of every read version (write-set predecessors
    /// are read versions too) and any lower bound concurrent validators
    /// pushed onto this transaction. A transaction that observed nothing
    /// proposes 0. The store clamps and makes the choice first-writer-
    /// wins, so repeated calls return the same value.
    pub fn acquire_commit_timestamp(&mut self) -> VergeResult<CommitTs> {
        self.ensure_phase(TxPhase::Uploaded, "acquire_commit_timestamp")?;

        let candidate = if self.read_set.is_empty() && self.write_set.is_empty() {
            CommitTs::ZERO
        } else {
            let mut observed = CommitTs::ZERO;
            for entry in self.read_set.values() {
                observed = observed.max(entry.max_commit_ts);
            }
            let row = self
                .db
                .tx_entry(self.id)?
                .ok_or(VergeError::TransactionNotFound { tx_id: self.id })?;
            observed = observed.max(row.commit_lower_bound);
            observed.next()
        };

        self.commit_ts = self.db.set_and_get_commit_time(self.id, candidate)?;
        self.phase = TxPhase::Timestamped;
        debug!(tx_id = %self.id, candidate = %candidate, commit_ts = %self.commit_ts, "commit timestamp allocated");
        Ok(self.commit_ts)
    }

    /// Certifies the read set against the allocated commit timestamp.
    ///
    /// Returns `false` as soon as one read version can no longer be
    /// ordered before this transaction.
    pub fn validate(&mut self) -> VergeResult<bool> {
        self.ensure_phase(TxPhase::Timestamped, "validate")?;

        for ((table, key), read_entry) in self.read_set.clone() {
            let vt = self.db.table(table);
            if !self.validate_entry(&vt, &key, &read_entry)? {
                self.db
                    .stats()
                    .validation_conflicts
                    .fetch_add(1, Ordering::Relaxed);
                debug!(tx_id = %self.id, %table, ?key, "validation conflict");
                return Ok(false);
            }
        }

        self.phase = TxPhase::Validated;
        debug!(tx_id = %self.id, reads = self.read_set.len(), "validation passed");
        Ok(true)
    }

    fn validate_entry(
        &self,
        vt: &VersionTable<'_>,
        key: &Key,
        read_entry: &VersionEntry,
    ) -> VergeResult<bool> {
        for _attempt in 0..2 {
            // Raising max_commit_ts first both fences future writers of
            // this version behind our timestamp and hands back its
            // current state in one atomic step.
            let Some(current) =
                vt.update_version_max_commit_ts(key, read_entry.version_key, self.commit_ts)?
            else {
                // The version vanished (aborted garbage we somehow read,
                // or an out-of-band reclaim): not certifiable.
                return Ok(false);
            };

            if current.tx_id == self.id {
                // Our own claimed predecessor; the claim already fenced
                // concurrent writers out.
                return Ok(true);
            }

            if !current.is_held() {
                return Ok(current.visible_at(self.commit_ts));
            }

            let holder = self.db.tx_entry(current.tx_id)?;
            let Some(holder) = holder else {
                // A holder with no status row cannot be classified or
                // constrained; treat the read as uncertifiable.
                return Ok(false);
            };

            match holder.status {
                TxStatus::Aborted => {
                    vt.apply_reconcile(key, &current, reconcile(&current, Some(&holder)))?;
                    // Re-check against the repaired entry.
                    continue;
                }
                TxStatus::Committed => {
                    // The holder decided before we could constrain it; we
                    // survive only if it serialized after us.
                    return Ok(holder.commit_ts > self.commit_ts);
                }
                TxStatus::Ongoing => {
                    let allocated = self
                        .db
                        .update_commit_lower_bound(current.tx_id, self.commit_ts.next())?;
                    // NONE: the push landed and the holder is now forced
                    // to serialize after us. Otherwise the holder already
                    // chose a timestamp and only a later one keeps our
                    // read valid.
                    return Ok(allocated.is_none() || allocated > self.commit_ts);
                }
            }
        }
        Ok(false)
    }

    /// Drives the full commit protocol to a definite outcome.
    pub fn commit(&mut self) -> VergeResult<TxOutcome> {
        self.ensure_phase(TxPhase::Active, "commit")?;

        if !self.upload_local_write_records()? {
            return self.abort_with(AbortReason::UploadConflict);
        }
        self.acquire_commit_timestamp()?;
        if !self.validate()? {
            return self.abort_with(AbortReason::ValidationConflict);
        }

        // The serialization point: after this CAS every concurrent
        // validator sees the outcome.
        if !self.db.update_tx_status(self.id, TxStatus::Committed)? {
            // Somebody aborted this transaction out-of-band.
            return self.abort_finalize(AbortReason::Requested);
        }

        self.phase = TxPhase::Committed;
        self.db.stats().committed.fetch_add(1, Ordering::Relaxed);
        self.post_processing_after_commit()?;
        debug!(tx_id = %self.id, commit_ts = %self.commit_ts, "committed");
        Ok(TxOutcome::Committed {
            commit_ts: self.commit_ts,
        })
    }

    /// Aborts the transaction: flips the status row and unwinds whatever
    /// the upload installed. Usable from any non-terminal phase, and by
    /// external callers reclaiming a stale transaction.
    pub fn abort(&mut self) -> VergeResult<TxOutcome> {
        if self.phase.is_terminal() {
            return Err(VergeError::illegal(format!(
                "abort of transaction {} in terminal phase {}",
                self.id, self.phase
            )));
        }
        self.abort_with(AbortReason::Requested)
    }

    fn abort_with(&mut self, reason: AbortReason) -> VergeResult<TxOutcome> {
        if !self.db.update_tx_status(self.id, TxStatus::Aborted)? {
            // Already terminal. Committed means a protocol error by the
            // caller; Aborted just means somebody beat us to it.
            let row = self
                .db
                .tx_entry(self.id)?
                .ok_or(VergeError::TransactionNotFound { tx_id: self.id })?;
            if row.status == TxStatus::Committed {
                return Err(VergeError::illegal(format!(
                    "abort of committed transaction {}",
                    self.id
                )));
            }
        }
        self.abort_finalize(reason)
    }

    fn abort_finalize(&mut self, reason: AbortReason) -> VergeResult<TxOutcome> {
        self.phase = TxPhase::Aborted;
        self.db.stats().aborted.fetch_add(1, Ordering::Relaxed);
        self.post_processing_after_abort()?;
        debug!(tx_id = %self.id, %reason, "aborted");
        Ok(TxOutcome::Aborted { reason })
    }

    // ======================================================================
    // Post-processing
    // ======================================================================

    /// Finalizes every installed write after a commit: the tentative
    /// version becomes `[commit_ts, INFINITY)` (and its `max_commit_ts`
    /// is raised to `commit_ts`), the predecessor closes at `commit_ts`.
    ///
    /// Best-effort and idempotent: a lost CAS means a concurrent
    /// transaction already finished (or took over) that slot, which is
    /// never an error.
    pub fn post_processing_after_commit(&mut self) -> VergeResult<()> {
        let commit_ts = self.require_terminal_status(TxStatus::Committed)?;
        self.phase = TxPhase::Committed;
        self.commit_ts = commit_ts;

        for write in self.installed.clone() {
            let vt = self.db.table(write.table);

            if write.new_installed {
                let finalized = vt.replace_version_entry(
                    &write.key,
                    write.new_version,
                    VersionStamp::tentative(self.id),
                    VersionStamp::current(commit_ts),
                )?;
                if finalized.is_some() {
                    // Later readers propose timestamps from max_commit_ts;
                    // keep it at or above begin_ts.
                    vt.update_version_max_commit_ts(&write.key, write.new_version, commit_ts)?;
                }
            }

            if let Some((version_key, pre_claim)) = write.predecessor {
                vt.replace_version_entry(
                    &write.key,
                    version_key,
                    pre_claim.held_by(self.id),
                    VersionStamp::committed(pre_claim.begin_ts, commit_ts),
                )?;
            }
        }
        Ok(())
    }

    /// Unwinds every installed write after an abort: the tentative
    /// version is deleted, the predecessor's claim is released with its
    /// interval untouched.
    ///
    /// Best-effort and idempotent, like commit post-processing.
    pub fn post_processing_after_abort(&mut self) -> VergeResult<()> {
        self.require_terminal_status(TxStatus::Aborted)?;
        self.phase = TxPhase::Aborted;

        for write in self.installed.clone() {
            let vt = self.db.table(write.table);

            if write.new_installed {
                vt.delete_version_entry(
                    &write.key,
                    write.new_version,
                    VersionStamp::tentative(self.id),
                )?;
            }

            if let Some((version_key, pre_claim)) = write.predecessor {
                vt.replace_version_entry(
                    &write.key,
                    version_key,
                    pre_claim.held_by(self.id),
                    pre_claim,
                )?;
            }
        }
        Ok(())
    }

    /// Checks the status row carries the expected terminal status and
    /// returns its commit timestamp.
    ///
    /// Post-processing takes its cue from the row rather than the local
    /// phase so that callers driving the phases by hand (or finishing a
    /// transaction whose driver died) can invoke it directly.
    fn require_terminal_status(&self, expected: TxStatus) -> VergeResult<CommitTs> {
        let row = self
            .db
            .tx_entry(self.id)?
            .ok_or(VergeError::TransactionNotFound { tx_id: self.id })?;
        if row.status != expected {
            return Err(VergeError::illegal(format!(
                "post-processing of transaction {} requires status {expected}, found {}",
                self.id, row.status
            )));
        }
        Ok(row.commit_ts)
    }

    fn ensure_phase(&self, expected: TxPhase, op: &str) -> VergeResult<()> {
        if self.phase != expected {
            return Err(VergeError::illegal(format!(
                "{op} requires phase {expected}, transaction {} is {}",
                self.id, self.phase
            )));
        }
        Ok(())
    }
}

fn check_key(key: &Key) -> VergeResult<()> {
    if !key.is_within_limit() {
        return Err(VergeError::KeyTooLarge {
            size: key.len(),
            max_size: MAX_KEY_SIZE,
        });
    }
    Ok(())
}

fn check_value(value: &Value) -> VergeResult<()> {
    if !value.is_within_limit() {
        return Err(VergeError::ValueTooLarge {
            size: value.len(),
            max_size: MAX_VALUE_SIZE,
        });
    }
    Ok(())
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("phase", &self.phase)
            .field("commit_ts", &self.commit_ts)
            .field("reads", &self.read_set.len())
            .field("writes", &self.write_set.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verge_store::MemoryStore;

    const TABLE: TableId = TableId::new(1);

    fn db() -> Arc<VersionDb> {
        Arc::new(VersionDb::new(Arc::new(MemoryStore::new())))
    }

    fn key() -> Key {
        Key::from("person:1")
    }

    #[test]
    fn test_begin_installs_status_row() {
        let db = db();
        let tx = Transaction::begin(Arc::clone(&db)).unwrap();

        let row = db.tx_entry(tx.id()).unwrap().unwrap();
        assert_eq!(row.status, TxStatus::Ongoing);
        assert_eq!(row.commit_ts, CommitTs::NONE);
        assert_eq!(tx.phase(), TxPhase::Active);
    }

    #[test]
    fn test_read_of_missing_key() {
        let db = db();
        let mut tx = Transaction::begin(db).unwrap();
        assert_eq!(tx.read(TABLE, &key()).unwrap(), None);
        // Nothing to certify later.
        assert_eq!(tx.read_set_len(), 0);
    }

    #[test]
    fn test_read_and_initialize_installs_placeholder() {
        let db = db();
        let mut tx = Transaction::begin(Arc::clone(&db)).unwrap();

        assert_eq!(tx.read_and_initialize(TABLE, &key()).unwrap(), None);
        assert_eq!(tx.read_set_len(), 1);

        let chain = db.table(TABLE).get_version_list(&key()).unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].version_key, VersionKey::FIRST);
        assert!(chain[0].is_current());
        assert!(chain[0].is_tombstone());
    }

    #[test]
    fn test_update_requires_prior_read() {
        let db = db();
        let mut tx = Transaction::begin(db).unwrap();
        let err = tx.update(TABLE, &key(), Value::from("v")).unwrap_err();
        assert!(matches!(err, VergeError::IllegalOperation { .. }));
    }

    #[test]
    fn test_update_of_tombstone_is_illegal() {
        let db = db();
        let mut tx = Transaction::begin(db).unwrap();
        tx.read_and_initialize(TABLE, &key()).unwrap();
        let err = tx.update(TABLE, &key(), Value::from("v")).unwrap_err();
        assert!(matches!(err, VergeError::IllegalOperation { .. }));
    }

    #[test]
    fn test_insert_over_live_record_is_illegal() {
        let db = db();

        let mut setup = Transaction::begin(Arc::clone(&db)).unwrap();
        setup.read_and_initialize(TABLE, &key()).unwrap();
        setup.insert(TABLE, &key(), Value::from("v1")).unwrap();
        assert!(setup.commit().unwrap().is_committed());

        let mut tx = Transaction::begin(db).unwrap();
        assert_eq!(tx.read(TABLE, &key()).unwrap(), Some(Value::from("v1")));
        let err = tx.insert(TABLE, &key(), Value::from("v2")).unwrap_err();
        assert!(matches!(err, VergeError::IllegalOperation { .. }));
    }

    #[test]
    fn test_write_coalescing() {
        let db = db();
        let mut tx = Transaction::begin(db).unwrap();

        // Insert then delete cancels out entirely.
        tx.insert(TABLE, &key(), Value::from("v")).unwrap();
        tx.delete(TABLE, &key()).unwrap();
        assert_eq!(tx.write_set_len(), 0);

        // Insert then update stays an insert with the newer payload.
        tx.insert(TABLE, &key(), Value::from("v1")).unwrap();
        tx.update(TABLE, &key(), Value::from("v2")).unwrap();
        assert_eq!(tx.read(TABLE, &key()).unwrap(), Some(Value::from("v2")));
        assert_eq!(tx.write_set_len(), 1);
    }

    #[test]
    fn test_read_your_own_writes() {
        let db = db();
        let mut tx = Transaction::begin(db).unwrap();

        tx.insert(TABLE, &key(), Value::from("mine")).unwrap();
        assert_eq!(tx.read(TABLE, &key()).unwrap(), Some(Value::from("mine")));

        tx.delete(TABLE, &key()).unwrap();
        assert_eq!(tx.read(TABLE, &key()).unwrap(), None);
    }

    #[test]
    fn test_phase_guards() {
        let db = db();
        let mut tx = Transaction::begin(db).unwrap();

        // Validation before upload/timestamp is protocol misuse.
        assert!(matches!(
            tx.validate().unwrap_err(),
            VergeError::IllegalOperation { .. }
        ));
        assert!(matches!(
            tx.acquire_commit_timestamp().unwrap_err(),
            VergeError::IllegalOperation { .. }
        ));

        assert!(tx.upload_local_write_records().unwrap());
        // Buffering after upload is protocol misuse.
        assert!(matches!(
            tx.read(TABLE, &key()).unwrap_err(),
            VergeError::IllegalOperation { .. }
        ));
    }

    #[test]
    fn test_empty_transaction_commits_at_zero() {
        let db = db();
        let mut tx = Transaction::begin(db).unwrap();
        let outcome = tx.commit().unwrap();
        assert_eq!(
            outcome,
            TxOutcome::Committed {
                commit_ts: CommitTs::ZERO
            }
        );
    }

    #[test]
    fn test_insert_then_read_back_after_commit() {
        let db = db();

        let mut writer = Transaction::begin(Arc::clone(&db)).unwrap();
        writer.read_and_initialize(TABLE, &key()).unwrap();
        writer.insert(TABLE, &key(), Value::from("v1")).unwrap();
        let outcome = writer.commit().unwrap();
        assert!(outcome.is_committed());

        let mut reader = Transaction::begin(db).unwrap();
        assert_eq!(reader.read(TABLE, &key()).unwrap(), Some(Value::from("v1")));
        assert!(reader.commit().unwrap().is_committed());
    }

    #[test]
    fn test_abort_after_terminal_phase_is_illegal() {
        let db = db();
        let mut tx = Transaction::begin(db).unwrap();
        tx.commit().unwrap();
        assert!(matches!(
            tx.abort().unwrap_err(),
            VergeError::IllegalOperation { .. }
        ));
    }

    #[test]
    fn test_explicit_abort_unwinds_buffered_insert() {
        let db = db();

        let mut tx = Transaction::begin(Arc::clone(&db)).unwrap();
        tx.insert(TABLE, &key(), Value::from("v")).unwrap();
        assert!(tx.upload_local_write_records().unwrap());
        let outcome = tx.abort().unwrap();
        assert_eq!(
            outcome,
            TxOutcome::Aborted {
                reason: AbortReason::Requested
            }
        );

        // The tentative head is gone.
        assert!(db.table(TABLE).get_version_list(&key()).unwrap().is_empty());
    }
}
