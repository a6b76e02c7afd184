//! Transaction-status table rows.
//!
//! One row per transaction id. The row is the only place a transaction's
//! outcome is recorded; the status transition `Ongoing -> Committed` (or
//! `Aborted`) is the serialization point of the whole commit protocol, and
//! concurrent validators read these rows to classify the holders of
//! version entries they encounter.

use serde::{Deserialize, Serialize};
use std::fmt;

use verge_common::types::{CommitTs, TxId};

/// The lifecycle status of a transaction.
///
/// ```text
/// ┌─────────┐  status CAS   ┌───────────┐
/// │ Ongoing │──────────────▶│ Committed │
/// └─────────┘               └───────────┘
///      │
///      │ status CAS
///      ▼
/// ┌─────────┐
/// │ Aborted │
/// └─────────┘
/// ```
///
/// Terminal states are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    /// Transaction is in flight.
    Ongoing,
    /// Transaction committed; its writes are (or will be finalized as)
    /// visible from its commit timestamp.
    Committed,
    /// Transaction aborted; its tentative writes are garbage awaiting
    /// lazy cleanup.
    Aborted,
}

impl TxStatus {
    /// Returns true once the transaction has reached a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TxStatus::Committed | TxStatus::Aborted)
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxStatus::Ongoing => write!(f, "Ongoing"),
            TxStatus::Committed => write!(f, "Committed"),
            TxStatus::Aborted => write!(f, "Aborted"),
        }
    }
}

/// One row of the transaction-status table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxTableEntry {
    /// The transaction this row describes.
    pub tx_id: TxId,
    /// Lifecycle status; terminal once non-`Ongoing`.
    pub status: TxStatus,
    /// Allocated commit timestamp, `NONE` until chosen.
    pub commit_ts: CommitTs,
    /// Smallest commit timestamp this transaction may choose; raised by
    /// concurrent validators to force a serialization order without
    /// blocking.
    pub commit_lower_bound: CommitTs,
}

impl TxTableEntry {
    /// Creates the row for a freshly begun transaction.
    #[must_use]
    pub fn new(tx_id: TxId) -> Self {
        Self {
            tx_id,
            status: TxStatus::Ongoing,
            commit_ts: CommitTs::NONE,
            commit_lower_bound: CommitTs::ZERO,
        }
    }

    /// Checks if a commit timestamp has been allocated.
    #[inline]
    #[must_use]
    pub fn has_commit_ts(&self) -> bool {
        self.commit_ts.is_some()
    }
}
