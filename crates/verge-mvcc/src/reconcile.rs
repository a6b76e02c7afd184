//! Lazy cleanup of stale version entries.
//!
//! A transaction that dies or is slow leaves claimed entries behind; the
//! next transaction to read them finishes (or undoes) the work on its
//! behalf. The decision of *what* to do with a held entry is a pure
//! function of the entry's shape and the holder's status row, so every
//! read path can share it and the side effects stay in one place
//! (`VersionTable::apply_reconcile`).

use verge_common::types::{CommitTs, TxId};

use crate::entry::{VersionEntry, VersionStamp};
use crate::txtable::{TxStatus, TxTableEntry};

/// What to do with a version entry encountered during a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// Leave the entry as is (unclaimed, or held by a live transaction).
    Keep,
    /// Replace the entry's stamp; optionally raise its `max_commit_ts`
    /// afterwards (a finalized new version must carry
    /// `max_commit_ts >= begin_ts`).
    Finalize {
        /// The stamp to install.
        stamp: VersionStamp,
        /// Raise `max_commit_ts` to this value after the stamp lands.
        raise_max: Option<CommitTs>,
    },
    /// Remove the entry outright (tentative garbage of an aborted
    /// transaction).
    Remove,
}

/// Decides how to repair a version entry given its holder's status row.
///
/// `holder` is the status row of `entry.tx_id`, or `None` when no row
/// exists. Rows are never deleted, so a missing row is treated the same
/// as an ongoing holder rather than guessed at.
#[must_use]
pub fn reconcile(entry: &VersionEntry, holder: Option<&TxTableEntry>) -> Reconciled {
    if entry.tx_id == TxId::NONE {
        return Reconciled::Keep;
    }

    let Some(holder) = holder else {
        return Reconciled::Keep;
    };

    match holder.status {
        TxStatus::Ongoing => Reconciled::Keep,
        TxStatus::Committed => {
            // A committed holder's post-processing may still be in flight
            // (or was cut short); finish it here.
            let commit_ts = holder.commit_ts;
            if commit_ts.is_none() {
                // Status says committed but the timestamp is not readable
                // yet; do not guess.
                return Reconciled::Keep;
            }
            if entry.is_tentative() {
                Reconciled::Finalize {
                    stamp: VersionStamp::current(commit_ts),
                    raise_max: Some(commit_ts),
                }
            } else {
                // Superseded predecessor: close its interval.
                Reconciled::Finalize {
                    stamp: VersionStamp::committed(entry.begin_ts, commit_ts),
                    raise_max: None,
                }
            }
        }
        TxStatus::Aborted => {
            if entry.is_tentative() {
                Reconciled::Remove
            } else {
                // Release the claimed predecessor untouched.
                Reconciled::Finalize {
                    stamp: VersionStamp::new(entry.begin_ts, entry.end_ts, TxId::NONE),
                    raise_max: None,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verge_common::types::{Value, VersionKey};

    fn held_predecessor(holder: TxId) -> VersionEntry {
        let mut entry = VersionEntry::committed(
            VersionKey::FIRST,
            CommitTs::ZERO,
            Some(Value::from("old")),
        );
        entry.tx_id = holder;
        entry
    }

    fn row(tx_id: TxId, status: TxStatus, commit_ts: CommitTs) -> TxTableEntry {
        let mut row = TxTableEntry::new(tx_id);
        row.status = status;
        row.commit_ts = commit_ts;
        row
    }

    #[test]
    fn test_unclaimed_is_kept() {
        let entry = VersionEntry::initial();
        assert_eq!(reconcile(&entry, None), Reconciled::Keep);
    }

    #[test]
    fn test_ongoing_holder_is_kept() {
        let holder = TxId::new(3);
        let entry = held_predecessor(holder);
        let status = row(holder, TxStatus::Ongoing, CommitTs::NONE);
        assert_eq!(reconcile(&entry, Some(&status)), Reconciled::Keep);
    }

    #[test]
    fn test_missing_row_is_kept() {
        let entry = held_predecessor(TxId::new(3));
        assert_eq!(reconcile(&entry, None), Reconciled::Keep);
    }

    #[test]
    fn test_committed_holder_finalizes_tentative() {
        let holder = TxId::new(3);
        let entry = VersionEntry::tentative(VersionKey::new(2), holder, Some(Value::from("new")));
        let status = row(holder, TxStatus::Committed, CommitTs::new(5));

        assert_eq!(
            reconcile(&entry, Some(&status)),
            Reconciled::Finalize {
                stamp: VersionStamp::current(CommitTs::new(5)),
                raise_max: Some(CommitTs::new(5)),
            }
        );
    }

    #[test]
    fn test_committed_holder_closes_predecessor() {
        let holder = TxId::new(3);
        let entry = held_predecessor(holder);
        let status = row(holder, TxStatus::Committed, CommitTs::new(5));

        assert_eq!(
            reconcile(&entry, Some(&status)),
            Reconciled::Finalize {
                stamp: VersionStamp::committed(CommitTs::ZERO, CommitTs::new(5)),
                raise_max: None,
            }
        );
    }

    #[test]
    fn test_aborted_holder_removes_tentative() {
        let holder = TxId::new(3);
        let entry = VersionEntry::tentative(VersionKey::new(2), holder, None);
        let status = row(holder, TxStatus::Aborted, CommitTs::NONE);
        assert_eq!(reconcile(&entry, Some(&status)), Reconciled::Remove);
    }

    #[test]
    fn test_aborted_holder_releases_predecessor() {
        let holder = TxId::new(3);
        let entry = held_predecessor(holder);
        let status = row(holder, TxStatus::Aborted, CommitTs::NONE);

        assert_eq!(
            reconcile(&entry, Some(&status)),
            Reconciled::Finalize {
                stamp: VersionStamp::current(CommitTs::ZERO),
                raise_max: None,
            }
        );
    }

    #[test]
    fn test_committed_holder_without_readable_ts_is_kept() {
        let holder = TxId::new(3);
        let entry = held_predecessor(holder);
        let status = row(holder, TxStatus::Committed, CommitTs::NONE);
        assert_eq!(reconcile(&entry, Some(&status)), Reconciled::Keep);
    }
}
