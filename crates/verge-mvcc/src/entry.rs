//! Version entries: one physical version of one logical record.
//!
//! Each record's versions form a chain ordered by `version_key`. A version
//! is tagged with:
//! - Begin timestamp (when it became the visible committed value)
//! - End timestamp (when it was superseded; `INFINITY` = still current)
//! - The in-flight transaction currently holding it, if any
//!
//! # Version Chain Structure
//!
//! ```text
//! Record Key: "person:1"
//! ┌─────────────────────────────────────────────────────┐
//! │ Version 3 (current)                                  │
//! │ begin: 150, end: INF, tx: -, max_commit_ts: 150      │
//! │ payload: "Alice (updated)"                           │
//! │                     ↓                                │
//! │ Version 2                                            │
//! │ begin: 100, end: 150, tx: -                          │
//! │ payload: "Alice"                                     │
//! │                     ↓                                │
//! │ Version 1 (placeholder)                              │
//! │ begin: 0, end: 100, tx: -                            │
//! │ payload: tombstone                                   │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! A held version (`tx_id != NONE`) is in one of exactly two shapes:
//! a *tentative new version* (`begin == end == NONE`, not yet visible to
//! anyone but its creator) or an *old version being superseded* (its
//! `end` still provisionally `INFINITY` while the superseder is in
//! flight). Everything else is a committed interval.

use serde::{Deserialize, Serialize};
use std::fmt;

use verge_common::types::{CommitTs, TxId, Value, VersionKey};

/// The `(begin, end, tx_id)` triple of a version entry.
///
/// This is the unit of synchronization for the whole protocol: every
/// state change of a version is an atomic compare-and-replace of its
/// stamp, and a stamp mismatch means somebody else got there first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionStamp {
    /// Begin of the visibility interval.
    pub begin_ts: CommitTs,
    /// End of the visibility interval.
    pub end_ts: CommitTs,
    /// In-flight holder, or `TxId::NONE`.
    pub tx_id: TxId,
}

impl VersionStamp {
    /// Creates a stamp from its parts.
    #[must_use]
    pub const fn new(begin_ts: CommitTs, end_ts: CommitTs, tx_id: TxId) -> Self {
        Self {
            begin_ts,
            end_ts,
            tx_id,
        }
    }

    /// The stamp of a freshly uploaded tentative version.
    #[must_use]
    pub const fn tentative(tx_id: TxId) -> Self {
        Self::new(CommitTs::NONE, CommitTs::NONE, tx_id)
    }

    /// The stamp of an unclaimed current version beginning at `begin_ts`.
    #[must_use]
    pub const fn current(begin_ts: CommitTs) -> Self {
        Self::new(begin_ts, CommitTs::INFINITY, TxId::NONE)
    }

    /// The stamp of an unclaimed committed version with both ends fixed.
    #[must_use]
    pub const fn committed(begin_ts: CommitTs, end_ts: CommitTs) -> Self {
        Self::new(begin_ts, end_ts, TxId::NONE)
    }

    /// Returns this stamp with the holder replaced.
    #[must_use]
    pub const fn held_by(self, tx_id: TxId) -> Self {
        Self::new(self.begin_ts, self.end_ts, tx_id)
    }
}

impl fmt::Display for VersionStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{})@{}", self.begin_ts, self.end_ts, self.tx_id)
    }
}

/// A single physical version of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionEntry {
    /// Slot of this version within the record's chain.
    pub version_key: VersionKey,
    /// Begin of the visibility interval (`NONE` while tentative).
    pub begin_ts: CommitTs,
    /// End of the visibility interval (`NONE` while tentative,
    /// `INFINITY` for the current committed version).
    pub end_ts: CommitTs,
    /// In-flight transaction holding this slot, or `TxId::NONE`.
    pub tx_id: TxId,
    /// Highest commit timestamp proposed while this version was visible.
    /// Monotonically non-decreasing; orders future writers after past
    /// readers.
    pub max_commit_ts: CommitTs,
    /// The document payload; `None` is the tombstone.
    pub payload: Option<Value>,
}

impl VersionEntry {
    /// The initial committed placeholder for an empty chain:
    /// `(begin=0, end=INFINITY, tx_id=NONE)` with a tombstone payload.
    #[must_use]
    pub fn initial() -> Self {
        Self {
            version_key: VersionKey::FIRST,
            begin_ts: CommitTs::ZERO,
            end_ts: CommitTs::INFINITY,
            tx_id: TxId::NONE,
            max_commit_ts: CommitTs::ZERO,
            payload: None,
        }
    }

    /// Creates a committed current version (fixtures and recovery paths).
    #[must_use]
    pub fn committed(version_key: VersionKey, begin_ts: CommitTs, payload: Option<Value>) -> Self {
        Self {
            version_key,
            begin_ts,
            end_ts: CommitTs::INFINITY,
            tx_id: TxId::NONE,
            max_commit_ts: begin_ts,
            payload,
        }
    }

    /// Creates a tentative version owned by `tx_id`, not yet visible.
    #[must_use]
    pub fn tentative(version_key: VersionKey, tx_id: TxId, payload: Option<Value>) -> Self {
        Self {
            version_key,
            begin_ts: CommitTs::NONE,
            end_ts: CommitTs::NONE,
            tx_id,
            max_commit_ts: CommitTs::ZERO,
            payload,
        }
    }

    /// Returns the `(begin, end, tx_id)` stamp of this entry.
    #[inline]
    #[must_use]
    pub const fn stamp(&self) -> VersionStamp {
        VersionStamp::new(self.begin_ts, self.end_ts, self.tx_id)
    }

    /// Returns a copy of this entry with the stamp replaced.
    #[must_use]
    pub fn with_stamp(&self, stamp: VersionStamp) -> Self {
        Self {
            version_key: self.version_key,
            begin_ts: stamp.begin_ts,
            end_ts: stamp.end_ts,
            tx_id: stamp.tx_id,
            max_commit_ts: self.max_commit_ts,
            payload: self.payload.clone(),
        }
    }

    /// Checks if this entry is held by an in-flight transaction.
    #[inline]
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.tx_id.is_valid()
    }

    /// Checks if this entry is a committed (unclaimed, finalized) version.
    #[inline]
    #[must_use]
    pub fn is_committed(&self) -> bool {
        !self.is_held() && self.begin_ts.is_some()
    }

    /// Checks if this entry is a tentative new version.
    #[inline]
    #[must_use]
    pub fn is_tentative(&self) -> bool {
        self.begin_ts.is_none() && self.end_ts.is_none()
    }

    /// Checks if this entry is the current committed version.
    #[inline]
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.is_committed() && self.end_ts == CommitTs::INFINITY
    }

    /// Checks if this entry carries the current committed value: the
    /// newest finalized version, whether or not an in-flight superseder
    /// has claimed it. A claim marks intent; the data stays readable
    /// until the superseder commits.
    #[inline]
    #[must_use]
    pub fn is_visible_head(&self) -> bool {
        self.begin_ts.is_some() && self.end_ts == CommitTs::INFINITY
    }

    /// Checks if this version is the visible committed value at `ts`.
    #[inline]
    #[must_use]
    pub fn visible_at(&self, ts: CommitTs) -> bool {
        self.is_committed() && self.begin_ts <= ts && ts < self.end_ts
    }

    /// Checks if this version is a deletion marker.
    #[inline]
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.payload.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_placeholder() {
        let entry = VersionEntry::initial();
        assert_eq!(entry.version_key, VersionKey::FIRST);
        assert!(entry.is_committed());
        assert!(entry.is_current());
        assert!(entry.is_tombstone());
        assert!(!entry.is_held());
    }

    #[test]
    fn test_tentative_shape() {
        let entry = VersionEntry::tentative(VersionKey::new(2), TxId::new(7), None);
        assert!(entry.is_held());
        assert!(entry.is_tentative());
        assert!(!entry.is_committed());
        assert!(!entry.visible_at(CommitTs::ZERO));
    }

    #[test]
    fn test_visibility_interval() {
        let mut entry = VersionEntry::committed(
            VersionKey::new(2),
            CommitTs::new(100),
            Some(Value::from("v")),
        );
        entry.end_ts = CommitTs::new(200);

        assert!(entry.visible_at(CommitTs::new(100)));
        assert!(entry.visible_at(CommitTs::new(150)));
        assert!(!entry.visible_at(CommitTs::new(99)));
        // End is exclusive.
        assert!(!entry.visible_at(CommitTs::new(200)));
    }

    #[test]
    fn test_claimed_predecessor_stays_visible_head() {
        let mut entry = VersionEntry::committed(
            VersionKey::new(1),
            CommitTs::ZERO,
            Some(Value::from("v")),
        );
        entry.tx_id = TxId::new(9);

        assert!(entry.is_held());
        assert!(!entry.is_tentative());
        // The committed-interval predicates require an unclaimed entry...
        assert!(!entry.visible_at(CommitTs::new(5)));
        assert!(!entry.is_current());
        // ...but the claimed predecessor still carries the current value.
        assert!(entry.is_visible_head());
        assert!(!VersionEntry::tentative(VersionKey::new(2), TxId::new(9), None).is_visible_head());
    }

    #[test]
    fn test_stamp_round_trip() {
        let entry = VersionEntry::committed(
            VersionKey::new(3),
            CommitTs::new(5),
            Some(Value::from("v")),
        );
        let claimed = entry.stamp().held_by(TxId::new(4));
        let updated = entry.with_stamp(claimed);

        assert_eq!(updated.tx_id, TxId::new(4));
        assert_eq!(updated.begin_ts, entry.begin_ts);
        assert_eq!(updated.end_ts, entry.end_ts);
        assert_eq!(updated.payload, entry.payload);
    }

    #[test]
    fn test_stamp_constructors() {
        assert_eq!(
            VersionStamp::tentative(TxId::new(2)),
            VersionStamp::new(CommitTs::NONE, CommitTs::NONE, TxId::new(2))
        );
        assert_eq!(
            VersionStamp::current(CommitTs::new(5)),
            VersionStamp::new(CommitTs::new(5), CommitTs::INFINITY, TxId::NONE)
        );
    }

    #[test]
    fn test_stamp_display() {
        let stamp = VersionStamp::current(CommitTs::new(5)).held_by(TxId::new(3));
        assert_eq!(stamp.to_string(), "[5,inf)@3");
    }
}
