//! Commit timestamp type for VergeDB.
//!
//! Commit timestamps are purely logical: they are positions in the total
//! order of committed transactions, allocated by the commit protocol itself
//! rather than read from a clock. Visibility of a version is the half-open
//! interval `[begin, end)` over these positions.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A logical commit timestamp.
///
/// Two sentinel values exist alongside the ordinary non-negative positions:
///
/// - [`CommitTs::NONE`] (`-1`) — "not allocated yet" for a transaction, and
///   the tentative sentinel for the `begin`/`end` fields of a version that
///   has not been finalized;
/// - [`CommitTs::INFINITY`] (`i64::MAX`) — the open end of the newest
///   committed version ("not yet superseded").
///
/// # Example
///
/// ```rust
/// use verge_common::types::CommitTs;
///
/// let ts = CommitTs::new(5);
/// assert!(ts > CommitTs::ZERO);
/// assert!(ts < CommitTs::INFINITY);
/// assert!(CommitTs::NONE.is_none());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct CommitTs(i64);

impl CommitTs {
    /// Sentinel meaning "no timestamp allocated" / "tentative".
    pub const NONE: Self = Self(-1);

    /// The smallest allocatable commit timestamp.
    ///
    /// Read-only transactions with nothing to order against commit here.
    pub const ZERO: Self = Self(0);

    /// Open upper bound of the newest committed version's interval.
    pub const INFINITY: Self = Self(i64::MAX);

    /// Creates a commit timestamp from a raw i64 value.
    #[inline]
    #[must_use]
    pub const fn new(ts: i64) -> Self {
        Self(ts)
    }

    /// Returns the raw i64 value.
    #[inline]
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self.0
    }

    /// Checks if this is the unallocated/tentative sentinel.
    #[inline]
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == Self::NONE.0
    }

    /// Checks if a timestamp has been allocated.
    #[inline]
    #[must_use]
    pub const fn is_some(self) -> bool {
        !self.is_none()
    }

    /// Returns the immediately following position.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Returns the larger of two timestamps.
    #[inline]
    #[must_use]
    pub fn max(self, other: Self) -> Self {
        if other.0 > self.0 {
            other
        } else {
            self
        }
    }
}

impl fmt::Debug for CommitTs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::NONE => write!(f, "CommitTs(NONE)"),
            Self::INFINITY => write!(f, "CommitTs(INF)"),
            Self(ts) => write!(f, "CommitTs({ts})"),
        }
    }
}

impl fmt::Display for CommitTs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::NONE => write!(f, "-"),
            Self::INFINITY => write!(f, "inf"),
            Self(ts) => write!(f, "{ts}"),
        }
    }
}

impl From<i64> for CommitTs {
    #[inline]
    fn from(ts: i64) -> Self {
        Self::new(ts)
    }
}

impl From<CommitTs> for i64 {
    #[inline]
    fn from(ts: CommitTs) -> Self {
        ts.0
    }
}

impl PartialEq<i64> for CommitTs {
    fn eq(&self, other: &i64) -> bool {
        self.0 == *other
    }
}

impl PartialOrd<i64> for CommitTs {
    fn partial_cmp(&self, other: &i64) -> Option<Ordering> {
        self.0.partial_cmp(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels() {
        assert!(CommitTs::NONE.is_none());
        assert!(!CommitTs::ZERO.is_none());
        assert!(CommitTs::INFINITY.is_some());
        assert!(CommitTs::NONE < CommitTs::ZERO);
        assert!(CommitTs::ZERO < CommitTs::INFINITY);
    }

    #[test]
    fn test_next_and_max() {
        assert_eq!(CommitTs::new(5).next(), CommitTs::new(6));
        assert_eq!(CommitTs::INFINITY.next(), CommitTs::INFINITY);
        assert_eq!(CommitTs::new(3).max(CommitTs::new(7)), CommitTs::new(7));
        assert_eq!(CommitTs::new(7).max(CommitTs::new(3)), CommitTs::new(7));
    }

    #[test]
    fn test_display() {
        assert_eq!(CommitTs::new(5).to_string(), "5");
        assert_eq!(CommitTs::NONE.to_string(), "-");
        assert_eq!(CommitTs::INFINITY.to_string(), "inf");
    }

    #[test]
    fn test_i64_comparison() {
        assert!(CommitTs::new(5) == 5);
        assert!(CommitTs::new(5) < 6);
        assert!(CommitTs::new(5) > 4);
    }
}
