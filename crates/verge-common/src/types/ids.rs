//! Core identifier types for VergeDB.
//!
//! These types provide type-safe wrappers around numeric identifiers,
//! preventing accidental misuse of different ID types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Transaction identifier.
///
/// Every transaction is assigned a unique id when it begins. Version
/// entries carry the id of the in-flight transaction currently holding
/// them; [`TxId::NONE`] marks an unclaimed entry.
///
/// # Example
///
/// ```rust
/// use verge_common::types::TxId;
///
/// let tx = TxId::new(7);
/// assert!(tx.is_valid());
/// assert!(!TxId::NONE.is_valid());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct TxId(i64);

impl TxId {
    /// Sentinel meaning "not claimed by any transaction".
    pub const NONE: Self = Self(-1);

    /// Minimum valid transaction id.
    pub const MIN: Self = Self(1);

    /// Creates a new `TxId` from a raw i64 value.
    #[inline]
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw i64 value.
    #[inline]
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self.0
    }

    /// Returns the next transaction id.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Checks if this id refers to an actual transaction.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != Self::NONE.0
    }
}

impl fmt::Debug for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::NONE {
            write!(f, "TxId(NONE)")
        } else {
            write!(f, "TxId({})", self.0)
        }
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for TxId {
    #[inline]
    fn from(id: i64) -> Self {
        Self::new(id)
    }
}

impl From<TxId> for i64 {
    #[inline]
    fn from(id: TxId) -> Self {
        id.0
    }
}

/// Physical version identifier within one record's version chain.
///
/// Version keys increase monotonically per record; together with the record
/// key they uniquely identify a physical version slot. Chains start at
/// [`VersionKey::FIRST`].
///
/// # Example
///
/// ```rust
/// use verge_common::types::VersionKey;
///
/// let head = VersionKey::FIRST;
/// assert_eq!(head.next().as_u64(), 2);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct VersionKey(u64);

impl VersionKey {
    /// First version key in a chain.
    pub const FIRST: Self = Self(crate::constants::FIRST_VERSION_KEY);

    /// Creates a new `VersionKey` from a raw u64 value.
    #[inline]
    #[must_use]
    pub const fn new(key: u64) -> Self {
        Self(key)
    }

    /// Returns the raw u64 value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the next version key in the chain.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Debug for VersionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VersionKey({})", self.0)
    }
}

impl fmt::Display for VersionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for VersionKey {
    #[inline]
    fn from(key: u64) -> Self {
        Self::new(key)
    }
}

impl From<VersionKey> for u64 {
    #[inline]
    fn from(key: VersionKey) -> Self {
        key.0
    }
}

/// Table identifier.
///
/// Each version table (one per logical record collection) is addressed by a
/// stable numeric id. Mapping human-readable names onto ids is the catalog's
/// concern, not the version store's.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct TableId(u64);

impl TableId {
    /// Creates a new `TableId` from a raw u64 value.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw u64 value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Converts to bytes (big-endian), for composite backend keys.
    #[inline]
    #[must_use]
    pub fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Debug for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TableId({})", self.0)
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TableId {
    #[inline]
    fn from(id: u64) -> Self {
        Self::new(id)
    }
}

impl From<TableId> for u64 {
    #[inline]
    fn from(id: TableId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tx_id() {
        let tx = TxId::new(100);
        assert_eq!(tx.as_i64(), 100);
        assert!(tx.is_valid());
        assert!(!TxId::NONE.is_valid());

        let next = tx.next();
        assert_eq!(next.as_i64(), 101);
    }

    #[test]
    fn test_tx_id_debug() {
        assert_eq!(format!("{:?}", TxId::NONE), "TxId(NONE)");
        assert_eq!(format!("{:?}", TxId::new(3)), "TxId(3)");
    }

    #[test]
    fn test_version_key() {
        let key = VersionKey::FIRST;
        assert_eq!(key.as_u64(), 1);
        assert_eq!(key.next(), VersionKey::new(2));
    }

    #[test]
    fn test_table_id() {
        let table = TableId::new(9);
        assert_eq!(table.as_u64(), 9);
        assert_eq!(table.to_be_bytes(), 9u64.to_be_bytes());
    }

    #[test]
    fn test_ordering() {
        assert!(TxId::new(1) < TxId::new(2));
        assert!(VersionKey::new(1) < VersionKey::new(2));
        assert!(TableId::new(1) < TableId::new(2));
        // The unclaimed sentinel sorts below every real transaction.
        assert!(TxId::NONE < TxId::MIN);
    }
}
