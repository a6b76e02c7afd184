//! Record key and payload types for VergeDB.
//!
//! These types provide variable-length byte wrappers for logical record
//! keys and document payloads. Keys are opaque to the engine; the query
//! layer decides their encoding.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::Deref;

use crate::constants::{MAX_KEY_SIZE, MAX_VALUE_SIZE};

/// A logical record key.
///
/// Keys are variable-length byte sequences supplied by the application.
/// They support efficient comparison and hashing for use in chain maps and
/// backend composite keys.
///
/// # Size Limits
///
/// Keys are limited to [`MAX_KEY_SIZE`] bytes (16 KB).
///
/// # Example
///
/// ```rust
/// use verge_common::types::Key;
///
/// let key = Key::from_bytes(b"person:42");
/// assert_eq!(key.len(), 9);
/// ```
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key(Bytes);

impl Key {
    /// Creates an empty key.
    #[inline]
    #[must_use]
    pub const fn empty() -> Self {
        Self(Bytes::new())
    }

    /// Creates a key from a byte slice.
    #[inline]
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(bytes))
    }

    /// Creates a key from owned bytes.
    #[inline]
    #[must_use]
    pub fn from_vec(vec: Vec<u8>) -> Self {
        Self(Bytes::from(vec))
    }

    /// Creates a key from a `Bytes` instance.
    #[inline]
    #[must_use]
    pub const fn from_raw(bytes: Bytes) -> Self {
        Self(bytes)
    }

    /// Returns the length of the key in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the key is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the key as a byte slice.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns true if the key fits within [`MAX_KEY_SIZE`].
    #[inline]
    #[must_use]
    pub fn is_within_limit(&self) -> bool {
        self.0.len() <= MAX_KEY_SIZE
    }
}

impl Deref for Key {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) => write!(f, "Key({s:?})"),
            Err(_) => write!(f, "Key({} bytes)", self.0.len()),
        }
    }
}

impl From<&[u8]> for Key {
    #[inline]
    fn from(bytes: &[u8]) -> Self {
        Self::from_bytes(bytes)
    }
}

impl From<Vec<u8>> for Key {
    #[inline]
    fn from(vec: Vec<u8>) -> Self {
        Self::from_vec(vec)
    }
}

impl From<&str> for Key {
    #[inline]
    fn from(s: &str) -> Self {
        Self::from_bytes(s.as_bytes())
    }
}

/// A document payload.
///
/// Payloads are opaque byte sequences; deletion is represented outside this
/// type (a version entry with no payload is a tombstone).
///
/// # Size Limits
///
/// Payloads are limited to [`MAX_VALUE_SIZE`] bytes (1 MB).
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Value(Bytes);

impl Value {
    /// Creates an empty payload.
    #[inline]
    #[must_use]
    pub const fn empty() -> Self {
        Self(Bytes::new())
    }

    /// Creates a payload from a byte slice.
    #[inline]
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(bytes))
    }

    /// Creates a payload from owned bytes.
    #[inline]
    #[must_use]
    pub fn from_vec(vec: Vec<u8>) -> Self {
        Self(Bytes::from(vec))
    }

    /// Creates a payload from a `Bytes` instance.
    #[inline]
    #[must_use]
    pub const fn from_raw(bytes: Bytes) -> Self {
        Self(bytes)
    }

    /// Returns the length of the payload in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the payload is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the payload as a byte slice.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns true if the payload fits within [`MAX_VALUE_SIZE`].
    #[inline]
    #[must_use]
    pub fn is_within_limit(&self) -> bool {
        self.0.len() <= MAX_VALUE_SIZE
    }
}

impl Deref for Value {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) => write!(f, "Value({s:?})"),
            Err(_) => write!(f, "Value({} bytes)", self.0.len()),
        }
    }
}

impl From<&[u8]> for Value {
    #[inline]
    fn from(bytes: &[u8]) -> Self {
        Self::from_bytes(bytes)
    }
}

impl From<Vec<u8>> for Value {
    #[inline]
    fn from(vec: Vec<u8>) -> Self {
        Self::from_vec(vec)
    }
}

impl From<&str> for Value {
    #[inline]
    fn from(s: &str) -> Self {
        Self::from_bytes(s.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_basics() {
        let key = Key::from_bytes(b"person:42");
        assert_eq!(key.len(), 9);
        assert!(!key.is_empty());
        assert_eq!(key.as_bytes(), b"person:42");
        assert!(key.is_within_limit());
        assert!(Key::empty().is_empty());
    }

    #[test]
    fn test_key_ordering() {
        assert!(Key::from("a") < Key::from("b"));
        assert!(Key::from("a") < Key::from("aa"));
    }

    #[test]
    fn test_key_debug() {
        assert_eq!(format!("{:?}", Key::from("abc")), "Key(\"abc\")");
        let binary = Key::from_vec(vec![0xFF, 0xFE]);
        assert_eq!(format!("{binary:?}"), "Key(2 bytes)");
    }

    #[test]
    fn test_value_basics() {
        let value = Value::from_bytes(b"payload");
        assert_eq!(value.len(), 7);
        assert_eq!(&*value, b"payload");
        assert!(value.is_within_limit());
    }
}
