//! System-wide constants for VergeDB.
//!
//! This module defines constants used across the engine.

// =============================================================================
// Version Chain Constants
// =============================================================================

/// Version key of the first physical version in a record's chain.
///
/// The initial committed placeholder installed by `read_and_initialize`
/// occupies this slot; the first real write lands at the next key.
pub const FIRST_VERSION_KEY: u64 = 1;

// =============================================================================
// Key and Value Limits
// =============================================================================

/// Maximum record key size in bytes (16 KB).
pub const MAX_KEY_SIZE: usize = 16 * 1024;

/// Maximum payload size in bytes (1 MB).
///
/// Document payloads larger than this are the backend connector's problem,
/// not the version store's.
pub const MAX_VALUE_SIZE: usize = 1024 * 1024;

// =============================================================================
// Transaction Constants
// =============================================================================

/// First transaction id handed out by a freshly opened `VersionDb`.
pub const FIRST_TX_ID: i64 = 1;

/// Upper bound on buffered writes per transaction.
///
/// A transaction whose write set grows past this is almost certainly a bug
/// in the caller; the engine refuses it rather than uploading unbounded
/// tentative state.
pub const MAX_WRITE_SET_SIZE: usize = 64 * 1024;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_chain_constants() {
        // Chains are 1-based; 0 would collide with the unallocated sentinel
        // convention used in tests and fixtures.
        assert!(FIRST_VERSION_KEY > 0);
    }

    #[test]
    fn test_key_value_limits() {
        assert!(MAX_KEY_SIZE < MAX_VALUE_SIZE);
        assert!(MAX_WRITE_SET_SIZE > 0);
    }
}
