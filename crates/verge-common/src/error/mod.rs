//! Error handling for VergeDB.
//!
//! This module provides a unified error type and result alias used
//! across all VergeDB components.
//!
//! Transaction conflicts are deliberately *not* errors: the commit
//! protocol reports them as boolean outcomes, and a CAS mismatch never
//! leaves the backend in an ambiguous state. `VergeError` covers backend
//! failures, protocol misuse, and configuration problems.

mod engine;

pub use engine::{ErrorCode, VergeError};

/// Result type alias for VergeDB operations.
pub type VergeResult<T> = std::result::Result<T, VergeError>;
