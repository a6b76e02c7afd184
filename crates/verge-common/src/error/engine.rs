//! Engine error types.
//!
//! Provides the error taxonomy for the transaction engine: backend
//! failures, protocol misuse, and configuration problems.

use std::fmt;
use thiserror::Error;

use crate::types::{TableId, TxId, VersionKey};

/// Error codes for categorizing errors.
///
/// These codes can be used for programmatic error handling and
/// are stable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    // General errors (0x0000 - 0x00FF)
    /// Internal error (bug).
    Internal = 0x0001,
    /// Operation not supported.
    NotSupported = 0x0002,
    /// Invalid argument provided.
    InvalidArgument = 0x0003,

    // Storage errors (0x0100 - 0x01FF)
    /// General I/O error.
    Io = 0x0100,
    /// Backend store failure.
    Store = 0x0101,
    /// Data corruption detected.
    Corruption = 0x0102,
    /// Key too large.
    KeyTooLarge = 0x0103,
    /// Value too large.
    ValueTooLarge = 0x0104,
    /// Version slot not found.
    VersionNotFound = 0x0105,

    // Transaction errors (0x0200 - 0x02FF)
    /// Protocol misuse by the caller.
    IllegalOperation = 0x0200,
    /// Transaction status row not found.
    TransactionNotFound = 0x0201,
    /// Transaction id already in use.
    TransactionExists = 0x0202,
    /// Write buffer exceeded its limit.
    WriteSetFull = 0x0203,

    // Configuration errors (0x0300 - 0x03FF)
    /// Invalid configuration.
    InvalidConfig = 0x0300,
}

impl ErrorCode {
    /// Returns the numeric code.
    #[inline]
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Returns the error category name.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match (*self as u16) >> 8 {
            0x00 => "General",
            0x01 => "Storage",
            0x02 => "Transaction",
            0x03 => "Config",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// The main error type for VergeDB.
///
/// # Example
///
/// ```rust
/// use verge_common::error::{VergeError, VergeResult};
/// use verge_common::types::TxId;
///
/// fn lookup(tx_id: TxId) -> VergeResult<()> {
///     Err(VergeError::TransactionNotFound { tx_id })
/// }
/// ```
#[derive(Debug, Error)]
pub enum VergeError {
    // ==========================================================================
    // General Errors
    // ==========================================================================
    /// Internal error - this indicates a bug.
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },

    /// Operation not supported.
    #[error("operation not supported: {operation}")]
    NotSupported {
        /// The unsupported operation.
        operation: String,
    },

    /// Invalid argument provided.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Error message.
        message: String,
    },

    // ==========================================================================
    // Storage Errors
    // ==========================================================================
    /// I/O error from the underlying system.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Backend store failure. The in-flight operation is indeterminate;
    /// the caller decides whether to retry or abort the transaction.
    #[error("store backend '{backend}' failed: {message}")]
    Store {
        /// Name of the backend adapter.
        backend: &'static str,
        /// Failure description.
        message: String,
    },

    /// Stored data could not be decoded.
    #[error("data corruption detected: {message}")]
    Corruption {
        /// Description of the corruption.
        message: String,
    },

    /// Key is too large.
    #[error("key size {size} exceeds maximum {max_size}")]
    KeyTooLarge {
        /// Actual key size.
        size: usize,
        /// Maximum allowed size.
        max_size: usize,
    },

    /// Payload is too large.
    #[error("value size {size} exceeds maximum {max_size}")]
    ValueTooLarge {
        /// Actual value size.
        size: usize,
        /// Maximum allowed size.
        max_size: usize,
    },

    /// A version slot that an operation targeted does not exist.
    #[error("version {version_key} not found in table {table}")]
    VersionNotFound {
        /// The table.
        table: TableId,
        /// The missing version slot.
        version_key: VersionKey,
    },

    // ==========================================================================
    // Transaction Errors
    // ==========================================================================
    /// Protocol misuse by the caller: an operation issued against the
    /// wrong transaction phase, an update without a prior read, a write
    /// after a terminal state. Not recoverable.
    #[error("illegal operation: {message}")]
    IllegalOperation {
        /// What was attempted.
        message: String,
    },

    /// Transaction status row not found.
    #[error("transaction {tx_id} not found")]
    TransactionNotFound {
        /// The missing transaction.
        tx_id: TxId,
    },

    /// A status row for this transaction id already exists.
    #[error("transaction {tx_id} already exists")]
    TransactionExists {
        /// The colliding transaction id.
        tx_id: TxId,
    },

    /// The local write buffer exceeded its limit.
    #[error("write set size {size} exceeds limit {limit}")]
    WriteSetFull {
        /// Buffered write count.
        size: usize,
        /// Configured limit.
        limit: usize,
    },

    // ==========================================================================
    // Configuration Errors
    // ==========================================================================
    /// Invalid configuration.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Error message.
        message: String,
    },
}

impl VergeError {
    /// Returns the error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Internal { .. } => ErrorCode::Internal,
            Self::NotSupported { .. } => ErrorCode::NotSupported,
            Self::InvalidArgument { .. } => ErrorCode::InvalidArgument,
            Self::Io { .. } => ErrorCode::Io,
            Self::Store { .. } => ErrorCode::Store,
            Self::Corruption { .. } => ErrorCode::Corruption,
            Self::KeyTooLarge { .. } => ErrorCode::KeyTooLarge,
            Self::ValueTooLarge { .. } => ErrorCode::ValueTooLarge,
            Self::VersionNotFound { .. } => ErrorCode::VersionNotFound,
            Self::IllegalOperation { .. } => ErrorCode::IllegalOperation,
            Self::TransactionNotFound { .. } => ErrorCode::TransactionNotFound,
            Self::TransactionExists { .. } => ErrorCode::TransactionExists,
            Self::WriteSetFull { .. } => ErrorCode::WriteSetFull,
            Self::InvalidConfig { .. } => ErrorCode::InvalidConfig,
        }
    }

    /// Returns true if this error is a transient backend fault that the
    /// caller may retry (by aborting and re-running the transaction).
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::Store { .. })
    }

    /// Returns true if this error indicates caller misuse of the protocol.
    #[must_use]
    pub const fn is_misuse(&self) -> bool {
        matches!(
            self,
            Self::IllegalOperation { .. }
                | Self::InvalidArgument { .. }
                | Self::KeyTooLarge { .. }
                | Self::ValueTooLarge { .. }
                | Self::WriteSetFull { .. }
        )
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates a protocol-misuse error.
    #[must_use]
    pub fn illegal(message: impl Into<String>) -> Self {
        Self::IllegalOperation {
            message: message.into(),
        }
    }

    /// Creates a backend store error.
    #[must_use]
    pub fn store(backend: &'static str, message: impl Into<String>) -> Self {
        Self::Store {
            backend,
            message: message.into(),
        }
    }

    /// Creates a corruption error.
    #[must_use]
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::Corruption {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        let err = VergeError::TransactionNotFound {
            tx_id: TxId::new(42),
        };
        assert_eq!(err.code(), ErrorCode::TransactionNotFound);
        assert_eq!(err.code().category(), "Transaction");
    }

    #[test]
    fn test_error_display() {
        let err = VergeError::TransactionNotFound {
            tx_id: TxId::new(42),
        };
        assert_eq!(err.to_string(), "transaction 42 not found");
    }

    #[test]
    fn test_retryable() {
        assert!(VergeError::store("memory", "poisoned").is_retryable());
        assert!(!VergeError::illegal("update without read").is_retryable());
    }

    #[test]
    fn test_misuse() {
        assert!(VergeError::illegal("validate before upload").is_misuse());
        assert!(!VergeError::corruption("bad chain bytes").is_misuse());
    }

    #[test]
    fn test_io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: VergeError = io_err.into();
        assert_eq!(err.code(), ErrorCode::Io);
    }
}
