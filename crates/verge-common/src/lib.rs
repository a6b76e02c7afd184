//! # verge-common
//!
//! Common types, errors, and utilities for VergeDB.
//!
//! This crate provides the foundational types and abstractions used across
//! all VergeDB components. It includes:
//!
//! - **Types**: Core identifiers (`TxId`, `VersionKey`, `TableId`), keys,
//!   values, and commit timestamps
//! - **Errors**: Unified error handling with `VergeError`
//! - **Config**: Engine configuration structures
//! - **Constants**: System-wide constants and limits
//!
//! ## Example
//!
//! ```rust
//! use verge_common::types::{CommitTs, Key, TableId, TxId, Value};
//! use verge_common::error::VergeResult;
//!
//! fn example() -> VergeResult<()> {
//!     let table = TableId::new(1);
//!     let tx_id = TxId::new(7);
//!     let key = Key::from_bytes(b"person:42");
//!     let value = Value::from_bytes(b"{\"name\":\"alice\"}");
//!     assert!(CommitTs::NONE.is_none());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod constants;
pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used items at the crate root
pub use constants::*;
pub use error::{VergeError, VergeResult};
pub use types::{CommitTs, Key, TableId, TxId, Value, VersionKey};
