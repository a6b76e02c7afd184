//! Type definitions for VergeDB.
//!
//! This module contains all core type definitions used across the engine.

mod ids;
mod keys;
mod timestamps;

pub use ids::{TableId, TxId, VersionKey};
pub use keys::{Key, Value};
pub use timestamps::CommitTs;
