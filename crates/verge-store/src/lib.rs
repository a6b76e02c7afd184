//! # verge-store
//!
//! Version-store backend adapters for VergeDB.
//!
//! Each adapter translates the four per-key primitives of the
//! [`VersionStore`](verge_mvcc::VersionStore) trait (get,
//! insert-if-absent, compare-and-replace, atomic max-update) plus the
//! transaction-table equivalents onto a concrete store's native
//! operations:
//!
//! - [`MemoryStore`] — in-process chains behind per-record mutexes;
//!   the reference backend and the default for tests.
//! - [`SledStore`] — embedded persistent backend over sled's native
//!   per-key `compare_and_swap` (feature `sled-backend`, on by default).
//!
//! Both provide linearizability per single key, which is the strongest
//! guarantee the protocol assumes anywhere.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// In-memory backend
pub mod memory;

/// sled backend
#[cfg(feature = "sled-backend")]
pub mod sled_store;

use std::sync::Arc;

use verge_common::config::{EngineConfig, StoreBackend};
use verge_common::error::VergeResult;
use verge_mvcc::VersionStore;

pub use memory::MemoryStore;

#[cfg(feature = "sled-backend")]
pub use sled_store::SledStore;

/// Opens the version store selected by `config.backend`.
pub fn open(config: &EngineConfig) -> VergeResult<Arc<dyn VersionStore>> {
    match &config.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        #[cfg(feature = "sled-backend")]
        StoreBackend::Sled(sled_config) => Ok(Arc::new(SledStore::open(sled_config)?)),
        #[cfg(not(feature = "sled-backend"))]
        StoreBackend::Sled(_) => Err(verge_common::error::VergeError::NotSupported {
            operation: "sled backend (enable the `sled-backend` feature)".to_string(),
        }),
    }
}
