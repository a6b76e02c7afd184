//! Embedded persistent version store over sled.
//!
//! One sled key per `(table, record key)` holds the whole serialized
//! version chain; a second tree holds the transaction-status rows keyed
//! by transaction id. Every trait primitive is a read-modify-CAS loop on
//! one sled key via `Tree::compare_and_swap`, which gives exactly the
//! per-key linearizability the protocol requires; predicate failures
//! (stamp mismatch, occupied slot) return without writing.

use sled::IVec;

use verge_common::config::SledStoreConfig;
use verge_common::error::{VergeError, VergeResult};
use verge_common::types::{CommitTs, Key, TableId, TxId, VersionKey};
use verge_mvcc::entry::{VersionEntry, VersionStamp};
use verge_mvcc::store::VersionStore;
use verge_mvcc::txtable::{TxStatus, TxTableEntry};

/// sled-backed `VersionStore` implementation.
pub struct SledStore {
    /// Keeps the database alive; trees borrow from it.
    _db: sled::Db,
    /// Version chains, keyed by `table || record key`.
    versions: sled::Tree,
    /// Transaction-status rows, keyed by transaction id.
    tx_rows: sled::Tree,
}

impl SledStore {
    /// Opens (or creates) a sled store at the configured path.
    pub fn open(config: &SledStoreConfig) -> VergeResult<Self> {
        config
            .validate()
            .map_err(|message| VergeError::InvalidConfig { message })?;

        let db = sled::Config::new()
            .path(&config.path)
            .cache_capacity(config.cache_capacity_bytes)
            .flush_every_ms(config.flush_every_ms)
            .open()
            .map_err(store_err)?;

        let versions = db.open_tree("versions").map_err(store_err)?;
        let tx_rows = db.open_tree("tx_rows").map_err(store_err)?;

        Ok(Self {
            _db: db,
            versions,
            tx_rows,
        })
    }

    fn chain_key(table: TableId, key: &Key) -> Vec<u8> {
        let mut composite = Vec::with_capacity(8 + key.len());
        composite.extend_from_slice(&table.to_be_bytes());
        composite.extend_from_slice(key.as_bytes());
        composite
    }

    fn tx_key(tx_id: TxId) -> [u8; 8] {
        tx_id.as_i64().to_be_bytes()
    }

    /// Runs one read-modify-CAS round on a chain.
    ///
    /// `apply` inspects the current chain and returns the outcome plus a
    /// flag saying whether the modified chain should be installed. Lost
    /// races retry with fresh state.
    fn update_chain<R>(
        &self,
        table: TableId,
        key: &Key,
        mut apply: impl FnMut(&mut Vec<VersionEntry>) -> (bool, R),
    ) -> VergeResult<R> {
        let composite = Self::chain_key(table, key);
        loop {
            let old = self.versions.get(&composite).map_err(store_err)?;
            let mut chain = decode_chain(old.as_ref())?;
            let (write, outcome) = apply(&mut chain);
            if !write {
                return Ok(outcome);
            }

            let encoded = encode(&chain)?;
            match self
                .versions
                .compare_and_swap(&composite, old.as_ref(), Some(encoded))
                .map_err(store_err)?
            {
                Ok(()) => return Ok(outcome),
                Err(_) => continue,
            }
        }
    }

    /// Runs one read-modify-CAS round on a transaction-status row.
    fn update_tx_row<R>(
        &self,
        tx_id: TxId,
        mut apply: impl FnMut(&mut TxTableEntry) -> (bool, R),
    ) -> VergeResult<R> {
        let row_key = Self::tx_key(tx_id);
        loop {
            let old = self.tx_rows.get(row_key).map_err(store_err)?;
            let Some(old) = old else {
                return Err(VergeError::TransactionNotFound { tx_id });
            };
            let mut row: TxTableEntry = decode(&old)?;
            let (write, outcome) = apply(&mut row);
            if !write {
                return Ok(outcome);
            }

            let encoded = encode(&row)?;
            match self
                .tx_rows
                .compare_and_swap(row_key, Some(&old), Some(encoded))
                .map_err(store_err)?
            {
                Ok(()) => return Ok(outcome),
                Err(_) => continue,
            }
        }
    }
}

impl VersionStore for SledStore {
    fn name(&self) -> &'static str {
        "sled"
    }

    fn get(&self, table: TableId, key: &Key) -> VergeResult<Vec<VersionEntry>> {
        let old = self
            .versions
            .get(Self::chain_key(table, key))
            .map_err(store_err)?;
        decode_chain(old.as_ref())
    }

    fn insert_if_absent(
        &self,
        table: TableId,
        key: &Key,
        entry: VersionEntry,
    ) -> VergeResult<bool> {
        self.update_chain(table, key, |chain| {
            if chain.iter().any(|v| v.version_key == entry.version_key) {
                return (false, false);
            }
            chain.push(entry.clone());
            (true, true)
        })
    }

    fn cas_replace(
        &self,
        table: TableId,
        key: &Key,
        version_key: VersionKey,
        expected: VersionStamp,
        new: VersionStamp,
    ) -> VergeResult<Option<VersionEntry>> {
        self.update_chain(table, key, |chain| {
            let Some(entry) = chain.iter_mut().find(|v| v.version_key == version_key) else {
                return (false, None);
            };
            if entry.stamp() != expected {
                return (false, None);
            }
            *entry = entry.with_stamp(new);
            (true, Some(entry.clone()))
        })
    }

    fn cas_remove(
        &self,
        table: TableId,
        key: &Key,
        version_key: VersionKey,
        expected: VersionStamp,
    ) -> VergeResult<bool> {
        self.update_chain(table, key, |chain| {
            let Some(pos) = chain
                .iter()
                .position(|v| v.version_key == version_key && v.stamp() == expected)
            else {
                return (false, false);
            };
            chain.remove(pos);
            (true, true)
        })
    }

    fn cas_max_commit_ts(
        &self,
        table: TableId,
        key: &Key,
        version_key: VersionKey,
        proposed: CommitTs,
    ) -> VergeResult<Option<VersionEntry>> {
        self.update_chain(table, key, |chain| {
            let Some(entry) = chain.iter_mut().find(|v| v.version_key == version_key) else {
                return (false, None);
            };
            if proposed <= entry.max_commit_ts {
                // Already at or above the proposal; no write needed.
                return (false, Some(entry.clone()));
            }
            entry.max_commit_ts = proposed;
            (true, Some(entry.clone()))
        })
    }

    fn insert_tx_entry(&self, entry: TxTableEntry) -> VergeResult<bool> {
        let encoded = encode(&entry)?;
        match self
            .tx_rows
            .compare_and_swap(Self::tx_key(entry.tx_id), None::<&IVec>, Some(encoded))
            .map_err(store_err)?
        {
            Ok(()) => Ok(true),
            Err(_) => Ok(false),
        }
    }

    fn get_tx_entry(&self, tx_id: TxId) -> VergeResult<Option<TxTableEntry>> {
        let row = self.tx_rows.get(Self::tx_key(tx_id)).map_err(store_err)?;
        row.map(|bytes| decode(&bytes)).transpose()
    }

    fn cas_tx_status(&self, tx_id: TxId, expected: TxStatus, new: TxStatus) -> VergeResult<bool> {
        self.update_tx_row(tx_id, |row| {
            if row.status != expected {
                return (false, false);
            }
            row.status = new;
            (true, true)
        })
    }

    fn set_and_get_commit_ts(&self, tx_id: TxId, proposed: CommitTs) -> VergeResult<CommitTs> {
        self.update_tx_row(tx_id, |row| {
            if row.commit_ts.is_some() {
                return (false, row.commit_ts);
            }
            row.commit_ts = proposed.max(row.commit_lower_bound);
            (true, row.commit_ts)
        })
    }

    fn push_commit_lower_bound(&self, tx_id: TxId, bound: CommitTs) -> VergeResult<CommitTs> {
        self.update_tx_row(tx_id, |row| {
            if row.commit_ts.is_some() {
                return (false, row.commit_ts);
            }
            if bound <= row.commit_lower_bound {
                return (false, CommitTs::NONE);
            }
            row.commit_lower_bound = bound;
            (true, CommitTs::NONE)
        })
    }
}

impl std::fmt::Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore")
            .field("chains", &self.versions.len())
            .field("tx_rows", &self.tx_rows.len())
            .finish()
    }
}

fn store_err(err: sled::Error) -> VergeError {
    VergeError::store("sled", err.to_string())
}

fn encode<T: serde::Serialize>(value: &T) -> VergeResult<Vec<u8>> {
    bincode::serialize(value).map_err(|err| VergeError::corruption(err.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> VergeResult<T> {
    bincode::deserialize(bytes).map_err(|err| VergeError::corruption(err.to_string()))
}

fn decode_chain(bytes: Option<&IVec>) -> VergeResult<Vec<VersionEntry>> {
    match bytes {
        Some(bytes) => decode(bytes),
        None => Ok(Vec::new()),
    }
}
