//! In-process version store.
//!
//! Chains live in a `DashMap` keyed by `(table, record key)`, each behind
//! its own `parking_lot::Mutex`; every trait primitive takes exactly one
//! chain (or status-row) lock, which makes it linearizable per key. The
//! transaction-status table is a second map of the same shape.
//!
//! Contents do not survive the process. This is the Redis-like reference
//! backend and the default for tests.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use verge_common::error::{VergeError, VergeResult};
use verge_common::types::{CommitTs, Key, TableId, TxId, VersionKey};
use verge_mvcc::entry::{VersionEntry, VersionStamp};
use verge_mvcc::store::VersionStore;
use verge_mvcc::txtable::{TxStatus, TxTableEntry};

type Chain = Arc<Mutex<Vec<VersionEntry>>>;

/// In-memory `VersionStore` implementation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Version chains keyed by `(table, record key)`.
    chains: DashMap<(TableId, Key), Chain>,
    /// Transaction-status rows.
    tx_rows: DashMap<TxId, Mutex<TxTableEntry>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of record chains currently stored.
    #[must_use]
    pub fn chain_count(&self) -> usize {
        self.chains.len()
    }

    /// Returns the number of transaction-status rows.
    #[must_use]
    pub fn tx_row_count(&self) -> usize {
        self.tx_rows.len()
    }

    fn chain(&self, table: TableId, key: &Key) -> Option<Chain> {
        self.chains.get(&(table, key.clone())).map(|c| c.clone())
    }

    fn chain_or_create(&self, table: TableId, key: &Key) -> Chain {
        self.chains
            .entry((table, key.clone()))
            .or_insert_with(|| Arc::new(Mutex::new(Vec::new())))
            .clone()
    }
}

impl VersionStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn get(&self, table: TableId, key: &Key) -> VergeResult<Vec<VersionEntry>> {
        Ok(self
            .chain(table, key)
            .map(|chain| chain.lock().clone())
            .unwrap_or_default())
    }

    fn insert_if_absent(
        &self,
        table: TableId,
        key: &Key,
        entry: VersionEntry,
    ) -> VergeResult<bool> {
        let chain = self.chain_or_create(table, key);
        let mut versions = chain.lock();
        if versions.iter().any(|v| v.version_key == entry.version_key) {
            return Ok(false);
        }
        versions.push(entry);
        Ok(true)
    }

    fn cas_replace(
        &self,
        table: TableId,
        key: &Key,
        version_key: VersionKey,
        expected: VersionStamp,
        new: VersionStamp,
    ) -> VergeResult<Option<VersionEntry>> {
        let Some(chain) = self.chain(table, key) else {
            return Ok(None);
        };
        let mut versions = chain.lock();
        let Some(entry) = versions.iter_mut().find(|v| v.version_key == version_key) else {
            return Ok(None);
        };
        if entry.stamp() != expected {
            return Ok(None);
        }
        *entry = entry.with_stamp(new);
        Ok(Some(entry.clone()))
    }

    fn cas_remove(
        &self,
        table: TableId,
        key: &Key,
        version_key: VersionKey,
        expected: VersionStamp,
    ) -> VergeResult<bool> {
        let Some(chain) = self.chain(table, key) else {
            return Ok(false);
        };
        let mut versions = chain.lock();
        let Some(pos) = versions
            .iter()
            .position(|v| v.version_key == version_key && v.stamp() == expected)
        else {
            return Ok(false);
        };
        versions.remove(pos);
        Ok(true)
    }

    fn cas_max_commit_ts(
        &self,
        table: TableId,
        key: &Key,
        version_key: VersionKey,
        proposed: CommitTs,
    ) -> VergeResult<Option<VersionEntry>> {
        let Some(chain) = self.chain(table, key) else {
            return Ok(None);
        };
        let mut versions = chain.lock();
        let Some(entry) = versions.iter_mut().find(|v| v.version_key == version_key) else {
            return Ok(None);
        };
        entry.max_commit_ts = entry.max_commit_ts.max(proposed);
        Ok(Some(entry.clone()))
    }

    fn insert_tx_entry(&self, entry: TxTableEntry) -> VergeResult<bool> {
        match self.tx_rows.entry(entry.tx_id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Ok(false),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Mutex::new(entry));
                Ok(true)
            }
        }
    }

    fn get_tx_entry(&self, tx_id: TxId) -> VergeResult<Option<TxTableEntry>> {
        Ok(self.tx_rows.get(&tx_id).map(|row| row.lock().clone()))
    }

    fn cas_tx_status(&self, tx_id: TxId, expected: TxStatus, new: TxStatus) -> VergeResult<bool> {
        let row = self
            .tx_rows
            .get(&tx_id)
            .ok_or(VergeError::TransactionNotFound { tx_id })?;
        let mut entry = row.lock();
        if entry.status != expected {
            return Ok(false);
        }
        entry.status = new;
        Ok(true)
    }

    fn set_and_get_commit_ts(&self, tx_id: TxId, proposed: CommitTs) -> VergeResult<CommitTs> {
        let row = self
            .tx_rows
            .get(&tx_id)
            .ok_or(VergeError::TransactionNotFound { tx_id })?;
        let mut entry = row.lock();
        if entry.commit_ts.is_some() {
            return Ok(entry.commit_ts);
        }
        entry.commit_ts = proposed.max(entry.commit_lower_bound);
        Ok(entry.commit_ts)
    }

    fn push_commit_lower_bound(&self, tx_id: TxId, bound: CommitTs) -> VergeResult<CommitTs> {
        let row = self
            .tx_rows
            .get(&tx_id)
            .ok_or(VergeError::TransactionNotFound { tx_id })?;
        let mut entry = row.lock();
        if entry.commit_ts.is_some() {
            return Ok(entry.commit_ts);
        }
        entry.commit_lower_bound = entry.commit_lower_bound.max(bound);
        Ok(CommitTs::NONE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: TableId = TableId::new(1);

    fn key() -> Key {
        Key::from("person:1")
    }

    #[test]
    fn test_get_missing_chain() {
        let store = MemoryStore::new();
        assert!(store.get(TABLE, &key()).unwrap().is_empty());
        // Reads never materialize chains.
        assert_eq!(store.chain_count(), 0);
    }

    #[test]
    fn test_insert_if_absent() {
        let store = MemoryStore::new();
        let entry = VersionEntry::initial();

        assert!(store.insert_if_absent(TABLE, &key(), entry.clone()).unwrap());
        assert!(!store.insert_if_absent(TABLE, &key(), entry).unwrap());
        assert_eq!(store.get(TABLE, &key()).unwrap().len(), 1);
    }

    #[test]
    fn test_cas_replace_matches_stamp() {
        let store = MemoryStore::new();
        store
            .insert_if_absent(TABLE, &key(), VersionEntry::initial())
            .unwrap();

        let claimed = store
            .cas_replace(
                TABLE,
                &key(),
                VersionKey::FIRST,
                VersionStamp::current(CommitTs::ZERO),
                VersionStamp::current(CommitTs::ZERO).held_by(TxId::new(7)),
            )
            .unwrap();
        assert_eq!(claimed.unwrap().tx_id, TxId::new(7));

        // Stale expected stamp no longer matches.
        let stale = store
            .cas_replace(
                TABLE,
                &key(),
                VersionKey::FIRST,
                VersionStamp::current(CommitTs::ZERO),
                VersionStamp::current(CommitTs::ZERO).held_by(TxId::new(8)),
            )
            .unwrap();
        assert!(stale.is_none());
    }

    #[test]
    fn test_cas_replace_exactly_one_winner() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_if_absent(TABLE, &key(), VersionEntry::initial())
            .unwrap();

        let mut handles = Vec::new();
        for claimant in 1..=8 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                store
                    .cas_replace(
                        TABLE,
                        &key(),
                        VersionKey::FIRST,
                        VersionStamp::current(CommitTs::ZERO),
                        VersionStamp::current(CommitTs::ZERO).held_by(TxId::new(claimant)),
                    )
                    .unwrap()
                    .is_some()
            }));
        }

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_cas_remove() {
        let store = MemoryStore::new();
        let tentative = VersionEntry::tentative(VersionKey::new(2), TxId::new(4), None);
        store.insert_if_absent(TABLE, &key(), tentative).unwrap();

        // Wrong expected stamp leaves the entry alone.
        assert!(!store
            .cas_remove(
                TABLE,
                &key(),
                VersionKey::new(2),
                VersionStamp::tentative(TxId::new(5)),
            )
            .unwrap());

        assert!(store
            .cas_remove(
                TABLE,
                &key(),
                VersionKey::new(2),
                VersionStamp::tentative(TxId::new(4)),
            )
            .unwrap());
        assert!(store.get(TABLE, &key()).unwrap().is_empty());
    }

    #[test]
    fn test_cas_max_commit_ts_is_monotonic() {
        let store = MemoryStore::new();
        store
            .insert_if_absent(TABLE, &key(), VersionEntry::initial())
            .unwrap();

        let raised = store
            .cas_max_commit_ts(TABLE, &key(), VersionKey::FIRST, CommitTs::new(5))
            .unwrap()
            .unwrap();
        assert_eq!(raised.max_commit_ts, CommitTs::new(5));

        // A lower proposal does not regress the value.
        let kept = store
            .cas_max_commit_ts(TABLE, &key(), VersionKey::FIRST, CommitTs::new(3))
            .unwrap()
            .unwrap();
        assert_eq!(kept.max_commit_ts, CommitTs::new(5));
    }

    #[test]
    fn test_tx_row_lifecycle() {
        let store = MemoryStore::new();
        let tx_id = TxId::new(9);

        assert!(store.insert_tx_entry(TxTableEntry::new(tx_id)).unwrap());
        assert!(!store.insert_tx_entry(TxTableEntry::new(tx_id)).unwrap());

        assert!(store
            .cas_tx_status(tx_id, TxStatus::Ongoing, TxStatus::Committed)
            .unwrap());
        // Terminal states do not move.
        assert!(!store
            .cas_tx_status(tx_id, TxStatus::Ongoing, TxStatus::Aborted)
            .unwrap());

        let row = store.get_tx_entry(tx_id).unwrap().unwrap();
        assert_eq!(row.status, TxStatus::Committed);
    }

    #[test]
    fn test_tx_status_missing_row() {
        let store = MemoryStore::new();
        let err = store
            .cas_tx_status(TxId::new(404), TxStatus::Ongoing, TxStatus::Aborted)
            .unwrap_err();
        assert!(matches!(err, VergeError::TransactionNotFound { .. }));
    }

    #[test]
    fn test_set_and_get_commit_ts() {
        let store = MemoryStore::new();
        let tx_id = TxId::new(8);
        store.insert_tx_entry(TxTableEntry::new(tx_id)).unwrap();

        // Clamped to the pushed lower bound: proposing 4 yields 5.
        assert_eq!(
            store
                .push_commit_lower_bound(tx_id, CommitTs::new(5))
                .unwrap(),
            CommitTs::NONE
        );
        assert_eq!(
            store.set_and_get_commit_ts(tx_id, CommitTs::new(4)).unwrap(),
            CommitTs::new(5)
        );

        // First writer wins; later proposals observe the allocation.
        assert_eq!(
            store.set_and_get_commit_ts(tx_id, CommitTs::new(9)).unwrap(),
            CommitTs::new(5)
        );
        // Pushing after allocation reports the timestamp.
        assert_eq!(
            store
                .push_commit_lower_bound(tx_id, CommitTs::new(11))
                .unwrap(),
            CommitTs::new(5)
        );
    }
}
