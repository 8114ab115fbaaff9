//! Key-Value Store
//!
//! State lives in a flat string-keyed map. Components never hold records
//! between calls; they read and write through `KvStore` by key.
//!
//! `Transaction` buffers writes over a parent store so a failing command can
//! be discarded without touching the parent. Transactions nest.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::SettlementResult;

// ============================================
// STORE TRAIT
// ============================================

pub trait KvStore {
    fn get(&self, key: &str) -> Option<Vec<u8>>;
    fn set(&mut self, key: &str, value: Vec<u8>);
    fn delete(&mut self, key: &str);
    /// All live entries whose key starts with `prefix`, in key order
    fn scan_prefix(&self, prefix: &str) -> Vec<(String, Vec<u8>)>;
}

/// Read and decode a JSON value
pub fn read<T: DeserializeOwned>(store: &dyn KvStore, key: &str) -> SettlementResult<Option<T>> {
    match store.get(key) {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

/// Encode and write a JSON value
pub fn write<T: Serialize>(store: &mut dyn KvStore, key: &str, value: &T) -> SettlementResult<()> {
    let bytes = serde_json::to_vec(value)?;
    store.set(key, bytes);
    Ok(())
}

/// Decode every entry under `prefix`
pub fn read_prefix<T: DeserializeOwned>(
    store: &dyn KvStore,
    prefix: &str,
) -> SettlementResult<Vec<(String, T)>> {
    store
        .scan_prefix(prefix)
        .into_iter()
        .map(|(k, v)| Ok((k, serde_json::from_slice(&v)?)))
        .collect()
}

// ============================================
// IN-MEMORY STORE
// ============================================

/// Ordered in-memory store, cloned to produce block snapshots
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemStore {
    entries: BTreeMap<String, Vec<u8>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KvStore for MemStore {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Vec<u8>) {
        self.entries.insert(key.to_string(), value);
    }

    fn delete(&mut self, key: &str) {
        self.entries.remove(key);
    }

    fn scan_prefix(&self, prefix: &str) -> Vec<(String, Vec<u8>)> {
        self.entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

// ============================================
// TRANSACTION OVERLAY
// ============================================

/// Write buffer over a parent store. `None` marks a pending delete.
pub struct Transaction<'a> {
    parent: &'a mut dyn KvStore,
    writes: BTreeMap<String, Option<Vec<u8>>>,
}

impl<'a> Transaction<'a> {
    pub fn new(parent: &'a mut dyn KvStore) -> Self {
        Self {
            parent,
            writes: BTreeMap::new(),
        }
    }

    /// Apply buffered writes to the parent
    pub fn commit(self) {
        for (key, value) in self.writes {
            match value {
                Some(bytes) => self.parent.set(&key, bytes),
                None => self.parent.delete(&key),
            }
        }
    }

    /// Drop buffered writes
    pub fn discard(self) {}
}

impl KvStore for Transaction<'_> {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        match self.writes.get(key) {
            Some(value) => value.clone(),
            None => self.parent.get(key),
        }
    }

    fn set(&mut self, key: &str, value: Vec<u8>) {
        self.writes.insert(key.to_string(), Some(value));
    }

    fn delete(&mut self, key: &str) {
        self.writes.insert(key.to_string(), None);
    }

    fn scan_prefix(&self, prefix: &str) -> Vec<(String, Vec<u8>)> {
        let mut merged: BTreeMap<String, Vec<u8>> =
            self.parent.scan_prefix(prefix).into_iter().collect();
        for (key, value) in self
            .writes
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
        {
            match value {
                Some(bytes) => {
                    merged.insert(key.clone(), bytes.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        merged.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_applies_writes() {
        let mut store = MemStore::new();
        store.set("a", b"1".to_vec());
        {
            let mut tx = Transaction::new(&mut store);
            tx.set("b", b"2".to_vec());
            tx.delete("a");
            assert_eq!(tx.get("b"), Some(b"2".to_vec()));
            assert_eq!(tx.get("a"), None);
            tx.commit();
        }
        assert_eq!(store.get("a"), None);
        assert_eq!(store.get("b"), Some(b"2".to_vec()));
    }

    #[test]
    fn test_discard_leaves_parent_untouched() {
        let mut store = MemStore::new();
        store.set("a", b"1".to_vec());
        let before = store.clone();
        {
            let mut tx = Transaction::new(&mut store);
            tx.set("a", b"changed".to_vec());
            tx.set("z", b"new".to_vec());
            tx.discard();
        }
        assert_eq!(store, before);
    }

    #[test]
    fn test_nested_transactions() {
        let mut store = MemStore::new();
        {
            let mut outer = Transaction::new(&mut store);
            outer.set("outer", b"1".to_vec());
            {
                let mut inner = Transaction::new(&mut outer);
                inner.set("inner", b"2".to_vec());
                assert_eq!(inner.get("outer"), Some(b"1".to_vec()));
                inner.commit();
            }
            {
                let mut dropped = Transaction::new(&mut outer);
                dropped.set("dropped", b"3".to_vec());
                dropped.discard();
            }
            outer.commit();
        }
        assert!(store.get("outer").is_some());
        assert!(store.get("inner").is_some());
        assert!(store.get("dropped").is_none());
    }

    #[test]
    fn test_scan_prefix_merges_overlay() {
        let mut store = MemStore::new();
        store.set("pool:A", b"1".to_vec());
        store.set("pool:B", b"2".to_vec());
        store.set("poolx", b"9".to_vec());
        store.set("staker:A:x", b"3".to_vec());

        let mut tx = Transaction::new(&mut store);
        tx.delete("pool:A");
        tx.set("pool:C", b"4".to_vec());

        let keys: Vec<String> = tx.scan_prefix("pool:").into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["pool:B".to_string(), "pool:C".to_string()]);
    }

    #[test]
    fn test_typed_read_write() {
        let mut store = MemStore::new();
        write(&mut store, "meta:n", &42u64).unwrap();
        assert_eq!(read::<u64>(&store, "meta:n").unwrap(), Some(42));
        assert_eq!(read::<u64>(&store, "meta:missing").unwrap(), None);

        store.set("meta:bad", b"not json".to_vec());
        assert!(read::<u64>(&store, "meta:bad").is_err());
    }
}
