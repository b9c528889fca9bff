//! Key-value store seam
//!
//! The physical store is consumed as an opaque byte-level abstraction so
//! the permission core can run over any backing (platform key store,
//! encrypted file, test memory map). Keys are opaque byte strings derived
//! by the [`crate::acl`] adapter.

use crate::acl::StoreKey;
use crate::error::StoreResult;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Byte-level persistence abstraction
///
/// Implementations must be safe for calls from arbitrary threads; the
/// core invokes them on whichever thread the administrative call arrived.
pub trait KeyValueStore: Send + Sync {
    /// Fetch the record stored under `key`, if any
    fn get(&self, key: &StoreKey) -> StoreResult<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any previous record
    fn put(&self, key: &StoreKey, value: Vec<u8>) -> StoreResult<()>;

    /// Remove the record under `key`; removing a missing key is a no-op
    fn delete(&self, key: &StoreKey) -> StoreResult<()>;

    /// List all keys beginning with `prefix`, in lexicographic order
    fn keys_with_prefix(&self, prefix: &[u8]) -> StoreResult<Vec<StoreKey>>;
}

/// In-memory key-value store
///
/// The default backing for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    records: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryKeyStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently held
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the store holds no records
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl KeyValueStore for MemoryKeyStore {
    fn get(&self, key: &StoreKey) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.records.read().get(key.as_bytes()).cloned())
    }

    fn put(&self, key: &StoreKey, value: Vec<u8>) -> StoreResult<()> {
        self.records.write().insert(key.as_bytes().to_vec(), value);
        Ok(())
    }

    fn delete(&self, key: &StoreKey) -> StoreResult<()> {
        self.records.write().remove(key.as_bytes());
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &[u8]) -> StoreResult<Vec<StoreKey>> {
        let records = self.records.read();
        Ok(records
            .keys()
            .filter(|k| k.starts_with(prefix))
            .map(|k| StoreKey::from_bytes(k.clone()))
            .collect())
    }
}
