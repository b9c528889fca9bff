//! ACL entry kinds and derived storage keys
//!
//! Each logical record the permission core persists maps to a fixed key
//! prefix; membership entries additionally derive their key from the
//! certificate's `(serial, issuer AKI)` pair, which doubles as the
//! duplicate-detection mechanism. No kind's key space collides with
//! another's.

use crate::error::{StoreError, StoreResult};
use crate::kv::KeyValueStore;
use serde::{de::DeserializeOwned, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Logical record kinds persisted by the permission core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AclEntryKind {
    /// The default (fallback) policy
    DefaultPolicy,
    /// The installed active policy
    Policy,
    /// Membership certificate chains and associated policy fragments
    Memberships,
    /// The identity certificate chain
    Identity,
    /// The manifest template
    ManifestTemplate,
    /// The stored manifest set
    Manifest,
    /// Claim configuration and lifecycle state
    Configuration,
}

impl AclEntryKind {
    /// Fixed key prefix for this entry kind
    fn prefix(self) -> &'static [u8] {
        match self {
            Self::DefaultPolicy => b"acl/default-policy",
            Self::Policy => b"acl/policy",
            Self::Memberships => b"acl/membership/",
            Self::Identity => b"acl/identity",
            Self::ManifestTemplate => b"acl/manifest-template",
            Self::Manifest => b"acl/manifest",
            Self::Configuration => b"acl/configuration",
        }
    }
}

impl fmt::Display for AclEntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::DefaultPolicy => "default-policy",
            Self::Policy => "policy",
            Self::Memberships => "memberships",
            Self::Identity => "identity",
            Self::ManifestTemplate => "manifest-template",
            Self::Manifest => "manifest",
            Self::Configuration => "configuration",
        };
        write!(f, "{name}")
    }
}

/// Opaque derived storage key
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StoreKey(Vec<u8>);

impl StoreKey {
    /// Wrap raw key bytes
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// The raw key bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// Derive the key for a singleton entry kind
///
/// Membership entries are not singletons; use [`membership_key`].
pub fn entry_key(kind: AclEntryKind) -> StoreKey {
    debug_assert!(kind != AclEntryKind::Memberships);
    StoreKey(kind.prefix().to_vec())
}

/// Derive the key for a membership certificate from `(serial, issuer AKI)`
pub fn membership_key(serial: &str, issuer_aki: &[u8]) -> StoreKey {
    let mut key = AclEntryKind::Memberships.prefix().to_vec();
    key.extend_from_slice(hex::encode(issuer_aki).as_bytes());
    key.push(b'/');
    key.extend_from_slice(serial.as_bytes());
    StoreKey(key)
}

/// Typed adapter over the byte-level store
///
/// Owns no application semantics; encodes records as CBOR and derives
/// keys per entry kind.
#[derive(Clone)]
pub struct AclStore {
    backend: Arc<dyn KeyValueStore>,
}

impl AclStore {
    /// Create an adapter over `backend`
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// Store a singleton record
    pub fn put<T: Serialize>(&self, kind: AclEntryKind, record: &T) -> StoreResult<()> {
        let bytes = serde_cbor::to_vec(record).map_err(|e| StoreError::codec(e.to_string()))?;
        debug!(%kind, bytes = bytes.len(), "acl record stored");
        self.backend.put(&entry_key(kind), bytes)
    }

    /// Fetch a singleton record, `None` when absent
    pub fn get<T: DeserializeOwned>(&self, kind: AclEntryKind) -> StoreResult<Option<T>> {
        match self.backend.get(&entry_key(kind))? {
            Some(bytes) => {
                let record =
                    serde_cbor::from_slice(&bytes).map_err(|e| StoreError::codec(e.to_string()))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Delete a singleton record; absent records are a no-op
    pub fn delete(&self, kind: AclEntryKind) -> StoreResult<()> {
        debug!(%kind, "acl record deleted");
        self.backend.delete(&entry_key(kind))
    }

    /// Store a membership record under its derived key
    pub fn put_membership<T: Serialize>(
        &self,
        serial: &str,
        issuer_aki: &[u8],
        record: &T,
    ) -> StoreResult<()> {
        let bytes = serde_cbor::to_vec(record).map_err(|e| StoreError::codec(e.to_string()))?;
        self.backend.put(&membership_key(serial, issuer_aki), bytes)
    }

    /// Fetch a membership record by `(serial, issuer AKI)`
    pub fn get_membership<T: DeserializeOwned>(
        &self,
        serial: &str,
        issuer_aki: &[u8],
    ) -> StoreResult<Option<T>> {
        match self.backend.get(&membership_key(serial, issuer_aki))? {
            Some(bytes) => {
                let record =
                    serde_cbor::from_slice(&bytes).map_err(|e| StoreError::codec(e.to_string()))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Fetch a membership record by its already-derived key
    pub fn get_membership_by_key<T: DeserializeOwned>(
        &self,
        key: &StoreKey,
    ) -> StoreResult<Option<T>> {
        match self.backend.get(key)? {
            Some(bytes) => {
                let record =
                    serde_cbor::from_slice(&bytes).map_err(|e| StoreError::codec(e.to_string()))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Delete a membership record; returns whether it existed
    pub fn delete_membership(&self, serial: &str, issuer_aki: &[u8]) -> StoreResult<bool> {
        let key = membership_key(serial, issuer_aki);
        let existed = self.backend.get(&key)?.is_some();
        if existed {
            self.backend.delete(&key)?;
        }
        Ok(existed)
    }

    /// List all membership record keys
    pub fn membership_keys(&self) -> StoreResult<Vec<StoreKey>> {
        self.backend
            .keys_with_prefix(AclEntryKind::Memberships.prefix())
    }

    /// Delete every membership record
    pub fn clear_memberships(&self) -> StoreResult<()> {
        let keys = self.membership_keys()?;
        debug!(count = keys.len(), "clearing membership records");
        for key in keys {
            self.backend.delete(&key)?;
        }
        Ok(())
    }
}

impl fmt::Debug for AclStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AclStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKeyStore;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Record {
        value: u32,
    }

    fn store() -> AclStore {
        AclStore::new(Arc::new(MemoryKeyStore::new()))
    }

    #[test]
    fn entry_kinds_do_not_collide() {
        let kinds = [
            AclEntryKind::DefaultPolicy,
            AclEntryKind::Policy,
            AclEntryKind::Identity,
            AclEntryKind::ManifestTemplate,
            AclEntryKind::Manifest,
            AclEntryKind::Configuration,
        ];
        for a in &kinds {
            for b in &kinds {
                if a != b {
                    assert_ne!(entry_key(*a), entry_key(*b));
                }
            }
            // singleton keys never fall inside the membership key space
            assert!(!entry_key(*a)
                .as_bytes()
                .starts_with(AclEntryKind::Memberships.prefix()));
        }
    }

    #[test]
    fn membership_key_derivation_is_unique_per_pair() {
        let a = membership_key("1", &[0xaa]);
        let b = membership_key("2", &[0xaa]);
        let c = membership_key("1", &[0xbb]);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, membership_key("1", &[0xaa]));
    }

    #[test]
    fn singleton_roundtrip() {
        let acl = store();
        acl.put(AclEntryKind::Configuration, &Record { value: 7 })
            .unwrap();
        let back: Option<Record> = acl.get(AclEntryKind::Configuration).unwrap();
        assert_eq!(back, Some(Record { value: 7 }));

        acl.delete(AclEntryKind::Configuration).unwrap();
        let gone: Option<Record> = acl.get(AclEntryKind::Configuration).unwrap();
        assert_eq!(gone, None);
    }

    #[test]
    fn membership_records_enumerate_and_clear() {
        let acl = store();
        acl.put_membership("10", &[0x01], &Record { value: 1 })
            .unwrap();
        acl.put_membership("11", &[0x02], &Record { value: 2 })
            .unwrap();
        assert_eq!(acl.membership_keys().unwrap().len(), 2);

        assert!(acl.delete_membership("10", &[0x01]).unwrap());
        assert!(!acl.delete_membership("10", &[0x01]).unwrap());

        acl.clear_memberships().unwrap();
        assert!(acl.membership_keys().unwrap().is_empty());
    }
}
