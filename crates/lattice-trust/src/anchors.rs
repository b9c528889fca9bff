//! Trust anchor storage
//!
//! An ordered, mutex-guarded collection of the public keys this device
//! trusts as chain roots: the certificate authority installed at claim
//! time and the security-group authorities referenced by policy.
//!
//! Lock ordering: the anchor mutex is the innermost core lock. Callers
//! must never acquire it while holding it themselves, and must not take
//! other core locks while inside an anchor operation; policy-driven
//! reconciliation takes snapshots instead of holding the lock across
//! store calls.

use crate::certificate::KeyInfo;
use lattice_core::SecurityGroupId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How a trust anchor is used during validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnchorUse {
    /// Certificate authority root
    CertificateAuthority,
    /// Security-group authority root
    SecurityGroupAuthority,
}

/// A public key trusted as a chain root
///
/// Immutable once created; removed only by Reset or policy
/// reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustAnchor {
    /// Role of the anchor
    pub usage: AnchorUse,
    /// Public key descriptor
    pub key_info: KeyInfo,
    /// Group the anchor is authoritative for; nil for CA anchors
    pub security_group_id: SecurityGroupId,
}

impl TrustAnchor {
    /// Create a certificate-authority anchor
    pub fn certificate_authority(key_info: KeyInfo) -> Self {
        Self {
            usage: AnchorUse::CertificateAuthority,
            key_info,
            security_group_id: SecurityGroupId::nil(),
        }
    }

    /// Create a security-group-authority anchor
    pub fn security_group_authority(key_info: KeyInfo, group: SecurityGroupId) -> Self {
        Self {
            usage: AnchorUse::SecurityGroupAuthority,
            key_info,
            security_group_id: group,
        }
    }
}

/// Mutex-guarded ordered trust-anchor collection
///
/// Insertion order is preserved so validation order is deterministic;
/// duplicates (same public key and use) are never held.
#[derive(Debug, Default)]
pub struct TrustAnchorStore {
    anchors: Mutex<Vec<Arc<TrustAnchor>>>,
}

impl TrustAnchorStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an anchor; an existing anchor with the same public key and
    /// use makes this a no-op. Returns whether the anchor was added.
    pub fn install(&self, anchor: TrustAnchor) -> bool {
        let mut anchors = self.anchors.lock();
        let duplicate = anchors.iter().any(|existing| {
            existing.usage == anchor.usage
                && existing.key_info.public_key == anchor.key_info.public_key
        });
        if duplicate {
            return false;
        }
        anchors.push(Arc::new(anchor));
        true
    }

    /// Remove the anchor with this public key and use, if present
    pub fn remove(&self, public_key: &[u8], usage: AnchorUse) -> bool {
        let mut anchors = self.anchors.lock();
        let before = anchors.len();
        anchors.retain(|a| !(a.usage == usage && a.key_info.public_key == public_key));
        anchors.len() != before
    }

    /// Snapshot of all anchors in insertion order
    pub fn list(&self) -> Vec<Arc<TrustAnchor>> {
        self.anchors.lock().clone()
    }

    /// Remove every anchor (Reset path)
    pub fn clear(&self) {
        self.anchors.lock().clear();
    }

    /// Whether `public_key` exactly matches any stored anchor's key
    pub fn is_trust_anchor(&self, public_key: &[u8]) -> bool {
        self.anchors
            .lock()
            .iter()
            .any(|a| a.key_info.public_key == public_key)
    }

    /// Whether at least one anchor is installed
    pub fn has_anchors(&self) -> bool {
        !self.anchors.lock().is_empty()
    }

    /// Snapshot of the security-group-authority anchors
    pub fn group_authorities(&self) -> Vec<Arc<TrustAnchor>> {
        self.anchors
            .lock()
            .iter()
            .filter(|a| a.usage == AnchorUse::SecurityGroupAuthority)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate::KeyAlgorithm;

    fn key(byte: u8) -> KeyInfo {
        KeyInfo::new(KeyAlgorithm::Ed25519, vec![byte; 32])
    }

    #[test]
    fn install_preserves_order_and_rejects_duplicates() {
        let store = TrustAnchorStore::new();
        assert!(store.install(TrustAnchor::certificate_authority(key(1))));
        assert!(store.install(TrustAnchor::certificate_authority(key(2))));
        // same key and use: no-op
        assert!(!store.install(TrustAnchor::certificate_authority(key(1))));
        // same key, different use: distinct anchor
        assert!(store.install(TrustAnchor::security_group_authority(
            key(1),
            SecurityGroupId::new()
        )));

        let listed = store.list();
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[0].key_info, key(1));
        assert_eq!(listed[1].key_info, key(2));
    }

    #[test]
    fn is_trust_anchor_matches_exactly() {
        let store = TrustAnchorStore::new();
        store.install(TrustAnchor::certificate_authority(key(7)));
        assert!(store.is_trust_anchor(&key(7).public_key));
        assert!(!store.is_trust_anchor(&key(8).public_key));
    }

    #[test]
    fn clear_removes_everything() {
        let store = TrustAnchorStore::new();
        store.install(TrustAnchor::certificate_authority(key(1)));
        assert!(store.has_anchors());
        store.clear();
        assert!(!store.has_anchors());
        assert!(store.list().is_empty());
    }

    #[test]
    fn remove_targets_key_and_use() {
        let store = TrustAnchorStore::new();
        let group = SecurityGroupId::new();
        store.install(TrustAnchor::certificate_authority(key(1)));
        store.install(TrustAnchor::security_group_authority(key(1), group));

        assert!(store.remove(&key(1).public_key, AnchorUse::SecurityGroupAuthority));
        assert!(!store.remove(&key(1).public_key, AnchorUse::SecurityGroupAuthority));
        // the CA anchor with the same key survives
        assert!(store.is_trust_anchor(&key(1).public_key));
    }
}
