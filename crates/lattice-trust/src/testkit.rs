//! Test support: deterministic authorities, listeners, and fault stores
//!
//! Used by this crate's unit and integration tests. Not intended for
//! production wiring.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use crate::certificate::{
    Certificate, CertificateChain, CertificateUsage, KeyAlgorithm, KeyInfo, Validity,
};
use crate::hooks::StateListener;
use ed25519_dalek::{Signer, SigningKey};
use lattice_core::{ApplicationState, Digest32, SecurityGroupId};
use lattice_store::{KeyValueStore, MemoryKeyStore, StoreError, StoreKey, StoreResult};
use parking_lot::Mutex;
use rand::rngs::OsRng;
use std::sync::atomic::{AtomicBool, Ordering};

/// Validity window applied to every test certificate
///
/// Starts at t = 1000 so tests can probe the not-yet-valid edge, and
/// never expires so wall-clock validation passes.
pub fn test_validity() -> Validity {
    Validity {
        not_before: 1000,
        not_after: u64::MAX,
    }
}

/// A signing identity that can issue certificates
pub struct CertAuthority {
    signing: SigningKey,
    cn: String,
}

impl CertAuthority {
    /// Generate a fresh authority named `cn`
    pub fn new(cn: &str) -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
            cn: cn.to_string(),
        }
    }

    /// Public key descriptor of this authority
    pub fn key_info(&self) -> KeyInfo {
        KeyInfo::new(
            KeyAlgorithm::Ed25519,
            self.signing.verifying_key().to_bytes().to_vec(),
        )
    }

    /// Issue a certificate for `subject`, signed by this authority
    pub fn issue(
        &self,
        serial: &str,
        subject: &CertAuthority,
        usage: CertificateUsage,
        group: SecurityGroupId,
        manifest_digest: Option<Digest32>,
    ) -> Certificate {
        let mut cert = Certificate {
            serial: serial.to_string(),
            subject_cn: subject.cn.clone(),
            subject_key: subject.key_info(),
            issuer_cn: self.cn.clone(),
            issuer_key_id: self.key_info().key_id,
            validity: test_validity(),
            usage,
            security_group_id: group,
            manifest_digest,
            signature: Vec::new(),
        };
        let tbs = cert.tbs_bytes().unwrap();
        cert.signature = self.signing.sign(&tbs).to_bytes().to_vec();
        cert
    }

    /// This authority's self-signed root certificate
    pub fn self_signed_root(&self, serial: &str) -> Certificate {
        self.issue(
            serial,
            self,
            CertificateUsage::Unrestricted,
            SecurityGroupId::nil(),
            None,
        )
    }

    /// Two-certificate identity chain for `device`, leaf first
    pub fn identity_chain(
        &self,
        device: &CertAuthority,
        serial: &str,
        manifest_digest: Option<Digest32>,
    ) -> CertificateChain {
        let leaf = self.issue(
            serial,
            device,
            CertificateUsage::Identity,
            SecurityGroupId::nil(),
            manifest_digest,
        );
        let root = self.self_signed_root("root");
        CertificateChain::new(vec![leaf, root]).unwrap()
    }

    /// Two-certificate membership chain for `device` in `group`
    pub fn membership_chain(
        &self,
        device: &CertAuthority,
        serial: &str,
        group: SecurityGroupId,
    ) -> CertificateChain {
        let leaf = self.issue(serial, device, CertificateUsage::Membership, group, None);
        let root = self.self_signed_root("root");
        CertificateChain::new(vec![leaf, root]).unwrap()
    }
}

/// Records every state notification it receives
#[derive(Debug, Default)]
pub struct StateRecorder {
    states: Mutex<Vec<ApplicationState>>,
}

impl StateRecorder {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// States observed so far, in order
    pub fn states(&self) -> Vec<ApplicationState> {
        self.states.lock().clone()
    }

    /// The most recent state, if any
    pub fn last(&self) -> Option<ApplicationState> {
        self.states.lock().last().copied()
    }
}

impl StateListener for StateRecorder {
    fn state_changed(&self, _key_info: &KeyInfo, state: ApplicationState) {
        self.states.lock().push(state);
    }
}

/// Key-value store with injectable faults, for rollback testing
#[derive(Debug, Default)]
pub struct FailingStore {
    inner: MemoryKeyStore,
    fail_put_prefix: Mutex<Option<Vec<u8>>>,
    fail_everything: AtomicBool,
}

impl FailingStore {
    /// Create a healthy store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `put` whose key starts with `prefix` fail
    pub fn fail_puts_with_prefix(&self, prefix: &[u8]) {
        *self.fail_put_prefix.lock() = Some(prefix.to_vec());
    }

    /// Make every subsequent operation fail, including deletes
    pub fn fail_everything(&self) {
        self.fail_everything.store(true, Ordering::SeqCst);
    }

    fn check_global(&self) -> StoreResult<()> {
        if self.fail_everything.load(Ordering::SeqCst) {
            return Err(StoreError::backend("injected backend failure"));
        }
        Ok(())
    }
}

impl KeyValueStore for FailingStore {
    fn get(&self, key: &StoreKey) -> StoreResult<Option<Vec<u8>>> {
        self.check_global()?;
        self.inner.get(key)
    }

    fn put(&self, key: &StoreKey, value: Vec<u8>) -> StoreResult<()> {
        self.check_global()?;
        if let Some(prefix) = self.fail_put_prefix.lock().as_ref() {
            if key.as_bytes().starts_with(prefix) {
                return Err(StoreError::backend("injected put failure"));
            }
        }
        self.inner.put(key, value)
    }

    fn delete(&self, key: &StoreKey) -> StoreResult<()> {
        self.check_global()?;
        self.inner.delete(key)
    }

    fn keys_with_prefix(&self, prefix: &[u8]) -> StoreResult<Vec<StoreKey>> {
        self.check_global()?;
        self.inner.keys_with_prefix(prefix)
    }
}
