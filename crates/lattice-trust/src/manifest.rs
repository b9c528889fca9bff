//! Signed manifests and the manifest template
//!
//! A manifest is a rule set a device declares it will enforce, bound to
//! its identity through a SHA-256 digest of the canonical rule encoding.
//! The template is the maximum permission envelope the device will ever
//! grant, installed once by the policy manager and consumed when
//! rebuilding the default policy.

use crate::policy::Rule;
use lattice_core::{sha256, Digest32, PermissionError, PermissionResult};
use lattice_store::{AclEntryKind, AclStore};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Compute the digest binding a rule set to an identity
///
/// The rules are encoded canonically (deterministic binary encoding of
/// the ordered sequence) and hashed with SHA-256.
pub fn generate_manifest_digest(rules: &[Rule]) -> PermissionResult<Digest32> {
    let encoded =
        bincode::serialize(rules).map_err(|e| PermissionError::serialization(e.to_string()))?;
    Ok(sha256(&encoded))
}

/// A signed rule set bound to an identity by digest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Rules the device declares it will enforce
    pub rules: Vec<Rule>,
    /// Digest over the canonical rule encoding
    pub digest: Digest32,
    /// Issuer signature over the digest; opaque to the core
    pub signature: Vec<u8>,
}

impl Manifest {
    /// Build a manifest with a freshly computed digest
    pub fn new(rules: Vec<Rule>, signature: Vec<u8>) -> PermissionResult<Self> {
        let digest = generate_manifest_digest(&rules)?;
        Ok(Self {
            rules,
            digest,
            signature,
        })
    }

    /// Whether the stored digest matches the rules
    pub fn digest_matches(&self) -> PermissionResult<bool> {
        Ok(generate_manifest_digest(&self.rules)? == self.digest)
    }
}

/// Persistence for manifests and the manifest template
#[derive(Debug, Clone)]
pub struct ManifestStore {
    acl: AclStore,
}

impl ManifestStore {
    /// Create a store over the keyed adapter
    pub fn new(acl: AclStore) -> Self {
        Self { acl }
    }

    /// Store manifests, verifying each digest first
    ///
    /// `append = false` replaces the full stored set. `append = true`
    /// adds to it; exact duplicates are skipped silently (idempotent
    /// success, not an error). A digest that does not match its rules is
    /// a hard `DIGEST_MISMATCH` failure.
    pub fn store_manifests(&self, manifests: &[Manifest], append: bool) -> PermissionResult<()> {
        for manifest in manifests {
            if !manifest.digest_matches()? {
                return Err(PermissionError::digest_mismatch(
                    "manifest digest does not match its rule encoding",
                ));
            }
        }

        let mut stored = if append {
            self.retrieve_manifests()?
        } else {
            Vec::new()
        };
        for manifest in manifests {
            if stored.contains(manifest) {
                debug!("skipping duplicate manifest on append");
                continue;
            }
            stored.push(manifest.clone());
        }
        self.acl.put(AclEntryKind::Manifest, &stored)?;
        info!(count = stored.len(), append, "manifests stored");
        Ok(())
    }

    /// Fetch the stored manifest set; empty when none stored
    pub fn retrieve_manifests(&self) -> PermissionResult<Vec<Manifest>> {
        Ok(self
            .acl
            .get::<Vec<Manifest>>(AclEntryKind::Manifest)?
            .unwrap_or_default())
    }

    /// Install the manifest template
    pub fn set_manifest_template(&self, rules: &[Rule]) -> PermissionResult<()> {
        self.acl.put(AclEntryKind::ManifestTemplate, &rules.to_vec())?;
        Ok(())
    }

    /// Fetch the manifest template, `None` when never installed
    pub fn manifest_template(&self) -> PermissionResult<Option<Vec<Rule>>> {
        Ok(self.acl.get(AclEntryKind::ManifestTemplate)?)
    }

    /// Whether a manifest template is installed
    pub fn has_template(&self) -> PermissionResult<bool> {
        Ok(self.manifest_template()?.is_some())
    }

    /// Remove stored manifests and the template (Reset path)
    pub fn clear(&self, keep_template: bool) -> PermissionResult<()> {
        self.acl.delete(AclEntryKind::Manifest)?;
        if !keep_template {
            self.acl.delete(AclEntryKind::ManifestTemplate)?;
        }
        Ok(())
    }
}
