//! The permission module: claim/reset orchestration
//!
//! Owns every store and drives the device lifecycle. Multi-step
//! operations are not wrapped in a cross-store transaction; Claim runs as
//! an ordered sequence of steps with an explicit best-effort rollback,
//! and a rollback failure is surfaced as the distinct unknown-state error
//! that callers must treat as requiring manual recovery.

use crate::anchors::{AnchorUse, TrustAnchor, TrustAnchorStore};
use crate::certificate::{Certificate, CertificateChain, CertificateUsage, KeyInfo};
use crate::config::Configuration;
use crate::hooks::StateListener;
use crate::manifest::{generate_manifest_digest, Manifest, ManifestStore};
use crate::membership::{
    MembershipReceiver, MembershipSender, MembershipStore, MembershipSummary, MembershipUnit,
};
use crate::policy::{
    rebuild_default_policy, reconcile_group_anchors, Policy, PolicyStore, Rule,
};
use crate::session::ManagementSessionGuard;
use crate::validator::{ChainValidator, ValidationOptions};
use crate::verifier::SignatureVerifier;
use lattice_core::{ApplicationState, PermissionError, PermissionResult};
use lattice_store::{AclEntryKind, AclStore, KeyValueStore};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, warn};

/// Permission and trust-management core of one peer device
pub struct PermissionModule {
    acl: AclStore,
    anchors: TrustAnchorStore,
    policies: PolicyStore,
    manifests: ManifestStore,
    memberships: MembershipStore,
    session: ManagementSessionGuard,
    verifier: Arc<dyn SignatureVerifier>,
    listener: Option<Arc<dyn StateListener>>,
    device_key: KeyInfo,
    // Runtime copy of the persisted configuration. Never held across a
    // store call or a listener callback.
    runtime: Mutex<Configuration>,
}

impl PermissionModule {
    /// Create a module over `backend` for the device holding `device_key`
    pub fn new(
        backend: Arc<dyn KeyValueStore>,
        device_key: KeyInfo,
        verifier: Arc<dyn SignatureVerifier>,
    ) -> Self {
        let acl = AclStore::new(backend);
        Self {
            anchors: TrustAnchorStore::new(),
            policies: PolicyStore::new(acl.clone()),
            manifests: ManifestStore::new(acl.clone()),
            memberships: MembershipStore::new(acl.clone()),
            session: ManagementSessionGuard::new(),
            verifier,
            listener: None,
            device_key,
            runtime: Mutex::new(Configuration::default()),
            acl,
        }
    }

    /// Attach the application-state listener
    pub fn with_state_listener(mut self, listener: Arc<dyn StateListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Restore state from the persistence store
    ///
    /// Reads the configuration record and rebuilds the trust-anchor set
    /// from the authorities referenced by the stored policies, then
    /// advertises the restored state.
    pub fn load(&self) -> PermissionResult<()> {
        let config: Configuration = self
            .acl
            .get(AclEntryKind::Configuration)?
            .unwrap_or_default();
        *self.runtime.lock() = config.clone();

        for policy in [self.policies.retrieve(true)?, self.policies.retrieve(false)?]
            .into_iter()
            .flatten()
        {
            for key in policy.referenced_certificate_authorities() {
                self.anchors.install(TrustAnchor::certificate_authority(key));
            }
            for (key, group) in policy.referenced_group_authorities() {
                self.anchors
                    .install(TrustAnchor::security_group_authority(key, group));
            }
        }

        info!(state = %config.application_state, "permission module loaded");
        self.notify_state(config.application_state);
        Ok(())
    }

    /// The device's public key descriptor
    pub fn device_key(&self) -> &KeyInfo {
        &self.device_key
    }

    /// Current application state
    pub fn application_state(&self) -> ApplicationState {
        self.runtime.lock().application_state
    }

    /// Set the application state, enforcing the lifecycle transition rule
    ///
    /// A claimed device may only move to `NeedUpdate` (or stay claimed);
    /// returning to the claimable states requires [`Self::reset`].
    pub fn set_application_state(&self, next: ApplicationState) -> PermissionResult<()> {
        let mut config = {
            let runtime = self.runtime.lock();
            if !runtime.application_state.can_transition_to(next) {
                return Err(PermissionError::invalid_application_state(format!(
                    "cannot move from {} to {} without a reset",
                    runtime.application_state, next
                )));
            }
            runtime.clone()
        };
        config.application_state = next;
        config.application_state_set = true;
        self.store_configuration(config)?;
        self.notify_state(next);
        Ok(())
    }

    /// Claim capabilities bitmask
    pub fn claim_capabilities(&self) -> u16 {
        self.runtime.lock().claim_capabilities
    }

    /// Set the claim capabilities; fixed once the device is claimed
    pub fn set_claim_capabilities(&self, capabilities: u16) -> PermissionResult<()> {
        let mut config = self.claimable_configuration("claim capabilities")?;
        config.claim_capabilities = capabilities;
        self.store_configuration(config)
    }

    /// Additional-info bitmask on the claim capabilities
    pub fn claim_capability_additional_info(&self) -> u16 {
        self.runtime.lock().claim_capability_additional_info
    }

    /// Set the additional-info bitmask; fixed once the device is claimed
    pub fn set_claim_capability_additional_info(&self, info: u16) -> PermissionResult<()> {
        let mut config = self.claimable_configuration("claim capability info")?;
        config.claim_capability_additional_info = info;
        self.store_configuration(config)
    }

    fn claimable_configuration(&self, what: &str) -> PermissionResult<Configuration> {
        let runtime = self.runtime.lock();
        if runtime.application_state.is_claimed() {
            return Err(PermissionError::invalid_application_state(format!(
                "{what} cannot change while claimed"
            )));
        }
        Ok(runtime.clone())
    }

    /// Install the manifest template
    ///
    /// The template is the maximum permission envelope the device will
    /// ever grant. Installing it on an unclaimed device makes the device
    /// claimable.
    pub fn set_manifest_template(&self, rules: &[Rule]) -> PermissionResult<()> {
        self.manifests.set_manifest_template(rules)?;
        let state = self.application_state();
        if state == ApplicationState::NotClaimable {
            self.set_application_state(ApplicationState::Claimable)?;
        }
        Ok(())
    }

    /// Fetch the manifest template
    pub fn get_manifest_template(&self) -> PermissionResult<Vec<Rule>> {
        self.manifests
            .manifest_template()?
            .ok_or_else(|| PermissionError::not_found("no manifest template installed"))
    }

    /// Whether any trust anchor is installed
    pub fn has_trust_anchors(&self) -> bool {
        self.anchors.has_anchors()
    }

    /// Trust-anchor snapshot
    pub fn trust_anchors(&self) -> Vec<Arc<TrustAnchor>> {
        self.anchors.list()
    }

    /// Claim this device into a security domain
    ///
    /// Installs the certificate-authority and admin-group-authority trust
    /// anchors, stores the identity chain and manifests, builds the
    /// default policy, and transitions to `Claimed` as one logical unit.
    /// If a step after anchor installation fails, the module rolls back
    /// to the pre-claim reset state; if the rollback itself fails the
    /// device is left in an unknown state and the distinct
    /// [`PermissionError::UnknownState`] is returned.
    pub fn claim(
        &self,
        certificate_authority: TrustAnchor,
        admin_group_authority: TrustAnchor,
        identity: &CertificateChain,
        manifests: &[Manifest],
    ) -> PermissionResult<()> {
        {
            let runtime = self.runtime.lock();
            match runtime.application_state {
                ApplicationState::Claimed | ApplicationState::NeedUpdate => {
                    return Err(PermissionError::invalid_application_state(
                        "device is already claimed; reset before claiming again",
                    ));
                }
                ApplicationState::NotClaimable => {
                    return Err(PermissionError::permission_denied(
                        "device is not claimable",
                    ));
                }
                ApplicationState::Claimable => {}
            }
        }

        if certificate_authority.usage != AnchorUse::CertificateAuthority {
            return Err(PermissionError::invalid_certificate(
                "certificate-authority anchor required",
            ));
        }
        if admin_group_authority.usage != AnchorUse::SecurityGroupAuthority
            || admin_group_authority.security_group_id.is_nil()
        {
            return Err(PermissionError::invalid_certificate(
                "admin group authority anchor with a group id required",
            ));
        }
        self.check_identity_leaf(identity, manifests)?;

        // Structural pre-check before any mutation, so malformed chains
        // never trigger the rollback path.
        let validator = ChainValidator::new(&self.anchors, self.verifier.as_ref());
        if !validator.validate(identity, &ValidationOptions::structure_only()) {
            return Err(PermissionError::invalid_certificate(
                "identity chain failed structural validation",
            ));
        }

        self.anchors.install(certificate_authority);
        self.anchors.install(admin_group_authority);

        if let Err(claim_failure) = self.claim_steps(identity, manifests) {
            warn!(error = %claim_failure, "claim failed, rolling back");
            if let Err(reset_failure) = self.perform_reset(true) {
                warn!(error = %reset_failure, "rollback failed, device in unknown state");
                return Err(PermissionError::UnknownState {
                    claim_failure: claim_failure.to_string(),
                    reset_failure: reset_failure.to_string(),
                });
            }
            return Err(claim_failure);
        }

        {
            let mut runtime = self.runtime.lock();
            runtime.application_state = ApplicationState::Claimed;
            runtime.application_state_set = true;
        }
        info!("device claimed");
        self.notify_state(ApplicationState::Claimed);
        Ok(())
    }

    /// The steps of a claim that run after the trust anchors are
    /// installed; any failure here triggers rollback in [`Self::claim`].
    fn claim_steps(
        &self,
        identity: &CertificateChain,
        manifests: &[Manifest],
    ) -> PermissionResult<()> {
        let validator = ChainValidator::new(&self.anchors, self.verifier.as_ref());
        if !validator.validate(identity, &ValidationOptions::default()) {
            return Err(PermissionError::invalid_certificate(
                "identity chain does not close at an installed trust anchor",
            ));
        }

        self.acl.put(AclEntryKind::Identity, identity)?;
        self.manifests.store_manifests(manifests, false)?;

        let template = self.manifests.manifest_template()?.unwrap_or_default();
        let default_policy = rebuild_default_policy(&template, &self.anchors);
        self.policies.install(&default_policy, true)?;

        let mut config = self.runtime.lock().clone();
        config.application_state = ApplicationState::Claimed;
        config.application_state_set = true;
        self.acl.put(AclEntryKind::Configuration, &config)?;
        Ok(())
    }

    fn check_identity_leaf(
        &self,
        identity: &CertificateChain,
        manifests: &[Manifest],
    ) -> PermissionResult<()> {
        let leaf = identity.leaf();
        if !leaf.usage.permits(CertificateUsage::Identity) {
            return Err(PermissionError::invalid_certificate_usage(
                "identity certificate required at the chain leaf",
            ));
        }
        if leaf.subject_key.public_key != self.device_key.public_key {
            return Err(PermissionError::invalid_certificate(
                "identity leaf does not carry this device's public key",
            ));
        }
        self.check_digest_binding(leaf, manifests)
    }

    /// Verify the digest binding between the identity leaf and manifests
    fn check_digest_binding(
        &self,
        leaf: &Certificate,
        manifests: &[Manifest],
    ) -> PermissionResult<()> {
        for manifest in manifests {
            if !manifest.digest_matches()? {
                return Err(PermissionError::digest_mismatch(
                    "manifest digest does not match its rule encoding",
                ));
            }
        }
        if let Some(bound) = leaf.manifest_digest {
            let matched = manifests
                .iter()
                .map(|m| generate_manifest_digest(&m.rules))
                .collect::<PermissionResult<Vec<_>>>()?
                .into_iter()
                .any(|digest| digest == bound);
            if !matched {
                return Err(PermissionError::digest_mismatch(
                    "no manifest matches the digest bound to the identity certificate",
                ));
            }
        }
        Ok(())
    }

    /// Factory reset: remove all trust state and return to the unclaimed
    /// lifecycle
    pub fn reset(&self) -> PermissionResult<()> {
        info!("resetting permission module");
        self.perform_reset(false)
    }

    /// Clear trust anchors, policies, identity, manifests, and
    /// memberships
    ///
    /// With `keep_for_claim` the claim-capability configuration survives,
    /// so a failed claim leaves the device claimable again; otherwise the
    /// configuration returns to defaults. The manifest template is
    /// device-intrinsic and survives both paths.
    pub fn perform_reset(&self, keep_for_claim: bool) -> PermissionResult<()> {
        self.anchors.clear();
        self.policies.clear()?;
        self.acl.delete(AclEntryKind::Identity)?;
        self.manifests.clear(true)?;
        self.memberships.clear()?;

        let mut config = if keep_for_claim {
            let runtime = self.runtime.lock().clone();
            Configuration {
                application_state_set: false,
                ..runtime
            }
        } else {
            Configuration::default()
        };
        let claimable =
            self.manifests.has_template()? && config.claim_capabilities != 0;
        config.application_state = if claimable {
            ApplicationState::Claimable
        } else {
            ApplicationState::NotClaimable
        };
        let state = config.application_state;
        self.store_configuration(config)?;
        self.notify_state(state);
        Ok(())
    }

    /// Replace the identity chain and manifest set on a claimed device
    ///
    /// Validates the new chain against the existing trust anchors before
    /// committing; trust anchors and claim state are untouched. Clears a
    /// pending `NeedUpdate` back to `Claimed`.
    pub fn update_identity(
        &self,
        identity: &CertificateChain,
        manifests: &[Manifest],
    ) -> PermissionResult<()> {
        if !self.application_state().is_claimed() {
            return Err(PermissionError::invalid_application_state(
                "cannot update identity on an unclaimed device",
            ));
        }
        self.check_identity_leaf(identity, manifests)?;

        let validator = ChainValidator::new(&self.anchors, self.verifier.as_ref());
        if !validator.validate(identity, &ValidationOptions::default()) {
            return Err(PermissionError::invalid_certificate(
                "identity chain failed validation against installed trust anchors",
            ));
        }

        self.acl.put(AclEntryKind::Identity, identity)?;
        self.manifests.store_manifests(manifests, false)?;
        info!("identity updated");

        if self.application_state() == ApplicationState::NeedUpdate {
            self.set_application_state(ApplicationState::Claimed)?;
        }
        Ok(())
    }

    /// Fetch the installed identity chain
    pub fn get_identity(&self) -> PermissionResult<CertificateChain> {
        self.acl
            .get::<CertificateChain>(AclEntryKind::Identity)?
            .ok_or_else(|| {
                PermissionError::certificate_not_found("no identity certificate installed")
            })
    }

    /// Serial and issuer key of the installed identity certificate
    ///
    /// For a single-certificate chain the issuer key is looked up among
    /// the installed trust anchors; an unknown issuer is an error rather
    /// than a partial key descriptor.
    pub fn identity_certificate_id(&self) -> PermissionResult<(String, KeyInfo)> {
        let chain = self.get_identity()?;
        let leaf = chain.leaf();
        let issuer_key = if chain.len() > 1 {
            chain.certs()[1].subject_key.clone()
        } else {
            self.anchors
                .list()
                .iter()
                .find(|a| a.key_info.key_id == leaf.issuer_key_id)
                .map(|a| a.key_info.clone())
                .ok_or_else(|| {
                    PermissionError::not_found(
                        "issuer key of the identity certificate is not an installed anchor",
                    )
                })?
        };
        Ok((leaf.serial.clone(), issuer_key))
    }

    /// Install a new active policy under monotonic versioning
    ///
    /// On success the security-group authorities referenced by the old
    /// and new policies are reconciled into the trust-anchor store;
    /// claim-installed authorities are never removed.
    pub fn install_policy(&self, policy: &Policy) -> PermissionResult<()> {
        if !self.application_state().is_claimed() {
            return Err(PermissionError::invalid_application_state(
                "cannot install a policy on an unclaimed device",
            ));
        }
        let old = self.policies.retrieve(false)?;
        self.policies.install(policy, false)?;
        let protected = self.claim_protected_keys()?;
        reconcile_group_anchors(old.as_ref(), Some(policy), &self.anchors, &protected);
        Ok(())
    }

    /// Fetch the active (or default) policy
    pub fn get_policy(&self, default: bool) -> PermissionResult<Policy> {
        if default {
            if let Some(stored) = self.policies.retrieve(true)? {
                return Ok(stored);
            }
            let template = self.manifests.manifest_template()?.unwrap_or_default();
            return Ok(rebuild_default_policy(&template, &self.anchors));
        }
        self.policies
            .retrieve(false)?
            .ok_or_else(|| PermissionError::not_found("no active policy installed"))
    }

    /// Version of the policy currently in force
    pub fn policy_version(&self) -> PermissionResult<u32> {
        self.policies.policy_version()
    }

    /// Remove the active policy and regenerate the default
    pub fn reset_policy(&self) -> PermissionResult<()> {
        let old = self.policies.retrieve(false)?;
        self.policies.remove_active()?;
        let protected = self.claim_protected_keys()?;
        reconcile_group_anchors(old.as_ref(), None, &self.anchors, &protected);

        let template = self.manifests.manifest_template()?.unwrap_or_default();
        let default_policy = rebuild_default_policy(&template, &self.anchors);
        self.policies.install(&default_policy, true)?;
        info!("policy reset to default");
        Ok(())
    }

    /// Authorities installed at claim time, never removed by policy
    /// reconciliation
    fn claim_protected_keys(&self) -> PermissionResult<Vec<KeyInfo>> {
        Ok(self
            .policies
            .retrieve(true)?
            .map(|default| {
                default
                    .referenced_group_authorities()
                    .into_iter()
                    .map(|(key, _)| key)
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Store additional manifests (or replace the set)
    pub fn install_manifests(&self, manifests: &[Manifest], append: bool) -> PermissionResult<()> {
        self.manifests.store_manifests(manifests, append)
    }

    /// Fetch the stored manifest set
    pub fn retrieve_manifests(&self) -> PermissionResult<Vec<Manifest>> {
        self.manifests.retrieve_manifests()
    }

    /// Install a membership certificate chain
    ///
    /// The chain must validate against trust and carry membership usage;
    /// installing an already-present certificate is
    /// `DUPLICATE_CERTIFICATE`.
    pub fn install_membership(&self, chain: &CertificateChain) -> PermissionResult<()> {
        if !chain.leaf().usage.permits(CertificateUsage::Membership) {
            return Err(PermissionError::invalid_certificate_usage(
                "membership certificate required",
            ));
        }
        let validator = ChainValidator::new(&self.anchors, self.verifier.as_ref());
        if !validator.validate(chain, &ValidationOptions::default()) {
            return Err(PermissionError::invalid_certificate(
                "membership chain failed validation",
            ));
        }
        self.memberships.store_membership(chain)
    }

    /// Remove a membership certificate by `(serial, issuer AKI)`
    pub fn remove_membership(&self, serial: &str, issuer_aki: &[u8]) -> PermissionResult<()> {
        self.memberships.remove_membership(serial, issuer_aki)
    }

    /// Summaries of installed memberships
    pub fn membership_summaries(&self) -> PermissionResult<Vec<MembershipSummary>> {
        self.memberships.summaries()
    }

    /// Build the sending half of a membership exchange round with a peer
    pub fn membership_sender(&self, peer_issuers: &[KeyInfo]) -> PermissionResult<MembershipSender> {
        MembershipSender::for_peer(&self.memberships, peer_issuers)
    }

    /// Process one incoming membership unit; returns whether the peer has
    /// finished sending
    pub fn receive_membership(&self, unit: &MembershipUnit) -> PermissionResult<bool> {
        let receiver =
            MembershipReceiver::new(&self.memberships, &self.anchors, self.verifier.as_ref());
        receiver.receive(unit)
    }

    /// Signal the start of a management session
    pub fn start_management(&self) -> PermissionResult<()> {
        self.session.start_management()?;
        info!("management session started");
        Ok(())
    }

    /// Signal the end of a management session
    pub fn end_management(&self) -> PermissionResult<()> {
        self.session.end_management()?;
        info!("management session ended");
        Ok(())
    }

    fn store_configuration(&self, config: Configuration) -> PermissionResult<()> {
        self.acl.put(AclEntryKind::Configuration, &config)?;
        *self.runtime.lock() = config;
        Ok(())
    }

    fn notify_state(&self, state: ApplicationState) {
        if let Some(listener) = &self.listener {
            listener.state_changed(&self.device_key, state);
        }
    }
}
