//! Access-control policy model and storage
//!
//! Two logical policies exist: the default policy, rebuilt
//! deterministically from the manifest template and the trust-anchor set,
//! and the optional active policy installed by the security manager under
//! monotonic versioning. Installing or removing the active policy
//! reconciles the security-group authorities it references into the
//! trust-anchor store.

use crate::anchors::{AnchorUse, TrustAnchor, TrustAnchorStore};
use crate::certificate::KeyInfo;
use lattice_core::{PermissionError, PermissionResult, SecurityGroupId};
use lattice_store::{AclEntryKind, AclStore};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Rule member grants: peer may provide (implement) the member
pub const ACTION_PROVIDE: u8 = 0x1;
/// Rule member grants: peer may observe the member
pub const ACTION_OBSERVE: u8 = 0x2;
/// Rule member grants: peer may modify the member
pub const ACTION_MODIFY: u8 = 0x4;
/// All actions
pub const ACTION_ALL: u8 = ACTION_PROVIDE | ACTION_OBSERVE | ACTION_MODIFY;

/// Kind of interface member a rule applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberType {
    /// Method call
    Method,
    /// Signal emission
    Signal,
    /// Property access
    Property,
    /// Any member kind
    Any,
}

/// A single member entry inside a rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleMember {
    /// Member name, `*` for all
    pub name: String,
    /// Which member kind this entry covers
    pub member_type: MemberType,
    /// Bitmask of ACTION_* grants
    pub action_mask: u8,
}

impl RuleMember {
    /// A member entry granting every action on every member
    pub fn all_access() -> Self {
        Self {
            name: "*".to_string(),
            member_type: MemberType::Any,
            action_mask: ACTION_ALL,
        }
    }
}

/// An access-control rule over one interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Interface the rule applies to, `*` for all
    pub interface_name: String,
    /// Member entries
    pub members: Vec<RuleMember>,
}

impl Rule {
    /// A rule granting every action on every interface
    pub fn all_access() -> Self {
        Self {
            interface_name: "*".to_string(),
            members: vec![RuleMember::all_access()],
        }
    }
}

/// Which peers an ACL applies to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Peer {
    /// Every peer, authenticated or not
    All,
    /// Any peer that authenticated with a trusted certificate
    AnyTrusted,
    /// Peers whose chain terminates at this certificate authority
    FromCertificateAuthority {
        /// Authority public key
        key: KeyInfo,
    },
    /// The peer holding exactly this public key
    WithPublicKey {
        /// Peer public key
        key: KeyInfo,
    },
    /// Peers holding a membership certificate for this group
    WithMembership {
        /// Group authority public key
        key: KeyInfo,
        /// Security group
        group: SecurityGroupId,
    },
}

/// One access-control list: a peer set and the rules granted to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
    /// Peers the rules apply to
    pub peers: Vec<Peer>,
    /// Granted rules
    pub rules: Vec<Rule>,
}

/// A versioned access-control policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Monotonically increasing version; the default policy uses 0
    pub version: u32,
    /// Ordered ACLs
    pub acls: Vec<Acl>,
}

impl Policy {
    /// Security-group authorities referenced by this policy's peers
    pub fn referenced_group_authorities(&self) -> Vec<(KeyInfo, SecurityGroupId)> {
        let mut out: Vec<(KeyInfo, SecurityGroupId)> = Vec::new();
        for acl in &self.acls {
            for peer in &acl.peers {
                if let Peer::WithMembership { key, group } = peer {
                    if !out.iter().any(|(k, g)| k == key && g == group) {
                        out.push((key.clone(), *group));
                    }
                }
            }
        }
        out
    }

    /// Certificate authorities referenced by this policy's peers
    pub fn referenced_certificate_authorities(&self) -> Vec<KeyInfo> {
        let mut out: Vec<KeyInfo> = Vec::new();
        for acl in &self.acls {
            for peer in &acl.peers {
                if let Peer::FromCertificateAuthority { key } = peer {
                    if !out.contains(key) {
                        out.push(key.clone());
                    }
                }
            }
        }
        out
    }
}

/// Rebuild the default policy from the manifest template and anchor set
///
/// Deterministic given the template and anchor insertion order: each
/// security-group authority gets full access for its members, peers
/// trusted through a certificate authority get the template envelope.
pub fn rebuild_default_policy(template: &[Rule], anchors: &TrustAnchorStore) -> Policy {
    let mut acls = Vec::new();
    for anchor in anchors.list() {
        match anchor.usage {
            AnchorUse::SecurityGroupAuthority => acls.push(Acl {
                peers: vec![Peer::WithMembership {
                    key: anchor.key_info.clone(),
                    group: anchor.security_group_id,
                }],
                rules: vec![Rule::all_access()],
            }),
            AnchorUse::CertificateAuthority => acls.push(Acl {
                peers: vec![Peer::FromCertificateAuthority {
                    key: anchor.key_info.clone(),
                }],
                rules: template.to_vec(),
            }),
        }
    }
    acls.push(Acl {
        peers: vec![Peer::AnyTrusted],
        rules: template.to_vec(),
    });
    Policy { version: 0, acls }
}

/// Reconcile security-group-authority anchors after a policy change
///
/// Authorities referenced by `old` but not by `new` are removed (unless
/// listed in `protected`, the claim-installed anchors), and authorities
/// referenced by `new` are installed. This preserves the invariant that
/// membership validation never trusts a group no longer authorized by
/// policy.
pub fn reconcile_group_anchors(
    old: Option<&Policy>,
    new: Option<&Policy>,
    anchors: &TrustAnchorStore,
    protected: &[KeyInfo],
) {
    let new_set: Vec<(KeyInfo, SecurityGroupId)> = new
        .map(Policy::referenced_group_authorities)
        .unwrap_or_default();

    if let Some(old) = old {
        for (key, group) in old.referenced_group_authorities() {
            let still_referenced = new_set.iter().any(|(k, g)| *k == key && *g == group);
            let is_protected = protected.iter().any(|p| p.public_key == key.public_key);
            if !still_referenced && !is_protected {
                debug!(group = %group, "removing group authority no longer authorized by policy");
                anchors.remove(&key.public_key, AnchorUse::SecurityGroupAuthority);
            }
        }
    }

    for (key, group) in new_set {
        anchors.install(TrustAnchor::security_group_authority(key, group));
    }
}

/// Versioned policy persistence
#[derive(Debug, Clone)]
pub struct PolicyStore {
    acl: AclStore,
}

impl PolicyStore {
    /// Create a store over the keyed adapter
    pub fn new(acl: AclStore) -> Self {
        Self { acl }
    }

    /// Install a policy
    ///
    /// Non-default installs are rejected with `POLICY_NOT_NEWER` unless
    /// the version strictly exceeds the current active version. The
    /// default policy carries no version constraint.
    pub fn install(&self, policy: &Policy, is_default: bool) -> PermissionResult<()> {
        if !is_default {
            if let Some(current) = self.retrieve(false)? {
                if policy.version <= current.version {
                    return Err(PermissionError::PolicyNotNewer {
                        proposed: policy.version,
                        current: current.version,
                    });
                }
            }
        }
        let kind = if is_default {
            AclEntryKind::DefaultPolicy
        } else {
            AclEntryKind::Policy
        };
        self.acl.put(kind, policy)?;
        info!(version = policy.version, default = is_default, "policy installed");
        Ok(())
    }

    /// Fetch the requested policy variant, `None` when never installed
    pub fn retrieve(&self, is_default: bool) -> PermissionResult<Option<Policy>> {
        let kind = if is_default {
            AclEntryKind::DefaultPolicy
        } else {
            AclEntryKind::Policy
        };
        Ok(self.acl.get(kind)?)
    }

    /// Version of the active policy, or of the default when none active
    pub fn policy_version(&self) -> PermissionResult<u32> {
        if let Some(active) = self.retrieve(false)? {
            return Ok(active.version);
        }
        Ok(self.retrieve(true)?.map(|p| p.version).unwrap_or(0))
    }

    /// Remove the active policy; the default is untouched
    pub fn remove_active(&self) -> PermissionResult<()> {
        self.acl.delete(AclEntryKind::Policy)?;
        Ok(())
    }

    /// Remove both policy variants (Reset path)
    pub fn clear(&self) -> PermissionResult<()> {
        self.acl.delete(AclEntryKind::Policy)?;
        self.acl.delete(AclEntryKind::DefaultPolicy)?;
        Ok(())
    }
}
