//! Membership certificates and the paginated exchange protocol
//!
//! Peers exchange group-membership certificate chains one chain at a
//! time, because constrained peers cannot receive arbitrarily large
//! payloads in one call. Each wire unit carries a trailing marker telling
//! the receiver whether more chains follow; both sides repeat rounds
//! until both report completion. The protocol is symmetric and tolerates
//! either side finishing first.

use crate::anchors::TrustAnchorStore;
use crate::certificate::{CertificateChain, CertificateUsage, KeyInfo};
use crate::policy::Acl;
use crate::validator::{ChainValidator, ValidationOptions};
use crate::verifier::SignatureVerifier;
use lattice_core::{PermissionError, PermissionResult};
use lattice_store::AclStore;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, info};

/// Marker: nothing (more) to send
pub const SEND_MEMBERSHIP_NONE: u8 = 0;
/// Marker: additional chains follow
pub const SEND_MEMBERSHIP_MORE: u8 = 1;
/// Marker: this is the final chain in this round
pub const SEND_MEMBERSHIP_LAST: u8 = 2;

/// Trailing marker on a membership wire unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SendCode {
    /// Nothing (more) to send
    None,
    /// Additional chains follow
    More,
    /// Final chain
    Last,
}

impl SendCode {
    /// Wire byte value
    pub fn as_byte(self) -> u8 {
        match self {
            Self::None => SEND_MEMBERSHIP_NONE,
            Self::More => SEND_MEMBERSHIP_MORE,
            Self::Last => SEND_MEMBERSHIP_LAST,
        }
    }

    /// Decode from the wire byte
    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            SEND_MEMBERSHIP_NONE => Some(Self::None),
            SEND_MEMBERSHIP_MORE => Some(Self::More),
            SEND_MEMBERSHIP_LAST => Some(Self::Last),
            _ => None,
        }
    }

    /// Whether this marker ends the sender's round
    pub fn is_final(self) -> bool {
        matches!(self, Self::None | Self::Last)
    }
}

/// One membership exchange wire unit: an optional chain plus the marker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipUnit {
    /// The chain being transferred; absent for a bare NONE marker
    pub chain: Option<CertificateChain>,
    /// Trailing marker
    pub code: SendCode,
}

/// Stored membership record: the chain plus an optional local policy
/// fragment associated with it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipRecord {
    /// The membership certificate chain, leaf first
    pub chain: CertificateChain,
    /// Local authorization policy fragment tied to this membership
    pub policy_fragment: Option<Vec<Acl>>,
}

/// Summary of one installed membership: leaf serial and issuer key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipSummary {
    /// Leaf certificate serial
    pub serial: String,
    /// Issuer key identifier (AKI)
    pub issuer_key_id: Vec<u8>,
}

/// Whether a membership chain is worth sending to a peer
///
/// A chain is relevant when the peer already knows one of its issuers:
/// any certificate in the chain is issued by a key in the peer's issuer
/// set, or the chain's root key is itself in that set.
pub fn is_relevant_membership_cert(chain: &CertificateChain, peer_issuers: &[KeyInfo]) -> bool {
    chain.certs().iter().any(|cert| {
        peer_issuers.iter().any(|issuer| {
            issuer.key_id == cert.issuer_key_id
                || issuer.public_key == cert.subject_key.public_key
        })
    })
}

/// Persistence for membership certificate chains
///
/// Records are keyed by the leaf's `(serial, issuer AKI)`; key uniqueness
/// is the duplicate-detection mechanism.
#[derive(Debug, Clone)]
pub struct MembershipStore {
    acl: AclStore,
}

impl MembershipStore {
    /// Create a store over the keyed adapter
    pub fn new(acl: AclStore) -> Self {
        Self { acl }
    }

    /// Install a membership chain
    ///
    /// An explicit install of an already-present certificate fails with
    /// `DUPLICATE_CERTIFICATE`; use [`Self::store_if_new`] for the
    /// idempotent exchange path.
    pub fn store_membership(&self, chain: &CertificateChain) -> PermissionResult<()> {
        let leaf = chain.leaf();
        let existing: Option<MembershipRecord> = self
            .acl
            .get_membership(&leaf.serial, &leaf.issuer_key_id)?;
        if existing.is_some() {
            return Err(PermissionError::duplicate_certificate(format!(
                "membership serial {} already installed",
                leaf.serial
            )));
        }
        self.put_record(chain)
    }

    /// Install a membership chain unless already present; returns whether
    /// anything was written
    pub fn store_if_new(&self, chain: &CertificateChain) -> PermissionResult<bool> {
        let leaf = chain.leaf();
        let existing: Option<MembershipRecord> = self
            .acl
            .get_membership(&leaf.serial, &leaf.issuer_key_id)?;
        if existing.is_some() {
            debug!(serial = %leaf.serial, "duplicate membership accepted idempotently");
            return Ok(false);
        }
        self.put_record(chain)?;
        Ok(true)
    }

    fn put_record(&self, chain: &CertificateChain) -> PermissionResult<()> {
        let leaf = chain.leaf();
        let record = MembershipRecord {
            chain: chain.clone(),
            policy_fragment: None,
        };
        self.acl
            .put_membership(&leaf.serial, &leaf.issuer_key_id, &record)?;
        info!(serial = %leaf.serial, "membership stored");
        Ok(())
    }

    /// Remove the membership with this `(serial, issuer AKI)`
    pub fn remove_membership(&self, serial: &str, issuer_aki: &[u8]) -> PermissionResult<()> {
        if !self.acl.delete_membership(serial, issuer_aki)? {
            return Err(PermissionError::certificate_not_found(format!(
                "no membership with serial {serial}"
            )));
        }
        Ok(())
    }

    /// All stored membership chains
    pub fn all_memberships(&self) -> PermissionResult<Vec<MembershipRecord>> {
        let mut out = Vec::new();
        for key in self.acl.membership_keys()? {
            if let Some(record) = self.acl.get_membership_by_key::<MembershipRecord>(&key)? {
                out.push(record);
            }
        }
        Ok(out)
    }

    /// Summaries of installed memberships: (serial, issuer AKI) pairs
    pub fn summaries(&self) -> PermissionResult<Vec<MembershipSummary>> {
        Ok(self
            .all_memberships()?
            .iter()
            .map(|record| {
                let leaf = record.chain.leaf();
                MembershipSummary {
                    serial: leaf.serial.clone(),
                    issuer_key_id: leaf.issuer_key_id.clone(),
                }
            })
            .collect())
    }

    /// Remove every membership record (Reset path)
    pub fn clear(&self) -> PermissionResult<()> {
        self.acl.clear_memberships()?;
        Ok(())
    }
}

/// Sending half of one exchange round with one peer
///
/// Built from the chains relevant to the peer; yields one wire unit per
/// call until the final marker has been emitted.
#[derive(Debug)]
pub struct MembershipSender {
    queue: VecDeque<CertificateChain>,
    finished: bool,
}

impl MembershipSender {
    /// Build a sender from the locally stored chains relevant to a peer
    pub fn for_peer(
        store: &MembershipStore,
        peer_issuers: &[KeyInfo],
    ) -> PermissionResult<Self> {
        let queue = store
            .all_memberships()?
            .into_iter()
            .map(|record| record.chain)
            .filter(|chain| is_relevant_membership_cert(chain, peer_issuers))
            .collect::<VecDeque<_>>();
        debug!(relevant = queue.len(), "membership sender prepared");
        Ok(Self {
            queue,
            finished: false,
        })
    }

    /// Produce the next wire unit
    ///
    /// Once the final marker has been emitted, further calls keep
    /// returning bare NONE units, so a peer that polls again sees a
    /// consistent "nothing more" answer.
    pub fn next_unit(&mut self) -> MembershipUnit {
        match self.queue.pop_front() {
            Some(chain) => {
                let code = if self.queue.is_empty() {
                    self.finished = true;
                    SendCode::Last
                } else {
                    SendCode::More
                };
                MembershipUnit {
                    chain: Some(chain),
                    code,
                }
            }
            None => {
                self.finished = true;
                MembershipUnit {
                    chain: None,
                    code: SendCode::None,
                }
            }
        }
    }

    /// Whether the final marker has been emitted
    pub fn is_done(&self) -> bool {
        self.finished
    }
}

/// Receiving half of the exchange: validates and stores incoming chains
pub struct MembershipReceiver<'a> {
    store: &'a MembershipStore,
    anchors: &'a TrustAnchorStore,
    verifier: &'a dyn SignatureVerifier,
}

impl<'a> MembershipReceiver<'a> {
    /// Create a receiver over the local store and trust state
    pub fn new(
        store: &'a MembershipStore,
        anchors: &'a TrustAnchorStore,
        verifier: &'a dyn SignatureVerifier,
    ) -> Self {
        Self {
            store,
            anchors,
            verifier,
        }
    }

    /// Process one incoming unit; returns whether the peer is done
    ///
    /// The chain must validate structurally and against trust, and must
    /// carry membership usage. Duplicates are accepted idempotently.
    pub fn receive(&self, unit: &MembershipUnit) -> PermissionResult<bool> {
        if let Some(chain) = &unit.chain {
            if !chain.leaf().usage.permits(CertificateUsage::Membership) {
                return Err(PermissionError::invalid_certificate_usage(
                    "membership certificate required",
                ));
            }
            let validator = ChainValidator::new(self.anchors, self.verifier);
            if !validator.validate(chain, &ValidationOptions::default()) {
                return Err(PermissionError::invalid_certificate(
                    "membership chain failed validation",
                ));
            }
            self.store.store_if_new(chain)?;
        }
        Ok(unit.code.is_final())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_code_wire_bytes() {
        for code in [SendCode::None, SendCode::More, SendCode::Last] {
            assert_eq!(SendCode::from_byte(code.as_byte()), Some(code));
        }
        assert_eq!(SendCode::from_byte(3), None);
        assert!(SendCode::None.is_final());
        assert!(SendCode::Last.is_final());
        assert!(!SendCode::More.is_final());
    }

    mod with_testkit {
        use super::super::*;
        use crate::anchors::TrustAnchor;
        use crate::testkit::CertAuthority;
        use crate::verifier::Ed25519Verifier;
        use lattice_core::SecurityGroupId;
        use lattice_store::MemoryKeyStore;
        use std::sync::Arc;

        fn store() -> MembershipStore {
            MembershipStore::new(AclStore::new(Arc::new(MemoryKeyStore::new())))
        }

        #[test]
        fn duplicate_install_is_an_error_but_exchange_path_is_idempotent() {
            let authority = CertAuthority::new("group-authority");
            let device = CertAuthority::new("device");
            let group = SecurityGroupId::new();
            let chain = authority.membership_chain(&device, "55", group);

            let memberships = store();
            memberships.store_membership(&chain).unwrap();
            assert_eq!(
                memberships.store_membership(&chain).unwrap_err().error_name(),
                Some("DUPLICATE_CERTIFICATE")
            );
            assert!(!memberships.store_if_new(&chain).unwrap());
            assert_eq!(memberships.all_memberships().unwrap().len(), 1);
        }

        #[test]
        fn remove_missing_membership_reports_not_found() {
            let memberships = store();
            assert_eq!(
                memberships
                    .remove_membership("404", &[1, 2])
                    .unwrap_err()
                    .error_name(),
                Some("CERTIFICATE_NOT_FOUND")
            );
        }

        #[test]
        fn relevance_filters_by_peer_issuers() {
            let authority = CertAuthority::new("group-authority");
            let stranger = CertAuthority::new("stranger");
            let device = CertAuthority::new("device");
            let group = SecurityGroupId::new();
            let chain = authority.membership_chain(&device, "1", group);

            assert!(is_relevant_membership_cert(&chain, &[authority.key_info()]));
            assert!(!is_relevant_membership_cert(&chain, &[stranger.key_info()]));
            assert!(!is_relevant_membership_cert(&chain, &[]));
        }

        #[test]
        fn sender_marks_last_unit_and_stays_done() {
            let authority = CertAuthority::new("group-authority");
            let device = CertAuthority::new("device");
            let group = SecurityGroupId::new();
            let memberships = store();
            memberships
                .store_membership(&authority.membership_chain(&device, "1", group))
                .unwrap();
            memberships
                .store_membership(&authority.membership_chain(&device, "2", group))
                .unwrap();

            let mut sender =
                MembershipSender::for_peer(&memberships, &[authority.key_info()]).unwrap();
            let first = sender.next_unit();
            assert_eq!(first.code, SendCode::More);
            assert!(!sender.is_done());
            let second = sender.next_unit();
            assert_eq!(second.code, SendCode::Last);
            assert!(sender.is_done());
            // polling past the end keeps answering NONE
            let third = sender.next_unit();
            assert_eq!(third.code, SendCode::None);
            assert!(third.chain.is_none());
        }

        #[test]
        fn sender_with_nothing_relevant_answers_none() {
            let memberships = store();
            let mut sender = MembershipSender::for_peer(&memberships, &[]).unwrap();
            let unit = sender.next_unit();
            assert_eq!(unit.code, SendCode::None);
            assert!(sender.is_done());
        }

        #[test]
        fn receiver_rejects_untrusted_chain() {
            let authority = CertAuthority::new("group-authority");
            let device = CertAuthority::new("device");
            let group = SecurityGroupId::new();
            let chain = authority.membership_chain(&device, "9", group);

            let memberships = store();
            let anchors = TrustAnchorStore::new();
            let receiver = MembershipReceiver::new(&memberships, &anchors, &Ed25519Verifier);
            let unit = MembershipUnit {
                chain: Some(chain.clone()),
                code: SendCode::Last,
            };
            assert_eq!(
                receiver.receive(&unit).unwrap_err().error_name(),
                Some("INVALID_CERTIFICATE")
            );

            anchors.install(TrustAnchor::security_group_authority(
                authority.key_info(),
                group,
            ));
            assert_eq!(receiver.receive(&unit), Ok(true));
            assert_eq!(memberships.all_memberships().unwrap().len(), 1);
        }
    }
}
