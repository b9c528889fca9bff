//! # Lattice Trust
//!
//! Permission and trust-management core of a Lattice peer device. This
//! crate decides whether a device may be claimed into a security domain,
//! what access-control policy governs it, which peers' certificates it
//! trusts, and how membership and identity certificates are exchanged and
//! validated between peers.
//!
//! ## Core pieces
//!
//! - [`anchors::TrustAnchorStore`] — mutex-guarded trust-anchor list
//! - [`validator::ChainValidator`] — certificate-chain structure and
//!   trust-closure validation
//! - [`policy::PolicyStore`] — versioned policy installation and
//!   default-policy rebuild
//! - [`manifest::ManifestStore`] — signed-manifest storage and digest
//!   binding
//! - [`membership`] — paginated membership-certificate exchange
//! - [`session::ManagementSessionGuard`] — lock-free double-entry
//!   detection for administrative sessions
//! - [`core::PermissionModule`] — the claim/reset state machine tying it
//!   all together
//!
//! Raw signature math and the physical key-value store are consumed as
//! opaque collaborators ([`verifier::SignatureVerifier`],
//! `lattice_store::KeyValueStore`).

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod anchors;
pub mod certificate;
pub mod config;
pub mod core;
pub mod hooks;
pub mod manifest;
pub mod membership;
pub mod policy;
pub mod session;
pub mod testkit;
pub mod validator;
pub mod verifier;

pub use anchors::{AnchorUse, TrustAnchor, TrustAnchorStore};
pub use certificate::{
    Certificate, CertificateChain, CertificateError, CertificateUsage, KeyAlgorithm, KeyInfo,
    Validity,
};
pub use config::Configuration;
pub use core::PermissionModule;
pub use hooks::{CredentialRequest, CredentialVerification, EncryptionComplete, StateListener};
pub use manifest::{generate_manifest_digest, Manifest, ManifestStore};
pub use membership::{
    is_relevant_membership_cert, MembershipReceiver, MembershipRecord, MembershipSender,
    MembershipStore, MembershipSummary, MembershipUnit, SendCode,
};
pub use policy::{Acl, MemberType, Peer, Policy, PolicyStore, Rule, RuleMember};
pub use session::ManagementSessionGuard;
pub use validator::{ChainValidator, ValidationOptions};
pub use verifier::{Ed25519Verifier, SignatureVerifier};

// Re-export the foundation types callers always need alongside this crate.
pub use lattice_core::{ApplicationState, PeerGuid, PermissionError, PermissionResult, SecurityGroupId};
