//! Callback capability traits
//!
//! One small trait per callback role, passed as injected collaborators.
//! The transport's authentication handshake is out of scope; these are
//! the hooks the core exposes to it.

use crate::certificate::KeyInfo;
use lattice_core::{ApplicationState, PeerGuid};

/// Observer of application-state changes
///
/// Delivered broadcast-style without an established session; intended
/// purely for discovery.
pub trait StateListener: Send + Sync {
    /// Called after every application-state change with the device's
    /// public key descriptor and the new state
    fn state_changed(&self, key_info: &KeyInfo, state: ApplicationState);
}

/// Supplies credentials requested by the key-exchange layer
pub trait CredentialRequest: Send + Sync {
    /// Produce the credential for `auth_mechanism` toward `peer`, or
    /// `None` when unavailable
    fn request_credentials(&self, auth_mechanism: &str, peer: &PeerGuid) -> Option<Vec<u8>>;
}

/// Verifies credentials presented by a peer during key exchange
pub trait CredentialVerification: Send + Sync {
    /// Whether `credential` is acceptable for `auth_mechanism` from `peer`
    fn verify_credentials(&self, auth_mechanism: &str, peer: &PeerGuid, credential: &[u8])
        -> bool;
}

/// Notified when message-encryption setup for a peer completes
pub trait EncryptionComplete: Send + Sync {
    /// Called once the encryption step is complete
    fn encryption_complete(&self);
}
