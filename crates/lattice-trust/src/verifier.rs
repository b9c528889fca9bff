//! Signature verification seam
//!
//! Raw asymmetric-key math is an external collaborator: the chain
//! validator only asks "does this signature by this key cover these
//! bytes". [`Ed25519Verifier`] is the stock implementation; deployments
//! with platform ECDSA hardware inject their own.

use crate::certificate::{KeyAlgorithm, KeyInfo};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};

/// Verifies signatures over opaque key descriptors
pub trait SignatureVerifier: Send + Sync {
    /// Whether `signature` by `key` covers `message`
    ///
    /// Malformed keys or signatures are a verification failure, never a
    /// panic.
    fn verify(&self, key: &KeyInfo, message: &[u8], signature: &[u8]) -> bool;
}

/// Stock verifier for Ed25519 key descriptors
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Verifier;

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, key: &KeyInfo, message: &[u8], signature: &[u8]) -> bool {
        if key.algorithm != KeyAlgorithm::Ed25519 {
            return false;
        }
        let Ok(key_bytes) = <[u8; 32]>::try_from(key.public_key.as_slice()) else {
            return false;
        };
        let Ok(verifying_key) = VerifyingKey::from_bytes(&key_bytes) else {
            return false;
        };
        let Ok(sig_bytes) = <[u8; 64]>::try_from(signature) else {
            return false;
        };
        let sig = Signature::from_bytes(&sig_bytes);
        verifying_key.verify(message, &sig).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};
    use rand::rngs::OsRng;

    #[test]
    fn verifies_valid_signature() {
        let signing = SigningKey::generate(&mut OsRng);
        let key = KeyInfo::new(
            KeyAlgorithm::Ed25519,
            signing.verifying_key().to_bytes().to_vec(),
        );
        let sig = signing.sign(b"payload");

        let verifier = Ed25519Verifier;
        assert!(verifier.verify(&key, b"payload", &sig.to_bytes()));
        assert!(!verifier.verify(&key, b"other", &sig.to_bytes()));
    }

    #[test]
    fn malformed_input_fails_cleanly() {
        let verifier = Ed25519Verifier;
        let short_key = KeyInfo::new(KeyAlgorithm::Ed25519, vec![1, 2, 3]);
        assert!(!verifier.verify(&short_key, b"payload", &[0u8; 64]));

        let signing = SigningKey::generate(&mut OsRng);
        let key = KeyInfo::new(
            KeyAlgorithm::Ed25519,
            signing.verifying_key().to_bytes().to_vec(),
        );
        assert!(!verifier.verify(&key, b"payload", &[0u8; 10]));
    }

    #[test]
    fn wrong_algorithm_fails() {
        let signing = SigningKey::generate(&mut OsRng);
        let key = KeyInfo::new(
            KeyAlgorithm::EcdsaP256,
            signing.verifying_key().to_bytes().to_vec(),
        );
        let sig = signing.sign(b"payload");
        assert!(!Ed25519Verifier.verify(&key, b"payload", &sig.to_bytes()));
    }
}
