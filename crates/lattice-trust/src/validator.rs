//! Certificate chain validation
//!
//! Validates chain structure and trust closure; per-link signature math is
//! delegated to the injected [`SignatureVerifier`]. Validation never
//! panics and never returns an error for bad chains: any structural
//! break, expired certificate, or missing trust closure is simply
//! `false`. Only the PEM variant can fail, and only for unparseable
//! input.

use crate::anchors::TrustAnchorStore;
use crate::certificate::{CertificateChain, CertificateError};
use crate::verifier::SignatureVerifier;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// What a validation pass should enforce
#[derive(Debug, Clone, Copy)]
pub struct ValidationOptions {
    /// Check issuer-name linkage between adjacent certificates
    pub verify_issuer_chain: bool,
    /// Require the terminal certificate's key to be a trust anchor
    pub validate_trust: bool,
    /// Check AKI against the issuer's SKI on every link
    pub enforce_aki: bool,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            verify_issuer_chain: true,
            validate_trust: true,
            enforce_aki: true,
        }
    }
}

impl ValidationOptions {
    /// Structure-only validation, for unauthenticated discovery
    pub fn structure_only() -> Self {
        Self {
            verify_issuer_chain: true,
            validate_trust: false,
            enforce_aki: true,
        }
    }
}

/// Seconds since the Unix epoch, saturating at zero on clock skew
fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Validates certificate chains against a trust-anchor store
pub struct ChainValidator<'a> {
    anchors: &'a TrustAnchorStore,
    verifier: &'a dyn SignatureVerifier,
}

impl<'a> ChainValidator<'a> {
    /// Create a validator over `anchors` using `verifier` for signatures
    pub fn new(anchors: &'a TrustAnchorStore, verifier: &'a dyn SignatureVerifier) -> Self {
        Self { anchors, verifier }
    }

    /// Validate `chain` at the current time
    pub fn validate(&self, chain: &CertificateChain, options: &ValidationOptions) -> bool {
        self.validate_at(chain, options, unix_now())
    }

    /// Validate `chain` as of `now` (seconds since the Unix epoch)
    pub fn validate_at(
        &self,
        chain: &CertificateChain,
        options: &ValidationOptions,
        now: u64,
    ) -> bool {
        let certs = chain.certs();
        if certs.is_empty() {
            return false;
        }

        for (index, cert) in certs.iter().enumerate() {
            if !cert.validity.contains(now) {
                debug!(serial = %cert.serial, "certificate outside validity window");
                return false;
            }

            let issuer = certs.get(index + 1);
            match issuer {
                Some(issuer) => {
                    if options.verify_issuer_chain && cert.issuer_cn != issuer.subject_cn {
                        debug!(serial = %cert.serial, "issuer name mismatch");
                        return false;
                    }
                    if options.enforce_aki && cert.issuer_key_id != issuer.subject_key.key_id {
                        debug!(serial = %cert.serial, "authority key identifier mismatch");
                        return false;
                    }
                    if !self.verify_link(cert, &issuer.subject_key) {
                        debug!(serial = %cert.serial, "link signature invalid");
                        return false;
                    }
                }
                None => {
                    // Terminal certificate. A self-signed root must carry a
                    // valid self-signature; a root issued by an off-chain
                    // authority closes the chain through the trust anchor.
                    if cert.is_self_signed() && !self.verify_link(cert, &cert.subject_key) {
                        debug!(serial = %cert.serial, "root self-signature invalid");
                        return false;
                    }
                    if options.validate_trust
                        && !self.anchors.is_trust_anchor(&cert.subject_key.public_key)
                    {
                        debug!(serial = %cert.serial, "no trust closure for chain root");
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Parse a PEM chain and validate it
    ///
    /// Parse failure is an `Err`; a chain that parses but does not
    /// validate is `Ok(false)`.
    pub fn validate_pem(
        &self,
        pem: &str,
        options: &ValidationOptions,
    ) -> Result<bool, CertificateError> {
        let chain = CertificateChain::from_pem(pem)?;
        Ok(self.validate(&chain, options))
    }

    fn verify_link(
        &self,
        cert: &crate::certificate::Certificate,
        issuer_key: &crate::certificate::KeyInfo,
    ) -> bool {
        let Ok(tbs) = cert.tbs_bytes() else {
            return false;
        };
        self.verifier.verify(issuer_key, &tbs, &cert.signature)
    }
}
