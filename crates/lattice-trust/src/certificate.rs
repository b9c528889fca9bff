//! Certificate model and chain parsing
//!
//! Certificates here are the parsed form the permission core works with:
//! subject/issuer linkage fields, a validity window, an extended-usage tag,
//! and the signature over the to-be-signed body. Raw signature math is
//! delegated to the [`crate::verifier::SignatureVerifier`] collaborator.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use lattice_core::{Digest32, SecurityGroupId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Errors from parsing certificates, distinct from validation failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CertificateError {
    /// Input could not be parsed into a certificate chain
    #[error("Certificate parse error: {message}")]
    Parse {
        /// Why parsing failed
        message: String,
    },

    /// A chain must contain at least one certificate
    #[error("Empty certificate chain")]
    EmptyChain,
}

impl CertificateError {
    /// Create a parse error
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }
}

/// Algorithm tag for a public key descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyAlgorithm {
    /// NIST P-256 ECDSA
    EcdsaP256,
    /// Ed25519
    Ed25519,
}

/// Public key descriptor: algorithm, key identifier, and raw key bytes
///
/// The key identifier is the subject key identifier (SKI) of certificates
/// carrying this key; issuer linkage compares it against a certificate's
/// authority key identifier (AKI).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyInfo {
    /// Signature algorithm of the key
    pub algorithm: KeyAlgorithm,
    /// Key identifier (SKI) bytes
    pub key_id: Vec<u8>,
    /// Raw public key bytes, interpretation delegated to the verifier
    pub public_key: Vec<u8>,
}

impl KeyInfo {
    /// Construct a descriptor, deriving the key id from the key bytes
    pub fn new(algorithm: KeyAlgorithm, public_key: Vec<u8>) -> Self {
        let key_id = lattice_core::sha256(&public_key).as_bytes()[..20].to_vec();
        Self {
            algorithm,
            key_id,
            public_key,
        }
    }
}

impl fmt::Display for KeyInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "key:{}", hex::encode(&self.key_id))
    }
}

/// Extended key usage of a certificate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CertificateUsage {
    /// Identity certificate
    Identity,
    /// Security-group membership certificate
    Membership,
    /// No usage restriction (intermediate/root certificates)
    Unrestricted,
}

impl CertificateUsage {
    /// Whether a certificate with this usage may serve in `role`
    pub fn permits(self, role: CertificateUsage) -> bool {
        self == CertificateUsage::Unrestricted || self == role
    }
}

/// Validity window in seconds since the Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validity {
    /// Earliest valid instant
    pub not_before: u64,
    /// Latest valid instant
    pub not_after: u64,
}

impl Validity {
    /// Whether `now` falls inside the window
    pub fn contains(&self, now: u64) -> bool {
        self.not_before <= now && now <= self.not_after
    }
}

/// A parsed certificate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    /// Serial number assigned by the issuer
    pub serial: String,
    /// Subject common name
    pub subject_cn: String,
    /// Subject public key; its `key_id` is this certificate's SKI
    pub subject_key: KeyInfo,
    /// Issuer common name
    pub issuer_cn: String,
    /// Authority key identifier linking to the issuer's key
    pub issuer_key_id: Vec<u8>,
    /// Validity window
    pub validity: Validity,
    /// Extended key usage
    pub usage: CertificateUsage,
    /// Security group, nil unless this is a membership certificate
    pub security_group_id: SecurityGroupId,
    /// Manifest digest bound to the identity this certificate names
    pub manifest_digest: Option<Digest32>,
    /// Signature over the to-be-signed body, produced by the issuer
    pub signature: Vec<u8>,
}

/// The to-be-signed view of a certificate, hashed and signed by the issuer
#[derive(Serialize)]
struct TbsCertificate<'a> {
    serial: &'a str,
    subject_cn: &'a str,
    subject_key: &'a KeyInfo,
    issuer_cn: &'a str,
    issuer_key_id: &'a [u8],
    validity: &'a Validity,
    usage: &'a CertificateUsage,
    security_group_id: &'a SecurityGroupId,
    manifest_digest: &'a Option<Digest32>,
}

impl Certificate {
    /// Canonical encoding of the to-be-signed body
    pub fn tbs_bytes(&self) -> Result<Vec<u8>, CertificateError> {
        let tbs = TbsCertificate {
            serial: &self.serial,
            subject_cn: &self.subject_cn,
            subject_key: &self.subject_key,
            issuer_cn: &self.issuer_cn,
            issuer_key_id: &self.issuer_key_id,
            validity: &self.validity,
            usage: &self.usage,
            security_group_id: &self.security_group_id,
            manifest_digest: &self.manifest_digest,
        };
        serde_cbor::to_vec(&tbs).map_err(|e| CertificateError::parse(e.to_string()))
    }

    /// Whether this certificate is self-signed (AKI equals own SKI)
    pub fn is_self_signed(&self) -> bool {
        self.issuer_key_id == self.subject_key.key_id
    }
}

/// An ordered certificate chain, leaf first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateChain(Vec<Certificate>);

const PEM_HEADER: &str = "-----BEGIN LATTICE CERTIFICATE-----";
const PEM_FOOTER: &str = "-----END LATTICE CERTIFICATE-----";

impl CertificateChain {
    /// Build a chain from leaf-first certificates
    pub fn new(certs: Vec<Certificate>) -> Result<Self, CertificateError> {
        if certs.is_empty() {
            return Err(CertificateError::EmptyChain);
        }
        Ok(Self(certs))
    }

    /// The leaf certificate
    pub fn leaf(&self) -> &Certificate {
        // Construction guarantees at least one certificate
        &self.0[0]
    }

    /// The terminal (root-most) certificate
    pub fn root(&self) -> &Certificate {
        &self.0[self.0.len() - 1]
    }

    /// All certificates, leaf first
    pub fn certs(&self) -> &[Certificate] {
        &self.0
    }

    /// Number of certificates in the chain
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Chains are never empty; present for API completeness
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse a chain from PEM-armored text
    ///
    /// Each block is the base64 of one CBOR-encoded certificate; blocks are
    /// ordered leaf first. Returns a parse error (not a validation result)
    /// on malformed input.
    pub fn from_pem(pem: &str) -> Result<Self, CertificateError> {
        let mut certs = Vec::new();
        let mut body: Option<String> = None;
        for line in pem.lines() {
            let line = line.trim();
            if line == PEM_HEADER {
                if body.is_some() {
                    return Err(CertificateError::parse("nested PEM header"));
                }
                body = Some(String::new());
            } else if line == PEM_FOOTER {
                let b64 = body
                    .take()
                    .ok_or_else(|| CertificateError::parse("footer without header"))?;
                let bytes = BASE64
                    .decode(b64.as_bytes())
                    .map_err(|e| CertificateError::parse(e.to_string()))?;
                let cert: Certificate = serde_cbor::from_slice(&bytes)
                    .map_err(|e| CertificateError::parse(e.to_string()))?;
                certs.push(cert);
            } else if let Some(ref mut b) = body {
                b.push_str(line);
            }
        }
        if body.is_some() {
            return Err(CertificateError::parse("unterminated PEM block"));
        }
        Self::new(certs)
    }

    /// Render the chain as PEM-armored text
    pub fn to_pem(&self) -> Result<String, CertificateError> {
        let mut out = String::new();
        for cert in &self.0 {
            let bytes =
                serde_cbor::to_vec(cert).map_err(|e| CertificateError::parse(e.to_string()))?;
            out.push_str(PEM_HEADER);
            out.push('\n');
            let encoded = BASE64.encode(&bytes);
            for chunk in encoded.as_bytes().chunks(64) {
                out.push_str(&String::from_utf8_lossy(chunk));
                out.push('\n');
            }
            out.push_str(PEM_FOOTER);
            out.push('\n');
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_cert(serial: &str) -> Certificate {
        Certificate {
            serial: serial.to_string(),
            subject_cn: "device".into(),
            subject_key: KeyInfo::new(KeyAlgorithm::Ed25519, vec![1, 2, 3]),
            issuer_cn: "ca".into(),
            issuer_key_id: vec![9, 9],
            validity: Validity {
                not_before: 0,
                not_after: u64::MAX,
            },
            usage: CertificateUsage::Identity,
            security_group_id: SecurityGroupId::nil(),
            manifest_digest: None,
            signature: vec![0; 64],
        }
    }

    #[test]
    fn empty_chain_rejected() {
        assert_eq!(
            CertificateChain::new(vec![]),
            Err(CertificateError::EmptyChain)
        );
    }

    #[test]
    fn pem_roundtrip() {
        let chain =
            CertificateChain::new(vec![dummy_cert("1"), dummy_cert("2")]).unwrap();
        let pem = chain.to_pem().unwrap();
        let parsed = CertificateChain::from_pem(&pem).unwrap();
        assert_eq!(chain, parsed);
    }

    #[test]
    fn malformed_pem_is_a_parse_error() {
        assert!(matches!(
            CertificateChain::from_pem("-----BEGIN LATTICE CERTIFICATE-----\n!!!\n-----END LATTICE CERTIFICATE-----\n"),
            Err(CertificateError::Parse { .. })
        ));
        assert!(matches!(
            CertificateChain::from_pem("no pem here"),
            Err(CertificateError::EmptyChain)
        ));
    }

    #[test]
    fn usage_permits() {
        assert!(CertificateUsage::Unrestricted.permits(CertificateUsage::Identity));
        assert!(CertificateUsage::Identity.permits(CertificateUsage::Identity));
        assert!(!CertificateUsage::Membership.permits(CertificateUsage::Identity));
    }

    #[test]
    fn validity_window() {
        let v = Validity {
            not_before: 10,
            not_after: 20,
        };
        assert!(!v.contains(9));
        assert!(v.contains(10));
        assert!(v.contains(20));
        assert!(!v.contains(21));
    }
}
