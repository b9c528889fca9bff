//! Unified error type for the permission core
//!
//! Every public operation reports failure through [`PermissionError`]. The
//! variants correspond to the stable error names surfaced to administrative
//! callers over the transport; [`PermissionError::error_name`] returns that
//! name for the variants that have one.

use serde::{Deserialize, Serialize};

/// Result alias used throughout the permission core
pub type PermissionResult<T> = Result<T, PermissionError>;

/// Unified error for all permission-core operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum PermissionError {
    /// The caller is not authorized for the operation
    #[error("Permission denied: {message}")]
    PermissionDenied {
        /// What was denied
        message: String,
    },

    /// A certificate or certificate chain failed validation
    #[error("Invalid certificate: {message}")]
    InvalidCertificate {
        /// Why validation failed
        message: String,
    },

    /// A certificate's extended key usage does not permit this role
    #[error("Invalid certificate usage: {message}")]
    InvalidCertificateUsage {
        /// Which usage was expected
        message: String,
    },

    /// A manifest digest does not match the digest bound to the identity
    #[error("Digest mismatch: {message}")]
    DigestMismatch {
        /// Context for the mismatch
        message: String,
    },

    /// A policy install carried a version not newer than the current one
    #[error("Policy not newer: proposed version {proposed} <= current version {current}")]
    PolicyNotNewer {
        /// Version offered by the caller
        proposed: u32,
        /// Version currently installed
        current: u32,
    },

    /// The certificate is already installed
    #[error("Duplicate certificate: {message}")]
    DuplicateCertificate {
        /// Which certificate was duplicated
        message: String,
    },

    /// The requested certificate is not installed
    #[error("Certificate not found: {message}")]
    CertificateNotFound {
        /// Which certificate was requested
        message: String,
    },

    /// StartManagement was called while a session was already started
    #[error("Management session already started")]
    ManagementAlreadyStarted,

    /// EndManagement was called without a matching StartManagement
    #[error("Management session not started")]
    ManagementNotStarted,

    /// The requested application-state transition is not allowed
    #[error("Invalid application state transition: {message}")]
    InvalidApplicationState {
        /// Which transition was rejected
        message: String,
    },

    /// A requested record does not exist
    #[error("Not found: {message}")]
    NotFound {
        /// What was missing
        message: String,
    },

    /// A persistence operation failed
    #[error("Storage error: {message}")]
    Storage {
        /// Underlying storage failure
        message: String,
    },

    /// Encoding or decoding a persisted or wire record failed
    #[error("Serialization error: {message}")]
    Serialization {
        /// Underlying codec failure
        message: String,
    },

    /// Claim rollback failed; the device is in an unknown state
    ///
    /// The strongest severity in the taxonomy. The device may hold some but
    /// not all of {trust anchors, identity, manifests}. The administrative
    /// caller must recover manually (re-claim or factory reset); the core
    /// never retries on its own.
    #[error("Unknown state: claim failed ({claim_failure}) and rollback also failed ({reset_failure})")]
    UnknownState {
        /// Why the claim failed
        claim_failure: String,
        /// Why the subsequent rollback failed
        reset_failure: String,
    },
}

impl PermissionError {
    /// Create a permission-denied error
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied {
            message: message.into(),
        }
    }

    /// Create an invalid-certificate error
    pub fn invalid_certificate(message: impl Into<String>) -> Self {
        Self::InvalidCertificate {
            message: message.into(),
        }
    }

    /// Create an invalid-certificate-usage error
    pub fn invalid_certificate_usage(message: impl Into<String>) -> Self {
        Self::InvalidCertificateUsage {
            message: message.into(),
        }
    }

    /// Create a digest-mismatch error
    pub fn digest_mismatch(message: impl Into<String>) -> Self {
        Self::DigestMismatch {
            message: message.into(),
        }
    }

    /// Create a duplicate-certificate error
    pub fn duplicate_certificate(message: impl Into<String>) -> Self {
        Self::DuplicateCertificate {
            message: message.into(),
        }
    }

    /// Create a certificate-not-found error
    pub fn certificate_not_found(message: impl Into<String>) -> Self {
        Self::CertificateNotFound {
            message: message.into(),
        }
    }

    /// Create an invalid-application-state error
    pub fn invalid_application_state(message: impl Into<String>) -> Self {
        Self::InvalidApplicationState {
            message: message.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Stable identifier surfaced to transport callers, when one exists
    pub fn error_name(&self) -> Option<&'static str> {
        match self {
            Self::PermissionDenied { .. } => Some("PERMISSION_DENIED"),
            Self::InvalidCertificate { .. } => Some("INVALID_CERTIFICATE"),
            Self::InvalidCertificateUsage { .. } => Some("INVALID_CERTIFICATE_USAGE"),
            Self::DigestMismatch { .. } => Some("DIGEST_MISMATCH"),
            Self::PolicyNotNewer { .. } => Some("POLICY_NOT_NEWER"),
            Self::DuplicateCertificate { .. } => Some("DUPLICATE_CERTIFICATE"),
            Self::CertificateNotFound { .. } => Some("CERTIFICATE_NOT_FOUND"),
            Self::ManagementAlreadyStarted => Some("MANAGEMENT_ALREADY_STARTED"),
            Self::ManagementNotStarted => Some("MANAGEMENT_NOT_STARTED"),
            _ => None,
        }
    }

    /// Whether this error requires manual recovery by the caller
    pub fn is_unknown_state(&self) -> bool {
        matches!(self, Self::UnknownState { .. })
    }
}
