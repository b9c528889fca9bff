//! Store errors

use lattice_core::PermissionError;

/// Result alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Error raised by the persistence seam
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The underlying key-value store failed
    #[error("Backend error: {message}")]
    Backend {
        /// What the backend reported
        message: String,
    },

    /// A record could not be encoded or decoded
    #[error("Codec error: {message}")]
    Codec {
        /// What the codec reported
        message: String,
    },
}

impl StoreError {
    /// Create a backend error
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Create a codec error
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }
}

impl From<StoreError> for PermissionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Backend { message } => PermissionError::storage(message),
            StoreError::Codec { message } => PermissionError::serialization(message),
        }
    }
}
