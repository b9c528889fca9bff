//! Persisted claim configuration
//!
//! The single persisted root describing claim policy and lifecycle
//! state. Claim capabilities advertise which key-exchange suites the
//! device accepts for the claim operation.

use lattice_core::ApplicationState;
use serde::{Deserialize, Serialize};

/// Claiming is accepted over ECDHE_NULL
pub const CLAIM_CAPABILITY_ECDHE_NULL: u16 = 0x1;
/// Claiming is accepted over ECDHE_PSK
pub const CLAIM_CAPABILITY_ECDHE_PSK: u16 = 0x2;
/// Claiming is accepted over ECDHE_ECDSA
pub const CLAIM_CAPABILITY_ECDHE_ECDSA: u16 = 0x4;
/// Default claim capabilities
pub const CLAIM_CAPABILITIES_DEFAULT: u16 =
    CLAIM_CAPABILITY_ECDHE_NULL | CLAIM_CAPABILITY_ECDHE_PSK | CLAIM_CAPABILITY_ECDHE_ECDSA;

/// Additional info: the PSK is generated by the security manager
pub const CLAIM_PSK_GENERATED_BY_MANAGER: u16 = 0x1;
/// Additional info: the PSK is generated by the device
pub const CLAIM_PSK_GENERATED_BY_DEVICE: u16 = 0x2;

/// Version tag of the configuration record layout
pub const CONFIGURATION_VERSION: u8 = 1;

/// The persisted configuration record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    /// Record layout version
    pub version: u8,
    /// Whether an application state was ever explicitly set
    pub application_state_set: bool,
    /// Persisted lifecycle state
    pub application_state: ApplicationState,
    /// Bitmask of CLAIM_CAPABILITY_* values
    pub claim_capabilities: u16,
    /// Bitmask of CLAIM_PSK_* values
    pub claim_capability_additional_info: u16,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            version: CONFIGURATION_VERSION,
            application_state_set: false,
            application_state: ApplicationState::NotClaimable,
            claim_capabilities: CLAIM_CAPABILITIES_DEFAULT,
            claim_capability_additional_info: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_configuration() {
        let config = Configuration::default();
        assert_eq!(config.version, 1);
        assert!(!config.application_state_set);
        assert_eq!(config.application_state, ApplicationState::NotClaimable);
        assert_eq!(config.claim_capabilities, CLAIM_CAPABILITIES_DEFAULT);
        assert_eq!(config.claim_capability_additional_info, 0);
    }

    #[test]
    fn capability_bits_are_distinct() {
        assert_eq!(CLAIM_CAPABILITY_ECDHE_NULL & CLAIM_CAPABILITY_ECDHE_PSK, 0);
        assert_eq!(CLAIM_CAPABILITY_ECDHE_PSK & CLAIM_CAPABILITY_ECDHE_ECDSA, 0);
        assert_eq!(
            CLAIM_PSK_GENERATED_BY_MANAGER & CLAIM_PSK_GENERATED_BY_DEVICE,
            0
        );
    }
}
