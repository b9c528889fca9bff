//! Application lifecycle state
//!
//! A device advertises one of four lifecycle states. The wire encoding is a
//! single byte matching the discriminants below.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of the application with respect to claiming
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ApplicationState {
    /// Not claimed and not accepting claim requests
    NotClaimable = 0,
    /// Not claimed and accepting claim requests
    Claimable = 1,
    /// Claimed and configurable
    Claimed = 2,
    /// Claimed but requires a configuration update
    NeedUpdate = 3,
}

impl ApplicationState {
    /// Whether a transition from `self` to `next` is allowed without a Reset
    ///
    /// Once `Claimed`, the state may only move to `NeedUpdate` (or stay).
    /// Moving back to `Claimable`/`NotClaimable` requires an explicit Reset,
    /// which bypasses this check.
    pub fn can_transition_to(self, next: ApplicationState) -> bool {
        match self {
            Self::NotClaimable | Self::Claimable => true,
            Self::Claimed | Self::NeedUpdate => {
                matches!(next, Self::Claimed | Self::NeedUpdate)
            }
        }
    }

    /// Whether the device is currently claimed
    pub fn is_claimed(self) -> bool {
        matches!(self, Self::Claimed | Self::NeedUpdate)
    }

    /// Decode from the single-byte wire value
    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::NotClaimable),
            1 => Some(Self::Claimable),
            2 => Some(Self::Claimed),
            3 => Some(Self::NeedUpdate),
            _ => None,
        }
    }

    /// The single-byte wire value
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

impl Default for ApplicationState {
    fn default() -> Self {
        Self::NotClaimable
    }
}

impl fmt::Display for ApplicationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotClaimable => "not-claimable",
            Self::Claimable => "claimable",
            Self::Claimed => "claimed",
            Self::NeedUpdate => "need-update",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claimed_cannot_revert_without_reset() {
        assert!(!ApplicationState::Claimed.can_transition_to(ApplicationState::Claimable));
        assert!(!ApplicationState::Claimed.can_transition_to(ApplicationState::NotClaimable));
        assert!(ApplicationState::Claimed.can_transition_to(ApplicationState::NeedUpdate));
        assert!(ApplicationState::NeedUpdate.can_transition_to(ApplicationState::Claimed));
    }

    #[test]
    fn unclaimed_states_move_freely() {
        assert!(ApplicationState::NotClaimable.can_transition_to(ApplicationState::Claimable));
        assert!(ApplicationState::Claimable.can_transition_to(ApplicationState::Claimed));
        assert!(ApplicationState::Claimable.can_transition_to(ApplicationState::NotClaimable));
    }

    #[test]
    fn byte_encoding_roundtrips() {
        for value in 0u8..4 {
            let state = ApplicationState::from_byte(value).unwrap();
            assert_eq!(state.as_byte(), value);
        }
        assert!(ApplicationState::from_byte(4).is_none());
    }
}
