//! Core identifier types used across the Lattice permission core
//!
//! Security groups and peers are identified by 128-bit values carried as
//! UUID newtypes so they cannot be confused with one another at call sites.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a security group
///
/// A trust anchor with security-group-authority use carries the id of the
/// group it is authoritative for. Certificate-authority anchors carry the
/// nil id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SecurityGroupId(pub Uuid);

impl SecurityGroupId {
    /// Create a new random security group id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The nil id, used for anchors that are not group authorities
    pub fn nil() -> Self {
        Self(Uuid::nil())
    }

    /// Whether this is the nil id
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    /// Create from a UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SecurityGroupId {
    fn default() -> Self {
        Self::nil()
    }
}

impl fmt::Display for SecurityGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group-{}", self.0)
    }
}

impl From<Uuid> for SecurityGroupId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<SecurityGroupId> for Uuid {
    fn from(id: SecurityGroupId) -> Self {
        id.0
    }
}

/// Authentication GUID of a connected peer
///
/// Assigned by the transport during session establishment; the membership
/// exchange protocol keys its per-peer progress on this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerGuid(pub Uuid);

impl PeerGuid {
    /// Create a new random peer GUID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from a UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for PeerGuid {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PeerGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

impl From<Uuid> for PeerGuid {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nil_group_id_is_nil() {
        assert!(SecurityGroupId::nil().is_nil());
        assert!(!SecurityGroupId::new().is_nil());
    }

    #[test]
    fn peer_guids_are_unique() {
        assert_ne!(PeerGuid::new(), PeerGuid::new());
    }

    #[test]
    fn group_id_roundtrips_through_serde() {
        let id = SecurityGroupId::new();
        let bytes = serde_cbor::to_vec(&id).unwrap();
        let back: SecurityGroupId = serde_cbor::from_slice(&bytes).unwrap();
        assert_eq!(id, back);
    }
}
