//! # Lattice Store
//!
//! Persistence seam for the permission core. The physical store is an
//! opaque get/put/delete abstraction ([`KeyValueStore`]); the
//! [`AclStore`] adapter on top of it maps each logical ACL entry kind to
//! a derived storage key and encodes records with CBOR.
//!
//! No application semantics live here: the adapter knows how to derive
//! keys and encode bytes, nothing about what a policy or certificate
//! means.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod acl;
pub mod error;
pub mod kv;

pub use acl::{AclEntryKind, AclStore, StoreKey};
pub use error::{StoreError, StoreResult};
pub use kv::{KeyValueStore, MemoryKeyStore};
