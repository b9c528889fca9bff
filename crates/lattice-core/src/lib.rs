//! # Lattice Core
//!
//! Foundation types shared across the Lattice permission core: identifier
//! newtypes, the unified permission error, the application lifecycle state,
//! and the SHA-256 digest helper.
//!
//! This crate has no dependency on storage or protocol crates; everything
//! here is a plain data type or a pure function.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod errors;
pub mod hash;
pub mod identifiers;
pub mod state;

pub use errors::{PermissionError, PermissionResult};
pub use hash::{sha256, Digest32};
pub use identifiers::{PeerGuid, SecurityGroupId};
pub use state::ApplicationState;
