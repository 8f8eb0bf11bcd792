//! ButterflyFx Identity Kernel
//!
//! Deterministic substrate identities with lens projection, XOR delta
//! algebra, and dimensional promotion.
//!
//! # Core Concepts
//!
//! - [`SubstrateId`]: immutable 64-bit identity of a canonical encoding
//! - [`Substrate`]: a value bound to its identity at construction
//! - [`Lens`]: named, deterministic projection over structured values
//! - [`Delta`]: XOR change mask (self-inverse, composable, weighted)
//! - [`promote`]/[`demote`]: bijective lift between dimensional levels
//! - [`ExpansionStream`]: reproducible derived-data stream per identity
//!
//! # Example
//!
//! ```rust
//! use bfx_kernel::{Substrate, FieldLens, promote, demote};
//!
//! let substrate = Substrate::from_bytes(br#"{"city": "Berlin"}"#).unwrap();
//! let lens = FieldLens::new("city".parse().unwrap());
//! assert_eq!(substrate.view(&lens).unwrap(), "Berlin");
//!
//! let lifted = promote(substrate.id());
//! assert_eq!(demote(lifted), substrate.id());
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

// Core modules
mod delta;
mod dimension;
mod expand;
mod identity;
mod lens;
mod path;
mod substrate;

// Re-exports
pub use delta::{rebase, xor_bytes, Delta, DeltaError};
pub use dimension::{demote, lift, promote, Dimension, DimensionError};
pub use expand::{expand, ExpansionStream};
pub use identity::{fnv1a64, IdentityAlgo, IdentityError, SubstrateId, FNV_OFFSET, FNV_PRIME};
pub use lens::{
    ChainLens, FieldLens, IdentityLens, IndexLens, Lens, LensError, LensRegistry,
};
pub use path::{LensPath, PathError};
pub use substrate::Substrate;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
