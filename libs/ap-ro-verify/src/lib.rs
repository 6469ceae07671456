//! AP RO verification.
//!
//! Confirms that the read-only firmware region of the application processor
//! (AP) has not been modified before the AP is let out of reset. Two schemes
//! are supported:
//!
//! - V1: a digest over a list of flash ranges, seeded into the controller's
//!   own flash at the factory.
//! - V2: a signed verification blob (GVD) embedded in AP flash, authenticated
//!   through a key block signed by a root key whose hash is pinned at build
//!   time. A digest of a successfully verified blob is cached in the
//!   controller's flash so subsequent boots skip the signature chain.
//!
//! All AP flash contents are treated as hostile. Every structure read from the
//! AP is copied into controller-owned memory and decoded through bounds-checked
//! accessors before any field is used.
//!
//! Hardware access is abstracted by the traits in [`hal`], so the same code
//! runs inside the Xous service and in the hosted unit tests.
#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[cfg(target_endian = "big")]
compile_error!("on-flash layouts are decoded as little-endian");

extern crate alloc;

pub mod api;
pub use api::*;
pub mod cache;
pub mod chain;
pub mod commands;
pub mod config;
pub use config::VerifierConfig;
pub mod console;
pub mod enforce;
pub mod error;
pub use error::*;
pub mod formats;
pub mod hal;
pub mod hasher;
pub mod legacy;
pub mod record;
pub mod status;
pub use status::StatusHandle;
pub mod verifier;
pub use verifier::ApRoVerifier;

#[cfg(test)]
mod testing;
