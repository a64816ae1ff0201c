//! rscdm - DRM license acquisition for Widevine and PlayReady.
//!
//! This crate provides:
//! - Discovery of provisioned device credentials in a working directory.
//! - Selection of the active scheme from what was found.
//! - PSSH parsing, including PlayReady WRM headers.
//! - License requests against caller-supplied license servers.
//!
//! Scheme cryptography plugs in through the traits in [`cdm`].
//!
//! Feature flags:
//! - `cli`: build the `rscdm` binary.
//! - `tracing`: emit log events through `tracing` (default).
#![allow(clippy::result_large_err)]

#[macro_use]
mod macros;

/// Scheme selection from scan results.
pub mod capability;
/// Scheme session traits and the license session enum.
pub mod cdm;
/// YAML runtime configuration.
pub mod config;
/// Loaded credentials shared by license requests.
pub mod context;
/// Credential file classification.
pub mod device;
/// Common error types and Result alias.
pub mod error;
/// Key acquisition against license servers.
pub mod exchange;
/// Content key representation.
pub mod key;
/// PSSH parsing and PlayReady header extraction.
pub mod pssh;
/// Failed request diagnostics.
pub mod report;
/// Working directory scan.
pub mod scanner;
/// HTTP transport for license requests.
pub mod transport;
/// Shared helper utilities.
pub mod utils;

#[cfg(test)]
mod testing;

pub use capability::{Capability, CapabilityGap, Scheme};
pub use config::Config;
pub use context::CredentialContext;
pub use error::{Error, Result};
pub use exchange::{AuthHeaders, LicenseClient};
pub use key::KeyEntry;
