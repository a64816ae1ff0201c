//! Error types for rscdm.
//!
//! Every variant is recoverable: the acquisition operations in
//! [`crate::exchange`] turn any of them into a diagnostic and an empty key list.

use thiserror::Error;

use crate::capability::CapabilityGap;
use crate::transport::TransportFailure;

/// Main error type for rscdm operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A credential file is malformed, oversized or unreadable.
    #[error("Provisioning error: {0}")]
    Provisioning(String),

    /// Only one half of the Widevine credential pair is provisioned.
    #[error("Capability gap: {0}")]
    CapabilityGap(CapabilityGap),

    /// The license request did not complete with a 2xx response.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportFailure),

    /// The license server answered with something that is not a license.
    #[error("Response parse error: {0}")]
    ResponseParse(String),

    /// The PSSH / init data is invalid or empty.
    #[error("Invalid init data: {0}")]
    InvalidInitData(String),

    /// PKCS#1 private key error.
    #[error("PKCS1 error: {0}")]
    Pkcs1Error(#[from] rsa::pkcs1::Error),

    /// PKCS#8 private key error.
    #[error("PKCS8 error: {0}")]
    Pkcs8Error(#[from] rsa::pkcs8::Error),

    /// Base64 decode error.
    #[error("Base64 decode error: {0}")]
    Base64DecodeError(#[from] base64::DecodeError),

    /// JSON decode error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// YAML configuration error.
    #[error("Config error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// HTTP client construction error.
    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Generic error.
    #[error("{0}")]
    Other(String),
}

/// Result type alias for rscdm operations.
pub type Result<T> = std::result::Result<T, Error>;
