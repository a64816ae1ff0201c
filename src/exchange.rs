//! License acquisition.
//!
//! Each call walks `Idle -> RequestBuilt -> AwaitingResponse -> Parsed | Failed`
//! exactly once. Both acquisition operations are total: every failure is
//! reported through the log and turned into an empty key list, so a batch of
//! titles keeps going when one license fails. Retry policy and timeouts beyond
//! the configured transport timeout belong to the caller.
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

use crate::capability::Scheme;
use crate::cdm::{LicenseSession, WidevineCdm};
use crate::config::Config;
use crate::context::CredentialContext;
use crate::error::{Error, Result};
use crate::key::KeyEntry;
use crate::pssh::Pssh;
use crate::report::report_failure;
use crate::transport::Transport;
use crate::utils::decode_base64;

/// Caller-supplied request headers, usually carrying authentication.
pub type AuthHeaders = HashMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Idle,
    RequestBuilt,
    AwaitingResponse,
    Parsed,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Idle => "idle",
            Stage::RequestBuilt => "request built",
            Stage::AwaitingResponse => "awaiting response",
            Stage::Parsed => "parsed",
            Stage::Failed => "failed",
        })
    }
}

fn enter(scheme: Scheme, stage: Stage) {
    trace!("{} license exchange: {}", scheme, stage);
}

/// Widevine servers may wrap the license as `{"license": "<base64>"}`.
#[derive(Deserialize)]
struct LicenseEnvelope {
    license: String,
}

/// Drives license requests against caller-supplied license servers.
///
/// Cheap to share: the credential context is behind an `Arc` and the HTTP
/// client is reference counted.
#[derive(Clone)]
pub struct LicenseClient {
    context: Arc<CredentialContext>,
    widevine: Option<Arc<dyn WidevineCdm>>,
    transport: Transport,
}

impl LicenseClient {
    pub fn new(context: Arc<CredentialContext>, config: &Config) -> Result<Self> {
        Ok(Self {
            context,
            widevine: None,
            transport: Transport::new(config)?,
        })
    }

    /// Use `cdm` to open Widevine sessions.
    #[must_use]
    pub fn with_widevine_cdm(mut self, cdm: Arc<dyn WidevineCdm>) -> Self {
        self.widevine = Some(cdm);
        self
    }

    pub fn context(&self) -> &CredentialContext {
        &self.context
    }

    pub fn active_scheme(&self) -> Option<Scheme> {
        self.context.active_scheme()
    }

    pub fn can_decrypt(&self) -> bool {
        self.context.can_decrypt()
    }

    /// Request Widevine keys for a base64 PSSH.
    ///
    /// Returns no keys, without touching the network, when `pssh` is absent
    /// or Widevine is not usable.
    pub async fn acquire_widevine_keys(
        &self,
        pssh: Option<&str>,
        license_server: &str,
        auth_headers: &AuthHeaders,
    ) -> Vec<KeyEntry> {
        let Some(pssh) = pssh.filter(|p| !p.is_empty()) else {
            return Vec::new();
        };

        let credentials = match self.context.widevine() {
            Ok(credentials) => credentials,
            Err(e) => {
                debug!("Skipping Widevine license request: {}", e);
                return Vec::new();
            }
        };
        let Some(cdm) = self.widevine.as_deref() else {
            error!("Widevine credentials are loaded but no Widevine CDM is configured");
            return Vec::new();
        };

        let session = decode_base64(pssh)
            .and_then(|init_data| LicenseSession::widevine(cdm, credentials, &init_data));

        match session {
            Ok(session) => self.exchange(session, license_server, auth_headers).await,
            Err(e) => {
                error!("Failed to create Widevine session: {}", e);
                Vec::new()
            }
        }
    }

    /// Request PlayReady keys for a base64 PSSH.
    ///
    /// The first WRM header in the PSSH is used for the challenge.
    pub async fn acquire_playready_keys(
        &self,
        pssh: Option<&str>,
        license_server: &str,
        auth_headers: &AuthHeaders,
    ) -> Vec<KeyEntry> {
        let Some(pssh) = pssh.filter(|p| !p.is_empty()) else {
            return Vec::new();
        };

        let cdm = match self.context.playready() {
            Ok(cdm) => cdm.clone(),
            Err(e) => {
                debug!("Skipping PlayReady license request: {}", e);
                return Vec::new();
            }
        };

        let header = Pssh::from_base64(pssh)
            .and_then(|pssh| pssh.wrm_headers())
            .and_then(|headers| {
                headers.into_iter().next().ok_or_else(|| {
                    Error::InvalidInitData("PSSH carries no WRM header".to_string())
                })
            });

        match header {
            Ok(header) => {
                let session = LicenseSession::playready(cdm, header);
                self.exchange(session, license_server, auth_headers).await
            }
            Err(e) => {
                error!("Failed to read PlayReady header from PSSH: {}", e);
                Vec::new()
            }
        }
    }

    async fn exchange(
        &self,
        mut session: LicenseSession,
        license_server: &str,
        auth_headers: &AuthHeaders,
    ) -> Vec<KeyEntry> {
        let scheme = session.scheme();
        enter(scheme, Stage::Idle);

        let challenge = match session.challenge() {
            Ok(challenge) => challenge,
            Err(e) => {
                error!("Failed to create {} license challenge: {}", scheme, e);
                enter(scheme, Stage::Failed);
                return Vec::new();
            }
        };
        enter(scheme, Stage::RequestBuilt);

        enter(scheme, Stage::AwaitingResponse);
        let response = match self
            .transport
            .post(license_server, auth_headers, challenge.into_bytes())
            .await
        {
            Ok(body) if !body.is_empty() => body,
            Ok(_) => {
                error!("License request failed: empty response");
                enter(scheme, Stage::Failed);
                return Vec::new();
            }
            Err(failure) => {
                report_failure(&failure);
                error!("License request failed");
                enter(scheme, Stage::Failed);
                return Vec::new();
            }
        };

        let keys = match scheme {
            Scheme::Widevine => parse_widevine_license(&mut session, &response),
            Scheme::PlayReady => session.parse_license(&response),
        };

        match keys {
            Ok(keys) => {
                enter(scheme, Stage::Parsed);
                debug!("Received {} key(s) from {} license", keys.len(), scheme);
                keys
            }
            Err(e) => {
                error!("License parsing failed");
                debug!("{} license rejected: {}", scheme, e);
                enter(scheme, Stage::Failed);
                Vec::new()
            }
        }
    }
}

impl fmt::Debug for LicenseClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LicenseClient")
            .field("context", &self.context)
            .field("widevine", &self.widevine.is_some())
            .finish_non_exhaustive()
    }
}

/// Decode the JSON envelope, if the body is one.
fn license_from_envelope(body: &[u8]) -> Option<Vec<u8>> {
    let envelope: LicenseEnvelope = serde_json::from_slice(body).ok()?;
    decode_base64(&envelope.license).ok()
}

/// Parse a Widevine response, preferring the JSON envelope.
///
/// When the envelope does not decode, or its license is rejected, the raw
/// body is tried as the license message.
fn parse_widevine_license(session: &mut LicenseSession, body: &[u8]) -> Result<Vec<KeyEntry>> {
    if let Some(license) = license_from_envelope(body) {
        match session.parse_license(&license) {
            Ok(keys) => return Ok(keys),
            Err(e) => debug!("License in JSON envelope rejected, trying raw body: {}", e),
        }
    }
    session.parse_license(body)
}
