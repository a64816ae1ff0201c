//! Startup credential state.
//!
//! A [`CredentialContext`] is built once, before any license request, and is
//! read-only afterwards. Share it behind an `Arc`; nothing in it is mutated
//! after construction, so concurrent acquisitions need no locking.
use std::path::Path;
use std::sync::Arc;

use crate::capability::{resolve, Capability, CapabilityGap, Scheme};
use crate::cdm::{PlayReadyCdm, PlayReadyDeviceLoader};
use crate::config::Config;
use crate::device::WidevineCredentials;
use crate::error::{Error, Result};
use crate::scanner::{scan, PlayReadyDevice, ScanResult};

/// Loaded credentials plus the capability derived from them.
#[derive(Debug, Clone, Default)]
pub struct CredentialContext {
    widevine: Option<WidevineCredentials>,
    playready: Option<PlayReadyDevice>,
    capability: Capability,
    gap: Option<CapabilityGap>,
}

impl CredentialContext {
    /// Scan the configured working directory.
    pub fn from_config(config: &Config, loader: &dyn PlayReadyDeviceLoader) -> Self {
        Self::load(&config.working_dir, loader)
    }

    /// Scan `working_dir`; any scan failure yields an empty context.
    pub fn load(working_dir: &Path, loader: &dyn PlayReadyDeviceLoader) -> Self {
        match scan(working_dir, loader) {
            Ok(result) => Self::from_scan(result),
            Err(e) => {
                error!("Credential scan failed, decryption disabled: {}", e);
                Self::empty()
            }
        }
    }

    /// Resolve the capability of an existing scan result.
    pub fn from_scan(result: ScanResult) -> Self {
        let resolution = resolve(&result);
        if let Some(gap) = resolution.gap {
            warn!("{}", gap);
        }
        match resolution.capability.scheme {
            Some(scheme) => info!("Using {} CDM", scheme),
            None => debug!("No usable CDM provisioned"),
        }

        let widevine = match (result.private_key, result.client_id) {
            (Some(key), Some(client_id)) => WidevineCredentials::new(key.data, client_id.data),
            _ => None,
        };

        Self {
            widevine,
            playready: result.playready,
            capability: resolution.capability,
            gap: resolution.gap,
        }
    }

    /// Nothing provisioned; every acquisition returns no keys.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn active_scheme(&self) -> Option<Scheme> {
        self.capability.scheme
    }

    pub fn can_decrypt(&self) -> bool {
        self.capability.can_decrypt
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    /// Widevine credentials, if Widevine requests may be made.
    pub fn widevine(&self) -> Result<&WidevineCredentials> {
        match (&self.widevine, self.gap) {
            (Some(credentials), _) if self.can_decrypt() => Ok(credentials),
            (_, Some(gap)) => Err(Error::CapabilityGap(gap)),
            _ => Err(Error::Provisioning("Widevine is not provisioned".to_string())),
        }
    }

    /// PlayReady CDM, if PlayReady requests may be made.
    ///
    /// Available even when Widevine is the active scheme.
    pub fn playready(&self) -> Result<&Arc<dyn PlayReadyCdm>> {
        match &self.playready {
            Some(device) if self.can_decrypt() => Ok(&device.cdm),
            _ => Err(Error::Provisioning("PlayReady is not provisioned".to_string())),
        }
    }
}
