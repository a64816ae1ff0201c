//! Scheme selection.
//!
//! The decision is a pure function of a [`ScanResult`]; rules are checked in
//! order and the first match wins:
//!
//! 1. complete Widevine pair: Widevine
//! 2. PlayReady device: PlayReady
//! 3. client id blob only: no scheme, "Private key missing"
//! 4. private key only: no scheme, "Identifier blob missing"
//! 5. nothing: no scheme
//!
//! Provisioning both schemes is legal; Widevine is preferred.
use std::fmt;

use crate::scanner::ScanResult;

/// A DRM scheme this crate can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Widevine,
    PlayReady,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Scheme::Widevine => "widevine",
            Scheme::PlayReady => "playready",
        })
    }
}

/// The resolved decryption capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capability {
    /// Active scheme, `None` when nothing usable is provisioned.
    pub scheme: Option<Scheme>,
    pub can_decrypt: bool,
}

/// Half of the Widevine pair is provisioned without the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityGap {
    PrivateKeyMissing,
    IdentifierBlobMissing,
}

impl fmt::Display for CapabilityGap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CapabilityGap::PrivateKeyMissing => "Private key missing",
            CapabilityGap::IdentifierBlobMissing => "Identifier blob missing",
        })
    }
}

/// Outcome of [`resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Resolution {
    pub capability: Capability,
    /// Set only when no scheme is usable because of a half-provisioned pair.
    pub gap: Option<CapabilityGap>,
}

/// Decide the active scheme for a scan result.
#[must_use]
pub fn resolve(scan: &ScanResult) -> Resolution {
    let has_key = scan.private_key.as_ref().is_some_and(|f| !f.data.is_empty());
    let has_client_id = scan.client_id.as_ref().is_some_and(|f| !f.data.is_empty());

    let usable = |scheme| Resolution {
        capability: Capability {
            scheme: Some(scheme),
            can_decrypt: true,
        },
        gap: None,
    };
    let unusable = |gap| Resolution {
        capability: Capability::default(),
        gap,
    };

    match (has_key, has_client_id, scan.playready.is_some()) {
        (true, true, _) => usable(Scheme::Widevine),
        (_, _, true) => usable(Scheme::PlayReady),
        (false, true, false) => unusable(Some(CapabilityGap::PrivateKeyMissing)),
        (true, false, false) => unusable(Some(CapabilityGap::IdentifierBlobMissing)),
        (false, false, false) => unusable(None),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use super::{resolve, CapabilityGap, Scheme};
    use crate::scanner::{FoundFile, PlayReadyDevice, ScanResult};
    use crate::testing::NullPlayReady;

    fn found(name: &str) -> Option<FoundFile> {
        Some(FoundFile {
            path: PathBuf::from(name),
            data: vec![1, 2, 3],
        })
    }

    fn device() -> Option<PlayReadyDevice> {
        Some(PlayReadyDevice {
            path: PathBuf::from("device.prd"),
            cdm: Arc::new(NullPlayReady),
        })
    }

    fn scan_of(key: bool, client_id: bool, playready: bool) -> ScanResult {
        ScanResult {
            private_key: key.then(|| found("device_private_key")).flatten(),
            client_id: client_id.then(|| found("device_client_id_blob")).flatten(),
            playready: playready.then(device).flatten(),
        }
    }

    #[test]
    fn precedence_table() {
        let cases = [
            ((true, true, true), Some(Scheme::Widevine), None),
            ((true, true, false), Some(Scheme::Widevine), None),
            ((true, false, true), Some(Scheme::PlayReady), None),
            ((false, true, true), Some(Scheme::PlayReady), None),
            ((false, false, true), Some(Scheme::PlayReady), None),
            ((false, true, false), None, Some(CapabilityGap::PrivateKeyMissing)),
            ((true, false, false), None, Some(CapabilityGap::IdentifierBlobMissing)),
            ((false, false, false), None, None),
        ];

        for ((key, client_id, playready), scheme, gap) in cases {
            let resolution = resolve(&scan_of(key, client_id, playready));
            assert_eq!(resolution.capability.scheme, scheme, "{key} {client_id} {playready}");
            assert_eq!(resolution.capability.can_decrypt, scheme.is_some());
            assert_eq!(resolution.gap, gap);
        }
    }

    #[test]
    fn empty_file_counts_as_absent() {
        let mut scan = scan_of(true, true, false);
        if let Some(ref mut file) = scan.client_id {
            file.data.clear();
        }
        let resolution = resolve(&scan);
        assert!(!resolution.capability.can_decrypt);
        assert_eq!(resolution.gap, Some(CapabilityGap::IdentifierBlobMissing));
    }

    #[test]
    fn gap_messages() {
        assert_eq!(CapabilityGap::PrivateKeyMissing.to_string(), "Private key missing");
        assert_eq!(CapabilityGap::IdentifierBlobMissing.to_string(), "Identifier blob missing");
        assert_eq!(Scheme::PlayReady.to_string(), "playready");
    }
}
