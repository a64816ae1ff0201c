//! Scheme session seams.
//!
//! The cryptographic side of each scheme (device parsing, challenge signing,
//! key derivation, response verification) lives behind these traits. The
//! exchange only ever talks to a [`LicenseSession`], a closed set of the two
//! scheme variants sharing one challenge/parse interface.
use std::sync::Arc;

use crate::capability::Scheme;
use crate::device::WidevineCredentials;
use crate::error::{Error, Result};
use crate::key::{KeyEntry, PlayReadyKey};
use crate::pssh::WrmHeader;

/// Opens Widevine sessions from a credential pair.
pub trait WidevineCdm: Send + Sync {
    /// Open a session for one license request.
    ///
    /// `init_data` is the decoded PSSH payload as found in the manifest.
    fn open(
        &self,
        credentials: &WidevineCredentials,
        init_data: &[u8],
    ) -> Result<Box<dyn WidevineSession>>;
}

/// A single Widevine license exchange.
pub trait WidevineSession: Send {
    /// Build the signed license request.
    fn license_challenge(&mut self) -> Result<Vec<u8>>;

    /// Verify a license message and return its content keys.
    ///
    /// Fails when `license` is not a well-formed license for this session.
    fn parse_license(&mut self, license: &[u8]) -> Result<Vec<KeyEntry>>;
}

/// A loaded PlayReady device.
pub trait PlayReadyCdm: Send + Sync {
    /// Build the SOAP license challenge for a WRM header.
    fn license_challenge(&self, wrm_header: &WrmHeader) -> Result<String>;

    /// Parse a license response into key records.
    fn parse_license(&self, response: &str) -> Result<Vec<PlayReadyKey>>;
}

/// Turns `.prd` file contents into a usable PlayReady CDM.
pub trait PlayReadyDeviceLoader {
    /// Fails when `data` is not a valid V3 device.
    fn load(&self, data: &[u8]) -> Result<Arc<dyn PlayReadyCdm>>;
}

impl<F> PlayReadyDeviceLoader for F
where
    F: Fn(&[u8]) -> Result<Arc<dyn PlayReadyCdm>>,
{
    fn load(&self, data: &[u8]) -> Result<Arc<dyn PlayReadyCdm>> {
        self(data)
    }
}

/// Loader for builds without a PlayReady implementation.
///
/// Every device is rejected, so PlayReady stays unprovisioned.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPlayReady;

impl PlayReadyDeviceLoader for NoPlayReady {
    fn load(&self, _data: &[u8]) -> Result<Arc<dyn PlayReadyCdm>> {
        Err(Error::Provisioning(
            "No PlayReady implementation available".to_string(),
        ))
    }
}

/// License request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Challenge {
    /// Serialized signed message (Widevine).
    Binary(Vec<u8>),
    /// SOAP envelope (PlayReady).
    Text(String),
}

impl Challenge {
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Challenge::Binary(bytes) => bytes,
            Challenge::Text(text) => text.into_bytes(),
        }
    }
}

/// One license exchange, for either scheme.
pub enum LicenseSession {
    Widevine(Box<dyn WidevineSession>),
    PlayReady {
        cdm: Arc<dyn PlayReadyCdm>,
        header: WrmHeader,
    },
}

impl LicenseSession {
    /// Open a Widevine session.
    pub fn widevine(
        cdm: &dyn WidevineCdm,
        credentials: &WidevineCredentials,
        init_data: &[u8],
    ) -> Result<Self> {
        Ok(Self::Widevine(cdm.open(credentials, init_data)?))
    }

    /// Bind a PlayReady CDM to the header it will request a license for.
    pub fn playready(cdm: Arc<dyn PlayReadyCdm>, header: WrmHeader) -> Self {
        Self::PlayReady { cdm, header }
    }

    pub fn scheme(&self) -> Scheme {
        match self {
            Self::Widevine(_) => Scheme::Widevine,
            Self::PlayReady { .. } => Scheme::PlayReady,
        }
    }

    /// Build the license request body.
    pub fn challenge(&mut self) -> Result<Challenge> {
        match self {
            Self::Widevine(session) => session.license_challenge().map(Challenge::Binary),
            Self::PlayReady { cdm, header } => cdm.license_challenge(header).map(Challenge::Text),
        }
    }

    /// Parse a license into normalized keys.
    ///
    /// PlayReady responses must be UTF-8 text.
    pub fn parse_license(&mut self, license: &[u8]) -> Result<Vec<KeyEntry>> {
        match self {
            Self::Widevine(session) => session.parse_license(license),
            Self::PlayReady { cdm, .. } => {
                let text = std::str::from_utf8(license).map_err(|e| {
                    Error::ResponseParse(format!("PlayReady response is not UTF-8: {}", e))
                })?;
                Ok(cdm
                    .parse_license(text)?
                    .into_iter()
                    .map(KeyEntry::from)
                    .collect())
            }
        }
    }
}

impl std::fmt::Debug for LicenseSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("LicenseSession").field(&self.scheme()).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{Challenge, LicenseSession, NoPlayReady, PlayReadyCdm, PlayReadyDeviceLoader};
    use crate::capability::Scheme;
    use crate::error::{Error, Result};
    use crate::key::{KeyEntry, PlayReadyKey};
    use crate::pssh::WrmHeader;

    struct EchoPlayReady;

    impl PlayReadyCdm for EchoPlayReady {
        fn license_challenge(&self, wrm_header: &WrmHeader) -> Result<String> {
            Ok(format!("<Challenge>{}</Challenge>", wrm_header.as_str()))
        }

        fn parse_license(&self, response: &str) -> Result<Vec<PlayReadyKey>> {
            if !response.starts_with('<') {
                return Err(Error::ResponseParse("not xml".to_string()));
            }
            Ok(vec![PlayReadyKey {
                key_id: vec![7; 16],
                key: response.as_bytes().to_vec(),
            }])
        }
    }

    fn header() -> WrmHeader {
        let bytes = "<WRMHEADER/>".encode_utf16().flat_map(|u| u.to_le_bytes()).collect::<Vec<u8>>();
        WrmHeader::from_utf16le(&bytes).expect("header")
    }

    #[test]
    fn playready_session_builds_text_challenge() {
        let mut session = LicenseSession::playready(Arc::new(EchoPlayReady), header());
        assert_eq!(session.scheme(), Scheme::PlayReady);
        assert_eq!(
            session.challenge().expect("challenge"),
            Challenge::Text("<Challenge><WRMHEADER/></Challenge>".to_string())
        );
    }

    #[test]
    fn playready_keys_are_normalized() {
        let mut session = LicenseSession::playready(Arc::new(EchoPlayReady), header());
        let keys = session.parse_license(b"<xml/>").expect("keys");
        assert_eq!(keys, vec![KeyEntry::new(vec![7; 16], b"<xml/>".to_vec())]);
    }

    #[test]
    fn playready_rejects_binary_response() {
        let mut session = LicenseSession::playready(Arc::new(EchoPlayReady), header());
        assert!(matches!(
            session.parse_license(&[0xff, 0xfe, 0x00]),
            Err(Error::ResponseParse(_))
        ));
    }

    #[test]
    fn closures_are_loaders() {
        let loader = |_: &[u8]| -> Result<Arc<dyn PlayReadyCdm>> { Ok(Arc::new(EchoPlayReady)) };
        assert!(loader.load(b"CERT").is_ok());
        assert!(NoPlayReady.load(b"CERT").is_err());
    }
}
