//! Shared fixtures and stub sessions for unit tests.
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::cdm::{PlayReadyCdm, WidevineCdm, WidevineSession};
use crate::device::WidevineCredentials;
use crate::error::{Error, Result};
use crate::key::{KeyEntry, PlayReadyKey};
use crate::pssh::WrmHeader;
use crate::scanner::{PLAYREADY_DIR, WIDEVINE_DIR};

pub(crate) const PKCS1_PEM: &str = include_str!("../tests/fixtures/device_private_key.pem");

pub(crate) const CLIENT_ID: &[u8] =
    b"\x08\x01\x12\x10\x3a\x14widevine_cdm_version\x12\x0416.0\x3a\x1foem_crypto_security_patch_level\x12\x010";

/// Empty credential layout in a fresh temporary directory.
pub(crate) fn layout() -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::create_dir(dir.path().join(WIDEVINE_DIR)).expect("widevine dir");
    fs::create_dir(dir.path().join(PLAYREADY_DIR)).expect("playready dir");
    dir
}

pub(crate) fn write(root: &Path, sub: &str, name: &str, data: &[u8]) {
    fs::write(root.join(sub).join(name), data).expect("write fixture");
}

/// A `.prd`-shaped blob of `len` bytes carrying the certificate marker.
pub(crate) fn prd(len: usize) -> Vec<u8> {
    let mut data = b"CHAI\x00\x00\x00\x03CERT".to_vec();
    data.resize(len, 0);
    data
}

pub(crate) struct NullPlayReady;

impl PlayReadyCdm for NullPlayReady {
    fn license_challenge(&self, _wrm_header: &WrmHeader) -> Result<String> {
        Ok(String::new())
    }

    fn parse_license(&self, _response: &str) -> Result<Vec<PlayReadyKey>> {
        Ok(Vec::new())
    }
}

/// PlayReady CDM that records every response it is asked to parse.
///
/// Responses starting with `<xml>` yield one key; anything else fails.
#[derive(Default)]
pub(crate) struct RecordingPlayReady {
    pub(crate) parsed: Mutex<Vec<String>>,
}

impl PlayReadyCdm for RecordingPlayReady {
    fn license_challenge(&self, wrm_header: &WrmHeader) -> Result<String> {
        Ok(format!("<soap:Envelope>{}</soap:Envelope>", wrm_header))
    }

    fn parse_license(&self, response: &str) -> Result<Vec<PlayReadyKey>> {
        self.parsed.lock().expect("lock").push(response.to_string());
        if !response.starts_with("<xml>") {
            return Err(Error::ResponseParse("not a PlayReady license".to_string()));
        }
        Ok(vec![PlayReadyKey {
            key_id: vec![0x11; 16],
            key: vec![0x22; 16],
        }])
    }
}

/// Widevine CDM whose sessions treat any `LICENSE`-prefixed bytes as a
/// license holding one key equal to those bytes.
#[derive(Default, Clone)]
pub(crate) struct StubWidevine {
    pub(crate) parsed: Arc<Mutex<Vec<Vec<u8>>>>,
}

pub(crate) const STUB_KID: &[u8; 16] = b"kid-0123456789ab";

struct StubWidevineSession {
    init_data: Vec<u8>,
    parsed: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl WidevineCdm for StubWidevine {
    fn open(
        &self,
        credentials: &WidevineCredentials,
        init_data: &[u8],
    ) -> Result<Box<dyn WidevineSession>> {
        assert!(!credentials.private_key.is_empty());
        Ok(Box::new(StubWidevineSession {
            init_data: init_data.to_vec(),
            parsed: self.parsed.clone(),
        }))
    }
}

impl WidevineSession for StubWidevineSession {
    fn license_challenge(&mut self) -> Result<Vec<u8>> {
        let mut challenge = b"CHALLENGE:".to_vec();
        challenge.extend_from_slice(&self.init_data);
        Ok(challenge)
    }

    fn parse_license(&mut self, license: &[u8]) -> Result<Vec<KeyEntry>> {
        self.parsed.lock().expect("lock").push(license.to_vec());
        if !license.starts_with(b"LICENSE") {
            return Err(Error::ResponseParse("not a Widevine license".to_string()));
        }
        Ok(vec![KeyEntry::new(STUB_KID.to_vec(), license.to_vec())])
    }
}

/// Serve `router` on an ephemeral local port and return its base URL.
pub(crate) async fn serve(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve");
    });
    format!("http://{}/", addr)
}

/// Serve a fixed `status` and `body` for every POST, counting requests.
pub(crate) async fn counting_server(
    status: axum::http::StatusCode,
    body: Vec<u8>,
) -> (String, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let url = serve(axum::Router::new().route(
        "/",
        axum::routing::post(move || {
            let counter = counter.clone();
            let body = body.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                (status, body)
            }
        }),
    ))
    .await;
    (url, hits)
}
