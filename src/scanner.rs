//! Credential directory scanning.
//!
//! Layout, relative to the working directory:
//!
//! ```text
//! widevine/   device_private_key (PEM) + device_client_id_blob
//! playready/  <name>.prd (V3 device)
//! ```
//!
//! Both directories are read non-recursively. Problems with an individual
//! scheme's files only clear that scheme; failing to list either directory
//! fails the whole scan.
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cdm::{PlayReadyCdm, PlayReadyDeviceLoader};
use crate::device::{classify_widevine_file, is_playready_device, parse_private_key, WidevineFileKind};
use crate::error::{Error, Result};

/// Credential files must be strictly smaller than this.
pub const FILE_SIZE_LIMIT: u64 = 8 * 1024;

/// Widevine credential subdirectory.
pub const WIDEVINE_DIR: &str = "widevine";

/// PlayReady device subdirectory.
pub const PLAYREADY_DIR: &str = "playready";

/// A credential file read into memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundFile {
    pub path: PathBuf,
    pub data: Vec<u8>,
}

/// A successfully loaded PlayReady device.
#[derive(Clone)]
pub struct PlayReadyDevice {
    pub path: PathBuf,
    pub cdm: Arc<dyn PlayReadyCdm>,
}

impl std::fmt::Debug for PlayReadyDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayReadyDevice")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Everything a scan found, before any capability decision.
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    pub private_key: Option<FoundFile>,
    pub client_id: Option<FoundFile>,
    pub playready: Option<PlayReadyDevice>,
}

/// Scan `working_dir` for credentials.
///
/// Returns an error only when a credential directory cannot be listed.
pub fn scan(working_dir: &Path, loader: &dyn PlayReadyDeviceLoader) -> Result<ScanResult> {
    let playready = scan_playready(&working_dir.join(PLAYREADY_DIR), loader)?;
    let (private_key, client_id) = scan_widevine(&working_dir.join(WIDEVINE_DIR))?;

    Ok(ScanResult {
        private_key,
        client_id,
        playready,
    })
}

/// Load the PlayReady device, if one is provisioned.
///
/// A device the loader rejects is reported and treated as absent.
pub fn scan_playready(
    dir: &Path,
    loader: &dyn PlayReadyDeviceLoader,
) -> Result<Option<PlayReadyDevice>> {
    let entries = sorted_entries(dir)?;

    let loaded = find_playready_candidate(&entries).and_then(|candidate| match candidate {
        Some(file) => {
            let cdm = loader.load(&file.data)?;
            Ok(Some(PlayReadyDevice {
                path: file.path,
                cdm,
            }))
        }
        None => Ok(None),
    });

    match loaded {
        Ok(device) => {
            if let Some(ref device) = device {
                info!("Loaded PlayReady device {}", device.path.display());
            }
            Ok(device)
        }
        Err(e) => {
            error!(
                "Error loading PlayReady CDM, ensure the CDM is provisioned as a V3 Device and not malformed: {}",
                e
            );
            Ok(None)
        }
    }
}

/// The first `.prd` file by name, if it passes the size and marker checks.
pub fn playready_candidate(dir: &Path) -> Result<Option<FoundFile>> {
    find_playready_candidate(&sorted_entries(dir)?)
}

fn find_playready_candidate(entries: &[PathBuf]) -> Result<Option<FoundFile>> {
    let Some(path) = entries.iter().find(|path| {
        path.file_name()
            .map(|name| name.to_string_lossy().contains(".prd"))
            .unwrap_or(false)
    }) else {
        return Ok(None);
    };

    let Some(data) = read_candidate(path)? else {
        debug!("Ignoring {}: not a file or too large", path.display());
        return Ok(None);
    };

    if !is_playready_device(&data) {
        debug!("Ignoring {}: no certificate chain", path.display());
        return Ok(None);
    }

    Ok(Some(FoundFile {
        path: path.clone(),
        data,
    }))
}

/// Find the Widevine private key and client id blob.
///
/// A later matching file replaces an earlier one. Any unreadable file or
/// unparseable key clears both halves.
pub fn scan_widevine(dir: &Path) -> Result<(Option<FoundFile>, Option<FoundFile>)> {
    let entries = sorted_entries(dir)?;

    match collect_widevine(&entries) {
        Ok(found) => Ok(found),
        Err(e) => {
            error!("Error loading Widevine CDM, malformed client blob or private key: {}", e);
            Ok((None, None))
        }
    }
}

fn collect_widevine(entries: &[PathBuf]) -> Result<(Option<FoundFile>, Option<FoundFile>)> {
    let mut private_key = None;
    let mut client_id = None;

    for path in entries {
        let Some(data) = read_candidate(path)? else {
            continue;
        };

        match classify_widevine_file(&data) {
            WidevineFileKind::PrivateKey => {
                parse_private_key(&data).map_err(|e| {
                    Error::Provisioning(format!("{}: {}", path.display(), e))
                })?;
                debug!("Found Widevine private key {}", path.display());
                private_key = Some(FoundFile {
                    path: path.clone(),
                    data,
                });
            }
            WidevineFileKind::ClientId => {
                debug!("Found Widevine client id blob {}", path.display());
                client_id = Some(FoundFile {
                    path: path.clone(),
                    data,
                });
            }
            WidevineFileKind::Wvd => {
                warn!(
                    "Found WVD file {}, only device_client_id_blob and device_private_key are supported, make sure to have them in the widevine folder.",
                    path.display()
                );
            }
            WidevineFileKind::Unknown => {
                trace!("Ignoring {}", path.display());
            }
        }
    }

    Ok((private_key, client_id))
}

/// Read a file if it is a regular file under [`FILE_SIZE_LIMIT`].
fn read_candidate(path: &Path) -> Result<Option<Vec<u8>>> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        // Dangling symlink.
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if !metadata.is_file() || metadata.len() >= FILE_SIZE_LIMIT {
        return Ok(None);
    }
    Ok(Some(fs::read(path)?))
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)
        .map_err(|e| Error::Provisioning(format!("Cannot read {}: {}", dir.display(), e)))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();
    Ok(entries)
}
