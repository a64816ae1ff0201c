//! PSSH parsing and PlayReady header extraction.
//!
//! Only what the license exchange needs is parsed here: the ISO BMFF `pssh`
//! box, the PlayReady Object it may carry, and the WRM header records inside
//! that object. Widevine init data is passed to the session untouched.
use std::fmt;
use std::str::FromStr;

use base64::Engine;
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::utils::decode_base64;

/// PlayReady Object record type holding a WRM header.
const WRM_HEADER_RECORD: u16 = 0x0001;

/// Known DRM system IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemId {
    Widevine,
    PlayReady,
}

impl SystemId {
    pub fn to_uuid(self) -> Uuid {
        match self {
            SystemId::Widevine => Uuid::from_u128(0xedef8ba979d64acea3c827dcd51d21ed),
            SystemId::PlayReady => Uuid::from_u128(0x9a04f07998404286ab92e65be0885f95),
        }
    }

    pub fn from_uuid(uuid: &Uuid) -> Option<Self> {
        [SystemId::Widevine, SystemId::PlayReady]
            .into_iter()
            .find(|id| id.to_uuid() == *uuid)
    }
}

/// Parsed PSSH box or bare PlayReady init data.
#[derive(Debug, Clone)]
pub struct Pssh {
    pub version: u8,
    pub flags: u32,
    pub system_id: Uuid,
    pub key_ids: Vec<Uuid>,
    pub init_data: Vec<u8>,
}

impl Pssh {
    /// Parse a PSSH from base64.
    pub fn from_base64(data_b64: &str) -> Result<Self> {
        let data = decode_base64(data_b64)?;
        Self::from_bytes(&data)
    }

    /// Parse a PSSH from raw bytes.
    ///
    /// Accepts:
    /// - Full PSSH boxes (v0 and v1).
    /// - A bare PlayReady Object.
    /// - A bare UTF-16LE WRM header.
    ///
    /// The latter two are wrapped as v0 PlayReady boxes.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::InvalidInitData("Data must not be empty".to_string()));
        }

        if let Ok(pssh) = parse_pssh_box(data) {
            return Ok(pssh);
        }

        if parse_playready_object(data).is_ok() || contains_wrm_header(data) {
            return Ok(Pssh {
                version: 0,
                flags: 0,
                system_id: SystemId::PlayReady.to_uuid(),
                key_ids: Vec::new(),
                init_data: data.to_vec(),
            });
        }

        Err(Error::InvalidInitData(
            "Could not parse data as PSSH box or PlayReady header".to_string(),
        ))
    }

    /// Build a v0 box around `init_data`.
    pub fn new(system_id: SystemId, init_data: Vec<u8>) -> Self {
        Self {
            version: 0,
            flags: 0,
            system_id: system_id.to_uuid(),
            key_ids: Vec::new(),
            init_data,
        }
    }

    /// Known system, if any.
    pub fn system(&self) -> Option<SystemId> {
        SystemId::from_uuid(&self.system_id)
    }

    /// Serialize as a full PSSH box.
    pub fn to_bytes(&self) -> Vec<u8> {
        build_pssh_box(self)
    }

    /// Serialize as a base64 PSSH box.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.to_bytes())
    }

    /// Extract the WRM headers carried by a PlayReady PSSH.
    ///
    /// Records of other types (e.g. embedded license stores) are skipped.
    pub fn wrm_headers(&self) -> Result<Vec<WrmHeader>> {
        if self.system() != Some(SystemId::PlayReady) {
            return Err(Error::InvalidInitData(format!(
                "Not a PlayReady PSSH (system id {})",
                self.system_id
            )));
        }

        let headers = match parse_playready_object(&self.init_data) {
            Ok(records) => records
                .into_iter()
                .filter(|(record_type, _)| *record_type == WRM_HEADER_RECORD)
                .map(|(_, value)| WrmHeader::from_utf16le(value))
                .collect::<Result<Vec<_>>>()?,
            Err(_) if contains_wrm_header(&self.init_data) => {
                vec![WrmHeader::from_utf16le(&self.init_data)?]
            }
            Err(e) => return Err(e),
        };

        if headers.is_empty() {
            return Err(Error::InvalidInitData(
                "PlayReady object carries no WRM header".to_string(),
            ));
        }
        Ok(headers)
    }
}

impl FromStr for Pssh {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Pssh::from_base64(s)
    }
}

/// A PlayReady rights-management header, decoded to XML text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrmHeader(String);

impl WrmHeader {
    /// Decode a UTF-16LE header, dropping a leading byte order mark.
    pub fn from_utf16le(data: &[u8]) -> Result<Self> {
        if data.len() % 2 != 0 {
            return Err(Error::InvalidInitData(
                "WRM header has odd byte length".to_string(),
            ));
        }
        let units = data
            .chunks_exact(2)
            .map(LittleEndian::read_u16)
            .collect::<Vec<u16>>();
        let xml = String::from_utf16(&units)
            .map_err(|_| Error::InvalidInitData("Invalid UTF-16 in WRM header".to_string()))?;
        Ok(Self(xml.trim_start_matches('\u{feff}').to_string()))
    }

    /// The header XML.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `version` attribute of the root element.
    pub fn version(&self) -> Result<String> {
        let doc = self.document()?;
        doc.root_element()
            .attribute("version")
            .map(str::to_string)
            .ok_or_else(|| Error::InvalidInitData("Missing PlayReady version".to_string()))
    }

    /// Key IDs declared by the header (versions 4.0.0.0 - 4.3.0.0).
    ///
    /// PlayReady stores KIDs as little-endian GUIDs.
    pub fn key_ids(&self) -> Result<Vec<Uuid>> {
        let doc = self.document()?;
        let root = doc.root_element();
        let version = root
            .attribute("version")
            .ok_or_else(|| Error::InvalidInitData("Missing PlayReady version".to_string()))?;

        let values = match version {
            "4.0.0.0" => root
                .descendants()
                .filter(|n| n.tag_name().name() == "KID")
                .filter_map(|n| n.text())
                .collect::<Vec<_>>(),
            "4.1.0.0" | "4.2.0.0" | "4.3.0.0" => root
                .descendants()
                .filter(|n| n.tag_name().name() == "KID")
                .filter_map(|n| n.attribute("VALUE"))
                .collect::<Vec<_>>(),
            _ => {
                return Err(Error::InvalidInitData(format!(
                    "Unsupported PlayReady version {}",
                    version
                )));
            }
        };

        values
            .into_iter()
            .map(|value| {
                let bytes = decode_base64(value)?;
                Uuid::from_slice_le(&bytes)
                    .map_err(|_| Error::InvalidInitData(format!("Invalid KID length {}", bytes.len())))
            })
            .collect()
    }

    fn document(&self) -> Result<roxmltree::Document<'_>> {
        roxmltree::Document::parse(&self.0)
            .map_err(|e| Error::InvalidInitData(format!("PlayReady XML parse error: {}", e)))
    }
}

impl fmt::Display for WrmHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn parse_pssh_box(data: &[u8]) -> Result<Pssh> {
    if data.len() < 8 {
        return Err(Error::InvalidInitData("Data too short".to_string()));
    }

    let mut offset = 0;
    let size = BigEndian::read_u32(&data[offset..offset + 4]) as usize;
    offset += 4;
    if &data[offset..offset + 4] != b"pssh" {
        return Err(Error::InvalidInitData("Not a PSSH box".to_string()));
    }
    offset += 4;

    let box_size = match size {
        0 => data.len(),
        1 => {
            if data.len() < 16 {
                return Err(Error::InvalidInitData("Data too short".to_string()));
            }
            let large = BigEndian::read_u64(&data[offset..offset + 8]) as usize;
            offset += 8;
            large
        }
        n => n,
    };
    if box_size > data.len() {
        return Err(Error::InvalidInitData("PSSH size exceeds data length".to_string()));
    }
    let data = &data[..box_size];

    if data.len() < offset + 4 + 16 {
        return Err(Error::InvalidInitData("PSSH header incomplete".to_string()));
    }
    let version = data[offset];
    let flags = BigEndian::read_u32(&data[offset..offset + 4]) & 0x00ff_ffff;
    offset += 4;

    let system_id = Uuid::from_slice(&data[offset..offset + 16])
        .map_err(|_| Error::InvalidInitData("Invalid system ID".to_string()))?;
    offset += 16;

    let mut key_ids = Vec::new();
    if version == 1 {
        if data.len() < offset + 4 {
            return Err(Error::InvalidInitData("Missing KID count".to_string()));
        }
        let kid_count = BigEndian::read_u32(&data[offset..offset + 4]) as usize;
        offset += 4;

        let required = kid_count
            .checked_mul(16)
            .and_then(|n| n.checked_add(offset))
            .filter(|required| *required <= data.len())
            .ok_or_else(|| Error::InvalidInitData("Missing KIDs".to_string()))?;
        for chunk in data[offset..required].chunks_exact(16) {
            key_ids.push(Uuid::from_slice(chunk).unwrap_or_else(|_| Uuid::nil()));
        }
        offset = required;
    } else if version != 0 {
        return Err(Error::InvalidInitData(format!(
            "Unsupported PSSH version {}",
            version
        )));
    }

    if data.len() < offset + 4 {
        return Err(Error::InvalidInitData("Missing init data length".to_string()));
    }
    let data_size = BigEndian::read_u32(&data[offset..offset + 4]) as usize;
    offset += 4;
    if data.len() < offset + data_size {
        return Err(Error::InvalidInitData("Missing init data".to_string()));
    }

    Ok(Pssh {
        version,
        flags,
        system_id,
        key_ids,
        init_data: data[offset..offset + data_size].to_vec(),
    })
}

fn build_pssh_box(pssh: &Pssh) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&(((pssh.version as u32) << 24) | (pssh.flags & 0x00ff_ffff)).to_be_bytes());
    body.extend_from_slice(pssh.system_id.as_bytes());

    if pssh.version == 1 {
        body.extend_from_slice(&(pssh.key_ids.len() as u32).to_be_bytes());
        for kid in pssh.key_ids.iter() {
            body.extend_from_slice(kid.as_bytes());
        }
    }

    body.extend_from_slice(&(pssh.init_data.len() as u32).to_be_bytes());
    body.extend_from_slice(&pssh.init_data);

    let mut out = Vec::with_capacity(body.len() + 8);
    out.extend_from_slice(&((body.len() + 8) as u32).to_be_bytes());
    out.extend_from_slice(b"pssh");
    out.extend_from_slice(&body);
    out
}

/// Split a PlayReady Object into `(record type, record value)` pairs.
fn parse_playready_object(data: &[u8]) -> Result<Vec<(u16, &[u8])>> {
    if data.len() < 6 {
        return Err(Error::InvalidInitData("PlayReady data too short".to_string()));
    }

    let total_length = LittleEndian::read_u32(&data[0..4]) as usize;
    if total_length != data.len() {
        return Err(Error::InvalidInitData(
            "PlayReady object length mismatch".to_string(),
        ));
    }

    let record_count = LittleEndian::read_u16(&data[4..6]) as usize;
    let mut offset = 6;
    let mut records = Vec::with_capacity(record_count);

    for _ in 0..record_count {
        if data.len() < offset + 4 {
            return Err(Error::InvalidInitData("PlayReady record truncated".to_string()));
        }
        let record_type = LittleEndian::read_u16(&data[offset..offset + 2]);
        let record_length = LittleEndian::read_u16(&data[offset + 2..offset + 4]) as usize;
        offset += 4;

        if data.len() < offset + record_length {
            return Err(Error::InvalidInitData("PlayReady record truncated".to_string()));
        }
        records.push((record_type, &data[offset..offset + record_length]));
        offset += record_length;
    }

    Ok(records)
}

fn contains_wrm_header(data: &[u8]) -> bool {
    let marker = "</WRMHEADER>".encode_utf16().flat_map(|u| u.to_le_bytes()).collect::<Vec<u8>>();
    data.windows(marker.len()).any(|window| window == marker)
}

/// Encode a WRM header as a single-record PlayReady Object.
#[cfg(test)]
pub(crate) fn playready_object(xml: &str) -> Vec<u8> {
    let value = xml.encode_utf16().flat_map(|u| u.to_le_bytes()).collect::<Vec<u8>>();
    let mut out = Vec::new();
    out.extend_from_slice(&((value.len() + 10) as u32).to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&WRM_HEADER_RECORD.to_le_bytes());
    out.extend_from_slice(&(value.len() as u16).to_le_bytes());
    out.extend_from_slice(&value);
    out
}

#[cfg(test)]
mod tests {
    use base64::Engine;
    use uuid::Uuid;

    use super::{playready_object, Pssh, SystemId};

    const HEADER_V43: &str = r#"<WRMHEADER xmlns="http://schemas.microsoft.com/DRM/2007/03/PlayReadyHeader" version="4.3.0.0"><DATA><PROTECTINFO><KIDS><KID ALGID="AESCTR" VALUE="EjRWeJq83vAQEiNFZ4mrzQ=="></KID></KIDS></PROTECTINFO></DATA></WRMHEADER>"#;

    #[test]
    fn widevine_box_roundtrip() {
        let pssh = Pssh::new(SystemId::Widevine, b"example-init-data".to_vec());
        let parsed = Pssh::from_base64(&pssh.to_base64()).expect("parse pssh");

        assert_eq!(parsed.version, 0);
        assert_eq!(parsed.system(), Some(SystemId::Widevine));
        assert_eq!(parsed.init_data, b"example-init-data");
    }

    #[test]
    fn v1_box_keeps_key_ids() {
        let kid = Uuid::from_u128(0x0123_4567_89ab_cdef_0123_4567_89ab_cdef);
        let mut pssh = Pssh::new(SystemId::PlayReady, playready_object(HEADER_V43));
        pssh.version = 1;
        pssh.key_ids = vec![kid];

        let parsed = Pssh::from_bytes(&pssh.to_bytes()).expect("parse pssh");
        assert_eq!(parsed.version, 1);
        assert_eq!(parsed.key_ids, vec![kid]);
        assert_eq!(parsed.wrm_headers().expect("headers").len(), 1);
    }

    #[test]
    fn playready_box_yields_wrm_header() {
        let pssh = Pssh::new(SystemId::PlayReady, playready_object(HEADER_V43));
        let parsed = Pssh::from_base64(&pssh.to_base64()).expect("parse pssh");

        let headers = parsed.wrm_headers().expect("headers");
        assert_eq!(headers[0].as_str(), HEADER_V43);
        assert_eq!(headers[0].version().expect("version"), "4.3.0.0");
    }

    #[test]
    fn wrm_header_kids_are_little_endian_guids() {
        let pssh = Pssh::new(SystemId::PlayReady, playready_object(HEADER_V43));
        let kids = pssh.wrm_headers().expect("headers")[0].key_ids().expect("kids");

        let raw = base64::engine::general_purpose::STANDARD
            .decode("EjRWeJq83vAQEiNFZ4mrzQ==")
            .expect("b64");
        assert_eq!(kids, vec![Uuid::from_slice_le(&raw).expect("uuid")]);
        assert_eq!(kids[0].to_string(), "78563412-bc9a-f0de-1012-23456789abcd");
    }

    #[test]
    fn unpadded_base64_is_accepted() {
        let pssh = Pssh::new(SystemId::PlayReady, playready_object(HEADER_V43));
        let encoded = base64::engine::general_purpose::STANDARD_NO_PAD.encode(pssh.to_bytes());
        let parsed = Pssh::from_base64(&encoded).expect("parse pssh");
        assert_eq!(parsed.init_data, pssh.init_data);
    }

    #[test]
    fn bare_playready_object_is_accepted() {
        let parsed = Pssh::from_bytes(&playready_object(HEADER_V43)).expect("parse");
        assert_eq!(parsed.system(), Some(SystemId::PlayReady));
        assert_eq!(parsed.wrm_headers().expect("headers").len(), 1);
    }

    #[test]
    fn widevine_pssh_has_no_wrm_headers() {
        let pssh = Pssh::new(SystemId::Widevine, b"init".to_vec());
        assert!(pssh.wrm_headers().is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(Pssh::from_bytes(b"definitely not a pssh").is_err());
        assert!(Pssh::from_base64("").is_err());
        assert!(Pssh::from_base64("!!!").is_err());
    }
}
