//! Normalized content keys.
//!
//! Both schemes hand their keys back in scheme-native records; everything
//! leaving [`crate::exchange`] is a [`KeyEntry`].

use std::fmt;

use uuid::Uuid;

/// A content key in scheme-agnostic form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEntry {
    /// Key ID bytes as emitted by the session parser.
    pub kid: Vec<u8>,
    /// Decrypted key bytes.
    pub key: Vec<u8>,
}

impl KeyEntry {
    /// Create a new KeyEntry.
    pub fn new(kid: impl Into<Vec<u8>>, key: impl Into<Vec<u8>>) -> Self {
        Self {
            kid: kid.into(),
            key: key.into(),
        }
    }

    /// Key ID as a UUID when it is exactly 16 bytes.
    ///
    /// Widevine key IDs are occasionally ASCII hex (32 bytes); those are
    /// parsed as a UUID string.
    pub fn kid_uuid(&self) -> Option<Uuid> {
        match self.kid.len() {
            16 => Uuid::from_slice(&self.kid).ok(),
            32 => std::str::from_utf8(&self.kid)
                .ok()
                .and_then(|s| Uuid::parse_str(s).ok()),
            _ => None,
        }
    }

    /// Key ID as lowercase hex without separators.
    #[must_use]
    pub fn kid_hex(&self) -> String {
        match self.kid_uuid() {
            Some(uuid) => uuid.as_simple().to_string(),
            None => hex::encode(&self.kid),
        }
    }

    /// Key as lowercase hex.
    #[must_use]
    pub fn key_hex(&self) -> String {
        hex::encode(&self.key)
    }
}

/// Formats as `kid:key`, the form decryption tools take on the command line.
impl fmt::Display for KeyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kid_hex(), self.key_hex())
    }
}

/// A key record as produced by a PlayReady CDM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayReadyKey {
    pub key_id: Vec<u8>,
    pub key: Vec<u8>,
}

impl From<PlayReadyKey> for KeyEntry {
    fn from(record: PlayReadyKey) -> Self {
        Self {
            kid: record.key_id,
            key: record.key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{KeyEntry, PlayReadyKey};

    #[test]
    fn display_uses_hex_pair() {
        let entry = KeyEntry::new(vec![0xab; 16], vec![0x01, 0x02]);
        assert_eq!(entry.to_string(), format!("{}:0102", "ab".repeat(16)));
    }

    #[test]
    fn ascii_hex_kid_is_parsed_as_uuid() {
        let kid = b"0123456789abcdef0123456789abcdef".to_vec();
        let entry = KeyEntry::new(kid, vec![0u8; 16]);
        assert_eq!(entry.kid_hex(), "0123456789abcdef0123456789abcdef");
        assert!(entry.kid_uuid().is_some());
    }

    #[test]
    fn odd_length_kid_falls_back_to_hex() {
        let entry = KeyEntry::new(vec![0x0f, 0xf0, 0x01], vec![]);
        assert!(entry.kid_uuid().is_none());
        assert_eq!(entry.kid_hex(), "0ff001");
    }

    #[test]
    fn playready_record_maps_one_to_one() {
        let record = PlayReadyKey {
            key_id: vec![1; 16],
            key: vec![2; 16],
        };
        let entry = KeyEntry::from(record);
        assert_eq!(entry.kid, vec![1; 16]);
        assert_eq!(entry.key, vec![2; 16]);
    }
}
