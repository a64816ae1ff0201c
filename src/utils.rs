//! Miscellaneous helper utilities.
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;

use crate::error::Result;

const LENIENT: GeneralPurposeConfig =
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent);

const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT);
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT);

/// Decode base64 as license servers and manifests emit it.
///
/// Padding is optional and the URL-safe alphabet is accepted. Surrounding
/// whitespace is ignored.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    let data = data.trim();
    match STANDARD_LENIENT.decode(data) {
        Ok(bytes) => Ok(bytes),
        Err(e) => URL_SAFE_LENIENT.decode(data).map_err(|_| e.into()),
    }
}
