//! Upload relay payloads
//!
//! The relay receives a multipart upload plus the background fields and answers
//! with the original bytes as a base64 `data:` URI and the chosen color:
//!
//! ```json
//! { "originalImage": "data:image/png;base64,iVBOR...", "bgColor": [255, 255, 255] }
//! ```
//!
//! The relay always labels the payload `image/png` whatever the upload was, so
//! the MIME type in the URI is informational only; decoding sniffs the bytes.

use crate::background::BackgroundSpec;
use crate::error::{BgSwapError, Result};
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};

/// Background fields posted alongside the upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayForm {
    /// Palette name (`"Red"`, `"White"`, ...) or `"Custom"`
    pub color_choice: String,
    /// `#RRGGBB`, only read when `color_choice` is `"Custom"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_color: Option<String>,
}

impl RelayForm {
    /// # Errors
    /// - Unknown palette name, or `Custom` without a valid hex color
    pub fn background(&self) -> Result<BackgroundSpec> {
        let spec = BackgroundSpec::from_choice(&self.color_choice, self.custom_color.as_deref())?;
        spec.resolve()?;
        Ok(spec)
    }
}

/// Relay answer handed to the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayResponse {
    /// Upload as a base64 `data:` URI
    pub original_image: String,
    /// Chosen background; absent when the relay did not recognize the choice
    #[serde(default)]
    pub bg_color: Option<Vec<i64>>,
}

impl RelayResponse {
    /// Build the response the relay sends for `upload` and `form`
    ///
    /// # Errors
    /// - Empty upload (`Decode`)
    /// - Invalid background fields (`Validation`)
    pub fn from_upload(upload: &[u8], form: &RelayForm) -> Result<Self> {
        if upload.is_empty() {
            return Err(BgSwapError::decode("No file uploaded"));
        }
        let rgb = form.background()?.resolve()?;
        Ok(Self {
            original_image: format!(
                "data:image/png;base64,{}",
                general_purpose::STANDARD.encode(upload)
            ),
            bg_color: Some(rgb.iter().map(|&c| i64::from(c)).collect()),
        })
    }

    /// Parse a relay JSON body
    ///
    /// # Errors
    /// - Body is not a relay response (`Decode`)
    pub fn from_json(body: &str) -> Result<Self> {
        serde_json::from_str(body)
            .map_err(|e| BgSwapError::decode(format!("Malformed relay response: {e}")))
    }

    /// Background from `bgColor`, with every channel range-checked
    ///
    /// # Errors
    /// - Missing color, wrong channel count, or channel outside 0..=255 (`Validation`)
    pub fn background(&self) -> Result<BackgroundSpec> {
        let channels = self
            .bg_color
            .as_deref()
            .ok_or_else(|| BgSwapError::validation("Relay response carries no background color"))?;
        BackgroundSpec::from_channels(channels)
    }

    /// Raw upload bytes from the data URI
    ///
    /// # Errors
    /// - Not a base64 `data:` URI, or invalid base64 (`Decode`)
    pub fn image_bytes(&self) -> Result<Vec<u8>> {
        decode_data_uri(&self.original_image).map(|(_, bytes)| bytes)
    }
}

/// Split a base64 `data:` URI into its MIME type and payload
///
/// # Errors
/// - Missing `data:` prefix or `,` separator
/// - Not base64-encoded, or invalid base64
pub fn decode_data_uri(uri: &str) -> Result<(String, Vec<u8>)> {
    let rest = uri
        .trim()
        .strip_prefix("data:")
        .ok_or_else(|| BgSwapError::decode("Expected a data: URI"))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| BgSwapError::decode("Data URI has no payload"))?;
    let mime = meta
        .strip_suffix(";base64")
        .ok_or_else(|| BgSwapError::decode("Data URI is not base64-encoded"))?;

    let bytes = general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| BgSwapError::decode(format!("Invalid base64 in data URI: {e}")))?;
    Ok((mime.to_string(), bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background::PaletteColor;
    use crate::error::ErrorKind;

    #[test]
    fn test_relay_json_shape() {
        let form = RelayForm {
            color_choice: "Blue".into(),
            custom_color: None,
        };
        let response = RelayResponse::from_upload(b"\x89PNG fake", &form).unwrap();
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["bgColor"], serde_json::json!([0, 0, 255]));
        assert!(json["originalImage"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,"));

        let parsed = RelayResponse::from_json(&json.to_string()).unwrap();
        assert_eq!(parsed.image_bytes().unwrap(), b"\x89PNG fake");
        assert_eq!(parsed.background().unwrap(), BackgroundSpec::Rgb([0, 0, 255]));
    }

    #[test]
    fn test_form_custom_color() {
        let form: RelayForm =
            serde_json::from_str(r##"{"colorChoice":"Custom","customColor":"#1a2B3c"}"##).unwrap();
        assert_eq!(form.background().unwrap().resolve().unwrap(), [0x1a, 0x2b, 0x3c]);

        let form: RelayForm =
            serde_json::from_str(r##"{"colorChoice":"Custom","customColor":"#ZZZZZZ"}"##).unwrap();
        assert_eq!(form.background().unwrap_err().kind(), ErrorKind::Validation);

        let form: RelayForm = serde_json::from_str(r#"{"colorChoice":"White"}"#).unwrap();
        assert_eq!(
            form.background().unwrap(),
            BackgroundSpec::Palette(PaletteColor::White)
        );
    }

    #[test]
    fn test_background_channel_validation() {
        let response = RelayResponse {
            original_image: "data:image/png;base64,AA==".into(),
            bg_color: Some(vec![255, 256, 0]),
        };
        assert_eq!(response.background().unwrap_err().kind(), ErrorKind::Validation);

        let response = RelayResponse {
            bg_color: None,
            ..response
        };
        assert_eq!(response.background().unwrap_err().kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_decode_data_uri_errors() {
        assert_eq!(
            decode_data_uri("data:image/png;base64,AAEC").unwrap(),
            ("image/png".to_string(), vec![0, 1, 2])
        );
        for bad in ["image/png;base64,AA==", "data:image/png,AA==", "data:image/png;base64", "data:;base64,***"] {
            assert_eq!(decode_data_uri(bad).unwrap_err().kind(), ErrorKind::Decode, "{bad}");
        }
    }

    #[test]
    fn test_empty_upload_rejected() {
        let form = RelayForm {
            color_choice: "Red".into(),
            custom_color: None,
        };
        assert_eq!(
            RelayResponse::from_upload(&[], &form).unwrap_err().kind(),
            ErrorKind::Decode
        );
    }
}
