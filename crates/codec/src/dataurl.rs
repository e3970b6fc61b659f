//! `data:` URLs carrying base64 media payloads.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::CodecError;

const SCHEME: &str = "data:";
const BASE64_MARKER: &str = ";base64";

/// Encode `bytes` as `data:<mime>;base64,<payload>`.
pub fn encode(mime_type: &str, bytes: &[u8]) -> String {
    format!("{SCHEME}{mime_type}{BASE64_MARKER},{}", STANDARD.encode(bytes))
}

/// Decode a base64 data URL into its MIME type and payload.
///
/// The MIME type is returned without parameters other than the base64
/// marker. An empty MIME type is returned as an empty string.
pub fn decode(url: &str) -> Result<(String, Vec<u8>), CodecError> {
    let rest = url
        .strip_prefix(SCHEME)
        .ok_or_else(|| CodecError::Validation("media url is not a data: URL".to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| CodecError::Validation("data URL has no payload separator".to_string()))?;
    let mime_type = header.strip_suffix(BASE64_MARKER).ok_or_else(|| {
        CodecError::Validation("data URL payload is not base64-encoded".to_string())
    })?;

    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| CodecError::Validation(format!("invalid base64 payload: {e}")))?;
    Ok((mime_type.to_string(), bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn encodes_with_mime_prefix() {
        assert_eq!(encode("audio/mpeg", b"abc"), "data:audio/mpeg;base64,YWJj");
    }

    #[test]
    fn decodes_mime_and_bytes() {
        let (mime, bytes) = decode("data:image/png;base64,AAEC").unwrap();
        assert_eq!(mime, "image/png");
        assert_eq!(bytes, vec![0, 1, 2]);
    }

    #[test]
    fn rejects_non_data_urls() {
        assert_matches!(decode("blob:pov/123"), Err(CodecError::Validation(_)));
        assert_matches!(decode("https://example.com/a.png"), Err(CodecError::Validation(_)));
    }

    #[test]
    fn rejects_plain_text_data_urls() {
        assert_matches!(decode("data:text/plain,hello"), Err(CodecError::Validation(_)));
    }

    #[test]
    fn rejects_invalid_base64() {
        assert_matches!(decode("data:image/png;base64,@@@"), Err(CodecError::Validation(_)));
    }
}
