//! GCUIS transport codec: Base64 → gzip → JSON and back.

use std::io::{Read, Write};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use flate2::{read::MultiGzDecoder, write::GzEncoder, Compression};
use serde_json::Value;
use tracing::{debug, instrument};

use super::MetadataPayload;
use crate::error::{CodexError, Result};

/// gzip member header magic.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Read size for the decompression loop.
const DECOMPRESS_CHUNK: usize = 16 * 1024;

/// Stateless codec for transport strings.
///
/// Holds no state; one instance can be shared across concurrent decodes.
#[derive(Debug, Clone, Copy, Default)]
pub struct PayloadCodec;

impl PayloadCodec {
    pub fn new() -> Self {
        Self
    }

    /// Decode a transport string into a payload.
    ///
    /// Each stage maps its failure to its own error kind:
    /// Base64 to `MalformedEncoding`, gzip to `DecompressionFailure`,
    /// UTF-8 and JSON to `MalformedPayload`. No schema checks happen here.
    #[instrument(level = "debug", skip_all, fields(input_len = transport.len()))]
    pub fn decode(&self, transport: &str) -> Result<MetadataPayload> {
        let compressed = decode_base64(transport)?;
        debug!(bytes = compressed.len(), "Decoded Base64");

        let text = decompress(&compressed)?;
        debug!(bytes = text.len(), "Decompressed payload");

        let value: Value = serde_json::from_str(&text)
            .map_err(|e| CodexError::MalformedPayload(format!("JSON parsing failed: {e}")))?;
        let payload = MetadataPayload::try_from(value)?;
        debug!("Parsed payload object");

        Ok(payload)
    }

    /// Encode a payload as a transport string.
    ///
    /// The JSON is minified with keys in their stored order, which is the
    /// same byte sequence the Soulmark is computed over.
    pub fn encode(&self, payload: &MetadataPayload) -> Result<String> {
        let json = payload.as_value().to_string();

        let gzip_err = |e: std::io::Error| {
            CodexError::DecompressionFailure(format!("gzip encoding failed: {e}"))
        };

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(json.as_bytes()).map_err(gzip_err)?;
        let compressed = encoder.finish().map_err(gzip_err)?;

        Ok(BASE64.encode(compressed))
    }
}

/// Decode a transport string with a default codec.
pub fn decode_payload(transport: &str) -> Result<MetadataPayload> {
    PayloadCodec::new().decode(transport)
}

/// Fully decompress a gzip stream into text.
///
/// Output is accumulated chunk by chunk until the stream reports its end,
/// so there is no upper bound tied to a single read. Concatenated gzip
/// members are decoded in sequence.
pub fn decompress(bytes: &[u8]) -> Result<String> {
    if bytes.len() < GZIP_MAGIC.len() || bytes[..2] != GZIP_MAGIC {
        return Err(CodexError::DecompressionFailure(
            "not a gzip stream (missing header magic)".into(),
        ));
    }

    let mut decoder = MultiGzDecoder::new(bytes);
    let mut output = Vec::with_capacity(bytes.len() * 4);
    let mut chunk = vec![0u8; DECOMPRESS_CHUNK];

    loop {
        let read = decoder
            .read(&mut chunk)
            .map_err(|e| CodexError::DecompressionFailure(format!("gzip stream invalid: {e}")))?;
        if read == 0 {
            break;
        }
        output.extend_from_slice(&chunk[..read]);
    }

    String::from_utf8(output)
        .map_err(|e| CodexError::MalformedPayload(format!("payload is not valid UTF-8: {e}")))
}

fn decode_base64(transport: &str) -> Result<Vec<u8>> {
    // Line-wrapped payload files are common; interior whitespace is not data.
    let compact: String = transport
        .trim()
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();

    if compact.is_empty() {
        return Err(CodexError::MalformedEncoding("empty payload".into()));
    }

    if let Some(bad) = compact
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '=')))
    {
        return Err(CodexError::MalformedEncoding(format!(
            "character {bad:?} is outside the Base64 alphabet"
        )));
    }

    BASE64
        .decode(compact.as_bytes())
        .map_err(|e| CodexError::MalformedEncoding(format!("Base64 decoding failed: {e}")))
}
