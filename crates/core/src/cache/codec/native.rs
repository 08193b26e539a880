//! DEFLATE backend rendered as base64 text.

use std::io::{Read, Write};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;

use super::{CodecError, CodecKind, CompressionBackend};

#[derive(Debug, Clone, Copy)]
pub struct DeflateBackend {
    level: Compression,
}

impl Default for DeflateBackend {
    fn default() -> Self {
        Self { level: Compression::default() }
    }
}

impl CompressionBackend for DeflateBackend {
    fn kind(&self) -> CodecKind {
        CodecKind::Deflate
    }

    fn encode(&self, text: &str) -> Result<String, CodecError> {
        let mut encoder = DeflateEncoder::new(Vec::with_capacity(text.len() / 4), self.level);
        encoder
            .write_all(text.as_bytes())
            .map_err(|e| CodecError::CompressionFailed(e.to_string()))?;
        let bytes = encoder
            .finish()
            .map_err(|e| CodecError::CompressionFailed(e.to_string()))?;
        Ok(STANDARD.encode(bytes))
    }

    fn decode(&self, data: &str) -> Result<String, CodecError> {
        let bytes = STANDARD
            .decode(data)
            .map_err(|e| CodecError::InvalidCompressedData(format!("base64: {e}")))?;
        let mut text = String::new();
        DeflateDecoder::new(bytes.as_slice())
            .read_to_string(&mut text)
            .map_err(|e| CodecError::InvalidCompressedData(format!("deflate: {e}")))?;
        Ok(text)
    }
}
