//! Compression for large snapshot bodies.
//!
//! Two independent backends sit behind [`CompressionBackend`]:
//!
//! - [`CodecKind::Deflate`]: DEFLATE via `flate2`, rendered as base64 text.
//!   Only compiled with the `native-compression` feature.
//! - [`CodecKind::Lz78`]: a dependency-free LZ78 dictionary coder.
//!
//! A blob remembers which backend produced it, and decoding always
//! dispatches on that tag. Neither [`Codec::compress`] nor
//! [`Codec::decompress`] hands an error to its caller: a failed encode means
//! "store it raw", a failed decode means "show the stored text as-is".

mod lz78;
#[cfg(feature = "native-compression")]
mod native;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use lz78::Lz78Backend;
#[cfg(feature = "native-compression")]
pub use native::DeflateBackend;

use crate::config::CompressionMode;

/// Codec failures. Never surfaced past the cache boundary.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("COMPRESSION_FAILED: {0}")]
    CompressionFailed(String),

    #[error("INVALID_COMPRESSED_DATA: {0}")]
    InvalidCompressedData(String),

    #[error("codec {0} is not available in this build")]
    Unavailable(CodecKind),
}

/// Tag identifying the backend that produced a blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecKind {
    Deflate,
    Lz78,
}

impl fmt::Display for CodecKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecKind::Deflate => f.write_str("deflate"),
            CodecKind::Lz78 => f.write_str("lz78"),
        }
    }
}

/// Encoded text plus the tag of the backend that can decode it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedBlob {
    pub codec: CodecKind,
    pub data: String,
}

/// A compression implementation.
pub trait CompressionBackend: Send + Sync + fmt::Debug {
    fn kind(&self) -> CodecKind;

    fn encode(&self, text: &str) -> Result<String, CodecError>;

    fn decode(&self, data: &str) -> Result<String, CodecError>;
}

/// Backend chosen once at construction.
#[derive(Debug)]
pub struct Codec {
    backend: Option<Box<dyn CompressionBackend>>,
}

impl Codec {
    /// Pick the best backend compiled into this build.
    pub fn detect() -> Self {
        let backend = native_backend().unwrap_or_else(|| Box::new(Lz78Backend));
        tracing::debug!(codec = %backend.kind(), "selected compression backend");
        Self { backend: Some(backend) }
    }

    /// Build a codec for a configured mode.
    ///
    /// Asking for the native backend in a build without it falls back to LZ78.
    pub fn with_mode(mode: CompressionMode) -> Self {
        match mode {
            CompressionMode::Auto => Self::detect(),
            CompressionMode::Native => match native_backend() {
                Some(backend) => Self { backend: Some(backend) },
                None => {
                    tracing::warn!("native compression requested but not compiled in, using lz78");
                    Self::fallback()
                }
            },
            CompressionMode::Fallback => Self::fallback(),
            CompressionMode::Disabled => Self::disabled(),
        }
    }

    pub fn fallback() -> Self {
        Self { backend: Some(Box::new(Lz78Backend)) }
    }

    /// A codec that never compresses.
    pub fn disabled() -> Self {
        Self { backend: None }
    }

    /// Kind of the encoding backend, `None` when compression is disabled.
    pub fn kind(&self) -> Option<CodecKind> {
        self.backend.as_ref().map(|b| b.kind())
    }

    /// Encode with the selected backend, surfacing failures.
    pub fn try_compress(&self, text: &str) -> Result<EncodedBlob, CodecError> {
        let backend = self
            .backend
            .as_ref()
            .ok_or_else(|| CodecError::CompressionFailed("compression disabled".into()))?;
        let data = backend.encode(text)?;
        Ok(EncodedBlob { codec: backend.kind(), data })
    }

    /// Encode `text`, or `None` if the backend failed or compression is off.
    pub fn compress(&self, text: &str) -> Option<EncodedBlob> {
        self.backend.as_ref()?;
        match self.try_compress(text) {
            Ok(blob) => Some(blob),
            Err(e) => {
                tracing::warn!(error = %e, len = text.len(), "compression failed, storing raw");
                None
            }
        }
    }

    /// Decode a blob with the backend named by its tag.
    pub fn try_decompress(&self, blob: &EncodedBlob) -> Result<String, CodecError> {
        decoder_for(blob.codec)?.decode(&blob.data)
    }

    /// Decode a blob, returning the stored data unchanged when decoding fails.
    pub fn decompress(&self, blob: &EncodedBlob) -> String {
        match self.try_decompress(blob) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, codec = %blob.codec, "decompression failed, returning stored data");
                blob.data.clone()
            }
        }
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::detect()
    }
}

#[cfg(feature = "native-compression")]
fn native_backend() -> Option<Box<dyn CompressionBackend>> {
    Some(Box::new(DeflateBackend::default()))
}

#[cfg(not(feature = "native-compression"))]
fn native_backend() -> Option<Box<dyn CompressionBackend>> {
    None
}

fn decoder_for(kind: CodecKind) -> Result<Box<dyn CompressionBackend>, CodecError> {
    match kind {
        CodecKind::Lz78 => Ok(Box::new(Lz78Backend)),
        CodecKind::Deflate => native_backend().ok_or(CodecError::Unavailable(kind)),
    }
}
