//! Snapshot records.
//!
//! A [`ContentSnapshot`] is one captured, versioned state of a tab's page
//! text, stored either raw or encoded by one of the codec backends.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::codec::{CodecKind, EncodedBlob};
use super::hash::HashToken;

/// Browser tab identifier.
pub type TabId = u32;

/// Appended to content cut at the configured length limit.
pub const TRUNCATION_MARKER: &str = "\n\n... [Content truncated]";

/// Provenance of a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Init,
    Mutation,
    Navigation,
    Manual,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangeType::Init => "init",
            ChangeType::Mutation => "mutation",
            ChangeType::Navigation => "navigation",
            ChangeType::Manual => "manual",
        };
        f.write_str(name)
    }
}

/// Derived size statistics for a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    /// Host of the captured URL, if it parses.
    pub domain: Option<String>,
    /// Characters actually held in `content`.
    pub content_length: usize,
    /// Characters of the logical text, after truncation and before encoding.
    pub original_length: usize,
    /// `content_length / original_length`, `1.0` when stored raw or empty.
    pub compression_ratio: f64,
    /// Whether [`TRUNCATION_MARKER`] was appended.
    pub truncated: bool,
}

/// A cached capture of a tab's page content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentSnapshot {
    pub tab_id: TabId,
    pub url: String,
    pub title: String,

    /// Stored text; encoded when `compression` is set.
    pub content: String,
    pub compression: Option<CodecKind>,

    pub timestamp: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub version: u32,

    /// Hash of the text as extracted, before truncation or encoding.
    pub content_hash: HashToken,
    pub change_type: ChangeType,
    pub metadata: SnapshotMetadata,
}

impl ContentSnapshot {
    pub fn is_compressed(&self) -> bool {
        self.compression.is_some()
    }

    /// The stored content as a codec blob, if it is encoded.
    pub fn encoded_blob(&self) -> Option<EncodedBlob> {
        self.compression
            .map(|codec| EncodedBlob { codec, data: self.content.clone() })
    }

    /// Time since capture.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.timestamp
    }
}

/// Host part of a URL, `None` for unparseable or host-less URLs.
pub fn domain_of(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
}

/// Cut `content` to `max_chars` characters and append [`TRUNCATION_MARKER`].
///
/// Returns the content unchanged when it already fits.
pub fn truncate_content(content: &str, max_chars: usize) -> (String, bool) {
    match content.char_indices().nth(max_chars) {
        Some((cut, _)) => {
            let mut truncated = String::with_capacity(cut + TRUNCATION_MARKER.len());
            truncated.push_str(&content[..cut]);
            truncated.push_str(TRUNCATION_MARKER);
            (truncated, true)
        }
        None => (content.to_string(), false),
    }
}
