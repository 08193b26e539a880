//! Unified error types for tabcache.
//!
//! Only failures that leave a caller with nothing to show surface here.
//! Compression, decompression and rate limiting are absorbed inside the
//! cache and scheduler and degrade to cached or raw content instead.

/// Unified error type for the content cache.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Page text extraction failed and no cached snapshot exists.
    #[error("EXTRACT_FAILED: {0}")]
    ExtractFailed(String),

    /// A scrape was skipped and the tab has no cached content to fall back on.
    #[error("CONTENT_UNAVAILABLE: tab {tab_id}: {reason}")]
    ContentUnavailable { tab_id: u32, reason: String },

    /// No scheduler registered for the tab and nothing cached for it.
    #[error("TAB_NOT_REGISTERED: {0}")]
    TabNotRegistered(u32),
}

impl Error {
    /// Stable machine-readable code, the prefix of the display string.
    pub fn code(&self) -> &'static str {
        match self {
            Error::ExtractFailed(_) => "EXTRACT_FAILED",
            Error::ContentUnavailable { .. } => "CONTENT_UNAVAILABLE",
            Error::TabNotRegistered(_) => "TAB_NOT_REGISTERED",
        }
    }
}
