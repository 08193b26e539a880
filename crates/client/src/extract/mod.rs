//! Page text extraction seam.
//!
//! Readability-style extraction happens in the host page; the scheduler only
//! sees it through the [`PageSource`] trait. [`MemoryPage`] is an in-process
//! implementation that host adapters and trace replays push page state into.

mod page;

pub use page::MemoryPage;

use thiserror::Error;

/// Errors raised by a page source while extracting text.
#[derive(Debug, Clone, Error)]
pub enum ExtractError {
    /// The document is not in a state that can be read yet.
    #[error("page not ready: {0}")]
    NotReady(String),

    /// The extractor ran and failed.
    #[error("extraction failed: {0}")]
    Failed(String),
}

/// The live page a scheduler captures from.
///
/// `url` and `title` are cheap reads of the current location and document
/// title. `extract_text` runs the (possibly slow) readable-text extraction.
#[async_trait::async_trait]
pub trait PageSource: Send + Sync {
    fn url(&self) -> String;

    fn title(&self) -> String;

    async fn extract_text(&self) -> Result<String, ExtractError>;
}
