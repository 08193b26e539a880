//! In-memory page source.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{ExtractError, PageSource};

#[derive(Debug, Clone)]
struct PageState {
    url: String,
    title: String,
    text: String,
    failure: Option<ExtractError>,
}

/// A page whose location, title and text are set from outside.
///
/// Counts how many extractions ran, which makes it the natural stand-in
/// for the live document in tests and trace replays.
#[derive(Debug)]
pub struct MemoryPage {
    state: Mutex<PageState>,
    extractions: AtomicUsize,
}

impl MemoryPage {
    pub fn new(url: impl Into<String>, title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(PageState { url: url.into(), title: title.into(), text: text.into(), failure: None }),
            extractions: AtomicUsize::new(0),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut PageState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    pub fn set_text(&self, text: impl Into<String>) {
        let text = text.into();
        self.with_state(|s| s.text = text);
    }

    pub fn set_title(&self, title: impl Into<String>) {
        let title = title.into();
        self.with_state(|s| s.title = title);
    }

    /// Move to a new location with new content.
    pub fn navigate(&self, url: impl Into<String>, title: impl Into<String>, text: impl Into<String>) {
        let (url, title, text) = (url.into(), title.into(), text.into());
        self.with_state(|s| {
            s.url = url;
            s.title = title;
            s.text = text;
        });
    }

    /// Make every extraction fail until [`MemoryPage::recover`] is called.
    pub fn fail_with(&self, error: ExtractError) {
        self.with_state(|s| s.failure = Some(error));
    }

    pub fn recover(&self) {
        self.with_state(|s| s.failure = None);
    }

    /// Number of extractions attempted so far.
    pub fn extraction_count(&self) -> usize {
        self.extractions.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl PageSource for MemoryPage {
    fn url(&self) -> String {
        self.with_state(|s| s.url.clone())
    }

    fn title(&self) -> String {
        self.with_state(|s| s.title.clone())
    }

    async fn extract_text(&self) -> Result<String, ExtractError> {
        self.extractions.fetch_add(1, Ordering::SeqCst);
        self.with_state(|s| match &s.failure {
            Some(err) => Err(err.clone()),
            None => Ok(s.text.clone()),
        })
    }
}
