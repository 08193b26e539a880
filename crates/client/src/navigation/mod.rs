//! Same-document navigation detection.
//!
//! Single-page apps change location without a page load. Two observers cover
//! the ways a host can see that happen: polling the page URL, or forwarding
//! History API calls and `popstate` events as they occur. Both report only
//! URL changes, never repeats of the current location.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};

use crate::extract::PageSource;

/// How a navigation was noticed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationCause {
    Poll,
    PushState,
    ReplaceState,
    PopState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationEvent {
    pub url: String,
    pub cause: NavigationCause,
}

/// A stream of navigations for one tab. `None` means the observer is done.
#[async_trait::async_trait]
pub trait NavigationObserver: Send {
    async fn next_navigation(&mut self) -> Option<NavigationEvent>;
}

/// Checks the page URL on a fixed interval.
pub struct PollingObserver {
    source: Arc<dyn PageSource>,
    interval: Interval,
    last_url: String,
}

impl PollingObserver {
    /// A zero period is raised to one millisecond.
    pub fn new(source: Arc<dyn PageSource>, every: Duration) -> Self {
        let every = every.max(Duration::from_millis(1));
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let last_url = source.url();
        Self { source, interval, last_url }
    }
}

#[async_trait::async_trait]
impl NavigationObserver for PollingObserver {
    async fn next_navigation(&mut self) -> Option<NavigationEvent> {
        loop {
            self.interval.tick().await;
            let url = self.source.url();
            if url != self.last_url {
                self.last_url.clone_from(&url);
                return Some(NavigationEvent { url, cause: NavigationCause::Poll });
            }
        }
    }
}

/// Host-side handle that forwards History API activity.
///
/// Each method returns `false` once the observer has been dropped.
#[derive(Debug, Clone)]
pub struct HistoryEventSender {
    tx: mpsc::UnboundedSender<NavigationEvent>,
}

impl HistoryEventSender {
    fn send(&self, url: &str, cause: NavigationCause) -> bool {
        self.tx.send(NavigationEvent { url: url.to_string(), cause }).is_ok()
    }

    pub fn push_state(&self, url: &str) -> bool {
        self.send(url, NavigationCause::PushState)
    }

    pub fn replace_state(&self, url: &str) -> bool {
        self.send(url, NavigationCause::ReplaceState)
    }

    pub fn pop_state(&self, url: &str) -> bool {
        self.send(url, NavigationCause::PopState)
    }
}

/// Observer fed by a [`HistoryEventSender`]. Ends when every sender is dropped.
#[derive(Debug)]
pub struct HistoryEventObserver {
    rx: mpsc::UnboundedReceiver<NavigationEvent>,
    last_url: String,
}

impl HistoryEventObserver {
    pub fn channel(initial_url: &str) -> (HistoryEventSender, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (HistoryEventSender { tx }, Self { rx, last_url: initial_url.to_string() })
    }
}

#[async_trait::async_trait]
impl NavigationObserver for HistoryEventObserver {
    async fn next_navigation(&mut self) -> Option<NavigationEvent> {
        while let Some(event) = self.rx.recv().await {
            if event.url != self.last_url {
                self.last_url.clone_from(&event.url);
                return Some(event);
            }
            tracing::trace!(url = %event.url, cause = ?event.cause, "history event without url change");
        }
        None
    }
}
