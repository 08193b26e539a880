//! Scrape scheduling for a single tab.
//!
//! ### Triggers
//! - `init` and `manual` scrape immediately.
//! - `mutation` and `navigation` go through a trailing [`Debouncer`]; a burst
//!   collapses into one scrape that reads the page as it is when the timer
//!   fires.
//! - A debounced scrape that fires while another scrape is running re-arms
//!   the timer, so the change lands after the running scrape finishes.
//! - Mutation batches are filtered by [`is_significant_batch`] first.
//!
//! ### Gates
//! - Repeat scrapes of the last stored URL within `duplicate_url_window` are
//!   skipped (everything but `init`).
//! - A sliding-window [`RateLimiter`] caps scrapes per tab.
//!
//! Skips are not failures: the outcome carries the tab's cached content.
//!
//! [`ScrapeScheduler::shutdown`] stops everything for a closed tab: pending
//! timers, observer tasks and any scrape that has not yet stored.
//!
//! ### Pipeline
//! extract → hash → drop unchanged hashes (unless forced or navigating) →
//! drop insignificant mutations → [`SnapshotStore::add_snapshot`].

pub mod debounce;
pub mod mutation;
pub mod rate_limit;

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::task::{AbortHandle, JoinHandle};

use tabcache_core::cache::{HashToken, hash_content, is_significant_change, truncate_content};
use tabcache_core::{AppConfig, ChangeType, Clock, Error, SnapshotStore, SnapshotWrite, TabId};

pub use debounce::Debouncer;
pub use mutation::{MutatedNode, MutationRecord, is_significant_batch};
pub use rate_limit::{RateDecision, RateLimiter};

use crate::extract::PageSource;
use crate::navigation::NavigationObserver;

/// Scheduler tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    pub debounce: std::time::Duration,
    pub max_scrapes: usize,
    pub rate_limit_window: chrono::Duration,
    pub backoff_base: chrono::Duration,
    pub backoff_max: chrono::Duration,
    pub duplicate_url_window: chrono::Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for SchedulerConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            debounce: config.debounce(),
            max_scrapes: config.rate_limit_max_scrapes,
            rate_limit_window: config.rate_limit_window(),
            backoff_base: config.backoff_base(),
            backoff_max: config.backoff_max(),
            duplicate_url_window: config.duplicate_url_window(),
        }
    }
}

/// Why a scrape did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    RateLimited,
    DuplicateUrl,
    /// Another scrape was running; the debounced scrape was re-armed.
    InFlight,
    /// The scheduler was shut down.
    Closed,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::RateLimited => f.write_str("rate limited"),
            SkipReason::DuplicateUrl => f.write_str("duplicate url"),
            SkipReason::InFlight => f.write_str("scrape in flight"),
            SkipReason::Closed => f.write_str("scheduler closed"),
        }
    }
}

/// What a scrape attempt did.
#[derive(Debug, Clone, PartialEq)]
pub enum ScrapeOutcome {
    /// Extracted and handed to the store.
    Stored { content: String, write: SnapshotWrite },
    /// Extracted, but the hash matched the last stored scrape.
    Unchanged { content: String },
    /// Extracted mutation content too close to the cached snapshot.
    Insignificant { content: String },
    /// Not run; `cached` is the tab's latest content, if any.
    Skipped { reason: SkipReason, cached: Option<String> },
    /// Extraction failed and the cached content stands in.
    Recovered { cached: String, error: String },
}

impl ScrapeOutcome {
    /// The best content this attempt can offer.
    pub fn into_content(self) -> Option<String> {
        match self {
            ScrapeOutcome::Stored { content, .. }
            | ScrapeOutcome::Unchanged { content }
            | ScrapeOutcome::Insignificant { content } => Some(content),
            ScrapeOutcome::Skipped { cached, .. } => cached,
            ScrapeOutcome::Recovered { cached, .. } => Some(cached),
        }
    }

    pub fn is_stored(&self) -> bool {
        matches!(self, ScrapeOutcome::Stored { write: SnapshotWrite::Appended { .. }, .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            ScrapeOutcome::Stored { .. } => "stored",
            ScrapeOutcome::Unchanged { .. } => "unchanged",
            ScrapeOutcome::Insignificant { .. } => "insignificant",
            ScrapeOutcome::Skipped { .. } => "skipped",
            ScrapeOutcome::Recovered { .. } => "recovered",
        }
    }
}

/// Whether a scrape is currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeState {
    Idle,
    Scraping,
}

#[derive(Debug, Clone)]
struct LastScrape {
    url: String,
    at: DateTime<Utc>,
    hash: HashToken,
}

struct Inner {
    tab_id: TabId,
    store: Arc<SnapshotStore>,
    source: Arc<dyn PageSource>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    limiter: RateLimiter,
    debouncer: Debouncer,
    in_flight: AtomicUsize,
    closed: AtomicBool,
    observers: Mutex<Vec<AbortHandle>>,
    last: Mutex<Option<LastScrape>>,
}

struct FlightGuard<'a>(&'a AtomicUsize);

impl<'a> FlightGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Decides when a tab's page is re-extracted and feeds the results into
/// the shared [`SnapshotStore`].
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ScrapeScheduler {
    inner: Arc<Inner>,
}

impl ScrapeScheduler {
    /// Scheduler using the store's clock.
    pub fn new(tab_id: TabId, store: Arc<SnapshotStore>, source: Arc<dyn PageSource>, config: SchedulerConfig) -> Self {
        let clock = store.clock();
        Self::with_clock(tab_id, store, source, clock, config)
    }

    pub fn with_clock(
        tab_id: TabId, store: Arc<SnapshotStore>, source: Arc<dyn PageSource>, clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        let limiter = RateLimiter::new(
            config.max_scrapes,
            config.rate_limit_window,
            config.backoff_base,
            config.backoff_max,
        );
        let debouncer = Debouncer::new(config.debounce);
        Self {
            inner: Arc::new(Inner {
                tab_id,
                store,
                source,
                clock,
                config,
                limiter,
                debouncer,
                in_flight: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
                observers: Mutex::new(Vec::new()),
                last: Mutex::new(None),
            }),
        }
    }

    pub fn tab_id(&self) -> TabId {
        self.inner.tab_id
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    pub fn state(&self) -> ScrapeState {
        if self.inner.in_flight.load(Ordering::SeqCst) > 0 { ScrapeState::Scraping } else { ScrapeState::Idle }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Stop the scheduler for good.
    ///
    /// Cancels the pending debounced scrape and aborts every observer task
    /// started by [`ScrapeScheduler::watch_navigation`]. Scrapes that are
    /// already running finish without storing.
    pub fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.debouncer.cancel_pending();
        let mut observers = self.inner.observers.lock().unwrap_or_else(|e| e.into_inner());
        for observer in observers.drain(..) {
            observer.abort();
        }
        tracing::debug!(tab_id = self.inner.tab_id, "scheduler shut down");
    }

    /// First capture after the page loads.
    pub async fn init(&self) -> Result<ScrapeOutcome, Error> {
        self.scrape(ChangeType::Init, false).await
    }

    /// Feed a mutation observer batch. Returns whether a scrape was scheduled.
    pub fn on_mutations(&self, records: &[MutationRecord]) -> bool {
        if self.is_closed() {
            return false;
        }
        if !is_significant_batch(records) {
            tracing::trace!(tab_id = self.inner.tab_id, records = records.len(), "cosmetic mutations ignored");
            return false;
        }
        self.schedule_debounced(ChangeType::Mutation);
        true
    }

    /// Report a same-document URL change.
    pub fn on_navigation(&self, url: &str) {
        tracing::debug!(tab_id = self.inner.tab_id, url, "navigation detected");
        self.schedule_debounced(ChangeType::Navigation);
    }

    /// Fire-and-forget manual scrape. Must be called within a tokio runtime.
    pub fn trigger_manual(&self) {
        let scheduler = self.clone();
        tokio::spawn(async move {
            let result = scheduler.scrape(ChangeType::Manual, false).await;
            scheduler.log_result(ChangeType::Manual, &result);
        });
    }

    /// Drop a pending debounced scrape. Returns whether one was waiting.
    pub fn cancel_pending(&self) -> bool {
        self.inner.debouncer.cancel_pending()
    }

    pub fn has_pending(&self) -> bool {
        self.inner.debouncer.is_pending()
    }

    /// Drive `on_navigation` from an observer until it finishes or the
    /// scheduler shuts down.
    pub fn watch_navigation<O>(&self, mut observer: O) -> JoinHandle<()>
    where
        O: NavigationObserver + 'static,
    {
        let scheduler = self.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = observer.next_navigation().await {
                if scheduler.is_closed() {
                    break;
                }
                tracing::debug!(tab_id = scheduler.tab_id(), url = %event.url, cause = ?event.cause, "observer reported navigation");
                scheduler.on_navigation(&event.url);
            }
        });

        let mut observers = self.inner.observers.lock().unwrap_or_else(|e| e.into_inner());
        if self.is_closed() {
            task.abort();
        } else {
            observers.retain(|handle| !handle.is_finished());
            observers.push(task.abort_handle());
        }
        task
    }

    fn schedule_debounced(&self, change_type: ChangeType) {
        if self.is_closed() {
            return;
        }
        let scheduler = self.clone();
        self.inner.debouncer.schedule(async move {
            let result = scheduler.scrape_coalesced(change_type).await;
            scheduler.log_result(change_type, &result);
        });
    }

    async fn scrape_coalesced(&self, change_type: ChangeType) -> Result<ScrapeOutcome, Error> {
        if self.state() == ScrapeState::Scraping {
            tracing::debug!(tab_id = self.inner.tab_id, %change_type, "scrape in flight, re-arming");
            self.schedule_debounced(change_type);
            return Ok(self.skipped(SkipReason::InFlight));
        }
        self.scrape(change_type, false).await
    }

    /// Run one scrape now.
    ///
    /// `force` stores the capture even when its hash matches the last one.
    ///
    /// # Errors
    ///
    /// Returns `Error::ExtractFailed` only when extraction fails and the tab
    /// has nothing cached.
    pub async fn scrape(&self, change_type: ChangeType, force: bool) -> Result<ScrapeOutcome, Error> {
        let inner = &self.inner;
        let tab_id = inner.tab_id;
        if self.is_closed() {
            return Ok(self.skipped(SkipReason::Closed));
        }

        let url = inner.source.url();
        let now = inner.clock.now();

        if change_type != ChangeType::Init && self.is_duplicate_url(&url, now) {
            tracing::debug!(tab_id, %url, %change_type, "same url scraped moments ago, skipping");
            return Ok(self.skipped(SkipReason::DuplicateUrl));
        }

        match inner.limiter.try_acquire(now) {
            RateDecision::Allowed => {}
            RateDecision::Limited { until } | RateDecision::BackingOff { until } => {
                tracing::info!(tab_id, %change_type, %until, "scrape rate limited, using cache");
                return Ok(self.skipped(SkipReason::RateLimited));
            }
        }

        let _flight = FlightGuard::enter(&inner.in_flight);

        let text = match inner.source.extract_text().await {
            Ok(text) => text,
            Err(e) => {
                return match inner.store.get_latest_content(tab_id) {
                    Some(cached) => {
                        tracing::warn!(tab_id, error = %e, "extraction failed, serving cached content");
                        Ok(ScrapeOutcome::Recovered { cached, error: e.to_string() })
                    }
                    None => Err(Error::ExtractFailed(e.to_string())),
                };
            }
        };

        let hash = hash_content(&text);
        let forced = force || change_type == ChangeType::Navigation;
        if !forced && self.last_hash() == Some(hash) {
            tracing::debug!(tab_id, %hash, "content unchanged since last scrape");
            return Ok(ScrapeOutcome::Unchanged { content: text });
        }

        // Stored content is already cut to the store's limit.
        if change_type == ChangeType::Mutation
            && let Some(previous) = inner.store.get_latest_content(tab_id)
            && !is_significant_change(
                &previous,
                &truncate_content(&text, inner.store.config().max_content_length).0,
                change_type,
            )
        {
            tracing::debug!(tab_id, "mutation below significance threshold");
            return Ok(ScrapeOutcome::Insignificant { content: text });
        }

        if self.is_closed() {
            return Ok(self.skipped(SkipReason::Closed));
        }

        let title = inner.source.title();
        let write = inner.store.add_snapshot(tab_id, &url, &title, &text, change_type);
        self.record_last(LastScrape { url, at: inner.clock.now(), hash });

        Ok(ScrapeOutcome::Stored { content: text, write })
    }

    fn skipped(&self, reason: SkipReason) -> ScrapeOutcome {
        ScrapeOutcome::Skipped { reason, cached: self.inner.store.get_latest_content(self.inner.tab_id) }
    }

    fn is_duplicate_url(&self, url: &str, now: DateTime<Utc>) -> bool {
        let last = self.inner.last.lock().unwrap_or_else(|e| e.into_inner());
        last.as_ref()
            .is_some_and(|last| last.url == url && now - last.at < self.inner.config.duplicate_url_window)
    }

    fn last_hash(&self) -> Option<HashToken> {
        let last = self.inner.last.lock().unwrap_or_else(|e| e.into_inner());
        last.as_ref().map(|last| last.hash)
    }

    fn record_last(&self, scrape: LastScrape) {
        let mut last = self.inner.last.lock().unwrap_or_else(|e| e.into_inner());
        *last = Some(scrape);
    }

    /// Forget the last-scrape bookkeeping, e.g. after the tab's cache is cleared.
    pub fn reset(&self) {
        let mut last = self.inner.last.lock().unwrap_or_else(|e| e.into_inner());
        *last = None;
    }

    fn log_result(&self, change_type: ChangeType, result: &Result<ScrapeOutcome, Error>) {
        match result {
            Ok(outcome) => {
                tracing::debug!(tab_id = self.inner.tab_id, %change_type, outcome = outcome.label(), "scrape finished")
            }
            Err(e) => tracing::warn!(tab_id = self.inner.tab_id, %change_type, error = %e, "scrape failed"),
        }
    }
}
