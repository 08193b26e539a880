//! Content access facade.
//!
//! [`ContentService`] is what the rest of the extension talks to: it answers
//! "what is on this tab right now" from the snapshot cache when the cache is
//! fresh enough, and asks the tab's [`ScrapeScheduler`] for a new capture when
//! it is not.

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as Age;
use dashmap::DashMap;
use tokio::task::JoinHandle;

use tabcache_core::cache::Codec;
use tabcache_core::{AppConfig, CacheStats, ChangeType, Error, SnapshotStore, SystemClock, TabId};

use crate::extract::PageSource;
use crate::scrape::{SchedulerConfig, ScrapeOutcome, ScrapeScheduler};

pub struct ContentService {
    store: Arc<SnapshotStore>,
    schedulers: DashMap<TabId, ScrapeScheduler>,
    scheduler_config: SchedulerConfig,
    current_max_age: Age,
    summary_max_age: Age,
}

impl ContentService {
    pub fn new(store: Arc<SnapshotStore>, scheduler_config: SchedulerConfig) -> Self {
        Self {
            store,
            schedulers: DashMap::new(),
            scheduler_config,
            current_max_age: Age::minutes(2),
            summary_max_age: Age::minutes(5),
        }
    }

    /// Service backed by a fresh store built from `config`.
    pub fn from_config(config: &AppConfig) -> Self {
        let store = SnapshotStore::with_parts(
            config.store_config(),
            Codec::with_mode(config.compression),
            Arc::new(SystemClock),
        );
        Self::new(Arc::new(store), SchedulerConfig::from(config))
            .with_freshness(config.current_max_age(), config.summary_max_age())
    }

    pub fn with_freshness(mut self, current: Age, summary: Age) -> Self {
        self.current_max_age = current;
        self.summary_max_age = summary;
        self
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    /// Attach a page to `tab_id`, building its scheduler with the service's settings.
    pub fn attach_page(&self, tab_id: TabId, source: Arc<dyn PageSource>) -> ScrapeScheduler {
        let scheduler = ScrapeScheduler::new(tab_id, Arc::clone(&self.store), source, self.scheduler_config.clone());
        self.register_tab(scheduler.clone());
        scheduler
    }

    /// Register a scheduler, replacing any previous one for the same tab.
    pub fn register_tab(&self, scheduler: ScrapeScheduler) {
        let tab_id = scheduler.tab_id();
        if let Some(previous) = self.schedulers.insert(tab_id, scheduler) {
            previous.shutdown();
        }
        tracing::debug!(tab_id, "tab registered");
    }

    pub fn scheduler(&self, tab_id: TabId) -> Option<ScrapeScheduler> {
        self.schedulers.get(&tab_id).map(|s| s.value().clone())
    }

    /// Latest content for the tab, at most two minutes old unless forced.
    pub async fn get_current_content(&self, tab_id: TabId, force_refresh: bool) -> Result<String, Error> {
        self.content_within(tab_id, self.current_max_age, force_refresh).await
    }

    /// Latest content for summarization, which tolerates older captures.
    pub async fn get_content_for_summary(&self, tab_id: TabId) -> Result<String, Error> {
        self.content_within(tab_id, self.summary_max_age, false).await
    }

    async fn content_within(&self, tab_id: TabId, max_age: Age, force: bool) -> Result<String, Error> {
        if !force
            && self.store.has_recent_content(tab_id, max_age)
            && let Some(content) = self.store.get_latest_content(tab_id)
        {
            tracing::debug!(tab_id, "serving cached content");
            return Ok(content);
        }

        let Some(scheduler) = self.scheduler(tab_id) else {
            return self.store.get_latest_content(tab_id).ok_or(Error::TabNotRegistered(tab_id));
        };

        match scheduler.scrape(ChangeType::Manual, force).await? {
            ScrapeOutcome::Skipped { reason, cached: None } => {
                Err(Error::ContentUnavailable { tab_id, reason: reason.to_string() })
            }
            outcome => outcome
                .into_content()
                .ok_or_else(|| Error::ContentUnavailable { tab_id, reason: "no content".to_string() }),
        }
    }

    /// Start a background scrape of the tab.
    ///
    /// # Errors
    ///
    /// Returns `Error::TabNotRegistered` when no scheduler exists for the tab.
    pub fn trigger_manual_scrape(&self, tab_id: TabId) -> Result<(), Error> {
        let scheduler = self.scheduler(tab_id).ok_or(Error::TabNotRegistered(tab_id))?;
        scheduler.trigger_manual();
        Ok(())
    }

    /// Forget everything cached for the tab. The scheduler stays registered.
    pub fn clear_tab(&self, tab_id: TabId) {
        self.store.clear_tab(tab_id);
        if let Some(scheduler) = self.scheduler(tab_id) {
            scheduler.reset();
        }
    }

    /// Tab closed: stop its scheduler and observers, then drop its snapshots.
    pub fn remove_tab(&self, tab_id: TabId) {
        if let Some((_, scheduler)) = self.schedulers.remove(&tab_id) {
            scheduler.shutdown();
        }
        self.store.clear_tab(tab_id);
        tracing::debug!(tab_id, "tab removed");
    }

    pub fn get_stats(&self) -> CacheStats {
        self.store.get_stats()
    }

    /// Run `SnapshotStore::cleanup` every `every`, first after one full period.
    pub fn spawn_cleanup(&self, every: Duration) -> JoinHandle<()> {
        let every = every.max(Duration::from_millis(1));
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let removed = store.cleanup();
                tracing::debug!(removed, "periodic cleanup ran");
            }
        })
    }
}
