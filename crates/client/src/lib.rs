//! Tab-side half of tabcache.
//!
//! Watches a page for changes, decides when to capture it, and serves the
//! freshest usable capture from the shared [`SnapshotStore`](tabcache_core::SnapshotStore).

pub mod extract;
pub mod navigation;
pub mod scrape;
pub mod service;
pub mod telemetry;

pub use extract::{ExtractError, MemoryPage, PageSource};
pub use navigation::{
    HistoryEventObserver, HistoryEventSender, NavigationCause, NavigationEvent, NavigationObserver, PollingObserver,
};
pub use scrape::{
    MutatedNode, MutationRecord, SchedulerConfig, ScrapeOutcome, ScrapeScheduler, ScrapeState, SkipReason,
};
pub use service::ContentService;
