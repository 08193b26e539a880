//! In-memory, per-tab snapshot history.
//!
//! Each tab owns an ordered history (oldest first) inside a [`DashMap`], so
//! work on different tabs never contends. All expensive work in
//! [`SnapshotStore::add_snapshot`] (hashing, truncation, encoding) happens
//! before the tab's entry is locked; the dedup check, version assignment,
//! append and eviction then run under that single guard.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use super::codec::{Codec, CodecKind};
use super::hash::hash_content;
use super::snapshots::{
    ChangeType, ContentSnapshot, SnapshotMetadata, TabId, domain_of, truncate_content,
};
use crate::clock::{Clock, SystemClock};

/// Limits applied by the store. Fixed once the store is built.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    pub max_snapshots_per_tab: usize,
    /// In characters.
    pub max_content_length: usize,
    /// In characters. Content longer than this is encoded.
    pub compression_threshold: usize,
    pub max_cache_age: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_snapshots_per_tab: 5,
            max_content_length: 500_000,
            compression_threshold: 50_000,
            max_cache_age: Duration::hours(24),
        }
    }
}

/// Result of [`SnapshotStore::add_snapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotWrite {
    /// A new snapshot was appended.
    Appended { version: u32 },
    /// Content matched the latest snapshot; only `last_accessed` moved.
    Deduplicated { version: u32 },
}

impl SnapshotWrite {
    pub fn version(self) -> u32 {
        match self {
            SnapshotWrite::Appended { version } | SnapshotWrite::Deduplicated { version } => version,
        }
    }
}

/// Aggregate counters, recomputed on every call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_tabs: usize,
    pub total_snapshots: usize,
    pub total_content_size: usize,
    pub total_original_size: usize,
    pub avg_compression_ratio: f64,
    pub compressed_snapshots: usize,
}

/// Shared snapshot cache for all tabs.
///
/// Build one per process and hand it out as `Arc<SnapshotStore>`.
pub struct SnapshotStore {
    tabs: DashMap<TabId, VecDeque<ContentSnapshot>>,
    config: StoreConfig,
    codec: Codec,
    clock: Arc<dyn Clock>,
}

impl SnapshotStore {
    /// Store with the best available codec and the system clock.
    pub fn new(config: StoreConfig) -> Self {
        Self::with_parts(config, Codec::detect(), Arc::new(SystemClock))
    }

    pub fn with_parts(config: StoreConfig, codec: Codec, clock: Arc<dyn Clock>) -> Self {
        tracing::debug!(
            max_snapshots_per_tab = config.max_snapshots_per_tab,
            max_content_length = config.max_content_length,
            compression_threshold = config.compression_threshold,
            codec = ?codec.kind(),
            "snapshot store created"
        );
        Self { tabs: DashMap::new(), config, codec, clock }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Clock shared with schedulers built on this store.
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Record a freshly extracted capture for a tab.
    ///
    /// A capture whose hash matches the tab's latest snapshot is not appended;
    /// the existing snapshot's `last_accessed` is refreshed instead. The one
    /// exception is a navigation to a different URL, which always drops the
    /// tab's history and restarts versioning at 1.
    pub fn add_snapshot(
        &self, tab_id: TabId, url: &str, title: &str, content: &str, change_type: ChangeType,
    ) -> SnapshotWrite {
        let content_hash = hash_content(content);
        let (logical, truncated) = truncate_content(content, self.config.max_content_length);
        if truncated {
            tracing::debug!(tab_id, limit = self.config.max_content_length, "content truncated");
        }
        let original_length = logical.chars().count();
        let (stored, compression) = self.encode(logical, original_length);
        let content_length = if compression.is_some() { stored.chars().count() } else { original_length };
        let compression_ratio = if compression.is_some() && original_length > 0 {
            content_length as f64 / original_length as f64
        } else {
            1.0
        };

        let now = self.clock.now();
        let mut entry = self.tabs.entry(tab_id).or_default();
        let history = entry.value_mut();

        if let Some(latest) = history.back_mut()
            && latest.content_hash == content_hash
            && (change_type != ChangeType::Navigation || latest.url == url)
        {
            latest.last_accessed = now;
            tracing::debug!(tab_id, version = latest.version, hash = %content_hash, "duplicate content, refreshed access time");
            return SnapshotWrite::Deduplicated { version: latest.version };
        }

        let version = match history.back() {
            Some(previous) if change_type == ChangeType::Navigation && previous.url != url => {
                tracing::info!(tab_id, from = %previous.url, to = %url, "navigation, clearing tab history");
                history.clear();
                1
            }
            Some(previous) => previous.version + 1,
            None => 1,
        };

        history.push_back(ContentSnapshot {
            tab_id,
            url: url.to_string(),
            title: title.to_string(),
            content: stored,
            compression,
            timestamp: now,
            last_accessed: now,
            version,
            content_hash,
            change_type,
            metadata: SnapshotMetadata {
                domain: domain_of(url),
                content_length,
                original_length,
                compression_ratio,
                truncated,
            },
        });

        while history.len() > self.config.max_snapshots_per_tab.max(1) {
            if let Some(evicted) = history.pop_front() {
                tracing::debug!(tab_id, version = evicted.version, "evicted oldest snapshot");
            }
        }

        tracing::info!(
            tab_id,
            version,
            %change_type,
            length = original_length,
            compressed = compression.is_some(),
            "snapshot stored"
        );
        SnapshotWrite::Appended { version }
    }

    /// Encode when over the threshold and when encoding actually saves space.
    fn encode(&self, logical: String, length: usize) -> (String, Option<CodecKind>) {
        if length <= self.config.compression_threshold {
            return (logical, None);
        }
        match self.codec.compress(&logical) {
            Some(blob) if blob.data.len() < logical.len() => (blob.data, Some(blob.codec)),
            Some(blob) => {
                tracing::debug!(codec = %blob.codec, encoded = blob.data.len(), raw = logical.len(), "encoding did not shrink content, storing raw");
                (logical, None)
            }
            None => (logical, None),
        }
    }

    /// Most recent snapshot for the tab, with `last_accessed` bumped.
    pub fn get_latest_snapshot(&self, tab_id: TabId) -> Option<ContentSnapshot> {
        let now = self.clock.now();
        let mut history = self.tabs.get_mut(&tab_id)?;
        let latest = history.back_mut()?;
        latest.last_accessed = now;
        Some(latest.clone())
    }

    /// Text of the most recent snapshot, decoded if necessary.
    ///
    /// A blob that fails to decode is returned as stored.
    pub fn get_latest_content(&self, tab_id: TabId) -> Option<String> {
        let snapshot = self.get_latest_snapshot(tab_id)?;
        Some(self.decode(snapshot))
    }

    fn decode(&self, snapshot: ContentSnapshot) -> String {
        match snapshot.encoded_blob() {
            Some(blob) => self.codec.decompress(&blob),
            None => snapshot.content,
        }
    }

    /// Whether the tab's latest snapshot was captured less than `max_age` ago.
    pub fn has_recent_content(&self, tab_id: TabId, max_age: Duration) -> bool {
        let now = self.clock.now();
        self.tabs
            .get(&tab_id)
            .and_then(|history| history.back().map(|s| s.age(now) < max_age))
            .unwrap_or(false)
    }

    /// Drop every snapshot for the tab.
    pub fn clear_tab(&self, tab_id: TabId) {
        if let Some((_, history)) = self.tabs.remove(&tab_id) {
            tracing::debug!(tab_id, removed = history.len(), "cleared tab");
        }
    }

    /// Drop snapshots not accessed within `max_cache_age`.
    ///
    /// The newest snapshot of each tab is always kept. Returns how many
    /// snapshots were removed.
    pub fn cleanup(&self) -> usize {
        let cutoff = self.clock.now() - self.config.max_cache_age;
        let mut removed = 0;

        for mut entry in self.tabs.iter_mut() {
            let history = entry.value_mut();
            if history.len() <= 1 {
                continue;
            }
            let newest = history.len() - 1;
            let before = history.len();
            let mut position = 0;
            history.retain(|snapshot| {
                let keep = position == newest || snapshot.last_accessed >= cutoff;
                position += 1;
                keep
            });
            removed += before - history.len();
        }
        self.tabs.retain(|_, history| !history.is_empty());

        if removed > 0 {
            tracing::info!(removed, "cache cleanup removed stale snapshots");
        }
        removed
    }

    pub fn get_stats(&self) -> CacheStats {
        let mut stats = CacheStats {
            total_tabs: 0,
            total_snapshots: 0,
            total_content_size: 0,
            total_original_size: 0,
            avg_compression_ratio: 1.0,
            compressed_snapshots: 0,
        };
        let mut ratio_sum = 0.0;

        for entry in self.tabs.iter() {
            stats.total_tabs += 1;
            for snapshot in entry.value() {
                stats.total_snapshots += 1;
                stats.total_content_size += snapshot.metadata.content_length;
                stats.total_original_size += snapshot.metadata.original_length;
                ratio_sum += snapshot.metadata.compression_ratio;
                if snapshot.is_compressed() {
                    stats.compressed_snapshots += 1;
                }
            }
        }

        if stats.total_snapshots > 0 {
            stats.avg_compression_ratio = ratio_sum / stats.total_snapshots as f64;
        }
        stats
    }

    /// Full history for a tab, oldest first. Does not touch `last_accessed`.
    pub fn snapshots(&self, tab_id: TabId) -> Vec<ContentSnapshot> {
        self.tabs
            .get(&tab_id)
            .map(|history| history.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn snapshot_count(&self, tab_id: TabId) -> usize {
        self.tabs.get(&tab_id).map(|history| history.len()).unwrap_or(0)
    }

    pub fn tab_ids(&self) -> Vec<TabId> {
        let mut ids: Vec<TabId> = self.tabs.iter().map(|entry| *entry.key()).collect();
        ids.sort_unstable();
        ids
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::snapshots::TRUNCATION_MARKER;
    use crate::clock::ManualClock;

    const URL_A: &str = "https://example.com/a";
    const URL_B: &str = "https://example.com/b";

    fn make_store(config: StoreConfig) -> (SnapshotStore, ManualClock) {
        let clock = ManualClock::default();
        let store = SnapshotStore::with_parts(config, Codec::detect(), Arc::new(clock.clone()));
        (store, clock)
    }

    fn page(n: usize) -> String {
        format!("page body revision {n} with some text")
    }

    #[test]
    fn test_first_snapshot_is_version_one() {
        let (store, _) = make_store(StoreConfig::default());
        let write = store.add_snapshot(7, URL_A, "A", "Hello world", ChangeType::Init);
        assert_eq!(write, SnapshotWrite::Appended { version: 1 });

        let snapshot = store.get_latest_snapshot(7).unwrap();
        assert_eq!(snapshot.version, 1);
        assert!(!snapshot.is_compressed());
        assert_eq!(snapshot.metadata.domain.as_deref(), Some("example.com"));
        assert_eq!(snapshot.metadata.compression_ratio, 1.0);
    }

    #[test]
    fn test_identical_content_is_deduplicated() {
        let (store, clock) = make_store(StoreConfig::default());
        store.add_snapshot(1, URL_A, "A", "same text", ChangeType::Init);
        let first_access = store.snapshots(1)[0].last_accessed;

        clock.advance(Duration::seconds(5));
        let write = store.add_snapshot(1, URL_A, "A", "same text", ChangeType::Manual);

        assert_eq!(write, SnapshotWrite::Deduplicated { version: 1 });
        let history = store.snapshots(1);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].last_accessed, first_access + Duration::seconds(5));
    }

    #[test]
    fn test_identical_content_under_new_url_is_deduplicated() {
        let (store, _) = make_store(StoreConfig::default());
        store.add_snapshot(1, URL_A, "A", "same body", ChangeType::Init);

        let write = store.add_snapshot(1, URL_B, "B", "same body", ChangeType::Mutation);
        assert_eq!(write, SnapshotWrite::Deduplicated { version: 1 });
        let history = store.snapshots(1);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].url, URL_A);

        let write = store.add_snapshot(1, URL_B, "B", "same body", ChangeType::Manual);
        assert_eq!(write, SnapshotWrite::Deduplicated { version: 1 });
    }

    #[test]
    fn test_navigation_with_identical_content_still_resets() {
        let (store, _) = make_store(StoreConfig::default());
        store.add_snapshot(1, URL_A, "A", &page(0), ChangeType::Init);
        store.add_snapshot(1, URL_A, "A", "shared shell", ChangeType::Mutation);

        let write = store.add_snapshot(1, URL_B, "B", "shared shell", ChangeType::Navigation);
        assert_eq!(write, SnapshotWrite::Appended { version: 1 });
        let history = store.snapshots(1);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].url, URL_B);
    }

    #[test]
    fn test_versions_increase_at_same_url() {
        let (store, _) = make_store(StoreConfig::default());
        let versions: Vec<u32> = (0..4)
            .map(|n| {
                store
                    .add_snapshot(1, URL_A, "A", &page(n), ChangeType::Mutation)
                    .version()
            })
            .collect();
        assert_eq!(versions, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_navigation_resets_history() {
        let (store, _) = make_store(StoreConfig::default());
        store.add_snapshot(1, URL_A, "A", &page(0), ChangeType::Init);
        store.add_snapshot(1, URL_A, "A", &page(1), ChangeType::Mutation);
        store.add_snapshot(1, URL_A, "A", &page(2), ChangeType::Mutation);

        let write = store.add_snapshot(1, URL_B, "B", "Completely different content", ChangeType::Navigation);

        assert_eq!(write, SnapshotWrite::Appended { version: 1 });
        let history = store.snapshots(1);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].url, URL_B);
    }

    #[test]
    fn test_navigation_to_same_url_increments() {
        let (store, _) = make_store(StoreConfig::default());
        store.add_snapshot(1, URL_A, "A", &page(0), ChangeType::Init);
        let write = store.add_snapshot(1, URL_A, "A", &page(1), ChangeType::Navigation);
        assert_eq!(write.version(), 2);
        assert_eq!(store.snapshot_count(1), 2);
    }

    #[test]
    fn test_url_change_without_navigation_keeps_history() {
        let (store, _) = make_store(StoreConfig::default());
        store.add_snapshot(1, URL_A, "A", &page(0), ChangeType::Init);
        let write = store.add_snapshot(1, URL_B, "B", &page(1), ChangeType::Mutation);
        assert_eq!(write.version(), 2);
        assert_eq!(store.snapshot_count(1), 2);
    }

    #[test]
    fn test_eviction_keeps_newest() {
        let (store, _) = make_store(StoreConfig::default());
        for n in 0..8 {
            store.add_snapshot(1, URL_A, "A", &page(n), ChangeType::Mutation);
        }
        let history = store.snapshots(1);
        assert_eq!(history.len(), 5);
        let versions: Vec<u32> = history.iter().map(|s| s.version).collect();
        assert_eq!(versions, vec![4, 5, 6, 7, 8]);
        assert_eq!(store.get_latest_content(1).unwrap(), page(7));
    }

    #[test]
    fn test_truncation_marker() {
        let config = StoreConfig { max_content_length: 100, compression_threshold: 1_000, ..Default::default() };
        let (store, _) = make_store(config);
        store.add_snapshot(1, URL_A, "A", &"x".repeat(250), ChangeType::Init);

        let content = store.get_latest_content(1).unwrap();
        assert_eq!(content.chars().count(), 100 + TRUNCATION_MARKER.chars().count());
        assert!(content.ends_with(TRUNCATION_MARKER));
        assert!(store.get_latest_snapshot(1).unwrap().metadata.truncated);
    }

    #[test]
    fn test_truncation_with_default_limits_and_compression() {
        let (store, _) = make_store(StoreConfig::default());
        let content = "abcdefghij".repeat(60_000);
        store.add_snapshot(1, URL_A, "A", &content, ChangeType::Init);

        let snapshot = store.get_latest_snapshot(1).unwrap();
        assert!(snapshot.is_compressed());
        let text = store.get_latest_content(1).unwrap();
        assert_eq!(text.chars().count(), 500_000 + TRUNCATION_MARKER.chars().count());
        assert!(text.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn test_large_content_compressed_and_round_trips() {
        let (store, _) = make_store(StoreConfig::default());
        let content = "The quick brown fox jumps over the lazy dog. ".repeat(2_000);
        store.add_snapshot(1, URL_A, "A", &content, ChangeType::Init);

        let snapshot = store.get_latest_snapshot(1).unwrap();
        assert!(snapshot.is_compressed());
        assert!(snapshot.metadata.compression_ratio < 1.0);
        assert_eq!(snapshot.content_hash, hash_content(&content));
        assert_eq!(store.get_latest_content(1).unwrap(), content);
    }

    #[test]
    fn test_fallback_codec_store_round_trip() {
        let store = SnapshotStore::with_parts(StoreConfig::default(), Codec::fallback(), Arc::new(SystemClock));
        let content = "lorem ipsum dolor sit amet ".repeat(4_000);
        store.add_snapshot(1, URL_A, "A", &content, ChangeType::Init);
        assert_eq!(store.get_latest_snapshot(1).unwrap().compression, Some(CodecKind::Lz78));
        assert_eq!(store.get_latest_content(1).unwrap(), content);
    }

    #[test]
    fn test_small_content_never_compressed() {
        let (store, _) = make_store(StoreConfig::default());
        store.add_snapshot(1, URL_A, "A", &"y".repeat(50_000), ChangeType::Init);
        assert!(!store.get_latest_snapshot(1).unwrap().is_compressed());
    }

    #[test]
    fn test_disabled_codec_stores_raw() {
        let store = SnapshotStore::with_parts(StoreConfig::default(), Codec::disabled(), Arc::new(SystemClock));
        store.add_snapshot(1, URL_A, "A", &"z".repeat(80_000), ChangeType::Init);
        assert!(!store.get_latest_snapshot(1).unwrap().is_compressed());
        assert_eq!(store.get_latest_content(1).unwrap().len(), 80_000);
    }

    #[test]
    fn test_corrupt_blob_returns_stored_text() {
        let (store, _) = make_store(StoreConfig::default());
        let content = "repeat me ".repeat(10_000);
        store.add_snapshot(1, URL_A, "A", &content, ChangeType::Init);
        if let Some(mut history) = store.tabs.get_mut(&1)
            && let Some(latest) = history.back_mut()
        {
            latest.content = "@@not an encoding@@".to_string();
        }
        assert_eq!(store.get_latest_content(1).unwrap(), "@@not an encoding@@");
    }

    #[test]
    fn test_get_latest_bumps_access_time() {
        let (store, clock) = make_store(StoreConfig::default());
        store.add_snapshot(1, URL_A, "A", "text", ChangeType::Init);
        clock.advance(Duration::minutes(3));
        let snapshot = store.get_latest_snapshot(1).unwrap();
        assert_eq!(snapshot.last_accessed, snapshot.timestamp + Duration::minutes(3));
    }

    #[test]
    fn test_missing_tab() {
        let (store, _) = make_store(StoreConfig::default());
        assert!(store.get_latest_snapshot(42).is_none());
        assert!(store.get_latest_content(42).is_none());
        assert!(!store.has_recent_content(42, Duration::minutes(5)));
    }

    #[test]
    fn test_has_recent_content() {
        let (store, clock) = make_store(StoreConfig::default());
        store.add_snapshot(1, URL_A, "A", "text", ChangeType::Init);
        assert!(store.has_recent_content(1, Duration::minutes(2)));
        clock.advance(Duration::minutes(2));
        assert!(!store.has_recent_content(1, Duration::minutes(2)));
        assert!(store.has_recent_content(1, Duration::minutes(5)));
    }

    #[test]
    fn test_clear_tab() {
        let (store, _) = make_store(StoreConfig::default());
        store.add_snapshot(1, URL_A, "A", "one", ChangeType::Init);
        store.add_snapshot(2, URL_B, "B", "two", ChangeType::Init);
        store.clear_tab(1);
        assert!(store.get_latest_content(1).is_none());
        assert_eq!(store.tab_ids(), vec![2]);
    }

    #[test]
    fn test_cleanup_keeps_newest_snapshot() {
        let (store, clock) = make_store(StoreConfig::default());
        for n in 0..3 {
            store.add_snapshot(1, URL_A, "A", &page(n), ChangeType::Mutation);
        }
        store.add_snapshot(2, URL_B, "B", "lonely", ChangeType::Init);

        clock.advance(Duration::hours(25));
        let removed = store.cleanup();

        assert_eq!(removed, 2);
        let history = store.snapshots(1);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].version, 3);
        assert_eq!(store.snapshot_count(2), 1);
    }

    #[test]
    fn test_cleanup_respects_recent_access() {
        let (store, clock) = make_store(StoreConfig::default());
        store.add_snapshot(1, URL_A, "A", &page(0), ChangeType::Init);
        store.add_snapshot(1, URL_A, "A", &page(1), ChangeType::Mutation);

        clock.advance(Duration::hours(23));
        assert_eq!(store.cleanup(), 0);
        assert_eq!(store.snapshot_count(1), 2);
    }

    #[test]
    fn test_stats() {
        let (store, _) = make_store(StoreConfig::default());
        assert_eq!(store.get_stats().total_snapshots, 0);
        assert_eq!(store.get_stats().avg_compression_ratio, 1.0);

        store.add_snapshot(1, URL_A, "A", "small", ChangeType::Init);
        store.add_snapshot(1, URL_A, "A", "small but different", ChangeType::Mutation);
        store.add_snapshot(2, URL_B, "B", &"big chunk of text ".repeat(5_000), ChangeType::Init);

        let stats = store.get_stats();
        assert_eq!(stats.total_tabs, 2);
        assert_eq!(stats.total_snapshots, 3);
        assert_eq!(stats.compressed_snapshots, 1);
        assert!(stats.total_content_size < stats.total_original_size);
        assert!(stats.avg_compression_ratio < 1.0);
    }

    #[test]
    fn test_concurrent_tabs() {
        let store = Arc::new(SnapshotStore::default());
        let handles: Vec<_> = (0..8u32)
            .map(|tab| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for n in 0..10 {
                        store.add_snapshot(tab, URL_A, "A", &format!("tab {tab} rev {n}"), ChangeType::Mutation);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        for tab in 0..8u32 {
            assert_eq!(store.get_latest_snapshot(tab).unwrap().version, 10);
            assert_eq!(store.snapshot_count(tab), 5);
        }
    }
}
