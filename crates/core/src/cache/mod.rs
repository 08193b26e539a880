//! In-memory content cache for tab snapshots.
//!
//! This module provides the change-detection and storage half of tabcache:
//!
//! - Rolling content hashes for no-op re-scrape detection
//! - Tagged compression with a native and a pure fallback backend
//! - Length and chunk-sampling similarity heuristics
//! - A per-tab versioned snapshot store with eviction and age cleanup

pub mod codec;
pub mod hash;
pub mod similarity;
pub mod snapshots;
pub mod store;

pub use codec::{Codec, CodecError, CodecKind, CompressionBackend, EncodedBlob};
pub use hash::{HashToken, hash_content};
pub use similarity::{is_significant_change, similarity};
pub use snapshots::{ChangeType, ContentSnapshot, SnapshotMetadata, TRUNCATION_MARKER, TabId, truncate_content};
pub use store::{CacheStats, SnapshotStore, SnapshotWrite, StoreConfig};
