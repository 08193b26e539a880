//! Core types and shared functionality for tabcache.
//!
//! This crate provides:
//! - The per-tab snapshot cache with hashing, compression and similarity checks
//! - Unified error types
//! - Configuration structures
//! - A clock abstraction shared by the cache and the scheduler

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;

pub use cache::{CacheStats, ChangeType, ContentSnapshot, SnapshotStore, SnapshotWrite, StoreConfig, TabId};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AppConfig, CompressionMode};
pub use error::Error;
