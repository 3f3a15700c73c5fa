//! Versioned response cache for offline support.
//!
//! This module provides:
//! - `CacheStorage`: backend trait, with a SQLite implementation
//! - `CacheBucket`: handle to one named bucket, passed to each handler
//! - `CacheManager`: fills the current bucket on install and drops stale
//!   buckets on activate
//!
//! Bucket names embed a version. Changing the configured name is the only way
//! to invalidate everything cached before.

mod bucket;
mod manager;
mod storage;
mod traits;

pub use bucket::CacheBucket;
pub use manager::CacheManager;
pub use storage::{CacheStorage, SqliteStorage};
pub use traits::{CachedEntry, RequestKey, ResponseSource};
