//! Caching layer for progress data and the durable key-value store behind it.
//!
//! This module provides:
//! - A defensive wrapper over the durable store (failures read as "absent")
//! - The progress cache with per-entry TTL and lazy eviction
//! - Board-scoped keys with an explicit any-board lookup for detail views

mod layer;
mod storage;
mod traits;

pub use layer::{Lookup, ProgressCache};
pub use storage::{keys, DurableStore, MemoryStore};
pub use traits::{CacheResult, CacheSource, KeyValueStore};
