//! Response cache for offline support.
//!
//! This module provides the store behind the offline worker:
//! - Named cache generations per site scope, one of which is current after activation
//! - Exact request-identity lookups (method + URL)
//! - All-or-nothing precaching of a fixed manifest
//! - A SQLite backend and an in-memory backend

mod layer;
mod storage;
mod traits;

pub use layer::CacheLayer;
pub use storage::{CacheStorage, MemoryStorage, SqliteStorage};
pub use traits::{CacheName, CachedResponse, ResponseSource};
