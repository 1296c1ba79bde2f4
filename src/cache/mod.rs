//! Response cache shared by the token manager and the API client
//!
//! This module provides a generic in-memory TTL store, the composite key builder
//! used by every cached call site, and single-file snapshot persistence so the
//! cache survives restarts.

mod key;
pub mod snapshot;
mod store;

pub use key::{CacheKey, KEY_DELIMITER};
pub use snapshot::{load_or_empty, load_snapshot, save_snapshot, SnapshotError};
pub use store::{Cache, CacheEntry, Ttl, DEFAULT_TTL_MINUTES};
