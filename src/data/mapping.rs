//! Static room-group mapping
//!
//! `mapping.json` lists combined room groups and the rooms they cover. It is
//! loaded once at startup into the cache with no expiration, so the cover view
//! can tell that an event booked in "Ballroom" occupies "Salon A".

use std::fs;
use std::path::Path;
use thiserror::Error;

use super::payload::PayloadCache;
use super::{Payload, RoomGroup};
use crate::cache::{Cache, CacheKey, Ttl, KEY_DELIMITER};

/// Key prefix for mapping entries
pub const ROOM_GROUP_PREFIX: &str = "RoomGroupByGroupName";

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("Failed to read room group mapping: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse room group mapping: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Cache key for the mapping entry of `group_name`
pub fn room_group_key(group_name: &str) -> CacheKey {
    CacheKey::new(ROOM_GROUP_PREFIX).segment(group_name)
}

/// Reads the mapping file and installs each group into `cache` with no expiration
///
/// Groups already in the cache (for example restored from a snapshot) are
/// dropped first, so the file is the only source of mapping entries.
pub fn load_room_group_mapping(
    cache: &Cache<Payload>,
    path: &Path,
) -> Result<Vec<RoomGroup>, MappingError> {
    let stale = cache.delete_prefix(&format!("{}{}", ROOM_GROUP_PREFIX, KEY_DELIMITER));
    if stale > 0 {
        tracing::debug!(stale, "dropped previously cached room groups");
    }

    let content = fs::read_to_string(path)?;
    let groups: Vec<RoomGroup> = serde_json::from_str(&content)?;

    for group in &groups {
        cache.set_typed(room_group_key(&group.room_group), group.clone(), Ttl::Never);
    }
    tracing::info!(path = %path.display(), groups = groups.len(), "loaded room group mapping");

    Ok(groups)
}

/// Whether `room` belongs to the mapped group named `group_name`
pub fn room_in_group(cache: &Cache<Payload>, room: &str, group_name: &str) -> bool {
    cache
        .get_typed::<RoomGroup>(room_group_key(group_name).as_str())
        .map(|group| group.rooms.iter().any(|r| r == room))
        .unwrap_or(false)
}
