//! Interval-overlap queries over the per-category availability index.
//!
//! A request `[checkin, checkout)` can only collide with bookings whose
//! check-in lies in `[checkin - max_stay, checkout)`, so the scan is a single
//! bounded range over the category partition.

use std::collections::HashSet;
use std::ops::Bound;
use std::sync::Arc;

use tracing::{debug, error};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::keys;
use crate::models::{Category, StayInterval};
use crate::projections::{self, IntervalEntry};
use crate::repository::{BookingRepository, RoomRepository};
use crate::store::{query_all, KvStore, Query};

#[derive(Clone)]
pub struct AvailabilityIndex {
    store: Arc<dyn KvStore>,
    rooms: RoomRepository,
    bookings: BookingRepository,
    config: EngineConfig,
}

impl AvailabilityIndex {
    pub fn new(store: Arc<dyn KvStore>, config: EngineConfig) -> Self {
        Self {
            rooms: RoomRepository::new(store.clone(), config.page_size),
            bookings: BookingRepository::new(store.clone(), config.page_size),
            store,
            config,
        }
    }

    /// The range query covering every index entry that could overlap `interval`.
    pub fn scan_window(&self, category: Category, interval: &StayInterval) -> Query {
        Query::range(
            keys::category_pk(category),
            Bound::Included(keys::checkin_sk(interval.checkin - self.config.max_stay)),
            Bound::Excluded(keys::checkin_sk(interval.checkout)),
            self.config.page_size,
        )
    }

    /// Rooms holding an active booking that overlaps `interval`.
    pub async fn blocked_rooms(&self, category: Category, interval: &StayInterval) -> Result<HashSet<String>> {
        let items = query_all(self.store.as_ref(), self.scan_window(category, interval))
            .await
            .map_err(|err| {
                error!("Error scanning {} availability index: {}", category, err);
                err
            })?;

        let mut blocked = HashSet::new();
        for item in &items {
            let entry = projections::interval_entry_from_item(item)?;
            if entry.blocks(interval) {
                blocked.insert(entry.room_id);
            }
        }
        debug!(
            "{} index entries scanned for {}, {} rooms blocked",
            items.len(),
            category,
            blocked.len()
        );
        Ok(blocked)
    }

    /// Room ids of `category` free for the whole of `interval`, in key order.
    /// A category with no rooms yields an empty list.
    pub async fn free_rooms(&self, category: Category, interval: &StayInterval) -> Result<Vec<String>> {
        let rooms = self.rooms.room_ids_by_category(category).await?;
        if rooms.is_empty() {
            return Ok(rooms);
        }
        let blocked = self.blocked_rooms(category, interval).await?;
        Ok(rooms.into_iter().filter(|room| !blocked.contains(room)).collect())
    }

    /// Room-interval entries of one room that could overlap `interval`, blocking or not.
    pub async fn room_entries(&self, room_id: &str, interval: &StayInterval) -> Result<Vec<IntervalEntry>> {
        self.bookings
            .room_schedule(room_id, interval.checkin - self.config.max_stay, interval.checkout)
            .await
    }

    /// Same question as [`free_rooms`](Self::free_rooms) for one room.
    pub async fn room_is_free(&self, room_id: &str, interval: &StayInterval) -> Result<bool> {
        let entries = self.room_entries(room_id, interval).await?;
        Ok(!entries.iter().any(|entry| entry.blocks(interval)))
    }
}
