use std::ops::Bound;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::error;
use uuid::Uuid;

use crate::error::Result;
use crate::keys::{self, KeyTag};
use crate::models::{Booking, BookingSummary};
use crate::projections::{self, IntervalEntry};
use crate::store::{query_all, KvStore, Query};

#[derive(Clone)]
pub struct BookingRepository {
    store: Arc<dyn KvStore>,
    page_size: usize,
}

impl BookingRepository {
    pub fn new(store: Arc<dyn KvStore>, page_size: usize) -> Self {
        Self { store, page_size }
    }

    pub async fn get_booking(&self, booking_id: Uuid) -> Result<Option<Booking>> {
        let item = self
            .store
            .get(&keys::booking_details(booking_id))
            .await
            .map_err(|err| {
                error!("Error retrieving booking by id {}: {}", booking_id, err);
                err
            })?;
        item.as_ref().map(projections::booking_from_item).transpose()
    }

    /// All of a user's bookings from the user-index copies.
    pub async fn user_bookings(&self, user_id: &str) -> Result<Vec<BookingSummary>> {
        let query = Query::begins_with(keys::user_pk(user_id), KeyTag::Booking.prefix(), self.page_size);
        let items = query_all(self.store.as_ref(), query).await.map_err(|err| {
            error!("Error retrieving bookings for user {}: {}", user_id, err);
            err
        })?;
        items.iter().map(projections::summary_from_item).collect()
    }

    /// Room-interval entries with check-in in `[from, until)`.
    pub async fn room_schedule(
        &self,
        room_id: &str,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<IntervalEntry>> {
        let query = Query::range(
            keys::room_pk(room_id),
            Bound::Included(keys::checkin_sk(from)),
            Bound::Excluded(keys::checkin_sk(until)),
            self.page_size,
        );
        let items = query_all(self.store.as_ref(), query).await.map_err(|err| {
            error!("Error retrieving schedule for room {}: {}", room_id, err);
            err
        })?;
        items.iter().map(projections::interval_entry_from_item).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BookingStatus, Category, Room};
    use crate::store::{MemoryStore, WriteOp};
    use bigdecimal::BigDecimal;
    use chrono::{Duration, TimeZone};

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, day, 12, 0, 0).unwrap()
    }

    fn booking(user_id: &str, room_id: &str, checkin: u32, checkout: u32) -> Booking {
        Booking {
            booking_id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            user_email: format!("{}@example.com", user_id),
            room_id: room_id.to_string(),
            category: Category::Standard,
            checkin: at(checkin),
            checkout: at(checkout),
            status: BookingStatus::Upcoming,
            price_per_night: BigDecimal::from(90),
            created_at: at(1),
        }
    }

    async fn seeded(bookings: &[Booking]) -> BookingRepository {
        let store = Arc::new(MemoryStore::new());
        store
            .transact_write(vec![WriteOp::put_new(projections::room_details_item(&Room::new(
                "R1",
                Category::Standard,
            )))])
            .await
            .unwrap();
        for booking in bookings {
            store
                .transact_write(projections::booking_creation_writes(booking))
                .await
                .unwrap();
        }
        BookingRepository::new(store, 2)
    }

    #[tokio::test]
    async fn details_item_is_the_booking() {
        let b = booking("u-1", "R1", 3, 5);
        let repo = seeded(&[b.clone()]).await;
        assert_eq!(repo.get_booking(b.booking_id).await.unwrap(), Some(b));
        assert!(repo.get_booking(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn user_listing_only_returns_that_user() {
        let mine = [booking("u-1", "R1", 3, 5), booking("u-1", "R1", 6, 8), booking("u-1", "R1", 9, 10)];
        let theirs = booking("u-2", "R1", 11, 12);
        let mut all = mine.to_vec();
        all.push(theirs);
        let repo = seeded(&all).await;

        let listed = repo.user_bookings("u-1").await.unwrap();
        assert_eq!(listed.len(), 3);
        assert!(listed.iter().all(|s| mine.iter().any(|b| b.booking_id == s.booking_id)));
        assert!(repo.user_bookings("u-3").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn schedule_is_bounded_by_checkin() {
        let repo = seeded(&[
            booking("u-1", "R1", 2, 4),
            booking("u-1", "R1", 4, 6),
            booking("u-1", "R1", 8, 9),
        ])
        .await;

        let entries = repo.room_schedule("R1", at(3), at(8)).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].interval.checkin, at(4));

        let entries = repo
            .room_schedule("R1", at(1), at(8) + Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(entries.len(), 3);
    }
}
