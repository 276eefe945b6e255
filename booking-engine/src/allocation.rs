//! Turns a validated request into a committed booking.
//!
//! The free-room read is advisory. What makes an allocation safe is the
//! single conditional transaction that writes the four booking projections
//! together with a claim on the room's `allocation_seq`.

use std::sync::Arc;

use bigdecimal::BigDecimal;
use rand::seq::SliceRandom;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::availability::AvailabilityIndex;
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::{BookingError, Result, StoreError};
use crate::models::{Booking, BookingStatus, Category, StayInterval, User};
use crate::projections;
use crate::repository::RoomRepository;
use crate::store::KvStore;

/// Picks one room out of a non-empty set of verified candidates.
pub trait RoomSelector: Send + Sync {
    fn select<'a>(&self, candidates: &'a [String]) -> Option<&'a String>;
}

/// Uniform random choice.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomSelector;

impl RoomSelector for RandomSelector {
    fn select<'a>(&self, candidates: &'a [String]) -> Option<&'a String> {
        candidates.choose(&mut rand::thread_rng())
    }
}

/// Always the first candidate in key order.
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstAvailable;

impl RoomSelector for FirstAvailable {
    fn select<'a>(&self, candidates: &'a [String]) -> Option<&'a String> {
        candidates.first()
    }
}

#[derive(Debug, Clone)]
pub struct AllocationRequest {
    pub category: Category,
    pub interval: StayInterval,
    pub user: User,
    pub price_per_night: BigDecimal,
}

enum Attempt {
    Committed(Booking),
    /// Another writer got in between our read and our write.
    Lost,
    Exhausted,
}

pub struct Allocator {
    store: Arc<dyn KvStore>,
    index: AvailabilityIndex,
    rooms: RoomRepository,
    selector: Arc<dyn RoomSelector>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl Allocator {
    pub fn new(
        store: Arc<dyn KvStore>,
        config: EngineConfig,
        selector: Arc<dyn RoomSelector>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            index: AvailabilityIndex::new(store.clone(), config.clone()),
            rooms: RoomRepository::new(store.clone(), config.page_size),
            store,
            selector,
            clock,
            config,
        }
    }

    /// Commits a booking on some free room of the category, retrying a lost
    /// race at most `allocation_retries` times.
    pub async fn allocate(&self, request: &AllocationRequest) -> Result<Booking> {
        // A stay longer than max_stay would start before later scan windows.
        request
            .interval
            .validate_for_booking(self.clock.now(), self.config.max_stay)?;
        let attempts = 1 + self.config.allocation_retries;
        for attempt in 1..=attempts {
            match self.attempt(request).await? {
                Attempt::Committed(booking) => return Ok(booking),
                Attempt::Exhausted => break,
                Attempt::Lost => {
                    warn!(
                        "Allocation race lost for {} {} to {} (attempt {}/{})",
                        request.category,
                        request.interval.checkin,
                        request.interval.checkout,
                        attempt,
                        attempts
                    );
                }
            }
        }
        Err(BookingError::NoAvailability {
            category: request.category.to_string(),
            checkin: request.interval.checkin.to_rfc3339(),
            checkout: request.interval.checkout.to_rfc3339(),
        })
    }

    async fn attempt(&self, request: &AllocationRequest) -> Result<Attempt> {
        let mut candidates = self.index.free_rooms(request.category, &request.interval).await?;

        loop {
            let room_id = match self.selector.select(&candidates) {
                Some(room_id) => room_id.clone(),
                None => return Ok(Attempt::Exhausted),
            };

            // The sequence must be read before the re-check so that any booking
            // committed after the re-check also invalidates the claim.
            let room = self
                .rooms
                .get_room(&room_id)
                .await?
                .ok_or_else(|| {
                    BookingError::Consistency(format!(
                        "room {} is listed in {} but has no details",
                        room_id, request.category
                    ))
                })?;
            let entries = self.index.room_entries(&room_id, &request.interval).await?;
            if entries.iter().any(|entry| entry.blocks(&request.interval)) {
                debug!("Room {} taken since the availability scan", room_id);
                candidates.retain(|candidate| candidate != &room_id);
                continue;
            }
            let reclaim = entries
                .iter()
                .any(|entry| entry.interval.checkin == request.interval.checkin);

            let booking = Booking {
                booking_id: Uuid::new_v4(),
                user_id: request.user.user_id.clone(),
                user_email: request.user.email.clone(),
                room_id: room_id.clone(),
                category: request.category,
                checkin: request.interval.checkin,
                checkout: request.interval.checkout,
                status: BookingStatus::Upcoming,
                price_per_night: request.price_per_night.clone(),
                created_at: self.clock.now(),
            };
            let mut ops = if reclaim {
                projections::booking_writes_reclaiming_slots(&booking)
            } else {
                projections::booking_creation_writes(&booking)
            };
            ops.push(projections::room_claim(&room_id, room.allocation_seq));

            return match self.store.transact_write(ops).await {
                Ok(()) => {
                    info!(
                        "Booking {} allocated room {} for user {}",
                        booking.booking_id, room_id, booking.user_id
                    );
                    Ok(Attempt::Committed(booking))
                }
                Err(StoreError::ConditionFailed { key, .. }) => {
                    debug!("Allocation of room {} rejected on {}", room_id, key);
                    Ok(Attempt::Lost)
                }
                Err(err) => Err(err.into()),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::models::UserRole;
    use crate::store::MemoryStore;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, day, 10, 0, 0).unwrap()
    }

    fn request(from: u32, to: u32) -> AllocationRequest {
        AllocationRequest {
            category: Category::Suite,
            interval: StayInterval::new(at(from), at(to)).unwrap(),
            user: User {
                user_id: "u-1".to_string(),
                email: "ada@example.com".to_string(),
                name: "Ada".to_string(),
                role: UserRole::Customer,
            },
            price_per_night: BigDecimal::from(300),
        }
    }

    async fn allocator(rooms: &[&str]) -> (Arc<MemoryStore>, Allocator) {
        let store = Arc::new(MemoryStore::new());
        let repo = RoomRepository::new(store.clone(), 10);
        for room in rooms {
            repo.add_room(room, Category::Suite).await.unwrap();
        }
        let allocator = Allocator::new(
            store.clone(),
            EngineConfig::default(),
            Arc::new(FirstAvailable),
            Arc::new(FixedClock::new(at(1))),
        );
        (store, allocator)
    }

    #[tokio::test]
    async fn over_long_stay_is_rejected_before_any_write() {
        let store = Arc::new(MemoryStore::new());
        RoomRepository::new(store.clone(), 10)
            .add_room("R1", Category::Suite)
            .await
            .unwrap();
        let allocator = Allocator::new(
            store.clone(),
            EngineConfig::default().with_max_stay_days(3),
            Arc::new(FirstAvailable),
            Arc::new(FixedClock::new(at(1))),
        );
        let commits = store.committed_transactions();

        let err = allocator.allocate(&request(2, 21)).await.unwrap_err();
        assert!(matches!(err, BookingError::InvalidInterval(_)));
        assert_eq!(store.committed_transactions(), commits);

        let booking = allocator.allocate(&request(11, 12)).await.unwrap();
        assert_eq!(booking.room_id, "R1");
    }

    #[tokio::test]
    async fn past_checkin_is_rejected() {
        let (_, allocator) = allocator(&["R1"]).await;
        let err = allocator.allocate(&request(1, 3)).await.unwrap_err();
        assert!(matches!(err, BookingError::InvalidInterval(_)));
    }

    #[test]
    fn selectors_only_pick_candidates() {
        let candidates = vec!["R1".to_string(), "R2".to_string()];
        assert_eq!(FirstAvailable.select(&candidates), Some(&candidates[0]));
        for _ in 0..20 {
            assert!(candidates.contains(RandomSelector.select(&candidates).unwrap()));
        }
        let none: Vec<String> = Vec::new();
        assert!(RandomSelector.select(&none).is_none());
    }

    #[tokio::test]
    async fn allocation_claims_the_room() {
        let (store, allocator) = allocator(&["R1"]).await;
        let booking = allocator.allocate(&request(2, 4)).await.unwrap();

        assert_eq!(booking.room_id, "R1");
        assert_eq!(booking.status, BookingStatus::Upcoming);
        assert_eq!(booking.created_at, at(1));
        let room = RoomRepository::new(store, 10).get_room("R1").await.unwrap().unwrap();
        assert_eq!(room.allocation_seq, 1);
    }

    #[tokio::test]
    async fn full_category_reports_no_availability() {
        let (store, allocator) = allocator(&["R1"]).await;
        allocator.allocate(&request(2, 4)).await.unwrap();
        let commits = store.committed_transactions();

        let err = allocator.allocate(&request(3, 5)).await.unwrap_err();
        assert!(matches!(err, BookingError::NoAvailability { .. }));
        assert_eq!(store.committed_transactions(), commits);
    }

    #[tokio::test]
    async fn stale_claim_is_a_lost_race() {
        let (store, allocator) = allocator(&["R1"]).await;
        let ops = vec![projections::room_claim("R1", 0)];
        store.transact_write(ops).await.unwrap();

        // A claim built from the old sequence number must be refused.
        let err = store
            .transact_write(vec![projections::room_claim("R1", 0)])
            .await
            .unwrap_err();
        assert!(err.is_condition_failure());

        // The allocator reads the current sequence and still succeeds.
        assert!(allocator.allocate(&request(2, 4)).await.is_ok());
    }
}
