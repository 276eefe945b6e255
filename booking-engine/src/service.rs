//! Request-level entry points: validation, lookups, then the core protocols.

use std::sync::Arc;

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::allocation::{AllocationRequest, Allocator, RandomSelector, RoomSelector};
use crate::availability::AvailabilityIndex;
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::{BookingError, Resource, Result};
use crate::invoice::Invoice;
use crate::models::{Booking, BookingStatus, BookingSummary, Category, Room, RoomStatus, StayInterval, User};
use crate::outbox::{Outbox, OutboxEvent};
use crate::repository::{BookingRepository, RoomRepository, UserRepository};
use crate::scheduler::{CheckoutRequest, CheckoutScheduler, NoopScheduler};
use crate::store::KvStore;
use crate::transition::{StateTransitionManager, TransitionOutcome};

/// Booking request as received from callers; instants need an explicit offset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRequest {
    pub category: String,
    pub checkin: String,
    pub checkout: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutResult {
    pub outcome: TransitionOutcome,
    /// Only issued by the call that actually checked the booking out.
    pub invoice: Option<Invoice>,
}

pub struct BookingServiceBuilder {
    store: Arc<dyn KvStore>,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    selector: Arc<dyn RoomSelector>,
    scheduler: Arc<dyn CheckoutScheduler>,
}

impl BookingServiceBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn selector(mut self, selector: Arc<dyn RoomSelector>) -> Self {
        self.selector = selector;
        self
    }

    pub fn scheduler(mut self, scheduler: Arc<dyn CheckoutScheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn build(self) -> BookingService {
        let page_size = self.config.page_size;
        BookingService {
            rooms: RoomRepository::new(self.store.clone(), page_size),
            users: UserRepository::new(self.store.clone(), page_size),
            bookings: BookingRepository::new(self.store.clone(), page_size),
            index: AvailabilityIndex::new(self.store.clone(), self.config.clone()),
            allocator: Allocator::new(
                self.store.clone(),
                self.config.clone(),
                self.selector,
                self.clock.clone(),
            ),
            transitions: StateTransitionManager::new(
                self.store.clone(),
                self.config.clone(),
                self.clock.clone(),
            ),
            outbox: Outbox::new(self.store.clone(), page_size),
            store: self.store,
            config: self.config,
            clock: self.clock,
            scheduler: self.scheduler,
        }
    }
}

pub struct BookingService {
    store: Arc<dyn KvStore>,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    rooms: RoomRepository,
    users: UserRepository,
    bookings: BookingRepository,
    index: AvailabilityIndex,
    allocator: Allocator,
    transitions: StateTransitionManager,
    outbox: Outbox,
    scheduler: Arc<dyn CheckoutScheduler>,
}

impl BookingService {
    /// System clock, random room choice and no checkout scheduling unless overridden.
    pub fn builder(store: Arc<dyn KvStore>) -> BookingServiceBuilder {
        BookingServiceBuilder {
            store,
            config: EngineConfig::default(),
            clock: Arc::new(SystemClock),
            selector: Arc::new(RandomSelector),
            scheduler: Arc::new(NoopScheduler),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn validated_interval(&self, checkin: &str, checkout: &str) -> Result<StayInterval> {
        let interval = StayInterval::parse(checkin, checkout)?;
        interval.validate_for_booking(self.clock.now(), self.config.max_stay)?;
        Ok(interval)
    }

    pub async fn create_booking(&self, request: &BookingRequest, user_id: &str) -> Result<Booking> {
        let category: Category = request.category.parse()?;
        let interval = self.validated_interval(&request.checkin, &request.checkout)?;
        let user = self.get_user(user_id).await?;
        let price_per_night = self
            .rooms
            .category_price(category)
            .await?
            .ok_or_else(|| BookingError::not_found(Resource::Category, category.as_str()))?;

        let booking = self
            .allocator
            .allocate(&AllocationRequest {
                category,
                interval,
                user,
                price_per_night,
            })
            .await?;

        let checkout = CheckoutRequest {
            booking_id: booking.booking_id,
            user_id: booking.user_id.clone(),
            room_id: booking.room_id.clone(),
            checkout_at: booking.checkout,
        };
        if let Err(e) = self.scheduler.schedule_checkout(&checkout).await {
            error!("Error scheduling checkout for booking {}: {}", booking.booking_id, e);
        }
        Ok(booking)
    }

    /// Free room ids of the category for the interval.
    pub async fn availability(&self, category: &str, checkin: &str, checkout: &str) -> Result<Vec<String>> {
        let category: Category = category.parse()?;
        let interval = self.validated_interval(checkin, checkout)?;
        self.index.free_rooms(category, &interval).await
    }

    pub async fn check_in(&self, booking_id: Uuid, user_id: &str, room_id: &str) -> Result<TransitionOutcome> {
        self.transitions
            .transition(booking_id, user_id, room_id, BookingStatus::CheckedIn)
            .await
    }

    pub async fn checkout(&self, booking_id: Uuid, user_id: &str, room_id: &str) -> Result<CheckoutResult> {
        let outcome = self
            .transitions
            .transition(booking_id, user_id, room_id, BookingStatus::CheckedOut)
            .await?;
        let invoice = match &outcome {
            TransitionOutcome::Applied(booking) => {
                let invoice = Invoice::for_booking(booking);
                info!(
                    "Invoice for booking {}: {} nights, total {}",
                    booking_id, invoice.nights, invoice.total_amount
                );
                Some(invoice)
            }
            TransitionOutcome::AlreadyApplied(_) => None,
        };
        Ok(CheckoutResult { outcome, invoice })
    }

    pub async fn get_booking(&self, booking_id: Uuid) -> Result<Booking> {
        self.bookings
            .get_booking(booking_id)
            .await?
            .ok_or_else(|| BookingError::not_found(Resource::Booking, booking_id.to_string()))
    }

    pub async fn user_bookings(&self, user_id: &str) -> Result<Vec<BookingSummary>> {
        self.get_user(user_id).await?;
        self.bookings.user_bookings(user_id).await
    }

    pub async fn add_room(&self, room_id: &str, category: &str) -> Result<Room> {
        let category: Category = category.parse()?;
        self.rooms.add_room(room_id, category).await
    }

    pub async fn get_room(&self, room_id: &str) -> Result<Room> {
        self.rooms
            .get_room(room_id)
            .await?
            .ok_or_else(|| BookingError::not_found(Resource::Room, room_id))
    }

    pub async fn update_room_status(&self, room_id: &str, status: &str) -> Result<()> {
        let status: RoomStatus = status.parse()?;
        self.rooms.update_room_status(room_id, status).await
    }

    pub async fn put_category_price(&self, category: &str, price: &BigDecimal) -> Result<()> {
        let category: Category = category.parse()?;
        self.rooms.put_category_price(category, price).await
    }

    pub async fn add_user(&self, user: &User) -> Result<()> {
        self.users.add_user(user).await
    }

    pub async fn get_user(&self, user_id: &str) -> Result<User> {
        self.users
            .get_by_id(user_id)
            .await?
            .ok_or_else(|| BookingError::not_found(Resource::User, user_id))
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<User> {
        self.users
            .get_by_email(email)
            .await?
            .ok_or_else(|| BookingError::not_found(Resource::User, email))
    }

    /// Recorded events not yet relayed to the message bus, oldest first.
    pub async fn pending_events(&self, limit: usize) -> Result<Vec<OutboxEvent>> {
        self.outbox.pending(limit).await
    }

    pub async fn mark_event_published(&self, event: &OutboxEvent) -> Result<()> {
        self.outbox
            .mark_published(event, self.clock.now() + self.config.index_retention)
            .await
    }

    /// Removes expired index entries; returns how many went.
    pub async fn purge_expired(&self) -> Result<usize> {
        let purged = self.store.purge_expired(self.clock.now()).await?;
        if purged > 0 {
            info!("Purged {} expired items", purged);
        }
        Ok(purged)
    }
}
