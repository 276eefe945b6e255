//! Room availability and booking consistency engine.
//!
//! Everything lives in one key-value table (see [`keys`]); the only
//! concurrency control is the store's conditional multi-item write.

pub mod allocation;
pub mod availability;
pub mod clock;
pub mod config;
pub mod error;
pub mod invoice;
pub mod keys;
pub mod models;
pub mod outbox;
pub mod projections;
pub mod repository;
pub mod scheduler;
pub mod schema;
pub mod service;
pub mod store;
pub mod transition;

pub use allocation::{AllocationRequest, Allocator, FirstAvailable, RandomSelector, RoomSelector};
pub use availability::AvailabilityIndex;
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::EngineConfig;
pub use error::{BookingError, Resource, Result, StoreError};
pub use invoice::Invoice;
pub use models::{Booking, BookingStatus, BookingSummary, Category, Room, RoomStatus, StayInterval, User, UserRole};
pub use outbox::{OutboxEvent, BOOKING_CHECKED_OUT, INVOICE_ISSUED};
pub use scheduler::{CheckoutRequest, CheckoutScheduler, NoopScheduler, RecordingScheduler};
pub use service::{BookingRequest, BookingService, CheckoutResult};
pub use store::{KvStore, MemoryStore, PgStore};
pub use transition::{StateTransitionManager, TransitionOutcome};
