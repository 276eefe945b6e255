//! Forward-only booking lifecycle: UPCOMING -> CHECKED_IN -> CHECKED_OUT.
//!
//! One transaction moves the room status, the details item and every
//! booking projection together. A redelivered transition to the status the
//! booking already has is reported as [`TransitionOutcome::AlreadyApplied`]
//! without writing. A checkout records its events in the outbox within the
//! same transaction.

use std::sync::Arc;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::{BookingError, Resource, Result, StoreError};
use crate::invoice::Invoice;
use crate::keys;
use crate::models::{Booking, BookingStatus};
use crate::outbox;
use crate::projections::{self, Projection};
use crate::repository::BookingRepository;
use crate::store::{KvStore, WriteOp};

#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    Applied(Booking),
    AlreadyApplied(Booking),
}

impl TransitionOutcome {
    pub fn booking(&self) -> &Booking {
        match self {
            TransitionOutcome::Applied(booking) | TransitionOutcome::AlreadyApplied(booking) => booking,
        }
    }

    pub fn into_booking(self) -> Booking {
        match self {
            TransitionOutcome::Applied(booking) | TransitionOutcome::AlreadyApplied(booking) => booking,
        }
    }

    pub fn already_applied(&self) -> bool {
        matches!(self, TransitionOutcome::AlreadyApplied(_))
    }
}

pub struct StateTransitionManager {
    store: Arc<dyn KvStore>,
    bookings: BookingRepository,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
}

impl StateTransitionManager {
    pub fn new(store: Arc<dyn KvStore>, config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            bookings: BookingRepository::new(store.clone(), config.page_size),
            store,
            config,
            clock,
        }
    }

    /// The writes moving `booking` to `status`.
    pub fn transition_writes(&self, booking: &Booking, status: BookingStatus) -> Result<Vec<WriteOp>> {
        let mut ops = vec![projections::room_status_update(&booking.room_id, status.room_status())];
        for projection in Projection::ALL {
            let op = projection.status_update(booking, status);
            let op = match (projection, status) {
                (Projection::RoomInterval | Projection::AvailabilityIndex, BookingStatus::CheckedOut) => {
                    op.with_expiry(booking.checkout + self.config.index_retention)
                }
                _ => op,
            };
            ops.push(op);
        }
        if status == BookingStatus::CheckedOut {
            let checked_out = Booking {
                status,
                ..booking.clone()
            };
            let invoice = Invoice::for_booking(&checked_out);
            for event in outbox::checkout_events(&checked_out, &invoice, self.clock.now())? {
                ops.push(WriteOp::put_new(projections::outbox_item(&event)));
            }
        }
        Ok(ops)
    }

    pub async fn transition(
        &self,
        booking_id: Uuid,
        user_id: &str,
        room_id: &str,
        status: BookingStatus,
    ) -> Result<TransitionOutcome> {
        if status == BookingStatus::Upcoming {
            return Err(BookingError::InvalidInput(
                "bookings cannot be moved back to UPCOMING".to_string(),
            ));
        }

        let booking = self
            .bookings
            .get_booking(booking_id)
            .await?
            .ok_or_else(|| BookingError::not_found(Resource::Booking, booking_id.to_string()))?;
        if booking.user_id != user_id || booking.room_id != room_id {
            return Err(BookingError::InvalidInput(format!(
                "booking {} does not belong to user {} and room {}",
                booking_id, user_id, room_id
            )));
        }
        if booking.status == status {
            info!("Booking {} already {}", booking_id, status);
            return Ok(TransitionOutcome::AlreadyApplied(booking));
        }
        if !status.predecessors().contains(&booking.status) {
            return Err(BookingError::InvalidInput(format!(
                "booking {} cannot move from {} to {}",
                booking_id, booking.status, status
            )));
        }

        let ops = self.transition_writes(&booking, status)?;
        match self.store.transact_write(ops).await {
            Ok(()) => {
                info!("Booking {} moved from {} to {}", booking_id, booking.status, status);
                Ok(TransitionOutcome::Applied(Booking { status, ..booking }))
            }
            Err(StoreError::ConditionFailed { key, .. }) => self.resolve_rejection(booking, status, key).await,
            Err(err) => {
                error!("Error moving booking {} to {}: {}", booking_id, status, err);
                Err(err.into())
            }
        }
    }

    /// A concurrent identical transition is success; anything else is not.
    async fn resolve_rejection(
        &self,
        booking: Booking,
        status: BookingStatus,
        key: crate::store::ItemKey,
    ) -> Result<TransitionOutcome> {
        if let Some(current) = self.bookings.get_booking(booking.booking_id).await? {
            if current.status == status {
                return Ok(TransitionOutcome::AlreadyApplied(current));
            }
        }
        if key == keys::room_details(&booking.room_id) {
            return Err(BookingError::not_found(Resource::Room, booking.room_id));
        }
        warn!(
            "Transition of booking {} to {} rejected on {}",
            booking.booking_id, status, key
        );
        Err(BookingError::Consistency(format!(
            "transition of booking {} to {} rejected on {}",
            booking.booking_id, status, key
        )))
    }
}
