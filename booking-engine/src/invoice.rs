use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Booking, Category, StayInterval};

const SECONDS_PER_NIGHT: i64 = 24 * 60 * 60;

/// Bill for a checked-out booking. Rendering and delivery happen elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub booking_id: Uuid,
    pub user_email: String,
    pub room_id: String,
    pub category: Category,
    pub checkin: DateTime<Utc>,
    pub checkout: DateTime<Utc>,
    pub nights: i64,
    pub price_per_night: BigDecimal,
    pub total_amount: BigDecimal,
}

impl Invoice {
    pub fn for_booking(booking: &Booking) -> Self {
        let nights = billable_nights(&booking.interval());
        Self {
            booking_id: booking.booking_id,
            user_email: booking.user_email.clone(),
            room_id: booking.room_id.clone(),
            category: booking.category,
            checkin: booking.checkin,
            checkout: booking.checkout,
            nights,
            total_amount: &booking.price_per_night * &BigDecimal::from(nights),
            price_per_night: booking.price_per_night.clone(),
        }
    }
}

/// Started 24 hour periods, never fewer than one. Rounds up rather than
/// counting whole days, so a late checkout is billed as another night.
pub fn billable_nights(interval: &StayInterval) -> i64 {
    let seconds = interval.length().num_seconds();
    let nights = seconds / SECONDS_PER_NIGHT + i64::from(seconds % SECONDS_PER_NIGHT > 0);
    nights.max(1)
}
