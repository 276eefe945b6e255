use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::BookingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Standard,
    Deluxe,
    Suite,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Standard, Category::Deluxe, Category::Suite];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Standard => "STANDARD",
            Category::Deluxe => "DELUXE",
            Category::Suite => "SUITE",
        }
    }
}

/// Category names from callers are matched case-insensitively.
impl FromStr for Category {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "STANDARD" => Ok(Category::Standard),
            "DELUXE" => Ok(Category::Deluxe),
            "SUITE" => Ok(Category::Suite),
            _ => {
                let allowed: Vec<&str> = Category::ALL.iter().map(Category::as_str).collect();
                Err(BookingError::InvalidInput(format!(
                    "invalid category '{}'. Allowed: {}",
                    s,
                    allowed.join(", ")
                )))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomStatus {
    Available,
    Occupied,
    Housekeeping,
    Maintenance,
}

impl RoomStatus {
    pub const ALL: [RoomStatus; 4] = [
        RoomStatus::Available,
        RoomStatus::Occupied,
        RoomStatus::Housekeeping,
        RoomStatus::Maintenance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Available => "AVAILABLE",
            RoomStatus::Occupied => "OCCUPIED",
            RoomStatus::Housekeeping => "HOUSEKEEPING",
            RoomStatus::Maintenance => "MAINTENANCE",
        }
    }
}

impl FromStr for RoomStatus {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RoomStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                let allowed: Vec<&str> = RoomStatus::ALL.iter().map(RoomStatus::as_str).collect();
                BookingError::InvalidInput(format!(
                    "invalid room status '{}'. Allowed: {}",
                    s,
                    allowed.join(", ")
                ))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Upcoming,
    CheckedIn,
    CheckedOut,
}

impl BookingStatus {
    pub const ALL: [BookingStatus; 3] = [
        BookingStatus::Upcoming,
        BookingStatus::CheckedIn,
        BookingStatus::CheckedOut,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Upcoming => "UPCOMING",
            BookingStatus::CheckedIn => "CHECKED_IN",
            BookingStatus::CheckedOut => "CHECKED_OUT",
        }
    }

    /// Statuses a booking may hold immediately before moving to `self`.
    pub fn predecessors(&self) -> &'static [BookingStatus] {
        match self {
            BookingStatus::Upcoming => &[],
            BookingStatus::CheckedIn => &[BookingStatus::Upcoming],
            BookingStatus::CheckedOut => &[BookingStatus::Upcoming, BookingStatus::CheckedIn],
        }
    }

    /// Whether a booking in this status still holds its room for its interval.
    pub fn blocks_availability(&self) -> bool {
        !matches!(self, BookingStatus::CheckedOut)
    }

    /// Room status implied by a booking reaching this status.
    pub fn room_status(&self) -> RoomStatus {
        match self {
            BookingStatus::CheckedOut => RoomStatus::Housekeeping,
            BookingStatus::Upcoming | BookingStatus::CheckedIn => RoomStatus::Occupied,
        }
    }
}

impl FromStr for BookingStatus {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BookingStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| BookingError::InvalidInput(format!("invalid booking status '{}'", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Admin,
    Manager,
    Customer,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "ADMIN",
            UserRole::Manager => "MANAGER",
            UserRole::Customer => "CUSTOMER",
        }
    }

    pub fn is_staff(&self) -> bool {
        matches!(self, UserRole::Admin | UserRole::Manager)
    }
}

impl FromStr for UserRole {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(UserRole::Admin),
            "MANAGER" => Ok(UserRole::Manager),
            "CUSTOMER" => Ok(UserRole::Customer),
            _ => Err(BookingError::InvalidInput(format!("invalid role '{}'", s))),
        }
    }
}

macro_rules! display_as_str {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        })*
    };
}

display_as_str!(Category, RoomStatus, BookingStatus, UserRole);

/// A half-open stay interval `[checkin, checkout)` in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StayInterval {
    pub checkin: DateTime<Utc>,
    pub checkout: DateTime<Utc>,
}

impl StayInterval {
    pub fn new(checkin: DateTime<Utc>, checkout: DateTime<Utc>) -> Result<Self, BookingError> {
        if checkout <= checkin {
            return Err(BookingError::InvalidInterval(
                "checkout must be after checkin".to_string(),
            ));
        }
        // Keys carry four-digit years; anything else breaks lexicographic order.
        for instant in [checkin, checkout] {
            if !(1..=9999).contains(&instant.year()) {
                return Err(BookingError::InvalidInterval(format!(
                    "instant {} is outside the supported range",
                    instant
                )));
            }
        }
        Ok(Self { checkin, checkout })
    }

    /// Parses two RFC 3339 instants. Values without an explicit offset are rejected.
    pub fn parse(checkin: &str, checkout: &str) -> Result<Self, BookingError> {
        Self::new(parse_request_instant(checkin)?, parse_request_instant(checkout)?)
    }

    pub fn length(&self) -> Duration {
        self.checkout - self.checkin
    }

    /// Touching endpoints do not overlap.
    pub fn overlaps(&self, other: &StayInterval) -> bool {
        self.checkin < other.checkout && other.checkin < self.checkout
    }

    /// Checks the booking-time rules: check-in strictly in the future and a bounded stay.
    pub fn validate_for_booking(&self, now: DateTime<Utc>, max_stay: Duration) -> Result<(), BookingError> {
        if self.checkin <= now {
            return Err(BookingError::InvalidInterval(
                "checkin cannot be in past".to_string(),
            ));
        }
        if self.length() > max_stay {
            return Err(BookingError::InvalidInterval(format!(
                "maximum stay is {} days",
                max_stay.num_days()
            )));
        }
        Ok(())
    }
}

pub fn parse_request_instant(value: &str) -> Result<DateTime<Utc>, BookingError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| {
            BookingError::InvalidInterval(format!(
                "'{}' must be an ISO-8601 timestamp with an explicit UTC offset",
                value
            ))
        })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub room_id: String,
    pub category: Category,
    pub status: RoomStatus,
    /// Bumped by every allocation that commits a booking on this room.
    pub allocation_seq: u64,
}

impl Room {
    pub fn new(room_id: impl Into<String>, category: Category) -> Self {
        Self {
            room_id: room_id.into(),
            category,
            status: RoomStatus::Available,
            allocation_seq: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub booking_id: Uuid,
    pub user_id: String,
    pub user_email: String,
    pub room_id: String,
    pub category: Category,
    pub checkin: DateTime<Utc>,
    pub checkout: DateTime<Utc>,
    pub status: BookingStatus,
    pub price_per_night: BigDecimal,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    pub fn interval(&self) -> StayInterval {
        StayInterval {
            checkin: self.checkin,
            checkout: self.checkout,
        }
    }
}

/// The user-index copy of a booking, listed without touching the details item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingSummary {
    pub booking_id: Uuid,
    pub room_id: String,
    pub category: Category,
    pub status: BookingStatus,
    pub checkin: DateTime<Utc>,
    pub checkout: DateTime<Utc>,
    pub price_per_night: BigDecimal,
    pub booked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub role: UserRole,
}

/// Room and user ids are embedded in keys, so the key delimiter is off limits.
pub fn validate_identifier(kind: &str, value: &str) -> Result<(), BookingError> {
    if value.is_empty() {
        return Err(BookingError::InvalidInput(format!("{} must not be empty", kind)));
    }
    if value.contains('#') || value.chars().any(char::is_control) {
        return Err(BookingError::InvalidInput(format!(
            "{} '{}' contains a reserved character",
            kind, value
        )));
    }
    Ok(())
}
