//! Item encoding for every entity, and the enumerated projections of a booking.
//!
//! A booking is one authoritative details item plus three derived copies.
//! All four are produced here and nowhere else, so every write path that
//! touches a booking goes through [`Projection::ALL`].

use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{BookingError, Result};
use crate::keys;
use crate::models::{
    Booking, BookingStatus, BookingSummary, Category, Room, RoomStatus, StayInterval, User, UserRole,
};
use crate::outbox::OutboxEvent;
use crate::store::{Attributes, Condition, Item, ItemKey, WriteOp};

pub const ROOM_STATUS: &str = "room_status";
pub const BOOKING_STATUS: &str = "booking_status";
pub const ALLOCATION_SEQ: &str = "allocation_seq";
pub const PUBLISHED: &str = "published";

fn attrs(value: Value) -> Attributes {
    match value {
        Value::Object(map) => map,
        _ => Attributes::new(),
    }
}

fn corrupt(item: &Item, detail: impl std::fmt::Display) -> BookingError {
    BookingError::Consistency(format!("item {}: {}", item.key, detail))
}

fn attr_str<'a>(item: &'a Item, name: &str) -> Result<&'a str> {
    item.attr(name)
        .and_then(Value::as_str)
        .ok_or_else(|| corrupt(item, format!("missing string attribute '{}'", name)))
}

fn attr_parse<T: FromStr<Err = BookingError>>(item: &Item, name: &str) -> Result<T> {
    attr_str(item, name)?
        .parse()
        .map_err(|e: BookingError| corrupt(item, e))
}

fn attr_instant(item: &Item, name: &str) -> Result<DateTime<Utc>> {
    keys::parse_instant(attr_str(item, name)?)
        .map_err(|e| corrupt(item, format!("attribute '{}' is not a zoned instant: {}", name, e)))
}

fn attr_decimal(item: &Item, name: &str) -> Result<BigDecimal> {
    BigDecimal::from_str(attr_str(item, name)?)
        .map_err(|e| corrupt(item, format!("attribute '{}' is not a decimal: {}", name, e)))
}

fn attr_uuid(item: &Item, name: &str) -> Result<Uuid> {
    Uuid::parse_str(attr_str(item, name)?)
        .map_err(|e| corrupt(item, format!("attribute '{}' is not a uuid: {}", name, e)))
}

fn attr_interval(item: &Item) -> Result<StayInterval> {
    StayInterval::new(attr_instant(item, "check_in")?, attr_instant(item, "check_out")?)
        .map_err(|e| corrupt(item, e))
}

// ---------------------------------------------------------------------------
// Rooms and categories
// ---------------------------------------------------------------------------

pub fn room_details_item(room: &Room) -> Item {
    Item::new(
        keys::room_details(&room.room_id),
        attrs(json!({
            "room_id": room.room_id,
            "category": room.category.as_str(),
            ROOM_STATUS: room.status.as_str(),
            ALLOCATION_SEQ: room.allocation_seq,
        })),
    )
}

pub fn room_membership_item(room: &Room) -> Item {
    Item::new(
        keys::room_membership(room.category, &room.room_id),
        attrs(json!({ "room_id": room.room_id })),
    )
}

pub fn room_from_item(item: &Item) -> Result<Room> {
    let allocation_seq = item
        .attr(ALLOCATION_SEQ)
        .and_then(Value::as_u64)
        .ok_or_else(|| corrupt(item, "missing allocation_seq"))?;
    Ok(Room {
        room_id: attr_str(item, "room_id")?.to_string(),
        category: attr_parse::<Category>(item, "category")?,
        status: attr_parse::<RoomStatus>(item, ROOM_STATUS)?,
        allocation_seq,
    })
}

/// Room id encoded in a membership item's sort key.
pub fn member_room_id(item: &Item) -> Result<String> {
    keys::KeyTag::Room
        .strip(&item.key.sk)
        .map(str::to_string)
        .ok_or_else(|| corrupt(item, "membership sort key lacks ROOM tag"))
}

pub fn room_status_update(room_id: &str, status: RoomStatus) -> WriteOp {
    WriteOp::update(
        keys::room_details(room_id),
        attrs(json!({ ROOM_STATUS: status.as_str() })),
        Condition::Exists,
    )
}

/// Claims the room for one allocation: succeeds only if nobody else committed
/// a booking on it since `seen_seq` was read.
pub fn room_claim(room_id: &str, seen_seq: u64) -> WriteOp {
    WriteOp::update(
        keys::room_details(room_id),
        attrs(json!({ ALLOCATION_SEQ: seen_seq + 1 })),
        Condition::attribute_in(ALLOCATION_SEQ, [json!(seen_seq)]),
    )
}

pub fn category_item(category: Category, price: &BigDecimal) -> Item {
    Item::new(
        keys::category_details(category),
        attrs(json!({
            "category": category.as_str(),
            "price": price.to_string(),
        })),
    )
}

pub fn price_from_item(item: &Item) -> Result<BigDecimal> {
    attr_decimal(item, "price")
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

pub fn user_items(user: &User) -> [Item; 2] {
    [
        Item::new(
            keys::user_details(&user.user_id),
            attrs(json!({
                "user_id": user.user_id,
                "email": user.email,
                "username": user.name,
                "role": user.role.as_str(),
            })),
        ),
        Item::new(
            keys::email_lookup(&user.email, &user.user_id),
            attrs(json!({ "user_id": user.user_id })),
        ),
    ]
}

pub fn user_from_item(item: &Item) -> Result<User> {
    Ok(User {
        user_id: attr_str(item, "user_id")?.to_string(),
        email: attr_str(item, "email")?.to_string(),
        name: attr_str(item, "username")?.to_string(),
        role: attr_parse::<UserRole>(item, "role")?,
    })
}

// ---------------------------------------------------------------------------
// Bookings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    /// Authoritative record, by booking id.
    Details,
    /// By user, for listing without a join.
    UserIndex,
    /// By room, in check-in order.
    RoomInterval,
    /// By category, in check-in order; the overlap index.
    AvailabilityIndex,
}

impl Projection {
    pub const ALL: [Projection; 4] = [
        Projection::Details,
        Projection::UserIndex,
        Projection::RoomInterval,
        Projection::AvailabilityIndex,
    ];

    pub fn key(&self, booking: &Booking) -> ItemKey {
        match self {
            Projection::Details => keys::booking_details(booking.booking_id),
            Projection::UserIndex => keys::user_booking(&booking.user_id, booking.booking_id),
            Projection::RoomInterval => keys::room_interval(&booking.room_id, booking.checkin),
            Projection::AvailabilityIndex => {
                keys::availability_slot(booking.category, booking.checkin, &booking.room_id)
            }
        }
    }

    pub fn item(&self, booking: &Booking) -> Item {
        let checkin = keys::format_instant(booking.checkin);
        let checkout = keys::format_instant(booking.checkout);
        let body = match self {
            Projection::Details => json!({
                "booking_id": booking.booking_id.to_string(),
                "user_id": booking.user_id,
                "user_email": booking.user_email,
                "room_id": booking.room_id,
                "category": booking.category.as_str(),
                "check_in": checkin,
                "check_out": checkout,
                BOOKING_STATUS: booking.status.as_str(),
                "price_per_night": booking.price_per_night.to_string(),
                "booked_at": keys::format_instant(booking.created_at),
            }),
            Projection::UserIndex => json!({
                "booking_id": booking.booking_id.to_string(),
                "room_id": booking.room_id,
                "category": booking.category.as_str(),
                "check_in": checkin,
                "check_out": checkout,
                BOOKING_STATUS: booking.status.as_str(),
                "price_per_night": booking.price_per_night.to_string(),
                "booked_at": keys::format_instant(booking.created_at),
            }),
            Projection::RoomInterval | Projection::AvailabilityIndex => json!({
                "booking_id": booking.booking_id.to_string(),
                "room_id": booking.room_id,
                "check_in": checkin,
                "check_out": checkout,
                BOOKING_STATUS: booking.status.as_str(),
            }),
        };
        Item::new(self.key(booking), attrs(body))
    }

    /// Status change for this copy. Only the details item checks the source
    /// status; the copies only have to exist.
    pub fn status_update(&self, booking: &Booking, status: BookingStatus) -> WriteOp {
        let condition = match self {
            Projection::Details => Condition::attribute_in(
                BOOKING_STATUS,
                status.predecessors().iter().map(|s| json!(s.as_str())),
            ),
            _ => Condition::Exists,
        };
        WriteOp::update(
            self.key(booking),
            attrs(json!({ BOOKING_STATUS: status.as_str() })),
            condition,
        )
    }
}

/// The four puts that create a booking. Each is guarded by non-existence:
/// the details item against id collisions, the index slots against a
/// concurrent allocation of the same room at the same check-in.
pub fn booking_creation_writes(booking: &Booking) -> Vec<WriteOp> {
    Projection::ALL
        .iter()
        .map(|projection| WriteOp::put_new(projection.item(booking)))
        .collect()
}

/// Creation writes for a booking whose room already holds a checked-out
/// booking at the same check-in. Both index slots are then replaced, but only
/// while the entry they hold is still checked out.
pub fn booking_writes_reclaiming_slots(booking: &Booking) -> Vec<WriteOp> {
    Projection::ALL
        .iter()
        .map(|projection| match projection {
            Projection::RoomInterval | Projection::AvailabilityIndex => WriteOp::put_if(
                projection.item(booking),
                Condition::attribute_in(BOOKING_STATUS, [json!(BookingStatus::CheckedOut.as_str())]),
            ),
            Projection::Details | Projection::UserIndex => WriteOp::put_new(projection.item(booking)),
        })
        .collect()
}

pub fn booking_from_item(item: &Item) -> Result<Booking> {
    let interval = attr_interval(item)?;
    Ok(Booking {
        booking_id: attr_uuid(item, "booking_id")?,
        user_id: attr_str(item, "user_id")?.to_string(),
        user_email: attr_str(item, "user_email")?.to_string(),
        room_id: attr_str(item, "room_id")?.to_string(),
        category: attr_parse::<Category>(item, "category")?,
        checkin: interval.checkin,
        checkout: interval.checkout,
        status: attr_parse::<BookingStatus>(item, BOOKING_STATUS)?,
        price_per_night: attr_decimal(item, "price_per_night")?,
        created_at: attr_instant(item, "booked_at")?,
    })
}

pub fn summary_from_item(item: &Item) -> Result<BookingSummary> {
    let interval = attr_interval(item)?;
    Ok(BookingSummary {
        booking_id: attr_uuid(item, "booking_id")?,
        room_id: attr_str(item, "room_id")?.to_string(),
        category: attr_parse::<Category>(item, "category")?,
        status: attr_parse::<BookingStatus>(item, BOOKING_STATUS)?,
        checkin: interval.checkin,
        checkout: interval.checkout,
        price_per_night: attr_decimal(item, "price_per_night")?,
        booked_at: attr_instant(item, "booked_at")?,
    })
}

// ---------------------------------------------------------------------------
// Outbox
// ---------------------------------------------------------------------------

pub fn outbox_item(event: &OutboxEvent) -> Item {
    Item::new(
        event.key(),
        attrs(json!({
            "event_id": event.event_id.to_string(),
            "aggregate_id": event.aggregate_id.to_string(),
            "event_type": event.event_type,
            "event_data": event.event_data,
            "created_at": keys::format_instant(event.created_at),
            "sequence": event.sequence,
            PUBLISHED: false,
        })),
    )
}

pub fn outbox_event_from_item(item: &Item) -> Result<OutboxEvent> {
    let sequence = item
        .attr("sequence")
        .and_then(Value::as_u64)
        .and_then(|seq| u32::try_from(seq).ok())
        .ok_or_else(|| corrupt(item, "missing sequence"))?;
    Ok(OutboxEvent {
        event_id: attr_uuid(item, "event_id")?,
        aggregate_id: attr_uuid(item, "aggregate_id")?,
        event_type: attr_str(item, "event_type")?.to_string(),
        event_data: item.attr("event_data").cloned().unwrap_or(Value::Null),
        created_at: attr_instant(item, "created_at")?,
        sequence,
    })
}

pub fn is_published(item: &Item) -> bool {
    item.attr(PUBLISHED).and_then(Value::as_bool).unwrap_or(false)
}

/// Marks an event relayed; from then on it only waits for purge.
pub fn outbox_published_update(event: &OutboxEvent, expires_at: DateTime<Utc>) -> WriteOp {
    WriteOp::update(event.key(), attrs(json!({ PUBLISHED: true })), Condition::Exists).with_expiry(expires_at)
}

/// A decoded room-interval or availability-index entry.
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalEntry {
    pub booking_id: Uuid,
    pub room_id: String,
    pub interval: StayInterval,
    pub status: BookingStatus,
}

impl IntervalEntry {
    pub fn blocks(&self, requested: &StayInterval) -> bool {
        self.status.blocks_availability() && self.interval.overlaps(requested)
    }
}

pub fn interval_entry_from_item(item: &Item) -> Result<IntervalEntry> {
    Ok(IntervalEntry {
        booking_id: attr_uuid(item, "booking_id")?,
        room_id: attr_str(item, "room_id")?.to_string(),
        interval: attr_interval(item)?,
        status: attr_parse::<BookingStatus>(item, BOOKING_STATUS)?,
    })
}
