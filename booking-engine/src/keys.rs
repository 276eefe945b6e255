//! Record layout: partition and sort keys for every item in the shared table.
//!
//! Keys are `TAG#value` strings. Instants are rendered as fixed-width UTC
//! RFC 3339 with microseconds so that byte order equals chronological order.
//!
//! | item                | pk                 | sk                           |
//! |---------------------|--------------------|------------------------------|
//! | room details        | `ROOM#<id>`        | `DETAILS`                    |
//! | room membership     | `CATEGORY#<cat>`   | `ROOM#<id>`                  |
//! | category pricing    | `CATEGORY#<cat>`   | `DETAILS`                    |
//! | booking details     | `BOOKING#<id>`     | `DETAILS`                    |
//! | user index          | `USER#<id>`        | `BOOKING#<id>`               |
//! | room interval       | `ROOM#<id>`        | `CHECKIN#<ts>`               |
//! | availability index  | `CATEGORY#<cat>`   | `CHECKIN#<ts>#ROOM#<id>`     |
//! | user details        | `USER#<id>`        | `DETAILS`                    |
//! | email lookup        | `EMAIL#<email>`    | `USER#<id>`                  |
//! | outbox event        | `OUTBOX`           | `EVENT#<ts>#<booking>#<seq>` |

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use crate::models::Category;
use crate::store::ItemKey;

pub const DELIMITER: char = '#';
pub const DETAILS: &str = "DETAILS";
pub const OUTBOX: &str = "OUTBOX";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTag {
    Room,
    Category,
    Booking,
    User,
    Email,
    CheckIn,
    Event,
}

impl KeyTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyTag::Room => "ROOM",
            KeyTag::Category => "CATEGORY",
            KeyTag::Booking => "BOOKING",
            KeyTag::User => "USER",
            KeyTag::Email => "EMAIL",
            KeyTag::CheckIn => "CHECKIN",
            KeyTag::Event => "EVENT",
        }
    }

    pub fn key(&self, value: &str) -> String {
        format!("{}{}{}", self.as_str(), DELIMITER, value)
    }

    /// `TAG#` itself, for `begins_with` queries.
    pub fn prefix(&self) -> String {
        format!("{}{}", self.as_str(), DELIMITER)
    }

    /// Returns the value after `TAG#`, or `None` if the key carries another tag.
    pub fn strip<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(self.as_str())?.strip_prefix(DELIMITER)
    }
}

pub fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses a stored instant. Stored values always carry an offset; a naive one is corrupt data.
pub fn parse_instant(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(value).map(|dt| dt.with_timezone(&Utc))
}

pub fn room_details(room_id: &str) -> ItemKey {
    ItemKey::new(KeyTag::Room.key(room_id), DETAILS)
}

pub fn room_membership(category: Category, room_id: &str) -> ItemKey {
    ItemKey::new(category_pk(category), KeyTag::Room.key(room_id))
}

pub fn category_details(category: Category) -> ItemKey {
    ItemKey::new(category_pk(category), DETAILS)
}

pub fn booking_details(booking_id: Uuid) -> ItemKey {
    ItemKey::new(KeyTag::Booking.key(&booking_id.to_string()), DETAILS)
}

pub fn user_booking(user_id: &str, booking_id: Uuid) -> ItemKey {
    ItemKey::new(user_pk(user_id), KeyTag::Booking.key(&booking_id.to_string()))
}

pub fn room_interval(room_id: &str, checkin: DateTime<Utc>) -> ItemKey {
    ItemKey::new(KeyTag::Room.key(room_id), checkin_sk(checkin))
}

pub fn availability_slot(category: Category, checkin: DateTime<Utc>, room_id: &str) -> ItemKey {
    ItemKey::new(
        category_pk(category),
        format!("{}{}{}", checkin_sk(checkin), DELIMITER, KeyTag::Room.key(room_id)),
    )
}

pub fn user_details(user_id: &str) -> ItemKey {
    ItemKey::new(user_pk(user_id), DETAILS)
}

pub fn email_lookup(email: &str, user_id: &str) -> ItemKey {
    ItemKey::new(email_pk(email), KeyTag::User.key(user_id))
}

/// Outbox entries sort by creation time, then by position within the write that recorded them.
pub fn outbox_event(created_at: DateTime<Utc>, aggregate_id: Uuid, sequence: u32) -> ItemKey {
    ItemKey::new(
        OUTBOX,
        KeyTag::Event.key(&format!(
            "{}{}{}{}{:02}",
            format_instant(created_at),
            DELIMITER,
            aggregate_id,
            DELIMITER,
            sequence
        )),
    )
}

pub fn category_pk(category: Category) -> String {
    KeyTag::Category.key(category.as_str())
}

pub fn room_pk(room_id: &str) -> String {
    KeyTag::Room.key(room_id)
}

pub fn user_pk(user_id: &str) -> String {
    KeyTag::User.key(user_id)
}

/// Emails are matched case-insensitively.
pub fn email_pk(email: &str) -> String {
    KeyTag::Email.key(&email.trim().to_ascii_lowercase())
}

/// `CHECKIN#<ts>`; also the lower/upper bound of availability scans since slot keys extend it.
pub fn checkin_sk(checkin: DateTime<Utc>) -> String {
    KeyTag::CheckIn.key(&format_instant(checkin))
}

/// Splits an availability slot sort key into its check-in instant and room id.
pub fn parse_availability_sk(sk: &str) -> Option<(DateTime<Utc>, &str)> {
    let rest = KeyTag::CheckIn.strip(sk)?;
    let (instant, room) = rest.split_once(DELIMITER)?;
    let room_id = KeyTag::Room.strip(room)?;
    Some((parse_instant(instant).ok()?, room_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn tags_round_trip() {
        for tag in [
            KeyTag::Room,
            KeyTag::Category,
            KeyTag::Booking,
            KeyTag::User,
            KeyTag::Email,
            KeyTag::CheckIn,
            KeyTag::Event,
        ] {
            let key = tag.key("abc");
            assert_eq!(tag.strip(&key), Some("abc"));
        }
        assert_eq!(KeyTag::Room.strip("ROOMS#1"), None);
        assert_eq!(KeyTag::Room.strip("CATEGORY#DELUXE"), None);
    }

    #[test]
    fn instants_are_fixed_width_utc() {
        let instant = Utc.with_ymd_and_hms(2030, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(format_instant(instant), "2030-03-04T05:06:07.000000Z");

        let with_micros = instant + Duration::microseconds(42);
        assert_eq!(format_instant(with_micros).len(), format_instant(instant).len());
        assert_eq!(parse_instant(&format_instant(with_micros)).unwrap(), with_micros);
    }

    #[test]
    fn lexicographic_order_is_chronological() {
        let base = Utc.with_ymd_and_hms(2030, 1, 9, 23, 59, 59).unwrap();
        let instants = [
            base,
            base + Duration::microseconds(1),
            base + Duration::seconds(1),
            base + Duration::days(1),
            base + Duration::days(400),
        ];
        let keys: Vec<String> = instants.iter().map(|i| checkin_sk(*i)).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn availability_slot_key_parses_back() {
        let checkin = Utc.with_ymd_and_hms(2030, 1, 2, 10, 0, 0).unwrap();
        let key = availability_slot(Category::Deluxe, checkin, "R1");
        assert_eq!(key.pk, "CATEGORY#DELUXE");
        assert_eq!(key.sk, "CHECKIN#2030-01-02T10:00:00.000000Z#ROOM#R1");

        let (parsed, room) = parse_availability_sk(&key.sk).unwrap();
        assert_eq!(parsed, checkin);
        assert_eq!(room, "R1");
        assert!(parse_availability_sk("ROOM#R1").is_none());
    }

    #[test]
    fn outbox_keys_sort_by_time_then_sequence() {
        let at = Utc.with_ymd_and_hms(2030, 1, 4, 10, 0, 0).unwrap();
        let booking = Uuid::new_v4();
        let first = outbox_event(at, booking, 0);
        let second = outbox_event(at, booking, 1);
        let later = outbox_event(at + Duration::microseconds(1), Uuid::nil(), 0);

        assert_eq!(first.pk, OUTBOX);
        assert!(first.sk.starts_with("EVENT#2030-01-04T10:00:00.000000Z#"));
        assert!(first.sk < second.sk);
        assert!(second.sk < later.sk);
    }

    #[test]
    fn slot_keys_sort_after_their_checkin_bound() {
        let checkin = Utc.with_ymd_and_hms(2030, 1, 2, 10, 0, 0).unwrap();
        let slot = availability_slot(Category::Suite, checkin, "R9");
        assert!(slot.sk > checkin_sk(checkin));
        assert!(slot.sk < checkin_sk(checkin + Duration::microseconds(1)));
    }

    #[test]
    fn categories_do_not_share_partitions() {
        let a = category_pk(Category::Standard);
        let b = category_pk(Category::Suite);
        assert_ne!(a, b);
        assert_eq!(room_membership(Category::Standard, "7").pk, a);
        assert_eq!(email_pk(" Guest@Example.com "), "EMAIL#guest@example.com");
    }
}
