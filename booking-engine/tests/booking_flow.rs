mod common;

use booking_engine::keys;
use booking_engine::projections::Projection;
use booking_engine::{
    AvailabilityIndex, BookingError, BookingStatus, Category, EngineConfig, KvStore, RoomStatus,
    StayInterval, StoreError,
};
use chrono::Duration;

use common::{day, memory_store, request, HotelBuilder};

#[tokio::test]
async fn deluxe_pair_scenario() {
    let hotel = HotelBuilder::new(memory_store())
        .room("R1", "DELUXE")
        .room("R2", "DELUXE")
        .build()
        .await;
    let (checkin, checkout) = (day(2, 10), day(4, 10));
    let (from, to) = (checkin.to_rfc3339(), checkout.to_rfc3339());

    let booking = hotel
        .service
        .create_booking(&request("DELUXE", checkin, checkout), "u-1")
        .await
        .unwrap();
    assert_eq!(booking.room_id, "R1");
    assert_eq!(hotel.service.availability("deluxe", &from, &to).await.unwrap(), vec!["R2"]);

    let result = hotel.service.checkout(booking.booking_id, "u-1", "R1").await.unwrap();
    assert_eq!(result.outcome.booking().status, BookingStatus::CheckedOut);
    assert_eq!(hotel.service.get_room("R1").await.unwrap().status, RoomStatus::Housekeeping);
    assert_eq!(
        hotel.service.get_booking(booking.booking_id).await.unwrap().status,
        BookingStatus::CheckedOut
    );
    assert_eq!(
        hotel.service.availability("DELUXE", &from, &to).await.unwrap(),
        vec!["R1", "R2"]
    );
}

#[tokio::test]
async fn back_to_back_bookings_share_a_room() {
    let hotel = HotelBuilder::new(memory_store())
        .room("S1", "SUITE")
        .user("u-2")
        .build()
        .await;

    let first = hotel
        .service
        .create_booking(&request("SUITE", day(2, 12), day(5, 11)), "u-1")
        .await
        .unwrap();
    let second = hotel
        .service
        .create_booking(&request("SUITE", day(5, 11), day(7, 11)), "u-2")
        .await
        .unwrap();
    assert_eq!(first.room_id, "S1");
    assert_eq!(second.room_id, "S1");

    let overlapping = hotel
        .service
        .create_booking(&request("SUITE", day(4, 12), day(6, 11)), "u-1")
        .await
        .unwrap_err();
    assert!(matches!(overlapping, BookingError::NoAvailability { .. }));
}

#[tokio::test]
async fn bookings_before_the_scan_window_never_block() {
    let store = memory_store();
    let config = EngineConfig::default().with_max_stay_days(3);
    let hotel = HotelBuilder::new(store.clone())
        .config(config.clone())
        .room("101", "STANDARD")
        .build()
        .await;
    hotel
        .service
        .create_booking(&request("STANDARD", day(2, 14), day(5, 10)), "u-1")
        .await
        .unwrap();

    let later = StayInterval::new(day(9, 14), day(10, 10)).unwrap();
    let index = AvailabilityIndex::new(store.clone(), config);
    let window = index.scan_window(Category::Standard, &later);
    assert!(store.query(&window).await.unwrap().items.is_empty());
    assert_eq!(
        index.free_rooms(Category::Standard, &later).await.unwrap(),
        vec!["101"]
    );

    // A request starting exactly one max stay after the old check-in still sees it.
    let edge = StayInterval::new(day(5, 14), day(6, 10)).unwrap();
    let window = index.scan_window(Category::Standard, &edge);
    assert_eq!(store.query(&window).await.unwrap().items.len(), 1);
    assert_eq!(
        index.free_rooms(Category::Standard, &edge).await.unwrap(),
        vec!["101"]
    );
}

#[tokio::test]
async fn failed_allocation_leaves_no_trace() {
    let store = memory_store();
    let hotel = HotelBuilder::new(store.clone())
        .room("R1", "DELUXE")
        .build()
        .await;
    let before = store.len().await;
    let commits = store.committed_transactions();

    store.inject_fault_after(3);
    let err = hotel
        .service
        .create_booking(&request("DELUXE", day(2, 10), day(4, 10)), "u-1")
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Store(StoreError::Backend(_))));

    assert_eq!(store.len().await, before);
    assert_eq!(store.committed_transactions(), commits);
    assert!(hotel.service.user_bookings("u-1").await.unwrap().is_empty());
    assert_eq!(
        hotel
            .service
            .availability("DELUXE", &day(2, 10).to_rfc3339(), &day(4, 10).to_rfc3339())
            .await
            .unwrap(),
        vec!["R1"]
    );
    assert_eq!(hotel.service.get_room("R1").await.unwrap().allocation_seq, 0);

    let booking = hotel
        .service
        .create_booking(&request("DELUXE", day(2, 10), day(4, 10)), "u-1")
        .await
        .unwrap();
    for projection in Projection::ALL {
        assert!(store.contains(&projection.key(&booking)).await);
    }
    let listed = hotel.service.user_bookings("u-1").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].booking_id, booking.booking_id);
}

#[tokio::test]
async fn repeated_checkout_is_a_no_op() {
    let store = memory_store();
    let hotel = HotelBuilder::new(store.clone())
        .room("R1", "STANDARD")
        .build()
        .await;
    let booking = hotel
        .service
        .create_booking(&request("STANDARD", day(2, 10), day(3, 10)), "u-1")
        .await
        .unwrap();

    let first = hotel.service.checkout(booking.booking_id, "u-1", "R1").await.unwrap();
    assert!(!first.outcome.already_applied());
    assert!(first.invoice.is_some());
    let commits = store.committed_transactions();

    let second = hotel.service.checkout(booking.booking_id, "u-1", "R1").await.unwrap();
    assert!(second.outcome.already_applied());
    assert!(second.invoice.is_none());
    assert_eq!(store.committed_transactions(), commits);
    assert_eq!(hotel.service.get_room("R1").await.unwrap().status, RoomStatus::Housekeeping);
    assert_eq!(
        hotel.service.get_booking(booking.booking_id).await.unwrap().status,
        BookingStatus::CheckedOut
    );
}

#[tokio::test]
async fn early_checkout_frees_the_same_slot_for_rebooking() {
    let store = memory_store();
    let hotel = HotelBuilder::new(store.clone())
        .room("R1", "SUITE")
        .user("u-2")
        .build()
        .await;
    let first = hotel
        .service
        .create_booking(&request("SUITE", day(2, 10), day(4, 10)), "u-1")
        .await
        .unwrap();
    hotel.service.checkout(first.booking_id, "u-1", "R1").await.unwrap();

    let second = hotel
        .service
        .create_booking(&request("SUITE", day(2, 10), day(3, 10)), "u-2")
        .await
        .unwrap();
    assert_eq!(second.room_id, "R1");

    let slot = store
        .get(&keys::availability_slot(Category::Suite, day(2, 10), "R1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(slot.expires_at, None);
    assert_eq!(
        slot.attr("booking_id").and_then(|v| v.as_str()),
        Some(second.booking_id.to_string().as_str())
    );

    // The replaced slot blocks again.
    let err = hotel
        .service
        .create_booking(&request("SUITE", day(2, 12), day(3, 12)), "u-1")
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::NoAvailability { .. }));
}

#[tokio::test]
async fn expired_entries_are_purged_without_changing_availability() {
    let store = memory_store();
    let hotel = HotelBuilder::new(store.clone())
        .config(EngineConfig::default().with_index_retention_hours(1))
        .room("R1", "DELUXE")
        .build()
        .await;
    let booking = hotel
        .service
        .create_booking(&request("DELUXE", day(2, 10), day(4, 10)), "u-1")
        .await
        .unwrap();
    hotel.service.checkout(booking.booking_id, "u-1", "R1").await.unwrap();

    let (from, to) = (day(3, 10).to_rfc3339(), day(5, 10).to_rfc3339());
    assert_eq!(hotel.service.availability("DELUXE", &from, &to).await.unwrap(), vec!["R1"]);

    hotel.clock.advance(Duration::days(3) + Duration::hours(11));
    assert_eq!(hotel.service.purge_expired().await.unwrap(), 2);
    assert!(!store
        .contains(&keys::availability_slot(Category::Deluxe, day(2, 10), "R1"))
        .await);
    assert!(store.contains(&keys::booking_details(booking.booking_id)).await);

    let (from, to) = (day(5, 10).to_rfc3339(), day(6, 10).to_rfc3339());
    assert_eq!(hotel.service.availability("DELUXE", &from, &to).await.unwrap(), vec!["R1"]);
}
