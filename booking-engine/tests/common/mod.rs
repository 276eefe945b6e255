#![allow(dead_code)]

use std::sync::Arc;

use bigdecimal::BigDecimal;
use booking_engine::{
    BookingRequest, BookingService, EngineConfig, FirstAvailable, FixedClock, KvStore, MemoryStore,
    RoomSelector, User, UserRole,
};
use chrono::{DateTime, TimeZone, Utc};

/// "Today" for every scenario; bookings start on later days of January 2030.
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()
}

pub fn day(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 1, day, hour, 0, 0).unwrap()
}

pub fn request(category: &str, checkin: DateTime<Utc>, checkout: DateTime<Utc>) -> BookingRequest {
    BookingRequest {
        category: category.to_string(),
        checkin: checkin.to_rfc3339(),
        checkout: checkout.to_rfc3339(),
    }
}

pub struct Hotel {
    pub clock: Arc<FixedClock>,
    pub service: BookingService,
}

pub struct HotelBuilder {
    store: Arc<dyn KvStore>,
    config: EngineConfig,
    selector: Arc<dyn RoomSelector>,
    rooms: Vec<(String, String)>,
    users: Vec<String>,
}

impl HotelBuilder {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            config: EngineConfig::default(),
            selector: Arc::new(FirstAvailable),
            rooms: Vec::new(),
            users: vec!["u-1".to_string()],
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn selector(mut self, selector: Arc<dyn RoomSelector>) -> Self {
        self.selector = selector;
        self
    }

    pub fn room(mut self, room_id: &str, category: &str) -> Self {
        self.rooms.push((room_id.to_string(), category.to_string()));
        self
    }

    pub fn user(mut self, user_id: &str) -> Self {
        self.users.push(user_id.to_string());
        self
    }

    pub async fn build(self) -> Hotel {
        let clock = Arc::new(FixedClock::new(now()));
        let service = BookingService::builder(self.store)
            .config(self.config)
            .clock(clock.clone())
            .selector(self.selector)
            .build();

        for category in ["STANDARD", "DELUXE", "SUITE"] {
            service
                .put_category_price(category, &BigDecimal::from(100))
                .await
                .unwrap();
        }
        for (room_id, category) in &self.rooms {
            service.add_room(room_id, category).await.unwrap();
        }
        for user_id in &self.users {
            service
                .add_user(&User {
                    user_id: user_id.clone(),
                    email: format!("{}@example.com", user_id),
                    name: user_id.clone(),
                    role: UserRole::Customer,
                })
                .await
                .unwrap();
        }
        Hotel { clock, service }
    }
}

pub fn memory_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new())
}
