use std::sync::Arc;
use std::time::Duration;

use booking_engine::BookingService;
use tokio::time;
use tracing::{debug, error};

/// Periodically drops expired items: index entries of checked-out bookings and
/// published outbox events.
pub struct Housekeeper {
    service: Arc<BookingService>,
    every: Duration,
}

impl Housekeeper {
    pub fn new(service: Arc<BookingService>, every: Duration) -> Self {
        Self {
            service,
            every: every.max(Duration::from_secs(1)),
        }
    }

    pub async fn run(&self) {
        let mut interval = time::interval(self.every);

        loop {
            interval.tick().await;

            match self.service.purge_expired().await {
                Ok(purged) => debug!("Housekeeping pass removed {} items", purged),
                Err(e) => error!("Error purging expired items: {}", e),
            }
        }
    }
}
