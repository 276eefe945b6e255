use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use booking_engine::{CheckoutRequest, CheckoutScheduler};
use rdkafka::producer::{FutureProducer, FutureRecord};
use shared::*;
use tracing::info;

/// Hands checkout triggers to the external scheduler, which delivers the
/// enclosed command back on the command topic at `fire_at`.
pub struct KafkaScheduler {
    producer: FutureProducer,
    topic: String,
}

impl KafkaScheduler {
    pub fn new(producer: FutureProducer, topic: String) -> Self {
        Self { producer, topic }
    }
}

pub fn scheduled_checkout(request: &CheckoutRequest) -> Result<ScheduledCommand> {
    let command = Command::checkout(&CheckoutData {
        booking_id: request.booking_id,
        user_id: request.user_id.clone(),
        room_id: request.room_id.clone(),
    })?;
    Ok(ScheduledCommand {
        schedule_name: request.schedule_name(),
        fire_at: request.checkout_at,
        command,
    })
}

#[async_trait]
impl CheckoutScheduler for KafkaScheduler {
    async fn schedule_checkout(&self, request: &CheckoutRequest) -> Result<()> {
        let scheduled = scheduled_checkout(request)?;
        let json = serde_json::to_string(&scheduled)?;
        let key = scheduled.schedule_name.clone();
        let record = FutureRecord::to(&self.topic).payload(&json).key(&key);

        self.producer
            .send(record, Duration::from_secs(5))
            .await
            .map_err(|(e, _)| anyhow::anyhow!("Failed to publish schedule: {}", e))?;

        info!("Scheduled {} at {}", scheduled.schedule_name, scheduled.fire_at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    #[test]
    fn schedule_carries_an_idempotent_checkout_command() {
        let request = CheckoutRequest {
            booking_id: Uuid::new_v4(),
            user_id: "u-1".to_string(),
            room_id: "101".to_string(),
            checkout_at: Utc.with_ymd_and_hms(2030, 1, 4, 10, 0, 0).unwrap(),
        };
        let scheduled = scheduled_checkout(&request).unwrap();

        assert_eq!(scheduled.schedule_name, format!("checkout-{}", request.booking_id));
        assert_eq!(scheduled.fire_at, request.checkout_at);
        assert_eq!(scheduled.command.command_type, CommandType::CheckoutBooking);
        assert_eq!(
            scheduled.command.idempotency_key,
            format!("checkout_{}", request.booking_id)
        );
        let data: CheckoutData = scheduled.command.payload_as().unwrap();
        assert_eq!(data.room_id, "101");
    }
}
