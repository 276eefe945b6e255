use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use booking_engine::{BookingService, OutboxEvent};
use rdkafka::producer::{FutureProducer, FutureRecord};
use shared::*;
use tokio::time;
use tracing::{error, info};

const BATCH_SIZE: usize = 100;

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &DomainEvent) -> Result<()>;
}

pub struct KafkaPublisher {
    producer: FutureProducer,
}

impl KafkaPublisher {
    pub fn new(producer: FutureProducer) -> Self {
        Self { producer }
    }
}

#[async_trait]
impl EventPublisher for KafkaPublisher {
    async fn publish(&self, event: &DomainEvent) -> Result<()> {
        let json = serde_json::to_string(event)?;
        let key = event.aggregate_id.to_string();
        let record = FutureRecord::to(event.event_type.topic()).payload(&json).key(&key);

        self.producer
            .send(record, Duration::from_secs(5))
            .await
            .map_err(|(e, _)| anyhow::anyhow!("Failed to publish event: {}", e))?;

        Ok(())
    }
}

pub fn domain_event(event: &OutboxEvent) -> Result<DomainEvent> {
    let event_type: EventType = serde_json::from_value(serde_json::Value::String(event.event_type.clone()))?;
    Ok(DomainEvent {
        id: event.event_id,
        aggregate_id: event.aggregate_id,
        event_type,
        event_data: event.event_data.clone(),
        created_at: event.created_at,
    })
}

/// Relays events recorded by the engine. An event stays pending until the
/// bus has acknowledged it, so a failed publish is retried on the next pass.
pub struct OutboxProcessor {
    service: Arc<BookingService>,
    publisher: Arc<dyn EventPublisher>,
    every: Duration,
}

impl OutboxProcessor {
    pub fn new(service: Arc<BookingService>, publisher: Arc<dyn EventPublisher>, every: Duration) -> Self {
        Self {
            service,
            publisher,
            every,
        }
    }

    pub async fn run(&self) {
        let mut interval = time::interval(self.every);

        loop {
            interval.tick().await;

            if let Err(e) = self.process_outbox_events().await {
                error!("Error processing outbox events: {}", e);
            }
        }
    }

    /// One pass over pending events; returns how many were published.
    pub async fn process_outbox_events(&self) -> Result<usize> {
        let mut published = 0;
        for event in self.service.pending_events(BATCH_SIZE).await? {
            let domain = match domain_event(&event) {
                Ok(domain) => domain,
                Err(e) => {
                    error!("Unknown outbox event {} of type {}: {}", event.event_id, event.event_type, e);
                    continue;
                }
            };
            if let Err(e) = self.publisher.publish(&domain).await {
                error!("Failed to publish event {}: {}", event.event_id, e);
                continue;
            }

            self.service.mark_event_published(&event).await?;
            published += 1;
            info!("Published {:?} for {}", domain.event_type, domain.aggregate_id);
        }

        Ok(published)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::CommandProcessor;
    use bigdecimal::BigDecimal;
    use booking_engine::{BookingRequest, FirstAvailable, FixedClock, MemoryStore, User, UserRole};
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Fails the first `failures` publishes, then records what it is given.
    struct FlakyPublisher {
        failures: AtomicUsize,
        published: Mutex<Vec<DomainEvent>>,
    }

    impl FlakyPublisher {
        fn new(failures: usize) -> Self {
            Self {
                failures: AtomicUsize::new(failures),
                published: Mutex::new(Vec::new()),
            }
        }

        fn published(&self) -> Vec<DomainEvent> {
            self.published.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventPublisher for FlakyPublisher {
        async fn publish(&self, event: &DomainEvent) -> Result<()> {
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                anyhow::bail!("broker unavailable");
            }
            self.published.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    async fn checked_out_command() -> (Arc<BookingService>, Command) {
        let service = BookingService::builder(Arc::new(MemoryStore::new()))
            .clock(Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap())))
            .selector(Arc::new(FirstAvailable))
            .build();
        service
            .add_user(&User {
                user_id: "u-1".to_string(),
                email: "ada@example.com".to_string(),
                name: "Ada".to_string(),
                role: UserRole::Customer,
            })
            .await
            .unwrap();
        service.add_room("101", "SUITE").await.unwrap();
        service
            .put_category_price("SUITE", &BigDecimal::from(300))
            .await
            .unwrap();
        let booking = service
            .create_booking(
                &BookingRequest {
                    category: "suite".to_string(),
                    checkin: "2030-01-02T15:00:00Z".to_string(),
                    checkout: "2030-01-04T11:00:00Z".to_string(),
                },
                "u-1",
            )
            .await
            .unwrap();
        let command = Command::checkout(&CheckoutData {
            booking_id: booking.booking_id,
            user_id: "u-1".to_string(),
            room_id: booking.room_id,
        })
        .unwrap();
        (Arc::new(service), command)
    }

    #[tokio::test]
    async fn failed_publish_survives_redelivery() {
        let (service, command) = checked_out_command().await;
        let processor = CommandProcessor::new(service.clone());
        let publisher = Arc::new(FlakyPublisher::new(2));
        let relay = OutboxProcessor::new(service.clone(), publisher.clone(), Duration::from_secs(5));

        assert_eq!(processor.process(&command).await.status, CommandStatus::Success);
        assert_eq!(relay.process_outbox_events().await.unwrap(), 0);

        // The redelivered command is a no-op, and the events are still owed.
        let redelivered = processor.process(&command).await;
        assert_eq!(redelivered.result.unwrap()["already_applied"], json!(true));
        assert_eq!(relay.process_outbox_events().await.unwrap(), 2);

        let published = publisher.published();
        let types: Vec<EventType> = published.iter().map(|e| e.event_type).collect();
        assert_eq!(types, vec![EventType::BookingCheckedOut, EventType::InvoiceIssued]);
        assert_eq!(published[1].event_data["nights"], json!(2));
        assert_eq!(published[1].event_data["total_amount"], json!("600"));

        assert_eq!(relay.process_outbox_events().await.unwrap(), 0);
        assert_eq!(publisher.published().len(), 2);
    }

    #[test]
    fn unknown_event_types_are_refused() {
        let event = OutboxEvent::new(
            uuid::Uuid::new_v4(),
            "RoomRenamed",
            json!({}),
            Utc::now(),
            0,
        );
        assert!(domain_event(&event).is_err());

        let invoice = OutboxEvent::new(event.aggregate_id, booking_engine::INVOICE_ISSUED, json!({}), Utc::now(), 1);
        assert_eq!(domain_event(&invoice).unwrap().event_type, EventType::InvoiceIssued);
    }
}
