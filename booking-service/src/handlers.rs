use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use booking_engine::{BookingError, BookingService, TransitionOutcome};
use futures::StreamExt;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::Message;
use serde_json::json;
use shared::*;
use tracing::{error, info, warn};

/// Turns one command into its reply. Events a checkout produces are recorded
/// in the outbox by the transition itself and relayed by the outbox processor.
pub struct CommandProcessor {
    service: Arc<BookingService>,
}

impl CommandProcessor {
    pub fn new(service: Arc<BookingService>) -> Self {
        Self { service }
    }

    pub async fn process(&self, command: &Command) -> CommandReply {
        let data = match command.payload_as::<CheckoutData>() {
            Ok(data) => data,
            Err(e) => {
                warn!("Malformed {:?} payload on command {}: {}", command.command_type, command.id, e);
                return CommandReply::failed(command.id, format!("Malformed payload: {}", e));
            }
        };

        let outcome = match command.command_type {
            CommandType::CheckoutBooking => self
                .service
                .checkout(data.booking_id, &data.user_id, &data.room_id)
                .await
                .map(|result| result.outcome),
            CommandType::CheckInBooking => {
                self.service
                    .check_in(data.booking_id, &data.user_id, &data.room_id)
                    .await
            }
        };
        match outcome {
            Ok(outcome) => CommandReply::success(command.id, Some(outcome_json(&outcome))),
            Err(e) => failed(command, e),
        }
    }
}

fn outcome_json(outcome: &TransitionOutcome) -> serde_json::Value {
    let booking = outcome.booking();
    json!({
        "booking_id": booking.booking_id,
        "status": booking.status,
        "already_applied": outcome.already_applied(),
    })
}

fn failed(command: &Command, err: BookingError) -> CommandReply {
    match &err {
        BookingError::Store(_) | BookingError::Consistency(_) => {
            error!("Error handling command {}: {}", command.id, err)
        }
        _ => warn!("Command {} rejected: {}", command.id, err),
    }
    CommandReply::failed(command.id, err.to_string())
}

pub struct CommandHandler {
    processor: CommandProcessor,
    producer: FutureProducer,
    reply_topic: String,
}

impl CommandHandler {
    pub fn new(service: Arc<BookingService>, producer: FutureProducer, reply_topic: String) -> Self {
        Self {
            processor: CommandProcessor::new(service),
            producer,
            reply_topic,
        }
    }

    pub async fn run(&self, consumer: StreamConsumer) {
        let mut message_stream = consumer.stream();

        while let Some(message) = message_stream.next().await {
            match message {
                Ok(m) => {
                    if let Some(payload) = m.payload_view::<str>() {
                        match payload {
                            Ok(json_str) => match serde_json::from_str::<Command>(json_str) {
                                Ok(command) => {
                                    if let Err(e) = self.handle_command(command).await {
                                        error!("Error handling command: {}", e);
                                    }
                                }
                                Err(e) => error!("Error decoding command: {}", e),
                            },
                            Err(e) => error!("Error parsing payload: {}", e),
                        }
                    }
                    if let Err(e) = consumer.commit_message(&m, rdkafka::consumer::CommitMode::Async) {
                        error!("Error committing message: {}", e);
                    }
                }
                Err(e) => error!("Error receiving message: {}", e),
            }
        }
    }

    async fn handle_command(&self, command: Command) -> Result<()> {
        info!("Handling {:?} command {}", command.command_type, command.id);
        let reply = self.processor.process(&command).await;
        self.send_reply(reply).await
    }

    async fn send_reply(&self, reply: CommandReply) -> Result<()> {
        let json = serde_json::to_string(&reply)?;
        let key = reply.command_id.to_string();
        let record = FutureRecord::to(&self.reply_topic).payload(&json).key(&key);

        self.producer
            .send(record, Duration::from_secs(5))
            .await
            .map_err(|(e, _)| anyhow::anyhow!("Failed to send reply: {}", e))?;

        Ok(())
    }
}
