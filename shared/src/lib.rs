use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub id: Uuid,
    pub command_type: CommandType,
    pub payload: serde_json::Value,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandType {
    CheckInBooking,
    CheckoutBooking,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandReply {
    pub id: Uuid,
    pub command_id: Uuid,
    pub status: CommandStatus,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CommandStatus {
    Success,
    Failed,
}

/// Payload of both `CheckInBooking` and `CheckoutBooking`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutData {
    pub booking_id: Uuid,
    pub user_id: String,
    pub room_id: String,
}

/// A command the external scheduler must deliver back on the command topic at `fire_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledCommand {
    pub schedule_name: String,
    pub fire_at: DateTime<Utc>,
    pub command: Command,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: Uuid,
    pub aggregate_id: Uuid,
    pub event_type: EventType,
    pub event_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    BookingCheckedOut,
    InvoiceIssued,
}

impl EventType {
    pub fn topic(&self) -> &'static str {
        match self {
            EventType::BookingCheckedOut => "booking-events",
            EventType::InvoiceIssued => "invoice-events",
        }
    }
}

impl Command {
    pub fn new(command_type: CommandType, payload: serde_json::Value) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            command_type,
            payload,
            idempotency_key: id.to_string(),
            created_at: Utc::now(),
        }
    }

    /// Checkout commands are keyed by booking so a redelivered or re-scheduled
    /// trigger carries the same idempotency key.
    pub fn checkout(data: &CheckoutData) -> anyhow::Result<Self> {
        let mut command = Self::new(CommandType::CheckoutBooking, serde_json::to_value(data)?);
        command.idempotency_key = format!("checkout_{}", data.booking_id);
        Ok(command)
    }

    pub fn payload_as<T: DeserializeOwned>(&self) -> anyhow::Result<T> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

impl CommandReply {
    pub fn success(command_id: Uuid, result: Option<serde_json::Value>) -> Self {
        Self {
            id: Uuid::new_v4(),
            command_id,
            status: CommandStatus::Success,
            result,
            error: None,
            created_at: Utc::now(),
        }
    }

    pub fn failed(command_id: Uuid, error: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            command_id,
            status: CommandStatus::Failed,
            result: None,
            error: Some(error),
            created_at: Utc::now(),
        }
    }
}
