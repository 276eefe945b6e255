//! Error types for the booking engine.

use thiserror::Error;

use crate::store::ItemKey;

/// Errors raised by a [`KvStore`](crate::store::KvStore) backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A per-item precondition rejected the whole transaction.
    #[error("condition failed on item {index} ({key})")]
    ConditionFailed { index: usize, key: ItemKey },

    /// The request itself was malformed (duplicate keys, too many items, ...).
    #[error("invalid store request: {0}")]
    Invalid(String),

    /// Transport, pool or database failure. The outcome of a write is unknown.
    #[error("store backend error: {0}")]
    Backend(String),

    #[error("item serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_condition_failure(&self) -> bool {
        matches!(self, StoreError::ConditionFailed { .. })
    }
}

impl From<diesel::result::Error> for StoreError {
    fn from(err: diesel::result::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Entity named in a not-found error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    User,
    Category,
    Room,
    Booking,
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Resource::User => "user",
            Resource::Category => "category",
            Resource::Room => "room",
            Resource::Booking => "booking",
        };
        f.write_str(name)
    }
}

/// The engine's error taxonomy.
#[derive(Debug, Error)]
pub enum BookingError {
    #[error("{resource} '{id}' not found")]
    NotFound { resource: Resource, id: String },

    /// No candidate room, or the allocation race was lost with the retry budget spent.
    #[error("no {category} rooms available for {checkin} to {checkout}")]
    NoAvailability {
        category: String,
        checkin: String,
        checkout: String,
    },

    #[error("invalid interval: {0}")]
    InvalidInterval(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("room with id {0} already exists")]
    RoomAlreadyExists(String),

    #[error("email {0} is already in use")]
    UserAlreadyExists(String),

    /// Stored state contradicts an invariant (vanished item, corrupt record, ...).
    #[error("consistency violation: {0}")]
    Consistency(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl BookingError {
    pub fn not_found(resource: Resource, id: impl Into<String>) -> Self {
        BookingError::NotFound {
            resource,
            id: id.into(),
        }
    }
}

pub type Result<T, E = BookingError> = std::result::Result<T, E>;
