//! Events recorded in the same transaction as the state change that caused
//! them. The service relays pending entries to the message bus and then marks
//! them published; published entries expire and are purged with the rest.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::invoice::Invoice;
use crate::keys::{self, KeyTag};
use crate::models::Booking;
use crate::projections;
use crate::store::{ItemKey, KvStore, Query};

pub const BOOKING_CHECKED_OUT: &str = "BookingCheckedOut";
pub const INVOICE_ISSUED: &str = "InvoiceIssued";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub event_id: Uuid,
    pub aggregate_id: Uuid,
    pub event_type: String,
    pub event_data: Value,
    pub created_at: DateTime<Utc>,
    /// Position among the events recorded by one write.
    pub sequence: u32,
}

impl OutboxEvent {
    pub fn new(
        aggregate_id: Uuid,
        event_type: &str,
        event_data: Value,
        created_at: DateTime<Utc>,
        sequence: u32,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            aggregate_id,
            event_type: event_type.to_string(),
            event_data,
            created_at,
            sequence,
        }
    }

    pub fn key(&self) -> ItemKey {
        keys::outbox_event(self.created_at, self.aggregate_id, self.sequence)
    }
}

/// What a checkout announces, in publication order.
pub fn checkout_events(booking: &Booking, invoice: &Invoice, now: DateTime<Utc>) -> Result<Vec<OutboxEvent>> {
    let invoice = serde_json::to_value(invoice).map_err(StoreError::from)?;
    Ok(vec![
        OutboxEvent::new(
            booking.booking_id,
            BOOKING_CHECKED_OUT,
            json!({
                "booking_id": booking.booking_id,
                "room_id": booking.room_id,
                "user_id": booking.user_id,
            }),
            now,
            0,
        ),
        OutboxEvent::new(booking.booking_id, INVOICE_ISSUED, invoice, now, 1),
    ])
}

pub struct Outbox {
    store: Arc<dyn KvStore>,
    page_size: usize,
}

impl Outbox {
    pub fn new(store: Arc<dyn KvStore>, page_size: usize) -> Self {
        Self { store, page_size }
    }

    /// Oldest unpublished events first, at most `limit` of them.
    pub async fn pending(&self, limit: usize) -> Result<Vec<OutboxEvent>> {
        let mut events = Vec::new();
        let mut query = Query::begins_with(keys::OUTBOX, KeyTag::Event.prefix(), self.page_size);
        while events.len() < limit {
            let page = self.store.query(&query).await?;
            for item in page.items.iter().filter(|item| !projections::is_published(item)) {
                events.push(projections::outbox_event_from_item(item)?);
            }
            match page.last_evaluated_key {
                Some(last) => query = query.starting_after(Some(last)),
                None => break,
            }
        }
        events.truncate(limit);
        Ok(events)
    }

    pub async fn mark_published(&self, event: &OutboxEvent, expires_at: DateTime<Utc>) -> Result<()> {
        match self
            .store
            .transact_write(vec![projections::outbox_published_update(event, expires_at)])
            .await
        {
            Ok(()) => Ok(()),
            // Only published entries expire, so a missing one was already relayed.
            Err(StoreError::ConditionFailed { .. }) => {
                debug!("Outbox event {} already purged", event.event_id);
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}
