//! Boundary to whatever fires the automatic checkout at a booking's checkout instant.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutRequest {
    pub booking_id: Uuid,
    pub user_id: String,
    pub room_id: String,
    pub checkout_at: DateTime<Utc>,
}

impl CheckoutRequest {
    pub fn schedule_name(&self) -> String {
        format!("checkout-{}", self.booking_id)
    }
}

#[async_trait]
pub trait CheckoutScheduler: Send + Sync {
    async fn schedule_checkout(&self, request: &CheckoutRequest) -> anyhow::Result<()>;
}

/// Used when no scheduler is wired; checkouts are then operator-driven.
#[derive(Debug, Default)]
pub struct NoopScheduler;

#[async_trait]
impl CheckoutScheduler for NoopScheduler {
    async fn schedule_checkout(&self, _request: &CheckoutRequest) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Keeps every request; handy in tests.
#[derive(Debug, Default)]
pub struct RecordingScheduler {
    requests: Mutex<Vec<CheckoutRequest>>,
}

impl RecordingScheduler {
    pub fn requests(&self) -> Vec<CheckoutRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

#[async_trait]
impl CheckoutScheduler for RecordingScheduler {
    async fn schedule_checkout(&self, request: &CheckoutRequest) -> anyhow::Result<()> {
        let mut requests = self
            .requests
            .lock()
            .map_err(|_| anyhow::anyhow!("scheduler state poisoned"))?;
        requests.push(request.clone());
        Ok(())
    }
}
