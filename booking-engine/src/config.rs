use chrono::Duration;

/// Tunables for the availability and allocation paths.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Longest bookable stay; also sizes the backwards window of availability scans.
    pub max_stay: Duration,
    /// Extra allocation attempts after a lost race.
    pub allocation_retries: u32,
    /// Items requested per store query page.
    pub page_size: usize,
    /// How long checked-out index entries and published outbox events linger before purge.
    pub index_retention: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_stay: Duration::days(30),
            allocation_retries: 1,
            page_size: 100,
            index_retention: Duration::days(7),
        }
    }
}

impl EngineConfig {
    pub fn with_max_stay_days(mut self, days: i64) -> Self {
        self.max_stay = Duration::days(days);
        self
    }

    pub fn with_allocation_retries(mut self, retries: u32) -> Self {
        self.allocation_retries = retries;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_index_retention_hours(mut self, hours: i64) -> Self {
        self.index_retention = Duration::hours(hours);
        self
    }
}
