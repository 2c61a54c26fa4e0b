pub mod google_calendar;
pub mod oauth;

use crate::models::{ExistingEvent, ProjectedEvent};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Calendar operations the sync needs
#[async_trait]
pub trait CalendarPort: Send + Sync {
    /// Events starting between `time_from` and `time_until`, ordered by start
    async fn list_events(
        &self,
        time_from: DateTime<Utc>,
        time_until: DateTime<Utc>,
        max_results: usize,
    ) -> Result<Vec<ExistingEvent>>;

    /// Insert a new event and return it as stored
    async fn create_event(&self, event: &ProjectedEvent) -> Result<ExistingEvent>;

    /// Replace the event with `event_id` and return it as stored
    async fn update_event(&self, event_id: &str, event: &ProjectedEvent) -> Result<ExistingEvent>;
}
