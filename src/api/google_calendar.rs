use crate::api::CalendarPort;
use crate::models::{ExistingEvent, ProjectedEvent};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Response, Url};
use serde::Deserialize;
use tracing::debug;

const CALENDAR_API_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";

/// Response from the events list endpoint
#[derive(Debug, Deserialize)]
struct EventsResponse {
    #[serde(default)]
    items: Vec<ExistingEvent>,
}

/// Google Calendar REST client bound to one calendar
pub struct GoogleCalendarClient {
    client: reqwest::Client,
    calendar_id: String,
    access_token: String,
}

impl GoogleCalendarClient {
    pub fn new(calendar_id: String, access_token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            calendar_id,
            access_token,
        }
    }

    /// `.../calendars/{calendar_id}/events[/{event_id}]` with each segment escaped
    fn events_url(&self, event_id: Option<&str>) -> Result<Url> {
        let mut url = Url::parse(CALENDAR_API_BASE_URL)?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| anyhow::anyhow!("Calendar API URL cannot have a path"))?;
            segments.extend(["calendars", self.calendar_id.as_str(), "events"]);
            if let Some(id) = event_id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    /// Turn a non-success response into an error carrying the body
    async fn check(response: Response, action: &str) -> Result<Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("Calendar API returned {} while trying to {}: {}", status, action, body)
    }
}

fn api_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn is_cancelled(event: &ExistingEvent) -> bool {
    event.other.get("status").and_then(|s| s.as_str()) == Some("cancelled")
}

#[async_trait]
impl CalendarPort for GoogleCalendarClient {
    async fn list_events(
        &self,
        time_from: DateTime<Utc>,
        time_until: DateTime<Utc>,
        max_results: usize,
    ) -> Result<Vec<ExistingEvent>> {
        let url = self.events_url(None)?;
        debug!(calendar = %self.calendar_id, %time_from, %time_until, "Listing events");

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .query(&[
                ("timeMin", api_timestamp(time_from)),
                ("timeMax", api_timestamp(time_until)),
                ("maxResults", max_results.to_string()),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
            ])
            .send()
            .await
            .context("Failed to fetch events from Google Calendar")?;

        let events: EventsResponse = Self::check(response, "list events")
            .await?
            .json()
            .await
            .context("Failed to parse Google Calendar events")?;

        Ok(events
            .items
            .into_iter()
            .filter(|event| !is_cancelled(event))
            .collect())
    }

    async fn create_event(&self, event: &ProjectedEvent) -> Result<ExistingEvent> {
        let response = self
            .client
            .post(self.events_url(None)?)
            .bearer_auth(&self.access_token)
            .json(event)
            .send()
            .await
            .with_context(|| format!("Failed to create event: {}", event.summary))?;

        Self::check(response, "create an event")
            .await?
            .json()
            .await
            .context("Failed to parse created event")
    }

    async fn update_event(&self, event_id: &str, event: &ProjectedEvent) -> Result<ExistingEvent> {
        let response = self
            .client
            .put(self.events_url(Some(event_id))?)
            .bearer_auth(&self.access_token)
            .json(event)
            .send()
            .await
            .with_context(|| format!("Failed to update event: {}", event_id))?;

        Self::check(response, "update an event")
            .await?
            .json()
            .await
            .context("Failed to parse updated event")
    }
}
