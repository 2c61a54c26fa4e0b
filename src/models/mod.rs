use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A scheduled league game for one of our teams
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    pub start: Option<DateTime<FixedOffset>>,
    pub team: String,
    pub opponent: String,
    pub gym_code: String,
    #[serde(default)]
    pub gym_name: Option<String>,
    #[serde(default)]
    pub gym_address: Option<String>,
}

impl Game {
    pub fn new(
        start: DateTime<FixedOffset>,
        team: impl Into<String>,
        opponent: impl Into<String>,
        gym_code: impl Into<String>,
    ) -> Self {
        Self {
            start: Some(start),
            team: team.into(),
            opponent: opponent.into(),
            gym_code: gym_code.into(),
            gym_name: None,
            gym_address: None,
        }
    }

    /// Fill in the gym name and address resolved from `gym_code`
    pub fn with_gym(mut self, gym: &Gym) -> Self {
        self.gym_name = Some(gym.name.clone());
        self.gym_address = gym.address.clone();
        self
    }
}

/// Gym details from the league's location table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gym {
    pub name: String,
    pub address: Option<String>,
}

/// Guest invited to a game event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendee {
    pub email: String,
    #[serde(default)]
    pub optional: bool,
}

impl Attendee {
    pub fn optional(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            optional: true,
        }
    }
}

/// Start or end of a calendar event, using the calendar API's field names.
///
/// `date_time` values compare by instant, so the same moment written with a
/// different UTC offset is still equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDateTime {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<DateTime<FixedOffset>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl EventDateTime {
    pub fn new(date_time: DateTime<FixedOffset>, time_zone: &str) -> Self {
        Self {
            date_time: Some(date_time),
            date: None,
            time_zone: Some(time_zone.to_string()),
        }
    }
}

impl fmt::Display for EventDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.date_time, &self.date) {
            (Some(dt), _) => write!(f, "{}", dt.to_rfc3339()),
            (None, Some(d)) => write!(f, "{}", d),
            (None, None) => Ok(()),
        }
    }
}

/// Calendar event fields derived from a [`Game`]. Recomputed on every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedEvent {
    pub summary: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub start: EventDateTime,
    pub end: EventDateTime,
    pub attendees: Vec<Attendee>,
}

/// An event as returned by the calendar service.
///
/// Only the fields we project are typed; everything else the service sends
/// back is kept untouched in `other`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExistingEvent {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<EventDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<EventDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attendees: Option<Vec<Attendee>>,
    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

impl ExistingEvent {
    /// Build the record the calendar would hold after writing `event` under `id`
    pub fn from_projected(id: impl Into<String>, event: &ProjectedEvent) -> Self {
        Self {
            id: id.into(),
            summary: Some(event.summary.clone()),
            description: Some(event.description.clone()),
            location: event.location.clone(),
            start: Some(event.start.clone()),
            end: Some(event.end.clone()),
            attendees: if event.attendees.is_empty() {
                None
            } else {
                Some(event.attendees.clone())
            },
            other: serde_json::Map::new(),
        }
    }
}

/// Outcome of reconciling one game against the calendar
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    Created,
    Updated,
    Skipped,
    DryRun,
    Failed(String),
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::Created => write!(f, "created"),
            SyncStatus::Updated => write!(f, "updated"),
            SyncStatus::Skipped => write!(f, "skip, no changes"),
            SyncStatus::DryRun => write!(f, "dry_run"),
            SyncStatus::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Per-game reconciliation result.
///
/// The event fields describe the event the status refers to: the service's
/// response for writes, the existing event for skips, and the projection for
/// dry runs.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationResult {
    pub event_id: String,
    pub status: SyncStatus,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub start: Option<EventDateTime>,
}

impl ReconciliationResult {
    pub fn from_event(status: SyncStatus, event: &ExistingEvent) -> Self {
        Self {
            event_id: event.id.clone(),
            status,
            summary: event.summary.clone(),
            description: event.description.clone(),
            start: event.start.clone(),
        }
    }

    pub fn from_projected(id: &str, status: SyncStatus, event: &ProjectedEvent) -> Self {
        Self {
            event_id: id.to_string(),
            status,
            summary: Some(event.summary.clone()),
            description: Some(event.description.clone()),
            start: Some(event.start.clone()),
        }
    }

    pub fn failed(game: &Game, reason: String) -> Self {
        Self {
            event_id: String::new(),
            status: SyncStatus::Failed(reason),
            summary: Some(game.team.clone()),
            description: Some(format!("vs. {} @{}", game.opponent, game.gym_code)),
            start: None,
        }
    }
}

impl fmt::Display for ReconciliationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} {} @ {}",
            self.status,
            self.summary.as_deref().unwrap_or_default(),
            self.description.as_deref().unwrap_or_default(),
            self.start.as_ref().map(|s| s.to_string()).unwrap_or_default()
        )
    }
}
