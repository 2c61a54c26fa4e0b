//! Error types for schedule syncing.

use thiserror::Error;

/// Errors raised while turning a scraped schedule into calendar writes.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Missing start date or time for {team} vs. {opponent}")]
    MissingStartTime { team: String, opponent: String },

    #[error("Existing event {event_id} has no '{field}' field")]
    IncompleteMatchField { event_id: String, field: &'static str },

    #[error("No games found in the scraped schedule")]
    NoGamesFound,

    #[error("Expected {expected} teams, have only {found} ({})", .teams.join(", "))]
    TeamCountMismatch {
        expected: usize,
        found: usize,
        teams: Vec<String>,
    },

    #[error("Unknown timezone: {0}")]
    InvalidTimezone(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Calendar(#[from] anyhow::Error),
}

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;
