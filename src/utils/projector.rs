use crate::error::{SyncError, SyncResult};
use crate::models::{Attendee, EventDateTime, Game, ProjectedEvent};
use chrono::Duration;

/// Every game is booked for a fixed one hour slot
pub const GAME_LENGTH_HOURS: i64 = 1;

/// Turn a game into the calendar event fields we want it to have.
///
/// `timezone` is the IANA name attached to start and end. The attendee list is
/// embedded as given.
pub fn project(game: &Game, attendees: &[Attendee], timezone: &str) -> SyncResult<ProjectedEvent> {
    let start = game.start.ok_or_else(|| SyncError::MissingStartTime {
        team: game.team.clone(),
        opponent: game.opponent.clone(),
    })?;
    let end = start + Duration::hours(GAME_LENGTH_HOURS);

    // Fall back to the gym code when the address lookup came up empty
    let location = game
        .gym_address
        .as_deref()
        .filter(|address| !address.is_empty())
        .or_else(|| Some(game.gym_code.as_str()).filter(|code| !code.is_empty()))
        .map(str::to_string);

    Ok(ProjectedEvent {
        summary: game.team.clone(),
        description: format!("vs. {} @{}", game.opponent, game.gym_code),
        location,
        start: EventDateTime::new(start, timezone),
        end: EventDateTime::new(end, timezone),
        attendees: attendees.to_vec(),
    })
}
