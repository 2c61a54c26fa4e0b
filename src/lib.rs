pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod scrapers;
pub mod utils;

pub use api::*;
pub use config::AppConfig;
pub use error::{SyncError, SyncResult};
pub use models::*;
pub use scrapers::*;
pub use utils::*;

use anyhow::{Context, Result};
use api::google_calendar::GoogleCalendarClient;
use api::oauth::{save_authorized_user, TokenStore};
use chrono::{DateTime, Utc};
use scrapers::nyurban::LeagueScraper;
use std::path::{Path, PathBuf};
use tracing::info;
use utils::attendees::{
    confirm_with_user, load_email_groups, validate_team_count, AttendeePolicy, EmailGuests,
};
use utils::data::{load_games_from_cache, save_games_to_cache, GAMES_CACHE_FILE};
use utils::duration::lookahead_window;
use utils::reconciler::{Reconciler, SyncOptions};

/// How a single sync run should behave, on top of the config file
#[derive(Debug, Clone)]
pub struct SyncRequest {
    /// Compute everything but never write to the calendar
    pub dry_run: bool,
    /// Ask before using the team -> email mapping
    pub confirm: bool,
    /// Reuse the last scraped schedule when the cache file exists
    pub use_cache: bool,
    pub cache_path: PathBuf,
}

impl Default for SyncRequest {
    fn default() -> Self {
        Self {
            dry_run: false,
            confirm: true,
            use_cache: false,
            cache_path: PathBuf::from(GAMES_CACHE_FILE),
        }
    }
}

/// Scrape the league schedule and bring the calendar in line with it
pub async fn run_sync(config: &AppConfig, request: &SyncRequest) -> Result<Vec<ReconciliationResult>> {
    let games = load_schedule(config, request).await?;
    let teams = validate_team_count(&games, config.flag.num_teams)?;
    info!(games = games.len(), teams = ?teams, "Loaded schedule");

    let guests = build_guests(config, &teams)?;
    if request.confirm && config.flag.add_email_guests {
        let stdin = std::io::stdin();
        let confirmed = confirm_with_user(
            &guests.describe(&teams),
            &mut stdin.lock(),
            &mut std::io::stdout(),
        )?;
        if !confirmed {
            anyhow::bail!("Team emails were not confirmed, nothing was synced");
        }
    }

    let calendar = connect_calendar(config).await?;

    let mut options = config.sync_options();
    if request.dry_run {
        options.create_events = false;
    }

    let window = lookahead_window(Utc::now(), &config.calendar.max_offset)?;
    sync_schedule(
        &calendar,
        &guests,
        &games,
        options,
        window,
        config.calendar.max_results,
    )
    .await
}

/// List the events in `window` and reconcile `games` against them
pub async fn sync_schedule<C, A>(
    calendar: &C,
    attendees: &A,
    games: &[Game],
    options: SyncOptions,
    window: (DateTime<Utc>, DateTime<Utc>),
    max_results: usize,
) -> Result<Vec<ReconciliationResult>>
where
    C: CalendarPort + ?Sized,
    A: AttendeePolicy + ?Sized,
{
    let (time_from, time_until) = window;
    let existing = calendar
        .list_events(time_from, time_until, max_results)
        .await
        .context("Failed to list existing calendar events")?;

    if options.print_events {
        print_upcoming_events(&existing);
    }

    let results = Reconciler::new(calendar, attendees, options)
        .reconcile(games, &existing)
        .await?;
    Ok(results)
}

/// Upcoming games, from the cache or a fresh scrape
async fn load_schedule(config: &AppConfig, request: &SyncRequest) -> Result<Vec<Game>> {
    if request.use_cache && request.cache_path.exists() {
        println!(
            "Loading games from cache file: {}\n",
            request.cache_path.display()
        );
        let mut games = load_games_from_cache(&request.cache_path)?;
        let now = Utc::now();
        games.retain(|game| game.start.map_or(true, |start| start >= now));
        return Ok(games);
    }

    let scraper = LeagueScraper::new(config.scraper_settings(true)?)?;
    let games = scraper
        .get_games()
        .await
        .context("Failed to scrape league schedule")?;

    save_games_to_cache(&games, &request.cache_path)?;
    println!(
        "Saved games to cache file: {}\n",
        request.cache_path.display()
    );

    Ok(games)
}

fn build_guests(config: &AppConfig, teams: &[String]) -> Result<EmailGuests> {
    if !config.flag.add_email_guests {
        return Ok(EmailGuests::None);
    }

    let groups = load_email_groups(&config.calendar.email_path)?;
    Ok(EmailGuests::from_groups(teams, groups))
}

async fn connect_calendar(config: &AppConfig) -> Result<GoogleCalendarClient> {
    let token = token_store(config).access_token().await?;
    Ok(GoogleCalendarClient::new(
        config.calendar.calendar_id.clone(),
        token,
    ))
}

fn token_store(config: &AppConfig) -> TokenStore {
    TokenStore::new(
        config.calendar.token_path.clone(),
        config.calendar.creds_path.clone(),
        config.calendar.scopes.clone(),
    )
}

/// Run the consent flow and store a fresh token, replacing any existing one
pub async fn authenticate(config: &AppConfig) -> Result<PathBuf> {
    let user = token_store(config).authorize().await?;
    let path: &Path = &config.calendar.token_path;
    save_authorized_user(path, &user)?;
    Ok(path.to_path_buf())
}

/// Events in the look-ahead window of the configured calendar
pub async fn list_upcoming_events(config: &AppConfig) -> Result<Vec<ExistingEvent>> {
    let calendar = connect_calendar(config).await?;
    let (time_from, time_until) = lookahead_window(Utc::now(), &config.calendar.max_offset)?;
    calendar
        .list_events(time_from, time_until, config.calendar.max_results)
        .await
}

pub fn format_event_line(event: &ExistingEvent) -> String {
    let start = event.start.as_ref().map(|s| s.to_string()).unwrap_or_default();
    format!("{} {}", start, event.summary.as_deref().unwrap_or_default())
}

/// Report lines for a listing of calendar events
pub fn upcoming_event_lines(events: &[ExistingEvent]) -> Vec<String> {
    if events.is_empty() {
        return vec!["No upcoming events found.".to_string()];
    }
    events
        .iter()
        .map(|event| format!("     {}", format_event_line(event)))
        .collect()
}

pub fn print_upcoming_events(events: &[ExistingEvent]) {
    for line in upcoming_event_lines(events) {
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Mutex;

    /// Calendar that remembers the window it was asked for
    #[derive(Default)]
    struct WindowCalendar {
        windows: Mutex<Vec<(DateTime<Utc>, DateTime<Utc>, usize)>>,
    }

    #[async_trait]
    impl CalendarPort for WindowCalendar {
        async fn list_events(
            &self,
            time_from: DateTime<Utc>,
            time_until: DateTime<Utc>,
            max_results: usize,
        ) -> Result<Vec<ExistingEvent>> {
            self.windows
                .lock()
                .unwrap()
                .push((time_from, time_until, max_results));
            Ok(Vec::new())
        }

        async fn create_event(&self, event: &ProjectedEvent) -> Result<ExistingEvent> {
            Ok(ExistingEvent::from_projected("evt1", event))
        }

        async fn update_event(&self, event_id: &str, event: &ProjectedEvent) -> Result<ExistingEvent> {
            Ok(ExistingEvent::from_projected(event_id, event))
        }
    }

    #[tokio::test]
    async fn test_sync_schedule_lists_window_then_reconciles() {
        let calendar = WindowCalendar::default();
        let guests = EmailGuests::None;
        let now = Utc.with_ymd_and_hms(2024, 5, 30, 0, 0, 0).unwrap();
        let window = lookahead_window(now, "4w").unwrap();
        let games = vec![Game::new(
            DateTime::parse_from_rfc3339("2024-06-01T19:00:00-04:00").unwrap(),
            "Spikers",
            "Blockers",
            "G1",
        )];
        let options = SyncOptions {
            create_events: true,
            ..SyncOptions::default()
        };

        let results = sync_schedule(&calendar, &guests, &games, options, window, 25)
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, SyncStatus::Created);
        assert_eq!(
            calendar.windows.lock().unwrap().as_slice(),
            &[(now, now + chrono::Duration::weeks(4), 25)]
        );
    }

    #[test]
    fn test_format_event_line() {
        let event: ExistingEvent = serde_json::from_value(serde_json::json!({
            "id": "abc",
            "summary": "Spikers",
            "start": {"dateTime": "2024-06-01T19:00:00-04:00"}
        }))
        .unwrap();
        assert_eq!(format_event_line(&event), "2024-06-01T19:00:00-04:00 Spikers");

        let bare: ExistingEvent = serde_json::from_value(serde_json::json!({"id": "x"})).unwrap();
        assert_eq!(format_event_line(&bare), " ");
    }

    #[test]
    fn test_upcoming_event_lines() {
        assert_eq!(upcoming_event_lines(&[]), vec!["No upcoming events found."]);

        let events: Vec<ExistingEvent> = serde_json::from_value(serde_json::json!([
            {"id": "a", "summary": "Spikers", "start": {"dateTime": "2024-06-01T19:00:00-04:00"}},
            {"id": "b", "summary": "Diggers", "start": {"date": "2024-06-02"}}
        ]))
        .unwrap();
        assert_eq!(
            upcoming_event_lines(&events),
            vec![
                "     2024-06-01T19:00:00-04:00 Spikers",
                "     2024-06-02 Diggers",
            ]
        );
    }
}
