use crate::api::CalendarPort;
use crate::error::SyncResult;
use crate::models::{ExistingEvent, Game, ProjectedEvent, ReconciliationResult, SyncStatus};
use crate::utils::attendees::AttendeePolicy;
use crate::utils::matcher::{changed_fields, find_existing, MissingFieldPolicy};
use crate::utils::projector::project;
use anyhow::Context;
use serde::Deserialize;
use tracing::{debug, info, warn};

/// Id reported for events that were not written because of a dry run
pub const DRY_RUN_EVENT_ID: &str = "999__dry_run";

/// How a failure on one game affects the rest of the run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop at the first failing game. Earlier writes stay in place.
    #[default]
    Abort,
    /// Record a `failed` result for the game and move on
    Continue,
}

/// Knobs the reconciler reads, taken from the app config
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// When false nothing is written to the calendar (dry run)
    pub create_events: bool,
    /// Print one line per game as it is processed
    pub print_events: bool,
    /// Time zone name attached to event start and end
    pub timezone: String,
    pub failure_policy: FailurePolicy,
    pub missing_field_policy: MissingFieldPolicy,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            create_events: false,
            print_events: false,
            timezone: "America/New_York".to_string(),
            failure_policy: FailurePolicy::default(),
            missing_field_policy: MissingFieldPolicy::default(),
        }
    }
}

/// What the calendar needs for one game
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action<'a> {
    Create,
    Update(&'a ExistingEvent),
    Skip(&'a ExistingEvent),
}

/// Decide create / update / skip for one projected event
pub fn plan<'a>(
    projected: &ProjectedEvent,
    existing_events: &'a [ExistingEvent],
    policy: MissingFieldPolicy,
) -> SyncResult<Action<'a>> {
    let Some(existing) = find_existing(projected, existing_events) else {
        return Ok(Action::Create);
    };

    let changed = changed_fields(projected, existing, policy)?;
    if changed.is_empty() {
        Ok(Action::Skip(existing))
    } else {
        debug!(event_id = %existing.id, ?changed, "Existing event differs");
        Ok(Action::Update(existing))
    }
}

/// Syncs a list of games into the calendar, one game at a time
pub struct Reconciler<'a, C: CalendarPort + ?Sized, A: AttendeePolicy + ?Sized> {
    calendar: &'a C,
    attendees: &'a A,
    options: SyncOptions,
}

impl<'a, C: CalendarPort + ?Sized, A: AttendeePolicy + ?Sized> Reconciler<'a, C, A> {
    pub fn new(calendar: &'a C, attendees: &'a A, options: SyncOptions) -> Self {
        Self {
            calendar,
            attendees,
            options,
        }
    }

    /// Reconcile every game against the pre-fetched `existing_events`.
    ///
    /// Games are processed in input order. Results come back in the same order.
    pub async fn reconcile(
        &self,
        games: &[Game],
        existing_events: &[ExistingEvent],
    ) -> SyncResult<Vec<ReconciliationResult>> {
        info!(
            games = games.len(),
            existing = existing_events.len(),
            dry_run = !self.options.create_events,
            "Reconciling schedule"
        );

        let mut results = Vec::with_capacity(games.len());

        for game in games {
            let result = match self.reconcile_game(game, existing_events).await {
                Ok(result) => result,
                Err(e) => match self.options.failure_policy {
                    FailurePolicy::Abort => return Err(e),
                    FailurePolicy::Continue => {
                        warn!("Failed to sync {} vs. {}: {}", game.team, game.opponent, e);
                        ReconciliationResult::failed(game, e.to_string())
                    }
                },
            };

            if self.options.print_events {
                println!("     {}", result);
            }
            results.push(result);
        }

        Ok(results)
    }

    /// Project, match and act on a single game
    pub async fn reconcile_game(
        &self,
        game: &Game,
        existing_events: &[ExistingEvent],
    ) -> SyncResult<ReconciliationResult> {
        let attendees = self.attendees.get_attendees(&game.team);
        let projected = project(game, &attendees, &self.options.timezone)?;
        let action = plan(
            &projected,
            existing_events,
            self.options.missing_field_policy,
        )?;

        if !self.options.create_events {
            debug!(?action, summary = %projected.summary, "Dry run, not writing");
            return Ok(ReconciliationResult::from_projected(
                DRY_RUN_EVENT_ID,
                SyncStatus::DryRun,
                &projected,
            ));
        }

        match action {
            Action::Create => {
                let created = self
                    .calendar
                    .create_event(&projected)
                    .await
                    .with_context(|| {
                        format!("Failed to create event: {} {}", projected.summary, projected.description)
                    })?;
                Ok(ReconciliationResult::from_event(SyncStatus::Created, &created))
            }
            Action::Update(existing) => {
                let updated = self
                    .calendar
                    .update_event(&existing.id, &projected)
                    .await
                    .with_context(|| format!("Failed to update event: {}", existing.id))?;
                Ok(ReconciliationResult::from_event(SyncStatus::Updated, &updated))
            }
            Action::Skip(existing) => Ok(ReconciliationResult::from_event(
                SyncStatus::Skipped,
                existing,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::models::{Attendee, Gym};
    use crate::scrapers::enrich_schedule;
    use crate::utils::attendees::EmailGuests;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Create(ProjectedEvent),
        Update(String, ProjectedEvent),
    }

    /// Calendar that keeps events in memory and records every write
    #[derive(Default)]
    struct MemoryCalendar {
        events: Mutex<Vec<ExistingEvent>>,
        calls: Mutex<Vec<Call>>,
        fail_on: Option<String>,
    }

    impl MemoryCalendar {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn events(&self) -> Vec<ExistingEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CalendarPort for MemoryCalendar {
        async fn list_events(
            &self,
            _time_from: DateTime<Utc>,
            _time_until: DateTime<Utc>,
            max_results: usize,
        ) -> anyhow::Result<Vec<ExistingEvent>> {
            Ok(self.events().into_iter().take(max_results).collect())
        }

        async fn create_event(&self, event: &ProjectedEvent) -> anyhow::Result<ExistingEvent> {
            if self.fail_on.as_deref() == Some(event.description.as_str()) {
                anyhow::bail!("calendar unavailable");
            }
            self.calls.lock().unwrap().push(Call::Create(event.clone()));
            let mut events = self.events.lock().unwrap();
            let created = ExistingEvent::from_projected(format!("evt{}", events.len() + 1), event);
            events.push(created.clone());
            Ok(created)
        }

        async fn update_event(
            &self,
            event_id: &str,
            event: &ProjectedEvent,
        ) -> anyhow::Result<ExistingEvent> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Update(event_id.to_string(), event.clone()));
            let mut events = self.events.lock().unwrap();
            let updated = ExistingEvent::from_projected(event_id, event);
            if let Some(slot) = events.iter_mut().find(|e| e.id == event_id) {
                *slot = updated.clone();
            }
            Ok(updated)
        }
    }

    fn game(start: &str, opponent: &str) -> Game {
        Game::new(
            DateTime::parse_from_rfc3339(start).unwrap(),
            "Spikers",
            opponent,
            "G1",
        )
    }

    fn schedule() -> Vec<Game> {
        vec![
            game("2024-06-01T19:00:00-04:00", "Blockers"),
            game("2024-06-08T19:00:00-04:00", "Diggers"),
            game("2024-06-15T20:00:00-04:00", "Setters"),
        ]
    }

    fn live() -> SyncOptions {
        SyncOptions {
            create_events: true,
            ..SyncOptions::default()
        }
    }

    #[tokio::test]
    async fn test_creates_new_game_with_gym_address() {
        let gyms = HashMap::from([(
            "G1".to_string(),
            Gym {
                name: "Midtown Gym".to_string(),
                address: Some("123 Main St".to_string()),
            },
        )]);
        let games = enrich_schedule(
            vec![game("2024-06-01T19:00:00-04:00", "Blockers")],
            &gyms,
            None,
        );
        let calendar = MemoryCalendar::default();
        let guests = EmailGuests::None;
        let reconciler = Reconciler::new(&calendar, &guests, live());

        let results = reconciler.reconcile(&games, &[]).await.unwrap();

        let calls = calendar.calls();
        assert_eq!(calls.len(), 1);
        let Call::Create(event) = &calls[0] else {
            panic!("expected a create call, got {:?}", calls[0]);
        };
        assert_eq!(event.location.as_deref(), Some("123 Main St"));
        assert_eq!(
            event.end.date_time.unwrap().to_rfc3339(),
            "2024-06-01T20:00:00-04:00"
        );

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].event_id, "evt1");
        assert_eq!(results[0].status, SyncStatus::Created);
    }

    #[tokio::test]
    async fn test_second_run_skips_everything() {
        let calendar = MemoryCalendar::default();
        let guests = EmailGuests::None;
        let reconciler = Reconciler::new(&calendar, &guests, live());
        let games = schedule();

        let first = reconciler.reconcile(&games, &[]).await.unwrap();
        assert!(first.iter().all(|r| r.status == SyncStatus::Created));

        let existing = calendar.list_events(Utc::now(), Utc::now(), 100).await.unwrap();
        let second = reconciler.reconcile(&games, &existing).await.unwrap();

        assert!(second.iter().all(|r| r.status == SyncStatus::Skipped));
        let first_ids: Vec<_> = first.iter().map(|r| r.event_id.clone()).collect();
        let second_ids: Vec<_> = second.iter().map(|r| r.event_id.clone()).collect();
        assert_eq!(first_ids, second_ids);
        assert_eq!(calendar.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_changed_game_is_updated() {
        let calendar = MemoryCalendar::default();
        let guests = EmailGuests::None;
        let reconciler = Reconciler::new(&calendar, &guests, live());
        let games = schedule();
        reconciler.reconcile(&games, &[]).await.unwrap();

        let mut moved = games.clone();
        moved[1].gym_code = "G2".to_string();
        let existing = calendar.events();
        let results = reconciler.reconcile(&moved, &existing).await.unwrap();

        let statuses: Vec<_> = results.iter().map(|r| r.status.clone()).collect();
        assert_eq!(
            statuses,
            vec![SyncStatus::Skipped, SyncStatus::Updated, SyncStatus::Skipped]
        );
        assert_eq!(results[1].event_id, "evt2");
        assert_eq!(results[1].description.as_deref(), Some("vs. Diggers @G2"));
        assert!(matches!(calendar.calls().last(), Some(Call::Update(id, _)) if id == "evt2"));
    }

    #[tokio::test]
    async fn test_skip_reports_existing_fields() {
        let games = vec![game("2024-06-01T19:00:00-04:00", "Blockers")];
        let projected = project(&games[0], &[], "America/New_York").unwrap();
        let mut existing = ExistingEvent::from_projected("abc123", &projected);
        // Same instant written in UTC, as the calendar may send it back
        existing.start.as_mut().unwrap().date_time =
            Some(DateTime::parse_from_rfc3339("2024-06-01T23:00:00+00:00").unwrap());

        let calendar = MemoryCalendar::default();
        let guests = EmailGuests::None;
        let reconciler = Reconciler::new(&calendar, &guests, live());
        let results = reconciler
            .reconcile(&games, &[existing.clone()])
            .await
            .unwrap();

        assert_eq!(results[0].status, SyncStatus::Skipped);
        assert_eq!(results[0].event_id, "abc123");
        assert_eq!(results[0].start, existing.start);
        assert!(calendar.calls().is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_never_writes() {
        let calendar = MemoryCalendar::default();
        let guests = EmailGuests::None;
        let first = Reconciler::new(&calendar, &guests, live());
        first.reconcile(&schedule()[..1], &[]).await.unwrap();
        let existing = calendar.events();

        let mut games = schedule();
        games[0].opponent = "Renamed".to_string();
        let dry = Reconciler::new(&calendar, &guests, SyncOptions::default());
        let results = dry.reconcile(&games, &existing).await.unwrap();

        assert_eq!(calendar.calls().len(), 1);
        assert_eq!(results.len(), 3);
        for result in &results {
            assert_eq!(result.status, SyncStatus::DryRun);
            assert_eq!(result.event_id, DRY_RUN_EVENT_ID);
        }
    }

    #[tokio::test]
    async fn test_attendees_come_from_policy() {
        let guests = EmailGuests::ByTeam(HashMap::from([(
            "Spikers".to_string(),
            vec![Attendee::optional("a@example.com")],
        )]));
        let calendar = MemoryCalendar::default();
        let reconciler = Reconciler::new(&calendar, &guests, live());
        reconciler.reconcile(&schedule()[..1], &[]).await.unwrap();

        let calls = calendar.calls();
        let Call::Create(event) = &calls[0] else {
            panic!("expected a create call");
        };
        assert_eq!(event.attendees, vec![Attendee::optional("a@example.com")]);
    }

    #[tokio::test]
    async fn test_abort_policy_stops_at_first_failure() {
        let mut games = schedule();
        games[1].start = None;
        let calendar = MemoryCalendar::default();
        let guests = EmailGuests::None;
        let reconciler = Reconciler::new(&calendar, &guests, live());

        let err = reconciler.reconcile(&games, &[]).await.unwrap_err();
        assert!(matches!(err, SyncError::MissingStartTime { .. }));
        // The first game was already written and stays written
        assert_eq!(calendar.events().len(), 1);
    }

    #[tokio::test]
    async fn test_continue_policy_records_failures() {
        let calendar = MemoryCalendar {
            fail_on: Some("vs. Diggers @G1".to_string()),
            ..MemoryCalendar::default()
        };
        let options = SyncOptions {
            failure_policy: FailurePolicy::Continue,
            ..live()
        };
        let guests = EmailGuests::None;
        let reconciler = Reconciler::new(&calendar, &guests, options);

        let results = reconciler.reconcile(&schedule(), &[]).await.unwrap();

        assert_eq!(results[0].status, SyncStatus::Created);
        assert!(matches!(&results[1].status, SyncStatus::Failed(reason) if reason.contains("Diggers")));
        assert_eq!(results[2].status, SyncStatus::Created);
        assert_eq!(calendar.events().len(), 2);
    }

    #[test]
    fn test_plan_decision_table() {
        let projected = project(
            &game("2024-06-01T19:00:00-04:00", "Blockers"),
            &[],
            "America/New_York",
        )
        .unwrap();
        assert_eq!(
            plan(&projected, &[], MissingFieldPolicy::Differ).unwrap(),
            Action::Create
        );

        let same = vec![ExistingEvent::from_projected("e1", &projected)];
        assert!(matches!(
            plan(&projected, &same, MissingFieldPolicy::Differ).unwrap(),
            Action::Skip(e) if e.id == "e1"
        ));

        let mut changed = same.clone();
        changed[0].description = Some("vs. Somebody @G9".to_string());
        assert!(matches!(
            plan(&projected, &changed, MissingFieldPolicy::Differ).unwrap(),
            Action::Update(e) if e.id == "e1"
        ));
    }
}
