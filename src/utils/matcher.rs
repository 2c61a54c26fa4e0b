use crate::error::{SyncError, SyncResult};
use crate::models::{EventDateTime, ExistingEvent, ProjectedEvent};
use serde::Deserialize;

/// What to do when an existing event lacks a field the projection defines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingFieldPolicy {
    /// Count the missing field as a change and update the event
    #[default]
    Differ,
    /// Fail with `SyncError::IncompleteMatchField`
    Error,
}

/// The `{summary, start, end}` tuple that ties a projected event to one
/// already in the calendar
#[derive(Debug, Clone, Copy)]
pub struct NaturalKey<'a> {
    pub summary: &'a str,
    pub start: &'a EventDateTime,
    pub end: &'a EventDateTime,
}

impl<'a> NaturalKey<'a> {
    pub fn of(event: &'a ProjectedEvent) -> Self {
        Self {
            summary: &event.summary,
            start: &event.start,
            end: &event.end,
        }
    }

    pub fn matches(&self, event: &ExistingEvent) -> bool {
        event.summary.as_deref() == Some(self.summary)
            && event.start.as_ref() == Some(self.start)
            && event.end.as_ref() == Some(self.end)
    }
}

/// Find the calendar event corresponding to `projected`.
///
/// Linear scan in list order; the first event matching the natural key wins
/// and any later duplicates are ignored.
pub fn find_existing<'a>(
    projected: &ProjectedEvent,
    existing_events: &'a [ExistingEvent],
) -> Option<&'a ExistingEvent> {
    let key = NaturalKey::of(projected);
    existing_events.iter().find(|event| key.matches(event))
}

/// Names of the projected fields whose value differs on `existing`.
///
/// A missing `attendees` list counts as empty since the calendar API omits
/// empty arrays.
pub fn changed_fields(
    projected: &ProjectedEvent,
    existing: &ExistingEvent,
    policy: MissingFieldPolicy,
) -> SyncResult<Vec<&'static str>> {
    let mut changed = Vec::new();

    let mut check = |field: &'static str, same: Option<bool>| -> SyncResult<()> {
        match (same, policy) {
            (Some(true), _) => {}
            (Some(false), _) | (None, MissingFieldPolicy::Differ) => changed.push(field),
            (None, MissingFieldPolicy::Error) => {
                return Err(SyncError::IncompleteMatchField {
                    event_id: existing.id.clone(),
                    field,
                })
            }
        }
        Ok(())
    };

    check(
        "summary",
        existing.summary.as_ref().map(|s| *s == projected.summary),
    )?;
    check(
        "description",
        existing
            .description
            .as_ref()
            .map(|d| *d == projected.description),
    )?;
    if let Some(location) = &projected.location {
        check("location", existing.location.as_ref().map(|l| l == location))?;
    }
    check("start", existing.start.as_ref().map(|s| *s == projected.start))?;
    check("end", existing.end.as_ref().map(|e| *e == projected.end))?;

    let existing_attendees = existing.attendees.as_deref().unwrap_or_default();
    check(
        "attendees",
        Some(existing_attendees == projected.attendees.as_slice()),
    )?;

    Ok(changed)
}

/// Whether any projected field differs from the existing event
pub fn needs_update(
    projected: &ProjectedEvent,
    existing: &ExistingEvent,
    policy: MissingFieldPolicy,
) -> SyncResult<bool> {
    Ok(!changed_fields(projected, existing, policy)?.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Attendee;
    use chrono::DateTime;

    fn at(ts: &str) -> EventDateTime {
        EventDateTime::new(DateTime::parse_from_rfc3339(ts).unwrap(), "America/New_York")
    }

    fn projected() -> ProjectedEvent {
        ProjectedEvent {
            summary: "Spikers".to_string(),
            description: "vs. Blockers @G1".to_string(),
            location: Some("123 Main St".to_string()),
            start: at("2024-06-01T19:00:00-04:00"),
            end: at("2024-06-01T20:00:00-04:00"),
            attendees: vec![],
        }
    }

    #[test]
    fn test_first_match_wins() {
        let event = projected();
        let mut e1 = ExistingEvent::from_projected("e1", &event);
        e1.description = Some("something else".to_string());
        let e2 = ExistingEvent::from_projected("e2", &event);

        let existing = vec![e1, e2];
        let found = find_existing(&event, &existing).unwrap();
        assert_eq!(found.id, "e1");
    }

    #[test]
    fn test_no_match() {
        let event = projected();
        let mut other = ExistingEvent::from_projected("e1", &event);
        other.summary = Some("Diggers".to_string());
        let mut later = ExistingEvent::from_projected("e2", &event);
        later.start = Some(at("2024-06-08T19:00:00-04:00"));

        assert!(find_existing(&event, &[other, later]).is_none());
        assert!(find_existing(&event, &[]).is_none());
    }

    #[test]
    fn test_match_ignores_offset_notation() {
        let event = projected();
        let mut existing = ExistingEvent::from_projected("e1", &event);
        existing.start = Some(at("2024-06-01T23:00:00+00:00"));
        existing.end = Some(at("2024-06-01T20:00:00-04:00"));

        assert_eq!(find_existing(&event, &[existing]).unwrap().id, "e1");
    }

    #[test]
    fn test_location_change_needs_update() {
        let event = projected();
        let mut existing = ExistingEvent::from_projected("e1", &event);
        existing.location = Some("G1".to_string());

        assert!(needs_update(&event, &existing, MissingFieldPolicy::Differ).unwrap());
        assert_eq!(
            changed_fields(&event, &existing, MissingFieldPolicy::Differ).unwrap(),
            vec!["location"]
        );
    }

    #[test]
    fn test_identical_event_needs_no_update() {
        let event = projected();
        let mut existing = ExistingEvent::from_projected("e1", &event);
        existing
            .other
            .insert("htmlLink".to_string(), serde_json::json!("https://example.com"));

        assert!(!needs_update(&event, &existing, MissingFieldPolicy::Error).unwrap());
    }

    #[test]
    fn test_missing_field_policy() {
        let event = projected();
        let mut existing = ExistingEvent::from_projected("e1", &event);
        existing.location = None;

        assert!(needs_update(&event, &existing, MissingFieldPolicy::Differ).unwrap());

        let err = needs_update(&event, &existing, MissingFieldPolicy::Error).unwrap_err();
        assert!(matches!(
            err,
            SyncError::IncompleteMatchField {
                field: "location",
                ..
            }
        ));
    }

    #[test]
    fn test_absent_attendees_equal_empty_list() {
        let event = projected();
        let mut existing = ExistingEvent::from_projected("e1", &event);
        existing.attendees = None;
        assert!(!needs_update(&event, &existing, MissingFieldPolicy::Error).unwrap());

        let mut with_guests = event.clone();
        with_guests.attendees = vec![Attendee::optional("a@example.com")];
        assert_eq!(
            changed_fields(&with_guests, &existing, MissingFieldPolicy::Error).unwrap(),
            vec!["attendees"]
        );
    }

    #[test]
    fn test_attendee_extra_properties_ignored() {
        let mut event = projected();
        event.attendees = vec![Attendee::optional("a@example.com")];

        let existing: ExistingEvent = serde_json::from_value(serde_json::json!({
            "id": "e1",
            "summary": "Spikers",
            "description": "vs. Blockers @G1",
            "location": "123 Main St",
            "start": {"dateTime": "2024-06-01T19:00:00-04:00", "timeZone": "America/New_York"},
            "end": {"dateTime": "2024-06-01T20:00:00-04:00", "timeZone": "America/New_York"},
            "attendees": [
                {"email": "a@example.com", "optional": true, "responseStatus": "needsAction"}
            ],
            "status": "confirmed"
        }))
        .unwrap();

        assert!(!needs_update(&event, &existing, MissingFieldPolicy::Differ).unwrap());
        assert_eq!(existing.other["status"], "confirmed");
    }
}
