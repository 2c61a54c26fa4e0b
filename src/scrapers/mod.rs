pub mod nyurban;

use crate::models::{Game, Gym};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::warn;

/// Where the game schedule comes from
#[async_trait]
pub trait ScheduleSource: Send + Sync {
    /// Games with gym details filled in, optionally limited to upcoming ones
    async fn get_games(&self) -> Result<Vec<Game>>;
}

/// Join games with the gym table and drop games that start before `upcoming_from`.
///
/// A game whose gym code is not in `gyms` is kept without gym details.
pub fn enrich_schedule(
    games: Vec<Game>,
    gyms: &HashMap<String, Gym>,
    upcoming_from: Option<DateTime<Utc>>,
) -> Vec<Game> {
    games
        .into_iter()
        .filter(|game| match (upcoming_from, game.start) {
            (Some(from), Some(start)) => start >= from,
            _ => true,
        })
        .map(|game| match gyms.get(&game.gym_code) {
            Some(gym) => game.with_gym(gym),
            None => {
                warn!("No gym info for code '{}'", game.gym_code);
                game
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn game(start: &str, gym_code: &str) -> Game {
        Game::new(
            DateTime::parse_from_rfc3339(start).unwrap(),
            "Spikers",
            "Blockers",
            gym_code,
        )
    }

    #[test]
    fn test_enrich_schedule() {
        let gyms = HashMap::from([(
            "G1".to_string(),
            Gym {
                name: "Midtown Gym".to_string(),
                address: Some("123 Main St".to_string()),
            },
        )]);
        let games = vec![
            game("2024-05-25T19:00:00-04:00", "G1"),
            game("2024-06-01T19:00:00-04:00", "G1"),
            game("2024-06-08T19:00:00-04:00", "G7"),
        ];
        let now = Utc.with_ymd_and_hms(2024, 5, 30, 0, 0, 0).unwrap();

        let upcoming = enrich_schedule(games.clone(), &gyms, Some(now));
        assert_eq!(upcoming.len(), 2);
        assert_eq!(upcoming[0].gym_name.as_deref(), Some("Midtown Gym"));
        assert_eq!(upcoming[0].gym_address.as_deref(), Some("123 Main St"));
        assert_eq!(upcoming[1].gym_name, None);

        let everything = enrich_schedule(games, &gyms, None);
        assert_eq!(everything.len(), 3);
    }
}
