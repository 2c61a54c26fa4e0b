use crate::error::{SyncError, SyncResult};
use crate::models::{Attendee, Game};
use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::io::{BufRead, Write};
use std::path::Path;

/// Line in the email file that starts the next team's group
const GROUP_SEPARATOR: &str = "-";

/// Source of the guest list embedded in each team's events
pub trait AttendeePolicy {
    fn get_attendees(&self, team_name: &str) -> Vec<Attendee>;
}

/// Guests invited to game events
#[derive(Debug, Clone, Default, PartialEq)]
pub enum EmailGuests {
    /// Nobody gets invited
    #[default]
    None,
    /// The same list for every team
    Everyone(Vec<Attendee>),
    /// One list per team name; unknown teams get nobody
    ByTeam(HashMap<String, Vec<Attendee>>),
}

impl AttendeePolicy for EmailGuests {
    fn get_attendees(&self, team_name: &str) -> Vec<Attendee> {
        match self {
            EmailGuests::None => Vec::new(),
            EmailGuests::Everyone(attendees) => attendees.clone(),
            EmailGuests::ByTeam(by_team) => by_team.get(team_name).cloned().unwrap_or_default(),
        }
    }
}

impl EmailGuests {
    /// Pair email groups with teams in the order the teams first appear.
    ///
    /// A single group is shared by every team. Teams without a group get an
    /// empty list.
    pub fn from_groups(teams: &[String], mut groups: Vec<Vec<Attendee>>) -> Self {
        if groups.len() == 1 {
            return EmailGuests::Everyone(groups.remove(0));
        }

        groups.resize(teams.len().max(groups.len()), Vec::new());
        EmailGuests::ByTeam(teams.iter().cloned().zip(groups).collect())
    }

    /// Human readable team -> emails mapping used for confirmation
    pub fn describe(&self, teams: &[String]) -> String {
        let mut msg = String::from("Confirm team emails:\n");
        for team in teams {
            let emails: Vec<String> = self
                .get_attendees(team)
                .into_iter()
                .map(|a| a.email)
                .collect();
            msg.push_str(&format!("    '{}': {}\n", team, emails.join(", ")));
        }
        msg
    }
}

/// Split an email file into groups.
///
/// One address per line, blank lines ignored, and a `-` line closes the
/// current group. Every address becomes an optional attendee.
pub fn parse_email_groups(text: &str) -> Vec<Vec<Attendee>> {
    let mut groups = Vec::new();
    let mut emails = Vec::new();

    for line in text.lines().map(str::trim) {
        if line.is_empty() {
            continue;
        }
        if line == GROUP_SEPARATOR {
            groups.push(std::mem::take(&mut emails));
            continue;
        }
        emails.push(Attendee::optional(line));
    }
    groups.push(emails);

    groups
}

/// Read and parse the email file at `path`
pub fn load_email_groups(path: &Path) -> Result<Vec<Vec<Attendee>>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read email list {}", path.display()))?;
    Ok(parse_email_groups(&text))
}

/// Distinct team names in order of first appearance
pub fn team_names(games: &[Game]) -> Vec<String> {
    let mut seen = HashSet::new();
    games
        .iter()
        .filter(|game| seen.insert(game.team.as_str()))
        .map(|game| game.team.clone())
        .collect()
}

/// Refuse to sync when the schedule is empty or covers fewer teams than expected
pub fn validate_team_count(games: &[Game], num_teams: usize) -> SyncResult<Vec<String>> {
    if games.is_empty() {
        return Err(SyncError::NoGamesFound);
    }

    let teams = team_names(games);
    if teams.len() < num_teams {
        return Err(SyncError::TeamCountMismatch {
            expected: num_teams,
            found: teams.len(),
            teams,
        });
    }

    Ok(teams)
}

/// Ask a yes/no question until the answer is one or the other.
///
/// End of input counts as "no".
pub fn confirm_with_user<R: BufRead, W: Write>(
    msg: &str,
    input: &mut R,
    output: &mut W,
) -> Result<bool> {
    loop {
        write!(output, "Q: {} (y/n): ", msg)?;
        output.flush()?;

        let mut reply = String::new();
        if input.read_line(&mut reply)? == 0 {
            return Ok(false);
        }

        match reply.trim().to_lowercase().as_str() {
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => writeln!(output, "Please respond with 'y' or 'n'.")?,
        }
    }
}
