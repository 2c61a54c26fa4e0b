use crate::models::{Game, ReconciliationResult};
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

pub const GAMES_CACHE_FILE: &str = "cache/games_cache.json";

/// Save scraped games to a JSON cache file
pub fn save_games_to_cache(games: &[Game], cache_file: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(games).context("Failed to serialize games")?;
    if let Some(parent) = cache_file.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).context("Failed to create cache directory")?;
    }
    std::fs::write(cache_file, json).context("Failed to write cache file")?;
    Ok(())
}

/// Load scraped games from a JSON cache file
pub fn load_games_from_cache(cache_file: &Path) -> Result<Vec<Game>> {
    let json = std::fs::read_to_string(cache_file).context("Failed to read cache file")?;
    let games: Vec<Game> = serde_json::from_str(&json).context("Failed to deserialize games")?;
    Ok(games)
}

#[derive(Debug, Serialize)]
struct ResultRow<'a> {
    #[serde(rename = "Status")]
    status: String,
    #[serde(rename = "Event Id")]
    event_id: &'a str,
    #[serde(rename = "Summary")]
    summary: &'a str,
    #[serde(rename = "Description")]
    description: &'a str,
    #[serde(rename = "Start")]
    start: String,
}

/// Save reconciliation results to CSV
pub fn save_results_to_csv(results: &[ReconciliationResult], filename: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(filename)
        .with_context(|| format!("Failed to create CSV file {}", filename.display()))?;

    for result in results {
        writer.serialize(ResultRow {
            status: result.status.to_string(),
            event_id: &result.event_id,
            summary: result.summary.as_deref().unwrap_or_default(),
            description: result.description.as_deref().unwrap_or_default(),
            start: result
                .start
                .as_ref()
                .map(|s| s.to_string())
                .unwrap_or_default(),
        })?;
    }

    writer.flush().context("Failed to write CSV file")?;
    Ok(())
}
