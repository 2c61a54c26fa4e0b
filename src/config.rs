//! Application settings loaded from `config/config.toml`.

use crate::error::{SyncError, SyncResult};
use crate::scrapers::nyurban::ScraperSettings;
use crate::utils::duration::{lookahead_window, parse_duration};
use crate::utils::matcher::MissingFieldPolicy;
use crate::utils::reconciler::{FailurePolicy, SyncOptions};
use anyhow::{Context, Result};
use chrono::Utc;
use chrono_tz::Tz;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Environment variables that override the league credentials
pub const USER_ENV: &str = "VB_USER";
pub const PWD_ENV: &str = "VB_PWD";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub calendar: CalendarConfig,
    #[serde(default)]
    pub flag: FlagConfig,
    pub scrape: ScrapeConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CalendarConfig {
    #[serde(default = "default_calendar_id")]
    pub calendar_id: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    /// How far ahead to look for existing events, e.g. "4w" or "1w2d"
    #[serde(default = "default_max_offset")]
    pub max_offset: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_token_path")]
    pub token_path: PathBuf,
    #[serde(default = "default_creds_path")]
    pub creds_path: PathBuf,
    #[serde(default = "default_email_path")]
    pub email_path: PathBuf,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            calendar_id: default_calendar_id(),
            scopes: default_scopes(),
            max_offset: default_max_offset(),
            max_results: default_max_results(),
            token_path: default_token_path(),
            creds_path: default_creds_path(),
            email_path: default_email_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlagConfig {
    #[serde(default)]
    pub print_events: bool,
    #[serde(default)]
    pub create_events: bool,
    #[serde(default)]
    pub add_email_guests: bool,
    #[serde(default)]
    pub log_scrape: bool,
    #[serde(default = "default_num_teams")]
    pub num_teams: usize,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    #[serde(default)]
    pub missing_field_policy: MissingFieldPolicy,
}

impl Default for FlagConfig {
    fn default() -> Self {
        Self {
            print_events: false,
            create_events: false,
            add_email_guests: false,
            log_scrape: false,
            num_teams: default_num_teams(),
            failure_policy: FailurePolicy::default(),
            missing_field_policy: MissingFieldPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScrapeConfig {
    pub vb_url: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub pwd: String,
}

fn default_timezone() -> String {
    "America/New_York".to_string()
}

fn default_calendar_id() -> String {
    "primary".to_string()
}

fn default_scopes() -> Vec<String> {
    vec!["https://www.googleapis.com/auth/calendar".to_string()]
}

fn default_max_offset() -> String {
    "4w".to_string()
}

fn default_max_results() -> usize {
    100
}

fn default_token_path() -> PathBuf {
    PathBuf::from("config/token.json")
}

fn default_creds_path() -> PathBuf {
    PathBuf::from("config/credentials.json")
}

fn default_email_path() -> PathBuf {
    PathBuf::from("config/emails.txt")
}

fn default_num_teams() -> usize {
    1
}

impl AppConfig {
    /// Read the TOML file at `path`, apply env overrides and validate
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at {}", path.display()))?;

        let mut config = Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
        config.apply_overrides(std::env::var(USER_ENV).ok(), std::env::var(PWD_ENV).ok());
        config.validate()?;

        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Replace the league credentials with any that were given
    pub fn apply_overrides(&mut self, user: Option<String>, pwd: Option<String>) {
        if let Some(user) = user.filter(|u| !u.is_empty()) {
            self.scrape.user = user;
        }
        if let Some(pwd) = pwd.filter(|p| !p.is_empty()) {
            self.scrape.pwd = pwd;
        }
    }

    pub fn validate(&self) -> SyncResult<()> {
        self.tz()?;

        if self.flag.num_teams == 0 {
            return Err(SyncError::Config("flag.num_teams must be at least 1".to_string()));
        }
        if self.calendar.max_results == 0 {
            return Err(SyncError::Config(
                "calendar.max_results must be at least 1".to_string(),
            ));
        }
        lookahead_window(Utc::now(), &self.calendar.max_offset)?;
        if parse_duration(&self.calendar.max_offset) == 0 {
            warn!(
                "calendar.max_offset '{}' is zero seconds, no existing events will be found",
                self.calendar.max_offset
            );
        }

        Ok(())
    }

    pub fn tz(&self) -> SyncResult<Tz> {
        self.timezone
            .parse()
            .map_err(|_| SyncError::InvalidTimezone(self.timezone.clone()))
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            create_events: self.flag.create_events,
            print_events: self.flag.print_events,
            timezone: self.timezone.clone(),
            failure_policy: self.flag.failure_policy,
            missing_field_policy: self.flag.missing_field_policy,
        }
    }

    pub fn scraper_settings(&self, upcoming_only: bool) -> SyncResult<ScraperSettings> {
        Ok(ScraperSettings {
            url: self.scrape.vb_url.clone(),
            user: self.scrape.user.clone(),
            pwd: self.scrape.pwd.clone(),
            num_teams: self.flag.num_teams,
            timezone: self.tz()?,
            upcoming_only,
            log_scrape: self.flag.log_scrape,
        })
    }
}
