use crate::models::{Game, Gym};
use crate::scrapers::{enrich_schedule, ScheduleSource};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, FixedOffset, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use tracing::debug;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
const NO_GAME: &str = "No Game This Week";

/// Everything the scraper needs to log in and read the schedule
#[derive(Debug, Clone)]
pub struct ScraperSettings {
    pub url: String,
    pub user: String,
    pub pwd: String,
    pub num_teams: usize,
    pub timezone: Tz,
    pub upcoming_only: bool,
    pub log_scrape: bool,
}

/// Login form fields ready to be posted
#[derive(Debug, Clone, PartialEq)]
pub struct LoginForm {
    pub action: Url,
    pub fields: Vec<(String, String)>,
}

/// Scrapes the team schedules from the NY Urban volleyball site
pub struct LeagueScraper {
    client: reqwest::Client,
    settings: ScraperSettings,
}

impl LeagueScraper {
    pub fn new(settings: ScraperSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client, settings })
    }

    /// Log in, then scrape every team page and the gym table
    pub async fn fetch_schedule(&self) -> Result<(Vec<Game>, HashMap<String, Gym>)> {
        let (listing_url, listing) = self.login().await?;
        let links = team_links(&listing_url, &listing, self.settings.num_teams)?;

        if self.settings.log_scrape {
            println!("...retrieving schedule(s)");
        }

        let year = Utc::now().with_timezone(&self.settings.timezone).year();
        let mut games = Vec::new();
        let mut gyms = HashMap::new();

        for (i, link) in links.iter().enumerate() {
            let (page_url, html) = self.fetch_page(link.clone()).await?;
            expect_title(&html, "Team Detail")?;
            if !html.contains("Division:") {
                anyhow::bail!("Team page {} has no division info", page_url);
            }

            let (team_name, mut team_games) =
                parse_team_page(&html, &self.settings.timezone, year)?;
            if self.settings.log_scrape {
                println!("     ...getting info for '{}'", team_name);
            }
            debug!(team = %team_name, games = team_games.len(), "Parsed team page");
            games.append(&mut team_games);

            // Every team page carries the same location table
            if i == 0 {
                if self.settings.log_scrape {
                    println!("...retrieving gyms");
                }
                gyms = parse_gym_table(&page_url, &html)?;
            }
        }

        Ok((games, gyms))
    }

    /// Sign in and return the team listing page
    async fn login(&self) -> Result<(Url, String)> {
        if self.settings.log_scrape {
            println!("...logging in: {}", self.settings.url);
        }

        let start = Url::parse(&self.settings.url)
            .with_context(|| format!("Invalid league URL: {}", self.settings.url))?;
        let (home_url, home) = self.fetch_page(start).await?;
        let title = page_title(&home).unwrap_or_default();
        if !title.contains("Volleyball League") {
            anyhow::bail!("Unexpected league home page title: '{}'", title);
        }

        let form = find_login_form(&home_url, &home, &self.settings.user, &self.settings.pwd)?;
        let response = self
            .client
            .post(form.action.clone())
            .form(&form.fields)
            .send()
            .await
            .context("Failed to submit league login form")?;
        let listing_url = response.url().clone();
        let listing = response
            .text()
            .await
            .context("Failed to read league login response")?;

        if page_title(&listing).as_deref() == Some("Login Problems") {
            anyhow::bail!("Invalid league credentials");
        }
        expect_title(&listing, "Team Listing")?;

        Ok((listing_url, listing))
    }

    async fn fetch_page(&self, url: Url) -> Result<(Url, String)> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", url))?;

        if !response.status().is_success() {
            anyhow::bail!("League site returned {} for {}", response.status(), url);
        }

        let final_url = response.url().clone();
        let html = response.text().await?;
        Ok((final_url, html))
    }
}

#[async_trait]
impl ScheduleSource for LeagueScraper {
    async fn get_games(&self) -> Result<Vec<Game>> {
        let (games, gyms) = self.fetch_schedule().await?;
        let upcoming_from = self.settings.upcoming_only.then(Utc::now);
        Ok(enrich_schedule(games, &gyms, upcoming_from))
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css)
        .ok()
        .with_context(|| format!("Invalid selector: {}", css))
}

fn text_of(element: &ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Direct children of `element` with the given tag name
fn child_elements<'a>(element: ElementRef<'a>, name: &str) -> Vec<ElementRef<'a>> {
    element
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|child| child.value().name() == name)
        .collect()
}

/// Data rows of the first table body matched by `css`, header row skipped
fn table_rows<'a>(document: &'a Html, css: &str) -> Result<Vec<ElementRef<'a>>> {
    let tbody = document
        .select(&selector(css)?)
        .next()
        .with_context(|| format!("No table found for '{}'", css))?;
    Ok(child_elements(tbody, "tr").into_iter().skip(1).collect())
}

pub fn page_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let title = Selector::parse("title").ok()?;
    document.select(&title).next().map(|t| text_of(&t))
}

fn expect_title(html: &str, expected: &str) -> Result<()> {
    let title = page_title(html).unwrap_or_default();
    if !title.contains(expected) {
        anyhow::bail!("Expected page '{}', got '{}'", expected, title);
    }
    Ok(())
}

/// Find the form holding the username input and fill in the credentials.
///
/// Hidden inputs are carried along so tokens the site expects are posted back.
pub fn find_login_form(base: &Url, html: &str, user: &str, pwd: &str) -> Result<LoginForm> {
    let document = Html::parse_document(html);
    let username = selector("input#username")?;
    let password = selector("input#password")?;
    let hidden = selector("input[type=hidden]")?;

    let form = document
        .select(&selector("form")?)
        .find(|form| form.select(&username).next().is_some())
        .context("No login form on the league home page")?;

    let input_name = |sel: &Selector, fallback: &str| -> String {
        form.select(sel)
            .next()
            .and_then(|input| input.value().attr("name"))
            .unwrap_or(fallback)
            .to_string()
    };

    let mut fields: Vec<(String, String)> = form
        .select(&hidden)
        .filter_map(|input| {
            let name = input.value().attr("name")?;
            let value = input.value().attr("value").unwrap_or_default();
            Some((name.to_string(), value.to_string()))
        })
        .collect();
    fields.push((input_name(&username, "username"), user.to_string()));
    fields.push((input_name(&password, "password"), pwd.to_string()));

    let action = base
        .join(form.value().attr("action").unwrap_or_default())
        .context("Invalid login form action")?;

    Ok(LoginForm { action, fields })
}

/// Links to the first `num_teams` teams on the team listing page
pub fn team_links(base: &Url, html: &str, num_teams: usize) -> Result<Vec<Url>> {
    let document = Html::parse_document(html);
    let link = selector("td a")?;

    let links: Vec<Url> = table_rows(&document, "tbody")?
        .into_iter()
        .filter_map(|row| row.select(&link).next())
        .filter_map(|a| a.value().attr("href"))
        .take(num_teams)
        .map(|href| base.join(href))
        .collect::<Result<_, _>>()
        .context("Invalid team link")?;

    if links.len() < num_teams {
        anyhow::bail!(
            "Expected {} teams on the listing page, found {}",
            num_teams,
            links.len()
        );
    }

    Ok(links)
}

/// Combine the "Day mm/dd" and "h:mm" cells into an evening start time in `tz`
pub fn parse_game_start(
    day: &str,
    time: &str,
    year: i32,
    tz: &Tz,
) -> Result<DateTime<FixedOffset>> {
    let month_day = day
        .split_whitespace()
        .nth(1)
        .with_context(|| format!("Unexpected game date: '{}'", day))?;

    // Times are listed without AM/PM and every game is in the evening
    let naive = NaiveDateTime::parse_from_str(
        &format!("{} {} {} PM", month_day, year, time.trim()),
        "%m/%d %Y %I:%M %p",
    )
    .with_context(|| format!("Unexpected game time: '{} {}'", day, time))?;

    let local = tz
        .from_local_datetime(&naive)
        .earliest()
        .with_context(|| format!("{} does not exist in {}", naive, tz))?;

    Ok(local.fixed_offset())
}

/// Team name and games from a team detail page
pub fn parse_team_page(html: &str, tz: &Tz, year: i32) -> Result<(String, Vec<Game>)> {
    let document = Html::parse_document(html);

    let team_name = document
        .select(&selector("div.team h1 span")?)
        .next()
        .map(|span| text_of(&span))
        .context("No team name on team page")?;

    let gym_link = selector("div a")?;
    let mut games = Vec::new();

    for row in table_rows(&document, "div.team_div div table tbody")? {
        let cols = child_elements(row, "td");
        if cols.len() < 4 {
            continue;
        }

        let opponent_cell = cols[3].text().collect::<String>();
        if opponent_cell.contains(NO_GAME) {
            continue;
        }
        let opponent = opponent_cell
            .split(['\n', '\t'])
            .map(str::trim)
            .find(|s| !s.is_empty())
            .unwrap_or_default()
            .to_string();

        let gym_code = cols[1]
            .select(&gym_link)
            .next()
            .map(|a| text_of(&a))
            .unwrap_or_default();

        let start = parse_game_start(&text_of(&cols[0]), &text_of(&cols[2]), year, tz)?;

        games.push(Game::new(start, team_name.clone(), opponent, gym_code));
    }

    Ok((team_name, games))
}

/// Gym code -> name and address from the location table.
///
/// The address is the `address` query parameter of the map link. The first
/// row for a code wins.
pub fn parse_gym_table(base: &Url, html: &str) -> Result<HashMap<String, Gym>> {
    let document = Html::parse_document(html);
    let map_link = selector("a")?;
    let mut gyms = HashMap::new();

    for row in table_rows(&document, "div.locationcontent div table tbody")? {
        let cols = child_elements(row, "td");
        if cols.len() < 3 {
            continue;
        }

        let code = text_of(&cols[0]);
        if code.is_empty() || gyms.contains_key(&code) {
            continue;
        }

        let name = cols[1]
            .children()
            .next()
            .map(|node| match ElementRef::wrap(node) {
                Some(element) => text_of(&element),
                None => node
                    .value()
                    .as_text()
                    .map(|t| t.trim().to_string())
                    .unwrap_or_default(),
            })
            .unwrap_or_default();

        let address = cols[2]
            .select(&map_link)
            .next()
            .and_then(|a| a.value().attr("href"))
            .and_then(|href| base.join(href).ok())
            .and_then(|url| {
                url.query_pairs()
                    .find(|(key, _)| key == "address")
                    .map(|(_, value)| value.into_owned())
            });

        gyms.insert(code, Gym { name, address });
    }

    Ok(gyms)
}
