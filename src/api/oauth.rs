//! Google OAuth access tokens for the calendar client.
//!
//! Tokens live in a JSON file using Google's "authorized user" layout:
//! `token`, `refresh_token`, `token_uri`, `client_id`, `client_secret`,
//! `scopes` and `expiry`.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use google_calendar::Client;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tracing::{debug, info};

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Tokens expiring within this window are refreshed ahead of time
const EXPIRY_MARGIN_SECS: i64 = 60;

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// Stored credentials for the signed-in user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizedUser {
    pub token: Option<String>,
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub expiry: Option<DateTime<Utc>>,
}

impl AuthorizedUser {
    /// A token is usable when present and not about to expire
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.token.is_some()
            && self
                .expiry
                .map_or(true, |expiry| expiry > now + Duration::seconds(EXPIRY_MARGIN_SECS))
    }

    fn apply(&mut self, grant: TokenGrant, now: DateTime<Utc>) {
        self.token = Some(grant.access_token);
        self.expiry = if grant.expires_in > 0 {
            Some(now + Duration::seconds(grant.expires_in))
        } else {
            None
        };
        // Google only sends a refresh token on the first exchange
        if !grant.refresh_token.is_empty() {
            self.refresh_token = Some(grant.refresh_token);
        }
    }
}

/// OAuth client registration downloaded from the Google console
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecret {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecret>,
    web: Option<ClientSecret>,
}

/// The parts of a token response we keep
#[derive(Debug)]
struct TokenGrant {
    access_token: String,
    expires_in: i64,
    refresh_token: String,
}

impl From<google_calendar::AccessToken> for TokenGrant {
    fn from(token: google_calendar::AccessToken) -> Self {
        Self {
            access_token: token.access_token,
            expires_in: token.expires_in,
            refresh_token: token.refresh_token,
        }
    }
}

/// Reads, refreshes and creates the stored calendar token
pub struct TokenStore {
    token_path: PathBuf,
    creds_path: PathBuf,
    scopes: Vec<String>,
}

impl TokenStore {
    pub fn new(token_path: PathBuf, creds_path: PathBuf, scopes: Vec<String>) -> Self {
        Self {
            token_path,
            creds_path,
            scopes,
        }
    }

    /// A valid access token, refreshing or running the consent flow as needed
    pub async fn access_token(&self) -> Result<String> {
        let user = if self.token_path.exists() {
            let mut user = load_authorized_user(&self.token_path)?;
            if !user.is_valid(Utc::now()) {
                if user.refresh_token.is_some() {
                    refresh(&mut user).await?;
                } else {
                    user = self.authorize().await?;
                }
                save_authorized_user(&self.token_path, &user)?;
            }
            user
        } else {
            let user = self.authorize().await?;
            save_authorized_user(&self.token_path, &user)?;
            user
        };

        user.token.context("Stored credentials have no access token")
    }

    /// Run the installed-app consent flow and return fresh credentials
    pub async fn authorize(&self) -> Result<AuthorizedUser> {
        let secret = load_client_secret(&self.creds_path)?;

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("Failed to bind OAuth callback listener")?;
        let redirect_uri = format!("http://127.0.0.1:{}/", listener.local_addr()?.port());

        let mut client = Client::new(
            secret.client_id.clone(),
            secret.client_secret.clone(),
            redirect_uri,
            String::new(),
            String::new(),
        );
        let auth_url = client.user_consent_url(&self.scopes);

        println!("\nOpen this URL in your browser to authenticate:\n");
        println!("{}\n", auth_url);
        if open::that(&auth_url).is_err() {
            println!("(Could not open browser automatically, please copy the URL above)");
        }

        let (code, state) = wait_for_callback(&listener).await?;
        debug!("Received authorization code, exchanging for tokens");

        let grant: TokenGrant = client
            .get_access_token(&code, &state)
            .await
            .context("Failed to exchange authorization code")?
            .into();

        let mut user = AuthorizedUser {
            token: None,
            refresh_token: None,
            token_uri: secret.token_uri,
            client_id: secret.client_id,
            client_secret: secret.client_secret,
            scopes: self.scopes.clone(),
            expiry: None,
        };
        user.apply(grant, Utc::now());
        println!("Authentication successful!");

        Ok(user)
    }
}

async fn refresh(user: &mut AuthorizedUser) -> Result<()> {
    info!("Refreshing Google access token");

    let client = Client::new(
        user.client_id.clone(),
        user.client_secret.clone(),
        String::new(),
        user.token.clone().unwrap_or_default(),
        user.refresh_token.clone().unwrap_or_default(),
    );
    let grant: TokenGrant = client
        .refresh_access_token()
        .await
        .context("Failed to refresh token")?
        .into();
    user.apply(grant, Utc::now());

    Ok(())
}

pub fn load_authorized_user(path: &Path) -> Result<AuthorizedUser> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read token file {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse token file {}", path.display()))
}

pub fn save_authorized_user(path: &Path, user: &AuthorizedUser) -> Result<()> {
    let contents = serde_json::to_string_pretty(user).context("Failed to serialize token")?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    std::fs::write(path, contents)
        .with_context(|| format!("Failed to write token to {}", path.display()))?;

    // Owner-only since the file holds OAuth tokens
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

pub fn load_client_secret(path: &Path) -> Result<ClientSecret> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read client secrets {}", path.display()))?;
    let file: ClientSecretsFile = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse client secrets {}", path.display()))?;

    file.installed
        .or(file.web)
        .with_context(|| format!("No 'installed' or 'web' client in {}", path.display()))
}

/// Pull the authorization code and state out of the redirect's request line
pub fn parse_callback(request_line: &str) -> Result<(String, String)> {
    let path = request_line
        .split_whitespace()
        .nth(1)
        .context("Invalid HTTP request")?;
    let url = Url::parse(&format!("http://localhost{}", path))?;

    if let Some((_, error)) = url.query_pairs().find(|(k, _)| k == "error") {
        anyhow::bail!("Authorization was denied: {}", error);
    }

    let param = |name: &str| {
        url.query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    };
    let code = param("code").context("No code in callback")?;
    let state = param("state").context("No state in callback")?;

    Ok((code, state))
}

async fn wait_for_callback(listener: &TcpListener) -> Result<(String, String)> {
    let (stream, _) = listener
        .accept()
        .await
        .context("Failed to accept OAuth callback")?;

    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    reader
        .read_line(&mut request_line)
        .await
        .context("Failed to read OAuth callback request line")?;

    let callback = parse_callback(&request_line);

    let body = if callback.is_ok() {
        "<h1>Authentication successful!</h1><p>You can close this window.</p>"
    } else {
        "<h1>Authentication failed</h1><p>Check the terminal for details.</p>"
    };
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n<html><body>{}</body></html>",
        body
    );

    let mut stream = reader.into_inner();
    stream
        .write_all(response.as_bytes())
        .await
        .context("Failed to write OAuth callback response")?;
    stream.flush().await?;

    callback
}
