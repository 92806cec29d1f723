//! GCP Authentication
//!
//! Handles authentication using an explicit service account key (path or
//! inline JSON), a static OAuth access token, or Application Default
//! Credentials.

use anyhow::{Context, Result};
use gcp_auth::{CustomServiceAccount, TokenProvider};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OnceCell, RwLock};

/// Default scopes for GCP API access
pub const DEFAULT_SCOPES: &[&str] = &["https://www.googleapis.com/auth/cloud-platform"];

/// Environment variables consulted for a credentials payload, in order
pub const CREDENTIALS_ENV_VARS: &[&str] = &[
    "GOOGLE_CREDENTIALS",
    "GOOGLE_CLOUD_KEYFILE_JSON",
    "GCLOUD_KEYFILE_JSON",
];

/// Environment variable consulted for a static access token
pub const ACCESS_TOKEN_ENV_VAR: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

/// Token expiry buffer - refresh tokens this much before they actually expire
/// This prevents using tokens that are about to expire during a request
const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Default token TTL if we can't determine expiry (conservative: 30 minutes)
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

#[derive(Clone)]
enum TokenSource {
    Provider(Arc<dyn TokenProvider>),
    /// Application Default Credentials, discovered on first use
    Default(Arc<OnceCell<Arc<dyn TokenProvider>>>),
    Static(String),
}

/// GCP credentials holder with token caching
#[derive(Clone)]
pub struct GcpCredentials {
    source: TokenSource,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    /// When this token expires (with buffer applied)
    expires_at: Instant,
}

impl CachedToken {
    /// Check if this cached token is still valid
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

impl GcpCredentials {
    fn from_source(source: TokenSource) -> Self {
        Self {
            source,
            token_cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Use Application Default Credentials. Discovery is deferred to the first
    /// token request, so offline operations never need working credentials.
    pub fn application_default() -> Self {
        tracing::info!("Authenticating using Application Default Credentials");
        Self::from_source(TokenSource::Default(Arc::new(OnceCell::new())))
    }

    /// Create credentials from a service account key, given as a path or as JSON contents
    pub fn from_service_account(payload: &str) -> Result<Self> {
        tracing::info!("Authenticating using provided credentials");
        let account = parse_service_account(payload)
            .context("Authentication error, invalid credentials file")?;

        Ok(Self::from_source(TokenSource::Provider(Arc::new(account))))
    }

    /// Use a fixed OAuth access token; it is never refreshed
    pub fn from_access_token(token: impl Into<String>) -> Self {
        tracing::info!("Authenticating using a static access token");
        Self::from_source(TokenSource::Static(token.into()))
    }

    /// Pick a credential source: access token, then credentials payload, then ADC
    pub fn resolve(credentials: Option<&str>, access_token: Option<&str>) -> Result<Self> {
        if let Some(token) = access_token.filter(|t| !t.is_empty()) {
            return Ok(Self::from_access_token(token));
        }
        match credentials.filter(|c| !c.is_empty()) {
            Some(payload) => Self::from_service_account(payload),
            None => Ok(Self::application_default()),
        }
    }

    /// Get an access token for API calls
    /// Security: Checks token expiry before returning cached token
    pub async fn get_token(&self) -> Result<String> {
        let provider = match &self.source {
            TokenSource::Static(token) => return Ok(token.clone()),
            TokenSource::Provider(provider) => provider.clone(),
            TokenSource::Default(cell) => cell
                .get_or_try_init(|| async { gcp_auth::provider().await })
                .await
                .context(
                    "Authentication error, failed to use default credentials. Run 'gcloud auth application-default login'",
                )?
                .clone(),
        };

        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(cached.token.clone());
                }
                tracing::debug!("Cached token expired, fetching new token");
            }
        }

        let token = provider
            .token(DEFAULT_SCOPES)
            .await
            .context("Failed to get access token")?;

        let token_str = token.as_str().to_string();
        let expires_at = Instant::now() + DEFAULT_TOKEN_TTL - TOKEN_EXPIRY_BUFFER;

        {
            let mut cache = self.token_cache.write().await;
            *cache = Some(CachedToken {
                token: token_str.clone(),
                expires_at,
            });
        }

        tracing::debug!(
            "New token cached, expires in ~{} minutes",
            (DEFAULT_TOKEN_TTL - TOKEN_EXPIRY_BUFFER).as_secs() / 60
        );

        Ok(token_str)
    }

    /// Force refresh the token
    pub async fn refresh_token(&self) -> Result<String> {
        {
            let mut cache = self.token_cache.write().await;
            *cache = None;
        }

        self.get_token().await
    }
}

/// Check a credentials payload without fetching a token or touching any resource
pub fn validate_credentials(payload: &str) -> Result<()> {
    if payload.is_empty() {
        return Ok(());
    }
    parse_service_account(payload)
        .map(|_| ())
        .context("Invalid credentials")
}

fn parse_service_account(payload: &str) -> Result<CustomServiceAccount> {
    let contents = read_path_or_contents(payload)?;
    CustomServiceAccount::from_json(&contents).context("Failed to parse service account key")
}

/// Treat `value` as inline JSON when it starts with `{`, otherwise as a file path
pub fn read_path_or_contents(value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.starts_with('{') {
        return Ok(value.to_string());
    }

    let path = expand_home(trimmed);
    if !path.is_file() {
        anyhow::bail!("Credentials file {} not found", path.display());
    }
    std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read credentials file {}", path.display()))
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
