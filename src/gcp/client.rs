//! GCP Client
//!
//! Main client for interacting with GCP APIs, combining authentication
//! and HTTP functionality.

use super::auth::GcpCredentials;
use super::http::GcpHttpClient;
use crate::reconcile::RemoteError;
use serde_json::Value;
use url::Url;

/// Main GCP client
#[derive(Clone)]
pub struct GcpClient {
    pub credentials: GcpCredentials,
    pub http: GcpHttpClient,
    pub base_url: Url,
}

impl GcpClient {
    /// Create a new GCP client rooted at `base_url`
    pub fn new(credentials: GcpCredentials, base_url: Url) -> Result<Self, RemoteError> {
        let http = GcpHttpClient::new()?;

        Ok(Self {
            credentials,
            http,
            base_url,
        })
    }

    /// Get the current access token
    pub async fn get_token(&self) -> Result<String, RemoteError> {
        self.credentials
            .get_token()
            .await
            .map_err(|e| RemoteError::Auth(format!("{:#}", e)))
    }

    async fn refreshed_token(&self) -> Result<String, RemoteError> {
        self.credentials
            .refresh_token()
            .await
            .map_err(|e| RemoteError::Auth(format!("{:#}", e)))
    }

    /// Build an absolute API URL from a path relative to the base URL
    pub fn url(&self, path: &str) -> Result<Url, RemoteError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| RemoteError::Decode(format!("Invalid request path {:?}: {}", path, e)))
    }

    /// Make a GET request to a GCP API
    pub async fn get(&self, url: &Url) -> Result<Value, RemoteError> {
        let token = self.get_token().await?;
        match self.http.get(url.as_str(), &token).await {
            Err(e) if is_unauthenticated(&e) => {
                let token = self.refreshed_token().await?;
                self.http.get(url.as_str(), &token).await
            }
            result => result,
        }
    }

    /// Make a POST request to a GCP API
    pub async fn post(&self, url: &Url, body: &Value) -> Result<Value, RemoteError> {
        let token = self.get_token().await?;
        match self.http.post(url.as_str(), &token, body).await {
            Err(e) if is_unauthenticated(&e) => {
                let token = self.refreshed_token().await?;
                self.http.post(url.as_str(), &token, body).await
            }
            result => result,
        }
    }

    /// Make a PATCH request to a GCP API
    pub async fn patch(&self, url: &Url, body: &Value) -> Result<Value, RemoteError> {
        let token = self.get_token().await?;
        match self.http.patch(url.as_str(), &token, body).await {
            Err(e) if is_unauthenticated(&e) => {
                let token = self.refreshed_token().await?;
                self.http.patch(url.as_str(), &token, body).await
            }
            result => result,
        }
    }
}

/// Stale cached tokens surface as 401; those get one retry with a fresh token
fn is_unauthenticated(error: &RemoteError) -> bool {
    matches!(error, RemoteError::Api { status: 401, .. })
}
