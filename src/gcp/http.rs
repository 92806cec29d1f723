//! HTTP utilities for GCP REST API calls
//!
//! Failures are returned as structured [`RemoteError`] values so the
//! reconciliation core can classify them without looking at message text.

use crate::reconcile::RemoteError;
use reqwest::{Client, Method};
use serde_json::Value;
use std::time::Duration;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let cut = (0..=MAX_LOG_BODY_LENGTH)
            .rev()
            .find(|i| body.is_char_boundary(*i))
            .unwrap_or(0);
        format!("{}... [truncated, {} bytes total]", &body[..cut], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// User agent sent with every request
pub fn user_agent() -> String {
    format!(
        "greseller/{} ({} {})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

/// Turn a Google API error body into a structured error.
///
/// Understands both the canonical `{"error": {"status": ...}}` shape and the
/// legacy `{"error": {"errors": [{"reason": ...}]}}` shape.
pub fn parse_api_error(status: u16, body: &str) -> RemoteError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let error = parsed.as_ref().and_then(|v| v.get("error"));

    let reason = error
        .and_then(|e| e.get("status"))
        .and_then(|s| s.as_str())
        .or_else(|| {
            error
                .and_then(|e| e.get("errors"))
                .and_then(|e| e.get(0))
                .and_then(|e| e.get("reason"))
                .and_then(|r| r.as_str())
        });

    let message = error
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {}", status));

    RemoteError::api(status, reason, message)
}

fn transport_error(error: reqwest::Error) -> RemoteError {
    RemoteError::Transport {
        timeout: error.is_timeout(),
        message: error.to_string(),
    }
}

/// HTTP client wrapper for GCP API calls
#[derive(Clone)]
pub struct GcpHttpClient {
    client: Client,
}

impl GcpHttpClient {
    /// Create a new HTTP client
    pub fn new() -> Result<Self, RemoteError> {
        let client = Client::builder()
            .user_agent(user_agent())
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(transport_error)?;

        Ok(Self { client })
    }

    /// Make a GET request to a GCP API
    pub async fn get(&self, url: &str, token: &str) -> Result<Value, RemoteError> {
        self.send(Method::GET, url, token, None).await
    }

    /// Make a POST request to a GCP API
    pub async fn post(&self, url: &str, token: &str, body: &Value) -> Result<Value, RemoteError> {
        self.send(Method::POST, url, token, Some(body)).await
    }

    /// Make a PATCH request to a GCP API
    pub async fn patch(&self, url: &str, token: &str, body: &Value) -> Result<Value, RemoteError> {
        self.send(Method::PATCH, url, token, Some(body)).await
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        token: &str,
        body: Option<&Value>,
    ) -> Result<Value, RemoteError> {
        tracing::debug!("{} {}", method, url);

        let mut request = self.client.request(method, url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(transport_error)?;

        let status = response.status();
        let response_body = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&response_body));
            return Err(parse_api_error(status.as_u16(), &response_body));
        }

        if response_body.is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&response_body)
            .map_err(|e| RemoteError::Decode(format!("Failed to parse response JSON: {}", e)))
    }
}

/// Format a remote error for display
/// Security: Generic messages avoid leaking API structure details
pub fn format_remote_error(error: &RemoteError) -> String {
    match error {
        RemoteError::Api { status, message, .. } => match status {
            400 => format!("Invalid request: {}", message),
            401 => "Authentication failed. Check the configured credentials.".to_string(),
            403 => "Permission denied. Check the billing IAM permissions of the caller.".to_string(),
            404 => "Billing account not found.".to_string(),
            409 => "Conflict. The billing account may already exist.".to_string(),
            429 => "Rate limit exceeded. Please try again later.".to_string(),
            500..=599 => "Cloud Billing API temporarily unavailable. Please try again.".to_string(),
            _ => format!("Request failed with status {}", status),
        },
        RemoteError::Transport { timeout: true, .. } => {
            "Request timed out. Check your network connection and try again.".to_string()
        }
        RemoteError::Transport { .. } => {
            "Request failed. Check your network connection and try again.".to_string()
        }
        RemoteError::Decode(_) => "Unexpected response from the Cloud Billing API.".to_string(),
        RemoteError::Auth(message) => format!("Authentication failed: {}", message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_canonical_error() {
        let body = r#"{"error": {"code": 404, "message": "Billing account not found", "status": "NOT_FOUND"}}"#;
        assert_eq!(
            parse_api_error(404, body),
            RemoteError::api(404, Some("NOT_FOUND"), "Billing account not found")
        );
    }

    #[test]
    fn test_parse_legacy_error() {
        let body = r#"{"error": {"code": 403, "message": "Rate Limit Exceeded", "errors": [{"reason": "rateLimitExceeded"}]}}"#;
        assert_eq!(
            parse_api_error(403, body),
            RemoteError::api(403, Some("rateLimitExceeded"), "Rate Limit Exceeded")
        );
    }

    #[test]
    fn test_parse_unstructured_error() {
        assert_eq!(
            parse_api_error(502, "<html>Bad Gateway</html>"),
            RemoteError::api(502, None, "HTTP 502")
        );
    }

    #[test]
    fn test_sanitize_truncates() {
        let long = "a".repeat(500);
        let sanitized = sanitize_for_log(&long);
        assert!(sanitized.contains("truncated, 500 bytes total"));
        assert!(sanitized.len() < 300);
    }

    #[test]
    fn test_user_agent_names_crate() {
        assert!(user_agent().starts_with("greseller/"));
    }

    #[test]
    fn test_format_remote_error_is_generic() {
        let err = RemoteError::api(403, Some("PERMISSION_DENIED"), "caller lacks billing.accounts.update");
        assert!(!format_remote_error(&err).contains("billing.accounts.update"));
    }
}
