//! Configuration Management
//!
//! Provider settings and the declared desired state, loaded from a YAML
//! manifest:
//!
//! ```yaml
//! provider:
//!   credentials: ~/keys/reseller.json
//!   retry:
//!     max_attempts: 5
//! billing_account:
//!   display_name: Acme
//!   master_billing_account: billingAccounts/000000-111111-222222
//! ```

use crate::gcp::auth::{ACCESS_TOKEN_ENV_VAR, CREDENTIALS_ENV_VARS};
use crate::gcp::billing::BILLING_API_BASE;
use crate::reconcile::{Attributes, ResourceSchema, RetryPolicy};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Retry settings as written in the manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            initial_backoff_ms: policy.initial_backoff.as_millis() as u64,
            max_backoff_ms: policy.max_backoff.as_millis() as u64,
            multiplier: policy.multiplier,
        }
    }
}

impl RetrySettings {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms.max(self.initial_backoff_ms)),
            multiplier: self.multiplier,
        }
    }
}

/// Provider configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Service account key, as a path or as JSON contents
    #[serde(default)]
    pub credentials: Option<String>,
    /// Static OAuth access token
    #[serde(default)]
    pub access_token: Option<String>,
    /// Override of the Cloud Billing API base URL
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub retry: RetrySettings,
    /// Abandon any single operation after this many seconds
    #[serde(default)]
    pub operation_timeout_secs: Option<u64>,
}

impl ProviderConfig {
    /// Get effective credentials payload (config > environment)
    pub fn effective_credentials(&self) -> Option<String> {
        self.effective_credentials_with(|key| std::env::var(key).ok())
    }

    pub fn effective_credentials_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
        self.credentials
            .clone()
            .filter(|c| !c.is_empty())
            .or_else(|| {
                CREDENTIALS_ENV_VARS
                    .iter()
                    .find_map(|key| lookup(key).filter(|v| !v.is_empty()))
            })
    }

    /// Get effective access token (config > environment)
    pub fn effective_access_token(&self) -> Option<String> {
        self.access_token
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| std::env::var(ACCESS_TOKEN_ENV_VAR).ok().filter(|t| !t.is_empty()))
    }

    /// Base URL of the billing API, always ending in a slash
    pub fn endpoint_url(&self) -> Result<Url> {
        let raw = self.endpoint.as_deref().unwrap_or(BILLING_API_BASE);
        let normalized = if raw.ends_with('/') {
            raw.to_string()
        } else {
            format!("{}/", raw)
        };
        Url::parse(&normalized).with_context(|| format!("Invalid endpoint URL {:?}", raw))
    }

    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

/// Manifest file: provider settings plus the declared billing account
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub billing_account: Attributes,
}

impl Manifest {
    /// Load a manifest from disk
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("Invalid manifest {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse manifest YAML")
    }

    /// Desired state, checked against the resource schema
    pub fn desired(&self, schema: &ResourceSchema) -> Result<Attributes> {
        schema
            .validate(&self.billing_account)
            .with_context(|| format!("Invalid {} configuration", schema.type_name))?;
        Ok(self.billing_account.clone())
    }
}
