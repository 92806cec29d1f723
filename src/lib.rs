//! Declarative reconciliation of Google Cloud reseller billing accounts.
//!
//! - [`reconcile`] - Generic core: error classification, retry, field planning, lifecycle
//! - [`gcp`] - Credentials, HTTP and the Cloud Billing API adapter
//! - [`resource`] - Field layouts of the managed resource types
//! - [`config`] - Manifest and provider settings
//! - [`state`] - Persistence of the tracked resource between runs

pub mod config;
pub mod gcp;
pub mod reconcile;
pub mod resource;
pub mod state;

/// Version injected at compile time via GRESELLER_VERSION env var (set by CI/CD),
/// or the crate version for local builds.
pub const VERSION: &str = match option_env!("GRESELLER_VERSION") {
    Some(v) => v,
    None => env!("CARGO_PKG_VERSION"),
};
