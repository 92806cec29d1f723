//! GCP API interaction module
//!
//! This module provides the concrete remote side of reconciliation: credentials,
//! an HTTP client that reports structured errors, and the Cloud Billing adapter.
//!
//! # Module Structure
//!
//! - [`auth`] - Service account, access token and Application Default Credentials
//! - [`client`] - Main GCP client for making authenticated API requests
//! - [`http`] - HTTP utilities for REST API calls
//! - [`billing`] - Cloud Billing API adapter implementing the remote client interface
//!
//! # Example
//!
//! ```ignore
//! use greseller::gcp::{auth::GcpCredentials, billing::{BillingClient, BILLING_API_BASE}, client::GcpClient};
//!
//! async fn example() -> anyhow::Result<()> {
//!     let credentials = GcpCredentials::application_default();
//!     let client = GcpClient::new(credentials, BILLING_API_BASE.parse()?)?;
//!     let billing = BillingClient::new(client);
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod billing;
pub mod client;
pub mod http;
