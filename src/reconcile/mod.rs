//! Generic reconciliation core
//!
//! Converges a declared desired state with the state held by a remote API
//! through idempotent create/read/update calls.
//!
//! # Module Structure
//!
//! - [`error`] - Remote error classification and the caller-facing error taxonomy
//! - [`retry`] - Backoff-driven retry of transient failures
//! - [`fields`] - Field categories and the desired-vs-observed planner
//! - [`remote`] - The client interface the controller drives
//! - [`controller`] - Lifecycle state machine for one tracked resource
//!
//! # Example
//!
//! ```ignore
//! use greseller::reconcile::{Controller, RetryPolicy};
//!
//! async fn example(client: BillingClient, desired: Attributes) -> anyhow::Result<()> {
//!     let mut controller = Controller::new(client, billing_account::schema(), RetryPolicy::default());
//!     let outcome = controller.reconcile(&desired).await?;
//!     for warning in outcome.warnings {
//!         eprintln!("Warning: {}", warning);
//!     }
//!     Ok(())
//! }
//! ```

pub mod controller;
pub mod error;
pub mod fields;
pub mod remote;
pub mod retry;

pub use controller::{Binding, Controller, Outcome, TrackedResource};
pub use error::{classify, ErrorClass, ErrorKind, ReconcileError, RemoteError, Warning};
pub use fields::{Attributes, FieldCategory, FieldSpec, FieldType, Plan, PlanAction, ResourceSchema};
pub use remote::{RemoteResourceClient, RemoteSnapshot, ResourceIdentity};
pub use retry::{Retrier, RetryFailure, RetryPolicy, Sleeper, TokioSleeper};
