//! Resource lifecycle controller
//!
//! Drives one remote resource through `Unbound -> Bound -> Unbound`. All remote
//! calls go through the retry engine, and every mutation is planned by the
//! field reconciler first. The controller owns the tracked identity and
//! observed state but never persists them; callers read them back through
//! [`Controller::tracked`] and hand them in again with [`Controller::restore`].
//!
//! Operations take `&mut self`, so one instance can never be driven
//! concurrently. Dropping an operation's future abandons any in-flight request
//! and pending backoff.

use super::error::{classify, ErrorClass, ReconcileError, RemoteError, Warning};
use super::fields::{Attributes, Plan, PlanAction, ResourceSchema};
use super::remote::{RemoteResourceClient, RemoteSnapshot, ResourceIdentity};
use super::retry::{Retrier, RetryPolicy, Sleeper, TokioSleeper};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::Instrument;
use uuid::Uuid;

/// Everything the controller knows about a bound resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedResource {
    pub identity: ResourceIdentity,
    /// State as last read from the remote system
    pub observed: Attributes,
    /// Creation-time values of immutable fields
    #[serde(default)]
    pub pinned: Attributes,
    pub refreshed_at: DateTime<Utc>,
}

impl TrackedResource {
    /// Observed state with immutable fields held at their creation-time values
    pub fn baseline(&self) -> Attributes {
        let mut baseline = self.observed.clone();
        baseline.extend(self.pinned.iter().map(|(k, v)| (k.clone(), v.clone())));
        baseline
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Unbound,
    Bound,
}

/// Result of a successful controller operation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outcome {
    pub warnings: Vec<Warning>,
    /// Tracking was dropped during the operation
    pub removed: bool,
    /// Number of mutating remote calls issued (create or patch)
    pub mutations: u32,
}

impl Outcome {
    fn removed() -> Self {
        Self {
            removed: true,
            ..Self::default()
        }
    }

    /// Fold in a later step; a warning already reported in this operation is not repeated
    fn merge(&mut self, other: Outcome) {
        for warning in other.warnings {
            if !self.warnings.contains(&warning) {
                self.warnings.push(warning);
            }
        }
        self.removed |= other.removed;
        self.mutations += other.mutations;
    }
}

/// Lifecycle controller for a single remote resource
pub struct Controller<C, S = TokioSleeper> {
    client: C,
    schema: ResourceSchema,
    retrier: Retrier<S>,
    operation_timeout: Option<Duration>,
    tracked: Option<TrackedResource>,
}

impl<C: RemoteResourceClient> Controller<C> {
    pub fn new(client: C, schema: ResourceSchema, policy: RetryPolicy) -> Self {
        Self::with_retrier(client, schema, Retrier::new(policy))
    }
}

impl<C: RemoteResourceClient, S: Sleeper> Controller<C, S> {
    pub fn with_retrier(client: C, schema: ResourceSchema, retrier: Retrier<S>) -> Self {
        Self {
            client,
            schema,
            retrier,
            operation_timeout: None,
            tracked: None,
        }
    }

    /// Abandon any operation that runs longer than `timeout`
    pub fn with_operation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn schema(&self) -> &ResourceSchema {
        &self.schema
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn binding(&self) -> Binding {
        if self.tracked.is_some() {
            Binding::Bound
        } else {
            Binding::Unbound
        }
    }

    pub fn tracked(&self) -> Option<&TrackedResource> {
        self.tracked.as_ref()
    }

    pub fn identity(&self) -> Option<&ResourceIdentity> {
        self.tracked.as_ref().map(|t| &t.identity)
    }

    pub fn observed(&self) -> Option<&Attributes> {
        self.tracked.as_ref().map(|t| &t.observed)
    }

    /// Rebind from externally persisted state
    pub fn restore(&mut self, tracked: Option<TrackedResource>) {
        self.tracked = tracked;
    }

    /// Preview what the next create or update would do, without any remote call
    pub fn plan(&self, desired: &Attributes) -> Result<Plan, ReconcileError> {
        let baseline = self.tracked.as_ref().map(TrackedResource::baseline);
        self.schema.plan(desired, baseline.as_ref())
    }

    pub async fn create(&mut self, desired: &Attributes) -> Result<Outcome, ReconcileError> {
        let (timeout, span) = self.prepare("create");
        bounded("create", timeout, self.create_inner(desired))
            .instrument(span)
            .await
    }

    /// Refresh observed state. A resource missing remotely is dropped from tracking.
    pub async fn read(&mut self) -> Result<Outcome, ReconcileError> {
        let (timeout, span) = self.prepare("read");
        bounded("read", timeout, self.read_inner()).instrument(span).await
    }

    pub async fn update(&mut self, desired: &Attributes) -> Result<Outcome, ReconcileError> {
        let (timeout, span) = self.prepare("update");
        bounded("update", timeout, self.update_inner(desired))
            .instrument(span)
            .await
    }

    /// Drop tracking. The remote resource type has no delete call, so nothing
    /// is sent and the resource keeps existing remotely.
    pub fn delete(&mut self) -> Result<Outcome, ReconcileError> {
        let tracked = self.tracked.take().ok_or(ReconcileError::NotBound)?;

        let warning = Warning::RemoteResourceRetained {
            identity: tracked.identity.to_string(),
        };
        tracing::warn!(resource = self.schema.type_name, "{}", warning);

        Ok(Outcome {
            warnings: vec![warning],
            removed: true,
            mutations: 0,
        })
    }

    /// Bind to an existing remote resource by identity
    pub async fn import(&mut self, id: ResourceIdentity) -> Result<Outcome, ReconcileError> {
        let (timeout, span) = self.prepare("import");
        bounded("import", timeout, self.import_inner(id))
            .instrument(span)
            .await
    }

    /// One full cycle: create when unbound or gone, otherwise update
    pub async fn reconcile(&mut self, desired: &Attributes) -> Result<Outcome, ReconcileError> {
        let (timeout, span) = self.prepare("reconcile");
        bounded("reconcile", timeout, self.reconcile_inner(desired))
            .instrument(span)
            .await
    }

    fn prepare(&self, operation: &'static str) -> (Option<Duration>, tracing::Span) {
        let span = tracing::info_span!(
            "operation",
            name = operation,
            op_id = %Uuid::new_v4(),
            resource = self.schema.type_name,
            identity = self.identity().map(|i| i.as_str()).unwrap_or("-"),
        );
        (self.operation_timeout, span)
    }

    async fn call<T, F, Fut>(&self, operation: &'static str, call: F) -> Result<T, ReconcileError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        self.retrier
            .run(operation, classify, call)
            .await
            .map_err(|failure| ReconcileError::Remote {
                operation,
                class: failure.class,
                attempts: failure.attempts,
                source: failure.error,
            })
    }

    async fn create_inner(&mut self, desired: &Attributes) -> Result<Outcome, ReconcileError> {
        if let Some(tracked) = &self.tracked {
            return Err(ReconcileError::AlreadyBound(tracked.identity.to_string()));
        }

        let fields = self.schema.create_fields(desired)?;
        let snapshot = self.call("create", || self.client.create(&fields)).await?;

        tracing::info!("Created {} {}", self.schema.type_name, snapshot.identity);

        let id = snapshot.identity.clone();
        let pinned = self.schema.immutable_values(&fields);
        let mut outcome = Outcome {
            warnings: self.bind(snapshot, pinned),
            removed: false,
            mutations: 1,
        };

        // Observed state comes from a read, not from the create response
        let fetched = self.call("get", || self.client.get(&id)).await;
        match fetched {
            Ok(snapshot) => {
                let warnings = self.absorb(snapshot);
                outcome.merge(Outcome {
                    warnings,
                    ..Outcome::default()
                });
            }
            Err(ReconcileError::Remote {
                class: ErrorClass::NotFound,
                ..
            }) => tracing::debug!("{} not readable yet, keeping the create response", id),
            Err(e) => return Err(e),
        }

        Ok(outcome)
    }

    async fn read_inner(&mut self) -> Result<Outcome, ReconcileError> {
        let id = self
            .tracked
            .as_ref()
            .map(|t| t.identity.clone())
            .ok_or(ReconcileError::NotBound)?;

        let fetched = self.call("get", || self.client.get(&id)).await;
        match fetched {
            Ok(snapshot) => {
                let warnings = self.absorb(snapshot);
                Ok(Outcome {
                    warnings,
                    ..Outcome::default()
                })
            }
            Err(ReconcileError::Remote {
                class: ErrorClass::NotFound,
                ..
            }) => {
                tracing::warn!(
                    "{} {} no longer exists remotely, removing it from tracking",
                    self.schema.type_name,
                    id
                );
                self.tracked = None;
                Ok(Outcome::removed())
            }
            Err(e) => Err(e),
        }
    }

    async fn update_inner(&mut self, desired: &Attributes) -> Result<Outcome, ReconcileError> {
        let mut outcome = self.patch_inner(desired).await?;
        outcome.merge(self.read_inner().await?);
        Ok(outcome)
    }

    /// Plan against the tracked baseline and send the patch, if any. No read.
    async fn patch_inner(&mut self, desired: &Attributes) -> Result<Outcome, ReconcileError> {
        let tracked = self.tracked.as_ref().ok_or(ReconcileError::NotBound)?;
        let id = tracked.identity.clone();
        let baseline = tracked.baseline();

        let plan = self.schema.plan(desired, Some(&baseline))?.into_result()?;
        let mut outcome = Outcome {
            warnings: plan.warnings,
            ..Outcome::default()
        };

        match plan.action {
            PlanAction::Patch { fields, mask } => {
                tracing::debug!("Updating {} fields {:?}", id, mask);
                self.call("patch", || self.client.patch(&id, &fields, &mask))
                    .await?;
                tracing::info!("Updated {} {}", self.schema.type_name, id);
                outcome.mutations += 1;
            }
            _ => tracing::debug!("{} is up to date", id),
        }

        Ok(outcome)
    }

    async fn import_inner(&mut self, id: ResourceIdentity) -> Result<Outcome, ReconcileError> {
        if let Some(tracked) = &self.tracked {
            return Err(ReconcileError::AlreadyBound(tracked.identity.to_string()));
        }

        let fetched = self.call("get", || self.client.get(&id)).await;
        let snapshot = match fetched {
            Ok(snapshot) => snapshot,
            Err(ReconcileError::Remote {
                class: ErrorClass::NotFound,
                ..
            }) => return Err(ReconcileError::ImportTargetMissing(id.to_string())),
            Err(e) => return Err(e),
        };

        tracing::info!("Imported {} {}", self.schema.type_name, snapshot.identity);

        let pinned = self.schema.immutable_values(&snapshot.state);
        let warnings = self.bind(snapshot, pinned);
        Ok(Outcome {
            warnings,
            ..Outcome::default()
        })
    }

    async fn reconcile_inner(&mut self, desired: &Attributes) -> Result<Outcome, ReconcileError> {
        let mut outcome = Outcome::default();

        if self.tracked.is_some() {
            let refreshed = self.read_inner().await?;
            let gone = refreshed.removed;
            outcome.merge(refreshed);
            if !gone {
                // The read above already refreshed state; only a patch needs another
                let patched = self.patch_inner(desired).await?;
                let mutated = patched.mutations > 0;
                outcome.merge(patched);
                if mutated {
                    outcome.merge(self.read_inner().await?);
                }
                return Ok(outcome);
            }
        }

        let created = self.create_inner(desired).await?;
        outcome.removed = false;
        outcome.merge(created);
        Ok(outcome)
    }

    fn bind(&mut self, snapshot: RemoteSnapshot, pinned: Attributes) -> Vec<Warning> {
        let warnings = drift(&pinned, &snapshot.state);
        self.tracked = Some(TrackedResource {
            identity: snapshot.identity,
            observed: snapshot.state,
            pinned,
            refreshed_at: Utc::now(),
        });
        warnings
    }

    fn absorb(&mut self, snapshot: RemoteSnapshot) -> Vec<Warning> {
        let Some(tracked) = self.tracked.as_mut() else {
            return Vec::new();
        };

        let mut warnings = Vec::new();
        if snapshot.identity != tracked.identity {
            let warning = Warning::IdentityChanged {
                tracked: tracked.identity.to_string(),
                observed: snapshot.identity.to_string(),
            };
            tracing::warn!("{}", warning);
            warnings.push(warning);
        }
        warnings.extend(drift(&tracked.pinned, &snapshot.state));

        tracked.observed = snapshot.state;
        tracked.refreshed_at = Utc::now();
        warnings
    }
}

/// Immutable fields whose remote value moved away from the creation-time value
fn drift(pinned: &Attributes, observed: &Attributes) -> Vec<Warning> {
    pinned
        .iter()
        .filter_map(|(field, value)| {
            let seen = observed.get(field)?;
            (seen != value).then(|| Warning::ImmutableDrift {
                field: field.clone(),
                pinned: value.clone(),
                observed: seen.clone(),
            })
        })
        .inspect(|warning| tracing::warn!("{}", warning))
        .collect()
}

async fn bounded<T, F>(
    operation: &'static str,
    timeout: Option<Duration>,
    fut: F,
) -> Result<T, ReconcileError>
where
    F: Future<Output = Result<T, ReconcileError>>,
{
    let Some(limit) = timeout else {
        return fut.await;
    };

    let started = Instant::now();
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::error!("{} abandoned after {:?}", operation, limit);
            Err(ReconcileError::Cancelled {
                operation,
                elapsed_ms: started.elapsed().as_millis(),
            })
        }
    }
}
