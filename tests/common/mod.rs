//! Scripted in-memory remote client shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use greseller::reconcile::{
    Attributes, Controller, FieldCategory, FieldSpec, FieldType, RemoteError,
    RemoteResourceClient, RemoteSnapshot, ResourceIdentity, ResourceSchema, Retrier,
    RetryPolicy, Sleeper,
};
use serde_json::{json, Value};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Fake clock: records each requested delay and returns at once
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    delays: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}

/// A call received by the fake
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Get(String),
    Create(Attributes),
    Patch {
        id: String,
        fields: Attributes,
        mask: Vec<String>,
    },
}

#[derive(Default)]
struct FakeState {
    accounts: BTreeMap<String, Attributes>,
    calls: Vec<Call>,
    failures: VecDeque<RemoteError>,
    always_fail: Option<RemoteError>,
    server_defaults: Attributes,
    next_id: u32,
}

/// In-memory stand-in for the billing API
#[derive(Clone, Default)]
pub struct FakeRemote {
    state: Arc<Mutex<FakeState>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        let remote = Self::default();
        remote.state.lock().unwrap().next_id = 100;
        remote
    }

    /// Fail the next call with `error`, before touching any account
    pub fn fail_next(&self, error: RemoteError) {
        self.state.lock().unwrap().failures.push_back(error);
    }

    /// Fail every call with `error`
    pub fn fail_always(&self, error: RemoteError) {
        self.state.lock().unwrap().always_fail = Some(error);
    }

    /// Field the remote fills in on create; only visible to later reads
    pub fn server_default(&self, field: &str, value: Value) {
        self.state
            .lock()
            .unwrap()
            .server_defaults
            .insert(field.to_string(), value);
    }

    pub fn insert(&self, id: &str, state: Value) {
        let attrs = serde_json::from_value(state).unwrap();
        self.state.lock().unwrap().accounts.insert(id.to_string(), attrs);
    }

    /// Simulate the account disappearing remotely
    pub fn remove(&self, id: &str) {
        self.state.lock().unwrap().accounts.remove(id);
    }

    pub fn set_field(&self, id: &str, field: &str, value: Value) {
        let mut state = self.state.lock().unwrap();
        state
            .accounts
            .get_mut(id)
            .unwrap()
            .insert(field.to_string(), value);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }

    pub fn get_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Get(_)))
            .count()
    }

    pub fn patch_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Patch { .. }))
            .count()
    }

    pub fn mutation_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| !matches!(c, Call::Get(_)))
            .count()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    fn record(&self, call: Call) -> Result<(), RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        if let Some(error) = state.always_fail.clone() {
            return Err(error);
        }
        match state.failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn snapshot(id: &str, state: &Attributes) -> RemoteSnapshot {
        RemoteSnapshot {
            identity: ResourceIdentity::new(id),
            state: state.clone(),
        }
    }
}

fn not_found(id: &str) -> RemoteError {
    RemoteError::api(404, Some("NOT_FOUND"), format!("{} not found", id))
}

#[async_trait]
impl RemoteResourceClient for FakeRemote {
    async fn get(&self, id: &ResourceIdentity) -> Result<RemoteSnapshot, RemoteError> {
        self.record(Call::Get(id.to_string()))?;
        let state = self.state.lock().unwrap();
        state
            .accounts
            .get(id.as_str())
            .map(|attrs| Self::snapshot(id.as_str(), attrs))
            .ok_or_else(|| not_found(id.as_str()))
    }

    async fn create(&self, fields: &Attributes) -> Result<RemoteSnapshot, RemoteError> {
        self.record(Call::Create(fields.clone()))?;
        let mut state = self.state.lock().unwrap();
        let id = format!("B-{}", state.next_id);
        state.next_id += 1;
        let mut stored = state.server_defaults.clone();
        stored.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        state.accounts.insert(id.clone(), stored);
        Ok(Self::snapshot(&id, fields))
    }

    async fn patch(
        &self,
        id: &ResourceIdentity,
        fields: &Attributes,
        mask: &[String],
    ) -> Result<RemoteSnapshot, RemoteError> {
        self.record(Call::Patch {
            id: id.to_string(),
            fields: fields.clone(),
            mask: mask.to_vec(),
        })?;
        let mut state = self.state.lock().unwrap();
        let account = state
            .accounts
            .get_mut(id.as_str())
            .ok_or_else(|| not_found(id.as_str()))?;
        for field in mask {
            if let Some(value) = fields.get(field) {
                account.insert(field.clone(), value.clone());
            }
        }
        Ok(Self::snapshot(id.as_str(), account))
    }
}

/// Schema shaped like the billing account, with the field names used in scenarios
pub fn account_schema() -> ResourceSchema {
    ResourceSchema::new(
        "test_billing_account",
        vec![
            FieldSpec::new("displayName", FieldType::String, FieldCategory::Mutable).required(),
            FieldSpec::new("masterAccount", FieldType::String, FieldCategory::ImmutableAfterCreate)
                .required(),
            FieldSpec::new("open", FieldType::Bool, FieldCategory::RemoteUnsupported),
        ],
    )
}

pub fn attrs(value: Value) -> Attributes {
    serde_json::from_value(value).unwrap()
}

pub fn acme() -> Attributes {
    attrs(json!({"displayName": "Acme", "masterAccount": "A-1"}))
}

pub fn controller(
    remote: &FakeRemote,
    policy: RetryPolicy,
) -> (Controller<FakeRemote, RecordingSleeper>, RecordingSleeper) {
    let sleeper = RecordingSleeper::new();
    let controller = Controller::with_retrier(
        remote.clone(),
        account_schema(),
        Retrier::with_sleeper(policy, sleeper.clone()),
    );
    (controller, sleeper)
}

pub fn unavailable() -> RemoteError {
    RemoteError::api(503, Some("UNAVAILABLE"), "backend unavailable")
}
