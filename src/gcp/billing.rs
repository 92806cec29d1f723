//! Cloud Billing API
//!
//! Reseller billing accounts: get, create and masked patch. The API offers no
//! way to delete or close a billing account.

use super::client::GcpClient;
use crate::reconcile::{
    Attributes, RemoteError, RemoteResourceClient, RemoteSnapshot, ResourceIdentity,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default Cloud Billing API endpoint
pub const BILLING_API_BASE: &str = "https://cloudbilling.googleapis.com/";

/// Resource name prefix of every billing account
pub const ACCOUNT_PREFIX: &str = "billingAccounts/";

/// Billing account as exchanged with the API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingAccount {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_billing_account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open: Option<bool>,
}

impl BillingAccount {
    /// Build a request body from reconciler attributes
    pub fn from_attributes(fields: &Attributes) -> Self {
        let string = |key: &str| fields.get(key).and_then(|v| v.as_str()).map(str::to_string);
        Self {
            name: None,
            display_name: string("display_name"),
            master_billing_account: string("master_billing_account"),
            open: fields.get("open").and_then(|v| v.as_bool()),
        }
    }

    /// Attribute view of an API response
    pub fn to_attributes(&self) -> Attributes {
        let mut attrs = Attributes::new();
        if let Some(name) = &self.name {
            attrs.insert("name".into(), Value::String(name.clone()));
        }
        if let Some(display_name) = &self.display_name {
            attrs.insert("display_name".into(), Value::String(display_name.clone()));
        }
        if let Some(master) = &self.master_billing_account {
            attrs.insert("master_billing_account".into(), Value::String(master.clone()));
        }
        if let Some(open) = self.open {
            attrs.insert("open".into(), Value::Bool(open));
        }
        attrs
    }

    fn into_snapshot(self) -> Result<RemoteSnapshot, RemoteError> {
        let state = self.to_attributes();
        let name = self
            .name
            .ok_or_else(|| RemoteError::Decode("billing account has no name".to_string()))?;

        Ok(RemoteSnapshot {
            identity: ResourceIdentity::new(name),
            state,
        })
    }
}

/// Full resource name for an identity; bare account ids get the `billingAccounts/` prefix
pub fn account_name(id: &ResourceIdentity) -> String {
    let id = id.as_str().trim_matches('/');
    if id.starts_with(ACCOUNT_PREFIX) {
        id.to_string()
    } else {
        format!("{}{}", ACCOUNT_PREFIX, id)
    }
}

fn decode(value: Value) -> Result<BillingAccount, RemoteError> {
    serde_json::from_value(value)
        .map_err(|e| RemoteError::Decode(format!("Failed to parse billing account: {}", e)))
}

/// Billing account client driven by the lifecycle controller
#[derive(Clone)]
pub struct BillingClient {
    client: GcpClient,
}

impl BillingClient {
    pub fn new(client: GcpClient) -> Self {
        Self { client }
    }

    pub fn gcp(&self) -> &GcpClient {
        &self.client
    }
}

#[async_trait]
impl RemoteResourceClient for BillingClient {
    async fn get(&self, id: &ResourceIdentity) -> Result<RemoteSnapshot, RemoteError> {
        let url = self.client.url(&format!("v1/{}", account_name(id)))?;
        let response = self.client.get(&url).await?;
        decode(response)?.into_snapshot()
    }

    async fn create(&self, fields: &Attributes) -> Result<RemoteSnapshot, RemoteError> {
        let url = self.client.url("v1/billingAccounts")?;
        let body = serde_json::to_value(BillingAccount::from_attributes(fields))
            .map_err(|e| RemoteError::Decode(e.to_string()))?;

        let created = decode(self.client.post(&url, &body).await?)?;
        tracing::info!(
            "Created billing account: {}",
            created.display_name.as_deref().unwrap_or("-")
        );
        created.into_snapshot()
    }

    async fn patch(
        &self,
        id: &ResourceIdentity,
        fields: &Attributes,
        mask: &[String],
    ) -> Result<RemoteSnapshot, RemoteError> {
        let mut url = self.client.url(&format!("v1/{}", account_name(id)))?;
        url.set_query(Some(&format!(
            "updateMask={}",
            urlencoding::encode(&mask.join(","))
        )));

        let body = serde_json::to_value(BillingAccount::from_attributes(fields))
            .map_err(|e| RemoteError::Decode(e.to_string()))?;

        let updated = decode(self.client.patch(&url, &body).await?)?;
        tracing::info!(
            "Updated billing account: {}",
            updated.display_name.as_deref().unwrap_or("-")
        );
        updated.into_snapshot()
    }
}
