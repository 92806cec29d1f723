//! Remote resource client interface
//!
//! The controller only needs get, create and a masked patch. There is no
//! delete: the resource types handled here cannot be removed
//! remotely.

use super::error::RemoteError;
use super::fields::Attributes;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity token assigned by the remote system on creation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceIdentity(String);

impl ResourceIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceIdentity {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Remote state as returned by any call
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteSnapshot {
    pub identity: ResourceIdentity,
    pub state: Attributes,
}

/// Authenticated client for one remote resource type
#[async_trait]
pub trait RemoteResourceClient: Send + Sync {
    async fn get(&self, id: &ResourceIdentity) -> Result<RemoteSnapshot, RemoteError>;

    async fn create(&self, fields: &Attributes) -> Result<RemoteSnapshot, RemoteError>;

    /// Overwrite exactly the fields named in `mask`
    async fn patch(
        &self,
        id: &ResourceIdentity,
        fields: &Attributes,
        mask: &[String],
    ) -> Result<RemoteSnapshot, RemoteError>;
}

#[async_trait]
impl<T: RemoteResourceClient + ?Sized> RemoteResourceClient for std::sync::Arc<T> {
    async fn get(&self, id: &ResourceIdentity) -> Result<RemoteSnapshot, RemoteError> {
        (**self).get(id).await
    }

    async fn create(&self, fields: &Attributes) -> Result<RemoteSnapshot, RemoteError> {
        (**self).create(fields).await
    }

    async fn patch(
        &self,
        id: &ResourceIdentity,
        fields: &Attributes,
        mask: &[String],
    ) -> Result<RemoteSnapshot, RemoteError> {
        (**self).patch(id, fields, mask).await
    }
}
