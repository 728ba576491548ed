//! Layer boundary between the deployment engine and the control plane API.
//!
//! Everything that talks to the control plane goes through [`ControlPlane`],
//! a small untyped CRUD + action interface over JSON documents. [`Platform`]
//! wraps it with typed helpers so callers work with the structs in
//! [`types`]. Tests swap in [`mock::MockControlPlane`].

pub mod http;
#[cfg(test)]
pub mod mock;
pub mod types;

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

pub use http::{HttpControlPlane, DEFAULT_URL};
pub use types::*;

/// Result type for control plane operations.
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Errors from control plane operations.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },
    #[error("Invalid response: {0}")]
    Decode(String),
    #[error("Invalid URL: {0}")]
    Url(String),
}

// ── Collections ─────────────────────────────────────────────────────

pub const STACK: &str = "stack";
pub const SERVICE: &str = "service";
pub const CONTAINER: &str = "container";
pub const CERTIFICATE: &str = "certificate";
pub const SECRET: &str = "secret";
pub const VOLUME_TEMPLATE: &str = "volumeTemplate";
pub const HOST: &str = "host";
pub const SETTING: &str = "setting";
pub const CLUSTER: &str = "cluster";
pub const ACCOUNT: &str = "account";
pub const PULL_TASK: &str = "pullTask";
pub const PUBLISH: &str = "publish";

// ── Filters ─────────────────────────────────────────────────────────

/// Query filters for list calls. `removed_null` restricts results to
/// resources that have not been removed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filters(Vec<(String, String)>);

impl Filters {
    pub const REMOVED_NULL: &'static str = "removed_null";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.0.push((key.to_string(), value.to_string()));
        self
    }

    pub fn removed_null(mut self) -> Self {
        self.0.push((Self::REMOVED_NULL.to_string(), String::new()));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ── ControlPlane ────────────────────────────────────────────────────

/// Untyped access to control plane collections.
///
/// `by_id` doubles as the reload operation used while waiting for a
/// resource to settle.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Base API URL, used to derive cluster endpoints.
    fn url(&self) -> &str;

    async fn list(&self, collection: &str, filters: &Filters) -> PlatformResult<Vec<Value>>;
    async fn by_id(&self, collection: &str, id: &str) -> PlatformResult<Option<Value>>;
    async fn create(&self, collection: &str, body: Value) -> PlatformResult<Value>;
    async fn update(&self, collection: &str, id: &str, body: Value) -> PlatformResult<Value>;
    async fn delete(&self, collection: &str, id: &str) -> PlatformResult<()>;
    async fn action(
        &self,
        collection: &str,
        id: &str,
        action: &str,
        body: Option<Value>,
    ) -> PlatformResult<Value>;
}

// ── Platform: typed facade ──────────────────────────────────────────

/// Cheap-to-clone typed handle over a [`ControlPlane`].
#[derive(Clone)]
pub struct Platform {
    plane: Arc<dyn ControlPlane>,
}

fn decode<T: DeserializeOwned>(value: Value) -> PlatformResult<T> {
    serde_json::from_value(value).map_err(|e| PlatformError::Decode(e.to_string()))
}

fn encode<T: Serialize>(body: &T) -> PlatformResult<Value> {
    serde_json::to_value(body).map_err(|e| PlatformError::Decode(e.to_string()))
}

impl Platform {
    pub fn new(plane: Arc<dyn ControlPlane>) -> Self {
        Self { plane }
    }

    pub fn url(&self) -> &str {
        self.plane.url()
    }

    pub async fn list<T: DeserializeOwned>(
        &self,
        collection: &str,
        filters: &Filters,
    ) -> PlatformResult<Vec<T>> {
        self.plane
            .list(collection, filters)
            .await?
            .into_iter()
            .map(decode)
            .collect()
    }

    /// First match of a filtered list, if any.
    pub async fn find<T: DeserializeOwned>(
        &self,
        collection: &str,
        filters: &Filters,
    ) -> PlatformResult<Option<T>> {
        match self.plane.list(collection, filters).await?.into_iter().next() {
            Some(value) => Ok(Some(decode(value)?)),
            None => Ok(None),
        }
    }

    pub async fn by_id<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
    ) -> PlatformResult<Option<T>> {
        match self.plane.by_id(collection, id).await? {
            Some(value) => Ok(Some(decode(value)?)),
            None => Ok(None),
        }
    }

    pub async fn create<B: Serialize, T: DeserializeOwned>(
        &self,
        collection: &str,
        body: &B,
    ) -> PlatformResult<T> {
        decode(self.plane.create(collection, encode(body)?).await?)
    }

    pub async fn update<B: Serialize, T: DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
        body: &B,
    ) -> PlatformResult<T> {
        decode(self.plane.update(collection, id, encode(body)?).await?)
    }

    pub async fn delete(&self, collection: &str, id: &str) -> PlatformResult<()> {
        self.plane.delete(collection, id).await
    }

    pub async fn action<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
        action: &str,
        body: Option<Value>,
    ) -> PlatformResult<T> {
        decode(self.plane.action(collection, id, action, body).await?)
    }

    /// Re-reads a resource so its transition state is current.
    pub async fn reload<T: Resource + DeserializeOwned>(&self, resource: &T) -> PlatformResult<T> {
        self.by_id(T::COLLECTION, resource.id())
            .await?
            .ok_or_else(|| PlatformError::Api {
                status: 404,
                message: format!("{} {} not found", T::COLLECTION, resource.id()),
            })
    }
}

// ── Tests ───────────────────────────────────────────────────────────
