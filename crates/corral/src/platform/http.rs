//! reqwest-backed control plane client.
//!
//! Speaks the Rancher v3 REST shape: collections at `{url}/{collection}`,
//! list responses wrapped in `{"data": [...]}`, actions as
//! `POST {url}/{collection}/{id}?action=<name>`, HTTP basic auth with the
//! access/secret key pair.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::{ControlPlane, Filters, PlatformError, PlatformResult};

/// Default API endpoint when none is configured.
pub const DEFAULT_URL: &str = "http://localhost:8080/v3";

#[derive(Deserialize)]
struct Collection {
    #[serde(default)]
    data: Vec<Value>,
}

/// Control plane client over HTTP.
#[derive(Debug, Clone)]
pub struct HttpControlPlane {
    client: reqwest::Client,
    url: String,
    access_key: String,
    secret_key: String,
}

impl HttpControlPlane {
    pub fn new(url: &str, access_key: &str, secret_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.trim_end_matches('/').to_string(),
            access_key: access_key.to_string(),
            secret_key: secret_key.to_string(),
        }
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/{}", self.url, collection)
    }

    fn resource_url(&self, collection: &str, id: &str) -> String {
        format!("{}/{}/{}", self.url, collection, id)
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.access_key.is_empty() {
            builder
        } else {
            builder.basic_auth(&self.access_key, Some(&self.secret_key))
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> PlatformResult<reqwest::Response> {
        let response = self.authed(builder).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(PlatformError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    fn url(&self) -> &str {
        &self.url
    }

    async fn list(&self, collection: &str, filters: &Filters) -> PlatformResult<Vec<Value>> {
        let query: Vec<(&str, &str)> = filters.iter().collect();
        let request = self.client.get(self.collection_url(collection)).query(&query);
        let body: Collection = self.send(request).await?.json().await?;
        Ok(body.data)
    }

    async fn by_id(&self, collection: &str, id: &str) -> PlatformResult<Option<Value>> {
        let request = self.client.get(self.resource_url(collection, id));
        match self.send(request).await {
            Ok(response) => Ok(Some(response.json().await?)),
            Err(PlatformError::Api { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create(&self, collection: &str, body: Value) -> PlatformResult<Value> {
        let request = self.client.post(self.collection_url(collection)).json(&body);
        Ok(self.send(request).await?.json().await?)
    }

    async fn update(&self, collection: &str, id: &str, body: Value) -> PlatformResult<Value> {
        let request = self.client.put(self.resource_url(collection, id)).json(&body);
        Ok(self.send(request).await?.json().await?)
    }

    async fn delete(&self, collection: &str, id: &str) -> PlatformResult<()> {
        let request = self.client.delete(self.resource_url(collection, id));
        self.send(request).await?;
        Ok(())
    }

    async fn action(
        &self,
        collection: &str,
        id: &str,
        action: &str,
        body: Option<Value>,
    ) -> PlatformResult<Value> {
        let mut request = self
            .client
            .post(self.resource_url(collection, id))
            .query(&[("action", action)]);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = self.send(request).await?;
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| PlatformError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let plane = HttpControlPlane::new("http://rancher:8080/v3/", "ak", "sk");
        assert_eq!(plane.url(), "http://rancher:8080/v3");
        assert_eq!(plane.collection_url("service"), "http://rancher:8080/v3/service");
        assert_eq!(
            plane.resource_url("service", "1s5"),
            "http://rancher:8080/v3/service/1s5"
        );
    }

    #[test]
    fn test_collection_envelope() {
        let body: Collection =
            serde_json::from_str(r#"{"type":"collection","data":[{"id":"1s1"}]}"#).unwrap();
        assert_eq!(body.data.len(), 1);
        let empty: Collection = serde_json::from_str(r#"{"type":"collection"}"#).unwrap();
        assert!(empty.data.is_empty());
    }
}
