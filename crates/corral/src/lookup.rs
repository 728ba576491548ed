//! Resolves stack-local names to live control plane resources.

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::platform::{
    Certificate, Container, Filters, Platform, Service, Stack, CERTIFICATE, CONTAINER, SERVICE,
    STACK,
};

/// Name-based lookups against the control plane. A miss is `Ok(None)`.
#[async_trait]
pub trait ServerResourceLookup: Send + Sync {
    async fn service(&self, name: &str) -> Result<Option<Service>>;
    async fn container(&self, name: &str) -> Result<Option<Container>>;
    async fn cert(&self, name: &str) -> Result<Option<Certificate>>;
}

/// Lookup scoped to one stack. Names of the form `stack/name` resolve the
/// stack by name first.
#[derive(Clone)]
pub struct PlatformLookup {
    stack_id: String,
    platform: Platform,
}

impl PlatformLookup {
    pub fn new(stack_id: &str, platform: Platform) -> Self {
        Self {
            stack_id: stack_id.to_string(),
            platform,
        }
    }

    async fn resolve_name_and_stack(&self, name: &str) -> Result<(String, String)> {
        let Some((stack_name, name)) = name.split_once('/') else {
            return Ok((name.to_string(), self.stack_id.clone()));
        };

        let stack: Option<Stack> = self
            .platform
            .find(STACK, &Filters::new().with("name", stack_name).removed_null())
            .await?;
        match stack {
            Some(stack) => Ok((name.to_string(), stack.id)),
            None => Err(Error::Config(format!("Failed to find stack: {stack_name}"))),
        }
    }

    fn scoped(name: &str, stack_id: &str) -> Filters {
        Filters::new()
            .with("stackId", stack_id)
            .with("name", name)
            .removed_null()
    }
}

#[async_trait]
impl ServerResourceLookup for PlatformLookup {
    async fn service(&self, name: &str) -> Result<Option<Service>> {
        log::debug!("Finding service {}", name);
        let (name, stack_id) = self.resolve_name_and_stack(name).await?;
        let service: Option<Service> = self
            .platform
            .find(SERVICE, &Self::scoped(&name, &stack_id))
            .await?;
        if service.is_some() {
            log::debug!("Found service {}", name);
        }
        Ok(service)
    }

    async fn container(&self, name: &str) -> Result<Option<Container>> {
        let (name, stack_id) = self.resolve_name_and_stack(name).await?;
        Ok(self
            .platform
            .find(CONTAINER, &Self::scoped(&name, &stack_id))
            .await?)
    }

    async fn cert(&self, name: &str) -> Result<Option<Certificate>> {
        Ok(self
            .platform
            .find(CERTIFICATE, &Filters::new().removed_null().with("name", name))
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::MockControlPlane;
    use serde_json::json;
    use std::sync::Arc;

    fn setup() -> (Arc<MockControlPlane>, PlatformLookup) {
        let mock = Arc::new(MockControlPlane::new());
        mock.insert(STACK, json!({"id": "1st1", "name": "app"}));
        mock.insert(STACK, json!({"id": "1st2", "name": "shared"}));
        mock.insert(SERVICE, json!({"id": "1s1", "name": "web", "stackId": "1st1"}));
        mock.insert(SERVICE, json!({"id": "1s2", "name": "web", "stackId": "1st2"}));
        mock.insert(
            SERVICE,
            json!({"id": "1s3", "name": "old", "stackId": "1st1", "removed": "2024-01-01"}),
        );
        mock.insert(CERTIFICATE, json!({"id": "1c1", "name": "site"}));
        let lookup = PlatformLookup::new("1st1", Platform::new(mock.clone()));
        (mock, lookup)
    }

    #[tokio::test]
    async fn test_service_in_current_stack() {
        let (_, lookup) = setup();
        assert_eq!(lookup.service("web").await.unwrap().unwrap().id, "1s1");
        assert!(lookup.service("old").await.unwrap().is_none());
        assert!(lookup.service("db").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cross_stack_reference() {
        let (_, lookup) = setup();
        assert_eq!(lookup.service("shared/web").await.unwrap().unwrap().id, "1s2");
        let err = lookup.service("missing/web").await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to find stack: missing");
    }

    #[tokio::test]
    async fn test_cert() {
        let (_, lookup) = setup();
        assert_eq!(lookup.cert("site").await.unwrap().unwrap().id, "1c1");
        assert!(lookup.cert("other").await.unwrap().is_none());
    }
}
