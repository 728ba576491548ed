use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use corral_compose::SecretConfig;

use super::ResourceSet;
use crate::deploy::Options;
use crate::error::{Error, Result};
use crate::platform::{Filters, Secret, SECRET};
use crate::project::Project;

/// Secrets declared by the stack. Secrets are global: an existing secret
/// with the same name is reused.
pub struct Secrets<'a> {
    project: &'a Project,
}

impl<'a> Secrets<'a> {
    pub fn new(project: &'a Project) -> Self {
        Self { project }
    }

    async fn ensure(&self, name: &str, config: &SecretConfig) -> Result<()> {
        let existing: Option<Secret> = self
            .project
            .platform
            .find(SECRET, &Filters::new().with("name", name))
            .await?;
        if existing.is_some() {
            log::info!("Secret {} already exists", name);
            return Ok(());
        }
        if !config.external.is_empty() {
            return Err(Error::Config(format!("Existing secret {name} not found")));
        }

        let (contents, file) = self.project.resource_lookup.lookup(&config.file, "./")?;
        log::info!("Creating secret {} with contents from file {}", name, file);
        let secret = Secret {
            name: name.to_string(),
            value: STANDARD.encode(contents),
            ..Secret::default()
        };
        let _: Secret = self.project.platform.create(SECRET, &secret).await?;
        Ok(())
    }
}

#[async_trait]
impl ResourceSet for Secrets<'_> {
    async fn initialize(&self, _options: &Options) -> Result<()> {
        for (name, config) in &self.project.config.secrets {
            self.ensure(name, config).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::MockControlPlane;
    use crate::platform::Platform;
    use corral_compose::MemoryResourceLookup;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn project(mock: Arc<MockControlPlane>, secrets: &[(&str, SecretConfig)]) -> Project {
        let files = HashMap::from([("password.txt".to_string(), b"hunter2".to_vec())]);
        let mut project = Project::new("demo", Platform::new(mock))
            .with_lookup(Arc::new(MemoryResourceLookup::new(files)));
        for (name, config) in secrets {
            project.config.secrets.insert(name.to_string(), config.clone());
        }
        project
    }

    fn from_file(file: &str) -> SecretConfig {
        SecretConfig {
            file: file.into(),
            ..SecretConfig::default()
        }
    }

    #[tokio::test]
    async fn test_creates_secret_base64() {
        let mock = Arc::new(MockControlPlane::new());
        let project = project(mock.clone(), &[("db-pass", from_file("password.txt"))]);

        Secrets::new(&project).initialize(&Options::default()).await.unwrap();

        let created = mock.created(SECRET);
        assert_eq!(created, [json!({"name": "db-pass", "value": "aHVudGVyMg=="})]);
    }

    #[tokio::test]
    async fn test_existing_secret_is_reused() {
        let mock = Arc::new(MockControlPlane::new());
        mock.insert(SECRET, json!({"name": "db-pass"}));
        let project = project(mock.clone(), &[("db-pass", from_file("missing.txt"))]);

        Secrets::new(&project).initialize(&Options::default()).await.unwrap();
        assert!(mock.created(SECRET).is_empty());
    }

    #[tokio::test]
    async fn test_missing_external_secret() {
        let mock = Arc::new(MockControlPlane::new());
        let external = SecretConfig {
            external: "true".into(),
            ..SecretConfig::default()
        };
        let project = project(mock, &[("api-key", external)]);

        let err = Secrets::new(&project)
            .initialize(&Options::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Existing secret api-key not found");
    }
}
