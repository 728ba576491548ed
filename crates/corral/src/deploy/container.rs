use std::time::Duration;

use async_trait::async_trait;

use super::{wait, Options, Wrapper};
use crate::convert::{self, HASH_LABEL};
use crate::error::{Error, Result};
use crate::platform::{Container, ContainerUpgrade, Filters, Revision, CONTAINER};
use crate::project::Project;

const ACTION_UPGRADE: &str = "upgrade";

/// Rounds spent waiting for the old container to give up its desired flag.
const DESIRED_ROUNDS: usize = 3;

/// A standalone container. Upgrading creates a new revision that replaces
/// the running container.
pub struct ContainerWrapper<'a> {
    name: String,
    project: &'a Project,
}

impl<'a> ContainerWrapper<'a> {
    pub fn new(name: &str, project: &'a Project) -> Self {
        Self {
            name: name.to_string(),
            project,
        }
    }

    async fn lookup(&self) -> Result<Option<Container>> {
        self.project.server_lookup.container(&self.name).await
    }

    async fn settle(&self, container: &Container) -> Result<Container> {
        let current = self.project.platform.reload(container).await?;
        wait(&self.project.platform, &self.project.cancel, current).await
    }

    async fn upgrade(&self, container: &Container, options: &Options) -> Result<()> {
        if options.no_recreate {
            return Ok(());
        }

        let config = convert::container_config(self.project, &self.name).await?;
        let body = serde_json::to_value(ContainerUpgrade { config })?;
        let revision: Option<Revision> = self
            .project
            .platform
            .action(CONTAINER, &container.id, ACTION_UPGRADE, Some(body))
            .await?;
        let Some(revision) = revision else {
            return Ok(());
        };

        let mut current = container.clone();
        for _ in 0..DESIRED_ROUNDS {
            current = self.settle(&current).await?;
            if !current.desired {
                break;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        let replacements: Vec<Container> = self
            .project
            .platform
            .list(CONTAINER, &Filters::new().with("revisionId", &revision.id))
            .await?;
        if let Some(replacement) = replacements.into_iter().next() {
            log::debug!("Waiting for container {} revision {}", self.name, revision.id);
            wait(&self.project.platform, &self.project.cancel, replacement).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Wrapper for ContainerWrapper<'_> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn exists(&self) -> Result<bool> {
        Ok(self.lookup().await?.is_some())
    }

    async fn create(&self, _options: &Options) -> Result<()> {
        let container = convert::container(self.project, &self.name).await?;
        log::debug!("Creating container {}", self.name);
        let created: Container = self.project.platform.create(CONTAINER, &container).await?;
        wait(&self.project.platform, &self.project.cancel, created).await?;
        Ok(())
    }

    /// Containers are created once. A running container whose definition
    /// has since changed is reported and left alone.
    async fn ensure(&self, options: &Options) -> Result<()> {
        let Some(existing) = self.lookup().await? else {
            return self.create(options).await;
        };
        let Some(current) = existing.config.labels.get(HASH_LABEL) else {
            return Ok(());
        };
        let expected = convert::container(self.project, &self.name).await?;
        if expected.config.labels.get(HASH_LABEL) != Some(current) {
            log::warn!(
                "Container {} does not match its definition, leaving it unchanged",
                self.name
            );
        }
        Ok(())
    }

    async fn up(&self, options: &Options) -> Result<()> {
        let Some(container) = self.lookup().await? else {
            return Err(Error::Config(format!("Failed to find container {}", self.name)));
        };

        // Containers have no previous revision to return to.
        if options.rollback {
            self.settle(&container).await?;
            return Ok(());
        }

        self.upgrade(&container, options).await
    }
}
