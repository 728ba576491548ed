use async_trait::async_trait;
use corral_compose::VolumeConfig;

use super::ResourceSet;
use crate::deploy::Options;
use crate::error::{Error, Result};
use crate::platform::{Filters, VolumeTemplate, VOLUME_TEMPLATE};
use crate::project::Project;

/// Volume templates scoped to the stack.
pub struct Volumes<'a> {
    project: &'a Project,
}

impl<'a> Volumes<'a> {
    pub fn new(project: &'a Project) -> Self {
        Self { project }
    }

    async fn inspect(&self, name: &str) -> Result<Option<VolumeTemplate>> {
        let filters = Filters::new()
            .with("name", name)
            .with("stackId", &self.project.stack.id);
        Ok(self.project.platform.find(VOLUME_TEMPLATE, &filters).await?)
    }

    async fn ensure(&self, name: &str, config: &VolumeConfig) -> Result<()> {
        let Some(existing) = self.inspect(name).await? else {
            log::info!("Creating volume template {}", name);
            let template = VolumeTemplate {
                name: name.to_string(),
                driver: config.driver.clone(),
                driver_opts: config.driver_opts.clone(),
                external: config.external,
                per_container: config.per_container,
                stack_id: self.project.stack.id.clone(),
                ..VolumeTemplate::default()
            };
            let _: VolumeTemplate = self.project.platform.create(VOLUME_TEMPLATE, &template).await?;
            return Ok(());
        };

        log::info!("Existing volume template found for {}", name);
        if !config.driver.is_empty() && existing.driver != config.driver {
            return Err(Error::Config(format!(
                "Volume \"{name}\" needs to be recreated - driver has changed"
            )));
        }
        Ok(())
    }

    /// Deletes the stack's volume templates. External volumes are left
    /// alone.
    pub async fn remove(&self) -> Result<()> {
        for (name, config) in &self.project.config.volumes {
            if config.external {
                continue;
            }
            if let Some(existing) = self.inspect(name).await? {
                log::info!("Removing volume template {}", name);
                self.project
                    .platform
                    .delete(VOLUME_TEMPLATE, &existing.id)
                    .await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceSet for Volumes<'_> {
    async fn initialize(&self, _options: &Options) -> Result<()> {
        for (name, config) in &self.project.config.volumes {
            self.ensure(name, config).await?;
        }
        Ok(())
    }
}
