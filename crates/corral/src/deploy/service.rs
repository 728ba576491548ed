use async_trait::async_trait;
use serde_json::Value;

use super::{is_selected, retry_on_error, wait, Options, Wrapper, MAX_ATTEMPTS};
use crate::convert;
use crate::error::{Error, Result};
use crate::platform::{Service, SERVICE};
use crate::project::Project;

const ACTION_ROLLBACK: &str = "rollback";
const ACTION_FINISH_UPGRADE: &str = "finishupgrade";
const ACTION_ACTIVATE: &str = "activate";

const STATE_UPGRADED: &str = "upgraded";
const STATE_INACTIVE: &str = "inactive";

/// A scalable service and its sidekick launch configs.
pub struct ServiceWrapper<'a> {
    name: String,
    project: &'a Project,
}

impl<'a> ServiceWrapper<'a> {
    pub fn new(name: &str, project: &'a Project) -> Self {
        Self {
            name: name.to_string(),
            project,
        }
    }

    async fn lookup(&self) -> Result<Option<Service>> {
        self.project.server_lookup.service(&self.name).await
    }

    /// Reloads `service` and waits for it to settle.
    async fn settle(&self, service: &Service) -> Result<Service> {
        let current = self.project.platform.reload(service).await?;
        wait(&self.project.platform, &self.project.cancel, current).await
    }

    async fn run_action(&self, service: &Service, action: &str) -> Result<Service> {
        let platform = &self.project.platform;
        retry_on_error(MAX_ATTEMPTS, || async move {
            let _: Value = platform.action(SERVICE, &service.id, action, None).await?;
            Ok(())
        })
        .await?;
        self.settle(service).await
    }

    async fn upgrade(&self, service: &Service, options: &Options) -> Result<()> {
        if options.no_recreate {
            return Ok(());
        }

        let mut updates = convert::service(self.project, &self.name).await?;
        if options.force_recreate {
            if is_selected(&options.services, &self.name) {
                if let Some(launch_config) = updates.launch_config.as_mut() {
                    launch_config.force_upgrade = true;
                }
            }
            for secondary in &mut updates.secondary_launch_configs {
                if is_selected(&options.services, &secondary.name) {
                    secondary.force_upgrade = true;
                }
            }
        }
        updates.batch_size = options.batch_size;
        updates.interval_millis = options.interval_millis;

        let platform = &self.project.platform;
        let updates = &updates;
        retry_on_error(MAX_ATTEMPTS, || async move {
            let _: Value = platform.update(SERVICE, &service.id, updates).await?;
            Ok(())
        })
        .await?;
        self.settle(service).await?;
        Ok(())
    }
}

#[async_trait]
impl Wrapper for ServiceWrapper<'_> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn exists(&self) -> Result<bool> {
        Ok(self.lookup().await?.is_some())
    }

    async fn create(&self, _options: &Options) -> Result<()> {
        let mut service = convert::service(self.project, &self.name).await?;
        log::debug!("Creating service {}", self.name);

        service.create_only = true;
        service.complete_update = true;
        if let Some(launch_config) = service.launch_config.as_mut() {
            launch_config.complete_update = true;
        }
        for secondary in &mut service.secondary_launch_configs {
            secondary.complete_update = true;
        }

        let created: Service = self.project.platform.create(SERVICE, &service).await?;
        wait(&self.project.platform, &self.project.cancel, created).await?;
        Ok(())
    }

    async fn up(&self, options: &Options) -> Result<()> {
        let Some(mut service) = self.lookup().await? else {
            return Err(Error::Config(format!("Failed to find service {}", self.name)));
        };

        if options.rollback {
            // only a pending upgrade can be rolled back
            if service.state == STATE_UPGRADED {
                self.run_action(&service, ACTION_ROLLBACK).await?;
            } else {
                self.settle(&service).await?;
            }
            return Ok(());
        }

        if service.state == STATE_UPGRADED {
            service = self.run_action(&service, ACTION_FINISH_UPGRADE).await?;
        }
        if service.state == STATE_INACTIVE {
            service = self.run_action(&service, ACTION_ACTIVATE).await?;
        }

        self.upgrade(&service, options).await
    }
}
