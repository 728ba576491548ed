use async_trait::async_trait;
use futures::future::try_join_all;

use super::{service_order, ResourceSet};
use crate::deploy::{is_selected, wrapper_for, Options, Wrapper};
use crate::error::Result;
use crate::project::Project;

/// Services and standalone containers. Created one at a time in dependency
/// order, started concurrently.
pub struct Services<'a> {
    project: &'a Project,
    wrappers: Vec<Box<dyn Wrapper + 'a>>,
}

impl<'a> Services<'a> {
    pub fn new(project: &'a Project) -> Self {
        let wrappers = project
            .config
            .containers
            .keys()
            .chain(project.config.services.keys())
            .map(|name| wrapper_for(project, name))
            .collect();
        Self { project, wrappers }
    }

    fn wrapper(&self, name: &str) -> Option<&(dyn Wrapper + 'a)> {
        self.wrappers
            .iter()
            .find(|w| w.name() == name)
            .map(|w| &**w)
    }
}

#[async_trait]
impl ResourceSet for Services<'_> {
    async fn initialize(&self, options: &Options) -> Result<()> {
        let order = service_order(&self.project.config.containers, &self.project.config.services)?;
        log::info!("Service order: {:?}", order);

        for name in &order {
            if !is_selected(&options.services, name) {
                continue;
            }
            if let Some(wrapper) = self.wrapper(name) {
                wrapper.ensure(options).await?;
            }
        }
        Ok(())
    }

    async fn start(&self, options: &Options) -> Result<()> {
        try_join_all(
            self.wrappers
                .iter()
                .filter(|w| is_selected(&options.services, w.name()))
                .map(|w| w.up(options)),
        )
        .await?;
        Ok(())
    }
}
