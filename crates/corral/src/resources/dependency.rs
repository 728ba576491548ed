use async_trait::async_trait;

use super::ResourceSet;
use crate::deploy::Options;
use crate::error::Result;
use crate::project::Project;

/// Catalog templates a stack depends on. Installing them is up to the
/// catalog, so initializing only reports what is declared.
pub struct Dependencies<'a> {
    project: &'a Project,
}

impl<'a> Dependencies<'a> {
    pub fn new(project: &'a Project) -> Self {
        Self { project }
    }
}

#[async_trait]
impl ResourceSet for Dependencies<'_> {
    async fn initialize(&self, _options: &Options) -> Result<()> {
        for (name, dependency) in &self.project.config.dependencies {
            log::debug!(
                "Dependency {} on template {} version {}",
                name,
                dependency.template,
                dependency.version
            );
        }
        Ok(())
    }
}
