use async_trait::async_trait;

use super::{is_selected, Options, ServiceWrapper, Wrapper};
use crate::error::Result;
use crate::project::Project;

/// A sidekick has no service of its own: it is deployed as a secondary
/// launch config of each primary that names it.
pub struct SidekickWrapper<'a> {
    name: String,
    project: &'a Project,
}

impl<'a> SidekickWrapper<'a> {
    pub fn new(name: &str, project: &'a Project) -> Self {
        Self {
            name: name.to_string(),
            project,
        }
    }

    fn primaries(&self) -> impl Iterator<Item = ServiceWrapper<'a>> + '_ {
        self.project
            .config
            .sidekick_info
            .primaries_of(&self.name)
            .iter()
            .map(|primary| ServiceWrapper::new(primary, self.project))
    }
}

#[async_trait]
impl Wrapper for SidekickWrapper<'_> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn exists(&self) -> Result<bool> {
        for primary in self.primaries() {
            if !primary.exists().await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn create(&self, options: &Options) -> Result<()> {
        for primary in self.primaries() {
            // A selected primary is created on its own turn.
            if is_selected(&options.services, primary.name()) {
                continue;
            }
            primary.create(options).await?;
        }
        Ok(())
    }

    async fn up(&self, options: &Options) -> Result<()> {
        for primary in self.primaries() {
            if is_selected(&options.services, primary.name()) {
                continue;
            }
            primary.up(options).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::MockControlPlane;
    use crate::platform::{Platform, Stack, SERVICE};
    use corral_compose::ServiceConfig;
    use serde_json::json;
    use std::sync::Arc;

    fn project(mock: Arc<MockControlPlane>) -> Project {
        let mut project = Project::new("demo", Platform::new(mock));
        project.attach_stack(Stack {
            id: "1st1".into(),
            name: "demo".into(),
            ..Stack::default()
        });
        let mut labels = indexmap::IndexMap::new();
        labels.insert("io.rancher.sidekicks".to_string(), "log".to_string());
        project.config.services.insert(
            "web".into(),
            ServiceConfig {
                image: "nginx".into(),
                labels,
                ..ServiceConfig::default()
            },
        );
        project.config.services.insert(
            "log".into(),
            ServiceConfig {
                image: "fluentd".into(),
                ..ServiceConfig::default()
            },
        );
        project.config.complete();
        project
    }

    #[tokio::test]
    async fn test_exists_follows_primaries() {
        let mock = Arc::new(MockControlPlane::new());
        let project = project(mock.clone());
        let sidekick = SidekickWrapper::new("log", &project);
        assert!(!sidekick.exists().await.unwrap());

        mock.insert(SERVICE, json!({"name": "web", "stackId": "1st1"}));
        assert!(sidekick.exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_selected_sidekick_creates_its_primary() {
        let mock = Arc::new(MockControlPlane::new());
        let project = project(mock.clone());
        let options = Options {
            services: vec!["log".into()],
            ..Options::default()
        };

        SidekickWrapper::new("log", &project).ensure(&options).await.unwrap();

        let created = mock.created(SERVICE);
        assert_eq!(created.len(), 1);
        assert_eq!(created[0]["name"], "web");
    }

    #[tokio::test]
    async fn test_selected_primary_is_left_alone() {
        let mock = Arc::new(MockControlPlane::new());
        let project = project(mock.clone());

        SidekickWrapper::new("log", &project)
            .create(&Options::default())
            .await
            .unwrap();
        assert!(mock.created(SERVICE).is_empty());
    }
}
