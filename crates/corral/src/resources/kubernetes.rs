use std::path::PathBuf;

use async_trait::async_trait;

use super::ResourceSet;
use crate::deploy::Options;
use crate::error::Result;
use crate::kubectl::{self, Kubectl};
use crate::project::Project;

/// Kubernetes manifests carried by the stack, applied through kubectl
/// against the stack's cluster.
pub struct KubernetesResources<'a> {
    project: &'a Project,
    program: PathBuf,
}

impl<'a> KubernetesResources<'a> {
    pub fn new(project: &'a Project) -> Self {
        Self {
            project,
            program: PathBuf::from("kubectl"),
        }
    }

    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// kubectl bound to the cluster, or `None` when there is nothing to do.
    async fn kubectl(&self) -> Result<Option<Kubectl>> {
        if self.project.config.kubernetes_resources.is_empty() {
            return Ok(None);
        }
        let Some(cluster) = &self.project.cluster else {
            return Ok(None);
        };
        let Some(client) = &cluster.k8s_client_config else {
            return Ok(None);
        };

        let endpoint = kubectl::cluster_endpoint(self.project.platform.url(), &cluster.id)?;
        let namespace = kubectl::namespace(&self.project.platform, &self.project.stack).await?;
        Ok(Some(
            Kubectl::new(&endpoint, &client.bearer_token, &namespace)?.with_program(&self.program),
        ))
    }

    /// Deletes every manifest from the cluster.
    pub async fn remove(&self) -> Result<()> {
        let Some(kubectl) = self.kubectl().await? else {
            return Ok(());
        };
        for (name, resource) in &self.project.config.kubernetes_resources {
            log::info!("Removing Kubernetes resource {}", name);
            kubectl.delete(name, &resource.contents).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceSet for KubernetesResources<'_> {
    async fn initialize(&self, _options: &Options) -> Result<()> {
        let Some(kubectl) = self.kubectl().await? else {
            return Ok(());
        };
        for (name, resource) in &self.project.config.kubernetes_resources {
            log::info!("Creating Kubernetes resource {}", name);
            kubectl.apply(name, &resource.contents).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::MockControlPlane;
    use crate::platform::{Cluster, K8sClientConfig, Platform, Stack, ACCOUNT};
    use corral_compose::KubernetesResource;
    use serde_json::json;
    use std::sync::Arc;

    fn project(mock: Arc<MockControlPlane>, cluster: bool) -> Project {
        mock.insert(ACCOUNT, json!({"id": "1a5", "externalId": "team-a"}));
        let mut project = Project::new("demo", Platform::new(mock));
        project.attach_stack(Stack {
            id: "1st1".into(),
            name: "demo".into(),
            account_id: "1a5".into(),
            ..Stack::default()
        });
        if cluster {
            project.attach_cluster(Cluster {
                id: "c-1".into(),
                k8s_client_config: Some(K8sClientConfig {
                    address: "https://10.0.0.1:6443".into(),
                    bearer_token: "token".into(),
                }),
                ..Cluster::default()
            });
        }
        let contents: serde_yaml::Value =
            serde_yaml::from_str("kind: ConfigMap\nmetadata:\n  name: settings\n").unwrap();
        project.config.kubernetes_resources.insert(
            "ConfigMap/settings".into(),
            KubernetesResource {
                kind: "ConfigMap".into(),
                name: "settings".into(),
                contents,
            },
        );
        project
    }

    #[tokio::test]
    async fn test_skipped_without_cluster() {
        let mock = Arc::new(MockControlPlane::new());
        let project = project(mock, false);
        KubernetesResources::new(&project)
            .with_program("false")
            .initialize(&Options::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_apply_and_remove() {
        let mock = Arc::new(MockControlPlane::new());
        let project = project(mock, true);
        let resources = KubernetesResources::new(&project).with_program("true");
        resources.initialize(&Options::default()).await.unwrap();
        resources.remove().await.unwrap();
    }

    #[tokio::test]
    async fn test_apply_failure() {
        let mock = Arc::new(MockControlPlane::new());
        let project = project(mock, true);
        let err = KubernetesResources::new(&project)
            .with_program("false")
            .initialize(&Options::default())
            .await
            .unwrap_err();
        assert!(err
            .to_string()
            .starts_with("Failed to apply Kubernetes resource ConfigMap/settings"));
    }
}
