//! Drives `kubectl` for the Kubernetes manifests of a stack.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{Error, Result};
use crate::platform::{Account, Platform, PlatformError, Stack, ACCOUNT};

const CONFIG_NAME: &str = "rancher-compose-executor";

/// Cluster API endpoint proxied by the control plane.
pub fn cluster_endpoint(api_url: &str, cluster_id: &str) -> Result<String> {
    let mut url = reqwest::Url::parse(api_url).map_err(|e| PlatformError::Url(e.to_string()))?;
    url.set_path(&format!("/k8s/clusters/{cluster_id}"));
    Ok(url.to_string())
}

/// Namespace of a stack: the external id of the account that owns it.
pub async fn namespace(platform: &Platform, stack: &Stack) -> Result<String> {
    let account: Option<Account> = platform.by_id(ACCOUNT, &stack.account_id).await?;
    account
        .map(|account| account.external_id)
        .ok_or_else(|| Error::Config(format!("Failed to find account {}", stack.account_id)))
}

pub fn kubeconfig(endpoint: &str, token: &str) -> String {
    format!(
        "apiVersion: v1
kind: Config
clusters:
- name: {CONFIG_NAME}
  cluster:
    insecure-skip-tls-verify: true
    server: {endpoint}
contexts:
- context:
    cluster: {CONFIG_NAME}
    user: {CONFIG_NAME}
  name: {CONFIG_NAME}
current-context: {CONFIG_NAME}
users:
- name: {CONFIG_NAME}
  user:
    token: {token}"
    )
}

/// A kubectl invocation context. The kubeconfig lives in a temporary file
/// removed on drop.
pub struct Kubectl {
    program: PathBuf,
    kubeconfig: NamedTempFile,
    namespace: String,
}

impl Kubectl {
    pub fn new(endpoint: &str, token: &str, namespace: &str) -> Result<Self> {
        let mut file = NamedTempFile::new()?;
        std::io::Write::write_all(&mut file, kubeconfig(endpoint, token).as_bytes())?;
        Ok(Self {
            program: PathBuf::from("kubectl"),
            kubeconfig: file,
            namespace: namespace.to_string(),
        })
    }

    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn kubeconfig_path(&self) -> &Path {
        self.kubeconfig.path()
    }

    pub async fn apply(&self, name: &str, resource: &serde_yaml::Value) -> Result<()> {
        log::info!("Applying Kubernetes resource {}", name);
        self.run("apply", resource)
            .await
            .map_err(|e| Error::Kubectl(format!("Failed to apply Kubernetes resource {name}: {e}")))
    }

    pub async fn delete(&self, name: &str, resource: &serde_yaml::Value) -> Result<()> {
        log::info!("Deleting Kubernetes resource {}", name);
        self.run("delete", resource)
            .await
            .map_err(|e| Error::Kubectl(format!("Failed to delete Kubernetes resource {name}: {e}")))
    }

    /// Pipes `resource` into `kubectl <verb> -f -`. The error string carries
    /// the exit status and combined output.
    async fn run(&self, verb: &str, resource: &serde_yaml::Value) -> std::result::Result<(), String> {
        let manifest = serde_yaml::to_string(resource).map_err(|e| format!("{e} ()"))?;

        let mut child = Command::new(&self.program)
            .arg("--kubeconfig")
            .arg(self.kubeconfig.path())
            .args(["-n", &self.namespace, verb, "-f", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| format!("{e} ()"))?;

        if let Some(mut stdin) = child.stdin.take() {
            // kubectl may exit before reading everything; its status decides.
            let _ = stdin.write_all(manifest.as_bytes()).await;
        }

        let output = child.wait_with_output().await.map_err(|e| format!("{e} ()"))?;
        if output.status.success() {
            return Ok(());
        }
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Err(format!("{} ({})", output.status, combined.trim_end()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::MockControlPlane;
    use serde_json::json;
    use std::sync::Arc;

    fn manifest() -> serde_yaml::Value {
        serde_yaml::from_str("kind: ConfigMap\nmetadata:\n  name: settings\n").unwrap()
    }

    #[test]
    fn test_cluster_endpoint_replaces_path() {
        let endpoint = cluster_endpoint("https://rancher.example.com/v3", "1c7").unwrap();
        assert_eq!(endpoint, "https://rancher.example.com/k8s/clusters/1c7");
        assert!(cluster_endpoint("not a url", "1c7").is_err());
    }

    #[test]
    fn test_kubeconfig_contents() {
        let kubectl = Kubectl::new("https://h/k8s/clusters/1c1", "secret-token", "ns").unwrap();
        let written = std::fs::read_to_string(kubectl.kubeconfig_path()).unwrap();
        let parsed: serde_yaml::Value = serde_yaml::from_str(&written).unwrap();
        assert_eq!(parsed["current-context"], "rancher-compose-executor");
        assert_eq!(parsed["clusters"][0]["cluster"]["server"], "https://h/k8s/clusters/1c1");
        assert_eq!(parsed["clusters"][0]["cluster"]["insecure-skip-tls-verify"], true);
        assert_eq!(parsed["users"][0]["user"]["token"], "secret-token");
    }

    #[test]
    fn test_kubeconfig_removed_on_drop() {
        let kubectl = Kubectl::new("https://h", "t", "ns").unwrap();
        let path = kubectl.kubeconfig_path().to_path_buf();
        assert!(path.exists());
        drop(kubectl);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_apply_success_and_failure() {
        let ok = Kubectl::new("https://h", "t", "ns").unwrap().with_program("true");
        ok.apply("ConfigMap/settings", &manifest()).await.unwrap();

        let failing = Kubectl::new("https://h", "t", "ns").unwrap().with_program("false");
        let err = failing.apply("ConfigMap/settings", &manifest()).await.unwrap_err();
        assert!(err
            .to_string()
            .starts_with("Failed to apply Kubernetes resource ConfigMap/settings:"));
        let err = failing.delete("ConfigMap/settings", &manifest()).await.unwrap_err();
        assert!(err
            .to_string()
            .starts_with("Failed to delete Kubernetes resource ConfigMap/settings:"));
    }

    #[tokio::test]
    async fn test_namespace_from_account() {
        let mock = Arc::new(MockControlPlane::new());
        mock.insert(ACCOUNT, json!({"id": "1a5", "externalId": "team-a"}));
        let platform = Platform::new(mock);
        let stack = Stack {
            account_id: "1a5".into(),
            ..Stack::default()
        };
        assert_eq!(namespace(&platform, &stack).await.unwrap(), "team-a");

        let orphan = Stack {
            account_id: "1a9".into(),
            ..Stack::default()
        };
        assert!(namespace(&platform, &orphan).await.is_err());
    }
}
