//! Typed control plane resources (camelCase on the wire).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{CONTAINER, PULL_TASK, SERVICE};

pub const TRANSITIONING_YES: &str = "yes";
pub const TRANSITIONING_NO: &str = "no";
pub const TRANSITIONING_ERROR: &str = "error";

fn is_default<T: Default + PartialEq>(value: &T) -> bool {
    *value == T::default()
}

/// A resource the control plane reports transition state for.
pub trait Resource {
    const COLLECTION: &'static str;

    fn id(&self) -> &str;
    fn transitioning(&self) -> &str;
    fn transitioning_message(&self) -> &str;
}

macro_rules! impl_resource {
    ($ty:ty, $collection:expr) => {
        impl Resource for $ty {
            const COLLECTION: &'static str = $collection;

            fn id(&self) -> &str {
                &self.id
            }

            fn transitioning(&self) -> &str {
                &self.transitioning
            }

            fn transitioning_message(&self) -> &str {
                &self.transitioning_message
            }
        }
    };
}

// ── Stack / cluster ─────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Stack {
    #[serde(skip_serializing_if = "is_default")]
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "is_default")]
    pub account_id: String,
    #[serde(skip_serializing_if = "is_default")]
    pub cluster_id: String,
    #[serde(skip_serializing_if = "is_default")]
    pub state: String,
    #[serde(skip_serializing_if = "is_default")]
    pub environment: IndexMap<String, String>,
    /// Compose documents keyed by file name.
    #[serde(skip_serializing_if = "is_default")]
    pub templates: IndexMap<String, String>,
    #[serde(skip_serializing_if = "is_default")]
    pub docker_compose: String,
    #[serde(skip_serializing_if = "is_default")]
    pub rancher_compose: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct K8sClientConfig {
    pub address: String,
    pub bearer_token: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Cluster {
    pub id: String,
    pub name: String,
    pub embedded: bool,
    pub orchestration: String,
    pub k8s_client_config: Option<K8sClientConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub external_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Setting {
    pub id: String,
    pub name: String,
    pub value: String,
}

// ── Launch configuration ────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LogConfig {
    pub driver: String,
    pub config: IndexMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Ulimit {
    pub name: String,
    pub soft: i64,
    pub hard: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RestartPolicy {
    pub name: String,
    #[serde(skip_serializing_if = "is_default")]
    pub maximum_retry_count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SecretReference {
    pub secret_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "is_default")]
    pub uid: String,
    #[serde(skip_serializing_if = "is_default")]
    pub gid: String,
    #[serde(skip_serializing_if = "is_default")]
    pub mode: String,
}

/// How a workload is launched. Also used as a container's config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LaunchConfig {
    #[serde(skip_serializing_if = "is_default")]
    pub name: String,
    #[serde(skip_serializing_if = "is_default")]
    pub image: String,
    #[serde(skip_serializing_if = "is_default")]
    pub kind: String,
    #[serde(skip_serializing_if = "is_default")]
    pub command: Vec<String>,
    #[serde(skip_serializing_if = "is_default")]
    pub entry_point: Vec<String>,
    #[serde(skip_serializing_if = "is_default")]
    pub environment: IndexMap<String, String>,
    #[serde(skip_serializing_if = "is_default")]
    pub labels: IndexMap<String, String>,
    #[serde(skip_serializing_if = "is_default")]
    pub ports: Vec<String>,
    #[serde(skip_serializing_if = "is_default")]
    pub expose: Vec<String>,
    #[serde(skip_serializing_if = "is_default")]
    pub data_volumes: Vec<String>,
    #[serde(skip_serializing_if = "is_default")]
    pub data_volumes_from: Vec<String>,
    #[serde(skip_serializing_if = "is_default")]
    pub devices: Vec<String>,
    #[serde(skip_serializing_if = "is_default")]
    pub dns: Vec<String>,
    #[serde(skip_serializing_if = "is_default")]
    pub dns_opt: Vec<String>,
    #[serde(skip_serializing_if = "is_default")]
    pub dns_search: Vec<String>,
    #[serde(skip_serializing_if = "is_default")]
    pub domain_name: String,
    #[serde(skip_serializing_if = "is_default")]
    pub extra_hosts: Vec<String>,
    #[serde(skip_serializing_if = "is_default")]
    pub group_add: Vec<String>,
    #[serde(skip_serializing_if = "is_default")]
    pub cap_add: Vec<String>,
    #[serde(skip_serializing_if = "is_default")]
    pub cap_drop: Vec<String>,
    #[serde(skip_serializing_if = "is_default")]
    pub cgroup_parent: String,
    #[serde(skip_serializing_if = "is_default")]
    pub cpu_period: i64,
    #[serde(skip_serializing_if = "is_default")]
    pub cpu_quota: i64,
    #[serde(skip_serializing_if = "is_default")]
    pub cpu_set: String,
    #[serde(skip_serializing_if = "is_default")]
    pub cpu_shares: i64,
    #[serde(skip_serializing_if = "is_default")]
    pub health_check: Option<Value>,
    #[serde(skip_serializing_if = "is_default")]
    pub hostname: String,
    #[serde(skip_serializing_if = "is_default")]
    pub ipc_mode: String,
    #[serde(skip_serializing_if = "is_default")]
    pub ipc_container_id: String,
    #[serde(skip_serializing_if = "is_default")]
    pub isolation: String,
    #[serde(skip_serializing_if = "is_default")]
    pub log_config: Option<LogConfig>,
    #[serde(skip_serializing_if = "is_default")]
    pub memory: i64,
    #[serde(skip_serializing_if = "is_default")]
    pub memory_reservation: i64,
    #[serde(skip_serializing_if = "is_default")]
    pub memory_swap: i64,
    #[serde(skip_serializing_if = "is_default")]
    pub memory_swappiness: i64,
    #[serde(skip_serializing_if = "is_default")]
    pub milli_cpu_reservation: i64,
    #[serde(skip_serializing_if = "is_default")]
    pub retain_ip: bool,
    #[serde(skip_serializing_if = "is_default")]
    pub network_mode: String,
    #[serde(skip_serializing_if = "is_default")]
    pub network_container_id: String,
    #[serde(skip_serializing_if = "is_default")]
    pub oom_kill_disable: bool,
    #[serde(skip_serializing_if = "is_default")]
    pub oom_score_adj: i64,
    #[serde(skip_serializing_if = "is_default")]
    pub pid_mode: String,
    #[serde(skip_serializing_if = "is_default")]
    pub pid_container_id: String,
    #[serde(skip_serializing_if = "is_default")]
    pub privileged: bool,
    #[serde(skip_serializing_if = "is_default")]
    pub read_only: bool,
    #[serde(skip_serializing_if = "is_default")]
    pub restart_policy: Option<RestartPolicy>,
    #[serde(skip_serializing_if = "is_default")]
    pub security_opt: Vec<String>,
    #[serde(skip_serializing_if = "is_default")]
    pub shm_size: i64,
    #[serde(skip_serializing_if = "is_default")]
    pub stdin_open: bool,
    #[serde(skip_serializing_if = "is_default")]
    pub stop_signal: String,
    #[serde(skip_serializing_if = "is_default")]
    pub sysctls: IndexMap<String, String>,
    #[serde(skip_serializing_if = "is_default")]
    pub tmpfs: IndexMap<String, String>,
    #[serde(skip_serializing_if = "is_default")]
    pub tty: bool,
    #[serde(skip_serializing_if = "is_default")]
    pub ulimits: Vec<Ulimit>,
    #[serde(skip_serializing_if = "is_default")]
    pub user: String,
    #[serde(skip_serializing_if = "is_default")]
    pub uts: String,
    #[serde(skip_serializing_if = "is_default")]
    pub volume_driver: String,
    #[serde(skip_serializing_if = "is_default")]
    pub working_dir: String,
    #[serde(skip_serializing_if = "is_default")]
    pub blkio_weight: i64,
    /// Throttle settings keyed by device path.
    #[serde(skip_serializing_if = "is_default")]
    pub blkio_device_options: IndexMap<String, IndexMap<String, u64>>,
    #[serde(skip_serializing_if = "is_default")]
    pub secrets: Vec<SecretReference>,
    #[serde(skip_serializing_if = "is_default")]
    pub complete_update: bool,
    #[serde(skip_serializing_if = "is_default")]
    pub force_upgrade: bool,
}

// ── Load balancing ──────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PortRule {
    #[serde(skip_serializing_if = "is_default")]
    pub hostname: String,
    #[serde(skip_serializing_if = "is_default")]
    pub path: String,
    #[serde(skip_serializing_if = "is_default")]
    pub source_port: i64,
    #[serde(skip_serializing_if = "is_default")]
    pub target_port: i64,
    #[serde(skip_serializing_if = "is_default")]
    pub protocol: String,
    #[serde(skip_serializing_if = "is_default")]
    pub priority: i64,
    #[serde(skip_serializing_if = "is_default")]
    pub backend_name: String,
    #[serde(skip_serializing_if = "is_default")]
    pub selector: String,
    #[serde(skip_serializing_if = "is_default")]
    pub service_id: String,
    #[serde(skip_serializing_if = "is_default")]
    pub instance_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StickinessPolicy {
    #[serde(skip_serializing_if = "is_default")]
    pub name: String,
    #[serde(skip_serializing_if = "is_default")]
    pub cookie: String,
    #[serde(skip_serializing_if = "is_default")]
    pub domain: String,
    #[serde(skip_serializing_if = "is_default")]
    pub indirect: bool,
    #[serde(skip_serializing_if = "is_default")]
    pub nocache: bool,
    #[serde(skip_serializing_if = "is_default")]
    pub postonly: bool,
    #[serde(skip_serializing_if = "is_default")]
    pub mode: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LbConfig {
    #[serde(skip_serializing_if = "is_default")]
    pub certificate_ids: Vec<String>,
    #[serde(skip_serializing_if = "is_default")]
    pub default_certificate_id: String,
    #[serde(skip_serializing_if = "is_default")]
    pub config: String,
    #[serde(skip_serializing_if = "is_default")]
    pub port_rules: Vec<PortRule>,
    #[serde(skip_serializing_if = "is_default")]
    pub stickiness_policy: Option<StickinessPolicy>,
}

/// A link to another service, named `stack/service`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServiceLink {
    pub name: String,
    pub alias: String,
}

// ── Workloads ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Service {
    #[serde(skip_serializing_if = "is_default")]
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "is_default")]
    pub state: String,
    #[serde(skip_serializing_if = "is_default")]
    pub transitioning: String,
    #[serde(skip_serializing_if = "is_default")]
    pub transitioning_message: String,
    #[serde(skip_serializing_if = "is_default")]
    pub stack_id: String,
    #[serde(skip_serializing_if = "is_default")]
    pub launch_config: Option<LaunchConfig>,
    #[serde(skip_serializing_if = "is_default")]
    pub secondary_launch_configs: Vec<LaunchConfig>,
    pub scale: i64,
    #[serde(skip_serializing_if = "is_default")]
    pub selector: String,
    #[serde(skip_serializing_if = "is_default")]
    pub service_links: Vec<ServiceLink>,
    #[serde(skip_serializing_if = "is_default")]
    pub lb_config: Option<LbConfig>,
    #[serde(skip_serializing_if = "is_default")]
    pub metadata: IndexMap<String, Value>,
    #[serde(skip_serializing_if = "is_default")]
    pub external_ip_addresses: Vec<String>,
    #[serde(skip_serializing_if = "is_default")]
    pub hostname: String,
    #[serde(skip_serializing_if = "is_default")]
    pub health_check: Option<Value>,
    #[serde(skip_serializing_if = "is_default")]
    pub storage_driver: Option<Value>,
    #[serde(skip_serializing_if = "is_default")]
    pub network_driver: Option<Value>,
    #[serde(skip_serializing_if = "is_default")]
    pub retain_ip: bool,
    #[serde(skip_serializing_if = "is_default")]
    pub scale_min: i64,
    #[serde(skip_serializing_if = "is_default")]
    pub scale_max: i64,
    #[serde(skip_serializing_if = "is_default")]
    pub scale_increment: i64,
    #[serde(skip_serializing_if = "is_default")]
    pub create_only: bool,
    #[serde(skip_serializing_if = "is_default")]
    pub complete_update: bool,
    #[serde(skip_serializing_if = "is_default")]
    pub batch_size: i64,
    #[serde(skip_serializing_if = "is_default")]
    pub interval_millis: i64,
}

impl_resource!(Service, SERVICE);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Container {
    #[serde(skip_serializing_if = "is_default")]
    pub id: String,
    #[serde(skip_serializing_if = "is_default")]
    pub state: String,
    #[serde(skip_serializing_if = "is_default")]
    pub transitioning: String,
    #[serde(skip_serializing_if = "is_default")]
    pub transitioning_message: String,
    #[serde(skip_serializing_if = "is_default")]
    pub stack_id: String,
    #[serde(skip_serializing_if = "is_default")]
    pub desired: bool,
    #[serde(skip_serializing_if = "is_default")]
    pub revision_id: String,
    /// Set when the container belongs to a service.
    #[serde(skip_serializing_if = "is_default")]
    pub service_id: String,
    #[serde(flatten)]
    pub config: LaunchConfig,
}

impl_resource!(Container, CONTAINER);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContainerUpgrade {
    pub config: LaunchConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Revision {
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PullTask {
    #[serde(skip_serializing_if = "is_default")]
    pub id: String,
    pub image: String,
    pub mode: String,
    #[serde(skip_serializing_if = "is_default")]
    pub labels: IndexMap<String, String>,
    /// Pull status keyed by host.
    #[serde(skip_serializing_if = "is_default")]
    pub status: IndexMap<String, Value>,
    #[serde(skip_serializing_if = "is_default")]
    pub transitioning: String,
    #[serde(skip_serializing_if = "is_default")]
    pub transitioning_message: String,
}

impl_resource!(PullTask, PULL_TASK);

// ── Auxiliary resources ─────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Certificate {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Secret {
    #[serde(skip_serializing_if = "is_default")]
    pub id: String,
    pub name: String,
    /// Base64 encoded contents.
    #[serde(skip_serializing_if = "is_default")]
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VolumeTemplate {
    #[serde(skip_serializing_if = "is_default")]
    pub id: String,
    pub name: String,
    pub driver: String,
    pub driver_opts: IndexMap<String, String>,
    pub external: bool,
    pub per_container: bool,
    pub stack_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Host {
    pub id: String,
    pub name: String,
    pub hostname: String,
    pub stack_id: String,
}

/// Reply published back to the control plane for an event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Publish {
    pub name: String,
    pub previous_ids: Vec<String>,
    #[serde(skip_serializing_if = "is_default")]
    pub resource_id: String,
    #[serde(skip_serializing_if = "is_default")]
    pub resource_type: String,
    #[serde(skip_serializing_if = "is_default")]
    pub transitioning: String,
    #[serde(skip_serializing_if = "is_default")]
    pub transitioning_message: String,
    #[serde(skip_serializing_if = "is_default")]
    pub data: Option<Value>,
    pub time: i64,
}
