//! Typed stack model.
//!
//! Every record here is produced from a raw field map after merging and
//! serializes back into the same field names, so the merge engine can
//! round-trip a resolved [`ServiceConfig`] through an untyped map.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};

use crate::de;

/// Label listing a service's sidekicks.
pub const SIDEKICKS_LABEL: &str = "io.rancher.sidekicks";

// ── Service ────────────────────────────────────────────────────────

/// A resolved service or container descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    // Docker fields
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<Build>,
    #[serde(deserialize_with = "de::string_or_list", skip_serializing_if = "Vec::is_empty")]
    pub cap_add: Vec<String>,
    #[serde(deserialize_with = "de::string_or_list", skip_serializing_if = "Vec::is_empty")]
    pub cap_drop: Vec<String>,
    #[serde(deserialize_with = "de::string", skip_serializing_if = "String::is_empty")]
    pub cgroup_parent: String,
    #[serde(deserialize_with = "de::command", skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(deserialize_with = "de::string", skip_serializing_if = "String::is_empty")]
    pub container_name: String,
    #[serde(deserialize_with = "de::lenient_i64", skip_serializing_if = "de::is_zero")]
    pub cpu_period: i64,
    #[serde(deserialize_with = "de::lenient_i64", skip_serializing_if = "de::is_zero")]
    pub cpu_quota: i64,
    #[serde(deserialize_with = "de::string", skip_serializing_if = "String::is_empty")]
    pub cpuset: String,
    #[serde(deserialize_with = "de::lenient_i64", skip_serializing_if = "de::is_zero")]
    pub cpu_shares: i64,
    #[serde(deserialize_with = "de::string_or_list", skip_serializing_if = "Vec::is_empty")]
    pub devices: Vec<String>,
    #[serde(deserialize_with = "de::string_or_list", skip_serializing_if = "Vec::is_empty")]
    pub dns: Vec<String>,
    #[serde(deserialize_with = "de::string_or_list", skip_serializing_if = "Vec::is_empty")]
    pub dns_opt: Vec<String>,
    #[serde(deserialize_with = "de::string_or_list", skip_serializing_if = "Vec::is_empty")]
    pub dns_search: Vec<String>,
    #[serde(deserialize_with = "de::string", skip_serializing_if = "String::is_empty")]
    pub domainname: String,
    #[serde(deserialize_with = "de::command", skip_serializing_if = "Vec::is_empty")]
    pub entrypoint: Vec<String>,
    #[serde(deserialize_with = "de::map_or_equal_list", skip_serializing_if = "Vec::is_empty")]
    pub environment: Vec<String>,
    #[serde(deserialize_with = "de::string_or_list", skip_serializing_if = "Vec::is_empty")]
    pub expose: Vec<String>,
    #[serde(deserialize_with = "de::string_or_list", skip_serializing_if = "Vec::is_empty")]
    pub external_links: Vec<String>,
    #[serde(deserialize_with = "de::string_or_list", skip_serializing_if = "Vec::is_empty")]
    pub extra_hosts: Vec<String>,
    #[serde(deserialize_with = "de::string_or_list", skip_serializing_if = "Vec::is_empty")]
    pub group_add: Vec<String>,
    #[serde(deserialize_with = "de::string", skip_serializing_if = "String::is_empty")]
    pub hostname: String,
    #[serde(deserialize_with = "de::string", skip_serializing_if = "String::is_empty")]
    pub image: String,
    #[serde(deserialize_with = "de::string", skip_serializing_if = "String::is_empty")]
    pub ipc: String,
    #[serde(deserialize_with = "de::string", skip_serializing_if = "String::is_empty")]
    pub isolation: String,
    #[serde(deserialize_with = "de::string", skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(deserialize_with = "de::list_or_map", skip_serializing_if = "IndexMap::is_empty")]
    pub labels: IndexMap<String, String>,
    #[serde(deserialize_with = "de::string_or_list", skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<String>,
    #[serde(skip_serializing_if = "Logging::is_empty")]
    pub logging: Logging,
    #[serde(deserialize_with = "de::mem_size", skip_serializing_if = "de::is_zero")]
    pub mem_limit: i64,
    #[serde(deserialize_with = "de::mem_size", skip_serializing_if = "de::is_zero")]
    pub mem_reservation: i64,
    #[serde(deserialize_with = "de::mem_size", skip_serializing_if = "de::is_zero")]
    pub memswap_limit: i64,
    #[serde(deserialize_with = "de::lenient_i64", skip_serializing_if = "de::is_zero")]
    pub mem_swappiness: i64,
    #[serde(deserialize_with = "de::string", skip_serializing_if = "String::is_empty")]
    pub network_mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub networks: Option<serde_yaml::Value>,
    #[serde(deserialize_with = "de::lenient_bool", skip_serializing_if = "de::is_false")]
    pub oom_kill_disable: bool,
    #[serde(deserialize_with = "de::lenient_i64", skip_serializing_if = "de::is_zero")]
    pub oom_score_adj: i64,
    #[serde(deserialize_with = "de::string", skip_serializing_if = "String::is_empty")]
    pub pid: String,
    #[serde(deserialize_with = "de::string_or_list", skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
    #[serde(deserialize_with = "de::lenient_bool", skip_serializing_if = "de::is_false")]
    pub privileged: bool,
    #[serde(deserialize_with = "de::lenient_bool", skip_serializing_if = "de::is_false")]
    pub read_only: bool,
    #[serde(deserialize_with = "de::string", skip_serializing_if = "String::is_empty")]
    pub restart: String,
    #[serde(deserialize_with = "de::string_or_list", skip_serializing_if = "Vec::is_empty")]
    pub security_opt: Vec<String>,
    #[serde(deserialize_with = "de::mem_size", skip_serializing_if = "de::is_zero")]
    pub shm_size: i64,
    #[serde(deserialize_with = "de::lenient_bool", skip_serializing_if = "de::is_false")]
    pub stdin_open: bool,
    #[serde(deserialize_with = "de::string", skip_serializing_if = "String::is_empty")]
    pub stop_signal: String,
    #[serde(deserialize_with = "de::list_or_map", skip_serializing_if = "IndexMap::is_empty")]
    pub sysctls: IndexMap<String, String>,
    #[serde(deserialize_with = "de::string_or_list", skip_serializing_if = "Vec::is_empty")]
    pub tmpfs: Vec<String>,
    #[serde(deserialize_with = "de::lenient_bool", skip_serializing_if = "de::is_false")]
    pub tty: bool,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub ulimits: IndexMap<String, Ulimit>,
    #[serde(deserialize_with = "de::string", skip_serializing_if = "String::is_empty")]
    pub user: String,
    #[serde(deserialize_with = "de::string", skip_serializing_if = "String::is_empty")]
    pub uts: String,
    #[serde(deserialize_with = "de::string", skip_serializing_if = "String::is_empty")]
    pub volume_driver: String,
    #[serde(deserialize_with = "de::string_or_list", skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,
    #[serde(deserialize_with = "de::string_or_list", skip_serializing_if = "Vec::is_empty")]
    pub volumes_from: Vec<String>,
    #[serde(deserialize_with = "de::string", skip_serializing_if = "String::is_empty")]
    pub working_dir: String,

    // Block I/O
    #[serde(deserialize_with = "de::lenient_i64", skip_serializing_if = "de::is_zero")]
    pub blkio_weight: i64,
    #[serde(deserialize_with = "de::map_or_colon_list", skip_serializing_if = "Vec::is_empty")]
    pub blkio_weight_device: Vec<String>,
    #[serde(deserialize_with = "de::map_or_colon_list", skip_serializing_if = "Vec::is_empty")]
    pub device_read_bps: Vec<String>,
    #[serde(deserialize_with = "de::map_or_colon_list", skip_serializing_if = "Vec::is_empty")]
    pub device_read_iops: Vec<String>,
    #[serde(deserialize_with = "de::map_or_colon_list", skip_serializing_if = "Vec::is_empty")]
    pub device_write_bps: Vec<String>,
    #[serde(deserialize_with = "de::map_or_colon_list", skip_serializing_if = "Vec::is_empty")]
    pub device_write_iops: Vec<String>,

    // Platform fields
    #[serde(deserialize_with = "de::lenient_i64", skip_serializing_if = "de::is_zero")]
    pub scale: i64,
    #[serde(deserialize_with = "de::lenient_i64", skip_serializing_if = "de::is_zero")]
    pub scale_min: i64,
    #[serde(deserialize_with = "de::lenient_i64", skip_serializing_if = "de::is_zero")]
    pub scale_max: i64,
    #[serde(deserialize_with = "de::lenient_i64", skip_serializing_if = "de::is_zero")]
    pub scale_increment: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_check: Option<HealthCheck>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub metadata: IndexMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_driver: Option<StorageDriver>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_driver: Option<NetworkDriver>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lb_config: Option<LbConfig>,
    #[serde(
        rename = "load_balancer_config",
        skip_serializing_if = "Option::is_none"
    )]
    pub legacy_load_balancer_config: Option<LegacyLoadBalancerConfig>,
    #[serde(deserialize_with = "secret_references", skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<SecretReference>,
    #[serde(deserialize_with = "de::lenient_bool", skip_serializing_if = "de::is_false")]
    pub retain_ip: bool,
    #[serde(deserialize_with = "de::lenient_i64", skip_serializing_if = "de::is_zero")]
    pub milli_cpu_reservation: i64,
    #[serde(deserialize_with = "de::mem_size", skip_serializing_if = "de::is_zero")]
    pub memory_reservation: i64,
    #[serde(deserialize_with = "de::string_or_list", skip_serializing_if = "Vec::is_empty")]
    pub external_ips: Vec<String>,
    #[serde(deserialize_with = "de::string", skip_serializing_if = "String::is_empty")]
    pub default_cert: String,
    #[serde(deserialize_with = "de::string_or_list", skip_serializing_if = "Vec::is_empty")]
    pub certs: Vec<String>,
}

impl ServiceConfig {
    /// Sidekick names declared through the sidekicks label.
    pub fn sidekicks(&self) -> Vec<String> {
        self.labels
            .get(SIDEKICKS_LABEL)
            .map(|value| {
                value
                    .trim()
                    .split(',')
                    .map(|part| part.trim().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }
}

// ── Build / logging / ulimits ──────────────────────────────────────

/// Build instructions; a bare string is the build context.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Build {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub context: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub dockerfile: String,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub args: IndexMap<String, String>,
}

impl<'de> Deserialize<'de> for Build {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Default, Deserialize)]
        #[serde(default)]
        struct Full {
            #[serde(deserialize_with = "de::string")]
            context: String,
            #[serde(deserialize_with = "de::string")]
            dockerfile: String,
            #[serde(deserialize_with = "de::list_or_map")]
            args: IndexMap<String, String>,
        }

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Context(String),
            Full(Full),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Context(context) => Build {
                context,
                ..Build::default()
            },
            Repr::Full(full) => Build {
                context: full.context,
                dockerfile: full.dockerfile,
                args: full.args,
            },
        })
    }
}

/// Logging driver and its options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    #[serde(deserialize_with = "de::string", skip_serializing_if = "String::is_empty")]
    pub driver: String,
    #[serde(deserialize_with = "de::list_or_map", skip_serializing_if = "IndexMap::is_empty")]
    pub options: IndexMap<String, String>,
}

impl Logging {
    pub fn is_empty(&self) -> bool {
        self.driver.is_empty() && self.options.is_empty()
    }
}

/// A ulimit is either a single value (soft = hard) or a soft/hard pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Ulimit {
    Single(i64),
    Pair { soft: i64, hard: i64 },
}

impl Ulimit {
    pub fn soft(&self) -> i64 {
        match self {
            Ulimit::Single(v) => *v,
            Ulimit::Pair { soft, .. } => *soft,
        }
    }

    pub fn hard(&self) -> i64 {
        match self {
            Ulimit::Single(v) => *v,
            Ulimit::Pair { hard, .. } => *hard,
        }
    }
}

// ── Platform sections ──────────────────────────────────────────────

/// Health check settings passed through to the platform.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheck {
    #[serde(deserialize_with = "de::lenient_i64", skip_serializing_if = "de::is_zero")]
    pub port: i64,
    #[serde(deserialize_with = "de::lenient_i64", skip_serializing_if = "de::is_zero")]
    pub interval: i64,
    #[serde(deserialize_with = "de::lenient_i64", skip_serializing_if = "de::is_zero")]
    pub initializing_timeout: i64,
    #[serde(deserialize_with = "de::lenient_i64", skip_serializing_if = "de::is_zero")]
    pub reinitializing_timeout: i64,
    #[serde(deserialize_with = "de::lenient_i64", skip_serializing_if = "de::is_zero")]
    pub unhealthy_threshold: i64,
    #[serde(deserialize_with = "de::lenient_i64", skip_serializing_if = "de::is_zero")]
    pub healthy_threshold: i64,
    #[serde(deserialize_with = "de::lenient_i64", skip_serializing_if = "de::is_zero")]
    pub response_timeout: i64,
    #[serde(deserialize_with = "de::string", skip_serializing_if = "String::is_empty")]
    pub request_line: String,
    #[serde(deserialize_with = "de::string", skip_serializing_if = "String::is_empty")]
    pub strategy: String,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub recreate_on_quorum_strategy_config: IndexMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageDriver {
    #[serde(deserialize_with = "de::string", skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(deserialize_with = "de::string", skip_serializing_if = "String::is_empty")]
    pub scope: String,
    #[serde(deserialize_with = "de::string", skip_serializing_if = "String::is_empty")]
    pub volume_access_mode: String,
    #[serde(deserialize_with = "de::string", skip_serializing_if = "String::is_empty")]
    pub block_device_path: String,
    #[serde(deserialize_with = "de::string_or_list", skip_serializing_if = "Vec::is_empty")]
    pub volume_capabilities: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkDriver {
    #[serde(deserialize_with = "de::string", skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_network: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_metadata: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cni_config: Option<serde_json::Value>,
}

/// Load balancer configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LbConfig {
    #[serde(deserialize_with = "de::string_or_list", skip_serializing_if = "Vec::is_empty")]
    pub certs: Vec<String>,
    #[serde(deserialize_with = "de::string", skip_serializing_if = "String::is_empty")]
    pub default_cert: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub port_rules: Vec<PortRule>,
    #[serde(deserialize_with = "de::string", skip_serializing_if = "String::is_empty")]
    pub config: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stickiness_policy: Option<StickinessPolicy>,
}

/// One routing entry of a load balancer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortRule {
    #[serde(deserialize_with = "de::string", skip_serializing_if = "String::is_empty")]
    pub hostname: String,
    #[serde(deserialize_with = "de::string", skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(deserialize_with = "de::lenient_i64", skip_serializing_if = "de::is_zero")]
    pub source_port: i64,
    #[serde(deserialize_with = "de::lenient_i64", skip_serializing_if = "de::is_zero")]
    pub target_port: i64,
    #[serde(deserialize_with = "de::string", skip_serializing_if = "String::is_empty")]
    pub protocol: String,
    #[serde(deserialize_with = "de::lenient_i64", skip_serializing_if = "de::is_zero")]
    pub priority: i64,
    #[serde(deserialize_with = "de::string", skip_serializing_if = "String::is_empty")]
    pub backend_name: String,
    #[serde(deserialize_with = "de::string", skip_serializing_if = "String::is_empty")]
    pub selector: String,
    #[serde(deserialize_with = "de::string", skip_serializing_if = "String::is_empty")]
    pub service: String,
    #[serde(deserialize_with = "de::string", skip_serializing_if = "String::is_empty")]
    pub container: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StickinessPolicy {
    #[serde(deserialize_with = "de::string", skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(deserialize_with = "de::string", skip_serializing_if = "String::is_empty")]
    pub cookie: String,
    #[serde(deserialize_with = "de::string", skip_serializing_if = "String::is_empty")]
    pub domain: String,
    #[serde(deserialize_with = "de::lenient_bool", skip_serializing_if = "de::is_false")]
    pub indirect: bool,
    #[serde(deserialize_with = "de::lenient_bool", skip_serializing_if = "de::is_false")]
    pub nocache: bool,
    #[serde(deserialize_with = "de::lenient_bool", skip_serializing_if = "de::is_false")]
    pub postonly: bool,
    #[serde(deserialize_with = "de::string", skip_serializing_if = "String::is_empty")]
    pub mode: String,
}

/// Load balancer settings written for the legacy LB image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LegacyLoadBalancerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub haproxy_config: Option<HaproxyConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lb_cookie_stickiness_policy: Option<StickinessPolicy>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HaproxyConfig {
    #[serde(deserialize_with = "de::string", skip_serializing_if = "String::is_empty")]
    pub global: String,
    #[serde(deserialize_with = "de::string", skip_serializing_if = "String::is_empty")]
    pub defaults: String,
}

/// A secret mounted into a service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretReference {
    #[serde(deserialize_with = "de::string", skip_serializing_if = "String::is_empty")]
    pub source: String,
    #[serde(deserialize_with = "de::string", skip_serializing_if = "String::is_empty")]
    pub target: String,
    #[serde(deserialize_with = "de::string", skip_serializing_if = "String::is_empty")]
    pub uid: String,
    #[serde(deserialize_with = "de::string", skip_serializing_if = "String::is_empty")]
    pub gid: String,
    #[serde(deserialize_with = "de::string", skip_serializing_if = "String::is_empty")]
    pub mode: String,
}

/// Secrets are a list of names or of full references.
fn secret_references<'de, D>(deserializer: D) -> Result<Vec<SecretReference>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Entry {
        Name(String),
        Full(SecretReference),
    }

    let entries = Option::<Vec<Entry>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(entries
        .into_iter()
        .map(|entry| match entry {
            Entry::Name(name) => SecretReference {
                source: name.clone(),
                target: name,
                ..SecretReference::default()
            },
            Entry::Full(mut reference) => {
                if reference.target.is_empty() {
                    reference.target = reference.source.clone();
                }
                reference
            }
        })
        .collect())
}

// ── Stack-level sections ───────────────────────────────────────────

/// A catalog template the stack depends on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DependencyConfig {
    #[serde(deserialize_with = "de::string")]
    pub template: String,
    #[serde(deserialize_with = "de::string")]
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeConfig {
    #[serde(deserialize_with = "de::string", skip_serializing_if = "String::is_empty")]
    pub driver: String,
    #[serde(deserialize_with = "de::list_or_map", skip_serializing_if = "IndexMap::is_empty")]
    pub driver_opts: IndexMap<String, String>,
    #[serde(deserialize_with = "external", skip_serializing_if = "de::is_false")]
    pub external: bool,
    #[serde(deserialize_with = "de::lenient_bool", skip_serializing_if = "de::is_false")]
    pub per_container: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    #[serde(deserialize_with = "de::string")]
    pub driver: String,
    #[serde(deserialize_with = "de::list_or_map")]
    pub driver_opts: IndexMap<String, String>,
    #[serde(deserialize_with = "external")]
    pub external: bool,
}

/// `external` is a bool or a map naming the external resource.
fn external<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_yaml::Value::deserialize(deserializer)? {
        serde_yaml::Value::Mapping(_) => Ok(true),
        other => de::lenient_bool(other).map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretConfig {
    #[serde(deserialize_with = "de::string", skip_serializing_if = "String::is_empty")]
    pub file: String,
    #[serde(deserialize_with = "de::string", skip_serializing_if = "String::is_empty")]
    pub external: String,
}

/// Hosts to provision: a count plus arbitrary host creation fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    #[serde(deserialize_with = "de::lenient_i64")]
    pub count: i64,
    #[serde(flatten)]
    pub dynamic: IndexMap<String, serde_json::Value>,
}
