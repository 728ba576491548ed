//! Export of a deployed stack back into compose documents.
//!
//! [`StackData::fetch`] gathers a stack's workloads and everything they
//! reference from the control plane. [`export`] renders that snapshot as a
//! docker-compose plus rancher-compose pair, or as one combined document.

use std::iter;
use std::str::FromStr;

use corral_compose as compose;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    snake_case_keys, GLOBAL_LABEL, HASH_LABEL, READ_BPS, READ_IOPS, SELECTOR_CONTAINER_LABEL,
    WEIGHT, WRITE_BPS, WRITE_IOPS,
};
use crate::error::{Error, Result};
use crate::platform::{
    Certificate, Container, Filters, LaunchConfig, Platform, PortRule, Secret, Service, Stack,
    StickinessPolicy, VolumeTemplate, CERTIFICATE, CONTAINER, SECRET, SERVICE, VOLUME_TEMPLATE,
};
use crate::project::{COMPOSE_FILE, DOCKER_COMPOSE_FILE, RANCHER_COMPOSE_FILE};

const COMPOSE_VERSION: &str = "2";
const MANAGED_NETWORK: &str = "managed";
const CONTAINER_MODE: &str = "container";
const VIRTUAL_MACHINE: &str = "virtualMachine";

/// Layout of the exported documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Format {
    /// Docker fields and platform fields in separate documents.
    #[default]
    Split,
    /// Everything in one document.
    Combined,
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "split" => Ok(Format::Split),
            "combined" => Ok(Format::Combined),
            other => Err(Error::Config(format!(
                "Unknown export format \"{other}\" (expected split or combined)"
            ))),
        }
    }
}

/// Rendered documents, serialized the way the control plane's export
/// endpoint returns them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Exported {
    Split {
        #[serde(rename = "dockerCompose")]
        docker_compose: String,
        #[serde(rename = "rancherCompose")]
        rancher_compose: String,
    },
    Combined {
        compose: String,
    },
}

impl Exported {
    /// Each document with the file name it is conventionally stored under.
    pub fn files(&self) -> Vec<(&'static str, &str)> {
        match self {
            Exported::Split {
                docker_compose,
                rancher_compose,
            } => vec![
                (DOCKER_COMPOSE_FILE, docker_compose.as_str()),
                (RANCHER_COMPOSE_FILE, rancher_compose.as_str()),
            ],
            Exported::Combined { compose } => vec![(COMPOSE_FILE, compose.as_str())],
        }
    }
}

/// Snapshot of a stack. Every map is keyed by resource id except
/// `volume_templates`, which is keyed by template name.
#[derive(Debug, Clone, Default)]
pub struct StackData {
    pub stack_name: String,
    pub services: IndexMap<String, Service>,
    /// Containers that do not belong to a service.
    pub containers: IndexMap<String, Container>,
    pub volume_templates: IndexMap<String, VolumeTemplate>,
    pub certificates: IndexMap<String, Certificate>,
    pub port_rule_services: IndexMap<String, Service>,
    pub port_rule_containers: IndexMap<String, Container>,
    pub secrets: IndexMap<String, Secret>,
}

async fn required<T: DeserializeOwned>(platform: &Platform, collection: &str, id: &str) -> Result<T> {
    platform
        .by_id(collection, id)
        .await?
        .ok_or_else(|| Error::DependencyNotFound(format!("Failed to find {collection} {id}")))
}

impl StackData {
    pub async fn fetch(platform: &Platform, stack: &Stack) -> Result<Self> {
        let in_stack = Filters::new().with("stackId", &stack.id);
        let mut data = StackData {
            stack_name: stack.name.clone(),
            ..StackData::default()
        };

        for service in platform.list::<Service>(SERVICE, &in_stack).await? {
            data.services.insert(service.id.clone(), service);
        }
        for container in platform.list::<Container>(CONTAINER, &in_stack).await? {
            if container.service_id.is_empty() {
                data.containers.insert(container.id.clone(), container);
            }
        }
        let templates: Vec<VolumeTemplate> = platform
            .list(VOLUME_TEMPLATE, &in_stack.clone().removed_null())
            .await?;
        for template in templates {
            data.volume_templates.insert(template.name.clone(), template);
        }

        for lb in data.services.values().filter_map(|s| s.lb_config.as_ref()) {
            let cert_ids = iter::once(&lb.default_certificate_id)
                .filter(|id| !id.is_empty())
                .chain(&lb.certificate_ids);
            for id in cert_ids {
                if !data.certificates.contains_key(id) {
                    let cert: Certificate = required(platform, CERTIFICATE, id).await?;
                    data.certificates.insert(id.clone(), cert);
                }
            }

            for rule in &lb.port_rules {
                let id = &rule.service_id;
                if !id.is_empty() && !data.port_rule_services.contains_key(id) {
                    let target = match data.services.get(id) {
                        Some(service) => service.clone(),
                        None => required(platform, SERVICE, id).await?,
                    };
                    data.port_rule_services.insert(id.clone(), target);
                }
                let id = &rule.instance_id;
                if !id.is_empty() && !data.port_rule_containers.contains_key(id) {
                    let target = match data.containers.get(id) {
                        Some(container) => container.clone(),
                        None => required(platform, CONTAINER, id).await?,
                    };
                    data.port_rule_containers.insert(id.clone(), target);
                }
            }
        }

        let launch_configs = data
            .services
            .values()
            .flat_map(|s| s.launch_config.iter().chain(&s.secondary_launch_configs))
            .chain(data.containers.values().map(|c| &c.config));
        for reference in launch_configs.flat_map(|lc| &lc.secrets) {
            if !data.secrets.contains_key(&reference.secret_id) {
                let secret: Secret = required(platform, SECRET, &reference.secret_id).await?;
                data.secrets.insert(reference.secret_id.clone(), secret);
            }
        }

        log::debug!(
            "Fetched stack {}: {} services, {} containers, {} secrets",
            data.stack_name,
            data.services.len(),
            data.containers.len(),
            data.secrets.len()
        );
        Ok(data)
    }
}

/// One exported compose document.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct Document {
    version: String,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    services: IndexMap<String, compose::ServiceConfig>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    containers: IndexMap<String, compose::ServiceConfig>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    volumes: IndexMap<String, compose::VolumeConfig>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    secrets: IndexMap<String, compose::SecretConfig>,
}

impl Document {
    fn new() -> Self {
        Document {
            version: COMPOSE_VERSION.to_string(),
            ..Document::default()
        }
    }

    fn render(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Renders a stack snapshot into compose documents.
pub fn export(data: &StackData, format: Format) -> Result<Exported> {
    let mut exporter = Exporter {
        data,
        format,
        docker: Document::new(),
        rancher: Document::new(),
    };
    for service in data.services.values() {
        exporter.add_service(service);
    }
    for container in data.containers.values() {
        exporter.add_container(container);
    }

    Ok(match format {
        Format::Split => Exported::Split {
            docker_compose: exporter.docker.render()?,
            rancher_compose: exporter.rancher.render()?,
        },
        Format::Combined => Exported::Combined {
            compose: exporter.docker.render()?,
        },
    })
}

/// Accumulates both documents. Volumes and secrets always land in the
/// docker document, and in combined mode the platform fields do too.
struct Exporter<'a> {
    data: &'a StackData,
    format: Format,
    docker: Document,
    rancher: Document,
}

impl Exporter<'_> {
    fn add_service(&mut self, service: &Service) {
        let default = LaunchConfig::default();
        let primary = service.launch_config.as_ref().unwrap_or(&default);
        let launch_configs = iter::once(primary).chain(&service.secondary_launch_configs);

        for (index, lc) in launch_configs.enumerate() {
            let name = if lc.name.is_empty() {
                service.name.clone()
            } else {
                lc.name.clone()
            };

            let mut docker = self.docker_config(lc);
            if index == 0 {
                service_docker_fields(&mut docker, service, &self.data.stack_name);
            }
            let mut rancher = compose::ServiceConfig::default();
            let target = match self.format {
                Format::Combined => &mut docker,
                Format::Split => &mut rancher,
            };
            service_rancher_fields(target, service, lc, self.data);

            self.docker.services.insert(name.clone(), docker);
            if self.format == Format::Split {
                self.rancher.services.insert(name, rancher);
            }
        }
    }

    fn add_container(&mut self, container: &Container) {
        let lc = &container.config;
        let mut docker = self.docker_config(lc);
        let mut rancher = compose::ServiceConfig::default();
        let target = match self.format {
            Format::Combined => &mut docker,
            Format::Split => &mut rancher,
        };
        container_rancher_fields(target, lc);

        self.docker.containers.insert(lc.name.clone(), docker);
        if self.format == Format::Split {
            self.rancher.containers.insert(lc.name.clone(), rancher);
        }
    }

    /// Docker fields of `lc`. Named volumes and secrets it uses are declared
    /// at the top of the docker document.
    fn docker_config(&mut self, lc: &LaunchConfig) -> compose::ServiceConfig {
        let mut config = docker_fields(lc);

        for entry in &lc.data_volumes {
            config.volumes.push(entry.clone());
            let parts: Vec<&str> = entry.split(':').collect();
            if parts.len() < 2 || parts[0].starts_with('/') {
                continue;
            }
            let volume = match self.data.volume_templates.get(parts[0]) {
                Some(template) => compose::VolumeConfig {
                    driver: template.driver.clone(),
                    driver_opts: template.driver_opts.clone(),
                    external: template.external,
                    per_container: template.per_container,
                },
                None => compose::VolumeConfig {
                    driver: lc.volume_driver.clone(),
                    external: true,
                    ..compose::VolumeConfig::default()
                },
            };
            self.docker.volumes.insert(parts[0].to_string(), volume);
        }

        for reference in &lc.secrets {
            let Some(secret) = self.data.secrets.get(&reference.secret_id) else {
                log::warn!("Secret {} was not fetched, skipping it", reference.secret_id);
                continue;
            };
            config.secrets.push(compose::SecretReference {
                source: secret.name.clone(),
                target: reference.name.clone(),
                uid: reference.uid.clone(),
                gid: reference.gid.clone(),
                mode: reference.mode.clone(),
            });
            self.docker.secrets.insert(
                secret.name.clone(),
                compose::SecretConfig {
                    external: "true".to_string(),
                    ..compose::SecretConfig::default()
                },
            );
        }

        config
    }
}

/// Joins a `container` mode with the container it refers to. The managed
/// network is the default and is left out.
fn mode(mode: &str, container_id: &str) -> String {
    match mode {
        MANAGED_NETWORK => String::new(),
        CONTAINER_MODE => format!("{CONTAINER_MODE}:{container_id}"),
        other => other.to_string(),
    }
}

fn docker_fields(lc: &LaunchConfig) -> compose::ServiceConfig {
    let mut config = compose::ServiceConfig {
        image: lc.image.clone(),
        command: lc.command.clone(),
        entrypoint: lc.entry_point.clone(),
        ports: lc.ports.clone(),
        expose: lc.expose.clone(),
        volumes_from: lc.data_volumes_from.clone(),
        devices: lc.devices.clone(),
        dns: lc.dns.clone(),
        dns_opt: lc.dns_opt.clone(),
        dns_search: lc.dns_search.clone(),
        domainname: lc.domain_name.clone(),
        extra_hosts: lc.extra_hosts.clone(),
        group_add: lc.group_add.clone(),
        cap_add: lc.cap_add.clone(),
        cap_drop: lc.cap_drop.clone(),
        cgroup_parent: lc.cgroup_parent.clone(),
        cpu_period: lc.cpu_period,
        cpu_quota: lc.cpu_quota,
        cpuset: lc.cpu_set.clone(),
        cpu_shares: lc.cpu_shares,
        hostname: lc.hostname.clone(),
        isolation: lc.isolation.clone(),
        mem_limit: lc.memory,
        mem_reservation: lc.memory_reservation,
        memswap_limit: lc.memory_swap,
        mem_swappiness: lc.memory_swappiness,
        network_mode: mode(&lc.network_mode, &lc.network_container_id),
        pid: mode(&lc.pid_mode, &lc.pid_container_id),
        ipc: mode(&lc.ipc_mode, &lc.ipc_container_id),
        oom_kill_disable: lc.oom_kill_disable,
        oom_score_adj: lc.oom_score_adj,
        privileged: lc.privileged,
        read_only: lc.read_only,
        security_opt: lc.security_opt.clone(),
        shm_size: lc.shm_size,
        stdin_open: lc.stdin_open,
        stop_signal: lc.stop_signal.clone(),
        sysctls: lc.sysctls.clone(),
        tty: lc.tty,
        user: lc.user.clone(),
        uts: lc.uts.clone(),
        volume_driver: lc.volume_driver.clone(),
        working_dir: lc.working_dir.clone(),
        blkio_weight: lc.blkio_weight,
        ..compose::ServiceConfig::default()
    };

    config.labels = lc
        .labels
        .iter()
        .filter(|(k, _)| k.as_str() != HASH_LABEL)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    config.environment = lc
        .environment
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect();
    config.tmpfs = lc
        .tmpfs
        .iter()
        .map(|(path, opts)| {
            if opts.is_empty() {
                path.clone()
            } else {
                format!("{path}:{opts}")
            }
        })
        .collect();
    config.ulimits = lc
        .ulimits
        .iter()
        .map(|u| {
            let ulimit = if u.soft == u.hard {
                compose::Ulimit::Single(u.soft)
            } else {
                compose::Ulimit::Pair {
                    soft: u.soft,
                    hard: u.hard,
                }
            };
            (u.name.clone(), ulimit)
        })
        .collect();
    if let Some(log) = &lc.log_config {
        config.logging = compose::Logging {
            driver: log.driver.clone(),
            options: log.config.clone(),
        };
    }
    if let Some(policy) = &lc.restart_policy {
        config.restart = policy.name.clone();
    }

    for (device, options) in &lc.blkio_device_options {
        for (kind, value) in options {
            let list = match kind.as_str() {
                WEIGHT => &mut config.blkio_weight_device,
                READ_BPS => &mut config.device_read_bps,
                READ_IOPS => &mut config.device_read_iops,
                WRITE_BPS => &mut config.device_write_bps,
                WRITE_IOPS => &mut config.device_write_iops,
                _ => continue,
            };
            list.push(format!("{device}:{value}"));
        }
    }

    config
}

/// Selector label and links, which live on the service rather than on
/// any one launch config.
fn service_docker_fields(config: &mut compose::ServiceConfig, service: &Service, stack_name: &str) {
    if !service.selector.is_empty() {
        config
            .labels
            .insert(SELECTOR_CONTAINER_LABEL.to_string(), service.selector.clone());
    }
    for link in &service.service_links {
        let target = match link.name.split_once('/') {
            Some((stack, name)) if stack == stack_name => name,
            _ => link.name.as_str(),
        };
        config.links.push(if link.alias.is_empty() {
            target.to_string()
        } else {
            format!("{target}:{}", link.alias)
        });
    }
}

/// Reads a camelCase wire section back into its compose form.
fn from_wire<T: DeserializeOwned>(section: &str, value: &Value) -> Option<T> {
    match serde_json::from_value(snake_case_keys(value.clone())) {
        Ok(parsed) => Some(parsed),
        Err(err) => {
            log::warn!("Leaving out unreadable {section}: {err}");
            None
        }
    }
}

fn port_rule(rule: &PortRule, data: &StackData) -> compose::PortRule {
    compose::PortRule {
        hostname: rule.hostname.clone(),
        path: rule.path.clone(),
        source_port: rule.source_port,
        target_port: rule.target_port,
        protocol: rule.protocol.clone(),
        priority: rule.priority,
        backend_name: rule.backend_name.clone(),
        selector: rule.selector.clone(),
        service: data
            .port_rule_services
            .get(&rule.service_id)
            .map(|s| s.name.clone())
            .unwrap_or_default(),
        container: data
            .port_rule_containers
            .get(&rule.instance_id)
            .map(|c| c.config.name.clone())
            .unwrap_or_default(),
    }
}

fn stickiness(policy: &StickinessPolicy) -> compose::StickinessPolicy {
    compose::StickinessPolicy {
        name: policy.name.clone(),
        cookie: policy.cookie.clone(),
        domain: policy.domain.clone(),
        indirect: policy.indirect,
        nocache: policy.nocache,
        postonly: policy.postonly,
        mode: policy.mode.clone(),
    }
}

fn cert_name(data: &StackData, id: &str) -> Option<String> {
    data.certificates.get(id).map(|cert| cert.name.clone())
}

fn service_rancher_fields(
    config: &mut compose::ServiceConfig,
    service: &Service,
    lc: &LaunchConfig,
    data: &StackData,
) {
    config.health_check = service
        .health_check
        .as_ref()
        .or(lc.health_check.as_ref())
        .and_then(|v| from_wire("health check", v));
    config.storage_driver = service
        .storage_driver
        .as_ref()
        .and_then(|v| from_wire("storage driver", v));
    config.network_driver = service
        .network_driver
        .as_ref()
        .and_then(|v| from_wire("network driver", v));
    config.external_ips = service.external_ip_addresses.clone();
    if lc.kind == VIRTUAL_MACHINE {
        config.kind = lc.kind.clone();
    }
    config.metadata = service
        .metadata
        .iter()
        .filter(|(k, _)| k.as_str() != HASH_LABEL)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    config.retain_ip = lc.retain_ip || service.retain_ip;
    config.milli_cpu_reservation = lc.milli_cpu_reservation;

    if let Some(lb) = &service.lb_config {
        config.default_cert = cert_name(data, &lb.default_certificate_id).unwrap_or_default();
        config.certs = lb
            .certificate_ids
            .iter()
            .filter_map(|id| cert_name(data, id))
            .collect();
        config.lb_config = Some(compose::LbConfig {
            certs: config.certs.clone(),
            default_cert: config.default_cert.clone(),
            port_rules: lb.port_rules.iter().map(|r| port_rule(r, data)).collect(),
            config: lb.config.clone(),
            stickiness_policy: lb.stickiness_policy.as_ref().map(stickiness),
        });
    }

    if lc.labels.contains_key(GLOBAL_LABEL) {
        config.scale_min = service.scale_min;
        config.scale_max = service.scale_max;
        config.scale_increment = service.scale_increment;
    } else {
        config.scale = service.scale;
    }
}

fn container_rancher_fields(config: &mut compose::ServiceConfig, lc: &LaunchConfig) {
    config.health_check = lc
        .health_check
        .as_ref()
        .and_then(|v| from_wire("health check", v));
    config.retain_ip = lc.retain_ip;
    config.milli_cpu_reservation = lc.milli_cpu_reservation;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::MockControlPlane;
    use crate::platform::{
        LbConfig, LogConfig, RestartPolicy, SecretReference, ServiceLink, Ulimit,
    };
    use serde_json::json;
    use std::sync::Arc;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn with_service(service: Service) -> StackData {
        let mut data = StackData {
            stack_name: "default".into(),
            ..StackData::default()
        };
        data.services.insert(service.id.clone(), service);
        data
    }

    fn split(data: &StackData) -> (Document, Document) {
        match export(data, Format::Split).unwrap() {
            Exported::Split {
                docker_compose,
                rancher_compose,
            } => (
                serde_yaml::from_str(&docker_compose).unwrap(),
                serde_yaml::from_str(&rancher_compose).unwrap(),
            ),
            other => panic!("expected split output, got {other:?}"),
        }
    }

    fn combined(data: &StackData) -> Document {
        match export(data, Format::Combined).unwrap() {
            Exported::Combined { compose } => serde_yaml::from_str(&compose).unwrap(),
            other => panic!("expected combined output, got {other:?}"),
        }
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("split".parse::<Format>().unwrap(), Format::Split);
        assert_eq!("combined".parse::<Format>().unwrap(), Format::Combined);
        assert!("yaml".parse::<Format>().is_err());
        assert_eq!(Format::default(), Format::Split);
    }

    #[test]
    fn test_export_service_fields() {
        let mut blkio = IndexMap::new();
        blkio.insert(
            "/dev/sda".to_string(),
            IndexMap::from([(READ_IOPS.to_string(), 1000), (WRITE_IOPS.to_string(), 2000)]),
        );
        blkio.insert(
            "/dev/null".to_string(),
            IndexMap::from([
                (READ_BPS.to_string(), 3000),
                (WRITE_BPS.to_string(), 3000),
                (WEIGHT.to_string(), 3000),
            ]),
        );
        let service = Service {
            id: "test".into(),
            name: "strongmonkey".into(),
            launch_config: Some(LaunchConfig {
                image: "strongmonkey/test".into(),
                labels: IndexMap::from([
                    (GLOBAL_LABEL.to_string(), "true".to_string()),
                    (HASH_LABEL.to_string(), "088b54be".to_string()),
                ]),
                cpu_set: "0,1".into(),
                restart_policy: Some(RestartPolicy {
                    name: "on-failure".into(),
                    maximum_retry_count: 2,
                }),
                pid_mode: "host".into(),
                ipc_mode: "host".into(),
                network_mode: MANAGED_NETWORK.into(),
                memory: 1048576,
                memory_swap: 2097152,
                memory_reservation: 4194304,
                milli_cpu_reservation: 1000,
                devices: strings(&["/dev/sdc:/dev/xsdc:rwm"]),
                log_config: Some(LogConfig {
                    driver: "json-file".into(),
                    config: IndexMap::from([("labels".to_string(), "foo".to_string())]),
                }),
                blkio_weight: 100,
                cpu_period: 10000,
                cpu_quota: 20000,
                memory_swappiness: 50,
                oom_score_adj: 500,
                shm_size: 67108864,
                uts: "host".into(),
                tty: true,
                stop_signal: "SIGTERM".into(),
                group_add: strings(&["root"]),
                cgroup_parent: "parent".into(),
                extra_hosts: strings(&["host1", "host2"]),
                security_opt: strings(&["sopt1", "sopt2"]),
                read_only: true,
                oom_kill_disable: true,
                isolation: "hyper-v".into(),
                dns_opt: strings(&["opt"]),
                dns_search: strings(&["192.168.1.1"]),
                cpu_shares: 100,
                blkio_device_options: blkio,
                tmpfs: IndexMap::from([("/run".to_string(), "rw".to_string())]),
                sysctls: IndexMap::from([("net.ipv4.ip_forward".to_string(), "1".to_string())]),
                ulimits: vec![
                    Ulimit {
                        name: "cpu".into(),
                        soft: 1234,
                        hard: 1234,
                    },
                    Ulimit {
                        name: "nproc".into(),
                        soft: 1234,
                        hard: 0,
                    },
                ],
                retain_ip: true,
                ..LaunchConfig::default()
            }),
            service_links: vec![
                ServiceLink {
                    name: "other/link-1".into(),
                    alias: "l1".into(),
                },
                ServiceLink {
                    name: "default/link-2".into(),
                    alias: "l2".into(),
                },
            ],
            metadata: IndexMap::from([
                (HASH_LABEL.to_string(), json!("088b54be")),
                ("$bar".to_string(), json!({"metadata": [{"$id$$foo$bar$$": "${HOSTNAME}"}]})),
            ]),
            scale: 3,
            ..Service::default()
        };

        let (docker, rancher) = split(&with_service(service));
        assert_eq!(docker.version, "2");
        let config = &docker.services["strongmonkey"];
        assert_eq!(config.image, "strongmonkey/test");
        assert_eq!(config.cpuset, "0,1");
        assert_eq!(
            config.labels,
            IndexMap::from([(GLOBAL_LABEL.to_string(), "true".to_string())])
        );
        assert_eq!(config.device_read_iops, ["/dev/sda:1000"]);
        assert_eq!(config.device_write_iops, ["/dev/sda:2000"]);
        assert_eq!(config.blkio_weight_device, ["/dev/null:3000"]);
        assert_eq!(config.device_read_bps, ["/dev/null:3000"]);
        assert_eq!(config.device_write_bps, ["/dev/null:3000"]);
        assert_eq!(config.restart, "on-failure");
        assert_eq!(config.logging.driver, "json-file");
        assert_eq!(config.logging.options["labels"], "foo");
        assert_eq!((config.pid.as_str(), config.ipc.as_str()), ("host", "host"));
        assert_eq!(config.network_mode, "");
        assert_eq!(
            (config.mem_limit, config.memswap_limit, config.mem_reservation),
            (1048576, 2097152, 4194304)
        );
        assert_eq!(config.devices, ["/dev/sdc:/dev/xsdc:rwm"]);
        assert_eq!((config.blkio_weight, config.cpu_shares), (100, 100));
        assert_eq!((config.cpu_period, config.cpu_quota), (10000, 20000));
        assert_eq!((config.mem_swappiness, config.oom_score_adj), (50, 500));
        assert_eq!(config.shm_size, 67108864);
        assert_eq!(config.uts, "host");
        assert!(config.tty && config.read_only && config.oom_kill_disable);
        assert_eq!(config.stop_signal, "SIGTERM");
        assert_eq!(config.group_add, ["root"]);
        assert_eq!(config.cgroup_parent, "parent");
        assert_eq!(config.extra_hosts, ["host1", "host2"]);
        assert_eq!(config.security_opt, ["sopt1", "sopt2"]);
        assert_eq!(config.isolation, "hyper-v");
        assert_eq!(config.dns_opt, ["opt"]);
        assert_eq!(config.dns_search, ["192.168.1.1"]);
        assert_eq!(config.tmpfs, ["/run:rw"]);
        assert_eq!(config.ulimits["cpu"], compose::Ulimit::Single(1234));
        assert_eq!(
            config.ulimits["nproc"],
            compose::Ulimit::Pair {
                soft: 1234,
                hard: 0
            }
        );
        assert_eq!(config.sysctls["net.ipv4.ip_forward"], "1");
        assert_eq!(config.links, ["other/link-1:l1", "link-2:l2"]);
        // platform fields stay out of the docker document
        assert_eq!(config.milli_cpu_reservation, 0);
        assert!(!config.retain_ip);

        assert_eq!(rancher.version, "2");
        let config = &rancher.services["strongmonkey"];
        assert_eq!(config.scale, 0);
        assert_eq!(config.metadata.len(), 1);
        assert!(config.metadata.contains_key("$bar"));
        assert!(config.retain_ip);
        assert_eq!(config.milli_cpu_reservation, 1000);
        assert!(config.image.is_empty());
    }

    #[test]
    fn test_export_load_balancer() {
        let service = Service {
            id: "test".into(),
            name: "strongmonkey".into(),
            launch_config: Some(LaunchConfig::default()),
            lb_config: Some(LbConfig {
                default_certificate_id: "1c1".into(),
                certificate_ids: strings(&["1c2"]),
                config: "config".into(),
                port_rules: vec![PortRule {
                    hostname: "foo".into(),
                    path: "bar".into(),
                    source_port: 32,
                    priority: 10,
                    service_id: "1s2".into(),
                    target_port: 42,
                    backend_name: "myBackend".into(),
                    ..PortRule::default()
                }],
                stickiness_policy: Some(StickinessPolicy {
                    name: "policy2".into(),
                    cookie: "cookie1".into(),
                    domain: ".test.com".into(),
                    indirect: true,
                    nocache: true,
                    postonly: true,
                    mode: "insert".into(),
                }),
            }),
            ..Service::default()
        };
        let mut data = with_service(service);
        data.port_rule_services.insert(
            "1s2".into(),
            Service {
                name: "test".into(),
                ..Service::default()
            },
        );
        for (id, name) in [("1c1", "cert1"), ("1c2", "cert2")] {
            data.certificates.insert(
                id.into(),
                Certificate {
                    id: id.into(),
                    name: name.into(),
                },
            );
        }

        let (_, rancher) = split(&data);
        let lb = rancher.services["strongmonkey"].lb_config.clone().unwrap();
        assert_eq!(
            lb.port_rules,
            [compose::PortRule {
                hostname: "foo".into(),
                path: "bar".into(),
                source_port: 32,
                priority: 10,
                service: "test".into(),
                target_port: 42,
                backend_name: "myBackend".into(),
                ..compose::PortRule::default()
            }]
        );
        assert_eq!(lb.config, "config");
        assert_eq!(lb.default_cert, "cert1");
        assert_eq!(lb.certs, ["cert2"]);
        assert_eq!(
            lb.stickiness_policy,
            Some(compose::StickinessPolicy {
                name: "policy2".into(),
                cookie: "cookie1".into(),
                domain: ".test.com".into(),
                indirect: true,
                nocache: true,
                postonly: true,
                mode: "insert".into(),
            })
        );
    }

    #[test]
    fn test_export_secrets() {
        let service = Service {
            id: "test".into(),
            name: "strongmonkey".into(),
            launch_config: Some(LaunchConfig {
                secrets: vec![
                    SecretReference {
                        secret_id: "1s1".into(),
                        name: "my_secret1".into(),
                        ..SecretReference::default()
                    },
                    SecretReference {
                        secret_id: "1s2".into(),
                        name: "my_secret2".into(),
                        mode: "444".into(),
                        uid: "0".into(),
                        gid: "0".into(),
                    },
                ],
                ..LaunchConfig::default()
            }),
            ..Service::default()
        };
        let mut data = with_service(service);
        for (id, name) in [("1s1", "secret1"), ("1s2", "secret2")] {
            data.secrets.insert(
                id.into(),
                Secret {
                    id: id.into(),
                    name: name.into(),
                    ..Secret::default()
                },
            );
        }

        let (docker, _) = split(&data);
        assert_eq!(docker.secrets["secret1"].external, "true");
        assert_eq!(docker.secrets["secret2"].external, "true");
        assert_eq!(
            docker.services["strongmonkey"].secrets,
            [
                compose::SecretReference {
                    source: "secret1".into(),
                    target: "my_secret1".into(),
                    ..compose::SecretReference::default()
                },
                compose::SecretReference {
                    source: "secret2".into(),
                    target: "my_secret2".into(),
                    uid: "0".into(),
                    gid: "0".into(),
                    mode: "444".into(),
                },
            ]
        );
    }

    #[test]
    fn test_export_volumes() {
        let service = Service {
            id: "test".into(),
            name: "strongmonkey".into(),
            launch_config: Some(LaunchConfig {
                data_volumes: strings(&["foo:/data", "/host:/mnt:ro", "bar:/cache"]),
                volume_driver: "local".into(),
                ..LaunchConfig::default()
            }),
            ..Service::default()
        };
        let mut data = with_service(service);
        data.volume_templates.insert(
            "foo".into(),
            VolumeTemplate {
                name: "foo".into(),
                driver: "nfs".into(),
                driver_opts: IndexMap::from([("size".to_string(), "1".to_string())]),
                per_container: true,
                ..VolumeTemplate::default()
            },
        );

        let (docker, _) = split(&data);
        let foo = &docker.volumes["foo"];
        assert!(foo.per_container);
        assert_eq!(foo.driver, "nfs");
        assert_eq!(foo.driver_opts["size"], "1");
        assert!(!foo.external);

        let bar = &docker.volumes["bar"];
        assert_eq!(bar.driver, "local");
        assert!(bar.external);

        assert_eq!(docker.volumes.len(), 2);
        assert_eq!(
            docker.services["strongmonkey"].volumes,
            ["foo:/data", "/host:/mnt:ro", "bar:/cache"]
        );
    }

    #[test]
    fn test_export_combined() {
        let data = with_service(Service {
            id: "test".into(),
            name: "strongmonkey".into(),
            scale: 2,
            launch_config: Some(LaunchConfig {
                image: "strongmonkey/test".into(),
                retain_ip: true,
                ..LaunchConfig::default()
            }),
            secondary_launch_configs: vec![LaunchConfig {
                name: "helper".into(),
                image: "busybox".into(),
                ..LaunchConfig::default()
            }],
            ..Service::default()
        });

        let document = combined(&data);
        let config = &document.services["strongmonkey"];
        assert_eq!(config.image, "strongmonkey/test");
        assert!(config.retain_ip);
        assert_eq!(config.scale, 2);
        assert_eq!(document.services["helper"].image, "busybox");
    }

    #[test]
    fn test_export_standalone_container() {
        let mut data = StackData::default();
        data.containers.insert(
            "test".into(),
            Container {
                id: "test".into(),
                config: LaunchConfig {
                    name: "strongmonkey".into(),
                    image: "strongmonkey/test".into(),
                    retain_ip: true,
                    network_mode: CONTAINER_MODE.into(),
                    network_container_id: "1i9".into(),
                    ..LaunchConfig::default()
                },
                ..Container::default()
            },
        );

        let document = combined(&data);
        let config = &document.containers["strongmonkey"];
        assert_eq!(config.image, "strongmonkey/test");
        assert!(config.retain_ip);
        assert_eq!(config.network_mode, "container:1i9");
        assert!(document.services.is_empty());
    }

    #[test]
    fn test_exported_files() {
        let exported = Exported::Split {
            docker_compose: "a".into(),
            rancher_compose: "b".into(),
        };
        assert_eq!(
            exported.files(),
            [(DOCKER_COMPOSE_FILE, "a"), (RANCHER_COMPOSE_FILE, "b")]
        );
        assert_eq!(
            serde_json::to_value(&exported).unwrap(),
            json!({"dockerCompose": "a", "rancherCompose": "b"})
        );
        let exported = Exported::Combined {
            compose: "c".into(),
        };
        assert_eq!(exported.files(), [(COMPOSE_FILE, "c")]);
    }

    #[tokio::test]
    async fn test_fetch_collects_references() {
        let mock = Arc::new(MockControlPlane::new());
        mock.insert(
            SERVICE,
            json!({
                "id": "1s1",
                "name": "lb",
                "stackId": "1st1",
                "launchConfig": {"secrets": [{"secretId": "1se1", "name": "key"}]},
                "lbConfig": {
                    "defaultCertificateId": "1c1",
                    "portRules": [
                        {"sourcePort": 80, "serviceId": "1s2"},
                        {"sourcePort": 81, "serviceId": "1s9"},
                        {"sourcePort": 82, "instanceId": "1i1"}
                    ]
                }
            }),
        );
        mock.insert(SERVICE, json!({"id": "1s2", "name": "web", "stackId": "1st1"}));
        mock.insert(SERVICE, json!({"id": "1s9", "name": "api", "stackId": "1st2"}));
        mock.insert(SERVICE, json!({"id": "1s3", "name": "elsewhere", "stackId": "1st2"}));
        mock.insert(CONTAINER, json!({"id": "1i1", "name": "job", "stackId": "1st1"}));
        mock.insert(
            CONTAINER,
            json!({"id": "1i2", "name": "web-1", "stackId": "1st1", "serviceId": "1s2"}),
        );
        mock.insert(
            VOLUME_TEMPLATE,
            json!({"id": "1v1", "name": "data", "driver": "nfs", "stackId": "1st1"}),
        );
        mock.insert(
            VOLUME_TEMPLATE,
            json!({"id": "1v2", "name": "old", "stackId": "1st1", "removed": "2020-01-01"}),
        );
        mock.insert(CERTIFICATE, json!({"id": "1c1", "name": "site"}));
        mock.insert(SECRET, json!({"id": "1se1", "name": "api-key"}));

        let stack = Stack {
            id: "1st1".into(),
            name: "demo".into(),
            ..Stack::default()
        };
        let data = StackData::fetch(&Platform::new(mock), &stack).await.unwrap();
        assert_eq!(data.stack_name, "demo");
        assert_eq!(data.services.keys().collect::<Vec<_>>(), ["1s1", "1s2"]);
        assert_eq!(data.containers.keys().collect::<Vec<_>>(), ["1i1"]);
        assert_eq!(data.volume_templates.keys().collect::<Vec<_>>(), ["data"]);
        assert_eq!(data.certificates["1c1"].name, "site");
        assert_eq!(data.port_rule_services["1s2"].name, "web");
        assert_eq!(data.port_rule_services["1s9"].name, "api");
        assert_eq!(data.port_rule_containers["1i1"].config.name, "job");
        assert_eq!(data.secrets["1se1"].name, "api-key");
    }

    #[tokio::test]
    async fn test_fetch_missing_certificate() {
        let mock = Arc::new(MockControlPlane::new());
        mock.insert(
            SERVICE,
            json!({
                "id": "1s1",
                "name": "lb",
                "stackId": "1st1",
                "lbConfig": {"certificateIds": ["1c7"]}
            }),
        );
        let stack = Stack {
            id: "1st1".into(),
            ..Stack::default()
        };
        let err = StackData::fetch(&Platform::new(mock), &stack)
            .await
            .unwrap_err();
        assert!(err.is_dependency_not_found());
        assert_eq!(err.to_string(), "Failed to find certificate 1c7");
    }
}
