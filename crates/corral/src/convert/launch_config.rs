use corral_compose::ServiceConfig;
use indexmap::IndexMap;

use super::{
    to_wire, HASH_LABEL, LB_IMAGE_SETTING, LB_LABEL_PREFIX, LEGACY_LB_IMAGE, READ_BPS, READ_IOPS,
    SELECTOR_LABEL_PREFIX, WEIGHT, WRITE_BPS, WRITE_IOPS,
};
use crate::error::{Error, Result};
use crate::platform::{
    Filters, LaunchConfig, LogConfig, RestartPolicy, Secret, SecretReference, Setting, Ulimit,
    SECRET, SETTING,
};
use crate::project::Project;

const CONTAINER_REF_PREFIX: &str = "container:";

fn strip_platform_labels(labels: &IndexMap<String, String>) -> IndexMap<String, String> {
    labels
        .iter()
        .filter(|(k, _)| {
            !k.starts_with(LB_LABEL_PREFIX)
                && !k.starts_with(SELECTOR_LABEL_PREFIX)
                && k.as_str() != HASH_LABEL
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn environment(entries: &[String]) -> IndexMap<String, String> {
    entries
        .iter()
        .map(|entry| match entry.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (entry.clone(), String::new()),
        })
        .collect()
}

fn devices(devices: &[String]) -> Vec<String> {
    devices
        .iter()
        .map(|d| {
            if d.splitn(3, ':').count() == 2 {
                format!("{d}:rwm")
            } else {
                d.clone()
            }
        })
        .collect()
}

fn tmpfs(entries: &[String]) -> IndexMap<String, String> {
    entries
        .iter()
        .map(|entry| match entry.split_once(':') {
            Some((path, opts)) => (path.to_string(), opts.to_string()),
            None => (entry.clone(), String::new()),
        })
        .collect()
}

fn throttle(
    options: &mut IndexMap<String, IndexMap<String, u64>>,
    entries: &[String],
    key: &str,
) -> Result<()> {
    for entry in entries {
        let (path, rate) = entry
            .split_once(':')
            .ok_or_else(|| Error::Config(format!("Invalid device rate \"{entry}\"")))?;
        let rate: u64 = rate
            .parse()
            .map_err(|_| Error::Config(format!("Invalid device rate \"{entry}\"")))?;
        options
            .entry(path.to_string())
            .or_default()
            .insert(key.to_string(), rate);
    }
    Ok(())
}

fn blkio_options(config: &ServiceConfig) -> Result<IndexMap<String, IndexMap<String, u64>>> {
    let mut options = IndexMap::new();
    throttle(&mut options, &config.device_read_bps, READ_BPS)?;
    throttle(&mut options, &config.device_read_iops, READ_IOPS)?;
    throttle(&mut options, &config.device_write_bps, WRITE_BPS)?;
    throttle(&mut options, &config.device_write_iops, WRITE_IOPS)?;
    throttle(&mut options, &config.blkio_weight_device, WEIGHT)?;
    Ok(options)
}

fn restart_policy(restart: &str) -> Option<RestartPolicy> {
    if restart.is_empty() {
        return None;
    }
    let (name, count) = restart.split_once(':').unwrap_or((restart, ""));
    Some(RestartPolicy {
        name: name.to_string(),
        maximum_retry_count: count.parse().unwrap_or_default(),
    })
}

/// Splits a `container:<ref>` mode into `("container", ref)`.
fn container_mode(mode: &str) -> (String, String) {
    match mode.strip_prefix(CONTAINER_REF_PREFIX) {
        Some(reference) => ("container".to_string(), reference.to_string()),
        None => (mode.to_string(), String::new()),
    }
}

fn kind(kind: &str) -> String {
    if kind.eq_ignore_ascii_case("virtual_machine") || kind.eq_ignore_ascii_case("virtualmachine") {
        "virtualMachine".to_string()
    } else {
        kind.to_string()
    }
}

/// Field-by-field translation of a service config. Needs no platform
/// access; image substitution and secret resolution happen in
/// [`create_launch_configs`].
pub fn to_launch_config(config: &ServiceConfig) -> Result<LaunchConfig> {
    let (network_mode, network_container_id) = container_mode(&config.network_mode);
    let (pid_mode, pid_container_id) = container_mode(&config.pid);
    let (ipc_mode, ipc_container_id) = container_mode(&config.ipc);

    Ok(LaunchConfig {
        image: config.image.clone(),
        kind: kind(&config.kind),
        command: config.command.clone(),
        entry_point: config.entrypoint.clone(),
        environment: environment(&config.environment),
        labels: strip_platform_labels(&config.labels),
        ports: config.ports.clone(),
        expose: config.expose.clone(),
        data_volumes: config.volumes.clone(),
        data_volumes_from: config.volumes_from.clone(),
        devices: devices(&config.devices),
        dns: config.dns.clone(),
        dns_opt: config.dns_opt.clone(),
        dns_search: config.dns_search.clone(),
        domain_name: config.domainname.clone(),
        extra_hosts: config.extra_hosts.clone(),
        group_add: config.group_add.clone(),
        cap_add: config.cap_add.clone(),
        cap_drop: config.cap_drop.clone(),
        cgroup_parent: config.cgroup_parent.clone(),
        cpu_period: config.cpu_period,
        cpu_quota: config.cpu_quota,
        cpu_set: config.cpuset.clone(),
        cpu_shares: config.cpu_shares,
        health_check: to_wire(&config.health_check)?,
        hostname: config.hostname.clone(),
        ipc_mode,
        ipc_container_id,
        isolation: config.isolation.clone(),
        log_config: (!config.logging.is_empty()).then(|| LogConfig {
            driver: config.logging.driver.clone(),
            config: config.logging.options.clone(),
        }),
        memory: config.mem_limit,
        memory_reservation: if config.mem_reservation != 0 {
            config.mem_reservation
        } else {
            config.memory_reservation
        },
        memory_swap: config.memswap_limit,
        memory_swappiness: config.mem_swappiness,
        milli_cpu_reservation: config.milli_cpu_reservation,
        retain_ip: config.retain_ip,
        network_mode,
        network_container_id,
        oom_kill_disable: config.oom_kill_disable,
        oom_score_adj: config.oom_score_adj,
        pid_mode,
        pid_container_id,
        privileged: config.privileged,
        read_only: config.read_only,
        restart_policy: restart_policy(&config.restart),
        security_opt: config.security_opt.clone(),
        shm_size: config.shm_size,
        stdin_open: config.stdin_open,
        stop_signal: config.stop_signal.clone(),
        sysctls: config.sysctls.clone(),
        tmpfs: tmpfs(&config.tmpfs),
        tty: config.tty,
        ulimits: config
            .ulimits
            .iter()
            .map(|(name, ulimit)| Ulimit {
                name: name.clone(),
                soft: ulimit.soft(),
                hard: ulimit.hard(),
            })
            .collect(),
        user: config.user.clone(),
        uts: config.uts.clone(),
        volume_driver: config.volume_driver.clone(),
        working_dir: config.working_dir.clone(),
        blkio_weight: config.blkio_weight,
        blkio_device_options: blkio_options(config)?,
        ..LaunchConfig::default()
    })
}

async fn lb_image(project: &Project) -> Result<String> {
    let setting: Option<Setting> = project.platform.by_id(SETTING, LB_IMAGE_SETTING).await?;
    setting
        .map(|s| s.value)
        .ok_or_else(|| Error::Config(format!("Failed to find setting {LB_IMAGE_SETTING}")))
}

async fn secret_references(project: &Project, config: &ServiceConfig) -> Result<Vec<SecretReference>> {
    let mut references = Vec::with_capacity(config.secrets.len());
    for reference in &config.secrets {
        let secret: Option<Secret> = project
            .platform
            .find(SECRET, &Filters::new().with("name", &reference.source))
            .await?;
        let Some(secret) = secret else {
            return Err(Error::Config(format!("Failed to find secret {}", reference.source)));
        };
        let name = if reference.target.is_empty() {
            reference.source.clone()
        } else {
            reference.target.clone()
        };
        references.push(SecretReference {
            secret_id: secret.id,
            name,
            uid: reference.uid.clone(),
            gid: reference.gid.clone(),
            mode: reference.mode.clone(),
        });
    }
    Ok(references)
}

async fn create_launch_config(project: &Project, config: &ServiceConfig) -> Result<LaunchConfig> {
    let mut launch_config = to_launch_config(config)?;

    if config.image == LEGACY_LB_IMAGE {
        launch_config.image = lb_image(project).await?;
    }

    // Bare names take their value from the project environment.
    for name in config.environment.iter().filter(|e| !e.contains('=')) {
        if let Some(value) = project.variables.get(name) {
            launch_config.environment.insert(name.clone(), value.clone());
        }
    }

    launch_config.secrets = secret_references(project, config).await?;
    Ok(launch_config)
}

/// Primary launch config for `name` plus one secondary per sidekick.
pub async fn create_launch_configs(
    project: &Project,
    name: &str,
) -> Result<(LaunchConfig, Vec<LaunchConfig>)> {
    let config = project
        .config
        .service_or_container(name)
        .ok_or_else(|| Error::Config(format!("Failed to find service config for {name}")))?;
    let primary = create_launch_config(project, config).await?;

    let mut secondaries = Vec::new();
    for sidekick in project.config.sidekick_info.sidekicks_of(name) {
        let Some(sidekick_config) = project.config.services.get(sidekick.as_str()) else {
            return Err(Error::Config(format!("Failed to find sidekick: {sidekick}")));
        };
        let mut secondary = create_launch_config(project, sidekick_config).await?;
        secondary.name = sidekick.to_string();
        secondaries.push(secondary);
    }

    Ok((primary, secondaries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::MockControlPlane;
    use crate::platform::Platform;
    use corral_compose::{Logging, SecretReference as ComposeSecret, Ulimit as ComposeUlimit};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_field_mapping() {
        let config = ServiceConfig {
            image: "nginx".into(),
            cpuset: "0,1".into(),
            domainname: "example.com".into(),
            entrypoint: strings(&["/entry.sh"]),
            mem_limit: 1024,
            memswap_limit: 2048,
            mem_swappiness: 10,
            mem_reservation: 512,
            memory_reservation: 256,
            pid: "host".into(),
            ipc: "container:db".into(),
            network_mode: "container:proxy".into(),
            kind: "Virtual_Machine".into(),
            restart: "on-failure:5".into(),
            ..ServiceConfig::default()
        };
        let lc = to_launch_config(&config).unwrap();
        assert_eq!(lc.cpu_set, "0,1");
        assert_eq!(lc.domain_name, "example.com");
        assert_eq!(lc.entry_point, ["/entry.sh"]);
        assert_eq!((lc.memory, lc.memory_swap, lc.memory_swappiness), (1024, 2048, 10));
        assert_eq!(lc.memory_reservation, 512);
        assert_eq!(lc.pid_mode, "host");
        assert_eq!((lc.ipc_mode.as_str(), lc.ipc_container_id.as_str()), ("container", "db"));
        assert_eq!(
            (lc.network_mode.as_str(), lc.network_container_id.as_str()),
            ("container", "proxy")
        );
        assert_eq!(lc.kind, "virtualMachine");
        assert_eq!(
            lc.restart_policy,
            Some(RestartPolicy {
                name: "on-failure".into(),
                maximum_retry_count: 5
            })
        );
    }

    #[test]
    fn test_platform_labels_are_stripped() {
        let config = ServiceConfig {
            labels: [
                ("io.rancher.loadbalancer.target.web", "80"),
                ("io.rancher.service.selector.link", "app=web"),
                ("io.rancher.service.hash", "abc"),
                ("io.rancher.sidekicks", "log"),
                ("tier", "front"),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
            ..ServiceConfig::default()
        };
        let lc = to_launch_config(&config).unwrap();
        let keys: Vec<_> = lc.labels.keys().map(String::as_str).collect();
        assert_eq!(keys, ["io.rancher.sidekicks", "tier"]);
    }

    #[test]
    fn test_docker_option_shapes() {
        let config = ServiceConfig {
            environment: strings(&["A=1", "B=x=y", "C"]),
            devices: strings(&["/dev/sda:/dev/xvda", "/dev/sdb:/dev/xvdb:r"]),
            tmpfs: strings(&["/run:rw,size=64m", "/tmp"]),
            device_read_bps: strings(&["/dev/sda:1048576"]),
            device_write_iops: strings(&["/dev/sda:100"]),
            blkio_weight_device: strings(&["/dev/sdb:300"]),
            ulimits: [
                ("nofile".to_string(), ComposeUlimit::Pair { soft: 1024, hard: 2048 }),
                ("nproc".to_string(), ComposeUlimit::Single(65535)),
            ]
            .into_iter()
            .collect(),
            logging: Logging {
                driver: "syslog".into(),
                options: [("tag".to_string(), "web".to_string())].into_iter().collect(),
            },
            ..ServiceConfig::default()
        };
        let lc = to_launch_config(&config).unwrap();

        assert_eq!(lc.environment["A"], "1");
        assert_eq!(lc.environment["B"], "x=y");
        assert_eq!(lc.environment["C"], "");
        assert_eq!(lc.devices, ["/dev/sda:/dev/xvda:rwm", "/dev/sdb:/dev/xvdb:r"]);
        assert_eq!(lc.tmpfs["/run"], "rw,size=64m");
        assert_eq!(lc.tmpfs["/tmp"], "");
        assert_eq!(lc.blkio_device_options["/dev/sda"][READ_BPS], 1048576);
        assert_eq!(lc.blkio_device_options["/dev/sda"][WRITE_IOPS], 100);
        assert_eq!(lc.blkio_device_options["/dev/sdb"][WEIGHT], 300);
        assert_eq!(
            lc.ulimits,
            [
                Ulimit { name: "nofile".into(), soft: 1024, hard: 2048 },
                Ulimit { name: "nproc".into(), soft: 65535, hard: 65535 },
            ]
        );
        assert_eq!(lc.log_config.unwrap().driver, "syslog");
    }

    #[test]
    fn test_bad_device_rate() {
        let config = ServiceConfig {
            device_read_bps: strings(&["/dev/sda:fast"]),
            ..ServiceConfig::default()
        };
        assert!(to_launch_config(&config).is_err());
    }

    fn project(mock: Arc<MockControlPlane>) -> Project {
        Project::new("demo", Platform::new(mock)).with_variables(HashMap::from([(
            "TOKEN".to_string(),
            "s3cr3t".to_string(),
        )]))
    }

    #[tokio::test]
    async fn test_secrets_and_sidekicks() {
        let mock = Arc::new(MockControlPlane::new());
        mock.insert(SECRET, json!({"id": "1se1", "name": "db-pass"}));
        let mut project = project(mock);

        let mut labels = IndexMap::new();
        labels.insert("io.rancher.sidekicks".to_string(), "log".to_string());
        project.config.services.insert(
            "web".into(),
            ServiceConfig {
                image: "nginx".into(),
                labels,
                environment: strings(&["TOKEN"]),
                secrets: vec![ComposeSecret {
                    source: "db-pass".into(),
                    target: "password".into(),
                    mode: "0400".into(),
                    ..ComposeSecret::default()
                }],
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

        let (primary, secondaries) = create_launch_configs(&project, "web").await.unwrap();
        assert_eq!(primary.environment["TOKEN"], "s3cr3t");
        assert_eq!(
            primary.secrets,
            [SecretReference {
                secret_id: "1se1".into(),
                name: "password".into(),
                mode: "0400".into(),
                ..SecretReference::default()
            }]
        );
        assert_eq!(secondaries.len(), 1);
        assert_eq!(secondaries[0].name, "log");
        assert_eq!(secondaries[0].image, "fluentd");
    }

    #[tokio::test]
    async fn test_missing_secret() {
        let mock = Arc::new(MockControlPlane::new());
        let mut project = project(mock);
        project.config.services.insert(
            "web".into(),
            ServiceConfig {
                secrets: vec![ComposeSecret {
                    source: "nope".into(),
                    ..ComposeSecret::default()
                }],
                ..ServiceConfig::default()
            },
        );
        let err = create_launch_configs(&project, "web").await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to find secret nope");
    }

    #[tokio::test]
    async fn test_legacy_lb_image_from_setting() {
        let mock = Arc::new(MockControlPlane::new());
        mock.insert(
            SETTING,
            json!({"id": LB_IMAGE_SETTING, "value": "rancher/lb-service-haproxy:v0.7.9"}),
        );
        let mut project = project(mock);
        project.config.services.insert(
            "lb".into(),
            ServiceConfig {
                image: LEGACY_LB_IMAGE.into(),
                ..ServiceConfig::default()
            },
        );
        let (primary, _) = create_launch_configs(&project, "lb").await.unwrap();
        assert_eq!(primary.image, "rancher/lb-service-haproxy:v0.7.9");
    }
}
