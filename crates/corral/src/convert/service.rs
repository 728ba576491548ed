use super::launch_config::create_launch_configs;
use super::load_balancer::populate_lb;
use super::{config_hash, to_wire, HASH_LABEL, SELECTOR_CONTAINER_LABEL};
use crate::error::{Error, Result};
use crate::platform::{Container, LaunchConfig, Service};
use crate::project::Project;

/// Service body for `name`, with its sidekicks as secondary launch configs
/// and the load balancer section resolved against the control plane.
pub async fn service(project: &Project, name: &str) -> Result<Service> {
    let (launch_config, secondary_launch_configs) = create_launch_configs(project, name).await?;
    let config = project
        .config
        .services
        .get(name)
        .ok_or_else(|| Error::Config(format!("Failed to find service config for {name}")))?;

    let mut service = Service {
        name: name.to_string(),
        stack_id: project.stack.id.clone(),
        launch_config: Some(launch_config),
        secondary_launch_configs,
        scale: config.scale.max(1),
        selector: config
            .labels
            .get(SELECTOR_CONTAINER_LABEL)
            .cloned()
            .unwrap_or_default(),
        metadata: config.metadata.clone(),
        external_ip_addresses: config.external_ips.clone(),
        hostname: config.hostname.clone(),
        health_check: to_wire(&config.health_check)?,
        storage_driver: to_wire(&config.storage_driver)?,
        network_driver: to_wire(&config.network_driver)?,
        retain_ip: config.retain_ip,
        scale_min: config.scale_min,
        scale_max: config.scale_max,
        scale_increment: config.scale_increment,
        ..Service::default()
    };

    populate_lb(project.server_lookup.as_ref(), config, &mut service).await?;
    Ok(service)
}

/// Resolves a container name to its id when `mode` is `container`.
async fn resolve_reference(project: &Project, mode: &str, reference: &str) -> Result<String> {
    if mode != "container" {
        return Ok(reference.to_string());
    }
    match project.server_lookup.container(reference).await? {
        Some(container) => Ok(container.id),
        None => Err(Error::DependencyNotFound(format!(
            "Failed to find existing container: {reference}"
        ))),
    }
}

/// Standalone container body for `name`. Namespace references to other
/// containers are replaced with their ids.
pub async fn container(project: &Project, name: &str) -> Result<Container> {
    let (mut config, _) = create_launch_configs(project, name).await?;
    config.name = name.to_string();

    config.pid_container_id =
        resolve_reference(project, &config.pid_mode, &config.pid_container_id).await?;
    config.network_container_id =
        resolve_reference(project, &config.network_mode, &config.network_container_id).await?;
    config.ipc_container_id =
        resolve_reference(project, &config.ipc_mode, &config.ipc_container_id).await?;

    let mut volumes_from = Vec::with_capacity(config.data_volumes_from.len());
    for reference in &config.data_volumes_from {
        volumes_from.push(resolve_reference(project, "container", reference).await?);
    }
    config.data_volumes_from = volumes_from;

    let hash = config_hash(&config)?;
    config.labels.insert(HASH_LABEL.to_string(), hash);

    Ok(Container {
        stack_id: project.stack.id.clone(),
        config,
        ..Container::default()
    })
}

/// The config half of [`container`], as sent with an upgrade.
pub async fn container_config(project: &Project, name: &str) -> Result<LaunchConfig> {
    Ok(container(project, name).await?.config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::MockControlPlane;
    use crate::platform::{Platform, Stack, CONTAINER, SERVICE};
    use corral_compose::{HealthCheck, ServiceConfig};
    use indexmap::IndexMap;
    use serde_json::json;
    use std::sync::Arc;

    fn project(mock: Arc<MockControlPlane>) -> Project {
        let mut project = Project::new("demo", Platform::new(mock));
        project.attach_stack(Stack {
            id: "1st1".into(),
            name: "demo".into(),
            ..Stack::default()
        });
        project
    }

    #[tokio::test]
    async fn test_service_body() {
        let mock = Arc::new(MockControlPlane::new());
        let mut project = project(mock);
        let mut labels = IndexMap::new();
        labels.insert(SELECTOR_CONTAINER_LABEL.to_string(), "app=web".to_string());
        project.config.services.insert(
            "web".into(),
            ServiceConfig {
                image: "nginx".into(),
                scale: 0,
                labels,
                retain_ip: true,
                health_check: Some(HealthCheck {
                    port: 80,
                    request_line: "GET / HTTP/1.0".into(),
                    ..HealthCheck::default()
                }),
                ..ServiceConfig::default()
            },
        );
        project.config.complete();

        let service = service(&project, "web").await.unwrap();
        assert_eq!(service.name, "web");
        assert_eq!(service.stack_id, "1st1");
        assert_eq!(service.scale, 1);
        assert_eq!(service.selector, "app=web");
        assert!(service.retain_ip);
        assert_eq!(
            service.health_check,
            Some(json!({"port": 80, "requestLine": "GET / HTTP/1.0"}))
        );
        assert!(service.launch_config.unwrap().labels.is_empty());
        assert!(service.lb_config.is_none());
    }

    #[tokio::test]
    async fn test_container_references_resolved() {
        let mock = Arc::new(MockControlPlane::new());
        mock.insert(CONTAINER, json!({"id": "1i7", "name": "db", "stackId": "1st1"}));
        mock.insert(CONTAINER, json!({"id": "1i8", "name": "data", "stackId": "1st1"}));
        let mut project = project(mock);
        project.config.containers.insert(
            "job".into(),
            ServiceConfig {
                image: "busybox".into(),
                network_mode: "container:db".into(),
                volumes_from: vec!["data".into()],
                ..ServiceConfig::default()
            },
        );

        let container = container(&project, "job").await.unwrap();
        assert_eq!(container.stack_id, "1st1");
        assert_eq!(container.config.name, "job");
        assert_eq!(container.config.network_mode, "container");
        assert_eq!(container.config.network_container_id, "1i7");
        assert_eq!(container.config.data_volumes_from, ["1i8"]);
    }

    #[tokio::test]
    async fn test_missing_container_reference() {
        let mock = Arc::new(MockControlPlane::new());
        mock.insert(SERVICE, json!({"id": "1s1", "name": "db", "stackId": "1st1"}));
        let mut project = project(mock);
        project.config.containers.insert(
            "job".into(),
            ServiceConfig {
                pid: "container:db".into(),
                ..ServiceConfig::default()
            },
        );

        let err = container_config(&project, "job").await.unwrap_err();
        assert!(err.is_dependency_not_found());
        assert_eq!(err.to_string(), "Failed to find existing container: db");
    }
}
