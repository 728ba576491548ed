//! Stack lifecycle handlers and the replies they publish.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use corral_compose::{parse_catalog, ClusterInfo, MemoryResourceLookup, ReleaseInfo, TemplateContext};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{Event, EventHandler};
use crate::deploy::Options;
use crate::error::{Error, Result};
use crate::platform::{Cluster, Platform, Publish, Stack, CLUSTER, PUBLISH, STACK, TRANSITIONING_ERROR, TRANSITIONING_YES};
use crate::project::{Project, DOCKER_COMPOSE_FILE, RANCHER_COMPOSE_FILE};

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(5);
const CLUSTER_NOT_READY: &str = "Waiting for cluster to be ready";

fn reply(event: &Event) -> Publish {
    Publish {
        name: event.reply_to.clone(),
        previous_ids: vec![event.id.clone()],
        time: chrono::Utc::now().timestamp_millis(),
        ..Publish::default()
    }
}

async fn publish(platform: &Platform, reply: &Publish) -> Result<()> {
    let _: Value = platform.create(PUBLISH, reply).await?;
    Ok(())
}

/// Progress replies are best effort.
async fn publish_transitioning(platform: &Platform, event: &Event, message: &str, error: bool) {
    let reply = Publish {
        transitioning: if error { TRANSITIONING_ERROR } else { TRANSITIONING_YES }.to_string(),
        transitioning_message: message.to_string(),
        ..reply(event)
    };
    if let Err(e) = publish(platform, &reply).await {
        log::debug!("Failed to publish reply for event {}: {}", event.id, e);
    }
}

/// Republishes an empty transitioning reply until stopped so the control
/// plane keeps the event alive.
struct Keepalive {
    stop: CancellationToken,
    task: JoinHandle<()>,
}

impl Keepalive {
    fn start(platform: &Platform, event: &Event) -> Self {
        let stop = CancellationToken::new();
        let platform = platform.clone();
        let event = event.clone();
        let token = stop.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(KEEPALIVE_INTERVAL) => {}
                }
                publish_transitioning(&platform, &event, "", false).await;
            }
        });
        Self { stop, task }
    }

    async fn stop(self) {
        self.stop.cancel();
        let _ = self.task.await;
    }
}

/// Publishes the final reply for an action and decides what the router sees.
///
/// A cluster that is not ready yet is reported as still transitioning. A
/// timeout gets no reply since the resource may still settle. Anything else
/// is published as a transitioning error.
pub(crate) async fn finish(
    platform: &Platform,
    event: &Event,
    message: &str,
    result: Result<()>,
) -> Result<()> {
    match result {
        Ok(()) => {
            log::info!(
                "{} Event Done (resource_id={}, event_id={})",
                message,
                event.resource_id,
                event.id
            );
            publish(platform, &reply(event)).await
        }
        Err(e) if e.is_cluster_not_ready() => {
            publish_transitioning(platform, event, CLUSTER_NOT_READY, false).await;
            Ok(())
        }
        Err(e) => {
            log::error!(
                "{} Event Failed (resource_id={}, event_id={}): {}",
                message,
                event.resource_id,
                event.id,
                e
            );
            if e.is_timeout() {
                log::info!("Timeout processing {}:{}", event.resource_type, event.resource_id);
            } else {
                publish_transitioning(platform, event, &e.to_string(), true).await;
            }
            Err(e)
        }
    }
}

/// Stack environment plus catalog question defaults. Defaults never
/// override a value the stack already sets.
pub(crate) fn stack_variables(stack: &Stack, rancher_compose: &str) -> Result<HashMap<String, String>> {
    let mut variables: HashMap<String, String> = stack
        .environment
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    for (variable, default) in parse_catalog(rancher_compose)?.question_defaults() {
        variables.entry(variable).or_insert(default);
    }
    Ok(variables)
}

/// Builds the project for the stack an event points at.
pub(crate) async fn stack_project(
    platform: &Platform,
    event: &Event,
    cancel: &CancellationToken,
) -> Result<Project> {
    let stack: Stack = platform
        .by_id(STACK, &event.resource_id)
        .await?
        .ok_or_else(|| Error::Config("Failed to find stack".to_string()))?;
    let cluster: Cluster = platform
        .by_id(CLUSTER, &stack.cluster_id)
        .await?
        .ok_or_else(|| Error::Config("Failed to find cluster".to_string()))?;

    let rancher_compose = match stack.templates.get(RANCHER_COMPOSE_FILE) {
        Some(contents) if stack.rancher_compose.is_empty() => contents.clone(),
        _ => stack.rancher_compose.clone(),
    };
    let variables = stack_variables(&stack, &rancher_compose)?;
    let template_ctx = TemplateContext {
        release: ReleaseInfo {
            name: stack.name.clone(),
            version: parse_catalog(&rancher_compose)?.version,
            previous_version: String::new(),
        },
        cluster: ClusterInfo {
            embedded: cluster.embedded.to_string(),
            orchestration: cluster.orchestration.clone(),
        },
    };

    let mut project = Project::new(&stack.name, platform.clone())
        .with_variables(variables)
        .with_template_context(template_ctx)
        .with_cancel(cancel.clone());

    if stack.templates.is_empty() {
        project.load_document(DOCKER_COMPOSE_FILE, stack.docker_compose.as_bytes())?;
        if !stack.rancher_compose.is_empty() {
            project.load_document(RANCHER_COMPOSE_FILE, stack.rancher_compose.as_bytes())?;
        }
        project.config.complete();
    } else {
        let content = stack
            .templates
            .iter()
            .map(|(name, contents)| (name.clone(), contents.as_bytes().to_vec()))
            .collect();
        // rancher-compose documents layer over everything else
        let (mut files, overrides): (Vec<String>, Vec<String>) = stack
            .templates
            .keys()
            .cloned()
            .partition(|name| name != RANCHER_COMPOSE_FILE);
        files.extend(overrides);

        project = project.with_lookup(Arc::new(MemoryResourceLookup::new(content)));
        project.load_files(&files)?;
    }

    project.attach_cluster(cluster);
    project.attach_stack(stack);
    Ok(project)
}

/// `stack.create` and `stack.update`: create then bring everything up.
pub struct StackUp {
    message: &'static str,
}

impl StackUp {
    pub fn new(message: &'static str) -> Self {
        Self { message }
    }

    async fn run(&self, event: &Event, platform: &Platform, cancel: &CancellationToken) -> Result<()> {
        let project = stack_project(platform, event, cancel).await?;

        publish_transitioning(platform, event, "Creating stack", false).await;
        let keepalive = Keepalive::start(platform, event);

        let options = Options::default();
        let result = match project.create(&options).await {
            Ok(()) => project.up(&options).await,
            Err(e) => Err(e),
        };
        keepalive.stop().await;
        result
    }
}

#[async_trait]
impl EventHandler for StackUp {
    async fn handle(&self, event: &Event, platform: &Platform, cancel: &CancellationToken) -> Result<()> {
        log::info!(
            "{} Event Received (resource_id={}, event_id={})",
            self.message,
            event.resource_id,
            event.id
        );
        let result = self.run(event, platform, cancel).await;
        finish(platform, event, self.message, result).await
    }
}

/// `stack.remove`: deletes the stack's Kubernetes resources and volumes.
pub struct StackRemove;

impl StackRemove {
    const MESSAGE: &'static str = "Delete Stack";

    async fn run(&self, event: &Event, platform: &Platform, cancel: &CancellationToken) -> Result<()> {
        let project = stack_project(platform, event, cancel).await?;

        publish_transitioning(platform, event, "Deleting stack", false).await;
        let keepalive = Keepalive::start(platform, event);
        let result = project.remove().await;
        keepalive.stop().await;
        result
    }
}

#[async_trait]
impl EventHandler for StackRemove {
    async fn handle(&self, event: &Event, platform: &Platform, cancel: &CancellationToken) -> Result<()> {
        log::info!(
            "{} Event Received (resource_id={}, event_id={})",
            Self::MESSAGE,
            event.resource_id,
            event.id
        );
        let result = self.run(event, platform, cancel).await;
        finish(platform, event, Self::MESSAGE, result).await
    }
}

pub struct Ping;

#[async_trait]
impl EventHandler for Ping {
    async fn handle(&self, _: &Event, _: &Platform, _: &CancellationToken) -> Result<()> {
        Ok(())
    }
}
