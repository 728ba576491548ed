//! A stack being deployed: its resolved config plus everything needed to
//! apply it against the control plane.

use std::collections::HashMap;
use std::sync::Arc;

use corral_compose::{Config, FileResourceLookup, ResourceLookup, TemplateContext};
use tokio_util::sync::CancellationToken;

use crate::deploy::{self, Options};
use crate::error::{Error, Result};
use crate::kubectl;
use crate::lookup::{PlatformLookup, ServerResourceLookup};
use crate::platform::{Cluster, Filters, Platform, Stack, CLUSTER, STACK};
use crate::resources::{self, kubernetes::KubernetesResources, volume::Volumes, ResourceFactory};

/// Used on its own when present.
pub const COMPOSE_FILE: &str = "compose.yml";
pub const DOCKER_COMPOSE_FILE: &str = "docker-compose.yml";
pub const DOCKER_COMPOSE_TEMPLATE: &str = "docker-compose.yml.tpl";
pub const RANCHER_COMPOSE_FILE: &str = "rancher-compose.yml";

pub struct Project {
    pub name: String,
    pub config: Config,
    /// Values for `${VAR}` interpolation and templates
    pub variables: HashMap<String, String>,
    pub template_ctx: TemplateContext,
    pub resource_lookup: Arc<dyn ResourceLookup>,
    pub server_lookup: Arc<dyn ServerResourceLookup>,
    pub platform: Platform,
    pub stack: Stack,
    pub cluster: Option<Cluster>,
    /// Cancels every pending wait
    pub cancel: CancellationToken,
    factories: Vec<ResourceFactory>,
}

impl Project {
    pub fn new(name: &str, platform: Platform) -> Self {
        Self {
            name: name.to_string(),
            config: Config::default(),
            variables: HashMap::new(),
            template_ctx: TemplateContext::default(),
            resource_lookup: Arc::new(FileResourceLookup),
            server_lookup: Arc::new(PlatformLookup::new("", platform.clone())),
            platform,
            stack: Stack::default(),
            cluster: None,
            cancel: CancellationToken::new(),
            factories: resources::default_factories(),
        }
    }

    pub fn with_lookup(mut self, lookup: Arc<dyn ResourceLookup>) -> Self {
        self.resource_lookup = lookup;
        self
    }

    pub fn with_variables(mut self, variables: HashMap<String, String>) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_template_context(mut self, ctx: TemplateContext) -> Self {
        self.template_ctx = ctx;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Replaces the resource sets run by create/up.
    pub fn with_factories(mut self, factories: Vec<ResourceFactory>) -> Self {
        self.factories = factories;
        self
    }

    /// Binds the project to `stack`; server lookups become scoped to it.
    pub fn attach_stack(&mut self, stack: Stack) {
        self.server_lookup = Arc::new(PlatformLookup::new(&stack.id, self.platform.clone()));
        self.stack = stack;
    }

    pub fn attach_cluster(&mut self, cluster: Cluster) {
        self.cluster = Some(cluster);
    }

    // ── Stack ───────────────────────────────────────────────────────

    /// Finds the stack named after the project, creating it when missing,
    /// and loads its cluster.
    pub async fn open(&mut self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::Config("Name is required".to_string()));
        }

        let stack = self.find_or_create_stack().await?;
        if self.cluster.is_none() && !stack.cluster_id.is_empty() {
            self.cluster = self.platform.by_id(CLUSTER, &stack.cluster_id).await?;
        }
        self.attach_stack(stack);
        Ok(())
    }

    async fn find_or_create_stack(&self) -> Result<Stack> {
        log::debug!("Looking for stack {}", self.name);

        let by_name = Filters::new().with("name", &self.name).removed_null();
        // Second pass without the name filter for case sensitive backends.
        for filters in [by_name, Filters::new().removed_null()] {
            let stacks: Vec<Stack> = self.platform.list(STACK, &filters).await?;
            if let Some(stack) = stacks
                .into_iter()
                .find(|s| s.name.eq_ignore_ascii_case(&self.name))
            {
                log::debug!("Found stack: {}({})", stack.name, stack.id);
                return Ok(stack);
            }
        }

        log::info!("Creating stack {}", self.name);
        let stack = Stack {
            name: self.name.clone(),
            ..Stack::default()
        };
        Ok(self.platform.create(STACK, &stack).await?)
    }

    // ── Loading ─────────────────────────────────────────────────────

    /// Merges one document into the config.
    pub fn load_document(&mut self, file: &str, contents: &[u8]) -> Result<()> {
        let config = corral_compose::merge(
            &self.config.services,
            &self.variables,
            self.resource_lookup.as_ref(),
            &self.template_ctx,
            file,
            contents,
        )?;
        self.config.absorb(config);
        Ok(())
    }

    /// Loads the default documents through the resource lookup.
    ///
    /// `compose.yml` is used alone when present. Otherwise
    /// `docker-compose.yml` (or its `.tpl` variant) is required and
    /// `rancher-compose.yml` is layered on top when present.
    pub fn load(&mut self) -> Result<()> {
        let result = self.load_defaults();
        self.config.complete();
        result
    }

    fn load_defaults(&mut self) -> Result<()> {
        if let Ok((contents, file)) = self.resource_lookup.lookup(COMPOSE_FILE, ".") {
            return self.load_document(&file, &contents);
        }

        let (contents, file) = match self.resource_lookup.lookup(DOCKER_COMPOSE_FILE, ".") {
            Ok(found) => found,
            Err(_) => self.resource_lookup.lookup(DOCKER_COMPOSE_TEMPLATE, ".")?,
        };
        self.load_document(&file, &contents)?;

        if let Ok((contents, file)) = self.resource_lookup.lookup(RANCHER_COMPOSE_FILE, ".") {
            self.load_document(&file, &contents)?;
        }
        Ok(())
    }

    /// Loads explicitly named documents in order.
    pub fn load_files(&mut self, files: &[String]) -> Result<()> {
        let result = files.iter().try_for_each(|name| {
            let (contents, file) = self.resource_lookup.lookup(name, ".")?;
            self.load_document(&file, &contents)
        });
        self.config.complete();
        result
    }

    // ── Apply ───────────────────────────────────────────────────────

    /// Creates missing resources without starting anything.
    pub async fn create(&self, options: &Options) -> Result<()> {
        self.apply(options, false).await
    }

    /// Creates missing resources, then brings every workload up.
    pub async fn up(&self, options: &Options) -> Result<()> {
        self.apply(options, true).await
    }

    async fn apply(&self, options: &Options, start: bool) -> Result<()> {
        if options.no_recreate && options.force_recreate {
            return Err(Error::Config(
                "no-recreate and force-recreate cannot be combined".to_string(),
            ));
        }

        self.check_cluster_ready().await?;

        let sets: Vec<_> = self.factories.iter().map(|factory| factory(self)).collect();

        for set in &sets {
            set.initialize(options).await?;
        }

        if start {
            for set in &sets {
                set.start(options).await?;
            }
        }

        Ok(())
    }

    /// Deletes the stack's Kubernetes resources and volume templates.
    pub async fn remove(&self) -> Result<()> {
        KubernetesResources::new(self).remove().await?;
        Volumes::new(self).remove().await
    }

    /// Pulls the images of the selected services and containers.
    pub async fn pull(&self, services: &[String], cached: bool) -> Result<()> {
        let names = self
            .config
            .services
            .keys()
            .chain(self.config.containers.keys())
            .filter(|name| deploy::is_selected(services, name))
            .filter(|name| !self.config.sidekick_info.is_sidekick(name));
        for name in names {
            deploy::pull_service(self, name, cached).await?;
        }
        Ok(())
    }

    // ── Cluster readiness ───────────────────────────────────────────

    /// Probes the cluster's version endpoint when the stack carries
    /// Kubernetes resources. Any failure is [`Error::ClusterNotReady`].
    pub async fn check_cluster_ready(&self) -> Result<()> {
        let Some(cluster) = &self.cluster else {
            return Ok(());
        };
        let Some(client_config) = &cluster.k8s_client_config else {
            return Ok(());
        };
        if self.config.kubernetes_resources.is_empty() {
            return Ok(());
        }

        let endpoint = kubectl::cluster_endpoint(self.platform.url(), &cluster.id)?;
        let not_ready = |e: reqwest::Error| Error::ClusterNotReady(e.to_string());

        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(!client_config.address.starts_with("http://"))
            .build()
            .map_err(not_ready)?;
        client
            .get(format!("{endpoint}/version"))
            .bearer_auth(&client_config.bearer_token)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(not_ready)?;
        Ok(())
    }
}
