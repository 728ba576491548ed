//! Resource sets materialized by a project, one per kind of stack entry.
//!
//! A project builds every set from an ordered factory list, initializes
//! them in order and, on `up`, starts them.

pub mod dependency;
pub mod host;
pub mod kubernetes;
pub mod order;
pub mod secret;
pub mod services;
pub mod volume;

use async_trait::async_trait;

use crate::deploy::Options;
use crate::error::Result;
use crate::project::Project;

pub use order::service_order;

#[async_trait]
pub trait ResourceSet: Send + Sync {
    /// Creates whatever is missing.
    async fn initialize(&self, options: &Options) -> Result<()>;

    /// Brings created resources up. Most sets have nothing to start.
    async fn start(&self, _options: &Options) -> Result<()> {
        Ok(())
    }
}

/// Builds a resource set over a project.
pub type ResourceFactory = for<'a> fn(&'a Project) -> Box<dyn ResourceSet + 'a>;

/// Sets in creation order.
pub fn default_factories() -> Vec<ResourceFactory> {
    vec![
        dependencies as ResourceFactory,
        hosts as ResourceFactory,
        secrets as ResourceFactory,
        volumes as ResourceFactory,
        workloads as ResourceFactory,
        kubernetes_resources as ResourceFactory,
    ]
}

fn dependencies(project: &Project) -> Box<dyn ResourceSet + '_> {
    Box::new(dependency::Dependencies::new(project))
}

fn hosts(project: &Project) -> Box<dyn ResourceSet + '_> {
    Box::new(host::Hosts::new(project))
}

fn secrets(project: &Project) -> Box<dyn ResourceSet + '_> {
    Box::new(secret::Secrets::new(project))
}

fn volumes(project: &Project) -> Box<dyn ResourceSet + '_> {
    Box::new(volume::Volumes::new(project))
}

fn workloads(project: &Project) -> Box<dyn ResourceSet + '_> {
    Box::new(services::Services::new(project))
}

fn kubernetes_resources(project: &Project) -> Box<dyn ResourceSet + '_> {
    Box::new(kubernetes::KubernetesResources::new(project))
}
