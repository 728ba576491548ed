//! The resolved stack config.

use indexmap::IndexMap;

use crate::kubernetes::KubernetesResource;
use crate::sidekick::SidekickInfo;
use crate::types::{
    DependencyConfig, HostConfig, NetworkConfig, SecretConfig, ServiceConfig, VolumeConfig,
};

/// Everything a stack declares, accumulated over its documents.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub services: IndexMap<String, ServiceConfig>,
    pub containers: IndexMap<String, ServiceConfig>,
    pub dependencies: IndexMap<String, DependencyConfig>,
    pub volumes: IndexMap<String, VolumeConfig>,
    pub networks: IndexMap<String, NetworkConfig>,
    pub secrets: IndexMap<String, SecretConfig>,
    pub hosts: IndexMap<String, HostConfig>,
    pub kubernetes_resources: IndexMap<String, KubernetesResource>,
    pub sidekick_info: SidekickInfo,
}

impl Config {
    /// Copies every entry of `other` over this config, replacing entries
    /// with the same name.
    pub fn absorb(&mut self, other: Config) {
        self.services.extend(other.services);
        self.containers.extend(other.containers);
        self.dependencies.extend(other.dependencies);
        self.volumes.extend(other.volumes);
        self.networks.extend(other.networks);
        self.secrets.extend(other.secrets);
        self.hosts.extend(other.hosts);
        self.kubernetes_resources.extend(other.kubernetes_resources);
    }

    /// Derives the sidekick index. Called once all documents are loaded.
    pub fn complete(&mut self) {
        self.sidekick_info = SidekickInfo::derive(&self.services);
    }

    /// Looks up a service or container by name.
    pub fn service_or_container(&self, name: &str) -> Option<&ServiceConfig> {
        self.services.get(name).or_else(|| self.containers.get(name))
    }
}
