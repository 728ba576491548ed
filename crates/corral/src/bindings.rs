//! Per-service label and port overrides read from a JSON bindings file.

use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;

use corral_compose::Config;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServiceBinding {
    pub labels: IndexMap<String, String>,
    pub ports: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Bindings {
    pub services: IndexMap<String, ServiceBinding>,
}

impl Bindings {
    pub fn parse(contents: &[u8]) -> Result<Self> {
        serde_json::from_slice(contents)
            .map_err(|e| Error::Config(format!("Failed to parse bindings: {e}")))
    }

    pub fn read(path: &Path) -> Result<Self> {
        Self::parse(&std::fs::read(path)?)
    }

    /// Merges labels into each bound service or container. Ports replace the
    /// configured ones only when the binding lists any.
    pub fn apply(&self, config: &mut Config) {
        for (name, binding) in &self.services {
            let target = match config.services.get_mut(name) {
                Some(service) => service,
                None => match config.containers.get_mut(name) {
                    Some(container) => container,
                    None => {
                        log::debug!("Ignoring bindings for unknown service {}", name);
                        continue;
                    }
                },
            };

            target
                .labels
                .extend(binding.labels.iter().map(|(k, v)| (k.clone(), v.clone())));
            if !binding.ports.is_empty() {
                target.ports.clone_from(&binding.ports);
            }
        }
    }
}
