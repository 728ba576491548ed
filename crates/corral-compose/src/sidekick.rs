//! Primary/sidekick relationships derived from the sidekicks label.

use indexmap::{IndexMap, IndexSet};

use crate::types::ServiceConfig;

/// Read-only index of which services run as sidekicks of which primaries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SidekickInfo {
    /// Every service, with the sidekicks it declares (possibly none).
    pub primaries_to_sidekicks: IndexMap<String, Vec<String>>,
    /// Every sidekick name, with the primaries that declare it.
    pub sidekick_to_primaries: IndexMap<String, Vec<String>>,
    /// Services declaring at least one sidekick.
    pub primaries: IndexSet<String>,
}

impl SidekickInfo {
    /// Builds the index from resolved services.
    pub fn derive(services: &IndexMap<String, ServiceConfig>) -> Self {
        let mut info = SidekickInfo::default();

        for (name, config) in services {
            let sidekicks = config.sidekicks();
            if !sidekicks.is_empty() {
                info.primaries.insert(name.clone());
            }
            for sidekick in &sidekicks {
                info.sidekick_to_primaries
                    .entry(sidekick.clone())
                    .or_default()
                    .push(name.clone());
            }
            info.primaries_to_sidekicks.insert(name.clone(), sidekicks);
        }

        info
    }

    pub fn is_primary(&self, name: &str) -> bool {
        self.primaries.contains(name)
    }

    pub fn is_sidekick(&self, name: &str) -> bool {
        self.sidekick_to_primaries.contains_key(name)
    }

    pub fn sidekicks_of(&self, primary: &str) -> &[String] {
        self.primaries_to_sidekicks
            .get(primary)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn primaries_of(&self, sidekick: &str) -> &[String] {
        self.sidekick_to_primaries
            .get(sidekick)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}
