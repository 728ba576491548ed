//! Deployment state machine for services, containers and sidekicks.
//!
//! Each workload is driven through a [`Wrapper`]: `ensure` creates it when
//! missing, `up` brings an existing one to the desired revision (rollback,
//! finish upgrade, activate, upgrade). Every mutating call is followed by a
//! [`wait`] on the resource's transition state.

mod container;
mod pull;
mod service;
mod sidekick;
mod wait;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::project::Project;

pub use container::ContainerWrapper;
pub use pull::{pull_image, pull_service, PullProgress, PULL_MODE_ALL, PULL_MODE_CACHED};
pub use service::ServiceWrapper;
pub use sidekick::SidekickWrapper;
pub use wait::{wait, wait_for, TICK};

/// Attempts made for every mutating control plane call.
pub const MAX_ATTEMPTS: usize = 10;

/// Options for create/up.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Options {
    /// Leave existing workloads untouched
    pub no_recreate: bool,
    /// Force an upgrade of the selected launch configs
    pub force_recreate: bool,
    /// Roll existing services back to their previous revision
    pub rollback: bool,
    /// Services to act on; empty selects everything
    pub services: Vec<String>,
    pub batch_size: i64,
    pub interval_millis: i64,
}

/// Whether `name` is selected by a service filter. An empty filter
/// selects everything.
pub fn is_selected(services: &[String], name: &str) -> bool {
    services.is_empty() || services.iter().any(|s| s == name)
}

/// Runs `f` up to `attempts` times, one second apart, returning the first
/// success or the last error.
pub async fn retry_on_error<T, F, Fut>(attempts: usize, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut result = f().await;
    for attempt in 1..attempts {
        match &result {
            Ok(_) => break,
            Err(e) => {
                log::warn!("Attempt {}/{} failed: {}", attempt, attempts, e);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
        result = f().await;
    }
    result
}

/// Lifecycle of one named workload.
#[async_trait]
pub trait Wrapper: Send + Sync {
    fn name(&self) -> &str;

    async fn exists(&self) -> Result<bool>;

    async fn create(&self, options: &Options) -> Result<()>;

    async fn up(&self, options: &Options) -> Result<()>;

    /// Creates the workload unless it already exists.
    async fn ensure(&self, options: &Options) -> Result<()> {
        if self.exists().await? {
            return Ok(());
        }
        self.create(options).await
    }
}

/// Picks the wrapper for `name`: containers, sidekicks and plain services
/// each follow their own lifecycle.
pub fn wrapper_for<'a>(project: &'a Project, name: &str) -> Box<dyn Wrapper + 'a> {
    if project.config.containers.contains_key(name) {
        Box::new(ContainerWrapper::new(name, project))
    } else if !project.config.sidekick_info.primaries_of(name).is_empty() {
        Box::new(SidekickWrapper::new(name, project))
    } else {
        Box::new(ServiceWrapper::new(name, project))
    }
}
