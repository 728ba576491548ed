//! `corral pull` - pull service images onto the hosts.

use anyhow::Result;
use argh::FromArgs;
use tokio_util::sync::CancellationToken;

use super::ProjectOptions;

/// Pull images for services on every matching host
#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand, name = "pull")]
pub struct PullCommand {
    /// only update hosts that already have the image
    #[argh(switch)]
    pub cached: bool,

    /// services to pull (default: all)
    #[argh(positional)]
    pub services: Vec<String>,
}

impl PullCommand {
    pub async fn run(&self, project: &ProjectOptions, cancel: &CancellationToken) -> Result<()> {
        let project = project.open(cancel).await?;
        project.pull(&self.services, self.cached).await?;
        Ok(())
    }
}
