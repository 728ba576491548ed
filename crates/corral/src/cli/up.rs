//! `corral up` - create, then start or upgrade every service.

use anyhow::Result;
use argh::FromArgs;
use tokio_util::sync::CancellationToken;

use super::ProjectOptions;
use crate::deploy::Options;

/// Bring all services up
#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand, name = "up")]
pub struct UpCommand {
    /// pull images on hosts that already have them before upgrading
    #[argh(switch)]
    pub pull: bool,

    /// do not block after bringing services up
    #[argh(switch, short = 'd')]
    pub detach: bool,

    /// upgrade services whose configuration changed
    #[argh(switch, short = 'u')]
    pub upgrade: bool,

    /// upgrade services regardless of changes
    #[argh(switch)]
    pub force_upgrade: bool,

    /// confirm a finished upgrade and remove the old containers
    #[argh(switch, short = 'c')]
    pub confirm_upgrade: bool,

    /// roll back to the previously deployed version
    #[argh(switch, short = 'r')]
    pub rollback: bool,

    /// number of containers to upgrade at once (default: 2)
    #[argh(option, default = "2")]
    pub batch_size: i64,

    /// upgrade interval in milliseconds (default: 1000)
    #[argh(option, default = "1000")]
    pub interval: i64,

    /// services to bring up (default: all)
    #[argh(positional)]
    pub services: Vec<String>,
}

impl UpCommand {
    /// Existing services are left alone unless an upgrade is requested.
    /// Confirming only finishes upgrades that already ran.
    pub fn options(&self) -> Options {
        let upgrade = (self.upgrade || self.force_upgrade) && !self.confirm_upgrade;
        Options {
            no_recreate: !upgrade,
            force_recreate: upgrade && self.force_upgrade,
            rollback: self.rollback,
            services: self.services.clone(),
            batch_size: self.batch_size,
            interval_millis: self.interval,
        }
    }

    pub async fn run(&self, project: &ProjectOptions, cancel: &CancellationToken) -> Result<()> {
        let project = project.open(cancel).await?;
        let options = self.options();

        if self.pull {
            project.pull(&self.services, true).await?;
        }

        project.create(&options).await?;
        project.up(&options).await?;

        if !self.detach {
            log::info!("Services are up, press Ctrl+C to exit");
            cancel.cancelled().await;
        }
        Ok(())
    }
}
