//! `corral create` - create every service without starting it.

use anyhow::Result;
use argh::FromArgs;
use tokio_util::sync::CancellationToken;

use super::ProjectOptions;
use crate::deploy::Options;

/// Create all services but do not start them
#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand, name = "create")]
pub struct CreateCommand {
    /// services to create (default: all)
    #[argh(positional)]
    pub services: Vec<String>,
}

impl CreateCommand {
    pub async fn run(&self, project: &ProjectOptions, cancel: &CancellationToken) -> Result<()> {
        let project = project.open(cancel).await?;
        let options = Options {
            services: self.services.clone(),
            ..Options::default()
        };

        project.create(&options).await?;
        // The second pass resolves links to services created by the first.
        project.create(&options).await?;
        Ok(())
    }
}
