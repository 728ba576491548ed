//! `corral events` - handle control plane events read from stdin.

use anyhow::Result;
use argh::FromArgs;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;

use super::ProjectOptions;
use crate::events::EventRouter;

/// Handle newline-delimited JSON events from stdin
#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand, name = "events")]
pub struct EventsCommand {}

impl EventsCommand {
    pub async fn run(&self, project: &ProjectOptions, cancel: &CancellationToken) -> Result<()> {
        log::info!("Starting corral event handler");
        let router = EventRouter::new(project.platform(), cancel.clone());
        router.serve(BufReader::new(tokio::io::stdin())).await?;
        log::info!("Exiting corral event handler");
        Ok(())
    }
}
