//! `corral export` - write a deployed stack back out as compose files.

use std::path::Path;

use anyhow::{Context, Result};
use argh::FromArgs;
use tokio_util::sync::CancellationToken;

use super::ProjectOptions;
use crate::convert::export::{export, Exported, Format, StackData};
use crate::platform::{Filters, Platform, Stack, STACK};

/// Export a deployed stack as compose files
#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand, name = "export")]
pub struct ExportCommand {
    /// split (docker-compose.yml + rancher-compose.yml) or combined (compose.yml)
    #[argh(option, default = "Format::Split")]
    pub format: Format,

    /// stack to export by id (default: the project's stack)
    #[argh(option)]
    pub stack_id: Option<String>,

    /// directory to write the files into (default: print them)
    #[argh(option, short = 'o')]
    pub output: Option<String>,

    /// print the documents as a JSON object instead
    #[argh(switch)]
    pub json: bool,
}

/// The stack with `stack_id`, otherwise the live stack named `name`.
async fn resolve_stack(platform: &Platform, stack_id: Option<&str>, name: &str) -> Result<Stack> {
    if let Some(id) = stack_id {
        return platform
            .by_id::<Stack>(STACK, id)
            .await?
            .with_context(|| format!("Failed to find stack {id}"));
    }
    let by_name = Filters::new().with("name", name).removed_null();
    for filters in [by_name, Filters::new().removed_null()] {
        let stacks: Vec<Stack> = platform.list(STACK, &filters).await?;
        if let Some(stack) = stacks.into_iter().find(|s| s.name.eq_ignore_ascii_case(name)) {
            return Ok(stack);
        }
    }
    anyhow::bail!("Failed to find stack {name}")
}

fn write_files(exported: &Exported, dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    for (name, contents) in exported.files() {
        let path = dir.join(name);
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        log::info!("Wrote {}", path.display());
    }
    Ok(())
}

impl ExportCommand {
    pub async fn run(&self, project: &ProjectOptions, _cancel: &CancellationToken) -> Result<()> {
        let platform = project.platform();
        let name = project.project_name()?;
        let stack = resolve_stack(&platform, self.stack_id.as_deref(), &name).await?;

        log::info!("Exporting stack {}({})", stack.name, stack.id);
        let data = StackData::fetch(&platform, &stack)
            .await
            .context("Failed to read stack")?;
        let exported = export(&data, self.format)?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&exported)?);
        } else if let Some(dir) = &self.output {
            write_files(&exported, Path::new(dir))?;
        } else {
            for (name, contents) in exported.files() {
                println!("# {name}");
                println!("{contents}");
            }
        }
        Ok(())
    }
}
