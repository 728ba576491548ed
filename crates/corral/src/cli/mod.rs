//! CLI module for corral commands

pub mod create;
pub mod events;
pub mod export;
pub mod pull;
pub mod up;

pub use create::CreateCommand;
pub use events::EventsCommand;
pub use export::ExportCommand;
pub use pull::PullCommand;
pub use up::UpCommand;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use corral_compose::{parse_catalog, ReleaseInfo, TemplateContext};
use tokio_util::sync::CancellationToken;

use crate::bindings::Bindings;
use crate::platform::{HttpControlPlane, Platform, DEFAULT_URL};
use crate::project::{Project, DOCKER_COMPOSE_FILE, RANCHER_COMPOSE_FILE};

/// Flags shared by every subcommand that works on a project.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectOptions {
    pub files: Vec<String>,
    pub project_name: Option<String>,
    pub url: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub rancher_file: Option<String>,
    pub env_file: Option<String>,
    pub bindings_file: Option<String>,
}

fn env_or(value: &Option<String>, key: &str) -> Option<String> {
    value
        .clone()
        .or_else(|| std::env::var(key).ok().filter(|v| !v.is_empty()))
}

/// Lowercase alphanumerics, `-` and `_` only.
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}

/// Reads `KEY=VALUE` lines. Blank lines and `#` comments are skipped and a
/// bare `KEY` maps to an empty value.
pub fn parse_env_file(contents: &str) -> HashMap<String, String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| match line.split_once('=') {
            Some((key, value)) => (key.to_string(), value.to_string()),
            None => (line.to_string(), String::new()),
        })
        .collect()
}

impl ProjectOptions {
    pub fn files(&self) -> Vec<String> {
        if !self.files.is_empty() {
            return self.files.clone();
        }
        std::env::var("COMPOSE_FILE")
            .map(|v| {
                v.split(':')
                    .filter(|f| !f.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn project_name(&self) -> Result<String> {
        if let Some(name) = env_or(&self.project_name, "COMPOSE_PROJECT_NAME") {
            return Ok(normalize_name(&name));
        }
        let cwd = std::env::current_dir().context("Failed to read current directory")?;
        let name = cwd
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(normalize_name(&name))
    }

    pub fn platform(&self) -> Platform {
        let url = env_or(&self.url, "RANCHER_URL").unwrap_or_else(|| DEFAULT_URL.to_string());
        let access_key = env_or(&self.access_key, "RANCHER_ACCESS_KEY").unwrap_or_default();
        let secret_key = env_or(&self.secret_key, "RANCHER_SECRET_KEY").unwrap_or_default();
        Platform::new(Arc::new(HttpControlPlane::new(&url, &access_key, &secret_key)))
    }

    /// The rancher-compose document: the explicit one, otherwise the one
    /// next to the first compose file when present.
    fn rancher_file(&self, files: &[String]) -> Option<PathBuf> {
        if let Some(file) = &self.rancher_file {
            return Some(PathBuf::from(file));
        }
        let dir = files
            .first()
            .and_then(|f| Path::new(f).parent())
            .unwrap_or(Path::new(""));
        let candidate = dir.join(RANCHER_COMPOSE_FILE);
        candidate.exists().then_some(candidate)
    }

    /// Question defaults, overridden by the process environment, overridden
    /// by the env file.
    fn variables(&self, rancher_compose: &str) -> Result<HashMap<String, String>> {
        let mut variables: HashMap<String, String> = parse_catalog(rancher_compose)
            .context("Failed to read catalog questions")?
            .question_defaults()
            .into_iter()
            .collect();
        variables.extend(std::env::vars());
        if let Some(env_file) = &self.env_file {
            let contents = std::fs::read_to_string(env_file)
                .with_context(|| format!("Failed to read env file {env_file}"))?;
            variables.extend(parse_env_file(&contents));
        }
        Ok(variables)
    }

    /// Loads the compose documents and binds the project to its stack.
    pub async fn open(&self, cancel: &CancellationToken) -> Result<Project> {
        let name = self.project_name()?;
        let mut files = self.files();
        if files.is_empty() {
            files.push(DOCKER_COMPOSE_FILE.to_string());
        }

        let rancher_file = self.rancher_file(&files);
        let rancher_compose = match &rancher_file {
            Some(path) => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?,
            None => String::new(),
        };
        let catalog = parse_catalog(&rancher_compose).context("Failed to read catalog")?;

        let mut project = Project::new(&name, self.platform())
            .with_variables(self.variables(&rancher_compose)?)
            .with_template_context(TemplateContext {
                release: ReleaseInfo {
                    name: name.clone(),
                    version: catalog.version,
                    previous_version: String::new(),
                },
                ..TemplateContext::default()
            })
            .with_cancel(cancel.clone());

        if self.files().is_empty() && self.rancher_file.is_none() {
            project.load()?;
        } else {
            if let Some(path) = rancher_file {
                files.push(path.to_string_lossy().into_owned());
            }
            project.load_files(&files)?;
        }

        if let Some(bindings_file) = &self.bindings_file {
            Bindings::read(Path::new(bindings_file))?.apply(&mut project.config);
            project.config.complete();
        }

        project.open().await?;
        Ok(project)
    }
}
