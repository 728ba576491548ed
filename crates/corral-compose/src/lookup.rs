//! Loading of files referenced from compose documents (`extends`,
//! `env_file`, secrets).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{ComposeError, Result};

/// Resolves `file` relative to the document `relative_to` and returns the
/// contents together with the resolved name.
pub trait ResourceLookup: Send + Sync {
    fn lookup(&self, file: &str, relative_to: &str) -> Result<(Vec<u8>, String)>;
}

/// Reads files from disk, relative to the directory of the referring file.
#[derive(Debug, Clone, Default)]
pub struct FileResourceLookup;

impl FileResourceLookup {
    fn resolve(file: &str, relative_to: &str) -> PathBuf {
        if let Some(rest) = file.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }

        let path = Path::new(file);
        if path.is_absolute() {
            return path.to_path_buf();
        }

        let base = Path::new(relative_to);
        let dir = if relative_to.ends_with('/') {
            base
        } else {
            base.parent().unwrap_or(Path::new(""))
        };
        dir.join(path)
    }
}

impl ResourceLookup for FileResourceLookup {
    fn lookup(&self, file: &str, relative_to: &str) -> Result<(Vec<u8>, String)> {
        let resolved = Self::resolve(file, relative_to);
        log::debug!("Reading file {}", resolved.display());
        let contents = std::fs::read(&resolved).map_err(|e| {
            ComposeError::Lookup(format!("Failed to read {}: {e}", resolved.display()))
        })?;
        Ok((contents, resolved.to_string_lossy().into_owned()))
    }
}

/// Serves files from an in-memory map keyed by path.
#[derive(Debug, Clone, Default)]
pub struct MemoryResourceLookup {
    pub content: HashMap<String, Vec<u8>>,
}

impl MemoryResourceLookup {
    pub fn new(content: HashMap<String, Vec<u8>>) -> Self {
        Self { content }
    }
}

impl ResourceLookup for MemoryResourceLookup {
    fn lookup(&self, file: &str, relative_to: &str) -> Result<(Vec<u8>, String)> {
        let file = file.strip_prefix('/').unwrap_or(file);
        // Lookups made on behalf of a served document resolve next to it.
        let relative_to = if self.content.contains_key(relative_to) {
            match relative_to.rfind('/') {
                Some(idx) => &relative_to[..idx],
                None => ".",
            }
        } else {
            relative_to
        };
        let relative_to = relative_to.strip_suffix('/').unwrap_or(relative_to);
        let final_file = if relative_to == "." {
            file.to_string()
        } else {
            format!("{relative_to}/{file}")
        };

        match self.content.get(&final_file) {
            Some(content) => Ok((content.clone(), final_file)),
            None => Err(ComposeError::Lookup(format!("not found: {final_file}"))),
        }
    }
}
