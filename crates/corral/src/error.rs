//! Error types for stack deployment.

use thiserror::Error;

use crate::platform::PlatformError;

/// Errors that can occur while loading or applying a stack.
#[derive(Debug, Error)]
pub enum Error {
    /// Parse, template or interpolation failure in a compose document
    #[error("Could not parse config: {0}")]
    Compose(#[from] corral_compose::ComposeError),

    /// Control plane request failed or was rejected
    #[error(transparent)]
    Platform(#[from] PlatformError),

    /// A referenced certificate, service or container does not exist yet
    #[error("{0}")]
    DependencyNotFound(String),

    /// The target cluster does not answer version discovery yet
    #[error("{0}")]
    ClusterNotReady(String),

    /// Load balancer targets form a cycle
    #[error("Failed to determine correct order to create services")]
    Ordering,

    /// A wait was cancelled before the resource settled
    #[error("Timeout. Context canceled for resource {0}")]
    Timeout(String),

    /// The resource reported `transitioning: error`
    #[error("{0}")]
    Transition(String),

    /// kubectl exited unsuccessfully
    #[error("{0}")]
    Kubectl(String),

    /// Invalid input or missing configuration
    #[error("{0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn is_dependency_not_found(&self) -> bool {
        matches!(self, Error::DependencyNotFound(_))
    }

    pub fn is_cluster_not_ready(&self) -> bool {
        matches!(self, Error::ClusterNotReady(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Platform(PlatformError::Decode(err.to_string()))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Compose(corral_compose::ComposeError::Yaml(err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
