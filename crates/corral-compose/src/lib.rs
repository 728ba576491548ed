//! Compose document handling for corral stacks.
//!
//! Turns one or more layered compose documents into a resolved [`Config`]:
//!
//! 1. template expansion ([`template`])
//! 2. raw loading and section folding ([`raw`])
//! 3. `$VAR` interpolation ([`interpolation`])
//! 4. `env_file`/`extends` resolution ([`extends`])
//! 5. override merge and typed conversion ([`merge`])
//!
//! # Example
//!
//! ```
//! use std::collections::HashMap;
//! use corral_compose::{merge, MemoryResourceLookup, TemplateContext};
//!
//! let config = merge(
//!     &Default::default(),
//!     &HashMap::new(),
//!     &MemoryResourceLookup::default(),
//!     &TemplateContext::default(),
//!     "docker-compose.yml",
//!     b"web:\n  image: nginx\n",
//! )
//! .unwrap();
//! assert_eq!(config.services["web"].image, "nginx");
//! ```

pub mod catalog;
pub mod config;
pub mod de;
pub mod error;
pub mod extends;
pub mod interpolation;
pub mod kubernetes;
pub mod lookup;
pub mod merge;
pub mod preprocess;
pub mod raw;
pub mod sidekick;
pub mod template;
pub mod types;

pub use catalog::{parse_catalog, CatalogInfo, Question};
pub use config::Config;
pub use error::{ComposeError, Result};
pub use kubernetes::KubernetesResource;
pub use lookup::{FileResourceLookup, MemoryResourceLookup, ResourceLookup};
pub use merge::merge;
pub use sidekick::SidekickInfo;
pub use template::{ClusterInfo, ReleaseInfo, TemplateContext};
pub use types::*;
