//! Corral deploys compose stacks onto a Rancher-style control plane.
//!
//! A [`project::Project`] loads compose documents through `corral-compose`,
//! converts each service into the control plane's launch descriptors and
//! drives every workload to its desired state. The same engine backs the
//! CLI and the event handler in [`events`].

pub mod bindings;
pub mod cli;
pub mod convert;
pub mod deploy;
pub mod error;
pub mod events;
pub mod kubectl;
pub mod lookup;
pub mod platform;
pub mod project;
pub mod resources;

pub use error::{Error, Result};
pub use project::Project;
