use std::collections::HashSet;

use async_trait::async_trait;
use corral_compose::HostConfig;
use serde_json::{json, Map, Value};

use super::ResourceSet;
use crate::convert::camel_case_keys;
use crate::deploy::Options;
use crate::error::Result;
use crate::platform::{Filters, Host, HOST};
use crate::project::Project;

/// Machines provisioned for the stack. Each host entry yields `count`
/// hosts named `<stack>-<host>-<i>`.
pub struct Hosts<'a> {
    project: &'a Project,
}

/// Create body for one host: the dynamic driver fields with camelCase keys,
/// plus its name and stack.
pub fn host_body(config: &HostConfig, name: &str, stack_id: &str) -> Value {
    let dynamic: Map<String, Value> = config
        .dynamic
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let mut body = match camel_case_keys(Value::Object(dynamic)) {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    body.insert("name".to_string(), json!(name));
    body.insert("hostname".to_string(), json!(name));
    body.insert("stackId".to_string(), json!(stack_id));
    Value::Object(body)
}

impl<'a> Hosts<'a> {
    pub fn new(project: &'a Project) -> Self {
        Self { project }
    }

    async fn ensure(&self, name: &str, config: &HostConfig) -> Result<()> {
        let count = config.count.max(1);
        let stack = &self.project.stack;

        let existing: Vec<Host> = self
            .project
            .platform
            .list(HOST, &Filters::new().with("stackId", &stack.id))
            .await?;
        let existing: HashSet<String> = existing.into_iter().map(|host| host.name).collect();

        for i in 1..=count {
            let host_name = format!("{}-{}-{}", stack.name, name, i);
            if existing.contains(&host_name) {
                continue;
            }
            log::info!("Creating host {}", host_name);
            let _: Value = self
                .project
                .platform
                .create(HOST, &host_body(config, &host_name, &stack.id))
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceSet for Hosts<'_> {
    async fn initialize(&self, _options: &Options) -> Result<()> {
        for (name, config) in &self.project.config.hosts {
            self.ensure(name, config).await?;
        }
        Ok(())
    }
}
