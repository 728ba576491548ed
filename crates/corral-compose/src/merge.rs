//! The merge engine: compose document bytes in, typed stack config out.
//!
//! Resolution happens on untyped [`Value`] trees (interpolation, `extends`,
//! overrides) and the result is converted into typed records at the end.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value};

use crate::config::Config;
use crate::error::{ComposeError, Result};
use crate::extends::{interpolate_service_map, parse_service, NO_MERGE};
use crate::interpolation::interpolate;
use crate::kubernetes;
use crate::lookup::ResourceLookup;
use crate::preprocess::{preprocess_service_map, try_convert_ints_map};
use crate::raw::{create_raw_config, RawSection, RawService, RawServiceMap};
use crate::template::{self, TemplateContext};
use crate::types::ServiceConfig;

/// Recursively merges `incoming` onto `existing`: maps merge key by key,
/// lists concatenate and anything else is replaced.
pub fn merge_values(existing: Value, incoming: Value) -> Value {
    match (existing, incoming) {
        (Value::Mapping(mut base), Value::Mapping(over)) => {
            for (key, value) in over {
                match base.get_mut(&key) {
                    Some(slot) => {
                        let current = std::mem::take(slot);
                        *slot = merge_values(current, value);
                    }
                    None => {
                        base.insert(key, value);
                    }
                }
            }
            Value::Mapping(base)
        }
        (Value::Sequence(mut base), Value::Sequence(over)) => {
            base.extend(over);
            Value::Sequence(base)
        }
        (_, incoming) => incoming,
    }
}

/// Applies `service` onto `base` with the override rule.
///
/// `image` and `build` exclude each other: whichever one `service` sets
/// removes the other from `base`.
pub fn merge_config(mut base: RawService, service: RawService) -> RawService {
    for (key, value) in service {
        match key.as_str() {
            Some("image") => {
                base.remove("build");
            }
            Some("build") => {
                base.remove("image");
            }
            _ => {}
        }

        let replace = key.as_str().is_some_and(|k| NO_MERGE.contains(&k));
        match base.get_mut(&key) {
            Some(slot) if !replace => {
                let current = std::mem::take(slot);
                *slot = merge_values(current, value);
            }
            _ => {
                base.insert(key, value);
            }
        }
    }
    base
}

fn to_raw(name: &str, config: &ServiceConfig) -> Result<RawService> {
    match serde_yaml::to_value(config)? {
        Value::Mapping(map) => Ok(map),
        Value::Null => Ok(Mapping::new()),
        other => Err(ComposeError::Invalid {
            field: name.to_string(),
            message: format!("unexpected service shape {other:?}"),
        }),
    }
}

fn to_service(name: &str, raw: RawService) -> Result<ServiceConfig> {
    serde_yaml::from_value(Value::Mapping(raw)).map_err(|e| ComposeError::Invalid {
        field: name.to_string(),
        message: e.to_string(),
    })
}

/// Merges `incoming` onto an already resolved `existing` service through
/// their raw forms.
pub fn merge_service_configs(
    name: &str,
    existing: &ServiceConfig,
    incoming: &ServiceConfig,
) -> Result<ServiceConfig> {
    let merged = merge_config(to_raw(name, existing)?, to_raw(name, incoming)?);
    to_service(name, merged)
}

/// Renames version 1 fields to their version 2 equivalents.
pub fn convert_v1_fields(service: &mut RawService) {
    let dockerfile = service.remove("dockerfile");
    match service.remove("build") {
        Some(Value::String(context)) => {
            let mut build = Mapping::new();
            build.insert(Value::from("context"), Value::from(context));
            if let Some(dockerfile) = dockerfile {
                build.insert(Value::from("dockerfile"), dockerfile);
            }
            service.insert(Value::from("build"), Value::Mapping(build));
        }
        Some(Value::Mapping(mut build)) => {
            if let Some(dockerfile) = dockerfile {
                build.insert(Value::from("dockerfile"), dockerfile);
            }
            service.insert(Value::from("build"), Value::Mapping(build));
        }
        Some(other) => {
            service.insert(Value::from("build"), other);
        }
        None => {}
    }

    let driver = service.remove("log_driver");
    let options = service.remove("log_opt");
    if driver.is_some() || options.is_some() {
        let mut logging = Mapping::new();
        if let Some(driver) = driver {
            logging.insert(Value::from("driver"), driver);
        }
        if let Some(options) = options {
            logging.insert(Value::from("options"), options);
        }
        service.insert(Value::from("logging"), Value::Mapping(logging));
    }

    if let Some(net) = service.remove("net") {
        service.insert(Value::from("network_mode"), net);
    }
}

/// Resolves and types every service of a raw service map.
pub fn merge_services(
    vars: &HashMap<String, String>,
    lookup: &dyn ResourceLookup,
    file: &str,
    mut services: RawServiceMap,
    v1: bool,
) -> Result<IndexMap<String, ServiceConfig>> {
    if v1 {
        services.values_mut().for_each(convert_v1_fields);
    }

    let mut resolved = RawServiceMap::new();
    for (name, service) in &services {
        let mut service = parse_service(lookup, vars, file, service.clone(), &services)
            .inspect_err(|e| log::error!("Failed to parse service {name}: {e}"))?;
        if v1 {
            convert_v1_fields(&mut service);
        }
        resolved.insert(name.clone(), service);
    }

    resolved
        .into_iter()
        .map(|(name, raw)| {
            let config = to_service(&name, raw)?;
            Ok((name, config))
        })
        .collect()
}

/// YAML reads a bare `no` as false, which is not a restart policy.
fn adjust_values(configs: &mut IndexMap<String, ServiceConfig>) {
    for config in configs.values_mut() {
        if config.restart == "false" {
            config.restart = "no".to_string();
        }
    }
}

fn typed_section<T: DeserializeOwned + Default>(
    section: RawSection,
) -> Result<IndexMap<String, T>> {
    section
        .into_iter()
        .map(|(name, value)| {
            let typed = match value {
                Value::Null => T::default(),
                value => serde_yaml::from_value(value).map_err(|e| ComposeError::Invalid {
                    field: name.clone(),
                    message: e.to_string(),
                })?,
            };
            Ok((name, typed))
        })
        .collect()
}

/// Merges one compose document onto the services resolved so far.
///
/// `existing` holds services from previously merged documents; services
/// redeclared here are merged onto them with the override rule. The
/// returned config only holds what this document declares.
pub fn merge(
    existing: &IndexMap<String, ServiceConfig>,
    vars: &HashMap<String, String>,
    lookup: &dyn ResourceLookup,
    template_ctx: &TemplateContext,
    file: &str,
    contents: &[u8],
) -> Result<Config> {
    let contents = String::from_utf8_lossy(contents);
    let contents = template::apply(&contents, template_ctx, vars)?;

    let kubernetes_resources = kubernetes::get_resources(&contents)?;
    if !kubernetes_resources.is_empty() {
        return Ok(Config {
            kubernetes_resources,
            ..Config::default()
        });
    }

    let mut raw = create_raw_config(&contents)?;
    let v1 = !raw.is_v2();

    interpolate_service_map(&mut raw.services, vars)?;
    interpolate_service_map(&mut raw.containers, vars)?;
    for (name, value) in raw.volumes.iter_mut() {
        interpolate(name, value, vars)?;
    }
    for (name, value) in raw.networks.iter_mut() {
        interpolate(name, value, vars)?;
    }

    preprocess_service_map(&mut raw.services);
    preprocess_service_map(&mut raw.containers);
    try_convert_ints_map(&mut raw.services);
    try_convert_ints_map(&mut raw.containers);

    let mut services = merge_services(vars, lookup, file, raw.services, v1)?;
    for (name, config) in services.iter_mut() {
        if let Some(existing) = existing.get(name) {
            *config = merge_service_configs(name, existing, config)?;
        }
    }

    let mut containers = if v1 {
        IndexMap::new()
    } else {
        merge_services(vars, lookup, file, raw.containers, false)?
    };

    adjust_values(&mut services);
    adjust_values(&mut containers);

    Ok(Config {
        services,
        containers,
        dependencies: typed_section(raw.dependencies)?,
        volumes: typed_section(raw.volumes)?,
        networks: typed_section(raw.networks)?,
        secrets: typed_section(raw.secrets)?,
        hosts: typed_section(raw.hosts)?,
        ..Config::default()
    })
}
