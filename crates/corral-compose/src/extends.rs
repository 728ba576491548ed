//! Per-service resolution of `env_file`, build context and `extends`.

use std::collections::HashMap;

use serde_yaml::{Mapping, Value};

use crate::error::{ComposeError, Result};
use crate::interpolation::interpolate;
use crate::lookup::ResourceLookup;
use crate::merge::merge_config;
use crate::preprocess::preprocess_service_map;
use crate::raw::{create_raw_config, RawService, RawServiceMap};

/// Keys a service must not declare to be used as an `extends` base.
pub const NO_MERGE: &[&str] = &["links", "volumes_from"];

/// Interpolates every field of every raw service in place.
pub fn interpolate_service_map(
    services: &mut RawServiceMap,
    vars: &HashMap<String, String>,
) -> Result<()> {
    for service in services.values_mut() {
        for (key, value) in service.iter_mut() {
            let key = key.as_str().unwrap_or_default().to_string();
            interpolate(&key, value, vars)?;
        }
    }
    Ok(())
}

fn as_string(value: Option<&Value>) -> String {
    value
        .and_then(crate::de::scalar_to_string)
        .unwrap_or_default()
}

fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Sequence(items) => items.iter().filter_map(crate::de::scalar_to_string).collect(),
        Value::Null => Vec::new(),
        other => crate::de::scalar_to_string(other).into_iter().collect(),
    }
}

/// Environment entries of a raw service as `KEY=VALUE` strings.
fn environment_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Mapping(map)) => map
            .iter()
            .filter_map(|(k, v)| {
                let key = crate::de::scalar_to_string(k)?;
                Some(match v {
                    Value::Null => key,
                    v => format!("{key}={}", crate::de::scalar_to_string(v).unwrap_or_default()),
                })
            })
            .collect(),
        Some(other) => string_list(other),
        None => Vec::new(),
    }
}

/// Folds the service's `env_file` entries into `environment`.
///
/// Files are read last to first and a line is only added when no existing
/// entry starts with its `KEY=`, so entries from earlier files and from
/// `environment` itself take precedence.
pub fn read_env_file(
    lookup: &dyn ResourceLookup,
    in_file: &str,
    mut service: RawService,
) -> Result<RawService> {
    let Some(env_file) = service.get("env_file") else {
        return Ok(service);
    };
    let env_files = string_list(env_file);
    if env_files.is_empty() {
        return Ok(service);
    }

    let mut vars = environment_list(service.get("environment"));

    for env_file in env_files.iter().rev() {
        let (content, _) = lookup.lookup(env_file, in_file)?;
        let content = String::from_utf8_lossy(&content);
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let key = match line.find('=') {
                Some(idx) => &line[..=idx],
                None => line,
            };
            if !vars.iter().any(|v| v.starts_with(key)) {
                vars.push(line.to_string());
            }
        }
    }

    service.insert(
        Value::from("environment"),
        Value::Sequence(vars.into_iter().map(Value::from).collect()),
    );
    service.remove("env_file");
    Ok(service)
}

/// Returns true for build contexts that name a remote (URL or git) source.
pub fn is_valid_remote(context: &str) -> bool {
    context.starts_with("http://")
        || context.starts_with("https://")
        || context.starts_with("git://")
        || context.starts_with("github.com/")
        || context.starts_with("git@")
}

fn parent_dir(file: &str) -> &str {
    match file.rfind('/') {
        Some(0) => "/",
        Some(idx) => &file[..idx],
        None => ".",
    }
}

fn join_path(dir: &str, rel: &str) -> String {
    if rel.starts_with('/') {
        return rel.to_string();
    }
    let mut parts: Vec<&str> = if dir.starts_with('/') { vec![""] } else { Vec::new() };
    for part in dir.split('/').chain(rel.split('/')) {
        match part {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&"..") | None => parts.push(".."),
                Some(&"") => {}
                Some(_) => {
                    parts.pop();
                }
            },
            part => parts.push(part),
        }
    }
    match parts.as_slice() {
        [] => ".".to_string(),
        [""] => "/".to_string(),
        _ => parts.join("/"),
    }
}

/// Rewrites a local build context to be relative to the declaring file's
/// directory. Remote contexts are left untouched.
pub fn resolve_context(in_file: &str, mut service: RawService) -> RawService {
    let mut build = match service.get("build") {
        Some(Value::String(context)) => {
            let mut map = Mapping::new();
            map.insert(Value::from("context"), Value::from(context.clone()));
            map
        }
        Some(Value::Mapping(map)) => map.clone(),
        _ => return service,
    };

    let context = as_string(build.get("context"));
    if context.is_empty() || is_valid_remote(&context) {
        return service;
    }

    let current = parent_dir(in_file);
    let resolved = if context == "." {
        current.to_string()
    } else {
        join_path(current, &context)
    };
    build.insert(Value::from("context"), Value::from(resolved));
    service.insert(Value::from("build"), Value::Mapping(build));
    service
}

/// Resolves `extends` (and `env_file`/build context) for one service.
///
/// `siblings` are the raw services of the document `in_file`, used when
/// `extends` names no file.
pub fn parse_service(
    lookup: &dyn ResourceLookup,
    vars: &HashMap<String, String>,
    in_file: &str,
    service: RawService,
    siblings: &RawServiceMap,
) -> Result<RawService> {
    let mut visiting = Vec::new();
    parse_service_inner(lookup, vars, in_file, service, siblings, &mut visiting)
}

fn parse_service_inner(
    lookup: &dyn ResourceLookup,
    vars: &HashMap<String, String>,
    in_file: &str,
    service: RawService,
    siblings: &RawServiceMap,
    visiting: &mut Vec<String>,
) -> Result<RawService> {
    let service = read_env_file(lookup, in_file, service)?;
    let service = resolve_context(in_file, service);

    let Some(Value::Mapping(extends)) = service.get("extends") else {
        return Ok(service);
    };
    let file = as_string(extends.get("file"));
    let name = as_string(extends.get("service"));
    if name.is_empty() {
        return Ok(service);
    }

    let marker = format!("{file}#{name}");
    if visiting.contains(&marker) {
        return Err(ComposeError::Extends(format!(
            "Circular reference extending service {name}"
        )));
    }
    visiting.push(marker);

    let base = if file.is_empty() {
        let Some(base) = siblings.get(&name) else {
            return Err(ComposeError::Extends(format!(
                "Failed to find service {name} to extend"
            )));
        };
        parse_service_inner(lookup, vars, in_file, base.clone(), siblings, visiting)?
    } else {
        let (contents, resolved) = lookup.lookup(&file, in_file).map_err(|e| {
            log::error!("Failed to lookup file {file}: {e}");
            e
        })?;
        let raw = create_raw_config(&String::from_utf8_lossy(&contents))?;
        let mut base_services = raw.services;
        interpolate_service_map(&mut base_services, vars)?;
        preprocess_service_map(&mut base_services);

        let Some(base) = base_services.get(&name).cloned() else {
            return Err(ComposeError::Extends(format!(
                "Failed to find service {name} in file {file}"
            )));
        };
        parse_service_inner(lookup, vars, &resolved, base, &base_services, visiting)?
    };
    visiting.pop();

    let source = if file.is_empty() { in_file } else { file.as_str() };
    for key in NO_MERGE {
        if base.contains_key(*key) {
            return Err(ComposeError::Extends(format!(
                "Cannot extend service '{name}' in {source}: services with '{key}' cannot be extended"
            )));
        }
    }

    log::debug!("Merging {base:?}, {service:?}");
    let mut merged = merge_config(base, service);
    merged.remove("extends");
    log::debug!("Merged result {merged:?}");
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::MemoryResourceLookup;

    fn raw(yaml: &str) -> RawService {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn services(yaml: &str) -> RawServiceMap {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn files(entries: &[(&str, &str)]) -> MemoryResourceLookup {
        MemoryResourceLookup::new(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.as_bytes().to_vec()))
                .collect(),
        )
    }

    #[test]
    fn test_env_file_appends_missing_keys() {
        let lookup = files(&[
            ("docker-compose.yml", ""),
            ("a.env", "# comment\nA=from-a\n\nC=from-a\n"),
            ("b.env", "B=from-b\nC=from-b\n"),
        ]);
        let service = raw("environment:\n  A: own\nenv_file: [a.env, b.env]\n");
        let service = read_env_file(&lookup, "docker-compose.yml", service).unwrap();
        assert!(service.get("env_file").is_none());
        let env: Vec<String> = serde_yaml::from_value(service["environment"].clone()).unwrap();
        assert_eq!(env, vec!["A=own", "B=from-b", "C=from-b"]);
    }

    #[test]
    fn test_env_file_missing_is_error() {
        let service = raw("env_file: nope.env\n");
        assert!(read_env_file(&files(&[]), "docker-compose.yml", service).is_err());
    }

    #[test]
    fn test_resolve_context() {
        let s = resolve_context("app/docker-compose.yml", raw("build: ."));
        assert_eq!(s["build"]["context"], Value::from("app"));
        let s = resolve_context("app/docker-compose.yml", raw("build:\n  context: ../web\n"));
        assert_eq!(s["build"]["context"], Value::from("web"));
        let s = resolve_context("/srv/app/compose.yml", raw("build: sub"));
        assert_eq!(s["build"]["context"], Value::from("/srv/app/sub"));
        let s = resolve_context("app/docker-compose.yml", raw("build: https://github.com/x/y.git"));
        assert_eq!(s["build"], Value::from("https://github.com/x/y.git"));
    }

    #[test]
    fn test_extends_sibling() {
        let siblings = services(
            "base:\n  image: nginx\n  environment: [A=1]\nweb:\n  extends:\n    service: base\n  environment: [B=2]\n",
        );
        let web = parse_service(
            &files(&[]),
            &HashMap::new(),
            "docker-compose.yml",
            siblings["web"].clone(),
            &siblings,
        )
        .unwrap();
        assert_eq!(web["image"], Value::from("nginx"));
        let env: Vec<String> = serde_yaml::from_value(web["environment"].clone()).unwrap();
        assert_eq!(env, vec!["A=1", "B=2"]);
    }

    #[test]
    fn test_extends_missing_sibling() {
        let siblings = services("web:\n  extends:\n    service: base\n");
        let err = parse_service(&files(&[]), &HashMap::new(), "f.yml", siblings["web"].clone(), &siblings)
            .unwrap_err();
        assert_eq!(err.to_string(), "Failed to find service base to extend");
    }

    #[test]
    fn test_extends_other_file_is_interpolated() {
        let lookup = files(&[
            ("docker-compose.yml", ""),
            ("common.yml", "base:\n  image: $IMAGE\n"),
        ]);
        let vars = HashMap::from([("IMAGE".to_string(), "redis".to_string())]);
        let siblings = services("web:\n  extends:\n    file: common.yml\n    service: base\n");
        let web = parse_service(&lookup, &vars, "docker-compose.yml", siblings["web"].clone(), &siblings)
            .unwrap();
        assert_eq!(web["image"], Value::from("redis"));

        let siblings = services("web:\n  extends:\n    file: common.yml\n    service: other\n");
        let err = parse_service(&lookup, &vars, "docker-compose.yml", siblings["web"].clone(), &siblings)
            .unwrap_err();
        assert_eq!(err.to_string(), "Failed to find service other in file common.yml");
    }

    #[test]
    fn test_extends_links_forbidden() {
        let siblings = services(
            "base:\n  image: nginx\n  links: [db]\nweb:\n  extends:\n    service: base\n",
        );
        let err = parse_service(&files(&[]), &HashMap::new(), "f.yml", siblings["web"].clone(), &siblings)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot extend service 'base' in f.yml: services with 'links' cannot be extended"
        );

        let lookup = files(&[
            ("f.yml", ""),
            ("common.yml", "base:\n  image: nginx\n  volumes_from: [data]\n"),
        ]);
        let siblings = services("web:\n  extends:\n    file: common.yml\n    service: base\n");
        let err = parse_service(&lookup, &HashMap::new(), "f.yml", siblings["web"].clone(), &siblings)
            .unwrap_err();
        assert!(err.to_string().contains("in common.yml: services with 'volumes_from'"));
    }

    #[test]
    fn test_extends_cycle_detected() {
        let siblings = services(
            "a:\n  extends:\n    service: b\nb:\n  extends:\n    service: a\n",
        );
        assert!(parse_service(&files(&[]), &HashMap::new(), "f.yml", siblings["a"].clone(), &siblings).is_err());
    }
}
