//! Port rules from legacy load balancer ports, links and labels.
//!
//! A target label holds comma separated rules of the form
//! `[hostname(:|=)][source_port][/path=][target_port]`, read left to right
//! by a small positional scanner.

use corral_compose::{PortRule, ServiceConfig};

use crate::error::{Error, Result};

fn parse_port(s: &str) -> Result<i64> {
    s.parse::<i32>()
        .map(i64::from)
        .map_err(|_| Error::Config(format!("Invalid port \"{s}\"")))
}

fn parse_optional_port(s: &str) -> Result<i64> {
    if s.is_empty() {
        Ok(0)
    } else {
        parse_port(s)
    }
}

/// Reads a hostname, stopping after `=`/`:` or before `/`. A leading digit
/// means there is no hostname.
pub fn read_hostname(label: &str, pos: usize) -> (String, usize) {
    let bytes = label.as_bytes();
    match bytes.get(pos) {
        None => return (String::new(), pos),
        Some(c) if c.is_ascii_digit() => return (String::new(), pos),
        Some(_) => {}
    }
    let mut end = pos;
    while end < bytes.len() {
        match bytes[end] {
            b'=' | b':' => return (label[pos..end].to_string(), end + 1),
            b'/' => return (label[pos..end].to_string(), end),
            _ => end += 1,
        }
    }
    (label[pos..].to_string(), end)
}

/// Reads the run of ASCII digits starting at `pos`.
pub fn read_port(label: &str, pos: usize) -> (String, usize) {
    let bytes = label.as_bytes();
    let mut end = pos;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    (label.get(pos..end).unwrap_or_default().to_string(), end)
}

/// Reads a path, stopping after `=`.
pub fn read_path(label: &str, pos: usize) -> (String, usize) {
    let bytes = label.as_bytes();
    let mut end = pos;
    while end < bytes.len() {
        if bytes[end] == b'=' {
            return (label[pos..end].to_string(), end + 1);
        }
        end += 1;
    }
    (label.get(pos..).unwrap_or_default().to_string(), end)
}

/// Parses a `io.rancher.loadbalancer.target.<svc>` label.
pub fn convert_lb_label(label: &str) -> Result<Vec<PortRule>> {
    let mut rules = Vec::new();

    for part in label.split(',') {
        let part = part.trim_matches([' ', '\t', '\n']);

        let (hostname, pos) = read_hostname(part, 0);
        let (source, pos) = read_port(part, pos);
        let (path, pos) = read_path(part, pos);
        let (target, _) = read_port(part, pos);

        let source = parse_optional_port(&source)?;
        let target = parse_optional_port(&target)?;

        if hostname.is_empty() && path.is_empty() && target == 0 {
            rules.push(PortRule {
                target_port: source,
                ..PortRule::default()
            });
        } else if target == 0 && part.contains('=') {
            rules.push(PortRule {
                hostname,
                target_port: source,
                ..PortRule::default()
            });
        } else {
            rules.push(PortRule {
                hostname,
                source_port: source,
                path,
                target_port: target,
                ..PortRule::default()
            });
        }
    }

    Ok(rules)
}

/// Applies label overrides onto base rules. An override matches a base rule
/// with the same service when its source port is zero or equal; each match
/// yields a copy of the base rule with the override's hostname, path and
/// (nonzero) target port. Unmatched base rules pass through.
pub fn merge_port_rules(base: &[PortRule], overrides: &[PortRule]) -> Vec<PortRule> {
    let mut merged = Vec::new();
    for base_rule in base {
        let before = merged.len();
        for over in overrides {
            if base_rule.service == over.service
                && (over.source_port == 0 || base_rule.source_port == over.source_port)
            {
                let mut rule = base_rule.clone();
                rule.path = over.path.clone();
                rule.hostname = over.hostname.clone();
                if over.target_port != 0 {
                    rule.target_port = over.target_port;
                }
                merged.push(rule);
            }
        }
        if merged.len() == before {
            merged.push(base_rule.clone());
        }
    }
    merged
}

/// Source and target ports of a `source:target` or bare port spec.
fn port_pair(port: &str) -> Result<(i64, i64)> {
    let parts: Vec<&str> = port.split(':').collect();
    match parts.as_slice() {
        [single] => {
            let (digits, _) = read_port(single, 0);
            let value = parse_port(&digits)?;
            Ok((value, value))
        }
        [source, target] => {
            let (digits, _) = read_port(target, 0);
            Ok((parse_port(source)?, parse_port(&digits)?))
        }
        _ => Ok((0, 0)),
    }
}

fn protocol_of(port: &str) -> Option<&str> {
    let parts: Vec<&str> = port.split('/').collect();
    match parts.as_slice() {
        [_, protocol] => Some(protocol),
        _ => None,
    }
}

/// One rule per port and link target, plus one per port for `selector`.
pub fn convert_lb(
    ports: &[String],
    links: &[String],
    external_links: &[String],
    selector: &str,
) -> Result<Vec<PortRule>> {
    let mut rules = Vec::new();

    for port in ports {
        let protocol = protocol_of(port).unwrap_or("http").to_string();
        let (source_port, target_port) = port_pair(port)?;

        let rule = |service: &str, selector: &str| PortRule {
            source_port,
            target_port,
            service: service.to_string(),
            selector: selector.to_string(),
            protocol: protocol.clone(),
            ..PortRule::default()
        };

        for link in links.iter().chain(external_links) {
            let service = link.split(':').next().unwrap_or_default();
            rules.push(rule(service, ""));
        }
        if !selector.is_empty() {
            rules.push(rule("", selector));
        }
    }

    Ok(rules)
}

/// Drops the target half of every port so the load balancer only publishes
/// its source ports.
pub fn rewrite_ports(ports: &[String]) -> Result<Vec<String>> {
    let mut rewritten = Vec::with_capacity(ports.len());

    for port in ports {
        let parts: Vec<&str> = port.split(':').collect();
        let source = match parts.as_slice() {
            [single] => read_port(single, 0).0,
            [source, _] => source.to_string(),
            _ => String::new(),
        };
        match protocol_of(port) {
            Some(protocol) => rewritten.push(format!("{source}/{protocol}")),
            None => rewritten.push(source),
        }
    }

    Ok(rewritten)
}

/// A link target: service name and optional alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub service_name: String,
    pub alias: String,
}

pub fn links_of(config: &ServiceConfig) -> Vec<Link> {
    config
        .links
        .iter()
        .chain(&config.external_links)
        .map(|link| {
            let (name, alias) = link.split_once(':').unwrap_or((link, ""));
            Link {
                service_name: name.trim().to_string(),
                alias: alias.trim().to_string(),
            }
        })
        .collect()
}
