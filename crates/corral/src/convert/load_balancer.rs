use corral_compose::{PortRule as ComposePortRule, ServiceConfig, StickinessPolicy as ComposeStickiness};

use super::certs::populate_certs;
use super::lb_label::{convert_lb, convert_lb_label, links_of, merge_port_rules, rewrite_ports};
use super::{
    LB_TARGET_LABEL_PREFIX, LEGACY_LB_IMAGE, PROXY_PROTOCOL_PORTS_LABEL, SELECTOR_LINK_LABEL,
    SSL_PORTS_LABEL,
};
use crate::error::{Error, Result};
use crate::lookup::ServerResourceLookup;
use crate::platform::{LbConfig, PortRule, Service, StickinessPolicy};

/// Indents a haproxy section body under its header.
fn section(name: &str, body: &str) -> String {
    format!("{name}{}", format!("\n{body}").replace('\n', "\n    "))
}

/// Custom haproxy configuration. Legacy `global`/`defaults` blocks win over
/// the `lb_config.config` string.
pub fn generate_haproxy_conf(config: &ServiceConfig) -> String {
    let legacy = config
        .legacy_load_balancer_config
        .as_ref()
        .and_then(|legacy| legacy.haproxy_config.as_ref());
    let Some(haproxy) = legacy else {
        return config
            .lb_config
            .as_ref()
            .map(|lb| lb.config.clone())
            .unwrap_or_default();
    };

    let mut conf = String::new();
    if !haproxy.global.is_empty() {
        conf.push_str(&section("global", &haproxy.global));
        conf.push('\n');
    }
    if !haproxy.defaults.is_empty() {
        conf.push_str(&section("defaults", &haproxy.defaults));
    }
    conf
}

fn stickiness(policy: &ComposeStickiness) -> StickinessPolicy {
    StickinessPolicy {
        name: policy.name.clone(),
        cookie: policy.cookie.clone(),
        domain: policy.domain.clone(),
        indirect: policy.indirect,
        nocache: policy.nocache,
        postonly: policy.postonly,
        mode: policy.mode.clone(),
    }
}

fn stickiness_policy(config: &ServiceConfig) -> Option<StickinessPolicy> {
    let legacy = config
        .legacy_load_balancer_config
        .as_ref()
        .and_then(|legacy| legacy.lb_cookie_stickiness_policy.as_ref());
    match legacy {
        Some(policy) => Some(stickiness(policy)),
        None => config
            .lb_config
            .as_ref()
            .and_then(|lb| lb.stickiness_policy.as_ref())
            .map(stickiness),
    }
}

fn parse_ports(label: &str) -> Result<Vec<i64>> {
    label
        .split(',')
        .map(|port| {
            port.trim()
                .parse::<i32>()
                .map(i64::from)
                .map_err(|_| Error::Config(format!("Invalid port \"{port}\"")))
        })
        .collect()
}

/// Port rules and extra haproxy configuration derived from a legacy load
/// balancer's ports, links and labels.
pub fn legacy_port_rules(config: &ServiceConfig) -> Result<(Vec<ComposePortRule>, String)> {
    let mut rules = convert_lb(&config.ports, &config.links, &config.external_links, "")?;
    rules.extend(convert_lb(&config.expose, &config.links, &config.external_links, "")?);

    if let Some(selector) = config.labels.get(SELECTOR_LINK_LABEL) {
        rules.extend(convert_lb(&config.ports, &[], &[], selector)?);
        rules.extend(convert_lb(&config.expose, &[], &[], selector)?);
    }

    for link in links_of(config) {
        let label = format!("{LB_TARGET_LABEL_PREFIX}{}", link.service_name);
        if let Some(value) = config.labels.get(&label) {
            let mut overrides = convert_lb_label(value)?;
            for rule in &mut overrides {
                rule.service.clone_from(&link.service_name);
            }
            rules = merge_port_rules(&rules, &overrides);
        }
    }

    if let Some(ports) = config.labels.get(SSL_PORTS_LABEL) {
        for port in parse_ports(ports)? {
            for rule in rules.iter_mut().filter(|rule| rule.source_port == port) {
                rule.protocol = "https".to_string();
            }
        }
    }

    let mut haproxy = String::new();
    if let Some(ports) = config.labels.get(PROXY_PROTOCOL_PORTS_LABEL) {
        for port in ports.split(',') {
            haproxy.push_str(&format!("\nfrontend {port}\n    accept-proxy"));
        }
    }

    Ok((rules, haproxy))
}

async fn resolve_rule(lookup: &dyn ServerResourceLookup, rule: &ComposePortRule) -> Result<PortRule> {
    let mut resolved = PortRule {
        hostname: rule.hostname.clone(),
        path: rule.path.clone(),
        source_port: rule.source_port,
        target_port: rule.target_port,
        protocol: rule.protocol.clone(),
        priority: rule.priority,
        backend_name: rule.backend_name.clone(),
        selector: rule.selector.clone(),
        ..PortRule::default()
    };

    if !rule.service.is_empty() {
        let Some(service) = lookup.service(&rule.service).await? else {
            return Err(Error::DependencyNotFound(format!(
                "Failed to find existing service: {}",
                rule.service
            )));
        };
        resolved.service_id = service.id;
    }

    if !rule.container.is_empty() {
        let Some(container) = lookup.container(&rule.container).await? else {
            return Err(Error::DependencyNotFound(format!(
                "Failed to find existing container: {}",
                rule.container
            )));
        };
        resolved.instance_id = container.id;
    }

    Ok(resolved)
}

/// Fills the load balancer section of `service`. Only applies to services
/// with an `lb_config` or running the legacy load balancer image.
pub(crate) async fn populate_lb(
    lookup: &dyn ServerResourceLookup,
    config: &ServiceConfig,
    service: &mut Service,
) -> Result<()> {
    let legacy = config.image == LEGACY_LB_IMAGE;
    if !legacy && config.lb_config.is_none() {
        return Ok(());
    }
    let lb = config.lb_config.clone().unwrap_or_default();

    let mut lb_config = LbConfig {
        config: generate_haproxy_conf(config),
        stickiness_policy: stickiness_policy(config),
        ..LbConfig::default()
    };

    let mut rules = lb.port_rules.clone();
    if legacy {
        let (legacy_rules, haproxy) = legacy_port_rules(config)?;
        lb_config.config.push_str(&haproxy);
        rules.extend(legacy_rules);
    }

    for rule in &rules {
        lb_config.port_rules.push(resolve_rule(lookup, rule).await?);
    }

    if legacy {
        if let Some(launch_config) = service.launch_config.as_mut() {
            launch_config.ports = rewrite_ports(&config.ports)?;
            launch_config.expose.clear();
        }
    }

    let (default_cert, certs) = if lb.default_cert.is_empty() && lb.certs.is_empty() {
        (config.default_cert.as_str(), config.certs.as_slice())
    } else {
        (lb.default_cert.as_str(), lb.certs.as_slice())
    };
    populate_certs(lookup, &mut lb_config, default_cert, certs).await?;

    service.lb_config = Some(lb_config);
    Ok(())
}
