//! Untyped view of a compose document.
//!
//! A document is either version 1 (the top-level map is the service map) or
//! version 2 (`services:`, `containers:`, `volumes:` ... sections). Auxiliary
//! v2 sections (`load_balancers`, `storage_drivers`, ...) are folded into the
//! service map here so later stages only ever see services.

use indexmap::IndexMap;
use serde::Deserialize;
use serde_yaml::{Mapping, Value};

use crate::error::Result;

/// Raw field map of a single service.
pub type RawService = Mapping;

/// Raw services by name, in document order.
pub type RawServiceMap = IndexMap<String, RawService>;

/// Raw named entries of a non-service section.
pub type RawSection = IndexMap<String, Value>;

/// Catalog metadata key dropped from v1 documents.
pub const CATALOG_KEY: &str = ".catalog";

/// Image given to entries of `external_services`.
pub const EXTERNAL_SERVICE_IMAGE: &str = "rancher/external-service";

/// Image given to entries of `aliases`.
pub const DNS_SERVICE_IMAGE: &str = "rancher/dns-service";

/// Fields of an LB config that may be written at the top level of a
/// `load_balancers` entry.
pub const LB_CONFIG_FIELDS: &[&str] = &[
    "certs",
    "default_cert",
    "port_rules",
    "config",
    "stickiness_policy",
];

/// Fields of a storage driver that may be written at the top level of a
/// `storage_drivers` entry.
pub const STORAGE_DRIVER_FIELDS: &[&str] = &[
    "name",
    "scope",
    "volume_access_mode",
    "block_device_path",
    "volume_capabilities",
];

/// Fields of a network driver that may be written at the top level of a
/// `network_drivers` entry.
pub const NETWORK_DRIVER_FIELDS: &[&str] = &[
    "name",
    "default_network",
    "network_metadata",
    "cni_config",
];

/// A parsed, folded compose document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfig {
    #[serde(default, deserialize_with = "crate::de::opt_string")]
    pub version: Option<String>,
    #[serde(default)]
    pub services: RawServiceMap,
    #[serde(default)]
    pub containers: RawServiceMap,
    #[serde(default)]
    pub dependencies: RawSection,
    #[serde(default)]
    pub volumes: RawSection,
    #[serde(default)]
    pub networks: RawSection,
    #[serde(default)]
    pub hosts: RawSection,
    #[serde(default)]
    pub secrets: RawSection,

    #[serde(default)]
    pub load_balancers: RawServiceMap,
    #[serde(default)]
    pub storage_drivers: RawServiceMap,
    #[serde(default)]
    pub network_drivers: RawServiceMap,
    #[serde(default)]
    pub virtual_machines: RawServiceMap,
    #[serde(default)]
    pub external_services: RawServiceMap,
    #[serde(default)]
    pub aliases: RawServiceMap,
}

impl RawConfig {
    /// Returns true for a `version: "2"` document.
    pub fn is_v2(&self) -> bool {
        self.version.as_deref() == Some("2")
    }
}

/// Moves every field listed in `fields` from the top level of `service`
/// into a nested map under `prefix`.
pub fn transfer_fields(service: &mut RawService, prefix: &str, fields: &[&str]) {
    let mut nested = match service.remove(prefix) {
        Some(Value::Mapping(m)) => m,
        _ => Mapping::new(),
    };
    let mut moved = false;
    for field in fields {
        if let Some(value) = service.remove(*field) {
            nested.insert(Value::from(*field), value);
            moved = true;
        }
    }
    if moved || !nested.is_empty() {
        service.insert(Value::from(prefix), Value::Mapping(nested));
    }
}

/// Parses `contents` into a [`RawConfig`] and folds auxiliary sections into
/// the service map.
pub fn create_raw_config(contents: &str) -> Result<RawConfig> {
    let mut raw: RawConfig = if contents.trim().is_empty() {
        RawConfig::default()
    } else {
        serde_yaml::from_str(contents)?
    };

    if !raw.is_v2() {
        let mut services: RawServiceMap = if contents.trim().is_empty() {
            RawServiceMap::new()
        } else {
            serde_yaml::from_str::<Option<RawServiceMap>>(contents)?.unwrap_or_default()
        };
        services.shift_remove(CATALOG_KEY);
        raw = RawConfig {
            version: raw.version,
            services,
            ..RawConfig::default()
        };
        return Ok(raw);
    }

    for (name, mut lb) in std::mem::take(&mut raw.load_balancers) {
        transfer_fields(&mut lb, "lb_config", LB_CONFIG_FIELDS);
        raw.services.insert(name, lb);
    }
    for (name, mut driver) in std::mem::take(&mut raw.storage_drivers) {
        transfer_fields(&mut driver, "storage_driver", STORAGE_DRIVER_FIELDS);
        raw.services.insert(name, driver);
    }
    for (name, mut driver) in std::mem::take(&mut raw.network_drivers) {
        transfer_fields(&mut driver, "network_driver", NETWORK_DRIVER_FIELDS);
        raw.services.insert(name, driver);
    }
    for (name, mut vm) in std::mem::take(&mut raw.virtual_machines) {
        if !vm.contains_key("kind") {
            vm.insert(Value::from("kind"), Value::from("virtualMachine"));
        }
        raw.services.insert(name, vm);
    }
    for (name, mut external) in std::mem::take(&mut raw.external_services) {
        external.insert(Value::from("image"), Value::from(EXTERNAL_SERVICE_IMAGE));
        raw.services.insert(name, external);
    }
    for (name, mut alias) in std::mem::take(&mut raw.aliases) {
        if let Some(targets) = alias.remove("services") {
            alias.insert(Value::from("image"), Value::from(DNS_SERVICE_IMAGE));
            alias.insert(Value::from("links"), targets);
            raw.services.insert(name, alias);
        }
    }

    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get<'a>(service: &'a RawService, key: &str) -> Option<&'a Value> {
        service.get(key)
    }

    #[test]
    fn test_v1_document_is_flat_service_map() {
        let raw = create_raw_config(
            r#"
web:
  image: nginx
.catalog:
  version: 1.0
"#,
        )
        .unwrap();
        assert!(!raw.is_v2());
        assert_eq!(raw.services.len(), 1);
        assert!(raw.services.contains_key("web"));
        assert!(raw.volumes.is_empty());
    }

    #[test]
    fn test_v2_sections_default_to_empty() {
        let raw = create_raw_config("version: '2'\nservices:\n  web:\n    image: nginx\n").unwrap();
        assert!(raw.is_v2());
        assert_eq!(raw.services.len(), 1);
        assert!(raw.containers.is_empty());
        assert!(raw.hosts.is_empty());
        assert!(raw.secrets.is_empty());
    }

    #[test]
    fn test_numeric_version() {
        let raw = create_raw_config("version: 2\nservices: {}\n").unwrap();
        assert!(raw.is_v2());
    }

    #[test]
    fn test_load_balancer_fields_relocated() {
        let raw = create_raw_config(
            r#"
version: '2'
load_balancers:
  lb:
    image: rancher/lb-service-haproxy
    default_cert: mycert
    port_rules:
    - source_port: 80
      target_port: 8080
      service: web
"#,
        )
        .unwrap();
        let lb = &raw.services["lb"];
        assert!(get(lb, "port_rules").is_none());
        assert!(get(lb, "default_cert").is_none());
        let lb_config = get(lb, "lb_config").and_then(Value::as_mapping).unwrap();
        assert_eq!(lb_config.get("default_cert"), Some(&Value::from("mycert")));
        assert!(lb_config.get("port_rules").is_some());
        assert_eq!(get(lb, "image"), Some(&Value::from("rancher/lb-service-haproxy")));
    }

    #[test]
    fn test_driver_sections_relocated() {
        let raw = create_raw_config(
            r#"
version: '2'
storage_drivers:
  nfs:
    image: rancher/nfs
    scope: environment
network_drivers:
  ipsec:
    image: rancher/ipsec
    cni_config:
      a: b
"#,
        )
        .unwrap();
        let nfs = get(&raw.services["nfs"], "storage_driver").and_then(Value::as_mapping).unwrap();
        assert_eq!(nfs.get("scope"), Some(&Value::from("environment")));
        let ipsec = get(&raw.services["ipsec"], "network_driver").and_then(Value::as_mapping).unwrap();
        assert!(ipsec.get("cni_config").is_some());
    }

    #[test]
    fn test_external_services_and_aliases() {
        let raw = create_raw_config(
            r#"
version: '2'
external_services:
  ext:
    external_ips: [1.1.1.1]
aliases:
  dns:
    services: [web, db]
  ignored:
    foo: bar
virtual_machines:
  vm:
    image: rancher/vm
"#,
        )
        .unwrap();
        assert_eq!(get(&raw.services["ext"], "image"), Some(&Value::from(EXTERNAL_SERVICE_IMAGE)));
        let dns = &raw.services["dns"];
        assert_eq!(get(dns, "image"), Some(&Value::from(DNS_SERVICE_IMAGE)));
        assert!(get(dns, "services").is_none());
        assert_eq!(get(dns, "links").and_then(Value::as_sequence).map(Vec::len), Some(2));
        assert!(!raw.services.contains_key("ignored"));
        assert_eq!(get(&raw.services["vm"], "kind"), Some(&Value::from("virtualMachine")));
    }
}
