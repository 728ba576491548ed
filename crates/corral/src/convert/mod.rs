//! Conversion of resolved service configs into platform launch descriptors.

mod certs;
pub mod export;
pub mod lb_label;
mod launch_config;
mod load_balancer;
mod service;

pub use launch_config::{create_launch_configs, to_launch_config};
pub use load_balancer::{generate_haproxy_conf, legacy_port_rules};
pub use service::{container, container_config, service};

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::platform::LaunchConfig;

/// Image of the legacy label-driven load balancer.
pub const LEGACY_LB_IMAGE: &str = "rancher/load-balancer-service";
/// Setting holding the image that replaces [`LEGACY_LB_IMAGE`].
pub const LB_IMAGE_SETTING: &str = "lb.instance.image";

pub const LB_LABEL_PREFIX: &str = "io.rancher.loadbalancer";
pub const SELECTOR_LABEL_PREFIX: &str = "io.rancher.service.selector";
pub const HASH_LABEL: &str = "io.rancher.service.hash";
pub const SELECTOR_CONTAINER_LABEL: &str = "io.rancher.service.selector.container";
pub const SELECTOR_LINK_LABEL: &str = "io.rancher.service.selector.link";
pub const LB_TARGET_LABEL_PREFIX: &str = "io.rancher.loadbalancer.target.";
pub const SSL_PORTS_LABEL: &str = "io.rancher.loadbalancer.ssl.ports";
pub const PROXY_PROTOCOL_PORTS_LABEL: &str = "io.rancher.loadbalancer.proxy-protocol.ports";
pub const GLOBAL_LABEL: &str = "io.rancher.scheduler.global";

// Block I/O throttle kinds in a launch config's device options.
const READ_BPS: &str = "readBps";
const READ_IOPS: &str = "readIops";
const WRITE_BPS: &str = "writeBps";
const WRITE_IOPS: &str = "writeIops";
const WEIGHT: &str = "weight";

/// Content digest of a launch config, ignoring any [`HASH_LABEL`] it
/// already carries.
pub fn config_hash(config: &LaunchConfig) -> Result<String> {
    let mut config = config.clone();
    config.labels.shift_remove(HASH_LABEL);
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(&config)?);
    Ok(format!("{:x}", hasher.finalize()))
}

/// `snake_case` to `camelCase`: every character following an underscore is
/// upper-cased and the underscores are dropped.
pub fn to_camel_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut upper = false;
    for c in s.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Recursively rewrites every map key with [`to_camel_case`].
pub fn camel_case_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (to_camel_case(&k), camel_case_keys(v)))
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(camel_case_keys).collect()),
        other => other,
    }
}

/// `camelCase` back to `snake_case`.
pub fn to_snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for c in s.chars() {
        if c.is_ascii_uppercase() {
            out.push('_');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Recursively renames every object key with [`to_snake_case`].
pub fn snake_case_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (to_snake_case(&k), snake_case_keys(v)))
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(snake_case_keys).collect()),
        other => other,
    }
}

/// Serializes a compose section into its camelCase wire form.
pub(crate) fn to_wire<T: serde::Serialize>(section: &Option<T>) -> crate::Result<Option<Value>> {
    match section {
        Some(section) => Ok(Some(camel_case_keys(serde_json::to_value(section)?))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_to_camel_case() {
        assert_eq!(to_camel_case("engine_install_url"), "engineInstallUrl");
        assert_eq!(to_camel_case("name"), "name");
        assert_eq!(to_camel_case("a__b"), "aB");
    }

    #[test]
    fn test_to_snake_case() {
        assert_eq!(to_snake_case("responseTimeout"), "response_timeout");
        assert_eq!(to_snake_case("name"), "name");
        assert_eq!(snake_case_keys(json!({"requestLine": "GET /"})), json!({"request_line": "GET /"}));
    }

    #[test]
    fn test_camel_case_keys_nested() {
        let value = camel_case_keys(json!({
            "amazonec2_config": {"instance_type": "t2.micro", "tags": [{"tag_key": 1}]},
            "engine_opt": ["x_y"]
        }));
        assert_eq!(
            value,
            json!({
                "amazonec2Config": {"instanceType": "t2.micro", "tags": [{"tagKey": 1}]},
                "engineOpt": ["x_y"]
            })
        );
    }

    #[test]
    fn test_config_hash_ignores_hash_label() {
        let mut config = LaunchConfig {
            image: "nginx".into(),
            ..LaunchConfig::default()
        };
        let hash = config_hash(&config).unwrap();
        config.labels.insert(HASH_LABEL.into(), hash.clone());
        assert_eq!(config_hash(&config).unwrap(), hash);

        config.image = "nginx:1.25".into();
        assert_ne!(config_hash(&config).unwrap(), hash);
    }
}
