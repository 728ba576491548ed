//! Normalization passes run on raw services before extends and merge.

use serde_yaml::{Mapping, Value};

use crate::de::scalar_to_string;
use crate::raw::{RawService, RawServiceMap};

/// Fields whose list items (or map values) are strings.
const STRING_COLLECTION_FIELDS: &[&str] = &[
    "cap_add",
    "cap_drop",
    "devices",
    "dns",
    "dns_opt",
    "dns_search",
    "environment",
    "expose",
    "external_links",
    "extra_hosts",
    "group_add",
    "labels",
    "links",
    "ports",
    "security_opt",
    "sysctls",
    "tmpfs",
    "volumes",
    "volumes_from",
];

/// Top-level fields that hold integers.
const INT_FIELDS: &[&str] = &[
    "blkio_weight",
    "cpu_period",
    "cpu_quota",
    "cpu_shares",
    "mem_swappiness",
    "milli_cpu_reservation",
    "oom_score_adj",
    "scale",
    "scale_increment",
    "scale_max",
    "scale_min",
];

const HEALTH_CHECK_INT_FIELDS: &[&str] = &[
    "healthy_threshold",
    "initializing_timeout",
    "interval",
    "port",
    "reinitializing_timeout",
    "response_timeout",
    "unhealthy_threshold",
];

const PORT_RULE_INT_FIELDS: &[&str] = &["priority", "source_port", "target_port"];

fn stringify(value: &mut Value) {
    match value {
        Value::Sequence(items) => {
            for item in items.iter_mut() {
                if let Some(s) = scalar_to_string(item) {
                    if !matches!(item, Value::String(_)) {
                        *item = Value::String(s);
                    }
                }
            }
        }
        Value::Mapping(map) => {
            for (_, item) in map.iter_mut() {
                if matches!(item, Value::Bool(_) | Value::Number(_)) {
                    if let Some(s) = scalar_to_string(item) {
                        *item = Value::String(s);
                    }
                }
            }
        }
        _ => {}
    }
}

/// Turns numbers and booleans inside string-valued collections into
/// strings, so values from different documents compare and merge alike.
pub fn preprocess_service(service: &mut RawService) {
    for field in STRING_COLLECTION_FIELDS {
        if let Some(value) = service.get_mut(*field) {
            stringify(value);
        }
    }
}

pub fn preprocess_service_map(services: &mut RawServiceMap) {
    for service in services.values_mut() {
        preprocess_service(service);
    }
}

fn try_int(value: &mut Value) {
    if let Value::String(s) = value {
        if let Ok(n) = s.trim().parse::<i64>() {
            *value = Value::from(n);
        }
    }
}

fn try_int_fields(map: &mut Mapping, fields: &[&str]) {
    for field in fields {
        if let Some(value) = map.get_mut(*field) {
            try_int(value);
        }
    }
}

/// Converts numeric strings into integers for the known integer fields.
/// Values that do not parse are left alone for the typed conversion to
/// report.
pub fn try_convert_ints(service: &mut RawService) {
    try_int_fields(service, INT_FIELDS);

    if let Some(Value::Mapping(health_check)) = service.get_mut("health_check") {
        try_int_fields(health_check, HEALTH_CHECK_INT_FIELDS);
    }

    if let Some(Value::Mapping(lb_config)) = service.get_mut("lb_config") {
        if let Some(Value::Sequence(rules)) = lb_config.get_mut("port_rules") {
            for rule in rules.iter_mut() {
                if let Value::Mapping(rule) = rule {
                    try_int_fields(rule, PORT_RULE_INT_FIELDS);
                }
            }
        }
    }
}

pub fn try_convert_ints_map(services: &mut RawServiceMap) {
    for service in services.values_mut() {
        try_convert_ints(service);
    }
}
