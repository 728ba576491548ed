use corral_compose::{LbConfig, ServiceConfig};
use indexmap::{IndexMap, IndexSet};

use crate::convert::LEGACY_LB_IMAGE;
use crate::error::{Error, Result};

const MAX_PASSES: usize = 100;

fn has_service_rules(lb: &LbConfig) -> bool {
    lb.port_rules.iter().any(|rule| !rule.service.is_empty())
}

/// Creation order: containers, then plain services, then load balancers
/// once everything they target has been placed.
///
/// An LB with `lb_config` waits for every service named by its port rules;
/// selector rules name nothing and impose no constraint. A legacy LB waits
/// for every link target (the alias after `:` when given).
pub fn service_order(
    containers: &IndexMap<String, ServiceConfig>,
    services: &IndexMap<String, ServiceConfig>,
) -> Result<Vec<String>> {
    let mut order: IndexSet<String> = containers.keys().cloned().collect();

    for (name, config) in services {
        if config.image == LEGACY_LB_IMAGE {
            continue;
        }
        if config.lb_config.as_ref().is_some_and(has_service_rules) {
            continue;
        }
        order.insert(name.clone());
    }

    for _ in 0..MAX_PASSES {
        let placed = order.len();
        for (name, config) in services {
            let ready = if let Some(lb) = &config.lb_config {
                lb.port_rules
                    .iter()
                    .filter(|rule| !rule.service.is_empty())
                    .all(|rule| order.contains(&rule.service))
            } else if config.image == LEGACY_LB_IMAGE {
                config.links.iter().all(|link| {
                    let target = link.split_once(':').map_or(link.as_str(), |(_, alias)| alias);
                    order.contains(target)
                })
            } else {
                continue;
            };
            if ready {
                order.insert(name.clone());
            }
        }
        if order.len() == placed {
            break;
        }
    }

    if order.len() != containers.len() + services.len() {
        return Err(Error::Ordering);
    }
    Ok(order.into_iter().collect())
}
