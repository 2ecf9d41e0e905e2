//! Layering of configuration overlays.
//!
//! A value set in the overlay wins over the base. "Set" means non-empty for
//! strings, non-zero for ports, `true` for flags. Lists are appended.

use crate::config::schema::Config;

/// Layer `overlay` over `base`, returning the merged configuration.
pub fn merge(base: &Config, overlay: &Config) -> Config {
    let mut result = base.clone();

    merge_string(&mut result.log_level, &overlay.log_level);
    merge_string(&mut result.node_name, &overlay.node_name);
    merge_string(&mut result.datacenter, &overlay.datacenter);
    merge_string(&mut result.bind_addr, &overlay.bind_addr);
    merge_string(&mut result.client_addr, &overlay.client_addr);
    merge_string(&mut result.advertise_addr, &overlay.advertise_addr);
    merge_string(&mut result.encrypt, &overlay.encrypt);
    merge_string(&mut result.statsite_addr, &overlay.statsite_addr);

    if overlay.log_file.is_some() {
        result.log_file = overlay.log_file.clone();
    }

    if overlay.ports.http != 0 {
        result.ports.http = overlay.ports.http;
    }
    if overlay.ports.server != 0 {
        result.ports.server = overlay.ports.server;
    }

    result.server |= overlay.server;
    result.bootstrap |= overlay.bootstrap;
    result.verify_outgoing |= overlay.verify_outgoing;
    result.verify_incoming |= overlay.verify_incoming;

    result.start_join.extend(overlay.start_join.iter().cloned());
    result.services.extend(overlay.services.iter().cloned());
    result.checks.extend(overlay.checks.iter().cloned());

    result
}

fn merge_string(target: &mut String, value: &str) {
    if !value.is_empty() {
        *target = value.to_string();
    }
}
