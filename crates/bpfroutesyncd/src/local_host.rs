//! Local-host route derivation.
//!
//! Host addresses change rarely and there are few of them, so the whole set
//! of local-host routes is rebuilt from the interface address index whenever
//! the index changes. [`diff_routes`] then reduces the rebuild to the keys
//! that actually changed, so unchanged routes cause no map churn.

use sonic_types::IpPrefix;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

use crate::types::{RouteKey, RouteValue};

/// Interface name to the set of addresses assigned to it.
pub type AddrsByIface = HashMap<String, BTreeSet<String>>;

/// Route key to route value.
pub type RouteTable = HashMap<RouteKey, RouteValue>;

/// Builds a local-host route for every IPv4 address in the index.
///
/// IPv6 addresses are skipped; the route map is IPv4 only. Unparsable
/// addresses are logged and skipped.
pub fn local_host_routes(addrs_by_iface: &AddrsByIface) -> RouteTable {
    let mut routes = RouteTable::new();

    for (iface, addrs) in addrs_by_iface {
        debug!(iface = %iface, count = addrs.len(), "Adding IPs from interface");
        for addr in addrs {
            let prefix = match IpPrefix::parse_cidr_or_ip(addr) {
                Ok(prefix) => prefix,
                Err(e) => {
                    warn!(iface = %iface, addr = %addr, error = %e, "Ignoring unparsable interface address");
                    continue;
                }
            };
            let Some((v4_addr, prefix_len)) = prefix.as_ipv4() else {
                continue;
            };
            routes.insert(RouteKey::new(v4_addr, prefix_len), RouteValue::local_host());
        }
    }

    routes
}

/// Changes needed to move from one local-host route set to another.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RouteDelta {
    /// Keys that were present before but are now gone or changed.
    pub removed: Vec<RouteKey>,
    /// Entries that are new or changed.
    pub upserted: Vec<(RouteKey, RouteValue)>,
}

impl RouteDelta {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.upserted.is_empty()
    }
}

/// Computes the delta between two route tables.
///
/// A changed key appears in both lists; callers must apply removals first.
pub fn diff_routes(old: &RouteTable, new: &RouteTable) -> RouteDelta {
    let removed = old
        .iter()
        .filter(|(k, v)| new.get(*k) != Some(*v))
        .map(|(k, _)| *k)
        .collect();

    let upserted = new
        .iter()
        .filter(|(k, v)| old.get(*k) != Some(*v))
        .map(|(k, v)| (*k, *v))
        .collect();

    RouteDelta { removed, upserted }
}
