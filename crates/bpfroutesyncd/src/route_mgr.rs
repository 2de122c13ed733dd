//! BpfRouteManager - keeps the BPF route map in step with desired routes
//!
//! Events only touch in-memory state. All map I/O happens in
//! [`Orch::complete_deferred_work`], which applies the dirty keys and, when
//! scheduled, first reconciles against a full scan of the map.
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - SI-4: System Monitoring - Route table monitoring
//! - AU-12: Audit Record Generation - Log map changes and failures
//! - CP-10: System Recovery - Full resync on startup and after failures
//! - SC-7: Boundary Protection - Host and workload route programming

use sonic_orch_common::{DirtySet, Orch, RetryTracker};
use sonic_types::{IpPrefix, Ipv4Address};
use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

use crate::config::RetryPolicy;
use crate::error::{Result, RouteSyncError};
use crate::events::{DataplaneUpdate, IfaceAddrsUpdate, RouteKind, RouteRemove, RouteUpdate};
use crate::local_host::{diff_routes, local_host_routes, AddrsByIface, RouteTable};
use crate::metrics::RouteSyncMetrics;
use crate::route_map::RouteMap;
use crate::types::{RouteKey, RouteValue};

/// Outcome of one convergence pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Entries written to the map.
    pub num_adds: u64,
    /// Entries deleted from the map.
    pub num_dels: u64,
    /// Writes or deletes that failed and were left for a later pass.
    pub num_failures: u64,
    /// Whether this pass did a full resync scan.
    pub resynced: bool,
    pub duration: Duration,
}

impl SyncStats {
    /// True if the pass added or deleted anything.
    pub fn made_changes(&self) -> bool {
        self.num_adds > 0 || self.num_dels > 0
    }
}

/// Route manager for the BPF route map
///
/// # NIST Controls
/// - SI-4(4): System Monitoring - Automated reconciliation of dataplane state
/// - AU-6: Audit Record Review - Pass summaries available for analysis
pub struct BpfRouteManager {
    route_map: Box<dyn RouteMap + Send>,

    /// Everything that should be in the map.
    desired_routes: RouteTable,
    /// Keys whose map entry may not match `desired_routes`.
    dirty_routes: DirtySet<RouteKey>,
    resync_scheduled: bool,

    addrs_by_iface: AddrsByIface,
    /// Last derived local-host routes, used as the diff baseline.
    local_host_routes: RouteTable,
    local_host_ips_dirty: bool,

    retry_policy: RetryPolicy,
    failures: RetryTracker<RouteKey>,

    metrics: Option<RouteSyncMetrics>,
}

impl BpfRouteManager {
    /// Creates a manager that owns `route_map`.
    ///
    /// The first pass always does a full resync so that stale entries left
    /// behind by a previous run are removed.
    pub fn new(route_map: Box<dyn RouteMap + Send>) -> Self {
        Self {
            route_map,
            desired_routes: RouteTable::new(),
            dirty_routes: DirtySet::new(),
            resync_scheduled: true,
            addrs_by_iface: AddrsByIface::new(),
            local_host_routes: RouteTable::new(),
            local_host_ips_dirty: false,
            retry_policy: RetryPolicy::default(),
            failures: RetryTracker::new(),
            metrics: None,
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_metrics(mut self, metrics: RouteSyncMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Records the current address set of one interface.
    ///
    /// Local-host routes are recomputed lazily on the next pass.
    pub fn on_iface_addrs_update(&mut self, update: IfaceAddrsUpdate) {
        match update.addrs {
            Some(addrs) if !addrs.is_empty() => {
                debug!(iface = %update.name, count = addrs.len(), "Interface addresses updated");
                self.addrs_by_iface.insert(update.name, addrs);
            }
            _ => {
                debug!(iface = %update.name, "Interface has no addresses");
                self.addrs_by_iface.remove(&update.name);
            }
        }
        self.local_host_ips_dirty = true;
    }

    /// Adds or replaces a node route.
    pub fn on_route_update(&mut self, update: RouteUpdate) {
        if update.route_type != RouteKind::NodeIp {
            return;
        }
        let Some(key) = parse_route_key(&update.dst) else {
            return;
        };
        let Some(gateway) = parse_gateway(&update.gw) else {
            return;
        };

        debug!(key = %key, gateway = %gateway, "Node route updated");
        self.desired_routes
            .insert(key, RouteValue::remote_workload(gateway));
        self.dirty_routes.mark(key);
    }

    /// Removes a node route.
    ///
    /// The key is marked dirty even if it was never desired, so any entry
    /// for it in the map gets deleted.
    pub fn on_route_remove(&mut self, update: RouteRemove) {
        if update.route_type != RouteKind::NodeIp {
            return;
        }
        let Some(key) = parse_route_key(&update.dst) else {
            return;
        };

        debug!(key = %key, "Node route removed");
        self.desired_routes.remove(&key);
        self.dirty_routes.mark(key);
    }

    /// Rebuilds local-host routes from the interface index and folds the
    /// changes into the desired table.
    pub fn recalculate_local_host_routes(&mut self) {
        let new_routes = local_host_routes(&self.addrs_by_iface);
        let delta = diff_routes(&self.local_host_routes, &new_routes);

        for key in delta.removed {
            self.desired_routes.remove(&key);
            self.dirty_routes.mark(key);
        }
        for (key, value) in delta.upserted {
            self.desired_routes.insert(key, value);
            self.dirty_routes.mark(key);
        }

        self.local_host_routes = new_routes;
    }

    /// Forces a full scan of the map on the next pass.
    pub fn schedule_resync(&mut self) {
        self.resync_scheduled = true;
    }

    /// True if the next pass has anything to do.
    pub fn has_pending_work(&self) -> bool {
        self.resync_scheduled || self.local_host_ips_dirty || !self.dirty_routes.is_empty()
    }

    pub fn desired_routes(&self) -> &HashMap<RouteKey, RouteValue> {
        &self.desired_routes
    }

    pub fn is_resync_scheduled(&self) -> bool {
        self.resync_scheduled
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty_routes.len()
    }

    /// Addresses currently recorded for `iface`.
    pub fn iface_addrs(&self, iface: &str) -> Option<&BTreeSet<String>> {
        self.addrs_by_iface.get(iface)
    }

    /// Marks every desired key dirty, then scans the map and clears the keys
    /// that already hold the right value. Entries nobody wants are marked
    /// dirty so the apply step deletes them.
    #[instrument(skip_all)]
    fn resync(&mut self) -> Result<()> {
        info!("Doing full resync of BPF route map");

        self.dirty_routes.clear();
        self.dirty_routes
            .mark_all(self.desired_routes.keys().copied());

        let desired_routes = &self.desired_routes;
        let dirty_routes = &mut self.dirty_routes;
        let scan = self.route_map.iter(&mut |k, v| {
            let key = RouteKey::from_bytes(k);
            let value = RouteValue::from_bytes(v);

            match desired_routes.get(&key) {
                Some(desired) if *desired == value => {
                    debug!(key = %key, "Route already correct");
                    dirty_routes.discard(&key);
                }
                Some(_) => {
                    debug!(key = %key, value = %value, "Route present but incorrect");
                }
                None => {
                    debug!(key = %key, value = %value, "Route present but not desired");
                    dirty_routes.mark(key);
                }
            }
        });

        if let Err(e) = scan {
            error!(error = %e, "Failed to scan BPF route map");
            return Err(RouteSyncError::MapScan(e));
        }

        self.failures.reset();
        self.resync_scheduled = false;
        Ok(())
    }

    /// Writes or deletes every dirty key. Keys that fail stay dirty.
    fn apply_dirty_routes(&mut self, stats: &mut SyncStats) {
        let route_map = &mut self.route_map;
        let desired_routes = &self.desired_routes;
        let failures = &mut self.failures;
        let retry_policy = self.retry_policy;
        let mut resync_needed = false;

        self.dirty_routes.resolve_with(|key| {
            let result = match desired_routes.get(key) {
                None => {
                    debug!(key = %key, "Deleting route");
                    route_map.delete(key.as_bytes()).map(|()| stats.num_dels += 1)
                }
                Some(value) => {
                    debug!(key = %key, value = %value, "Writing route");
                    route_map
                        .update(key.as_bytes(), value.as_bytes())
                        .map(|()| stats.num_adds += 1)
                }
            };

            match result {
                Ok(()) => {
                    failures.clear(key);
                    true
                }
                Err(e) => {
                    error!(key = %key, error = %e, "Failed to update BPF route map entry");
                    stats.num_failures += 1;
                    match retry_policy {
                        RetryPolicy::ResyncOnFailure => resync_needed = true,
                        RetryPolicy::PerKey { max_attempts } => {
                            let attempts = failures.record_failure(*key);
                            if attempts >= max_attempts {
                                warn!(key = %key, attempts, "Route keeps failing, scheduling resync");
                                failures.clear(key);
                                resync_needed = true;
                            }
                        }
                    }
                    false
                }
            }
        });

        if resync_needed {
            self.resync_scheduled = true;
        }
    }
}

impl Orch for BpfRouteManager {
    type Update = DataplaneUpdate;
    type Error = RouteSyncError;
    type Summary = SyncStats;

    fn name(&self) -> &str {
        "BpfRouteManager"
    }

    fn on_update(&mut self, update: DataplaneUpdate) {
        match update {
            DataplaneUpdate::IfaceAddrs(update) => self.on_iface_addrs_update(update),
            DataplaneUpdate::RouteUpdate(update) => self.on_route_update(update),
            DataplaneUpdate::RouteRemove(update) => self.on_route_remove(update),
        }
    }

    /// Runs one convergence pass.
    ///
    /// Returns an error only if the map could not be opened or a full resync
    /// scan failed. Individual write failures are counted in the returned
    /// stats and retried later.
    fn complete_deferred_work(&mut self) -> Result<SyncStats> {
        let start = Instant::now();

        if let Err(e) = self.route_map.ensure_exists() {
            error!(error = %e, "Failed to create route map");
            return Err(RouteSyncError::MapCreate(e));
        }

        if self.local_host_ips_dirty {
            self.recalculate_local_host_routes();
            self.local_host_ips_dirty = false;
        }

        let mut stats = SyncStats::default();
        if self.resync_scheduled {
            self.resync()?;
            stats.resynced = true;
        }

        self.apply_dirty_routes(&mut stats);
        stats.duration = start.elapsed();

        if stats.made_changes() {
            info!(
                num_adds = stats.num_adds,
                num_dels = stats.num_dels,
                time_taken = ?stats.duration,
                "Completed updates to BPF routes"
            );
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_pass(&stats, self.desired_routes.len(), self.dirty_routes.len());
        }

        Ok(stats)
    }

    fn has_pending_tasks(&self) -> bool {
        self.has_pending_work()
    }

    fn dump_pending_tasks(&self) -> Vec<String> {
        let mut keys: Vec<RouteKey> = self.dirty_routes.iter().copied().collect();
        keys.sort();

        let mut tasks: Vec<String> = keys
            .into_iter()
            .map(|key| match self.desired_routes.get(&key) {
                Some(value) => format!("SET {} -> {}", key, value),
                None => format!("DEL {}", key),
            })
            .collect();
        if self.resync_scheduled {
            tasks.insert(0, "RESYNC".to_string());
        }
        tasks
    }
}

/// Parses a route destination. `None` for IPv6 or garbage.
fn parse_route_key(dst: &str) -> Option<RouteKey> {
    let prefix = match IpPrefix::parse_cidr_or_ip(dst) {
        Ok(prefix) => prefix,
        Err(e) => {
            warn!(dst = %dst, error = %e, "Ignoring route with unparsable destination");
            return None;
        }
    };
    let (addr, prefix_len) = prefix.as_ipv4()?;
    Some(RouteKey::new(addr, prefix_len))
}

/// Parses a gateway the same way as a destination, so a CIDR gateway is
/// masked to its network address.
fn parse_gateway(gw: &str) -> Option<Ipv4Address> {
    match IpPrefix::parse_cidr_or_ip(gw) {
        Ok(prefix) => prefix.as_ipv4().map(|(addr, _)| addr),
        Err(e) => {
            warn!(gw = %gw, error = %e, "Ignoring route with unparsable gateway");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route_map::{MemoryRouteMap, RouteMapError, RouteMapResult};
    use crate::types::{RouteKeyBytes, RouteValueBytes};
    use pretty_assertions::assert_eq;

    /// Route map whose operations fail on demand.
    #[derive(Default)]
    struct MockRouteMap {
        fail_ensure: bool,
        fail_iter: bool,
        fail_update: bool,
    }

    impl RouteMap for MockRouteMap {
        fn ensure_exists(&mut self) -> RouteMapResult<()> {
            if self.fail_ensure {
                return Err(RouteMapError::unavailable("/sys/fs/bpf/test", "EPERM"));
            }
            Ok(())
        }

        fn iter(&self, _visit: &mut dyn FnMut(RouteKeyBytes, RouteValueBytes)) -> RouteMapResult<()> {
            if self.fail_iter {
                return Err(RouteMapError::operation("iterate", "EIO"));
            }
            Ok(())
        }

        fn update(&mut self, _key: &RouteKeyBytes, _value: &RouteValueBytes) -> RouteMapResult<()> {
            if self.fail_update {
                return Err(RouteMapError::operation("update", "E2BIG"));
            }
            Ok(())
        }

        fn delete(&mut self, _key: &RouteKeyBytes) -> RouteMapResult<()> {
            Ok(())
        }
    }

    fn key(a: u8, b: u8, c: u8, d: u8, len: u8) -> RouteKey {
        RouteKey::new(Ipv4Address::new(a, b, c, d), len)
    }

    fn manager() -> BpfRouteManager {
        BpfRouteManager::new(Box::new(MemoryRouteMap::new()))
    }

    #[test]
    fn test_new_manager_schedules_resync() {
        let mgr = manager();
        assert!(mgr.is_resync_scheduled());
        assert!(mgr.has_pending_work());
        assert_eq!(mgr.dump_pending_tasks(), vec!["RESYNC".to_string()]);
    }

    #[test]
    fn test_route_update_marks_key_dirty() {
        let mut mgr = manager();
        mgr.on_route_update(RouteUpdate::new(RouteKind::NodeIp, "10.65.0.0/26", "10.0.0.2"));

        let k = key(10, 65, 0, 0, 26);
        assert_eq!(
            mgr.desired_routes().get(&k),
            Some(&RouteValue::remote_workload(Ipv4Address::new(10, 0, 0, 2)))
        );
        assert_eq!(mgr.dirty_count(), 1);
    }

    #[test]
    fn test_route_update_masks_destination_and_gateway() {
        let mut mgr = manager();
        mgr.on_route_update(RouteUpdate::new(RouteKind::NodeIp, "10.65.0.7/26", "10.0.0.2/24"));
        mgr.on_route_update(RouteUpdate::new(RouteKind::NodeIp, "10.65.1.0/26", "10.0.0.3"));

        let value = mgr.desired_routes().get(&key(10, 65, 0, 0, 26)).copied();
        assert_eq!(value.and_then(|v| v.next_hop()), Some(Ipv4Address::new(10, 0, 0, 0)));

        let value = mgr.desired_routes().get(&key(10, 65, 1, 0, 26)).copied();
        assert_eq!(value.and_then(|v| v.next_hop()), Some(Ipv4Address::new(10, 0, 0, 3)));
    }

    #[test]
    fn test_non_node_routes_ignored() {
        let mut mgr = manager();
        mgr.on_route_update(RouteUpdate::new(RouteKind::RemoteWorkload, "10.0.0.5/32", "10.0.0.2"));
        mgr.on_route_remove(RouteRemove::new(RouteKind::LocalHost, "10.0.0.5/32"));

        assert!(mgr.desired_routes().is_empty());
        assert_eq!(mgr.dirty_count(), 0);
    }

    #[test]
    fn test_ipv6_and_garbage_ignored() {
        let mut mgr = manager();
        mgr.on_route_update(RouteUpdate::new(RouteKind::NodeIp, "fd00::1/128", "fd00::2/128"));
        mgr.on_route_update(RouteUpdate::new(RouteKind::NodeIp, "10.0.0.1/32", "fd00::2"));
        mgr.on_route_update(RouteUpdate::new(RouteKind::NodeIp, "not-a-prefix", "10.0.0.2"));
        mgr.on_route_update(RouteUpdate::new(RouteKind::NodeIp, "10.0.0.1/32", ""));
        mgr.on_route_remove(RouteRemove::new(RouteKind::NodeIp, "fd00::1/128"));

        assert!(mgr.desired_routes().is_empty());
        assert_eq!(mgr.dirty_count(), 0);
    }

    #[test]
    fn test_route_remove_always_marks_dirty() {
        let mut mgr = manager();
        mgr.on_route_remove(RouteRemove::new(RouteKind::NodeIp, "10.65.0.0/26"));

        assert!(mgr.desired_routes().is_empty());
        assert_eq!(mgr.dirty_count(), 1);
    }

    #[test]
    fn test_empty_iface_update_removes_entry() {
        let mut mgr = manager();
        mgr.on_iface_addrs_update(IfaceAddrsUpdate::new("eth0", ["10.0.0.1"]));
        assert!(mgr.iface_addrs("eth0").is_some());

        mgr.on_iface_addrs_update(IfaceAddrsUpdate::new("eth0", Vec::<String>::new()));
        assert!(mgr.iface_addrs("eth0").is_none());

        mgr.on_iface_addrs_update(IfaceAddrsUpdate::new("eth0", ["10.0.0.1"]));
        mgr.on_iface_addrs_update(IfaceAddrsUpdate::removed("eth0"));
        assert!(mgr.iface_addrs("eth0").is_none());
    }

    #[test]
    fn test_on_update_dispatch() {
        let mut mgr = manager();
        mgr.on_update(RouteUpdate::new(RouteKind::NodeIp, "10.65.0.0/26", "10.0.0.2").into());
        mgr.on_update(DataplaneUpdate::RouteRemove(RouteRemove::new(
            RouteKind::NodeIp,
            "10.65.0.0/26",
        )));
        mgr.on_update(IfaceAddrsUpdate::new("eth0", ["10.0.0.1"]).into());

        assert!(mgr.desired_routes().is_empty());
        assert!(mgr.iface_addrs("eth0").is_some());
        assert_eq!(mgr.name(), "BpfRouteManager");
    }

    #[test]
    fn test_local_host_routes_folded_in_on_pass() {
        let mut mgr = manager();
        mgr.on_iface_addrs_update(IfaceAddrsUpdate::new("eth0", ["10.0.0.1/32"]));
        assert!(mgr.desired_routes().is_empty());

        let stats = mgr.complete_deferred_work().unwrap();
        assert_eq!(stats.num_adds, 1);
        assert_eq!(
            mgr.desired_routes().get(&key(10, 0, 0, 1, 32)),
            Some(&RouteValue::local_host())
        );

        mgr.on_iface_addrs_update(IfaceAddrsUpdate::new("eth0", ["10.0.0.1"]));
        let stats = mgr.complete_deferred_work().unwrap();
        assert_eq!(stats, SyncStats { duration: stats.duration, ..SyncStats::default() });
    }

    #[test]
    fn test_dump_pending_tasks() {
        let mut mgr = manager();
        mgr.complete_deferred_work().unwrap();

        mgr.on_route_update(RouteUpdate::new(RouteKind::NodeIp, "10.65.0.0/26", "10.0.0.2"));
        mgr.on_route_remove(RouteRemove::new(RouteKind::NodeIp, "10.66.0.0/26"));

        assert_eq!(
            mgr.dump_pending_tasks(),
            vec![
                "SET 10.65.0.0/26 -> remote-workload via 10.0.0.2".to_string(),
                "DEL 10.66.0.0/26".to_string(),
            ]
        );
        assert!(mgr.has_pending_tasks());
    }

    #[test]
    fn test_ensure_exists_failure_is_fatal() {
        let map = MockRouteMap {
            fail_ensure: true,
            ..Default::default()
        };
        let mut mgr = BpfRouteManager::new(Box::new(map));

        let err = mgr.complete_deferred_work().unwrap_err();
        assert!(matches!(err, RouteSyncError::MapCreate(_)));
        assert!(mgr.is_resync_scheduled());
    }

    #[test]
    fn test_scan_failure_is_fatal_and_keeps_resync_scheduled() {
        let map = MockRouteMap {
            fail_iter: true,
            ..Default::default()
        };
        let mut mgr = BpfRouteManager::new(Box::new(map));
        mgr.on_route_update(RouteUpdate::new(RouteKind::NodeIp, "10.65.0.0/26", "10.0.0.2"));

        let err = mgr.complete_deferred_work().unwrap_err();
        assert!(matches!(err, RouteSyncError::MapScan(_)));
        assert!(mgr.is_resync_scheduled());
        assert_eq!(mgr.dirty_count(), 1);
    }

    #[test]
    fn test_write_failure_schedules_resync() {
        let map = MockRouteMap {
            fail_update: true,
            ..Default::default()
        };
        let mut mgr = BpfRouteManager::new(Box::new(map));
        mgr.on_route_update(RouteUpdate::new(RouteKind::NodeIp, "10.65.0.0/26", "10.0.0.2"));

        let stats = mgr.complete_deferred_work().unwrap();
        assert_eq!(stats.num_adds, 0);
        assert_eq!(stats.num_failures, 1);
        assert!(stats.resynced);
        assert!(mgr.is_resync_scheduled());
        assert_eq!(mgr.dirty_count(), 1);
    }

    #[test]
    fn test_per_key_policy_escalates_after_max_attempts() {
        let map = MockRouteMap {
            fail_update: true,
            ..Default::default()
        };
        let mut mgr = BpfRouteManager::new(Box::new(map))
            .with_retry_policy(RetryPolicy::PerKey { max_attempts: 2 });
        mgr.on_route_update(RouteUpdate::new(RouteKind::NodeIp, "10.65.0.0/26", "10.0.0.2"));

        // Startup resync, then the first failure.
        let stats = mgr.complete_deferred_work().unwrap();
        assert!(stats.resynced);
        assert_eq!(stats.num_failures, 1);
        assert!(!mgr.is_resync_scheduled());
        assert_eq!(mgr.dirty_count(), 1);

        let stats = mgr.complete_deferred_work().unwrap();
        assert!(!stats.resynced);
        assert_eq!(stats.num_failures, 1);
        assert!(mgr.is_resync_scheduled());
    }

    #[test]
    fn test_metrics_recorded_per_pass() {
        let metrics = RouteSyncMetrics::new().unwrap();
        let mut mgr = manager().with_metrics(metrics.clone());
        mgr.on_route_update(RouteUpdate::new(RouteKind::NodeIp, "10.65.0.0/26", "10.0.0.2"));

        mgr.complete_deferred_work().unwrap();

        assert_eq!(metrics.route_adds_total.get(), 1);
        assert_eq!(metrics.resyncs_total.get(), 1);
        assert_eq!(metrics.desired_routes.get(), 1);
        assert_eq!(metrics.dirty_routes.get(), 0);
    }
}
