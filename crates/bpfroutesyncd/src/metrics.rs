//! Prometheus metrics for bpfroutesyncd

use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry};
use std::sync::Arc;
use std::time::Duration;

use crate::route_mgr::SyncStats;

/// Metrics collector for the route manager.
#[derive(Clone)]
pub struct RouteSyncMetrics {
    // Counters
    pub route_adds_total: IntCounter,
    pub route_deletes_total: IntCounter,
    pub apply_failures_total: IntCounter,
    pub resyncs_total: IntCounter,

    // Gauges
    pub desired_routes: IntGauge,
    pub dirty_routes: IntGauge,

    // Histograms
    pub pass_duration_seconds: Histogram,

    // Registry for export
    pub registry: Arc<Registry>,
}

impl RouteSyncMetrics {
    /// Create a new metrics collector with its own registry
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let route_adds_total = IntCounter::with_opts(Opts::new(
            "bpfroutesyncd_route_adds_total",
            "Total number of route map entries written",
        ))?;
        registry.register(Box::new(route_adds_total.clone()))?;

        let route_deletes_total = IntCounter::with_opts(Opts::new(
            "bpfroutesyncd_route_deletes_total",
            "Total number of route map entries deleted",
        ))?;
        registry.register(Box::new(route_deletes_total.clone()))?;

        let apply_failures_total = IntCounter::with_opts(Opts::new(
            "bpfroutesyncd_apply_failures_total",
            "Total number of failed route map writes and deletes",
        ))?;
        registry.register(Box::new(apply_failures_total.clone()))?;

        let resyncs_total = IntCounter::with_opts(Opts::new(
            "bpfroutesyncd_resyncs_total",
            "Total number of full route map resyncs",
        ))?;
        registry.register(Box::new(resyncs_total.clone()))?;

        let desired_routes = IntGauge::with_opts(Opts::new(
            "bpfroutesyncd_desired_routes",
            "Current number of routes in the desired route table",
        ))?;
        registry.register(Box::new(desired_routes.clone()))?;

        let dirty_routes = IntGauge::with_opts(Opts::new(
            "bpfroutesyncd_dirty_routes",
            "Routes still pending after the last pass",
        ))?;
        registry.register(Box::new(dirty_routes.clone()))?;

        let pass_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "bpfroutesyncd_pass_duration_seconds",
                "Duration of convergence passes that changed the route map",
            )
            .buckets(vec![
                0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
            ]),
        )?;
        registry.register(Box::new(pass_duration_seconds.clone()))?;

        Ok(Self {
            route_adds_total,
            route_deletes_total,
            apply_failures_total,
            resyncs_total,
            desired_routes,
            dirty_routes,
            pass_duration_seconds,
            registry: Arc::new(registry),
        })
    }

    /// Records the outcome of one convergence pass.
    pub fn record_pass(&self, stats: &SyncStats, desired: usize, dirty: usize) {
        self.route_adds_total.inc_by(stats.num_adds);
        self.route_deletes_total.inc_by(stats.num_dels);
        self.apply_failures_total.inc_by(stats.num_failures);
        if stats.resynced {
            self.resyncs_total.inc();
        }
        self.desired_routes.set(gauge_value(desired));
        self.dirty_routes.set(gauge_value(dirty));
        if stats.made_changes() {
            self.observe_duration(stats.duration);
        }
    }

    fn observe_duration(&self, duration: Duration) {
        self.pass_duration_seconds.observe(duration.as_secs_f64());
    }

    /// Renders the registry in the Prometheus text exposition format.
    pub fn gather_text(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

fn gauge_value(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
