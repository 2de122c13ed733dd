//! BPF Route Synchronization Daemon for SONiC
//!
//! Keeps a kernel BPF route map (an IPv4 LPM trie pinned on bpffs) in step
//! with the routes the control plane wants: remote-workload routes learned
//! from node route events, plus a local-host route for every IPv4 address
//! assigned to one of this host's interfaces.
//!
//! # NIST 800-53 Rev 5 Control Mappings
//!
//! | Control | Description | Implementation |
//! |---------|-------------|----------------|
//! | AU-3 | Content of Audit Records | Structured logging with route keys |
//! | AU-12 | Audit Record Generation | Map changes and failures logged |
//! | CM-6 | Configuration Settings | YAML config with CLI overrides |
//! | CP-10 | System Recovery | Full resync on startup and after failures |
//! | SI-4 | System Monitoring | Pass statistics and Prometheus metrics |
//! | SI-10 | Input Validation | Unparsable and non-IPv4 input dropped |
//! | SI-11 | Error Handling | Structured error types |
//!
//! # Architecture
//!
//! ```text
//! +-----------------+     +--------------------+     +------------------+
//! |  Control plane  |     |   bpfroutesyncd    |     |  Linux kernel    |
//! |                 |     |                    |     |                  |
//! |  iface_addrs    |---->|  BpfRouteManager   |---->|  cali_v4_routes  |
//! |  route_update   |     |   desired routes   |     |  (LPM trie,      |
//! |  route_remove   |     |   dirty keys       |     |   bpffs pin)     |
//! |                 |     |        |           |     |                  |
//! +-----------------+     |        v           |     +------------------+
//!                         |   RouteMap trait   |
//!                         +--------------------+
//! ```
//!
//! Events only mutate in-memory state. The map is touched exclusively from
//! [`Orch::complete_deferred_work`], which the daemon calls on a timer.

pub mod config;
pub mod error;
pub mod events;
pub mod local_host;
pub mod metrics;
#[cfg(target_os = "linux")]
pub mod pinned_map;
pub mod route_map;
pub mod route_mgr;
pub mod types;

pub use config::{ConfigError, RetryPolicy, RouteSyncConfig};
pub use error::{Result, RouteSyncError};
pub use events::{DataplaneUpdate, IfaceAddrsUpdate, RouteKind, RouteRemove, RouteUpdate};
pub use metrics::RouteSyncMetrics;
#[cfg(target_os = "linux")]
pub use pinned_map::PinnedRouteMap;
pub use route_map::{MemoryRouteMap, RouteMap, RouteMapError, RouteMapResult};
pub use route_mgr::{BpfRouteManager, SyncStats};
pub use sonic_orch_common::Orch;
pub use types::{RouteKey, RouteType, RouteValue};
