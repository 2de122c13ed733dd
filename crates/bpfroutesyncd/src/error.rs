//! Error types for bpfroutesyncd
//!
//! Only conditions that leave the route map in an untrusted state surface
//! as errors. A single failed update or delete is handled inside the route
//! manager by scheduling a resync and never reaches the caller.

use thiserror::Error;

use crate::config::ConfigError;
use crate::route_map::RouteMapError;

/// Errors that stop bpfroutesyncd
#[derive(Debug, Error)]
pub enum RouteSyncError {
    /// The route map could not be created or opened
    #[error("Failed to create route map: {0}")]
    MapCreate(#[source] RouteMapError),

    /// A full resync scan did not complete
    #[error("Failed to scan BPF route map: {0}")]
    MapScan(#[source] RouteMapError),

    /// A control-plane message could not be decoded
    #[error("Failed to decode event: {0}")]
    Decode(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Metrics registration failed
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for bpfroutesyncd operations
pub type Result<T> = std::result::Result<T, RouteSyncError>;
