//! Kernel route map abstraction.
//!
//! The route manager only ever talks to the map through [`RouteMap`]. The
//! map stores opaque fixed-width bytes; encoding and decoding belong to the
//! caller (see [`crate::types`]).

use crate::types::{RouteKeyBytes, RouteValueBytes};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors reported by a route map backend.
#[derive(Debug, Error)]
pub enum RouteMapError {
    /// The map could not be created or opened.
    #[error("Route map {path} unavailable: {message}")]
    Unavailable { path: String, message: String },

    /// An operation was attempted before `ensure_exists()` succeeded.
    #[error("Route map not open")]
    NotOpen,

    /// The kernel rejected a lookup, update, delete or iteration step.
    #[error("Route map {operation} failed: {message}")]
    Operation {
        operation: &'static str,
        message: String,
    },
}

impl RouteMapError {
    pub fn unavailable(path: impl Into<String>, message: impl Into<String>) -> Self {
        RouteMapError::Unavailable {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn operation(operation: &'static str, message: impl Into<String>) -> Self {
        RouteMapError::Operation {
            operation,
            message: message.into(),
        }
    }
}

/// Result type for route map operations.
pub type RouteMapResult<T> = Result<T, RouteMapError>;

/// A kernel-resident route map.
///
/// All operations are synchronous. Implementations do not need to be
/// thread-safe; the route manager owns its map exclusively.
pub trait RouteMap {
    /// Creates or opens the map. Must be idempotent.
    fn ensure_exists(&mut self) -> RouteMapResult<()>;

    /// Visits every entry currently in the map.
    ///
    /// An error means the scan did not complete and the entries visited so
    /// far must not be taken as the full contents.
    fn iter(&self, visit: &mut dyn FnMut(RouteKeyBytes, RouteValueBytes)) -> RouteMapResult<()>;

    /// Inserts or overwrites one entry.
    fn update(&mut self, key: &RouteKeyBytes, value: &RouteValueBytes) -> RouteMapResult<()>;

    /// Deletes one entry. Deleting an absent key is not an error.
    fn delete(&mut self, key: &RouteKeyBytes) -> RouteMapResult<()>;
}

/// In-process route map, used for dry runs and as a test backend.
#[derive(Debug, Clone, Default)]
pub struct MemoryRouteMap {
    entries: BTreeMap<RouteKeyBytes, RouteValueBytes>,
    exists: bool,
}

impl MemoryRouteMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a map that already holds `entries`, as if left behind by a
    /// previous run.
    pub fn with_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (RouteKeyBytes, RouteValueBytes)>,
    {
        Self {
            entries: entries.into_iter().collect(),
            exists: true,
        }
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &RouteKeyBytes) -> Option<&RouteValueBytes> {
        self.entries.get(key)
    }

    pub fn entries(&self) -> &BTreeMap<RouteKeyBytes, RouteValueBytes> {
        &self.entries
    }
}

impl RouteMap for MemoryRouteMap {
    fn ensure_exists(&mut self) -> RouteMapResult<()> {
        self.exists = true;
        Ok(())
    }

    fn iter(&self, visit: &mut dyn FnMut(RouteKeyBytes, RouteValueBytes)) -> RouteMapResult<()> {
        if !self.exists {
            return Err(RouteMapError::NotOpen);
        }
        for (k, v) in &self.entries {
            visit(*k, *v);
        }
        Ok(())
    }

    fn update(&mut self, key: &RouteKeyBytes, value: &RouteValueBytes) -> RouteMapResult<()> {
        if !self.exists {
            return Err(RouteMapError::NotOpen);
        }
        self.entries.insert(*key, *value);
        Ok(())
    }

    fn delete(&mut self, key: &RouteKeyBytes) -> RouteMapResult<()> {
        if !self.exists {
            return Err(RouteMapError::NotOpen);
        }
        self.entries.remove(key);
        Ok(())
    }
}
