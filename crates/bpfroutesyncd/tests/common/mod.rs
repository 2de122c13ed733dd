//! Shared helpers for bpfroutesyncd integration tests.

#![allow(dead_code)]

use sonic_bpfroutesyncd::{
    MemoryRouteMap, RouteKey, RouteMap, RouteMapError, RouteMapResult, RouteValue,
};
use sonic_bpfroutesyncd::types::{RouteKeyBytes, RouteValueBytes};
use sonic_types::Ipv4Address;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
struct FakeState {
    map: MemoryRouteMap,
    fail_ensure: bool,
    fail_iter: bool,
    fail_updates: HashMap<RouteKeyBytes, u32>,
    fail_deletes: HashMap<RouteKeyBytes, u32>,
    updates: usize,
    deletes: usize,
}

/// Kernel map stand-in with failure injection.
///
/// Clones share state, so a test can keep one handle to inspect the map
/// after handing another to the route manager.
#[derive(Clone, Default)]
pub struct FakeRouteMap {
    state: Arc<Mutex<FakeState>>,
}

impl FakeRouteMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// A map that already holds `entries` from a previous run.
    pub fn with_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (RouteKey, RouteValue)>,
    {
        let map = MemoryRouteMap::with_entries(
            entries
                .into_iter()
                .map(|(k, v)| (*k.as_bytes(), *v.as_bytes())),
        );
        let fake = Self::default();
        fake.lock().map = map;
        fake
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    /// Boxes a handle for the route manager.
    pub fn boxed(&self) -> Box<dyn RouteMap + Send> {
        Box::new(self.clone())
    }

    pub fn fail_ensure_exists(&self, fail: bool) {
        self.lock().fail_ensure = fail;
    }

    pub fn fail_iter(&self, fail: bool) {
        self.lock().fail_iter = fail;
    }

    /// Makes the next `times` writes of `key` fail.
    pub fn fail_update(&self, key: RouteKey, times: u32) {
        self.lock().fail_updates.insert(*key.as_bytes(), times);
    }

    /// Makes the next `times` deletes of `key` fail.
    pub fn fail_delete(&self, key: RouteKey, times: u32) {
        self.lock().fail_deletes.insert(*key.as_bytes(), times);
    }

    /// Writes the map directly, behind the manager's back.
    pub fn poke(&self, key: RouteKey, value: RouteValue) {
        let mut state = self.lock();
        let _ = state.map.ensure_exists();
        let _ = state.map.update(key.as_bytes(), value.as_bytes());
    }

    pub fn entries(&self) -> BTreeMap<RouteKey, RouteValue> {
        self.lock()
            .map
            .entries()
            .iter()
            .map(|(k, v)| (RouteKey::from_bytes(*k), RouteValue::from_bytes(*v)))
            .collect()
    }

    pub fn get(&self, key: RouteKey) -> Option<RouteValue> {
        self.lock()
            .map
            .get(key.as_bytes())
            .map(|v| RouteValue::from_bytes(*v))
    }

    /// Successful writes and deletes so far.
    pub fn op_counts(&self) -> (usize, usize) {
        let state = self.lock();
        (state.updates, state.deletes)
    }
}

fn take_failure(failures: &mut HashMap<RouteKeyBytes, u32>, key: &RouteKeyBytes) -> bool {
    match failures.get_mut(key) {
        Some(remaining) if *remaining > 0 => {
            *remaining -= 1;
            true
        }
        _ => false,
    }
}

impl RouteMap for FakeRouteMap {
    fn ensure_exists(&mut self) -> RouteMapResult<()> {
        let mut state = self.lock();
        if state.fail_ensure {
            return Err(RouteMapError::unavailable("/sys/fs/bpf/fake", "EPERM"));
        }
        state.map.ensure_exists()
    }

    fn iter(&self, visit: &mut dyn FnMut(RouteKeyBytes, RouteValueBytes)) -> RouteMapResult<()> {
        let state = self.lock();
        if state.fail_iter {
            return Err(RouteMapError::operation("iterate", "EIO"));
        }
        state.map.iter(visit)
    }

    fn update(&mut self, key: &RouteKeyBytes, value: &RouteValueBytes) -> RouteMapResult<()> {
        let mut state = self.lock();
        if take_failure(&mut state.fail_updates, key) {
            return Err(RouteMapError::operation("update", "injected failure"));
        }
        state.map.update(key, value)?;
        state.updates += 1;
        Ok(())
    }

    fn delete(&mut self, key: &RouteKeyBytes) -> RouteMapResult<()> {
        let mut state = self.lock();
        if take_failure(&mut state.fail_deletes, key) {
            return Err(RouteMapError::operation("delete", "injected failure"));
        }
        state.map.delete(key)?;
        state.deletes += 1;
        Ok(())
    }
}

pub fn v4(a: u8, b: u8, c: u8, d: u8) -> Ipv4Address {
    Ipv4Address::new(a, b, c, d)
}

pub fn key(addr: Ipv4Address, prefix_len: u8) -> RouteKey {
    RouteKey::new(addr, prefix_len)
}
