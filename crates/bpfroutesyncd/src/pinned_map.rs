//! BPF route map pinned on bpffs, accessed through aya.
//!
//! The map itself is created and pinned by whoever loads the packet program.
//! This side only opens the pin and reads/writes entries.

use std::io;
use std::path::{Path, PathBuf};

use aya::maps::lpm_trie::{Key, LpmTrie};
use aya::maps::{Map, MapData, MapError};
use tracing::{debug, info};

use crate::route_map::{RouteMap, RouteMapError, RouteMapResult};
use crate::types::{RouteKeyBytes, RouteValueBytes};

type RouteTrie = LpmTrie<MapData, [u8; 4], RouteValueBytes>;

/// Route map backed by a pinned `BPF_MAP_TYPE_LPM_TRIE`.
pub struct PinnedRouteMap {
    pin_path: PathBuf,
    trie: Option<RouteTrie>,
}

impl PinnedRouteMap {
    /// Creates a handle for the map pinned at `pin_path`.
    ///
    /// Nothing is opened until [`RouteMap::ensure_exists`] is called.
    pub fn new(pin_path: impl AsRef<Path>) -> Self {
        Self {
            pin_path: pin_path.as_ref().to_path_buf(),
            trie: None,
        }
    }

    pub fn pin_path(&self) -> &Path {
        &self.pin_path
    }

    fn open(&self) -> RouteMapResult<RouteTrie> {
        let path = self.pin_path.display().to_string();
        let map_data = MapData::from_pin(&self.pin_path)
            .map_err(|e| RouteMapError::unavailable(&path, e.to_string()))?;
        RouteTrie::try_from(Map::LpmTrie(map_data))
            .map_err(|e| RouteMapError::unavailable(&path, format!("not an LPM trie: {}", e)))
    }

    fn trie(&self) -> RouteMapResult<&RouteTrie> {
        self.trie.as_ref().ok_or(RouteMapError::NotOpen)
    }

    fn trie_mut(&mut self) -> RouteMapResult<&mut RouteTrie> {
        self.trie.as_mut().ok_or(RouteMapError::NotOpen)
    }
}

fn to_trie_key(key: &RouteKeyBytes) -> Key<[u8; 4]> {
    let prefix_len = u32::from_ne_bytes([key[0], key[1], key[2], key[3]]);
    Key::new(prefix_len, [key[4], key[5], key[6], key[7]])
}

fn from_trie_key(key: &Key<[u8; 4]>) -> RouteKeyBytes {
    let mut bytes = [0u8; 8];
    bytes[..4].copy_from_slice(&key.prefix_len().to_ne_bytes());
    bytes[4..].copy_from_slice(&key.data());
    bytes
}

fn is_not_found(err: &MapError) -> bool {
    match err {
        MapError::KeyNotFound => true,
        MapError::SyscallError(e) => e.io_error.kind() == io::ErrorKind::NotFound,
        _ => false,
    }
}

impl RouteMap for PinnedRouteMap {
    fn ensure_exists(&mut self) -> RouteMapResult<()> {
        if self.trie.is_some() {
            return Ok(());
        }
        let trie = self.open()?;
        info!(pin = %self.pin_path.display(), "Opened BPF route map");
        self.trie = Some(trie);
        Ok(())
    }

    fn iter(&self, visit: &mut dyn FnMut(RouteKeyBytes, RouteValueBytes)) -> RouteMapResult<()> {
        for item in self.trie()?.iter() {
            let (key, value) = item.map_err(|e| RouteMapError::operation("iterate", e.to_string()))?;
            visit(from_trie_key(&key), value);
        }
        Ok(())
    }

    fn update(&mut self, key: &RouteKeyBytes, value: &RouteValueBytes) -> RouteMapResult<()> {
        self.trie_mut()?
            .insert(&to_trie_key(key), *value, 0)
            .map_err(|e| RouteMapError::operation("update", e.to_string()))
    }

    fn delete(&mut self, key: &RouteKeyBytes) -> RouteMapResult<()> {
        match self.trie_mut()?.remove(&to_trie_key(key)) {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => {
                debug!("Route already absent from BPF map");
                Ok(())
            }
            Err(e) => Err(RouteMapError::operation("delete", e.to_string())),
        }
    }
}
