//! Inbound control-plane messages.
//!
//! The daemon receives these as one JSON object per line, e.g.
//!
//! ```text
//! {"event":"iface_addrs","name":"eth0","addrs":["10.0.0.1/32"]}
//! {"event":"route_update","type":"NODE_IP","dst":"10.65.0.0/26","gw":"10.0.0.2"}
//! {"event":"route_remove","type":"NODE_IP","dst":"10.65.0.0/26"}
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Route type as reported by the control plane.
///
/// Only [`RouteKind::NodeIp`] routes are programmed into the BPF route map;
/// every other kind is ignored by the route manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RouteKind {
    NodeIp,
    RemoteWorkload,
    RemoteHost,
    LocalWorkload,
    LocalHost,
    RemoteTunnel,
    LocalTunnel,
    #[serde(other)]
    Unknown,
}

/// Addresses currently assigned to one interface.
///
/// `addrs == None` (or an empty set) means the interface lost all of its
/// addresses or was deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IfaceAddrsUpdate {
    pub name: String,
    #[serde(default)]
    pub addrs: Option<BTreeSet<String>>,
}

impl IfaceAddrsUpdate {
    pub fn new<I, S>(name: impl Into<String>, addrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            addrs: Some(addrs.into_iter().map(Into::into).collect()),
        }
    }

    /// An update reporting that `name` has no addresses.
    pub fn removed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            addrs: None,
        }
    }
}

/// Route add or update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteUpdate {
    #[serde(rename = "type")]
    pub route_type: RouteKind,
    /// Destination prefix (CIDR or bare address).
    pub dst: String,
    /// Gateway (CIDR or bare address).
    #[serde(default)]
    pub gw: String,
}

impl RouteUpdate {
    pub fn new(route_type: RouteKind, dst: impl Into<String>, gw: impl Into<String>) -> Self {
        Self {
            route_type,
            dst: dst.into(),
            gw: gw.into(),
        }
    }
}

/// Route removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRemove {
    #[serde(rename = "type")]
    pub route_type: RouteKind,
    pub dst: String,
}

impl RouteRemove {
    pub fn new(route_type: RouteKind, dst: impl Into<String>) -> Self {
        Self {
            route_type,
            dst: dst.into(),
        }
    }
}

/// Every message the route manager accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DataplaneUpdate {
    IfaceAddrs(IfaceAddrsUpdate),
    RouteUpdate(RouteUpdate),
    RouteRemove(RouteRemove),
}

impl DataplaneUpdate {
    /// Decodes one JSON line.
    pub fn from_json(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

impl From<IfaceAddrsUpdate> for DataplaneUpdate {
    fn from(update: IfaceAddrsUpdate) -> Self {
        DataplaneUpdate::IfaceAddrs(update)
    }
}

impl From<RouteUpdate> for DataplaneUpdate {
    fn from(update: RouteUpdate) -> Self {
        DataplaneUpdate::RouteUpdate(update)
    }
}

impl From<RouteRemove> for DataplaneUpdate {
    fn from(update: RouteRemove) -> Self {
        DataplaneUpdate::RouteRemove(update)
    }
}
