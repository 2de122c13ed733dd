//! Route key and value encodings shared with the BPF route map.
//!
//! Both types are fixed-size byte arrays laid out exactly as the packet
//! program reads them, so equality is byte-exact.
//!
//! ```text
//! RouteKey   (8 bytes): | prefix_len: u32 (host order) | addr: [u8; 4] (network order) |
//! RouteValue (8 bytes): | route type: u32 (host order) | next hop: [u8; 4] (network order) |
//! ```
//!
//! The key layout matches the kernel's LPM-trie key (`struct bpf_lpm_trie_key`).

use sonic_types::Ipv4Address;
use std::fmt;

/// Size of an encoded [`RouteKey`] in bytes.
pub const ROUTE_KEY_SIZE: usize = 8;

/// Size of an encoded [`RouteValue`] in bytes.
pub const ROUTE_VALUE_SIZE: usize = 8;

/// Raw key bytes as stored in the kernel map.
pub type RouteKeyBytes = [u8; ROUTE_KEY_SIZE];

/// Raw value bytes as stored in the kernel map.
pub type RouteValueBytes = [u8; ROUTE_VALUE_SIZE];

/// Kind of route stored in the map.
///
/// Discriminants are part of the map ABI.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteType {
    Unknown = 0,
    /// Workload on another host, reached via its host's address.
    RemoteWorkload = 1,
    RemoteHost = 2,
    /// Address assigned to one of this host's interfaces.
    LocalHost = 3,
    LocalWorkload = 4,
}

impl RouteType {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => RouteType::RemoteWorkload,
            2 => RouteType::RemoteHost,
            3 => RouteType::LocalHost,
            4 => RouteType::LocalWorkload,
            _ => RouteType::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RouteType::Unknown => "unknown",
            RouteType::RemoteWorkload => "remote-workload",
            RouteType::RemoteHost => "remote-host",
            RouteType::LocalHost => "local-host",
            RouteType::LocalWorkload => "local-workload",
        }
    }
}

impl fmt::Display for RouteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Destination prefix key of the route map.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteKey(RouteKeyBytes);

impl RouteKey {
    /// Encodes `addr/prefix_len`, clearing host bits past the prefix.
    ///
    /// Lengths above 32 are clamped to 32.
    pub fn new(addr: Ipv4Address, prefix_len: u8) -> Self {
        let prefix_len = prefix_len.min(32);
        let mut bytes = [0u8; ROUTE_KEY_SIZE];
        bytes[..4].copy_from_slice(&u32::from(prefix_len).to_ne_bytes());
        bytes[4..].copy_from_slice(&addr.mask(prefix_len).octets());
        RouteKey(bytes)
    }

    /// Wraps raw bytes read back from the kernel map.
    pub const fn from_bytes(bytes: RouteKeyBytes) -> Self {
        RouteKey(bytes)
    }

    pub const fn as_bytes(&self) -> &RouteKeyBytes {
        &self.0
    }

    pub fn prefix_len(&self) -> u32 {
        u32::from_ne_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    pub fn addr(&self) -> Ipv4Address {
        Ipv4Address::from_octets([self.0[4], self.0[5], self.0[6], self.0[7]])
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr(), self.prefix_len())
    }
}

impl fmt::Debug for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RouteKey({})", self)
    }
}

/// Route type plus optional next hop.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RouteValue(RouteValueBytes);

impl RouteValue {
    /// Encodes a route with no next hop (e.g. a local-host route).
    pub fn new(route_type: RouteType) -> Self {
        let mut bytes = [0u8; ROUTE_VALUE_SIZE];
        bytes[..4].copy_from_slice(&(route_type as u32).to_ne_bytes());
        RouteValue(bytes)
    }

    /// Encodes a route forwarded via `next_hop`.
    pub fn with_next_hop(route_type: RouteType, next_hop: Ipv4Address) -> Self {
        let mut value = Self::new(route_type);
        value.0[4..].copy_from_slice(&next_hop.octets());
        value
    }

    /// Shorthand for a local-host route value.
    pub fn local_host() -> Self {
        Self::new(RouteType::LocalHost)
    }

    /// Shorthand for a remote-workload route via `gateway`.
    pub fn remote_workload(gateway: Ipv4Address) -> Self {
        Self::with_next_hop(RouteType::RemoteWorkload, gateway)
    }

    pub const fn from_bytes(bytes: RouteValueBytes) -> Self {
        RouteValue(bytes)
    }

    pub const fn as_bytes(&self) -> &RouteValueBytes {
        &self.0
    }

    pub fn route_type(&self) -> RouteType {
        RouteType::from_raw(u32::from_ne_bytes([
            self.0[0], self.0[1], self.0[2], self.0[3],
        ]))
    }

    /// Returns the next hop, or `None` when the field is all zeroes.
    pub fn next_hop(&self) -> Option<Ipv4Address> {
        let octets = [self.0[4], self.0[5], self.0[6], self.0[7]];
        if octets == [0; 4] {
            None
        } else {
            Some(Ipv4Address::from_octets(octets))
        }
    }
}

impl fmt::Display for RouteValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.next_hop() {
            Some(nh) => write!(f, "{} via {}", self.route_type(), nh),
            None => write!(f, "{}", self.route_type()),
        }
    }
}

impl fmt::Debug for RouteValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RouteValue({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_route_key_layout() {
        let key = RouteKey::new(Ipv4Address::new(10, 0, 1, 0), 24);
        let bytes = key.as_bytes();

        assert_eq!(&bytes[..4], &24u32.to_ne_bytes());
        assert_eq!(&bytes[4..], &[10, 0, 1, 0]);
        assert_eq!(key.prefix_len(), 24);
        assert_eq!(key.addr(), Ipv4Address::new(10, 0, 1, 0));
        assert_eq!(key.to_string(), "10.0.1.0/24");
    }

    #[test]
    fn test_route_key_masks_host_bits() {
        let a = RouteKey::new(Ipv4Address::new(10, 0, 1, 77), 24);
        let b = RouteKey::new(Ipv4Address::new(10, 0, 1, 0), 24);
        assert_eq!(a, b);

        let clamped = RouteKey::new(Ipv4Address::new(10, 0, 1, 77), 40);
        assert_eq!(clamped.prefix_len(), 32);
    }

    #[test]
    fn test_route_key_from_bytes_round_trips_kernel_entry() {
        let key = RouteKey::new(Ipv4Address::new(192, 168, 0, 1), 32);
        assert_eq!(RouteKey::from_bytes(*key.as_bytes()), key);
    }

    #[test]
    fn test_local_host_value_has_no_next_hop() {
        let value = RouteValue::local_host();
        assert_eq!(value.route_type(), RouteType::LocalHost);
        assert_eq!(value.next_hop(), None);
        assert_eq!(value.to_string(), "local-host");
    }

    #[test]
    fn test_remote_workload_value_carries_gateway() {
        let gw = Ipv4Address::new(10, 0, 0, 2);
        let value = RouteValue::remote_workload(gw);

        assert_eq!(value.route_type(), RouteType::RemoteWorkload);
        assert_eq!(value.next_hop(), Some(gw));
        assert_eq!(&value.as_bytes()[4..], &[10, 0, 0, 2]);
        assert_eq!(value.to_string(), "remote-workload via 10.0.0.2");
    }

    #[test]
    fn test_value_equality_is_byte_exact() {
        let a = RouteValue::remote_workload(Ipv4Address::new(10, 0, 0, 2));
        let b = RouteValue::remote_workload(Ipv4Address::new(10, 0, 0, 3));
        assert_ne!(a, b);
        assert_ne!(RouteValue::local_host(), RouteValue::new(RouteType::RemoteHost));
    }

    #[test]
    fn test_unknown_route_type_decodes_as_unknown() {
        let mut raw = [0u8; ROUTE_VALUE_SIZE];
        raw[..4].copy_from_slice(&99u32.to_ne_bytes());
        assert_eq!(RouteValue::from_bytes(raw).route_type(), RouteType::Unknown);
    }
}
