//! IP address and prefix types with safe parsing.

use crate::ParseError;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// An IPv4 address as stored in dataplane maps (network byte order octets).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ipv4Address(Ipv4Addr);

impl Ipv4Address {
    pub const UNSPECIFIED: Self = Ipv4Address(Ipv4Addr::UNSPECIFIED);

    pub const fn new(a: u8, b: u8, c: u8, d: u8) -> Self {
        Ipv4Address(Ipv4Addr::new(a, b, c, d))
    }

    pub const fn from_octets(octets: [u8; 4]) -> Self {
        Ipv4Address(Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]))
    }

    pub const fn octets(&self) -> [u8; 4] {
        self.0.octets()
    }

    /// Returns this address with every bit past `prefix_len` cleared.
    pub fn mask(&self, prefix_len: u8) -> Self {
        let bits = u32::from(self.0);
        let mask = match prefix_len {
            0 => 0,
            len if len >= 32 => u32::MAX,
            len => u32::MAX << (32 - u32::from(len)),
        };
        Ipv4Address(Ipv4Addr::from(bits & mask))
    }
}

impl fmt::Display for Ipv4Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Ipv4Address {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<Ipv4Addr>()
            .map(Ipv4Address)
            .map_err(|_| ParseError::InvalidIpAddress(s.to_string()))
    }
}

impl From<Ipv4Addr> for Ipv4Address {
    fn from(addr: Ipv4Addr) -> Self {
        Ipv4Address(addr)
    }
}

impl From<Ipv4Address> for Ipv4Addr {
    fn from(addr: Ipv4Address) -> Self {
        addr.0
    }
}

/// An IP address that can be either IPv4 or IPv6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpAddress {
    V4(Ipv4Address),
    V6(Ipv6Addr),
}

impl IpAddress {
    pub const fn is_ipv4(&self) -> bool {
        matches!(self, IpAddress::V4(_))
    }

    pub const fn is_ipv6(&self) -> bool {
        matches!(self, IpAddress::V6(_))
    }

    /// Returns the IPv4 address if this is V4, None otherwise.
    pub const fn as_ipv4(&self) -> Option<&Ipv4Address> {
        match self {
            IpAddress::V4(addr) => Some(addr),
            IpAddress::V6(_) => None,
        }
    }

    const fn max_prefix_len(&self) -> u8 {
        match self {
            IpAddress::V4(_) => 32,
            IpAddress::V6(_) => 128,
        }
    }

    fn mask(&self, prefix_len: u8) -> Self {
        match self {
            IpAddress::V4(addr) => IpAddress::V4(addr.mask(prefix_len)),
            IpAddress::V6(addr) => {
                let bits = u128::from(*addr);
                let mask = match prefix_len {
                    0 => 0,
                    len if len >= 128 => u128::MAX,
                    len => u128::MAX << (128 - u32::from(len)),
                };
                IpAddress::V6(Ipv6Addr::from(bits & mask))
            }
        }
    }
}

impl fmt::Display for IpAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpAddress::V4(addr) => addr.fmt(f),
            IpAddress::V6(addr) => addr.fmt(f),
        }
    }
}

impl FromStr for IpAddress {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.contains(':') {
            s.parse::<Ipv6Addr>()
                .map(IpAddress::V6)
                .map_err(|_| ParseError::InvalidIpAddress(s.to_string()))
        } else {
            s.parse::<Ipv4Address>().map(IpAddress::V4)
        }
    }
}

impl From<Ipv4Address> for IpAddress {
    fn from(addr: Ipv4Address) -> Self {
        IpAddress::V4(addr)
    }
}

impl From<Ipv4Addr> for IpAddress {
    fn from(addr: Ipv4Addr) -> Self {
        IpAddress::V4(Ipv4Address(addr))
    }
}

impl From<Ipv6Addr> for IpAddress {
    fn from(addr: Ipv6Addr) -> Self {
        IpAddress::V6(addr)
    }
}

/// An IP prefix in CIDR notation (e.g., 10.0.0.0/24 or fd00::/64).
///
/// The stored address is kept exactly as parsed; use [`IpPrefix::network`] to
/// get the prefix with host bits cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IpPrefix {
    address: IpAddress,
    prefix_len: u8,
}

impl IpPrefix {
    /// Creates a new IP prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the prefix length is invalid for the address type
    /// (>32 for IPv4, >128 for IPv6).
    pub fn new(address: IpAddress, prefix_len: u8) -> Result<Self, ParseError> {
        let max_len = address.max_prefix_len();
        if prefix_len > max_len {
            return Err(ParseError::InvalidIpPrefix(format!(
                "prefix length {} exceeds maximum {} for address type",
                prefix_len, max_len
            )));
        }

        Ok(IpPrefix {
            address,
            prefix_len,
        })
    }

    /// Creates a host prefix (/32 or /128) covering exactly `address`.
    pub fn host(address: IpAddress) -> Self {
        IpPrefix {
            prefix_len: address.max_prefix_len(),
            address,
        }
    }

    /// Parses either CIDR notation or a bare address.
    ///
    /// A bare address becomes a host prefix. The result is masked to its
    /// network address, so `10.0.0.7/24` parses as `10.0.0.0/24`.
    pub fn parse_cidr_or_ip(s: &str) -> Result<Self, ParseError> {
        let s = s.trim();
        let prefix = if s.contains('/') {
            s.parse::<IpPrefix>()?
        } else {
            IpPrefix::host(s.parse::<IpAddress>()?)
        };
        Ok(prefix.network())
    }

    /// Returns the address as parsed.
    pub const fn address(&self) -> &IpAddress {
        &self.address
    }

    pub const fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Returns true if this is a host route (/32 for IPv4, /128 for IPv6).
    pub const fn is_host_route(&self) -> bool {
        self.prefix_len == self.address.max_prefix_len()
    }

    /// Returns the same prefix with host bits cleared.
    pub fn network(&self) -> Self {
        IpPrefix {
            address: self.address.mask(self.prefix_len),
            prefix_len: self.prefix_len,
        }
    }

    /// Splits an IPv4 prefix into address and length; `None` for IPv6.
    pub fn as_ipv4(&self) -> Option<(Ipv4Address, u8)> {
        self.address
            .as_ipv4()
            .map(|addr| (*addr, self.prefix_len))
    }
}

impl fmt::Display for IpPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}

impl FromStr for IpPrefix {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr_str, len_str) = s
            .rsplit_once('/')
            .ok_or_else(|| ParseError::InvalidIpPrefix(s.to_string()))?;

        let address: IpAddress = addr_str.parse()?;
        let prefix_len: u8 = len_str
            .parse()
            .map_err(|_| ParseError::InvalidIpPrefix(s.to_string()))?;

        IpPrefix::new(address, prefix_len)
    }
}
