//! Common SONiC types for dataplane synchronization.
//!
//! This crate provides type-safe representations of the network primitives
//! the sync daemons exchange with the control plane:
//!
//! - [`Ipv4Address`]: IPv4 addresses with prefix masking
//! - [`IpAddress`]: IPv4 or IPv6 addresses
//! - [`IpPrefix`]: IP network prefixes (CIDR notation, or a bare host address)

mod ip;

pub use ip::{IpAddress, IpPrefix, Ipv4Address};

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid IP address format: {0}")]
    InvalidIpAddress(String),

    #[error("invalid IP prefix format: {0}")]
    InvalidIpPrefix(String),
}
