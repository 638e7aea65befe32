//! Core types for route synchronization
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - CM-8: System Component Inventory - Routes as forwarding state inventory
//! - SI-10: Information Input Validation - Prefix length validation

use crate::error::{Result, RoutesyncError};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// Kernel main routing table (RT_TABLE_MAIN)
pub const RT_TABLE_MAIN: u32 = 254;

/// AF_INET / AF_INET6 as carried in `rtm_family`
const AF_INET: u8 = 2;
const AF_INET6: u8 = 10;

/// Address family of a kernel route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
    /// Any other `rtm_family` (MPLS, bridge, ...)
    Other(u8),
}

impl AddressFamily {
    /// Map a raw `rtm_family` value
    pub fn from_raw(family: u8) -> Self {
        match family {
            AF_INET => Self::Ipv4,
            AF_INET6 => Self::Ipv6,
            other => Self::Other(other),
        }
    }

    /// Zero address of the family, used when a route carries no gateway
    pub fn unspecified_address(&self) -> Option<IpAddr> {
        match self {
            Self::Ipv4 => Some(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
            Self::Ipv6 => Some(IpAddr::V6(Ipv6Addr::UNSPECIFIED)),
            Self::Other(_) => None,
        }
    }

    /// Zero-length default prefix of the family (0.0.0.0/0 or ::/0)
    pub fn default_prefix(&self) -> Option<RoutePrefix> {
        self.unspecified_address().map(|address| RoutePrefix {
            address,
            prefix_len: 0,
        })
    }
}

/// An IP prefix in CIDR notation (e.g., 10.0.0.0/8 or 2001:db8::/32).
///
/// The address is always stored masked to the prefix length, so the string
/// form is canonical and usable as a table key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoutePrefix {
    address: IpAddr,
    prefix_len: u8,
}

impl RoutePrefix {
    /// Creates a new prefix, masking host bits.
    ///
    /// # Errors
    ///
    /// Returns an error if the prefix length exceeds 32 (IPv4) or 128 (IPv6).
    pub fn new(address: IpAddr, prefix_len: u8) -> Result<Self> {
        let max_len = match address {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };

        if prefix_len > max_len {
            return Err(RoutesyncError::InvalidPrefix(format!(
                "prefix length {} exceeds maximum {} for {}",
                prefix_len, max_len, address
            )));
        }

        Ok(Self {
            address: mask_address(address, prefix_len),
            prefix_len,
        })
    }

    /// Network address of this prefix
    pub const fn address(&self) -> IpAddr {
        self.address
    }

    /// Prefix length in bits
    pub const fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Returns true for 0.0.0.0/0 and ::/0
    pub const fn is_default(&self) -> bool {
        self.prefix_len == 0
    }
}

fn mask_address(address: IpAddr, prefix_len: u8) -> IpAddr {
    match address {
        IpAddr::V4(v4) => {
            let mask = if prefix_len == 0 {
                0
            } else {
                u32::MAX << (32 - u32::from(prefix_len))
            };
            IpAddr::V4(Ipv4Addr::from(u32::from(v4) & mask))
        }
        IpAddr::V6(v6) => {
            let mask = if prefix_len == 0 {
                0
            } else {
                u128::MAX << (128 - u32::from(prefix_len))
            };
            IpAddr::V6(Ipv6Addr::from(u128::from(v6) & mask))
        }
    }
}

impl fmt::Display for RoutePrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}

impl FromStr for RoutePrefix {
    type Err = RoutesyncError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || RoutesyncError::InvalidPrefix(s.to_string());

        let (addr_str, len_str) = s.rsplit_once('/').ok_or_else(invalid)?;
        let address: IpAddr = addr_str.parse().map_err(|_| invalid())?;
        let prefix_len: u8 = len_str.parse().map_err(|_| invalid())?;

        Self::new(address, prefix_len)
    }
}

/// Kernel route message type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteChangeType {
    /// RTM_NEWROUTE (also used for dump replies)
    New,
    /// RTM_DELROUTE
    Delete,
}

/// One entry of an RTA_MULTIPATH attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipathHop {
    /// Hop gateway; absent for device-only hops
    pub gateway: Option<IpAddr>,
    pub out_ifindex: u32,
}

/// A route change notification as delivered by the kernel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteChangeEvent {
    pub change: RouteChangeType,
    pub table: u32,
    pub family: AddressFamily,
    pub destination: Option<RoutePrefix>,
    pub gateway: Option<IpAddr>,
    pub out_ifindex: u32,
    pub multipath: Vec<MultipathHop>,
}

impl RouteChangeEvent {
    /// Bare event in the main table with no attributes set
    pub fn new(change: RouteChangeType, family: AddressFamily) -> Self {
        Self {
            change,
            table: RT_TABLE_MAIN,
            family,
            destination: None,
            gateway: None,
            out_ifindex: 0,
            multipath: Vec::new(),
        }
    }
}

/// A next-hop gateway and the local interface used to reach it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nexthop {
    pub gateway: IpAddr,
    pub interface: String,
}

impl Nexthop {
    pub fn new(gateway: IpAddr, interface: impl Into<String>) -> Self {
        Self {
            gateway,
            interface: interface.into(),
        }
    }
}

/// Ordered nexthops of one route.
///
/// Order only matters for rendering: `gateways()` and `interfaces()` stay
/// positionally aligned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NexthopSet(Vec<Nexthop>);

impl NexthopSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, nexthop: Nexthop) {
        self.0.push(nexthop);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Nexthop> {
        self.0.iter()
    }

    /// Comma-joined gateway addresses (APPL_DB `nexthop` field)
    pub fn gateways(&self) -> String {
        self.0
            .iter()
            .map(|nh| nh.gateway.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Comma-joined interface names (APPL_DB `ifname` field)
    pub fn interfaces(&self) -> String {
        self.0
            .iter()
            .map(|nh| nh.interface.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl From<Vec<Nexthop>> for NexthopSet {
    fn from(nexthops: Vec<Nexthop>) -> Self {
        Self(nexthops)
    }
}

impl FromIterator<Nexthop> for NexthopSet {
    fn from_iter<I: IntoIterator<Item = Nexthop>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Canonical route mutation handed to the route table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteRecord {
    Add {
        prefix: RoutePrefix,
        nexthops: NexthopSet,
    },
    Delete {
        prefix: RoutePrefix,
    },
}

impl RouteRecord {
    pub fn prefix(&self) -> &RoutePrefix {
        match self {
            Self::Add { prefix, .. } | Self::Delete { prefix } => prefix,
        }
    }
}
