//! Nexthop extraction for single-path and multipath routes

use crate::error::{Result, RoutesyncError};
use crate::interface::InterfaceResolver;
use crate::normalizer::NormalizedRoute;
use crate::types::{Nexthop, NexthopSet};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Build the ordered nexthop set of `route`.
///
/// Multipath routes resolve every hop in kernel order and fail as a whole if
/// any hop's interface is gone; no partial set is ever returned.
pub fn extract(resolver: &dyn InterfaceResolver, route: &NormalizedRoute) -> Result<NexthopSet> {
    if route.multipath.is_empty() {
        let interface = resolve(resolver, route.out_ifindex)?;
        return Ok(NexthopSet::from(vec![Nexthop::new(route.gateway, interface)]));
    }

    route
        .multipath
        .iter()
        .map(|hop| {
            let interface = resolve(resolver, hop.out_ifindex)?;
            // Device-only hop: same zero-address convention as single-path routes
            let gateway = hop.gateway.unwrap_or_else(|| unspecified_like(route));
            Ok(Nexthop::new(gateway, interface))
        })
        .collect()
}

fn resolve(resolver: &dyn InterfaceResolver, ifindex: u32) -> Result<String> {
    resolver
        .resolve(ifindex)
        .map_err(|e| RoutesyncError::Extraction {
            ifindex,
            reason: e.to_string(),
        })
}

fn unspecified_like(route: &NormalizedRoute) -> IpAddr {
    match route.prefix.address() {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    }
}
