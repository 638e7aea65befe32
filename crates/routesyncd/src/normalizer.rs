//! Route normalization: table filtering and default synthesis
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - SI-10: Information Input Validation - Drop unsupported families
//! - SC-7: Boundary Protection - Only the main table is propagated

use crate::types::{MultipathHop, RouteChangeEvent, RouteChangeType, RoutePrefix};
use std::net::IpAddr;

/// A kernel event that survived filtering, with defaults filled in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRoute {
    pub change: RouteChangeType,
    pub prefix: RoutePrefix,
    pub gateway: IpAddr,
    pub out_ifindex: u32,
    pub multipath: Vec<MultipathHop>,
}

/// Outcome of [`normalize`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    /// Keep the route and hand it on
    Route(NormalizedRoute),
    /// Event belongs to a table other than the one being mirrored
    NonDefaultTable,
    /// Neither IPv4 nor IPv6, and a default had to be synthesized
    UnsupportedFamily,
}

/// Filter `event` to `table_id` and fill in family defaults.
///
/// A missing destination becomes `0.0.0.0/0` or `::/0`, a missing gateway
/// becomes the family's zero address. Drops are silent and never errors.
pub fn normalize(event: &RouteChangeEvent, table_id: u32) -> Normalized {
    if event.table != table_id {
        return Normalized::NonDefaultTable;
    }

    let prefix = match event.destination {
        Some(prefix) => prefix,
        None => match event.family.default_prefix() {
            Some(prefix) => prefix,
            None => return Normalized::UnsupportedFamily,
        },
    };

    let gateway = match event.gateway {
        Some(gateway) => gateway,
        None => match event.family.unspecified_address() {
            Some(gateway) => gateway,
            None => return Normalized::UnsupportedFamily,
        },
    };

    Normalized::Route(NormalizedRoute {
        change: event.change,
        prefix,
        gateway,
        out_ifindex: event.out_ifindex,
        multipath: event.multipath.clone(),
    })
}
