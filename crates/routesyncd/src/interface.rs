//! Interface index to name resolution
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - CM-8: System Component Inventory - Interface resolution

use crate::error::{Result, RoutesyncError};
use std::collections::HashMap;

/// Maps a kernel interface index to its current name
pub trait InterfaceResolver: Send + Sync {
    /// Resolve `ifindex`; fails with `InterfaceNotFound` once the index is gone
    fn resolve(&self, ifindex: u32) -> Result<String>;
}

/// Resolver backed by the live OS interface table.
///
/// Names are looked up on every call and never cached: an interface that was
/// renamed or removed since the route was installed must not resolve to a
/// stale name.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemInterfaceResolver;

impl InterfaceResolver for SystemInterfaceResolver {
    #[cfg(target_os = "linux")]
    fn resolve(&self, ifindex: u32) -> Result<String> {
        let mut buf = [0 as libc::c_char; libc::IF_NAMESIZE];
        // NULL (ENXIO) once the index no longer names an interface
        let ptr = unsafe { libc::if_indextoname(ifindex, buf.as_mut_ptr()) };
        if ptr.is_null() {
            return Err(RoutesyncError::InterfaceNotFound(ifindex));
        }

        let name = unsafe { std::ffi::CStr::from_ptr(buf.as_ptr()) }
            .to_string_lossy()
            .into_owned();
        if name.is_empty() {
            return Err(RoutesyncError::InterfaceNotFound(ifindex));
        }
        Ok(name)
    }

    #[cfg(not(target_os = "linux"))]
    fn resolve(&self, ifindex: u32) -> Result<String> {
        Err(RoutesyncError::InterfaceNotFound(ifindex))
    }
}

/// Fixed index → name table, for tests and offline replay
#[derive(Debug, Default, Clone)]
pub struct StaticInterfaceResolver {
    names: HashMap<u32, String>,
}

impl StaticInterfaceResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a mapping
    pub fn insert(&mut self, ifindex: u32, name: impl Into<String>) {
        self.names.insert(ifindex, name.into());
    }

    /// Builder form of [`insert`](Self::insert)
    pub fn with(mut self, ifindex: u32, name: impl Into<String>) -> Self {
        self.insert(ifindex, name);
        self
    }
}

impl InterfaceResolver for StaticInterfaceResolver {
    fn resolve(&self, ifindex: u32) -> Result<String> {
        self.names
            .get(&ifindex)
            .cloned()
            .ok_or(RoutesyncError::InterfaceNotFound(ifindex))
    }
}
