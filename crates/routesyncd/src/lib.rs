//! Route Synchronization Daemon for SONiC
//!
//! This crate mirrors the kernel's IPv4/IPv6 main routing table into the
//! `ROUTE_TABLE` of SONiC's APPL_DB. Kernel state is authoritative; the
//! database copy is rebuilt from the notification stream (optionally
//! preceded by a full table dump) and is never read back.
//!
//! # NIST 800-53 Rev 5 Control Mappings
//!
//! | Control | Description | Implementation |
//! |---------|-------------|----------------|
//! | AC-3 | Access Enforcement | Kernel netlink multicast membership |
//! | AU-3 | Content of Audit Records | Failures logged with prefix, gateway, ifindex |
//! | AU-12 | Audit Record Generation | Route changes logged |
//! | CM-6 | Configuration Settings | TOML configuration file |
//! | CM-8 | System Component Inventory | Route inventory in APPL_DB |
//! | SC-7 | Boundary Protection | Only the configured table is propagated |
//! | SI-4 | System Monitoring | Prometheus outcome counters |
//! | SI-10 | Input Validation | Unsupported families dropped |
//! | SI-11 | Error Handling | Structured error types |
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────────────┐     ┌──────────────────────┐
//! │  Linux Kernel   │     │        routesyncd        │     │    Redis (SONiC)     │
//! │                 │     │                          │     │                      │
//! │  Main table     │────▶│  NetlinkRouteSource      │     │  APPL_DB             │
//! │  RTM_NEWROUTE   │     │        │ (capacity 1)    │     │   ROUTE_TABLE_KEY_SET│
//! │  RTM_DELROUTE   │     │        ▼                 │     │   ROUTE_TABLE_DEL_SET│
//! │                 │     │  normalize ─▶ extract    │     │   _ROUTE_TABLE:<pfx> │
//! └─────────────────┘     │        │                 │     │   ROUTE_TABLE_CHANNEL│
//!                         │        ▼                 │     │                      │
//!                         │  RouteTable ─────────────┼────▶│                      │
//!                         └──────────────────────────┘     └──────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod extractor;
pub mod interface;
pub mod memory_store;
pub mod metrics;
pub mod metrics_server;
pub mod netlink;
pub mod normalizer;
pub mod redis_adapter;
pub mod route_sync;
pub mod route_table;
pub mod source;
pub mod types;

pub use config::RoutesyncConfig;
pub use error::{Result, RoutesyncError};
pub use extractor::extract;
pub use interface::{InterfaceResolver, StaticInterfaceResolver, SystemInterfaceResolver};
pub use memory_store::{MemoryRouteStore, StoreOp};
pub use metrics::{MetricsCollector, SyncStats};
pub use metrics_server::start_metrics_server;
pub use netlink::NetlinkRouteSource;
pub use normalizer::{Normalized, NormalizedRoute, normalize};
pub use redis_adapter::RedisRouteStore;
pub use route_sync::{RouteSynchronizer, SyncOptions, SyncState};
pub use route_table::{RouteTable, RouteTableStore};
pub use source::{FeedRouteSource, RouteEventSource, RouteFeed, SubscribeOptions};
pub use types::{
    AddressFamily, MultipathHop, Nexthop, NexthopSet, RouteChangeEvent, RouteChangeType,
    RoutePrefix, RouteRecord,
};
