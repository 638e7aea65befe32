//! Prometheus metrics collection for routesyncd
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - AU-6: Audit Record Review - Metrics available for analysis
//! - SI-4: System Monitoring - Route event outcome counters

use prometheus::{IntCounter, IntGauge, Opts, Registry};
use std::sync::Arc;

/// Route event outcome counters
///
/// Every event received increments `updates_total` and then exactly one
/// outcome counter.
///
/// # NIST Controls
/// - SI-4: System Monitoring - Centralized metrics collection
#[derive(Clone)]
pub struct MetricsCollector {
    pub updates_total: IntCounter,
    pub updates_non_default_table_total: IntCounter,
    pub updates_unsupported_family_total: IntCounter,
    pub routes_added_total: IntCounter,
    pub routes_deleted_total: IntCounter,
    pub nexthop_failures_total: IntCounter,
    pub appl_db_add_failures_total: IntCounter,
    pub appl_db_delete_failures_total: IntCounter,

    /// 1 while the synchronizer worker is running
    pub running: IntGauge,

    // Registry for export
    pub registry: Arc<Registry>,
}

fn register_counter(registry: &Registry, name: &str, help: &str) -> prometheus::Result<IntCounter> {
    let counter = IntCounter::with_opts(Opts::new(name, help))?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

impl MetricsCollector {
    /// Create a collector with its own registry
    ///
    /// # NIST Controls
    /// - AU-12: Audit Record Generation - Initialize audit metrics
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let updates_total = register_counter(
            &registry,
            "routesyncd_updates_total",
            "Total number of kernel route updates received",
        )?;
        let updates_non_default_table_total = register_counter(
            &registry,
            "routesyncd_updates_non_default_table_total",
            "Route updates for other routing tables (ignored)",
        )?;
        let updates_unsupported_family_total = register_counter(
            &registry,
            "routesyncd_updates_unsupported_family_total",
            "Route updates of an unsupported address family (ignored)",
        )?;
        let routes_added_total = register_counter(
            &registry,
            "routesyncd_routes_added_total",
            "Routes written to APPL_DB",
        )?;
        let routes_deleted_total = register_counter(
            &registry,
            "routesyncd_routes_deleted_total",
            "Routes deleted from APPL_DB",
        )?;
        let nexthop_failures_total = register_counter(
            &registry,
            "routesyncd_nexthop_failures_total",
            "Route updates whose nexthops could not be resolved",
        )?;
        let appl_db_add_failures_total = register_counter(
            &registry,
            "routesyncd_appl_db_add_failures_total",
            "Failed APPL_DB route writes",
        )?;
        let appl_db_delete_failures_total = register_counter(
            &registry,
            "routesyncd_appl_db_delete_failures_total",
            "Failed APPL_DB route deletions",
        )?;

        let running = IntGauge::with_opts(Opts::new(
            "routesyncd_running",
            "Synchronizer status (1=running, 0=stopped)",
        ))?;
        registry.register(Box::new(running.clone()))?;

        Ok(Self {
            updates_total,
            updates_non_default_table_total,
            updates_unsupported_family_total,
            routes_added_total,
            routes_deleted_total,
            nexthop_failures_total,
            appl_db_add_failures_total,
            appl_db_delete_failures_total,
            running,
            registry: Arc::new(registry),
        })
    }

    pub fn record_update(&self) {
        self.updates_total.inc();
    }

    pub fn record_non_default_table(&self) {
        self.updates_non_default_table_total.inc();
    }

    pub fn record_unsupported_family(&self) {
        self.updates_unsupported_family_total.inc();
    }

    pub fn record_route_added(&self) {
        self.routes_added_total.inc();
    }

    pub fn record_route_deleted(&self) {
        self.routes_deleted_total.inc();
    }

    pub fn record_nexthop_failure(&self) {
        self.nexthop_failures_total.inc();
    }

    pub fn record_add_failure(&self) {
        self.appl_db_add_failures_total.inc();
    }

    pub fn record_delete_failure(&self) {
        self.appl_db_delete_failures_total.inc();
    }

    pub fn set_running(&self, running: bool) {
        self.running.set(i64::from(running));
    }

    /// Point-in-time copy of all counters
    pub fn snapshot(&self) -> SyncStats {
        SyncStats {
            updates: self.updates_total.get(),
            non_default_table: self.updates_non_default_table_total.get(),
            unsupported_family: self.updates_unsupported_family_total.get(),
            added: self.routes_added_total.get(),
            deleted: self.routes_deleted_total.get(),
            nexthop_failures: self.nexthop_failures_total.get(),
            add_failures: self.appl_db_add_failures_total.get(),
            delete_failures: self.appl_db_delete_failures_total.get(),
        }
    }
}

/// Counter values at one point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub updates: u64,
    pub non_default_table: u64,
    pub unsupported_family: u64,
    pub added: u64,
    pub deleted: u64,
    pub nexthop_failures: u64,
    pub add_failures: u64,
    pub delete_failures: u64,
}

impl SyncStats {
    /// Sum of all per-event outcomes; equals `updates` once the worker is idle
    pub fn outcomes(&self) -> u64 {
        self.non_default_table
            + self.unsupported_family
            + self.added
            + self.deleted
            + self.nexthop_failures
            + self.add_failures
            + self.delete_failures
    }
}
