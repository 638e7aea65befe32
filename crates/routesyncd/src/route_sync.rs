//! Route synchronizer: kernel events to APPL_DB
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - CM-3: Configuration Change Control - Track route changes
//! - SI-4: System Monitoring - Count every event outcome
//! - AU-12: Audit Record Generation - Log failed route updates
//!
//! One worker task consumes a capacity-1 channel fed by the event source and
//! runs each event through normalize, extract and the route table before
//! receiving the next. Per-event failures are counted and logged; they never
//! stop the worker.

use crate::error::{Result, RoutesyncError};
use crate::extractor::extract;
use crate::interface::InterfaceResolver;
use crate::metrics::{MetricsCollector, SyncStats};
use crate::normalizer::{Normalized, NormalizedRoute, normalize};
use crate::route_table::{RouteTable, RouteTableStore};
use crate::source::{RouteEventSource, SubscribeOptions};
use crate::types::{RT_TABLE_MAIN, RouteChangeEvent, RouteChangeType, RouteRecord};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Synchronizer settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// Kernel routing table to mirror
    pub table_id: u32,
    /// Replay installed routes before live updates
    pub list_existing: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            table_id: RT_TABLE_MAIN,
            list_existing: true,
        }
    }
}

/// Externally visible lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Running,
    Stopped,
}

/// Everything the worker task owns
struct SyncPipeline<S> {
    table: RouteTable<S>,
    resolver: Box<dyn InterfaceResolver>,
    table_id: u32,
    metrics: MetricsCollector,
}

enum Lifecycle<S> {
    Idle {
        source: Box<dyn RouteEventSource>,
        pipeline: SyncPipeline<S>,
    },
    Running,
    Stopped,
}

/// Mirrors one kernel routing table into a [`RouteTableStore`].
///
/// All lifecycle methods take `&self`, so the synchronizer can be shared
/// behind an `Arc` between the task that starts it and the tasks that stop
/// it.
pub struct RouteSynchronizer<S> {
    inner: Mutex<Lifecycle<S>>,
    stop: CancellationToken,
    done: CancellationToken,
    metrics: MetricsCollector,
    options: SyncOptions,
}

impl<S: RouteTableStore + 'static> RouteSynchronizer<S> {
    pub fn new(
        store: S,
        resolver: impl InterfaceResolver + 'static,
        source: impl RouteEventSource + 'static,
        options: SyncOptions,
    ) -> Result<Self> {
        let metrics = MetricsCollector::new()?;
        let pipeline = SyncPipeline {
            table: RouteTable::new(store),
            resolver: Box::new(resolver),
            table_id: options.table_id,
            metrics: metrics.clone(),
        };

        Ok(Self {
            inner: Mutex::new(Lifecycle::Idle {
                source: Box::new(source),
                pipeline,
            }),
            stop: CancellationToken::new(),
            done: CancellationToken::new(),
            metrics,
            options,
        })
    }

    /// Subscribe to the event source and spawn the worker.
    ///
    /// A refused subscription is returned as-is and leaves the synchronizer
    /// idle. Starting a running or stopped synchronizer is an error.
    pub fn start(&self) -> Result<()> {
        let mut inner = self.inner.lock();

        let (mut source, pipeline) = match std::mem::replace(&mut *inner, Lifecycle::Running) {
            Lifecycle::Idle { source, pipeline } => (source, pipeline),
            other => {
                let state = other.state();
                *inner = other;
                return Err(RoutesyncError::Lifecycle(format!(
                    "cannot start synchronizer in state {:?}",
                    state
                )));
            }
        };

        let (tx, rx) = mpsc::channel(1);
        let options = SubscribeOptions {
            list_existing: self.options.list_existing,
        };
        if let Err(e) = source.subscribe(tx, self.stop.clone(), options) {
            *inner = Lifecycle::Idle { source, pipeline };
            return Err(e);
        }

        self.metrics.set_running(true);
        let stop = self.stop.clone();
        let latch = self.done.clone().drop_guard();
        tokio::spawn(async move {
            let _latch = latch;
            pipeline.run(rx, stop).await;
        });

        info!(
            table = self.options.table_id,
            list_existing = self.options.list_existing,
            "Route synchronizer started"
        );
        Ok(())
    }

    /// Signal the worker to stop and return immediately. Idempotent.
    pub fn stop(&self) {
        self.stop.cancel();

        let mut inner = self.inner.lock();
        let was_idle = matches!(*inner, Lifecycle::Idle { .. });
        *inner = Lifecycle::Stopped;
        if was_idle {
            // No worker will ever run
            self.done.cancel();
        }
    }

    /// [`stop`](Self::stop), then wait for the worker to exit.
    ///
    /// Once this returns no further store operation will be started.
    pub async fn stop_and_wait(&self) {
        self.stop();
        self.done.cancelled().await;
    }

    /// Wait for the worker to exit without requesting it.
    ///
    /// Completes after a stop or when the event source closes its channel.
    /// Never completes for a synchronizer that stays idle.
    pub async fn wait(&self) {
        self.done.cancelled().await;
    }

    pub fn state(&self) -> SyncState {
        match self.inner.lock().state() {
            SyncState::Running if self.done.is_cancelled() => SyncState::Stopped,
            state => state,
        }
    }

    pub fn stats(&self) -> SyncStats {
        self.metrics.snapshot()
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }
}

impl<S> Lifecycle<S> {
    fn state(&self) -> SyncState {
        match self {
            Lifecycle::Idle { .. } => SyncState::Idle,
            Lifecycle::Running => SyncState::Running,
            Lifecycle::Stopped => SyncState::Stopped,
        }
    }
}

impl<S: RouteTableStore> SyncPipeline<S> {
    async fn run(self, mut events: mpsc::Receiver<RouteChangeEvent>, stop: CancellationToken) {
        debug!(table = self.table_id, "Route synchronizer worker running");

        loop {
            let event = tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                event = events.recv() => event,
            };

            let Some(event) = event else {
                warn!("Route event source closed");
                break;
            };
            self.process(event).await;
        }

        self.metrics.set_running(false);
        info!("Route synchronizer stopped");
    }

    async fn process(&self, event: RouteChangeEvent) {
        self.metrics.record_update();

        let route = match normalize(&event, self.table_id) {
            Normalized::Route(route) => route,
            Normalized::NonDefaultTable => {
                self.metrics.record_non_default_table();
                trace!(table = event.table, "Ignoring route for non-default table");
                return;
            }
            Normalized::UnsupportedFamily => {
                self.metrics.record_unsupported_family();
                trace!(family = ?event.family, "Ignoring route of unsupported family");
                return;
            }
        };

        let record = match route.change {
            RouteChangeType::New => match extract(self.resolver.as_ref(), &route) {
                Ok(nexthops) => RouteRecord::Add {
                    prefix: route.prefix,
                    nexthops,
                },
                Err(e) => {
                    self.metrics.record_nexthop_failure();
                    log_failure(&route, &e, "Unable to get nexthops");
                    return;
                }
            },
            RouteChangeType::Delete => RouteRecord::Delete {
                prefix: route.prefix,
            },
        };

        match (self.table.apply(&record).await, &record) {
            (Ok(()), RouteRecord::Add { .. }) => self.metrics.record_route_added(),
            (Ok(()), RouteRecord::Delete { .. }) => self.metrics.record_route_deleted(),
            (Err(e), RouteRecord::Add { .. }) => {
                self.metrics.record_add_failure();
                log_failure(&route, &e, "Unable to add route");
            }
            (Err(e), RouteRecord::Delete { .. }) => {
                self.metrics.record_delete_failure();
                log_failure(&route, &e, "Unable to delete route");
            }
        }
    }
}

fn log_failure(route: &NormalizedRoute, e: &RoutesyncError, message: &str) {
    error!(
        error = %e,
        prefix = %route.prefix,
        gateway = %route.gateway,
        ifindex = route.out_ifindex,
        multipath = route.multipath.len(),
        "{}",
        message
    );
}
