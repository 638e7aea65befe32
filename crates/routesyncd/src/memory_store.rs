//! In-memory route table store
//!
//! Redis-shaped storage (sets, hashes, published messages) behind a shared
//! mutex, used by tests and dry runs in place of [`RedisRouteStore`].
//! Individual operations can be made to fail or to take time, to exercise
//! the partial-failure and shutdown paths.
//!
//! [`RedisRouteStore`]: crate::redis_adapter::RedisRouteStore

use crate::error::{Result, RoutesyncError};
use crate::route_table::RouteTableStore;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// Store operation selector for failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Sadd,
    Del,
    Hset,
    Publish,
}

#[derive(Debug, Default)]
struct MemoryState {
    sets: HashMap<String, BTreeSet<String>>,
    hashes: HashMap<String, HashMap<String, String>>,
    published: Vec<(String, String)>,
    failing: HashSet<StoreOp>,
    latency: Option<Duration>,
    operations: usize,
}

/// Cloneable handle to shared in-memory storage
#[derive(Debug, Clone, Default)]
pub struct MemoryRouteStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryRouteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `op` fail until [`clear_failures`](Self::clear_failures)
    pub fn fail_on(&self, op: StoreOp) {
        self.state.lock().failing.insert(op);
    }

    pub fn clear_failures(&self) {
        self.state.lock().failing.clear();
    }

    /// Delay every operation by `latency`
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = Some(latency);
    }

    /// Sorted members of the set at `key`
    pub fn set_members(&self, key: &str) -> Vec<String> {
        self.state
            .lock()
            .sets
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_member(&self, key: &str, member: &str) -> bool {
        self.state
            .lock()
            .sets
            .get(key)
            .is_some_and(|set| set.contains(member))
    }

    /// Fields of the hash at `key` (empty if absent)
    pub fn hgetall(&self, key: &str) -> HashMap<String, String> {
        self.state.lock().hashes.get(key).cloned().unwrap_or_default()
    }

    /// Whether `key` holds a set or a hash
    pub fn contains_key(&self, key: &str) -> bool {
        let state = self.state.lock();
        state.hashes.contains_key(key) || state.sets.contains_key(key)
    }

    /// Every `(channel, payload)` published so far, in order
    pub fn published(&self) -> Vec<(String, String)> {
        self.state.lock().published.clone()
    }

    /// Number of operations attempted, including failed ones
    pub fn operation_count(&self) -> usize {
        self.state.lock().operations
    }

    /// Count the operation, apply latency, then check for an injected failure
    async fn begin(&self, op: StoreOp) -> Result<()> {
        let latency = {
            let mut state = self.state.lock();
            state.operations += 1;
            state.latency
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if self.state.lock().failing.contains(&op) {
            return Err(RoutesyncError::Store(format!("{:?} failed (injected)", op)));
        }
        Ok(())
    }
}

#[async_trait]
impl RouteTableStore for MemoryRouteStore {
    async fn sadd(&self, key: &str, member: &str) -> Result<()> {
        self.begin(StoreOp::Sadd).await?;
        self.state
            .lock()
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.begin(StoreOp::Del).await?;
        let mut state = self.state.lock();
        state.hashes.remove(key);
        state.sets.remove(key);
        Ok(())
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        self.begin(StoreOp::Hset).await?;
        self.state
            .lock()
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<()> {
        self.begin(StoreOp::Publish).await?;
        self.state
            .lock()
            .published
            .push((channel.to_string(), payload.to_string()));
        Ok(())
    }
}
