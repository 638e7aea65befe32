//! APPL_DB ROUTE_TABLE writer
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - AU-12: Audit Record Generation - Log route additions and deletions
//! - CM-8: System Component Inventory - Maintain route inventory
//!
//! # Schema
//!
//! | Item | Key | Content |
//! |------|-----|---------|
//! | known keys | `ROUTE_TABLE_KEY_SET` | set of prefix strings |
//! | tombstones | `ROUTE_TABLE_DEL_SET` | set of deleted prefix strings |
//! | entry | `_ROUTE_TABLE:<prefix>` | hash `nexthop`, `ifname` |
//! | notification | `ROUTE_TABLE_CHANNEL` | `"G"` after every mutation |

use crate::error::Result;
use crate::types::{NexthopSet, RoutePrefix, RouteRecord};
use async_trait::async_trait;
use tracing::{debug, instrument};

/// Set of every prefix key written by this daemon
pub const ROUTE_TABLE_KEY_SET: &str = "ROUTE_TABLE_KEY_SET";
/// Set of prefix keys that have been deleted
pub const ROUTE_TABLE_DEL_SET: &str = "ROUTE_TABLE_DEL_SET";
/// Key prefix of per-route hashes
pub const ROUTE_TABLE_ENTRY_PREFIX: &str = "_ROUTE_TABLE";
/// Pub/sub channel notified after every mutation
pub const ROUTE_TABLE_CHANNEL: &str = "ROUTE_TABLE_CHANNEL";
/// Fixed notification payload; subscribers re-read the table on receipt
pub const ROUTE_TABLE_NOTIFICATION: &str = "G";

/// Hash field holding comma-joined gateway addresses
pub const FIELD_NEXTHOP: &str = "nexthop";
/// Hash field holding comma-joined interface names
pub const FIELD_IFNAME: &str = "ifname";

/// Hash key of a route entry
pub fn route_entry_key(prefix: &RoutePrefix) -> String {
    format!("{}:{}", ROUTE_TABLE_ENTRY_PREFIX, prefix)
}

/// Minimal key/value capability the route table needs from a store
#[async_trait]
pub trait RouteTableStore: Send + Sync {
    /// Add `member` to the set at `key`
    async fn sadd(&self, key: &str, member: &str) -> Result<()>;

    /// Remove `key` (no-op if absent)
    async fn del(&self, key: &str) -> Result<()>;

    /// Set one field of the hash at `key`
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()>;

    /// Publish `payload` on `channel`
    async fn publish(&self, channel: &str, payload: &str) -> Result<()>;
}

/// Applies canonical route records to a [`RouteTableStore`].
///
/// Every sub-step is attempted in order and the first failure is returned
/// immediately. Nothing already written is rolled back, and the change
/// notification is only published once all writes succeeded.
#[derive(Debug, Clone)]
pub struct RouteTable<S> {
    store: S,
}

impl<S: RouteTableStore> RouteTable<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Write `prefix` with `nexthops` and notify subscribers
    #[instrument(skip_all, fields(prefix = %prefix, count = nexthops.len()))]
    pub async fn apply_add(&self, prefix: &RoutePrefix, nexthops: &NexthopSet) -> Result<()> {
        let prefix_key = prefix.to_string();
        let entry_key = route_entry_key(prefix);
        let gateways = nexthops.gateways();
        let interfaces = nexthops.interfaces();

        self.store.sadd(ROUTE_TABLE_KEY_SET, &prefix_key).await?;
        self.store.hset(&entry_key, FIELD_NEXTHOP, &gateways).await?;
        self.store.hset(&entry_key, FIELD_IFNAME, &interfaces).await?;
        self.store
            .publish(ROUTE_TABLE_CHANNEL, ROUTE_TABLE_NOTIFICATION)
            .await?;

        debug!(key = %entry_key, nexthop = %gateways, ifname = %interfaces, "Set route");
        Ok(())
    }

    /// Tombstone `prefix`, remove its entry and notify subscribers.
    ///
    /// Succeeds for prefixes that were never added.
    #[instrument(skip_all, fields(prefix = %prefix))]
    pub async fn apply_delete(&self, prefix: &RoutePrefix) -> Result<()> {
        let prefix_key = prefix.to_string();
        let entry_key = route_entry_key(prefix);

        self.store.sadd(ROUTE_TABLE_KEY_SET, &prefix_key).await?;
        self.store.sadd(ROUTE_TABLE_DEL_SET, &prefix_key).await?;
        self.store.del(&entry_key).await?;
        self.store
            .publish(ROUTE_TABLE_CHANNEL, ROUTE_TABLE_NOTIFICATION)
            .await?;

        debug!(key = %entry_key, "Deleted route");
        Ok(())
    }

    /// Dispatch a [`RouteRecord`]
    pub async fn apply(&self, record: &RouteRecord) -> Result<()> {
        match record {
            RouteRecord::Add { prefix, nexthops } => self.apply_add(prefix, nexthops).await,
            RouteRecord::Delete { prefix } => self.apply_delete(prefix).await,
        }
    }
}
