//! Redis adapter for SONiC APPL_DB
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - SC-8: Transmission Confidentiality - Secure database communication
//! - AU-3: Content of Audit Records - Database operations logged
//! - AC-3: Access Enforcement - Database access control

use crate::error::Result;
use crate::route_table::RouteTableStore;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tracing::{debug, instrument};

/// SONiC APPL_DB index
/// NIST: CM-6 - Configuration settings for database selection
pub const APPL_DB: i64 = 0;

/// Redis connection URL for one database
pub fn redis_url(host: &str, port: u16, db: i64) -> String {
    format!("redis://{}:{}/{}", host, port, db)
}

/// [`RouteTableStore`] backed by a Redis connection manager.
///
/// The manager is cloned per call; clones share one multiplexed connection
/// and reconnect transparently after a dropped link.
#[derive(Clone)]
pub struct RedisRouteStore {
    conn: ConnectionManager,
    url: String,
}

impl std::fmt::Debug for RedisRouteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisRouteStore")
            .field("url", &self.url)
            .finish()
    }
}

impl RedisRouteStore {
    /// Connect to database `db` on `host:port`
    ///
    /// # NIST Controls
    /// - SC-23: Session Authenticity - Establish authenticated sessions
    #[instrument]
    pub async fn connect(host: &str, port: u16, db: i64) -> Result<Self> {
        let url = redis_url(host, port, db);
        debug!(url, "Connecting to Redis");

        let client = Client::open(url.as_str())?;
        let conn = ConnectionManager::new(client).await?;

        Ok(Self { conn, url })
    }

    /// Round-trip a PING; used once at startup to fail fast
    #[instrument(skip(self), fields(url = %self.url))]
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        debug!(pong, "Redis reachable");
        Ok(())
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl RouteTableStore for RedisRouteStore {
    async fn sadd(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.sadd(key, member).await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.hset(key, field, value).await?;
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.publish(channel, payload).await?;
        Ok(())
    }
}
