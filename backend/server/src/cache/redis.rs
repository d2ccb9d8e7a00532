//! # Redis
//!
//! RAM database.
//!
//! Holds serialized read results for the services, one key per cached
//! operation, each with the TTL of its namespace.
//!
//! ## Requirements
//!
//! - Fast lookups
//! - Losing keys is fine, the primary store is always the fallback
//! - Namespace-wide eviction on every write
//!
//! ## Implementation
//!
//! - Plain string keys holding JSON, written with `SET EX`
//! - Namespace eviction and key counts walk the keyspace with `SCAN MATCH`,
//!   never `KEYS`, so a large cache does not block the server
//! - Connection manager with a short timeout and one retry, a slow Redis is
//!   treated like a cache miss by the caller
use std::time::Duration;

use async_trait::async_trait;
use redis::{
    AsyncCommands, Client,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use tracing::info;

use super::{CacheStore, KEY_PREFIX, Namespace};
use crate::error::AppError;

const SCAN_COUNT: usize = 200;

pub struct RedisCache {
    connection: ConnectionManager,
}

pub async fn init_redis(redis_url: &str) -> Result<RedisCache, AppError> {
    let config = ConnectionManagerConfig::new()
        .set_number_of_retries(1)
        .set_connection_timeout(Duration::from_millis(100));

    let client = Client::open(redis_url)?;
    let connection = client.get_connection_manager_with_config(config).await?;
    info!("Redis connection manager ready");

    Ok(RedisCache { connection })
}

impl RedisCache {
    async fn scan(&self, pattern: &str) -> Result<Vec<String>, AppError> {
        let mut connection = self.connection.clone();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut connection)
                .await?;

            keys.extend(batch);
            if next == 0 {
                return Ok(keys);
            }
            cursor = next;
        }
    }

    async fn delete_matching(&self, pattern: &str) -> Result<usize, AppError> {
        let keys = self.scan(pattern).await?;
        let mut connection = self.connection.clone();
        let mut removed = 0;

        for chunk in keys.chunks(SCAN_COUNT) {
            let count: usize = connection.del(chunk).await?;
            removed += count;
        }

        Ok(removed)
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let mut connection = self.connection.clone();
        let value: Option<String> = connection.get(key).await?;

        Ok(value)
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), AppError> {
        let mut connection = self.connection.clone();
        let _: () = connection.set_ex(key, value, ttl.as_secs().max(1)).await?;

        Ok(())
    }

    async fn evict_namespace(&self, namespace: Namespace) -> Result<usize, AppError> {
        self.delete_matching(&namespace.pattern()).await
    }

    async fn evict_all(&self) -> Result<usize, AppError> {
        self.delete_matching(&format!("{KEY_PREFIX}::*")).await
    }

    async fn count(&self, namespace: Namespace) -> Result<usize, AppError> {
        Ok(self.scan(&namespace.pattern()).await?.len())
    }

    async fn ping(&self) -> Result<(), AppError> {
        let mut connection = self.connection.clone();
        let _: String = redis::cmd("PING").query_async(&mut connection).await?;

        Ok(())
    }
}
