use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use tokio::{sync::RwLock, time::Instant};

use super::{CacheStore, KEY_PREFIX, Namespace};
use crate::error::AppError;

struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process cache on the tokio clock, so paused-time tests can expire entries.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Entry>>,
    unavailable: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Puts and evictions attempted, successful or not.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.entries
            .read()
            .await
            .get(key)
            .is_some_and(|entry| entry.expires_at > Instant::now())
    }

    fn check(&self) -> Result<(), AppError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::CacheUnavailable("connection refused".into()));
        }

        Ok(())
    }

    async fn remove_prefixed(&self, prefix: &str) -> Result<usize, AppError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.check()?;

        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));

        Ok(before - entries.len())
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        self.check()?;

        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.value.clone()))
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), AppError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.check()?;

        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now + ttl,
            },
        );

        Ok(())
    }

    async fn evict_namespace(&self, namespace: Namespace) -> Result<usize, AppError> {
        self.remove_prefixed(&namespace.prefix()).await
    }

    async fn evict_all(&self) -> Result<usize, AppError> {
        self.remove_prefixed(&format!("{KEY_PREFIX}::")).await
    }

    async fn count(&self, namespace: Namespace) -> Result<usize, AppError> {
        self.check()?;

        let prefix = namespace.prefix();
        let now = Instant::now();

        Ok(self
            .entries
            .read()
            .await
            .iter()
            .filter(|(key, entry)| key.starts_with(&prefix) && entry.expires_at > now)
            .count())
    }

    async fn ping(&self) -> Result<(), AppError> {
        self.check()
    }
}
