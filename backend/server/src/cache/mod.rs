//! # Cache
//!
//! Memoizes read results of the services. Entries are fully derived from the
//! primary store, so losing any of them is harmless.
//!
//!
//!
//! ## Keys
//! `chinese-learning::{namespace}::{operation}`
//!
//! - The operation is its name followed by every argument, URL-encoded and
//!   `:`-separated, with `*` for an absent argument
//! - Distinct arguments never share a key since `:` and `*` inside an argument
//!   are encoded
//!
//!
//!
//! ## Invalidation
//! - Any write to a kind evicts its whole namespace
//! - TTL per namespace bounds staleness when an eviction is missed
//!
//!
//!
//! ## Failures
//! A failing cache never fails the caller. Reads degrade to a miss, writes and
//! evictions to a no-op. Only the admin surface sees cache errors.
use std::{collections::BTreeMap, fmt, future::Future, str::FromStr, sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, info, warn};

use crate::error::AppError;

pub mod memory;
pub mod redis;

pub const KEY_PREFIX: &str = "chinese-learning";
const ABSENT: &str = "*";

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Namespace {
    Vocabularies,
    GrammarTopics,
    Courses,
    Textbooks,
    Radicals,
    Users,
    UserProgress,
    AiResponses,
}

impl Namespace {
    pub const ALL: [Namespace; 8] = [
        Namespace::Vocabularies,
        Namespace::GrammarTopics,
        Namespace::Courses,
        Namespace::Textbooks,
        Namespace::Radicals,
        Namespace::Users,
        Namespace::UserProgress,
        Namespace::AiResponses,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Namespace::Vocabularies => "vocabularies",
            Namespace::GrammarTopics => "grammar-topics",
            Namespace::Courses => "courses",
            Namespace::Textbooks => "textbooks",
            Namespace::Radicals => "radicals",
            Namespace::Users => "users",
            Namespace::UserProgress => "user-progress",
            Namespace::AiResponses => "ai-responses",
        }
    }

    pub fn ttl(&self) -> Duration {
        let secs = match self {
            Namespace::Users => 5 * MINUTE,
            Namespace::UserProgress => 10 * MINUTE,
            Namespace::Vocabularies => 30 * MINUTE,
            Namespace::GrammarTopics
            | Namespace::Courses
            | Namespace::Textbooks
            | Namespace::AiResponses => HOUR,
            Namespace::Radicals => 2 * HOUR,
        };

        Duration::from_secs(secs)
    }

    /// Every key of this namespace starts with this.
    pub fn prefix(&self) -> String {
        format!("{KEY_PREFIX}::{}::", self.name())
    }

    /// Glob matching every key of this namespace.
    pub fn pattern(&self) -> String {
        format!("{}*", self.prefix())
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Namespace {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Namespace::ALL
            .into_iter()
            .find(|namespace| namespace.name() == s.trim())
            .ok_or_else(|| AppError::InvalidRequest(format!("unknown cache namespace '{s}'")))
    }
}

/// Fully qualified key of one cached operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    namespace: Namespace,
    key: String,
}

impl CacheKey {
    pub fn new(namespace: Namespace, operation: &str) -> Self {
        Self {
            namespace,
            key: format!("{}{operation}", namespace.prefix()),
        }
    }

    pub fn arg(mut self, arg: impl fmt::Display) -> Self {
        self.key.push(':');
        self.key.push_str(&urlencoding::encode(&arg.to_string()));
        self
    }

    pub fn opt_arg<T: fmt::Display>(self, arg: Option<T>) -> Self {
        match arg {
            Some(arg) => self.arg(arg),
            None => {
                let mut key = self;
                key.key.push(':');
                key.key.push_str(ABSENT);
                key
            }
        }
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// Raw key-value store under the cache policy.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError>;

    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), AppError>;

    /// Returns the number of keys removed.
    async fn evict_namespace(&self, namespace: Namespace) -> Result<usize, AppError>;

    async fn evict_all(&self) -> Result<usize, AppError>;

    async fn count(&self, namespace: Namespace) -> Result<usize, AppError>;

    async fn ping(&self) -> Result<(), AppError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatistics {
    pub connected: bool,
    pub namespaces: BTreeMap<String, usize>,
    pub total_keys: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct Cache {
    store: Arc<dyn CacheStore>,
}

impl Cache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Returns the cached value for `key`, or runs `load` and caches its
    /// result with the namespace TTL. Errors from `load` are never cached.
    pub async fn get_or_load<T, F, Fut>(&self, key: &CacheKey, load: F) -> Result<T, AppError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        match self.store.get(key.as_str()).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    debug!("Cache hit {key}");
                    return Ok(value);
                }
                Err(e) => warn!("Discarding undecodable cache entry {key}: {e}"),
            },
            Ok(None) => debug!("Cache miss {key}"),
            Err(e) => warn!("Cache read of {key} failed, loading from store: {e}"),
        }

        let value = load().await?;

        match serde_json::to_string(&value) {
            Ok(raw) => {
                if let Err(e) = self.store.put(key.as_str(), raw, key.namespace().ttl()).await {
                    warn!("Cache write of {key} failed: {e}");
                }
            }
            Err(e) => warn!("Could not encode {key} for caching: {e}"),
        }

        Ok(value)
    }

    /// Write-path eviction. Never fails.
    pub async fn evict(&self, namespace: Namespace) {
        match self.store.evict_namespace(namespace).await {
            Ok(removed) => debug!("Evicted {removed} keys from {namespace}"),
            Err(e) => warn!("Eviction of {namespace} failed: {e}"),
        }
    }

    pub async fn clear_namespace(&self, namespace: Namespace) -> Result<usize, AppError> {
        let removed = self.store.evict_namespace(namespace).await?;
        info!("Cleared {removed} keys from cache namespace {namespace}");

        Ok(removed)
    }

    pub async fn clear_all(&self) -> Result<usize, AppError> {
        let removed = self.store.evict_all().await?;
        info!("Cleared {removed} keys from cache");

        Ok(removed)
    }

    /// Never fails: an unreachable store is reported as disconnected.
    pub async fn statistics(&self) -> CacheStatistics {
        let mut statistics = CacheStatistics {
            connected: false,
            namespaces: BTreeMap::new(),
            total_keys: 0,
            error: None,
        };

        if let Err(e) = self.store.ping().await {
            warn!("Cache ping failed: {e}");
            statistics.error = Some(e.to_string());
            return statistics;
        }
        statistics.connected = true;

        for namespace in Namespace::ALL {
            match self.store.count(namespace).await {
                Ok(count) => {
                    statistics.total_keys += count;
                    statistics.namespaces.insert(namespace.name().to_string(), count);
                }
                Err(e) => {
                    warn!("Counting keys of {namespace} failed: {e}");
                    statistics.error = Some(e.to_string());
                }
            }
        }

        statistics
    }
}
