use std::sync::Arc;

use tracing::info;

use super::{
    cache::{Cache, CacheStore, memory::MemoryCache, redis::init_redis},
    config::{Config, StoreBackend},
    database::{Stores, memory::MemoryStore, postgres::init_postgres},
    error::AppError,
    search::{SearchIndex, meili::init_meilisearch, memory::MemoryIndex},
    services::{Context, Services},
    sync::SyncOrchestrator,
};

pub struct State {
    pub config: Config,
    pub services: Services,
    pub sync: Arc<SyncOrchestrator>,
}

impl State {
    pub async fn new(config: Config) -> Result<Arc<Self>, AppError> {
        match config.backend {
            StoreBackend::External => {
                let store = Arc::new(init_postgres(&config.database_url).await?);
                let cache = Arc::new(init_redis(&config.redis_url).await?);
                let index =
                    Arc::new(init_meilisearch(&config.meili_url, config.meili_key.as_deref()).await?);

                Ok(Self::assemble(config, Stores::from_store(store), cache, index))
            }
            StoreBackend::Memory => Ok(Self::in_memory(config)),
        }
    }

    /// Whole service on in-process stores.
    pub fn in_memory(config: Config) -> Arc<Self> {
        info!("Using in-memory stores");

        Self::assemble(
            config,
            Stores::from_store(Arc::new(MemoryStore::new())),
            Arc::new(MemoryCache::new()),
            Arc::new(MemoryIndex::new()),
        )
    }

    pub fn assemble(
        config: Config,
        stores: Stores,
        cache: Arc<dyn CacheStore>,
        index: Arc<dyn SearchIndex>,
    ) -> Arc<Self> {
        let sync = Arc::new(SyncOrchestrator::new(
            stores.clone(),
            index.clone(),
            config.sync_batch_size,
        ));

        let context = Context {
            stores,
            cache: Cache::new(cache),
            sync: sync.clone(),
            sync_on_write: config.sync_on_write,
        };

        Arc::new(Self {
            services: Services::new(context, index),
            sync,
            config,
        })
    }
}
