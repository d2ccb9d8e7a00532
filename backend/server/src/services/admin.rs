//! Operator surface: on-demand sync and cache management. Unlike the
//! background triggers, failures here are returned to the caller.
use tracing::{info, warn};

use super::{Context, CourseService, GrammarService, RadicalService, TextbookService, VocabularyService};
use crate::{
    cache::{CacheStatistics, Namespace},
    error::AppError,
    models::Id,
    search::IndexKind,
    sync::SyncReport,
};

#[derive(Clone)]
pub struct AdminService {
    ctx: Context,
    vocabulary: VocabularyService,
    grammar: GrammarService,
    courses: CourseService,
    textbooks: TextbookService,
    radicals: RadicalService,
}

impl AdminService {
    pub fn new(
        ctx: Context,
        vocabulary: VocabularyService,
        grammar: GrammarService,
        courses: CourseService,
        textbooks: TextbookService,
        radicals: RadicalService,
    ) -> Self {
        Self {
            ctx,
            vocabulary,
            grammar,
            courses,
            textbooks,
            radicals,
        }
    }

    /// Runs every kind, then fails with the first kind that did not fully sync.
    pub async fn trigger_full_sync(&self) -> Result<Vec<SyncReport>, AppError> {
        info!("Full search sync requested");
        self.ctx.sync.sync_all().await.into_result()
    }

    pub async fn trigger_kind_sync(&self, kind: IndexKind) -> Result<SyncReport, AppError> {
        info!("Search sync of {kind} requested");
        self.ctx.sync.sync_kind(kind).await?.into_result()
    }

    /// Reloads one record and upserts its document. A stale id is NotFound.
    pub async fn trigger_single_sync(&self, kind: IndexKind, id: Id) -> Result<(), AppError> {
        info!("Search sync of {kind} {id} requested");
        self.ctx.sync.sync_by_id(kind, id).await
    }

    pub async fn cache_statistics(&self) -> CacheStatistics {
        self.ctx.cache.statistics().await
    }

    pub async fn clear_namespace(&self, namespace: &str) -> Result<usize, AppError> {
        let namespace: Namespace = namespace.parse()?;
        self.ctx.cache.clear_namespace(namespace).await
    }

    pub async fn clear_all(&self) -> Result<usize, AppError> {
        self.ctx.cache.clear_all().await
    }

    /// Loads every list-all read through the cache. Returns how many
    /// namespaces were warmed; a failing one is logged and skipped.
    pub async fn warm_up(&self) -> usize {
        let results = [
            (Namespace::Vocabularies, self.vocabulary.list_all().await.map(|_| ())),
            (Namespace::GrammarTopics, self.grammar.list_all().await.map(|_| ())),
            (Namespace::Courses, self.courses.list_all().await.map(|_| ())),
            (Namespace::Textbooks, self.textbooks.list_all().await.map(|_| ())),
            (Namespace::Radicals, self.radicals.list_all().await.map(|_| ())),
        ];

        let mut warmed = 0;
        for (namespace, result) in results {
            match result {
                Ok(()) => warmed += 1,
                Err(e) => warn!("Warm-up of {namespace} failed: {e}"),
            }
        }
        info!("Cache warm-up finished, {warmed} namespaces loaded");

        warmed
    }
}
