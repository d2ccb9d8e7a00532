//! # Search Sync
//!
//! Brings the search index into agreement with the primary store.
//!
//! ## Triggers
//! - Startup and the recurring schedule: [`SyncOrchestrator::try_sync_all`], errors logged only
//! - Admin endpoints: [`SyncOrchestrator::sync_all`] / [`SyncOrchestrator::sync_kind`], errors returned
//! - Write paths: [`SyncOrchestrator::sync_single`] and [`SyncOrchestrator::delete_from_index`]
//!
//! ## Full Sync Of One Kind
//! 1. Read the whole table inside one read-only snapshot.
//!
//! 2. Map every row to its document.
//!
//! 3. Upsert in batches. A failed batch is retried one document at a time so a
//!    single bad document does not hold back the rest of its batch.
//!
//! 4. Collect per-document failures into the [`SyncReport`].
//!
//! ## Notes
//! - Full sync only adds and overwrites. A row deleted from the primary store
//!   stays in the index until `delete_from_index` is called for it.
//!
//! - Kinds are independent, a failing kind never stops the others.
//!
//! - Full syncs never overlap within one process. Instances of a horizontally
//!   scaled deployment do not coordinate with each other.
use std::{sync::Arc, time::Instant};

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::{
    database::{Repository, Stores},
    documents::{Indexable, SearchDocument},
    error::AppError,
    models::{Entity, Id},
    search::{IndexKind, SearchIndex},
};

pub const DEFAULT_BATCH_SIZE: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentFailure {
    pub id: Id,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub index: &'static str,
    pub read: usize,
    pub indexed: usize,
    pub failed: Vec<DocumentFailure>,
    pub elapsed_ms: u64,
}

impl SyncReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Turns a run with failed documents into [`AppError::SyncIncomplete`].
    pub fn into_result(self) -> Result<Self, AppError> {
        if self.is_complete() {
            return Ok(self);
        }

        Err(AppError::SyncIncomplete {
            kind: self.index,
            indexed: self.indexed,
            failed: self.failed.len(),
        })
    }
}

/// Outcome of every kind in a full sync.
#[derive(Debug)]
pub struct FullSyncReport {
    pub outcomes: Vec<(IndexKind, Result<SyncReport, AppError>)>,
}

impl FullSyncReport {
    pub fn is_complete(&self) -> bool {
        self.outcomes
            .iter()
            .all(|(_, outcome)| outcome.as_ref().is_ok_and(SyncReport::is_complete))
    }

    /// Fails with the first failing kind, after every kind has run.
    pub fn into_result(self) -> Result<Vec<SyncReport>, AppError> {
        self.outcomes
            .into_iter()
            .map(|(_, outcome)| outcome.and_then(SyncReport::into_result))
            .collect()
    }
}

pub struct SyncOrchestrator {
    stores: Stores,
    index: Arc<dyn SearchIndex>,
    batch_size: usize,
    running: Mutex<()>,
}

impl SyncOrchestrator {
    pub fn new(stores: Stores, index: Arc<dyn SearchIndex>, batch_size: usize) -> Self {
        Self {
            stores,
            index,
            batch_size: batch_size.max(1),
            running: Mutex::new(()),
        }
    }

    /// Waits for any running full sync, then syncs every kind.
    pub async fn sync_all(&self) -> FullSyncReport {
        let _guard = self.running.lock().await;
        self.run_all().await
    }

    /// Full sync unless one is already running, in which case `None`.
    pub async fn try_sync_all(&self) -> Option<FullSyncReport> {
        let Ok(_guard) = self.running.try_lock() else {
            warn!("Full sync already running, skipping");
            return None;
        };

        Some(self.run_all().await)
    }

    async fn run_all(&self) -> FullSyncReport {
        info!("Starting full search sync");
        let started = Instant::now();

        let mut outcomes = Vec::with_capacity(IndexKind::ALL.len());
        for kind in IndexKind::ALL {
            let outcome = self.sync_kind(kind).await;
            if let Err(e) = &outcome {
                error!("Sync of {kind} failed: {e}");
            }
            outcomes.push((kind, outcome));
        }

        let report = FullSyncReport { outcomes };
        info!(
            "Full search sync finished in {}ms, complete: {}",
            started.elapsed().as_millis(),
            report.is_complete()
        );

        report
    }

    pub async fn sync_kind(&self, kind: IndexKind) -> Result<SyncReport, AppError> {
        let started = Instant::now();
        let documents = self.load_documents(kind).await?;

        let mut report = SyncReport {
            index: kind.index_name(),
            read: documents.len(),
            indexed: 0,
            failed: Vec::new(),
            elapsed_ms: 0,
        };

        for batch in documents.chunks(self.batch_size) {
            match self.index.upsert_many(kind, batch).await {
                Ok(()) => report.indexed += batch.len(),
                Err(e) => {
                    warn!(
                        "Batch of {} {kind} documents failed, retrying one by one: {e}",
                        batch.len()
                    );
                    self.upsert_each(batch, &mut report).await;
                }
            }
        }

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            "Synced {kind}: {} read, {} indexed, {} failed in {}ms",
            report.read,
            report.indexed,
            report.failed.len(),
            report.elapsed_ms
        );

        Ok(report)
    }

    async fn upsert_each(&self, batch: &[SearchDocument], report: &mut SyncReport) {
        for document in batch {
            match self.index.upsert_one(document).await {
                Ok(()) => report.indexed += 1,
                Err(e) => {
                    error!("Indexing {} {} failed: {e}", document.kind(), document.id());
                    report.failed.push(DocumentFailure {
                        id: document.id(),
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    async fn load_documents(&self, kind: IndexKind) -> Result<Vec<SearchDocument>, AppError> {
        Ok(match kind {
            IndexKind::Vocabulary => documents(self.stores.vocabulary.find_all().await?),
            IndexKind::GrammarTopic => documents(self.stores.grammar_topics.find_all().await?),
            IndexKind::Course => documents(self.stores.courses.find_all().await?),
        })
    }

    /// Upserts one already-loaded entity.
    pub async fn sync_single<T: Indexable + Entity>(&self, entity: &T) -> Result<(), AppError> {
        let document = entity.to_document();
        self.index.upsert_one(&document).await?;
        info!("Synced {} {}", document.kind(), document.id());

        Ok(())
    }

    /// Reloads `id` from the primary store and upserts it. A missing row is an
    /// error, not a silent skip.
    pub async fn sync_by_id(&self, kind: IndexKind, id: Id) -> Result<(), AppError> {
        match kind {
            IndexKind::Vocabulary => self.sync_loaded(&*self.stores.vocabulary, id).await,
            IndexKind::GrammarTopic => self.sync_loaded(&*self.stores.grammar_topics, id).await,
            IndexKind::Course => self.sync_loaded(&*self.stores.courses, id).await,
        }
    }

    async fn sync_loaded<T: Indexable + Entity>(
        &self,
        repository: &dyn Repository<T>,
        id: Id,
    ) -> Result<(), AppError> {
        let entity = repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found(T::KIND, id))?;

        self.sync_single(&entity).await
    }

    pub async fn delete_from_index(&self, kind: IndexKind, id: Id) -> Result<(), AppError> {
        self.index.delete_one(kind, id).await?;
        info!("Removed {kind} {id} from search index");

        Ok(())
    }
}

fn documents<T: Indexable>(entities: Vec<T>) -> Vec<SearchDocument> {
    entities.iter().map(Indexable::to_document).collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::{
        database::memory::MemoryStore,
        models::{Course, Difficulty, GrammarTopic, Textbook, TextbookVersion, Variant, Vocabulary},
        search::memory::MemoryIndex,
    };

    struct Harness {
        store: Arc<MemoryStore>,
        index: Arc<MemoryIndex>,
        orchestrator: SyncOrchestrator,
    }

    fn harness(batch_size: usize) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let index = Arc::new(MemoryIndex::new());
        let orchestrator =
            SyncOrchestrator::new(Stores::from_store(store.clone()), index.clone(), batch_size);

        Harness {
            store,
            index,
            orchestrator,
        }
    }

    fn vocabulary(hanzi: &str, pinyin: &str, meaning: &str) -> Vocabulary {
        Vocabulary {
            id: 0,
            hanzi: hanzi.into(),
            pinyin: pinyin.into(),
            meaning: meaning.into(),
            example: None,
            variant: Variant::Both,
            hsk_level: Some(1),
            frequency_rank: None,
            tags: BTreeSet::new(),
            created_at: None,
            updated_at: None,
        }
    }

    async fn seed(store: &MemoryStore) -> Vec<Vocabulary> {
        let mut seeded = Vec::new();
        for (hanzi, pinyin, meaning) in [("你好", "nǐ hǎo", "hello"), ("谢谢", "xièxie", "thanks"), ("书", "shū", "book")] {
            seeded.push(
                Repository::<Vocabulary>::insert(store, vocabulary(hanzi, pinyin, meaning))
                    .await
                    .unwrap(),
            );
        }

        Repository::<GrammarTopic>::insert(
            store,
            GrammarTopic {
                id: 0,
                title: "了".into(),
                structure: "V + 了".into(),
                explanation: "Completed action".into(),
                example: None,
                translation: None,
                tags: BTreeSet::new(),
                created_at: None,
                updated_at: None,
            },
        )
        .await
        .unwrap();

        let textbook = Repository::<Textbook>::insert(
            store,
            Textbook {
                id: 0,
                name: "HSK Standard Course".into(),
                description: None,
                version: TextbookVersion::New,
                publication_year: 2014,
                pdf_url: None,
                cover_image_url: None,
                created_at: None,
                updated_at: None,
            },
        )
        .await
        .unwrap();

        Repository::<Course>::insert(
            store,
            Course {
                id: 0,
                textbook_id: textbook.id,
                textbook_name: None,
                level: "1".into(),
                title: "HSK 1".into(),
                description: None,
                lessons: Some(15),
                duration: None,
                difficulty: Difficulty::Beginner,
                cover_image_url: None,
                created_at: None,
                updated_at: None,
            },
        )
        .await
        .unwrap();

        seeded
    }

    #[tokio::test]
    async fn test_sync_single_builds_expected_document() {
        let h = harness(DEFAULT_BATCH_SIZE);
        let mut greeting = vocabulary("你好", "nǐ hǎo", "hello");
        greeting.tags = BTreeSet::from(["greeting".to_string()]);
        let greeting = Repository::<Vocabulary>::insert(&*h.store, greeting).await.unwrap();

        h.orchestrator.sync_single(&greeting).await.unwrap();

        let Some(SearchDocument::Vocabulary(doc)) =
            h.index.get(IndexKind::Vocabulary, greeting.id).await.unwrap()
        else {
            panic!("expected an indexed vocabulary document");
        };
        assert_eq!(doc.search_text, "你好 nǐ hǎo hello");
        assert_eq!(doc.variant, "BOTH");
        assert_eq!(doc.tags, vec!["greeting"]);
    }

    #[tokio::test]
    async fn test_full_sync_is_idempotent() {
        let h = harness(DEFAULT_BATCH_SIZE);
        let seeded = seed(&h.store).await;

        let first = h.orchestrator.sync_all().await.into_result().unwrap();
        let snapshot = h.index.get(IndexKind::Vocabulary, seeded[0].id).await.unwrap();
        let second = h.orchestrator.sync_all().await.into_result().unwrap();

        assert_eq!(first.len(), 3);
        assert_eq!(
            first.iter().map(|r| r.indexed).collect::<Vec<_>>(),
            second.iter().map(|r| r.indexed).collect::<Vec<_>>()
        );
        assert_eq!(h.index.len(IndexKind::Vocabulary).await, 3);
        assert_eq!(
            h.index.get(IndexKind::Vocabulary, seeded[0].id).await.unwrap(),
            snapshot
        );
    }

    #[tokio::test]
    async fn test_index_converges_after_update() {
        let h = harness(DEFAULT_BATCH_SIZE);
        let seeded = seed(&h.store).await;
        h.orchestrator.sync_all().await;

        let mut book = seeded[2].clone();
        book.meaning = "book; letter".into();
        book.example = Some("我有一本书".into());
        let book = Repository::<Vocabulary>::update(&*h.store, book).await.unwrap();

        h.orchestrator.sync_by_id(IndexKind::Vocabulary, book.id).await.unwrap();
        let indexed = h.index.get(IndexKind::Vocabulary, book.id).await.unwrap();
        assert_eq!(indexed, Some(book.to_document()));

        let mut book = book;
        book.pinyin = "shu1".into();
        let book = Repository::<Vocabulary>::update(&*h.store, book).await.unwrap();

        h.orchestrator.sync_kind(IndexKind::Vocabulary).await.unwrap();
        let indexed = h.index.get(IndexKind::Vocabulary, book.id).await.unwrap();
        assert_eq!(indexed, Some(book.to_document()));
    }

    #[tokio::test]
    async fn test_explicit_delete_removes_document() {
        let h = harness(DEFAULT_BATCH_SIZE);
        let seeded = seed(&h.store).await;
        h.orchestrator.sync_all().await;

        let id = seeded[1].id;
        Repository::<Vocabulary>::delete(&*h.store, id).await.unwrap();
        h.orchestrator
            .delete_from_index(IndexKind::Vocabulary, id)
            .await
            .unwrap();

        assert_eq!(h.index.get(IndexKind::Vocabulary, id).await.unwrap(), None);

        h.orchestrator.sync_all().await;
        assert_eq!(h.index.get(IndexKind::Vocabulary, id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_full_sync_alone_leaves_deleted_document() {
        let h = harness(DEFAULT_BATCH_SIZE);
        let seeded = seed(&h.store).await;
        h.orchestrator.sync_all().await;

        let id = seeded[1].id;
        Repository::<Vocabulary>::delete(&*h.store, id).await.unwrap();
        h.orchestrator.sync_all().await.into_result().unwrap();

        assert!(h.index.get(IndexKind::Vocabulary, id).await.unwrap().is_some());
        assert_eq!(h.index.len(IndexKind::Vocabulary).await, 3);
    }

    #[tokio::test]
    async fn test_failing_kind_does_not_stop_others() {
        let h = harness(DEFAULT_BATCH_SIZE);
        seed(&h.store).await;
        h.index.fail_kind(IndexKind::Vocabulary).await;

        let report = h.orchestrator.sync_all().await;
        assert!(!report.is_complete());

        for (kind, outcome) in &report.outcomes {
            let outcome = outcome.as_ref().unwrap();
            match kind {
                IndexKind::Vocabulary => assert_eq!(outcome.failed.len(), 3),
                _ => assert!(outcome.is_complete()),
            }
        }

        assert!(h.index.is_empty(IndexKind::Vocabulary).await);
        assert_eq!(h.index.len(IndexKind::GrammarTopic).await, 1);
        assert_eq!(h.index.len(IndexKind::Course).await, 1);

        let result = report.into_result();
        assert!(matches!(result, Err(AppError::SyncIncomplete { failed: 3, .. })));
    }

    #[tokio::test]
    async fn test_failing_document_does_not_abort_batch() {
        let h = harness(DEFAULT_BATCH_SIZE);
        let seeded = seed(&h.store).await;
        h.index
            .fail_document(IndexKind::Vocabulary, seeded[1].id)
            .await;

        let report = h.orchestrator.sync_kind(IndexKind::Vocabulary).await.unwrap();

        assert_eq!(report.read, 3);
        assert_eq!(report.indexed, 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].id, seeded[1].id);
        assert!(h.index.get(IndexKind::Vocabulary, seeded[0].id).await.unwrap().is_some());
        assert!(h.index.get(IndexKind::Vocabulary, seeded[2].id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_documents_are_written_in_batches() {
        let h = harness(2);
        seed(&h.store).await;

        h.orchestrator.sync_kind(IndexKind::Vocabulary).await.unwrap();
        assert_eq!(h.index.writes(), 2);
        assert_eq!(h.index.len(IndexKind::Vocabulary).await, 3);
    }

    #[tokio::test]
    async fn test_store_failure_is_reported_per_kind() {
        let h = harness(DEFAULT_BATCH_SIZE);
        seed(&h.store).await;
        h.store.set_unavailable(true);

        let report = h.orchestrator.sync_all().await;
        assert!(
            report
                .outcomes
                .iter()
                .all(|(_, outcome)| matches!(outcome, Err(AppError::Database(_))))
        );
        assert_eq!(h.index.writes(), 0);
    }

    #[tokio::test]
    async fn test_sync_by_stale_id_is_not_found() {
        let h = harness(DEFAULT_BATCH_SIZE);

        let result = h.orchestrator.sync_by_id(IndexKind::Course, 42).await;
        assert!(matches!(result, Err(AppError::NotFound { kind: "Course", .. })));
        assert_eq!(h.index.writes(), 0);
    }

    #[tokio::test]
    async fn test_overlapping_full_sync_is_skipped() {
        let h = harness(DEFAULT_BATCH_SIZE);
        seed(&h.store).await;

        let guard = h.orchestrator.running.lock().await;
        assert!(h.orchestrator.try_sync_all().await.is_none());
        drop(guard);

        assert!(h.orchestrator.try_sync_all().await.is_some());
        assert_eq!(h.index.len(IndexKind::Vocabulary).await, 3);
    }
}
