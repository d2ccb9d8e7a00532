//! In-process index used by the `memory` backend and by tests.
//!
//! Supports failure injection per kind and per document id so sync behaviour
//! under a flaky index can be exercised without a running Meilisearch.
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{IndexKind, SearchIndex, SearchQuery};
use crate::{
    documents::SearchDocument,
    error::AppError,
    models::Id,
    utils::contains_ignore_case,
};

#[derive(Default)]
pub struct MemoryIndex {
    documents: RwLock<HashMap<IndexKind, BTreeMap<Id, SearchDocument>>>,
    failing_kinds: RwLock<HashSet<IndexKind>>,
    failing_ids: RwLock<HashSet<(IndexKind, Id)>>,
    writes: AtomicUsize,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every write to `kind` fails until [`MemoryIndex::recover`] is called.
    pub async fn fail_kind(&self, kind: IndexKind) {
        self.failing_kinds.write().await.insert(kind);
    }

    /// Any write that carries this document fails.
    pub async fn fail_document(&self, kind: IndexKind, id: Id) {
        self.failing_ids.write().await.insert((kind, id));
    }

    pub async fn recover(&self, kind: IndexKind) {
        self.failing_kinds.write().await.remove(&kind);
        self.failing_ids.write().await.retain(|(failing, _)| *failing != kind);
    }

    pub async fn len(&self, kind: IndexKind) -> usize {
        self.documents
            .read()
            .await
            .get(&kind)
            .map_or(0, BTreeMap::len)
    }

    pub async fn is_empty(&self, kind: IndexKind) -> bool {
        self.len(kind).await == 0
    }

    /// Number of write calls that reached the index, failed or not.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    async fn check(&self, kind: IndexKind, ids: impl IntoIterator<Item = Id>) -> Result<(), AppError> {
        self.writes.fetch_add(1, Ordering::SeqCst);

        if self.failing_kinds.read().await.contains(&kind) {
            return Err(AppError::Index(format!("index {kind} unreachable")));
        }

        let failing_ids = self.failing_ids.read().await;
        if let Some(id) = ids.into_iter().find(|id| failing_ids.contains(&(kind, *id))) {
            return Err(AppError::Index(format!("document {id} rejected by {kind}")));
        }

        Ok(())
    }
}

#[async_trait]
impl SearchIndex for MemoryIndex {
    async fn upsert_many(
        &self,
        kind: IndexKind,
        documents: &[SearchDocument],
    ) -> Result<(), AppError> {
        self.check(kind, documents.iter().map(SearchDocument::id))
            .await?;

        if let Some(stray) = documents.iter().find(|doc| doc.kind() != kind) {
            return Err(AppError::Index(format!(
                "document {} of {} cannot go into {kind}",
                stray.id(),
                stray.kind()
            )));
        }

        let mut indexes = self.documents.write().await;
        let index = indexes.entry(kind).or_default();
        for document in documents {
            index.insert(document.id(), document.clone());
        }

        Ok(())
    }

    async fn upsert_one(&self, document: &SearchDocument) -> Result<(), AppError> {
        self.upsert_many(document.kind(), std::slice::from_ref(document))
            .await
    }

    async fn delete_one(&self, kind: IndexKind, id: Id) -> Result<(), AppError> {
        self.check(kind, [id]).await?;

        if let Some(index) = self.documents.write().await.get_mut(&kind) {
            index.remove(&id);
        }

        Ok(())
    }

    async fn get(&self, kind: IndexKind, id: Id) -> Result<Option<SearchDocument>, AppError> {
        Ok(self
            .documents
            .read()
            .await
            .get(&kind)
            .and_then(|index| index.get(&id))
            .cloned())
    }

    async fn query_by_text(
        &self,
        kind: IndexKind,
        query: &SearchQuery,
    ) -> Result<Vec<SearchDocument>, AppError> {
        let indexes = self.documents.read().await;
        let Some(index) = indexes.get(&kind) else {
            return Ok(Vec::new());
        };

        Ok(index
            .values()
            .filter(|doc| contains_ignore_case(doc.search_text(), query.text.trim()))
            .filter(|doc| match doc {
                SearchDocument::Vocabulary(vocabulary) => {
                    query.variant.matches_name(&vocabulary.variant)
                }
                _ => true,
            })
            .take(query.limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::{
        documents::Indexable,
        models::{Variant, Vocabulary},
        search::VariantFilter,
    };

    fn word(id: Id, hanzi: &str, variant: Variant) -> SearchDocument {
        Vocabulary {
            id,
            hanzi: hanzi.into(),
            pinyin: String::new(),
            meaning: "word".into(),
            example: None,
            variant,
            hsk_level: None,
            frequency_rank: None,
            tags: BTreeSet::new(),
            created_at: None,
            updated_at: None,
        }
        .to_document()
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_id() {
        let index = MemoryIndex::new();
        index
            .upsert_many(IndexKind::Vocabulary, &[word(1, "书", Variant::Simplified)])
            .await
            .unwrap();
        index.upsert_one(&word(1, "書", Variant::Traditional)).await.unwrap();

        assert_eq!(index.len(IndexKind::Vocabulary).await, 1);
        let stored = index.get(IndexKind::Vocabulary, 1).await.unwrap().unwrap();
        assert_eq!(stored, word(1, "書", Variant::Traditional));
    }

    #[tokio::test]
    async fn test_query_applies_variant_rule() {
        let index = MemoryIndex::new();
        let documents = [
            word(1, "书", Variant::Simplified),
            word(2, "書", Variant::Traditional),
            word(3, "人", Variant::Both),
        ];
        index
            .upsert_many(IndexKind::Vocabulary, &documents)
            .await
            .unwrap();

        let mut query = SearchQuery::text("word");
        query.variant = VariantFilter::Only(Variant::Traditional);

        let ids: Vec<Id> = index
            .query_by_text(IndexKind::Vocabulary, &query)
            .await
            .unwrap()
            .iter()
            .map(SearchDocument::id)
            .collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let index = MemoryIndex::new();
        index.fail_document(IndexKind::Vocabulary, 2).await;

        let batch = [word(1, "书", Variant::Simplified), word(2, "書", Variant::Traditional)];
        assert!(index.upsert_many(IndexKind::Vocabulary, &batch).await.is_err());
        assert!(index.is_empty(IndexKind::Vocabulary).await);

        index.upsert_one(&batch[0]).await.unwrap();
        assert_eq!(index.len(IndexKind::Vocabulary).await, 1);

        index.fail_kind(IndexKind::Vocabulary).await;
        assert!(index.delete_one(IndexKind::Vocabulary, 1).await.is_err());

        index.recover(IndexKind::Vocabulary).await;
        index.delete_one(IndexKind::Vocabulary, 1).await.unwrap();
        index.delete_one(IndexKind::Vocabulary, 1).await.unwrap();
        assert!(index.is_empty(IndexKind::Vocabulary).await);
        assert_eq!(index.writes(), 5);
    }
}
