//! # Meilisearch
//!
//! Search engine holding one index per synced kind.
//!
//!
//!
//! ## Schema
//! - `vocabularies`: hanzi, pinyin, meaning, example (**text**), variant, tags, hskLevel (**filterable**)
//! - `grammar_topics`: title, structure, explanation, example (**text**), tags (**filterable**)
//! - `courses`: title, description, textbookName (**text**), level, difficulty, textbookId (**filterable**)
//! - All: `id` primary key, `searchText` composite field
//!
//!
//!
//! ## Writes
//! Every write waits for its task to finish. A task that ends in failure is
//! reported as an error so the orchestrator can retry documents one by one.
//!
//!
//!
//! ## Commands
//!
//! Grab relevant keys.
//! ```sh
//! curl -H "Authorization: Bearer $(cat /run/secrets/MEILI_ADMIN_KEY)" http://localhost:7700/keys
//! ```
use async_trait::async_trait;
use meilisearch_sdk::{
    client::Client,
    errors::{Error, ErrorCode},
    settings::Settings,
    task_info::TaskInfo,
};
use serde_json::Value;
use tracing::{debug, info};

use super::{IndexKind, SearchIndex, SearchQuery};
use crate::{documents::SearchDocument, error::AppError, models::Id};

pub const ID: &str = "id";
pub const SEARCH_TEXT: &str = "searchText";

const RANKING_RULES: [&str; 6] = [
    "words",
    "typo",
    "proximity",
    "exactness",
    "attribute",
    "sort",
];

pub struct MeiliIndex {
    client: Client,
}

pub async fn init_meilisearch(
    meili_url: &str,
    meili_admin_key: Option<&str>,
) -> Result<MeiliIndex, AppError> {
    let client = Client::new(meili_url, meili_admin_key)?;
    let index = MeiliIndex { client };

    for kind in IndexKind::ALL {
        let task = index
            .client
            .index(kind.index_name())
            .set_settings(&init_settings(kind))
            .await?;
        index.wait(kind, task).await?;

        info!("Meilisearch index {kind} ready");
    }

    Ok(index)
}

impl MeiliIndex {
    async fn wait(&self, kind: IndexKind, task: TaskInfo) -> Result<(), AppError> {
        let task = task.wait_for_completion(&self.client, None, None).await?;

        #[cfg(feature = "verbose")]
        debug!("Meili task result: {:?}", task);

        if task.is_failure() {
            return Err(AppError::Index(format!("task on index {kind} failed")));
        }

        Ok(())
    }
}

#[async_trait]
impl SearchIndex for MeiliIndex {
    async fn upsert_many(
        &self,
        kind: IndexKind,
        documents: &[SearchDocument],
    ) -> Result<(), AppError> {
        if documents.is_empty() {
            return Ok(());
        }

        if let Some(stray) = documents.iter().find(|doc| doc.kind() != kind) {
            return Err(AppError::Index(format!(
                "document {} of {} cannot go into {kind}",
                stray.id(),
                stray.kind()
            )));
        }

        let task = self
            .client
            .index(kind.index_name())
            .add_or_update(documents, Some(ID))
            .await?;

        self.wait(kind, task).await
    }

    async fn upsert_one(&self, document: &SearchDocument) -> Result<(), AppError> {
        self.upsert_many(document.kind(), std::slice::from_ref(document))
            .await
    }

    async fn delete_one(&self, kind: IndexKind, id: Id) -> Result<(), AppError> {
        let task = self
            .client
            .index(kind.index_name())
            .delete_document(id)
            .await?;

        self.wait(kind, task).await?;
        debug!("Deleted {id} from index {kind}");

        Ok(())
    }

    async fn get(&self, kind: IndexKind, id: Id) -> Result<Option<SearchDocument>, AppError> {
        let result = self
            .client
            .index(kind.index_name())
            .get_document::<Value>(&id.to_string())
            .await;

        match result {
            Ok(value) => Ok(Some(SearchDocument::from_value(kind, value)?)),
            Err(Error::Meilisearch(error)) if error.error_code == ErrorCode::DocumentNotFound => {
                Ok(None)
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn query_by_text(
        &self,
        kind: IndexKind,
        query: &SearchQuery,
    ) -> Result<Vec<SearchDocument>, AppError> {
        let filter = match kind {
            IndexKind::Vocabulary => query.variant.to_filter_expression(),
            _ => None,
        };

        let index = self.client.index(kind.index_name());
        let mut search = index.search();
        search.with_query(&query.text).with_limit(query.limit);

        if let Some(filter) = filter.as_deref() {
            search.with_filter(filter);
        }

        let results = search.execute::<Value>().await?;

        results
            .hits
            .into_iter()
            .map(|hit| SearchDocument::from_value(kind, hit.result))
            .collect()
    }
}

fn init_settings(kind: IndexKind) -> Settings {
    let (searchable, filterable): (&[&str], &[&str]) = match kind {
        IndexKind::Vocabulary => (
            &[SEARCH_TEXT, "hanzi", "pinyin", "meaning", "example"],
            &["variant", "tags", "hskLevel"],
        ),
        IndexKind::GrammarTopic => (
            &[SEARCH_TEXT, "title", "structure", "explanation", "example"],
            &["tags"],
        ),
        IndexKind::Course => (
            &[SEARCH_TEXT, "title", "description", "textbookName"],
            &["level", "difficulty", "textbookId"],
        ),
    };

    Settings::new()
        .with_ranking_rules(RANKING_RULES)
        .with_searchable_attributes(searchable.iter().copied())
        .with_filterable_attributes(filterable.iter().copied())
        .with_sortable_attributes([ID])
}
