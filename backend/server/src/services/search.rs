use std::sync::Arc;

use crate::{
    documents::SearchDocument,
    error::AppError,
    search::{DEFAULT_QUERY_LIMIT, IndexKind, SearchIndex, SearchQuery, VariantFilter},
    utils::MAX_PAGE_SIZE,
};

/// Full-text reads straight from the index. Results may lag the primary store
/// until the next sync.
#[derive(Clone)]
pub struct SearchService {
    index: Arc<dyn SearchIndex>,
}

impl SearchService {
    pub fn new(index: Arc<dyn SearchIndex>) -> Self {
        Self { index }
    }

    pub async fn search(
        &self,
        kind: IndexKind,
        text: &str,
        variant: VariantFilter,
        limit: Option<usize>,
    ) -> Result<Vec<SearchDocument>, AppError> {
        let limit = limit.unwrap_or(DEFAULT_QUERY_LIMIT);
        if limit == 0 || limit > MAX_PAGE_SIZE {
            return Err(AppError::InvalidRequest(format!(
                "limit must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }

        let query = SearchQuery {
            text: text.trim().to_string(),
            variant,
            limit,
        };

        self.index.query_by_text(kind, &query).await
    }
}
