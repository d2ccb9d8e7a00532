//! # Search Index
//!
//! Read-optimized replica of the vocabulary, grammar and course tables. Only
//! the sync orchestrator writes here; user-facing writes go to the primary
//! store and reach the index through sync.
//!
//! Every write is keyed by the primary-store id, so repeating an upsert or a
//! delete is harmless.
use std::{fmt, str::FromStr};

use async_trait::async_trait;

use crate::{
    documents::SearchDocument,
    error::AppError,
    models::{Id, Variant},
};

pub mod meili;
pub mod memory;

pub const DEFAULT_QUERY_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IndexKind {
    Vocabulary,
    GrammarTopic,
    Course,
}

impl IndexKind {
    pub const ALL: [IndexKind; 3] = [
        IndexKind::Vocabulary,
        IndexKind::GrammarTopic,
        IndexKind::Course,
    ];

    pub fn index_name(&self) -> &'static str {
        match self {
            IndexKind::Vocabulary => "vocabularies",
            IndexKind::GrammarTopic => "grammar_topics",
            IndexKind::Course => "courses",
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.index_name())
    }
}

impl FromStr for IndexKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vocabulary" | "vocabularies" => Ok(IndexKind::Vocabulary),
            "grammar" | "grammar-topics" | "grammar_topics" => Ok(IndexKind::GrammarTopic),
            "course" | "courses" => Ok(IndexKind::Course),
            other => Err(AppError::InvalidRequest(format!(
                "unknown index kind '{other}'"
            ))),
        }
    }
}

/// Variant filtering rule. BOTH is a domain value, not a wildcard on the
/// stored side: asking for SIMPLIFIED or TRADITIONAL also returns BOTH
/// entries, while asking for BOTH returns only BOTH entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VariantFilter {
    #[default]
    Any,
    Only(Variant),
}

impl VariantFilter {
    pub fn matches(&self, variant: Variant) -> bool {
        match (self, variant) {
            (VariantFilter::Any, _) => true,
            (VariantFilter::Only(Variant::Both), stored) => stored == Variant::Both,
            (VariantFilter::Only(wanted), stored) => stored == *wanted || stored == Variant::Both,
        }
    }

    pub fn matches_name(&self, variant: &str) -> bool {
        match self {
            VariantFilter::Any => true,
            _ => variant
                .parse::<Variant>()
                .is_ok_and(|stored| self.matches(stored)),
        }
    }

    /// Meilisearch filter expression over the `variant` attribute.
    pub fn to_filter_expression(&self) -> Option<String> {
        match self {
            VariantFilter::Any => None,
            VariantFilter::Only(Variant::Both) => Some(format!("variant = {}", Variant::Both)),
            VariantFilter::Only(wanted) => Some(format!("variant IN [{wanted}, {}]", Variant::Both)),
        }
    }

    /// Cache key fragment; `None` stands for no filter.
    pub fn key_part(&self) -> Option<&'static str> {
        match self {
            VariantFilter::Any => None,
            VariantFilter::Only(variant) => Some(variant.as_str()),
        }
    }
}

impl From<Option<Variant>> for VariantFilter {
    fn from(variant: Option<Variant>) -> Self {
        variant.map_or(VariantFilter::Any, VariantFilter::Only)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub text: String,
    /// Applied to vocabulary only.
    pub variant: VariantFilter,
    pub limit: usize,
}

impl SearchQuery {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            variant: VariantFilter::Any,
            limit: DEFAULT_QUERY_LIMIT,
        }
    }
}

#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Replaces every document in the batch by id. The batch succeeds or fails
    /// as a whole.
    async fn upsert_many(&self, kind: IndexKind, documents: &[SearchDocument])
    -> Result<(), AppError>;

    async fn upsert_one(&self, document: &SearchDocument) -> Result<(), AppError>;

    /// Removing an id that is not indexed is not an error.
    async fn delete_one(&self, kind: IndexKind, id: Id) -> Result<(), AppError>;

    async fn get(&self, kind: IndexKind, id: Id) -> Result<Option<SearchDocument>, AppError>;

    async fn query_by_text(
        &self,
        kind: IndexKind,
        query: &SearchQuery,
    ) -> Result<Vec<SearchDocument>, AppError>;
}
