//! # Search Documents
//!
//! Denormalized, read-optimized copies of the primary records. A document has
//! no lifecycle of its own: it is rebuilt from its entity and replaced whole on
//! every upsert, so the mapping here must stay pure and deterministic.
//!
//! ## searchText
//! Composite field for simple multi-field queries. Present fields are joined in
//! a fixed order with single spaces; missing or blank fields are skipped.
//! - Vocabulary: hanzi, pinyin, meaning, example
//! - Grammar topic: title, structure, explanation, example
//! - Course: title, description, textbook name, `Level {level}`
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::AppError,
    models::{Course, GrammarTopic, Id, Vocabulary},
    search::IndexKind,
    utils::join_present,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VocabularyDocument {
    pub id: Id,
    pub hanzi: String,
    pub pinyin: String,
    pub meaning: String,
    pub example: Option<String>,
    pub variant: String,
    pub tags: Vec<String>,
    pub hsk_level: Option<i32>,
    pub frequency_rank: Option<i32>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub search_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrammarTopicDocument {
    pub id: Id,
    pub title: String,
    pub structure: String,
    pub explanation: String,
    pub example: Option<String>,
    pub translation: Option<String>,
    pub tags: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub search_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseDocument {
    pub id: Id,
    pub level: String,
    pub title: String,
    pub description: Option<String>,
    pub difficulty: String,
    pub textbook_id: Id,
    pub textbook_name: Option<String>,
    pub lessons: Option<i32>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub search_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SearchDocument {
    Vocabulary(VocabularyDocument),
    GrammarTopic(GrammarTopicDocument),
    Course(CourseDocument),
}

impl SearchDocument {
    pub fn id(&self) -> Id {
        match self {
            SearchDocument::Vocabulary(doc) => doc.id,
            SearchDocument::GrammarTopic(doc) => doc.id,
            SearchDocument::Course(doc) => doc.id,
        }
    }

    pub fn kind(&self) -> IndexKind {
        match self {
            SearchDocument::Vocabulary(_) => IndexKind::Vocabulary,
            SearchDocument::GrammarTopic(_) => IndexKind::GrammarTopic,
            SearchDocument::Course(_) => IndexKind::Course,
        }
    }

    pub fn search_text(&self) -> &str {
        match self {
            SearchDocument::Vocabulary(doc) => &doc.search_text,
            SearchDocument::GrammarTopic(doc) => &doc.search_text,
            SearchDocument::Course(doc) => &doc.search_text,
        }
    }

    /// Decodes a raw index hit back into the document type of `kind`.
    pub fn from_value(kind: IndexKind, value: Value) -> Result<Self, AppError> {
        Ok(match kind {
            IndexKind::Vocabulary => SearchDocument::Vocabulary(serde_json::from_value(value)?),
            IndexKind::GrammarTopic => SearchDocument::GrammarTopic(serde_json::from_value(value)?),
            IndexKind::Course => SearchDocument::Course(serde_json::from_value(value)?),
        })
    }
}

/// Records that have a search-index counterpart.
pub trait Indexable {
    fn to_document(&self) -> SearchDocument;
}

impl Indexable for Vocabulary {
    fn to_document(&self) -> SearchDocument {
        SearchDocument::Vocabulary(vocabulary_document(self))
    }
}

impl Indexable for GrammarTopic {
    fn to_document(&self) -> SearchDocument {
        SearchDocument::GrammarTopic(grammar_topic_document(self))
    }
}

impl Indexable for Course {
    fn to_document(&self) -> SearchDocument {
        SearchDocument::Course(course_document(self))
    }
}

pub fn vocabulary_document(vocabulary: &Vocabulary) -> VocabularyDocument {
    let search_text = join_present([
        Some(vocabulary.hanzi.as_str()),
        Some(vocabulary.pinyin.as_str()),
        Some(vocabulary.meaning.as_str()),
        vocabulary.example.as_deref(),
    ]);

    VocabularyDocument {
        id: vocabulary.id,
        hanzi: vocabulary.hanzi.clone(),
        pinyin: vocabulary.pinyin.clone(),
        meaning: vocabulary.meaning.clone(),
        example: vocabulary.example.clone(),
        variant: vocabulary.variant.as_str().to_string(),
        tags: vocabulary.tags.iter().cloned().collect(),
        hsk_level: vocabulary.hsk_level,
        frequency_rank: vocabulary.frequency_rank,
        created_at: vocabulary.created_at,
        updated_at: vocabulary.updated_at,
        search_text,
    }
}

pub fn grammar_topic_document(topic: &GrammarTopic) -> GrammarTopicDocument {
    let search_text = join_present([
        Some(topic.title.as_str()),
        Some(topic.structure.as_str()),
        Some(topic.explanation.as_str()),
        topic.example.as_deref(),
    ]);

    GrammarTopicDocument {
        id: topic.id,
        title: topic.title.clone(),
        structure: topic.structure.clone(),
        explanation: topic.explanation.clone(),
        example: topic.example.clone(),
        translation: topic.translation.clone(),
        tags: topic.tags.iter().cloned().collect(),
        created_at: topic.created_at,
        updated_at: topic.updated_at,
        search_text,
    }
}

pub fn course_document(course: &Course) -> CourseDocument {
    let level = (!course.level.trim().is_empty()).then(|| format!("Level {}", course.level.trim()));

    let search_text = join_present([
        Some(course.title.as_str()),
        course.description.as_deref(),
        course.textbook_name.as_deref(),
        level.as_deref(),
    ]);

    CourseDocument {
        id: course.id,
        level: course.level.clone(),
        title: course.title.clone(),
        description: course.description.clone(),
        difficulty: course.difficulty.as_str().to_string(),
        textbook_id: course.textbook_id,
        textbook_name: course.textbook_name.clone(),
        lessons: course.lessons,
        created_at: course.created_at,
        updated_at: course.updated_at,
        search_text,
    }
}
