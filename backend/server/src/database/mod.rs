//! # Primary Store
//!
//! Relational system of record for vocabulary, grammar topics, courses,
//! textbooks and radicals. Owns ids and timestamps.
//!
//! ## Requirements
//!
//! - `find_all` reads a whole table from one consistent snapshot, used by bulk sync
//! - Writes are last-write-wins, no optimistic locking
//! - Deleting a textbook removes its courses
//!
//! ## Implementation
//!
//! - Postgres through sqlx, schema in `migrations/`
//! - In-process tables for the `memory` backend and tests
use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    error::AppError,
    models::{Course, Entity, GrammarTopic, Id, Radical, Textbook, Vocabulary},
};

pub mod memory;
pub mod postgres;

#[async_trait]
pub trait Repository<T: Entity>: Send + Sync {
    async fn find_all(&self) -> Result<Vec<T>, AppError>;

    async fn find_by_id(&self, id: Id) -> Result<Option<T>, AppError>;

    /// Assigns the id and timestamps.
    async fn insert(&self, entity: T) -> Result<T, AppError>;

    /// Replaces the row with `entity.id()`, keeping its creation time.
    async fn update(&self, entity: T) -> Result<T, AppError>;

    /// Returns whether a row was removed.
    async fn delete(&self, id: Id) -> Result<bool, AppError>;

    async fn exists(&self, id: Id) -> Result<bool, AppError> {
        Ok(self.find_by_id(id).await?.is_some())
    }
}

/// One repository handle per kind, all usually backed by the same store.
#[derive(Clone)]
pub struct Stores {
    pub vocabulary: Arc<dyn Repository<Vocabulary>>,
    pub grammar_topics: Arc<dyn Repository<GrammarTopic>>,
    pub courses: Arc<dyn Repository<Course>>,
    pub textbooks: Arc<dyn Repository<Textbook>>,
    pub radicals: Arc<dyn Repository<Radical>>,
}

impl Stores {
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: Repository<Vocabulary>
            + Repository<GrammarTopic>
            + Repository<Course>
            + Repository<Textbook>
            + Repository<Radical>
            + 'static,
    {
        Self {
            vocabulary: store.clone(),
            grammar_topics: store.clone(),
            courses: store.clone(),
            textbooks: store.clone(),
            radicals: store,
        }
    }
}
