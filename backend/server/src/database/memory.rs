//! In-process tables behind the same [`Repository`] seam as Postgres.
//!
//! Mirrors the relational constraints that matter to callers: unique grammar
//! titles (case-insensitive), unique course level per textbook, unique radical
//! hanzi, courses joined to their textbook name and removed with it.
use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering},
};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::Repository;
use crate::{
    error::AppError,
    models::{Course, Entity, GrammarTopic, Id, Radical, Textbook, Vocabulary},
};

#[derive(Default)]
pub struct Tables {
    vocabulary: BTreeMap<Id, Vocabulary>,
    grammar_topics: BTreeMap<Id, GrammarTopic>,
    courses: BTreeMap<Id, Course>,
    textbooks: BTreeMap<Id, Textbook>,
    radicals: BTreeMap<Id, Radical>,
}

/// Per-entity access into [`Tables`].
pub trait Stored: Entity {
    fn table(tables: &Tables) -> &BTreeMap<Id, Self>;

    fn table_mut(tables: &mut Tables) -> &mut BTreeMap<Id, Self>;

    fn check_unique(&self, _tables: &Tables) -> Result<(), AppError> {
        Ok(())
    }

    /// Fills in joined columns on the way out.
    fn hydrate(self, _tables: &Tables) -> Self {
        self
    }

    fn on_delete(_id: Id, _tables: &mut Tables) {}
}

impl Stored for Vocabulary {
    fn table(tables: &Tables) -> &BTreeMap<Id, Self> {
        &tables.vocabulary
    }

    fn table_mut(tables: &mut Tables) -> &mut BTreeMap<Id, Self> {
        &mut tables.vocabulary
    }
}

impl Stored for GrammarTopic {
    fn table(tables: &Tables) -> &BTreeMap<Id, Self> {
        &tables.grammar_topics
    }

    fn table_mut(tables: &mut Tables) -> &mut BTreeMap<Id, Self> {
        &mut tables.grammar_topics
    }

    fn check_unique(&self, tables: &Tables) -> Result<(), AppError> {
        let taken = tables
            .grammar_topics
            .values()
            .any(|other| other.id != self.id && other.title.to_lowercase() == self.title.to_lowercase());

        if taken {
            return Err(AppError::duplicate(Self::KIND, "title", &self.title));
        }

        Ok(())
    }
}

impl Stored for Course {
    fn table(tables: &Tables) -> &BTreeMap<Id, Self> {
        &tables.courses
    }

    fn table_mut(tables: &mut Tables) -> &mut BTreeMap<Id, Self> {
        &mut tables.courses
    }

    fn check_unique(&self, tables: &Tables) -> Result<(), AppError> {
        let taken = tables.courses.values().any(|other| {
            other.id != self.id && other.textbook_id == self.textbook_id && other.level == self.level
        });

        if taken {
            return Err(AppError::duplicate(Self::KIND, "level for textbook", &self.level));
        }

        Ok(())
    }

    fn hydrate(mut self, tables: &Tables) -> Self {
        self.textbook_name = tables
            .textbooks
            .get(&self.textbook_id)
            .map(|textbook| textbook.name.clone());
        self
    }
}

impl Stored for Textbook {
    fn table(tables: &Tables) -> &BTreeMap<Id, Self> {
        &tables.textbooks
    }

    fn table_mut(tables: &mut Tables) -> &mut BTreeMap<Id, Self> {
        &mut tables.textbooks
    }

    fn on_delete(id: Id, tables: &mut Tables) {
        tables.courses.retain(|_, course| course.textbook_id != id);
    }
}

impl Stored for Radical {
    fn table(tables: &Tables) -> &BTreeMap<Id, Self> {
        &tables.radicals
    }

    fn table_mut(tables: &mut Tables) -> &mut BTreeMap<Id, Self> {
        &mut tables.radicals
    }

    fn check_unique(&self, tables: &Tables) -> Result<(), AppError> {
        if tables
            .radicals
            .values()
            .any(|other| other.id != self.id && other.hanzi == self.hanzi)
        {
            return Err(AppError::duplicate(Self::KIND, "hanzi", &self.hanzi));
        }

        Ok(())
    }
}

pub struct MemoryStore {
    tables: RwLock<Tables>,
    next_id: AtomicI64,
    reads: AtomicUsize,
    read_budget: AtomicUsize,
    unavailable: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            tables: RwLock::default(),
            next_id: AtomicI64::new(1),
            reads: AtomicUsize::new(0),
            read_budget: AtomicUsize::new(usize::MAX),
            unavailable: AtomicBool::new(false),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `find_*` calls served, used to tell cache hits from misses.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Makes every read fail, as if the database went away.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Lets the next `reads` reads through, then fails every later one.
    pub fn fail_reads_after(&self, reads: usize) {
        self.read_budget
            .store(self.reads().saturating_add(reads), Ordering::SeqCst);
    }

    fn read(&self) -> Result<(), AppError> {
        let served = self.reads.fetch_add(1, Ordering::SeqCst);

        if self.unavailable.load(Ordering::SeqCst)
            || served >= self.read_budget.load(Ordering::SeqCst)
        {
            return Err(AppError::Database(sqlx::Error::PoolTimedOut));
        }

        Ok(())
    }
}

#[async_trait]
impl<T: Stored> Repository<T> for MemoryStore {
    async fn find_all(&self) -> Result<Vec<T>, AppError> {
        self.read()?;
        let tables = self.tables.read().await;

        Ok(T::table(&tables)
            .values()
            .cloned()
            .map(|entity| entity.hydrate(&tables))
            .collect())
    }

    async fn find_by_id(&self, id: Id) -> Result<Option<T>, AppError> {
        self.read()?;
        let tables = self.tables.read().await;

        Ok(T::table(&tables)
            .get(&id)
            .cloned()
            .map(|entity| entity.hydrate(&tables)))
    }

    async fn insert(&self, mut entity: T) -> Result<T, AppError> {
        let mut tables = self.tables.write().await;

        entity.set_id(0);
        entity.check_unique(&tables)?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        entity.set_id(id);
        entity.touch(Utc::now(), true);
        T::table_mut(&mut tables).insert(id, entity.clone());

        Ok(entity.hydrate(&tables))
    }

    async fn update(&self, mut entity: T) -> Result<T, AppError> {
        let mut tables = self.tables.write().await;

        let Some(existing) = T::table(&tables).get(&entity.id()) else {
            return Err(AppError::not_found(T::KIND, entity.id()));
        };
        entity.set_created_at(existing.created_at());
        entity.check_unique(&tables)?;
        entity.touch(Utc::now(), false);

        T::table_mut(&mut tables).insert(entity.id(), entity.clone());

        Ok(entity.hydrate(&tables))
    }

    async fn delete(&self, id: Id) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;

        let removed = T::table_mut(&mut tables).remove(&id).is_some();
        if removed {
            T::on_delete(id, &mut tables);
        }

        Ok(removed)
    }
}
