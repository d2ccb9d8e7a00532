//! # Services
//!
//! Business operations over the primary store, one service per kind.
//!
//! ## Reads
//! Every read goes through the cache under the kind's namespace.
//!
//! ## Writes
//! 1. Validate and check uniqueness against the primary store directly. A
//!    rejected write leaves the cache and the index untouched.
//!
//! 2. Commit to the primary store.
//!
//! 3. Evict the kind's namespace.
//!
//! 4. For indexed kinds, propagate to the search index: upsert when sync on
//!    write is enabled, always delete on delete. The primary write has already
//!    committed, so a failure here is logged and left to the next full sync.
use std::sync::Arc;

use tracing::warn;

use crate::{
    cache::Cache,
    database::{Repository, Stores},
    documents::Indexable,
    error::AppError,
    models::{Entity, Id},
    search::{IndexKind, SearchIndex},
    sync::SyncOrchestrator,
};

pub mod admin;
pub mod course;
pub mod grammar;
pub mod radical;
pub mod search;
pub mod textbook;
pub mod vocabulary;

pub use admin::AdminService;
pub use course::CourseService;
pub use grammar::GrammarService;
pub use radical::RadicalService;
pub use search::SearchService;
pub use textbook::TextbookService;
pub use vocabulary::VocabularyService;

/// Collaborators shared by every service.
#[derive(Clone)]
pub struct Context {
    pub stores: Stores,
    pub cache: Cache,
    pub sync: Arc<SyncOrchestrator>,
    pub sync_on_write: bool,
}

impl Context {
    pub(crate) async fn propagate<T: Indexable + Entity>(&self, entity: &T) {
        if !self.sync_on_write {
            return;
        }

        if let Err(e) = self.sync.sync_single(entity).await {
            warn!(
                "Could not index {} {}, leaving it to the next full sync: {e}",
                T::KIND,
                entity.id()
            );
        }
    }

    pub(crate) async fn unindex(&self, kind: IndexKind, id: Id) {
        if let Err(e) = self.sync.delete_from_index(kind, id).await {
            warn!("Could not remove {kind} {id} from the search index: {e}");
        }
    }
}

pub(crate) async fn find<T: Entity>(repository: &dyn Repository<T>, id: Id) -> Result<T, AppError> {
    repository
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::not_found(T::KIND, id))
}

#[derive(Clone)]
pub struct Services {
    pub vocabulary: VocabularyService,
    pub grammar: GrammarService,
    pub courses: CourseService,
    pub textbooks: TextbookService,
    pub radicals: RadicalService,
    pub search: SearchService,
    pub admin: AdminService,
}

impl Services {
    pub fn new(context: Context, index: Arc<dyn SearchIndex>) -> Self {
        let vocabulary = VocabularyService::new(context.clone());
        let grammar = GrammarService::new(context.clone());
        let courses = CourseService::new(context.clone());
        let textbooks = TextbookService::new(context.clone());
        let radicals = RadicalService::new(context.clone());

        let admin = AdminService::new(
            context,
            vocabulary.clone(),
            grammar.clone(),
            courses.clone(),
            textbooks.clone(),
            radicals.clone(),
        );

        Self {
            vocabulary,
            grammar,
            courses,
            textbooks,
            radicals,
            search: SearchService::new(index),
            admin,
        }
    }
}
