use tracing::{info, warn};

use super::{Context, find};
use crate::{
    cache::{CacheKey, Namespace},
    error::AppError,
    models::{Course, Entity, Id, Textbook, TextbookVersion},
    search::IndexKind,
    utils::{Page, paginate, require_text},
};

const NAMESPACE: Namespace = Namespace::Textbooks;

#[derive(Clone)]
pub struct TextbookService {
    ctx: Context,
}

impl TextbookService {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    pub async fn get(&self, id: Id) -> Result<Textbook, AppError> {
        let key = CacheKey::new(NAMESPACE, "byId").arg(id);
        self.ctx
            .cache
            .get_or_load(&key, || find(&*self.ctx.stores.textbooks, id))
            .await
    }

    pub async fn list_all(&self) -> Result<Vec<Textbook>, AppError> {
        let key = CacheKey::new(NAMESPACE, "all");
        self.ctx
            .cache
            .get_or_load(&key, || self.ctx.stores.textbooks.find_all())
            .await
    }

    pub async fn page(&self, page: usize, size: usize) -> Result<Page<Textbook>, AppError> {
        let key = CacheKey::new(NAMESPACE, "page").arg(page).arg(size);
        self.ctx
            .cache
            .get_or_load(&key, || async {
                paginate(self.ctx.stores.textbooks.find_all().await?, page, size)
            })
            .await
    }

    pub async fn by_version(&self, version: TextbookVersion) -> Result<Vec<Textbook>, AppError> {
        let key = CacheKey::new(NAMESPACE, "byVersion").arg(version);
        self.filtered(&key, |textbook| textbook.version == version)
            .await
    }

    pub async fn by_year(&self, year: i32) -> Result<Vec<Textbook>, AppError> {
        let key = CacheKey::new(NAMESPACE, "byYear").arg(year);
        self.filtered(&key, |textbook| textbook.publication_year == year)
            .await
    }

    async fn filtered(
        &self,
        key: &CacheKey,
        keep: impl Fn(&Textbook) -> bool,
    ) -> Result<Vec<Textbook>, AppError> {
        self.ctx
            .cache
            .get_or_load(key, || async {
                Ok(self
                    .ctx
                    .stores
                    .textbooks
                    .find_all()
                    .await?
                    .into_iter()
                    .filter(|textbook| keep(textbook))
                    .collect())
            })
            .await
    }

    pub async fn create(&self, textbook: Textbook) -> Result<Textbook, AppError> {
        self.validate(&textbook, None).await?;

        let created = self.ctx.stores.textbooks.insert(textbook).await?;
        self.ctx.cache.evict(NAMESPACE).await;

        Ok(created)
    }

    /// Courses embed the textbook name, so they are evicted and re-indexed too.
    pub async fn update(&self, id: Id, mut textbook: Textbook) -> Result<Textbook, AppError> {
        find(&*self.ctx.stores.textbooks, id).await?;
        self.validate(&textbook, Some(id)).await?;
        textbook.id = id;

        let updated = self.ctx.stores.textbooks.update(textbook).await?;
        self.ctx.cache.evict(NAMESPACE).await;
        self.ctx.cache.evict(Namespace::Courses).await;

        match self.courses_of(id).await {
            Ok(courses) => {
                for course in courses {
                    self.ctx.propagate(&course).await;
                }
            }
            Err(e) => warn!("Re-indexing courses of textbook {id} failed: {e}"),
        }

        Ok(updated)
    }

    /// Removes the textbook together with its courses and their documents.
    pub async fn delete(&self, id: Id) -> Result<(), AppError> {
        let cascaded: Vec<Id> = self
            .courses_of(id)
            .await?
            .iter()
            .map(|course| course.id)
            .collect();

        if !self.ctx.stores.textbooks.delete(id).await? {
            return Err(AppError::not_found(Textbook::KIND, id));
        }

        self.ctx.cache.evict(NAMESPACE).await;
        self.ctx.cache.evict(Namespace::Courses).await;

        for course_id in &cascaded {
            self.ctx.unindex(IndexKind::Course, *course_id).await;
        }
        info!("Deleted textbook {id} and {} courses", cascaded.len());

        Ok(())
    }

    async fn courses_of(&self, textbook_id: Id) -> Result<Vec<Course>, AppError> {
        Ok(self
            .ctx
            .stores
            .courses
            .find_all()
            .await?
            .into_iter()
            .filter(|course| course.textbook_id == textbook_id)
            .collect())
    }

    /// Same name (ignoring case) and year within one version is a duplicate.
    async fn validate(&self, textbook: &Textbook, except: Option<Id>) -> Result<(), AppError> {
        require_text("name", &textbook.name)?;

        let name = textbook.name.trim().to_lowercase();
        let taken = self
            .ctx
            .stores
            .textbooks
            .find_all()
            .await?
            .iter()
            .any(|other| {
                Some(other.id) != except
                    && other.version == textbook.version
                    && other.publication_year == textbook.publication_year
                    && other.name.trim().to_lowercase() == name
            });

        if taken {
            return Err(AppError::duplicate(
                Textbook::KIND,
                "name and year",
                format!("{} ({})", textbook.name, textbook.publication_year),
            ));
        }

        Ok(())
    }
}
