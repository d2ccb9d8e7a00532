use super::{Context, find};
use crate::{
    cache::{CacheKey, Namespace},
    error::AppError,
    models::{Course, Entity, Id, Textbook},
    search::IndexKind,
    utils::{Page, paginate, require_text},
};

const NAMESPACE: Namespace = Namespace::Courses;

#[derive(Clone)]
pub struct CourseService {
    ctx: Context,
}

impl CourseService {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    pub async fn get(&self, id: Id) -> Result<Course, AppError> {
        let key = CacheKey::new(NAMESPACE, "byId").arg(id);
        self.ctx
            .cache
            .get_or_load(&key, || find(&*self.ctx.stores.courses, id))
            .await
    }

    pub async fn list_all(&self) -> Result<Vec<Course>, AppError> {
        let key = CacheKey::new(NAMESPACE, "all");
        self.ctx
            .cache
            .get_or_load(&key, || self.ctx.stores.courses.find_all())
            .await
    }

    pub async fn page(&self, page: usize, size: usize) -> Result<Page<Course>, AppError> {
        let key = CacheKey::new(NAMESPACE, "page").arg(page).arg(size);
        self.ctx
            .cache
            .get_or_load(&key, || async {
                paginate(self.ctx.stores.courses.find_all().await?, page, size)
            })
            .await
    }

    pub async fn by_textbook(&self, textbook_id: Id) -> Result<Vec<Course>, AppError> {
        let key = CacheKey::new(NAMESPACE, "byTextbook").arg(textbook_id);
        self.ctx
            .cache
            .get_or_load(&key, || async {
                Ok(self
                    .ctx
                    .stores
                    .courses
                    .find_all()
                    .await?
                    .into_iter()
                    .filter(|course| course.textbook_id == textbook_id)
                    .collect())
            })
            .await
    }

    /// The textbook must exist and must not already have a course at this level.
    pub async fn create(&self, course: Course) -> Result<Course, AppError> {
        self.validate(&course, None).await?;

        let created = self.ctx.stores.courses.insert(course).await?;
        self.ctx.cache.evict(NAMESPACE).await;
        self.ctx.propagate(&created).await;

        Ok(created)
    }

    pub async fn update(&self, id: Id, mut course: Course) -> Result<Course, AppError> {
        find(&*self.ctx.stores.courses, id).await?;
        self.validate(&course, Some(id)).await?;
        course.id = id;

        let updated = self.ctx.stores.courses.update(course).await?;
        self.ctx.cache.evict(NAMESPACE).await;
        self.ctx.propagate(&updated).await;

        Ok(updated)
    }

    pub async fn delete(&self, id: Id) -> Result<(), AppError> {
        if !self.ctx.stores.courses.delete(id).await? {
            return Err(AppError::not_found(Course::KIND, id));
        }

        self.ctx.cache.evict(NAMESPACE).await;
        self.ctx.unindex(IndexKind::Course, id).await;

        Ok(())
    }

    async fn validate(&self, course: &Course, except: Option<Id>) -> Result<(), AppError> {
        require_text("level", &course.level)?;
        require_text("title", &course.title)?;

        if !self.ctx.stores.textbooks.exists(course.textbook_id).await? {
            return Err(AppError::not_found(Textbook::KIND, course.textbook_id));
        }

        let taken = self
            .ctx
            .stores
            .courses
            .find_all()
            .await?
            .iter()
            .any(|other| {
                Some(other.id) != except
                    && other.textbook_id == course.textbook_id
                    && other.level == course.level
            });

        if taken {
            return Err(AppError::duplicate(
                Course::KIND,
                "level for textbook",
                format!("{} in textbook {}", course.level, course.textbook_id),
            ));
        }

        Ok(())
    }
}
