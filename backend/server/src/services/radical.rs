use super::{Context, find};
use crate::{
    cache::{CacheKey, Namespace},
    error::AppError,
    models::{Entity, Id, Radical},
    utils::{Page, paginate, require_text},
};

const NAMESPACE: Namespace = Namespace::Radicals;

/// Radicals are not indexed, writes only evict.
#[derive(Clone)]
pub struct RadicalService {
    ctx: Context,
}

impl RadicalService {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    pub async fn get(&self, id: Id) -> Result<Radical, AppError> {
        let key = CacheKey::new(NAMESPACE, "byId").arg(id);
        self.ctx
            .cache
            .get_or_load(&key, || find(&*self.ctx.stores.radicals, id))
            .await
    }

    pub async fn list_all(&self) -> Result<Vec<Radical>, AppError> {
        let key = CacheKey::new(NAMESPACE, "all");
        self.ctx
            .cache
            .get_or_load(&key, || self.ctx.stores.radicals.find_all())
            .await
    }

    pub async fn page(&self, page: usize, size: usize) -> Result<Page<Radical>, AppError> {
        let key = CacheKey::new(NAMESPACE, "page").arg(page).arg(size);
        self.ctx
            .cache
            .get_or_load(&key, || async {
                paginate(self.ctx.stores.radicals.find_all().await?, page, size)
            })
            .await
    }

    pub async fn by_strokes(&self, strokes: i32) -> Result<Vec<Radical>, AppError> {
        let key = CacheKey::new(NAMESPACE, "byStrokes").arg(strokes);
        self.ctx
            .cache
            .get_or_load(&key, || async {
                Ok(self
                    .ctx
                    .stores
                    .radicals
                    .find_all()
                    .await?
                    .into_iter()
                    .filter(|radical| radical.strokes == strokes)
                    .collect())
            })
            .await
    }

    pub async fn by_hanzi(&self, hanzi: &str) -> Result<Radical, AppError> {
        let hanzi = hanzi.trim();
        let key = CacheKey::new(NAMESPACE, "byHanzi").arg(hanzi);
        self.ctx
            .cache
            .get_or_load(&key, || async {
                self.ctx
                    .stores
                    .radicals
                    .find_all()
                    .await?
                    .into_iter()
                    .find(|radical| radical.hanzi == hanzi)
                    .ok_or_else(|| AppError::not_found(Radical::KIND, hanzi))
            })
            .await
    }

    pub async fn create(&self, radical: Radical) -> Result<Radical, AppError> {
        self.validate(&radical, None).await?;

        let created = self.ctx.stores.radicals.insert(radical).await?;
        self.ctx.cache.evict(NAMESPACE).await;

        Ok(created)
    }

    pub async fn update(&self, id: Id, mut radical: Radical) -> Result<Radical, AppError> {
        find(&*self.ctx.stores.radicals, id).await?;
        self.validate(&radical, Some(id)).await?;
        radical.id = id;

        let updated = self.ctx.stores.radicals.update(radical).await?;
        self.ctx.cache.evict(NAMESPACE).await;

        Ok(updated)
    }

    pub async fn delete(&self, id: Id) -> Result<(), AppError> {
        if !self.ctx.stores.radicals.delete(id).await? {
            return Err(AppError::not_found(Radical::KIND, id));
        }

        self.ctx.cache.evict(NAMESPACE).await;
        Ok(())
    }

    async fn validate(&self, radical: &Radical, except: Option<Id>) -> Result<(), AppError> {
        require_text("hanzi", &radical.hanzi)?;
        if radical.strokes <= 0 {
            return Err(AppError::InvalidRequest("strokes must be positive".into()));
        }

        let taken = self
            .ctx
            .stores
            .radicals
            .find_all()
            .await?
            .iter()
            .any(|other| Some(other.id) != except && other.hanzi == radical.hanzi.trim());

        if taken {
            return Err(AppError::duplicate(Radical::KIND, "hanzi", &radical.hanzi));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::fixture;

    fn radical(hanzi: &str, strokes: i32) -> Radical {
        Radical {
            id: 0,
            hanzi: hanzi.into(),
            strokes,
            meaning: Some("mouth".into()),
            pronunciation: Some("kǒu".into()),
            frequency_rank: None,
            created_at: None,
        }
    }

    #[tokio::test]
    async fn test_duplicate_hanzi() {
        let f = fixture();
        f.services.radicals.create(radical("口", 3)).await.unwrap();

        let result = f.services.radicals.create(radical("口", 3)).await;
        assert!(matches!(result, Err(AppError::Duplicate { field: "hanzi", .. })));
    }

    #[tokio::test]
    async fn test_lookups() {
        let f = fixture();
        let service = &f.services.radicals;
        service.create(radical("口", 3)).await.unwrap();
        service.create(radical("女", 3)).await.unwrap();
        service.create(radical("人", 2)).await.unwrap();

        assert_eq!(service.by_strokes(3).await.unwrap().len(), 2);
        assert_eq!(service.by_hanzi("人").await.unwrap().strokes, 2);
        assert!(matches!(
            service.by_hanzi("水").await,
            Err(AppError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_radical_writes_never_touch_index() {
        let f = fixture();
        let created = f.services.radicals.create(radical("口", 3)).await.unwrap();
        f.services
            .radicals
            .update(created.id, radical("口", 3))
            .await
            .unwrap();
        f.services.radicals.delete(created.id).await.unwrap();

        assert_eq!(f.index.writes(), 0);
        assert!(f.cache.writes() > 0);
    }

    #[tokio::test]
    async fn test_update_keeps_created_at() {
        let f = fixture();
        let created = f.services.radicals.create(radical("口", 3)).await.unwrap();

        let mut edited = radical("口", 3);
        edited.meaning = Some("mouth; opening".into());
        let updated = f.services.radicals.update(created.id, edited).await.unwrap();

        assert_eq!(updated.created_at, created.created_at);
        assert_eq!(updated.meaning.as_deref(), Some("mouth; opening"));
    }

    #[tokio::test]
    async fn test_invalid_strokes() {
        let f = fixture();
        let result = f.services.radicals.create(radical("口", 0)).await;
        assert!(matches!(result, Err(AppError::InvalidRequest(_))));
    }
}
