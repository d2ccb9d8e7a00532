use super::{Context, find};
use crate::{
    cache::{CacheKey, Namespace},
    error::AppError,
    models::{Entity, Id, Vocabulary},
    search::{IndexKind, VariantFilter},
    utils::{Page, contains_ignore_case, paginate, require_text},
};

const NAMESPACE: Namespace = Namespace::Vocabularies;

#[derive(Clone)]
pub struct VocabularyService {
    ctx: Context,
}

impl VocabularyService {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    pub async fn get(&self, id: Id) -> Result<Vocabulary, AppError> {
        let key = CacheKey::new(NAMESPACE, "byId").arg(id);
        self.ctx
            .cache
            .get_or_load(&key, || find(&*self.ctx.stores.vocabulary, id))
            .await
    }

    pub async fn list_all(&self) -> Result<Vec<Vocabulary>, AppError> {
        let key = CacheKey::new(NAMESPACE, "all");
        self.ctx
            .cache
            .get_or_load(&key, || self.ctx.stores.vocabulary.find_all())
            .await
    }

    /// `search` matches hanzi, pinyin or meaning, ignoring case.
    pub async fn page(
        &self,
        page: usize,
        size: usize,
        search: Option<&str>,
        variant: VariantFilter,
    ) -> Result<Page<Vocabulary>, AppError> {
        let search = search.map(str::trim).filter(|text| !text.is_empty());
        let key = CacheKey::new(NAMESPACE, "page")
            .arg(page)
            .arg(size)
            .opt_arg(search)
            .opt_arg(variant.key_part());

        self.ctx
            .cache
            .get_or_load(&key, || async {
                let matching = self
                    .ctx
                    .stores
                    .vocabulary
                    .find_all()
                    .await?
                    .into_iter()
                    .filter(|vocabulary| variant.matches(vocabulary.variant))
                    .filter(|vocabulary| search.is_none_or(|text| matches_text(vocabulary, text)))
                    .collect();

                paginate(matching, page, size)
            })
            .await
    }

    pub async fn by_hsk_level(&self, level: i32) -> Result<Vec<Vocabulary>, AppError> {
        let key = CacheKey::new(NAMESPACE, "byHskLevel").arg(level);
        self.ctx
            .cache
            .get_or_load(&key, || async {
                Ok(self
                    .ctx
                    .stores
                    .vocabulary
                    .find_all()
                    .await?
                    .into_iter()
                    .filter(|vocabulary| vocabulary.hsk_level == Some(level))
                    .collect())
            })
            .await
    }

    pub async fn create(&self, vocabulary: Vocabulary) -> Result<Vocabulary, AppError> {
        validate(&vocabulary)?;

        let created = self.ctx.stores.vocabulary.insert(vocabulary).await?;
        self.ctx.cache.evict(NAMESPACE).await;
        self.ctx.propagate(&created).await;

        Ok(created)
    }

    pub async fn update(&self, id: Id, mut vocabulary: Vocabulary) -> Result<Vocabulary, AppError> {
        validate(&vocabulary)?;
        vocabulary.id = id;

        let updated = self.ctx.stores.vocabulary.update(vocabulary).await?;
        self.ctx.cache.evict(NAMESPACE).await;
        self.ctx.propagate(&updated).await;

        Ok(updated)
    }

    pub async fn delete(&self, id: Id) -> Result<(), AppError> {
        if !self.ctx.stores.vocabulary.delete(id).await? {
            return Err(AppError::not_found(Vocabulary::KIND, id));
        }

        self.ctx.cache.evict(NAMESPACE).await;
        self.ctx.unindex(IndexKind::Vocabulary, id).await;

        Ok(())
    }
}

fn validate(vocabulary: &Vocabulary) -> Result<(), AppError> {
    require_text("hanzi", &vocabulary.hanzi)?;
    require_text("pinyin", &vocabulary.pinyin)?;
    require_text("meaning", &vocabulary.meaning)?;

    if let Some(level) = vocabulary.hsk_level {
        if !(1..=9).contains(&level) {
            return Err(AppError::InvalidRequest(format!(
                "HSK level {level} is outside 1..=9"
            )));
        }
    }

    Ok(())
}

fn matches_text(vocabulary: &Vocabulary, text: &str) -> bool {
    [&vocabulary.hanzi, &vocabulary.pinyin, &vocabulary.meaning]
        .into_iter()
        .any(|field| contains_ignore_case(field, text))
}
