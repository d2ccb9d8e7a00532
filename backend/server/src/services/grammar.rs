use super::{Context, find};
use crate::{
    cache::{CacheKey, Namespace},
    error::AppError,
    models::{Entity, GrammarTopic, Id},
    search::IndexKind,
    utils::{Page, paginate, require_text},
};

const NAMESPACE: Namespace = Namespace::GrammarTopics;

#[derive(Clone)]
pub struct GrammarService {
    ctx: Context,
}

impl GrammarService {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    pub async fn get(&self, id: Id) -> Result<GrammarTopic, AppError> {
        let key = CacheKey::new(NAMESPACE, "byId").arg(id);
        self.ctx
            .cache
            .get_or_load(&key, || find(&*self.ctx.stores.grammar_topics, id))
            .await
    }

    pub async fn list_all(&self) -> Result<Vec<GrammarTopic>, AppError> {
        let key = CacheKey::new(NAMESPACE, "all");
        self.ctx
            .cache
            .get_or_load(&key, || self.ctx.stores.grammar_topics.find_all())
            .await
    }

    pub async fn page(&self, page: usize, size: usize) -> Result<Page<GrammarTopic>, AppError> {
        let key = CacheKey::new(NAMESPACE, "page").arg(page).arg(size);
        self.ctx
            .cache
            .get_or_load(&key, || async {
                paginate(self.ctx.stores.grammar_topics.find_all().await?, page, size)
            })
            .await
    }

    pub async fn by_tag(&self, tag: &str) -> Result<Vec<GrammarTopic>, AppError> {
        let tag = tag.trim();
        let key = CacheKey::new(NAMESPACE, "byTag").arg(tag);
        self.ctx
            .cache
            .get_or_load(&key, || async {
                Ok(self
                    .ctx
                    .stores
                    .grammar_topics
                    .find_all()
                    .await?
                    .into_iter()
                    .filter(|topic| topic.tags.contains(tag))
                    .collect())
            })
            .await
    }

    pub async fn create(&self, mut topic: GrammarTopic) -> Result<GrammarTopic, AppError> {
        validate(&topic)?;
        topic.title = topic.title.trim().to_string();
        self.ensure_unique_title(&topic.title, None).await?;

        let created = self.ctx.stores.grammar_topics.insert(topic).await?;
        self.ctx.cache.evict(NAMESPACE).await;
        self.ctx.propagate(&created).await;

        Ok(created)
    }

    pub async fn update(&self, id: Id, mut topic: GrammarTopic) -> Result<GrammarTopic, AppError> {
        validate(&topic)?;
        find(&*self.ctx.stores.grammar_topics, id).await?;
        topic.title = topic.title.trim().to_string();
        self.ensure_unique_title(&topic.title, Some(id)).await?;
        topic.id = id;

        let updated = self.ctx.stores.grammar_topics.update(topic).await?;
        self.ctx.cache.evict(NAMESPACE).await;
        self.ctx.propagate(&updated).await;

        Ok(updated)
    }

    pub async fn delete(&self, id: Id) -> Result<(), AppError> {
        if !self.ctx.stores.grammar_topics.delete(id).await? {
            return Err(AppError::not_found(GrammarTopic::KIND, id));
        }

        self.ctx.cache.evict(NAMESPACE).await;
        self.ctx.unindex(IndexKind::GrammarTopic, id).await;

        Ok(())
    }

    async fn ensure_unique_title(&self, title: &str, except: Option<Id>) -> Result<(), AppError> {
        let wanted = title.trim().to_lowercase();
        let taken = self
            .ctx
            .stores
            .grammar_topics
            .find_all()
            .await?
            .iter()
            .any(|topic| Some(topic.id) != except && topic.title.trim().to_lowercase() == wanted);

        if taken {
            return Err(AppError::duplicate(GrammarTopic::KIND, "title", title));
        }

        Ok(())
    }
}

fn validate(topic: &GrammarTopic) -> Result<(), AppError> {
    require_text("title", &topic.title)?;
    require_text("structure", &topic.structure)?;
    require_text("explanation", &topic.explanation)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::{search::SearchIndex, services::testing::fixture};

    fn topic(title: &str, tags: &[&str]) -> GrammarTopic {
        GrammarTopic {
            id: 0,
            title: title.into(),
            structure: "S + 把 + O + V".into(),
            explanation: "Disposal construction".into(),
            example: Some("我把书放在桌子上".into()),
            translation: None,
            tags: tags.iter().map(|tag| tag.to_string()).collect::<BTreeSet<_>>(),
            created_at: None,
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn test_duplicate_title_ignores_case() {
        let f = fixture();
        let service = &f.services.grammar;
        service.create(topic("Ba Construction", &[])).await.unwrap();
        let cache_writes = f.cache.writes();
        let index_writes = f.index.writes();

        let result = service.create(topic("ba construction", &[])).await;

        assert!(matches!(result, Err(AppError::Duplicate { field: "title", .. })));
        assert_eq!(f.cache.writes(), cache_writes);
        assert_eq!(f.index.writes(), index_writes);
    }

    #[tokio::test]
    async fn test_titles_are_stored_trimmed() {
        let f = fixture();
        let service = &f.services.grammar;

        let created = service.create(topic("  把 construction  ", &[])).await.unwrap();
        assert_eq!(created.title, "把 construction");
        assert_eq!(service.get(created.id).await.unwrap().title, "把 construction");

        let result = service.create(topic("把 CONSTRUCTION", &[])).await;
        assert!(matches!(result, Err(AppError::Duplicate { field: "title", .. })));

        let updated = service
            .update(created.id, topic("\t把 disposal ", &[]))
            .await
            .unwrap();
        assert_eq!(updated.title, "把 disposal");
    }

    #[tokio::test]
    async fn test_update_may_keep_own_title() {
        let f = fixture();
        let service = &f.services.grammar;
        let created = service.create(topic("Ba Construction", &[])).await.unwrap();
        let other = service.create(topic("Bei Passive", &[])).await.unwrap();

        let mut edited = created.clone();
        edited.translation = Some("I put the book on the table".into());
        let updated = service.update(created.id, edited).await.unwrap();
        assert_eq!(updated.created_at, created.created_at);

        let clash = service.update(other.id, topic("BA CONSTRUCTION", &[])).await;
        assert!(matches!(clash, Err(AppError::Duplicate { .. })));

        let missing = service.update(99, topic("Le Aspect", &[])).await;
        assert!(matches!(missing, Err(AppError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_by_tag() {
        let f = fixture();
        let service = &f.services.grammar;
        service.create(topic("Ba Construction", &["hsk3", "word-order"])).await.unwrap();
        service.create(topic("Bei Passive", &["hsk4"])).await.unwrap();

        let tagged = service.by_tag(" hsk3 ").await.unwrap();
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].title, "Ba Construction");
        assert!(service.by_tag("hsk9").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_writes_reach_index() {
        let f = fixture();
        let service = &f.services.grammar;
        let created = service.create(topic("Ba Construction", &[])).await.unwrap();
        assert!(f.index.get(IndexKind::GrammarTopic, created.id).await.unwrap().is_some());

        service.delete(created.id).await.unwrap();
        assert!(f.index.get(IndexKind::GrammarTopic, created.id).await.unwrap().is_none());
    }
}
