use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
    cache::CacheStatistics,
    documents::SearchDocument,
    error::AppError,
    models::{Course, GrammarTopic, Id, Radical, Textbook, TextbookVersion, Variant, Vocabulary},
    search::{IndexKind, VariantFilter},
    state,
    sync::SyncReport,
    utils::Page,
};

type AppState = State<Arc<state::State>>;

const DEFAULT_PAGE_SIZE: usize = 20;

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

#[derive(Deserialize)]
pub struct PageParams {
    #[serde(default)]
    page: usize,
    #[serde(default = "default_page_size")]
    size: usize,
}

#[derive(Deserialize)]
pub struct VocabularyPageParams {
    #[serde(default)]
    page: usize,
    #[serde(default = "default_page_size")]
    size: usize,
    search: Option<String>,
    variant: Option<String>,
}

#[derive(Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    q: String,
    variant: Option<String>,
    limit: Option<usize>,
}

fn variant_filter(variant: Option<&str>) -> Result<VariantFilter, AppError> {
    let variant = variant
        .filter(|variant| !variant.trim().is_empty())
        .map(str::parse::<Variant>)
        .transpose()?;

    Ok(variant.into())
}

macro_rules! crud_handlers {
    ($module:ident, $service:ident, $entity:ty) => {
        pub mod $module {
            use super::*;

            pub async fn list(State(state): AppState) -> Result<Json<Vec<$entity>>, AppError> {
                Ok(Json(state.services.$service.list_all().await?))
            }

            pub async fn page(
                State(state): AppState,
                Query(params): Query<PageParams>,
            ) -> Result<Json<Page<$entity>>, AppError> {
                Ok(Json(
                    state.services.$service.page(params.page, params.size).await?,
                ))
            }

            pub async fn get(
                State(state): AppState,
                Path(id): Path<Id>,
            ) -> Result<Json<$entity>, AppError> {
                Ok(Json(state.services.$service.get(id).await?))
            }

            pub async fn create(
                State(state): AppState,
                Json(entity): Json<$entity>,
            ) -> Result<(StatusCode, Json<$entity>), AppError> {
                let created = state.services.$service.create(entity).await?;
                Ok((StatusCode::CREATED, Json(created)))
            }

            pub async fn update(
                State(state): AppState,
                Path(id): Path<Id>,
                Json(entity): Json<$entity>,
            ) -> Result<Json<$entity>, AppError> {
                Ok(Json(state.services.$service.update(id, entity).await?))
            }

            pub async fn delete(
                State(state): AppState,
                Path(id): Path<Id>,
            ) -> Result<StatusCode, AppError> {
                state.services.$service.delete(id).await?;
                Ok(StatusCode::NO_CONTENT)
            }
        }
    };
}

crud_handlers!(grammar, grammar, GrammarTopic);
crud_handlers!(courses, courses, Course);
crud_handlers!(textbooks, textbooks, Textbook);
crud_handlers!(radicals, radicals, Radical);

pub mod vocabulary {
    use super::*;

    pub async fn list(State(state): AppState) -> Result<Json<Vec<Vocabulary>>, AppError> {
        Ok(Json(state.services.vocabulary.list_all().await?))
    }

    pub async fn page(
        State(state): AppState,
        Query(params): Query<VocabularyPageParams>,
    ) -> Result<Json<Page<Vocabulary>>, AppError> {
        let variant = variant_filter(params.variant.as_deref())?;
        let page = state
            .services
            .vocabulary
            .page(params.page, params.size, params.search.as_deref(), variant)
            .await?;

        Ok(Json(page))
    }

    pub async fn by_hsk_level(
        State(state): AppState,
        Path(level): Path<i32>,
    ) -> Result<Json<Vec<Vocabulary>>, AppError> {
        Ok(Json(state.services.vocabulary.by_hsk_level(level).await?))
    }

    pub async fn get(
        State(state): AppState,
        Path(id): Path<Id>,
    ) -> Result<Json<Vocabulary>, AppError> {
        Ok(Json(state.services.vocabulary.get(id).await?))
    }

    pub async fn create(
        State(state): AppState,
        Json(vocabulary): Json<Vocabulary>,
    ) -> Result<(StatusCode, Json<Vocabulary>), AppError> {
        let created = state.services.vocabulary.create(vocabulary).await?;
        Ok((StatusCode::CREATED, Json(created)))
    }

    pub async fn update(
        State(state): AppState,
        Path(id): Path<Id>,
        Json(vocabulary): Json<Vocabulary>,
    ) -> Result<Json<Vocabulary>, AppError> {
        Ok(Json(state.services.vocabulary.update(id, vocabulary).await?))
    }

    pub async fn delete(State(state): AppState, Path(id): Path<Id>) -> Result<StatusCode, AppError> {
        state.services.vocabulary.delete(id).await?;
        Ok(StatusCode::NO_CONTENT)
    }
}

pub async fn grammar_by_tag_handler(
    State(state): AppState,
    Path(tag): Path<String>,
) -> Result<Json<Vec<GrammarTopic>>, AppError> {
    Ok(Json(state.services.grammar.by_tag(&tag).await?))
}

pub async fn courses_by_textbook_handler(
    State(state): AppState,
    Path(textbook_id): Path<Id>,
) -> Result<Json<Vec<Course>>, AppError> {
    Ok(Json(state.services.courses.by_textbook(textbook_id).await?))
}

pub async fn textbooks_by_version_handler(
    State(state): AppState,
    Path(version): Path<String>,
) -> Result<Json<Vec<Textbook>>, AppError> {
    let version: TextbookVersion = version.parse()?;
    Ok(Json(state.services.textbooks.by_version(version).await?))
}

pub async fn textbooks_by_year_handler(
    State(state): AppState,
    Path(year): Path<i32>,
) -> Result<Json<Vec<Textbook>>, AppError> {
    Ok(Json(state.services.textbooks.by_year(year).await?))
}

pub async fn radicals_by_strokes_handler(
    State(state): AppState,
    Path(strokes): Path<i32>,
) -> Result<Json<Vec<Radical>>, AppError> {
    Ok(Json(state.services.radicals.by_strokes(strokes).await?))
}

pub async fn radical_by_hanzi_handler(
    State(state): AppState,
    Path(hanzi): Path<String>,
) -> Result<Json<Radical>, AppError> {
    Ok(Json(state.services.radicals.by_hanzi(&hanzi).await?))
}

pub async fn search_handler(
    State(state): AppState,
    Path(kind): Path<String>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<SearchDocument>>, AppError> {
    let kind: IndexKind = kind.parse()?;
    let variant = variant_filter(params.variant.as_deref())?;

    let hits = state
        .services
        .search
        .search(kind, &params.q, variant, params.limit)
        .await?;

    Ok(Json(hits))
}

pub async fn sync_all_handler(State(state): AppState) -> Result<Json<Vec<SyncReport>>, AppError> {
    Ok(Json(state.services.admin.trigger_full_sync().await?))
}

pub async fn sync_kind_handler(
    State(state): AppState,
    Path(kind): Path<String>,
) -> Result<Json<SyncReport>, AppError> {
    let kind: IndexKind = kind.parse()?;
    Ok(Json(state.services.admin.trigger_kind_sync(kind).await?))
}

pub async fn sync_single_handler(
    State(state): AppState,
    Path((kind, id)): Path<(String, Id)>,
) -> Result<Json<Value>, AppError> {
    let kind: IndexKind = kind.parse()?;
    state.services.admin.trigger_single_sync(kind, id).await?;
    Ok(Json(json!({ "index": kind.index_name(), "id": id })))
}

pub async fn cache_stats_handler(State(state): AppState) -> Json<CacheStatistics> {
    Json(state.services.admin.cache_statistics().await)
}

pub async fn clear_cache_handler(State(state): AppState) -> Result<Json<Value>, AppError> {
    let removed = state.services.admin.clear_all().await?;
    Ok(Json(json!({ "removed": removed })))
}

pub async fn clear_namespace_handler(
    State(state): AppState,
    Path(namespace): Path<String>,
) -> Result<Json<Value>, AppError> {
    let removed = state.services.admin.clear_namespace(&namespace).await?;
    Ok(Json(json!({ "namespace": namespace, "removed": removed })))
}

pub async fn warm_up_handler(State(state): AppState) -> Json<Value> {
    let warmed = state.services.admin.warm_up().await;
    Json(json!({ "warmed": warmed }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_filter_parsing() {
        assert_eq!(variant_filter(None).unwrap(), VariantFilter::Any);
        assert_eq!(variant_filter(Some(" ")).unwrap(), VariantFilter::Any);
        assert_eq!(
            variant_filter(Some("traditional")).unwrap(),
            VariantFilter::Only(Variant::Traditional)
        );
        assert!(matches!(
            variant_filter(Some("cantonese")),
            Err(AppError::InvalidRequest(_))
        ));
    }
}
