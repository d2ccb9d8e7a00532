use std::{
    collections::{BTreeSet, HashMap},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    FromRow, PgConnection, PgPool, Postgres, Transaction,
    postgres::PgPoolOptions,
};
use tracing::info;

use super::Repository;
use crate::{
    error::AppError,
    models::{Course, Entity, GrammarTopic, Id, Radical, Textbook, Vocabulary},
};

const VOCABULARY_COLUMNS: &str = "id, hanzi, pinyin, meaning, example, variant, hsk_level, \
                                  frequency_rank, created_at, updated_at";

const COURSE_SELECT: &str = "SELECT c.id, c.textbook_id, t.name AS textbook_name, c.level, \
                             c.title, c.description, c.lessons, c.duration, c.difficulty, \
                             c.cover_image_url, c.created_at, c.updated_at \
                             FROM courses c LEFT JOIN textbooks t ON t.id = c.textbook_id";

pub struct PgStore {
    pool: PgPool,
}

pub async fn init_postgres(database_url: &str) -> Result<PgStore, AppError> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Postgres migrations applied");

    Ok(PgStore { pool })
}

impl PgStore {
    /// Read-only transaction that sees a single snapshot for all its queries.
    async fn snapshot(&self) -> Result<Transaction<'static, Postgres>, AppError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;

        Ok(tx)
    }
}

fn decode<T: std::str::FromStr<Err = AppError>>(value: &str) -> Result<T, AppError> {
    value
        .parse()
        .map_err(|e: AppError| AppError::Database(sqlx::Error::Decode(Box::new(e))))
}

fn unique_violation(
    error: sqlx::Error,
    kind: &'static str,
    field: &'static str,
    value: &str,
) -> AppError {
    match &error {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::duplicate(kind, field, value)
        }
        _ => error.into(),
    }
}

#[derive(FromRow)]
struct VocabularyRow {
    id: Id,
    hanzi: String,
    pinyin: String,
    meaning: String,
    example: Option<String>,
    variant: String,
    hsk_level: Option<i32>,
    frequency_rank: Option<i32>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct TagRow {
    vocab_id: Id,
    tag: String,
}

impl VocabularyRow {
    fn into_entity(self, tags: BTreeSet<String>) -> Result<Vocabulary, AppError> {
        Ok(Vocabulary {
            id: self.id,
            hanzi: self.hanzi,
            pinyin: self.pinyin,
            meaning: self.meaning,
            example: self.example,
            variant: decode(&self.variant)?,
            hsk_level: self.hsk_level,
            frequency_rank: self.frequency_rank,
            tags,
            created_at: Some(self.created_at),
            updated_at: Some(self.updated_at),
        })
    }
}

async fn replace_tags(
    conn: &mut PgConnection,
    vocab_id: Id,
    tags: &BTreeSet<String>,
) -> Result<(), AppError> {
    sqlx::query("DELETE FROM vocab_tags WHERE vocab_id = $1")
        .bind(vocab_id)
        .execute(&mut *conn)
        .await?;

    for tag in tags {
        sqlx::query("INSERT INTO vocab_tags (vocab_id, tag) VALUES ($1, $2)")
            .bind(vocab_id)
            .bind(tag)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

#[async_trait]
impl Repository<Vocabulary> for PgStore {
    async fn find_all(&self) -> Result<Vec<Vocabulary>, AppError> {
        let mut tx = self.snapshot().await?;

        let rows = sqlx::query_as::<_, VocabularyRow>(&format!(
            "SELECT {VOCABULARY_COLUMNS} FROM vocabulary ORDER BY id"
        ))
        .fetch_all(&mut *tx)
        .await?;

        let tag_rows = sqlx::query_as::<_, TagRow>("SELECT vocab_id, tag FROM vocab_tags")
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;

        let mut tags: HashMap<Id, BTreeSet<String>> = HashMap::new();
        for row in tag_rows {
            tags.entry(row.vocab_id).or_default().insert(row.tag);
        }

        rows.into_iter()
            .map(|row| {
                let row_tags = tags.remove(&row.id).unwrap_or_default();
                row.into_entity(row_tags)
            })
            .collect()
    }

    async fn find_by_id(&self, id: Id) -> Result<Option<Vocabulary>, AppError> {
        let mut tx = self.snapshot().await?;

        let row = sqlx::query_as::<_, VocabularyRow>(&format!(
            "SELECT {VOCABULARY_COLUMNS} FROM vocabulary WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let tags: Vec<String> = sqlx::query_scalar("SELECT tag FROM vocab_tags WHERE vocab_id = $1")
            .bind(id)
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;

        row.into_entity(tags.into_iter().collect()).map(Some)
    }

    async fn insert(&self, mut entity: Vocabulary) -> Result<Vocabulary, AppError> {
        entity.touch(Utc::now(), true);
        let mut tx = self.pool.begin().await?;

        let id: Id = sqlx::query_scalar(
            r#"
            INSERT INTO vocabulary
                (hanzi, pinyin, meaning, example, variant, hsk_level, frequency_rank, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            "#,
        )
        .bind(&entity.hanzi)
        .bind(&entity.pinyin)
        .bind(&entity.meaning)
        .bind(&entity.example)
        .bind(entity.variant.as_str())
        .bind(entity.hsk_level)
        .bind(entity.frequency_rank)
        .bind(entity.created_at)
        .bind(entity.updated_at)
        .fetch_one(&mut *tx)
        .await?;

        replace_tags(&mut tx, id, &entity.tags).await?;
        tx.commit().await?;

        entity.set_id(id);
        Ok(entity)
    }

    async fn update(&self, mut entity: Vocabulary) -> Result<Vocabulary, AppError> {
        entity.touch(Utc::now(), false);
        let mut tx = self.pool.begin().await?;

        let created_at: Option<DateTime<Utc>> = sqlx::query_scalar(
            r#"
            UPDATE vocabulary
            SET hanzi = $2, pinyin = $3, meaning = $4, example = $5, variant = $6,
                hsk_level = $7, frequency_rank = $8, updated_at = $9
            WHERE id = $1
            RETURNING created_at
            "#,
        )
        .bind(entity.id)
        .bind(&entity.hanzi)
        .bind(&entity.pinyin)
        .bind(&entity.meaning)
        .bind(&entity.example)
        .bind(entity.variant.as_str())
        .bind(entity.hsk_level)
        .bind(entity.frequency_rank)
        .bind(entity.updated_at)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(created_at) = created_at else {
            return Err(AppError::not_found(Vocabulary::KIND, entity.id));
        };

        replace_tags(&mut tx, entity.id, &entity.tags).await?;
        tx.commit().await?;

        entity.created_at = Some(created_at);
        Ok(entity)
    }

    async fn delete(&self, id: Id) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM vocabulary WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(FromRow)]
struct GrammarTopicRow {
    id: Id,
    title: String,
    structure: String,
    explanation: String,
    example: Option<String>,
    translation: Option<String>,
    tags: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<GrammarTopicRow> for GrammarTopic {
    fn from(row: GrammarTopicRow) -> Self {
        GrammarTopic {
            id: row.id,
            title: row.title,
            structure: row.structure,
            explanation: row.explanation,
            example: row.example,
            translation: row.translation,
            tags: row.tags.into_iter().collect(),
            created_at: Some(row.created_at),
            updated_at: Some(row.updated_at),
        }
    }
}

#[async_trait]
impl Repository<GrammarTopic> for PgStore {
    async fn find_all(&self) -> Result<Vec<GrammarTopic>, AppError> {
        let mut tx = self.snapshot().await?;
        let rows = sqlx::query_as::<_, GrammarTopicRow>("SELECT * FROM grammar_topics ORDER BY id")
            .fetch_all(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn find_by_id(&self, id: Id) -> Result<Option<GrammarTopic>, AppError> {
        let row = sqlx::query_as::<_, GrammarTopicRow>("SELECT * FROM grammar_topics WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Into::into))
    }

    async fn insert(&self, mut entity: GrammarTopic) -> Result<GrammarTopic, AppError> {
        entity.touch(Utc::now(), true);
        let tags: Vec<String> = entity.tags.iter().cloned().collect();

        let id: Id = sqlx::query_scalar(
            r#"
            INSERT INTO grammar_topics
                (title, structure, explanation, example, translation, tags, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(&entity.title)
        .bind(&entity.structure)
        .bind(&entity.explanation)
        .bind(&entity.example)
        .bind(&entity.translation)
        .bind(tags)
        .bind(entity.created_at)
        .bind(entity.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| unique_violation(e, GrammarTopic::KIND, "title", &entity.title))?;

        entity.set_id(id);
        Ok(entity)
    }

    async fn update(&self, mut entity: GrammarTopic) -> Result<GrammarTopic, AppError> {
        entity.touch(Utc::now(), false);
        let tags: Vec<String> = entity.tags.iter().cloned().collect();

        let created_at: Option<DateTime<Utc>> = sqlx::query_scalar(
            r#"
            UPDATE grammar_topics
            SET title = $2, structure = $3, explanation = $4, example = $5,
                translation = $6, tags = $7, updated_at = $8
            WHERE id = $1
            RETURNING created_at
            "#,
        )
        .bind(entity.id)
        .bind(&entity.title)
        .bind(&entity.structure)
        .bind(&entity.explanation)
        .bind(&entity.example)
        .bind(&entity.translation)
        .bind(tags)
        .bind(entity.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| unique_violation(e, GrammarTopic::KIND, "title", &entity.title))?;

        entity.created_at = Some(
            created_at.ok_or_else(|| AppError::not_found(GrammarTopic::KIND, entity.id))?,
        );
        Ok(entity)
    }

    async fn delete(&self, id: Id) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM grammar_topics WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(FromRow)]
struct CourseRow {
    id: Id,
    textbook_id: Id,
    textbook_name: Option<String>,
    level: String,
    title: String,
    description: Option<String>,
    lessons: Option<i32>,
    duration: Option<String>,
    difficulty: String,
    cover_image_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CourseRow> for Course {
    type Error = AppError;

    fn try_from(row: CourseRow) -> Result<Self, Self::Error> {
        Ok(Course {
            id: row.id,
            textbook_id: row.textbook_id,
            textbook_name: row.textbook_name,
            level: row.level,
            title: row.title,
            description: row.description,
            lessons: row.lessons,
            duration: row.duration,
            difficulty: decode(&row.difficulty)?,
            cover_image_url: row.cover_image_url,
            created_at: Some(row.created_at),
            updated_at: Some(row.updated_at),
        })
    }
}

#[async_trait]
impl Repository<Course> for PgStore {
    async fn find_all(&self) -> Result<Vec<Course>, AppError> {
        let mut tx = self.snapshot().await?;
        let rows = sqlx::query_as::<_, CourseRow>(&format!("{COURSE_SELECT} ORDER BY c.id"))
            .fetch_all(&mut *tx)
            .await?;
        tx.commit().await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn find_by_id(&self, id: Id) -> Result<Option<Course>, AppError> {
        let row = sqlx::query_as::<_, CourseRow>(&format!("{COURSE_SELECT} WHERE c.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn insert(&self, mut entity: Course) -> Result<Course, AppError> {
        entity.touch(Utc::now(), true);

        let id: Id = sqlx::query_scalar(
            r#"
            INSERT INTO courses
                (textbook_id, level, title, description, lessons, duration, difficulty,
                 cover_image_url, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id
            "#,
        )
        .bind(entity.textbook_id)
        .bind(&entity.level)
        .bind(&entity.title)
        .bind(&entity.description)
        .bind(entity.lessons)
        .bind(&entity.duration)
        .bind(entity.difficulty.as_str())
        .bind(&entity.cover_image_url)
        .bind(entity.created_at)
        .bind(entity.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| unique_violation(e, Course::KIND, "level for textbook", &entity.level))?;

        Repository::<Course>::find_by_id(self, id)
            .await?
            .ok_or_else(|| AppError::not_found(Course::KIND, id))
    }

    async fn update(&self, mut entity: Course) -> Result<Course, AppError> {
        entity.touch(Utc::now(), false);

        let result = sqlx::query(
            r#"
            UPDATE courses
            SET textbook_id = $2, level = $3, title = $4, description = $5, lessons = $6,
                duration = $7, difficulty = $8, cover_image_url = $9, updated_at = $10
            WHERE id = $1
            "#,
        )
        .bind(entity.id)
        .bind(entity.textbook_id)
        .bind(&entity.level)
        .bind(&entity.title)
        .bind(&entity.description)
        .bind(entity.lessons)
        .bind(&entity.duration)
        .bind(entity.difficulty.as_str())
        .bind(&entity.cover_image_url)
        .bind(entity.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| unique_violation(e, Course::KIND, "level for textbook", &entity.level))?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(Course::KIND, entity.id));
        }

        Repository::<Course>::find_by_id(self, entity.id)
            .await?
            .ok_or_else(|| AppError::not_found(Course::KIND, entity.id))
    }

    async fn delete(&self, id: Id) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM courses WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(FromRow)]
struct TextbookRow {
    id: Id,
    name: String,
    description: Option<String>,
    version: String,
    publication_year: i32,
    pdf_url: Option<String>,
    cover_image_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TextbookRow> for Textbook {
    type Error = AppError;

    fn try_from(row: TextbookRow) -> Result<Self, Self::Error> {
        Ok(Textbook {
            id: row.id,
            name: row.name,
            description: row.description,
            version: decode(&row.version)?,
            publication_year: row.publication_year,
            pdf_url: row.pdf_url,
            cover_image_url: row.cover_image_url,
            created_at: Some(row.created_at),
            updated_at: Some(row.updated_at),
        })
    }
}

#[async_trait]
impl Repository<Textbook> for PgStore {
    async fn find_all(&self) -> Result<Vec<Textbook>, AppError> {
        let mut tx = self.snapshot().await?;
        let rows = sqlx::query_as::<_, TextbookRow>("SELECT * FROM textbooks ORDER BY id")
            .fetch_all(&mut *tx)
            .await?;
        tx.commit().await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn find_by_id(&self, id: Id) -> Result<Option<Textbook>, AppError> {
        let row = sqlx::query_as::<_, TextbookRow>("SELECT * FROM textbooks WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn insert(&self, mut entity: Textbook) -> Result<Textbook, AppError> {
        entity.touch(Utc::now(), true);

        let id: Id = sqlx::query_scalar(
            r#"
            INSERT INTO textbooks
                (name, description, version, publication_year, pdf_url, cover_image_url,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(&entity.name)
        .bind(&entity.description)
        .bind(entity.version.as_str())
        .bind(entity.publication_year)
        .bind(&entity.pdf_url)
        .bind(&entity.cover_image_url)
        .bind(entity.created_at)
        .bind(entity.updated_at)
        .fetch_one(&self.pool)
        .await?;

        entity.set_id(id);
        Ok(entity)
    }

    async fn update(&self, mut entity: Textbook) -> Result<Textbook, AppError> {
        entity.touch(Utc::now(), false);

        let created_at: Option<DateTime<Utc>> = sqlx::query_scalar(
            r#"
            UPDATE textbooks
            SET name = $2, description = $3, version = $4, publication_year = $5,
                pdf_url = $6, cover_image_url = $7, updated_at = $8
            WHERE id = $1
            RETURNING created_at
            "#,
        )
        .bind(entity.id)
        .bind(&entity.name)
        .bind(&entity.description)
        .bind(entity.version.as_str())
        .bind(entity.publication_year)
        .bind(&entity.pdf_url)
        .bind(&entity.cover_image_url)
        .bind(entity.updated_at)
        .fetch_optional(&self.pool)
        .await?;

        entity.created_at =
            Some(created_at.ok_or_else(|| AppError::not_found(Textbook::KIND, entity.id))?);
        Ok(entity)
    }

    async fn delete(&self, id: Id) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM textbooks WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(FromRow)]
struct RadicalRow {
    id: Id,
    hanzi: String,
    strokes: i32,
    meaning: Option<String>,
    pronunciation: Option<String>,
    frequency_rank: Option<i32>,
    created_at: DateTime<Utc>,
}

impl From<RadicalRow> for Radical {
    fn from(row: RadicalRow) -> Self {
        Radical {
            id: row.id,
            hanzi: row.hanzi,
            strokes: row.strokes,
            meaning: row.meaning,
            pronunciation: row.pronunciation,
            frequency_rank: row.frequency_rank,
            created_at: Some(row.created_at),
        }
    }
}

#[async_trait]
impl Repository<Radical> for PgStore {
    async fn find_all(&self) -> Result<Vec<Radical>, AppError> {
        let mut tx = self.snapshot().await?;
        let rows = sqlx::query_as::<_, RadicalRow>("SELECT * FROM radicals ORDER BY id")
            .fetch_all(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn find_by_id(&self, id: Id) -> Result<Option<Radical>, AppError> {
        let row = sqlx::query_as::<_, RadicalRow>("SELECT * FROM radicals WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Into::into))
    }

    async fn insert(&self, mut entity: Radical) -> Result<Radical, AppError> {
        entity.touch(Utc::now(), true);

        let id: Id = sqlx::query_scalar(
            r#"
            INSERT INTO radicals (hanzi, strokes, meaning, pronunciation, frequency_rank, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(&entity.hanzi)
        .bind(entity.strokes)
        .bind(&entity.meaning)
        .bind(&entity.pronunciation)
        .bind(entity.frequency_rank)
        .bind(entity.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| unique_violation(e, Radical::KIND, "hanzi", &entity.hanzi))?;

        entity.set_id(id);
        Ok(entity)
    }

    async fn update(&self, entity: Radical) -> Result<Radical, AppError> {
        let row = sqlx::query_as::<_, RadicalRow>(
            r#"
            UPDATE radicals
            SET hanzi = $2, strokes = $3, meaning = $4, pronunciation = $5, frequency_rank = $6
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(entity.id)
        .bind(&entity.hanzi)
        .bind(entity.strokes)
        .bind(&entity.meaning)
        .bind(&entity.pronunciation)
        .bind(entity.frequency_rank)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| unique_violation(e, Radical::KIND, "hanzi", &entity.hanzi))?;

        row.map(Into::into)
            .ok_or_else(|| AppError::not_found(Radical::KIND, entity.id))
    }

    async fn delete(&self, id: Id) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM radicals WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
