//! # Entities
//!
//! Canonical records owned by the primary store. Everything in the search
//! index and the cache is derived from these.
//!
//! ## Enums
//! Stored and serialized under their canonical upper-case name. The same string
//! lands in the search documents, so filters written against the index use the
//! exact values below.
use std::{collections::BTreeSet, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub type Id = i64;

/// Identity and timestamp bookkeeping shared by every stored record.
pub trait Entity: Clone + Send + Sync + 'static {
    const KIND: &'static str;

    fn id(&self) -> Id;

    fn set_id(&mut self, id: Id);

    fn created_at(&self) -> Option<DateTime<Utc>>;

    fn set_created_at(&mut self, created_at: Option<DateTime<Utc>>);

    /// Stamps timestamps on insert (`created`) or update.
    fn touch(&mut self, now: DateTime<Utc>, created: bool);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Variant {
    Simplified,
    Traditional,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
    Expert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TextbookVersion {
    Pb3,
    New,
    Old,
}

macro_rules! canonical_names {
    ($ty:ident { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $name,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = AppError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_uppercase().as_str() {
                    $($name => Ok($ty::$variant),)+
                    other => Err(AppError::InvalidRequest(format!(
                        "unknown {} '{other}'",
                        stringify!($ty)
                    ))),
                }
            }
        }
    };
}

canonical_names!(Variant {
    Simplified => "SIMPLIFIED",
    Traditional => "TRADITIONAL",
    Both => "BOTH",
});

canonical_names!(Difficulty {
    Beginner => "BEGINNER",
    Intermediate => "INTERMEDIATE",
    Advanced => "ADVANCED",
    Expert => "EXPERT",
});

canonical_names!(TextbookVersion {
    Pb3 => "PB3",
    New => "NEW",
    Old => "OLD",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vocabulary {
    #[serde(default)]
    pub id: Id,
    pub hanzi: String,
    pub pinyin: String,
    pub meaning: String,
    #[serde(default)]
    pub example: Option<String>,
    pub variant: Variant,
    #[serde(default)]
    pub hsk_level: Option<i32>,
    #[serde(default)]
    pub frequency_rank: Option<i32>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrammarTopic {
    #[serde(default)]
    pub id: Id,
    pub title: String,
    pub structure: String,
    pub explanation: String,
    #[serde(default)]
    pub example: Option<String>,
    #[serde(default)]
    pub translation: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    #[serde(default)]
    pub id: Id,
    pub textbook_id: Id,
    /// Name of the owning textbook, filled in by the store on reads.
    #[serde(default)]
    pub textbook_name: Option<String>,
    pub level: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub lessons: Option<i32>,
    #[serde(default)]
    pub duration: Option<String>,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub cover_image_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Textbook {
    #[serde(default)]
    pub id: Id,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub version: TextbookVersion,
    pub publication_year: i32,
    #[serde(default)]
    pub pdf_url: Option<String>,
    #[serde(default)]
    pub cover_image_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Radical {
    #[serde(default)]
    pub id: Id,
    pub hanzi: String,
    pub strokes: i32,
    #[serde(default)]
    pub meaning: Option<String>,
    #[serde(default)]
    pub pronunciation: Option<String>,
    #[serde(default)]
    pub frequency_rank: Option<i32>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

macro_rules! timestamped {
    ($ty:ident, $kind:literal) => {
        impl Entity for $ty {
            const KIND: &'static str = $kind;

            fn id(&self) -> Id {
                self.id
            }

            fn set_id(&mut self, id: Id) {
                self.id = id;
            }

            fn created_at(&self) -> Option<DateTime<Utc>> {
                self.created_at
            }

            fn set_created_at(&mut self, created_at: Option<DateTime<Utc>>) {
                self.created_at = created_at;
            }

            fn touch(&mut self, now: DateTime<Utc>, created: bool) {
                if created || self.created_at.is_none() {
                    self.created_at = Some(now);
                }
                self.updated_at = Some(now);
            }
        }
    };
}

timestamped!(Vocabulary, "Vocabulary");
timestamped!(GrammarTopic, "GrammarTopic");
timestamped!(Course, "Course");
timestamped!(Textbook, "Textbook");

impl Entity for Radical {
    const KIND: &'static str = "Radical";

    fn id(&self) -> Id {
        self.id
    }

    fn set_id(&mut self, id: Id) {
        self.id = id;
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    fn set_created_at(&mut self, created_at: Option<DateTime<Utc>>) {
        self.created_at = created_at;
    }

    fn touch(&mut self, now: DateTime<Utc>, created: bool) {
        if created || self.created_at.is_none() {
            self.created_at = Some(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_names() {
        assert_eq!(Variant::Both.as_str(), "BOTH");
        assert_eq!("traditional".parse::<Variant>().unwrap(), Variant::Traditional);
        assert_eq!(" pb3 ".parse::<TextbookVersion>().unwrap(), TextbookVersion::Pb3);
        assert!("HARD".parse::<Difficulty>().is_err());
    }

    #[test]
    fn test_serde_uses_canonical_names() {
        let json = serde_json::to_string(&Difficulty::Intermediate).unwrap();
        assert_eq!(json, "\"INTERMEDIATE\"");

        let variant: Variant = serde_json::from_str("\"SIMPLIFIED\"").unwrap();
        assert_eq!(variant, Variant::Simplified);
    }

    #[test]
    fn test_touch_keeps_created_at_on_update() {
        let created = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let later = DateTime::from_timestamp(1_700_000_600, 0).unwrap();

        let mut radical = Radical {
            id: 1,
            hanzi: "口".into(),
            strokes: 3,
            meaning: None,
            pronunciation: None,
            frequency_rank: None,
            created_at: None,
        };
        radical.touch(created, true);
        radical.touch(later, false);
        assert_eq!(radical.created_at, Some(created));

        let mut topic = GrammarTopic {
            id: 1,
            title: "把 sentences".into(),
            structure: "S + 把 + O + V".into(),
            explanation: "Disposal construction".into(),
            example: None,
            translation: None,
            tags: BTreeSet::new(),
            created_at: None,
            updated_at: None,
        };
        topic.touch(created, true);
        topic.touch(later, false);
        assert_eq!(topic.created_at, Some(created));
        assert_eq!(topic.updated_at, Some(later));
    }
}
