//! Core data types shared by the search, suggestion, and embedding pipelines.
//!
//! Everything here is a plain value owned by the request or job that
//! created it. The only long-lived entity is [`QueueItem`], which belongs
//! to the embedding queue store until it is deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The record kinds this system can search.
///
/// Each variant carries its own storage table and the bilingual field list
/// used to build embedding input text, so adding a kind is a compile-checked
/// change rather than a new entry in a string-keyed map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Dossier,
    Position,
    Engagement,
    Document,
    Person,
    Mou,
}

impl EntityType {
    /// Default full-text search scope.
    pub const ALL: [EntityType; 6] = [
        EntityType::Dossier,
        EntityType::Position,
        EntityType::Engagement,
        EntityType::Document,
        EntityType::Person,
        EntityType::Mou,
    ];

    /// Kinds that carry embeddings and can be searched semantically.
    pub const SEMANTIC: [EntityType; 4] = [
        EntityType::Dossier,
        EntityType::Position,
        EntityType::Engagement,
        EntityType::Document,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Dossier => "dossier",
            EntityType::Position => "position",
            EntityType::Engagement => "engagement",
            EntityType::Document => "document",
            EntityType::Person => "person",
            EntityType::Mou => "mou",
        }
    }

    /// Backing table name in the record store.
    pub fn table(&self) -> &'static str {
        match self {
            EntityType::Dossier => "dossiers",
            EntityType::Position => "positions",
            EntityType::Engagement => "engagements",
            EntityType::Document => "documents",
            EntityType::Person => "persons",
            EntityType::Mou => "mous",
        }
    }

    /// Ordered field names concatenated into the embedding input text.
    pub fn embedding_fields(&self) -> &'static [&'static str] {
        match self {
            EntityType::Dossier => &["title_en", "title_ar", "description_en", "description_ar"],
            EntityType::Position => &[
                "title_en",
                "title_ar",
                "description_en",
                "description_ar",
                "rationale_en",
                "rationale_ar",
                "key_messages_en",
                "key_messages_ar",
            ],
            EntityType::Engagement => &[
                "title_en",
                "title_ar",
                "description_en",
                "description_ar",
                "objectives_en",
                "objectives_ar",
            ],
            EntityType::Document => &[
                "title_en",
                "title_ar",
                "description_en",
                "description_ar",
                "extracted_text_en",
                "extracted_text_ar",
            ],
            EntityType::Person => &[
                "title_en",
                "title_ar",
                "bio_en",
                "bio_ar",
                "expertise",
            ],
            EntityType::Mou => &[
                "title_en",
                "title_ar",
                "description_en",
                "description_ar",
                "scope_en",
                "scope_ar",
            ],
        }
    }

    pub fn supports_semantic(&self) -> bool {
        Self::SEMANTIC.contains(self)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown entity type: {0}")]
pub struct UnknownEntityType(pub String);

impl FromStr for EntityType {
    type Err = UnknownEntityType;

    /// Accepts both the singular name and the table name (`"dossier"`, `"dossiers"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        EntityType::ALL
            .into_iter()
            .find(|t| t.as_str() == lower || t.table() == lower)
            .ok_or_else(|| UnknownEntityType(s.to_string()))
    }
}

/// Query language. Selects the backend text-search dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Ar,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Ar => "ar",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" | "english" => Ok(Language::En),
            "ar" | "arabic" => Ok(Language::Ar),
            other => Err(format!("unknown language: {}", other)),
        }
    }
}

/// How a result was matched. Determines its score band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Exact,
    Semantic,
    Fuzzy,
}

/// A full record as held by the record store.
///
/// `title_*` and `description_*` are the columns every kind shares; any
/// kind-specific text (rationale, objectives, bio...) lives in `fields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub entity_type: EntityType,
    pub title_en: String,
    #[serde(default)]
    pub title_ar: String,
    #[serde(default)]
    pub description_en: Option<String>,
    #[serde(default)]
    pub description_ar: Option<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub is_archived: bool,
    pub updated_at: DateTime<Utc>,
}

fn default_status() -> String {
    "active".to_string()
}

impl Record {
    /// Look up a text field by name, covering both the shared columns and `fields`.
    pub fn field(&self, name: &str) -> Option<&str> {
        let value = match name {
            "title_en" => Some(self.title_en.as_str()),
            "title_ar" => Some(self.title_ar.as_str()),
            "description_en" => self.description_en.as_deref(),
            "description_ar" => self.description_ar.as_deref(),
            other => self.fields.get(other).map(String::as_str),
        };
        value.filter(|v| !v.trim().is_empty())
    }
}

/// A raw row returned by a record store search function.
///
/// `score` is the backend's native relevance in `[0, 1]` for full-text
/// searches and the cosine similarity for semantic searches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordRow {
    pub id: String,
    pub entity_type: EntityType,
    pub title_en: String,
    pub title_ar: String,
    pub snippet_en: Option<String>,
    pub snippet_ar: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub status: String,
    pub is_archived: bool,
    pub score: f64,
}

/// A ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub entity_type: EntityType,
    pub title_en: String,
    pub title_ar: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet_en: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet_ar: Option<String>,
    pub rank_score: f64,
    pub updated_at: DateTime<Utc>,
    pub is_archived: bool,
    pub match_type: MatchType,
}

/// A typeahead candidate as returned by the record store, before scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionCandidate {
    pub id: String,
    pub entity_type: EntityType,
    pub title_en: String,
    pub title_ar: String,
    pub preview_en: Option<String>,
    pub preview_ar: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// A scored typeahead suggestion. Read-only once cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub id: String,
    pub entity_type: EntityType,
    pub title_en: String,
    pub title_ar: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_en: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_ar: Option<String>,
    pub score: f64,
    pub match_position: usize,
}

/// A pending embedding refresh for one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: String,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    pub retry_count: u32,
    pub error_message: Option<String>,
}

/// A normalized query and how often it was searched within a window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopularQuery {
    pub query: String,
    pub count: u64,
}
