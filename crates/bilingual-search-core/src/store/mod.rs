//! Collaborator traits for persistence.
//!
//! The orchestrators never talk to a database directly. They are written
//! against three traits, each implemented by the SQLite store in the app
//! crate and by [`memory::InMemoryStore`] for tests:
//!
//! | Trait | Used by |
//! |-------|---------|
//! | [`RecordStore`] | full-text search, semantic search, suggestions, queue processor, import |
//! | [`EmbeddingQueue`] | queue processor, import |
//! | [`QueryHistory`] | full-text search (write), cache warmer (read) |
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{
    EntityType, PopularQuery, QueueItem, Record, RecordRow, SuggestionCandidate,
};
use crate::query::{ParsedQuery, QueryMode};

/// One per-type full-text lookup.
#[derive(Debug, Clone, Copy)]
pub struct FullTextRequest<'a> {
    pub query: &'a ParsedQuery,
    pub mode: QueryMode,
    pub limit: usize,
    pub offset: usize,
    pub include_archived: bool,
}

/// Record storage and per-type search functions.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`search_full_text`](RecordStore::search_full_text) | Boolean/plain text match, relevance in `[0, 1]` |
/// | [`search_semantic`](RecordStore::search_semantic) | Cosine similarity at or above a threshold |
/// | [`suggestion_candidates`](RecordStore::suggestion_candidates) | Title substring lookup, newest first |
/// | [`get_record`](RecordStore::get_record) | Fetch one record |
/// | [`upsert_record`](RecordStore::upsert_record) | Insert or replace a record |
/// | [`store_embedding`](RecordStore::store_embedding) | Persist a record's vector |
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn search_full_text(
        &self,
        entity_type: EntityType,
        request: &FullTextRequest<'_>,
    ) -> Result<Vec<RecordRow>>;

    /// Rows whose stored embedding has similarity `>= threshold` with
    /// `embedding`, most similar first. `score` carries the similarity.
    async fn search_semantic(
        &self,
        entity_type: EntityType,
        embedding: &[f32],
        threshold: f64,
        limit: usize,
    ) -> Result<Vec<RecordRow>>;

    /// Non-archived records whose normalized English or Arabic title
    /// contains `prefix`, most recently updated first.
    async fn suggestion_candidates(
        &self,
        entity_type: EntityType,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<SuggestionCandidate>>;

    async fn get_record(&self, entity_type: EntityType, id: &str) -> Result<Option<Record>>;

    async fn upsert_record(&self, record: &Record) -> Result<()>;

    async fn store_embedding(
        &self,
        entity_type: EntityType,
        id: &str,
        embedding: &[f32],
    ) -> Result<()>;
}

/// Durable queue of records whose embeddings need refreshing.
#[async_trait]
pub trait EmbeddingQueue: Send + Sync {
    /// Queue a record. If it is already queued the existing item is kept.
    async fn enqueue(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        priority: i32,
    ) -> Result<QueueItem>;

    /// Up to `limit` items, lowest priority value first, then oldest first.
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<QueueItem>>;

    /// Remove an item, either because it succeeded or was abandoned.
    async fn complete(&self, item_id: &str) -> Result<()>;

    /// Persist a new retry count and the last error message.
    async fn record_failure(&self, item_id: &str, retry_count: u32, message: &str) -> Result<()>;

    async fn pending_count(&self) -> Result<u64>;
}

/// Log of executed searches.
#[async_trait]
pub trait QueryHistory: Send + Sync {
    async fn record_query(&self, query: &str, normalized: &str, result_count: usize) -> Result<()>;

    /// Most frequent normalized queries recorded at or after `since`,
    /// most frequent first.
    async fn popular_queries(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<PopularQuery>>;
}
