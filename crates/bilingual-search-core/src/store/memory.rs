//! In-memory implementation of every store trait, for tests and demos.
//!
//! Uses `HashMap`s and `Vec`s behind `parking_lot` locks. Full-text search
//! evaluates the parsed boolean expression by substring matching over the
//! normalized record text; semantic search is brute-force cosine similarity.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::embedding::cosine_similarity;
use crate::models::{
    EntityType, PopularQuery, QueueItem, Record, RecordRow, SuggestionCandidate,
};
use crate::query::{lex_expression, ExprToken, QueryMode};
use crate::text::normalize_search_text;

use super::{EmbeddingQueue, FullTextRequest, QueryHistory, RecordStore};

type RecordKey = (EntityType, String);

struct HistoryEntry {
    normalized: String,
    searched_at: DateTime<Utc>,
}

/// In-memory record store, embedding queue, and query history.
#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<RecordKey, Record>>,
    embeddings: RwLock<HashMap<RecordKey, Vec<f32>>>,
    queue: RwLock<Vec<QueueItem>>,
    history: RwLock<Vec<HistoryEntry>>,
    next_id: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored embedding for a record, if any.
    pub fn embedding(&self, entity_type: EntityType, id: &str) -> Option<Vec<f32>> {
        self.embeddings
            .read()
            .get(&(entity_type, id.to_string()))
            .cloned()
    }

    /// Snapshot of a queued item by id.
    pub fn queue_item(&self, item_id: &str) -> Option<QueueItem> {
        self.queue.read().iter().find(|i| i.id == item_id).cloned()
    }

    /// Record a query with an explicit timestamp.
    pub fn record_query_at(&self, normalized: &str, searched_at: DateTime<Utc>) {
        self.history.write().push(HistoryEntry {
            normalized: normalized.to_string(),
            searched_at,
        });
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

fn searchable_text(record: &Record) -> String {
    let mut parts = vec![record.title_en.as_str(), record.title_ar.as_str()];
    parts.extend(record.description_en.as_deref());
    parts.extend(record.description_ar.as_deref());
    parts.extend(record.fields.values().map(String::as_str));
    normalize_search_text(&parts.join(" "))
}

fn to_row(record: &Record, score: f64) -> RecordRow {
    RecordRow {
        id: record.id.clone(),
        entity_type: record.entity_type,
        title_en: record.title_en.clone(),
        title_ar: record.title_ar.clone(),
        snippet_en: record.description_en.clone(),
        snippet_ar: record.description_ar.clone(),
        updated_at: record.updated_at,
        status: record.status.clone(),
        is_archived: record.is_archived,
        score,
    }
}

/// Recursive-descent evaluator. Precedence: `!` > `<->` > `&` > `|`.
struct Matcher<'a> {
    toks: &'a [ExprToken],
    pos: usize,
    haystack: &'a str,
}

impl Matcher<'_> {
    fn peek(&self) -> Option<&ExprToken> {
        self.toks.get(self.pos)
    }

    fn or_expr(&mut self) -> bool {
        let mut value = self.and_expr();
        while self.peek() == Some(&ExprToken::Or) {
            self.pos += 1;
            let rhs = self.and_expr();
            value = value || rhs;
        }
        value
    }

    fn and_expr(&mut self) -> bool {
        let mut value = self.unary();
        while self.peek() == Some(&ExprToken::And) {
            self.pos += 1;
            let rhs = self.unary();
            value = value && rhs;
        }
        value
    }

    fn unary(&mut self) -> bool {
        match self.peek() {
            Some(ExprToken::Not) => {
                self.pos += 1;
                !self.unary()
            }
            Some(ExprToken::Open) => {
                self.pos += 1;
                let value = self.or_expr();
                if self.peek() == Some(&ExprToken::Close) {
                    self.pos += 1;
                }
                value
            }
            Some(ExprToken::Word(_)) => {
                let mut words = Vec::new();
                while let Some(ExprToken::Word(w)) = self.peek() {
                    words.push(w.clone());
                    self.pos += 1;
                    if self.peek() != Some(&ExprToken::Follow) {
                        break;
                    }
                    self.pos += 1;
                }
                self.haystack.contains(&words.join(" "))
            }
            _ => false,
        }
    }
}

fn matches_query(request: &FullTextRequest<'_>, haystack: &str) -> bool {
    match request.mode {
        QueryMode::Plain => request
            .query
            .tokens
            .first()
            .is_some_and(|t| haystack.contains(t.as_str())),
        QueryMode::Boolean => {
            let toks = lex_expression(&request.query.normalized_query);
            let mut matcher = Matcher {
                toks: &toks,
                pos: 0,
                haystack,
            };
            matcher.or_expr()
        }
    }
}

fn relevance(tokens: &[String], haystack: &str) -> f64 {
    if tokens.is_empty() {
        return 0.0;
    }
    let found = tokens
        .iter()
        .filter(|t| haystack.contains(t.as_str()))
        .count();
    found as f64 / tokens.len() as f64
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn search_full_text(
        &self,
        entity_type: EntityType,
        request: &FullTextRequest<'_>,
    ) -> Result<Vec<RecordRow>> {
        if request.query.is_empty() {
            return Ok(Vec::new());
        }

        let records = self.records.read();
        let mut rows: Vec<RecordRow> = records
            .values()
            .filter(|r| r.entity_type == entity_type)
            .filter(|r| request.include_archived || !r.is_archived)
            .filter_map(|r| {
                let haystack = searchable_text(r);
                matches_query(request, &haystack)
                    .then(|| to_row(r, relevance(&request.query.tokens, &haystack)))
            })
            .collect();

        rows.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(b.updated_at.cmp(&a.updated_at))
                .then(a.id.cmp(&b.id))
        });
        Ok(rows
            .into_iter()
            .skip(request.offset)
            .take(request.limit)
            .collect())
    }

    async fn search_semantic(
        &self,
        entity_type: EntityType,
        embedding: &[f32],
        threshold: f64,
        limit: usize,
    ) -> Result<Vec<RecordRow>> {
        let records = self.records.read();
        let embeddings = self.embeddings.read();

        let mut rows: Vec<RecordRow> = embeddings
            .iter()
            .filter(|((et, _), _)| *et == entity_type)
            .filter_map(|(key, vector)| {
                let record = records.get(key)?;
                if record.is_archived {
                    return None;
                }
                let similarity = cosine_similarity(embedding, vector) as f64;
                (similarity >= threshold).then(|| to_row(record, similarity))
            })
            .collect();

        rows.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.id.cmp(&b.id)));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn suggestion_candidates(
        &self,
        entity_type: EntityType,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<SuggestionCandidate>> {
        let needle = normalize_search_text(prefix);
        let records = self.records.read();

        let mut matched: Vec<&Record> = records
            .values()
            .filter(|r| r.entity_type == entity_type && !r.is_archived)
            .filter(|r| {
                normalize_search_text(&r.title_en).contains(&needle)
                    || normalize_search_text(&r.title_ar).contains(&needle)
            })
            .collect();
        matched.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.id.cmp(&b.id)));

        Ok(matched
            .into_iter()
            .take(limit)
            .map(|r| SuggestionCandidate {
                id: r.id.clone(),
                entity_type: r.entity_type,
                title_en: r.title_en.clone(),
                title_ar: r.title_ar.clone(),
                preview_en: r.description_en.clone(),
                preview_ar: r.description_ar.clone(),
                updated_at: r.updated_at,
            })
            .collect())
    }

    async fn get_record(&self, entity_type: EntityType, id: &str) -> Result<Option<Record>> {
        Ok(self
            .records
            .read()
            .get(&(entity_type, id.to_string()))
            .cloned())
    }

    async fn upsert_record(&self, record: &Record) -> Result<()> {
        self.records
            .write()
            .insert((record.entity_type, record.id.clone()), record.clone());
        Ok(())
    }

    async fn store_embedding(
        &self,
        entity_type: EntityType,
        id: &str,
        embedding: &[f32],
    ) -> Result<()> {
        self.embeddings
            .write()
            .insert((entity_type, id.to_string()), embedding.to_vec());
        Ok(())
    }
}

#[async_trait]
impl EmbeddingQueue for InMemoryStore {
    async fn enqueue(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        priority: i32,
    ) -> Result<QueueItem> {
        let mut queue = self.queue.write();
        if let Some(existing) = queue
            .iter()
            .find(|i| i.entity_type == entity_type && i.entity_id == entity_id)
        {
            return Ok(existing.clone());
        }
        let item = QueueItem {
            id: self.next_id("queue"),
            entity_type,
            entity_id: entity_id.to_string(),
            priority,
            created_at: Utc::now(),
            retry_count: 0,
            error_message: None,
        };
        queue.push(item.clone());
        Ok(item)
    }

    async fn fetch_pending(&self, limit: usize) -> Result<Vec<QueueItem>> {
        let mut items = self.queue.read().clone();
        items.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(a.created_at.cmp(&b.created_at))
        });
        items.truncate(limit);
        Ok(items)
    }

    async fn complete(&self, item_id: &str) -> Result<()> {
        self.queue.write().retain(|i| i.id != item_id);
        Ok(())
    }

    async fn record_failure(&self, item_id: &str, retry_count: u32, message: &str) -> Result<()> {
        if let Some(item) = self.queue.write().iter_mut().find(|i| i.id == item_id) {
            item.retry_count = retry_count;
            item.error_message = Some(message.to_string());
        }
        Ok(())
    }

    async fn pending_count(&self) -> Result<u64> {
        Ok(self.queue.read().len() as u64)
    }
}

#[async_trait]
impl QueryHistory for InMemoryStore {
    async fn record_query(&self, _query: &str, normalized: &str, _result_count: usize) -> Result<()> {
        self.record_query_at(normalized, Utc::now());
        Ok(())
    }

    async fn popular_queries(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<PopularQuery>> {
        let mut counts: HashMap<String, u64> = HashMap::new();
        for entry in self.history.read().iter() {
            if entry.searched_at >= since && !entry.normalized.is_empty() {
                *counts.entry(entry.normalized.clone()).or_default() += 1;
            }
        }
        let mut popular: Vec<PopularQuery> = counts
            .into_iter()
            .map(|(query, count)| PopularQuery { query, count })
            .collect();
        popular.sort_by(|a, b| b.count.cmp(&a.count).then(a.query.cmp(&b.query)));
        popular.truncate(limit);
        Ok(popular)
    }
}
