//! SQLite-backed implementation of the store traits.
//!
//! Records live in one `records` table keyed by `(entity_type, id)`; their
//! normalized title and body text is mirrored into the `records_fts` FTS5
//! index. Embeddings are little-endian f32 BLOBs on the record row and
//! semantic search is brute-force cosine similarity over them.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;

use bilingual_search_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use bilingual_search_core::models::{
    EntityType, PopularQuery, QueueItem, Record, RecordRow, SuggestionCandidate,
};
use bilingual_search_core::query::{lex_expression, ExprToken, ParsedQuery, QueryMode};
use bilingual_search_core::store::{EmbeddingQueue, FullTextRequest, QueryHistory, RecordStore};
use bilingual_search_core::text::normalize_search_text;

/// SQLite implementation of [`RecordStore`], [`EmbeddingQueue`] and
/// [`QueryHistory`].
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn parse_entity(row: &SqliteRow, column: &str) -> Result<EntityType> {
    let raw: String = row.get(column);
    raw.parse()
        .with_context(|| format!("corrupt {} column", column))
}

const ROW_COLUMNS: &str = "r.id, r.entity_type, r.title_en, r.title_ar, \
    substr(r.description_en, 1, 240) AS snippet_en, \
    substr(r.description_ar, 1, 240) AS snippet_ar, \
    r.status, r.is_archived, r.updated_at";

fn to_record_row(row: &SqliteRow, score: f64) -> Result<RecordRow> {
    Ok(RecordRow {
        id: row.get("id"),
        entity_type: parse_entity(row, "entity_type")?,
        title_en: row.get("title_en"),
        title_ar: row.get("title_ar"),
        snippet_en: row.get("snippet_en"),
        snippet_ar: row.get("snippet_ar"),
        updated_at: from_millis(row.get("updated_at")),
        status: row.get("status"),
        is_archived: row.get::<i64, _>("is_archived") != 0,
        score,
    })
}

fn to_queue_item(row: &SqliteRow) -> Result<QueueItem> {
    Ok(QueueItem {
        id: row.get("id"),
        entity_type: parse_entity(row, "entity_type")?,
        entity_id: row.get("entity_id"),
        priority: row.get::<i64, _>("priority") as i32,
        created_at: from_millis(row.get("created_at")),
        retry_count: row.get::<i64, _>("retry_count") as u32,
        error_message: row.get("error_message"),
    })
}

/// FTS5 `bm25()` is negative, lower is better. Map to `(0, 1)`.
fn bm25_to_relevance(rank: f64) -> f64 {
    let r = (-rank).max(0.0);
    r / (1.0 + r)
}

#[derive(Debug, Clone, PartialEq)]
enum Fts {
    Term(String),
    And,
    Or,
    Not,
    Open,
    Close,
}

impl Fts {
    fn is_operator(&self) -> bool {
        matches!(self, Fts::And | Fts::Or | Fts::Not)
    }
}

fn quote(words: &[String]) -> String {
    format!("\"{}\"", words.join(" ").replace('"', "\"\""))
}

/// Translate a parsed query into an FTS5 `MATCH` expression.
///
/// `a & !b` becomes `a NOT b`. FTS5 has no unary negation, so a `!` that
/// does not follow `&` is dropped together with its operand. Returns
/// `None` when nothing searchable is left.
pub fn to_fts5_query(parsed: &ParsedQuery, mode: QueryMode) -> Option<String> {
    if mode == QueryMode::Plain {
        let token = parsed.tokens.first()?;
        let words: Vec<String> = token.split_whitespace().map(str::to_string).collect();
        return (!words.is_empty()).then(|| quote(&words));
    }

    let toks = lex_expression(&parsed.normalized_query);
    let mut out: Vec<Fts> = Vec::new();
    let mut i = 0;

    while i < toks.len() {
        match &toks[i] {
            ExprToken::Word(_) => {
                let (words, next) = take_phrase(&toks, i);
                out.push(Fts::Term(quote(&words)));
                i = next;
                continue;
            }
            ExprToken::And => out.push(Fts::And),
            ExprToken::Or => out.push(Fts::Or),
            ExprToken::Open => out.push(Fts::Open),
            ExprToken::Close => out.push(Fts::Close),
            ExprToken::Follow => {}
            ExprToken::Not => {
                if out.last() == Some(&Fts::And) {
                    out.pop();
                    out.push(Fts::Not);
                } else {
                    i = skip_operand(&toks, i + 1);
                    continue;
                }
            }
        }
        i += 1;
    }

    cleanup(&mut out);
    if out.is_empty() {
        return None;
    }

    let mut expr = String::new();
    for frag in &out {
        match frag {
            Fts::Term(t) => expr.push_str(t),
            Fts::And => expr.push_str(" AND "),
            Fts::Or => expr.push_str(" OR "),
            Fts::Not => expr.push_str(" NOT "),
            Fts::Open => expr.push('('),
            Fts::Close => expr.push(')'),
        }
    }
    Some(expr)
}

/// Collect `w1 <-> w2 <-> ...` starting at `start`.
fn take_phrase(toks: &[ExprToken], start: usize) -> (Vec<String>, usize) {
    let mut words = Vec::new();
    let mut i = start;
    while let Some(ExprToken::Word(w)) = toks.get(i) {
        words.push(w.clone());
        i += 1;
        if toks.get(i) != Some(&ExprToken::Follow) {
            break;
        }
        i += 1;
    }
    (words, i)
}

/// Index just past the operand starting at `start`.
fn skip_operand(toks: &[ExprToken], start: usize) -> usize {
    match toks.get(start) {
        Some(ExprToken::Not) => skip_operand(toks, start + 1),
        Some(ExprToken::Word(_)) => take_phrase(toks, start).1,
        Some(ExprToken::Open) => {
            let mut depth = 0usize;
            let mut i = start;
            while i < toks.len() {
                match toks[i] {
                    ExprToken::Open => depth += 1,
                    ExprToken::Close => {
                        depth -= 1;
                        if depth == 0 {
                            return i + 1;
                        }
                    }
                    _ => {}
                }
                i += 1;
            }
            i
        }
        _ => start,
    }
}

/// Remove operators with a missing operand and empty groups until stable.
fn cleanup(out: &mut Vec<Fts>) {
    loop {
        let before = out.len();
        let mut cleaned: Vec<Fts> = Vec::with_capacity(out.len());
        for frag in out.drain(..) {
            if frag.is_operator() {
                match cleaned.last() {
                    None | Some(Fts::Open) => {}
                    Some(last) if last.is_operator() => {
                        cleaned.pop();
                        cleaned.push(frag);
                    }
                    Some(_) => cleaned.push(frag),
                }
                continue;
            }
            match frag {
                Fts::Close => {
                    while cleaned.last().is_some_and(Fts::is_operator) {
                        cleaned.pop();
                    }
                    if cleaned.last() == Some(&Fts::Open) {
                        cleaned.pop();
                    } else {
                        cleaned.push(Fts::Close);
                    }
                }
                other => cleaned.push(other),
            }
        }
        while cleaned.last().is_some_and(Fts::is_operator) {
            cleaned.pop();
        }
        *out = cleaned;
        if out.len() == before {
            break;
        }
    }
}

fn searchable_body(record: &Record) -> String {
    let mut parts: Vec<&str> = Vec::new();
    parts.extend(record.description_en.as_deref());
    parts.extend(record.description_ar.as_deref());
    parts.extend(record.fields.values().map(String::as_str));
    normalize_search_text(&parts.join(" "))
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn search_full_text(
        &self,
        entity_type: EntityType,
        request: &FullTextRequest<'_>,
    ) -> Result<Vec<RecordRow>> {
        let match_expr = match to_fts5_query(request.query, request.mode) {
            Some(expr) => expr,
            None => return Ok(Vec::new()),
        };

        let sql = format!(
            r#"
            SELECT {ROW_COLUMNS}, bm25(records_fts, 0.0, 0.0, 4.0, 1.0) AS rank
            FROM records_fts
            JOIN records r
              ON r.entity_type = records_fts.entity_type AND r.id = records_fts.record_id
            WHERE records_fts MATCH ?
              AND records_fts.entity_type = ?
              AND (? OR r.is_archived = 0)
            ORDER BY rank, r.updated_at DESC
            LIMIT ? OFFSET ?
            "#
        );

        let rows = sqlx::query(&sql)
            .bind(&match_expr)
            .bind(entity_type.as_str())
            .bind(request.include_archived)
            .bind(request.limit as i64)
            .bind(request.offset as i64)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("full-text search on {}", entity_type.table()))?;

        rows.iter()
            .map(|row| to_record_row(row, bm25_to_relevance(row.get("rank"))))
            .collect()
    }

    async fn search_semantic(
        &self,
        entity_type: EntityType,
        embedding: &[f32],
        threshold: f64,
        limit: usize,
    ) -> Result<Vec<RecordRow>> {
        let sql = format!(
            "SELECT {ROW_COLUMNS}, r.embedding FROM records r \
             WHERE r.entity_type = ? AND r.embedding IS NOT NULL AND r.is_archived = 0"
        );
        let rows = sqlx::query(&sql)
            .bind(entity_type.as_str())
            .fetch_all(&self.pool)
            .await?;

        let mut results = Vec::new();
        for row in &rows {
            let blob: Vec<u8> = row.get("embedding");
            let similarity = cosine_similarity(embedding, &blob_to_vec(&blob)) as f64;
            if similarity >= threshold {
                results.push(to_record_row(row, similarity)?);
            }
        }

        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(limit);
        Ok(results)
    }

    async fn suggestion_candidates(
        &self,
        entity_type: EntityType,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<SuggestionCandidate>> {
        let needle = normalize_search_text(prefix);
        let rows = sqlx::query(
            r#"
            SELECT id, entity_type, title_en, title_ar,
                   substr(description_en, 1, 160) AS preview_en,
                   substr(description_ar, 1, 160) AS preview_ar,
                   updated_at
            FROM records
            WHERE entity_type = ?
              AND is_archived = 0
              AND (instr(title_norm_en, ?) > 0 OR instr(title_norm_ar, ?) > 0)
            ORDER BY updated_at DESC
            LIMIT ?
            "#,
        )
        .bind(entity_type.as_str())
        .bind(&needle)
        .bind(&needle)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(SuggestionCandidate {
                    id: row.get("id"),
                    entity_type: parse_entity(row, "entity_type")?,
                    title_en: row.get("title_en"),
                    title_ar: row.get("title_ar"),
                    preview_en: row.get("preview_en"),
                    preview_ar: row.get("preview_ar"),
                    updated_at: from_millis(row.get("updated_at")),
                })
            })
            .collect()
    }

    async fn get_record(&self, entity_type: EntityType, id: &str) -> Result<Option<Record>> {
        let row = sqlx::query(
            r#"
            SELECT id, entity_type, title_en, title_ar, description_en, description_ar,
                   fields_json, status, is_archived, updated_at
            FROM records WHERE entity_type = ? AND id = ?
            "#,
        )
        .bind(entity_type.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let row = match row {
            Some(row) => row,
            None => return Ok(None),
        };

        let fields_json: String = row.get("fields_json");
        let fields: BTreeMap<String, String> = serde_json::from_str(&fields_json)
            .with_context(|| format!("corrupt fields_json for {} {}", entity_type, id))?;

        Ok(Some(Record {
            id: row.get("id"),
            entity_type,
            title_en: row.get("title_en"),
            title_ar: row.get("title_ar"),
            description_en: row.get("description_en"),
            description_ar: row.get("description_ar"),
            fields,
            status: row.get("status"),
            is_archived: row.get::<i64, _>("is_archived") != 0,
            updated_at: from_millis(row.get("updated_at")),
        }))
    }

    async fn upsert_record(&self, record: &Record) -> Result<()> {
        let fields_json = serde_json::to_string(&record.fields)?;
        let title_norm_en = normalize_search_text(&record.title_en);
        let title_norm_ar = normalize_search_text(&record.title_ar);
        let entity_type = record.entity_type.as_str();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO records (entity_type, id, title_en, title_ar, description_en,
                                 description_ar, fields_json, status, is_archived,
                                 updated_at, title_norm_en, title_norm_ar)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(entity_type, id) DO UPDATE SET
                title_en = excluded.title_en,
                title_ar = excluded.title_ar,
                description_en = excluded.description_en,
                description_ar = excluded.description_ar,
                fields_json = excluded.fields_json,
                status = excluded.status,
                is_archived = excluded.is_archived,
                updated_at = excluded.updated_at,
                title_norm_en = excluded.title_norm_en,
                title_norm_ar = excluded.title_norm_ar
            "#,
        )
        .bind(entity_type)
        .bind(&record.id)
        .bind(&record.title_en)
        .bind(&record.title_ar)
        .bind(&record.description_en)
        .bind(&record.description_ar)
        .bind(&fields_json)
        .bind(&record.status)
        .bind(record.is_archived)
        .bind(record.updated_at.timestamp_millis())
        .bind(&title_norm_en)
        .bind(&title_norm_ar)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM records_fts WHERE entity_type = ? AND record_id = ?")
            .bind(entity_type)
            .bind(&record.id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO records_fts (entity_type, record_id, title, body) VALUES (?, ?, ?, ?)",
        )
        .bind(entity_type)
        .bind(&record.id)
        .bind(format!("{} {}", title_norm_en, title_norm_ar).trim())
        .bind(searchable_body(record))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn store_embedding(
        &self,
        entity_type: EntityType,
        id: &str,
        embedding: &[f32],
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE records SET embedding = ?, embedded_at = ? WHERE entity_type = ? AND id = ?",
        )
        .bind(vec_to_blob(embedding))
        .bind(Utc::now().timestamp_millis())
        .bind(entity_type.as_str())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            anyhow::bail!("{} {} not found", entity_type, id);
        }
        Ok(())
    }
}

#[async_trait]
impl EmbeddingQueue for SqliteStore {
    async fn enqueue(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        priority: i32,
    ) -> Result<QueueItem> {
        sqlx::query(
            r#"
            INSERT INTO embedding_queue (id, entity_type, entity_id, priority, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(entity_type, entity_id) DO NOTHING
            "#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(entity_type.as_str())
        .bind(entity_id)
        .bind(priority as i64)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(
            "SELECT * FROM embedding_queue WHERE entity_type = ? AND entity_id = ?",
        )
        .bind(entity_type.as_str())
        .bind(entity_id)
        .fetch_one(&self.pool)
        .await?;
        to_queue_item(&row)
    }

    async fn fetch_pending(&self, limit: usize) -> Result<Vec<QueueItem>> {
        let rows = sqlx::query(
            "SELECT * FROM embedding_queue ORDER BY priority ASC, created_at ASC, rowid ASC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(to_queue_item).collect()
    }

    async fn complete(&self, item_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM embedding_queue WHERE id = ?")
            .bind(item_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_failure(&self, item_id: &str, retry_count: u32, message: &str) -> Result<()> {
        sqlx::query("UPDATE embedding_queue SET retry_count = ?, error_message = ? WHERE id = ?")
            .bind(retry_count as i64)
            .bind(message)
            .bind(item_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn pending_count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM embedding_queue")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

#[async_trait]
impl QueryHistory for SqliteStore {
    async fn record_query(&self, query: &str, normalized: &str, result_count: usize) -> Result<()> {
        sqlx::query(
            "INSERT INTO query_history (query, normalized_query, result_count, searched_at) VALUES (?, ?, ?, ?)",
        )
        .bind(query)
        .bind(normalized)
        .bind(result_count as i64)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn popular_queries(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<PopularQuery>> {
        let rows = sqlx::query(
            r#"
            SELECT normalized_query, COUNT(*) AS n
            FROM query_history
            WHERE searched_at >= ? AND normalized_query != ''
            GROUP BY normalized_query
            ORDER BY n DESC, normalized_query ASC
            LIMIT ?
            "#,
        )
        .bind(since.timestamp_millis())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| PopularQuery {
                query: row.get("normalized_query"),
                count: row.get::<i64, _>("n") as u64,
            })
            .collect())
    }
}
