//! Record import.
//!
//! Reads a JSON array of records, upserts each one, and queues the
//! semantic-capable ones for embedding. This is how records enter the
//! system from outside; a re-import of a changed record refreshes its
//! text and queues a new embedding.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

use bilingual_search_core::models::Record;
use bilingual_search_core::store::{EmbeddingQueue, RecordStore};

/// Queue priority for imported records. Lower runs first.
pub const IMPORT_PRIORITY: i32 = 5;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportReport {
    pub imported: usize,
    pub queued: usize,
}

pub fn read_records(path: &Path) -> Result<Vec<Record>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read import file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse records from {}", path.display()))
}

pub async fn import_records(
    records: &dyn RecordStore,
    queue: &dyn EmbeddingQueue,
    items: &[Record],
    enqueue: bool,
) -> Result<ImportReport> {
    let mut report = ImportReport::default();

    for record in items {
        records
            .upsert_record(record)
            .await
            .with_context(|| format!("Failed to import {} {}", record.entity_type, record.id))?;
        report.imported += 1;

        if enqueue && record.entity_type.supports_semantic() {
            queue
                .enqueue(record.entity_type, &record.id, IMPORT_PRIORITY)
                .await?;
            report.queued += 1;
        }
    }

    tracing::info!(
        imported = report.imported,
        queued = report.queued,
        "import finished"
    );
    Ok(report)
}
