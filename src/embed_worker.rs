//! Background embedding refresh.
//!
//! [`EmbeddingWorker`] drains the embedding queue in batches: load the
//! record, build its embedding text, embed it, store the vector, and delete
//! the queue item. A failed item has its retry count bumped; once the count
//! reaches `max_retries` the item is deleted and logged as abandoned.
//!
//! At most one batch runs at a time. A tick that arrives while a batch is
//! still running is skipped, not queued.

use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use bilingual_search_core::embedding::{embedding_text, EmbeddingProvider};
use bilingual_search_core::models::QueueItem;
use bilingual_search_core::store::{EmbeddingQueue, RecordStore};

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub interval: Duration,
    pub batch_size: usize,
    pub max_retries: u32,
    pub max_text_chars: usize,
}

/// Outcome of one [`EmbeddingWorker::process_once`] call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub processed: usize,
    /// Failed and left queued for another attempt.
    pub failed: usize,
    /// Failed for the last time and removed.
    pub dropped: usize,
    pub errors: Vec<String>,
    /// Another batch was already running.
    pub skipped: bool,
}

impl BatchReport {
    pub fn is_idle(&self) -> bool {
        self.processed == 0 && self.failed == 0 && self.dropped == 0 && self.errors.is_empty()
    }
}

/// Clears the processing flag on drop.
struct BatchGuard<'a>(&'a AtomicBool);

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct Running {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct EmbeddingWorker {
    records: Arc<dyn RecordStore>,
    queue: Arc<dyn EmbeddingQueue>,
    provider: Arc<dyn EmbeddingProvider>,
    settings: WorkerSettings,
    processing: AtomicBool,
    running: Mutex<Option<Running>>,
}

impl EmbeddingWorker {
    pub fn new(
        records: Arc<dyn RecordStore>,
        queue: Arc<dyn EmbeddingQueue>,
        provider: Arc<dyn EmbeddingProvider>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            records,
            queue,
            provider,
            settings,
            processing: AtomicBool::new(false),
            running: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Process one batch of pending items.
    pub async fn process_once(&self) -> BatchReport {
        if self
            .processing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("embedding batch already in progress, skipping");
            return BatchReport {
                skipped: true,
                ..BatchReport::default()
            };
        }
        let _guard = BatchGuard(&self.processing);

        let mut report = BatchReport::default();
        let items = match self.queue.fetch_pending(self.settings.batch_size).await {
            Ok(items) => items,
            Err(e) => {
                tracing::error!(error = %e, "failed to fetch embedding queue");
                report.errors.push(format!("fetch failed: {}", e));
                return report;
            }
        };

        for item in items {
            match self.process_item(&item).await {
                Ok(()) => {
                    if let Err(e) = self.queue.complete(&item.id).await {
                        report.errors.push(format!("{}: {}", item.id, e));
                        continue;
                    }
                    report.processed += 1;
                }
                Err(e) => self.handle_failure(&item, e, &mut report).await,
            }
        }

        if !report.is_idle() {
            tracing::info!(
                processed = report.processed,
                failed = report.failed,
                dropped = report.dropped,
                "embedding batch finished"
            );
        }
        report
    }

    async fn process_item(&self, item: &QueueItem) -> Result<()> {
        let record = self
            .records
            .get_record(item.entity_type, &item.entity_id)
            .await?
            .ok_or_else(|| anyhow!("{} {} not found", item.entity_type, item.entity_id))?;
        let text = embedding_text(&record, self.settings.max_text_chars)?;
        let vector = self.provider.embed(&text).await?;
        self.records
            .store_embedding(item.entity_type, &item.entity_id, &vector)
            .await
    }

    async fn handle_failure(&self, item: &QueueItem, error: anyhow::Error, report: &mut BatchReport) {
        let retry_count = item.retry_count + 1;
        let message = error.to_string();
        report.errors.push(format!(
            "{} {}: {}",
            item.entity_type, item.entity_id, message
        ));

        if retry_count >= self.settings.max_retries {
            tracing::error!(
                entity_type = %item.entity_type,
                entity_id = %item.entity_id,
                retries = retry_count,
                error = %message,
                "abandoning embedding after max retries"
            );
            match self.queue.complete(&item.id).await {
                Ok(()) => report.dropped += 1,
                Err(e) => report.errors.push(format!("{}: {}", item.id, e)),
            }
            return;
        }

        tracing::warn!(
            entity_type = %item.entity_type,
            entity_id = %item.entity_id,
            retry_count,
            error = %message,
            "embedding failed, will retry"
        );
        match self
            .queue
            .record_failure(&item.id, retry_count, &message)
            .await
        {
            Ok(()) => report.failed += 1,
            Err(e) => report.errors.push(format!("{}: {}", item.id, e)),
        }
    }

    /// Start the periodic loop. The first batch runs immediately. Calling
    /// this while already running only logs a warning.
    pub fn start(self: &Arc<Self>) {
        let mut running = self.running.lock();
        if running.is_some() {
            tracing::warn!("embedding worker already running");
            return;
        }

        let (shutdown, mut stop) = watch::channel(false);
        let worker = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(worker.settings.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        worker.process_once().await;
                    }
                    _ = stop.changed() => break,
                }
            }
            tracing::info!("embedding worker stopped");
        });

        tracing::info!(interval = ?self.settings.interval, "embedding worker started");
        *running = Some(Running { shutdown, handle });
    }

    /// Signal the loop and wait for the in-flight batch to finish.
    pub async fn stop(&self) {
        let running = self.running.lock().take();
        let Some(running) = running else {
            return;
        };
        let _ = running.shutdown.send(true);
        if let Err(e) = running.handle.await {
            tracing::error!(error = %e, "embedding worker task panicked");
        }
    }
}
