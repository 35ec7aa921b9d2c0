use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use futon_transport::{Request, Transport};
use futon_types::normalize_for_write;

/// Batch slicing and admission-control knobs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BulkConfig {
    /// Maximum documents per bulk-write call.
    pub batch_size: usize,
    /// Maximum batches in flight against the store at once.
    pub concurrency: usize,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            concurrency: 5,
        }
    }
}

/// Outcome of an import: per-document tallies, never an error.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub succeeded: usize,
    pub failed: usize,
}

/// Bounded-concurrency bulk importer for a single database.
pub struct Importer {
    transport: Arc<dyn Transport>,
    db: String,
    config: BulkConfig,
}

impl Importer {
    pub fn new(transport: Arc<dyn Transport>, db: impl Into<String>) -> Self {
        Self {
            transport,
            db: db.into(),
            config: BulkConfig::default(),
        }
    }

    pub fn with_config(mut self, config: BulkConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> BulkConfig {
        self.config
    }

    /// Import a document collection.
    ///
    /// The caller's slice is copied and normalized, never mutated. Each batch
    /// is submitted exactly once; a batch that fails wholesale counts every
    /// one of its documents as failed. The summary is assembled only after
    /// every spawned batch has reported back (the drain barrier), so no tally
    /// is read while a batch is still in flight.
    pub async fn import_many(&self, docs: &[Value]) -> ImportSummary {
        let mut normalized = docs.to_vec();
        for doc in &mut normalized {
            normalize_for_write(doc);
        }

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut tasks = JoinSet::new();
        let mut batches = 0usize;
        for batch in normalized.chunks(self.config.batch_size.max(1)) {
            let batch = batch.to_vec();
            let transport = Arc::clone(&self.transport);
            let path = format!("/{}/_bulk_docs", self.db);
            let semaphore = Arc::clone(&semaphore);
            batches += 1;
            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("import semaphore closed");
                submit_batch(transport.as_ref(), path, batch).await
            });
        }
        debug!(db = %self.db, docs = docs.len(), batches, "bulk import dispatched");

        let mut summary = ImportSummary::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((ok, failed)) => {
                    summary.succeeded += ok;
                    summary.failed += failed;
                }
                Err(e) => warn!(error = %e, "bulk import batch task failed to join"),
            }
        }
        // A batch whose task never reported (panicked or was cancelled) still
        // owns its documents; every document lands in exactly one tally.
        let accounted = summary.succeeded + summary.failed;
        if accounted < normalized.len() {
            summary.failed += normalized.len() - accounted;
        }
        if summary.failed > 0 {
            warn!(
                db = %self.db,
                succeeded = summary.succeeded,
                failed = summary.failed,
                "bulk import finished with failures"
            );
        }
        summary
    }
}

/// Submit one batch and tally its per-document outcomes.
///
/// A response entry counts as succeeded only when it carries both an id and
/// a new revision token; anything else, including a batch-level transport
/// or status failure, counts against `failed`.
async fn submit_batch(transport: &dyn Transport, path: String, batch: Vec<Value>) -> (usize, usize) {
    let len = batch.len();
    let req = Request::post(path).body(json!({ "docs": batch }));
    match transport.send(req).await {
        Ok(resp) if resp.is_write_ok() => {
            let ok = resp
                .body
                .as_array()
                .map(|rows| {
                    rows.iter()
                        .filter(|row| {
                            row.get("id").is_some_and(|v| !v.is_null())
                                && row.get("rev").is_some_and(|v| !v.is_null())
                        })
                        .count()
                })
                .unwrap_or(0);
            (ok, len - ok)
        }
        Ok(resp) => {
            debug!(status = resp.status, "bulk batch rejected");
            (0, len)
        }
        Err(e) => {
            debug!(error = %e, "bulk batch transport failure");
            (0, len)
        }
    }
}
