use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use futon_bulk::{BulkConfig, ImportSummary, Importer};
use futon_transport::{HttpTransport, Request, Transport};
use futon_types::{strip_doc, strip_docs};
use futon_views::{Aggregator, Fields};
use futon_write::{RetryPolicy, Writer};

use crate::error::{SdkError, SdkResult};

/// Connection to a document store.
pub struct Client {
    transport: Arc<dyn Transport>,
}

impl Client {
    /// Connect over HTTP. Credentials may be embedded in the URL; they are
    /// redacted from log output.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_transport(Arc::new(HttpTransport::new(base_url.into())))
    }

    /// Use a custom transport (e.g. [`futon_transport::InMemoryStore`]).
    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// List databases, with the store's system databases filtered out.
    pub async fn list(&self) -> SdkResult<Vec<String>> {
        let resp = self.transport.send(Request::get("/_all_dbs")).await?;
        if !resp.is_read_ok() {
            return Err(SdkError::Status(resp.status));
        }
        let names = match resp.body.as_array() {
            Some(names) => names
                .iter()
                .filter_map(Value::as_str)
                .filter(|n| *n != "_users" && *n != "_replicator")
                .map(String::from)
                .collect(),
            None => Vec::new(),
        };
        Ok(names)
    }

    /// Handle to one database.
    pub fn database(&self, name: impl Into<String>) -> Database {
        Database::new(Arc::clone(&self.transport), name)
    }
}

/// All operations against a single database.
///
/// Writes go through the conflict-resolving writer, imports through the
/// bounded worker pool, aggregations through the content-addressed
/// provisioner; the reads here are plain pass-throughs with no retry or
/// concurrency logic of their own.
pub struct Database {
    transport: Arc<dyn Transport>,
    name: String,
    writer: Writer,
    importer: Importer,
    aggregator: Aggregator,
}

impl Database {
    fn new(transport: Arc<dyn Transport>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            writer: Writer::new(Arc::clone(&transport), name.clone()),
            importer: Importer::new(Arc::clone(&transport), name.clone()),
            aggregator: Aggregator::new(Arc::clone(&transport), name.clone()),
            transport,
            name,
        }
    }

    /// Override the writer's retry policy.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.writer = Writer::new(Arc::clone(&self.transport), self.name.clone())
            .with_policy(policy);
        self
    }

    /// Override the importer's batching and concurrency.
    pub fn with_bulk_config(mut self, config: BulkConfig) -> Self {
        self.importer = Importer::new(Arc::clone(&self.transport), self.name.clone())
            .with_config(config);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // ---- Database lifecycle ----

    /// Create the database.
    pub async fn create(&self) -> SdkResult<()> {
        let resp = self.transport.send(Request::put(self.path(""))).await?;
        if resp.is_write_ok() {
            debug!(db = %self.name, "database created");
            Ok(())
        } else {
            Err(SdkError::Status(resp.status))
        }
    }

    /// Metadata about the database.
    pub async fn info(&self) -> SdkResult<Value> {
        let resp = self.transport.send(Request::get(self.path(""))).await?;
        if resp.is_read_ok() {
            Ok(resp.body)
        } else {
            Err(SdkError::Status(resp.status))
        }
    }

    // ---- Reads ----

    /// Fetch one document, normalized for the caller.
    pub async fn get(&self, id: &str) -> SdkResult<Value> {
        let resp = self.transport.send(Request::get(self.path(id))).await?;
        if resp.is_not_found() {
            return Err(SdkError::NotFound);
        }
        if !resp.is_read_ok() {
            return Err(SdkError::Status(resp.status));
        }
        let mut doc = resp.body;
        strip_doc(&mut doc);
        Ok(doc)
    }

    /// Every document in the database, design documents excluded.
    pub async fn all_docs(&self) -> SdkResult<Vec<Value>> {
        let req = Request::get(self.path("_all_docs")).query("include_docs", "true");
        let resp = self.transport.send(req).await?;
        if !resp.is_read_ok() {
            return Err(SdkError::Status(resp.status));
        }
        let mut docs: Vec<Value> = match resp.body.get("rows").and_then(Value::as_array) {
            Some(rows) => rows
                .iter()
                .filter(|row| {
                    row.get("id")
                        .and_then(Value::as_str)
                        .is_some_and(|id| !id.starts_with("_design/"))
                })
                .filter_map(|row| row.get("doc").cloned())
                .collect(),
            None => Vec::new(),
        };
        strip_docs(&mut docs);
        Ok(docs)
    }

    // ---- Writes (conflict-resolving) ----

    /// Update or create a document; with `merge`, supplied fields overlay
    /// the stored ones.
    pub async fn update(&self, id: &str, doc: Value, merge: bool) -> SdkResult<()> {
        Ok(self.writer.update(id, doc, merge).await?)
    }

    /// Creation-only write (e.g. security documents).
    pub async fn insert(&self, id: &str, doc: Value) -> SdkResult<()> {
        Ok(self.writer.insert(id, doc).await?)
    }

    /// Delete a document. Deleting a document that never turns up is an
    /// error, not a silent success.
    pub async fn delete(&self, id: &str) -> SdkResult<()> {
        Ok(self.writer.delete(id).await?)
    }

    // ---- Bulk import (best-effort) ----

    /// Import a document collection; failures are counted, never raised.
    pub async fn import_many(&self, docs: &[Value]) -> ImportSummary {
        self.importer.import_many(docs).await
    }

    // ---- Aggregations (content-addressed indexes) ----

    pub async fn count(&self) -> SdkResult<Value> {
        Ok(self.aggregator.count().await?)
    }

    pub async fn count_by(&self, group: impl Into<Fields>) -> SdkResult<Value> {
        Ok(self.aggregator.count_by(group).await?)
    }

    pub async fn sum(&self, values: impl Into<Fields>) -> SdkResult<Value> {
        Ok(self.aggregator.sum(values).await?)
    }

    pub async fn sum_by(
        &self,
        values: impl Into<Fields>,
        group: impl Into<Fields>,
    ) -> SdkResult<Value> {
        Ok(self.aggregator.sum_by(values, group).await?)
    }

    pub async fn stats(&self, values: impl Into<Fields>) -> SdkResult<Value> {
        Ok(self.aggregator.stats(values).await?)
    }

    pub async fn stats_by(
        &self,
        values: impl Into<Fields>,
        group: impl Into<Fields>,
    ) -> SdkResult<Value> {
        Ok(self.aggregator.stats_by(values, group).await?)
    }

    fn path(&self, suffix: &str) -> String {
        if suffix.is_empty() {
            format!("/{}", self.name)
        } else {
            format!("/{}/{}", self.name, suffix)
        }
    }
}
