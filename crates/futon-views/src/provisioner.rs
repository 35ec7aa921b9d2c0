use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use futon_transport::{Request, Transport};
use futon_types::StatsSummary;
use futon_write::Writer;

use crate::design::design_doc;
use crate::error::{ViewError, ViewResult};
use crate::spec::{AggregateSpec, Fields};

/// One `{key, value}` row of a reduced view.
#[derive(Debug, Deserialize)]
struct Row {
    #[serde(default)]
    key: Value,
    #[serde(default)]
    value: Value,
}

/// Aggregation provisioner for a single database.
///
/// Ensures the backing index exists exactly once (content-addressed by the
/// spec's [`crate::IndexKey`]), then queries it and shapes the rows.
pub struct Aggregator {
    transport: Arc<dyn Transport>,
    db: String,
    writer: Writer,
}

impl Aggregator {
    pub fn new(transport: Arc<dyn Transport>, db: impl Into<String>) -> Self {
        let db = db.into();
        let writer = Writer::new(Arc::clone(&transport), db.clone());
        Self {
            transport,
            db,
            writer,
        }
    }

    /// Count of all documents.
    pub async fn count(&self) -> ViewResult<Value> {
        self.run(AggregateSpec::count()).await
    }

    /// Count grouped by fields.
    pub async fn count_by(&self, group: impl Into<Fields>) -> ViewResult<Value> {
        self.run(AggregateSpec::count_by(group)).await
    }

    /// Sum of value fields.
    pub async fn sum(&self, values: impl Into<Fields>) -> ViewResult<Value> {
        self.run(AggregateSpec::sum(values)?).await
    }

    /// Sum of value fields grouped by fields.
    pub async fn sum_by(
        &self,
        values: impl Into<Fields>,
        group: impl Into<Fields>,
    ) -> ViewResult<Value> {
        self.run(AggregateSpec::sum_by(values, group)?).await
    }

    /// Statistical summary (sum, count, min, max, mean, variance, stddev).
    pub async fn stats(&self, values: impl Into<Fields>) -> ViewResult<Value> {
        self.run(AggregateSpec::stats(values)?).await
    }

    /// Statistical summary grouped by fields.
    pub async fn stats_by(
        &self,
        values: impl Into<Fields>,
        group: impl Into<Fields>,
    ) -> ViewResult<Value> {
        self.run(AggregateSpec::stats_by(values, group)?).await
    }

    async fn run(&self, spec: AggregateSpec) -> ViewResult<Value> {
        self.ensure_index(&spec).await?;
        let rows = self.query(&spec).await?;
        Ok(shape(rows, &spec))
    }

    /// Make sure the index artifact exists; no-op when it already does.
    async fn ensure_index(&self, spec: &AggregateSpec) -> ViewResult<()> {
        let name = spec.index_key().to_hex();
        let resp = self
            .transport
            .send(Request::get(format!("/{}/_design/{name}", self.db)))
            .await?;
        if resp.is_read_ok() {
            debug!(db = %self.db, index = %name, "index already provisioned");
            return Ok(());
        }
        if !resp.is_not_found() {
            return Err(ViewError::Status(resp.status));
        }

        // First caller for this spec. Concurrent racers are resolved by the
        // writer's compare-and-swap loop: the loser re-fetches, sees the
        // winner's content-equal document, and succeeds without writing.
        info!(db = %self.db, index = %name, op = spec.op().name(), "creating index");
        let ddoc = design_doc(spec);
        self.writer
            .update(&format!("_design/{name}"), ddoc, false)
            .await?;
        Ok(())
    }

    async fn query(&self, spec: &AggregateSpec) -> ViewResult<Vec<Row>> {
        let name = spec.index_key().to_hex();
        let mut req = Request::get(format!("/{}/_design/{name}/_view/{name}", self.db));
        if !spec.group_fields().is_empty() {
            req = req.query("group", "true");
        }
        let resp = self.transport.send(req).await?;
        if !resp.is_read_ok() {
            return Err(ViewError::Status(resp.status));
        }
        match resp.body.get("rows") {
            Some(rows) => serde_json::from_value(rows.clone())
                .map_err(|e| ViewError::Malformed(e.to_string())),
            None => Err(ViewError::Malformed("response has no rows".into())),
        }
    }
}

/// Shape reduced rows for the caller.
///
/// An ungrouped view reduces to at most one row, which unwraps to its bare
/// value; the store emits no row at all over an empty database, surfaced as
/// null. Grouped rows fold into a map keyed by a stable rendering of the
/// group key. Stats tuples gain their derived moments on the way out, and
/// multi-field values are re-keyed by field name.
fn shape(rows: Vec<Row>, spec: &AggregateSpec) -> Value {
    if spec.group_fields().is_empty() {
        return match rows.into_iter().next() {
            Some(row) => objectify(row.value, spec),
            None => Value::Null,
        };
    }
    let mut out = Map::new();
    for row in rows {
        out.insert(render_key(&row.key), objectify(row.value, spec));
    }
    Value::Object(out)
}

/// Re-key a multi-field value array by field name; enhance stats tuples.
fn objectify(value: Value, spec: &AggregateSpec) -> Value {
    if spec.value_fields().len() > 1 {
        if let Value::Array(items) = value {
            let map: Map<String, Value> = spec
                .value_fields()
                .iter()
                .cloned()
                .zip(items.into_iter().map(enhance_value))
                .collect();
            return Value::Object(map);
        }
    }
    enhance_value(value)
}

/// Attach mean/variance/stddev to anything that parses as a stats tuple.
fn enhance_value(value: Value) -> Value {
    match serde_json::from_value::<StatsSummary>(value.clone()) {
        Ok(stats) => serde_json::to_value(stats.enhance()).unwrap_or(value),
        Err(_) => value,
    }
}

/// Stable string form of a group key: array keys join with `/`.
fn render_key(key: &Value) -> String {
    match key {
        Value::Array(items) => items
            .iter()
            .map(scalar_key)
            .collect::<Vec<_>>()
            .join("/"),
        other => scalar_key(other),
    }
}

fn scalar_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
