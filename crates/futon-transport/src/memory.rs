//! In-process store backend for tests and embedding.
//!
//! Implements the same endpoint surface the HTTP backend talks to, including
//! revision-token compare-and-swap, bulk writes, and map/reduce view queries
//! driven by the structured `index` block of a design document. Stale-token
//! writes are rejected with 409, exactly as the remote store would.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use futon_types::StatsSummary;

use crate::error::TransportResult;
use crate::request::{Method, Request, Response};
use crate::traits::Transport;

#[derive(Clone)]
struct StoredDoc {
    seq: u64,
    body: Map<String, Value>,
}

impl StoredDoc {
    fn rev(&self) -> String {
        format!("{}-mem", self.seq)
    }

    fn with_meta(&self, id: &str) -> Value {
        let mut body = self.body.clone();
        body.insert("_id".into(), json!(id));
        body.insert("_rev".into(), json!(self.rev()));
        Value::Object(body)
    }
}

#[derive(Default, Clone)]
struct DbState {
    docs: BTreeMap<String, StoredDoc>,
}

#[derive(Default)]
struct StoreState {
    dbs: BTreeMap<String, DbState>,
    generated: u64,
}

/// Revision-tracking in-memory document store.
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
        }
    }

    /// Convenience constructor with one database already created.
    pub fn with_database(name: impl Into<String>) -> Self {
        let store = Self::new();
        store
            .state
            .lock()
            .expect("store lock poisoned")
            .dbs
            .insert(name.into(), DbState::default());
        store
    }

    /// Number of documents in a database (0 if it does not exist).
    pub fn doc_count(&self, db: &str) -> usize {
        self.state
            .lock()
            .expect("store lock poisoned")
            .dbs
            .get(db)
            .map(|d| d.docs.len())
            .unwrap_or(0)
    }

    /// Whether a document exists.
    pub fn has_doc(&self, db: &str, id: &str) -> bool {
        self.state
            .lock()
            .expect("store lock poisoned")
            .dbs
            .get(db)
            .map(|d| d.docs.contains_key(id))
            .unwrap_or(false)
    }

    fn dispatch(&self, req: &Request) -> Response {
        let mut state = self.state.lock().expect("store lock poisoned");
        let path = req.path.trim_start_matches('/');
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        match (req.method, segments.as_slice()) {
            (Method::Get, ["_all_dbs"]) => {
                let names: Vec<&String> = state.dbs.keys().collect();
                Response::new(200, json!(names))
            }
            (Method::Put, [db]) => {
                if state.dbs.contains_key(*db) {
                    Response::new(412, json!({"error": "file_exists"}))
                } else {
                    state.dbs.insert((*db).into(), DbState::default());
                    Response::new(201, json!({"ok": true}))
                }
            }
            (Method::Get, [db]) => match state.dbs.get(*db) {
                Some(d) => Response::new(
                    200,
                    json!({"db_name": db, "doc_count": d.docs.len()}),
                ),
                None => not_found(),
            },
            (Method::Get, [db, "_all_docs"]) => match state.dbs.get(*db) {
                Some(d) => {
                    let rows: Vec<Value> = d
                        .docs
                        .iter()
                        .map(|(id, doc)| {
                            json!({"id": id, "key": id, "doc": doc.with_meta(id)})
                        })
                        .collect();
                    Response::new(200, json!({"total_rows": rows.len(), "rows": rows}))
                }
                None => not_found(),
            },
            (Method::Post, [db, "_bulk_docs"]) => {
                let docs = match req.body.as_ref().and_then(|b| b.get("docs")) {
                    Some(Value::Array(docs)) => docs.clone(),
                    _ => return bad_request("missing docs array"),
                };
                let state = &mut *state;
                let dbstate = match state.dbs.get_mut(*db) {
                    Some(d) => d,
                    None => return not_found(),
                };
                let mut results = Vec::with_capacity(docs.len());
                for doc in docs {
                    let entry = match doc {
                        Value::Object(body) => {
                            match upsert(dbstate, &mut state.generated, body) {
                                Ok((id, rev)) => json!({"ok": true, "id": id, "rev": rev}),
                                Err(id) => json!({
                                    "id": id,
                                    "error": "conflict",
                                    "reason": "Document update conflict."
                                }),
                            }
                        }
                        _ => json!({"error": "bad_request", "reason": "not an object"}),
                    };
                    results.push(entry);
                }
                Response::new(201, Value::Array(results))
            }
            (Method::Post, [db]) => {
                let body = match req.body.as_ref() {
                    Some(Value::Object(body)) => body.clone(),
                    _ => return bad_request("document body must be an object"),
                };
                let state = &mut *state;
                let dbstate = match state.dbs.get_mut(*db) {
                    Some(d) => d,
                    None => return not_found(),
                };
                match upsert(dbstate, &mut state.generated, body) {
                    Ok((id, rev)) => Response::new(201, json!({"ok": true, "id": id, "rev": rev})),
                    Err(_) => conflict(),
                }
            }
            (Method::Get, [db, "_design", d, "_view", v]) => query_view(&state, db, d, v, &req.query),
            (Method::Get, [db, "_design", name]) => get_doc(&state, db, &format!("_design/{name}")),
            (Method::Get, [db, id]) => get_doc(&state, db, id),
            (Method::Put, [db, rest @ ..]) if !rest.is_empty() => {
                let id = rest.join("/");
                let mut body = match req.body.as_ref() {
                    Some(Value::Object(body)) => body.clone(),
                    _ => return bad_request("document body must be an object"),
                };
                let state = &mut *state;
                let dbstate = match state.dbs.get_mut(*db) {
                    Some(d) => d,
                    None => return not_found(),
                };
                body.insert("_id".into(), json!(id));
                match upsert(dbstate, &mut state.generated, body) {
                    Ok((id, rev)) => Response::new(201, json!({"ok": true, "id": id, "rev": rev})),
                    Err(_) => conflict(),
                }
            }
            (Method::Delete, [db, rest @ ..]) if !rest.is_empty() => {
                let id = rest.join("/");
                let rev = req
                    .query
                    .iter()
                    .find(|(k, _)| k == "rev")
                    .map(|(_, v)| v.clone());
                delete_doc(&mut state, db, &id, rev.as_deref())
            }
            _ => not_found(),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for InMemoryStore {
    async fn send(&self, req: Request) -> TransportResult<Response> {
        Ok(self.dispatch(&req))
    }
}

fn not_found() -> Response {
    Response::new(404, json!({"error": "not_found", "reason": "missing"}))
}

fn conflict() -> Response {
    Response::new(409, json!({"error": "conflict", "reason": "Document update conflict."}))
}

fn bad_request(reason: &str) -> Response {
    Response::new(400, json!({"error": "bad_request", "reason": reason}))
}

/// Compare-and-swap insert/update. Returns `(id, new_rev)` on success and the
/// document id on a revision conflict.
fn upsert(
    dbstate: &mut DbState,
    generated: &mut u64,
    mut body: Map<String, Value>,
) -> Result<(String, String), String> {
    let id = match body.remove("_id") {
        Some(Value::String(id)) => id,
        _ => {
            *generated += 1;
            format!("mem-{generated}")
        }
    };
    let supplied_rev = match body.remove("_rev") {
        Some(Value::String(rev)) => Some(rev),
        _ => None,
    };

    match dbstate.docs.get(&id) {
        Some(stored) if supplied_rev.as_deref() == Some(stored.rev().as_str()) => {
            let doc = StoredDoc {
                seq: stored.seq + 1,
                body,
            };
            let rev = doc.rev();
            dbstate.docs.insert(id.clone(), doc);
            Ok((id, rev))
        }
        Some(_) => Err(id),
        None if supplied_rev.is_some() => Err(id),
        None => {
            let doc = StoredDoc { seq: 1, body };
            let rev = doc.rev();
            dbstate.docs.insert(id.clone(), doc);
            Ok((id, rev))
        }
    }
}

fn get_doc(state: &StoreState, db: &str, id: &str) -> Response {
    match state.dbs.get(db).and_then(|d| d.docs.get(id)) {
        Some(doc) => Response::new(200, doc.with_meta(id)),
        None => not_found(),
    }
}

fn delete_doc(state: &mut StoreState, db: &str, id: &str, rev: Option<&str>) -> Response {
    let dbstate = match state.dbs.get_mut(db) {
        Some(d) => d,
        None => return not_found(),
    };
    match dbstate.docs.get(id) {
        Some(stored) if rev == Some(stored.rev().as_str()) => {
            let seq = stored.seq;
            dbstate.docs.remove(id);
            Response::new(
                200,
                json!({"ok": true, "id": id, "rev": format!("{}-mem", seq + 1)}),
            )
        }
        Some(_) => conflict(),
        None => not_found(),
    }
}

// ---------------------------------------------------------------------------
// View execution
// ---------------------------------------------------------------------------

enum Acc {
    Count(u64),
    Sum(Vec<f64>),
    Stats(Vec<StatsAcc>),
}

#[derive(Clone, Copy)]
struct StatsAcc {
    sum: f64,
    count: u64,
    min: f64,
    max: f64,
    sumsqr: f64,
}

impl StatsAcc {
    fn new() -> Self {
        Self {
            sum: 0.0,
            count: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sumsqr: 0.0,
        }
    }

    fn add(&mut self, v: f64) {
        self.sum += v;
        self.count += 1;
        self.min = self.min.min(v);
        self.max = self.max.max(v);
        self.sumsqr += v * v;
    }

    fn summary(&self) -> StatsSummary {
        StatsSummary {
            sum: self.sum,
            count: self.count,
            min: self.min,
            max: self.max,
            sumsqr: self.sumsqr,
        }
    }
}

/// Execute a view by interpreting the structured `index` block of its design
/// document, grouping and reducing over the database's documents.
fn query_view(
    state: &StoreState,
    db: &str,
    ddoc: &str,
    view: &str,
    query: &[(String, String)],
) -> Response {
    let dbstate = match state.dbs.get(db) {
        Some(d) => d,
        None => return not_found(),
    };
    let ddoc_id = format!("_design/{ddoc}");
    let design = match dbstate.docs.get(&ddoc_id) {
        Some(d) => d,
        None => return not_found(),
    };
    if design.body.get("views").and_then(|v| v.get(view)).is_none() {
        return not_found();
    }
    let index = match design.body.get("index") {
        Some(Value::Object(index)) => index,
        _ => return bad_request("design document has no index block"),
    };
    let operation = index.get("operation").and_then(Value::as_str).unwrap_or("count");
    let value_fields = string_list(index.get("value_fields"));
    let group_fields = string_list(index.get("group_fields"));
    let grouped = query
        .iter()
        .any(|(k, v)| k == "group" && v == "true");

    // Keyed by the serialized group key for deterministic row order.
    let mut groups: BTreeMap<String, (Value, Acc)> = BTreeMap::new();

    for (id, doc) in &dbstate.docs {
        if id.starts_with("_design/") {
            continue;
        }
        let key = if !grouped || group_fields.is_empty() {
            Value::Null
        } else {
            emitted_key(&doc.body, &group_fields)
        };

        let values: Vec<f64> = value_fields
            .iter()
            .filter_map(|f| doc.body.get(f).and_then(Value::as_f64))
            .collect();
        // Sum/stats reduce over numeric fields only; a document missing any
        // declared field contributes nothing to those views.
        if operation != "count" && values.len() != value_fields.len() {
            continue;
        }

        let entry = groups
            .entry(key.to_string())
            .or_insert_with(|| (key, new_acc(operation, value_fields.len())));
        match &mut entry.1 {
            Acc::Count(n) => *n += 1,
            Acc::Sum(totals) => {
                for (t, v) in totals.iter_mut().zip(&values) {
                    *t += v;
                }
            }
            Acc::Stats(accs) => {
                for (a, v) in accs.iter_mut().zip(&values) {
                    a.add(*v);
                }
            }
        }
    }

    let rows: Vec<Value> = groups
        .into_values()
        .map(|(key, acc)| json!({"key": key, "value": render_acc(&acc)}))
        .collect();
    Response::new(200, json!({"rows": rows}))
}

fn new_acc(operation: &str, arity: usize) -> Acc {
    match operation {
        "sum" => Acc::Sum(vec![0.0; arity]),
        "stats" => Acc::Stats(vec![StatsAcc::new(); arity]),
        _ => Acc::Count(0),
    }
}

fn render_acc(acc: &Acc) -> Value {
    match acc {
        Acc::Count(n) => json!(n),
        Acc::Sum(totals) if totals.len() == 1 => json!(totals[0]),
        Acc::Sum(totals) => json!(totals),
        Acc::Stats(accs) if accs.len() == 1 => json!(accs[0].summary()),
        Acc::Stats(accs) => {
            let all: Vec<StatsSummary> = accs.iter().map(StatsAcc::summary).collect();
            json!(all)
        }
    }
}

/// Scalar key for a single group field, array key for several.
fn emitted_key(body: &Map<String, Value>, group_fields: &[String]) -> Value {
    if group_fields.len() == 1 {
        body.get(&group_fields[0]).cloned().unwrap_or(Value::Null)
    } else {
        Value::Array(
            group_fields
                .iter()
                .map(|f| body.get(f).cloned().unwrap_or(Value::Null))
                .collect(),
        )
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    }
}
