use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use futon_transport::{Request, Response, Transport};
use futon_types::{normalize_for_write, REV_FIELD};

use crate::error::{WriteError, WriteResult};
use crate::plan::{plan_delete, plan_insert, plan_update, FetchOutcome, WriteIntent, WritePlan};
use crate::retry::RetryPolicy;

/// One failed attempt; the status is whatever the store (or the transport)
/// last reported, defaulting to 500 when nothing better is known.
struct AttemptFailure {
    status: u16,
}

/// Conflict-resolving writer for a single database.
///
/// All three operations run through one bounded retry loop; conflicts and
/// other write failures consume attempts identically. Within a loop the
/// attempts are strictly sequential (fetch, write, evaluate), never
/// overlapping.
pub struct Writer {
    transport: Arc<dyn Transport>,
    db: String,
    policy: RetryPolicy,
}

impl Writer {
    pub fn new(transport: Arc<dyn Transport>, db: impl Into<String>) -> Self {
        Self {
            transport,
            db: db.into(),
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn database(&self) -> &str {
        &self.db
    }

    /// Update (or create) a document.
    ///
    /// With `merge` the supplied fields overlay the stored document; without
    /// it the supplied document replaces the stored fields. A document whose
    /// effective content already matches the stored content succeeds without
    /// issuing a write.
    pub async fn update(&self, id: &str, mut doc: Value, merge: bool) -> WriteResult<()> {
        normalize_for_write(&mut doc);
        self.run(id, WriteIntent::Update { doc, merge }).await
    }

    /// Creation-only write with no pre-fetch, retried on any failure.
    pub async fn insert(&self, id: &str, mut doc: Value) -> WriteResult<()> {
        normalize_for_write(&mut doc);
        self.run(id, WriteIntent::Insert { doc }).await
    }

    /// Delete a document.
    ///
    /// Requires fetching the current revision token first; a document that
    /// stays missing through every attempt is a hard [`WriteError::NotFound`],
    /// never a silent success.
    pub async fn delete(&self, id: &str) -> WriteResult<()> {
        self.run(id, WriteIntent::Delete).await
    }

    /// The retry loop shared by all three operations.
    async fn run(&self, id: &str, intent: WriteIntent) -> WriteResult<()> {
        let mut last = AttemptFailure { status: 500 };
        for attempt in 1..=self.policy.attempts {
            if let Some(delay) = self.policy.delay_before(attempt) {
                tokio::time::sleep(delay).await;
            }
            match self.attempt(id, &intent).await {
                Ok(()) => return Ok(()),
                Err(failure) => {
                    debug!(
                        db = %self.db,
                        id,
                        attempt,
                        status = failure.status,
                        "write attempt failed"
                    );
                    last = failure;
                }
            }
        }
        warn!(
            db = %self.db,
            id,
            attempts = self.policy.attempts,
            status = last.status,
            "write attempts exhausted"
        );
        if matches!(intent, WriteIntent::Delete) && last.status == 404 {
            Err(WriteError::NotFound)
        } else {
            Err(WriteError::ConflictExhausted {
                attempts: self.policy.attempts,
                status: last.status,
            })
        }
    }

    async fn attempt(&self, id: &str, intent: &WriteIntent) -> Result<(), AttemptFailure> {
        match intent {
            WriteIntent::Insert { doc } => {
                let resp = self.send(plan_insert(&self.db, id, doc)).await?;
                write_checked(&resp)
            }
            WriteIntent::Update { doc, merge } => {
                let resp = self.send(Request::get(self.doc_path(id))).await?;
                let plan = if resp.is_read_ok() {
                    plan_update(&self.db, id, doc, *merge, FetchOutcome::Found(&resp.body))
                } else if resp.is_not_found() {
                    // A missing target is the ground-up creation path, not a
                    // failed attempt.
                    plan_update(&self.db, id, doc, *merge, FetchOutcome::Missing)
                } else {
                    return Err(AttemptFailure {
                        status: resp.status,
                    });
                };
                match plan {
                    WritePlan::Noop => Ok(()),
                    WritePlan::Submit(req) => {
                        let resp = self.send(req).await?;
                        write_checked(&resp)
                    }
                }
            }
            WriteIntent::Delete => {
                let resp = self.send(Request::get(self.doc_path(id))).await?;
                if !resp.is_read_ok() {
                    return Err(AttemptFailure {
                        status: resp.status,
                    });
                }
                let rev = resp
                    .body
                    .get(REV_FIELD)
                    .and_then(Value::as_str)
                    .ok_or(AttemptFailure { status: 500 })?;
                let resp = self.send(plan_delete(&self.db, id, rev)).await?;
                write_checked(&resp)
            }
        }
    }

    fn doc_path(&self, id: &str) -> String {
        format!("/{}/{}", self.db, id)
    }

    async fn send(&self, req: Request) -> Result<Response, AttemptFailure> {
        self.transport.send(req).await.map_err(|e| AttemptFailure {
            status: e.status().unwrap_or(500),
        })
    }
}

fn write_checked(resp: &Response) -> Result<(), AttemptFailure> {
    if resp.is_write_ok() {
        Ok(())
    } else {
        Err(AttemptFailure {
            status: resp.status,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;

    use futon_transport::{InMemoryStore, Method, TransportError, TransportResult};

    use super::*;

    /// Transport that replays a fixed response script and records requests.
    struct Scripted {
        script: Mutex<VecDeque<TransportResult<Response>>>,
        log: Mutex<Vec<Request>>,
    }

    impl Scripted {
        fn new(responses: Vec<TransportResult<Response>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(responses.into()),
                log: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<Request> {
            self.log.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn send(&self, req: Request) -> TransportResult<Response> {
            self.log.lock().unwrap().push(req);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Response::new(500, Value::Null)))
        }
    }

    fn ok(status: u16, body: Value) -> TransportResult<Response> {
        Ok(Response::new(status, body))
    }

    fn stored(rev: &str, rest: Value) -> Value {
        let mut doc = rest;
        doc["_id"] = json!("x1");
        doc["_rev"] = json!(rev);
        doc
    }

    #[tokio::test]
    async fn noop_update_issues_no_write() {
        let transport = Scripted::new(vec![ok(200, stored("1-abc", json!({"a": 1, "b": 2})))]);
        let writer = Writer::new(transport.clone(), "mydb");

        writer.update("x1", json!({"a": 1, "b": 2}), false).await.unwrap();

        let reqs = transport.requests();
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].method, Method::Get);
    }

    #[tokio::test]
    async fn merge_update_writes_overlaid_document() {
        let transport = Scripted::new(vec![
            ok(200, stored("1-abc", json!({"a": 1, "b": 2}))),
            ok(201, json!({"ok": true, "id": "x1", "rev": "2-def"})),
        ]);
        let writer = Writer::new(transport.clone(), "mydb");

        writer.update("x1", json!({"c": 3}), true).await.unwrap();

        let reqs = transport.requests();
        assert_eq!(reqs.len(), 2);
        assert_eq!(reqs[1].method, Method::Post);
        assert_eq!(reqs[1].path, "/mydb");
        assert_eq!(
            reqs[1].body,
            Some(json!({"a": 1, "b": 2, "c": 3, "_id": "x1", "_rev": "1-abc"}))
        );
    }

    #[tokio::test]
    async fn missing_document_is_created_without_rev() {
        let transport = Scripted::new(vec![
            ok(404, json!({"error": "not_found"})),
            ok(201, json!({"ok": true})),
        ]);
        let writer = Writer::new(transport.clone(), "mydb");

        writer.update("x1", json!({"a": 1}), false).await.unwrap();

        let reqs = transport.requests();
        assert_eq!(reqs[1].body, Some(json!({"a": 1, "_id": "x1"})));
    }

    #[tokio::test(start_paused = true)]
    async fn conflicts_retry_with_backoff_then_succeed() {
        let transport = Scripted::new(vec![
            ok(200, stored("1-a", json!({"a": 1}))),
            ok(409, json!({"error": "conflict"})),
            ok(200, stored("2-b", json!({"a": 1}))),
            ok(409, json!({"error": "conflict"})),
            ok(200, stored("3-c", json!({"a": 1}))),
            ok(201, json!({"ok": true})),
        ]);
        let writer = Writer::new(transport.clone(), "mydb");

        let started = tokio::time::Instant::now();
        writer.update("x1", json!({"a": 2}), false).await.unwrap();
        let elapsed = started.elapsed();

        // Two backoff sleeps: ~100ms before attempt 2, ~200ms before attempt 3.
        assert!(elapsed >= Duration::from_millis(300), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(400), "elapsed {elapsed:?}");
        assert_eq!(transport.requests().len(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_reports_final_status_and_stops() {
        let transport = Scripted::new(vec![
            ok(200, stored("1-a", json!({"a": 1}))),
            ok(409, Value::Null),
            ok(200, stored("1-a", json!({"a": 1}))),
            ok(409, Value::Null),
            ok(200, stored("1-a", json!({"a": 1}))),
            ok(409, Value::Null),
        ]);
        let writer = Writer::new(transport.clone(), "mydb");

        let err = writer.update("x1", json!({"a": 2}), false).await.unwrap_err();
        assert_eq!(
            err,
            WriteError::ConflictExhausted {
                attempts: 3,
                status: 409
            }
        );
        // No 4th attempt: exactly 3 fetch+write round trips.
        assert_eq!(transport.requests().len(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_errors_consume_attempts_without_writing() {
        let transport = Scripted::new(vec![
            ok(500, Value::Null),
            ok(500, Value::Null),
            ok(500, Value::Null),
        ]);
        let writer = Writer::new(transport.clone(), "mydb");

        let err = writer.update("x1", json!({"a": 1}), false).await.unwrap_err();
        assert_eq!(
            err,
            WriteError::ConflictExhausted {
                attempts: 3,
                status: 500
            }
        );
        let reqs = transport.requests();
        assert_eq!(reqs.len(), 3);
        assert!(reqs.iter().all(|r| r.method == Method::Get));
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failures_carry_their_status_when_available() {
        let fail = || {
            Err(TransportError::Connect {
                message: "boom".into(),
                status: None,
            })
        };
        let transport = Scripted::new(vec![fail(), fail(), fail()]);
        let writer = Writer::new(transport.clone(), "mydb");

        let err = writer.insert("x1", json!({"a": 1})).await.unwrap_err();
        assert_eq!(
            err,
            WriteError::ConflictExhausted {
                attempts: 3,
                status: 500
            }
        );
    }

    #[tokio::test]
    async fn delete_uses_the_fetched_rev() {
        let transport = Scripted::new(vec![
            ok(200, stored("5-xyz", json!({"a": 1}))),
            ok(200, json!({"ok": true})),
        ]);
        let writer = Writer::new(transport.clone(), "mydb");

        writer.delete("x1").await.unwrap();

        let reqs = transport.requests();
        assert_eq!(reqs[1].method, Method::Delete);
        assert_eq!(reqs[1].path, "/mydb/x1");
        assert_eq!(reqs[1].query, vec![("rev".to_string(), "5-xyz".to_string())]);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_missing_delete_is_not_found() {
        let transport = Scripted::new(vec![
            ok(404, Value::Null),
            ok(404, Value::Null),
            ok(404, Value::Null),
        ]);
        let writer = Writer::new(transport.clone(), "mydb");

        let err = writer.delete("ghost").await.unwrap_err();
        assert_eq!(err, WriteError::NotFound);
        assert_eq!(transport.requests().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn insert_retries_any_failure() {
        let transport = Scripted::new(vec![
            ok(500, Value::Null),
            ok(201, json!({"ok": true})),
        ]);
        let writer = Writer::new(transport.clone(), "mydb");

        writer.insert("_security", json!({"admins": []})).await.unwrap();

        let reqs = transport.requests();
        assert_eq!(reqs.len(), 2);
        assert!(reqs.iter().all(|r| r.method == Method::Put));
    }

    #[tokio::test]
    async fn round_trips_against_the_in_memory_store() {
        let store = Arc::new(InMemoryStore::with_database("mydb"));
        let writer = Writer::new(store.clone(), "mydb");

        writer.update("x1", json!({"a": 1}), false).await.unwrap();
        writer.update("x1", json!({"b": 2}), true).await.unwrap();

        let resp = store.send(Request::get("/mydb/x1")).await.unwrap();
        assert_eq!(resp.body["a"], json!(1));
        assert_eq!(resp.body["b"], json!(2));
        assert_eq!(resp.body["_rev"], json!("2-mem"));

        writer.delete("x1").await.unwrap();
        assert!(!store.has_doc("mydb", "x1"));
    }

    #[tokio::test]
    async fn caller_supplied_rev_is_discarded_before_planning() {
        let transport = Scripted::new(vec![
            ok(200, stored("9-new", json!({"a": 1}))),
            ok(201, json!({"ok": true})),
        ]);
        let writer = Writer::new(transport.clone(), "mydb");

        // A stale token carried over from an earlier read must not be sent.
        writer
            .update("x1", json!({"a": 2, "_rev": "1-stale"}), false)
            .await
            .unwrap();

        let reqs = transport.requests();
        assert_eq!(reqs[1].body.as_ref().unwrap()["_rev"], json!("9-new"));
    }
}
