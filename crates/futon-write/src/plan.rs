//! Pure write planning: from a fetch result to the request to submit.
//!
//! Everything here is side-effect free so the compare-and-swap logic can be
//! tested without a transport. The [`crate::Writer`] supplies the fetch
//! result and executes whatever plan comes back.

use serde_json::Value;

use futon_types::{content_equal, ID_FIELD, REV_FIELD};
use futon_transport::Request;

/// What the caller wants done to a single document.
#[derive(Clone, Debug)]
pub enum WriteIntent {
    /// Unconditional creation, no pre-fetch (used for documents whose write
    /// must be a ground-up create, e.g. security documents).
    Insert { doc: Value },
    /// Replace or merge-overlay the stored document.
    Update { doc: Value, merge: bool },
    /// Remove the document.
    Delete,
}

/// Result of fetching the current stored document.
#[derive(Clone, Copy, Debug)]
pub enum FetchOutcome<'a> {
    /// The document exists; the value includes its `_rev`.
    Found(&'a Value),
    /// The store answered not-found.
    Missing,
}

/// The planned action for one attempt.
#[derive(Clone, Debug, PartialEq)]
pub enum WritePlan {
    /// Submit this request to the store.
    Submit(Request),
    /// The effective document already matches the stored one; writing would
    /// only bump the revision and invite a spurious conflict with a
    /// concurrent writer making the same change. Report success.
    Noop,
}

/// Plan an update attempt given the fetched state of the document.
///
/// On `Missing` the document is written as a ground-up creation with no
/// revision token. On `Found`, merge mode overlays the caller's keys onto
/// the stored document (caller wins); replace mode takes the caller's
/// document as-is. Either way the stored `_rev` is re-attached so the store
/// treats the submit as a conditional update.
pub fn plan_update(db: &str, id: &str, doc: &Value, merge: bool, fetched: FetchOutcome<'_>) -> WritePlan {
    let mut effective = match fetched {
        FetchOutcome::Missing => doc.clone(),
        FetchOutcome::Found(stored) => {
            let mut effective = if merge {
                let mut merged = stored.clone();
                if let (Value::Object(base), Value::Object(overlay)) = (&mut merged, doc) {
                    for (k, v) in overlay {
                        base.insert(k.clone(), v.clone());
                    }
                }
                merged
            } else {
                doc.clone()
            };

            if content_equal(&effective, stored) {
                return WritePlan::Noop;
            }

            if let Value::Object(map) = &mut effective {
                map.remove(REV_FIELD);
                if let Some(rev) = stored.get(REV_FIELD) {
                    map.insert(REV_FIELD.into(), rev.clone());
                }
            }
            effective
        }
    };

    if let Value::Object(map) = &mut effective {
        map.insert(ID_FIELD.into(), Value::String(id.into()));
    }
    WritePlan::Submit(Request::post(format!("/{db}")).body(effective))
}

/// Plan a delete: scoped by id and the revision token just fetched.
pub fn plan_delete(db: &str, id: &str, rev: &str) -> Request {
    Request::delete(format!("/{db}/{id}")).query("rev", rev)
}

/// Plan an unconditional creation.
pub fn plan_insert(db: &str, id: &str, doc: &Value) -> Request {
    Request::put(format!("/{db}/{id}")).body(doc.clone())
}
