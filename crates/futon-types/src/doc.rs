//! Document normalization between the store's wire form and the caller form.
//!
//! The store reserves `_id` (identity) and `_rev` (revision token) on every
//! document. Callers of this library deal in plain `id` and never see
//! revision tokens; the conversions here are applied at the client boundary
//! in both directions.

use serde_json::Value;

/// Reserved identity field on the wire.
pub const ID_FIELD: &str = "_id";
/// Reserved revision-token field on the wire.
pub const REV_FIELD: &str = "_rev";

/// Strip storage-internal metadata from a document returned by the store.
///
/// Renames `_id` to `id` and removes any revision fields. Non-object values
/// pass through untouched.
pub fn strip_doc(doc: &mut Value) {
    if let Value::Object(map) = doc {
        if let Some(id) = map.remove(ID_FIELD) {
            map.insert("id".into(), id);
        }
        map.remove(REV_FIELD);
        map.remove("rev");
    }
}

/// Strip every document in a slice, in place.
pub fn strip_docs(docs: &mut [Value]) {
    for doc in docs {
        strip_doc(doc);
    }
}

/// Prepare a caller-supplied document for submission to the store.
///
/// Renames `id` to `_id` and drops any revision fields the caller may have
/// carried over from a previous read; the client only forwards revision
/// tokens it has just fetched itself.
pub fn normalize_for_write(doc: &mut Value) {
    if let Value::Object(map) = doc {
        if let Some(id) = map.remove("id") {
            map.insert(ID_FIELD.into(), id);
        }
        map.remove(REV_FIELD);
        map.remove("rev");
    }
}

/// Revision-blind content equality.
///
/// Two documents are content-equal when they serialize identically after
/// `_id` and `_rev` are removed from both. The conflict-resolving writer
/// uses this to skip writes that would not change the stored content.
pub fn content_equal(a: &Value, b: &Value) -> bool {
    comparison_snapshot(a) == comparison_snapshot(b)
}

fn comparison_snapshot(doc: &Value) -> Value {
    let mut snap = doc.clone();
    if let Value::Object(map) = &mut snap {
        map.remove(ID_FIELD);
        map.remove(REV_FIELD);
    }
    snap
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strip_renames_id_and_drops_rev() {
        let mut doc = json!({"_id": "a1", "_rev": "1-abc", "name": "restheart"});
        strip_doc(&mut doc);
        assert_eq!(doc, json!({"id": "a1", "name": "restheart"}));
    }

    #[test]
    fn strip_drops_bare_rev_too() {
        let mut doc = json!({"_id": "a1", "rev": "1-abc"});
        strip_doc(&mut doc);
        assert_eq!(doc, json!({"id": "a1"}));
    }

    #[test]
    fn strip_ignores_non_objects() {
        let mut doc = json!(42);
        strip_doc(&mut doc);
        assert_eq!(doc, json!(42));
    }

    #[test]
    fn strip_docs_covers_every_element() {
        let mut docs = vec![json!({"_id": "a"}), json!({"_id": "b", "_rev": "2-x"})];
        strip_docs(&mut docs);
        assert_eq!(docs, vec![json!({"id": "a"}), json!({"id": "b"})]);
    }

    #[test]
    fn normalize_renames_id_back() {
        let mut doc = json!({"id": "a1", "rev": "1-abc", "x": 1});
        normalize_for_write(&mut doc);
        assert_eq!(doc, json!({"_id": "a1", "x": 1}));
    }

    #[test]
    fn normalize_drops_stale_rev_token() {
        let mut doc = json!({"_rev": "3-old", "x": 1});
        normalize_for_write(&mut doc);
        assert_eq!(doc, json!({"x": 1}));
    }

    #[test]
    fn content_equal_ignores_id_and_rev() {
        let a = json!({"_id": "a1", "_rev": "1-abc", "x": 1, "y": "z"});
        let b = json!({"_id": "a1", "_rev": "2-def", "x": 1, "y": "z"});
        assert!(content_equal(&a, &b));
    }

    #[test]
    fn content_equal_detects_changed_fields() {
        let a = json!({"_id": "a1", "x": 1});
        let b = json!({"_id": "a1", "x": 2});
        assert!(!content_equal(&a, &b));
    }

    #[test]
    fn content_equal_on_non_objects() {
        assert!(content_equal(&json!([1, 2]), &json!([1, 2])));
        assert!(!content_equal(&json!([1, 2]), &json!([2, 1])));
    }
}
