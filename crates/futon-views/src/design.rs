//! Design-document construction.
//!
//! The index is modeled as a structured expression (field accessors plus a
//! reduce tag) and *serialized* into the two forms the artifact needs: the
//! store's map/reduce source for execution, and the canonical `index` block
//! for verification and for backends that execute the structured form
//! directly. Nothing here generates code that the client itself evaluates.

use serde_json::{json, Value};

use crate::spec::{AggregateSpec, Reduce};

/// Build the design document for a spec, named by its index key.
///
/// Deterministic: two clients provisioning the same spec produce
/// byte-identical content, which is what lets a lost creation race converge
/// to a no-op in the writer.
pub fn design_doc(spec: &AggregateSpec) -> Value {
    let name = spec.index_key().to_hex();
    json!({
        "_id": format!("_design/{name}"),
        "views": {
            name: {
                "map": render_map(spec),
                "reduce": spec.op().reduce_expr(),
            }
        },
        "index": spec.canonical_json(),
    })
}

/// Render the map function in the store's expression form.
fn render_map(spec: &AggregateSpec) -> String {
    let key = accessor_list(spec.group_fields());
    let value = match spec.op() {
        Reduce::Count => "null".to_string(),
        Reduce::Sum | Reduce::Stats => accessor_list(spec.value_fields()),
    };
    format!("function (doc) {{ emit({key}, {value}); }}")
}

/// `null` for no fields, a bare accessor for one, an array for several.
fn accessor_list(fields: &[String]) -> String {
    match fields {
        [] => "null".to_string(),
        [field] => accessor(field),
        many => {
            let inner: Vec<String> = many.iter().map(|f| accessor(f)).collect();
            format!("[{}]", inner.join(", "))
        }
    }
}

fn accessor(field: &str) -> String {
    // Bracket form keeps field names with spaces or dashes valid.
    format!("doc['{}']", field.replace('\\', "\\\\").replace('\'', "\\'"))
}
