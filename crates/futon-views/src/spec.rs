//! Canonical aggregation specs and their content-addressed index keys.

use std::fmt;

use serde_json::{json, Value};

use crate::error::{ViewError, ViewResult};

/// Reduction operator of a secondary index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reduce {
    Count,
    Sum,
    Stats,
}

impl Reduce {
    /// Canonical operation name, part of the index-naming contract.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Stats => "stats",
        }
    }

    /// The store's built-in reduce expression for this operator.
    pub fn reduce_expr(&self) -> &'static str {
        match self {
            Self::Count => "_count",
            Self::Sum => "_sum",
            Self::Stats => "_stats",
        }
    }
}

/// A field list; single field names coerce to one-element lists.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Fields(pub Vec<String>);

impl From<&str> for Fields {
    fn from(name: &str) -> Self {
        Self(vec![name.to_string()])
    }
}

impl From<String> for Fields {
    fn from(name: String) -> Self {
        Self(vec![name])
    }
}

impl From<Vec<String>> for Fields {
    fn from(names: Vec<String>) -> Self {
        Self(names)
    }
}

impl From<Vec<&str>> for Fields {
    fn from(names: Vec<&str>) -> Self {
        Self(names.into_iter().map(String::from).collect())
    }
}

impl From<&[&str]> for Fields {
    fn from(names: &[&str]) -> Self {
        Self(names.iter().map(|s| s.to_string()).collect())
    }
}

/// 160-bit content address of an aggregation spec.
///
/// Computed as a domain-separated BLAKE3 hash over the operation name and
/// the serialized field lists, truncated to 20 bytes. The hex rendering
/// names both the design document and the view, so independent client
/// instances derive the same artifact name for the same request.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexKey([u8; 20]);

const INDEX_DOMAIN: &str = "futon-index-v1";

impl IndexKey {
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IndexKey({})", self.to_hex())
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// A normalized aggregation request: operation, value fields, group fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AggregateSpec {
    op: Reduce,
    value_fields: Vec<String>,
    group_fields: Vec<String>,
}

impl AggregateSpec {
    /// Count of all documents (single implicit group).
    pub fn count() -> Self {
        Self {
            op: Reduce::Count,
            value_fields: Vec::new(),
            group_fields: Vec::new(),
        }
    }

    /// Count grouped by the given fields.
    pub fn count_by(group: impl Into<Fields>) -> Self {
        Self {
            op: Reduce::Count,
            value_fields: Vec::new(),
            group_fields: group.into().0,
        }
    }

    /// Sum of the given value fields over all documents.
    pub fn sum(values: impl Into<Fields>) -> ViewResult<Self> {
        Self::with_values(Reduce::Sum, values.into(), Fields::default())
    }

    /// Sum grouped by the given fields.
    pub fn sum_by(values: impl Into<Fields>, group: impl Into<Fields>) -> ViewResult<Self> {
        Self::with_values(Reduce::Sum, values.into(), group.into())
    }

    /// Statistical summary of the given value fields.
    pub fn stats(values: impl Into<Fields>) -> ViewResult<Self> {
        Self::with_values(Reduce::Stats, values.into(), Fields::default())
    }

    /// Statistical summary grouped by the given fields.
    pub fn stats_by(values: impl Into<Fields>, group: impl Into<Fields>) -> ViewResult<Self> {
        Self::with_values(Reduce::Stats, values.into(), group.into())
    }

    fn with_values(op: Reduce, values: Fields, group: Fields) -> ViewResult<Self> {
        if values.0.is_empty() {
            return Err(ViewError::MissingValueFields);
        }
        Ok(Self {
            op,
            value_fields: values.0,
            group_fields: group.0,
        })
    }

    pub fn op(&self) -> Reduce {
        self.op
    }

    pub fn value_fields(&self) -> &[String] {
        &self.value_fields
    }

    pub fn group_fields(&self) -> &[String] {
        &self.group_fields
    }

    /// Fixed JSON shape this spec canonicalizes to; embedded verbatim in the
    /// design document as its machine-readable index block.
    pub fn canonical_json(&self) -> Value {
        json!({
            "operation": self.op.name(),
            "value_fields": self.value_fields,
            "group_fields": self.group_fields,
        })
    }

    /// Content address of this spec (see [`IndexKey`]).
    pub fn index_key(&self) -> IndexKey {
        let mut hasher = blake3::Hasher::new();
        hasher.update(INDEX_DOMAIN.as_bytes());
        hasher.update(b":");
        hasher.update(self.op.name().as_bytes());
        // Vec<String> serialization cannot fail.
        hasher.update(&serde_json::to_vec(&self.value_fields).unwrap_or_default());
        hasher.update(&serde_json::to_vec(&self.group_fields).unwrap_or_default());
        let mut key = [0u8; 20];
        key.copy_from_slice(&hasher.finalize().as_bytes()[..20]);
        IndexKey(key)
    }
}
