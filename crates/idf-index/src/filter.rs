// SPDX-License-Identifier: MIT OR Apache-2.0
//! Conjunctive metadata filters over the chunk stream.
//!
//! Filterable fields and the operators allowed on each are pre-declared in a
//! [`RetrievalProfile`]; a predicate outside the profile is rejected with
//! `INVALID_FILTER` before any scoring happens.

use idf_core::Chunk;
use idf_error::{ErrorCode, FoundryError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Comparison operator of a filter predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    /// Equal.
    Eq,
    /// Not equal.
    Neq,
    /// Greater than (numbers; lexicographic for strings).
    Gt,
    /// Greater or equal.
    Gte,
    /// Less than.
    Lt,
    /// Less or equal.
    Lte,
    /// Candidate value is a member of the given array.
    In,
    /// Candidate string/array contains the given value.
    Contains,
}

/// One predicate; a query carries a conjunction of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FilterPredicate {
    /// Declared field name (e.g. `"tags"`, `"custom.team"`).
    pub field: String,
    /// Operator.
    pub op: FilterOp,
    /// Comparison value.
    pub value: serde_json::Value,
}

/// Declares which fields may be filtered and with which operators.
#[derive(Debug, Clone)]
pub struct RetrievalProfile {
    allowed: BTreeMap<String, Vec<FilterOp>>,
    /// Allow `custom.<key>` lookups with the full operator set.
    allow_custom: bool,
}

impl RetrievalProfile {
    /// The local backend's default profile: the standard chunk metadata
    /// fields plus `custom.*`.
    pub fn standard() -> Self {
        use FilterOp::*;
        let equality = vec![Eq, Neq, In];
        let ordered = vec![Eq, Neq, Gt, Gte, Lt, Lte, In];
        let mut allowed = BTreeMap::new();
        allowed.insert("source_id".into(), equality.clone());
        allowed.insert("doc_id".into(), equality.clone());
        allowed.insert("content_type".into(), equality.clone());
        allowed.insert("language".into(), equality.clone());
        allowed.insert("title".into(), vec![Eq, Neq, In, Contains]);
        allowed.insert("tags".into(), vec![Eq, In, Contains]);
        allowed.insert("heading".into(), vec![Eq, Neq, Contains]);
        allowed.insert("page".into(), ordered.clone());
        allowed.insert("hierarchy_level".into(), ordered.clone());
        allowed.insert("chunk_index".into(), ordered);
        Self {
            allowed,
            allow_custom: true,
        }
    }

    /// An empty profile that rejects every predicate.
    pub fn deny_all() -> Self {
        Self {
            allowed: BTreeMap::new(),
            allow_custom: false,
        }
    }

    /// Declare (or extend) a field with the given operators.
    pub fn declare(&mut self, field: impl Into<String>, ops: Vec<FilterOp>) {
        self.allowed.insert(field.into(), ops);
    }

    /// Validate a conjunction against this profile.
    ///
    /// # Errors
    ///
    /// `INVALID_FILTER` naming the first undeclared field or operator.
    pub fn validate(&self, predicates: &[FilterPredicate]) -> Result<(), FoundryError> {
        for p in predicates {
            let ops = if let Some(ops) = self.allowed.get(&p.field) {
                ops.as_slice()
            } else if self.allow_custom && p.field.starts_with("custom.") {
                &[
                    FilterOp::Eq,
                    FilterOp::Neq,
                    FilterOp::Gt,
                    FilterOp::Gte,
                    FilterOp::Lt,
                    FilterOp::Lte,
                    FilterOp::In,
                    FilterOp::Contains,
                ]
            } else {
                return Err(FoundryError::new(
                    ErrorCode::InvalidFilter,
                    format!("field {:?} is not declared for filtering", p.field),
                )
                .with_detail("field", &p.field));
            };
            if !ops.contains(&p.op) {
                return Err(FoundryError::new(
                    ErrorCode::InvalidFilter,
                    format!("operator {:?} is not allowed on field {:?}", p.op, p.field),
                )
                .with_detail("field", &p.field)
                .with_detail("op", format!("{:?}", p.op)));
            }
        }
        Ok(())
    }
}

impl Default for RetrievalProfile {
    fn default() -> Self {
        Self::standard()
    }
}

/// Evaluate a validated conjunction against one chunk.
pub fn matches(chunk: &Chunk, predicates: &[FilterPredicate]) -> bool {
    predicates.iter().all(|p| {
        field_value(chunk, &p.field)
            .map(|candidate| apply(&candidate, p.op, &p.value))
            .unwrap_or(false)
    })
}

fn field_value(chunk: &Chunk, field: &str) -> Option<serde_json::Value> {
    use serde_json::{Value, json};
    match field {
        "source_id" => Some(json!(chunk.source_id)),
        "doc_id" => Some(json!(chunk.doc_id)),
        "chunk_index" => Some(json!(chunk.chunk_index)),
        "content_type" => chunk.metadata.content_type.as_ref().map(|v| json!(v)),
        "language" => chunk.metadata.language.as_ref().map(|v| json!(v)),
        "title" => chunk.metadata.title.as_ref().map(|v| json!(v)),
        "tags" => Some(json!(chunk.metadata.tags)),
        "heading" => chunk.position.heading.as_ref().map(|v| json!(v)),
        "page" => chunk.position.page.map(|v| json!(v)),
        "hierarchy_level" => Some(json!(chunk.hierarchy.level)),
        custom => custom
            .strip_prefix("custom.")
            .and_then(|key| chunk.metadata.custom.get(key).cloned())
            .map(Value::from),
    }
}

fn apply(candidate: &serde_json::Value, op: FilterOp, value: &serde_json::Value) -> bool {
    use serde_json::Value;
    match op {
        FilterOp::Eq => candidate == value,
        FilterOp::Neq => candidate != value,
        FilterOp::Gt => compare(candidate, value).is_some_and(|o| o.is_gt()),
        FilterOp::Gte => compare(candidate, value).is_some_and(|o| o.is_ge()),
        FilterOp::Lt => compare(candidate, value).is_some_and(|o| o.is_lt()),
        FilterOp::Lte => compare(candidate, value).is_some_and(|o| o.is_le()),
        FilterOp::In => match value {
            Value::Array(options) => options.iter().any(|v| v == candidate),
            _ => false,
        },
        FilterOp::Contains => match (candidate, value) {
            (Value::String(hay), Value::String(needle)) => hay.contains(needle.as_str()),
            (Value::Array(items), needle) => items.iter().any(|v| v == needle),
            _ => false,
        },
    }
}

fn compare(a: &serde_json::Value, b: &serde_json::Value) -> Option<std::cmp::Ordering> {
    use serde_json::Value;
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
