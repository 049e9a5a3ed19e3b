//! Filter expression compiler.
//!
//! A wire-format [`FilterGroup`] is compiled once into a validated
//! [`IndexQuery`], which has two evaluation paths that accept exactly the
//! same set of records:
//!
//! - [`crate::index::SearchIndex::evaluate`] runs it as roaring-bitmap
//!   algebra over the per-project index postings (query/facet path);
//! - [`matches_fields`] runs it as a predicate over a record's projected
//!   field map (columnar scan path, used by export).
//!
//! Both consume the same `fields::project_fields` output, so agreement is
//! by construction rather than by parallel implementations of the wire
//! format.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{LocusError, Result};
use crate::fields::{field_spec, FieldKind};
use crate::types::FieldValue;

/// Boolean combinator for a filter group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Combinator {
    And,
    Or,
}

/// Wire format for one filter leaf: `{field, op, value}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterClause {
    pub field: String,
    pub op: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

/// Wire format for a recursive filter tree:
/// `{op: "AND"|"OR", clauses: [...], groups: [...]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterGroup {
    pub op: Combinator,
    #[serde(default)]
    pub clauses: Vec<FilterClause>,
    #[serde(default)]
    pub groups: Vec<FilterGroup>,
}

/// Numeric bounds for a range clause. All bounds optional; at least one must
/// be present for the clause to validate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeBounds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gte: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lte: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gt: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lt: Option<f64>,
}

impl RangeBounds {
    pub fn contains(&self, num: f64) -> bool {
        if let Some(min) = self.gte {
            if num < min {
                return false;
            }
        }
        if let Some(max) = self.lte {
            if num > max {
                return false;
            }
        }
        if let Some(min) = self.gt {
            if num <= min {
                return false;
            }
        }
        if let Some(max) = self.lt {
            if num >= max {
                return false;
            }
        }
        true
    }

    fn is_empty(&self) -> bool {
        self.gte.is_none() && self.lte.is_none() && self.gt.is_none() && self.lt.is_none()
    }
}

/// A validated, compiled filter node. Structural recursion mirrors the
/// AND/OR shape of the wire tree.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexQuery {
    /// Matches every record (empty filter group, or no filter at all).
    All,
    /// Keyword field equals (or list-contains) the value.
    Term { field: String, value: String },
    /// Keyword field matches any of the values.
    In { field: String, values: Vec<String> },
    /// Numeric field falls within the bounds.
    Range { field: String, bounds: RangeBounds },
    /// Field is present on the record.
    Exists { field: String },
    And(Vec<IndexQuery>),
    Or(Vec<IndexQuery>),
}

/// Compile a wire filter tree into a validated [`IndexQuery`].
///
/// Every referenced field must be whitelisted and every operator must match
/// the field's kind; violations produce `InvalidFilter` naming the offending
/// clause. Trees deeper than `max_depth` produce `FilterTooComplex`. `None`
/// and empty groups compile to match-all.
pub fn compile(filter: Option<&FilterGroup>, max_depth: usize) -> Result<IndexQuery> {
    match filter {
        None => Ok(IndexQuery::All),
        Some(group) => {
            let depth = group_depth(group);
            if depth > max_depth {
                return Err(LocusError::FilterTooComplex {
                    depth,
                    max: max_depth,
                });
            }
            compile_group(group)
        }
    }
}

fn group_depth(group: &FilterGroup) -> usize {
    1 + group.groups.iter().map(group_depth).max().unwrap_or(0)
}

fn compile_group(group: &FilterGroup) -> Result<IndexQuery> {
    let mut children = Vec::with_capacity(group.clauses.len() + group.groups.len());
    for clause in &group.clauses {
        children.push(compile_clause(clause)?);
    }
    for nested in &group.groups {
        children.push(compile_group(nested)?);
    }

    if children.is_empty() {
        return Ok(IndexQuery::All);
    }
    Ok(match group.op {
        Combinator::And => IndexQuery::And(children),
        Combinator::Or => IndexQuery::Or(children),
    })
}

fn compile_clause(clause: &FilterClause) -> Result<IndexQuery> {
    let spec = field_spec(&clause.field).ok_or_else(|| invalid(clause, "unknown field"))?;

    match clause.op.as_str() {
        "term" | "eq" => {
            if spec.kind != FieldKind::Keyword {
                return Err(invalid(clause, "term requires a keyword field"));
            }
            let value = keyword_value(&clause.value)
                .ok_or_else(|| invalid(clause, "term requires a string value"))?;
            Ok(IndexQuery::Term {
                field: clause.field.clone(),
                value,
            })
        }
        "in" => {
            if spec.kind != FieldKind::Keyword {
                return Err(invalid(clause, "in requires a keyword field"));
            }
            let values = clause
                .value
                .as_array()
                .map(|arr| arr.iter().map(keyword_value).collect::<Option<Vec<_>>>())
                .unwrap_or(None)
                .ok_or_else(|| invalid(clause, "in requires an array of strings"))?;
            if values.is_empty() {
                return Err(invalid(clause, "in requires at least one value"));
            }
            Ok(IndexQuery::In {
                field: clause.field.clone(),
                values,
            })
        }
        "exists" => Ok(IndexQuery::Exists {
            field: clause.field.clone(),
        }),
        "range" => {
            if spec.kind != FieldKind::Numeric {
                return Err(invalid(clause, "range requires a numeric field"));
            }
            let bounds: RangeBounds = serde_json::from_value(clause.value.clone())
                .map_err(|_| invalid(clause, "range requires a bounds object"))?;
            if bounds.is_empty() {
                return Err(invalid(clause, "range requires at least one bound"));
            }
            Ok(IndexQuery::Range {
                field: clause.field.clone(),
                bounds,
            })
        }
        // Shorthand comparison operators with a bare numeric value.
        op @ ("gt" | "gte" | "lt" | "lte") => {
            if spec.kind != FieldKind::Numeric {
                return Err(invalid(clause, "comparison requires a numeric field"));
            }
            let num = clause
                .value
                .as_f64()
                .ok_or_else(|| invalid(clause, "comparison requires a numeric value"))?;
            let mut bounds = RangeBounds::default();
            match op {
                "gt" => bounds.gt = Some(num),
                "gte" => bounds.gte = Some(num),
                "lt" => bounds.lt = Some(num),
                _ => bounds.lte = Some(num),
            }
            Ok(IndexQuery::Range {
                field: clause.field.clone(),
                bounds,
            })
        }
        _ => Err(invalid(clause, "unsupported operator")),
    }
}

fn keyword_value(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        // Accept bare numbers for keyword-typed coordinates like chrom ("1").
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn invalid(clause: &FilterClause, reason: &str) -> LocusError {
    LocusError::InvalidFilter {
        reason: format!(
            "{reason} (clause: field={}, op={})",
            clause.field, clause.op
        ),
    }
}

/// Evaluate a compiled filter as a predicate over a record's projected field
/// map. This is the columnar-scan form; the index form is
/// `SearchIndex::evaluate`.
pub fn matches_fields(query: &IndexQuery, fields: &BTreeMap<String, FieldValue>) -> bool {
    match query {
        IndexQuery::All => true,
        IndexQuery::Term { field, value } => fields
            .get(field)
            .map(|v| v.matches_keyword(value))
            .unwrap_or(false),
        IndexQuery::In { field, values } => fields
            .get(field)
            .map(|v| values.iter().any(|needle| v.matches_keyword(needle)))
            .unwrap_or(false),
        IndexQuery::Range { field, bounds } => fields
            .get(field)
            .and_then(|v| v.as_number())
            .map(|num| bounds.contains(num))
            .unwrap_or(false),
        IndexQuery::Exists { field } => fields.contains_key(field),
        IndexQuery::And(children) => children.iter().all(|c| matches_fields(c, fields)),
        IndexQuery::Or(children) => children.iter().any(|c| matches_fields(c, fields)),
    }
}
