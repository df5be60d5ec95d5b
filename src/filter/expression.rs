//! Filter expression AST and wire form
//!
//! Wire encoding (JSON via serde):
//!
//! ```json
//! { "mode": "DNF",
//!   "clauses": [[ { "field": "id", "operation": "equal", "value": "1" } ],
//!               [ { "field": "name", "operation": "in",
//!                   "value": ["ada", "bob"] } ]] }
//! ```
//!
//! All rule values travel as strings; numeric rules re-parse decimal to
//! f64 at compile time. `in`/`notIn` carry arrays, everything else a
//! single string.

use serde::{Deserialize, Serialize};

/// Normal form of an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterMode {
    /// OR of clauses, each clause an AND of rules.
    #[serde(rename = "DNF")]
    Dnf,
    /// AND of clauses, each clause an OR of rules.
    #[serde(rename = "CNF")]
    Cnf,
}

/// Rule operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterOp {
    Equal,
    NotEqual,
    Contains,
    NotContains,
    In,
    NotIn,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
}

impl FilterOp {
    /// Wire name, used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            FilterOp::Equal => "equal",
            FilterOp::NotEqual => "notEqual",
            FilterOp::Contains => "contains",
            FilterOp::NotContains => "notContains",
            FilterOp::In => "in",
            FilterOp::NotIn => "notIn",
            FilterOp::GreaterThan => "greaterThan",
            FilterOp::GreaterThanOrEqual => "greaterThanOrEqual",
            FilterOp::LessThan => "lessThan",
            FilterOp::LessThanOrEqual => "lessThanOrEqual",
        }
    }
}

/// A single comparison value or a set of them (`in`/`notIn`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    One(String),
    Many(Vec<String>),
}

/// One typed column predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRule {
    pub field: String,
    pub operation: FilterOp,
    pub value: FilterValue,
}

impl FilterRule {
    pub fn new(field: &str, operation: FilterOp, value: &str) -> Self {
        Self {
            field: field.to_string(),
            operation,
            value: FilterValue::One(value.to_string()),
        }
    }

    pub fn with_values(field: &str, operation: FilterOp, values: &[&str]) -> Self {
        Self {
            field: field.to_string(),
            operation,
            value: FilterValue::Many(values.iter().map(|v| v.to_string()).collect()),
        }
    }
}

/// Ordered sequence of rules.
pub type FilterClause = Vec<FilterRule>;

/// A boolean expression in DNF or CNF. Empty matches every row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterExpression {
    pub mode: FilterMode,
    pub clauses: Vec<FilterClause>,
}

impl FilterExpression {
    pub fn dnf(clauses: Vec<FilterClause>) -> Self {
        Self {
            mode: FilterMode::Dnf,
            clauses,
        }
    }

    pub fn cnf(clauses: Vec<FilterClause>) -> Self {
        Self {
            mode: FilterMode::Cnf,
            clauses,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

/// One output column of a scan.
///
/// With `target` set the source column's value is copied into the result
/// column of that name; without it the source row index (u32) is written
/// into the result table's empty-named column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultColumn {
    pub column: String,
    #[serde(rename = "as", default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl ResultColumn {
    pub fn copy(column: &str, target: &str) -> Self {
        Self {
            column: column.to_string(),
            target: Some(target.to_string()),
        }
    }

    pub fn row_index() -> Self {
        Self {
            column: String::new(),
            target: None,
        }
    }
}

/// Ordered list of output columns.
pub type ResultDescription = Vec<ResultColumn>;
