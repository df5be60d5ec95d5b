//! Compiled row predicates
//!
//! An expression is compiled once against a schema into a tree of tagged
//! variants with captured accessors and preconverted comparands: text
//! comparands are ASCII-folded bytes, numeric comparands are parsed to
//! f64, `in`/`notIn` to arrays of those. All schema and value errors
//! surface here at compile time; row-time evaluation is total.

use crate::filter::expression::{
    FilterExpression, FilterMode, FilterOp, FilterRule, FilterValue,
};
use crate::table::{Accessor, RowCursor, Schema};
use crate::{GridError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CmpOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

/// Compiled predicate tree.
#[derive(Debug)]
pub(crate) enum Predicate {
    True,
    CmpNumber {
        field: Accessor,
        op: CmpOp,
        target: f64,
    },
    EqText {
        field: Accessor,
        target: Vec<u8>,
        negate: bool,
    },
    ContainsText {
        field: Accessor,
        needle: Vec<u8>,
        negate: bool,
    },
    InNumber {
        field: Accessor,
        targets: Vec<f64>,
        negate: bool,
    },
    InText {
        field: Accessor,
        targets: Vec<Vec<u8>>,
        negate: bool,
    },
    AllOf(Vec<Predicate>),
    AnyOf(Vec<Predicate>),
}

impl Predicate {
    /// Test the row the cursor currently points at.
    #[inline]
    pub(crate) fn matches(&self, row: &RowCursor<'_>) -> bool {
        match self {
            Predicate::True => true,
            Predicate::CmpNumber { field, op, target } => {
                let value = row.read_number(field);
                match op {
                    CmpOp::Eq => value == *target,
                    CmpOp::Ne => value != *target,
                    CmpOp::Gt => value > *target,
                    CmpOp::Ge => value >= *target,
                    CmpOp::Lt => value < *target,
                    CmpOp::Le => value <= *target,
                }
            }
            Predicate::EqText {
                field,
                target,
                negate,
            } => row.read_bytes(field).eq_ignore_case(target) != *negate,
            Predicate::ContainsText {
                field,
                needle,
                negate,
            } => row.read_bytes(field).contains_ignore_case(needle) != *negate,
            Predicate::InNumber {
                field,
                targets,
                negate,
            } => {
                let value = row.read_number(field);
                targets.iter().any(|t| value == *t) != *negate
            }
            Predicate::InText {
                field,
                targets,
                negate,
            } => {
                let value = row.read_bytes(field);
                targets.iter().any(|t| value.eq_ignore_case(t)) != *negate
            }
            Predicate::AllOf(preds) => preds.iter().all(|p| p.matches(row)),
            Predicate::AnyOf(preds) => preds.iter().any(|p| p.matches(row)),
        }
    }
}

/// Compile an expression against a schema.
///
/// DNF: clauses AND their rules, the expression ORs its clauses. CNF is
/// the dual. An empty expression matches everything; an empty clause is
/// the identity of its aggregator.
pub(crate) fn compile(expression: &FilterExpression, schema: &Schema) -> Result<Predicate> {
    if expression.clauses.is_empty() {
        return Ok(Predicate::True);
    }

    let mut clauses = Vec::with_capacity(expression.clauses.len());
    for clause in &expression.clauses {
        let rules = clause
            .iter()
            .map(|rule| compile_rule(rule, schema))
            .collect::<Result<Vec<_>>>()?;
        clauses.push(match expression.mode {
            FilterMode::Dnf => Predicate::AllOf(rules),
            FilterMode::Cnf => Predicate::AnyOf(rules),
        });
    }
    Ok(match expression.mode {
        FilterMode::Dnf => Predicate::AnyOf(clauses),
        FilterMode::Cnf => Predicate::AllOf(clauses),
    })
}

fn compile_rule(rule: &FilterRule, schema: &Schema) -> Result<Predicate> {
    let meta = schema
        .column(&rule.field)
        .ok_or_else(|| GridError::ColumnNotFound(rule.field.clone()))?;
    let field = Accessor::for_column(meta);

    if meta.ty.is_text() {
        match rule.operation {
            FilterOp::Equal | FilterOp::NotEqual => Ok(Predicate::EqText {
                field,
                target: fold(single_value(rule)?),
                negate: rule.operation == FilterOp::NotEqual,
            }),
            FilterOp::Contains | FilterOp::NotContains => Ok(Predicate::ContainsText {
                field,
                needle: fold(single_value(rule)?),
                negate: rule.operation == FilterOp::NotContains,
            }),
            FilterOp::In | FilterOp::NotIn => Ok(Predicate::InText {
                field,
                targets: many_values(rule)?.iter().map(|v| fold(v)).collect(),
                negate: rule.operation == FilterOp::NotIn,
            }),
            _ => Err(unsupported(rule)),
        }
    } else {
        match rule.operation {
            FilterOp::Equal => cmp_number(rule, field, CmpOp::Eq),
            FilterOp::NotEqual => cmp_number(rule, field, CmpOp::Ne),
            FilterOp::GreaterThan => cmp_number(rule, field, CmpOp::Gt),
            FilterOp::GreaterThanOrEqual => cmp_number(rule, field, CmpOp::Ge),
            FilterOp::LessThan => cmp_number(rule, field, CmpOp::Lt),
            FilterOp::LessThanOrEqual => cmp_number(rule, field, CmpOp::Le),
            FilterOp::In | FilterOp::NotIn => Ok(Predicate::InNumber {
                field,
                targets: many_values(rule)?
                    .iter()
                    .map(|v| parse_number(v))
                    .collect::<Result<Vec<_>>>()?,
                negate: rule.operation == FilterOp::NotIn,
            }),
            FilterOp::Contains | FilterOp::NotContains => Err(unsupported(rule)),
        }
    }
}

fn cmp_number(rule: &FilterRule, field: Accessor, op: CmpOp) -> Result<Predicate> {
    Ok(Predicate::CmpNumber {
        field,
        op,
        target: parse_number(single_value(rule)?)?,
    })
}

fn unsupported(rule: &FilterRule) -> GridError {
    GridError::UnsupportedOperation {
        operation: rule.operation.name().to_string(),
        column: rule.field.clone(),
    }
}

fn single_value(rule: &FilterRule) -> Result<&str> {
    match &rule.value {
        FilterValue::One(value) => Ok(value),
        FilterValue::Many(_) => Err(GridError::InvalidFilterValue(format!(
            "operation {} takes a single value",
            rule.operation.name()
        ))),
    }
}

fn many_values(rule: &FilterRule) -> Result<&[String]> {
    match &rule.value {
        FilterValue::Many(values) => Ok(values),
        FilterValue::One(_) => Err(GridError::InvalidFilterValue(format!(
            "operation {} takes an array of values",
            rule.operation.name()
        ))),
    }
}

fn parse_number(value: &str) -> Result<f64> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|_| GridError::InvalidFilterValue(format!("not a number: {value:?}")))
}

fn fold(value: &str) -> Vec<u8> {
    value.as_bytes().to_ascii_lowercase()
}
