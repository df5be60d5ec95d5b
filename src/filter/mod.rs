//! Filter expressions and the parallel filter executor
//!
//! An expression (DNF or CNF over typed column predicates) is compiled
//! once against a table's schema into a tagged-variant predicate tree
//! with all comparands preconverted; the scan loop then runs
//! `row.set_index(r); if predicate.matches(&row) { writer.write(r) }`
//! with no per-row lookups or parsing.

mod expression;
mod predicate;
mod processor;
mod writer;

pub use expression::{
    FilterClause, FilterExpression, FilterMode, FilterOp, FilterRule, FilterValue, ResultColumn,
    ResultDescription,
};
pub use processor::{FilterProcessor, ScanSummary};
