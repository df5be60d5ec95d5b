//! memgrid: shared-memory columnar table engine
//!
//! Stores tabular data in a contiguous byte region with a self-describing
//! binary header, exposes zero-copy row cursors over that region, and
//! evaluates compiled boolean filter expressions (DNF/CNF) across many
//! worker threads that cooperate through a shared atomic cursor, each
//! appending matching rows to a shared result table.

pub mod filter;
pub mod memory;
pub mod stats;
pub mod table;
pub mod worker;

// Re-export main types
pub use filter::{
    FilterExpression, FilterMode, FilterOp, FilterProcessor, FilterRule, FilterValue,
    ResultColumn, ResultDescription, ScanSummary,
};
pub use memory::{ByteRegion, SharedBuffer};
pub use table::{ByteStr, ColumnDescriptor, ColumnType, RowCursor, Schema, Table};
pub use worker::{
    run_parallel_scan, FilterJob, RegionDescriptor, Request, Response, ResponseData,
    TableDescriptor, Worker, WorkerPool,
};

/// Engine error type
#[derive(Debug, thiserror::Error)]
pub enum GridError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid table format")]
    InvalidFormat,

    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u32, actual: u32 },

    #[error("Region too small: need {needed} bytes, have {available}")]
    RegionTooSmall { needed: usize, available: usize },

    #[error("Range out of bounds: offset {offset} + len {len} > size {size}")]
    OutOfBounds { offset: usize, len: usize, size: usize },

    #[error("Offset {offset} is not aligned for atomic access")]
    Misaligned { offset: usize },

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Column already exists: {0}")]
    DuplicateColumn(String),

    #[error("Invalid column size for {name}: {size}")]
    InvalidColumnSize { name: String, size: u32 },

    #[error("Operation {operation} is not supported on column {column}")]
    UnsupportedOperation { operation: String, column: String },

    #[error("Invalid filter value: {0}")]
    InvalidFilterValue(String),

    #[error("Result column mismatch: {0}")]
    ColumnMismatch(String),

    #[error("Value too long for column {column}: {len} bytes, capacity {capacity}")]
    ValueTooLong { column: String, len: usize, capacity: usize },

    #[error("Table region full: row capacity {capacity} exceeded")]
    RegionFull { capacity: u32 },

    #[error("Protocol error: {0}")]
    Protocol(String),
}

pub type Result<T> = std::result::Result<T, GridError>;
