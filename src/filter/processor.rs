//! Filter processor: compile + batched scan loop
//!
//! One processor is bound to a source table for its whole life. Each
//! `process_filters` call compiles the expression and result description,
//! then races the shared atomic cursor with every other worker: a
//! fetch-add claims rows `[start, start + batch)`, the claim is scanned
//! in ascending order, and matches are appended to the shared result
//! table. A worker exits once its claim starts at or past the row count.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::filter::expression::{FilterExpression, ResultDescription};
use crate::filter::predicate;
use crate::filter::writer::ResultWriter;
use crate::memory::{ByteRegion, SharedBuffer};
use crate::stats;
use crate::table::Table;
use crate::{GridError, Result};

/// Per-scan outcome counts, reported back to the coordinator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub rows_visited: u64,
    pub rows_matched: u64,
}

/// A compiled filter executor bound to one source table.
pub struct FilterProcessor {
    table: Table,
}

impl FilterProcessor {
    pub fn new(table: Table) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Run one scan over the source table.
    ///
    /// `indices` must hold at least two u32 slots; slot 0 is the shared
    /// claim cursor (the second slot is reserved by the protocol). The
    /// same cursor region is handed to every worker of a fleet, so the
    /// claims partition the table between them.
    pub fn process_filters(
        &self,
        expression: &FilterExpression,
        description: &ResultDescription,
        result_table: Table,
        indices: &ByteRegion,
        row_batch_size: u32,
    ) -> Result<ScanSummary> {
        if row_batch_size == 0 {
            return Err(GridError::Protocol(
                "rowBatchSize must be positive".to_string(),
            ));
        }
        if indices.size() < 8 {
            return Err(GridError::Protocol(
                "indices region must hold at least two u32 slots".to_string(),
            ));
        }
        let cursor = indices.atomic_u32(0)?;

        let predicate = predicate::compile(expression, self.table.schema())?;
        let writer = ResultWriter::compile(description, self.table.schema(), result_table)?;

        let row_count = self.table.row_count();
        let mut row = self.table.cursor();
        let mut summary = ScanSummary::default();
        let stats = stats::global_stats();

        loop {
            let start = cursor.fetch_add(row_batch_size, Ordering::AcqRel);
            if start >= row_count {
                break;
            }
            stats.record_batch_claimed();
            let end = start.saturating_add(row_batch_size).min(row_count);
            for r in start..end {
                row.set_index(r);
                if predicate.matches(&row) {
                    writer.write(&row, r)?;
                    summary.rows_matched += 1;
                }
            }
            summary.rows_visited += (end - start) as u64;
        }

        stats.record_scan(summary.rows_visited, summary.rows_matched);
        log::debug!(
            "scan complete: visited {} rows, matched {}",
            summary.rows_visited,
            summary.rows_matched
        );
        Ok(summary)
    }

    /// Surrender the source table's buffer, invalidating the processor.
    pub fn fetch_memory(self) -> Arc<SharedBuffer> {
        self.table.into_buffer()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::expression::{FilterOp, FilterRule, ResultColumn};
    use crate::memory::{ByteRegion, SharedBuffer};
    use crate::table::{ColumnDescriptor, ColumnType};

    fn source_table(rows: u32) -> Table {
        let columns = vec![ColumnDescriptor::new("id", ColumnType::Uint32).unwrap()];
        let buffer = SharedBuffer::anonymous(64 + rows as usize * 4).unwrap();
        let table = Table::create(&columns, ByteRegion::whole(buffer)).unwrap();
        let id = table.schema().index_of("id").unwrap();
        table.add_rows(rows).unwrap();
        for i in 0..rows {
            table.row(i).set_u32(id, i);
        }
        table
    }

    fn result_table(rows: u32) -> Table {
        let columns = vec![
            ColumnDescriptor::new("id", ColumnType::Uint32).unwrap(),
            ColumnDescriptor::new("", ColumnType::Uint32).unwrap(),
        ];
        let buffer = SharedBuffer::anonymous(128 + rows as usize * 8).unwrap();
        Table::create(&columns, ByteRegion::whole(buffer)).unwrap()
    }

    fn indices_region() -> ByteRegion {
        ByteRegion::whole(SharedBuffer::anonymous(8).unwrap())
    }

    fn description() -> ResultDescription {
        vec![ResultColumn::copy("id", "id"), ResultColumn::row_index()]
    }

    #[test]
    fn test_single_worker_scan() {
        let source = source_table(100);
        let result = result_table(100);
        let result_region = result.region().clone();
        let processor = FilterProcessor::new(source);

        let expression = FilterExpression::dnf(vec![vec![FilterRule::new(
            "id",
            FilterOp::LessThan,
            "5",
        )]]);
        let summary = processor
            .process_filters(&expression, &description(), result, &indices_region(), 7)
            .unwrap();

        assert_eq!(summary.rows_visited, 100);
        assert_eq!(summary.rows_matched, 5);

        let result = Table::attach(result_region).unwrap();
        assert_eq!(result.row_count(), 5);
        let id = result.schema().index_of("id").unwrap();
        let mut ids: Vec<u32> = Vec::new();
        result.for_each(|row| ids.push(row.get_u32(id)));
        ids.sort_unstable();
        assert_eq!(ids, [0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_batch_size_must_be_positive() {
        let processor = FilterProcessor::new(source_table(10));
        let err = processor
            .process_filters(
                &FilterExpression::dnf(vec![]),
                &description(),
                result_table(10),
                &indices_region(),
                0,
            )
            .unwrap_err();
        assert!(matches!(err, GridError::Protocol(_)));
    }

    #[test]
    fn test_indices_region_must_fit_two_slots() {
        let processor = FilterProcessor::new(source_table(10));
        let short = ByteRegion::whole(SharedBuffer::anonymous(4).unwrap());
        let err = processor
            .process_filters(
                &FilterExpression::dnf(vec![]),
                &description(),
                result_table(10),
                &short,
                8,
            )
            .unwrap_err();
        assert!(matches!(err, GridError::Protocol(_)));
    }

    #[test]
    fn test_scan_resumes_from_cursor_position() {
        // A cursor already past the end claims nothing.
        let processor = FilterProcessor::new(source_table(10));
        let indices = indices_region();
        indices.atomic_u32(0).unwrap().store(10, Ordering::Release);

        let summary = processor
            .process_filters(
                &FilterExpression::dnf(vec![]),
                &description(),
                result_table(10),
                &indices,
                4,
            )
            .unwrap();
        assert_eq!(summary.rows_visited, 0);
        assert_eq!(summary.rows_matched, 0);
    }

    #[test]
    fn test_fetch_memory_surrenders_buffer() {
        let source = source_table(10);
        let buffer_len = source.region().buffer().len();
        let processor = FilterProcessor::new(source);
        let buffer = processor.fetch_memory();
        assert_eq!(buffer.len(), buffer_len);
    }
}
