//! Result writers
//!
//! A result description is compiled once against the source and result
//! schemas into a list of field writers. Each `write` claims a fresh
//! result row with an atomic fetch-add, so workers racing on the same
//! result table never collide on a slot.

use crate::filter::expression::ResultColumn;
use crate::table::{Accessor, ColumnType, RowCursor, Schema, Table};
use crate::{GridError, Result};

#[derive(Debug)]
enum FieldWriter {
    /// Copy the source column's bytes into the result column.
    Copy { src: Accessor, dst: Accessor },
    /// Store the source row index into the reserved empty-named column.
    RowIndex { dst: Accessor },
}

/// Compiled writer appending matched rows to a result table.
pub(crate) struct ResultWriter {
    table: Table,
    fields: Vec<FieldWriter>,
}

impl ResultWriter {
    pub(crate) fn compile(
        description: &[ResultColumn],
        source: &Schema,
        table: Table,
    ) -> Result<Self> {
        let mut fields = Vec::with_capacity(description.len());
        for entry in description {
            match &entry.target {
                Some(target) => {
                    let src = source
                        .column(&entry.column)
                        .ok_or_else(|| GridError::ColumnNotFound(entry.column.clone()))?;
                    let dst = table
                        .schema()
                        .column(target)
                        .ok_or_else(|| GridError::ColumnNotFound(target.clone()))?;
                    if src.ty != dst.ty || src.size != dst.size {
                        return Err(GridError::ColumnMismatch(format!(
                            "cannot copy {} into {}: type or size differs",
                            entry.column, target
                        )));
                    }
                    fields.push(FieldWriter::Copy {
                        src: Accessor::for_column(src),
                        dst: Accessor::for_column(dst),
                    });
                }
                None => {
                    let dst = table.schema().column("").ok_or_else(|| {
                        GridError::ColumnMismatch(
                            "result table has no row-index column".to_string(),
                        )
                    })?;
                    if dst.ty != ColumnType::Uint32 {
                        return Err(GridError::ColumnMismatch(
                            "row-index column must be Uint32".to_string(),
                        ));
                    }
                    fields.push(FieldWriter::RowIndex {
                        dst: Accessor::for_column(dst),
                    });
                }
            }
        }
        Ok(Self { table, fields })
    }

    /// Append one result row from the source row the cursor points at.
    pub(crate) fn write(&self, source: &RowCursor<'_>, source_index: u32) -> Result<()> {
        let slot = self.table.add_rows(1)?;
        let schema = self.table.schema();
        let base =
            schema.data_length() as usize + slot as usize * schema.row_length() as usize;
        let region = self.table.region();

        for field in &self.fields {
            match field {
                FieldWriter::Copy { src, dst } => {
                    region.copy_from(
                        base + dst.offset as usize,
                        source.region(),
                        source.field_offset(src.offset),
                        src.size as usize,
                    );
                }
                FieldWriter::RowIndex { dst } => {
                    region.write_u32(base + dst.offset as usize, source_index);
                }
            }
        }
        Ok(())
    }
}
