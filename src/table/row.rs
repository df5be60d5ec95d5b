//! Row cursors and field accessors
//!
//! An `Accessor` is the `{offset, type}` pair that locates one field
//! inside a row record; a `RowCursor` is a movable pointer over the
//! table's row area. Repositioning the cursor (`set_index`) is the only
//! per-row mutation in the scan loop: accessors are captured once at
//! compile time, then every getter is a bounds-checked load at
//! `data_length + index * row_length + offset`.

use std::sync::atomic::Ordering;

use crate::memory::ByteRegion;
use crate::table::column::{ByteStr, ColumnType};
use crate::table::header::{ColumnMeta, Schema, OFF_ROW_COUNT};
use crate::{GridError, Result};

/// Locates one field within a row record.
#[derive(Debug, Clone, Copy)]
pub struct Accessor {
    pub offset: u32,
    pub ty: ColumnType,
    pub size: u32,
}

impl Accessor {
    pub fn for_column(meta: &ColumnMeta) -> Self {
        Self {
            offset: meta.offset,
            ty: meta.ty,
            size: meta.size,
        }
    }
}

/// A movable cursor over the rows of a table region.
///
/// The cursor is repositioned in place; getters and setters observe
/// whichever row it currently points at.
pub struct RowCursor<'a> {
    region: &'a ByteRegion,
    schema: &'a Schema,
    index: u32,
}

impl<'a> RowCursor<'a> {
    pub(crate) fn new(region: &'a ByteRegion, schema: &'a Schema, index: u32) -> Self {
        let cursor = Self {
            region,
            schema,
            index,
        };
        debug_assert!(
            index < cursor.live_row_count(),
            "row index {} out of bounds",
            index
        );
        cursor
    }

    /// Cursor at row zero without a bounds check, for scan loops that
    /// may observe an empty table before claiming anything.
    pub(crate) fn at_start(region: &'a ByteRegion, schema: &'a Schema) -> Self {
        Self {
            region,
            schema,
            index: 0,
        }
    }

    /// Current row count of the underlying table (atomic load); rows may
    /// be claimed concurrently, so this is a lower bound by the time the
    /// caller acts on it.
    #[inline]
    fn live_row_count(&self) -> u32 {
        self.region
            .atomic_u32(OFF_ROW_COUNT)
            .expect("validated at attach")
            .load(Ordering::Acquire)
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// Move the cursor to row `index`.
    #[inline]
    pub fn set_index(&mut self, index: u32) {
        debug_assert!(
            index < self.live_row_count(),
            "row index {} out of bounds",
            index
        );
        self.index = index;
    }

    pub fn schema(&self) -> &Schema {
        self.schema
    }

    pub(crate) fn region(&self) -> &ByteRegion {
        self.region
    }

    /// Absolute byte offset of the field at `offset_in_row` in the
    /// current row, relative to the table region base.
    #[inline]
    pub(crate) fn field_offset(&self, offset_in_row: u32) -> usize {
        self.schema.data_length() as usize
            + self.index as usize * self.schema.row_length() as usize
            + offset_in_row as usize
    }

    #[inline]
    fn column(&self, col: usize) -> &ColumnMeta {
        &self.schema.columns()[col]
    }

    #[inline]
    fn field_bytes(&self, col: usize) -> &'a [u8] {
        let meta = self.column(col);
        self.region
            .bytes(self.field_offset(meta.offset), meta.size as usize)
    }

    // ========== typed getters (column index in memory order) ==========

    pub fn get_i8(&self, col: usize) -> i8 {
        debug_assert_eq!(self.column(col).ty, ColumnType::Int8);
        self.field_bytes(col)[0] as i8
    }

    pub fn get_u8(&self, col: usize) -> u8 {
        debug_assert_eq!(self.column(col).ty, ColumnType::Uint8);
        self.field_bytes(col)[0]
    }

    pub fn get_i16(&self, col: usize) -> i16 {
        debug_assert_eq!(self.column(col).ty, ColumnType::Int16);
        i16::from_le_bytes(self.field_bytes(col)[..2].try_into().unwrap())
    }

    pub fn get_u16(&self, col: usize) -> u16 {
        debug_assert_eq!(self.column(col).ty, ColumnType::Uint16);
        u16::from_le_bytes(self.field_bytes(col)[..2].try_into().unwrap())
    }

    pub fn get_i32(&self, col: usize) -> i32 {
        debug_assert_eq!(self.column(col).ty, ColumnType::Int32);
        i32::from_le_bytes(self.field_bytes(col)[..4].try_into().unwrap())
    }

    pub fn get_u32(&self, col: usize) -> u32 {
        debug_assert_eq!(self.column(col).ty, ColumnType::Uint32);
        u32::from_le_bytes(self.field_bytes(col)[..4].try_into().unwrap())
    }

    pub fn get_f32(&self, col: usize) -> f32 {
        debug_assert_eq!(self.column(col).ty, ColumnType::Float32);
        f32::from_le_bytes(self.field_bytes(col)[..4].try_into().unwrap())
    }

    /// Zero-copy view of a ByteString field.
    pub fn bytes(&self, col: usize) -> ByteStr<'a> {
        debug_assert!(self.column(col).ty.is_text());
        ByteStr::from_slot(self.field_bytes(col))
    }

    /// Decoded text of a ByteString field.
    pub fn text(&self, col: usize) -> std::borrow::Cow<'a, str> {
        self.bytes(col).to_str_lossy()
    }

    // ========== erased reads used by compiled predicates ==========

    /// Read any numeric field widened to f64.
    #[inline]
    pub fn read_number(&self, acc: &Accessor) -> f64 {
        debug_assert!(!acc.ty.is_text());
        let bytes = self
            .region
            .bytes(self.field_offset(acc.offset), acc.size as usize);
        match acc.ty {
            ColumnType::Int8 => bytes[0] as i8 as f64,
            ColumnType::Uint8 => bytes[0] as f64,
            ColumnType::Int16 => i16::from_le_bytes(bytes[..2].try_into().unwrap()) as f64,
            ColumnType::Uint16 => u16::from_le_bytes(bytes[..2].try_into().unwrap()) as f64,
            ColumnType::Int32 => i32::from_le_bytes(bytes[..4].try_into().unwrap()) as f64,
            ColumnType::Uint32 => u32::from_le_bytes(bytes[..4].try_into().unwrap()) as f64,
            ColumnType::Float32 => f32::from_le_bytes(bytes[..4].try_into().unwrap()) as f64,
            ColumnType::ByteString => 0.0,
        }
    }

    /// Read a ByteString field through an accessor.
    #[inline]
    pub fn read_bytes(&self, acc: &Accessor) -> ByteStr<'a> {
        debug_assert!(acc.ty.is_text());
        ByteStr::from_slot(
            self.region
                .bytes(self.field_offset(acc.offset), acc.size as usize),
        )
    }

    // ========== typed setters ==========

    pub fn set_i8(&self, col: usize, value: i8) {
        debug_assert_eq!(self.column(col).ty, ColumnType::Int8);
        self.write_field(col, &[value as u8]);
    }

    pub fn set_u8(&self, col: usize, value: u8) {
        debug_assert_eq!(self.column(col).ty, ColumnType::Uint8);
        self.write_field(col, &[value]);
    }

    pub fn set_i16(&self, col: usize, value: i16) {
        debug_assert_eq!(self.column(col).ty, ColumnType::Int16);
        self.write_field(col, &value.to_le_bytes());
    }

    pub fn set_u16(&self, col: usize, value: u16) {
        debug_assert_eq!(self.column(col).ty, ColumnType::Uint16);
        self.write_field(col, &value.to_le_bytes());
    }

    pub fn set_i32(&self, col: usize, value: i32) {
        debug_assert_eq!(self.column(col).ty, ColumnType::Int32);
        self.write_field(col, &value.to_le_bytes());
    }

    pub fn set_u32(&self, col: usize, value: u32) {
        debug_assert_eq!(self.column(col).ty, ColumnType::Uint32);
        self.write_field(col, &value.to_le_bytes());
    }

    pub fn set_f32(&self, col: usize, value: f32) {
        debug_assert_eq!(self.column(col).ty, ColumnType::Float32);
        self.write_field(col, &value.to_le_bytes());
    }

    /// Store bytes into a ByteString slot: length prefix, content, zero
    /// padding to the slot width.
    pub fn set_bytes(&self, col: usize, value: &[u8]) -> Result<()> {
        let meta = self.column(col);
        debug_assert!(meta.ty.is_text());
        let capacity = meta.size as usize - 1;
        if value.len() > capacity {
            return Err(GridError::ValueTooLong {
                column: meta.name.clone(),
                len: value.len(),
                capacity,
            });
        }
        let base = self.field_offset(meta.offset);
        self.region.write(base, &[value.len() as u8]);
        self.region.write(base + 1, value);
        self.region
            .fill_zero(base + 1 + value.len(), capacity - value.len());
        Ok(())
    }

    pub fn set_text(&self, col: usize, value: &str) -> Result<()> {
        self.set_bytes(col, value.as_bytes())
    }

    #[inline]
    fn write_field(&self, col: usize, bytes: &[u8]) {
        let meta = self.column(col);
        debug_assert_eq!(bytes.len(), meta.size as usize);
        self.region.write(self.field_offset(meta.offset), bytes);
    }
}
