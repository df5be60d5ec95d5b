//! Table: header + byte region composition

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::memory::{ByteRegion, SharedBuffer};
use crate::table::column::ColumnDescriptor;
use crate::table::header::{self, Schema, OFF_ROW_COUNT};
use crate::table::row::RowCursor;
use crate::{GridError, Result};

/// A binary table living inside a byte region.
///
/// The region's first `data_length` bytes are the header; rows follow at
/// a fixed stride. All fields are immutable after creation except the
/// row count, which only ever moves through atomic fetch-add, so any
/// number of threads may append concurrently while others read.
pub struct Table {
    region: ByteRegion,
    schema: Schema,
    capacity: u32,
}

impl Table {
    /// Interpret an existing header at the start of `region`.
    pub fn attach(region: ByteRegion) -> Result<Self> {
        let schema = Schema::parse(&region)?;
        let capacity = Self::capacity_for(&schema, &region);
        let table = Self {
            region,
            schema,
            capacity,
        };
        if table.row_count() > capacity {
            return Err(GridError::InvalidFormat);
        }
        Ok(table)
    }

    /// Stamp a fresh table for `columns` at the start of `region`, with
    /// row count zero.
    pub fn create(columns: &[ColumnDescriptor], region: ByteRegion) -> Result<Self> {
        let image = header::build_header_image(columns)?;
        Self::create_from_image(&image, region)
    }

    /// Stamp an empty table with the layout of an existing schema.
    pub fn create_from_schema(schema: &Schema, region: ByteRegion) -> Result<Self> {
        Self::create_from_image(&schema.to_image(), region)
    }

    /// Stamp a prebuilt header image at the start of `region` and reset
    /// the row count.
    pub fn create_from_image(image: &[u8], region: ByteRegion) -> Result<Self> {
        if region.size() < image.len() {
            return Err(GridError::RegionTooSmall {
                needed: image.len(),
                available: region.size(),
            });
        }
        region.write(0, image);
        // The image may come from a live table; the new table starts empty.
        region.write_u32(OFF_ROW_COUNT, 0);
        Self::attach(region)
    }

    fn capacity_for(schema: &Schema, region: &ByteRegion) -> u32 {
        let stride = schema.row_length() as usize;
        if stride == 0 {
            return 0;
        }
        let payload = region.size().saturating_sub(schema.data_length() as usize);
        (payload / stride).min(u32::MAX as usize) as u32
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn region(&self) -> &ByteRegion {
        &self.region
    }

    /// Rows currently in the table (atomic load).
    pub fn row_count(&self) -> u32 {
        // The offset is validated at attach time.
        self.region
            .atomic_u32(OFF_ROW_COUNT)
            .expect("validated at attach")
            .load(Ordering::Acquire)
    }

    /// How many rows the region can hold.
    pub fn capacity_rows(&self) -> u32 {
        self.capacity
    }

    /// Atomically claim `n` fresh rows; returns the previous row count,
    /// so the caller owns rows `[old, old + n)`.
    ///
    /// On overrun the claim is not rolled back (later claims fail too);
    /// sizing the region is the coordinator's job.
    pub fn add_rows(&self, n: u32) -> Result<u32> {
        let counter = self
            .region
            .atomic_u32(OFF_ROW_COUNT)
            .expect("validated at attach");
        let old = counter.fetch_add(n, Ordering::AcqRel);
        if old.checked_add(n).map_or(true, |end| end > self.capacity) {
            return Err(GridError::RegionFull {
                capacity: self.capacity,
            });
        }
        Ok(old)
    }

    /// Cursor positioned at row `index`. `index >= row_count()` is
    /// debug-asserted; out of range in release is garbage-in
    /// garbage-out within the region.
    pub fn row(&self, index: u32) -> RowCursor<'_> {
        debug_assert!(
            index < self.row_count(),
            "row index {} out of bounds",
            index
        );
        RowCursor::new(&self.region, &self.schema, index)
    }

    /// Cursor at row zero for scan loops; valid even on an empty table.
    pub(crate) fn cursor(&self) -> RowCursor<'_> {
        RowCursor::at_start(&self.region, &self.schema)
    }

    /// Visit every row in index order, reusing one cursor.
    ///
    /// The same cursor is repositioned in place between calls; do not
    /// stash it.
    pub fn for_each(&self, mut f: impl FnMut(&RowCursor<'_>)) {
        let count = self.row_count();
        if count == 0 {
            return;
        }
        let mut cursor = self.cursor();
        for i in 0..count {
            cursor.set_index(i);
            f(&cursor);
        }
    }

    /// Surrender the backing buffer. Consuming the table is what makes
    /// every outstanding use-after-destroy a compile error.
    pub fn into_buffer(self) -> Arc<SharedBuffer> {
        self.region.into_buffer()
    }
}
