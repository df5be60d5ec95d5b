//! Binary table header
//!
//! Header layout (little-endian, offsets from the table base):
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │ Preamble (24 bytes)                                    │
//! │   magic: u32  version: u32  row_count: u32 (atomic)    │
//! │   row_length: u32  data_length: u32  column_count: u32 │
//! ├────────────────────────────────────────────────────────┤
//! │ Column records (20 bytes each, in memory order)        │
//! │   name_offset: u32  type: u8  pad: [u8;3]  size: u32   │
//! │   offset_in_row: u32  original_index: u32              │
//! ├────────────────────────────────────────────────────────┤
//! │ Name blob: per name [len: u16][utf-8 bytes], no NUL    │
//! ├────────────────────────────────────────────────────────┤
//! │ padding to 4 bytes; data_length ends here, row 0       │
//! │ begins at data_length                                  │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! Memory order (field order inside a row record) may differ from the
//! order the caller supplied columns in: layout sorts by descending
//! alignment, stable by original index, so no padding lands between
//! fields. Both orders are recorded and fully derivable.

use ahash::AHashMap;

use crate::memory::ByteRegion;
use crate::table::column::{ColumnDescriptor, ColumnType};
use crate::{GridError, Result};

pub const HEADER_MAGIC: u32 = u32::from_le_bytes(*b"GTBL");
pub const HEADER_VERSION: u32 = 1;

pub(crate) const PREAMBLE_LEN: usize = 24;
pub(crate) const COLUMN_RECORD_LEN: usize = 20;

pub(crate) const OFF_MAGIC: usize = 0;
pub(crate) const OFF_VERSION: usize = 4;
pub(crate) const OFF_ROW_COUNT: usize = 8;
pub(crate) const OFF_ROW_LENGTH: usize = 12;
pub(crate) const OFF_DATA_LENGTH: usize = 16;
pub(crate) const OFF_COLUMN_COUNT: usize = 20;

#[inline]
fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) / align * align
}

/// One column as recorded in the header, in memory order.
#[derive(Debug, Clone)]
pub struct ColumnMeta {
    pub name: String,
    pub ty: ColumnType,
    pub size: u32,
    /// Byte offset of this field within a row record.
    pub offset: u32,
    /// Position in the caller-supplied column list.
    pub original_index: u32,
}

/// Decoded header: column layout plus row geometry.
///
/// Everything here is immutable after construction; the row count lives
/// in the region and is only touched atomically.
#[derive(Debug, Clone)]
pub struct Schema {
    columns: Vec<ColumnMeta>,
    by_name: AHashMap<String, usize>,
    row_length: u32,
    data_length: u32,
}

impl Schema {
    /// Decode and validate the header at the start of `region`.
    pub fn parse(region: &ByteRegion) -> Result<Self> {
        if region.size() < PREAMBLE_LEN {
            return Err(GridError::RegionTooSmall {
                needed: PREAMBLE_LEN,
                available: region.size(),
            });
        }
        // The row-count field is accessed atomically; the preamble must
        // land on a 4-aligned address.
        if region.address() % 4 != 0 {
            return Err(GridError::Misaligned {
                offset: region.address(),
            });
        }

        let magic = region.read_u32(OFF_MAGIC);
        if magic != HEADER_MAGIC {
            return Err(GridError::InvalidFormat);
        }
        let version = region.read_u32(OFF_VERSION);
        if version != HEADER_VERSION {
            return Err(GridError::VersionMismatch {
                expected: HEADER_VERSION,
                actual: version,
            });
        }

        let row_length = region.read_u32(OFF_ROW_LENGTH);
        let data_length = region.read_u32(OFF_DATA_LENGTH);
        let column_count = region.read_u32(OFF_COLUMN_COUNT) as usize;

        let records_end = PREAMBLE_LEN + column_count * COLUMN_RECORD_LEN;
        if data_length as usize > region.size() || records_end > data_length as usize {
            return Err(GridError::InvalidFormat);
        }
        let blob = region.subregion(records_end, data_length as usize - records_end)?;

        let mut columns = Vec::with_capacity(column_count);
        let mut by_name = AHashMap::with_capacity(column_count);
        for i in 0..column_count {
            let rec = PREAMBLE_LEN + i * COLUMN_RECORD_LEN;
            let name_offset = region.read_u32(rec) as usize;
            let ty = ColumnType::from_u8(region.bytes(rec + 4, 1)[0])
                .ok_or(GridError::InvalidFormat)?;
            let size = region.read_u32(rec + 8);
            let offset = region.read_u32(rec + 12);
            let original_index = region.read_u32(rec + 16);

            if offset.checked_add(size).map_or(true, |end| end > row_length) {
                return Err(GridError::InvalidFormat);
            }
            if name_offset + 2 > blob.size() {
                return Err(GridError::InvalidFormat);
            }
            let name_len = blob.read_u16(name_offset) as usize;
            if name_offset + 2 + name_len > blob.size() {
                return Err(GridError::InvalidFormat);
            }
            let name = std::str::from_utf8(blob.bytes(name_offset + 2, name_len))
                .map_err(|_| GridError::InvalidFormat)?
                .to_string();

            if by_name.insert(name.clone(), i).is_some() {
                return Err(GridError::DuplicateColumn(name));
            }
            columns.push(ColumnMeta {
                name,
                ty,
                size,
                offset,
                original_index,
            });
        }

        Ok(Self {
            columns,
            by_name,
            row_length,
            data_length,
        })
    }

    /// Columns in memory order.
    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    /// Columns reordered back to the caller-supplied order.
    pub fn columns_original_order(&self) -> Vec<&ColumnMeta> {
        let mut out: Vec<&ColumnMeta> = self.columns.iter().collect();
        out.sort_by_key(|c| c.original_index);
        out
    }

    /// Memory-order index for `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnMeta> {
        self.index_of(name).map(|i| &self.columns[i])
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Byte stride between consecutive rows.
    pub fn row_length(&self) -> u32 {
        self.row_length
    }

    /// Total header length = byte offset of row 0.
    pub fn data_length(&self) -> u32 {
        self.data_length
    }

    /// Rebuild the header byte image from this already-laid-out schema,
    /// with row count zero.
    pub fn to_image(&self) -> Vec<u8> {
        let mut blob = Vec::new();
        let mut name_offsets = Vec::with_capacity(self.columns.len());
        for col in &self.columns {
            name_offsets.push(blob.len() as u32);
            blob.extend_from_slice(&(col.name.len() as u16).to_le_bytes());
            blob.extend_from_slice(col.name.as_bytes());
        }

        let records_end = PREAMBLE_LEN + self.columns.len() * COLUMN_RECORD_LEN;
        debug_assert!(records_end + blob.len() <= self.data_length as usize);

        let mut image = Vec::with_capacity(self.data_length as usize);
        image.extend_from_slice(&HEADER_MAGIC.to_le_bytes());
        image.extend_from_slice(&HEADER_VERSION.to_le_bytes());
        image.extend_from_slice(&0u32.to_le_bytes()); // row_count
        image.extend_from_slice(&self.row_length.to_le_bytes());
        image.extend_from_slice(&self.data_length.to_le_bytes());
        image.extend_from_slice(&(self.columns.len() as u32).to_le_bytes());
        for (i, col) in self.columns.iter().enumerate() {
            image.extend_from_slice(&name_offsets[i].to_le_bytes());
            image.push(col.ty.as_u8());
            image.extend_from_slice(&[0u8; 3]);
            image.extend_from_slice(&col.size.to_le_bytes());
            image.extend_from_slice(&col.offset.to_le_bytes());
            image.extend_from_slice(&col.original_index.to_le_bytes());
        }
        image.extend_from_slice(&blob);
        image.resize(self.data_length as usize, 0);
        image
    }
}

/// Build a header byte image from a descriptor list, with row count zero.
///
/// Validates name uniqueness and slot sizes, lays fields out in memory
/// order and records each column's original index.
pub fn build_header_image(columns: &[ColumnDescriptor]) -> Result<Vec<u8>> {
    let mut seen: AHashMap<&str, ()> = AHashMap::with_capacity(columns.len());
    for col in columns {
        if seen.insert(col.name.as_str(), ()).is_some() {
            return Err(GridError::DuplicateColumn(col.name.clone()));
        }
        if col.name.len() > u16::MAX as usize {
            return Err(GridError::InvalidFormat);
        }
        match col.ty.fixed_size() {
            Some(fixed) if col.size != fixed => {
                return Err(GridError::InvalidColumnSize {
                    name: col.name.clone(),
                    size: col.size,
                });
            }
            // ByteString: u8 length prefix + content, so 2..=256.
            None if !(2..=256).contains(&col.size) => {
                return Err(GridError::InvalidColumnSize {
                    name: col.name.clone(),
                    size: col.size,
                });
            }
            _ => {}
        }
    }

    // Memory order: descending alignment, stable by original index.
    let mut order: Vec<usize> = (0..columns.len()).collect();
    order.sort_by_key(|&i| std::cmp::Reverse(columns[i].ty.alignment()));

    let max_align = columns.iter().map(|c| c.ty.alignment()).max().unwrap_or(1) as usize;
    let mut offsets = vec![0u32; columns.len()];
    let mut cursor = 0usize;
    for &i in &order {
        cursor = align_up(cursor, columns[i].ty.alignment() as usize);
        offsets[i] = cursor as u32;
        cursor += columns[i].size as usize;
    }
    let row_length = align_up(cursor, max_align) as u32;

    // Name blob in memory order.
    let mut blob = Vec::new();
    let mut name_offsets = vec![0u32; columns.len()];
    for &i in &order {
        name_offsets[i] = blob.len() as u32;
        blob.extend_from_slice(&(columns[i].name.len() as u16).to_le_bytes());
        blob.extend_from_slice(columns[i].name.as_bytes());
    }

    let records_end = PREAMBLE_LEN + columns.len() * COLUMN_RECORD_LEN;
    let data_length = align_up(records_end + blob.len(), 4);

    let mut image = Vec::with_capacity(data_length);
    image.extend_from_slice(&HEADER_MAGIC.to_le_bytes());
    image.extend_from_slice(&HEADER_VERSION.to_le_bytes());
    image.extend_from_slice(&0u32.to_le_bytes()); // row_count
    image.extend_from_slice(&row_length.to_le_bytes());
    image.extend_from_slice(&(data_length as u32).to_le_bytes());
    image.extend_from_slice(&(columns.len() as u32).to_le_bytes());

    for &i in &order {
        let col = &columns[i];
        image.extend_from_slice(&name_offsets[i].to_le_bytes());
        image.push(col.ty.as_u8());
        image.extend_from_slice(&[0u8; 3]);
        image.extend_from_slice(&col.size.to_le_bytes());
        image.extend_from_slice(&offsets[i].to_le_bytes());
        image.extend_from_slice(&(i as u32).to_le_bytes());
    }
    image.extend_from_slice(&blob);
    image.resize(data_length, 0);

    Ok(image)
}
