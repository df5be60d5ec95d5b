//! Shared memory buffers and byte regions
//!
//! A `SharedBuffer` owns one byte allocation backed by an anonymous or
//! file-backed memory mapping, so the same pages can be handed to every
//! worker thread (and, file-backed, to other processes). A `ByteRegion` is
//! a cheap locator into a buffer: base address + size, with typed
//! little-endian access and aligned atomic u32 views.
//!
//! Concurrency contract: plain reads and writes through a region must
//! target byte ranges that no other thread mutates concurrently; fields
//! shared between threads (row counts, the scan cursor) are only accessed
//! through `atomic_u32`.

use std::fs::File;
use std::sync::atomic::AtomicU32;
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use memmap2::{MmapMut, MmapOptions, MmapRaw};

use crate::{GridError, Result};

/// A byte allocation shareable across threads.
///
/// All access goes through raw pointers obtained from the mapping, never
/// through a Rust reference to the whole buffer, so disjoint concurrent
/// writes from several threads are sound under the contract above.
pub struct SharedBuffer {
    map: MmapRaw,
}

impl SharedBuffer {
    /// Allocate an anonymous mapping of `len` bytes, zero-filled.
    pub fn anonymous(len: usize) -> Result<Arc<Self>> {
        let map = MmapMut::map_anon(len.max(1))?;
        Ok(Arc::new(Self {
            map: MmapRaw::from(map),
        }))
    }

    /// Map `len` bytes of `file`, growing the file if needed.
    ///
    /// Two buffers mapping the same file observe each other's writes,
    /// which is what makes cross-process sharing work.
    pub fn file_backed(file: &File, len: usize) -> Result<Arc<Self>> {
        if (file.metadata()?.len() as usize) < len {
            file.set_len(len as u64)?;
        }
        let map = MmapOptions::new().len(len).map_raw(file)?;
        Ok(Arc::new(Self { map }))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.len() == 0
    }

    #[inline]
    pub(crate) fn ptr(&self) -> *mut u8 {
        self.map.as_mut_ptr()
    }
}

impl std::fmt::Debug for SharedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedBuffer").field("len", &self.len()).finish()
    }
}

/// A located span of bytes within a `SharedBuffer`.
///
/// Regions are cheap to clone; several regions may alias the same buffer
/// (a table, its result table and the scan cursor usually do).
#[derive(Clone)]
pub struct ByteRegion {
    buffer: Arc<SharedBuffer>,
    address: usize,
    size: usize,
}

impl ByteRegion {
    /// A region covering `size` bytes at `address` within `buffer`.
    pub fn new(buffer: Arc<SharedBuffer>, address: usize, size: usize) -> Result<Self> {
        if address.checked_add(size).map_or(true, |end| end > buffer.len()) {
            return Err(GridError::OutOfBounds {
                offset: address,
                len: size,
                size: buffer.len(),
            });
        }
        Ok(Self { buffer, address, size })
    }

    /// A region covering the whole buffer.
    pub fn whole(buffer: Arc<SharedBuffer>) -> Self {
        let size = buffer.len();
        Self { buffer, address: 0, size }
    }

    pub fn address(&self) -> usize {
        self.address
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn buffer(&self) -> &Arc<SharedBuffer> {
        &self.buffer
    }

    /// Surrender the backing buffer handle.
    pub fn into_buffer(self) -> Arc<SharedBuffer> {
        self.buffer
    }

    /// A sub-span of this region, relative to its base.
    pub fn subregion(&self, offset: usize, size: usize) -> Result<Self> {
        if offset.checked_add(size).map_or(true, |end| end > self.size) {
            return Err(GridError::OutOfBounds {
                offset,
                len: size,
                size: self.size,
            });
        }
        Ok(Self {
            buffer: Arc::clone(&self.buffer),
            address: self.address + offset,
            size,
        })
    }

    #[inline]
    fn check(&self, offset: usize, len: usize) {
        assert!(
            offset <= self.size && len <= self.size - offset,
            "region access out of bounds: offset {} + len {} > size {}",
            offset,
            len,
            self.size
        );
    }

    /// Borrow `len` bytes at `offset`.
    #[inline]
    pub fn bytes(&self, offset: usize, len: usize) -> &[u8] {
        self.check(offset, len);
        // SAFETY: in bounds per check above; the returned borrow ties the
        // slice to this region, and callers uphold the module contract
        // that nobody mutates this range concurrently.
        unsafe { std::slice::from_raw_parts(self.buffer.ptr().add(self.address + offset), len) }
    }

    /// Copy `src` into the region at `offset`.
    #[inline]
    pub fn write(&self, offset: usize, src: &[u8]) {
        self.check(offset, src.len());
        // SAFETY: in bounds; `src` is a separate allocation.
        unsafe {
            std::ptr::copy_nonoverlapping(
                src.as_ptr(),
                self.buffer.ptr().add(self.address + offset),
                src.len(),
            );
        }
    }

    /// Copy `len` bytes from another region. The regions may alias the
    /// same buffer as long as the ranges do not overlap row payloads that
    /// are being read, which the scan protocol guarantees.
    pub fn copy_from(&self, dst_offset: usize, src: &ByteRegion, src_offset: usize, len: usize) {
        self.check(dst_offset, len);
        src.check(src_offset, len);
        // SAFETY: both ranges in bounds; `copy` tolerates overlap.
        unsafe {
            std::ptr::copy(
                src.buffer.ptr().add(src.address + src_offset),
                self.buffer.ptr().add(self.address + dst_offset),
                len,
            );
        }
    }

    /// Zero `len` bytes at `offset`.
    pub fn fill_zero(&self, offset: usize, len: usize) {
        self.check(offset, len);
        // SAFETY: in bounds per check above.
        unsafe {
            std::ptr::write_bytes(self.buffer.ptr().add(self.address + offset), 0, len);
        }
    }

    #[inline]
    pub fn read_u32(&self, offset: usize) -> u32 {
        LittleEndian::read_u32(self.bytes(offset, 4))
    }

    #[inline]
    pub fn write_u32(&self, offset: usize, value: u32) {
        self.write(offset, &value.to_le_bytes());
    }

    #[inline]
    pub fn read_u16(&self, offset: usize) -> u16 {
        LittleEndian::read_u16(self.bytes(offset, 2))
    }

    /// An atomic view of the u32 at `offset`. The absolute byte address
    /// must be 4-aligned; mappings are page-aligned, so alignment of
    /// `address + offset` is what counts.
    pub fn atomic_u32(&self, offset: usize) -> Result<&AtomicU32> {
        if offset.checked_add(4).map_or(true, |end| end > self.size) {
            return Err(GridError::OutOfBounds {
                offset,
                len: 4,
                size: self.size,
            });
        }
        let abs = self.address + offset;
        if abs % 4 != 0 {
            return Err(GridError::Misaligned { offset: abs });
        }
        // SAFETY: in bounds, 4-aligned, and `AtomicU32` has the same
        // layout as `u32`. Concurrent access from threads sharing the
        // mapping is the whole point of the atomic view.
        Ok(unsafe { &*(self.buffer.ptr().add(abs) as *const AtomicU32) })
    }
}

impl std::fmt::Debug for ByteRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteRegion")
            .field("address", &self.address)
            .field("size", &self.size)
            .finish()
    }
}
