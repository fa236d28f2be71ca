use crate::error::CodecError;
use std::cell::Cell;
use std::fmt;

// ─── Binary Layout ──────────────────────────────────────────────────────────
//
//  ┌──────────────────────────────────────────────┐
//  │ Header (8 bytes)                             │
//  │   byte_size:  i32 (LE)  ← incl. header       │
//  │   last_index: i32 (LE)  ← highest index      │
//  ├──────────────────────────────────────────────┤
//  │ Offset table (4 bytes × (last_index + 1))    │
//  │   offset: i32 (LE)      ← 0 = absent         │
//  ├──────────────────────────────────────────────┤
//  │ Payload (variable)                           │
//  │   each field's encoded bytes at its offset   │
//  └──────────────────────────────────────────────┘
//
//  Offsets are relative to the first byte of the header, so a segment can be
//  copied verbatim to any position of another buffer.
//
//  Extra fixed region (in-memory only, old binary under a newer schema):
//
//  ┌──────────────────────────────────────────────┐
//  │ 4 bytes × (schema_last - binary_last)        │
//  │   offset into this region (0 = default)      │
//  ├──────────────────────────────────────────────┤
//  │ fixed-size field bytes                       │
//  └──────────────────────────────────────────────┘

pub const HEADER_SIZE: usize = 8; // 4 + 4
pub const OFFSET_ENTRY_SIZE: usize = 4;

/// Byte length of header + offset table for a segment whose highest index is
/// `last_index` (`-1` for a segment without fields).
#[inline]
pub const fn header_len(last_index: i32) -> usize {
    HEADER_SIZE + OFFSET_ENTRY_SIZE * (last_index as i64 + 1) as usize
}

/// Position of the offset-table entry for `index`, relative to the header.
#[inline]
pub const fn offset_entry_pos(index: i32) -> usize {
    HEADER_SIZE + OFFSET_ENTRY_SIZE * index as usize
}

// ─── BufferView ─────────────────────────────────────────────────────────────

/// Non-owning window into an externally owned byte array.
///
/// The array is held as `&[Cell<u8>]`: a view is created from one exclusive
/// `&mut [u8]` borrow and may then be copied freely. Every copy (and every
/// segment built on it) writes through to the same bytes, which is how fixed
/// fields are overwritten in place. The borrow checker keeps the backing
/// array locked for as long as any view exists, and `Cell` keeps views on a
/// single thread.
#[derive(Clone, Copy)]
pub struct BufferView<'a> {
    array: &'a [Cell<u8>],
    start: usize,
    len: usize,
}

impl<'a> BufferView<'a> {
    /// Wrap a whole byte array. O(1), never copies.
    #[inline]
    pub fn new(bytes: &'a mut [u8]) -> Self {
        let array = Cell::from_mut(bytes).as_slice_of_cells();
        Self {
            array,
            start: 0,
            len: array.len(),
        }
    }

    /// A view over `array[start..start + len]`.
    pub fn from_cells(array: &'a [Cell<u8>], start: usize, len: usize) -> Result<Self, CodecError> {
        let end = start
            .checked_add(len)
            .ok_or_else(|| CodecError::CorruptData("view range overflows".into()))?;
        if end > array.len() {
            return Err(CodecError::CorruptData(format!(
                "view {start}..{end} exceeds buffer of {} bytes",
                array.len()
            )));
        }
        Ok(Self { array, start, len })
    }

    /// A view over nothing. Backs detached (default) segments.
    #[inline]
    pub fn empty() -> Self {
        Self {
            array: &[],
            start: 0,
            len: 0,
        }
    }

    /// The whole underlying array, not just this window.
    #[inline]
    pub fn array(&self) -> &'a [Cell<u8>] {
        self.array
    }

    #[inline]
    pub fn start(&self) -> usize {
        self.start
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The cells covered by this window.
    #[inline]
    pub fn cells(&self) -> &'a [Cell<u8>] {
        &self.array[self.start..self.start + self.len]
    }

    /// Narrow the window; `offset` is relative to this view's start.
    pub fn sub_view(&self, offset: usize, len: usize) -> Result<BufferView<'a>, CodecError> {
        match offset.checked_add(len) {
            Some(end) if end <= self.len => Ok(BufferView {
                array: self.array,
                start: self.start + offset,
                len,
            }),
            _ => Err(CodecError::CorruptData(format!(
                "slice {offset}+{len} exceeds view of {} bytes",
                self.len
            ))),
        }
    }

    /// Copy the window out. Only for inspection; segments never need this.
    pub fn to_vec(&self) -> Vec<u8> {
        self.cells().iter().map(Cell::get).collect()
    }
}

impl fmt::Debug for BufferView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferView")
            .field("start", &self.start)
            .field("len", &self.len)
            .field("array_len", &self.array.len())
            .finish()
    }
}
