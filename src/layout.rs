//! Layout codec: stateless reads and writes of the segment header, offset
//! table, field payloads and the in-memory extra fixed region.
//!
//! Every function takes a view whose start is the first header byte of one
//! segment. Offsets stored in the table are relative to that byte.

use crate::binary::{self, copy_cells, ensure_capacity, read_i32, write_i32};
use crate::error::CodecError;
use crate::formatter::Formatter;
use crate::segment::Segment;
use crate::types::*;
use crate::value::FieldValue;
use std::cell::Cell;

// ════════════════════════════════════════════════════════════════════════
// Reads
// ════════════════════════════════════════════════════════════════════════

/// Read `(byte_size, last_index)` and check the header is self-consistent
/// and fits the view.
pub fn read_header(view: &BufferView<'_>) -> Result<(usize, i32), CodecError> {
    if view.len() < HEADER_SIZE {
        return Err(CodecError::CorruptData(format!(
            "segment of {} bytes is shorter than its {HEADER_SIZE}-byte header",
            view.len()
        )));
    }
    let array = view.array();
    let byte_size = read_i32(array, view.start())?;
    let last_index = read_i32(array, view.start() + 4)?;

    if last_index < -1 {
        return Err(CodecError::CorruptData(format!("negative last index {last_index}")));
    }
    let byte_size = usize::try_from(byte_size)
        .map_err(|_| CodecError::CorruptData(format!("negative byte size {byte_size}")))?;
    if byte_size > view.len() {
        return Err(CodecError::CorruptData(format!(
            "byte size {byte_size} exceeds view of {} bytes",
            view.len()
        )));
    }
    let table_end = HEADER_SIZE as i64 + OFFSET_ENTRY_SIZE as i64 * (last_index as i64 + 1);
    if table_end > byte_size as i64 {
        return Err(CodecError::CorruptData(format!(
            "offset table for last index {last_index} overruns byte size {byte_size}"
        )));
    }
    Ok((byte_size, last_index))
}

/// Raw offset of `index`: `-1` if the index is past this binary's last
/// index (resolve through the extra region), `0` if absent.
#[inline]
pub fn read_offset(view: &BufferView<'_>, index: i32, last_index: i32) -> Result<i32, CodecError> {
    if index > last_index {
        return Ok(-1);
    }
    read_i32(view.array(), view.start() + offset_entry_pos(index))
}

/// Byte range of field `index`, `None` if the field is absent or unknown to
/// this binary.
///
/// A field's length is the distance to the next *present* field: later
/// indices with offset 0 are skipped, and with no present successor the
/// range runs to the end of the view.
pub fn slice_field<'a>(
    view: &BufferView<'a>,
    index: i32,
    last_index: i32,
) -> Result<Option<BufferView<'a>>, CodecError> {
    if index > last_index {
        return Ok(None);
    }
    let start = match read_offset(view, index, last_index)? {
        0 => return Ok(None),
        offset => stored_offset(index, offset)?,
    };

    let mut end = view.len();
    for next in (index + 1)..=last_index {
        let next_offset = read_offset(view, next, last_index)?;
        if next_offset != 0 {
            end = stored_offset(next, next_offset)?;
            break;
        }
    }

    if start < header_len(last_index) || end < start {
        return Err(CodecError::CorruptData(format!(
            "field {index} spans {start}..{end}, outside the payload"
        )));
    }
    view.sub_view(start, end - start).map(Some)
}

/// Position in `view.array()` of the `size`-byte fixed field `index`, `None`
/// when the binary records it as absent. The field must sit inside the
/// payload of this view.
pub fn fixed_field_pos(
    view: &BufferView<'_>,
    index: i32,
    last_index: i32,
    size: usize,
) -> Result<Option<usize>, CodecError> {
    if index > last_index {
        return Err(CodecError::SchemaViolation(format!(
            "field {index} is past binary last index {last_index}"
        )));
    }
    let start = match read_offset(view, index, last_index)? {
        0 => return Ok(None),
        offset => stored_offset(index, offset)?,
    };
    match start.checked_add(size) {
        Some(end) if start >= header_len(last_index) && end <= view.len() => Ok(Some(view.start() + start)),
        _ => Err(CodecError::CorruptData(format!(
            "fixed field {index} at {start}+{size} outside the payload of {} bytes",
            view.len()
        ))),
    }
}

#[inline]
fn stored_offset(index: i32, offset: i32) -> Result<usize, CodecError> {
    usize::try_from(offset)
        .map_err(|_| CodecError::CorruptData(format!("negative offset {offset} for field {index}")))
}

// ════════════════════════════════════════════════════════════════════════
// Writes (rebuild path)
// ════════════════════════════════════════════════════════════════════════

/// Record where field `index` starts, relative to the header.
#[inline]
pub fn write_offset_entry(
    target: &mut Vec<u8>,
    header_start: usize,
    index: i32,
    write_offset: usize,
) -> Result<(), CodecError> {
    let relative = i32::try_from(write_offset - header_start)
        .map_err(|_| CodecError::CapacityGrowthFailure { requested: write_offset })?;
    write_i32(target, header_start + offset_entry_pos(index), relative)?;
    Ok(())
}

/// Copy the already encoded bytes of a fixed field: from the source binary
/// when it holds the index, else from the extra region. A field with no
/// stored bytes in either place is written as its type default.
#[allow(clippy::too_many_arguments)]
pub fn write_fixed_field(
    target: &mut Vec<u8>,
    header_start: usize,
    write_offset: usize,
    index: i32,
    last_index: i32,
    size: usize,
    source: &BufferView<'_>,
    extra: Option<&ExtraRegion>,
    formatter: &dyn Formatter,
) -> Result<usize, CodecError> {
    write_offset_entry(target, header_start, index, write_offset)?;

    let stored = if index <= last_index {
        fixed_field_pos(source, index, last_index, size)?.map(|at| (source.array(), at))
    } else {
        let extra = extra.ok_or_else(|| {
            CodecError::SchemaViolation(format!(
                "field {index} is past binary last index {last_index} and no extra region exists"
            ))
        })?;
        match extra.field_offset(index)? {
            0 => None,
            offset => Some((extra.cells(), offset)),
        }
    };

    match stored {
        Some((cells, at)) => {
            let src = at.checked_add(size).and_then(|end| cells.get(at..end)).ok_or_else(|| {
                CodecError::CorruptData(format!("fixed field {index} at {at} overruns its buffer"))
            })?;
            copy_cells(src, target, write_offset)
        }
        None => {
            let written = formatter.serialize(target, write_offset, &formatter.default_value())?;
            debug_assert_eq!(written, size);
            Ok(written)
        }
    }
}

/// Encode `value` through `formatter` and record its offset.
pub fn write_variable_field(
    target: &mut Vec<u8>,
    header_start: usize,
    write_offset: usize,
    index: i32,
    value: &FieldValue,
    formatter: &dyn Formatter,
) -> Result<usize, CodecError> {
    write_offset_entry(target, header_start, index, write_offset)?;
    formatter.serialize(target, write_offset, value)
}

/// Let a segment (cached value or nested object) write itself and record its
/// offset.
pub fn write_segment_field<'a>(
    target: &mut Vec<u8>,
    header_start: usize,
    write_offset: usize,
    index: i32,
    segment: &dyn Segment<'a>,
) -> Result<usize, CodecError> {
    write_offset_entry(target, header_start, index, write_offset)?;
    segment.serialize(target, write_offset)
}

/// Zero the header and offset table for a segment about to be rebuilt.
/// Indices that never get written stay 0 (absent).
pub fn write_header_placeholder(
    target: &mut Vec<u8>,
    header_start: usize,
    last_index: i32,
) -> Result<usize, CodecError> {
    let len = header_len(last_index);
    ensure_capacity(target, header_start, len)?;
    target[header_start..header_start + len].fill(0);
    Ok(len)
}

/// Write the final `byte_size` and `last_index`. Returns the byte size.
pub fn finalize_size(
    target: &mut Vec<u8>,
    header_start: usize,
    end_offset: usize,
    last_index: i32,
) -> Result<usize, CodecError> {
    let byte_size = end_offset - header_start;
    let encoded = i32::try_from(byte_size)
        .map_err(|_| CodecError::CapacityGrowthFailure { requested: byte_size })?;
    write_i32(target, header_start, encoded)?;
    write_i32(target, header_start + 4, last_index)?;
    Ok(byte_size)
}

/// Fast path: copy the recorded `byte_size` bytes verbatim, including any
/// fields the current schema does not know.
pub fn copy_whole(
    source: &BufferView<'_>,
    target: &mut Vec<u8>,
    target_offset: usize,
) -> Result<usize, CodecError> {
    let (byte_size, _) = read_header(source)?;
    let src = source.sub_view(0, byte_size)?;
    copy_cells(src.cells(), target, target_offset)
}

// ════════════════════════════════════════════════════════════════════════
// Extra fixed region
// ════════════════════════════════════════════════════════════════════════

/// Storage for fixed fields declared after a binary was written
/// (`binary_last_index < schema_last_index`). Never persisted on its own; any
/// rebuild folds it into the canonical layout.
pub struct ExtraRegion {
    cells: Box<[Cell<u8>]>,
    binary_last_index: i32,
    schema_last_index: i32,
}

impl ExtraRegion {
    #[inline]
    pub fn cells(&self) -> &[Cell<u8>] {
        &self.cells
    }

    #[inline]
    pub fn binary_last_index(&self) -> i32 {
        self.binary_last_index
    }

    #[inline]
    pub fn schema_last_index(&self) -> i32 {
        self.schema_last_index
    }

    /// Offset of `index` inside the region, `0` when the slot has no storage
    /// (non-fixed field or undeclared index).
    pub fn field_offset(&self, index: i32) -> Result<usize, CodecError> {
        if index <= self.binary_last_index || index > self.schema_last_index {
            return Err(CodecError::SchemaViolation(format!(
                "index {index} outside extra region {}..={}",
                self.binary_last_index + 1,
                self.schema_last_index
            )));
        }
        let entry = (index - self.binary_last_index - 1) as usize * OFFSET_ENTRY_SIZE;
        let offset = read_i32(&self.cells, entry)?;
        Ok(offset as usize)
    }
}

impl std::fmt::Debug for ExtraRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtraRegion")
            .field("len", &self.cells.len())
            .field("binary_last_index", &self.binary_last_index)
            .field("schema_last_index", &self.schema_last_index)
            .finish()
    }
}

/// Allocate the extra region for an instance, or `None` when the binary
/// already covers every schema index.
///
/// `fixed_sizes[i]` is the encoded size of schema index `i`, 0 for
/// variable, nested or undeclared indices; those get no storage.
pub fn build_extra_region(
    binary_last_index: i32,
    schema_last_index: i32,
    fixed_sizes: &[usize],
) -> Option<ExtraRegion> {
    if binary_last_index >= schema_last_index {
        return None;
    }
    let first = (binary_last_index + 1) as usize;
    let table_len = (schema_last_index - binary_last_index) as usize * OFFSET_ENTRY_SIZE;
    let storage: usize = fixed_sizes.iter().skip(first).sum();

    let mut bytes = vec![0u8; table_len + storage];
    let mut offset = table_len;
    for (i, &size) in fixed_sizes.iter().enumerate().skip(first) {
        if size == 0 {
            continue;
        }
        let entry = (i - first) * OFFSET_ENTRY_SIZE;
        bytes[entry..entry + OFFSET_ENTRY_SIZE].copy_from_slice(&(offset as i32).to_le_bytes());
        offset += size;
    }

    tracing::trace!(
        binary_last_index,
        schema_last_index,
        bytes = bytes.len(),
        "allocated extra fixed region"
    );

    let cells: Box<[Cell<u8>]> = bytes.into_iter().map(Cell::new).collect();
    Some(ExtraRegion {
        cells,
        binary_last_index,
        schema_last_index,
    })
}

/// Overwrite a fixed field's bytes in the extra region.
pub fn write_extra_field(extra: &ExtraRegion, index: i32, encoded: &[u8]) -> Result<(), CodecError> {
    match extra.field_offset(index)? {
        0 => Err(CodecError::SchemaViolation(format!(
            "index {index} has no fixed storage in the extra region"
        ))),
        offset => binary::write_cells(extra.cells(), offset, encoded),
    }
}
