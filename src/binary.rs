//! Primitive little-endian I/O.
//!
//! Two families: reads/writes over `&[Cell<u8>]` for in-place access to a
//! wrapped buffer, and writes into a growable `Vec<u8>` serialization target.

use crate::error::CodecError;
use std::cell::Cell;

// ════════════════════════════════════════════════════════════════════════
// In-place access (wrapped buffers)
// ════════════════════════════════════════════════════════════════════════

/// Read `N` bytes at `offset`.
#[inline]
pub fn read_array<const N: usize>(bytes: &[Cell<u8>], offset: usize) -> Result<[u8; N], CodecError> {
    let src = offset
        .checked_add(N)
        .and_then(|end| bytes.get(offset..end))
        .ok_or_else(|| {
            CodecError::CorruptData(format!(
                "read of {N} bytes at {offset} exceeds buffer of {} bytes",
                bytes.len()
            ))
        })?;
    let mut out = [0u8; N];
    for (dst, cell) in out.iter_mut().zip(src) {
        *dst = cell.get();
    }
    Ok(out)
}

#[inline]
pub fn read_i32(bytes: &[Cell<u8>], offset: usize) -> Result<i32, CodecError> {
    read_array::<4>(bytes, offset).map(i32::from_le_bytes)
}

/// Copy `len` bytes at `offset` out into an owned vector.
pub fn read_vec(bytes: &[Cell<u8>], offset: usize, len: usize) -> Result<Vec<u8>, CodecError> {
    let src = offset
        .checked_add(len)
        .and_then(|end| bytes.get(offset..end))
        .ok_or_else(|| {
            CodecError::CorruptData(format!(
                "read of {len} bytes at {offset} exceeds buffer of {} bytes",
                bytes.len()
            ))
        })?;
    Ok(src.iter().map(Cell::get).collect())
}

/// Overwrite `data.len()` bytes at `offset`. Never changes the buffer length.
#[inline]
pub fn write_cells(bytes: &[Cell<u8>], offset: usize, data: &[u8]) -> Result<(), CodecError> {
    let dst = offset
        .checked_add(data.len())
        .and_then(|end| bytes.get(offset..end))
        .ok_or_else(|| {
            CodecError::CorruptData(format!(
                "write of {} bytes at {offset} exceeds buffer of {} bytes",
                data.len(),
                bytes.len()
            ))
        })?;
    for (cell, byte) in dst.iter().zip(data) {
        cell.set(*byte);
    }
    Ok(())
}

// ════════════════════════════════════════════════════════════════════════
// Serialization targets
// ════════════════════════════════════════════════════════════════════════

/// Grow `buf` so that `offset..offset + len` is addressable. Existing bytes
/// are preserved, new bytes are zero.
#[inline]
pub fn ensure_capacity(buf: &mut Vec<u8>, offset: usize, len: usize) -> Result<(), CodecError> {
    let required = offset
        .checked_add(len)
        .ok_or(CodecError::CapacityGrowthFailure { requested: usize::MAX })?;
    if buf.len() < required {
        buf.try_reserve(required - buf.len())
            .map_err(|_| CodecError::CapacityGrowthFailure { requested: required })?;
        buf.resize(required, 0);
    }
    Ok(())
}

/// Write `data` at `offset`, growing the target if needed.
#[inline]
pub fn write_bytes(buf: &mut Vec<u8>, offset: usize, data: &[u8]) -> Result<usize, CodecError> {
    ensure_capacity(buf, offset, data.len())?;
    buf[offset..offset + data.len()].copy_from_slice(data);
    Ok(data.len())
}

#[inline]
pub fn write_i32(buf: &mut Vec<u8>, offset: usize, value: i32) -> Result<usize, CodecError> {
    write_bytes(buf, offset, &value.to_le_bytes())
}

/// Copy cells into the target at `offset`, growing it if needed.
pub fn copy_cells(src: &[Cell<u8>], buf: &mut Vec<u8>, offset: usize) -> Result<usize, CodecError> {
    ensure_capacity(buf, offset, src.len())?;
    for (dst, cell) in buf[offset..offset + src.len()].iter_mut().zip(src) {
        *dst = cell.get();
    }
    Ok(src.len())
}
