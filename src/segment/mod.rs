mod cache_box;
mod migration_op;
pub mod object;
mod read_op;
mod serialize_op;
mod write_op;

pub use cache_box::CacheBox;
pub use migration_op::migrate_bytes;
pub use object::ObjectSegment;
pub use serialize_op::{decode_record, encode_record};

use crate::error::CodecError;
use crate::types::BufferView;

// ─── Segment Contract ───────────────────────────────────────────────────────

/// Write-back contract shared by everything that can re-emit itself into a
/// parent's payload.
pub trait Segment<'a> {
    /// True when the original bytes are still an exact encoding of the
    /// current value, so `serialize` may copy them verbatim.
    fn can_direct_copy(&self) -> bool;

    /// The bytes this segment was wrapped over.
    fn buffer_reference(&self) -> BufferView<'a>;

    /// Write at `offset` into `target`, growing it as needed. Returns bytes written.
    fn serialize(&self, target: &mut Vec<u8>, offset: usize) -> Result<usize, CodecError>;
}

#[cfg(test)]
mod tests;
