use super::object::{FieldSlot, ObjectSegment};
use super::Segment;
use crate::accessor::{Accessor, FieldStrategy};
use crate::error::CodecError;
use crate::layout;
use crate::types::BufferView;
use crate::value::FieldMap;
use std::sync::Arc;

impl<'a> Segment<'a> for ObjectSegment<'a> {
    /// Clean means the wrapped bytes still encode every field.
    #[inline]
    fn can_direct_copy(&self) -> bool {
        !self.tracker.is_dirty()
    }

    #[inline]
    fn buffer_reference(&self) -> BufferView<'a> {
        self.view
    }

    fn serialize(&self, target: &mut Vec<u8>, offset: usize) -> Result<usize, CodecError> {
        if self.can_direct_copy() && self.extra.is_none() && !self.detached {
            tracing::trace!(schema = self.accessor.name(), bytes = self.view.len(), "direct copy");
            return layout::copy_whole(&self.view, target, offset);
        }
        tracing::trace!(
            schema = self.accessor.name(),
            dirty = self.tracker.is_dirty(),
            extra = self.extra.is_some(),
            detached = self.detached,
            "rebuild"
        );
        self.rebuild(target, offset)
    }
}

impl<'a> ObjectSegment<'a> {
    /// Emit the canonical layout for the current schema at `offset`.
    ///
    /// Fixed fields are copied from their stored bytes, clean variable fields
    /// and nested records copy themselves, replaced values are re-encoded.
    /// The header records the schema's last index, so fields unknown to the
    /// schema are dropped and the extra region is folded in.
    pub(crate) fn rebuild(&self, target: &mut Vec<u8>, offset: usize) -> Result<usize, CodecError> {
        let last_index = self.accessor.last_index();
        let mut write = offset + layout::write_header_placeholder(target, offset, last_index)?;

        for (field, slot) in self.accessor.fields().iter().zip(&self.slots) {
            write += match (&field.strategy, slot) {
                (FieldStrategy::Fixed { size, formatter }, _) => layout::write_fixed_field(
                    target,
                    offset,
                    write,
                    field.index,
                    self.binary_last_index,
                    *size,
                    &self.view,
                    self.extra.as_ref(),
                    formatter.as_ref(),
                )?,
                (FieldStrategy::CachedVariable { formatter }, FieldSlot::Cached(cache)) => {
                    if cache.can_direct_copy() {
                        layout::write_segment_field(target, offset, write, field.index, cache)?
                    } else {
                        layout::write_variable_field(
                            target,
                            offset,
                            write,
                            field.index,
                            cache.value()?,
                            formatter.as_ref(),
                        )?
                    }
                }
                (FieldStrategy::NestedSegment { .. }, FieldSlot::Nested(nested)) => {
                    layout::write_segment_field(target, offset, write, field.index, &**nested)?
                }
                _ => {
                    return Err(CodecError::SchemaViolation(format!(
                        "{}: slot for `{}` does not match its strategy",
                        self.accessor.name(),
                        field.name
                    )));
                }
            };
        }

        if !self.detached && self.binary_last_index > last_index {
            tracing::debug!(
                schema = self.accessor.name(),
                binary_last_index = self.binary_last_index,
                schema_last_index = last_index,
                "dropping fields unknown to the schema"
            );
        }

        layout::finalize_size(target, offset, write, last_index)
    }

    /// Serialize into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::with_capacity(self.view.len());
        self.serialize(&mut out, 0)?;
        Ok(out)
    }
}

// ─── Whole-record helpers ───────────────────────────────────────────────────

/// Encode `values` under `accessor`'s schema. Fields missing from `values`
/// are written as their defaults.
pub fn encode_record(accessor: &Arc<Accessor>, values: &FieldMap) -> Result<Vec<u8>, CodecError> {
    ObjectSegment::from_record(Arc::clone(accessor), values)?.to_bytes()
}

/// Decode every field of a serialized record.
pub fn decode_record(accessor: &Arc<Accessor>, bytes: &mut [u8]) -> Result<FieldMap, CodecError> {
    ObjectSegment::wrap(Arc::clone(accessor), BufferView::new(bytes))?.to_record()
}
