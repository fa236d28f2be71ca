use super::object::ObjectSegment;
use crate::accessor::{Accessor, FieldStrategy};
use crate::error::CodecError;
use crate::layout::{self, ExtraRegion};
use crate::types::BufferView;
use std::sync::Arc;

// ─── Extra Fixed Region ─────────────────────────────────────────────────────

/// Extra region for an instance whose binary predates the schema's newest
/// fields, with each new fixed field seeded to its formatter's default
/// encoding. `None` when the binary already covers every schema index.
pub(crate) fn extra_region_for(
    accessor: &Accessor,
    binary_last_index: i32,
) -> Result<Option<ExtraRegion>, CodecError> {
    let Some(extra) =
        layout::build_extra_region(binary_last_index, accessor.last_index(), accessor.fixed_sizes())
    else {
        return Ok(None);
    };

    let mut scratch = Vec::new();
    for field in accessor.fields().iter().filter(|f| f.index > binary_last_index) {
        if let FieldStrategy::Fixed { formatter, .. } = &field.strategy {
            scratch.clear();
            formatter.serialize(&mut scratch, 0, &formatter.default_value())?;
            layout::write_extra_field(&extra, field.index, &scratch)?;
        }
    }
    Ok(Some(extra))
}

// ─── Upgrade ────────────────────────────────────────────────────────────────

/// Re-emit `bytes` in the canonical layout of `accessor`'s schema.
///
/// Fields added since the binary was written appear with their defaults;
/// fields the schema does not know are dropped. A binary already written
/// with exactly this schema comes back unchanged.
pub fn migrate_bytes(accessor: &Arc<Accessor>, bytes: &mut [u8]) -> Result<Vec<u8>, CodecError> {
    let segment = ObjectSegment::wrap(Arc::clone(accessor), BufferView::new(bytes))?;
    if segment.binary_last_index() == accessor.last_index() {
        return segment.to_bytes();
    }

    tracing::debug!(
        schema = accessor.name(),
        from = segment.binary_last_index(),
        to = accessor.last_index(),
        "migrating segment layout"
    );
    let mut out = Vec::with_capacity(segment.byte_size());
    segment.rebuild(&mut out, 0)?;
    Ok(out)
}

impl ObjectSegment<'_> {
    /// Whether this instance's binary was written with a different last index than the schema's.
    #[inline]
    pub fn needs_migration(&self) -> bool {
        !self.detached && self.binary_last_index != self.accessor.last_index()
    }
}
