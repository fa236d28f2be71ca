use super::cache_box::CacheBox;
use super::migration_op::extra_region_for;
use crate::accessor::{Accessor, FieldStrategy};
use crate::error::CodecError;
use crate::layout::{self, ExtraRegion};
use crate::tracker::MutationTracker;
use crate::types::BufferView;
use crate::value::FieldMap;
use std::fmt;
use std::sync::Arc;

/// Per-field state held by an [`ObjectSegment`], parallel to the accessor's
/// field list.
pub(crate) enum FieldSlot<'a> {
    /// Lives in the wrapped bytes or the extra region; nothing to hold.
    Fixed,
    Cached(CacheBox<'a>),
    Nested(Box<ObjectSegment<'a>>),
}

// ════════════════════════════════════════════════════════════════════════
// ObjectSegment
// ════════════════════════════════════════════════════════════════════════

/// Lazy view over one serialized record.
///
/// Wrapping reads only the header. Fixed fields are read and overwritten
/// directly in the wrapped bytes; variable fields decode on first access;
/// nested records are segments of their own over a sub-range. Serializing
/// copies the original bytes verbatim while nothing has forced a rebuild.
pub struct ObjectSegment<'a> {
    pub(crate) accessor: Arc<Accessor>,
    pub(crate) view: BufferView<'a>,
    pub(crate) tracker: MutationTracker,
    pub(crate) binary_last_index: i32,
    pub(crate) extra: Option<ExtraRegion>,
    pub(crate) slots: Vec<FieldSlot<'a>>,
    /// Built in memory rather than over bytes; always rebuilds.
    pub(crate) detached: bool,
}

impl<'a> ObjectSegment<'a> {
    // ─── Construction ───────────────────────────────────────────────────

    /// Wrap a serialized record as a root segment.
    pub fn wrap(accessor: Arc<Accessor>, view: BufferView<'a>) -> Result<Self, CodecError> {
        Self::construct(&MutationTracker::new(), accessor, view)
    }

    /// Wrap a serialized record under `parent`'s tracker.
    ///
    /// Validates the header and clamps the view to the recorded byte size.
    /// No field is decoded here.
    pub fn construct(
        parent: &MutationTracker,
        accessor: Arc<Accessor>,
        view: BufferView<'a>,
    ) -> Result<Self, CodecError> {
        let (byte_size, binary_last_index) = layout::read_header(&view)?;
        let view = view.sub_view(0, byte_size)?;

        if binary_last_index > accessor.last_index() {
            tracing::debug!(
                schema = accessor.name(),
                binary_last_index,
                schema_last_index = accessor.last_index(),
                "binary carries fields unknown to the schema"
            );
        }

        Self::assemble(parent, accessor, view, binary_last_index, false)
    }

    /// An instance holding every field's default, not backed by any bytes.
    pub fn new_default(accessor: Arc<Accessor>) -> Result<Self, CodecError> {
        Self::default_with_parent(&MutationTracker::new(), accessor)
    }

    pub(crate) fn default_with_parent(
        parent: &MutationTracker,
        accessor: Arc<Accessor>,
    ) -> Result<Self, CodecError> {
        Self::assemble(parent, accessor, BufferView::empty(), -1, true)
    }

    /// A detached instance populated from `values`.
    pub fn from_record(accessor: Arc<Accessor>, values: &FieldMap) -> Result<Self, CodecError> {
        Self::from_record_with_parent(&MutationTracker::new(), accessor, values)
    }

    pub(crate) fn from_record_with_parent(
        parent: &MutationTracker,
        accessor: Arc<Accessor>,
        values: &FieldMap,
    ) -> Result<Self, CodecError> {
        let mut segment = Self::default_with_parent(parent, accessor)?;
        for (name, value) in values {
            segment.set(name, value.clone())?;
        }
        Ok(segment)
    }

    fn assemble(
        parent: &MutationTracker,
        accessor: Arc<Accessor>,
        view: BufferView<'a>,
        binary_last_index: i32,
        detached: bool,
    ) -> Result<Self, CodecError> {
        let tracker = parent.create_child();
        let extra = extra_region_for(&accessor, binary_last_index)?;

        let mut slots = Vec::with_capacity(accessor.fields().len());
        for field in accessor.fields() {
            let slot = match &field.strategy {
                FieldStrategy::Fixed { .. } => FieldSlot::Fixed,
                FieldStrategy::CachedVariable { formatter } => {
                    let slice = layout::slice_field(&view, field.index, binary_last_index)?;
                    FieldSlot::Cached(CacheBox::new(slice, Arc::clone(formatter), tracker.clone()))
                }
                FieldStrategy::NestedSegment { accessor: inner } => {
                    let nested = match layout::slice_field(&view, field.index, binary_last_index)? {
                        Some(sub) => Self::construct(&tracker, Arc::clone(inner), sub)?,
                        None => Self::default_with_parent(&tracker, Arc::clone(inner))?,
                    };
                    FieldSlot::Nested(Box::new(nested))
                }
            };
            slots.push(slot);
        }

        Ok(Self {
            accessor,
            view,
            tracker,
            binary_last_index,
            extra,
            slots,
            detached,
        })
    }

    // ─── Introspection ──────────────────────────────────────────────────

    #[inline]
    pub fn accessor(&self) -> &Arc<Accessor> {
        &self.accessor
    }

    #[inline]
    pub fn tracker(&self) -> &MutationTracker {
        &self.tracker
    }

    /// Size of the wrapped bytes, 0 for a detached instance.
    #[inline]
    pub fn byte_size(&self) -> usize {
        self.view.len()
    }

    /// Last index recorded in the wrapped header, `-1` when detached.
    #[inline]
    pub fn binary_last_index(&self) -> i32 {
        self.binary_last_index
    }

    #[inline]
    pub fn has_extra_region(&self) -> bool {
        self.extra.is_some()
    }

    #[inline]
    pub fn is_detached(&self) -> bool {
        self.detached
    }
}

impl fmt::Debug for ObjectSegment<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectSegment")
            .field("schema", &self.accessor.name())
            .field("byte_size", &self.view.len())
            .field("binary_last_index", &self.binary_last_index)
            .field("extra", &self.extra)
            .field("dirty", &self.tracker.is_dirty())
            .field("detached", &self.detached)
            .finish()
    }
}
