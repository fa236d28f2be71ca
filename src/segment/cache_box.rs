use super::Segment;
use crate::binary::copy_cells;
use crate::error::CodecError;
use crate::formatter::Formatter;
use crate::tracker::MutationTracker;
use crate::types::BufferView;
use crate::value::FieldValue;
use std::cell::OnceCell;
use std::fmt;
use std::sync::Arc;

// ─── CacheBox ───────────────────────────────────────────────────────────────

/// One-shot memoization of a variable-length field.
///
/// Holds the field's byte range without decoding it; the first `value()`
/// call decodes and caches. A replaced value is kept until the owning
/// segment is serialized. The box has no dirty flag of its own: whoever
/// calls `set_value` marks the owning tracker.
pub struct CacheBox<'a> {
    slice: Option<BufferView<'a>>,
    formatter: Arc<dyn Formatter>,
    tracker: MutationTracker,
    value: OnceCell<FieldValue>,
    replaced: bool,
}

impl<'a> CacheBox<'a> {
    pub fn new(slice: Option<BufferView<'a>>, formatter: Arc<dyn Formatter>, tracker: MutationTracker) -> Self {
        Self {
            slice,
            formatter,
            tracker,
            value: OnceCell::new(),
            replaced: false,
        }
    }

    /// Decoded value; the type default when the field is absent.
    pub fn value(&self) -> Result<&FieldValue, CodecError> {
        if let Some(cached) = self.value.get() {
            return Ok(cached);
        }
        let decoded = match &self.slice {
            Some(slice) => {
                self.formatter
                    .deserialize(slice.array(), slice.start(), &self.tracker)?
                    .0
            }
            None => self.formatter.default_value(),
        };
        Ok(self.value.get_or_init(|| decoded))
    }

    pub fn set_value(&mut self, value: FieldValue) {
        self.value = OnceCell::from(value);
        self.replaced = true;
    }

    /// Whether the value has been decoded (or replaced) yet.
    #[inline]
    pub fn is_loaded(&self) -> bool {
        self.value.get().is_some()
    }
}

impl<'a> Segment<'a> for CacheBox<'a> {
    #[inline]
    fn can_direct_copy(&self) -> bool {
        !self.replaced && self.slice.is_some()
    }

    fn buffer_reference(&self) -> BufferView<'a> {
        self.slice.unwrap_or_else(BufferView::empty)
    }

    fn serialize(&self, target: &mut Vec<u8>, offset: usize) -> Result<usize, CodecError> {
        match self.slice {
            Some(slice) if !self.replaced => copy_cells(slice.cells(), target, offset),
            _ => self.formatter.serialize(target, offset, self.value()?),
        }
    }
}

impl fmt::Debug for CacheBox<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheBox")
            .field("type", &self.formatter.type_name())
            .field("slice", &self.slice)
            .field("value", &self.value.get())
            .field("replaced", &self.replaced)
            .finish()
    }
}
