use super::object::{FieldSlot, ObjectSegment};
use crate::accessor::FieldStrategy;
use crate::error::CodecError;
use crate::formatter::Formatter;
use crate::layout;
use crate::types::BufferView;
use crate::value::{FieldMap, FieldValue};
use smol_str::SmolStr;
use std::cell::Cell;

#[inline]
fn mismatch(expected: &str, actual: &'static str) -> CodecError {
    CodecError::TypeMismatch {
        expected: SmolStr::new(expected),
        actual,
    }
}

fn slot_kind(slot: &FieldSlot<'_>) -> &'static str {
    match slot {
        FieldSlot::Fixed => "fixed",
        FieldSlot::Cached(_) => "variable",
        FieldSlot::Nested(_) => "object",
    }
}

macro_rules! typed_getter {
    ($fn_name:ident, $ret:ty, $as_fn:ident, $type_name:literal) => {
        #[inline]
        pub fn $fn_name(&self, name: &str) -> Result<$ret, CodecError> {
            let value = self.get(name)?;
            value.$as_fn().ok_or_else(|| mismatch($type_name, value.kind_name()))
        }
    };
}

impl<'a> ObjectSegment<'a> {
    // ════════════════════════════════════════════════════════════════════════
    // Generic reads
    // ════════════════════════════════════════════════════════════════════════

    /// Current value of `name`. Absent fields read as their type default;
    /// nested records come back as an owned map.
    pub fn get(&self, name: &str) -> Result<FieldValue, CodecError> {
        let pos = self.accessor.position(name)?;
        self.read_position(pos)
    }

    /// Current value of the field at schema index `index`.
    pub fn get_at(&self, index: i32) -> Result<FieldValue, CodecError> {
        let pos = self.accessor.position_of_index(index)?;
        self.read_position(pos)
    }

    fn read_position(&self, pos: usize) -> Result<FieldValue, CodecError> {
        let field = &self.accessor.fields()[pos];
        match (&field.strategy, &self.slots[pos]) {
            (FieldStrategy::Fixed { size, formatter }, _) => {
                self.read_fixed(field.index, *size, formatter.as_ref())
            }
            (_, FieldSlot::Cached(cache)) => cache.value().cloned(),
            (_, FieldSlot::Nested(nested)) => nested.to_record().map(FieldValue::Object),
            (_, slot) => Err(mismatch(&field.name, slot_kind(slot))),
        }
    }

    fn read_fixed(&self, index: i32, size: usize, formatter: &dyn Formatter) -> Result<FieldValue, CodecError> {
        match self.fixed_location(index, size)? {
            Some((cells, at)) => Ok(formatter.deserialize(cells, at, &self.tracker)?.0),
            None => Ok(formatter.default_value()),
        }
    }

    /// Where the stored bytes of fixed field `index` live: the wrapped
    /// binary when it covers the index, the extra region otherwise. `None`
    /// when the binary records the field as absent.
    fn fixed_location(&self, index: i32, size: usize) -> Result<Option<(&[Cell<u8>], usize)>, CodecError> {
        if index <= self.binary_last_index {
            let at = layout::fixed_field_pos(&self.view, index, self.binary_last_index, size)?;
            return Ok(at.map(|at| (self.view.array(), at)));
        }
        let extra = self.extra.as_ref().ok_or_else(|| {
            CodecError::SchemaViolation(format!(
                "{}: field {index} is past last index {} with no extra region",
                self.accessor.name(),
                self.binary_last_index
            ))
        })?;
        match extra.field_offset(index)? {
            0 => Ok(None),
            offset => Ok(Some((extra.cells(), offset))),
        }
    }

    // ════════════════════════════════════════════════════════════════════════
    // Typed reads
    // ════════════════════════════════════════════════════════════════════════

    typed_getter!(get_bool, bool, as_bool, "bool");
    typed_getter!(get_i32, i32, as_i32, "i32");
    typed_getter!(get_i64, i64, as_i64, "i64");
    typed_getter!(get_u32, u32, as_u32, "u32");
    typed_getter!(get_u64, u64, as_u64, "u64");
    typed_getter!(get_f32, f32, as_f32, "f32");
    typed_getter!(get_f64, f64, as_f64, "f64");

    /// Borrow a variable-length field's cached value, decoding it on first use.
    fn cached_value(&self, name: &str) -> Result<&FieldValue, CodecError> {
        let pos = self.accessor.position(name)?;
        match &self.slots[pos] {
            FieldSlot::Cached(cache) => cache.value(),
            slot => Err(mismatch("variable", slot_kind(slot))),
        }
    }

    pub fn get_text(&self, name: &str) -> Result<&str, CodecError> {
        let value = self.cached_value(name)?;
        value.as_str().ok_or_else(|| mismatch("text", value.kind_name()))
    }

    pub fn get_bytes(&self, name: &str) -> Result<&[u8], CodecError> {
        let value = self.cached_value(name)?;
        value.as_bytes().ok_or_else(|| mismatch("bytes", value.kind_name()))
    }

    pub fn get_json(&self, name: &str) -> Result<&serde_json::Value, CodecError> {
        let value = self.cached_value(name)?;
        value.as_json().ok_or_else(|| mismatch("json", value.kind_name()))
    }

    /// The nested segment backing object field `name`.
    pub fn nested(&self, name: &str) -> Result<&ObjectSegment<'a>, CodecError> {
        let pos = self.accessor.position(name)?;
        match &self.slots[pos] {
            FieldSlot::Nested(nested) => Ok(&**nested),
            slot => Err(mismatch("object", slot_kind(slot))),
        }
    }

    // ════════════════════════════════════════════════════════════════════════
    // Presence and raw access
    // ════════════════════════════════════════════════════════════════════════

    #[inline]
    pub fn has_field(&self, name: &str) -> bool {
        self.accessor.position(name).is_ok()
    }

    /// Whether the wrapped binary stores `name` (non-zero offset). Fields
    /// added after the binary was written are never present.
    pub fn is_present(&self, name: &str) -> Result<bool, CodecError> {
        let pos = self.accessor.position(name)?;
        let index = self.accessor.fields()[pos].index;
        Ok(layout::read_offset(&self.view, index, self.binary_last_index)? > 0)
    }

    /// The stored bytes of `name` in the wrapped binary, `None` if absent.
    /// Fixed fields yield exactly their encoded size.
    pub fn raw_field(&self, name: &str) -> Result<Option<BufferView<'a>>, CodecError> {
        let pos = self.accessor.position(name)?;
        let field = &self.accessor.fields()[pos];
        match &field.strategy {
            FieldStrategy::Fixed { .. } if field.index > self.binary_last_index => Ok(None),
            FieldStrategy::Fixed { size, .. } => {
                let at = layout::fixed_field_pos(&self.view, field.index, self.binary_last_index, *size)?;
                at.map(|at| BufferView::from_cells(self.view.array(), at, *size)).transpose()
            }
            _ => layout::slice_field(&self.view, field.index, self.binary_last_index),
        }
    }

    /// Whether the variable field `name` has been decoded or replaced.
    pub fn is_cached(&self, name: &str) -> Result<bool, CodecError> {
        let pos = self.accessor.position(name)?;
        Ok(matches!(&self.slots[pos], FieldSlot::Cached(cache) if cache.is_loaded()))
    }

    /// Every schema field's current value, nested records included.
    pub fn to_record(&self) -> Result<FieldMap, CodecError> {
        let mut record = FieldMap::new();
        for (pos, field) in self.accessor.fields().iter().enumerate() {
            record.insert(field.name.clone(), self.read_position(pos)?);
        }
        Ok(record)
    }
}
