use super::object::{FieldSlot, ObjectSegment};
use crate::accessor::{FieldAccessor, FieldStrategy};
use crate::binary;
use crate::error::CodecError;
use crate::formatter::Formatter;
use crate::layout;
use crate::value::FieldValue;
use smol_str::SmolStr;
use std::sync::Arc;

fn mismatch(expected: &str, value: &FieldValue) -> CodecError {
    CodecError::TypeMismatch {
        expected: SmolStr::new(expected),
        actual: value.kind_name(),
    }
}

impl<'a> ObjectSegment<'a> {
    // ─── Set ────────────────────────────────────────────────────────────

    /// Replace the value of `name`.
    ///
    /// A fixed field covered by the wrapped binary is overwritten in place
    /// and leaves the instance clean. Anything else (a variable field, a
    /// nested record, or a fixed field only held in the extra region) marks
    /// the instance and its ancestors dirty.
    pub fn set(&mut self, name: &str, value: impl Into<FieldValue>) -> Result<(), CodecError> {
        let pos = self.accessor.position(name)?;
        self.write_position(pos, value.into())
    }

    /// Replace the value of the field at schema index `index`.
    pub fn set_at(&mut self, index: i32, value: impl Into<FieldValue>) -> Result<(), CodecError> {
        let pos = self.accessor.position_of_index(index)?;
        self.write_position(pos, value.into())
    }

    fn write_position(&mut self, pos: usize, value: FieldValue) -> Result<(), CodecError> {
        let accessor = Arc::clone(&self.accessor);
        let field = &accessor.fields()[pos];

        match &field.strategy {
            FieldStrategy::Fixed { size, formatter } => self.write_fixed(field, *size, formatter.as_ref(), &value),
            FieldStrategy::CachedVariable { formatter } => {
                if !formatter.accepts(&value) {
                    return Err(mismatch(formatter.type_name(), &value));
                }
                match &mut self.slots[pos] {
                    FieldSlot::Cached(cache) => cache.set_value(value),
                    _ => return Err(mismatch("variable", &value)),
                }
                self.tracker.mark_dirty();
                Ok(())
            }
            FieldStrategy::NestedSegment { accessor: inner } => {
                let values = value.as_object().ok_or_else(|| mismatch("object", &value))?;
                let nested = ObjectSegment::from_record_with_parent(&self.tracker, Arc::clone(inner), values)?;
                self.slots[pos] = FieldSlot::Nested(Box::new(nested));
                self.tracker.mark_dirty();
                Ok(())
            }
        }
    }

    fn write_fixed(
        &self,
        field: &FieldAccessor,
        size: usize,
        formatter: &dyn Formatter,
        value: &FieldValue,
    ) -> Result<(), CodecError> {
        let mut encoded = Vec::with_capacity(size);
        let written = formatter.serialize(&mut encoded, 0, value)?;
        if written != size {
            return Err(CodecError::CorruptData(format!(
                "{}: `{}` encoded to {written} bytes, expected {size}",
                formatter.type_name(),
                field.name
            )));
        }

        if field.index <= self.binary_last_index {
            // In place: the wrapped bytes stay a valid encoding.
            return match layout::fixed_field_pos(&self.view, field.index, self.binary_last_index, size)? {
                Some(at) => binary::write_cells(self.view.array(), at, &encoded),
                None => Err(CodecError::SchemaViolation(format!(
                    "{}: fixed field `{}` is absent from this binary and has no storage",
                    self.accessor.name(),
                    field.name
                ))),
            };
        }

        let extra = self.extra.as_ref().ok_or_else(|| {
            CodecError::SchemaViolation(format!(
                "{}: field `{}` is past last index {} with no extra region",
                self.accessor.name(),
                field.name,
                self.binary_last_index
            ))
        })?;
        layout::write_extra_field(extra, field.index, &encoded)?;
        self.tracker.mark_dirty();
        Ok(())
    }

    // ─── Nested ─────────────────────────────────────────────────────────

    /// Mutable access to the nested segment of object field `name`.
    pub fn nested_mut(&mut self, name: &str) -> Result<&mut ObjectSegment<'a>, CodecError> {
        let pos = self.accessor.position(name)?;
        match &mut self.slots[pos] {
            FieldSlot::Nested(nested) => Ok(&mut **nested),
            FieldSlot::Fixed => Err(CodecError::TypeMismatch {
                expected: SmolStr::new_static("object"),
                actual: "fixed",
            }),
            FieldSlot::Cached(_) => Err(CodecError::TypeMismatch {
                expected: SmolStr::new_static("object"),
                actual: "variable",
            }),
        }
    }

    /// Replace object field `name` with `segment`, which must be built for the
    /// same schema. The replacement is re-parented under this instance.
    pub fn set_nested(&mut self, name: &str, segment: ObjectSegment<'a>) -> Result<(), CodecError> {
        let pos = self.accessor.position(name)?;
        let expected = match &self.accessor.fields()[pos].strategy {
            FieldStrategy::NestedSegment { accessor } => accessor.fingerprint(),
            _ => {
                return Err(CodecError::TypeMismatch {
                    expected: SmolStr::new_static("object"),
                    actual: "scalar",
                });
            }
        };
        if segment.accessor.fingerprint() != expected {
            return Err(CodecError::SchemaViolation(format!(
                "{}.{name}: nested segment has schema `{}`",
                self.accessor.name(),
                segment.accessor.name()
            )));
        }

        // The incoming tracker belongs to another tree; carry its values over
        // through a fresh child so later edits reach this instance.
        let values = segment.to_record()?;
        let inner = Arc::clone(&segment.accessor);
        let nested = ObjectSegment::from_record_with_parent(&self.tracker, inner, &values)?;
        self.slots[pos] = FieldSlot::Nested(Box::new(nested));
        self.tracker.mark_dirty();
        Ok(())
    }
}
