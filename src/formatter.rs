use crate::binary::{read_array, read_i32, read_vec, write_bytes, write_i32};
use crate::error::CodecError;
use crate::schema::{FieldDef, FieldType};
use crate::tracker::MutationTracker;
use crate::value::FieldValue;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use std::cell::Cell;
use std::fmt;
use std::sync::Arc;

// ─── Formatter Trait ────────────────────────────────────────────────────────

/// Encodes one field type.
///
/// `fixed_length` decides the access strategy of every field using this
/// formatter: `Some(n)` fields are read and overwritten in place, `None`
/// fields are decoded once into a cache and re-encoded on rebuild.
pub trait Formatter: Send + Sync + fmt::Debug {
    fn type_name(&self) -> &str;

    /// `None` = variable length.
    fn fixed_length(&self) -> Option<usize>;

    /// Value of a field that is absent from an instance.
    fn default_value(&self) -> FieldValue;

    /// Whether `serialize` can encode this value.
    fn accepts(&self, value: &FieldValue) -> bool;

    /// Encode `value` at `offset`, growing `buf` as needed. Returns bytes written.
    fn serialize(&self, buf: &mut Vec<u8>, offset: usize, value: &FieldValue) -> Result<usize, CodecError>;

    /// Decode the value at `offset`. Returns the value and bytes consumed.
    fn deserialize(
        &self,
        bytes: &[Cell<u8>],
        offset: usize,
        tracker: &MutationTracker,
    ) -> Result<(FieldValue, usize), CodecError>;
}

#[inline]
fn mismatch(expected: &str, value: &FieldValue) -> CodecError {
    CodecError::TypeMismatch {
        expected: SmolStr::new(expected),
        actual: value.kind_name(),
    }
}

// ─── Fixed-width primitives ─────────────────────────────────────────────────

macro_rules! fixed_formatter {
    ($name:ident, $prim:ty, $variant:ident, $type_name:literal) => {
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        impl Formatter for $name {
            fn type_name(&self) -> &str {
                $type_name
            }

            #[inline]
            fn fixed_length(&self) -> Option<usize> {
                Some(std::mem::size_of::<$prim>())
            }

            fn default_value(&self) -> FieldValue {
                FieldValue::$variant(<$prim>::default())
            }

            fn accepts(&self, value: &FieldValue) -> bool {
                matches!(value, FieldValue::$variant(_))
            }

            #[inline]
            fn serialize(&self, buf: &mut Vec<u8>, offset: usize, value: &FieldValue) -> Result<usize, CodecError> {
                match value {
                    FieldValue::$variant(v) => write_bytes(buf, offset, &v.to_le_bytes()),
                    other => Err(mismatch($type_name, other)),
                }
            }

            #[inline]
            fn deserialize(
                &self,
                bytes: &[Cell<u8>],
                offset: usize,
                _tracker: &MutationTracker,
            ) -> Result<(FieldValue, usize), CodecError> {
                const N: usize = std::mem::size_of::<$prim>();
                let raw = read_array::<N>(bytes, offset)?;
                Ok((FieldValue::$variant(<$prim>::from_le_bytes(raw)), N))
            }
        }
    };
}

fixed_formatter!(I32Formatter, i32, I32, "i32");
fixed_formatter!(I64Formatter, i64, I64, "i64");
fixed_formatter!(U32Formatter, u32, U32, "u32");
fixed_formatter!(U64Formatter, u64, U64, "u64");
fixed_formatter!(F32Formatter, f32, F32, "f32");
fixed_formatter!(F64Formatter, f64, F64, "f64");

#[derive(Debug, Clone, Copy, Default)]
pub struct BoolFormatter;

impl Formatter for BoolFormatter {
    fn type_name(&self) -> &str {
        "bool"
    }

    fn fixed_length(&self) -> Option<usize> {
        Some(1)
    }

    fn default_value(&self) -> FieldValue {
        FieldValue::Bool(false)
    }

    fn accepts(&self, value: &FieldValue) -> bool {
        matches!(value, FieldValue::Bool(_))
    }

    fn serialize(&self, buf: &mut Vec<u8>, offset: usize, value: &FieldValue) -> Result<usize, CodecError> {
        match value {
            FieldValue::Bool(b) => write_bytes(buf, offset, &[*b as u8]),
            other => Err(mismatch("bool", other)),
        }
    }

    fn deserialize(
        &self,
        bytes: &[Cell<u8>],
        offset: usize,
        _tracker: &MutationTracker,
    ) -> Result<(FieldValue, usize), CodecError> {
        let [b] = read_array::<1>(bytes, offset)?;
        Ok((FieldValue::Bool(b != 0), 1))
    }
}

// ─── Length-prefixed payloads ───────────────────────────────────────────────
//
//  [len: i32 (LE)][len bytes]

fn write_prefixed(buf: &mut Vec<u8>, offset: usize, payload: &[u8]) -> Result<usize, CodecError> {
    let len = i32::try_from(payload.len())
        .map_err(|_| CodecError::CapacityGrowthFailure { requested: payload.len() })?;
    write_i32(buf, offset, len)?;
    write_bytes(buf, offset + 4, payload)?;
    Ok(4 + payload.len())
}

fn read_prefixed(bytes: &[Cell<u8>], offset: usize) -> Result<(Vec<u8>, usize), CodecError> {
    let len = read_i32(bytes, offset)?;
    let len = usize::try_from(len)
        .map_err(|_| CodecError::CorruptData(format!("negative length {len} at {offset}")))?;
    let payload = read_vec(bytes, offset + 4, len)?;
    Ok((payload, 4 + len))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TextFormatter;

impl Formatter for TextFormatter {
    fn type_name(&self) -> &str {
        "text"
    }

    fn fixed_length(&self) -> Option<usize> {
        None
    }

    fn default_value(&self) -> FieldValue {
        FieldValue::Text(SmolStr::default())
    }

    fn accepts(&self, value: &FieldValue) -> bool {
        matches!(value, FieldValue::Text(_))
    }

    fn serialize(&self, buf: &mut Vec<u8>, offset: usize, value: &FieldValue) -> Result<usize, CodecError> {
        match value {
            FieldValue::Text(s) => write_prefixed(buf, offset, s.as_bytes()),
            other => Err(mismatch("text", other)),
        }
    }

    fn deserialize(
        &self,
        bytes: &[Cell<u8>],
        offset: usize,
        _tracker: &MutationTracker,
    ) -> Result<(FieldValue, usize), CodecError> {
        let (payload, consumed) = read_prefixed(bytes, offset)?;
        let text = String::from_utf8(payload)
            .map_err(|e| CodecError::CorruptData(format!("invalid UTF-8 at {offset}: {e}")))?;
        Ok((FieldValue::Text(SmolStr::from(text)), consumed))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BytesFormatter;

impl Formatter for BytesFormatter {
    fn type_name(&self) -> &str {
        "bytes"
    }

    fn fixed_length(&self) -> Option<usize> {
        None
    }

    fn default_value(&self) -> FieldValue {
        FieldValue::Bytes(Vec::new())
    }

    fn accepts(&self, value: &FieldValue) -> bool {
        matches!(value, FieldValue::Bytes(_))
    }

    fn serialize(&self, buf: &mut Vec<u8>, offset: usize, value: &FieldValue) -> Result<usize, CodecError> {
        match value {
            FieldValue::Bytes(b) => write_prefixed(buf, offset, b),
            other => Err(mismatch("bytes", other)),
        }
    }

    fn deserialize(
        &self,
        bytes: &[Cell<u8>],
        offset: usize,
        _tracker: &MutationTracker,
    ) -> Result<(FieldValue, usize), CodecError> {
        let (payload, consumed) = read_prefixed(bytes, offset)?;
        Ok((FieldValue::Bytes(payload), consumed))
    }
}

/// Free-form document encoded as length-prefixed CBOR.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn type_name(&self) -> &str {
        "json"
    }

    fn fixed_length(&self) -> Option<usize> {
        None
    }

    fn default_value(&self) -> FieldValue {
        FieldValue::Json(serde_json::Value::Null)
    }

    fn accepts(&self, value: &FieldValue) -> bool {
        matches!(value, FieldValue::Json(_))
    }

    fn serialize(&self, buf: &mut Vec<u8>, offset: usize, value: &FieldValue) -> Result<usize, CodecError> {
        let doc = match value {
            FieldValue::Json(doc) => doc,
            other => return Err(mismatch("json", other)),
        };
        let mut cbor = Vec::new();
        cbor4ii::serde::to_writer(&mut cbor, doc).map_err(|e| CodecError::CborError(format!("{e:?}")))?;
        write_prefixed(buf, offset, &cbor)
    }

    fn deserialize(
        &self,
        bytes: &[Cell<u8>],
        offset: usize,
        _tracker: &MutationTracker,
    ) -> Result<(FieldValue, usize), CodecError> {
        let (payload, consumed) = read_prefixed(bytes, offset)?;
        let doc: serde_json::Value =
            cbor4ii::serde::from_slice(&payload).map_err(|e| CodecError::CborError(format!("{e:?}")))?;
        Ok((FieldValue::Json(doc), consumed))
    }
}

// ─── FormatterResolver ──────────────────────────────────────────────────────

/// Maps schema field types to formatters.
///
/// Built-in scalar types always resolve; `custom` types resolve only if a
/// formatter was registered under that name. Object fields have no formatter,
/// they become nested segments.
#[derive(Debug, Clone, Default)]
pub struct FormatterResolver {
    custom: FxHashMap<SmolStr, Arc<dyn Formatter>>,
}

impl FormatterResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<SmolStr>, formatter: Arc<dyn Formatter>) {
        self.custom.insert(name.into(), formatter);
    }

    pub fn with_formatter(mut self, name: impl Into<SmolStr>, formatter: Arc<dyn Formatter>) -> Self {
        self.register(name, formatter);
        self
    }

    /// Formatter for a scalar field. Fails with `UnsupportedFieldType` for
    /// object fields and unregistered custom types.
    pub fn resolve(&self, field: &FieldDef) -> Result<Arc<dyn Formatter>, CodecError> {
        let formatter: Arc<dyn Formatter> = match &field.ty {
            FieldType::Bool => Arc::new(BoolFormatter),
            FieldType::I32 => Arc::new(I32Formatter),
            FieldType::I64 => Arc::new(I64Formatter),
            FieldType::U32 => Arc::new(U32Formatter),
            FieldType::U64 => Arc::new(U64Formatter),
            FieldType::F32 => Arc::new(F32Formatter),
            FieldType::F64 => Arc::new(F64Formatter),
            FieldType::Text => Arc::new(TextFormatter),
            FieldType::Bytes => Arc::new(BytesFormatter),
            FieldType::Json => Arc::new(JsonFormatter),
            FieldType::Custom(name) => self.custom.get(name).cloned().ok_or_else(|| {
                CodecError::UnsupportedFieldType {
                    field: field.name.clone(),
                    type_name: name.clone(),
                }
            })?,
            FieldType::Object(_) => {
                return Err(CodecError::UnsupportedFieldType {
                    field: field.name.clone(),
                    type_name: SmolStr::new_static("object"),
                });
            }
        };
        Ok(formatter)
    }
}
