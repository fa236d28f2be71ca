use crate::error::CodecError;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use xxhash_rust::xxh64::Xxh64;

/// Largest field index a schema may declare. Accessors and headers size
/// their tables by the last index, so this bounds their allocation.
pub const MAX_FIELD_INDEX: u32 = 65_535;

// ─── FieldType ──────────────────────────────────────────────────────────────

/// Value type of a schema field.
///
/// JSON form is externally tagged, snake case: `"i32"`, `"text"`,
/// `{"object": {...}}`, `{"custom": "uuid"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Bool,
    I32,
    I64,
    U32,
    U64,
    F32,
    F64,
    Text,
    Bytes,
    Json,
    /// A nested record, lazily backed by a sub-range of the parent buffer.
    Object(Box<Schema>),
    /// Resolved by name through a `FormatterResolver`.
    Custom(SmolStr),
}

impl FieldType {
    fn tag(&self) -> u8 {
        match self {
            FieldType::Bool => 0,
            FieldType::I32 => 1,
            FieldType::I64 => 2,
            FieldType::U32 => 3,
            FieldType::U64 => 4,
            FieldType::F32 => 5,
            FieldType::F64 => 6,
            FieldType::Text => 7,
            FieldType::Bytes => 8,
            FieldType::Json => 9,
            FieldType::Object(_) => 10,
            FieldType::Custom(_) => 11,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub index: u32,
    pub name: SmolStr,
    #[serde(rename = "type")]
    pub ty: FieldType,
}

// ─── Schema ─────────────────────────────────────────────────────────────────

/// Ordered field descriptors for one record type, as declared by the current
/// program version. Indices may have gaps but only ever grow by appending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub name: SmolStr,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
}

impl Schema {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Builder-style field declaration.
    pub fn field(mut self, index: u32, name: impl Into<SmolStr>, ty: FieldType) -> Self {
        self.fields.push(FieldDef {
            index,
            name: name.into(),
            ty,
        });
        self
    }

    /// Load a schema definition from JSON.
    pub fn from_json(json: &str) -> Result<Self, CodecError> {
        let schema: Schema = serde_json::from_str(json)?;
        schema.validate()?;
        Ok(schema)
    }

    /// Highest declared index, `-1` for an empty schema.
    pub fn last_index(&self) -> i32 {
        self.fields.iter().map(|f| f.index as i32).max().unwrap_or(-1)
    }

    /// Reject duplicate indices or names, and indices above [`MAX_FIELD_INDEX`].
    pub fn validate(&self) -> Result<(), CodecError> {
        let mut indices = FxHashSet::default();
        let mut names = FxHashSet::default();
        for field in &self.fields {
            if field.index > MAX_FIELD_INDEX {
                return Err(CodecError::SchemaViolation(format!(
                    "{}.{}: index {} exceeds {MAX_FIELD_INDEX}",
                    self.name, field.name, field.index
                )));
            }
            if !indices.insert(field.index) {
                return Err(CodecError::SchemaViolation(format!(
                    "{}: duplicate index {}",
                    self.name, field.index
                )));
            }
            if !names.insert(field.name.as_str()) {
                return Err(CodecError::SchemaViolation(format!(
                    "{}: duplicate field name `{}`",
                    self.name, field.name
                )));
            }
            if let FieldType::Object(inner) = &field.ty {
                inner.validate()?;
            }
        }
        Ok(())
    }

    /// Check that `newer` only appends to `self`: every existing field keeps
    /// its index, name and type, and new fields sit past the old last index.
    pub fn check_evolution(&self, newer: &Schema) -> Result<(), CodecError> {
        let old_last = self.last_index();
        for old in &self.fields {
            match newer.fields.iter().find(|f| f.index == old.index) {
                Some(new) if new.name == old.name && new.ty == old.ty => {}
                Some(new) => {
                    return Err(CodecError::SchemaViolation(format!(
                        "{}: field {} changed from `{}` to `{}`",
                        self.name, old.index, old.name, new.name
                    )));
                }
                None => {
                    return Err(CodecError::SchemaViolation(format!(
                        "{}: field {} (`{}`) removed",
                        self.name, old.index, old.name
                    )));
                }
            }
        }
        for new in &newer.fields {
            let known = self.fields.iter().any(|f| f.index == new.index);
            if !known && (new.index as i32) <= old_last {
                return Err(CodecError::SchemaViolation(format!(
                    "{}: field `{}` inserted at index {} below last index {old_last}",
                    self.name, new.name, new.index
                )));
            }
        }
        Ok(())
    }

    /// Stable xxh64 over the schema's structure. Keys the accessor registry.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = Xxh64::new(0);
        self.hash_into(&mut hasher);
        hasher.digest()
    }

    fn hash_into(&self, hasher: &mut Xxh64) {
        hasher.update(&(self.name.len() as u32).to_le_bytes());
        hasher.update(self.name.as_bytes());
        hasher.update(&(self.fields.len() as u32).to_le_bytes());
        for field in &self.fields {
            hasher.update(&field.index.to_le_bytes());
            hasher.update(&(field.name.len() as u32).to_le_bytes());
            hasher.update(field.name.as_bytes());
            hasher.update(&[field.ty.tag()]);
            match &field.ty {
                FieldType::Object(inner) => inner.hash_into(hasher),
                FieldType::Custom(name) => {
                    hasher.update(&(name.len() as u32).to_le_bytes());
                    hasher.update(name.as_bytes());
                }
                _ => {}
            }
        }
    }
}
