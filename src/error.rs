// ─── Error ──────────────────────────────────────────────────────────────────
use smol_str::SmolStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    /// Truncated or inconsistent header / payload.
    #[error("Corrupt data: {0}")]
    CorruptData(String),
    /// Index outside the known bounds, or a non append-only schema change.
    #[error("Schema violation: {0}")]
    SchemaViolation(String),
    #[error("No formatter for type `{type_name}` (field `{field}`)")]
    UnsupportedFieldType { field: SmolStr, type_name: SmolStr },
    #[error("Buffer cannot grow to {requested} bytes")]
    CapacityGrowthFailure { requested: usize },
    #[error("Field not found: {0}")]
    FieldNotFound(SmolStr),
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: SmolStr, actual: &'static str },
    #[error("CBOR error: {0}")]
    CborError(String),
    #[error("Invalid schema definition: {0}")]
    SchemaDefinition(#[from] serde_json::Error),
}
