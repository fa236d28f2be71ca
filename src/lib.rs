//! Lazily deserialized, schema-evolvable binary records.
//!
//! A record is wrapped over its serialized bytes without decoding anything.
//! Fields are read on demand, fixed-width fields are overwritten in place,
//! and an untouched record serializes by copying its original bytes.
//!
//! Every offset in a segment's table is relative to that segment's own
//! header. For a top-level record written at offset 0 this is the same as an
//! absolute offset, but a nested record stores offsets from its own start.
//! Encoders that write nested records with offsets measured from the start of
//! the outermost buffer produce bytes this crate rejects or misreads.

pub mod accessor;
pub mod binary;
pub mod error;
pub mod formatter;
pub mod layout;
pub mod schema;
pub mod segment;
pub mod tracker;
pub mod types;
pub mod value;

pub use accessor::{Accessor, accessor_for, accessor_with};
pub use error::CodecError;
pub use formatter::{Formatter, FormatterResolver};
pub use schema::{FieldDef, FieldType, Schema};
pub use segment::{CacheBox, ObjectSegment, Segment, decode_record, encode_record, migrate_bytes};
pub use smol_str::SmolStr;
pub use tracker::MutationTracker;
pub use types::BufferView;
pub use value::{FieldMap, FieldValue};
