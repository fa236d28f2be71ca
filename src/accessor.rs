//! Per-schema field-strategy tables and the process-wide accessor cache.
//!
//! An [`Accessor`] is built once per schema: it fixes, for every field, how
//! the field is read, written and re-emitted. Building validates the schema
//! and resolves formatters, so an unsupported field type surfaces here and
//! never per instance.

use crate::error::CodecError;
use crate::formatter::{Formatter, FormatterResolver};
use crate::schema::{FieldType, Schema};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use std::sync::{Arc, LazyLock};

// ─── FieldStrategy ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum FieldStrategy {
    /// Constant length: read from and overwritten in the wrapped bytes.
    Fixed { size: usize, formatter: Arc<dyn Formatter> },
    /// Variable-length scalar: decoded once into a cache box.
    CachedVariable { formatter: Arc<dyn Formatter> },
    /// Compound record: a recursive segment over a sub-range.
    NestedSegment { accessor: Arc<Accessor> },
}

#[derive(Debug, Clone)]
pub struct FieldAccessor {
    pub index: i32,
    pub name: SmolStr,
    pub strategy: FieldStrategy,
}

// ─── Accessor ───────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct Accessor {
    name: SmolStr,
    fingerprint: u64,
    /// Sorted by ascending index.
    fields: Vec<FieldAccessor>,
    by_name: FxHashMap<SmolStr, usize>,
    last_index: i32,
    /// Encoded size per schema index, 0 for non-fixed or undeclared indices.
    fixed_sizes: Vec<usize>,
}

impl Accessor {
    /// Build without touching the registry. Nested schemas are built
    /// uncached as well.
    pub fn build(schema: &Schema, resolver: &FormatterResolver) -> Result<Self, CodecError> {
        Self::build_with(schema, resolver, &mut |inner: &Schema| Self::build(inner, resolver).map(Arc::new))
    }

    fn build_with(
        schema: &Schema,
        resolver: &FormatterResolver,
        nested: &mut dyn FnMut(&Schema) -> Result<Arc<Accessor>, CodecError>,
    ) -> Result<Self, CodecError> {
        schema.validate()?;

        let mut defs: Vec<_> = schema.fields.iter().collect();
        defs.sort_by_key(|f| f.index);

        let last_index = schema.last_index();
        let mut fixed_sizes = vec![0usize; (last_index + 1) as usize];
        let mut fields = Vec::with_capacity(defs.len());
        let mut by_name = FxHashMap::default();

        for def in defs {
            let strategy = match &def.ty {
                FieldType::Object(inner) => FieldStrategy::NestedSegment {
                    accessor: nested(&**inner)?,
                },
                _ => {
                    let formatter = resolver.resolve(def)?;
                    match formatter.fixed_length() {
                        Some(size) => {
                            fixed_sizes[def.index as usize] = size;
                            FieldStrategy::Fixed { size, formatter }
                        }
                        None => FieldStrategy::CachedVariable { formatter },
                    }
                }
            };
            by_name.insert(def.name.clone(), fields.len());
            fields.push(FieldAccessor {
                index: def.index as i32,
                name: def.name.clone(),
                strategy,
            });
        }

        Ok(Self {
            name: schema.name.clone(),
            fingerprint: schema.fingerprint(),
            fields,
            by_name,
            last_index,
            fixed_sizes,
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    #[inline]
    pub fn fields(&self) -> &[FieldAccessor] {
        &self.fields
    }

    /// Highest schema index, `-1` for an empty schema.
    #[inline]
    pub fn last_index(&self) -> i32 {
        self.last_index
    }

    #[inline]
    pub fn fixed_sizes(&self) -> &[usize] {
        &self.fixed_sizes
    }

    /// Position in `fields()` of the field called `name`.
    #[inline]
    pub fn position(&self, name: &str) -> Result<usize, CodecError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| CodecError::FieldNotFound(SmolStr::new(name)))
    }

    /// Position in `fields()` of schema index `index`.
    ///
    /// Indices outside `0..=last_index` violate the schema; an index inside
    /// the range that was never declared is just not found.
    pub fn position_of_index(&self, index: i32) -> Result<usize, CodecError> {
        if index < 0 || index > self.last_index {
            return Err(CodecError::SchemaViolation(format!(
                "{}: index {index} outside 0..={}",
                self.name, self.last_index
            )));
        }
        self.fields
            .binary_search_by_key(&index, |f| f.index)
            .map_err(|_| CodecError::FieldNotFound(SmolStr::new(format!("#{index}"))))
    }
}

// ─── Registry ───────────────────────────────────────────────────────────────

/// Process-wide build-or-fetch cache, keyed by schema fingerprint. Entries
/// are never evicted.
static ACCESSORS: LazyLock<Mutex<FxHashMap<u64, Arc<Accessor>>>> =
    LazyLock::new(|| Mutex::new(FxHashMap::default()));

/// Memoized accessor for `schema` with the built-in formatters.
///
/// Shares the registry with [`accessor_with`]: if the schema was first built
/// there with a custom resolver, that accessor is returned.
pub fn accessor_for(schema: &Schema) -> Result<Arc<Accessor>, CodecError> {
    accessor_with(schema, &FormatterResolver::default())
}

/// Memoized accessor for `schema`. The resolver is only consulted when the
/// schema is built for the first time.
///
/// The registry is keyed by schema fingerprint alone, so the first resolver
/// wins. A later call for the same schema gets the accessor built with the
/// first resolver, whatever `resolver` it passes. Use [`Accessor::build`]
/// for a private accessor bound to a different resolver.
pub fn accessor_with(schema: &Schema, resolver: &FormatterResolver) -> Result<Arc<Accessor>, CodecError> {
    let mut cache = ACCESSORS.lock();
    build_locked(&mut cache, schema, resolver)
}

fn build_locked(
    cache: &mut FxHashMap<u64, Arc<Accessor>>,
    schema: &Schema,
    resolver: &FormatterResolver,
) -> Result<Arc<Accessor>, CodecError> {
    let key = schema.fingerprint();
    if let Some(found) = cache.get(&key) {
        return Ok(Arc::clone(found));
    }

    // Nested schemas go through the same map while the lock is held.
    let accessor = Arc::new(Accessor::build_with(schema, resolver, &mut |inner: &Schema| {
        build_locked(cache, inner, resolver)
    })?);

    tracing::debug!(
        schema = %accessor.name,
        fields = accessor.fields.len(),
        fingerprint = key,
        "built segment accessor"
    );
    cache.insert(key, Arc::clone(&accessor));
    Ok(accessor)
}
