use smol_str::SmolStr;
use std::collections::BTreeMap;

/// Field name → value, the owned form of one record.
pub type FieldMap = BTreeMap<SmolStr, FieldValue>;

// ─── FieldValue ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Bool(bool),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Text(SmolStr),
    Bytes(Vec<u8>),
    /// Opaque document, stored as CBOR.
    Json(serde_json::Value),
    /// Nested record (only produced/accepted for object fields).
    Object(FieldMap),
}

impl FieldValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            FieldValue::Bool(_) => "bool",
            FieldValue::I32(_) => "i32",
            FieldValue::I64(_) => "i64",
            FieldValue::U32(_) => "u32",
            FieldValue::U64(_) => "u64",
            FieldValue::F32(_) => "f32",
            FieldValue::F64(_) => "f64",
            FieldValue::Text(_) => "text",
            FieldValue::Bytes(_) => "bytes",
            FieldValue::Json(_) => "json",
            FieldValue::Object(_) => "object",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            FieldValue::I32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::I64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            FieldValue::U32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            FieldValue::U64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            FieldValue::F32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::F64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            FieldValue::Bytes(b) => Some(b.as_slice()),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            FieldValue::Json(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&FieldMap> {
        match self {
            FieldValue::Object(map) => Some(map),
            _ => None,
        }
    }
}

// ─── From impls ─────────────────────────────────────────────────────────────

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl From<i32> for FieldValue {
    fn from(n: i32) -> Self {
        FieldValue::I32(n)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::I64(n)
    }
}

impl From<u32> for FieldValue {
    fn from(n: u32) -> Self {
        FieldValue::U32(n)
    }
}

impl From<u64> for FieldValue {
    fn from(n: u64) -> Self {
        FieldValue::U64(n)
    }
}

impl From<f32> for FieldValue {
    fn from(n: f32) -> Self {
        FieldValue::F32(n)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::F64(n)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(SmolStr::from(s))
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(SmolStr::from(s))
    }
}

impl From<SmolStr> for FieldValue {
    fn from(s: SmolStr) -> Self {
        FieldValue::Text(s)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(b: Vec<u8>) -> Self {
        FieldValue::Bytes(b)
    }
}

impl From<serde_json::Value> for FieldValue {
    fn from(v: serde_json::Value) -> Self {
        FieldValue::Json(v)
    }
}

impl From<FieldMap> for FieldValue {
    fn from(map: FieldMap) -> Self {
        FieldValue::Object(map)
    }
}

// ─── Into serde_json::Value ─────────────────────────────────────────────────

impl From<FieldValue> for serde_json::Value {
    fn from(val: FieldValue) -> Self {
        match val {
            FieldValue::Bool(b) => serde_json::Value::Bool(b),
            FieldValue::I32(i) => serde_json::json!(i),
            FieldValue::I64(i) => serde_json::json!(i),
            FieldValue::U32(u) => serde_json::json!(u),
            FieldValue::U64(u) => serde_json::json!(u),
            FieldValue::F32(f) => serde_json::json!(f),
            FieldValue::F64(f) => serde_json::json!(f),
            FieldValue::Text(s) => serde_json::Value::String(s.to_string()),
            FieldValue::Bytes(b) => {
                serde_json::Value::Array(b.into_iter().map(|byte| serde_json::json!(byte)).collect())
            }
            FieldValue::Json(v) => v,
            FieldValue::Object(map) => serde_json::Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k.to_string(), v.into()))
                    .collect(),
            ),
        }
    }
}

/// Build a [`FieldMap`] literal; nested braces become nested records.
///
/// ```ignore
/// let person = record!({ "id" => 7i32, "address" => { "zip" => 1010u32 } });
/// ```
#[macro_export]
macro_rules! record {
    ({ $($key:expr => $val:tt),* $(,)? }) => {{
        let mut map = $crate::value::FieldMap::new();
        $(
            map.insert(
                $crate::SmolStr::new($key),
                $crate::value::FieldValue::from($crate::record!(@value $val)),
            );
        )*
        map
    }};

    (@value { $($inner:tt)* }) => {
        $crate::record!({ $($inner)* })
    };

    (@value $val:expr) => {
        $val
    };
}
