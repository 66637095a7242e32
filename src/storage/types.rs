use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;

use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};
use serde_json::{Map, Value};

use crate::error::{GraphError, Result};
use crate::geom::Geometry;

/// Name of the geometry attribute in JSON input and output.
pub const GEOM_KEY: &str = "geom";

/// Scalar attribute value stored in an attribute column.
#[derive(Clone, Debug, PartialEq)]
pub enum AttrValue {
    /// Explicit SQL NULL (clears a column on update).
    Null,
    /// 64-bit signed integer.
    Integer(i64),
    /// 64-bit floating point number.
    Real(f64),
    /// UTF-8 text.
    Text(String),
}

impl AttrValue {
    /// Column type a value of this kind creates; `None` for `Null`.
    pub fn column_type(&self) -> Option<ColumnType> {
        match self {
            AttrValue::Null => None,
            AttrValue::Integer(_) => Some(ColumnType::Integer),
            AttrValue::Real(_) => Some(ColumnType::Real),
            AttrValue::Text(_) => Some(ColumnType::Text),
        }
    }

    /// Numeric view of the value.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Integer(v) => Some(*v as f64),
            AttrValue::Real(v) => Some(*v),
            _ => None,
        }
    }

    /// Integer view of the value.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttrValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Text view of the value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Whether this is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, AttrValue::Null)
    }

    /// Converts a SQL cell; NULL and BLOB cells are treated as absent.
    pub(crate) fn from_sql(value: ValueRef<'_>) -> Option<AttrValue> {
        match value {
            ValueRef::Null | ValueRef::Blob(_) => None,
            ValueRef::Integer(v) => Some(AttrValue::Integer(v)),
            ValueRef::Real(v) => Some(AttrValue::Real(v)),
            ValueRef::Text(bytes) => Some(AttrValue::Text(String::from_utf8_lossy(bytes).into_owned())),
        }
    }

    /// Converts a JSON scalar. `null` maps to `None` (absent).
    pub fn from_json(key: &str, value: &Value) -> Result<Option<AttrValue>> {
        match value {
            Value::Null => Ok(None),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Some(AttrValue::Integer(i)))
                } else if let Some(f) = n.as_f64() {
                    Ok(Some(AttrValue::Real(f)))
                } else {
                    Err(unsupported(key, "out-of-range number"))
                }
            }
            Value::String(s) => Ok(Some(AttrValue::Text(s.clone()))),
            Value::Bool(_) => Err(unsupported(key, "boolean")),
            Value::Array(_) => Err(unsupported(key, "array")),
            Value::Object(_) => Err(unsupported(key, "object")),
        }
    }

    /// JSON rendering of the value.
    pub fn to_json(&self) -> Value {
        match self {
            AttrValue::Null => Value::Null,
            AttrValue::Integer(v) => Value::from(*v),
            AttrValue::Real(v) => Value::from(*v),
            AttrValue::Text(v) => Value::from(v.as_str()),
        }
    }
}

fn unsupported(key: &str, found: &str) -> GraphError {
    GraphError::UnsupportedAttributeType {
        key: key.to_string(),
        found: found.to_string(),
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Null => write!(f, "null"),
            AttrValue::Integer(v) => write!(f, "{v}"),
            AttrValue::Real(v) => write!(f, "{v}"),
            AttrValue::Text(v) => write!(f, "{v}"),
        }
    }
}

impl ToSql for AttrValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            AttrValue::Null => ToSqlOutput::Owned(SqlValue::Null),
            AttrValue::Integer(v) => ToSqlOutput::Owned(SqlValue::Integer(*v)),
            AttrValue::Real(v) => ToSqlOutput::Owned(SqlValue::Real(*v)),
            AttrValue::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
        })
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Integer(v)
    }
}

impl From<i32> for AttrValue {
    fn from(v: i32) -> Self {
        AttrValue::Integer(v.into())
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Real(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Text(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::Text(v)
    }
}

/// Storage class of an attribute column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// `INTEGER` column.
    Integer,
    /// `DOUBLE` column.
    Real,
    /// `TEXT` column.
    Text,
}

impl ColumnType {
    /// Declared SQL type used in `ALTER TABLE ... ADD COLUMN`.
    pub fn sql_name(self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "DOUBLE",
            ColumnType::Text => "TEXT",
        }
    }

    /// Maps a declared column type back onto a storage class.
    pub fn from_declared(declared: &str) -> Option<Self> {
        let upper = declared.to_ascii_uppercase();
        if upper.contains("INT") {
            Some(ColumnType::Integer)
        } else if upper.contains("CHAR") || upper.contains("TEXT") || upper.contains("CLOB") {
            Some(ColumnType::Text)
        } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
            Some(ColumnType::Real)
        } else {
            None
        }
    }
}

/// Sparse attribute set of one feature: named scalars plus an optional geometry.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Attrs {
    props: BTreeMap<String, AttrValue>,
    geom: Option<Geometry>,
}

impl Attrs {
    /// Empty attribute set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }

    /// Builder-style geometry.
    pub fn with_geom(mut self, geom: Geometry) -> Self {
        self.geom = Some(geom);
        self
    }

    /// Inserts or replaces a scalar, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Option<AttrValue> {
        self.props.insert(key.into(), value.into())
    }

    /// Removes a scalar.
    pub fn remove(&mut self, key: &str) -> Option<AttrValue> {
        self.props.remove(key)
    }

    /// Scalar lookup.
    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.props.get(key)
    }

    /// Whether a scalar is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.props.contains_key(key)
    }

    /// Scalars in key order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, AttrValue> {
        self.props.iter()
    }

    /// Scalar names in key order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.props.keys().map(String::as_str)
    }

    /// Number of scalars (the geometry is not counted).
    pub fn len(&self) -> usize {
        self.props.len()
    }

    /// True when there are neither scalars nor a geometry.
    pub fn is_empty(&self) -> bool {
        self.props.is_empty() && self.geom.is_none()
    }

    /// Geometry, if any.
    pub fn geom(&self) -> Option<&Geometry> {
        self.geom.as_ref()
    }

    /// Replaces the geometry.
    pub fn set_geom(&mut self, geom: Option<Geometry>) {
        self.geom = geom;
    }

    /// Copies every entry of `other` into `self`, overwriting on conflict.
    pub fn merge(&mut self, other: &Attrs) {
        for (k, v) in &other.props {
            self.props.insert(k.clone(), v.clone());
        }
        if let Some(geom) = &other.geom {
            self.geom = Some(geom.clone());
        }
    }

    /// Copies entries of `defaults` that `self` does not define.
    pub fn fill_defaults(&mut self, defaults: &Attrs) {
        for (k, v) in &defaults.props {
            self.props.entry(k.clone()).or_insert_with(|| v.clone());
        }
        if self.geom.is_none() {
            self.geom = defaults.geom.clone();
        }
    }

    /// Builds attributes from a JSON object; `geom` is parsed as GeoJSON.
    pub fn from_json(object: &Map<String, Value>) -> Result<Attrs> {
        let mut attrs = Attrs::new();
        for (key, value) in object {
            if key == GEOM_KEY {
                if !value.is_null() {
                    attrs.geom = Some(Geometry::from_geojson(value)?);
                }
                continue;
            }
            if let Some(v) = AttrValue::from_json(key, value)? {
                attrs.props.insert(key.clone(), v);
            }
        }
        Ok(attrs)
    }

    /// JSON object rendering; the geometry is emitted as GeoJSON under `geom`.
    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        for (k, v) in &self.props {
            object.insert(k.clone(), v.to_json());
        }
        if let Some(geom) = &self.geom {
            object.insert(GEOM_KEY.to_string(), geom.to_geojson());
        }
        Value::Object(object)
    }
}

impl<'a> IntoIterator for &'a Attrs {
    type Item = (&'a String, &'a AttrValue);
    type IntoIter = btree_map::Iter<'a, String, AttrValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.props.iter()
    }
}

impl<K: Into<String>, V: Into<AttrValue>> FromIterator<(K, V)> for Attrs {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Attrs {
            props: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            geom: None,
        }
    }
}
