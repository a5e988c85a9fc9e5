use crate::error::{OrmError, OrmResult};
use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// One row of data keyed by column (or relation) name, in select order.
pub type Row = IndexMap<String, Value>;

/// Expression evaluated by the database itself. Never validated locally, exported as `null`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DbExpr(String);

impl DbExpr {
    pub fn new(sql: impl Into<String>) -> Self {
        DbExpr(sql.into())
    }

    /// Placeholder asking storage to apply the column's own default.
    pub fn default_value() -> Self {
        DbExpr("DEFAULT".to_string())
    }

    pub fn sql(&self) -> &str {
        &self.0
    }

    pub fn is_default_placeholder(&self) -> bool {
        self.0.eq_ignore_ascii_case("DEFAULT")
    }
}

impl fmt::Display for DbExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Json(serde_json::Value),
    Expr(DbExpr),
    Row(Row),
    Rows(Vec<Row>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_expr(&self) -> bool {
        matches!(self, Value::Expr(_))
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Value::Text(s) => s.trim().parse::<i64>().ok(),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Text(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_row(&self) -> Option<&Row> {
        match self {
            Value::Row(row) => Some(row),
            _ => None,
        }
    }

    pub fn as_rows(&self) -> Option<&[Row]> {
        match self {
            Value::Rows(rows) => Some(rows.as_slice()),
            _ => None,
        }
    }

    /// Stable textual key used to group and index rows by a column value.
    pub fn key_string(&self) -> String {
        match self {
            Value::Null => "".to_string(),
            Value::Bool(b) => if *b { "1".to_string() } else { "0".to_string() },
            Value::Int(i) => i.to_string(),
            Value::Float(f) if f.fract() == 0.0 => format!("{}", *f as i64),
            Value::Float(f) => f.to_string(),
            Value::Text(s) => s.clone(),
            Value::Expr(e) => e.sql().to_string(),
            other => other.to_json().to_string(),
        }
    }

    /// Compares values the way storage would: `1`, `1.0` and `"1"` are the same key.
    pub fn same_key(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Null, _) | (_, Value::Null) => false,
            _ => self.key_string() == other.key_string(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null | Value::Expr(_) => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f).map(serde_json::Value::Number).unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Json(json) => json.clone(),
            Value::Row(row) => serde_json::Value::Object(row.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()),
            Value::Rows(rows) => serde_json::Value::Array(rows.iter().map(|row| Value::Row(row.clone()).to_json()).collect()),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Json(_) => "json",
            Value::Expr(_) => "expression",
            Value::Row(_) => "row",
            Value::Rows(_) => "rows",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Expr(e) => write!(f, "{}", e),
            Value::Text(s) => write!(f, "{}", s),
            other => write!(f, "{}", other.key_string()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null | Value::Expr(_) => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Json(json) => json.serialize(serializer),
            Value::Row(row) => {
                let mut map = serializer.serialize_map(Some(row.len()))?;
                for (k, v) in row {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            Value::Rows(rows) => {
                let mut seq = serializer.serialize_seq(Some(rows.len()))?;
                for row in rows {
                    seq.serialize_element(&Value::Row(row.clone()))?;
                }
                seq.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        Ok(Value::from(json))
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Object(map) => Value::Row(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect()),
            serde_json::Value::Array(items) => {
                if !items.is_empty() && items.iter().all(|item| item.is_object()) {
                    Value::Rows(
                        items
                            .into_iter()
                            .filter_map(|item| match Value::from(item) {
                                Value::Row(row) => Some(row),
                                _ => None,
                            })
                            .collect(),
                    )
                } else {
                    Value::Json(serde_json::Value::Array(items))
                }
            }
        }
    }
}

macro_rules! impl_value_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::Int(v as i64)
                }
            }
        )*
    };
}

impl_value_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v as f64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<DbExpr> for Value {
    fn from(v: DbExpr) -> Self {
        Value::Expr(v)
    }
}

impl From<Row> for Value {
    fn from(v: Row) -> Self {
        Value::Row(v)
    }
}

impl From<Vec<Row>> for Value {
    fn from(v: Vec<Row>) -> Self {
        Value::Rows(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => Value::Null,
        }
    }
}

/// Typed extraction of a column value.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> OrmResult<Self>;
}

fn mismatch(expected: &str, value: &Value) -> OrmError {
    OrmError::UnexpectedValue(format!("expected {}, got {} ({})", expected, value.type_name(), value))
}

macro_rules! impl_from_value_for_int {
    ($($t:ty),*) => {
        $(
            impl FromValue for $t {
                fn from_value(value: Value) -> OrmResult<Self> {
                    value
                        .as_i64()
                        .and_then(|i| <$t>::try_from(i).ok())
                        .ok_or_else(|| mismatch(stringify!($t), &value))
                }
            }
        )*
    };
}

impl_from_value_for_int!(i8, i16, i32, i64, u8, u16, u32, u64);

impl FromValue for f64 {
    fn from_value(value: Value) -> OrmResult<Self> {
        value.as_f64().ok_or_else(|| mismatch("f64", &value))
    }
}

impl FromValue for f32 {
    fn from_value(value: Value) -> OrmResult<Self> {
        value.as_f64().map(|f| f as f32).ok_or_else(|| mismatch("f32", &value))
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> OrmResult<Self> {
        match &value {
            Value::Bool(b) => Ok(*b),
            Value::Int(0) => Ok(false),
            Value::Int(1) => Ok(true),
            _ => Err(mismatch("bool", &value)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> OrmResult<Self> {
        match value {
            Value::Text(s) => Ok(s),
            Value::Int(_) | Value::Float(_) | Value::Bool(_) => Ok(value.key_string()),
            other => Err(mismatch("string", &other)),
        }
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: Value) -> OrmResult<Self> {
        match value {
            Value::Text(s) => serde_json::from_str(&s).map_err(OrmError::from),
            other => Ok(other.to_json()),
        }
    }
}

impl FromValue for Value {
    fn from_value(value: Value) -> OrmResult<Self> {
        Ok(value)
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> OrmResult<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row;

    #[test]
    fn expressions_serialize_as_null() {
        let data = row! { "id" => DbExpr::default_value(), "name" => "Ann" };
        let json = serde_json::to_string(&Value::Row(data)).unwrap();
        assert_eq!(json, r#"{"id":null,"name":"Ann"}"#);
    }

    #[test]
    fn json_arrays_of_objects_become_rows() {
        let value = Value::from(serde_json::json!([{ "id": 1 }, { "id": 2 }]));
        assert_eq!(value.as_rows().unwrap().len(), 2);
        let scalars = Value::from(serde_json::json!([1, 2]));
        assert!(matches!(scalars, Value::Json(_)));
        let empty = Value::from(serde_json::json!([]));
        assert!(matches!(empty, Value::Json(_)));
    }

    #[test]
    fn same_key_ignores_numeric_representation() {
        assert!(Value::Int(1).same_key(&Value::Text("1".into())));
        assert!(Value::Float(2.0).same_key(&Value::Int(2)));
        assert!(!Value::Null.same_key(&Value::Text("".into())));
    }

    #[test]
    fn typed_extraction() {
        assert_eq!(i32::from_value(Value::Text("42".into())).unwrap(), 42);
        assert_eq!(Option::<String>::from_value(Value::Null).unwrap(), None);
        assert!(u8::from_value(Value::Int(300)).is_err());
        assert!(bool::from_value(Value::Text("yes".into())).is_err());
        let json = serde_json::Value::from_value(Value::Text("[1,2]".into())).unwrap();
        assert_eq!(json, serde_json::json!([1, 2]));
    }
}
