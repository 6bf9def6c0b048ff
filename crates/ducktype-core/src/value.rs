//! Dynamic values flowing through adapters, and the string-keyed map source shape.

use crate::error::ValueError;
use crate::types::{ScalarKind, TypeDesc, Typed};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A dynamically typed value read from or written to a source.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Uuid(Uuid),
    List(Vec<Value>),
    Map(DuckMap),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Uuid(_) => "uuid",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    pub fn scalar_kind(&self) -> Option<ScalarKind> {
        match self {
            Value::Bool(_) => Some(ScalarKind::Bool),
            Value::Int(_) => Some(ScalarKind::Int),
            Value::Float(_) => Some(ScalarKind::Float),
            Value::Text(_) => Some(ScalarKind::Text),
            Value::Uuid(_) => Some(ScalarKind::Uuid),
            _ => None,
        }
    }

    /// Type of the current value; `None` for `Null`, whose type is unknown.
    ///
    /// Lists report their element type when every element agrees, `list<any>` otherwise.
    pub fn infer_type(&self) -> Option<TypeDesc> {
        match self {
            Value::Null => None,
            Value::List(items) => {
                let mut element: Option<TypeDesc> = None;
                for item in items {
                    match (item.infer_type(), &element) {
                        (Some(ty), None) => element = Some(ty),
                        (Some(ty), Some(seen)) if &ty == seen => {}
                        _ => return Some(TypeDesc::list(TypeDesc::Any)),
                    }
                }
                Some(TypeDesc::list(element.unwrap_or(TypeDesc::Any)))
            }
            Value::Map(_) => Some(TypeDesc::Map),
            scalar => scalar.scalar_kind().map(TypeDesc::Scalar),
        }
    }

    /// Whether this value can be stored in a member declared as `ty` without conversion.
    pub fn fits(&self, ty: &TypeDesc) -> bool {
        match (self, ty) {
            (_, TypeDesc::Any) => true,
            (Value::Null, ty) => ty.accepts_absent() || matches!(ty, TypeDesc::Unit),
            (value, TypeDesc::Optional(inner)) => value.fits(inner),
            (Value::List(items), TypeDesc::List(element)) => items.iter().all(|i| i.fits(element)),
            (Value::Map(_), TypeDesc::Map | TypeDesc::Contract(_) | TypeDesc::Record(_)) => true,
            (value, TypeDesc::Scalar(kind)) => value.scalar_kind() == Some(*kind),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&DuckMap> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut DuckMap> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Converts to JSON. Identifiers become strings; non-finite floats become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Uuid(u) => serde_json::Value::String(u.to_string()),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(map) => map.to_json(),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(object) => {
                Value::Map(DuckMap::from_json_object(object, CaseSensitivity::Sensitive))
            }
        }
    }
}

/// Key comparison rule of a [`DuckMap`], fixed when the map is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseSensitivity {
    #[default]
    Sensitive,
    Insensitive,
}

impl CaseSensitivity {
    pub fn keys_equal(&self, a: &str, b: &str) -> bool {
        match self {
            CaseSensitivity::Sensitive => a == b,
            CaseSensitivity::Insensitive => a
                .chars()
                .flat_map(char::to_lowercase)
                .eq(b.chars().flat_map(char::to_lowercase)),
        }
    }
}

/// String-keyed map source. Insertion order is preserved; key lookup follows the map's
/// [`CaseSensitivity`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DuckMap {
    entries: Vec<(String, Value)>,
    case: CaseSensitivity,
}

impl DuckMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn case_insensitive() -> Self {
        Self::with_case(CaseSensitivity::Insensitive)
    }

    pub fn with_case(case: CaseSensitivity) -> Self {
        Self {
            entries: Vec::new(),
            case,
        }
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl ToValue) -> Self {
        self.insert(key, value);
        self
    }

    pub fn case(&self) -> CaseSensitivity {
        self.case
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| self.case.keys_equal(k, key))
    }

    /// Inserts or replaces. An existing entry keeps its original key spelling.
    pub fn insert(&mut self, key: impl Into<String>, value: impl ToValue) -> Option<Value> {
        let key = key.into();
        let value = value.to_value();
        match self.position(&key) {
            Some(idx) => Some(std::mem::replace(&mut self.entries[idx].1, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.position(key).map(|idx| &self.entries[idx].1)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.position(key).map(move |idx| &mut self.entries[idx].1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.position(key).map(|idx| self.entries.remove(idx).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Builds a map from a JSON document. Returns `None` unless the document is an object.
    /// Nested objects inherit `case`.
    pub fn from_json(json: serde_json::Value, case: CaseSensitivity) -> Option<Self> {
        match json {
            serde_json::Value::Object(object) => Some(Self::from_json_object(object, case)),
            _ => None,
        }
    }

    fn from_json_object(
        object: serde_json::Map<String, serde_json::Value>,
        case: CaseSensitivity,
    ) -> Self {
        let mut map = DuckMap::with_case(case);
        for (key, value) in object {
            let value = match value {
                serde_json::Value::Object(inner) => {
                    Value::Map(Self::from_json_object(inner, case))
                }
                other => Value::from(other),
            };
            map.insert(key, value);
        }
        map
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.entries
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: ToValue> FromIterator<(K, V)> for DuckMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = DuckMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

/// Conversion of a Rust value into a dynamic [`Value`].
pub trait ToValue {
    fn to_value(&self) -> Value;
}

/// Conversion of a dynamic [`Value`] back into a Rust value.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self, ValueError>;
}

macro_rules! impl_int {
    ($($ty:ty),*) => {$(
        impl Typed for $ty {
            fn type_desc() -> TypeDesc {
                TypeDesc::Scalar(ScalarKind::Int)
            }
        }

        impl ToValue for $ty {
            fn to_value(&self) -> Value {
                Value::Int(i64::from(*self))
            }
        }

        impl FromValue for $ty {
            fn from_value(value: Value) -> Result<Self, ValueError> {
                match value {
                    Value::Int(i) => <$ty>::try_from(i).map_err(|_| ValueError::OutOfRange {
                        value: i.to_string(),
                        target: stringify!($ty),
                    }),
                    other => Err(ValueError::mismatch("int", &other)),
                }
            }
        }
    )*};
}

impl_int!(i8, i16, i32, i64, u8, u16, u32);

impl Typed for f64 {
    fn type_desc() -> TypeDesc {
        TypeDesc::Scalar(ScalarKind::Float)
    }
}

impl ToValue for f64 {
    fn to_value(&self) -> Value {
        Value::Float(*self)
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Float(f) => Ok(f),
            other => Err(ValueError::mismatch("float", &other)),
        }
    }
}

impl Typed for f32 {
    fn type_desc() -> TypeDesc {
        TypeDesc::Scalar(ScalarKind::Float)
    }
}

impl ToValue for f32 {
    fn to_value(&self) -> Value {
        Value::Float(f64::from(*self))
    }
}

impl FromValue for f32 {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        f64::from_value(value).map(|f| f as f32)
    }
}

impl Typed for bool {
    fn type_desc() -> TypeDesc {
        TypeDesc::Scalar(ScalarKind::Bool)
    }
}

impl ToValue for bool {
    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(ValueError::mismatch("bool", &other)),
        }
    }
}

impl Typed for String {
    fn type_desc() -> TypeDesc {
        TypeDesc::Scalar(ScalarKind::Text)
    }
}

impl ToValue for String {
    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }
}

impl Typed for str {
    fn type_desc() -> TypeDesc {
        TypeDesc::Scalar(ScalarKind::Text)
    }
}

impl ToValue for str {
    fn to_value(&self) -> Value {
        Value::Text(self.to_string())
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Text(s) => Ok(s),
            other => Err(ValueError::mismatch("text", &other)),
        }
    }
}

impl Typed for Uuid {
    fn type_desc() -> TypeDesc {
        TypeDesc::Scalar(ScalarKind::Uuid)
    }
}

impl ToValue for Uuid {
    fn to_value(&self) -> Value {
        Value::Uuid(*self)
    }
}

impl FromValue for Uuid {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Uuid(u) => Ok(u),
            other => Err(ValueError::mismatch("uuid", &other)),
        }
    }
}

impl Typed for () {
    fn type_desc() -> TypeDesc {
        TypeDesc::Unit
    }
}

impl ToValue for () {
    fn to_value(&self) -> Value {
        Value::Null
    }
}

impl FromValue for () {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Null => Ok(()),
            other => Err(ValueError::mismatch("unit", &other)),
        }
    }
}

impl Typed for Value {
    fn type_desc() -> TypeDesc {
        TypeDesc::Any
    }
}

impl ToValue for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        Ok(value)
    }
}

impl Typed for DuckMap {
    fn type_desc() -> TypeDesc {
        TypeDesc::Map
    }
}

impl ToValue for DuckMap {
    fn to_value(&self) -> Value {
        Value::Map(self.clone())
    }
}

impl FromValue for DuckMap {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Map(map) => Ok(map),
            other => Err(ValueError::mismatch("map", &other)),
        }
    }
}

impl<T: Typed> Typed for Option<T> {
    fn type_desc() -> TypeDesc {
        TypeDesc::optional(T::type_desc())
    }
}

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(&self) -> Value {
        match self {
            Some(inner) => inner.to_value(),
            None => Value::Null,
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: Typed> Typed for Vec<T> {
    fn type_desc() -> TypeDesc {
        TypeDesc::list(T::type_desc())
    }
}

impl<T: ToValue> ToValue for Vec<T> {
    fn to_value(&self) -> Value {
        Value::List(self.iter().map(ToValue::to_value).collect())
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::List(items) => items.into_iter().map(T::from_value).collect(),
            other => Err(ValueError::mismatch("list", &other)),
        }
    }
}

impl<T: Typed + ?Sized> Typed for &T {
    fn type_desc() -> TypeDesc {
        T::type_desc()
    }
}

impl<T: ToValue + ?Sized> ToValue for &T {
    fn to_value(&self) -> Value {
        (**self).to_value()
    }
}

impl<T: Typed + ?Sized> Typed for Box<T> {
    fn type_desc() -> TypeDesc {
        T::type_desc()
    }
}

impl<T: ToValue + ?Sized> ToValue for Box<T> {
    fn to_value(&self) -> Value {
        (**self).to_value()
    }
}

impl<T: FromValue> FromValue for Box<T> {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        T::from_value(value).map(Box::new)
    }
}
