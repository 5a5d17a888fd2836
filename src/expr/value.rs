// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! [`Value`]s flowing through scripts, bindings and results.

use std::{any::Any, fmt, sync::Arc};

use base64::Engine as _;
use derive_more::{Deref, DerefMut, From, Into};
use linked_hash_map::LinkedHashMap;

use super::{parser::Expr, Error};
use crate::xml;

/// Insertion-ordered object of [`Value`]s.
pub type Map = LinkedHashMap<String, Value>;

/// Dynamically typed script value.
#[derive(Clone, Default)]
pub enum Value {
    /// Absent value (`null` and `undefined` alike).
    #[default]
    Null,

    /// Boolean.
    Bool(bool),

    /// Number. Integers are kept as integral floats.
    Number(f64),

    /// String.
    String(String),

    /// Array.
    Array(Vec<Value>),

    /// Object with insertion-ordered keys.
    Object(Map),

    /// Raw bytes.
    Bytes(Vec<u8>),

    /// Parsed XML document or node.
    Xml(Arc<xml::Element>),

    /// Callable.
    Function(Function),

    /// Opaque host object, only meaningful to code that knows its type.
    Native(Native),
}

/// Callable [`Value`].
#[derive(Clone)]
pub enum Function {
    /// Host function.
    Native(Arc<NativeFn>),

    /// Arrow function declared in a script.
    Lambda(Arc<Lambda>),
}

/// Signature of host functions callable from scripts.
pub type NativeFn = dyn Fn(&[Value]) -> Result<Value, Error> + Send + Sync;

/// Arrow function together with the bindings it closed over.
#[derive(Debug)]
pub struct Lambda {
    /// Parameter names.
    pub params: Vec<String>,

    /// Body expression.
    pub body: Arc<Expr>,

    /// Snapshot of the bindings visible at creation time.
    pub scope: Bindings,
}

/// Opaque host object carried inside a [`Value`].
#[derive(Clone)]
pub struct Native(Arc<dyn Any + Send + Sync>);

impl Native {
    /// Wraps the given host `object`.
    pub fn new<T: Any + Send + Sync>(object: T) -> Self {
        Self(Arc::new(object))
    }

    /// Returns the wrapped object if it's a `T`.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }
}

/// Named variables visible to scripts.
#[derive(Clone, Debug, Default, Deref, DerefMut, From, Into)]
pub struct Bindings(Map);

impl Bindings {
    /// Creates empty [`Bindings`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `value` to `name`, replacing any previous binding.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        _ = self.0.insert(name.into(), value.into());
    }

    /// Copies every binding of `other` over these ones.
    pub fn merge(&mut self, other: &Self) {
        for (k, v) in other.iter() {
            _ = self.0.insert(k.clone(), v.clone());
        }
    }

    /// Returns a [`Value::Object`] holding a copy of these [`Bindings`].
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

impl Value {
    /// Wraps a host closure into a callable [`Value`].
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, Error> + Send + Sync + 'static,
    {
        Self::Function(Function::Native(Arc::new(f)))
    }

    /// Truthiness used by conditions and selectors: `null` is `false`,
    /// booleans are themselves, numbers are `true` unless zero, strings are
    /// `true` unless empty, anything else is `true`.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Indicates whether this is [`Value::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the string slice of a [`Value::String`].
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the number of a [`Value::Number`].
    #[must_use]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the map of a [`Value::Object`].
    #[must_use]
    pub const fn as_object(&self) -> Option<&Map> {
        match self {
            Self::Object(m) => Some(m),
            _ => None,
        }
    }

    /// Returns the items of a [`Value::Array`].
    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Numeric coercion: `null` is `0`, booleans are `0`/`1`, strings are
    /// parsed, anything else is `NaN`.
    #[must_use]
    pub fn to_number(&self) -> f64 {
        match self {
            Self::Null => 0.0,
            Self::Bool(b) => f64::from(u8::from(*b)),
            Self::Number(n) => *n,
            Self::String(s) if s.trim().is_empty() => 0.0,
            Self::String(s) => s.trim().parse().unwrap_or(f64::NAN),
            _ => f64::NAN,
        }
    }

    /// Short type name used in error messages and JSON event payloads.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
            Self::Bytes(_) => "bytes",
            Self::Xml(_) => "xml",
            Self::Function(_) => "function",
            Self::Native(_) => "native",
        }
    }

    /// Converts a JSON document into a [`Value`].
    #[must_use]
    pub fn from_json(json: &serde_json::Value) -> Self {
        use serde_json::Value as J;

        match json {
            J::Null => Self::Null,
            J::Bool(b) => Self::Bool(*b),
            J::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            J::String(s) => Self::String(s.clone()),
            J::Array(a) => Self::Array(a.iter().map(Self::from_json).collect()),
            J::Object(o) => Self::Object(
                o.iter().map(|(k, v)| (k.clone(), Self::from_json(v))).collect(),
            ),
        }
    }

    /// Converts this [`Value`] into a JSON document.
    ///
    /// Bytes become base64 strings, XML becomes its text, callables and host
    /// objects become `null`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as J;

        match self {
            Self::Null | Self::Function(_) | Self::Native(_) => J::Null,
            Self::Bool(b) => J::Bool(*b),
            Self::Number(n) => number_to_json(*n),
            Self::String(s) => J::String(s.clone()),
            Self::Array(a) => J::Array(a.iter().map(Self::to_json).collect()),
            Self::Object(m) => J::Object(
                m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Self::Bytes(b) => {
                J::String(base64::engine::general_purpose::STANDARD.encode(b))
            }
            Self::Xml(x) => J::String(x.to_string()),
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn number_to_json(n: f64) -> serde_json::Value {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        return serde_json::Value::from(n as i64);
    }
    serde_json::Number::from_f64(n).map_or(serde_json::Value::Null, Into::into)
}

/// Formats a number the way scripts print it: integral values carry no
/// fractional part.
#[allow(clippy::cast_possible_truncation)]
#[must_use]
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(k, v)| b.get(k).is_some_and(|o| o == v))
            }
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::Xml(a), Self::Xml(b)) => a == b,
            (Self::Function(a), Self::Function(b)) => match (a, b) {
                (Function::Native(a), Function::Native(b)) => Arc::ptr_eq(a, b),
                (Function::Lambda(a), Function::Lambda(b)) => Arc::ptr_eq(a, b),
                _ => false,
            },
            (Self::Native(a), Self::Native(b)) => Arc::ptr_eq(&a.0, &b.0),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => f.write_str(&format_number(*n)),
            Self::String(s) => f.write_str(s),
            Self::Array(_) | Self::Object(_) | Self::Bytes(_) => {
                write!(f, "{}", self.to_json())
            }
            Self::Xml(x) => write!(f, "{x}"),
            Self::Function(_) => f.write_str("[function]"),
            Self::Native(_) => f.write_str("[native]"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s:?}"),
            other => write!(f, "{other}"),
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native(_) => f.write_str("Function::Native"),
            Self::Lambda(l) => write!(f, "Function::Lambda({:?})", l.params),
        }
    }
}

impl fmt::Debug for Native {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Native")
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for Value {
    #[allow(clippy::cast_precision_loss)]
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<u16> for Value {
    fn from(n: u16) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<usize> for Value {
    #[allow(clippy::cast_precision_loss)]
    fn from(n: usize) -> Self {
        Self::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(a: Vec<Value>) -> Self {
        Self::Array(a)
    }
}

impl From<Map> for Value {
    fn from(m: Map) -> Self {
        Self::Object(m)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

impl From<Bindings> for Value {
    fn from(b: Bindings) -> Self {
        Self::Object(b.0)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(o: Option<T>) -> Self {
        o.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(Value::Number(-2.0).is_truthy());
        assert!(!Value::String(String::new()).is_truthy());
        assert!(Value::from("x").is_truthy());
        assert!(Value::Array(vec![]).is_truthy());
        assert!(Value::Object(Map::new()).is_truthy());
    }

    #[test]
    fn json_conversion_keeps_order_and_integers() {
        let json = json!({"b": 1, "a": [true, null, 2.5, "s"]});
        let value = Value::from_json(&json);

        let keys = value.as_object().unwrap().keys().cloned().collect::<Vec<_>>();
        assert_eq!(keys, ["b", "a"]);
        assert_eq!(value.to_json(), json);
        assert_eq!(value.to_string(), r#"{"b":1,"a":[true,null,2.5,"s"]}"#);
    }

    #[test]
    fn object_equality_ignores_key_order() {
        let a = Value::from_json(&json!({"x": 1, "y": [1, 2]}));
        let b = Value::from_json(&json!({"y": [1, 2], "x": 1}));
        assert_eq!(a, b);
        assert_ne!(a, Value::from_json(&json!({"x": 1})));
    }

    #[test]
    fn numbers_print_without_trailing_zero() {
        assert_eq!(Value::from(3_i64).to_string(), "3");
        assert_eq!(Value::Number(2.5).to_string(), "2.5");
        assert_eq!(Value::from("7").to_number(), 7.0);
        assert!(Value::from("x").to_number().is_nan());
    }
}
