// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Tree-walking evaluation of [`Expr`]s.

use std::{cmp::Ordering, sync::Arc};

use itertools::Itertools as _;

use super::{
    parser::{BinaryOp, Expr, UnaryOp},
    value::{Bindings, Function, Lambda, Map, Value},
    Error,
};

/// Evaluates [`Expr`]s against mutable [`Bindings`].
#[derive(Debug)]
pub struct Interpreter<'b> {
    bindings: &'b mut Bindings,
}

enum Key {
    Name(String),
    Pos(usize),
}

impl<'b> Interpreter<'b> {
    /// Creates a new [`Interpreter`] reading and writing the given
    /// `bindings`.
    pub fn new(bindings: &'b mut Bindings) -> Self {
        Self { bindings }
    }

    /// Evaluates the given `expr`.
    ///
    /// # Errors
    ///
    /// If a referenced variable is undefined, a non-callable value is called,
    /// `null` is dereferenced or a host function fails.
    pub fn eval(&mut self, expr: &Expr) -> Result<Value, Error> {
        Ok(match expr {
            Expr::Literal(v) => v.clone(),
            Expr::Ident(name) => self
                .bindings
                .get(name)
                .cloned()
                .ok_or_else(|| Error::eval(format!("{name} is not defined")))?,
            Expr::Array(items) => Value::Array(
                items.iter().map(|e| self.eval(e)).collect::<Result<_, _>>()?,
            ),
            Expr::Object(props) => {
                let mut map = Map::new();
                for (k, e) in props {
                    _ = map.insert(k.clone(), self.eval(e)?);
                }
                Value::Object(map)
            }
            Expr::Member(obj, name) => member(&self.eval(obj)?, name)?,
            Expr::Index(obj, idx) => {
                let obj = self.eval(obj)?;
                index(&obj, &self.eval(idx)?)?
            }
            Expr::Call(callee, args) => {
                let function = self.eval(callee)?;
                let args = args.iter().map(|e| self.eval(e)).collect::<Result<Vec<_>, _>>()?;
                if !matches!(function, Value::Function(_)) {
                    return Err(Error::eval(format!(
                        "{} is not a function",
                        describe(callee),
                    )));
                }
                call(&function, &args)?
            }
            Expr::Unary(op, operand) => unary(*op, &self.eval(operand)?),
            Expr::Binary(op, l, r) => {
                let l = self.eval(l)?;
                binary(*op, &l, &self.eval(r)?)
            }
            Expr::And(l, r) => {
                let l = self.eval(l)?;
                if l.is_truthy() { self.eval(r)? } else { l }
            }
            Expr::Or(l, r) => {
                let l = self.eval(l)?;
                if l.is_truthy() { l } else { self.eval(r)? }
            }
            Expr::Conditional(c, a, b) => {
                if self.eval(c)?.is_truthy() { self.eval(a)? } else { self.eval(b)? }
            }
            Expr::Arrow(params, body) => Value::Function(Function::Lambda(Arc::new(Lambda {
                params: params.to_vec(),
                body: Arc::clone(body),
                scope: self.bindings.clone(),
            }))),
            Expr::Assign(target, value) => {
                let value = self.eval(value)?;
                self.assign(target, value.clone())?;
                value
            }
            Expr::Sequence(exprs) => {
                let mut last = Value::Null;
                for e in exprs {
                    last = self.eval(e)?;
                }
                last
            }
        })
    }

    fn assign(&mut self, target: &Expr, value: Value) -> Result<(), Error> {
        if let Expr::Ident(name) = target {
            self.bindings.set(name.clone(), value);
            return Ok(());
        }

        let mut keys = Vec::new();
        let root = self.place(target, &mut keys)?;
        let mut slot = self
            .bindings
            .get_mut(&root)
            .ok_or_else(|| Error::eval(format!("{root} is not defined")))?;
        let Some((last, init)) = keys.split_last() else {
            return Err(Error::eval("invalid assignment target"));
        };
        for key in init {
            slot = child_mut(slot, key)?;
        }
        match (slot, last) {
            (Value::Object(map), Key::Name(name)) => {
                _ = map.insert(name.clone(), value);
            }
            (Value::Object(map), Key::Pos(i)) => {
                _ = map.insert(i.to_string(), value);
            }
            (Value::Array(items), Key::Pos(i)) => {
                if *i >= items.len() {
                    items.resize(*i + 1, Value::Null);
                }
                items[*i] = value;
            }
            (other, _) => {
                return Err(Error::eval(format!(
                    "cannot set a property on {}",
                    other.type_name(),
                )));
            }
        }
        Ok(())
    }

    /// Resolves an assignment target into its root variable name and the
    /// path of keys below it.
    fn place(&mut self, expr: &Expr, keys: &mut Vec<Key>) -> Result<String, Error> {
        match expr {
            Expr::Ident(name) => Ok(name.clone()),
            Expr::Member(obj, name) => {
                let root = self.place(obj, keys)?;
                keys.push(Key::Name(name.clone()));
                Ok(root)
            }
            Expr::Index(obj, idx) => {
                let root = self.place(obj, keys)?;
                keys.push(match self.eval(idx)? {
                    Value::Number(n) if n >= 0.0 && n.fract() == 0.0 => {
                        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                        let pos = n as usize;
                        Key::Pos(pos)
                    }
                    other => Key::Name(other.to_string()),
                });
                Ok(root)
            }
            _ => Err(Error::eval("invalid assignment target")),
        }
    }
}

fn child_mut<'v>(value: &'v mut Value, key: &Key) -> Result<&'v mut Value, Error> {
    let found = match (value, key) {
        (Value::Object(map), Key::Name(name)) => map.get_mut(name),
        (Value::Object(map), Key::Pos(i)) => map.get_mut(&i.to_string()),
        (Value::Array(items), Key::Pos(i)) => items.get_mut(*i),
        _ => None,
    };
    found.ok_or_else(|| Error::eval("cannot set a property of undefined"))
}

fn describe(expr: &Expr) -> String {
    match expr {
        Expr::Ident(name) | Expr::Member(_, name) => name.clone(),
        _ => "expression".into(),
    }
}

/// Calls the given `function` value with the given `args`.
///
/// # Errors
///
/// If the `function` isn't callable or fails.
pub fn call(function: &Value, args: &[Value]) -> Result<Value, Error> {
    match function {
        Value::Function(Function::Native(f)) => f(args),
        Value::Function(Function::Lambda(lambda)) => {
            let mut scope = lambda.scope.clone();
            for (i, param) in lambda.params.iter().enumerate() {
                scope.set(param.clone(), args.get(i).cloned().unwrap_or_default());
            }
            Interpreter::new(&mut scope).eval(&lambda.body)
        }
        other => Err(Error::eval(format!("{} is not a function", other.type_name()))),
    }
}

fn member(value: &Value, name: &str) -> Result<Value, Error> {
    Ok(match value {
        Value::Object(map) => map.get(name).cloned().unwrap_or_default(),
        Value::Array(items) => array_member(items, name),
        Value::String(s) => string_member(s, name),
        Value::Bytes(b) if name == "length" => Value::from(b.len()),
        Value::Null => {
            return Err(Error::eval(format!("cannot read property '{name}' of null")));
        }
        _ => Value::Null,
    })
}

fn index(value: &Value, idx: &Value) -> Result<Value, Error> {
    Ok(match (value, idx) {
        (Value::Array(items), Value::Number(n)) => position(*n)
            .and_then(|i| items.get(i))
            .cloned()
            .unwrap_or_default(),
        (Value::String(s), Value::Number(n)) => position(*n)
            .and_then(|i| s.chars().nth(i))
            .map_or(Value::Null, |c| Value::String(c.to_string())),
        (Value::Null, _) => {
            return Err(Error::eval(format!("cannot read property '{idx}' of null")));
        }
        (other, key) => member(other, &key.to_string())?,
    })
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn position(n: f64) -> Option<usize> {
    (n >= 0.0 && n.fract() == 0.0).then_some(n as usize)
}

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or_default()
}

fn char_index(s: &str, byte: Option<usize>) -> Value {
    byte.map_or(Value::Number(-1.0), |b| Value::from(s[..b].chars().count()))
}

fn bound_str(s: &str, f: fn(&str, &[Value]) -> Result<Value, Error>) -> Value {
    let s = s.to_owned();
    Value::function(move |args| f(&s, args))
}

fn bound_array(items: &[Value], f: fn(&[Value], &[Value]) -> Result<Value, Error>) -> Value {
    let items = items.to_vec();
    Value::function(move |args| f(&items, args))
}

fn string_member(s: &str, name: &str) -> Value {
    match name {
        "length" => Value::from(s.chars().count()),
        "startsWith" => bound_str(s, |s, a| Ok(s.starts_with(&arg(a, 0).to_string()).into())),
        "endsWith" => bound_str(s, |s, a| Ok(s.ends_with(&arg(a, 0).to_string()).into())),
        "includes" | "contains" => {
            bound_str(s, |s, a| Ok(s.contains(&arg(a, 0).to_string()).into()))
        }
        "indexOf" => bound_str(s, |s, a| Ok(char_index(s, s.find(&arg(a, 0).to_string())))),
        "toLowerCase" => bound_str(s, |s, _| Ok(s.to_lowercase().into())),
        "toUpperCase" => bound_str(s, |s, _| Ok(s.to_uppercase().into())),
        "trim" => bound_str(s, |s, _| Ok(s.trim().into())),
        "toString" => bound_str(s, |s, _| Ok(s.into())),
        "split" => bound_str(s, |s, a| {
            let sep = arg(a, 0).to_string();
            Ok(Value::Array(if sep.is_empty() {
                s.chars().map(|c| Value::String(c.to_string())).collect()
            } else {
                s.split(sep.as_str()).map(Value::from).collect()
            }))
        }),
        "substring" => bound_str(s, |s, a| {
            let len = s.chars().count();
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let clamp = |v: &Value, default: usize| match v {
                Value::Null => default,
                v => (v.to_number().max(0.0) as usize).min(len),
            };
            let (start, end) = (clamp(&arg(a, 0), 0), clamp(&arg(a, 1), len));
            let (start, end) = (start.min(end), start.max(end));
            Ok(s.chars().skip(start).take(end - start).collect::<String>().into())
        }),
        "replace" => bound_str(s, |s, a| {
            Ok(s.replacen(&arg(a, 0).to_string(), &arg(a, 1).to_string(), 1).into())
        }),
        _ => Value::Null,
    }
}

fn array_member(items: &[Value], name: &str) -> Value {
    match name {
        "length" => Value::from(items.len()),
        "includes" | "contains" => bound_array(items, |items, a| {
            let needle = arg(a, 0);
            Ok(items.iter().any(|i| loose_eq(i, &needle)).into())
        }),
        "indexOf" => bound_array(items, |items, a| {
            let needle = arg(a, 0);
            Ok(items
                .iter()
                .position(|i| loose_eq(i, &needle))
                .map_or(Value::Number(-1.0), Value::from))
        }),
        "concat" => bound_array(items, |items, a| {
            let mut joined = items.to_vec();
            for other in a {
                match other {
                    Value::Array(more) => joined.extend(more.iter().cloned()),
                    v => joined.push(v.clone()),
                }
            }
            Ok(Value::Array(joined))
        }),
        "join" => bound_array(items, |items, a| {
            let sep = match arg(a, 0) {
                Value::Null => ",".to_owned(),
                v => v.to_string(),
            };
            Ok(items.iter().join(&sep).into())
        }),
        "map" => bound_array(items, |items, a| {
            let f = arg(a, 0);
            items
                .iter()
                .enumerate()
                .map(|(i, item)| call(&f, &[item.clone(), Value::from(i)]))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }),
        "filter" => bound_array(items, |items, a| {
            let f = arg(a, 0);
            let mut kept = Vec::new();
            for (i, item) in items.iter().enumerate() {
                if call(&f, &[item.clone(), Value::from(i)])?.is_truthy() {
                    kept.push(item.clone());
                }
            }
            Ok(Value::Array(kept))
        }),
        "some" => bound_array(items, |items, a| {
            let f = arg(a, 0);
            for item in items {
                if call(&f, &[item.clone()])?.is_truthy() {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }),
        "every" => bound_array(items, |items, a| {
            let f = arg(a, 0);
            for item in items {
                if !call(&f, &[item.clone()])?.is_truthy() {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }),
        _ => Value::Null,
    }
}

fn unary(op: UnaryOp, v: &Value) -> Value {
    match op {
        UnaryOp::Not => Value::Bool(!v.is_truthy()),
        UnaryOp::Neg => Value::Number(-v.to_number()),
        UnaryOp::Plus => Value::Number(v.to_number()),
        UnaryOp::TypeOf => Value::from(match v {
            Value::Null | Value::Array(_) | Value::Object(_) => "object",
            other => other.type_name(),
        }),
    }
}

/// Equality of `==`: deep for containers, numbers and numeric strings
/// compare by value.
#[must_use]
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            s.trim().parse::<f64>().is_ok_and(|p| p == *n)
        }
        (Value::Bool(x), Value::Number(n)) | (Value::Number(n), Value::Bool(x)) => {
            f64::from(u8::from(*x)) == *n
        }
        _ => a == b,
    }
}

fn binary(op: BinaryOp, l: &Value, r: &Value) -> Value {
    let concat = |v: &Value| {
        matches!(v, Value::String(_) | Value::Array(_) | Value::Object(_) | Value::Xml(_))
    };
    match op {
        BinaryOp::Add if concat(l) || concat(r) => Value::String(format!("{l}{r}")),
        BinaryOp::Add => Value::Number(l.to_number() + r.to_number()),
        BinaryOp::Sub => Value::Number(l.to_number() - r.to_number()),
        BinaryOp::Mul => Value::Number(l.to_number() * r.to_number()),
        BinaryOp::Div => Value::Number(l.to_number() / r.to_number()),
        BinaryOp::Rem => Value::Number(l.to_number() % r.to_number()),
        BinaryOp::Eq => Value::Bool(loose_eq(l, r)),
        BinaryOp::Ne => Value::Bool(!loose_eq(l, r)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ord = match (l, r) {
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => l.to_number().partial_cmp(&r.to_number()),
            };
            Value::Bool(ord.is_some_and(|ord| match op {
                BinaryOp::Lt => ord == Ordering::Less,
                BinaryOp::Le => ord != Ordering::Greater,
                BinaryOp::Gt => ord == Ordering::Greater,
                _ => ord != Ordering::Less,
            }))
        }
    }
}
