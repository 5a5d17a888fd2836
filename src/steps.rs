// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Step execution.
//!
//! A [`StepExecutor`] gives meaning to the text of a [`Step`]. The built-in
//! [`ScriptSteps`] understands the following step forms, whatever Gherkin
//! keyword precedes them:
//!
//! | Form                                | Effect                                  |
//! |-------------------------------------|-----------------------------------------|
//! | `def <name> = <expr>`               | binds a variable                        |
//! | `def <name> = call <target> [arg]`  | binds the result of a call              |
//! | `configure <key> = <expr>`          | records a setting                       |
//! | `print <expr>`                      | appends to the step log                 |
//! | `assert <expr>`                     | fails unless truthy                     |
//! | `match <expr> <op> <expr>`          | `==`, `!=`, `contains`, `!contains`     |
//! | `call`/`callonce`/`callSingle` ...  | calls and spreads an object result      |
//! | `setup [name]`                      | runs a `@setup` scenario                |
//! | `eval <expr>`                       | evaluates for side effects              |
//! | `url`, `path`, `param`, `header`    | assemble an HTTP request                |
//! | `request <expr>`, `method <verb>`   | set the body and send the request       |
//! | `status <code>`                     | asserts the response status             |
//!
//! Anything else is evaluated as a bare expression. An empty right-hand side
//! takes the doc string of the step instead.

use std::{fmt, sync::Arc};

use anyhow::{anyhow, bail, ensure};

use crate::{
    expr::{Map, Value},
    feature::Step,
    http,
    runtime::ScenarioContext,
    xml,
};

/// Executor of [`Step`]s against a [`ScenarioContext`].
pub trait StepExecutor: Send + Sync + fmt::Debug {
    /// Executes the `step`.
    ///
    /// # Errors
    ///
    /// If the step failed. The error becomes the message of the failed
    /// [`StepResult`].
    ///
    /// [`StepResult`]: crate::result::StepResult
    fn execute(&self, step: &Step, ctx: &mut ScenarioContext<'_>) -> anyhow::Result<()>;
}

impl<E: StepExecutor + ?Sized> StepExecutor for Arc<E> {
    fn execute(&self, step: &Step, ctx: &mut ScenarioContext<'_>) -> anyhow::Result<()> {
        (**self).execute(step, ctx)
    }
}

/// Built-in [`StepExecutor`] of the step forms listed in the
/// [module docs](self).
#[derive(Clone, Copy, Debug, Default)]
pub struct ScriptSteps;

/// Kind of a call-like right-hand side.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum CallKind {
    Call,
    CallOnce,
    CallSingle,
    Setup,
}

impl CallKind {
    fn split(text: &str) -> Option<(Self, &str)> {
        let (word, rest) = split_word(text);
        let kind = match word {
            "call" => Self::Call,
            "callonce" => Self::CallOnce,
            "callSingle" => Self::CallSingle,
            "setup" => Self::Setup,
            _ => return None,
        };
        Some((kind, rest))
    }
}

/// Operator of a `match` step.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum MatchOp {
    Equals,
    NotEquals,
    Contains,
    NotContains,
}

impl MatchOp {
    const ALL: [(&'static str, Self); 4] = [
        (" == ", Self::Equals),
        (" != ", Self::NotEquals),
        (" !contains ", Self::NotContains),
        (" contains ", Self::Contains),
    ];
}

impl StepExecutor for ScriptSteps {
    fn execute(&self, step: &Step, ctx: &mut ScenarioContext<'_>) -> anyhow::Result<()> {
        let text = step.text.trim();
        let (word, rest) = split_word(text);
        match word {
            "def" => {
                let (name, rhs) = assignment(rest)?;
                let value = rhs_value(ctx, step, rhs)?;
                ctx.vars.set(name, value);
            }
            "configure" => {
                let (key, rhs) = assignment(rest)?;
                let value = rhs_value(ctx, step, rhs)?;
                ctx.configure(key, value);
            }
            "print" => {
                let line = ctx.eval(rest)?.to_string();
                ctx.log(&line);
            }
            "assert" => {
                ensure!(ctx.eval(rest)?.is_truthy(), "assertion failed: {rest}");
            }
            "match" => match_step(ctx, step, rest)?,
            "eval" => {
                _ = ctx.eval(rest)?;
            }
            "url" => {
                ctx.request.url = ctx.eval(rest)?.to_string();
            }
            "path" => match ctx.eval(&format!("[{rest}]"))? {
                Value::Array(items) => {
                    ctx.request.paths.extend(items.iter().map(ToString::to_string));
                }
                other => ctx.request.paths.push(other.to_string()),
            },
            "param" => {
                let (name, rhs) = assignment(rest)?;
                let value = ctx.eval(rhs)?.to_string();
                ctx.request.params.push((name.to_owned(), value));
            }
            "header" => {
                let (name, rhs) = assignment(rest)?;
                let value = ctx.eval(rhs)?.to_string();
                ctx.request.headers.set(name, value);
            }
            "request" => {
                let body = rhs_value(ctx, step, rest)?;
                let (bytes, content_type) = http::encode_body(&body);
                if let Some(ct) = content_type {
                    if !ctx.request.headers.contains("content-type") {
                        ctx.request.headers.set("Content-Type", ct);
                    }
                }
                ctx.request.body = Some(bytes);
            }
            "method" => send(ctx, rest.trim())?,
            "status" => {
                let expected = ctx.eval(rest)?;
                let actual = ctx.vars.get("responseStatus").cloned().unwrap_or_default();
                ensure!(
                    actual.to_number() == expected.to_number(),
                    "status code was: {actual}, expected: {expected}",
                );
            }
            _ => {
                if let Some((kind, target)) = CallKind::split(text) {
                    if let Value::Object(vars) = call(ctx, kind, target)? {
                        for (k, v) in vars {
                            ctx.vars.set(k, v);
                        }
                    }
                } else {
                    _ = ctx.eval(text)?;
                }
            }
        }
        Ok(())
    }
}

/// Splits off the first whitespace-delimited word.
fn split_word(text: &str) -> (&str, &str) {
    let text = text.trim_start();
    match text.find(char::is_whitespace) {
        Some(i) => (&text[..i], text[i..].trim()),
        None => (text, ""),
    }
}

/// Splits `name = rhs`.
fn assignment(text: &str) -> anyhow::Result<(&str, &str)> {
    let (name, rhs) = text
        .split_once('=')
        .ok_or_else(|| anyhow!("expected `<name> = <expression>`, found `{text}`"))?;
    let name = name.trim();
    ensure!(!name.is_empty(), "missing name before `=` in `{text}`");
    Ok((name, rhs.trim()))
}

/// Evaluates a right-hand side, which may be a call or empty (then the doc
/// string of the `step` is used).
fn rhs_value(ctx: &mut ScenarioContext<'_>, step: &Step, rhs: &str) -> anyhow::Result<Value> {
    if rhs.is_empty() {
        return step
            .docstring
            .as_deref()
            .map(docstring_value)
            .ok_or_else(|| anyhow!("missing expression"));
    }
    match CallKind::split(rhs) {
        Some((kind, target)) => call(ctx, kind, target),
        None => Ok(ctx.eval(rhs)?),
    }
}

/// Doc strings are JSON, XML or plain text.
fn docstring_value(text: &str) -> Value {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(text) {
        return Value::from_json(&json);
    }
    if text.trim_start().starts_with('<') {
        if let Ok(x) = xml::Element::parse(text) {
            return Value::Xml(Arc::new(x));
        }
    }
    Value::String(text.to_owned())
}

fn call(ctx: &mut ScenarioContext<'_>, kind: CallKind, text: &str) -> anyhow::Result<Value> {
    let (target, arg) = split_call(text);
    if kind == CallKind::Setup {
        let name = if target.is_empty() { None } else { Some(ctx.eval(target)?.to_string()) };
        return ctx.setup(name.as_deref());
    }
    let target = ctx.eval(target)?;
    let arg = arg.map(|a| ctx.eval(a)).transpose()?;
    match kind {
        CallKind::Call => ctx.call(&target, arg),
        CallKind::CallOnce => ctx.callonce(&target, arg),
        CallKind::CallSingle | CallKind::Setup => ctx.call_single(&target, arg),
    }
}

/// Splits `<target> [arg]` at the first top-level whitespace.
fn split_call(text: &str) -> (&str, Option<&str>) {
    let mut depth = 0_i32;
    let mut quote = None;
    for (i, c) in text.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '(' | '[' | '{') => depth += 1,
            (None, ')' | ']' | '}') => depth -= 1,
            (None, c) if c.is_whitespace() && depth == 0 => {
                let arg = text[i..].trim();
                return (&text[..i], (!arg.is_empty()).then_some(arg));
            }
            _ => {}
        }
    }
    (text, None)
}

fn send(ctx: &mut ScenarioContext<'_>, method: &str) -> anyhow::Result<()> {
    ensure!(!method.is_empty(), "missing HTTP method");
    let mut request = ctx.request.build(method);
    if let Some(Value::Object(headers)) = ctx.configuration().get("headers") {
        for (k, v) in headers {
            if !request.headers().contains(k) {
                request = request.with_header(k, &v.to_string());
            }
        }
    }
    let response = ctx.http(request)?;
    let millis = i64::try_from(response.response_time.as_millis()).unwrap_or(i64::MAX);
    ctx.vars.set("response", response.body_value());
    ctx.vars.set("responseStatus", response.status);
    ctx.vars.set("responseHeaders", response.headers.to_value());
    ctx.vars.set("responseTime", millis);
    Ok(())
}

fn match_step(ctx: &mut ScenarioContext<'_>, step: &Step, text: &str) -> anyhow::Result<()> {
    let (lhs, op, rhs) = split_match(text)
        .ok_or_else(|| anyhow!("expected `match <actual> <operator> <expected>`, found `{text}`"))?;
    let actual = ctx.eval(lhs)?;
    let expected = rhs_value(ctx, step, rhs)?;
    let ok = match op {
        MatchOp::Equals => matches(&actual, &expected),
        MatchOp::NotEquals => !matches(&actual, &expected),
        MatchOp::Contains => contains(&actual, &expected),
        MatchOp::NotContains => !contains(&actual, &expected),
    };
    if !ok {
        bail!("match failed: {text}\n  actual: {actual:?}\n  expected: {expected:?}");
    }
    Ok(())
}

fn split_match(text: &str) -> Option<(&str, MatchOp, &str)> {
    // Trailing space lets an empty right-hand side still find the operator.
    let padded = format!("{text} ");
    MatchOp::ALL.iter().find_map(|(needle, op)| {
        let i = padded.find(needle)?;
        let rhs_start = (i + needle.len()).min(text.len());
        Some((text[..i].trim(), *op, text[rhs_start..].trim()))
    })
}

/// Deep equality understanding `#`-markers in `expected`: `#ignore`,
/// `#notpresent`, `#present`, `#null`, `#notnull`, `#string`, `#number`,
/// `#boolean`, `#array` and `#object`.
fn matches(actual: &Value, expected: &Value) -> bool {
    if let Some(ok) = expected.as_str().and_then(|m| marker(m, Some(actual))) {
        return ok;
    }
    match (actual, expected) {
        (Value::Object(a), Value::Object(e)) => {
            e.iter().all(|(k, ev)| match a.get(k) {
                Some(av) => matches(av, ev),
                None => ev.as_str().and_then(|m| marker(m, None)).unwrap_or(false),
            }) && a.keys().all(|k| e.contains_key(k))
        }
        (Value::Array(a), Value::Array(e)) => {
            a.len() == e.len() && a.iter().zip(e).all(|(av, ev)| matches(av, ev))
        }
        _ => actual == expected,
    }
}

/// Checks a `#`-marker against an `actual` value, `None` meaning the key is
/// absent. Returns `None` if `text` isn't a marker.
fn marker(text: &str, actual: Option<&Value>) -> Option<bool> {
    let is = |f: fn(&Value) -> bool| actual.is_some_and(f);
    Some(match text {
        "#ignore" => true,
        "#notpresent" => actual.is_none(),
        "#present" => actual.is_some(),
        "#null" => actual.map_or(true, Value::is_null),
        "#notnull" => is(|v| !v.is_null()),
        "#string" => is(|v| matches!(v, Value::String(_))),
        "#number" => is(|v| matches!(v, Value::Number(_))),
        "#boolean" => is(|v| matches!(v, Value::Bool(_))),
        "#array" => is(|v| matches!(v, Value::Array(_))),
        "#object" => is(|v| matches!(v, Value::Object(_))),
        _ => return None,
    })
}

fn contains(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::String(a), Value::String(e)) => a.contains(e.as_str()),
        (Value::Array(items), Value::Array(e)) => {
            e.iter().all(|ev| items.iter().any(|av| matches(av, ev)))
        }
        (Value::Array(items), e) => items.iter().any(|av| matches(av, e)),
        (Value::Object(a), Value::Object(e)) => subset(a, e),
        _ => false,
    }
}

fn subset(actual: &Map, expected: &Map) -> bool {
    expected.iter().all(|(k, ev)| match actual.get(k) {
        Some(av) => matches(av, ev),
        None => ev.as_str().and_then(|m| marker(m, None)).unwrap_or(false),
    })
}
