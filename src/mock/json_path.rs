// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! JSONPath subset: `$`, `.name`, `['name']`, `[n]`, `[*]`, `.*` and
//! `..name`.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_till, take_while1},
    character::complete::{char, digit1},
    combinator::{all_consuming, map, map_res, opt, recognize, value},
    multi::many0,
    sequence::{delimited, pair, preceded},
    IResult,
};

use crate::expr::Value;

/// Step of a path.
#[derive(Clone, Debug, PartialEq)]
enum Segment {
    Child(String),
    Index(i64),
    Wildcard,
    Deep(String),
}

/// Selects from `root` by the JSONPath `path`.
///
/// Paths with a wildcard or a deep scan yield an array of every match, other
/// paths yield the single match or `null`.
///
/// # Errors
///
/// If the `path` is malformed.
pub fn select(root: &Value, path: &str) -> Result<Value, String> {
    let (_, segments) = all_consuming(parse)(path.trim())
        .map_err(|_| format!("invalid JSON path `{path}`"))?;

    let multi = segments
        .iter()
        .any(|s| matches!(s, Segment::Wildcard | Segment::Deep(_)));
    let mut current = vec![root.clone()];
    for segment in &segments {
        current = current.iter().flat_map(|v| step(v, segment)).collect();
    }
    Ok(if multi {
        Value::Array(current)
    } else {
        current.into_iter().next().unwrap_or_default()
    })
}

fn step(value: &Value, segment: &Segment) -> Vec<Value> {
    match (segment, value) {
        (Segment::Child(name), Value::Object(map)) => map.get(name).cloned().into_iter().collect(),
        (Segment::Index(i), Value::Array(items)) => {
            let len = i64::try_from(items.len()).unwrap_or(i64::MAX);
            let at = if *i < 0 { len + i } else { *i };
            usize::try_from(at).ok().and_then(|at| items.get(at)).cloned().into_iter().collect()
        }
        (Segment::Wildcard, Value::Object(map)) => map.values().cloned().collect(),
        (Segment::Wildcard, Value::Array(items)) => items.clone(),
        (Segment::Deep(name), _) => {
            let mut found = Vec::new();
            deep(value, name, &mut found);
            found
        }
        _ => Vec::new(),
    }
}

fn deep(value: &Value, name: &str, found: &mut Vec<Value>) {
    match value {
        Value::Object(map) => {
            if let Some(v) = map.get(name) {
                found.push(v.clone());
            }
            for v in map.values() {
                deep(v, name, found);
            }
        }
        Value::Array(items) => {
            for v in items {
                deep(v, name, found);
            }
        }
        _ => {}
    }
}

fn parse(input: &str) -> IResult<&str, Vec<Segment>> {
    preceded(char('$'), many0(segment))(input)
}

fn segment(input: &str) -> IResult<&str, Segment> {
    alt((
        map(preceded(tag(".."), name), Segment::Deep),
        value(Segment::Wildcard, tag(".*")),
        map(preceded(char('.'), name), Segment::Child),
        delimited(char('['), bracket, char(']')),
    ))(input)
}

fn name(input: &str) -> IResult<&str, String> {
    map(
        take_while1(|c: char| c.is_alphanumeric() || matches!(c, '_' | '-' | '$' | '@')),
        str::to_owned,
    )(input)
}

fn bracket(input: &str) -> IResult<&str, Segment> {
    alt((
        value(Segment::Wildcard, char('*')),
        map(delimited(char('\''), take_till(|c| c == '\''), char('\'')), |s: &str| {
            Segment::Child(s.to_owned())
        }),
        map(delimited(char('"'), take_till(|c| c == '"'), char('"')), |s: &str| {
            Segment::Child(s.to_owned())
        }),
        map_res(recognize(pair(opt(char('-')), digit1)), |s: &str| {
            s.parse::<i64>().map(Segment::Index)
        }),
    ))(input)
}
