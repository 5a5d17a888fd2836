// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Tokenizer of script sources.

use nom::{
    branch::alt,
    bytes::complete::{escaped_transform, is_not, tag},
    character::complete::{alpha1, alphanumeric1, char, satisfy},
    combinator::{map, map_res, opt, peek, recognize, value},
    multi::many0_count,
    number::complete::recognize_float,
    sequence::{delimited, pair, preceded},
    IResult,
};

use super::Error;

/// Single lexical token.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Token {
    /// Numeric literal.
    Number(f64),

    /// String literal with escapes resolved.
    Str(String),

    /// Identifier or keyword.
    Ident(String),

    /// Operator or punctuation. `===`/`!==` are folded into `==`/`!=`.
    Punct(String),
}

impl Token {
    /// Indicates whether this is the given punctuation.
    pub(crate) fn is(&self, punct: &str) -> bool {
        matches!(self, Self::Punct(p) if p == punct)
    }
}

/// [`Token`] together with its byte offset in the source.
pub(crate) type Spanned = (usize, Token);

/// Splits the `source` into [`Token`]s.
///
/// # Errors
///
/// If the `source` contains a character no token starts with, or an
/// unterminated string literal.
pub(crate) fn tokenize(source: &str) -> Result<Vec<Spanned>, Error> {
    let mut tokens = Vec::new();
    let mut rest = source.trim_start();
    while !rest.is_empty() {
        let offset = source.len() - rest.len();
        let (remaining, tok) = token(rest).map_err(|_| Error::Syntax {
            offset,
            message: match rest.chars().next() {
                Some(q @ ('\'' | '"')) => format!("unterminated string starting with {q}"),
                Some(c) => format!("unexpected character `{c}`"),
                None => "unexpected end of input".into(),
            },
        })?;
        tokens.push((offset, tok));
        rest = remaining.trim_start();
    }
    Ok(tokens)
}

fn token(input: &str) -> IResult<&str, Token> {
    alt((number, string, ident, punct))(input)
}

fn number(input: &str) -> IResult<&str, Token> {
    preceded(
        peek(satisfy(|c| c.is_ascii_digit())),
        map_res(recognize_float, |s: &str| s.parse::<f64>().map(Token::Number)),
    )(input)
}

fn string(input: &str) -> IResult<&str, Token> {
    map(alt((quoted('\'', "'\\"), quoted('"', "\"\\"))), Token::Str)(input)
}

fn quoted<'a>(
    quote: char,
    stop: &'static str,
) -> impl FnMut(&'a str) -> IResult<&'a str, String> {
    move |input| {
        delimited(
            char(quote),
            map(
                opt(escaped_transform(
                    is_not(stop),
                    '\\',
                    alt((
                        value("\\", tag("\\")),
                        value("'", tag("'")),
                        value("\"", tag("\"")),
                        value("/", tag("/")),
                        value("\n", tag("n")),
                        value("\r", tag("r")),
                        value("\t", tag("t")),
                    )),
                )),
                |s: Option<String>| s.unwrap_or_default(),
            ),
            char(quote),
        )(input)
    }
}

fn ident(input: &str) -> IResult<&str, Token> {
    map(
        recognize(pair(
            alt((alpha1, tag("_"), tag("$"))),
            many0_count(alt((alphanumeric1, tag("_"), tag("$")))),
        )),
        |s: &str| Token::Ident(s.to_owned()),
    )(input)
}

fn punct(input: &str) -> IResult<&str, Token> {
    map(
        alt((
            alt((
                tag("==="),
                tag("!=="),
                tag("=="),
                tag("!="),
                tag("<="),
                tag(">="),
                tag("&&"),
                tag("||"),
                tag("=>"),
            )),
            alt((
                tag("+"),
                tag("-"),
                tag("*"),
                tag("/"),
                tag("%"),
                tag("<"),
                tag(">"),
                tag("!"),
                tag("="),
                tag("."),
                tag(","),
                tag(":"),
                tag(";"),
                tag("("),
                tag(")"),
                tag("["),
                tag("]"),
                tag("{"),
                tag("}"),
                tag("?"),
            )),
        )),
        |s: &str| {
            Token::Punct(
                match s {
                    "===" => "==",
                    "!==" => "!=",
                    other => other,
                }
                .to_owned(),
            )
        },
    )(input)
}
