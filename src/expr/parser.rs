// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Recursive descent parser producing [`Expr`] trees.

use std::sync::Arc;

use super::{
    lexer::{self, Spanned, Token},
    Error, Value,
};

/// Parsed script expression.
#[derive(Clone, Debug)]
pub enum Expr {
    /// `null`, boolean, number or string literal.
    Literal(Value),

    /// Variable reference.
    Ident(String),

    /// `[a, b]`
    Array(Vec<Expr>),

    /// `{ k: v }`
    Object(Vec<(String, Expr)>),

    /// `obj.name`
    Member(Box<Expr>, String),

    /// `obj[key]`
    Index(Box<Expr>, Box<Expr>),

    /// `f(args)`
    Call(Box<Expr>, Vec<Expr>),

    /// Prefix operator.
    Unary(UnaryOp, Box<Expr>),

    /// Infix operator.
    Binary(BinaryOp, Box<Expr>, Box<Expr>),

    /// Short-circuiting `&&`.
    And(Box<Expr>, Box<Expr>),

    /// Short-circuiting `||`.
    Or(Box<Expr>, Box<Expr>),

    /// `cond ? a : b`
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),

    /// `(a, b) => body`
    Arrow(Arc<[String]>, Arc<Expr>),

    /// `target = value`
    Assign(Box<Expr>, Box<Expr>),

    /// `a; b; c`, evaluating to the last one.
    Sequence(Vec<Expr>),
}

/// Prefix operators.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UnaryOp {
    /// `!`
    Not,

    /// `-`
    Neg,

    /// `+`
    Plus,

    /// `typeof`
    TypeOf,
}

/// Infix operators.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BinaryOp {
    /// `+`
    Add,

    /// `-`
    Sub,

    /// `*`
    Mul,

    /// `/`
    Div,

    /// `%`
    Rem,

    /// `==`
    Eq,

    /// `!=`
    Ne,

    /// `<`
    Lt,

    /// `<=`
    Le,

    /// `>`
    Gt,

    /// `>=`
    Ge,
}

/// Parses the whole `source` into an [`Expr`].
///
/// An empty `source` parses into a `null` literal.
///
/// # Errors
///
/// If the `source` isn't a valid script.
pub fn parse(source: &str) -> Result<Expr, Error> {
    let tokens = lexer::tokenize(source)?;
    let mut parser = Parser { tokens: &tokens, pos: 0, end: source.len() };
    let expr = parser.program()?;
    if parser.pos < tokens.len() {
        return Err(parser.error("unexpected token"));
    }
    Ok(expr)
}

struct Parser<'t> {
    tokens: &'t [Spanned],
    pos: usize,
    end: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.peek_at(0)
    }

    fn peek_at(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n).map(|(_, t)| t)
    }

    fn check(&self, punct: &str) -> bool {
        self.peek().is_some_and(|t| t.is(punct))
    }

    fn eat(&mut self, punct: &str) -> bool {
        let matched = self.check(punct);
        if matched {
            self.pos += 1;
        }
        matched
    }

    fn expect(&mut self, punct: &str) -> Result<(), Error> {
        if self.eat(punct) {
            Ok(())
        } else {
            Err(self.error(format!("expected `{punct}`")))
        }
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::Syntax {
            offset: self.tokens.get(self.pos).map_or(self.end, |(o, _)| *o),
            message: message.into(),
        }
    }

    fn program(&mut self) -> Result<Expr, Error> {
        let mut exprs = Vec::new();
        while self.peek().is_some() {
            if self.eat(";") {
                continue;
            }
            exprs.push(self.expression()?);
            if !self.eat(";") {
                break;
            }
        }
        Ok(match exprs.len() {
            0 => Expr::Literal(Value::Null),
            1 => exprs.remove(0),
            _ => Expr::Sequence(exprs),
        })
    }

    fn expression(&mut self) -> Result<Expr, Error> {
        if let Some(params) = self.arrow_params() {
            return self.arrow(params);
        }
        let target = self.conditional()?;
        if self.eat("=") {
            if !matches!(target, Expr::Ident(_) | Expr::Member(..) | Expr::Index(..)) {
                return Err(self.error("invalid assignment target"));
            }
            let value = self.expression()?;
            return Ok(Expr::Assign(Box::new(target), Box::new(value)));
        }
        Ok(target)
    }

    /// Detects `x =>` and `(a, b) =>` without consuming anything.
    fn arrow_params(&self) -> Option<Vec<String>> {
        match (self.peek()?, self.peek_at(1)) {
            (Token::Ident(name), Some(t)) if t.is("=>") => Some(vec![name.clone()]),
            (t, _) if t.is("(") => {
                let mut params = Vec::new();
                let mut n = 1;
                loop {
                    match self.peek_at(n)? {
                        t if t.is(")") && params.is_empty() => break,
                        Token::Ident(name) => params.push(name.clone()),
                        _ => return None,
                    }
                    n += 1;
                    match self.peek_at(n)? {
                        t if t.is(",") => n += 1,
                        t if t.is(")") => break,
                        _ => return None,
                    }
                }
                self.peek_at(n + 1)?.is("=>").then_some(params)
            }
            _ => None,
        }
    }

    fn arrow(&mut self, params: Vec<String>) -> Result<Expr, Error> {
        while !self.eat("=>") {
            self.pos += 1;
        }
        let body = self.expression()?;
        Ok(Expr::Arrow(params.into(), Arc::new(body)))
    }

    fn conditional(&mut self) -> Result<Expr, Error> {
        let cond = self.or()?;
        if !self.eat("?") {
            return Ok(cond);
        }
        let then = self.expression()?;
        self.expect(":")?;
        let otherwise = self.expression()?;
        Ok(Expr::Conditional(Box::new(cond), Box::new(then), Box::new(otherwise)))
    }

    fn or(&mut self) -> Result<Expr, Error> {
        let mut left = self.and()?;
        while self.eat("||") {
            left = Expr::Or(Box::new(left), Box::new(self.and()?));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, Error> {
        let mut left = self.binary(0)?;
        while self.eat("&&") {
            left = Expr::And(Box::new(left), Box::new(self.binary(0)?));
        }
        Ok(left)
    }

    /// Precedence climbing over equality, relational, additive and
    /// multiplicative levels.
    fn binary(&mut self, level: usize) -> Result<Expr, Error> {
        const LEVELS: &[&[(&str, BinaryOp)]] = &[
            &[("==", BinaryOp::Eq), ("!=", BinaryOp::Ne)],
            &[
                ("<=", BinaryOp::Le),
                (">=", BinaryOp::Ge),
                ("<", BinaryOp::Lt),
                (">", BinaryOp::Gt),
            ],
            &[("+", BinaryOp::Add), ("-", BinaryOp::Sub)],
            &[("*", BinaryOp::Mul), ("/", BinaryOp::Div), ("%", BinaryOp::Rem)],
        ];

        let Some(ops) = LEVELS.get(level) else {
            return self.unary();
        };
        let mut left = self.binary(level + 1)?;
        'outer: loop {
            for (punct, op) in *ops {
                if self.eat(punct) {
                    let right = self.binary(level + 1)?;
                    left = Expr::Binary(*op, Box::new(left), Box::new(right));
                    continue 'outer;
                }
            }
            return Ok(left);
        }
    }

    fn unary(&mut self) -> Result<Expr, Error> {
        let op = if self.eat("!") {
            UnaryOp::Not
        } else if self.eat("-") {
            UnaryOp::Neg
        } else if self.eat("+") {
            UnaryOp::Plus
        } else if matches!(self.peek(), Some(Token::Ident(i)) if i == "typeof") {
            self.pos += 1;
            UnaryOp::TypeOf
        } else {
            return self.postfix();
        };
        Ok(Expr::Unary(op, Box::new(self.unary()?)))
    }

    fn postfix(&mut self) -> Result<Expr, Error> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(".") {
                match self.peek() {
                    Some(Token::Ident(name)) => {
                        let name = name.clone();
                        self.pos += 1;
                        expr = Expr::Member(Box::new(expr), name);
                    }
                    _ => return Err(self.error("expected a property name")),
                }
            } else if self.eat("[") {
                let index = self.expression()?;
                self.expect("]")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else if self.eat("(") {
                let args = self.list(")")?;
                expr = Expr::Call(Box::new(expr), args);
            } else {
                return Ok(expr);
            }
        }
    }

    /// Comma separated expressions up to the `close`ing punctuation,
    /// allowing a trailing comma.
    fn list(&mut self, close: &str) -> Result<Vec<Expr>, Error> {
        let mut items = Vec::new();
        while !self.eat(close) {
            items.push(self.expression()?);
            if !self.eat(",") {
                self.expect(close)?;
                break;
            }
        }
        Ok(items)
    }

    fn primary(&mut self) -> Result<Expr, Error> {
        let Some(token) = self.peek().cloned() else {
            return Err(self.error("unexpected end of input"));
        };
        self.pos += 1;
        Ok(match token {
            Token::Number(n) => Expr::Literal(Value::Number(n)),
            Token::Str(s) => Expr::Literal(Value::String(s)),
            Token::Ident(i) => match i.as_str() {
                "true" => Expr::Literal(Value::Bool(true)),
                "false" => Expr::Literal(Value::Bool(false)),
                "null" | "undefined" => Expr::Literal(Value::Null),
                _ => Expr::Ident(i),
            },
            Token::Punct(p) => match p.as_str() {
                "(" => {
                    let inner = self.expression()?;
                    self.expect(")")?;
                    inner
                }
                "[" => Expr::Array(self.list("]")?),
                "{" => self.object()?,
                _ => {
                    self.pos -= 1;
                    return Err(self.error(format!("unexpected `{p}`")));
                }
            },
        })
    }

    fn object(&mut self) -> Result<Expr, Error> {
        let mut props = Vec::new();
        while !self.eat("}") {
            let key = match self.peek() {
                Some(Token::Ident(k) | Token::Str(k)) => k.clone(),
                Some(Token::Number(n)) => super::value::format_number(*n),
                _ => return Err(self.error("expected a property key")),
            };
            self.pos += 1;
            let value = if self.eat(":") {
                self.expression()?
            } else {
                Expr::Ident(key.clone())
            };
            props.push((key, value));
            if !self.eat(",") {
                self.expect("}")?;
                break;
            }
        }
        Ok(Expr::Object(props))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn respects_precedence() {
        let expr = parse("1 + 2 * 3 == 7 && !false").unwrap();
        let Expr::And(left, right) = expr else {
            panic!("expected `&&` at the root");
        };
        assert!(matches!(*left, Expr::Binary(BinaryOp::Eq, ..)));
        assert!(matches!(*right, Expr::Unary(UnaryOp::Not, _)));
    }

    #[test]
    fn parses_arrows() {
        assert!(matches!(
            parse("s => s.startsWith('1')").unwrap(),
            Expr::Arrow(p, _) if p.len() == 1,
        ));
        assert!(matches!(
            parse("(a, b) => a + b").unwrap(),
            Expr::Arrow(p, _) if &*p == ["a".to_owned(), "b".to_owned()],
        ));
        assert!(matches!(parse("() => 1").unwrap(), Expr::Arrow(p, _) if p.is_empty()));
        assert!(matches!(parse("(a + b)").unwrap(), Expr::Binary(BinaryOp::Add, ..)));
    }

    #[test]
    fn parses_literals_and_postfix() {
        assert!(matches!(
            parse("{ a: [1, 2,], 'b c': { d }, }").unwrap(),
            Expr::Object(props) if props.len() == 2,
        ));
        assert!(matches!(
            parse("x.y[0](1, 2)").unwrap(),
            Expr::Call(callee, args)
                if args.len() == 2 && matches!(*callee, Expr::Index(..)),
        ));
        assert!(matches!(parse("").unwrap(), Expr::Literal(Value::Null)));
        assert!(matches!(parse("a = 1; a").unwrap(), Expr::Sequence(s) if s.len() == 2));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse("anyOf(").is_err());
        assert!(parse("1 +").is_err());
        assert!(parse("a b").is_err());
        assert!(parse("1 = 2").is_err());
        assert!(matches!(parse(")"), Err(Error::Syntax { offset: 0, .. })));
    }
}
