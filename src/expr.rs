// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Expression language used by tag selectors, mock match expressions and
//! step bodies.
//!
//! The built-in [`Script`] [`Evaluator`] understands a small JavaScript-like
//! subset: literals, object and array literals, member/index access, calls,
//! arrow functions, the usual unary/binary/logical/ternary operators and
//! assignments to variables or their members. Statements may be separated
//! with `;`, the last one being the result.

mod interp;
mod lexer;
mod parser;
mod value;

use std::{fmt, sync::Arc};

use derive_more::with_trait::{Display, Error as StdError};

pub use self::{
    interp::{call, loose_eq, Interpreter},
    parser::{parse, BinaryOp, Expr, UnaryOp},
    value::{format_number, Bindings, Function, Lambda, Map, Native, NativeFn, Value},
};

/// Error of parsing or evaluating an expression.
#[derive(Clone, Debug, Display, Eq, PartialEq, StdError)]
pub enum Error {
    /// Source text isn't a valid expression.
    #[display("syntax error at offset {offset}: {message}")]
    Syntax {
        /// Byte offset of the offending token.
        offset: usize,

        /// What was expected or found.
        message: String,
    },

    /// Expression failed while being evaluated.
    #[display("{_0}")]
    Eval(#[error(not(source))] String),
}

impl Error {
    /// Creates a new [`Error::Eval`].
    #[must_use]
    pub fn eval(message: impl Into<String>) -> Self {
        Self::Eval(message.into())
    }
}

/// Evaluator of expression source text against mutable [`Bindings`].
pub trait Evaluator: Send + Sync + fmt::Debug {
    /// Evaluates the given `source` reading and writing `bindings`.
    ///
    /// # Errors
    ///
    /// If the `source` can't be parsed or fails while being evaluated.
    fn eval(&self, source: &str, bindings: &mut Bindings) -> Result<Value, Error>;
}

impl<E: Evaluator + ?Sized> Evaluator for Arc<E> {
    fn eval(&self, source: &str, bindings: &mut Bindings) -> Result<Value, Error> {
        (**self).eval(source, bindings)
    }
}

/// Built-in [`Evaluator`] of the expression language of this module.
#[derive(Clone, Copy, Debug, Default)]
pub struct Script;

impl Evaluator for Script {
    fn eval(&self, source: &str, bindings: &mut Bindings) -> Result<Value, Error> {
        Interpreter::new(bindings).eval(&parse(source)?)
    }
}
