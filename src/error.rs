// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Top-level error type of the crate.
//!
//! Only configuration and loading problems surface as an [`Error`]. Failures
//! while running scenarios are recorded in the result tree instead.

use std::{io, path::PathBuf};

use derive_more::with_trait::{Display, Error as StdError, From};

use crate::{expr, feature::ExpandExamplesError};

/// Error of configuring or loading a run.
#[derive(Debug, Display, From, StdError)]
pub enum Error {
    /// Feature file couldn't be read or parsed.
    #[display("Failed to parse feature file: {_0}")]
    Parse(gherkin::ParseFileError),

    /// Feature source couldn't be parsed.
    #[display("Failed to parse feature `{}`: {source}", path.display())]
    #[from(ignore)]
    ParseSource {
        /// Path reported for the source.
        path: PathBuf,

        /// Underlying parser error.
        source: gherkin::ParseError,
    },

    /// Walking input directories failed.
    #[display("Failed to walk feature directory: {_0}")]
    Glob(globwalk::GlobError),

    /// I/O operation failed.
    #[display("I/O operation failed: {_0}")]
    Io(io::Error),

    /// Scenario outline couldn't be expanded.
    #[display("Failed to expand scenario outline: {_0}")]
    Expand(ExpandExamplesError),

    /// Expression failed to parse or evaluate.
    #[display("Expression error: {_0}")]
    Expr(expr::Error),

    /// Tag selector is malformed.
    #[display("Invalid tag selector `{selector}`: {source}")]
    #[from(ignore)]
    Selector {
        /// Selector text as supplied.
        selector: String,

        /// Why it couldn't be evaluated.
        source: expr::Error,
    },

    /// Configuration file isn't usable.
    #[display("Invalid configuration `{}`: {reason}", path.display())]
    #[from(ignore)]
    Config {
        /// Path of the configuration file.
        path: PathBuf,

        /// What is wrong with it.
        reason: String,
    },

    /// Mock feature failed while initializing its background.
    #[display("Mock feature `{feature}` failed to initialize: {reason}")]
    #[from(ignore)]
    MockInit {
        /// Name of the failing feature.
        feature: String,

        /// Failure message.
        reason: String,
    },

    /// Mock configuration was written after initialization.
    #[display("Mock configuration `{_0}` can't be changed after initialization")]
    #[from(ignore)]
    ConfigSealed(#[error(not(source))] String),
}

/// Result type alias using [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Creates an [`Error::Selector`].
    #[must_use]
    pub fn selector(selector: impl Into<String>, source: expr::Error) -> Self {
        Self::Selector { selector: selector.into(), source }
    }

    /// Creates an [`Error::Config`].
    #[must_use]
    pub fn config(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Config { path: path.into(), reason: reason.into() }
    }
}
