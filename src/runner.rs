// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Suite orchestration.
//!
//! A run is configured through a [`Builder`] into a [`Suite`], which the
//! worker pool executes:
//! ```rust,no_run
//! # fn main() -> gauntlet::Result<()> {
//! let result = gauntlet::Runner::path("tests/features")
//!     .tags("~@slow")
//!     .env("dev")
//!     .parallel(4)?;
//! std::process::exit(result.exit_code());
//! # }
//! ```

mod builder;
mod locks;
mod pool;
mod suite;

use std::path::PathBuf;

pub use self::{
    builder::Builder,
    suite::{Output, Suite},
};

/// Entry point of configuring a run.
#[derive(Clone, Copy, Debug)]
pub struct Runner;

impl Runner {
    /// Starts an empty [`Builder`].
    #[must_use]
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Starts a [`Builder`] reading features from the given `path`.
    #[must_use]
    pub fn path(path: impl Into<PathBuf>) -> Builder {
        Builder::default().path(path)
    }
}
