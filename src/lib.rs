// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Execution core of a BDD-style API testing engine.
//!
//! - [`Runner`] discovers `.feature` files, filters their scenarios with a
//!   [tag selector](selector), and runs them on a pool of worker threads.
//! - Every run produces a [result tree](result) and a typed
//!   [event stream](event) observed by listeners.
//! - [`mock::MockHandler`] turns feature files into an HTTP mock routing
//!   requests to the first scenario whose match expression holds.
//!
//! ```rust,no_run
//! let result = gauntlet::Runner::path("tests/features")
//!     .tags("@smoke")
//!     .parallel(4)?;
//! std::process::exit(result.exit_code());
//! # Ok::<_, gauntlet::Error>(())
//! ```

#![deny(nonstandard_style, rustdoc::broken_intra_doc_links, trivial_casts, trivial_numeric_casts)]
#![forbid(non_ascii_idents, unsafe_code)]
#![warn(
    clippy::clone_on_ref_ptr,
    clippy::dbg_macro,
    clippy::expect_used,
    clippy::get_unwrap,
    clippy::pedantic,
    clippy::str_to_string,
    clippy::todo,
    clippy::unimplemented,
    clippy::unwrap_used,
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    unreachable_pub,
    unused_import_braces,
    unused_results
)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod cli;
pub mod error;
pub mod event;
pub mod expr;
pub mod feature;
pub mod http;
pub mod logging;
pub mod mock;
pub mod result;
pub mod runner;
pub mod runtime;
pub mod selector;
pub mod steps;
pub mod tag;
pub mod writer;
pub mod xml;

pub use gherkin;

#[doc(inline)]
pub use self::{
    error::{Error, Result},
    event::{Event, ResultListener, RunEvent, RunEventKind, RunListener},
    feature::{Feature, Scenario, Step},
    result::{FeatureResult, ScenarioResult, StepResult, SuiteResult},
    runner::{Builder, Runner, Suite},
    selector::TagSelector,
};
