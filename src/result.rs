// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Hierarchical results of a run.
//!
//! [`StepResult`]s roll up into a [`ScenarioResult`], those into a
//! [`FeatureResult`] and those into the [`SuiteResult`]. Aggregates never
//! store counts, they compute them from their children when asked.

mod feature;
mod scenario;
mod step;
mod suite;

use std::time::Duration;

pub use self::{
    feature::FeatureResult,
    scenario::ScenarioResult,
    step::{Embed, Status, StepError, StepResult},
    suite::SuiteResult,
};

/// Whole milliseconds of a [`Duration`], for JSON output.
pub(crate) fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
