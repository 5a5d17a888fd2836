// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Execution contexts: the [`WorkerContext`] of a pool worker, the
//! [`FeatureRuntime`] of a running (or called) feature and the
//! [`ScenarioContext`] handed to the step executor.

mod feature;
mod scenario;
mod worker;

pub use self::{
    feature::{FeatureRef, FeatureRuntime},
    scenario::ScenarioContext,
    worker::WorkerContext,
};
