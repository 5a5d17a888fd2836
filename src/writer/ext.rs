// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Extension of [`ResultListener`]s.

use sealed::sealed;

use crate::{
    event::ResultListener,
    feature::{Feature, Scenario},
    result::{FeatureResult, ScenarioResult, SuiteResult},
    runner::Suite,
};

/// Extension of [`ResultListener`]s allowing their composition.
#[sealed]
pub trait Ext: ResultListener + Sized {
    /// Attaches the `other` [`ResultListener`] to this one, passing every
    /// callback to both of them, this one first.
    #[must_use]
    fn tee<L: ResultListener>(self, other: L) -> Tee<Self, L>;
}

#[sealed]
impl<T: ResultListener> Ext for T {
    fn tee<L: ResultListener>(self, other: L) -> Tee<Self, L> {
        Tee { left: self, right: other }
    }
}

/// Pair of [`ResultListener`]s fed the same callbacks.
///
/// Created with [`Ext::tee()`].
#[derive(Clone, Copy, Debug)]
pub struct Tee<L, R> {
    left: L,
    right: R,
}

impl<L: ResultListener, R: ResultListener> ResultListener for Tee<L, R> {
    fn on_suite_start(&self, suite: &Suite) {
        self.left.on_suite_start(suite);
        self.right.on_suite_start(suite);
    }

    fn on_suite_end(&self, result: &SuiteResult) {
        self.left.on_suite_end(result);
        self.right.on_suite_end(result);
    }

    fn on_feature_start(&self, feature: &Feature) {
        self.left.on_feature_start(feature);
        self.right.on_feature_start(feature);
    }

    fn on_feature_end(&self, result: &FeatureResult) {
        self.left.on_feature_end(result);
        self.right.on_feature_end(result);
    }

    fn on_scenario_start(&self, scenario: &Scenario) {
        self.left.on_scenario_start(scenario);
        self.right.on_scenario_start(scenario);
    }

    fn on_scenario_end(&self, result: &ScenarioResult) {
        self.left.on_scenario_end(result);
        self.right.on_scenario_end(result);
    }
}
