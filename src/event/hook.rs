// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Before/after hooks on top of the [`RunEvent`] stream.

use super::{Event, RunEvent, RunListener};
use crate::{
    feature::{Scenario, Step},
    http::{HttpRequest, HttpResponse},
    result::{FeatureResult, ScenarioResult, StepResult, SuiteResult},
    runner::Suite,
    runtime::FeatureRuntime,
};

/// Paired before/after callbacks. A `before_*` returning `false` skips the
/// unit about to start.
#[allow(unused_variables)]
pub trait RuntimeHook: Send + Sync {
    /// Before the suite runs.
    fn before_suite(&self, suite: &Suite) -> bool {
        true
    }

    /// After the suite ran.
    fn after_suite(&self, suite: &Suite, result: &SuiteResult) {}

    /// Before a feature runs.
    fn before_feature(&self, feature: &FeatureRuntime) -> bool {
        true
    }

    /// After a feature ran.
    fn after_feature(&self, feature: &FeatureRuntime, result: &FeatureResult) {}

    /// Before a scenario runs.
    fn before_scenario(&self, feature: &FeatureRuntime, scenario: &Scenario) -> bool {
        true
    }

    /// After a scenario ran.
    fn after_scenario(&self, feature: &FeatureRuntime, result: &ScenarioResult) {}

    /// Before a step runs.
    fn before_step(&self, step: &Step, scenario: &Scenario) -> bool {
        true
    }

    /// After a step ran.
    fn after_step(&self, result: &StepResult, scenario: &Scenario) {}

    /// Before an HTTP request is sent.
    fn before_http_call(&self, request: &HttpRequest) -> bool {
        true
    }

    /// After an HTTP response was received.
    fn after_http_call(&self, request: &HttpRequest, response: &HttpResponse) {}
}

/// [`RunListener`] driving a [`RuntimeHook`].
#[derive(Clone, Copy, Debug, Default)]
pub struct HookAdapter<H>(pub H);

impl<H: RuntimeHook> RunListener for HookAdapter<H> {
    fn on_event(&self, event: &Event<RunEvent<'_>>) -> bool {
        let hook = &self.0;
        match event.value {
            RunEvent::SuiteEnter { suite } => hook.before_suite(suite),
            RunEvent::SuiteExit { suite, result } => {
                hook.after_suite(suite, result);
                true
            }
            RunEvent::FeatureEnter { feature } => hook.before_feature(feature),
            RunEvent::FeatureExit { feature, result } => {
                hook.after_feature(feature, result);
                true
            }
            RunEvent::ScenarioEnter { feature, scenario } => {
                hook.before_scenario(feature, scenario)
            }
            RunEvent::ScenarioExit { feature, result, .. } => {
                hook.after_scenario(feature, result);
                true
            }
            RunEvent::StepEnter { step, scenario, .. } => hook.before_step(step, scenario),
            RunEvent::StepExit { result, scenario, .. } => {
                hook.after_step(result, scenario);
                true
            }
            RunEvent::HttpEnter { request, .. } => hook.before_http_call(request),
            RunEvent::HttpExit { request, response, .. } => {
                hook.after_http_call(request, response);
                true
            }
            RunEvent::Error { .. } | RunEvent::Progress { .. } => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct SkipSuite {
        after: AtomicUsize,
    }

    impl RuntimeHook for SkipSuite {
        fn before_suite(&self, _: &Suite) -> bool {
            false
        }

        fn after_suite(&self, _: &Suite, _: &SuiteResult) {
            _ = self.after.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn maps_events_onto_hooks() {
        let adapter = HookAdapter(SkipSuite::default());
        let suite = Suite::default();
        let result = SuiteResult::new(1);

        assert!(!adapter.on_event(&Event::new(RunEvent::SuiteEnter { suite: &suite })));
        assert!(adapter.on_event(&Event::new(RunEvent::SuiteExit {
            suite: &suite,
            result: &result,
        })));
        assert!(adapter.on_event(&Event::new(RunEvent::Progress { completed: 0, total: 0 })));
        assert_eq!(adapter.0.after.load(Ordering::SeqCst), 1);
    }
}
