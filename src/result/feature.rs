// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! [`FeatureResult`] definition.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    thread,
    time::{Duration, SystemTime},
};

use once_cell::sync::OnceCell;
use serde_json::json;

use super::{millis, ScenarioResult, StepError, StepResult};
use crate::{
    expr::{Map, Value},
    feature::{Feature, Scenario, Section},
};

/// Result of one feature run, either top-level or called from another
/// feature.
///
/// Scenario results may be appended from any thread until the feature is
/// [closed](FeatureResult::close).
#[derive(Debug)]
pub struct FeatureResult {
    feature: Arc<Feature>,
    scenarios: Mutex<Vec<Arc<ScenarioResult>>>,
    call_depth: usize,
    loop_index: i32,
    call_arg: Option<Value>,
    result_variables: OnceCell<Map>,
    started_at: SystemTime,
    ended_at: OnceCell<SystemTime>,
}

impl FeatureResult {
    /// Starts a new top-level [`FeatureResult`].
    #[must_use]
    pub fn new(feature: Arc<Feature>) -> Self {
        Self {
            feature,
            scenarios: Mutex::default(),
            call_depth: 0,
            loop_index: -1,
            call_arg: None,
            result_variables: OnceCell::new(),
            started_at: SystemTime::now(),
            ended_at: OnceCell::new(),
        }
    }

    /// Describes a called feature: its call `depth`, `loop_index` (`-1` if
    /// not looped) and call `arg`.
    #[must_use]
    pub fn with_call(mut self, depth: usize, loop_index: i32, arg: Option<Value>) -> Self {
        self.call_depth = depth;
        self.loop_index = loop_index;
        self.call_arg = arg;
        self
    }

    /// Creates a failed result of a `feature` that broke before producing
    /// any real scenario.
    ///
    /// Holds one synthetic scenario with one synthetic failed step carrying
    /// `Feature execution failed: <error>`.
    #[must_use]
    pub fn from_error(feature: Arc<Feature>, error: impl Into<StepError>) -> Self {
        let result = Self::new(feature);
        result.add_error(error);
        result.close();
        result
    }

    /// Records that the feature broke before producing any real scenario,
    /// see [`FeatureResult::from_error()`].
    pub fn add_error(&self, error: impl Into<StepError>) {
        let feature = &self.feature;
        let scenario = match feature.sections.first() {
            Some(Section::Scenario(sc)) => Arc::clone(sc),
            Some(Section::Outline(o)) => {
                let mut sc = Scenario::synthetic(o.name.clone(), o.line);
                sc.section_index = o.section_index;
                sc.tags = o.tags.clone();
                Arc::new(sc)
            }
            None => Arc::new(Scenario::synthetic("Feature execution failed", feature.line)),
        };
        let message = format!("Feature execution failed: {}", error.into());

        let mut sr = ScenarioResult::new(scenario);
        if let Some(name) = thread::current().name() {
            sr = sr.with_thread_name(name);
        }
        sr.add_step_result(StepResult::fake_failure(
            message.clone(),
            self.started_at,
            message,
        ));
        sr.finish();
        self.add_scenario_result(Arc::new(sr));
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<ScenarioResult>>> {
        self.scenarios.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Static [`Feature`] this result is about.
    #[must_use]
    pub const fn feature(&self) -> &Arc<Feature> {
        &self.feature
    }

    /// Number of call hops from the top-level run.
    #[must_use]
    pub const fn call_depth(&self) -> usize {
        self.call_depth
    }

    /// Index within a looped call, or `-1`.
    #[must_use]
    pub const fn loop_index(&self) -> i32 {
        self.loop_index
    }

    /// Argument this feature was called with.
    #[must_use]
    pub const fn call_arg(&self) -> Option<&Value> {
        self.call_arg.as_ref()
    }

    /// Variables the feature ended with, once recorded.
    #[must_use]
    pub fn result_variables(&self) -> Option<&Map> {
        self.result_variables.get()
    }

    /// Records the variables the feature ended with. Only the first call has
    /// an effect.
    pub fn set_result_variables(&self, vars: Map) {
        _ = self.result_variables.set(vars);
    }

    /// Appends a finished [`ScenarioResult`].
    pub fn add_scenario_result(&self, result: Arc<ScenarioResult>) {
        self.lock().push(result);
    }

    /// Snapshot of the scenario results, in append order until
    /// [sorted](FeatureResult::sort_scenario_results).
    #[must_use]
    pub fn scenario_results(&self) -> Vec<Arc<ScenarioResult>> {
        self.lock().clone()
    }

    /// Restores document order after out-of-order parallel completion.
    ///
    /// The sort is stable, so ties keep their completion order.
    pub fn sort_scenario_results(&self) {
        self.lock().sort_by(|a, b| a.compare(b));
    }

    /// Number of scenario results.
    #[must_use]
    pub fn scenario_count(&self) -> usize {
        self.lock().len()
    }

    /// Number of passed scenarios.
    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.lock().iter().filter(|s| s.is_passed()).count()
    }

    /// Number of failed scenarios.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.lock().iter().filter(|s| s.is_failed()).count()
    }

    /// Indicates whether no scenario failed.
    #[must_use]
    pub fn is_passed(&self) -> bool {
        !self.is_failed()
    }

    /// Indicates whether any scenario failed.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.lock().iter().any(|s| s.is_failed())
    }

    /// Indicates whether no scenario result was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Time the feature started at.
    #[must_use]
    pub const fn started_at(&self) -> SystemTime {
        self.started_at
    }

    /// Time the feature was closed at.
    #[must_use]
    pub fn ended_at(&self) -> Option<SystemTime> {
        self.ended_at.get().copied()
    }

    /// Sets the end time, if not set already.
    pub fn close(&self) {
        _ = self.ended_at.set(SystemTime::now());
    }

    /// Indicates whether [`FeatureResult::close()`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.ended_at.get().is_some()
    }

    /// Time between start and close.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.ended_at()
            .and_then(|end| end.duration_since(self.started_at).ok())
            .unwrap_or_default()
    }

    /// Name to show in reports.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.feature.display_name()
    }

    /// Message of the first failed scenario, in append order.
    #[must_use]
    pub fn failure_message(&self) -> Option<String> {
        self.error().map(|e| e.message().to_owned())
    }

    /// Error of the first failed scenario, in append order.
    #[must_use]
    pub fn error(&self) -> Option<StepError> {
        self.lock()
            .iter()
            .filter(|s| s.is_failed())
            .find_map(|s| s.error().cloned())
    }

    /// JSON representation of this result.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let f = &self.feature;
        let mut json = json!({
            "name": f.name,
            "description": f.description,
            "path": f.path.as_ref().map(|p| p.display().to_string()),
            "displayName": self.display_name(),
            "line": f.line,
            "tags": f.tags.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "passed": self.is_passed(),
            "failed": self.is_failed(),
            "passedCount": self.passed_count(),
            "failedCount": self.failed_count(),
            "durationMillis": millis(self.duration()),
            "callDepth": self.call_depth,
            "loopIndex": self.loop_index,
        });
        if let Some(arg) = &self.call_arg {
            json["callArg"] = arg.to_json();
        }
        if let Some(vars) = self.result_variables() {
            json["resultVariables"] = Value::from(vars.clone()).to_json();
        }
        json["scenarioResults"] =
            self.lock().iter().map(|s| s.to_json()).collect();
        json
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn feature(src: &str) -> Arc<Feature> {
        Arc::new(Feature::parse(src, None).unwrap())
    }

    fn scenario_result(section: usize, line: usize, fail: Option<&str>) -> Arc<ScenarioResult> {
        let mut sc = Scenario::synthetic("s", line);
        sc.section_index = section;
        let mut sr = ScenarioResult::new(Arc::new(sc));
        if let Some(msg) = fail {
            sr.add_step_result(StepResult::fake_failure(msg, SystemTime::now(), msg));
        }
        sr.finish();
        Arc::new(sr)
    }

    #[test]
    fn aggregates_children() {
        let res = FeatureResult::new(feature("Feature: f\n  Scenario: a\n    * def a = 1\n"));
        assert!(res.is_empty());
        assert!(res.is_passed());

        res.add_scenario_result(scenario_result(0, 2, None));
        res.add_scenario_result(scenario_result(1, 5, Some("second")));
        res.add_scenario_result(scenario_result(2, 9, Some("third")));

        assert_eq!(res.scenario_count(), 3);
        assert_eq!(res.passed_count(), 1);
        assert_eq!(res.failed_count(), 2);
        assert!(res.is_failed());
        assert_eq!(res.failure_message().as_deref(), Some("second"));
    }

    #[test]
    fn sorting_restores_document_order() {
        let res = FeatureResult::new(feature("Feature: f\n"));
        for (section, line) in [(2, 30), (0, 3), (1, 12), (0, 3)] {
            res.add_scenario_result(scenario_result(section, line, None));
        }
        res.sort_scenario_results();

        let keys = res.scenario_results().iter().map(|s| s.sort_key()).collect::<Vec<_>>();
        assert_eq!(keys, [(0, -1, 3), (0, -1, 3), (1, -1, 12), (2, -1, 30)]);
    }

    #[test]
    fn synthetic_failure() {
        let res = FeatureResult::from_error(feature("Feature: broken\n"), "rows is not defined");

        assert!(res.is_failed());
        assert!(res.is_closed());
        assert_eq!(res.scenario_count(), 1);
        assert_eq!(
            res.failure_message().as_deref(),
            Some("Feature execution failed: rows is not defined"),
        );
    }

    #[test]
    fn close_sets_end_time_once() {
        let res = FeatureResult::new(feature("Feature: f\n"));
        assert!(!res.is_closed());
        res.close();
        let end = res.ended_at();
        res.close();
        assert_eq!(res.ended_at(), end);
    }

    #[test]
    fn json_shape() {
        let res = FeatureResult::new(feature("@api\nFeature: shape\n"))
            .with_call(1, 2, Some(Value::from("arg")));
        res.add_scenario_result(scenario_result(0, 3, None));
        res.close();

        let json = res.to_json();
        assert_eq!(json["name"], "shape");
        assert_eq!(json["tags"][0], "@api");
        assert_eq!(json["callDepth"], 1);
        assert_eq!(json["loopIndex"], 2);
        assert_eq!(json["callArg"], "arg");
        assert_eq!(json["scenarioResults"].as_array().map(Vec::len), Some(1));
    }
}
