// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! [`ScenarioResult`] definition.

use std::{
    cmp::Ordering,
    sync::Arc,
    time::{Duration, SystemTime},
};

use serde_json::json;

use super::{millis, StepError, StepResult};
use crate::feature::Scenario;

/// Result of one scenario run.
///
/// Built by the single worker running the scenario and shared read-only
/// once it's finished.
#[derive(Clone, Debug)]
pub struct ScenarioResult {
    scenario: Arc<Scenario>,
    steps: Vec<StepResult>,
    started_at: SystemTime,
    ended_at: Option<SystemTime>,
    thread_name: Option<String>,
    fail_tag_applied: bool,
}

impl ScenarioResult {
    /// Starts a new [`ScenarioResult`] of the given `scenario`.
    #[must_use]
    pub fn new(scenario: Arc<Scenario>) -> Self {
        Self {
            scenario,
            steps: Vec::new(),
            started_at: SystemTime::now(),
            ended_at: None,
            thread_name: None,
            fail_tag_applied: false,
        }
    }

    /// Records the name of the thread running this scenario.
    #[must_use]
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = Some(name.into());
        self
    }

    /// Static [`Scenario`] this result is about.
    #[must_use]
    pub const fn scenario(&self) -> &Arc<Scenario> {
        &self.scenario
    }

    /// Step results in execution order.
    #[must_use]
    pub fn step_results(&self) -> &[StepResult] {
        &self.steps
    }

    /// Appends a [`StepResult`].
    pub fn add_step_result(&mut self, step: StepResult) {
        self.steps.push(step);
    }

    /// Last recorded [`StepResult`], for attaching late logs.
    pub fn last_step_mut(&mut self) -> Option<&mut StepResult> {
        self.steps.last_mut()
    }

    /// Time the scenario started at.
    #[must_use]
    pub const fn started_at(&self) -> SystemTime {
        self.started_at
    }

    /// Time the scenario finished at, if it did.
    #[must_use]
    pub const fn ended_at(&self) -> Option<SystemTime> {
        self.ended_at
    }

    /// Marks this scenario finished now.
    pub fn finish(&mut self) {
        self.ended_at = Some(SystemTime::now());
    }

    /// Name of the thread that ran this scenario.
    #[must_use]
    pub fn thread_name(&self) -> Option<&str> {
        self.thread_name.as_deref()
    }

    /// Indicates whether [`ScenarioResult::apply_fail_tag()`] has run.
    #[must_use]
    pub const fn fail_tag_applied(&self) -> bool {
        self.fail_tag_applied
    }

    /// Inverts the outcome of a scenario expected to fail.
    ///
    /// Appends exactly one synthetic step: a passed one if the scenario
    /// failed, a failed one otherwise. From then on the last step decides
    /// the outcome. Subsequent calls do nothing.
    pub fn apply_fail_tag(&mut self) {
        if self.fail_tag_applied {
            return;
        }
        let now = SystemTime::now();
        let fake = match self.failure_message() {
            Some(msg) => StepResult::fake_success(
                format!("@fail: scenario failed as expected: {msg}"),
                now,
            ),
            None => StepResult::fake_failure(
                "@fail: scenario passed but was expected to fail",
                now,
                "scenario passed but was expected to fail",
            ),
        };
        self.steps.push(fake);
        self.fail_tag_applied = true;
    }

    /// Indicates whether this scenario passed.
    #[must_use]
    pub fn is_passed(&self) -> bool {
        !self.is_failed()
    }

    /// Indicates whether this scenario failed.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        if self.fail_tag_applied {
            self.steps.last().is_some_and(StepResult::is_failed)
        } else {
            self.steps.iter().any(StepResult::is_failed)
        }
    }

    /// Wall-clock time between start and finish.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.ended_at
            .and_then(|end| end.duration_since(self.started_at).ok())
            .unwrap_or_default()
    }

    /// Sum of the step durations.
    #[must_use]
    pub fn steps_duration(&self) -> Duration {
        self.steps.iter().map(StepResult::duration).sum()
    }

    /// First failed step's [`StepError`], in execution order.
    #[must_use]
    pub fn error(&self) -> Option<&StepError> {
        self.steps.iter().find(|s| s.is_failed()).and_then(StepResult::error)
    }

    /// Message of the [`ScenarioResult::error()`].
    #[must_use]
    pub fn failure_message(&self) -> Option<&str> {
        self.error().map(StepError::message)
    }

    /// Number of passed steps, synthetic ones included.
    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.steps.iter().filter(|s| s.is_passed()).count()
    }

    /// Number of failed steps, synthetic ones included.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.steps.iter().filter(|s| s.is_failed()).count()
    }

    /// Number of skipped steps.
    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.steps.iter().filter(|s| s.is_skipped()).count()
    }

    /// Document-order key: section index, example index (`-1` for plain
    /// scenarios) and line.
    #[must_use]
    pub fn sort_key(&self) -> (usize, i32, usize) {
        (self.scenario.section_index, self.scenario.example_index, self.scenario.line)
    }

    /// Compares results by their [`ScenarioResult::sort_key()`].
    #[must_use]
    pub fn compare(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }

    /// JSON representation of this result.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let sc = &self.scenario;
        let mut json = json!({
            "name": sc.name,
            "description": sc.description,
            "line": sc.line,
            "refId": sc.ref_id(),
            "sectionIndex": sc.section_index,
            "exampleIndex": sc.example_index,
            "tags": sc.tags.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "passed": self.is_passed(),
            "failed": self.is_failed(),
            "durationMillis": millis(self.duration()),
            "threadName": self.thread_name,
            "failTagApplied": self.fail_tag_applied,
        });
        if let Some(data) = &sc.example_data {
            json["exampleData"] = crate::expr::Value::from(data.clone()).to_json();
        }
        if self.is_failed() {
            json["error"] = self.failure_message().into();
        }
        json["stepResults"] = self.steps.iter().map(StepResult::to_json).collect();
        json
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::Step;

    fn step() -> Arc<Step> {
        Arc::new(Step {
            keyword: "*".into(),
            text: "match a == 1".into(),
            line: 7,
            docstring: None,
            table: None,
            background: false,
        })
    }

    fn result(fail: bool) -> ScenarioResult {
        let mut res = ScenarioResult::new(Arc::new(Scenario::synthetic("s", 3)));
        let now = SystemTime::now();
        res.add_step_result(StepResult::passed(step(), now, Duration::ZERO));
        if fail {
            res.add_step_result(StepResult::failed(step(), now, Duration::ZERO, "mismatch"));
            res.add_step_result(StepResult::skipped(step(), now));
        }
        res
    }

    #[test]
    fn failure_is_any_failed_step() {
        let ok = result(false);
        assert!(ok.is_passed());
        assert_eq!(ok.failure_message(), None);

        let ko = result(true);
        assert!(ko.is_failed());
        assert_eq!(ko.failure_message(), Some("mismatch"));
        assert_eq!((ko.passed_count(), ko.failed_count(), ko.skipped_count()), (1, 1, 1));
    }

    #[test]
    fn fail_tag_inverts_failed_scenario() {
        let mut res = result(true);
        res.apply_fail_tag();
        assert!(res.is_passed());
        assert!(res.fail_tag_applied());
        assert_eq!(res.step_results().len(), 4);
        assert_eq!(res.passed_count(), 2);
    }

    #[test]
    fn fail_tag_inverts_passed_scenario() {
        let mut res = result(false);
        res.apply_fail_tag();
        assert!(res.is_failed());
        assert_eq!(res.step_results().len(), 2);
        assert_eq!(res.failed_count(), 1);
        assert_eq!(res.failure_message(), Some("scenario passed but was expected to fail"));
    }

    #[test]
    fn fail_tag_is_applied_once() {
        let mut res = result(true);
        res.apply_fail_tag();
        res.apply_fail_tag();
        assert_eq!(res.step_results().len(), 4);
        assert!(res.is_passed());
    }

    #[test]
    fn orders_by_section_example_and_line() {
        let mk = |section, example, line| {
            let mut sc = Scenario::synthetic("s", line);
            sc.section_index = section;
            sc.example_index = example;
            ScenarioResult::new(Arc::new(sc))
        };
        assert_eq!(mk(0, -1, 9).compare(&mk(1, -1, 2)), Ordering::Less);
        assert_eq!(mk(1, 2, 5).compare(&mk(1, 0, 5)), Ordering::Greater);
        assert_eq!(mk(1, 0, 5).compare(&mk(1, 0, 5)), Ordering::Equal);
    }
}
