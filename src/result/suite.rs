// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! [`SuiteResult`] definition.

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use serde_json::json;

use super::{millis, FeatureResult};

/// Result of a whole suite run.
///
/// Owned by the single aggregator of a run, which appends every
/// [`FeatureResult`] as it arrives. Every count is computed from the
/// children on demand.
#[derive(Debug)]
pub struct SuiteResult {
    features: Vec<Arc<FeatureResult>>,
    threads: usize,
    started_at: SystemTime,
    ended_at: Option<SystemTime>,
}

impl SuiteResult {
    /// Starts a new [`SuiteResult`] of a run with the given number of
    /// `threads`.
    #[must_use]
    pub fn new(threads: usize) -> Self {
        Self {
            features: Vec::new(),
            threads: threads.max(1),
            started_at: SystemTime::now(),
            ended_at: None,
        }
    }

    /// Appends a top-level [`FeatureResult`].
    pub fn add_feature_result(&mut self, result: Arc<FeatureResult>) {
        self.features.push(result);
    }

    /// Marks the run finished now.
    pub fn finish(&mut self) {
        self.ended_at = Some(SystemTime::now());
    }

    /// Top-level feature results.
    #[must_use]
    pub fn feature_results(&self) -> &[Arc<FeatureResult>] {
        &self.features
    }

    /// Size of the worker pool the run used.
    #[must_use]
    pub const fn threads(&self) -> usize {
        self.threads
    }

    /// Time the run started at.
    #[must_use]
    pub const fn started_at(&self) -> SystemTime {
        self.started_at
    }

    /// Number of features.
    #[must_use]
    pub fn feature_count(&self) -> usize {
        self.features.len()
    }

    /// Number of passed features.
    #[must_use]
    pub fn features_passed(&self) -> usize {
        self.features.iter().filter(|f| f.is_passed()).count()
    }

    /// Number of failed features.
    #[must_use]
    pub fn features_failed(&self) -> usize {
        self.features.iter().filter(|f| f.is_failed()).count()
    }

    /// Number of scenarios over every feature.
    #[must_use]
    pub fn scenario_count(&self) -> usize {
        self.features.iter().map(|f| f.scenario_count()).sum()
    }

    /// Number of passed scenarios over every feature.
    #[must_use]
    pub fn scenarios_passed(&self) -> usize {
        self.features.iter().map(|f| f.passed_count()).sum()
    }

    /// Number of failed scenarios over every feature.
    #[must_use]
    pub fn scenarios_failed(&self) -> usize {
        self.features.iter().map(|f| f.failed_count()).sum()
    }

    /// Failure messages of the failed features, prefixed with their names.
    #[must_use]
    pub fn errors(&self) -> Vec<String> {
        self.features
            .iter()
            .filter_map(|f| {
                f.failure_message().map(|m| format!("{}: {m}", f.display_name()))
            })
            .collect()
    }

    /// Wall-clock time of the run.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.ended_at
            .unwrap_or_else(SystemTime::now)
            .duration_since(self.started_at)
            .unwrap_or_default()
    }

    /// Sum of the feature durations.
    #[must_use]
    pub fn thread_time(&self) -> Duration {
        self.features.iter().map(|f| f.duration()).sum()
    }

    /// Share of the pool's capacity spent running features, between `0` and
    /// `1` for runs without contention.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn efficiency(&self) -> f64 {
        let capacity = self.duration().as_secs_f64() * self.threads as f64;
        if capacity == 0.0 {
            return 0.0;
        }
        self.thread_time().as_secs_f64() / capacity
    }

    /// Indicates whether any top-level feature failed.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.features.iter().any(|f| f.is_failed())
    }

    /// Indicates whether every top-level feature passed.
    #[must_use]
    pub fn is_passed(&self) -> bool {
        !self.is_failed()
    }

    /// Process exit code: `0` if passed, `1` otherwise.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::from(self.is_failed())
    }

    /// Summary part of [`SuiteResult::to_json()`].
    #[must_use]
    pub fn summary_json(&self) -> serde_json::Value {
        json!({
            "featureCount": self.feature_count(),
            "featuresPassed": self.features_passed(),
            "featuresFailed": self.features_failed(),
            "scenarioCount": self.scenario_count(),
            "scenariosPassed": self.scenarios_passed(),
            "scenariosFailed": self.scenarios_failed(),
            "durationMillis": millis(self.duration()),
            "passed": self.is_passed(),
        })
    }

    /// JSON representation of this result.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "features": self.features.iter().map(|f| f.to_json()).collect::<Vec<_>>(),
            "summary": self.summary_json(),
        })
    }
}
