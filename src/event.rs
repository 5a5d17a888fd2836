// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Key occurrences in the lifecycle of a run.
//!
//! Every occurrence is a [`RunEvent`] wrapped into an [`Event`] carrying the
//! time it happened at. Events borrow the runtime objects they describe, so
//! listeners observe them synchronously and never outlive them.

mod hook;
mod json_lines;
mod listener;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use derive_more::with_trait::{AsRef, Deref, DerefMut, Display};
use serde_json::json;

pub use self::{
    hook::{HookAdapter, RuntimeHook},
    json_lines::{JsonLinesListener, FILE_NAME as EVENTS_FILE_NAME},
    listener::{
        listener_fn, FnListener, ResultListener, RunListener, RunListenerFactory,
        ThreadListener,
    },
};
pub(crate) use self::listener::{dispatch, guarded, notify};
use crate::{
    feature::{Scenario, Step},
    http::{HttpRequest, HttpResponse},
    result::{FeatureResult, ScenarioResult, StepResult, SuiteResult},
    runner::Suite,
    runtime::FeatureRuntime,
};

/// Arbitrary event, paired with the time it happened at.
#[derive(AsRef, Clone, Copy, Debug, Deref, DerefMut)]
pub struct Event<T: ?Sized> {
    /// [`SystemTime`] when this [`Event`] has happened.
    pub at: SystemTime,

    /// Actual value of this [`Event`].
    #[as_ref]
    #[deref]
    #[deref_mut]
    pub value: T,
}

impl<T> Event<T> {
    /// Creates a new [`Event`] out of the given `value`, happening now.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self { at: SystemTime::now(), value }
    }

    /// Unwraps the inner [`Event::value`] loosing the timestamp.
    #[must_use]
    pub fn into_inner(self) -> T {
        self.value
    }

    /// Milliseconds since the Unix epoch this [`Event`] happened at.
    #[must_use]
    pub fn timestamp_millis(&self) -> u64 {
        let since = self.at.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
        u64::try_from(since.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Kind of a [`RunEvent`].
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
pub enum RunEventKind {
    /// [`RunEvent::SuiteEnter`].
    #[display("SUITE_ENTER")]
    SuiteEnter,

    /// [`RunEvent::SuiteExit`].
    #[display("SUITE_EXIT")]
    SuiteExit,

    /// [`RunEvent::FeatureEnter`].
    #[display("FEATURE_ENTER")]
    FeatureEnter,

    /// [`RunEvent::FeatureExit`].
    #[display("FEATURE_EXIT")]
    FeatureExit,

    /// [`RunEvent::ScenarioEnter`].
    #[display("SCENARIO_ENTER")]
    ScenarioEnter,

    /// [`RunEvent::ScenarioExit`].
    #[display("SCENARIO_EXIT")]
    ScenarioExit,

    /// [`RunEvent::StepEnter`].
    #[display("STEP_ENTER")]
    StepEnter,

    /// [`RunEvent::StepExit`].
    #[display("STEP_EXIT")]
    StepExit,

    /// [`RunEvent::HttpEnter`].
    #[display("HTTP_ENTER")]
    HttpEnter,

    /// [`RunEvent::HttpExit`].
    #[display("HTTP_EXIT")]
    HttpExit,

    /// [`RunEvent::Error`].
    #[display("ERROR")]
    Error,

    /// [`RunEvent::Progress`].
    #[display("PROGRESS")]
    Progress,
}

impl RunEventKind {
    /// Indicates whether a listener returning `false` for an event of this
    /// kind skips the unit about to start.
    #[must_use]
    pub const fn can_veto(self) -> bool {
        matches!(
            self,
            Self::SuiteEnter
                | Self::FeatureEnter
                | Self::ScenarioEnter
                | Self::StepEnter
                | Self::HttpEnter,
        )
    }
}

/// Where an [`RunEvent::Error`] originates from.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum ErrorSource {
    /// A step failed.
    #[display("step")]
    Step,

    /// A feature couldn't be turned into runnable scenarios.
    #[display("feature")]
    Feature,
}

/// Lifecycle event of a run.
#[derive(Clone, Copy, Debug)]
pub enum RunEvent<'a> {
    /// Suite is about to run.
    SuiteEnter {
        /// Running [`Suite`].
        suite: &'a Suite,
    },

    /// Suite finished.
    SuiteExit {
        /// Finished [`Suite`].
        suite: &'a Suite,

        /// Its result.
        result: &'a SuiteResult,
    },

    /// Feature is about to run, either top-level or called.
    FeatureEnter {
        /// Runtime of the feature.
        feature: &'a FeatureRuntime,
    },

    /// Feature finished.
    FeatureExit {
        /// Runtime of the feature.
        feature: &'a FeatureRuntime,

        /// Its result.
        result: &'a FeatureResult,
    },

    /// Scenario is about to run.
    ScenarioEnter {
        /// Runtime of the owning feature.
        feature: &'a FeatureRuntime,

        /// Scenario about to run.
        scenario: &'a Scenario,
    },

    /// Scenario finished.
    ScenarioExit {
        /// Runtime of the owning feature.
        feature: &'a FeatureRuntime,

        /// Finished scenario.
        scenario: &'a Scenario,

        /// Its result.
        result: &'a ScenarioResult,
    },

    /// Step is about to run.
    StepEnter {
        /// Runtime of the owning feature.
        feature: &'a FeatureRuntime,

        /// Owning scenario.
        scenario: &'a Scenario,

        /// Step about to run.
        step: &'a Step,
    },

    /// Step finished.
    StepExit {
        /// Runtime of the owning feature.
        feature: &'a FeatureRuntime,

        /// Owning scenario.
        scenario: &'a Scenario,

        /// Its result.
        result: &'a StepResult,
    },

    /// HTTP request is about to be sent.
    HttpEnter {
        /// Runtime of the feature sending it.
        feature: &'a FeatureRuntime,

        /// Request about to be sent.
        request: &'a HttpRequest,
    },

    /// HTTP response was received, or the request was vetoed.
    HttpExit {
        /// Runtime of the feature that sent it.
        feature: &'a FeatureRuntime,

        /// Sent request.
        request: &'a HttpRequest,

        /// Received response.
        response: &'a HttpResponse,
    },

    /// Something failed: a step, or a whole feature before it could run.
    Error {
        /// Runtime of the failed feature, if it got one.
        feature: Option<&'a FeatureRuntime>,

        /// Failed scenario, if any.
        scenario: Option<&'a Scenario>,

        /// What failed.
        source: ErrorSource,

        /// Failure message.
        message: &'a str,
    },

    /// Another top-level scenario unit completed.
    Progress {
        /// Number of completed scenarios.
        completed: usize,

        /// Number of scenarios planned.
        total: usize,
    },
}

impl RunEvent<'_> {
    /// [`RunEventKind`] of this event.
    #[must_use]
    pub const fn kind(&self) -> RunEventKind {
        match self {
            Self::SuiteEnter { .. } => RunEventKind::SuiteEnter,
            Self::SuiteExit { .. } => RunEventKind::SuiteExit,
            Self::FeatureEnter { .. } => RunEventKind::FeatureEnter,
            Self::FeatureExit { .. } => RunEventKind::FeatureExit,
            Self::ScenarioEnter { .. } => RunEventKind::ScenarioEnter,
            Self::ScenarioExit { .. } => RunEventKind::ScenarioExit,
            Self::StepEnter { .. } => RunEventKind::StepEnter,
            Self::StepExit { .. } => RunEventKind::StepExit,
            Self::HttpEnter { .. } => RunEventKind::HttpEnter,
            Self::HttpExit { .. } => RunEventKind::HttpExit,
            Self::Error { .. } => RunEventKind::Error,
            Self::Progress { .. } => RunEventKind::Progress,
        }
    }

    /// Runtime of the feature this event belongs to, if any.
    #[must_use]
    pub fn feature(&self) -> Option<&FeatureRuntime> {
        match self {
            Self::SuiteEnter { .. } | Self::SuiteExit { .. } | Self::Progress { .. } => None,
            Self::FeatureEnter { feature }
            | Self::FeatureExit { feature, .. }
            | Self::ScenarioEnter { feature, .. }
            | Self::ScenarioExit { feature, .. }
            | Self::StepEnter { feature, .. }
            | Self::StepExit { feature, .. }
            | Self::HttpEnter { feature, .. }
            | Self::HttpExit { feature, .. } => Some(*feature),
            Self::Error { feature, .. } => *feature,
        }
    }

    /// Number of call hops between the feature of this event and the
    /// top-level run. Walks the caller chain every time.
    #[must_use]
    pub fn call_depth(&self) -> usize {
        self.feature().map_or(0, FeatureRuntime::depth)
    }

    /// Indicates whether this event belongs to a top-level feature, or to
    /// none.
    #[must_use]
    pub fn is_top_level(&self) -> bool {
        self.feature().map_or(true, |f| f.caller().is_none())
    }

    /// JSON payload describing this event.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let scenario_json = |f: &FeatureRuntime, s: &Scenario| {
            json!({
                "feature": f.feature().display_name(),
                "name": s.name,
                "line": s.line,
                "refId": s.ref_id(),
            })
        };
        match self {
            Self::SuiteEnter { .. } => json!({}),
            Self::SuiteExit { result, .. } => result.summary_json(),
            Self::FeatureEnter { feature } => json!({
                "path": feature.feature().display_name(),
                "name": feature.feature().name,
                "callDepth": feature.depth(),
            }),
            Self::FeatureExit { feature, result } => json!({
                "path": feature.feature().display_name(),
                "name": feature.feature().name,
                "callDepth": feature.depth(),
                "passed": result.is_passed(),
                "scenarioCount": result.scenario_count(),
                "durationMs": crate::result::millis(result.duration()),
            }),
            Self::ScenarioEnter { feature, scenario } => scenario_json(feature, scenario),
            Self::ScenarioExit { feature, scenario, result } => {
                let mut json = scenario_json(feature, scenario);
                json["passed"] = result.is_passed().into();
                json["durationMs"] = crate::result::millis(result.duration()).into();
                json
            }
            Self::StepEnter { step, .. } => json!({
                "keyword": step.keyword,
                "text": step.text,
                "line": step.line,
            }),
            Self::StepExit { result, .. } => result.to_json(),
            Self::HttpEnter { request, .. } => json!({
                "method": request.method(),
                "url": request.url(),
            }),
            Self::HttpExit { request, response, .. } => json!({
                "method": request.method(),
                "url": request.url(),
                "status": response.status,
                "responseTime": crate::result::millis(response.response_time),
            }),
            Self::Error { feature, scenario, source, message } => {
                let mut json = json!({"message": message, "type": source.to_string()});
                if let Some(f) = feature {
                    json["feature"] = f.feature().display_name().into();
                }
                if let Some(s) = scenario {
                    json["scenario"] = s.name.as_str().into();
                    json["refId"] = s.ref_id().into();
                }
                json
            }
            Self::Progress { completed, total } => {
                #[allow(clippy::cast_precision_loss)]
                let percent = if *total == 0 {
                    100.0
                } else {
                    (*completed as f64 * 100.0 / *total as f64).round()
                };
                json!({"completed": completed, "total": total, "percent": percent})
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_display_as_wire_names() {
        assert_eq!(RunEventKind::ScenarioEnter.to_string(), "SCENARIO_ENTER");
        assert_eq!(RunEventKind::HttpExit.to_string(), "HTTP_EXIT");
        assert_eq!(
            RunEvent::Progress { completed: 1, total: 4 }.kind(),
            RunEventKind::Progress,
        );
    }

    #[test]
    fn only_enter_kinds_can_veto() {
        assert!(RunEventKind::SuiteEnter.can_veto());
        assert!(RunEventKind::HttpEnter.can_veto());
        assert!(!RunEventKind::ScenarioExit.can_veto());
        assert!(!RunEventKind::Error.can_veto());
        assert!(!RunEventKind::Progress.can_veto());
    }

    #[test]
    fn progress_payload() {
        let ev = RunEvent::Progress { completed: 1, total: 3 };
        assert_eq!(ev.to_json(), json!({"completed": 1, "total": 3, "percent": 33.0}));
        assert_eq!(ev.call_depth(), 0);
        assert!(ev.is_top_level());
    }

    #[test]
    fn error_payload_without_feature() {
        let ev = RunEvent::Error {
            feature: None,
            scenario: None,
            source: ErrorSource::Feature,
            message: "boom",
        };
        assert_eq!(ev.to_json(), json!({"message": "boom", "type": "feature"}));
    }
}
