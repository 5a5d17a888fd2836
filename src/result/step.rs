// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! [`StepResult`] definitions.

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use base64::Engine as _;
use derive_more::with_trait::{Display, Error as StdError};
use serde_json::json;

use super::{millis, FeatureResult};
use crate::feature::Step;

/// Outcome of a single step.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
pub enum Status {
    /// Step succeeded.
    #[display("passed")]
    Passed,

    /// Step failed.
    #[display("failed")]
    Failed,

    /// Step wasn't executed.
    #[display("skipped")]
    Skipped,
}

/// Failure recorded on a [`StepResult`].
///
/// Keeps only the rendered message, so results stay cloneable and can be
/// shared across threads.
#[derive(Clone, Debug, Display, Eq, PartialEq, StdError)]
#[display("{message}")]
pub struct StepError {
    #[error(not(source))]
    message: String,
}

impl StepError {
    /// Creates a new [`StepError`] out of the given `message`.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    /// Rendered failure message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<anyhow::Error> for StepError {
    fn from(e: anyhow::Error) -> Self {
        Self::new(format!("{e:#}"))
    }
}

impl From<&str> for StepError {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for StepError {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Attachment produced while a step ran (screenshots, documents, ...).
#[derive(Clone, Debug)]
pub struct Embed {
    /// Raw content.
    pub data: Vec<u8>,

    /// Content type of the [`Embed::data`].
    pub mime: mime::Mime,

    /// Optional display name.
    pub name: Option<String>,
}

impl Embed {
    /// JSON representation with base64 content.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut json = json!({
            "mime_type": self.mime.essence_str(),
            "data": base64::engine::general_purpose::STANDARD.encode(&self.data),
        });
        if let Some(name) = &self.name {
            json["name"] = name.as_str().into();
        }
        json
    }
}

/// Result of one executed (or skipped) step.
///
/// Synthetic results (see [`StepResult::fake_success()`]) carry no [`Step`]
/// and keep their description in the log.
#[derive(Clone, Debug)]
pub struct StepResult {
    step: Option<Arc<Step>>,
    status: Status,
    started_at: SystemTime,
    duration: Duration,
    error: Option<StepError>,
    log: String,
    embeds: Vec<Embed>,
    call_results: Vec<Arc<FeatureResult>>,
}

impl StepResult {
    fn new(
        step: Option<Arc<Step>>,
        status: Status,
        started_at: SystemTime,
        duration: Duration,
        error: Option<StepError>,
    ) -> Self {
        Self {
            step,
            status,
            started_at,
            duration,
            error,
            log: String::new(),
            embeds: Vec::new(),
            call_results: Vec::new(),
        }
    }

    /// Creates a [`Status::Passed`] result.
    #[must_use]
    pub fn passed(step: Arc<Step>, started_at: SystemTime, duration: Duration) -> Self {
        Self::new(Some(step), Status::Passed, started_at, duration, None)
    }

    /// Creates a [`Status::Failed`] result.
    #[must_use]
    pub fn failed(
        step: Arc<Step>,
        started_at: SystemTime,
        duration: Duration,
        error: impl Into<StepError>,
    ) -> Self {
        Self::new(Some(step), Status::Failed, started_at, duration, Some(error.into()))
    }

    /// Creates a [`Status::Skipped`] result.
    #[must_use]
    pub fn skipped(step: Arc<Step>, started_at: SystemTime) -> Self {
        Self::new(Some(step), Status::Skipped, started_at, Duration::ZERO, None)
    }

    /// Creates a synthetic passed result described by `message`.
    #[must_use]
    pub fn fake_success(message: impl Into<String>, started_at: SystemTime) -> Self {
        let mut res = Self::new(None, Status::Passed, started_at, Duration::ZERO, None);
        res.log = message.into();
        res
    }

    /// Creates a synthetic failed result described by `message`.
    #[must_use]
    pub fn fake_failure(
        message: impl Into<String>,
        started_at: SystemTime,
        error: impl Into<StepError>,
    ) -> Self {
        let mut res = Self::new(
            None,
            Status::Failed,
            started_at,
            Duration::ZERO,
            Some(error.into()),
        );
        res.log = message.into();
        res
    }

    /// Executed [`Step`], if this result isn't synthetic.
    #[must_use]
    pub const fn step(&self) -> Option<&Arc<Step>> {
        self.step.as_ref()
    }

    /// [`Status`] of this result.
    #[must_use]
    pub const fn status(&self) -> Status {
        self.status
    }

    /// Time the step started at.
    #[must_use]
    pub const fn started_at(&self) -> SystemTime {
        self.started_at
    }

    /// Time the step took.
    #[must_use]
    pub const fn duration(&self) -> Duration {
        self.duration
    }

    /// Failure of this step, if any.
    #[must_use]
    pub const fn error(&self) -> Option<&StepError> {
        self.error.as_ref()
    }

    /// Message of the [`StepResult::error()`], if any.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(StepError::message)
    }

    /// Log captured while the step ran.
    #[must_use]
    pub fn log(&self) -> &str {
        &self.log
    }

    /// Appends a line to the captured log.
    pub fn append_log(&mut self, line: &str) {
        if !self.log.is_empty() && !self.log.ends_with('\n') {
            self.log.push('\n');
        }
        self.log.push_str(line);
    }

    /// [`Embed`]s attached while the step ran.
    #[must_use]
    pub fn embeds(&self) -> &[Embed] {
        &self.embeds
    }

    /// Attaches an [`Embed`].
    pub fn add_embed(&mut self, embed: Embed) {
        self.embeds.push(embed);
    }

    /// Results of the features called from this step.
    #[must_use]
    pub fn call_results(&self) -> &[Arc<FeatureResult>] {
        &self.call_results
    }

    /// Records the result of a feature called from this step.
    pub fn add_call_result(&mut self, result: Arc<FeatureResult>) {
        self.call_results.push(result);
    }

    /// Indicates whether this step passed.
    #[must_use]
    pub fn is_passed(&self) -> bool {
        self.status == Status::Passed
    }

    /// Indicates whether this step failed.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.status == Status::Failed
    }

    /// Indicates whether this step was skipped.
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        self.status == Status::Skipped
    }

    /// JSON representation of this result.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut json = match &self.step {
            Some(step) => json!({
                "keyword": step.keyword,
                "text": step.text,
                "line": step.line,
            }),
            None => json!({"keyword": "*", "text": self.log, "line": 0}),
        };
        json["status"] = self.status.to_string().into();
        json["durationMillis"] = millis(self.duration).into();
        if let Some(e) = &self.error {
            json["error"] = e.message().into();
        }
        if !self.log.is_empty() {
            json["log"] = self.log.as_str().into();
        }
        if let Some(doc) = self.step.as_ref().and_then(|s| s.docstring.as_ref()) {
            json["docString"] = doc.as_str().into();
        }
        if let Some(table) = self.step.as_ref().and_then(|s| s.table.as_ref()) {
            json["table"] = json!(table);
        }
        if !self.embeds.is_empty() {
            json["embeds"] = self.embeds.iter().map(Embed::to_json).collect();
        }
        if !self.call_results.is_empty() {
            json["callResults"] = self.call_results.iter().map(|r| r.to_json()).collect();
        }
        json
    }
}
