// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Mutable context of a running scenario.

use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    time::{Instant, SystemTime},
};

use anyhow::{anyhow, bail, Context as _};

use super::{
    feature::{result_variables, FeatureRef},
    FeatureRuntime, WorkerContext,
};
use crate::{
    event::{self, ErrorSource, RunEvent},
    expr::{self, Bindings, Map, Value},
    feature::{Feature, Scenario, Step},
    http::{HttpRequest, HttpResponse, RequestBuilder},
    logging,
    result::{Embed, FeatureResult, ScenarioResult, StepResult},
    runner::Suite,
    tag::Tag,
};

/// Per-scenario binding context handed to the [`StepExecutor`].
///
/// [`StepExecutor`]: crate::steps::StepExecutor
#[derive(Debug)]
pub struct ScenarioContext<'w> {
    worker: &'w mut WorkerContext,
    feature: Arc<FeatureRuntime>,
    scenario: Arc<Scenario>,

    /// Variables visible to the step bodies.
    pub vars: Bindings,

    /// HTTP request being assembled by the steps.
    pub request: RequestBuilder,

    configured: Map,
    embeds: Vec<Embed>,
    call_results: Vec<Arc<FeatureResult>>,
}

impl<'w> ScenarioContext<'w> {
    /// Creates the context of the `scenario` of the given `feature`, binding
    /// [its variables](FeatureRuntime::bindings) and the example row, if
    /// any, both as `__row` and as individual variables.
    pub fn new(
        worker: &'w mut WorkerContext,
        feature: Arc<FeatureRuntime>,
        scenario: Arc<Scenario>,
    ) -> Self {
        let mut vars = feature.bindings();
        if let Some(row) = &scenario.example_data {
            for (k, v) in row {
                vars.set(k.clone(), v.clone());
            }
            vars.set("__row", row.clone());
            vars.set("__num", i64::from(scenario.example_index));
        }
        Self::with_bindings(worker, feature, scenario, vars)
    }

    /// Creates a context starting with the given `vars` only.
    pub fn with_bindings(
        worker: &'w mut WorkerContext,
        feature: Arc<FeatureRuntime>,
        scenario: Arc<Scenario>,
        vars: Bindings,
    ) -> Self {
        Self {
            worker,
            feature,
            scenario,
            vars,
            request: RequestBuilder::default(),
            configured: Map::new(),
            embeds: Vec::new(),
            call_results: Vec::new(),
        }
    }

    /// [`Suite`] being run.
    #[must_use]
    pub fn suite(&self) -> &Arc<Suite> {
        self.worker.suite()
    }

    /// Runtime of the feature this scenario belongs to.
    #[must_use]
    pub const fn feature(&self) -> &Arc<FeatureRuntime> {
        &self.feature
    }

    /// Running [`Scenario`].
    #[must_use]
    pub const fn scenario(&self) -> &Arc<Scenario> {
        &self.scenario
    }

    /// Settings recorded by `configure` steps.
    #[must_use]
    pub const fn configuration(&self) -> &Map {
        &self.configured
    }

    /// Records a `configure` setting.
    pub fn configure(&mut self, key: impl Into<String>, value: Value) {
        _ = self.configured.insert(key.into(), value);
    }

    /// Evaluates `source` against the variables of this scenario.
    ///
    /// # Errors
    ///
    /// See [`expr::Evaluator::eval()`].
    pub fn eval(&mut self, source: &str) -> Result<Value, expr::Error> {
        let evaluator = Arc::clone(self.worker.suite().evaluator());
        evaluator.eval(source, &mut self.vars)
    }

    /// Appends a `line` to the log of the running step.
    pub fn log(&mut self, line: &str) {
        tracing::info!(target: logging::PRINT_TARGET, "{line}");
        logging::append(line);
    }

    /// Attaches an [`Embed`] to the running step.
    pub fn embed(&mut self, embed: Embed) {
        self.embeds.push(embed);
    }

    /// Calls `target` with an optional `arg`.
    ///
    /// A feature target (a [`FeatureRef`] value or a path string) runs in
    /// its own scope on this worker, once per item if `arg` is an array,
    /// and yields the variables its last scenario ended with. A function
    /// target is invoked with `arg`.
    ///
    /// # Errors
    ///
    /// If the target can't be loaded, or the called feature or function
    /// failed.
    pub fn call(&mut self, target: &Value, arg: Option<Value>) -> anyhow::Result<Value> {
        match target {
            Value::Function(_) => {
                let args = arg.into_iter().collect::<Vec<_>>();
                Ok(expr::call(target, &args)?)
            }
            _ => {
                let feature_ref = self.feature_ref(target)?;
                self.call_feature(&feature_ref, arg)
            }
        }
    }

    /// Like [`ScenarioContext::call()`] on a feature target, but caches the
    /// outcome for the lifetime of the calling feature. Failures aren't
    /// cached.
    ///
    /// # Errors
    ///
    /// See [`ScenarioContext::call()`].
    pub fn callonce(&mut self, target: &Value, arg: Option<Value>) -> anyhow::Result<Value> {
        let feature_ref = self.feature_ref(target)?;
        let cell = self.feature.callonce_cell(feature_ref.cache_key());
        cell.get_or_try_init(|| self.call_feature(&feature_ref, arg)).cloned()
    }

    /// Like [`ScenarioContext::callonce()`], but caching for the whole
    /// [`Suite`]: the feature runs at most once even when several workers
    /// ask for it at the same time.
    ///
    /// # Errors
    ///
    /// See [`ScenarioContext::call()`].
    pub fn call_single(&mut self, target: &Value, arg: Option<Value>) -> anyhow::Result<Value> {
        let feature_ref = self.feature_ref(target)?;
        let cell = self.suite().call_single_cell(feature_ref.cache_key());
        cell.get_or_try_init(|| self.call_feature(&feature_ref, arg)).cloned()
    }

    /// Runs the `@setup` scenario of the current feature (the one with the
    /// given `name`, if any) and returns its variables.
    ///
    /// # Errors
    ///
    /// If there is no such scenario or it failed.
    pub fn setup(&mut self, name: Option<&str>) -> anyhow::Result<Value> {
        let callee = Arc::new(FeatureRuntime::called(
            &self.feature,
            Arc::clone(self.feature.feature()),
            None,
            -1,
        ));
        let evaluator = Arc::clone(self.suite().evaluator());
        let scenarios = callee
            .feature()
            .scenarios(evaluator.as_ref(), &callee.bindings())
            .map_err(|e| anyhow!("{e}"))?;
        let scenario = scenarios
            .into_iter()
            .find(|s| s.has_tag(Tag::SETUP) && name.map_or(true, |n| s.name == n))
            .ok_or_else(|| match name {
                Some(n) => anyhow!("no @setup scenario named `{n}`"),
                None => anyhow!("no @setup scenario found"),
            })?;

        let vars = run_called(self.worker, &callee, vec![scenario]);
        self.call_results.push(Arc::clone(callee.result()));
        ensure_passed(callee.result())?;
        Ok(Value::Object(vars))
    }

    /// Sends the `request` through the worker's [`HttpClient`], firing
    /// `HTTP_ENTER` and `HTTP_EXIT`. A vetoed request isn't sent and yields
    /// a response with status `0`.
    ///
    /// # Errors
    ///
    /// If no [`HttpClient`] is configured or it failed.
    ///
    /// [`HttpClient`]: crate::http::HttpClient
    pub fn http(&mut self, request: HttpRequest) -> anyhow::Result<HttpResponse> {
        let proceed = self.worker.fire(RunEvent::HttpEnter {
            feature: &self.feature,
            request: &request,
        });
        let response = if proceed {
            let client = self
                .worker
                .http_client()
                .ok_or_else(|| anyhow!("no HTTP client configured"))?;
            let start = Instant::now();
            let mut response = client
                .send(&request)
                .with_context(|| format!("{} {} failed", request.method(), request.url()))?;
            response.response_time = start.elapsed();
            response
        } else {
            HttpResponse::new(0)
        };
        self.worker.notify(RunEvent::HttpExit {
            feature: &self.feature,
            request: &request,
            response: &response,
        });
        Ok(response)
    }

    fn feature_ref(&self, target: &Value) -> anyhow::Result<FeatureRef> {
        match target {
            Value::Native(n) => n
                .downcast_ref::<FeatureRef>()
                .cloned()
                .ok_or_else(|| anyhow!("not a callable feature")),
            Value::String(s) => Ok(FeatureRef::parse(s, self.feature.feature())),
            other => bail!("can't call a value of type {}", other.type_name()),
        }
    }

    fn call_feature(&mut self, target: &FeatureRef, arg: Option<Value>) -> anyhow::Result<Value> {
        let feature = self.suite().load_feature(&target.path)?;
        match arg {
            Some(Value::Array(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.into_iter().enumerate() {
                    let i = i32::try_from(i).unwrap_or(i32::MAX);
                    out.push(Value::Object(self.call_once(&feature, target, Some(item), i)?));
                }
                Ok(Value::Array(out))
            }
            arg => Ok(Value::Object(self.call_once(&feature, target, arg, -1)?)),
        }
    }

    fn call_once(
        &mut self,
        feature: &Arc<Feature>,
        target: &FeatureRef,
        arg: Option<Value>,
        loop_index: i32,
    ) -> anyhow::Result<Map> {
        let callee = Arc::new(FeatureRuntime::called(
            &self.feature,
            Arc::clone(feature),
            arg,
            loop_index,
        ));
        let evaluator = Arc::clone(self.suite().evaluator());
        let vars = match feature.scenarios(evaluator.as_ref(), &callee.bindings()) {
            Ok(scenarios) => {
                let selected = scenarios
                    .into_iter()
                    .filter(|s| match &target.tag {
                        Some(tag) => s.has_tag(tag),
                        None => !s.is_ignored() && !s.has_tag(Tag::SETUP),
                    })
                    .collect();
                run_called(self.worker, &callee, selected)
            }
            Err(e) => {
                callee.result().add_error(e.to_string());
                callee.result().close();
                Map::new()
            }
        };
        self.call_results.push(Arc::clone(callee.result()));
        ensure_passed(callee.result())?;
        Ok(vars)
    }

    /// Runs the whole scenario: fires the scenario and step events, executes
    /// every step through the [`Suite`]'s step executor until one fails, and
    /// applies the `@fail` inversion.
    ///
    /// Returns the finished result and the variables the scenario ended
    /// with.
    pub fn run(mut self) -> (ScenarioResult, Bindings) {
        let suite = Arc::clone(self.suite());
        let scenario = Arc::clone(&self.scenario);
        let top_level = self.feature.caller().is_none();

        if top_level {
            for l in suite.result_listeners() {
                event::guarded("result listener", (), || l.on_scenario_start(&scenario));
            }
        }
        let mut result = ScenarioResult::new(Arc::clone(&scenario))
            .with_thread_name(self.worker.name());
        let proceed = self.worker.fire(RunEvent::ScenarioEnter {
            feature: &self.feature,
            scenario: &scenario,
        });
        let execute = proceed && !suite.is_dry_run();
        if !proceed {
            tracing::debug!("scenario `{}` skipped by a listener", scenario.name);
        }

        let mut stopped = !execute;
        for step in scenario.all_steps() {
            if stopped {
                result.add_step_result(StepResult::skipped(Arc::clone(step), SystemTime::now()));
                continue;
            }
            let enter = self.worker.fire(RunEvent::StepEnter {
                feature: &self.feature,
                scenario: &scenario,
                step,
            });
            if !enter {
                result.add_step_result(StepResult::skipped(Arc::clone(step), SystemTime::now()));
                continue;
            }
            let step_result = self.run_step(step);
            self.worker.notify(RunEvent::StepExit {
                feature: &self.feature,
                scenario: &scenario,
                result: &step_result,
            });
            if let Some(msg) = step_result.error_message() {
                self.worker.notify(RunEvent::Error {
                    feature: Some(self.feature.as_ref()),
                    scenario: Some(scenario.as_ref()),
                    source: ErrorSource::Step,
                    message: msg,
                });
                stopped = true;
            }
            result.add_step_result(step_result);
        }

        if execute && scenario.has_tag(Tag::FAIL) {
            result.apply_fail_tag();
        }
        result.finish();

        self.worker.notify(RunEvent::ScenarioExit {
            feature: &self.feature,
            scenario: &scenario,
            result: &result,
        });
        if top_level {
            for l in suite.result_listeners() {
                event::guarded("result listener", (), || l.on_scenario_end(&result));
            }
        }
        (result, self.vars)
    }

    /// Executes a single `step`, capturing its log. A panicking executor
    /// fails the step.
    pub fn run_step(&mut self, step: &Arc<Step>) -> StepResult {
        let executor = Arc::clone(self.suite().step_executor());
        let started_at = SystemTime::now();
        let timer = Instant::now();

        let (outcome, log) = logging::capture(|| {
            panic::catch_unwind(AssertUnwindSafe(|| executor.execute(step, self)))
        });
        let duration = timer.elapsed();
        let mut result = match outcome {
            Ok(Ok(())) => StepResult::passed(Arc::clone(step), started_at, duration),
            Ok(Err(e)) => StepResult::failed(Arc::clone(step), started_at, duration, e),
            Err(panic) => {
                let msg = panic
                    .downcast_ref::<String>()
                    .cloned()
                    .or_else(|| panic.downcast_ref::<&str>().map(|s| (*s).to_owned()))
                    .unwrap_or_else(|| "step panicked".into());
                StepResult::failed(Arc::clone(step), started_at, duration, msg)
            }
        };
        if !log.is_empty() {
            result.append_log(log.trim_end());
        }
        for embed in self.embeds.drain(..) {
            result.add_embed(embed);
        }
        for call in self.call_results.drain(..) {
            result.add_call_result(call);
        }
        result
    }
}

/// Runs the given `scenarios` of a called feature on the current worker,
/// firing its feature events, and returns the variables of the last one.
fn run_called(
    worker: &mut WorkerContext,
    callee: &Arc<FeatureRuntime>,
    scenarios: Vec<Arc<Scenario>>,
) -> Map {
    let result = Arc::clone(callee.result());
    if !worker.fire(RunEvent::FeatureEnter { feature: callee }) {
        result.close();
        return Map::new();
    }
    let mut last = Bindings::new();
    for scenario in scenarios {
        let (sr, vars) = ScenarioContext::new(worker, Arc::clone(callee), scenario).run();
        result.add_scenario_result(Arc::new(sr));
        last = vars;
    }
    let vars = result_variables(&last);
    result.sort_scenario_results();
    result.set_result_variables(vars.clone());
    result.close();
    worker.notify(RunEvent::FeatureExit { feature: callee, result: &result });
    vars
}

fn ensure_passed(result: &FeatureResult) -> anyhow::Result<()> {
    if let Some(msg) = result.failure_message() {
        bail!("called feature `{}` failed: {msg}", result.display_name());
    }
    Ok(())
}
