// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! [`Builder`] of a run.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use derive_more::with_trait::Debug;
use tracing::level_filters::LevelFilter;

use super::{pool, Suite};
use crate::{
    event::{
        HookAdapter, JsonLinesListener, ResultListener, RunListener, RunListenerFactory,
        RuntimeHook, EVENTS_FILE_NAME,
    },
    expr::{Evaluator, Map, Value},
    feature::Feature,
    http::HttpClientFactory,
    result::SuiteResult,
    selector::{self, TagSelector},
    steps::StepExecutor,
    writer::{self, Ext as _},
};

/// Accumulates the configuration of a run.
///
/// Created with [`Runner::builder()`] or [`Runner::path()`], and consumed by
/// [`Builder::build()`] or the terminal [`Builder::parallel()`].
///
/// [`Runner::builder()`]: super::Runner::builder
/// [`Runner::path()`]: super::Runner::path
#[derive(Debug, Default)]
pub struct Builder {
    suite: Suite,
    tags: Vec<String>,
    variables_file: Option<PathBuf>,
    explicit_variables: Map,
}

impl Builder {
    /// Adds a feature file or a directory to discover `*.feature` files in.
    #[must_use]
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.suite.paths.push(path.into());
        self
    }

    /// Adds an already parsed [`Feature`].
    #[must_use]
    pub fn feature(mut self, feature: impl Into<Arc<Feature>>) -> Self {
        self.suite.features.push(feature.into());
        self
    }

    /// Adds a tag expression.
    ///
    /// Expressions of several calls must all hold. Cucumber-style
    /// expressions (`@a,@b`, `~@slow`) are converted into selector
    /// expressions, which are accepted as is.
    #[must_use]
    pub fn tags(mut self, tags: impl Into<String>) -> Self {
        self.tags.push(tags.into());
        self
    }

    /// Sets the environment name, exposed to scenarios as `env`.
    #[must_use]
    pub fn env(mut self, env: impl Into<String>) -> Self {
        self.suite.env = Some(env.into());
        self
    }

    /// Sets the number of workers. `0` is taken as `1`.
    #[must_use]
    pub fn threads(mut self, threads: usize) -> Self {
        self.suite.threads = threads.max(1);
        self
    }

    /// Resolves the scenarios without executing their steps.
    #[must_use]
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.suite.dry_run = dry_run;
        self
    }

    /// Sets the directory reports are written into.
    #[must_use]
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.suite.output.dir = dir.into();
        self
    }

    /// Toggles the console summary.
    #[must_use]
    pub fn console_summary(mut self, enabled: bool) -> Self {
        self.suite.output.console_summary = enabled;
        self
    }

    /// Toggles the `results.json` report.
    #[must_use]
    pub fn json_report(mut self, enabled: bool) -> Self {
        self.suite.output.json_report = enabled;
        self
    }

    /// Toggles the `events.jsonl` event stream.
    #[must_use]
    pub fn json_lines(mut self, enabled: bool) -> Self {
        self.suite.output.json_lines = enabled;
        self
    }

    /// Binds a variable into every scenario, overriding the variables file.
    #[must_use]
    pub fn variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        _ = self.explicit_variables.insert(name.into(), value.into());
        self
    }

    /// Reads variables bound into every scenario from the JSON object in the
    /// file at `path`.
    #[must_use]
    pub fn variables_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.variables_file = Some(path.into());
        self
    }

    /// Registers a [`RunListener`] shared by all workers.
    #[must_use]
    pub fn listener<L: RunListener + 'static>(mut self, listener: L) -> Self {
        self.suite.listeners.push(Arc::new(listener));
        self
    }

    /// Registers a factory creating one listener per worker.
    #[must_use]
    pub fn listener_factory<F: RunListenerFactory + 'static>(mut self, factory: F) -> Self {
        self.suite.listener_factories.push(Arc::new(factory));
        self
    }

    /// Registers a [`ResultListener`].
    #[must_use]
    pub fn result_listener<L: ResultListener + 'static>(mut self, listener: L) -> Self {
        self.suite.result_listeners.push(Arc::new(listener));
        self
    }

    /// Registers a [`RuntimeHook`].
    #[must_use]
    pub fn hook<H: RuntimeHook + 'static>(self, hook: H) -> Self {
        self.listener(HookAdapter(hook))
    }

    /// Replaces the [`StepExecutor`].
    #[must_use]
    pub fn step_executor<E: StepExecutor + 'static>(mut self, executor: E) -> Self {
        self.suite.step_executor = Arc::new(executor);
        self
    }

    /// Replaces the expression [`Evaluator`].
    #[must_use]
    pub fn evaluator<E: Evaluator + 'static>(mut self, evaluator: E) -> Self {
        self.suite.evaluator = Arc::new(evaluator);
        self
    }

    /// Sets the factory of the workers' HTTP clients.
    #[must_use]
    pub fn http_client_factory<F: HttpClientFactory + 'static>(mut self, factory: F) -> Self {
        self.suite.http_client_factory = Some(Arc::new(factory));
        self
    }

    /// Runs every scenario regardless of its tags, `@ignore` included.
    #[must_use]
    pub fn skip_tag_filtering(mut self, skip: bool) -> Self {
        self.suite.skip_tag_filtering = skip;
        self
    }

    /// Sets the level of the diagnostics workers log.
    #[must_use]
    pub fn log_level(mut self, level: LevelFilter) -> Self {
        self.suite.log_level = level;
        self
    }

    /// Finishes the configuration.
    ///
    /// Registers the enabled outputs as listeners, after the ones registered
    /// explicitly.
    ///
    /// # Errors
    ///
    /// If the tag expression is malformed, the variables file isn't usable,
    /// or the events file can't be created.
    pub fn build(self) -> crate::Result<Arc<Suite>> {
        let Self { mut suite, tags, variables_file, explicit_variables } = self;

        suite.tag_selector = selector::from_cucumber_tags(&tags);
        if let Some(sel) = &suite.tag_selector {
            TagSelector::validate(sel, suite.evaluator.as_ref())?;
        }

        if let Some(path) = variables_file {
            suite.variables = read_variables(&path)?;
        }
        for (k, v) in explicit_variables {
            _ = suite.variables.insert(k, v);
        }

        let output = suite.output.clone();
        if output.json_lines {
            let events = JsonLinesListener::create(output.dir.join(EVENTS_FILE_NAME))?;
            suite.listeners.push(Arc::new(events));
        }
        match (output.json_report, output.console_summary) {
            (true, true) => suite.result_listeners.push(Arc::new(
                writer::JsonReport::new(&output.dir).tee(writer::Summary::stdout()),
            )),
            (true, false) => {
                suite.result_listeners.push(Arc::new(writer::JsonReport::new(&output.dir)));
            }
            (false, true) => suite.result_listeners.push(Arc::new(writer::Summary::stdout())),
            (false, false) => {}
        }
        Ok(Arc::new(suite))
    }

    /// Runs the suite with `threads` workers and returns its result.
    ///
    /// # Errors
    ///
    /// See [`Builder::build()`]. Also, if features can't be discovered or
    /// parsed, or the workers can't be spawned.
    pub fn parallel(self, threads: usize) -> crate::Result<SuiteResult> {
        pool::run(self.threads(threads).build()?)
    }
}

fn read_variables(path: &Path) -> crate::Result<Map> {
    let text = fs::read_to_string(path).map_err(|e| crate::Error::config(path, e.to_string()))?;
    let json = serde_json::from_str::<serde_json::Value>(&text)
        .map_err(|e| crate::Error::config(path, e.to_string()))?;
    match Value::from_json(&json) {
        Value::Object(map) => Ok(map),
        other => Err(crate::Error::config(
            path,
            format!("expected a JSON object, found {}", other.type_name()),
        )),
    }
}
