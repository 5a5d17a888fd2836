// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Fully configured [`Suite`] of a run.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use derive_more::with_trait::Debug;
use once_cell::sync::OnceCell;
use smart_default::SmartDefault;
use tracing::level_filters::LevelFilter;

use crate::{
    event::{ResultListener, RunListener, RunListenerFactory},
    expr::{Evaluator, Map, Script, Value},
    feature::{Feature, Scenario},
    http::HttpClientFactory,
    selector::TagSelector,
    steps::{ScriptSteps, StepExecutor},
};

/// Outputs a run produces on its own, next to the registered listeners.
#[derive(Clone, Debug, SmartDefault)]
pub struct Output {
    /// Directory the files are written into.
    #[default(PathBuf::from("target/gauntlet-reports"))]
    pub dir: PathBuf,

    /// Print a summary to the console once the run finishes.
    #[default(true)]
    pub console_summary: bool,

    /// Write the `results.json` report.
    #[default(true)]
    pub json_report: bool,

    /// Write the `events.jsonl` event stream.
    pub json_lines: bool,
}

/// Configuration of a run, assembled by a [`Builder`] and shared by every
/// worker of the run.
///
/// Also owns the run-wide caches: parsed features and `callSingle` results.
///
/// [`Builder`]: super::Builder
#[derive(Debug, SmartDefault)]
pub struct Suite {
    pub(super) paths: Vec<PathBuf>,

    #[debug(ignore)]
    pub(super) features: Vec<Arc<Feature>>,

    pub(super) tag_selector: Option<String>,

    pub(super) env: Option<String>,

    #[default(1)]
    pub(super) threads: usize,

    pub(super) dry_run: bool,

    pub(super) output: Output,

    pub(super) variables: Map,

    #[debug(ignore)]
    pub(super) listeners: Vec<Arc<dyn RunListener>>,

    #[debug(ignore)]
    pub(super) listener_factories: Vec<Arc<dyn RunListenerFactory>>,

    #[debug(ignore)]
    pub(super) result_listeners: Vec<Arc<dyn ResultListener>>,

    #[default(Arc::new(ScriptSteps))]
    pub(super) step_executor: Arc<dyn StepExecutor>,

    #[default(Arc::new(Script))]
    pub(super) evaluator: Arc<dyn Evaluator>,

    pub(super) http_client_factory: Option<Arc<dyn HttpClientFactory>>,

    pub(super) skip_tag_filtering: bool,

    #[default(LevelFilter::INFO)]
    pub(super) log_level: LevelFilter,

    #[debug(ignore)]
    call_single: Mutex<HashMap<String, Arc<OnceCell<Value>>>>,

    #[debug(ignore)]
    parsed: Mutex<HashMap<PathBuf, Arc<Feature>>>,
}

impl Suite {
    /// Paths features are read from.
    #[must_use]
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Already parsed [`Feature`]s run next to the ones read from
    /// [`Suite::paths()`].
    #[must_use]
    pub fn features(&self) -> &[Arc<Feature>] {
        &self.features
    }

    /// Selector expression scenarios are filtered with.
    #[must_use]
    pub fn tag_selector(&self) -> Option<&str> {
        self.tag_selector.as_deref()
    }

    /// Name of the environment being run against.
    #[must_use]
    pub fn env(&self) -> Option<&str> {
        self.env.as_deref()
    }

    /// Number of workers of the run.
    #[must_use]
    pub const fn threads(&self) -> usize {
        self.threads
    }

    /// Indicates whether steps are skipped instead of being executed.
    #[must_use]
    pub const fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// [`Output`] options.
    #[must_use]
    pub const fn output(&self) -> &Output {
        &self.output
    }

    /// Variables bound into every scenario.
    #[must_use]
    pub const fn variables(&self) -> &Map {
        &self.variables
    }

    /// Listeners shared by all workers.
    #[must_use]
    pub fn listeners(&self) -> &[Arc<dyn RunListener>] {
        &self.listeners
    }

    /// Factories of per-worker listeners.
    #[must_use]
    pub fn listener_factories(&self) -> &[Arc<dyn RunListenerFactory>] {
        &self.listener_factories
    }

    /// [`ResultListener`]s of the run.
    #[must_use]
    pub fn result_listeners(&self) -> &[Arc<dyn ResultListener>] {
        &self.result_listeners
    }

    /// [`StepExecutor`] every step is run with.
    #[must_use]
    pub const fn step_executor(&self) -> &Arc<dyn StepExecutor> {
        &self.step_executor
    }

    /// [`Evaluator`] of every expression.
    #[must_use]
    pub const fn evaluator(&self) -> &Arc<dyn Evaluator> {
        &self.evaluator
    }

    /// Factory of the workers' [`HttpClient`]s.
    ///
    /// [`HttpClient`]: crate::http::HttpClient
    #[must_use]
    pub fn http_client_factory(&self) -> Option<&Arc<dyn HttpClientFactory>> {
        self.http_client_factory.as_ref()
    }

    /// Level of the diagnostics workers log.
    #[must_use]
    pub const fn log_level(&self) -> LevelFilter {
        self.log_level
    }

    /// Indicates whether the `scenario` is part of the run.
    ///
    /// # Errors
    ///
    /// If the tag selector fails to evaluate on this scenario's tags.
    pub fn selects(&self, scenario: &Scenario) -> crate::Result<bool> {
        if self.skip_tag_filtering {
            return Ok(true);
        }
        TagSelector::new(&scenario.tags)
            .evaluate(self.tag_selector(), self.env(), self.evaluator.as_ref())
            .map_err(|e| crate::Error::selector(self.tag_selector().unwrap_or_default(), e))
    }

    /// Parses the feature file at `path`, once per run.
    ///
    /// # Errors
    ///
    /// If the file can't be read or parsed.
    pub fn load_feature(&self, path: &Path) -> crate::Result<Arc<Feature>> {
        let key = path.canonicalize().unwrap_or_else(|_| path.to_owned());
        if let Some(f) = self.parsed.lock().unwrap_or_else(PoisonError::into_inner).get(&key) {
            return Ok(Arc::clone(f));
        }
        let feature = Arc::new(Feature::parse_path(path)?);
        let mut parsed = self.parsed.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(parsed.entry(key).or_insert(feature)))
    }

    /// Cell caching the outcome of `callSingle` of the given `key` for the
    /// whole run.
    pub(crate) fn call_single_cell(&self, key: String) -> Arc<OnceCell<Value>> {
        let mut cache = self.call_single.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(cache.entry(key).or_default())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn scenario(tags: &str) -> Arc<Scenario> {
        let src = format!("Feature: f\n  {tags}\n  Scenario: s\n    * def a = 1\n");
        let f = Feature::parse(&src, None).unwrap();
        let scenarios = f.scenarios(&Script, &crate::expr::Bindings::new()).unwrap();
        Arc::clone(&scenarios[0])
    }

    #[test]
    fn defaults() {
        let suite = Suite::default();
        assert_eq!(suite.threads(), 1);
        assert_eq!(suite.log_level(), LevelFilter::INFO);
        assert!(suite.output().json_report);
        assert!(!suite.output().json_lines);
        assert!(suite.http_client_factory().is_none());
    }

    #[test]
    fn selects_by_tags_and_env() {
        let mut suite = Suite {
            tag_selector: Some("anyOf('@smoke')".into()),
            env: Some("dev".into()),
            ..Suite::default()
        };
        assert!(suite.selects(&scenario("@smoke")).unwrap());
        assert!(!suite.selects(&scenario("@slow")).unwrap());
        assert!(!suite.selects(&scenario("@smoke @env=prod")).unwrap());
        assert!(!suite.selects(&scenario("@smoke @ignore")).unwrap());

        suite.skip_tag_filtering = true;
        assert!(suite.selects(&scenario("@ignore")).unwrap());
    }

    #[test]
    fn selector_failing_on_a_scenario_is_an_error() {
        let suite = Suite {
            tag_selector: Some("anyOf('@a') && oneOf('@b')".into()),
            ..Suite::default()
        };
        assert!(!suite.selects(&scenario("@b")).unwrap());
        let err = suite.selects(&scenario("@a")).unwrap_err();
        assert!(matches!(err, crate::Error::Selector { .. }), "{err}");
    }

    #[test]
    fn loads_features_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.feature");
        fs::write(&path, "Feature: a\n  Scenario: s\n    * def x = 1\n").unwrap();

        let suite = Suite::default();
        let first = suite.load_feature(&path).unwrap();
        let second = suite.load_feature(&path).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(suite.load_feature(&dir.path().join("missing.feature")).is_err());
    }

    #[test]
    fn call_single_cells_are_shared_by_key() {
        let suite = Suite::default();
        let a = suite.call_single_cell("k".into());
        _ = a.set(Value::from(1.0));
        assert_eq!(suite.call_single_cell("k".into()).get(), Some(&Value::from(1.0)));
        assert!(suite.call_single_cell("other".into()).get().is_none());
    }
}
