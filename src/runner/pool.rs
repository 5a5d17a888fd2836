// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Worker pool executing a [`Suite`].
//!
//! Every feature is split into units of work: one per scenario, or a single
//! one for `@parallel=false` features. Workers claim units in document
//! order. The worker starting the first unit of a feature fires its
//! `FEATURE_ENTER`, the one finishing the last unit closes the result, fires
//! `FEATURE_EXIT` and sends the result to the aggregating thread over a
//! channel.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
};

use derive_more::with_trait::Display;
use futures::{channel::mpsc, executor};
use once_cell::sync::OnceCell;

use super::{locks::ScenarioLocks, Suite};
use crate::{
    event::{self, ErrorSource, RunEvent},
    feature::{self, Feature, Scenario},
    logging,
    result::{FeatureResult, SuiteResult},
    runtime::{FeatureRuntime, ScenarioContext, WorkerContext},
};

/// State of a run.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
enum RunState {
    #[display("CONFIGURED")]
    Configured,
    #[display("RESOLVING_INPUTS")]
    ResolvingInputs,
    #[display("RUNNING")]
    Running,
    #[display("AGGREGATING")]
    Aggregating,
    #[display("DONE")]
    Done,
}

impl RunState {
    fn advance(&mut self, next: Self) {
        tracing::debug!("run state: {self} -> {next}");
        *self = next;
    }
}

/// Feature scheduled for execution.
struct Planned {
    index: usize,
    runtime: Arc<FeatureRuntime>,
    entered: OnceCell<bool>,
    pending: AtomicUsize,
    scenarios: usize,
}

/// Unit of work: scenarios of one [`Planned`] feature run in a row.
struct Unit {
    plan: usize,
    scenarios: Vec<Arc<Scenario>>,
}

/// Everything the workers share.
struct Shared {
    suite: Arc<Suite>,
    plans: Vec<Planned>,
    units: Vec<Unit>,
    locks: ScenarioLocks,
    next: AtomicUsize,
    completed: AtomicUsize,
    total: usize,
}

type Sender = mpsc::UnboundedSender<(usize, Arc<FeatureResult>)>;

/// Runs the `suite` to completion.
///
/// # Errors
///
/// If features can't be discovered or parsed, the tag selector fails on any
/// scenario, or no worker can be spawned.
pub(super) fn run(suite: Arc<Suite>) -> crate::Result<SuiteResult> {
    let mut state = RunState::Configured;
    let threads = suite.threads().max(1);
    let mut result = SuiteResult::new(threads);

    state.advance(RunState::ResolvingInputs);
    let features = resolve(&suite)?;
    let (plans, units, broken) = plan(&suite, features)?;

    for l in suite.result_listeners() {
        event::guarded("result listener", (), || l.on_suite_start(&suite));
    }
    if !event::dispatch(suite.listeners(), &mut [], RunEvent::SuiteEnter { suite: &suite }) {
        tracing::info!("suite skipped by a listener");
        return Ok(finish(&suite, result, &mut state));
    }
    let mut done = broken.into_iter().map(|b| report_broken(&suite, b)).collect::<Vec<_>>();
    let total = plans.iter().map(|p| p.scenarios).sum();
    tracing::info!(
        "running {total} scenarios of {} features on {threads} threads",
        plans.len(),
    );

    state.advance(RunState::Running);
    let shared = Shared {
        suite: Arc::clone(&suite),
        plans,
        units,
        locks: ScenarioLocks::default(),
        next: AtomicUsize::new(0),
        completed: AtomicUsize::new(0),
        total,
    };
    let (tx, rx) = mpsc::unbounded();
    let finished = thread::scope(|s| -> crate::Result<_> {
        for i in 0..threads {
            let (shared, tx) = (&shared, tx.clone());
            _ = thread::Builder::new()
                .name(format!("worker-{i}"))
                .spawn_scoped(s, move || work(shared, i, &tx))?;
        }
        drop(tx);

        let mut finished = Vec::new();
        for (index, feature) in executor::block_on_stream(rx) {
            for l in suite.result_listeners() {
                event::guarded("result listener", (), || l.on_feature_end(&feature));
            }
            finished.push((index, feature));
        }
        Ok(finished)
    })?;

    state.advance(RunState::Aggregating);
    done.extend(finished);
    done.sort_by_key(|(index, _)| *index);
    for (_, feature) in done {
        result.add_feature_result(feature);
    }
    Ok(finish(&suite, result, &mut state))
}

/// Collects the features of the `suite`: parsed ones first, then the ones
/// discovered under its paths.
fn resolve(suite: &Suite) -> crate::Result<Vec<Arc<Feature>>> {
    let mut features = suite.features().to_vec();
    for path in suite.paths() {
        for file in feature::discover(path)? {
            features.push(suite.load_feature(&file)?);
        }
    }
    tracing::debug!("resolved {} features", features.len());
    Ok(features)
}

/// Feature whose scenarios couldn't be expanded.
struct Broken {
    index: usize,
    runtime: Arc<FeatureRuntime>,
    message: String,
}

/// Expands and filters the scenarios of every feature into units of work.
///
/// Features failed to expand are returned separately, as their results are
/// final already.
///
/// # Errors
///
/// If the tag selector fails on any scenario.
fn plan(
    suite: &Arc<Suite>,
    features: Vec<Arc<Feature>>,
) -> crate::Result<(Vec<Planned>, Vec<Unit>, Vec<Broken>)> {
    let (mut plans, mut units, mut broken) = (Vec::new(), Vec::new(), Vec::new());
    for (index, feature) in features.into_iter().enumerate() {
        if !suite.skip_tag_filtering && feature.is_ignored() {
            tracing::debug!("feature `{}` ignored", feature.display_name());
            continue;
        }
        let runtime = Arc::new(FeatureRuntime::new(Arc::clone(suite), Arc::clone(&feature)));
        let all = match feature.scenarios(suite.evaluator().as_ref(), &runtime.bindings()) {
            Ok(all) => all,
            Err(e) => {
                broken.push(Broken { index, runtime, message: e.to_string() });
                continue;
            }
        };
        let mut scenarios = Vec::with_capacity(all.len());
        for scenario in all {
            if suite.selects(&scenario)? {
                scenarios.push(scenario);
            }
        }
        if scenarios.is_empty() {
            continue;
        }

        let plan = plans.len();
        let count = scenarios.len();
        let before = units.len();
        if feature.is_parallel() {
            units.extend(scenarios.into_iter().map(|s| Unit { plan, scenarios: vec![s] }));
        } else {
            units.push(Unit { plan, scenarios });
        }
        plans.push(Planned {
            index,
            runtime,
            entered: OnceCell::new(),
            pending: AtomicUsize::new(units.len() - before),
            scenarios: count,
        });
    }
    Ok((plans, units, broken))
}

/// Turns a [`Broken`] feature into its final failed [`FeatureResult`].
fn report_broken(suite: &Suite, broken: Broken) -> (usize, Arc<FeatureResult>) {
    let Broken { index, runtime, message } = broken;
    let result = Arc::clone(runtime.result());
    result.add_error(message.as_str());
    result.close();
    event::notify(
        suite.listeners(),
        &mut [],
        RunEvent::Error {
            feature: Some(runtime.as_ref()),
            scenario: None,
            source: ErrorSource::Feature,
            message: &message,
        },
    );
    for l in suite.result_listeners() {
        event::guarded("result listener", (), || l.on_feature_start(runtime.feature()));
        event::guarded("result listener", (), || l.on_feature_end(&result));
    }
    (index, result)
}

/// Loop of a single worker.
fn work(shared: &Shared, index: usize, tx: &Sender) {
    let _log = tracing::subscriber::set_default(logging::worker_subscriber(
        shared.suite.log_level(),
    ));
    let mut worker = WorkerContext::new(index, Arc::clone(&shared.suite));

    loop {
        let next = shared.next.fetch_add(1, Ordering::SeqCst);
        let Some(unit) = shared.units.get(next) else {
            break;
        };
        let plan = &shared.plans[unit.plan];
        let entered = *plan.entered.get_or_init(|| enter(&mut worker, plan));

        if entered {
            for scenario in &unit.scenarios {
                let _lock = shared.locks.acquire(scenario);
                let context =
                    ScenarioContext::new(&mut worker, Arc::clone(&plan.runtime), Arc::clone(scenario));
                let (result, _) = context.run();
                plan.runtime.result().add_scenario_result(Arc::new(result));
                progress(&mut worker, shared, 1);
            }
        } else {
            progress(&mut worker, shared, unit.scenarios.len());
        }

        if plan.pending.fetch_sub(1, Ordering::SeqCst) == 1 && entered {
            exit(&mut worker, plan, tx);
        }
    }
    tracing::debug!("{} finished", worker.name());
}

/// Fires the entering of a feature. Returns whether it may run.
fn enter(worker: &mut WorkerContext, plan: &Planned) -> bool {
    let runtime = &plan.runtime;
    if !worker.fire(RunEvent::FeatureEnter { feature: runtime }) {
        tracing::debug!("feature `{}` skipped by a listener", runtime.feature().display_name());
        return false;
    }
    for l in worker.suite().result_listeners() {
        event::guarded("result listener", (), || l.on_feature_start(runtime.feature()));
    }
    true
}

/// Closes the result of a feature whose units all finished.
fn exit(worker: &mut WorkerContext, plan: &Planned, tx: &Sender) {
    let result = plan.runtime.result();
    result.sort_scenario_results();
    result.close();
    worker.notify(RunEvent::FeatureExit { feature: &plan.runtime, result });
    _ = tx.unbounded_send((plan.index, Arc::clone(result)));
}

fn progress(worker: &mut WorkerContext, shared: &Shared, n: usize) {
    let completed = shared.completed.fetch_add(n, Ordering::SeqCst) + n;
    worker.notify(RunEvent::Progress { completed, total: shared.total });
}

fn finish(suite: &Suite, mut result: SuiteResult, state: &mut RunState) -> SuiteResult {
    result.finish();
    event::notify(suite.listeners(), &mut [], RunEvent::SuiteExit { suite, result: &result });
    for l in suite.result_listeners() {
        event::guarded("result listener", (), || l.on_suite_end(&result));
    }
    state.advance(RunState::Done);
    tracing::debug!(
        "suite finished: {} of {} scenarios failed",
        result.scenarios_failed(),
        result.scenario_count(),
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::Runner;

    fn feature(src: &str) -> Feature {
        Feature::parse(src, None).unwrap()
    }

    #[test]
    fn splits_features_into_units() {
        let suite = Runner::builder()
            .console_summary(false)
            .json_report(false)
            .tags("~@skip")
            .build()
            .unwrap();
        let features = vec![
            Arc::new(feature(
                "Feature: a\n  Scenario: one\n    * def x = 1\n  Scenario: two\n    * def x = 2\n",
            )),
            Arc::new(feature(
                "@parallel=false\nFeature: b\n  Scenario: one\n    * def x = 1\n  Scenario: two\n    * def x = 2\n",
            )),
            Arc::new(feature("@ignore\nFeature: c\n  Scenario: one\n    * def x = 1\n")),
            Arc::new(feature("Feature: d\n  @skip\n  Scenario: one\n    * def x = 1\n")),
        ];

        let (plans, units, broken) = plan(&suite, features).unwrap();
        assert_eq!(plans.len(), 2);
        assert!(broken.is_empty());
        assert_eq!(units.iter().map(|u| u.scenarios.len()).collect::<Vec<_>>(), [1, 1, 2]);
        assert_eq!(plans[1].index, 1);
        assert_eq!(plans[1].pending.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn state_advances() {
        let mut state = RunState::Configured;
        state.advance(RunState::Running);
        assert_eq!(state, RunState::Running);
        assert_eq!(state.to_string(), "RUNNING");
    }
}
