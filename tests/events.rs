use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use gauntlet::{
    event::{listener_fn, RunListenerFactory, RuntimeHook, ThreadListener},
    feature::{Feature, Scenario},
    runtime::FeatureRuntime,
    Builder, Event, RunEvent, RunEventKind, Runner, ScenarioResult,
};

fn quiet(builder: Builder) -> Builder {
    builder.console_summary(false).json_report(false)
}

fn feature(src: &str) -> Arc<Feature> {
    Arc::new(Feature::parse(src, None).unwrap())
}

const TWO_SCENARIOS: &str = "\
Feature: events

  Scenario: first
    * def a = 1

  Scenario: second
    * def b = 2
    * assert b == 3
";

#[test]
fn fires_lifecycle_events_in_order() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let result = quiet(Runner::builder())
        .feature(feature(TWO_SCENARIOS))
        .listener(listener_fn(move |ev: &Event<RunEvent<'_>>| {
            sink.lock().unwrap().push(ev.kind());
            true
        }))
        .parallel(1)
        .unwrap();
    assert_eq!(result.scenarios_failed(), 1);

    use RunEventKind as K;
    assert_eq!(
        *seen.lock().unwrap(),
        [
            K::SuiteEnter,
            K::FeatureEnter,
            K::ScenarioEnter,
            K::StepEnter,
            K::StepExit,
            K::ScenarioExit,
            K::Progress,
            K::ScenarioEnter,
            K::StepEnter,
            K::StepExit,
            K::StepEnter,
            K::StepExit,
            K::Error,
            K::ScenarioExit,
            K::Progress,
            K::FeatureExit,
            K::SuiteExit,
        ],
    );
}

#[test]
fn vetoed_scenarios_skip_their_steps() {
    let result = quiet(Runner::builder())
        .feature(feature(TWO_SCENARIOS))
        .listener(listener_fn(|ev: &Event<RunEvent<'_>>| {
            !matches!(**ev, RunEvent::ScenarioEnter { scenario, .. } if scenario.name == "second")
        }))
        .parallel(1)
        .unwrap();

    assert!(result.is_passed());
    let scenarios = result.feature_results()[0].scenario_results();
    assert_eq!(scenarios[1].skipped_count(), 2);
    assert_eq!(scenarios[1].passed_count(), 0);
}

#[test]
fn vetoed_suite_runs_nothing() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let result = quiet(Runner::builder())
        .feature(feature(TWO_SCENARIOS))
        .listener(listener_fn(move |ev: &Event<RunEvent<'_>>| {
            sink.lock().unwrap().push(ev.kind());
            ev.kind() != RunEventKind::SuiteEnter
        }))
        .parallel(2)
        .unwrap();

    assert_eq!(result.feature_count(), 0);
    assert_eq!(*seen.lock().unwrap(), [RunEventKind::SuiteEnter, RunEventKind::SuiteExit]);
}

#[test]
fn panicking_listeners_are_contained() {
    let result = quiet(Runner::builder())
        .feature(feature("Feature: f\n\n  Scenario: s\n    * def a = 1\n"))
        .listener(listener_fn(|ev: &Event<RunEvent<'_>>| {
            if ev.kind() == RunEventKind::StepEnter {
                panic!("listener bug");
            }
            true
        }))
        .parallel(1)
        .unwrap();

    assert!(result.is_passed());
    assert_eq!(result.scenario_count(), 1);
}

#[test]
fn progress_reaches_total() {
    let src = "\
@parallel=true
Feature: many

  Scenario: a
    * def x = 1

  Scenario: b
    * def x = 2

  Scenario: c
    * def x = 3
";
    let last = Arc::new(Mutex::new((0, 0)));
    let sink = Arc::clone(&last);
    _ = quiet(Runner::builder())
        .feature(feature(src))
        .listener(listener_fn(move |ev: &Event<RunEvent<'_>>| {
            if let RunEvent::Progress { completed, total } = **ev {
                let mut last = sink.lock().unwrap();
                last.0 = last.0.max(completed);
                last.1 = total;
            }
            true
        }))
        .parallel(3)
        .unwrap();

    assert_eq!(*last.lock().unwrap(), (3, 3));
}

struct CountingFactory(Arc<AtomicUsize>);

struct Counter;

impl ThreadListener for Counter {
    fn on_event(&mut self, _: &Event<RunEvent<'_>>) -> bool {
        true
    }
}

impl RunListenerFactory for CountingFactory {
    fn create(&self) -> Box<dyn ThreadListener> {
        _ = self.0.fetch_add(1, Ordering::SeqCst);
        Box::new(Counter)
    }
}

#[test]
fn listener_factories_are_asked_once_per_worker() {
    let created = Arc::new(AtomicUsize::new(0));
    _ = quiet(Runner::builder())
        .feature(feature(TWO_SCENARIOS))
        .listener_factory(CountingFactory(Arc::clone(&created)))
        .parallel(3)
        .unwrap();

    assert_eq!(created.load(Ordering::SeqCst), 3);
}

struct Hook(Arc<Mutex<Vec<String>>>);

impl RuntimeHook for Hook {
    fn before_scenario(&self, _: &FeatureRuntime, scenario: &Scenario) -> bool {
        self.0.lock().unwrap().push(format!("before {}", scenario.name));
        scenario.name != "second"
    }

    fn after_scenario(&self, _: &FeatureRuntime, result: &ScenarioResult) {
        self.0.lock().unwrap().push(format!("after {}", result.scenario().name));
    }
}

#[test]
fn hooks_observe_and_veto_scenarios() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let result = quiet(Runner::builder())
        .feature(feature(TWO_SCENARIOS))
        .hook(Hook(Arc::clone(&calls)))
        .parallel(1)
        .unwrap();

    assert!(result.is_passed(), "vetoed scenario must not fail");
    assert_eq!(
        *calls.lock().unwrap(),
        ["before first", "after first", "before second", "after second"],
    );
}
