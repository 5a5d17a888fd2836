use std::{
    collections::HashMap,
    fs,
    sync::{Arc, Mutex},
    thread::{self, ThreadId},
    time::Duration,
};

use gauntlet::{
    event::listener_fn,
    feature::Feature,
    Builder, Event, RunEvent, RunEventKind, Runner, SuiteResult,
};

fn quiet(builder: Builder) -> Builder {
    builder.console_summary(false).json_report(false)
}

fn feature(src: &str) -> Arc<Feature> {
    Arc::new(Feature::parse(src, None).unwrap())
}

fn totals(result: &SuiteResult) -> (usize, usize, usize, usize, Vec<String>) {
    let names = result
        .feature_results()
        .iter()
        .flat_map(|f| f.scenario_results())
        .map(|s| s.scenario().name.clone())
        .collect();
    (
        result.feature_count(),
        result.scenario_count(),
        result.scenarios_failed(),
        result.features_failed(),
        names,
    )
}

#[test]
fn thread_count_does_not_change_results() {
    let run = |threads| quiet(Runner::path("tests/features/suite")).parallel(threads).unwrap();

    let sequential = totals(&run(1));
    assert_eq!(sequential, totals(&run(4)));
    assert_eq!(sequential, totals(&run(8)));
}

const BUSY: &str = "\
Feature: busy

  Scenario: one
    * def a = 1
    * def b = a + 1
    * assert b == 2

  Scenario: two
    * def a = 2
    * def b = a + 1
    * assert b == 3

  Scenario: three
    * def a = 3
    * def b = a + 1
    * assert b == 4

  Scenario: four
    * def a = 4
    * def b = a + 1
    * assert b == 5

  Scenario: five
    * def a = 5
    * def b = a + 1
    * assert b == 6
";

#[test]
fn scenario_events_stay_within_their_window() {
    let seen = Arc::new(Mutex::new(Vec::<(ThreadId, RunEventKind, String)>::new()));
    let sink = Arc::clone(&seen);
    let result = quiet(Runner::builder())
        .feature(feature(BUSY))
        .feature(feature(&BUSY.replace("Feature: busy", "Feature: busier")))
        .listener(listener_fn(move |ev: &Event<RunEvent<'_>>| {
            let scenario = match **ev {
                RunEvent::ScenarioEnter { scenario, .. }
                | RunEvent::ScenarioExit { scenario, .. }
                | RunEvent::StepEnter { scenario, .. }
                | RunEvent::StepExit { scenario, .. } => scenario.name.clone(),
                _ => return true,
            };
            if ev.kind() == RunEventKind::StepEnter {
                thread::sleep(Duration::from_millis(2));
            }
            sink.lock().unwrap().push((thread::current().id(), ev.kind(), scenario));
            true
        }))
        .parallel(4)
        .unwrap();
    assert!(result.is_passed(), "{:?}", result.errors());
    assert_eq!(result.scenario_count(), 10);

    // Events of different workers may interleave, but each worker sees its
    // scenarios strictly one after another.
    let mut per_worker = HashMap::<ThreadId, Vec<(RunEventKind, String)>>::new();
    for (id, kind, name) in seen.lock().unwrap().drain(..) {
        per_worker.entry(id).or_default().push((kind, name));
    }
    let mut scenarios = 0;
    for events in per_worker.values() {
        let mut current = None::<&str>;
        let mut steps = 0;
        for (kind, name) in events {
            match kind {
                RunEventKind::ScenarioEnter => {
                    assert_eq!(current, None, "`{name}` entered inside another scenario");
                    current = Some(name.as_str());
                    steps = 0;
                }
                RunEventKind::ScenarioExit => {
                    assert_eq!(current, Some(name.as_str()));
                    assert_eq!(steps, 3, "`{name}` exited early");
                    current = None;
                    scenarios += 1;
                }
                RunEventKind::StepEnter => {
                    assert_eq!(current, Some(name.as_str()));
                    steps += 1;
                }
                _ => assert_eq!(current, Some(name.as_str())),
            }
        }
        assert_eq!(current, None);
    }
    assert_eq!(scenarios, 10);
}

#[test]
fn cached_calls_run_at_most_once() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("token.feature"),
        "Feature: token\n\n  Scenario: issues\n    * def token = 'abc'\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("seed.feature"),
        "Feature: seed\n\n  Scenario: seeds\n    * def seed = 42\n",
    )
    .unwrap();
    let mut src = String::from("Feature: callers\n");
    for i in 0..12 {
        src.push_str(&format!(
            "\n  Scenario: caller {i}\n    \
             * def auth = callSingle read('token.feature')\n    \
             * def data = callonce read('seed.feature')\n    \
             * match auth.token == 'abc'\n    \
             * match data.seed == 42\n",
        ));
    }
    fs::write(dir.path().join("callers.feature"), src).unwrap();
    // Second caller shares the `callSingle` cache but not the `callonce` one.
    fs::write(
        dir.path().join("more.feature"),
        "Feature: more callers\n\n  Scenario: again\n    \
         * def auth = callSingle read('token.feature')\n    \
         * def data = callonce read('seed.feature')\n    \
         * match auth.token == 'abc'\n",
    )
    .unwrap();

    let entered = Arc::new(Mutex::new(HashMap::<String, usize>::new()));
    let sink = Arc::clone(&entered);
    let result = quiet(Runner::builder())
        .path(dir.path().join("callers.feature"))
        .path(dir.path().join("more.feature"))
        .listener(listener_fn(move |ev: &Event<RunEvent<'_>>| {
            if let RunEvent::FeatureEnter { feature } = **ev {
                *sink.lock().unwrap().entry(feature.feature().name.clone()).or_default() += 1;
            }
            true
        }))
        .parallel(6)
        .unwrap();

    assert!(result.is_passed(), "{:?}", result.errors());
    assert_eq!(result.scenario_count(), 13);
    let entered = entered.lock().unwrap();
    assert_eq!(entered["token"], 1, "`callSingle` runs once per suite");
    assert_eq!(entered["seed"], 2, "`callonce` runs once per calling feature");
}

#[derive(Debug, Default)]
struct Occupancy {
    running: usize,
    db: usize,
    db_peak: usize,
    exclusive: bool,
    overlaps: Vec<String>,
}

#[test]
fn locked_scenarios_never_overlap() {
    let src = "\
Feature: locks

  @lock=db
  Scenario: db 1
    * def a = 1

  @lock=db
  Scenario: db 2
    * def a = 2

  @lock=db,cache
  Scenario: db 3
    * def a = 3

  @lock=*
  Scenario: everything
    * def a = 4

  Scenario: free 1
    * def a = 5

  Scenario: free 2
    * def a = 6
";
    let state = Arc::new(Mutex::new(Occupancy::default()));
    let sink = Arc::clone(&state);
    let result = quiet(Runner::builder())
        .feature(feature(src))
        .listener(listener_fn(move |ev: &Event<RunEvent<'_>>| {
            match **ev {
                RunEvent::ScenarioEnter { scenario, .. } => {
                    let mut s = sink.lock().unwrap();
                    let name = scenario.name.as_str();
                    if s.exclusive || (name == "everything" && s.running > 0) {
                        s.overlaps.push(name.to_owned());
                    }
                    s.running += 1;
                    s.exclusive = name == "everything";
                    if name.starts_with("db") {
                        s.db += 1;
                        s.db_peak = s.db_peak.max(s.db);
                    }
                }
                RunEvent::StepEnter { .. } => thread::sleep(Duration::from_millis(15)),
                RunEvent::ScenarioExit { scenario, .. } => {
                    let mut s = sink.lock().unwrap();
                    s.running -= 1;
                    if scenario.name == "everything" {
                        s.exclusive = false;
                    }
                    if scenario.name.starts_with("db") {
                        s.db -= 1;
                    }
                }
                _ => {}
            }
            true
        }))
        .parallel(4)
        .unwrap();

    assert!(result.is_passed(), "{:?}", result.errors());
    assert_eq!(result.scenario_count(), 6);
    let state = state.lock().unwrap();
    assert_eq!(state.db_peak, 1, "`@lock=db` scenarios ran together");
    assert!(state.overlaps.is_empty(), "ran beside `@lock=*`: {:?}", state.overlaps);
}
