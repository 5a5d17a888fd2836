use std::fs;

use gauntlet::{Builder, Runner};

fn quiet(builder: Builder) -> Builder {
    builder.console_summary(false).json_report(false)
}

#[test]
fn runs_discovered_features() {
    let result = quiet(Runner::path("tests/features/suite")).parallel(2).unwrap();

    assert_eq!(result.feature_count(), 3, "ignored feature must be omitted");
    assert_eq!(result.scenario_count(), 8);
    assert_eq!(result.scenarios_failed(), 1);
    assert_eq!(result.features_failed(), 1);
    assert_eq!(result.exit_code(), 1);

    let failing = result
        .feature_results()
        .iter()
        .find(|f| f.display_name().contains("failing"))
        .expect("failing feature result");
    let failed = failing
        .scenario_results()
        .into_iter()
        .find(|s| s.is_failed())
        .expect("failed scenario");
    assert_eq!(failed.scenario().name, "fails on purpose");
    assert_eq!(failed.skipped_count(), 1, "steps after a failure are skipped");
    assert!(failing.failure_message().is_some());
}

#[test]
fn feature_results_keep_discovery_order() {
    let result = quiet(Runner::path("tests/features/suite")).parallel(3).unwrap();

    let names = result
        .feature_results()
        .iter()
        .map(|f| f.feature().name.clone())
        .collect::<Vec<_>>();
    assert_eq!(names, ["Environment specific", "Failing feature", "Passing feature"]);
}

#[test]
fn selects_scenarios_by_tags() {
    let result = quiet(Runner::path("tests/features/suite"))
        .tags("@smoke")
        .tags("~@slow")
        .parallel(1)
        .unwrap();

    assert_eq!(result.feature_count(), 1);
    assert_eq!(result.scenario_count(), 3);
    assert!(result.is_passed());
}

#[test]
fn selects_scenarios_by_env() {
    let result = quiet(Runner::path("tests/features/suite/env.feature"))
        .env("qa")
        .parallel(1)
        .unwrap();

    let feature = &result.feature_results()[0];
    let names = feature
        .scenario_results()
        .iter()
        .map(|s| s.scenario().name.clone())
        .collect::<Vec<_>>();
    assert_eq!(names, ["only on qa"]);
    assert!(result.is_passed());
}

#[test]
fn malformed_tags_fail_before_running() {
    let err = quiet(Runner::path("tests/features/suite"))
        .tags("anyOf('@smoke'")
        .parallel(1)
        .unwrap_err();

    assert!(matches!(err, gauntlet::Error::Selector { .. }), "{err}");
}

#[test]
fn selectors_failing_on_a_scenario_abort_the_run() {
    let src = "Feature: f\n\n  @a\n  Scenario: tagged\n    * def x = 1\n";
    let err = quiet(Runner::builder())
        .feature(gauntlet::feature::Feature::parse(src, None).unwrap())
        .tags("anyOf('@a') && oneOf('@b')")
        .parallel(1)
        .unwrap_err();

    assert!(matches!(err, gauntlet::Error::Selector { .. }), "{err}");
}

#[test]
fn dry_run_executes_nothing() {
    let result = quiet(Runner::path("tests/features/suite"))
        .dry_run(true)
        .parallel(2)
        .unwrap();

    assert_eq!(result.scenario_count(), 8);
    assert_eq!(result.scenarios_failed(), 0);
    for feature in result.feature_results() {
        for scenario in feature.scenario_results() {
            assert_eq!(scenario.passed_count(), 0, "{}", scenario.scenario().name);
        }
    }
}

#[test]
fn skip_tag_filtering_runs_ignored_features() {
    let result = quiet(Runner::path("tests/features/suite"))
        .skip_tag_filtering(true)
        .env("qa")
        .parallel(2)
        .unwrap();

    assert_eq!(result.feature_count(), 4);
    assert_eq!(result.scenario_count(), 10);
}

#[test]
fn calls_other_features() {
    let result = quiet(Runner::path("tests/features/calls")).parallel(2).unwrap();

    assert_eq!(result.feature_count(), 1, "called features aren't run on their own");
    assert!(result.is_passed(), "{:?}", result.errors());

    let feature = &result.feature_results()[0];
    let looped = feature
        .scenario_results()
        .into_iter()
        .find(|s| s.scenario().name.starts_with("loops"))
        .expect("loop scenario");
    let calls = looped.step_results()[0].call_results().to_vec();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].loop_index(), 1);
    assert_eq!(calls[1].call_depth(), 1);
}

#[test]
fn binds_variables_file() {
    let dir = tempfile::tempdir().unwrap();
    let vars = dir.path().join("vars.json");
    fs::write(&vars, r#"{"baseUrl": "http://localhost", "retries": 3}"#).unwrap();
    let feature = dir.path().join("vars.feature");
    fs::write(
        &feature,
        "Feature: vars\n\n  Scenario: sees config\n    \
         * match baseUrl == 'http://localhost'\n    \
         * match retries == 3\n    \
         * match extra == 'explicit'\n",
    )
    .unwrap();

    let result = quiet(Runner::path(&feature))
        .variables_file(&vars)
        .variable("extra", "explicit")
        .parallel(1)
        .unwrap();
    assert!(result.is_passed(), "{:?}", result.errors());

    fs::write(&vars, "[1, 2]").unwrap();
    let err = quiet(Runner::path(&feature)).variables_file(&vars).build().unwrap_err();
    assert!(matches!(err, gauntlet::Error::Config { .. }), "{err}");
}

#[test]
fn writes_reports() {
    let dir = tempfile::tempdir().unwrap();
    let result = Runner::path("tests/features/suite/passing.feature")
        .console_summary(false)
        .json_lines(true)
        .output_dir(dir.path())
        .parallel(1)
        .unwrap();
    assert!(result.is_passed());

    let report = fs::read_to_string(dir.path().join("results.json")).unwrap();
    let report = serde_json::from_str::<serde_json::Value>(&report).unwrap();
    assert_eq!(report["schemaVersion"], "1");
    assert_eq!(report["summary"]["scenarioCount"], 4);
    assert_eq!(report["summary"]["passed"], true);

    let events = fs::read_to_string(dir.path().join(gauntlet::event::EVENTS_FILE_NAME)).unwrap();
    let lines = events.lines().collect::<Vec<_>>();
    let first = serde_json::from_str::<serde_json::Value>(lines[0]).unwrap();
    let last = serde_json::from_str::<serde_json::Value>(lines[lines.len() - 1]).unwrap();
    assert_eq!(first["type"], "SUITE_ENTER");
    assert_eq!(last["type"], "SUITE_EXIT");
}

#[test]
fn missing_paths_are_errors() {
    let err = quiet(Runner::path("tests/features/nowhere")).parallel(1).unwrap_err();
    assert!(!err.to_string().is_empty());
}
