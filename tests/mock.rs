use std::{sync::Arc, time::Duration};

use gauntlet::{
    expr::{Map, Value},
    feature::Feature,
    http::{HttpClient as _, HttpClientFactory as _, HttpRequest},
    mock::{MockHandler, MockOptions},
    Runner,
};

fn cats_mock() -> MockHandler {
    let feature = Feature::parse_path("tests/features/mock/cats.feature").unwrap();
    MockHandler::new(vec![Arc::new(feature)], MockOptions::default()).unwrap()
}

#[test]
fn suite_talks_to_in_process_mock() {
    let result = Runner::path("tests/features/api")
        .console_summary(false)
        .json_report(false)
        .http_client_factory(cats_mock())
        .parallel(2)
        .unwrap();

    assert!(result.is_passed(), "{:?}", result.errors());
    assert_eq!(result.scenario_count(), 2);
}

#[test]
fn mock_keeps_state_between_requests() {
    let mock = cats_mock();

    let created = mock.handle(
        HttpRequest::new("POST", "/cats")
            .with_header("Content-Type", "application/json")
            .with_body(r#"{"name": "Billie"}"#),
    );
    assert_eq!(created.status, 201);
    assert_eq!(created.body_string(), r#"{"id":1,"name":"Billie"}"#);

    let listed = mock.handle(HttpRequest::new("GET", "/cats"));
    assert_eq!(listed.body_string(), r#"[{"id":1,"name":"Billie"}]"#);

    let missing = mock.handle(HttpRequest::new("GET", "/cats/2"));
    assert_eq!(missing.status, 404);
    assert_eq!(missing.body_string(), r#"{"error":"not found"}"#);

    let unmatched = mock.handle(HttpRequest::new("DELETE", "/cats/1"));
    assert_eq!(unmatched.status, 404);
    assert_eq!(unmatched.body_string(), r#"{"error":"no matching scenario"}"#);
}

#[test]
fn strips_path_prefix_and_binds_args() {
    let src = "\
Feature: prefixed

  Background:
    * configure responseHeaders = { 'X-Served-By': owner }

  Scenario: pathMatches('/ping') && paramValue('who') == 'me'
    * def response = { pong: owner, query: requestParams.who[0] }
";
    let mut args = Map::new();
    _ = args.insert("owner".into(), Value::from("team-a"));
    let options = MockOptions {
        path_prefix: Some("/api/v1".into()),
        args,
        ..MockOptions::default()
    };
    let mock =
        MockHandler::new(vec![Arc::new(Feature::parse(src, None).unwrap())], options).unwrap();

    let res = mock.handle(HttpRequest::new("GET", "/api/v1/ping?who=me"));
    assert_eq!(res.status, 200);
    assert_eq!(res.body_string(), r#"{"pong":"team-a","query":"me"}"#);
    assert_eq!(res.headers.get("x-served-by"), Some("team-a"));

    let unprefixed = mock.handle(HttpRequest::new("GET", "/ping?who=me"));
    assert_eq!(unprefixed.status, 200);
    assert_eq!(unprefixed.body_string(), r#"{"pong":"team-a","query":"me"}"#);

    assert_eq!(mock.handle(HttpRequest::new("GET", "/api/v1/pong?who=me")).status, 404);
    assert_eq!(mock.handle(HttpRequest::new("GET", "/api/v1/ping?who=you")).status, 404);
}

#[test]
fn oversized_delays_are_dropped() {
    let src = "\
Feature: slow

  Scenario:
    * def responseDelay = 1000000000 * 1000000000 * 1000000000 * 1000000000
    * def response = { late: true }
";
    let mock = MockHandler::new(
        vec![Arc::new(Feature::parse(src, None).unwrap())],
        MockOptions::default(),
    )
    .unwrap();

    let res = mock.handle(HttpRequest::new("GET", "/anything"));
    assert_eq!(res.status, 200);
    assert_eq!(res.delay, Duration::ZERO);
    assert_eq!(mock.handle(HttpRequest::new("GET", "/again")).status, 200);
}

#[test]
fn proceeds_to_upstream() {
    let upstream = cats_mock();
    let src = "\
Feature: proxy

  Scenario: pathMatches('/cats')
    * def response = proceed()
";
    let options = MockOptions {
        upstream: Some(Arc::new(upstream.clone())),
        ..MockOptions::default()
    };
    let proxy =
        MockHandler::new(vec![Arc::new(Feature::parse(src, None).unwrap())], options).unwrap();

    let res = proxy.handle(HttpRequest::new("GET", "/cats"));
    assert_eq!(res.status, 200);
    assert_eq!(res.body_string(), "[]");

    let mut direct = upstream.create();
    assert_eq!(direct.send(&HttpRequest::new("GET", "/cats")).unwrap().body_string(), "[]");
}

#[test]
fn parses_multipart_uploads() {
    let src = "\
Feature: uploads

  Scenario: pathMatches('/upload') && typeContains('multipart')
    * def response = { title: paramValue('title'), file: requestParts.doc[0].filename }
";
    let mock = MockHandler::new(
        vec![Arc::new(Feature::parse(src, None).unwrap())],
        MockOptions::default(),
    )
    .unwrap();
    let body = "--XyZ\r\n\
                Content-Disposition: form-data; name=\"title\"\r\n\r\n\
                report\r\n\
                --XyZ\r\n\
                Content-Disposition: form-data; name=\"doc\"; filename=\"a.txt\"\r\n\
                Content-Type: text/plain\r\n\r\n\
                hello\r\n\
                --XyZ--\r\n";
    let res = mock.handle(
        HttpRequest::new("POST", "/upload")
            .with_header("Content-Type", "multipart/form-data; boundary=XyZ")
            .with_body(body),
    );

    assert_eq!(res.status, 200, "{}", res.body_string());
    assert_eq!(res.body_string(), r#"{"title":"report","file":"a.txt"}"#);
}
