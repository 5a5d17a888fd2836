// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Feature files acting as HTTP mocks.
//!
//! Every scenario of a mock feature is a route: its name is a match
//! expression evaluated against the incoming request, and its steps set the
//! `response*` variables. The feature background runs once, when the
//! [`MockHandler`] is created, and its variables persist across requests.
//!
//! ```rust
//! # use std::sync::Arc;
//! use gauntlet::{feature::Feature, http::HttpRequest, mock::MockHandler};
//!
//! let feature = Feature::parse(
//!     "Feature: cats\n\
//!      \n\
//!      Background:\n  * def cats = []\n\
//!      \n\
//!      Scenario: pathMatches('/cats') && methodIs('get')\n  * def response = cats\n",
//!     None,
//! )?;
//! let mock = MockHandler::new(vec![Arc::new(feature)], Default::default())?;
//!
//! let res = mock.handle(HttpRequest::new("GET", "/cats"));
//! assert_eq!(res.status, 200);
//! assert_eq!(res.body_string(), "[]");
//! # Ok::<_, gauntlet::Error>(())
//! ```

mod config;
pub mod json_path;
pub mod matcher;
pub mod response;

use std::{
    fmt,
    sync::{Arc, Mutex, PoisonError},
};

use smart_default::SmartDefault;

use crate::{
    expr::{self, Bindings, Evaluator, Map, Native, Script, Value},
    feature::{Feature, Scenario, Section},
    http::{HttpClient, HttpClientFactory, HttpRequest, HttpResponse},
    runner::Runner,
    runtime::{FeatureRuntime, ScenarioContext, WorkerContext},
    steps::{ScriptSteps, StepExecutor},
    Error,
};

use self::matcher::RequestState;

#[doc(inline)]
pub use self::config::MockConfig;

/// Options of a [`MockHandler`].
#[derive(Clone, Debug, SmartDefault)]
pub struct MockOptions {
    /// Path prefix removed from every request before matching.
    pub path_prefix: Option<String>,

    /// Variables every mock feature starts with.
    pub args: Map,

    /// [`Evaluator`] of match expressions and step bodies.
    #[default(Arc::new(Script))]
    pub evaluator: Arc<dyn Evaluator>,

    /// [`StepExecutor`] running the mock's steps.
    #[default(Arc::new(ScriptSteps))]
    pub step_executor: Arc<dyn StepExecutor>,

    /// Upstream requests are forwarded to by `proceed()`. Without it,
    /// `proceed` isn't defined.
    ///
    /// `proceed()` runs while the handler is locked, so the upstream must
    /// not route back into the same [`MockHandler`] (directly or through a
    /// clone of it): such a request would wait on itself forever.
    pub upstream: Option<Arc<dyn HttpClientFactory>>,
}

/// Feature loaded as a mock.
struct MockFeature {
    runtime: Arc<FeatureRuntime>,
    scenarios: Vec<Arc<Scenario>>,
    globals: Bindings,
}

/// Mutable state of a [`MockHandler`].
struct MockState {
    worker: WorkerContext,
    features: Vec<MockFeature>,
    config: MockConfig,
    evaluator: Arc<dyn Evaluator>,
    prefix: Option<String>,
    upstream: Option<Arc<Mutex<Box<dyn HttpClient>>>>,
}

/// Handler answering [`HttpRequest`]s with the first matching scenario of
/// its mock features.
///
/// Requests are handled one at a time: a scenario sees the globals left by
/// the previous request. The lock isn't reentrant, see
/// [`MockOptions::upstream`].
#[derive(Clone)]
pub struct MockHandler {
    state: Arc<Mutex<MockState>>,
}

impl fmt::Debug for MockHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("MockHandler")
            .field("features", &state.features.len())
            .field("config", &state.config)
            .field("prefix", &state.prefix)
            .finish_non_exhaustive()
    }
}

impl MockHandler {
    /// Loads the mock `features`, running each background once.
    ///
    /// Outlines are not routes and are ignored.
    ///
    /// # Errors
    ///
    /// [`Error::MockInit`] if a background step fails.
    pub fn new(features: Vec<Arc<Feature>>, options: MockOptions) -> crate::Result<Self> {
        let suite = Runner::builder()
            .evaluator(Arc::clone(&options.evaluator))
            .step_executor(Arc::clone(&options.step_executor))
            .console_summary(false)
            .json_report(false)
            .build()?;
        let mut worker = WorkerContext::named(0, "mock", Arc::clone(&suite));
        let mut config = MockConfig::default();

        let mut loaded = Vec::with_capacity(features.len());
        for feature in features {
            let runtime = Arc::new(FeatureRuntime::new(Arc::clone(&suite), Arc::clone(&feature)));
            let mut vars = runtime.bindings();
            for (k, v) in &options.args {
                vars.set(k.clone(), v.clone());
            }

            let background = Arc::new(Scenario::synthetic("background", feature.line));
            let mut ctx =
                ScenarioContext::with_bindings(&mut worker, Arc::clone(&runtime), background, vars);
            for step in &feature.background {
                let result = ctx.run_step(step);
                if let Some(msg) = result.error_message() {
                    return Err(Error::MockInit {
                        feature: feature.display_name(),
                        reason: msg.to_owned(),
                    });
                }
            }
            config.apply(ctx.configuration())?;
            let globals = ctx.vars;

            let scenarios = feature
                .sections
                .iter()
                .filter_map(|s| match s {
                    Section::Scenario(sc) => Some(Arc::clone(sc)),
                    Section::Outline(_) => None,
                })
                .collect();
            tracing::info!("mock feature `{}` loaded", feature.display_name());
            loaded.push(MockFeature { runtime, scenarios, globals });
        }
        config.seal();

        let upstream = options.upstream.map(|f| Arc::new(Mutex::new(f.create())));
        Ok(Self {
            state: Arc::new(Mutex::new(MockState {
                worker,
                features: loaded,
                config,
                evaluator: options.evaluator,
                prefix: options.path_prefix,
                upstream,
            })),
        })
    }

    /// Settings the mock features configured.
    #[must_use]
    pub fn config(&self) -> MockConfig {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).config.clone()
    }

    /// Answers the `request` with the first scenario whose match expression
    /// is blank or evaluates to `true`, trying features in load order.
    ///
    /// Unmatched requests get a `404`, failing scenarios a `500`, both with
    /// a JSON `error` field.
    pub fn handle(&self, mut request: HttpRequest) -> HttpResponse {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let MockState { worker, features, config, evaluator, prefix, upstream } = &mut *guard;

        if config.cors() && request.method() == "OPTIONS" {
            return response::cors_preflight(&request);
        }
        if let Some(p) = prefix {
            request.strip_prefix(p);
        }
        request.process_body();
        tracing::debug!("mock request: {} {}", request.method(), request.uri());

        let state = Arc::new(RequestState::new(request));
        for feature in features.iter_mut() {
            for scenario in &feature.scenarios {
                let mut vars = feature.globals.clone();
                matcher::bind(&mut vars, &state);
                if let Some(client) = upstream {
                    vars.set("proceed", proceed_fn(Arc::clone(client), &state));
                }
                if !is_match(&**evaluator, scenario, &mut vars) {
                    continue;
                }
                tracing::debug!("mock scenario matched: {}", scenario.name);
                vars.set("pathParams", state.path_params());

                let mut ctx = ScenarioContext::with_bindings(
                    &mut *worker,
                    Arc::clone(&feature.runtime),
                    Arc::clone(scenario),
                    vars,
                );
                for step in &scenario.steps {
                    let result = ctx.run_step(step);
                    if let Some(msg) = result.error_message() {
                        tracing::warn!("mock scenario `{}` failed: {msg}", scenario.name);
                        return response::server_error(msg);
                    }
                }
                if let Err(e) = config.apply(ctx.configuration()) {
                    tracing::warn!("{e}");
                }
                let vars = ctx.vars;

                for (k, v) in vars.iter() {
                    if !matcher::is_per_request(k) {
                        feature.globals.set(k.clone(), v.clone());
                    }
                }
                if let Some(hook) = config.after_scenario() {
                    if let Err(e) = expr::call(hook, &[]) {
                        tracing::warn!("mock `afterScenario` failed: {e}");
                    }
                }
                return response::build(&vars, config);
            }
        }
        tracing::debug!("no mock scenario matched");
        response::not_found()
    }
}

fn is_match(evaluator: &dyn Evaluator, scenario: &Scenario, vars: &mut Bindings) -> bool {
    let expression = scenario.match_expression();
    if expression.trim().is_empty() {
        return true;
    }
    match evaluator.eval(&expression, vars) {
        Ok(v) => v == Value::Bool(true),
        Err(e) => {
            tracing::warn!("mock match expression `{expression}` failed: {e}");
            false
        }
    }
}

fn proceed_fn(client: Arc<Mutex<Box<dyn HttpClient>>>, state: &Arc<RequestState>) -> Value {
    let state = Arc::clone(state);
    Value::function(move |args| {
        let mut request = state.request().clone();
        if let Some(base) = args.first().and_then(Value::as_str) {
            request = request.with_url_base(base);
        }
        let response = client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .send(&request)
            .map_err(|e| expr::Error::eval(format!("proceed() failed: {e}")))?;
        Ok(Value::Native(Native::new(response)))
    })
}

/// [`HttpClient`] sending requests straight into a [`MockHandler`].
#[derive(Debug)]
pub struct MockClient(MockHandler);

impl HttpClient for MockClient {
    fn send(&mut self, request: &HttpRequest) -> anyhow::Result<HttpResponse> {
        Ok(self.0.handle(request.clone()))
    }
}

impl HttpClientFactory for MockHandler {
    fn create(&self) -> Box<dyn HttpClient> {
        Box::new(MockClient(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mock(sources: &[&str]) -> MockHandler {
        let features = sources
            .iter()
            .map(|s| Arc::new(Feature::parse(s, None).unwrap()))
            .collect();
        MockHandler::new(features, MockOptions::default()).unwrap()
    }

    const CATS: &str = "\
Feature: cats

  Background:
    * def cats = []
    * def counter = 0

  Scenario: pathMatches('/cats') && methodIs('post')
    * def cat = request
    * def counter = counter + 1
    * def cats = cats.concat([cat])
    * def response = cat
    * def responseStatus = 201

  Scenario: pathMatches('/cats') && methodIs('get')
    * def response = cats

  Scenario: pathMatches('/cats/{id}')
    * def response = { id: pathParams.id, count: counter }

  Scenario: pathMatches('/boom')
    * assert 1 == 2
";

    fn post(path: &str, body: &str) -> HttpRequest {
        HttpRequest::new("POST", path)
            .with_header("Content-Type", "application/json")
            .with_body(body)
    }

    #[test]
    fn globals_persist_across_requests() {
        let mock = mock(&[CATS]);

        let res = mock.handle(post("/cats", r#"{"name": "Billie"}"#));
        assert_eq!(res.status, 201);
        assert_eq!(res.body_string(), r#"{"name":"Billie"}"#);

        let res = mock.handle(HttpRequest::new("GET", "/cats"));
        assert_eq!(res.status, 200);
        assert_eq!(res.body_string(), r#"[{"name":"Billie"}]"#);

        let res = mock.handle(HttpRequest::new("GET", "/cats/7"));
        assert_eq!(res.body_string(), r#"{"id":"7","count":1}"#);
    }

    #[test]
    fn unmatched_requests_get_404() {
        let res = mock(&[CATS]).handle(HttpRequest::new("GET", "/dogs"));
        assert_eq!(res.status, 404);
        assert_eq!(res.headers.get("content-type"), Some("application/json"));
        assert!(res.body_string().contains("\"error\""));
    }

    #[test]
    fn failing_scenarios_get_500() {
        let res = mock(&[CATS]).handle(HttpRequest::new("GET", "/boom"));
        assert_eq!(res.status, 500);
        assert!(res.body_string().contains("\"error\""));
    }

    #[test]
    fn first_match_wins_across_features() {
        let first = "Feature: a\n\n  Scenario: pathMatches('/x')\n    * def response = 'a'\n";
        let second = "Feature: b\n\n  Scenario: pathMatches('/x')\n    * def response = 'b'\n\
                      \n  Scenario:\n    * def response = 'fallback'\n";
        let mock = mock(&[first, second]);

        assert_eq!(mock.handle(HttpRequest::new("GET", "/x")).body_string(), "a");
        assert_eq!(mock.handle(HttpRequest::new("GET", "/y")).body_string(), "fallback");
    }

    #[test]
    fn cors_preflight_skips_scenarios() {
        let src = "\
Feature: cors

  Background:
    * configure cors = true
    * def hits = 0

  Scenario:
    * def hits = hits + 1
    * def response = { hits: hits }
";
        let mock = mock(&[src]);

        let res = mock.handle(HttpRequest::new("OPTIONS", "/any"));
        assert_eq!(res.status, 200);
        assert_eq!(res.headers.get("access-control-allow-origin"), Some("*"));

        let res = mock.handle(HttpRequest::new("GET", "/any"));
        assert_eq!(res.body_string(), r#"{"hits":1}"#);
        assert_eq!(res.headers.get("access-control-allow-origin"), Some("*"));
    }

    #[test]
    fn config_is_sealed_after_backgrounds() {
        let src = "\
Feature: sealed

  Scenario: pathMatches('/reconfigure')
    * configure cors = true
    * def response = 'ok'
";
        let mock = mock(&[src]);
        assert!(mock.config().is_sealed());

        let res = mock.handle(HttpRequest::new("GET", "/reconfigure"));
        assert_eq!(res.status, 200);
        assert!(!mock.config().cors());
        assert_eq!(res.headers.get("access-control-allow-origin"), None);
    }

    #[test]
    fn failing_background_fails_init() {
        let src = "Feature: broken\n\n  Background:\n    * assert false\n\n  Scenario:\n    * def a = 1\n";
        let feature = Arc::new(Feature::parse(src, None).unwrap());
        let err = MockHandler::new(vec![feature], MockOptions::default()).unwrap_err();
        assert!(matches!(err, Error::MockInit { .. }), "{err}");
    }

    #[test]
    fn serves_as_http_client_factory() {
        let mock = mock(&[CATS]);
        let mut client = mock.create();
        let res = client.send(&HttpRequest::new("GET", "/cats")).unwrap();
        assert_eq!(res.body_string(), "[]");
    }
}
