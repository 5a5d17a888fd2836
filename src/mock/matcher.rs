// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Request variables and matcher functions visible to scenarios of a mock.

use std::sync::{Arc, Mutex, PoisonError};

use super::json_path;
use crate::{
    expr::{Bindings, Map, Value},
    http::{self, HttpRequest},
    xml,
};

/// Names of the variables describing the current request.
pub const REQUEST_VARS: [&str; 9] = [
    "request",
    "requestBytes",
    "requestPath",
    "requestUri",
    "requestUrlBase",
    "requestMethod",
    "requestHeaders",
    "requestParams",
    "requestParts",
];

/// Names of the variables a scenario answers with.
pub const RESPONSE_VARS: [&str; 5] =
    ["response", "responseStatus", "responseHeaders", "responseDelay", "pathParams"];

/// Names of the matcher functions.
pub const FUNCTIONS: [&str; 9] = [
    "pathMatches",
    "methodIs",
    "typeContains",
    "acceptContains",
    "headerContains",
    "paramValue",
    "paramExists",
    "bodyPath",
    "proceed",
];

/// Indicates whether the variable `name` is bound anew for every request, so
/// it mustn't outlive one.
#[must_use]
pub fn is_per_request(name: &str) -> bool {
    REQUEST_VARS.contains(&name) || RESPONSE_VARS.contains(&name) || FUNCTIONS.contains(&name)
}

/// Request being handled, shared by the matcher functions.
#[derive(Debug)]
pub struct RequestState {
    request: HttpRequest,
    path_params: Mutex<Option<Map>>,
}

impl RequestState {
    /// Wraps the `request`.
    #[must_use]
    pub fn new(request: HttpRequest) -> Self {
        Self { request, path_params: Mutex::default() }
    }

    /// Handled request.
    #[must_use]
    pub const fn request(&self) -> &HttpRequest {
        &self.request
    }

    /// Parameters captured by the last successful `pathMatches()`.
    #[must_use]
    pub fn path_params(&self) -> Map {
        self.path_params
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_default()
    }

    fn path_matches(&self, template: &str) -> bool {
        let captured = http::match_path(template, self.request.path());
        let matched = captured.is_some();
        if matched {
            *self.path_params.lock().unwrap_or_else(PoisonError::into_inner) = captured;
        }
        matched
    }

    fn header_contains(&self, name: &str, needle: &str) -> bool {
        self.request.headers().get_all(name).any(|v| v.contains(needle))
    }

    fn body_path(&self, path: &str) -> Value {
        let body = self.request.body_value();
        if path.starts_with('/') {
            let Value::Xml(root) = &body else {
                tracing::warn!("bodyPath(`{path}`): request body isn't XML");
                return Value::Null;
            };
            return match root.select(path) {
                Some(xml::Selection::Element(e)) if e.has_elements() => {
                    Value::Xml(Arc::new(e.clone()))
                }
                Some(xml::Selection::Element(e)) => Value::String(e.text()),
                Some(xml::Selection::Text(t)) => Value::String(t),
                None => Value::Null,
            };
        }
        json_path::select(&body, path).unwrap_or_else(|e| {
            tracing::warn!("bodyPath(`{path}`): {e}");
            Value::Null
        })
    }
}

/// Binds the request variables, the default response variables and the
/// matcher functions over the `state`.
pub fn bind(vars: &mut Bindings, state: &Arc<RequestState>) {
    let request = state.request();
    vars.set("request", request.body_value());
    vars.set("requestBytes", request.body().to_vec());
    vars.set("requestPath", request.path());
    vars.set("requestUri", request.uri());
    vars.set("requestUrlBase", request.url_base());
    vars.set("requestMethod", request.method());
    vars.set("requestHeaders", request.headers().to_value());
    vars.set("requestParams", request.params_value());
    vars.set("requestParts", request.parts_value());

    vars.set("response", Value::Null);
    vars.set("responseStatus", 200_u16);
    vars.set("responseHeaders", Map::new());
    vars.set("responseDelay", 0_u16);
    vars.set("pathParams", Map::new());

    let s = Arc::clone(state);
    vars.set("pathMatches", Value::function(move |args| Ok(s.path_matches(&arg(args, 0)).into())));
    let s = Arc::clone(state);
    vars.set(
        "methodIs",
        Value::function(move |args| Ok(s.request.method().eq_ignore_ascii_case(&arg(args, 0)).into())),
    );
    let s = Arc::clone(state);
    vars.set(
        "typeContains",
        Value::function(move |args| Ok(s.header_contains("content-type", &arg(args, 0)).into())),
    );
    let s = Arc::clone(state);
    vars.set(
        "acceptContains",
        Value::function(move |args| Ok(s.header_contains("accept", &arg(args, 0)).into())),
    );
    let s = Arc::clone(state);
    vars.set(
        "headerContains",
        Value::function(move |args| Ok(s.header_contains(&arg(args, 0), &arg(args, 1)).into())),
    );
    let s = Arc::clone(state);
    vars.set(
        "paramValue",
        Value::function(move |args| Ok(s.request.param(&arg(args, 0)).map(str::to_owned).into())),
    );
    let s = Arc::clone(state);
    vars.set(
        "paramExists",
        Value::function(move |args| Ok(s.request.params().contains_key(&arg(args, 0)).into())),
    );
    let s = Arc::clone(state);
    vars.set("bodyPath", Value::function(move |args| Ok(s.body_path(&arg(args, 0)))));
}

fn arg(args: &[Value], i: usize) -> String {
    args.get(i).map(ToString::to_string).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{Evaluator as _, Script};

    fn eval(request: HttpRequest, src: &str) -> (Value, Arc<RequestState>) {
        let state = Arc::new(RequestState::new(request));
        let mut vars = Bindings::new();
        bind(&mut vars, &state);
        (Script.eval(src, &mut vars).unwrap(), state)
    }

    #[test]
    fn matches_paths_and_captures_params() {
        let req = HttpRequest::new("get", "/users/42?verbose=true");
        let (v, state) = eval(req, "pathMatches('/users/{id}') && methodIs('GET')");
        assert_eq!(v, Value::Bool(true));
        assert_eq!(state.path_params().get("id"), Some(&Value::from("42")));

        let req = HttpRequest::new("POST", "/users/42");
        let (v, state) = eval(req, "pathMatches('/orders/{id}')");
        assert_eq!(v, Value::Bool(false));
        assert!(state.path_params().is_empty());
    }

    #[test]
    fn inspects_headers_and_params() {
        let req = HttpRequest::new("GET", "/x?q=rust&q=go")
            .with_header("Content-Type", "application/json; charset=utf-8")
            .with_header("Accept", "text/html")
            .with_header("X-Trace", "abc-123");
        let src = "typeContains('json') && acceptContains('html') \
                   && headerContains('x-trace', '123') && paramValue('q') == 'rust' \
                   && paramExists('q') && !paramExists('missing')";
        assert_eq!(eval(req, src).0, Value::Bool(true));
    }

    #[test]
    fn reads_body_paths_softly() {
        let req = HttpRequest::new("POST", "/x")
            .with_header("Content-Type", "application/json")
            .with_body(r#"{"user": {"name": "Billie"}}"#);
        assert_eq!(eval(req.clone(), "bodyPath('$.user.name')").0, Value::from("Billie"));
        assert_eq!(eval(req, "bodyPath('$[')").0, Value::Null);

        let req = HttpRequest::new("POST", "/x")
            .with_header("Content-Type", "application/xml")
            .with_body("<order id=\"7\"><item>pen</item></order>");
        assert_eq!(eval(req.clone(), "bodyPath('/order/item')").0, Value::from("pen"));
        assert_eq!(eval(req, "bodyPath('/order/@id')").0, Value::from("7"));
    }

    #[test]
    fn binds_request_and_default_response_vars() {
        let req = HttpRequest::new("PUT", "http://localhost:8080/a/b");
        let state = Arc::new(RequestState::new(req));
        let mut vars = Bindings::new();
        bind(&mut vars, &state);

        assert_eq!(vars.get("requestMethod"), Some(&Value::from("PUT")));
        assert_eq!(vars.get("requestPath"), Some(&Value::from("/a/b")));
        assert_eq!(vars.get("requestUrlBase"), Some(&Value::from("http://localhost:8080")));
        assert_eq!(vars.get("responseStatus"), Some(&Value::from(200.0)));
        assert!(vars.get("request").is_some_and(Value::is_null));
        assert!(is_per_request("pathMatches"));
        assert!(!is_per_request("counter"));
    }
}
