// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Building [`HttpResponse`]s out of the variables a scenario ended with.

use std::time::Duration;

use serde_json::json;

use super::MockConfig;
use crate::{
    expr::{Bindings, Value},
    http::{self, Headers, HttpRequest, HttpResponse},
};

/// Methods announced to CORS preflight requests.
pub const ALLOWED_METHODS: &str = "GET, HEAD, POST, PUT, DELETE, PATCH, OPTIONS";

/// Answers a CORS preflight `request` without running any scenario.
#[must_use]
pub fn cors_preflight(request: &HttpRequest) -> HttpResponse {
    let mut res = HttpResponse::new(200)
        .with_header("Allow", ALLOWED_METHODS)
        .with_header("Access-Control-Allow-Origin", "*")
        .with_header("Access-Control-Allow-Methods", ALLOWED_METHODS);
    if let Some(requested) = request.headers().get("access-control-request-headers") {
        res.headers.set("Access-Control-Allow-Headers", requested);
    }
    res
}

/// Response to a request no scenario matched.
#[must_use]
pub fn not_found() -> HttpResponse {
    HttpResponse::json(404, &json!({"error": "no matching scenario"}))
}

/// Response to a request whose scenario failed with the `message`.
#[must_use]
pub fn server_error(message: &str) -> HttpResponse {
    HttpResponse::json(500, &json!({"error": message}))
}

/// Builds the response described by the `response*` variables among the
/// `vars`, decorated according to the `config`.
///
/// A `response` holding an [`HttpResponse`] (as returned by `proceed()`) is
/// passed through as-is.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
#[must_use]
pub fn build(vars: &Bindings, config: &MockConfig) -> HttpResponse {
    let body = vars.get("response").cloned().unwrap_or_default();
    let mut res = if let Some(upstream) = native_response(&body) {
        upstream.clone()
    } else {
        let status = vars
            .get("responseStatus")
            .and_then(Value::as_f64)
            .and_then(|s| (100.0..1000.0).contains(&s).then_some(s))
            .map_or(200, |s| s as u16);
        let (bytes, content_type) = http::encode_body(&body);

        let mut res = HttpResponse::new(status).with_body(bytes);
        for (name, value) in config.response_headers() {
            res.headers.set(name.as_str(), value.to_string());
        }
        if let Some(ct) = content_type {
            if !res.headers.contains("content-type") {
                res.headers.set("Content-Type", ct);
            }
        }
        if let Some(custom) = vars.get("responseHeaders") {
            for (name, value) in Headers::from_value(custom).iter() {
                res.headers.set(name, value);
            }
        }
        res
    };

    let delay = vars.get("responseDelay").map_or(0.0, Value::to_number);
    if delay > 0.0 {
        match Duration::try_from_secs_f64(delay / 1000.0) {
            Ok(d) => res.delay = d,
            Err(e) => tracing::warn!("`responseDelay` of {delay}ms ignored: {e}"),
        }
    }
    if config.cors() {
        res.headers.set("Access-Control-Allow-Origin", "*");
    }
    res
}

fn native_response(value: &Value) -> Option<&HttpResponse> {
    match value {
        Value::Native(n) => n.downcast_ref::<HttpResponse>(),
        _ => None,
    }
}
