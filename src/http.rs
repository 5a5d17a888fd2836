// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Transport-independent HTTP request and response types, and the
//! [`HttpClient`] seam scenarios send requests through.

use std::{fmt, time::Duration};

use linked_hash_map::LinkedHashMap;

use crate::{
    expr::{Map, Value},
    xml,
};

/// Ordered header list with case-insensitive lookup.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    /// Creates empty [`Headers`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a header, keeping existing ones with the same name.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// Replaces every header with the given `name`.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.0.push((name, value.into()));
    }

    /// Removes every header with the given `name`.
    pub fn remove(&mut self, name: &str) {
        self.0.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// First value of the header with the given `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
    }

    /// Every value of the header with the given `name`.
    pub fn get_all<'s>(&'s self, name: &'s str) -> impl Iterator<Item = &'s str> + 's {
        self.0
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Indicates whether a header with the given `name` is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterates over `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Indicates whether there are no headers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Script representation: an object of value lists keyed by the first
    /// seen spelling of every name.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut grouped = LinkedHashMap::<String, Vec<Value>>::new();
        for (name, value) in &self.0 {
            let key = grouped
                .keys()
                .find(|k| k.eq_ignore_ascii_case(name))
                .cloned()
                .unwrap_or_else(|| name.clone());
            grouped.entry(key).or_default().push(value.as_str().into());
        }
        Value::Object(grouped.into_iter().map(|(k, v)| (k, Value::Array(v))).collect())
    }

    /// Builds [`Headers`] out of a script object whose values are strings or
    /// lists of strings.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        let mut headers = Self::new();
        if let Some(map) = value.as_object() {
            for (name, v) in map {
                match v {
                    Value::Array(items) => {
                        for item in items {
                            headers.add(name.as_str(), item.to_string());
                        }
                    }
                    Value::Null => {}
                    other => headers.add(name.as_str(), other.to_string()),
                }
            }
        }
        headers
    }
}

/// Single part of a `multipart/form-data` body.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Part {
    /// Form field name.
    pub name: String,

    /// File name, for file uploads.
    pub filename: Option<String>,

    /// Declared content type.
    pub content_type: Option<String>,

    /// Raw content.
    pub value: Vec<u8>,
}

impl Part {
    /// Script representation of this part.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        _ = map.insert("name".into(), self.name.as_str().into());
        _ = map.insert("filename".into(), self.filename.clone().into());
        _ = map.insert("contentType".into(), self.content_type.clone().into());
        let value = match (&self.filename, std::str::from_utf8(&self.value)) {
            (None, Ok(s)) => Value::from(s),
            _ => Value::Bytes(self.value.clone()),
        };
        _ = map.insert("value".into(), value);
        Value::Object(map)
    }
}

/// HTTP request, either sent by a scenario or received by a mock.
#[derive(Clone, Debug, Default)]
pub struct HttpRequest {
    method: String,
    url_base: Option<String>,
    path: String,
    params: LinkedHashMap<String, Vec<String>>,
    headers: Headers,
    body: Vec<u8>,
    parts: LinkedHashMap<String, Vec<Part>>,
}

impl HttpRequest {
    /// Creates a request for the given `method` and `uri`, which is either a
    /// path with an optional query or an absolute URL.
    #[must_use]
    pub fn new(method: &str, uri: &str) -> Self {
        let (url_base, rest) = split_url(uri);
        let (path, query) = rest.split_once('?').unwrap_or((rest, ""));
        let mut params = LinkedHashMap::<String, Vec<String>>::new();
        for (k, v) in parse_query(query) {
            params.entry(k).or_default().push(v);
        }
        Self {
            method: method.to_ascii_uppercase(),
            url_base,
            path: percent_decode(if path.is_empty() { "/" } else { path }, false),
            params,
            headers: Headers::new(),
            body: Vec::new(),
            parts: LinkedHashMap::new(),
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.add(name, value);
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Adds a query parameter.
    #[must_use]
    pub fn with_param(mut self, name: &str, value: &str) -> Self {
        self.params.entry(name.to_owned()).or_default().push(value.to_owned());
        self
    }

    /// Replaces the scheme and authority this request is sent to.
    #[must_use]
    pub fn with_url_base(mut self, url_base: &str) -> Self {
        let base = url_base.trim_end_matches('/');
        self.url_base = (!base.is_empty()).then(|| base.to_owned());
        self
    }

    /// Upper-cased method.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Scheme and authority, if the request was made with an absolute URL.
    #[must_use]
    pub fn url_base(&self) -> Option<&str> {
        self.url_base.as_deref()
    }

    /// Decoded path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Path and query.
    #[must_use]
    pub fn uri(&self) -> String {
        let query = self
            .params
            .iter()
            .flat_map(|(k, vs)| vs.iter().map(move |v| format!("{k}={v}")))
            .collect::<Vec<_>>()
            .join("&");
        if query.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{query}", self.path)
        }
    }

    /// Absolute URL if the base is known, [`HttpRequest::uri()`] otherwise.
    #[must_use]
    pub fn url(&self) -> String {
        format!("{}{}", self.url_base.as_deref().unwrap_or_default(), self.uri())
    }

    /// Query (and form) parameters.
    #[must_use]
    pub const fn params(&self) -> &LinkedHashMap<String, Vec<String>> {
        &self.params
    }

    /// First value of the parameter with the given `name`.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).and_then(|v| v.first()).map(String::as_str)
    }

    /// Request headers.
    #[must_use]
    pub const fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Raw body.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Parsed `Content-Type` header.
    #[must_use]
    pub fn content_type(&self) -> Option<mime::Mime> {
        self.headers.get("content-type").and_then(|ct| ct.parse().ok())
    }

    /// Multipart parts by field name, once [parsed](HttpRequest::process_body).
    #[must_use]
    pub const fn parts(&self) -> &LinkedHashMap<String, Vec<Part>> {
        &self.parts
    }

    /// Removes the given path `prefix`, if the path starts with it.
    pub fn strip_prefix(&mut self, prefix: &str) {
        let prefix = prefix.trim_end_matches('/');
        if prefix.is_empty() {
            return;
        }
        if let Some(rest) = self.path.strip_prefix(prefix) {
            if rest.is_empty() || rest.starts_with('/') {
                self.path = if rest.is_empty() { "/".into() } else { rest.to_owned() };
            }
        }
    }

    /// Parses form bodies: url-encoded fields and multipart text fields are
    /// added to the parameters, multipart parts are collected by name.
    pub fn process_body(&mut self) {
        let Some(ct) = self.content_type() else {
            return;
        };
        if ct.essence_str() == mime::APPLICATION_WWW_FORM_URLENCODED.essence_str() {
            let body = String::from_utf8_lossy(&self.body).into_owned();
            for (k, v) in parse_query(&body) {
                self.params.entry(k).or_default().push(v);
            }
        } else if ct.essence_str() == mime::MULTIPART_FORM_DATA.essence_str() {
            let Some(boundary) = ct.get_param(mime::BOUNDARY) else {
                return;
            };
            for part in parse_multipart(&self.body, boundary.as_str()) {
                if part.filename.is_none() {
                    if let Ok(text) = std::str::from_utf8(&part.value) {
                        self.params.entry(part.name.clone()).or_default().push(text.to_owned());
                    }
                }
                self.parts.entry(part.name.clone()).or_default().push(part);
            }
        }
    }

    /// Body converted for scripts: JSON and XML are parsed, text becomes a
    /// string, anything else stays bytes. An empty body is `null`.
    #[must_use]
    pub fn body_value(&self) -> Value {
        body_value(&self.body, self.content_type().as_ref())
    }

    /// Parameters as a script object of value lists.
    #[must_use]
    pub fn params_value(&self) -> Value {
        Value::Object(
            self.params
                .iter()
                .map(|(k, vs)| {
                    (k.clone(), Value::Array(vs.iter().map(|v| v.as_str().into()).collect()))
                })
                .collect(),
        )
    }

    /// Parts as a script object of part lists.
    #[must_use]
    pub fn parts_value(&self) -> Value {
        Value::Object(
            self.parts
                .iter()
                .map(|(k, ps)| (k.clone(), Value::Array(ps.iter().map(Part::to_value).collect())))
                .collect(),
        )
    }
}

/// HTTP response, either received by a scenario or produced by a mock.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct HttpResponse {
    /// Status code. `0` for a request a listener vetoed.
    pub status: u16,

    /// Response headers.
    pub headers: Headers,

    /// Raw body.
    pub body: Vec<u8>,

    /// Artificial latency the transport should apply before answering.
    pub delay: Duration,

    /// Time the request took.
    pub response_time: Duration,
}

impl HttpResponse {
    /// Creates an empty response with the given `status`.
    #[must_use]
    pub fn new(status: u16) -> Self {
        Self { status, ..Self::default() }
    }

    /// Creates a JSON response.
    #[must_use]
    pub fn json(status: u16, json: &serde_json::Value) -> Self {
        let mut res = Self::new(status).with_body(json.to_string());
        res.headers.set("Content-Type", "application/json");
        res
    }

    /// Sets a header.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.set(name, value);
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Parsed `Content-Type` header.
    #[must_use]
    pub fn content_type(&self) -> Option<mime::Mime> {
        self.headers.get("content-type").and_then(|ct| ct.parse().ok())
    }

    /// Body as (lossy) text.
    #[must_use]
    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body converted for scripts, see [`HttpRequest::body_value()`].
    #[must_use]
    pub fn body_value(&self) -> Value {
        body_value(&self.body, self.content_type().as_ref())
    }
}

/// Accumulates the parts of an [`HttpRequest`] over several steps.
#[derive(Clone, Debug, Default)]
pub struct RequestBuilder {
    /// Base URL.
    pub url: String,

    /// Path segments appended to the [`RequestBuilder::url`].
    pub paths: Vec<String>,

    /// Query parameters.
    pub params: Vec<(String, String)>,

    /// Headers.
    pub headers: Headers,

    /// Body.
    pub body: Option<Vec<u8>>,
}

impl RequestBuilder {
    /// Builds the [`HttpRequest`] for the given `method` and resets
    /// everything but the [`RequestBuilder::url`].
    pub fn build(&mut self, method: &str) -> HttpRequest {
        let mut uri = self.url.trim_end_matches('/').to_owned();
        for p in self.paths.drain(..) {
            uri.push('/');
            uri.push_str(p.trim_matches('/'));
        }
        let mut request = HttpRequest::new(method, &uri);
        for (k, v) in self.params.drain(..) {
            request = request.with_param(&k, &v);
        }
        for (k, v) in self.headers.iter() {
            request.headers.add(k, v);
        }
        self.headers = Headers::new();
        if let Some(body) = self.body.take() {
            request.body = body;
        }
        request
    }
}

/// Sender of [`HttpRequest`]s, owned by a single worker.
pub trait HttpClient: Send {
    /// Sends the `request` and waits for its response.
    ///
    /// # Errors
    ///
    /// If the request can't be delivered.
    fn send(&mut self, request: &HttpRequest) -> anyhow::Result<HttpResponse>;
}

/// Factory of [`HttpClient`]s, asked once per worker.
pub trait HttpClientFactory: Send + Sync + fmt::Debug {
    /// Creates a new [`HttpClient`].
    fn create(&self) -> Box<dyn HttpClient>;
}

/// Matches a `path` against a `template` like `/users/{id}`, returning the
/// captured parameters.
#[must_use]
pub fn match_path(template: &str, path: &str) -> Option<Map> {
    let segments = |s: &'_ str| {
        s.trim_matches('/').split('/').filter(|p| !p.is_empty()).map(ToOwned::to_owned).collect::<Vec<_>>()
    };
    let (expected, actual) = (segments(template), segments(path));
    if expected.len() != actual.len() {
        return None;
    }
    let mut params = Map::new();
    for (t, a) in expected.iter().zip(&actual) {
        match t.strip_prefix('{').and_then(|t| t.strip_suffix('}')) {
            Some(name) => {
                _ = params.insert(name.to_owned(), a.as_str().into());
            }
            None if t == a => {}
            None => return None,
        }
    }
    Some(params)
}

fn split_url(uri: &str) -> (Option<String>, &str) {
    match uri.find("://") {
        Some(scheme_end) => {
            let after = scheme_end + 3;
            let path_start = uri[after..].find('/').map_or(uri.len(), |i| after + i);
            (Some(uri[..path_start].to_owned()), &uri[path_start..])
        }
        None => (None, uri),
    }
}

fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|p| !p.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (percent_decode(k, true), percent_decode(v, true))
        })
        .collect()
}

/// Encodes a script [`Value`] as a body, together with the content type it
/// implies: objects and arrays as JSON, XML as a document, bytes as-is and
/// anything else as text. `null` is an empty body with no content type.
#[must_use]
pub fn encode_body(value: &Value) -> (Vec<u8>, Option<&'static str>) {
    match value {
        Value::Null => (Vec::new(), None),
        Value::Object(_) | Value::Array(_) => {
            (value.to_json().to_string().into_bytes(), Some("application/json"))
        }
        Value::Xml(x) => (x.to_string().into_bytes(), Some("application/xml")),
        Value::Bytes(b) => (b.clone(), Some("application/octet-stream")),
        Value::Number(_) | Value::Bool(_) => {
            (value.to_string().into_bytes(), Some("application/json"))
        }
        other => (other.to_string().into_bytes(), Some("text/plain")),
    }
}

/// Decodes `%XX` escapes, and `+` as a space if `plus_as_space`. Invalid
/// escapes are kept as-is.
#[must_use]
pub fn percent_decode(s: &str, plus_as_space: bool) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..=i + 2]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(b) => {
                        out.push(b);
                        i += 3;
                        continue;
                    }
                    None => out.push(b'%'),
                }
            }
            b'+' if plus_as_space => out.push(b' '),
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn body_value(body: &[u8], content_type: Option<&mime::Mime>) -> Value {
    if body.is_empty() {
        return Value::Null;
    }
    let Ok(text) = std::str::from_utf8(body) else {
        return Value::Bytes(body.to_vec());
    };
    let subtype = content_type.map(|ct| (ct.subtype().as_str(), ct.suffix().map(|s| s.as_str())));
    let trimmed = text.trim_start();
    let json_like = matches!(subtype, Some(("json", _) | (_, Some("json"))))
        || trimmed.starts_with('{')
        || trimmed.starts_with('[');
    if json_like {
        if let Ok(json) = serde_json::from_str::<serde_json::Value>(text) {
            return Value::from_json(&json);
        }
    }
    let xml_like = matches!(subtype, Some(("xml", _) | (_, Some("xml")))) || trimmed.starts_with('<');
    if xml_like {
        if let Ok(doc) = xml::Element::parse(text) {
            return Value::Xml(doc.into());
        }
    }
    Value::String(text.to_owned())
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

fn parse_multipart(body: &[u8], boundary: &str) -> Vec<Part> {
    let delimiter = format!("--{boundary}");
    let delimiter = delimiter.as_bytes();
    let mut parts = Vec::new();
    let Some(mut pos) = find(body, delimiter, 0) else {
        return parts;
    };
    loop {
        let start = pos + delimiter.len();
        if body.get(start..start + 2) == Some(b"--") {
            break;
        }
        let Some(next) = find(body, delimiter, start) else {
            break;
        };
        let chunk = body[start..next].strip_prefix(b"\r\n").unwrap_or(&body[start..next]);
        let chunk = chunk.strip_suffix(b"\r\n").unwrap_or(chunk);
        if let Some(part) = parse_part(chunk) {
            parts.push(part);
        }
        pos = next;
    }
    parts
}

fn parse_part(chunk: &[u8]) -> Option<Part> {
    let split = find(chunk, b"\r\n\r\n", 0)?;
    let head = std::str::from_utf8(&chunk[..split]).ok()?;
    let value = chunk[split + 4..].to_vec();

    let (mut name, mut filename, mut content_type) = (None, None, None);
    for line in head.lines() {
        let Some((header, rest)) = line.split_once(':') else {
            continue;
        };
        if header.trim().eq_ignore_ascii_case("content-type") {
            content_type = Some(rest.trim().to_owned());
        } else if header.trim().eq_ignore_ascii_case("content-disposition") {
            for attr in rest.split(';').map(str::trim) {
                if let Some((k, v)) = attr.split_once('=') {
                    let v = v.trim_matches('"').to_owned();
                    match k.trim() {
                        "name" => name = Some(v),
                        "filename" => filename = Some(v),
                        _ => {}
                    }
                }
            }
        }
    }
    Some(Part { name: name?, filename, content_type, value })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_absolute_urls_and_queries() {
        let req = HttpRequest::new("get", "http://localhost:8080/cats/a%20b?name=Billie+J&x=1&x=2");
        assert_eq!(req.method(), "GET");
        assert_eq!(req.url_base(), Some("http://localhost:8080"));
        assert_eq!(req.path(), "/cats/a b");
        assert_eq!(req.param("name"), Some("Billie J"));
        assert_eq!(req.params().get("x").map(Vec::len), Some(2));
        assert_eq!(req.uri(), "/cats/a b?name=Billie J&x=1&x=2");

        assert_eq!(HttpRequest::new("GET", "").path(), "/");
        assert_eq!(HttpRequest::new("GET", "http://h").path(), "/");
    }

    #[test]
    fn decodes_percent_escapes() {
        assert_eq!(percent_decode("a%2Fb", false), "a/b");
        assert_eq!(percent_decode("100%", false), "100%");
        assert_eq!(percent_decode("%zz+", false), "%zz+");
        assert_eq!(percent_decode("a+b", true), "a b");
    }

    #[test]
    fn strips_prefix_on_segment_boundary() {
        let mut req = HttpRequest::new("GET", "/api/cats");
        req.strip_prefix("/api/");
        assert_eq!(req.path(), "/cats");

        let mut req = HttpRequest::new("GET", "/apis");
        req.strip_prefix("/api");
        assert_eq!(req.path(), "/apis");
    }

    #[test]
    fn headers_are_case_insensitive() {
        let mut h = Headers::new();
        h.add("Accept", "text/plain");
        h.add("accept", "application/json");
        assert_eq!(h.get("ACCEPT"), Some("text/plain"));
        assert_eq!(h.get_all("accept").count(), 2);
        assert_eq!(
            h.to_value().to_json(),
            serde_json::json!({"Accept": ["text/plain", "application/json"]}),
        );
        h.set("ACCEPT", "*/*");
        assert_eq!(h.get_all("accept").collect::<Vec<_>>(), ["*/*"]);
    }

    #[test]
    fn converts_bodies() {
        let req = HttpRequest::new("POST", "/")
            .with_header("Content-Type", "application/json")
            .with_body(r#"{"a":1}"#);
        assert_eq!(req.body_value().to_json(), serde_json::json!({"a": 1}));

        let req = HttpRequest::new("POST", "/").with_body("<a><b>1</b></a>");
        assert!(matches!(req.body_value(), Value::Xml(_)));

        let req = HttpRequest::new("POST", "/").with_body("plain");
        assert_eq!(req.body_value(), Value::from("plain"));

        assert!(HttpRequest::new("POST", "/").body_value().is_null());
        assert!(matches!(
            HttpRequest::new("POST", "/").with_body(vec![0xff, 0xfe]).body_value(),
            Value::Bytes(_),
        ));
    }

    #[test]
    fn parses_url_encoded_forms() {
        let mut req = HttpRequest::new("POST", "/login?from=home")
            .with_header("Content-Type", "application/x-www-form-urlencoded")
            .with_body("user=jo+e&pass=%21");
        req.process_body();
        assert_eq!(req.param("user"), Some("jo e"));
        assert_eq!(req.param("pass"), Some("!"));
        assert_eq!(req.param("from"), Some("home"));
    }

    #[test]
    fn parses_multipart_bodies() {
        let body = "--XyZ\r\n\
            Content-Disposition: form-data; name=\"title\"\r\n\r\n\
            hello\r\n\
            --XyZ\r\n\
            Content-Disposition: form-data; name=\"file\"; filename=\"a.txt\"\r\n\
            Content-Type: text/plain\r\n\r\n\
            content\r\n\
            --XyZ--\r\n";
        let mut req = HttpRequest::new("POST", "/upload")
            .with_header("Content-Type", "multipart/form-data; boundary=XyZ")
            .with_body(body);
        req.process_body();

        assert_eq!(req.param("title"), Some("hello"));
        assert_eq!(req.param("file"), None);
        let file = &req.parts()["file"][0];
        assert_eq!(file.filename.as_deref(), Some("a.txt"));
        assert_eq!(file.content_type.as_deref(), Some("text/plain"));
        assert_eq!(file.value, b"content");
    }

    #[test]
    fn matches_path_templates() {
        let params = match_path("/cats/{id}/toys/{toy}", "/cats/1/toys/ball/").unwrap();
        assert_eq!(params.get("id"), Some(&Value::from("1")));
        assert_eq!(params.get("toy"), Some(&Value::from("ball")));

        assert!(match_path("/cats", "/cats").unwrap().is_empty());
        assert!(match_path("/cats/{id}", "/cats").is_none());
        assert!(match_path("/cats/{id}", "/dogs/1").is_none());
    }

    #[test]
    fn builds_requests_over_steps() {
        let mut b = RequestBuilder { url: "http://localhost:1/".into(), ..RequestBuilder::default() };
        b.paths.push("cats".into());
        b.paths.push("/1".into());
        b.params.push(("q".into(), "a b".into()));
        b.headers.add("Accept", "application/json");

        let req = b.build("get");
        assert_eq!(req.url(), "http://localhost:1/cats/1?q=a b");
        assert_eq!(req.headers().get("accept"), Some("application/json"));

        let req = b.build("delete");
        assert_eq!(req.url(), "http://localhost:1/");
        assert!(req.headers().is_empty());
    }

    #[test]
    fn encodes_bodies_by_type() {
        let mut m = Map::new();
        _ = m.insert("id".into(), Value::from(1.0));
        assert_eq!(encode_body(&m.into()), (br#"{"id":1}"#.to_vec(), Some("application/json")));
        assert_eq!(encode_body(&Value::from("hi")), (b"hi".to_vec(), Some("text/plain")));
        assert_eq!(encode_body(&Value::Null), (Vec::new(), None));
    }
}
