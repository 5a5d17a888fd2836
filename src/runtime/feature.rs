// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Runtime of a single feature execution.

use std::{
    collections::HashMap,
    fmt, fs,
    path::PathBuf,
    sync::{Arc, Mutex, PoisonError},
};

use once_cell::sync::OnceCell;

use crate::{
    expr::{self, Bindings, Map, Native, Value},
    feature::Feature,
    result::FeatureResult,
    runner::Suite,
    xml,
};

/// Reference to a feature file to call, optionally restricted to the
/// scenarios carrying a tag: `other.feature@name`.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct FeatureRef {
    /// Resolved path of the feature file.
    pub path: PathBuf,

    /// Tag (without `@`) selecting the scenarios to run.
    pub tag: Option<String>,
}

impl FeatureRef {
    /// Parses a `reference` written inside the `base` feature.
    #[must_use]
    pub fn parse(reference: &str, base: &Feature) -> Self {
        let (file, tag) = match reference.find(".feature@") {
            Some(i) => {
                let split = i + ".feature".len();
                (&reference[..split], Some(reference[split + 1..].to_owned()))
            }
            None => (reference, None),
        };
        Self { path: base.resolve(file), tag }
    }

    /// Key identifying this reference in call caches.
    #[must_use]
    pub fn cache_key(&self) -> String {
        let path = self.path.canonicalize().unwrap_or_else(|_| self.path.clone());
        match &self.tag {
            Some(tag) => format!("{}@{tag}", path.display()),
            None => path.display().to_string(),
        }
    }
}

/// Runtime of a feature being executed, either top-level or called from
/// another feature's step.
///
/// Shared by every unit the feature was split into.
pub struct FeatureRuntime {
    suite: Arc<Suite>,
    feature: Arc<Feature>,
    caller: Option<Arc<FeatureRuntime>>,
    call_arg: Option<Value>,
    loop_index: i32,
    result: Arc<FeatureResult>,
    callonce: Mutex<HashMap<String, Arc<OnceCell<Value>>>>,
}

impl fmt::Debug for FeatureRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureRuntime")
            .field("feature", &self.feature.display_name())
            .field("depth", &self.depth())
            .field("loop_index", &self.loop_index)
            .finish_non_exhaustive()
    }
}

impl FeatureRuntime {
    /// Creates the runtime of a top-level `feature`.
    #[must_use]
    pub fn new(suite: Arc<Suite>, feature: Arc<Feature>) -> Self {
        let result = Arc::new(FeatureResult::new(Arc::clone(&feature)));
        Self {
            suite,
            feature,
            caller: None,
            call_arg: None,
            loop_index: -1,
            result,
            callonce: Mutex::default(),
        }
    }

    /// Creates the runtime of a `feature` called from the `caller` one.
    #[must_use]
    pub fn called(
        caller: &Arc<Self>,
        feature: Arc<Feature>,
        arg: Option<Value>,
        loop_index: i32,
    ) -> Self {
        let result = FeatureResult::new(Arc::clone(&feature)).with_call(
            caller.depth() + 1,
            loop_index,
            arg.clone(),
        );
        Self {
            suite: Arc::clone(&caller.suite),
            feature,
            caller: Some(Arc::clone(caller)),
            call_arg: arg,
            loop_index,
            result: Arc::new(result),
            callonce: Mutex::default(),
        }
    }

    /// [`Suite`] this feature runs in.
    #[must_use]
    pub const fn suite(&self) -> &Arc<Suite> {
        &self.suite
    }

    /// Static [`Feature`] being run.
    #[must_use]
    pub const fn feature(&self) -> &Arc<Feature> {
        &self.feature
    }

    /// Runtime of the feature that called this one.
    #[must_use]
    pub fn caller(&self) -> Option<&Arc<Self>> {
        self.caller.as_ref()
    }

    /// Number of call hops up to the top-level feature.
    ///
    /// Walks the whole caller chain.
    #[must_use]
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self.caller.as_deref();
        while let Some(c) = current {
            depth += 1;
            current = c.caller.as_deref();
        }
        depth
    }

    /// Argument of the call, if any.
    #[must_use]
    pub const fn call_arg(&self) -> Option<&Value> {
        self.call_arg.as_ref()
    }

    /// Index within a looped call, or `-1`.
    #[must_use]
    pub const fn loop_index(&self) -> i32 {
        self.loop_index
    }

    /// [`FeatureResult`] scenarios of this feature are appended to.
    #[must_use]
    pub const fn result(&self) -> &Arc<FeatureResult> {
        &self.result
    }

    /// Cell caching the outcome of `callonce` of the given `key`, living as
    /// long as this runtime.
    pub(crate) fn callonce_cell(&self, key: String) -> Arc<OnceCell<Value>> {
        let mut cache = self.callonce.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(cache.entry(key).or_default())
    }

    /// Variables every scenario of this feature starts with: `env`, the
    /// suite variables, the `read()` function and, for called features, the
    /// call argument (spread if it's an object, and as `__arg`) and
    /// `__loop`.
    #[must_use]
    pub fn bindings(&self) -> Bindings {
        let mut b = Bindings::new();
        b.set("env", self.suite.env());
        for (k, v) in self.suite.variables() {
            b.set(k.clone(), v.clone());
        }
        b.set("read", read_fn(Arc::clone(&self.feature)));
        if let Some(arg) = &self.call_arg {
            if let Value::Object(map) = arg {
                for (k, v) in map {
                    b.set(k.clone(), v.clone());
                }
            }
            b.set("__arg", arg.clone());
        }
        b.set("__loop", i64::from(self.loop_index));
        b
    }
}

fn read_fn(feature: Arc<Feature>) -> Value {
    Value::function(move |args| {
        let Some(name) = args.first().and_then(Value::as_str) else {
            return Err(expr::Error::eval("read() expects a path"));
        };
        read(&feature, name)
            .map_err(|e| expr::Error::eval(format!("read('{name}') failed: {e}")))
    })
}

/// Reads a file relative to the `base` feature: `.feature` files become a
/// [`FeatureRef`], `.json` and `.xml` files are parsed, anything else is
/// read as a string.
///
/// # Errors
///
/// If the file can't be read or parsed.
pub(crate) fn read(base: &Feature, name: &str) -> anyhow::Result<Value> {
    let target = FeatureRef::parse(name, base);
    let ext = target
        .path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    Ok(match ext.as_deref() {
        Some("feature") => Value::Native(Native::new(target)),
        Some("json") => {
            let text = fs::read_to_string(&target.path)?;
            Value::from_json(&serde_json::from_str(&text)?)
        }
        Some("xml") => {
            let text = fs::read_to_string(&target.path)?;
            Value::Xml(Arc::new(xml::Element::parse(&text)?))
        }
        _ => Value::String(fs::read_to_string(&target.path)?),
    })
}

/// Copies the `vars` a called feature ended with, leaving callables out.
pub(crate) fn result_variables(vars: &Bindings) -> Map {
    vars.iter()
        .filter(|(_, v)| !matches!(v, Value::Function(_)))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    fn feature(path: &str) -> Arc<Feature> {
        let mut f = Feature::parse("Feature: f\n  Scenario: s\n    * def a = 1\n", None).unwrap();
        f.path = Some(path.into());
        Arc::new(f)
    }

    #[test]
    fn parses_tagged_references() {
        let base = feature("/specs/main.feature");
        let r = FeatureRef::parse("common/login.feature@admin", &base);
        assert_eq!(r.path, Path::new("/specs/common/login.feature"));
        assert_eq!(r.tag.as_deref(), Some("admin"));

        let r = FeatureRef::parse("classpath:/abs.feature", &base);
        assert_eq!(r.path, Path::new("/abs.feature"));
        assert_eq!(r.tag, None);
    }

    #[test]
    fn depth_walks_the_caller_chain() {
        let suite = Arc::new(Suite::default());
        let top = Arc::new(FeatureRuntime::new(suite, feature("/a.feature")));
        let mid = Arc::new(FeatureRuntime::called(&top, feature("/b.feature"), None, -1));
        let leaf = FeatureRuntime::called(&mid, feature("/c.feature"), Some(Value::from(1.0)), 2);

        assert_eq!(top.depth(), 0);
        assert_eq!(mid.depth(), 1);
        assert_eq!(leaf.depth(), 2);
        assert_eq!(leaf.result().call_depth(), 2);
        assert_eq!(leaf.result().loop_index(), 2);
        assert!(top.caller().is_none());
    }

    #[test]
    fn binds_call_arguments() {
        let suite = Arc::new(Suite::default());
        let top = Arc::new(FeatureRuntime::new(suite, feature("/a.feature")));
        let mut arg = Map::new();
        _ = arg.insert("name".into(), Value::from("Billie"));
        let called = FeatureRuntime::called(&top, feature("/b.feature"), Some(arg.into()), 0);

        let b = called.bindings();
        assert_eq!(b.get("name"), Some(&Value::from("Billie")));
        assert_eq!(b.get("__loop"), Some(&Value::from(0.0)));
        assert!(b.get("__arg").and_then(Value::as_object).is_some());
        assert!(b.get("env").is_some_and(Value::is_null));
        assert!(matches!(b.get("read"), Some(Value::Function(_))));
    }

    #[test]
    fn reads_files_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("data.json"), r#"{"id": 1}"#).unwrap();
        fs::write(dir.path().join("note.txt"), "hello").unwrap();
        let base = feature(&dir.path().join("main.feature").display().to_string());

        assert_eq!(read(&base, "data.json").unwrap().to_json(), serde_json::json!({"id": 1}));
        assert_eq!(read(&base, "note.txt").unwrap(), Value::from("hello"));
        match read(&base, "other.feature@smoke").unwrap() {
            Value::Native(n) => {
                let r = n.downcast_ref::<FeatureRef>().unwrap();
                assert_eq!(r.tag.as_deref(), Some("smoke"));
            }
            v => panic!("unexpected {v:?}"),
        }
        assert!(read(&base, "missing.json").is_err());
    }
}
