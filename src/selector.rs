// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Selection of scenarios by their tags.
//!
//! Selectors are expressions over `anyOf(..)`, `allOf(..)`, `not(..)` and
//! `valuesFor(..)`. Cucumber-style tag lists are converted into that form
//! with [`from_cucumber_tags()`].

use std::{collections::HashMap, sync::Arc};

use itertools::Itertools as _;

use crate::{
    expr::{self, Bindings, Evaluator, Map, Value},
    tag::Tag,
};

/// Read-only view over the effective tags of one scenario.
#[derive(Clone, Debug, Default)]
pub struct TagSelector {
    texts: Vec<String>,
    values: HashMap<String, Vec<String>>,
}

/// Values of a single tag, as returned by [`TagSelector::values_for()`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Values(Vec<String>);

impl TagSelector {
    /// Builds a [`TagSelector`] over the given `tags`.
    pub fn new<'t>(tags: impl IntoIterator<Item = &'t Tag>) -> Self {
        let mut texts = Vec::new();
        let mut values = HashMap::<String, Vec<String>>::new();
        for tag in tags {
            texts.push(tag.text().to_owned());
            values
                .entry(tag.name().to_owned())
                .or_default()
                .extend(tag.values().iter().cloned());
        }
        Self { texts, values }
    }

    /// Indicates whether any of the given tags is present.
    #[must_use]
    pub fn any_of<S: AsRef<str>>(&self, tags: &[S]) -> bool {
        tags.iter().any(|t| self.has(t.as_ref()))
    }

    /// Indicates whether all of the given tags are present.
    #[must_use]
    pub fn all_of<S: AsRef<str>>(&self, tags: &[S]) -> bool {
        tags.iter().all(|t| self.has(t.as_ref()))
    }

    /// Indicates whether none of the given tags is present.
    #[must_use]
    pub fn not<S: AsRef<str>>(&self, tags: &[S]) -> bool {
        !self.any_of(tags)
    }

    /// Returns the values of the tag with the given `name` (with or without
    /// its leading `@`).
    #[must_use]
    pub fn values_for(&self, name: &str) -> Values {
        Values(self.values.get(strip(name)).cloned().unwrap_or_default())
    }

    fn has(&self, tag: &str) -> bool {
        let tag = strip(tag);
        self.texts.iter().any(|t| t == tag)
    }

    fn is_ignored(&self) -> bool {
        self.texts.iter().any(|t| t.eq_ignore_ascii_case(Tag::IGNORE))
    }

    /// Decides whether the scenario these tags belong to should run.
    ///
    /// Rules are applied in order, the first failing one deciding:
    /// 1. a bare `@ignore` never runs (`@ignore=..` is an ordinary tag);
    /// 2. `@setup` never runs in ordinary runs;
    /// 3. `@env=..` requires `env` to be one of its values;
    /// 4. `@envnot=..` excludes `env` being one of its values;
    /// 5. no `selector` runs everything else;
    /// 6. otherwise the truthiness of the evaluated `selector` decides.
    ///
    /// # Errors
    ///
    /// If the `selector` fails to parse or evaluate.
    pub fn evaluate(
        &self,
        selector: Option<&str>,
        env: Option<&str>,
        evaluator: &dyn Evaluator,
    ) -> Result<bool, expr::Error> {
        if self.is_ignored() || self.values.contains_key(Tag::SETUP) {
            return Ok(false);
        }
        let allowed = self.values_for(Tag::ENV);
        if allowed.is_present() && !env.is_some_and(|e| allowed.contains(e)) {
            return Ok(false);
        }
        if env.is_some_and(|e| self.values_for(Tag::ENV_NOT).contains(e)) {
            return Ok(false);
        }
        let Some(selector) = selector.map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(true);
        };
        let mut bindings = self.bindings();
        evaluator.eval(selector, &mut bindings).map(|v| v.is_truthy())
    }

    /// Binds `anyOf`, `allOf`, `not` and `valuesFor` over these tags.
    #[must_use]
    pub fn bindings(&self) -> Bindings {
        let this = Arc::new(self.clone());
        let mut bindings = Bindings::new();

        let tags = Arc::clone(&this);
        bindings.set("anyOf", Value::function(move |args| Ok(tags.any_of(&strings(args)).into())));
        let tags = Arc::clone(&this);
        bindings.set("allOf", Value::function(move |args| Ok(tags.all_of(&strings(args)).into())));
        let tags = Arc::clone(&this);
        bindings.set("not", Value::function(move |args| Ok(tags.not(&strings(args)).into())));
        bindings.set(
            "valuesFor",
            Value::function(move |args| {
                let name = args.first().map(ToString::to_string).unwrap_or_default();
                Ok(this.values_for(&name).to_value())
            }),
        );
        bindings
    }

    /// Checks that the `selector` parses and only refers to known functions,
    /// by evaluating it against an empty tag set.
    ///
    /// # Errors
    ///
    /// If the `selector` is malformed.
    pub fn validate(selector: &str, evaluator: &dyn Evaluator) -> crate::Result<()> {
        Self::default()
            .evaluate(Some(selector), None, evaluator)
            .map(drop)
            .map_err(|e| crate::Error::selector(selector, e))
    }
}

impl Values {
    /// Indicates whether the tag is present with at least one value.
    #[must_use]
    pub fn is_present(&self) -> bool {
        !self.0.is_empty()
    }

    fn contains(&self, value: &str) -> bool {
        self.0.iter().any(|v| v == value)
    }

    /// Indicates whether any of the given `values` is listed.
    #[must_use]
    pub fn is_any_of<S: AsRef<str>>(&self, values: &[S]) -> bool {
        values.iter().any(|v| self.contains(v.as_ref()))
    }

    /// Indicates whether all of the given `values` are listed.
    #[must_use]
    pub fn is_all_of<S: AsRef<str>>(&self, values: &[S]) -> bool {
        self.is_present() && values.iter().all(|v| self.contains(v.as_ref()))
    }

    /// Indicates whether exactly the given `values` are listed, no more and
    /// no less.
    #[must_use]
    pub fn is_only<S: AsRef<str>>(&self, values: &[S]) -> bool {
        self.is_all_of(values) && self.0.iter().all(|v| values.iter().any(|w| w.as_ref() == v))
    }

    /// Indicates whether every listed value satisfies the `predicate`.
    ///
    /// Holds vacuously for an absent tag.
    #[must_use]
    pub fn is_each(&self, predicate: impl Fn(&str) -> bool) -> bool {
        self.0.iter().all(|v| predicate(v))
    }

    /// Script representation exposing `isPresent`, `isAnyOf`, `isAllOf`,
    /// `isOnly` and `isEach`.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let this = Arc::new(self.clone());
        let mut map = Map::new();
        _ = map.insert("isPresent".into(), self.is_present().into());

        let values = Arc::clone(&this);
        _ = map.insert(
            "isAnyOf".into(),
            Value::function(move |args| Ok(values.is_any_of(&strings(args)).into())),
        );
        let values = Arc::clone(&this);
        _ = map.insert(
            "isAllOf".into(),
            Value::function(move |args| Ok(values.is_all_of(&strings(args)).into())),
        );
        let values = Arc::clone(&this);
        _ = map.insert(
            "isOnly".into(),
            Value::function(move |args| Ok(values.is_only(&strings(args)).into())),
        );
        _ = map.insert(
            "isEach".into(),
            Value::function(move |args| {
                let predicate = args.first().cloned().unwrap_or_default();
                for v in &this.0 {
                    if !expr::call(&predicate, &[Value::from(v.as_str())])?.is_truthy() {
                        return Ok(false.into());
                    }
                }
                Ok(true.into())
            }),
        );
        Value::Object(map)
    }
}

fn strip(tag: &str) -> &str {
    tag.trim().trim_start_matches('@')
}

fn strings(args: &[Value]) -> Vec<String> {
    args.iter().map(ToString::to_string).collect()
}

/// Converts Cucumber-style tag arguments into a selector expression.
///
/// Tags separated by commas within one argument are alternatives, separate
/// arguments must all hold, and a leading `~` negates. If any argument
/// contains a parenthesis, the arguments are taken as selector expressions
/// already and only joined with `&&`.
#[must_use]
pub fn from_cucumber_tags<S: AsRef<str>>(tags: &[S]) -> Option<String> {
    let tags = tags
        .iter()
        .map(|t| t.as_ref().trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>();
    if tags.is_empty() {
        return None;
    }
    if tags.iter().any(|t| t.contains('(')) {
        return Some(tags.join(" && "));
    }
    Some(
        tags.iter()
            .map(|arg| {
                let (function, list) = match arg.strip_prefix('~') {
                    Some(rest) => ("not", rest),
                    None => ("anyOf", *arg),
                };
                let quoted = list
                    .split(',')
                    .map(|t| t.trim().trim_start_matches('~'))
                    .filter(|t| !t.is_empty())
                    .map(|t| format!("'{t}'"))
                    .join(",");
                format!("{function}({quoted})")
            })
            .join(" && "),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Script;

    fn selector(tags: &[&str]) -> TagSelector {
        let tags = tags.iter().map(|t| Tag::parse(t)).collect::<Vec<_>>();
        TagSelector::new(&tags)
    }

    fn eval(expr: Option<&str>, tags: &[&str]) -> bool {
        eval_env(expr, None, tags)
    }

    fn eval_env(expr: Option<&str>, env: Option<&str>, tags: &[&str]) -> bool {
        selector(tags).evaluate(expr, env, &Script).unwrap()
    }

    #[test]
    fn no_selector_matches_everything_not_gated() {
        assert!(eval(None, &[]));
        assert!(eval(None, &["@foo"]));
        assert!(eval(Some("  "), &["@foo"]));
        assert!(!eval(None, &["@ignore"]));
        assert!(!eval(None, &["@Ignore"]));
    }

    #[test]
    fn ignore_defeats_every_selector() {
        assert!(!eval(Some("anyOf('@ignore')"), &["@ignore"]));
        assert!(!eval(Some("not('@ignore', '@foo')"), &["@ignore"]));
        assert!(!eval(Some("true"), &["@ignore", "@foo"]));
    }

    #[test]
    fn direct_calls_still_see_ignore() {
        // Hard suppression lives in `evaluate()` only; the predicate methods
        // report the raw tag set.
        let s = selector(&["@ignore"]);
        assert!(s.any_of(&["@ignore"]));
        assert!(!s.evaluate(Some("anyOf('@ignore')"), None, &Script).unwrap());
    }

    #[test]
    fn predicates() {
        assert!(eval(Some("anyOf('@foo')"), &["@foo", "@bar"]));
        assert!(eval(Some("anyOf('@foo', '@baz')"), &["@foo"]));
        assert!(!eval(Some("anyOf('@foo')"), &[]));
        assert!(eval(Some("allOf('@foo', '@bar')"), &["@foo", "@bar"]));
        assert!(!eval(Some("allOf('@foo', '@baz')"), &["@foo", "@bar"]));
        assert!(eval(Some("not('@baz')"), &["@foo"]));
        assert!(eval(Some("anyOf('@foo') && not('@bar')"), &["@foo"]));
        assert!(!eval(Some("anyOf('@foo') && not('@bar')"), &["@foo", "@bar"]));
    }

    #[test]
    fn only_bare_ignore_suppresses() {
        assert!(eval(None, &["@ignore=flaky"]));
        assert!(eval(Some("valuesFor('@ignore').isAnyOf('flaky')"), &["@ignore=flaky"]));
        assert!(!eval(None, &["@IGNORE"]));
    }

    #[test]
    fn each_holds_for_absent_tags() {
        assert!(selector(&[]).values_for("@id").is_each(|_| false));
        assert!(eval(Some("valuesFor('@id').isEach(s => s.startsWith('1'))"), &["@other"]));
        assert!(!eval(Some("valuesFor('@id').isPresent"), &["@other"]));
    }

    #[test]
    fn values_for() {
        let tags = ["@retry(3,5)"];
        assert!(eval(Some("valuesFor('@retry').isPresent"), &tags));
        assert!(eval(Some("valuesFor('@retry').isAnyOf(3)"), &tags));
        assert!(eval(Some("valuesFor('@retry').isAllOf(3, 5)"), &tags));
        assert!(eval(Some("valuesFor('@retry').isOnly(3, 5)"), &tags));
        assert!(!eval(Some("valuesFor('@retry').isOnly(3)"), &tags));

        assert!(!eval(Some("valuesFor('@id').isPresent"), &["@id"]));
        assert!(!eval(Some("valuesFor('@id').isOnly(1, 3)"), &["@id=1,2"]));
        assert!(!eval(Some("valuesFor('@id').isAnyOf(1)"), &[]));
        assert!(eval(
            Some("valuesFor('@id').isEach(s => s.startsWith('1'))"),
            &["@id=100,1000"],
        ));
        assert!(!eval(
            Some("valuesFor('@id').isEach(s => s.startsWith('1'))"),
            &["@id=100,200"],
        ));
    }

    #[test]
    fn environment_gates() {
        assert!(!eval_env(None, None, &["@env=foo"]));
        assert!(eval_env(None, Some("foo"), &["@env=foo"]));
        assert!(eval_env(None, Some("bar"), &["@env=foo,bar"]));
        assert!(!eval_env(None, Some("baz"), &["@env=foo,bar"]));
        assert!(!eval_env(None, Some("foo"), &["@envnot=foo"]));
        assert!(eval_env(None, Some("bar"), &["@envnot=foo"]));
        assert!(eval_env(None, None, &["@envnot=foo"]));
    }

    #[test]
    fn setup_never_runs() {
        assert!(!eval(None, &["@setup"]));
        assert!(!eval(Some("anyOf('@setup')"), &["@setup"]));
    }

    #[test]
    fn validates_selectors() {
        assert!(TagSelector::validate("anyOf('@a') || valuesFor('@b').isPresent", &Script).is_ok());
        assert!(TagSelector::validate("anyOf('@a'", &Script).is_err());
        assert!(TagSelector::validate("oneOf('@a')", &Script).is_err());
    }

    #[test]
    fn cucumber_conversion() {
        assert_eq!(from_cucumber_tags(&["@foo, @bar"]).as_deref(), Some("anyOf('@foo','@bar')"));
        assert_eq!(
            from_cucumber_tags(&["@foo", "~@bar"]).as_deref(),
            Some("anyOf('@foo') && not('@bar')"),
        );
        assert_eq!(
            from_cucumber_tags(&["@foo", "@bar"]).as_deref(),
            Some("anyOf('@foo') && anyOf('@bar')"),
        );
        assert_eq!(
            from_cucumber_tags(&["anyOf('@a') || not('@b')"]).as_deref(),
            Some("anyOf('@a') || not('@b')"),
        );
        assert_eq!(from_cucumber_tags::<&str>(&[]), None);
        assert_eq!(from_cucumber_tags(&["  "]), None);
    }
}
