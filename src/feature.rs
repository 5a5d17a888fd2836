// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Static model of parsed `.feature` files.
//!
//! [`gherkin::Feature`]s are flattened into numbered sections: rules
//! disappear (their tags and backgrounds are folded into their scenarios) and
//! every plain scenario or outline gets the index it has in the document.
//! Outlines are expanded into concrete [`Scenario`]s lazily, because
//! dynamic examples need an expression evaluator.

use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use derive_more::with_trait::{Display, Error};
use lazy_regex::regex;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::{
    expr::{Bindings, Evaluator, Map, Value},
    tag::Tag,
};

/// Parsed feature file.
#[derive(Clone, Debug)]
pub struct Feature {
    /// Path of the file, if it was read from disk.
    pub path: Option<PathBuf>,

    /// Feature name.
    pub name: String,

    /// Free-form description below the name.
    pub description: Option<String>,

    /// Line of the `Feature:` keyword.
    pub line: usize,

    /// Tags of the feature itself.
    pub tags: Vec<Tag>,

    /// Steps of the feature-level background.
    pub background: Vec<Arc<Step>>,

    /// Scenarios and outlines in document order.
    pub sections: Vec<Section>,
}

/// Top-level entry of a [`Feature`].
#[derive(Clone, Debug)]
pub enum Section {
    /// Plain scenario.
    Scenario(Arc<Scenario>),

    /// Scenario outline still to be expanded.
    Outline(Arc<Outline>),
}

/// Scenario outline together with its examples tables.
#[derive(Clone, Debug)]
pub struct Outline {
    /// Index of the section in its feature.
    pub section_index: usize,

    /// Name template.
    pub name: String,

    /// Description template.
    pub description: Option<String>,

    /// Line of the `Scenario Outline:` keyword.
    pub line: usize,

    /// Effective tags, excluding the ones of examples tables.
    pub tags: Vec<Tag>,

    /// Background steps shared with the surrounding feature and rule.
    pub background: Vec<Arc<Step>>,

    /// Step templates.
    pub steps: Vec<Step>,

    /// Examples tables in document order.
    pub examples: Vec<Examples>,
}

/// Single `Examples:` table of an [`Outline`].
#[derive(Clone, Debug)]
pub struct Examples {
    /// Line of the `Examples:` keyword.
    pub line: usize,

    /// Tags of this table.
    pub tags: Vec<Tag>,

    /// Rows, the first one being the header.
    pub table: Vec<Vec<String>>,
}

impl Examples {
    /// Expression source of dynamic examples: a table consisting of a single
    /// header cell and no data rows.
    #[must_use]
    pub fn dynamic_source(&self) -> Option<&str> {
        match self.table.as_slice() {
            [header] if header.len() == 1 => Some(header[0].as_str()),
            _ => None,
        }
    }
}

/// Runnable scenario: either a plain one or a single expanded outline row.
#[derive(Clone, Debug)]
pub struct Scenario {
    /// Index of the section in its feature.
    pub section_index: usize,

    /// Index of the outline row, or `-1` for a plain scenario.
    pub example_index: i32,

    /// Line of the `Scenario:` keyword.
    pub line: usize,

    /// Scenario name.
    pub name: String,

    /// Free-form description below the name.
    pub description: Option<String>,

    /// Effective tags: feature, rule, scenario and examples tags.
    pub tags: Vec<Tag>,

    /// Background steps run before [`Scenario::steps`].
    pub background: Vec<Arc<Step>>,

    /// Own steps.
    pub steps: Vec<Arc<Step>>,

    /// Values of the outline row this scenario was expanded from.
    pub example_data: Option<Map>,
}

/// Single step of a [`Scenario`] or background.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Step {
    /// Keyword as written (`Given`, `*`, ...), trimmed.
    pub keyword: String,

    /// Text after the keyword.
    pub text: String,

    /// Line of the step.
    pub line: usize,

    /// Attached doc string.
    pub docstring: Option<String>,

    /// Attached data table.
    pub table: Option<Vec<Vec<String>>>,

    /// Indicates whether this step belongs to a background.
    pub background: bool,
}

/// Error of expanding outline examples.
#[derive(Clone, Debug, Display, Error)]
#[display("Failed to expand examples at {location}: {reason}")]
pub struct ExpandExamplesError {
    /// `path:line` of the examples table.
    pub location: String,

    /// Why the examples couldn't be produced.
    pub reason: String,
}

impl Feature {
    /// Reads and parses the feature file at the given `path`.
    ///
    /// # Errors
    ///
    /// If the file can't be read or isn't valid Gherkin.
    pub fn parse_path(path: impl AsRef<Path>) -> crate::Result<Self> {
        let parsed =
            gherkin::Feature::parse_path(path.as_ref(), gherkin::GherkinEnv::default())?;
        let mut feature = Self::from(parsed);
        feature.path = Some(path.as_ref().to_owned());
        Ok(feature)
    }

    /// Parses the given Gherkin `source`, reporting it as located at `path`.
    ///
    /// # Errors
    ///
    /// If the `source` isn't valid Gherkin.
    pub fn parse(source: &str, path: Option<PathBuf>) -> crate::Result<Self> {
        let parsed = gherkin::Feature::parse(source, gherkin::GherkinEnv::default())
            .map_err(|source| crate::Error::ParseSource {
                path: path.clone().unwrap_or_default(),
                source,
            })?;
        let mut feature = Self::from(parsed);
        feature.path = path;
        Ok(feature)
    }

    /// Name used in reports: the file path if known, the feature name
    /// otherwise.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.path
            .as_ref()
            .map_or_else(|| self.name.clone(), |p| p.display().to_string())
    }

    /// Stable identity of this feature, used as the key of call caches.
    #[must_use]
    pub fn id(&self) -> String {
        self.path.as_ref().map_or_else(
            || format!("{}:{}", self.name, self.line),
            |p| p.canonicalize().unwrap_or_else(|_| p.clone()).display().to_string(),
        )
    }

    /// Indicates whether this feature carries the given tag `name`.
    #[must_use]
    pub fn has_tag(&self, name: &str) -> bool {
        self.tags.iter().any(|t| t.name().eq_ignore_ascii_case(name))
    }

    /// Indicates whether this carries a bare `@ignore` tag.
    #[must_use]
    pub fn is_ignored(&self) -> bool {
        self.tags.iter().any(|t| t.text().eq_ignore_ascii_case(Tag::IGNORE))
    }

    /// Indicates whether scenarios of this feature may run concurrently.
    #[must_use]
    pub fn is_parallel(&self) -> bool {
        !self.tags.iter().any(|t| {
            t.name() == Tag::PARALLEL && t.values().iter().any(|v| v == "false")
        })
    }

    /// Resolves a `reference` to another feature relatively to this one.
    #[must_use]
    pub fn resolve(&self, reference: &str) -> PathBuf {
        let reference = reference.trim_start_matches("classpath:");
        let path = Path::new(reference);
        if path.is_absolute() {
            return path.to_owned();
        }
        self.path
            .as_deref()
            .and_then(Path::parent)
            .map_or_else(|| path.to_owned(), |dir| dir.join(path))
    }

    /// Expands every section into runnable [`Scenario`]s in document order.
    ///
    /// Dynamic examples are evaluated with the given `evaluator` over a copy
    /// of `bindings`.
    ///
    /// # Errors
    ///
    /// If dynamic examples fail to evaluate or don't produce a list of
    /// objects.
    pub fn scenarios(
        &self,
        evaluator: &dyn Evaluator,
        bindings: &Bindings,
    ) -> Result<Vec<Arc<Scenario>>, ExpandExamplesError> {
        let mut out = Vec::new();
        for section in &self.sections {
            match section {
                Section::Scenario(s) => out.push(Arc::clone(s)),
                Section::Outline(o) => {
                    out.extend(o.expand(evaluator, bindings, self.path.as_deref())?);
                }
            }
        }
        Ok(out)
    }
}

impl Outline {
    /// Expands this outline into one [`Scenario`] per example row.
    ///
    /// # Errors
    ///
    /// See [`Feature::scenarios()`].
    pub fn expand(
        &self,
        evaluator: &dyn Evaluator,
        bindings: &Bindings,
        path: Option<&Path>,
    ) -> Result<Vec<Arc<Scenario>>, ExpandExamplesError> {
        let mut out = Vec::new();
        for examples in &self.examples {
            for row in rows(examples, evaluator, bindings, path)? {
                #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
                let example_index = out.len() as i32;
                let mut tags = self.tags.clone();
                tags.extend(examples.tags.iter().cloned());
                out.push(Arc::new(Scenario {
                    section_index: self.section_index,
                    example_index,
                    line: self.line,
                    name: substitute(&self.name, &row),
                    description: self.description.as_deref().map(|d| substitute(d, &row)),
                    tags,
                    background: self.background.clone(),
                    steps: self
                        .steps
                        .iter()
                        .map(|s| Arc::new(s.substitute(&row)))
                        .collect(),
                    example_data: Some(row),
                }));
            }
        }
        Ok(out)
    }
}

fn rows(
    examples: &Examples,
    evaluator: &dyn Evaluator,
    bindings: &Bindings,
    path: Option<&Path>,
) -> Result<Vec<Map>, ExpandExamplesError> {
    let error = |reason: String| ExpandExamplesError {
        location: format!(
            "{}:{}",
            path.map(|p| p.display().to_string()).unwrap_or_default(),
            examples.line,
        ),
        reason,
    };

    let Some(source) = examples.dynamic_source() else {
        let Some((header, data)) = examples.table.split_first() else {
            return Ok(Vec::new());
        };
        return Ok(data
            .iter()
            .map(|cells| {
                header
                    .iter()
                    .zip(cells)
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect()
            })
            .collect());
    };

    let mut scope = bindings.clone();
    match evaluator.eval(source, &mut scope) {
        Ok(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(row) => Ok(row),
                other => Err(error(format!(
                    "dynamic examples must be a list of objects, found {}",
                    other.type_name(),
                ))),
            })
            .collect(),
        Ok(other) => Err(error(format!(
            "dynamic examples must be a list of objects, found {}",
            other.type_name(),
        ))),
        Err(e) => Err(error(e.to_string())),
    }
}

/// Replaces `<name>` placeholders with the values of the given `row`,
/// leaving unknown ones untouched.
fn substitute(text: &str, row: &Map) -> String {
    /// [`Regex`] matching placeholders examples should expand into.
    static TEMPLATE_REGEX: &Lazy<Regex> = regex!(r"<([^>\s]+)>");

    TEMPLATE_REGEX
        .replace_all(text, |cap: &regex::Captures<'_>| {
            row.get(&cap[1]).map_or_else(|| cap[0].to_owned(), ToString::to_string)
        })
        .into_owned()
}

impl Scenario {
    /// All steps to run: background first.
    pub fn all_steps(&self) -> impl Iterator<Item = &Arc<Step>> {
        self.background.iter().chain(&self.steps)
    }

    /// Indicates whether this scenario was expanded from an outline.
    #[must_use]
    pub const fn is_outline_example(&self) -> bool {
        self.example_index >= 0
    }

    /// Indicates whether this scenario carries the given tag `name`.
    #[must_use]
    pub fn has_tag(&self, name: &str) -> bool {
        self.tags.iter().any(|t| t.name().eq_ignore_ascii_case(name))
    }

    /// Indicates whether this carries a bare `@ignore` tag.
    #[must_use]
    pub fn is_ignored(&self) -> bool {
        self.tags.iter().any(|t| t.text().eq_ignore_ascii_case(Tag::IGNORE))
    }

    /// Short reference like `[2.1:14]`: 1-based section, 1-based example
    /// (outline rows only) and line.
    #[must_use]
    pub fn ref_id(&self) -> String {
        if self.is_outline_example() {
            format!("[{}.{}:{}]", self.section_index + 1, self.example_index + 1, self.line)
        } else {
            format!("[{}:{}]", self.section_index + 1, self.line)
        }
    }

    /// Name and description joined, the way mock routing reads a match
    /// expression from them.
    #[must_use]
    pub fn match_expression(&self) -> String {
        let mut expr = self.name.trim().to_owned();
        if let Some(d) = self.description.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
            if !expr.is_empty() {
                expr.push(' ');
            }
            expr.push_str(d);
        }
        expr
    }

    /// Creates a bare scenario, used when a feature fails before any real
    /// scenario could be produced.
    #[must_use]
    pub fn synthetic(name: impl Into<String>, line: usize) -> Self {
        Self {
            section_index: 0,
            example_index: -1,
            line,
            name: name.into(),
            description: None,
            tags: Vec::new(),
            background: Vec::new(),
            steps: Vec::new(),
            example_data: None,
        }
    }
}

impl Step {
    fn substitute(&self, row: &Map) -> Self {
        Self {
            keyword: self.keyword.clone(),
            text: substitute(&self.text, row),
            line: self.line,
            docstring: self.docstring.as_deref().map(|d| substitute(d, row)),
            table: self.table.as_ref().map(|t| {
                t.iter()
                    .map(|r| r.iter().map(|c| substitute(c, row)).collect())
                    .collect()
            }),
            background: self.background,
        }
    }
}

impl From<gherkin::Feature> for Feature {
    fn from(feature: gherkin::Feature) -> Self {
        let tags = convert_tags(&feature.tags);
        let background = feature
            .background
            .as_ref()
            .map(|b| convert_steps(&b.steps, true))
            .unwrap_or_default();

        let mut raw = feature
            .scenarios
            .iter()
            .map(|s| (s, tags.clone(), background.clone()))
            .collect::<Vec<_>>();
        for rule in &feature.rules {
            let mut rule_tags = tags.clone();
            rule_tags.extend(convert_tags(&rule.tags));
            let mut rule_background = background.clone();
            if let Some(b) = &rule.background {
                rule_background.extend(convert_steps(&b.steps, true));
            }
            raw.extend(
                rule.scenarios
                    .iter()
                    .map(|s| (s, rule_tags.clone(), rule_background.clone())),
            );
        }
        raw.sort_by_key(|(s, ..)| s.position.line);

        let sections = raw
            .into_iter()
            .enumerate()
            .map(|(section_index, (s, mut tags, background))| {
                tags.extend(convert_tags(&s.tags));
                let description = s.description.clone().filter(|d| !d.trim().is_empty());
                if s.examples.is_empty() {
                    Section::Scenario(Arc::new(Scenario {
                        section_index,
                        example_index: -1,
                        line: s.position.line,
                        name: s.name.clone(),
                        description,
                        tags,
                        background,
                        steps: convert_steps(&s.steps, false),
                        example_data: None,
                    }))
                } else {
                    Section::Outline(Arc::new(Outline {
                        section_index,
                        name: s.name.clone(),
                        description,
                        line: s.position.line,
                        tags,
                        background,
                        steps: s.steps.iter().map(|st| convert_step(st, false)).collect(),
                        examples: s
                            .examples
                            .iter()
                            .map(|e| Examples {
                                line: e.position.line,
                                tags: convert_tags(&e.tags),
                                table: e.table.as_ref().map(|t| t.rows.clone()).unwrap_or_default(),
                            })
                            .collect(),
                    }))
                }
            })
            .collect();

        Self {
            path: feature.path.clone(),
            name: feature.name.clone(),
            description: feature.description.clone(),
            line: feature.position.line,
            tags,
            background,
            sections,
        }
    }
}

fn convert_tags(tags: &[String]) -> Vec<Tag> {
    tags.iter().map(|t| Tag::parse(t)).collect()
}

fn convert_step(step: &gherkin::Step, background: bool) -> Step {
    Step {
        keyword: step.keyword.trim().to_owned(),
        text: step.value.clone(),
        line: step.position.line,
        docstring: step.docstring.clone(),
        table: step.table.as_ref().map(|t| t.rows.clone()),
        background,
    }
}

fn convert_steps(steps: &[gherkin::Step], background: bool) -> Vec<Arc<Step>> {
    steps.iter().map(|s| Arc::new(convert_step(s, background))).collect()
}

/// Finds all `.feature` files at the given `path`, which may be a file or a
/// directory searched recursively.
///
/// # Errors
///
/// If the `path` doesn't exist or the directory can't be walked.
pub fn discover(path: &Path) -> crate::Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_owned()]);
    }
    if !path.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no such feature path: {}", path.display()),
        )
        .into());
    }
    let walker = globwalk::GlobWalkerBuilder::new(path, "*.feature")
        .case_insensitive(true)
        .build()?;
    let mut found = walker
        .filter_map(Result::ok)
        .map(|entry| entry.path().to_owned())
        .collect::<Vec<_>>();
    found.sort();
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Script;

    const SOURCE: &str = r#"
@api
Feature: Orders

  Background:
    * def base = 'http://localhost'

  Scenario: first
    * def a = 1

  @smoke
  Scenario Outline: price of <item>
    * def price = <price>
    * match item == '<item>'

    @cheap
    Examples:
      | item  | price |
      | apple | 1     |
      | pear  | 2     |

  Scenario Outline: dynamic <name>
    * print name

    Examples:
      | rows |

  Rule: admin

    @admin
    Scenario: last
      * def b = 2
"#;

    fn feature() -> Feature {
        Feature::parse(SOURCE, Some(PathBuf::from("orders.feature"))).unwrap()
    }

    #[test]
    fn flattens_sections_in_document_order() {
        let f = feature();
        assert_eq!(f.name, "Orders");
        assert_eq!(f.sections.len(), 4);
        assert_eq!(f.background.len(), 1);
        assert!(f.background[0].background);

        let Section::Scenario(last) = &f.sections[3] else {
            panic!("expected a plain scenario");
        };
        assert_eq!(last.name, "last");
        assert_eq!(last.section_index, 3);
        let tags = last.tags.iter().map(Tag::text).collect::<Vec<_>>();
        assert_eq!(tags, ["api", "admin"]);
    }

    #[test]
    fn expands_static_and_dynamic_examples() {
        let f = feature();
        let mut bindings = Bindings::new();
        _ = Script
            .eval("rows = [{ name: 'x' }, { name: 'y' }, { name: 'z' }]", &mut bindings)
            .unwrap();

        let scenarios = f.scenarios(&Script, &bindings).unwrap();
        assert_eq!(scenarios.len(), 1 + 2 + 3 + 1);

        let pear = &scenarios[2];
        assert_eq!(pear.name, "price of pear");
        assert_eq!(pear.example_index, 1);
        assert_eq!(pear.steps[0].text, "def price = 2");
        assert_eq!(pear.steps[1].text, "match item == 'pear'");
        assert!(pear.has_tag("cheap"));
        assert!(pear.has_tag("smoke"));
        assert_eq!(pear.ref_id(), format!("[2.2:{}]", pear.line));

        let dynamic = &scenarios[5];
        assert_eq!(dynamic.name, "dynamic z");
        assert_eq!(dynamic.example_index, 2);
        assert_eq!(
            dynamic.example_data.as_ref().and_then(|d| d.get("name")),
            Some(&Value::from("z")),
        );
    }

    #[test]
    fn dynamic_examples_must_be_objects() {
        let f = feature();
        let mut bindings = Bindings::new();
        bindings.set("rows", Value::from(3_i64));
        let err = f.scenarios(&Script, &bindings).unwrap_err();
        assert!(err.reason.contains("found number"), "{err}");
        assert!(err.location.starts_with("orders.feature:"), "{err}");

        let err = f.scenarios(&Script, &Bindings::new()).unwrap_err();
        assert!(err.reason.contains("rows is not defined"), "{err}");
    }

    #[test]
    fn unknown_placeholders_are_kept() {
        let mut row = Map::new();
        _ = row.insert("a".into(), Value::from("1"));
        assert_eq!(substitute("<a> <b> <c d>", &row), "1 <b> <c d>");
    }

    #[test]
    fn resolves_relative_references() {
        let f = feature();
        assert_eq!(f.resolve("classpath:common.feature"), PathBuf::from("common.feature"));

        let mut nested = f.clone();
        nested.path = Some(PathBuf::from("api/orders.feature"));
        assert_eq!(nested.resolve("sub/x.feature"), PathBuf::from("api/sub/x.feature"));
        assert!(nested.is_parallel());
    }

    #[test]
    fn match_expression_joins_name_and_description() {
        let mut s = Scenario::synthetic("  pathMatches('/a')  ", 1);
        assert_eq!(s.match_expression(), "pathMatches('/a')");
        s.description = Some("&& methodIs('get')".into());
        assert_eq!(s.match_expression(), "pathMatches('/a') && methodIs('get')");
    }
}
