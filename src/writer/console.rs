// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Console summary of a run.

use std::{
    borrow::Cow,
    io,
    sync::{Mutex, PoisonError},
    time::Duration,
};

use console::{Style, Term};
use itertools::Itertools as _;

use crate::{event::ResultListener, result::SuiteResult};

/// [`Style`]s for terminal output.
#[derive(Debug)]
pub struct Styles {
    /// [`Style`] for rendering passed counts.
    pub ok: Style,

    /// [`Style`] for rendering failures.
    pub err: Style,

    /// [`Style`] for rendering the header.
    pub header: Style,

    /// [`Style`] for rendering __bold__.
    pub bold: Style,

    /// Indicates whether output is colored.
    pub is_present: bool,
}

impl Default for Styles {
    fn default() -> Self {
        Self {
            ok: Style::new().green(),
            err: Style::new().red(),
            header: Style::new().blue(),
            bold: Style::new().bold(),
            is_present: Term::stdout().features().colors_supported()
                && console::colors_enabled(),
        }
    }
}

impl Styles {
    /// Creates [`Styles`] never coloring anything.
    #[must_use]
    pub fn plain() -> Self {
        Self { is_present: false, ..Self::default() }
    }

    fn paint<'a>(&self, style: &Style, input: impl Into<Cow<'a, str>>) -> Cow<'a, str> {
        if self.is_present {
            style.apply_to(input.into()).to_string().into()
        } else {
            input.into()
        }
    }

    /// Renders the summary of a finished `result`.
    #[must_use]
    pub fn summary(&self, result: &SuiteResult) -> String {
        let features = format!(
            "{}{}",
            plural("feature", result.feature_count()),
            self.stats(result.features_passed(), result.features_failed()),
        );
        let scenarios = format!(
            "{}{}",
            plural("scenario", result.scenario_count()),
            self.stats(result.scenarios_passed(), result.scenarios_failed()),
        );
        let timing = format!(
            "elapsed: {}, thread time: {}, efficiency: {:.2}",
            human(result.duration()),
            human(result.thread_time()),
            result.efficiency(),
        );
        let errors = result.errors();
        let failures = (!errors.is_empty())
            .then(|| {
                let list = errors.iter().map(|e| format!("  {}", self.paint(&self.err, e.as_str())));
                format!("\n{}\n{}", self.paint(&self.err, "Failures:"), list.format("\n"))
            })
            .unwrap_or_default();

        format!(
            "{}\n{}\n{}\n{}{}",
            self.paint(&self.bold, self.paint(&self.header, "[Summary]")),
            features,
            scenarios,
            timing,
            failures,
        )
    }

    fn stats(&self, passed: usize, failed: usize) -> String {
        let parts = [
            (passed > 0).then(|| self.paint(&self.ok, format!("{passed} passed"))),
            (failed > 0).then(|| self.paint(&self.err, format!("{failed} failed"))),
        ];
        let formatted = parts.into_iter().flatten().join(", ");
        (!formatted.is_empty())
            .then(|| format!(" ({formatted})"))
            .unwrap_or_default()
    }
}

fn plural(singular: &str, n: usize) -> String {
    format!("{n} {singular}{}", if n == 1 { "" } else { "s" })
}

fn human(d: Duration) -> String {
    let millis = u64::try_from(d.as_millis()).unwrap_or(u64::MAX);
    humantime::format_duration(Duration::from_millis(millis)).to_string()
}

/// [`ResultListener`] printing the summary once the suite finishes.
#[derive(Debug)]
pub struct Summary<Out = Term> {
    out: Mutex<Out>,
    styles: Styles,
}

impl Summary {
    /// Creates a [`Summary`] printing to `stdout`.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(Term::stdout(), Styles::default())
    }
}

impl<Out: io::Write> Summary<Out> {
    /// Creates a [`Summary`] writing into the given `out`.
    #[must_use]
    pub fn new(out: Out, styles: Styles) -> Self {
        Self { out: Mutex::new(out), styles }
    }

    /// Unwraps the output.
    pub fn into_inner(self) -> Out {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<Out: io::Write + Send> ResultListener for Summary<Out> {
    fn on_suite_end(&self, result: &SuiteResult) {
        let text = self.styles.summary(result);
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writeln!(out, "{text}").and_then(|()| out.flush()) {
            tracing::warn!("failed to print the summary: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pluralizes() {
        assert_eq!(plural("feature", 1), "1 feature");
        assert_eq!(plural("scenario", 0), "0 scenarios");
    }

    #[test]
    fn prints_plain_summary() {
        let mut result = SuiteResult::new(2);
        result.finish();

        let summary = Summary::new(Vec::new(), Styles::plain());
        summary.on_suite_end(&result);
        let text = String::from_utf8(summary.into_inner()).unwrap();

        assert!(text.starts_with("[Summary]\n0 features\n0 scenarios\nelapsed: "), "{text}");
        assert!(!text.contains("Failures:"));
    }

    #[test]
    fn stats_list_non_zero_counts() {
        let styles = Styles::plain();
        assert_eq!(styles.stats(2, 1), " (2 passed, 1 failed)");
        assert_eq!(styles.stats(0, 3), " (3 failed)");
        assert_eq!(styles.stats(0, 0), "");
    }
}
