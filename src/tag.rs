// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Feature and scenario [`Tag`]s.

use std::fmt;

use lazy_regex::regex_captures;

/// Parsed `@name`, `@name=v1,v2` or `@name(v1,v2)` annotation.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Tag {
    text: String,
    name: String,
    values: Vec<String>,
}

impl Tag {
    /// Excludes a feature or scenario from every run.
    pub const IGNORE: &'static str = "ignore";

    /// Restricts a scenario to the listed environments.
    pub const ENV: &'static str = "env";

    /// Excludes a scenario from the listed environments.
    pub const ENV_NOT: &'static str = "envnot";

    /// Marks a scenario only runnable through an explicit setup call.
    pub const SETUP: &'static str = "setup";

    /// Inverts the outcome of a scenario: it passes only if it fails.
    pub const FAIL: &'static str = "fail";

    /// `@parallel=false` on a feature runs its scenarios one after another.
    pub const PARALLEL: &'static str = "parallel";

    /// `@lock=<name>` keeps scenarios sharing a name from running at the
    /// same time, `@lock=*` runs a scenario alone.
    pub const LOCK: &'static str = "lock";

    /// Parses a `raw` tag, with or without its leading `@`.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let text = raw.trim().trim_start_matches('@').to_owned();
        let (name, values) =
            match regex_captures!(r"^([^=(]*)(?:\((.*)\)|=(.*))?$", &text) {
                Some((_, name, paren, eq)) => {
                    let list = if paren.is_empty() { eq } else { paren };
                    let values = list
                        .split(',')
                        .map(str::trim)
                        .filter(|v| !v.is_empty())
                        .map(ToOwned::to_owned)
                        .collect();
                    (name.trim().to_owned(), values)
                }
                None => (text.clone(), Vec::new()),
            };
        Self { text, name, values }
    }

    /// Full tag text without the leading `@`.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Tag name, without values.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Values listed after `=` or inside parentheses.
    #[must_use]
    pub fn values(&self) -> &[String] {
        &self.values
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.text)
    }
}

impl From<&str> for Tag {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}
