// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Command line interface of the `gauntlet` binary.
//!
//! [`Opts`] maps one-to-one onto the [`runner::Builder`] options, so a
//! custom binary may parse them and keep tweaking the builder afterwards.
//!
//! ```rust
//! use gauntlet::cli::{Opts, Parser as _};
//!
//! let opts = Opts::parse_from(["gauntlet", "tests/features", "-t", "@smoke", "-T", "4"]);
//! let builder = opts.builder().console_summary(false);
//! # drop(builder);
//! ```
//!
//! [`runner::Builder`]: crate::runner::Builder

use std::path::PathBuf;

use tracing::level_filters::LevelFilter;

use crate::runner::{Builder, Runner};

pub use clap::Parser;

/// Options of a suite run.
#[derive(clap::Parser, Clone, Debug)]
#[command(name = "gauntlet", about = "Run API test features in parallel")]
pub struct Opts {
    /// Feature files or directories to run.
    #[arg(value_name = "path", default_value = ".")]
    pub paths: Vec<PathBuf>,

    /// Tag selector to filter scenarios by, like `@smoke,~@slow`.
    ///
    /// Repeated options must all match.
    #[arg(short = 't', long = "tags", value_name = "tags")]
    pub tags: Vec<String>,

    /// Number of worker threads.
    #[arg(short = 'T', long, value_name = "int", default_value_t = 1)]
    pub threads: usize,

    /// Environment name, visible to scripts as `env` and to `@env` tags.
    #[arg(short = 'e', long, value_name = "name")]
    pub env: Option<String>,

    /// Directory the reports are written to.
    #[arg(
        short = 'o',
        long = "output",
        value_name = "dir",
        default_value = "target/gauntlet-reports"
    )]
    pub output: PathBuf,

    /// Runs the selection without executing any step.
    #[arg(short = 'D', long)]
    pub dry_run: bool,

    /// JSON file whose top-level object is bound into every scenario.
    #[arg(long = "config", value_name = "json")]
    pub config: Option<PathBuf>,

    /// Also writes the event stream as JSON lines.
    #[arg(long)]
    pub events: bool,

    /// Maximum level of the run's log.
    #[arg(long, value_name = "level", default_value_t = LevelFilter::INFO)]
    pub log_level: LevelFilter,

    /// Disables colored output.
    #[arg(long)]
    pub no_color: bool,
}

impl Opts {
    /// Creates a [`Builder`] configured by these [`Opts`].
    #[must_use]
    pub fn builder(&self) -> Builder {
        let mut builder = Runner::builder()
            .threads(self.threads)
            .dry_run(self.dry_run)
            .output_dir(&self.output)
            .json_lines(self.events)
            .log_level(self.log_level);
        for path in &self.paths {
            builder = builder.path(path);
        }
        for tags in &self.tags {
            builder = builder.tags(tags);
        }
        if let Some(env) = &self.env {
            builder = builder.env(env);
        }
        if let Some(config) = &self.config {
            builder = builder.variables_file(config);
        }
        builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_defaults() {
        let opts = Opts::parse_from(["gauntlet"]);
        assert_eq!(opts.paths, [PathBuf::from(".")]);
        assert_eq!(opts.threads, 1);
        assert_eq!(opts.output, PathBuf::from("target/gauntlet-reports"));
        assert_eq!(opts.log_level, LevelFilter::INFO);
        assert!(opts.tags.is_empty());
        assert!(!opts.dry_run && !opts.no_color && !opts.events);
    }

    #[test]
    fn parses_everything() {
        let opts = Opts::parse_from([
            "gauntlet",
            "a.feature",
            "dir",
            "-t",
            "@smoke",
            "--tags",
            "~@slow",
            "-T",
            "4",
            "-e",
            "qa",
            "-o",
            "out",
            "-D",
            "--config",
            "vars.json",
            "--log-level",
            "debug",
            "--no-color",
        ]);
        assert_eq!(opts.paths, [PathBuf::from("a.feature"), PathBuf::from("dir")]);
        assert_eq!(opts.tags, ["@smoke", "~@slow"]);
        assert_eq!(opts.threads, 4);
        assert_eq!(opts.env.as_deref(), Some("qa"));
        assert_eq!(opts.output, PathBuf::from("out"));
        assert!(opts.dry_run);
        assert_eq!(opts.config, Some(PathBuf::from("vars.json")));
        assert_eq!(opts.log_level, LevelFilter::DEBUG);
        assert!(opts.no_color);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(Opts::try_parse_from(["gauntlet", "-T", "many"]).is_err());
        assert!(Opts::try_parse_from(["gauntlet", "--log-level", "loud"]).is_err());
    }
}
