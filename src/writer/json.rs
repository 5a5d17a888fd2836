// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! JSON report of a run.

use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
    time::SystemTime,
};

use serde::Serialize;

use crate::{event::ResultListener, result::SuiteResult, runner::Suite};

/// Name of the report file.
pub const FILE_NAME: &str = "results.json";

/// Version of the report layout.
pub const SCHEMA_VERSION: &str = "1";

/// Top-level object of the report file.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Report<'a> {
    schema_version: &'static str,
    generated_at: String,
    env: Option<&'a str>,
    threads: usize,
    efficiency: f64,
    #[serde(flatten)]
    result: serde_json::Value,
}

/// [`ResultListener`] writing the whole result tree into
/// [`FILE_NAME`] once the suite finishes.
#[derive(Debug)]
pub struct JsonReport {
    dir: PathBuf,
    env: Mutex<Option<String>>,
}

impl JsonReport {
    /// Creates a [`JsonReport`] writing into the `dir`ectory.
    #[must_use]
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self { dir: dir.as_ref().to_owned(), env: Mutex::default() }
    }

    /// Path of the report file.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.dir.join(FILE_NAME)
    }

    fn write(&self, result: &SuiteResult) -> io::Result<()> {
        let env = self.env.lock().unwrap_or_else(PoisonError::into_inner).clone();
        let report = Report {
            schema_version: SCHEMA_VERSION,
            generated_at: humantime::format_rfc3339_millis(SystemTime::now()).to_string(),
            env: env.as_deref(),
            threads: result.threads(),
            efficiency: result.efficiency(),
            result: result.to_json(),
        };
        fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_vec_pretty(&report)?;
        fs::write(self.path(), json)
    }
}

impl ResultListener for JsonReport {
    fn on_suite_start(&self, suite: &Suite) {
        *self.env.lock().unwrap_or_else(PoisonError::into_inner) = suite.env().map(str::to_owned);
    }

    fn on_suite_end(&self, result: &SuiteResult) {
        match self.write(result) {
            Ok(()) => tracing::info!("report written to {}", self.path().display()),
            Err(e) => tracing::warn!("failed to write {}: {e}", self.path().display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_report_file() {
        let dir = tempfile::tempdir().unwrap();
        let report = JsonReport::new(dir.path().join("nested"));
        let mut result = SuiteResult::new(3);
        result.finish();

        report.on_suite_end(&result);

        let json: serde_json::Value =
            serde_json::from_slice(&fs::read(report.path()).unwrap()).unwrap();
        assert_eq!(json["schemaVersion"], "1");
        assert_eq!(json["threads"], 3);
        assert!(json["env"].is_null());
        assert_eq!(json["summary"]["featureCount"], 0);
        assert_eq!(json["summary"]["passed"], true);
        assert!(json["features"].as_array().unwrap().is_empty());
    }
}
