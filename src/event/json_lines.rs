// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! [`RunListener`] streaming events as JSON lines.

use std::{
    fmt, fs,
    io::{self, BufWriter, Write},
    path::Path,
    sync::{Mutex, PoisonError},
    thread,
};

use serde_json::json;

use super::{Event, RunEvent, RunEventKind, RunListener};
use crate::writer::json::SCHEMA_VERSION;

/// [`RunListener`] writing one `{type, timeStamp, threadId, data}` JSON
/// object per event into the wrapped [`io::Write`]r.
///
/// Never vetoes anything, and only logs its own write failures.
pub struct JsonLinesListener<W> {
    out: Mutex<W>,
}

impl<W> fmt::Debug for JsonLinesListener<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonLinesListener").finish_non_exhaustive()
    }
}

/// Default file name of the event stream inside an output directory.
pub const FILE_NAME: &str = "events.jsonl";

impl JsonLinesListener<BufWriter<fs::File>> {
    /// Creates a listener writing into a new file at `path`, creating its
    /// parent directories.
    ///
    /// # Errors
    ///
    /// If the file can't be created.
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        Ok(Self::new(BufWriter::new(fs::File::create(path)?)))
    }
}

impl<W: Write> JsonLinesListener<W> {
    /// Wraps the given writer.
    #[must_use]
    pub fn new(out: W) -> Self {
        Self { out: Mutex::new(out) }
    }

    /// Unwraps the inner writer.
    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    fn envelope(event: &Event<RunEvent<'_>>) -> serde_json::Value {
        let kind = event.kind();
        let thread_id = match kind {
            RunEventKind::SuiteEnter | RunEventKind::SuiteExit | RunEventKind::Progress => None,
            _ => Some(thread_id()),
        };
        let mut data = event.to_json();
        if let RunEvent::SuiteEnter { suite } = event.value {
            data["schemaVersion"] = SCHEMA_VERSION.into();
            if let Some(env) = suite.env() {
                data["env"] = env.into();
            }
            data["threads"] = suite.threads().into();
        }
        json!({
            "type": kind.to_string(),
            "timeStamp": event.timestamp_millis(),
            "threadId": thread_id,
            "data": data,
        })
    }
}

fn thread_id() -> String {
    let current = thread::current();
    match current.name() {
        Some(name) if name != "main" => name.to_owned(),
        _ => format!("{:?}", current.id()),
    }
}

impl<W: Write + Send> RunListener for JsonLinesListener<W> {
    fn on_event(&self, event: &Event<RunEvent<'_>>) -> bool {
        let line = Self::envelope(event).to_string();
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writeln!(out, "{line}").and_then(|()| out.flush()) {
            tracing::warn!("failed to write event to JSON lines: {e}");
        }
        true
    }
}
