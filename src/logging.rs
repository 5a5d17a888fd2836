// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! [`tracing`] integration: per-worker subscribers and capturing of the
//! events emitted while a step runs into its [`StepResult`] log.
//!
//! [`StepResult`]: crate::result::StepResult

use std::{cell::RefCell, fmt, io, mem};

use tracing::{
    field::{Field, Visit},
    level_filters::LevelFilter,
    Event, Subscriber,
};
use tracing_subscriber::{layer, layer::SubscriberExt as _, Layer};

/// Target of the events produced by `print` steps. They're appended to the
/// step log directly, so [`StepLogLayer`] doesn't capture them twice.
pub const PRINT_TARGET: &str = "gauntlet::print";

thread_local! {
    static CAPTURED: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Runs `f` capturing every line [appended](append) on the current thread,
/// including [`tracing`] events seen by a [`StepLogLayer`].
///
/// Captures nest: an inner capture doesn't leak into the outer one.
pub fn capture<R>(f: impl FnOnce() -> R) -> (R, String) {
    let outer = CAPTURED.with(|c| c.replace(Some(String::new())));
    let out = f();
    let log = CAPTURED.with(|c| mem::replace(&mut *c.borrow_mut(), outer));
    (out, log.unwrap_or_default())
}

/// Appends a `line` to the current capture, if any.
pub fn append(line: &str) {
    CAPTURED.with(|c| {
        if let Some(log) = c.borrow_mut().as_mut() {
            log.push_str(line);
            log.push('\n');
        }
    });
}

/// [`Layer`] appending formatted events to the capture of the thread that
/// emitted them.
#[derive(Clone, Copy, Debug, Default)]
pub struct StepLogLayer;

impl<S: Subscriber> Layer<S> for StepLogLayer {
    fn on_event(&self, event: &Event<'_>, _: layer::Context<'_, S>) {
        let meta = event.metadata();
        if meta.target() == PRINT_TARGET {
            return;
        }
        let capturing = CAPTURED.with(|c| c.borrow().is_some());
        if !capturing {
            return;
        }
        let mut visitor = Message::default();
        event.record(&mut visitor);
        append(&format!("{} {}", meta.level(), visitor.render()));
    }
}

/// Renders the `message` field first, then the others as `key=value`.
#[derive(Debug, Default)]
struct Message {
    message: String,
    fields: Vec<String>,
}

impl Message {
    fn render(self) -> String {
        let mut out = self.message;
        for f in self.fields {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(&f);
        }
        out
    }
}

impl Visit for Message {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            value.clone_into(&mut self.message);
        } else {
            self.fields.push(format!("{}={value:?}", field.name()));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.fields.push(format!("{}={value:?}", field.name()));
        }
    }
}

/// Builds the [`Subscriber`] a worker installs for its lifetime: a `fmt`
/// layer writing to `stderr` plus a [`StepLogLayer`], both filtered by
/// `level`.
#[must_use]
pub fn worker_subscriber(level: LevelFilter) -> impl Subscriber + Send + Sync {
    tracing_subscriber::registry()
        .with(StepLogLayer.with_filter(level))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(false)
                .with_filter(level),
        )
}
