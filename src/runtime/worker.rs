// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Per-worker state.

use std::{fmt, sync::Arc};

use crate::{
    event::{self, RunEvent, ThreadListener},
    http::HttpClient,
    runner::Suite,
};

/// State owned by one pool worker and passed by `&mut` into every unit it
/// runs.
///
/// Holds the [`ThreadListener`]s its [`Suite`]'s factories created for this
/// worker and the worker's [`HttpClient`], created on first use.
pub struct WorkerContext {
    index: usize,
    name: String,
    suite: Arc<Suite>,
    listeners: Vec<Box<dyn ThreadListener>>,
    http: Option<Box<dyn HttpClient>>,
}

impl fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerContext")
            .field("index", &self.index)
            .field("name", &self.name)
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl WorkerContext {
    /// Creates the context of the worker `index`, named `worker-<index>`.
    #[must_use]
    pub fn new(index: usize, suite: Arc<Suite>) -> Self {
        Self::named(index, format!("worker-{index}"), suite)
    }

    /// Creates a context with an explicit `name`, asking every listener
    /// factory of the `suite` for this worker's listener.
    #[must_use]
    pub fn named(index: usize, name: impl Into<String>, suite: Arc<Suite>) -> Self {
        let listeners = suite
            .listener_factories()
            .iter()
            .filter_map(|f| event::guarded("listener factory", None, || Some(f.create())))
            .collect();
        Self { index, name: name.into(), suite, listeners, http: None }
    }

    /// Index of this worker in the pool.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Name of this worker.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// [`Suite`] this worker runs.
    #[must_use]
    pub const fn suite(&self) -> &Arc<Suite> {
        &self.suite
    }

    /// Fires the `event` to the shared listeners of the [`Suite`], then to
    /// this worker's own ones. See [`RunListener`] for the return value.
    ///
    /// [`RunListener`]: crate::event::RunListener
    pub fn fire(&mut self, event: RunEvent<'_>) -> bool {
        event::dispatch(self.suite.listeners(), &mut self.listeners, event)
    }

    /// Fires the `event` like [`WorkerContext::fire()`] does, for kinds
    /// listeners can't veto.
    pub fn notify(&mut self, event: RunEvent<'_>) {
        event::notify(self.suite.listeners(), &mut self.listeners, event);
    }

    /// [`HttpClient`] of this worker, if the [`Suite`] has a factory of
    /// them.
    pub fn http_client(&mut self) -> Option<&mut Box<dyn HttpClient>> {
        if self.http.is_none() {
            self.http = self.suite.http_client_factory().map(|f| f.create());
        }
        self.http.as_mut()
    }
}
