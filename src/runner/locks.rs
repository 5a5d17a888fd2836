// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Mutual exclusion of scenarios tagged with `@lock`.
//!
//! Every scenario holds the shared side of a global [`RwLock`] while it runs,
//! and `@lock=*` ones hold its exclusive side. Named locks are taken all at
//! once, so scenarios listing several names can't deadlock each other.

use std::{
    collections::HashSet,
    sync::{Condvar, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::{feature::Scenario, tag::Tag};

/// `@lock` value running a scenario alone.
const EXCLUSIVE: &str = "*";

/// Registry of the locks held by running scenarios.
#[derive(Debug, Default)]
pub(super) struct ScenarioLocks {
    exclusive: RwLock<()>,
    held: Mutex<HashSet<String>>,
    released: Condvar,
}

/// Locks of one running scenario, released on drop.
#[derive(Debug)]
#[must_use]
pub(super) struct Guard<'l> {
    locks: &'l ScenarioLocks,
    names: Vec<String>,
    _shared: Option<RwLockReadGuard<'l, ()>>,
    _exclusive: Option<RwLockWriteGuard<'l, ()>>,
}

impl ScenarioLocks {
    /// Blocks until the `scenario` may run according to its `@lock` tags.
    pub(super) fn acquire(&self, scenario: &Scenario) -> Guard<'_> {
        let mut names = scenario
            .tags
            .iter()
            .filter(|t| t.name() == Tag::LOCK)
            .flat_map(|t| t.values().iter().cloned())
            .collect::<Vec<_>>();

        if names.iter().any(|n| n == EXCLUSIVE) {
            tracing::debug!("scenario `{}` waits for exclusive lock", scenario.name);
            let guard = self.exclusive.write().unwrap_or_else(PoisonError::into_inner);
            return Guard { locks: self, names: Vec::new(), _shared: None, _exclusive: Some(guard) };
        }

        let shared = self.exclusive.read().unwrap_or_else(PoisonError::into_inner);
        names.sort();
        names.dedup();
        if !names.is_empty() {
            tracing::debug!("scenario `{}` waits for locks {names:?}", scenario.name);
            let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
            while names.iter().any(|n| held.contains(n)) {
                held = self.released.wait(held).unwrap_or_else(PoisonError::into_inner);
            }
            held.extend(names.iter().cloned());
        }
        Guard { locks: self, names, _shared: Some(shared), _exclusive: None }
    }
}

impl Drop for Guard<'_> {
    fn drop(&mut self) {
        if self.names.is_empty() {
            return;
        }
        let mut held = self.locks.held.lock().unwrap_or_else(PoisonError::into_inner);
        for name in &self.names {
            _ = held.remove(name);
        }
        drop(held);
        self.locks.released.notify_all();
    }
}
