// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Listener contracts and their dispatch.

use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use super::{Event, RunEvent};
use crate::{
    feature::{Feature, Scenario},
    result::{FeatureResult, ScenarioResult, SuiteResult},
    runner::Suite,
};

/// Observer of every [`RunEvent`], shared by all workers.
///
/// Returning `false` from an event whose [kind](super::RunEventKind::can_veto)
/// allows it skips the unit about to start. For other kinds the return value
/// is ignored.
pub trait RunListener: Send + Sync {
    /// Handles the given `event`.
    fn on_event(&self, event: &Event<RunEvent<'_>>) -> bool;
}

/// Observer of every [`RunEvent`] happening on a single worker.
///
/// Obtained through a [`RunListenerFactory`], so it may keep unsynchronized
/// per-worker state.
pub trait ThreadListener: Send {
    /// Handles the given `event`. See [`RunListener::on_event()`].
    fn on_event(&mut self, event: &Event<RunEvent<'_>>) -> bool;
}

/// Factory of [`ThreadListener`]s, asked exactly once per worker before the
/// worker runs anything.
pub trait RunListenerFactory: Send + Sync {
    /// Creates a [`ThreadListener`] private to the calling worker.
    fn create(&self) -> Box<dyn ThreadListener>;
}

/// Purely observational report sink, notified at suite, feature and
/// scenario granularity only.
#[allow(unused_variables)]
pub trait ResultListener: Send + Sync {
    /// Suite is about to run.
    fn on_suite_start(&self, suite: &Suite) {}

    /// Suite finished.
    fn on_suite_end(&self, result: &SuiteResult) {}

    /// Top-level feature is about to run.
    fn on_feature_start(&self, feature: &Feature) {}

    /// Top-level feature finished.
    fn on_feature_end(&self, result: &FeatureResult) {}

    /// Top-level scenario is about to run.
    fn on_scenario_start(&self, scenario: &Scenario) {}

    /// Top-level scenario finished.
    fn on_scenario_end(&self, result: &ScenarioResult) {}
}

/// [`RunListener`] backed by a closure, see [`listener_fn()`].
#[derive(Clone, Copy, Debug)]
pub struct FnListener<F>(F);

/// Wraps the given closure into a [`RunListener`].
pub fn listener_fn<F>(f: F) -> FnListener<F>
where
    F: Fn(&Event<RunEvent<'_>>) -> bool + Send + Sync,
{
    FnListener(f)
}

impl<F> RunListener for FnListener<F>
where
    F: Fn(&Event<RunEvent<'_>>) -> bool + Send + Sync,
{
    fn on_event(&self, event: &Event<RunEvent<'_>>) -> bool {
        (self.0)(event)
    }
}

impl<L: RunListener + ?Sized> RunListener for Arc<L> {
    fn on_event(&self, event: &Event<RunEvent<'_>>) -> bool {
        (**self).on_event(event)
    }
}

impl<F: RunListenerFactory + ?Sized> RunListenerFactory for Arc<F> {
    fn create(&self) -> Box<dyn ThreadListener> {
        (**self).create()
    }
}

impl<L: ResultListener + ?Sized> ResultListener for Arc<L> {
    fn on_suite_start(&self, suite: &Suite) {
        (**self).on_suite_start(suite);
    }

    fn on_suite_end(&self, result: &SuiteResult) {
        (**self).on_suite_end(result);
    }

    fn on_feature_start(&self, feature: &Feature) {
        (**self).on_feature_start(feature);
    }

    fn on_feature_end(&self, result: &FeatureResult) {
        (**self).on_feature_end(result);
    }

    fn on_scenario_start(&self, scenario: &Scenario) {
        (**self).on_scenario_start(scenario);
    }

    fn on_scenario_end(&self, result: &ScenarioResult) {
        (**self).on_scenario_end(result);
    }
}

/// Runs a listener callback, turning a panic into an error log and the
/// `fallback` value.
pub(crate) fn guarded<R>(what: &str, fallback: R, f: impl FnOnce() -> R) -> R {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(r) => r,
        Err(info) => {
            let msg = info
                .downcast_ref::<String>()
                .cloned()
                .or_else(|| info.downcast_ref::<&str>().map(|s| (*s).to_owned()))
                .unwrap_or_else(|| "unknown panic".into());
            tracing::error!("{what} panicked: {msg}");
            fallback
        }
    }
}

/// Delivers the `event` to every shared listener, then to every worker
/// listener, in registration order.
///
/// Every listener sees the event even if a previous one vetoed it. Returns
/// whether the unit about to start may run: always `true` for kinds that
/// can't be vetoed.
pub(crate) fn dispatch(
    shared: &[Arc<dyn RunListener>],
    local: &mut [Box<dyn ThreadListener>],
    event: RunEvent<'_>,
) -> bool {
    let kind = event.kind();
    let event = Event::new(event);
    let mut proceed = true;
    for l in shared {
        proceed &= guarded("run listener", true, || l.on_event(&event));
    }
    for l in local.iter_mut() {
        proceed &= guarded("thread listener", true, || l.on_event(&event));
    }
    proceed || !kind.can_veto()
}

/// Delivers the `event` of a kind listeners can't veto, like [`dispatch()`]
/// does.
pub(crate) fn notify(
    shared: &[Arc<dyn RunListener>],
    local: &mut [Box<dyn ThreadListener>],
    event: RunEvent<'_>,
) {
    let kind = event.kind();
    let proceed = dispatch(shared, local, event);
    debug_assert!(proceed && !kind.can_veto(), "`{kind}` can be vetoed");
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    use super::*;
    use crate::event::RunEventKind;

    fn progress() -> RunEvent<'static> {
        RunEvent::Progress { completed: 1, total: 2 }
    }

    #[test]
    fn delivers_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (a, b) = (Arc::clone(&seen), Arc::clone(&seen));
        let shared: Vec<Arc<dyn RunListener>> = vec![
            Arc::new(listener_fn(move |_| {
                a.lock().unwrap().push("a");
                true
            })),
            Arc::new(listener_fn(move |_| {
                b.lock().unwrap().push("b");
                true
            })),
        ];
        assert!(dispatch(&shared, &mut [], progress()));
        assert_eq!(*seen.lock().unwrap(), ["a", "b"]);
    }

    #[test]
    fn veto_only_counts_for_enter_kinds() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let shared: Vec<Arc<dyn RunListener>> = vec![
            Arc::new(listener_fn(|_| false)),
            Arc::new(listener_fn(move |_| {
                _ = c.fetch_add(1, Ordering::SeqCst);
                true
            })),
        ];

        assert!(dispatch(&shared, &mut [], progress()));
        let suite = Suite::default();
        assert!(!dispatch(&shared, &mut [], RunEvent::SuiteEnter { suite: &suite }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn panicking_listener_does_not_stop_dispatch() {
        struct Counter(usize);
        impl ThreadListener for Counter {
            fn on_event(&mut self, event: &Event<RunEvent<'_>>) -> bool {
                assert_eq!(event.kind(), RunEventKind::Progress);
                self.0 += 1;
                true
            }
        }

        let shared: Vec<Arc<dyn RunListener>> =
            vec![Arc::new(listener_fn(|_| panic!("listener bug")))];
        let mut local: Vec<Box<dyn ThreadListener>> = vec![Box::new(Counter(0))];

        assert!(dispatch(&shared, &mut local, progress()));
    }
}
