use std::{rc::Rc, time::Duration};

use futures::future::LocalBoxFuture;

use crate::{noop_unsubscribe, Instant, Unsubscribe};

/// The host a binding runs in: clock, task spawning, window events and timers.
///
/// Window listeners and timers are optional. A host without a window returns a no-op
/// [`Unsubscribe`], so teardown never has to know whether attaching happened.
pub trait Environment {
    /// Current time.
    fn now(&self) -> Instant {
        Instant::now()
    }

    /// Run a future to completion in the background.
    fn spawn(&self, task: LocalBoxFuture<'static, ()>) {
        leptos::spawn_local(task)
    }

    /// Listen to the window regaining focus.
    fn on_focus(&self, listener: Rc<dyn Fn()>) -> Unsubscribe;

    /// Listen to the network coming back online.
    fn on_online(&self, listener: Rc<dyn Fn()>) -> Unsubscribe;

    /// Call `tick` every `period` until the returned handle is invoked.
    fn set_interval(&self, period: Duration, tick: Rc<dyn Fn()>) -> Unsubscribe;
}

/// Browser host backed by `window` events and `setInterval`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrowserEnvironment;

impl Environment for BrowserEnvironment {
    fn on_focus(&self, listener: Rc<dyn Fn()>) -> Unsubscribe {
        let handle = leptos::window_event_listener_untyped("focus", move |_| listener());
        Box::new(move || handle.remove())
    }

    fn on_online(&self, listener: Rc<dyn Fn()>) -> Unsubscribe {
        let handle = leptos::window_event_listener_untyped("online", move |_| listener());
        Box::new(move || handle.remove())
    }

    fn set_interval(&self, period: Duration, tick: Rc<dyn Fn()>) -> Unsubscribe {
        match leptos::set_interval_with_handle(move || tick(), period) {
            Ok(handle) => Box::new(move || handle.clear()),
            Err(_) => {
                leptos::logging::debug_warn!("Failed to start interval.");
                noop_unsubscribe()
            }
        }
    }
}

/// Host without a window, e.g. server rendering. No focus, online or timer events ever fire.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadlessEnvironment;

impl Environment for HeadlessEnvironment {
    fn on_focus(&self, _listener: Rc<dyn Fn()>) -> Unsubscribe {
        noop_unsubscribe()
    }

    fn on_online(&self, _listener: Rc<dyn Fn()>) -> Unsubscribe {
        noop_unsubscribe()
    }

    fn set_interval(&self, _period: Duration, _tick: Rc<dyn Fn()>) -> Unsubscribe {
        noop_unsubscribe()
    }
}

/// The environment used when none is configured.
/// [`BrowserEnvironment`] with the `csr` or `hydrate` features, [`HeadlessEnvironment`] otherwise.
pub fn default_environment() -> Rc<dyn Environment> {
    cfg_if::cfg_if! {
        if #[cfg(any(feature = "hydrate", feature = "csr"))] {
            Rc::new(BrowserEnvironment)
        } else {
            Rc::new(HeadlessEnvironment)
        }
    }
}
