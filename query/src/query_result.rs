use std::{rc::Rc, time::Duration};

use leptos::*;

use crate::{
    binding::Binding, derived_timers, AnyValue, FetchOptions, Instant, Mutation, QueryError,
    QueryValue,
};

/// The resource signal and the actions bound to it.
pub type QueryResource<V> = (Signal<Option<V>>, QueryActions<V>);

/// Actions and reactive views for a query binding.
///
/// Every action targets the key that is active when it is called.
/// While the key is inactive, actions are no-ops.
#[derive(Clone)]
pub struct QueryActions<V>
where
    V: 'static,
{
    /// Last error the engine reported for the active key.
    /// Cleared whenever the binding subscribes to a key.
    pub error: Signal<Option<QueryError>>,
    /// Whether the engine is refetching the active key in the background.
    pub is_refetching: Signal<bool>,
    /// When the window last triggered a focus refetch.
    pub last_focus: Signal<Instant>,

    binding: Rc<Binding<V>>,
}

impl<V> QueryActions<V>
where
    V: QueryValue,
{
    pub(crate) fn new(binding: Rc<Binding<V>>) -> Self {
        QueryActions {
            error: binding.error.read_only().into(),
            is_refetching: binding.is_refetching.read_only().into(),
            last_focus: binding.last_focus.read_only().into(),
            binding,
        }
    }

    /// The active key, or `None` while inactive. Does not track.
    pub fn current_key(&self) -> Option<String> {
        self.binding.current_key()
    }

    /// Refetch the active key, bypassing any cached value.
    ///
    /// Returns `Ok(None)` without contacting the engine while the key is inactive.
    /// The resource itself is updated through the engine's `resolved` event.
    pub async fn refetch(&self) -> Result<Option<V>, QueryError> {
        self.binding.refetch(None).await
    }

    /// [`refetch`](Self::refetch) with `overrides` layered over the resolved fetch options.
    pub async fn refetch_with(&self, overrides: FetchOptions) -> Result<Option<V>, QueryError> {
        self.binding.refetch(Some(overrides)).await
    }

    /// Replace the cached value of the active key.
    pub fn mutate(&self, value: V) {
        if let Some(key) = self.current_key() {
            self.binding
                .engine()
                .mutate(&key, Mutation::Value(Rc::new(value)));
        }
    }

    /// Compute the new cached value of the active key from the current one.
    pub fn update(&self, updater: impl FnOnce(Option<&V>) -> V + 'static) {
        if let Some(key) = self.current_key() {
            let mutation = Mutation::Update(Box::new(move |current: Option<AnyValue>| -> AnyValue {
                let current = current.as_ref().and_then(|value| value.downcast_ref::<V>());
                Rc::new(updater(current))
            }));
            self.binding.engine().mutate(&key, mutation);
        }
    }

    /// Evict the active key from the engine's cache.
    pub fn forget(&self) {
        if let Some(key) = self.current_key() {
            self.binding.engine().forget(&key);
        }
    }

    /// Abort the active key's in-flight request.
    pub fn abort(&self, reason: Option<String>) {
        if let Some(key) = self.current_key() {
            self.binding.engine().abort(&key, reason);
        }
    }

    /// When the active key expires in the engine's cache.
    pub fn expiration(&self) -> Option<Instant> {
        self.current_key()
            .and_then(|key| self.binding.engine().expiration(&key))
    }

    /// Stop following key changes and detach every listener. Idempotent.
    ///
    /// Derived timers keep running until [`dispose`](Self::dispose).
    pub fn unsubscribe(&self) {
        self.binding.stop();
    }

    /// Release everything the binding owns: watcher, listeners and derived timers. Idempotent.
    ///
    /// Called automatically when the owning reactive scope is cleaned up.
    pub fn dispose(&self) {
        self.binding.dispose();
    }

    /// Creates signals that, every `precision`, tell whether a focus refetch is currently
    /// allowed and how long until it is.
    ///
    /// Returns `(is_available, available_in)`.
    pub fn create_focus_available(&self, precision: Duration) -> (Signal<bool>, Signal<Duration>) {
        derived_timers::create_focus_available(&self.binding, precision)
    }

    /// Creates signals that, every `precision`, tell whether the active key is stale and how
    /// long until it is. A key the engine has no expiration for is stale.
    ///
    /// Returns `(is_stale, stale_in)`.
    pub fn create_stale(&self, precision: Duration) -> (Signal<bool>, Signal<Duration>) {
        derived_timers::create_stale(&self.binding, precision)
    }

    /// The resource and error merged into a single `Result`.
    ///
    /// Rendering this inside an [`ErrorBoundary`](leptos::ErrorBoundary) lets the boundary
    /// catch engine errors.
    pub fn resource_result(&self) -> Signal<Result<Option<V>, QueryError>> {
        let resource = self.binding.resource;
        let error = self.binding.error;
        Signal::derive(move || match error.get() {
            Some(error) => Err(error),
            None => Ok(resource.get()),
        })
    }
}

impl<V> std::fmt::Debug for QueryActions<V>
where
    V: QueryValue,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryActions")
            .field("key", &self.binding.current_key())
            .finish_non_exhaustive()
    }
}
