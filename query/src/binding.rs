use std::{
    cell::{Cell, RefCell},
    future::Future,
    rc::Rc,
};

use leptos::*;
use slotmap::{new_key_type, SlotMap};

use crate::{
    subscription::SubscriptionSet, AnyValue, FetchOptions, Instant, IntoQueryKey, QueryEngine,
    QueryError, QueryValue, ResolvedOptions, Unsubscribe,
};

new_key_type! {
    pub(crate) struct TimerKey;
}

/// State owned by one `use_query` call.
///
/// The reactive key drives re-subscription. Exactly one [`SubscriptionSet`] is alive at a time.
pub(crate) struct Binding<V: 'static> {
    pub(crate) key: Memo<Option<String>>,
    pub(crate) options: ResolvedOptions,
    pub(crate) resource: RwSignal<Option<V>>,
    pub(crate) error: RwSignal<Option<QueryError>>,
    pub(crate) is_refetching: RwSignal<bool>,
    pub(crate) last_focus: RwSignal<Instant>,

    subscription: Cell<Option<SubscriptionSet>>,
    // Bumped on every teardown. Fetches started under an older generation are discarded.
    generation: Cell<u64>,
    stopped: Cell<bool>,
    disposed: Cell<bool>,
    timers: RefCell<SlotMap<TimerKey, Unsubscribe>>,
}

impl<V> Binding<V>
where
    V: QueryValue,
{
    pub(crate) fn new<K>(key: impl Fn() -> K + 'static, options: ResolvedOptions) -> Rc<Self>
    where
        K: IntoQueryKey,
    {
        let key = create_memo(move |_| key().into_query_key());
        let last_focus = RwSignal::new(options.environment.now());

        Rc::new(Binding {
            key,
            options,
            resource: RwSignal::new(None),
            error: RwSignal::new(None),
            is_refetching: RwSignal::new(false),
            last_focus,
            subscription: Cell::new(None),
            generation: Cell::new(0),
            stopped: Cell::new(false),
            disposed: Cell::new(false),
            timers: RefCell::new(SlotMap::with_key()),
        })
    }

    /// The active key, without tracking.
    pub(crate) fn current_key(&self) -> Option<String> {
        self.key.try_get_untracked().flatten()
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.get()
    }

    /// Re-subscribes whenever the key changes, starting now.
    /// `initial_fetch` decides whether the first run primes the resource.
    pub(crate) fn watch(self: &Rc<Self>, initial_fetch: bool) {
        let binding = self.clone();
        create_isomorphic_effect(move |prev: Option<()>| {
            if binding.stopped.get() {
                return;
            }
            let key = binding.key.get();
            let fetch = prev.is_some() || initial_fetch;
            untrack(|| binding.resubscribe(key, fetch));
        });
    }

    /// Disposes the binding when the current owner is cleaned up.
    pub(crate) fn dispose_on_cleanup(self: &Rc<Self>) {
        if Owner::current().is_some() {
            let binding = self.clone();
            on_cleanup(move || binding.dispose());
        }
    }

    fn resubscribe(self: &Rc<Self>, key: Option<String>, fetch: bool) {
        self.teardown_subscription();
        self.is_refetching.set(false);

        let Some(key) = key else {
            return;
        };

        self.error.set(None);
        self.subscription
            .set(Some(SubscriptionSet::install(self, &key)));

        if fetch {
            self.prime(key);
        }
    }

    // Stale tolerant fetch whose result becomes the resource, unless the key moved on.
    fn prime(self: &Rc<Self>, key: String) {
        let generation = self.generation();
        let binding = Rc::downgrade(self);
        let fetch = fetch_value::<V>(
            self.options.engine.clone(),
            key,
            self.options.fetch_options(true, None),
        );

        self.options.environment.spawn(Box::pin(async move {
            let result = fetch.await;
            let Some(binding) = binding.upgrade() else {
                return;
            };
            if binding.generation() != generation {
                return;
            }
            match result {
                Ok(value) => binding.resource.set(Some(value)),
                Err(error) => {
                    logging::debug_warn!("Initial fetch failed: {error}");
                    binding.error.set(Some(error));
                }
            }
        }));
    }

    /// Stale tolerant fetch for `key`.
    pub(crate) fn fetch_stale(
        &self,
        key: String,
    ) -> impl Future<Output = Result<V, QueryError>> + 'static {
        fetch_value::<V>(
            self.options.engine.clone(),
            key,
            self.options.fetch_options(true, None),
        )
    }

    /// Forced fetch for the key active at call time. `Ok(None)` when inactive.
    pub(crate) fn refetch(
        &self,
        overrides: Option<FetchOptions>,
    ) -> impl Future<Output = Result<Option<V>, QueryError>> + 'static {
        let fetch = self.current_key().map(|key| {
            fetch_value::<V>(
                self.options.engine.clone(),
                key,
                self.options.fetch_options(false, overrides.as_ref()),
            )
        });
        async move {
            match fetch {
                Some(fetch) => fetch.await.map(Some),
                None => Ok(None),
            }
        }
    }

    /// Refetch in the background, failures are reported through the `error` event.
    pub(crate) fn spawn_refetch(&self) {
        let refetch = self.refetch(None);
        self.options.environment.spawn(Box::pin(async move {
            if let Err(error) = refetch.await {
                logging::debug_warn!("Background refetch failed: {error}");
            }
        }));
    }

    /// Focus handler. Refetches once `focus_interval` has passed since the last focus refetch.
    pub(crate) fn handle_focus(&self) {
        let now = self.options.environment.now();
        let Some(last) = self.last_focus.try_get_untracked() else {
            return;
        };
        if now - last > self.options.focus_interval {
            self.last_focus.set(now);
            self.spawn_refetch();
        }
    }

    fn teardown_subscription(&self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.teardown();
        }
        self.generation.set(self.generation.get() + 1);
    }

    /// Stops re-subscribing and detaches the current subscription set.
    pub(crate) fn stop(&self) {
        self.stopped.set(true);
        self.teardown_subscription();
    }

    /// [`stop`](Self::stop) and clear every derived timer.
    pub(crate) fn dispose(&self) {
        self.disposed.set(true);
        self.stop();
        let timers = std::mem::take(&mut *self.timers.borrow_mut());
        for (_, clear) in timers {
            clear();
        }
    }

    pub(crate) fn register_timer(&self, clear: Unsubscribe) {
        if self.disposed.get() {
            // Nothing would ever clear it.
            clear();
        } else {
            self.timers.borrow_mut().insert(clear);
        }
    }

    pub(crate) fn engine(&self) -> &Rc<dyn QueryEngine> {
        &self.options.engine
    }
}

pub(crate) async fn fetch_value<V>(
    engine: Rc<dyn QueryEngine>,
    key: String,
    options: FetchOptions,
) -> Result<V, QueryError>
where
    V: QueryValue,
{
    let value = engine.query(&key, options).await?;
    downcast_value(&key, &value)
}

pub(crate) fn downcast_value<V>(key: &str, value: &AnyValue) -> Result<V, QueryError>
where
    V: QueryValue,
{
    value
        .downcast_ref::<V>()
        .cloned()
        .ok_or_else(|| QueryError::TypeMismatch {
            key: key.to_string(),
            expected: std::any::type_name::<V>(),
        })
}
