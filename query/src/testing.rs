use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    future::Future,
    pin::Pin,
    rc::Rc,
    task::{Context, Poll},
    time::Duration,
};

use async_trait::async_trait;
use futures::{
    executor::{LocalPool, LocalSpawner},
    future::LocalBoxFuture,
    task::LocalSpawnExt,
};
use slotmap::{new_key_type, SlotMap};

use crate::*;

new_key_type! {
    struct ListenerKey;
    struct EnvKey;
}

/// Calls received by [`StubEngine`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum EngineCall {
    Query { key: String, options: FetchOptions },
    Mutate { key: String },
    Forget { key: String },
    Abort { key: String, reason: Option<String> },
    Subscribe { key: String, event: EventKind },
}

/// In-memory engine with scripted responses and a call log.
#[derive(Clone, Default)]
pub(crate) struct StubEngine {
    inner: Rc<StubInner>,
}

#[derive(Default)]
struct StubInner {
    responses: RefCell<HashMap<String, AnyValue>>,
    failures: RefCell<HashMap<String, QueryError>>,
    cache: RefCell<HashMap<String, AnyValue>>,
    expirations: RefCell<HashMap<String, Instant>>,
    listeners: RefCell<SlotMap<ListenerKey, (String, EventKind, EventListener)>>,
    calls: RefCell<Vec<EngineCall>>,
}

impl StubEngine {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Value the next fetches of `key` resolve with.
    pub(crate) fn respond<V: 'static>(&self, key: &str, value: V) {
        self.inner
            .responses
            .borrow_mut()
            .insert(key.to_string(), Rc::new(value));
    }

    pub(crate) fn fail(&self, key: &str, error: QueryError) {
        self.inner
            .failures
            .borrow_mut()
            .insert(key.to_string(), error);
    }

    pub(crate) fn set_expiration(&self, key: &str, expires_at: Instant) {
        self.inner
            .expirations
            .borrow_mut()
            .insert(key.to_string(), expires_at);
    }

    pub(crate) fn cached<V: Clone + 'static>(&self, key: &str) -> Option<V> {
        self.inner
            .cache
            .borrow()
            .get(key)
            .and_then(|value| value.downcast_ref::<V>().cloned())
    }

    pub(crate) fn emit(&self, key: &str, event: EngineEvent) {
        let kind = event.kind();
        let listeners = self
            .inner
            .listeners
            .borrow()
            .values()
            .filter(|(k, e, _)| k == key && *e == kind)
            .map(|(_, _, listener)| listener.clone())
            .collect::<Vec<_>>();
        for listener in listeners {
            listener(&event);
        }
    }

    pub(crate) fn listener_count(&self, key: &str) -> usize {
        self.inner
            .listeners
            .borrow()
            .values()
            .filter(|(k, _, _)| k == key)
            .count()
    }

    pub(crate) fn calls(&self) -> Vec<EngineCall> {
        self.inner.calls.borrow().clone()
    }

    pub(crate) fn query_calls(&self, key: &str) -> Vec<FetchOptions> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                EngineCall::Query { key: k, options } if k == key => Some(options),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: EngineCall) {
        self.inner.calls.borrow_mut().push(call);
    }
}

#[async_trait(?Send)]
impl QueryEngine for StubEngine {
    async fn query(&self, key: &str, options: FetchOptions) -> Result<AnyValue, QueryError> {
        self.record(EngineCall::Query {
            key: key.to_string(),
            options,
        });

        let cached = self.inner.cache.borrow().get(key).cloned();
        if let (true, Some(cached)) = (options.is_stale_tolerant(), cached.as_ref()) {
            return Ok(cached.clone());
        }
        if cached.is_some() {
            self.emit(key, EngineEvent::Refetching);
        }

        YieldNow(false).await;

        let failure = self.inner.failures.borrow().get(key).cloned();
        if let Some(error) = failure {
            self.emit(key, EngineEvent::Error(error.clone()));
            return Err(error);
        }

        let response = self.inner.responses.borrow().get(key).cloned();
        match response {
            Some(value) => {
                self.inner
                    .cache
                    .borrow_mut()
                    .insert(key.to_string(), value.clone());
                self.emit(key, EngineEvent::Resolved(value.clone()));
                Ok(value)
            }
            None => Err(QueryError::fetch(key, "no scripted response")),
        }
    }

    fn mutate(&self, key: &str, mutation: Mutation) {
        self.record(EngineCall::Mutate {
            key: key.to_string(),
        });
        let current = self.inner.cache.borrow().get(key).cloned();
        let next = mutation.apply(current);
        self.inner
            .cache
            .borrow_mut()
            .insert(key.to_string(), next.clone());
        self.emit(key, EngineEvent::Mutated(next));
    }

    fn forget(&self, key: &str) {
        self.record(EngineCall::Forget {
            key: key.to_string(),
        });
        self.inner.cache.borrow_mut().remove(key);
        self.emit(key, EngineEvent::Forgotten);
    }

    fn abort(&self, key: &str, reason: Option<String>) {
        self.record(EngineCall::Abort {
            key: key.to_string(),
            reason,
        });
    }

    fn subscribe(&self, key: &str, event: EventKind, listener: EventListener) -> Unsubscribe {
        self.record(EngineCall::Subscribe {
            key: key.to_string(),
            event,
        });
        let id = self
            .inner
            .listeners
            .borrow_mut()
            .insert((key.to_string(), event, listener));
        let inner = self.inner.clone();
        Box::new(move || {
            inner.listeners.borrow_mut().remove(id);
        })
    }

    fn expiration(&self, key: &str) -> Option<Instant> {
        self.inner.expirations.borrow().get(key).copied()
    }
}

// Yields once so that fetches settle on a later turn of the task queue.
struct YieldNow(bool);

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.0 {
            Poll::Ready(())
        } else {
            self.0 = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

struct Interval {
    period: Duration,
    next: Instant,
    tick: Rc<dyn Fn()>,
}

type Listeners = Rc<RefCell<SlotMap<EnvKey, Rc<dyn Fn()>>>>;

/// Environment with a virtual clock, manual window events and a manually driven task queue.
pub(crate) struct ManualEnvironment {
    now: Cell<Instant>,
    pool: RefCell<LocalPool>,
    spawner: LocalSpawner,
    focus: Listeners,
    online: Listeners,
    intervals: Rc<RefCell<SlotMap<EnvKey, Interval>>>,
}

impl ManualEnvironment {
    pub(crate) fn new() -> Rc<Self> {
        let pool = LocalPool::new();
        let spawner = pool.spawner();
        Rc::new(Self {
            now: Cell::new(Instant::from_millis(1_000_000)),
            pool: RefCell::new(pool),
            spawner,
            focus: Rc::default(),
            online: Rc::default(),
            intervals: Rc::default(),
        })
    }

    /// Runs queued tasks until none can make progress.
    pub(crate) fn run_until_stalled(&self) {
        self.pool.borrow_mut().run_until_stalled();
    }

    /// Moves the clock forward, firing due intervals in order, then drains the task queue.
    pub(crate) fn advance(&self, by: Duration) {
        let target = self.now.get() + by;
        loop {
            let due = self
                .intervals
                .borrow()
                .iter()
                .filter(|(_, interval)| interval.next <= target)
                .min_by_key(|(_, interval)| interval.next)
                .map(|(id, interval)| (id, interval.next, interval.tick.clone()));

            match due {
                Some((id, at, tick)) => {
                    self.now.set(at);
                    if let Some(interval) = self.intervals.borrow_mut().get_mut(id) {
                        interval.next = at + interval.period;
                    }
                    tick();
                }
                None => break,
            }
        }
        self.now.set(target);
        self.run_until_stalled();
    }

    pub(crate) fn focus(&self) {
        fire(&self.focus);
        self.run_until_stalled();
    }

    pub(crate) fn online(&self) {
        fire(&self.online);
        self.run_until_stalled();
    }

    pub(crate) fn focus_listeners(&self) -> usize {
        self.focus.borrow().len()
    }

    pub(crate) fn online_listeners(&self) -> usize {
        self.online.borrow().len()
    }

    pub(crate) fn intervals(&self) -> usize {
        self.intervals.borrow().len()
    }
}

fn fire(listeners: &Listeners) {
    let listeners = listeners.borrow().values().cloned().collect::<Vec<_>>();
    for listener in listeners {
        listener();
    }
}

fn attach(listeners: &Listeners, listener: Rc<dyn Fn()>) -> Unsubscribe {
    let id = listeners.borrow_mut().insert(listener);
    let listeners = listeners.clone();
    Box::new(move || {
        listeners.borrow_mut().remove(id);
    })
}

impl Environment for ManualEnvironment {
    fn now(&self) -> Instant {
        self.now.get()
    }

    fn spawn(&self, task: LocalBoxFuture<'static, ()>) {
        self.spawner
            .spawn_local(task)
            .expect("spawner to accept tasks");
    }

    fn on_focus(&self, listener: Rc<dyn Fn()>) -> Unsubscribe {
        attach(&self.focus, listener)
    }

    fn on_online(&self, listener: Rc<dyn Fn()>) -> Unsubscribe {
        attach(&self.online, listener)
    }

    fn set_interval(&self, period: Duration, tick: Rc<dyn Fn()>) -> Unsubscribe {
        let period = period.max(Duration::from_millis(1));
        let id = self.intervals.borrow_mut().insert(Interval {
            period,
            next: self.now.get() + period,
            tick,
        });
        let intervals = self.intervals.clone();
        Box::new(move || {
            intervals.borrow_mut().remove(id);
        })
    }
}

/// Options wired to the given engine and environment.
pub(crate) fn test_options(engine: &StubEngine, env: &Rc<ManualEnvironment>) -> QueryOptions {
    QueryOptions::default()
        .set_engine(Some(Rc::new(engine.clone()) as Rc<dyn QueryEngine>))
        .set_environment(Some(env.clone() as Rc<dyn Environment>))
}
