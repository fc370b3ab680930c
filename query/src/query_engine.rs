use std::{any::Any, rc::Rc, time::Duration};

use async_trait::async_trait;

use crate::{Instant, QueryError};

/// A type-erased cache value, as stored by the engine.
pub type AnyValue = Rc<dyn Any>;

/// Detaches a previously attached listener. Calling it more than once is not possible.
pub type Unsubscribe = Box<dyn FnOnce()>;

/// Listener attached to a single key and event kind.
pub type EventListener = Rc<dyn Fn(&EngineEvent)>;

/// Returns an [`Unsubscribe`] that does nothing.
pub fn noop_unsubscribe() -> Unsubscribe {
    Box::new(|| ())
}

/// The external query engine a binding talks to.
///
/// The engine owns caching, deduplication, staleness, eviction and cancellation.
/// Bindings only forward calls and listen to the events the engine emits for a key.
#[async_trait(?Send)]
pub trait QueryEngine {
    /// Fetch the value for a key.
    /// With `options.stale == Some(true)` a cached value may be returned without re-requesting.
    async fn query(&self, key: &str, options: FetchOptions) -> Result<AnyValue, QueryError>;

    /// Locally mutate the cached value. Other observers of the key are notified synchronously.
    fn mutate(&self, key: &str, mutation: Mutation);

    /// Evict the key from the cache.
    fn forget(&self, key: &str);

    /// Cancel the key's in-flight request, if any.
    fn abort(&self, key: &str, reason: Option<String>);

    /// Listen to one kind of event for a key.
    fn subscribe(&self, key: &str, event: EventKind, listener: EventListener) -> Unsubscribe;

    /// When the cached value for the key expires. None if the key is not cached.
    fn expiration(&self, key: &str) -> Option<Instant>;
}

/// Kinds of events an engine emits per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// The value was changed locally.
    Mutated,
    /// A fetch started while a value is already cached.
    Refetching,
    /// A fetch resolved with a new value.
    Resolved,
    /// A fetch failed.
    Error,
    /// The key was evicted.
    Forgotten,
}

impl EventKind {
    /// Every event kind, in subscription order.
    pub const ALL: [EventKind; 5] = [
        EventKind::Mutated,
        EventKind::Refetching,
        EventKind::Resolved,
        EventKind::Error,
        EventKind::Forgotten,
    ];
}

/// Payload delivered to an [`EventListener`].
#[derive(Clone)]
pub enum EngineEvent {
    /// See [`EventKind::Mutated`].
    Mutated(AnyValue),
    /// See [`EventKind::Refetching`].
    Refetching,
    /// See [`EventKind::Resolved`].
    Resolved(AnyValue),
    /// See [`EventKind::Error`].
    Error(QueryError),
    /// See [`EventKind::Forgotten`].
    Forgotten,
}

impl EngineEvent {
    /// The kind of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            EngineEvent::Mutated(_) => EventKind::Mutated,
            EngineEvent::Refetching => EventKind::Refetching,
            EngineEvent::Resolved(_) => EventKind::Resolved,
            EngineEvent::Error(_) => EventKind::Error,
            EngineEvent::Forgotten => EventKind::Forgotten,
        }
    }
}

impl std::fmt::Debug for EngineEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error(error) => f.debug_tuple("Error").field(error).finish(),
            other => write!(f, "{:?}", other.kind()),
        }
    }
}

/// A local mutation handed to [`QueryEngine::mutate`].
pub enum Mutation {
    /// Replace the cached value.
    Value(AnyValue),
    /// Compute the new value from the cached one, if any.
    Update(Box<dyn FnOnce(Option<AnyValue>) -> AnyValue>),
}

impl Mutation {
    /// Resolve the mutation against the currently cached value.
    pub fn apply(self, current: Option<AnyValue>) -> AnyValue {
        match self {
            Mutation::Value(value) => value,
            Mutation::Update(updater) => updater(current),
        }
    }
}

impl std::fmt::Debug for Mutation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mutation::Value(_) => write!(f, "Value(..)"),
            Mutation::Update(_) => write!(f, "Update(..)"),
        }
    }
}

/// Options forwarded to [`QueryEngine::query`].
///
/// Every field is optional so that call site options can be layered over provided ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Whether a cached, unexpired value may be returned without re-requesting.
    pub stale: Option<bool>,
    /// How long the engine should keep a resolved value fresh.
    pub expiration: Option<Duration>,
    /// Force the engine to ignore any pending deduplicated request.
    pub fresh: Option<bool>,
    /// Evict the key when the fetch fails.
    pub remove_on_error: Option<bool>,
}

impl FetchOptions {
    /// Set stale.
    pub fn set_stale(self, stale: Option<bool>) -> Self {
        FetchOptions { stale, ..self }
    }

    /// Set expiration.
    pub fn set_expiration(self, expiration: Option<Duration>) -> Self {
        FetchOptions { expiration, ..self }
    }

    /// Set fresh.
    pub fn set_fresh(self, fresh: Option<bool>) -> Self {
        FetchOptions { fresh, ..self }
    }

    /// Set remove on error.
    pub fn set_remove_on_error(self, remove_on_error: Option<bool>) -> Self {
        FetchOptions {
            remove_on_error,
            ..self
        }
    }

    /// Layer `overrides` on top of `self`. Fields set in `overrides` win.
    pub fn merge(self, overrides: &FetchOptions) -> Self {
        FetchOptions {
            stale: overrides.stale.or(self.stale),
            expiration: overrides.expiration.or(self.expiration),
            fresh: overrides.fresh.or(self.fresh),
            remove_on_error: overrides.remove_on_error.or(self.remove_on_error),
        }
    }

    /// Whether the engine may answer from cache. Defaults to true.
    pub fn is_stale_tolerant(&self) -> bool {
        self.stale.unwrap_or(true)
    }
}
