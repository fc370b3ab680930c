use std::{rc::Rc, time::Duration};

use leptos::{provide_context, use_context};

use crate::{default_environment, Environment, FetchOptions, QueryEngine, QueryError};

const DEFAULT_FOCUS_INTERVAL: Duration = Duration::from_millis(5000);

/// Provides query options to the current scope and its descendants.
///
/// Every [`use_query`](crate::use_query()) below this scope falls back to these options for
/// fields it does not set itself.
///
/// ```
/// use leptos::*;
/// use leptos_unquery::*;
///
/// #[component]
/// pub fn App(engine: std::rc::Rc<dyn QueryEngine>) -> impl IntoView {
///     provide_query_options(
///         QueryOptions::default()
///             .set_engine(Some(engine))
///             .set_refetch_on_connect(Some(false)),
///     );
///
///     // Rest of App...
/// }
/// ```
pub fn provide_query_options(options: QueryOptions) {
    provide_context(options);
}

/// Reads the query options provided by an ancestor scope, or `default` if there are none.
pub fn inject_query_options(default: Option<QueryOptions>) -> Option<QueryOptions> {
    use_context::<QueryOptions>().or(default)
}

/**
 * Options for a query binding [`use_query()`](crate::use_query()).
 *
 * Unset fields fall back to the provided context options, then to builtin defaults.
 */
#[derive(Clone, Default)]
pub struct QueryOptions {
    /// The engine that caches and fetches keys. There is no builtin default.
    pub engine: Option<Rc<dyn QueryEngine>>,
    /// Host environment. Defaults to [`default_environment`].
    pub environment: Option<Rc<dyn Environment>>,
    /// Refetch the key when the window regains focus, throttled by `focus_interval`.
    /// Default is true.
    pub refetch_on_focus: Option<bool>,
    /// Refetch the key when the network comes back online.
    /// Default is true.
    pub refetch_on_connect: Option<bool>,
    /// Minimum time between two focus refetches.
    /// Default is 5 seconds.
    pub focus_interval: Option<Duration>,
    /// Clear the resource when the key is forgotten from the cache.
    /// Default is false.
    pub clear_on_forget: Option<bool>,
    /// Fetch as soon as the binding is created.
    /// When false, nothing is fetched until `refetch` is called or the key changes.
    /// Only applies to [`use_query()`](crate::use_query()). Default is true.
    pub immediate: Option<bool>,
    /// Options forwarded to the engine on every fetch.
    pub fetch: FetchOptions,
}

impl QueryOptions {
    /// Set the engine.
    pub fn set_engine(self, engine: Option<Rc<dyn QueryEngine>>) -> Self {
        QueryOptions { engine, ..self }
    }

    /// Set the environment.
    pub fn set_environment(self, environment: Option<Rc<dyn Environment>>) -> Self {
        QueryOptions {
            environment,
            ..self
        }
    }

    /// Set refetch on focus.
    pub fn set_refetch_on_focus(self, refetch_on_focus: Option<bool>) -> Self {
        QueryOptions {
            refetch_on_focus,
            ..self
        }
    }

    /// Set refetch on connect.
    pub fn set_refetch_on_connect(self, refetch_on_connect: Option<bool>) -> Self {
        QueryOptions {
            refetch_on_connect,
            ..self
        }
    }

    /// Set the focus interval.
    pub fn set_focus_interval(self, focus_interval: Option<Duration>) -> Self {
        QueryOptions {
            focus_interval,
            ..self
        }
    }

    /// Set clear on forget.
    pub fn set_clear_on_forget(self, clear_on_forget: Option<bool>) -> Self {
        QueryOptions {
            clear_on_forget,
            ..self
        }
    }

    /// Set immediate.
    pub fn set_immediate(self, immediate: Option<bool>) -> Self {
        QueryOptions { immediate, ..self }
    }

    /// Set the engine fetch options.
    pub fn set_fetch_options(self, fetch: FetchOptions) -> Self {
        QueryOptions { fetch, ..self }
    }
}

impl std::fmt::Debug for QueryOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryOptions")
            .field("engine", &self.engine.as_ref().map(|_| "..."))
            .field("environment", &self.environment.as_ref().map(|_| "..."))
            .field("refetch_on_focus", &self.refetch_on_focus)
            .field("refetch_on_connect", &self.refetch_on_connect)
            .field("focus_interval", &self.focus_interval)
            .field("clear_on_forget", &self.clear_on_forget)
            .field("immediate", &self.immediate)
            .field("fetch", &self.fetch)
            .finish()
    }
}

/// Options after merging call site, context and builtin defaults.
#[derive(Clone)]
pub struct ResolvedOptions {
    /// Engine in use.
    pub engine: Rc<dyn QueryEngine>,
    /// Environment in use.
    pub environment: Rc<dyn Environment>,
    /// See [`QueryOptions::refetch_on_focus`].
    pub refetch_on_focus: bool,
    /// See [`QueryOptions::refetch_on_connect`].
    pub refetch_on_connect: bool,
    /// See [`QueryOptions::focus_interval`].
    pub focus_interval: Duration,
    /// See [`QueryOptions::clear_on_forget`].
    pub clear_on_forget: bool,
    /// See [`QueryOptions::immediate`].
    pub immediate: bool,
    fetch: FetchOptions,
}

impl ResolvedOptions {
    /// Merge `call` over `injected` over the builtin defaults.
    ///
    /// Fails with [`QueryError::MissingEngine`] if neither carries an engine.
    pub fn resolve(
        call: &QueryOptions,
        injected: Option<&QueryOptions>,
    ) -> Result<Self, QueryError> {
        let engine = call
            .engine
            .clone()
            .or_else(|| injected.and_then(|i| i.engine.clone()))
            .ok_or(QueryError::MissingEngine)?;

        let environment = call
            .environment
            .clone()
            .or_else(|| injected.and_then(|i| i.environment.clone()))
            .unwrap_or_else(default_environment);

        let field = |get: fn(&QueryOptions) -> Option<bool>, default: bool| {
            get(call)
                .or_else(|| injected.and_then(get))
                .unwrap_or(default)
        };

        let focus_interval = call
            .focus_interval
            .or_else(|| injected.and_then(|i| i.focus_interval))
            .unwrap_or(DEFAULT_FOCUS_INTERVAL);

        let fetch = injected
            .map(|i| i.fetch)
            .unwrap_or_default()
            .merge(&call.fetch);

        Ok(ResolvedOptions {
            engine,
            environment,
            refetch_on_focus: field(|o| o.refetch_on_focus, true),
            refetch_on_connect: field(|o| o.refetch_on_connect, true),
            focus_interval,
            clear_on_forget: field(|o| o.clear_on_forget, false),
            immediate: field(|o| o.immediate, true),
            fetch,
        })
    }

    /// Fetch options for a single engine call.
    /// `stale` is the base, then context and call site options, then `overrides`.
    pub fn fetch_options(&self, stale: bool, overrides: Option<&FetchOptions>) -> FetchOptions {
        let options = FetchOptions::default()
            .set_stale(Some(stale))
            .merge(&self.fetch);
        match overrides {
            Some(overrides) => options.merge(overrides),
            None => options,
        }
    }
}

impl std::fmt::Debug for ResolvedOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedOptions")
            .field("refetch_on_focus", &self.refetch_on_focus)
            .field("refetch_on_connect", &self.refetch_on_connect)
            .field("focus_interval", &self.focus_interval)
            .field("clear_on_forget", &self.clear_on_forget)
            .field("immediate", &self.immediate)
            .field("fetch", &self.fetch)
            .finish_non_exhaustive()
    }
}
