#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! # About
//!
//! Leptos bindings for an external, key based query engine.
//!
//! The engine owns caching, de-duplication, staleness, eviction and cancellation.
//! This crate turns a reactive key into a resource signal that follows the engine's state, and
//! into actions that target whatever key is currently active.
//!
//! A binding provides:
//! - automatic re-subscription whenever the key changes
//! - refetch on window focus (throttled) and on reconnect
//! - local mutations, eviction and cancellation for the active key
//! - reactive staleness and focus availability timers
//! - cleanup when the owning scope is disposed
//!
//! ## The main entry points are:
//! - [`use_query`](crate::use_query()) - Non blocking binding. The resource fills in once the first fetch settles.
//! - [`use_async_query`](crate::use_async_query()) - Awaits the first fetch before handing out the resource.
//!
//! # Feature Flags
//! - `csr` Client-side rendering: Bind to the browser window and timers.
//! - `hydrate` Hydration: Same as `csr`, for hydrated apps.
//!
//! Without either feature the default [`Environment`] is headless: no window events and no timers.
//!
//! # A Simple Example
//!
//! In the root of your App, provide the engine with [`provide_query_options`].
//!
//! ```rust
//! use leptos::*;
//! use leptos_unquery::*;
//! use std::rc::Rc;
//!
//! #[component]
//! pub fn App(engine: Rc<dyn QueryEngine>) -> impl IntoView {
//!     // Every binding below falls back to these options.
//!     provide_query_options(QueryOptions::default().set_engine(Some(engine)));
//!
//!     // Rest of App...
//! }
//! ```
//!
//! Then bind a key in any component.
//!
//! ```rust
//! use leptos::*;
//! use leptos_unquery::*;
//!
//! #[component]
//! fn TrackView(id: Signal<u32>) -> impl IntoView {
//!     let (track, actions) = use_query::<_, String>(
//!         move || format!("track:{}", id.get()),
//!         QueryOptions::default(),
//!     );
//!     let (is_stale, _) = actions.create_stale(std::time::Duration::from_secs(1));
//!
//!     view! {
//!         <h2>{move || track.get()}</h2>
//!         <Show when=move || is_stale.get()>
//!             <span>"Outdated"</span>
//!         </Show>
//!     }
//! }
//! ```
//!

mod binding;
mod derived_timers;
mod environment;
mod instant;
mod query_engine;
mod query_error;
mod query_key;
mod query_options;
mod query_result;
mod subscription;
#[cfg(all(test, not(any(feature = "csr", feature = "hydrate"))))]
mod testing;
mod use_query;
mod util;

pub use environment::*;
pub use instant::*;
pub use query_engine::*;
pub use query_error::*;
pub use query_key::*;
pub use query_options::*;
pub use query_result::*;
pub use use_query::*;

/// Convenience trait for query value requirements.
pub trait QueryValue: Clone + 'static {}
impl<V> QueryValue for V where V: Clone + 'static {}
