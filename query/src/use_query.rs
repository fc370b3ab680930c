use std::{future::Future, rc::Rc};

use leptos::*;

use crate::{
    binding::Binding, inject_query_options, IntoQueryKey, QueryActions, QueryError, QueryOptions,
    QueryResource, QueryValue, ResolvedOptions,
};

/// Binds a reactive key to a query engine. Never blocks.
///
/// The key closure is tracked: whenever it produces a different key, listeners for the previous
/// key are detached, listeners for the new key are attached and a stale tolerant fetch primes the
/// resource. A closure producing `None` or `Err(_)` leaves the binding inactive.
///
/// Options set here win over options provided with [`provide_query_options`](crate::provide_query_options).
///
/// # Panics
///
/// If no engine is set on `options` or provided by an ancestor scope.
///
/// Example
/// ```
/// use leptos::*;
/// use leptos_unquery::*;
///
/// #[derive(Debug, Clone, PartialEq)]
/// struct User {
///     name: String,
/// }
///
/// #[component]
/// fn UserName(id: Signal<Option<u32>>) -> impl IntoView {
///     let (user, actions) = use_query::<_, User>(
///         move || id.get().map(|id| format!("user:{id}")),
///         QueryOptions::default().set_refetch_on_focus(Some(false)),
///     );
///
///     view! {
///         <h2>{move || user.get().map(|user| user.name)}</h2>
///         <button on:click=move |_| actions.forget()>"Forget"</button>
///     }
/// }
/// ```
pub fn use_query<K, V>(key: impl Fn() -> K + 'static, options: QueryOptions) -> QueryResource<V>
where
    K: IntoQueryKey,
    V: QueryValue,
{
    let options = ResolvedOptions::resolve(&options, inject_query_options(None).as_ref())
        .expect("Query engine missing. Use `provide_query_options` or `QueryOptions::set_engine`.");

    let immediate = options.immediate;
    let binding = Binding::new(key, options);
    binding.watch(immediate);
    binding.dispose_on_cleanup();

    into_resource(binding)
}

/// Like [`use_query`], but the initial fetch is awaited before the resource is handed out.
///
/// The binding is created synchronously, under the current owner. Awaiting yields the populated
/// resource, or the initial fetch failure. Errors reported later by the engine are logged and
/// available through [`QueryActions::error`] and [`QueryActions::resource_result`].
///
/// Fails with [`QueryError::MissingEngine`] instead of panicking when no engine is configured.
pub fn use_async_query<K, V>(
    key: impl Fn() -> K + 'static,
    options: QueryOptions,
) -> impl Future<Output = Result<QueryResource<V>, QueryError>>
where
    K: IntoQueryKey,
    V: QueryValue,
{
    let binding = ResolvedOptions::resolve(&options, inject_query_options(None).as_ref()).map(
        |options| {
            let binding = Binding::new(key, options);
            // The initial fetch is awaited below.
            binding.watch(false);
            binding.dispose_on_cleanup();
            log_errors(&binding);
            binding
        },
    );

    async move {
        let binding = binding?;

        if let Some(key) = binding.current_key() {
            let generation = binding.generation();
            match binding.fetch_stale(key).await {
                Ok(value) => {
                    if binding.generation() == generation {
                        binding.resource.set(Some(value));
                    }
                }
                Err(error) => {
                    binding.dispose();
                    return Err(error);
                }
            }
        }

        Ok(into_resource(binding))
    }
}

fn log_errors<V>(binding: &Binding<V>)
where
    V: QueryValue,
{
    let error = binding.error;
    create_isomorphic_effect(move |_| {
        if let Some(error) = error.get() {
            logging::error!("{error}");
        }
    });
}

fn into_resource<V>(binding: Rc<Binding<V>>) -> QueryResource<V>
where
    V: QueryValue,
{
    (
        binding.resource.read_only().into(),
        QueryActions::new(binding),
    )
}
