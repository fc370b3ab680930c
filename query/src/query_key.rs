/// Output of a key closure handed to [`use_query`](crate::use_query()).
///
/// `None` or `Err(_)` mean the binding is inactive: no subscriptions, and every action is a no-op.
pub trait IntoQueryKey {
    /// Resolve into an active key, or `None` when inactive.
    fn into_query_key(self) -> Option<String>;
}

impl IntoQueryKey for String {
    fn into_query_key(self) -> Option<String> {
        Some(self)
    }
}

impl IntoQueryKey for &'static str {
    fn into_query_key(self) -> Option<String> {
        Some(self.to_string())
    }
}

impl<K> IntoQueryKey for Option<K>
where
    K: IntoQueryKey,
{
    fn into_query_key(self) -> Option<String> {
        self.and_then(IntoQueryKey::into_query_key)
    }
}

// A failing key is inactive, the error never leaves the binding.
impl<K, E> IntoQueryKey for Result<K, E>
where
    K: IntoQueryKey,
{
    fn into_query_key(self) -> Option<String> {
        self.ok().and_then(IntoQueryKey::into_query_key)
    }
}
