/// Failures surfaced by a query binding.
///
/// Every variant is scoped to a single binding instance. None of them are retried here,
/// retry policy belongs to the engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    /// The engine failed to fetch the key.
    #[error("query for `{key}` failed: {message}")]
    Fetch {
        /// Key that was being fetched.
        key: String,
        /// Engine supplied description.
        message: String,
    },

    /// The in-flight request for the key was aborted.
    #[error("query for `{key}` was aborted")]
    Aborted {
        /// Key whose request was aborted.
        key: String,
        /// Reason handed to [`abort`](crate::QueryActions::abort), if any.
        reason: Option<String>,
    },

    /// The engine holds a value of a different type than the binding expects.
    #[error("value for `{key}` is not a `{expected}`")]
    TypeMismatch {
        /// Key holding the value.
        key: String,
        /// Type name the binding asked for.
        expected: &'static str,
    },

    /// Neither the call site nor the provided context carry an engine.
    #[error("no query engine was configured, provide one with `provide_query_options` or `QueryOptions::set_engine`")]
    MissingEngine,
}

impl QueryError {
    /// Convenience constructor for engine fetch failures.
    pub fn fetch(key: impl Into<String>, message: impl std::fmt::Display) -> Self {
        QueryError::Fetch {
            key: key.into(),
            message: message.to_string(),
        }
    }
}
