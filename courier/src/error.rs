use crate::validate::ValidationFailure;

/// Error type for dispatching.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// No handler is bound for the dispatched request type.
    #[error("no handler bound for request type `{request_type}`")]
    Unbound {
        /// Name of the request type that could not be resolved.
        request_type: &'static str,
    },

    /// A handler is already bound for the request type being registered.
    #[error("a handler is already bound for request type `{request_type}`")]
    DuplicateBinding {
        /// Name of the request type registered twice.
        request_type: &'static str,
    },

    /// One or more validation rules rejected the request.
    #[error(transparent)]
    Validation(#[from] ValidationFailure),

    /// The dispatch was aborted by its cancellation token.
    #[error("dispatch cancelled")]
    Cancelled,
}
