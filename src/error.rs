//! Unified error type.

use crate::correlation::TEST_ID_HEADER;

/// The error type returned by webtest's fallible operations.
///
/// Application-level outcomes (404, 422, etc.) are expressed as HTTP
/// [`Response`](crate::Response) values, not as `Error`s. This type surfaces
/// harness failures: binding the listener, talking to it, and correlating a
/// request with its registered context.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Binding or accepting on the test listener failed.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// The HTTP client could not complete the exchange (connection refused,
    /// reset, timeout). Passed through untouched.
    #[error("transport: {0}")]
    Transport(#[from] hyper_util::client::legacy::Error),

    /// Reading a response body failed after the head arrived.
    #[error("body: {0}")]
    Body(#[from] hyper::Error),

    /// The method/target pair does not form a valid request.
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] http::Error),

    /// The server task panicked or was cancelled before shutting down.
    #[error("server task: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("request carries no `{}` header", TEST_ID_HEADER)]
    MissingTestId,

    #[error("no context registered for test id `{id}`")]
    UnregisteredContext { id: String },
}
