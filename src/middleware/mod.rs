//! Middleware layer.
//!
//! Middleware wraps every request before it reaches the router. It is where
//! cross-cutting concerns live: here, allocating the live request context
//! and filling it from the registered test fixture.
//!
//! A middleware receives the request and a [`Next`] handle for the rest of
//! the chain. It either calls [`Next::run`] or returns a response of its own,
//! which short-circuits everything downstream.
//!
//! ```rust,no_run
//! use webtest::{Mux, Request, Response};
//! use webtest::middleware::Next;
//!
//! async fn tag(req: Request, next: Next) -> Response {
//!     tracing::debug!(path = req.path(), "tagged");
//!     next.run(req).await
//! }
//!
//! let mux = Mux::new().use_middleware(tag);
//! ```

use std::future::Future;
use std::sync::Arc;

use crate::handler::{BoxFuture, respond};
use crate::request::Request;
use crate::response::{IntoResponse, Response};
use crate::router::Router;

mod init;

pub(crate) use init::InitContext;

/// One step of the request pipeline.
///
/// Implemented for every `async fn(Request, Next) -> impl IntoResponse` and
/// for the built-in middleware types.
pub trait Middleware: Send + Sync + 'static {
    fn handle(&self, req: Request, next: Next) -> BoxFuture;
}

pub(crate) type BoxedMiddleware = Arc<dyn Middleware>;

impl<F, Fut, R> Middleware for F
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn handle(&self, req: Request, next: Next) -> BoxFuture {
        respond((self)(req, next))
    }
}

/// The remainder of the pipeline after the current middleware.
pub struct Next {
    chain: Arc<[BoxedMiddleware]>,
    router: Arc<Router>,
    index: usize,
}

impl Next {
    pub(crate) fn start(chain: Arc<[BoxedMiddleware]>, router: Arc<Router>) -> Self {
        Self { chain, router, index: 0 }
    }

    /// Runs the next middleware, or the router once the chain is exhausted.
    pub async fn run(self, req: Request) -> Response {
        match self.chain.get(self.index).cloned() {
            Some(middleware) => {
                let next = Self { index: self.index + 1, ..self };
                middleware.handle(req, next).await
            }
            None => self.router.dispatch(req).await,
        }
    }
}
