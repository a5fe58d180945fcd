//! Route handlers and the boxed future every pipeline step returns.
//!
//! Handlers and middleware are erased the same way: a blanket impl over
//! `Fn(..) -> Fut` calls the function, then [`respond`] boxes the future and
//! converts its output. The router stores `Arc<dyn Handler>`, the chain stores
//! `Arc<dyn Middleware>`, and [`Next::run`](crate::middleware::Next::run)
//! ends in a single `handler.call(req)`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::request::Request;
use crate::response::{IntoResponse, Response};

// ── Boxed future ──────────────────────────────────────────────────────────────

/// What every handler and middleware call resolves to.
///
/// `Send + 'static` because each test connection runs on its own task.
pub type BoxFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

/// Boxes `fut` and maps its output through [`IntoResponse`].
pub(crate) fn respond<Fut, R>(fut: Fut) -> BoxFuture
where
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    Box::pin(async move { fut.await.into_response() })
}

// ── Handler ───────────────────────────────────────────────────────────────────

/// The final step of a request: produces the response for a matched route.
///
/// Any `async fn(Request) -> impl IntoResponse` is a handler, and so is a
/// closure returning such a future. Implement it by hand for handlers that
/// carry their own state.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, req: Request) -> BoxFuture;
}

pub(crate) type BoxedHandler = Arc<dyn Handler>;

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture {
        respond((self)(req))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bytes::Bytes;
    use http::StatusCode;

    use super::*;

    /// Counts calls across every request it serves.
    struct Hits(AtomicUsize);

    impl Handler for Hits {
        fn call(&self, _req: Request) -> BoxFuture {
            let n = self.0.fetch_add(1, Ordering::SeqCst) + 1;
            respond(async move { n.to_string() })
        }
    }

    fn request() -> Request {
        http::Request::get("/").body(Bytes::new()).unwrap().into()
    }

    #[tokio::test]
    async fn async_fn_output_goes_through_into_response() {
        async fn teapot(_req: Request) -> StatusCode {
            StatusCode::IM_A_TEAPOT
        }

        let handler: BoxedHandler = Arc::new(teapot);
        let res = handler.call(request()).await;
        assert_eq!(res.status_code(), StatusCode::IM_A_TEAPOT);
    }

    #[tokio::test]
    async fn hand_written_handler_keeps_its_state() {
        let handler: BoxedHandler = Arc::new(Hits(AtomicUsize::new(0)));
        handler.call(request()).await;
        let res = handler.call(request()).await;
        assert_eq!(res.body(), b"2");
    }
}
