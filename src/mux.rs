//! The request pipeline: ordered middleware in front of a router.

use std::sync::Arc;

use crate::middleware::{BoxedMiddleware, Middleware, Next};
use crate::request::Request;
use crate::response::Response;
use crate::router::{RouteRegister, Router};

/// Middleware chain plus the router it ends in.
///
/// Middleware runs in the order it was added; the router runs last.
///
/// ```rust,no_run
/// use webtest::{Mux, Request, Response, Router};
/// use webtest::middleware::Next;
///
/// async fn audit(req: Request, next: Next) -> Response { next.run(req).await }
/// async fn list_teams(_req: Request) -> &'static str { "[]" }
///
/// let mux = Mux::new()
///     .use_middleware(audit)
///     .routes(|router: Router| router.get("/api/teams", list_teams));
/// ```
#[derive(Default)]
pub struct Mux {
    middleware: Vec<BoxedMiddleware>,
    router: Router,
}

impl Mux {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a middleware to the chain.
    pub fn use_middleware(mut self, middleware: impl Middleware) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Lets `register` add its routes to the router.
    pub fn routes(mut self, register: impl RouteRegister) -> Self {
        self.router = register.register(std::mem::take(&mut self.router));
        self
    }

    pub(crate) fn into_pipeline(self) -> Pipeline {
        Pipeline {
            chain: Arc::from(self.middleware),
            router: Arc::new(self.router),
        }
    }
}

/// A frozen [`Mux`], shared by every connection task.
#[derive(Clone)]
pub(crate) struct Pipeline {
    chain: Arc<[BoxedMiddleware]>,
    router: Arc<Router>,
}

impl Pipeline {
    pub(crate) async fn call(&self, req: Request) -> Response {
        Next::start(Arc::clone(&self.chain), Arc::clone(&self.router))
            .run(req)
            .await
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::StatusCode;

    use super::*;

    async fn push_a(mut req: Request, next: Next) -> Response {
        req.extensions_mut().insert(vec!["a"]);
        next.run(req).await
    }

    async fn push_b(mut req: Request, next: Next) -> Response {
        if let Some(seen) = req.extensions_mut().get_mut::<Vec<&'static str>>() {
            seen.push("b");
        }
        next.run(req).await
    }

    async fn deny(_req: Request, _next: Next) -> StatusCode {
        StatusCode::FORBIDDEN
    }

    async fn trail(req: Request) -> String {
        req.extensions()
            .get::<Vec<&'static str>>()
            .map(|seen| seen.join(","))
            .unwrap_or_default()
    }

    fn get(path: &str) -> Request {
        http::Request::get(path).body(Bytes::new()).unwrap().into()
    }

    #[tokio::test]
    async fn middleware_runs_in_registration_order() {
        let pipeline = Mux::new()
            .use_middleware(push_a)
            .use_middleware(push_b)
            .routes(|router: Router| router.get("/", trail))
            .into_pipeline();

        let res = pipeline.call(get("/")).await;
        assert_eq!(res.body(), b"a,b");
    }

    #[tokio::test]
    async fn middleware_can_short_circuit() {
        let pipeline = Mux::new()
            .use_middleware(deny)
            .routes(|router: Router| router.get("/", trail))
            .into_pipeline();

        let res = pipeline.call(get("/")).await;
        assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
    }
}
