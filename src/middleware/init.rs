//! Entry middleware: allocates the live request context.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{Instrument, info_span};

use crate::context::ReqContext;
use crate::correlation::TEST_ID_HEADER;
use crate::handler::BoxFuture;
use crate::middleware::{Middleware, Next};
use crate::request::Request;

/// Seeds each request with a fresh copy of the server's default context and
/// opens the request span that becomes its logger.
pub(crate) struct InitContext {
    defaults: Arc<RwLock<ReqContext>>,
    logger_name: Arc<str>,
}

impl InitContext {
    pub(crate) fn new(defaults: Arc<RwLock<ReqContext>>, logger_name: &str) -> Self {
        Self { defaults, logger_name: Arc::from(logger_name) }
    }
}

impl Middleware for InitContext {
    fn handle(&self, mut req: Request, next: Next) -> BoxFuture {
        let span = info_span!(
            "request",
            logger = %self.logger_name,
            method = %req.method(),
            path = req.path(),
            test_id = req.header(TEST_ID_HEADER).unwrap_or_default(),
        );

        let mut ctx = self.defaults.read().clone();
        ctx.logger = span.clone();
        req.extensions_mut().insert(ctx);

        Box::pin(next.run(req).instrument(span))
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::StatusCode;

    use super::*;
    use crate::middleware::BoxedMiddleware;
    use crate::router::Router;

    async fn nonce(req: Request) -> String {
        ReqContext::from_request(&req)
            .map(|ctx| ctx.request_nonce.clone())
            .unwrap_or_else(|| "missing".to_owned())
    }

    #[tokio::test]
    async fn every_request_gets_a_copy_of_the_defaults() {
        let defaults = Arc::new(RwLock::new(ReqContext {
            request_nonce: "seed".into(),
            ..ReqContext::default()
        }));
        let init: BoxedMiddleware = Arc::new(InitContext::new(defaults.clone(), "unit"));
        let chain: Arc<[BoxedMiddleware]> = Arc::from(vec![init]);
        let router = Arc::new(Router::new().get("/", nonce));

        let req: Request = http::Request::get("/").body(Bytes::new()).unwrap().into();
        let res = Next::start(chain.clone(), router.clone()).run(req).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.body(), b"seed");

        defaults.write().request_nonce = "changed".into();
        let req: Request = http::Request::get("/").body(Bytes::new()).unwrap().into();
        let res = Next::start(chain, router).run(req).await;
        assert_eq!(res.body(), b"changed");
    }
}
