//! Request/context correlation.
//!
//! A test builds a request, stamps it with a fresh test id header, and
//! registers a [`ReqContext`] under that id. When the request reaches the
//! server, the [`Correlator`] middleware resolves the id and copies the
//! registered identity onto the live context before any route handler runs.
//!
//! ```text
//! new_request ──► x-grafana-web-test-id: <uuid>
//! request_with_context ──► injector.register(<uuid>, ctx)
//! send ──► InitContext ──► Correlator: injector.resolve(<uuid>) ──► handler
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use http::{HeaderMap, StatusCode};
use parking_lot::Mutex;
use tracing::{debug, error};
use uuid::Uuid;

use crate::context::ReqContext;
use crate::error::Error;
use crate::handler::BoxFuture;
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::IntoResponse;

/// Header carrying the test id. Header names are case-insensitive, so this
/// matches `X-GRAFANA-WEB-TEST-ID` on the wire.
pub const TEST_ID_HEADER: &str = "x-grafana-web-test-id";

/// A new random (v4) UUID in hyphenated form.
pub fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// The test id stamped on `req`, if present and non-empty.
pub fn request_id<B>(req: &http::Request<B>) -> Option<&str> {
    test_id(req.headers())
}

fn test_id(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(TEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|id| !id.is_empty())
}

/// Store of contexts keyed by test id.
///
/// Registration happens on the test's side before the request is sent;
/// resolution happens on a server worker while the request is handled.
pub trait ContextInjector: Send + Sync + 'static {
    /// Stores `ctx` under `id`, replacing any earlier registration.
    fn register(&self, id: &str, ctx: ReqContext);

    /// The context registered under `id`.
    fn resolve(&self, id: &str) -> Option<ReqContext>;
}

/// [`ContextInjector`] backed by a mutex-guarded map.
///
/// Entries live as long as the registry; nothing is evicted.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    entries: Mutex<HashMap<String, ReqContext>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl ContextInjector for InMemoryRegistry {
    fn register(&self, id: &str, ctx: ReqContext) {
        if self.entries.lock().insert(id.to_owned(), ctx).is_some() {
            debug!(test_id = id, "context registration replaced");
        }
    }

    fn resolve(&self, id: &str) -> Option<ReqContext> {
        self.entries.lock().get(id).cloned()
    }
}

/// Middleware that fills the live context from the injector.
pub(crate) struct Correlator {
    injector: Arc<dyn ContextInjector>,
    strict: bool,
}

impl Correlator {
    pub(crate) fn new(injector: Arc<dyn ContextInjector>, strict: bool) -> Self {
        Self { injector, strict }
    }

    fn lookup(&self, req: &Request) -> Result<ReqContext, Error> {
        let id = test_id(req.headers()).ok_or(Error::MissingTestId)?;
        self.injector
            .resolve(id)
            .ok_or_else(|| Error::UnregisteredContext { id: id.to_owned() })
    }
}

impl Middleware for Correlator {
    fn handle(&self, mut req: Request, next: Next) -> BoxFuture {
        match self.lookup(&req) {
            Ok(registered) => {
                debug!("resolved registered context");
                // InitContext always runs first and leaves a live context.
                if let Some(live) = req.extensions_mut().get_mut::<ReqContext>() {
                    live.copy_identity_from(&registered);
                }
            }
            Err(err) if self.strict => {
                error!(%err, "rejecting request without a registered context");
                let res = (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response();
                return Box::pin(async move { res });
            }
            Err(err) => debug!(%err, "no registered context, keeping defaults"),
        }

        Box::pin(next.run(req))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use bytes::Bytes;
    use parking_lot::RwLock;

    use super::*;
    use crate::middleware::{BoxedMiddleware, InitContext};
    use crate::response::Response;
    use crate::router::Router;

    fn with_nonce(nonce: &str) -> ReqContext {
        ReqContext { request_nonce: nonce.into(), ..ReqContext::default() }
    }

    async fn nonce(req: Request) -> String {
        ReqContext::from_request(&req)
            .map(|ctx| ctx.request_nonce.clone())
            .unwrap_or_default()
    }

    /// Runs `req` through the entry step, a strict correlator and `/nonce`.
    async fn correlate(registry: Arc<InMemoryRegistry>, req: http::Request<Bytes>) -> Response {
        let defaults = Arc::new(RwLock::new(ReqContext::default()));
        let chain: Arc<[BoxedMiddleware]> = Arc::from(vec![
            Arc::new(InitContext::new(defaults, "unit")) as BoxedMiddleware,
            Arc::new(Correlator::new(registry, true)) as BoxedMiddleware,
        ]);
        let router = Arc::new(Router::new().get("/nonce", nonce));
        Next::start(chain, router).run(req.into()).await
    }

    #[test]
    fn generated_ids_are_unique_uuids() {
        let ids: HashSet<String> = (0..1000).map(|_| generate_request_id()).collect();
        assert_eq!(ids.len(), 1000);
        assert!(ids.iter().all(|id| Uuid::parse_str(id).is_ok()));
    }

    #[test]
    fn request_id_ignores_empty_header() {
        let req = http::Request::get("/")
            .header(TEST_ID_HEADER, "")
            .body(())
            .unwrap();
        assert_eq!(request_id(&req), None);

        let req = http::Request::get("/")
            .header("X-GRAFANA-WEB-TEST-ID", "abc")
            .body(())
            .unwrap();
        assert_eq!(request_id(&req), Some("abc"));
    }

    #[test]
    fn registry_resolves_only_registered_ids() {
        let registry = InMemoryRegistry::new();
        assert!(registry.is_empty());

        registry.register("a", ReqContext { is_signed_in: true, ..ReqContext::default() });
        assert!(registry.resolve("a").is_some_and(|ctx| ctx.is_signed_in));
        assert!(registry.resolve("b").is_none());
    }

    #[test]
    fn registering_twice_keeps_the_last_context() {
        let registry = InMemoryRegistry::new();
        registry.register("a", with_nonce("first"));
        registry.register("a", with_nonce("second"));

        assert_eq!(registry.len(), 1);
        let nonce = registry.resolve("a").map(|ctx| ctx.request_nonce);
        assert_eq!(nonce.as_deref(), Some("second"));
    }

    #[test]
    fn resolving_does_not_consume_the_entry() {
        let registry = InMemoryRegistry::new();
        registry.register("a", ReqContext::default());
        assert!(registry.resolve("a").is_some());
        assert!(registry.resolve("a").is_some());
    }

    #[tokio::test]
    async fn correlator_copies_the_registered_context() {
        let registry = Arc::new(InMemoryRegistry::new());
        registry.register("id-1", with_nonce("registered"));

        let req = http::Request::get("/nonce")
            .header(TEST_ID_HEADER, "id-1")
            .body(Bytes::new())
            .unwrap();
        let res = correlate(registry, req).await;

        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.body(), b"registered");
    }

    #[tokio::test]
    async fn correlator_treats_an_empty_test_id_as_missing() {
        let registry = Arc::new(InMemoryRegistry::new());
        // Registered under the empty string, but an empty header never matches.
        registry.register("", with_nonce("should not leak"));

        let req = http::Request::get("/nonce")
            .header(TEST_ID_HEADER, "")
            .body(Bytes::new())
            .unwrap();
        let res = correlate(registry, req).await;

        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.body(), Error::MissingTestId.to_string().as_bytes());
    }
}
