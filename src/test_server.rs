//! In-process test server.
//!
//! [`TestServer`] binds a real listener on an ephemeral port, runs the
//! caller's routes behind two middleware steps, and gives the test a client
//! for talking to it:
//!
//! 1. The entry middleware seeds a fresh [`ReqContext`] from the server's default
//!    context and opens the request span.
//! 2. The correlator copies the context registered for the request's test
//!    id onto that live context.
//!
//! The server shuts down on [`TestServer::close`] or when the value is
//! dropped, whether the test passed or panicked.

use std::borrow::Cow;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::Method;
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use parking_lot::RwLock;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::Config;
use crate::context::{ReqContext, SignedInUser};
use crate::correlation::{
    ContextInjector, Correlator, InMemoryRegistry, TEST_ID_HEADER, generate_request_id, request_id,
};
use crate::error::Error;
use crate::middleware::InitContext;
use crate::mux::Mux;
use crate::router::RouteRegister;
use crate::server::Server;

/// A running test server and the client that talks to it.
///
/// ```rust,no_run
/// use webtest::{Method, ReqContext, Request, Router, SignedInUser, TestServer};
///
/// async fn whoami(req: Request) -> String {
///     ReqContext::from_request(&req)
///         .and_then(|ctx| ctx.signed_in_user.as_ref())
///         .map(|user| user.login.clone())
///         .unwrap_or_default()
/// }
///
/// # async fn run() -> Result<(), webtest::Error> {
/// let server = TestServer::start(|router: Router| router.get("/api/user", whoami)).await?;
///
/// let req = server.new_request(Method::GET, "api/user", "")?;
/// let req = server.request_with_signed_in_user(req, SignedInUser {
///     login: "alice".into(),
///     ..SignedInUser::default()
/// })?;
///
/// let res = server.send(req).await?;
/// assert_eq!(res.body().as_ref(), b"alice");
///
/// server.close().await
/// # }
/// ```
pub struct TestServer {
    addr: SocketAddr,
    base_url: String,
    config: Config,
    injector: Arc<dyn ContextInjector>,
    default_context: Arc<RwLock<ReqContext>>,
    client: Client<HttpConnector, Full<Bytes>>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Result<(), Error>>>,
}

impl TestServer {
    /// Starts a server with the default [`Config`] and its own registry.
    pub async fn start(routes: impl RouteRegister) -> Result<Self, Error> {
        Self::start_with(Config::default(), routes).await
    }

    pub async fn start_with(config: Config, routes: impl RouteRegister) -> Result<Self, Error> {
        Self::start_with_injector(config, Arc::new(InMemoryRegistry::new()), routes).await
    }

    /// Starts a server that resolves contexts through `injector`.
    ///
    /// Use this to share one fixture registry between servers or to inspect
    /// registrations from the test.
    pub async fn start_with_injector(
        config: Config,
        injector: Arc<dyn ContextInjector>,
        routes: impl RouteRegister,
    ) -> Result<Self, Error> {
        let server = Server::bind(config.addr).await?;
        let addr = server.local_addr();

        let default_context = Arc::new(RwLock::new(ReqContext::default()));
        let mux = Mux::new()
            .use_middleware(InitContext::new(Arc::clone(&default_context), &config.logger_name))
            .use_middleware(Correlator::new(Arc::clone(&injector), config.strict_registration))
            .routes(routes);

        let (shutdown, signal) = oneshot::channel();
        let task = tokio::spawn(server.serve_with_shutdown(mux, async move {
            // A dropped sender means the same thing as an explicit close.
            let _ = signal.await;
        }));

        // Idle connections are not pooled, so nothing outlives close().
        let client = Client::builder(TokioExecutor::new())
            .pool_max_idle_per_host(0)
            .build_http();

        Ok(Self {
            addr,
            base_url: format!("http://{addr}"),
            config,
            injector,
            default_context,
            client,
            shutdown: Some(shutdown),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr { self.addr }

    /// `http://<ip>:<port>`, without a trailing slash.
    pub fn base_url(&self) -> &str { &self.base_url }

    pub fn config(&self) -> &Config { &self.config }

    pub fn injector(&self) -> &Arc<dyn ContextInjector> { &self.injector }

    /// Replaces the context every request starts from.
    ///
    /// Registered contexts still overwrite all identity fields; the default
    /// only shows through with strict registration turned off.
    pub fn set_default_context(&self, ctx: ReqContext) {
        *self.default_context.write() = ctx;
    }

    /// Builds a request for `target` on this server, stamped with a fresh
    /// test id. A missing leading slash on `target` is added. No I/O happens
    /// until [`send`](TestServer::send).
    pub fn new_request(
        &self,
        method: Method,
        target: &str,
        body: impl Into<Bytes>,
    ) -> Result<http::Request<Full<Bytes>>, Error> {
        let target = if target.starts_with('/') {
            Cow::Borrowed(target)
        } else {
            Cow::Owned(format!("/{target}"))
        };

        let req = http::Request::builder()
            .method(method)
            .uri(format!("{}{target}", self.base_url))
            .header(TEST_ID_HEADER, generate_request_id())
            .body(Full::new(body.into()))?;
        Ok(req)
    }

    /// Registers `ctx` as the context `req` will be handled with.
    ///
    /// Must run before the request is sent. Registering the same request
    /// twice keeps the last context.
    pub fn request_with_context<B>(
        &self,
        req: http::Request<B>,
        ctx: ReqContext,
    ) -> Result<http::Request<B>, Error> {
        let id = request_id(&req).ok_or(Error::MissingTestId)?;
        debug!(test_id = id, "registering request context");
        self.injector.register(id, ctx);
        Ok(req)
    }

    /// Registers a context carrying only `user`.
    pub fn request_with_signed_in_user<B>(
        &self,
        req: http::Request<B>,
        user: SignedInUser,
    ) -> Result<http::Request<B>, Error> {
        self.request_with_context(req, ReqContext::signed_in(user))
    }

    /// Sends `req` and collects the response body.
    ///
    /// Client errors are returned as they are; nothing is retried and no
    /// status code is treated as an error.
    pub async fn send(
        &self,
        req: http::Request<Full<Bytes>>,
    ) -> Result<http::Response<Bytes>, Error> {
        let res = self.client.request(req).await?;
        let (parts, body) = res.into_parts();
        let body = body.collect().await?.to_bytes();
        Ok(http::Response::from_parts(parts, body))
    }

    /// Stops the server and waits until the listener is gone.
    pub async fn close(mut self) -> Result<(), Error> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        match self.task.take() {
            Some(task) => task.await?,
            None => Ok(()),
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
