//! # webtest
//!
//! End-to-end testing for HTTP route handlers without the production server.
//!
//! A [`TestServer`] binds a real listener on an ephemeral port and serves your
//! routes through the same pipeline shape a live deployment uses: an entry
//! middleware that allocates the per-request [`ReqContext`], then your
//! handlers. What the test server adds is a way to say *who* is calling.
//!
//! ## Simulated identities
//!
//! Every request built with [`TestServer::new_request`] carries a fresh UUID
//! in the [`TEST_ID_HEADER`] header. Register a context under that id and the
//! server copies it onto the live context before your handler runs:
//!
//! ```rust,no_run
//! use webtest::{Method, ReqContext, Request, Router, SignedInUser, StatusCode, TestServer};
//!
//! async fn delete_team(req: Request) -> StatusCode {
//!     match ReqContext::from_request(&req) {
//!         Some(ctx) if ctx.is_signed_in => StatusCode::NO_CONTENT,
//!         _ => StatusCode::UNAUTHORIZED,
//!     }
//! }
//!
//! async fn signed_in_users_can_delete_teams() {
//!     let server = TestServer::start(|router: Router| {
//!         router.delete("/api/teams/{id}", delete_team)
//!     })
//!     .await
//!     .unwrap();
//!
//!     let req = server.new_request(Method::DELETE, "api/teams/1", "").unwrap();
//!     let req = server
//!         .request_with_context(req, ReqContext {
//!             is_signed_in: true,
//!             signed_in_user: Some(SignedInUser { login: "admin".into(), ..Default::default() }),
//!             ..Default::default()
//!         })
//!         .unwrap();
//!
//!     let res = server.send(req).await.unwrap();
//!     assert_eq!(res.status(), StatusCode::NO_CONTENT);
//! }
//! ```
//!
//! A request whose id has no registered context is answered with
//! `500 Internal Server Error` before any route runs, unless
//! [`Config::strict_registration`] is turned off.
//!
//! ## Building blocks
//!
//! - [`Router`] — radix-tree routing per method via [`matchit`]
//! - [`Mux`] and [`middleware`] — ordered middleware in front of the router
//! - [`Server`] — tokio listener, hyper connections, shutdown on demand
//! - [`ContextInjector`] — where registered contexts live; [`InMemoryRegistry`]
//!   by default, one per test server

mod config;
mod context;
mod correlation;
mod error;
mod handler;
mod mux;
mod request;
mod response;
mod router;
mod server;
mod test_server;

pub mod middleware;

pub use config::Config;
pub use context::{LookupTokenError, OrgRole, PerfmonTimer, ReqContext, SignedInUser, UserToken};
pub use correlation::{
    ContextInjector, InMemoryRegistry, TEST_ID_HEADER, generate_request_id, request_id,
};
pub use error::Error;
pub use handler::{BoxFuture, Handler};
pub use http::{Method, StatusCode};
pub use mux::Mux;
pub use request::Request;
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use router::{RouteRegister, Router};
pub use server::Server;
pub use test_server::TestServer;
