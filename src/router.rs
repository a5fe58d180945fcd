//! Radix-tree request router.
//!
//! One [`matchit`] tree per HTTP method, so a lookup costs O(path-length).
//! The router is the last stop of a [`Mux`](crate::Mux) pipeline: middleware
//! runs first, then the matching handler.
//!
//! Lookup distinguishes three outcomes:
//!
//! | Outcome | Response |
//! |---|---|
//! | path and method match | the handler's response |
//! | path matches under another method | `405 Method Not Allowed` |
//! | nothing matches | `404 Not Found` |
//!
//! Path parameters use `{name}` syntax and are read back with
//! [`Request::param`](crate::Request::param).

use std::collections::HashMap;
use std::sync::Arc;

use http::{Method, StatusCode};
use matchit::Router as MatchitRouter;

use crate::handler::{BoxedHandler, Handler};
use crate::request::Request;
use crate::response::Response;

// ── Router ────────────────────────────────────────────────────────────────────

/// The application router.
///
/// Each registration returns `self` so calls chain naturally:
///
/// ```rust,no_run
/// # use webtest::{Method, Request, Response, Router};
/// # async fn get_user(_: Request) -> Response { Response::text("") }
/// # async fn create_user(_: Request) -> Response { Response::text("") }
/// # async fn delete_user(_: Request) -> Response { Response::text("") }
/// Router::new()
///     .on(Method::DELETE, "/users/{id}", delete_user)
///     .get("/users/{id}", get_user)
///     .post("/users", create_user);
/// ```
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
}

pub(crate) enum Lookup {
    Found(BoxedHandler, HashMap<String, String>),
    MethodNotAllowed,
    NotFound,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: HashMap::new() }
    }

    /// Register a handler for a method + path pair.
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid route pattern or conflicts with one
    /// already registered for `method`.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, Arc::new(handler))
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::GET, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::POST, path, handler)
    }

    pub fn put(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::PUT, path, handler)
    }

    pub fn patch(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::PATCH, path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::DELETE, path, handler)
    }

    // ── Dispatch ──────────────────────────────────────────────────────────────

    pub(crate) fn lookup(&self, method: &Method, path: &str) -> Lookup {
        if let Some(matched) = self.routes.get(method).and_then(|tree| tree.at(path).ok()) {
            let handler = Arc::clone(matched.value);
            let params = matched.params.iter()
                .map(|(k, v)| (k.to_owned(), v.to_owned()))
                .collect();
            return Lookup::Found(handler, params);
        }

        if self.routes.values().any(|tree| tree.at(path).is_ok()) {
            Lookup::MethodNotAllowed
        } else {
            Lookup::NotFound
        }
    }

    /// Routes one request to its handler.
    pub(crate) async fn dispatch(&self, mut req: Request) -> Response {
        match self.lookup(req.method(), req.path()) {
            Lookup::Found(handler, params) => {
                req.set_params(params);
                handler.call(req).await
            }
            Lookup::MethodNotAllowed => Response::status(StatusCode::METHOD_NOT_ALLOWED),
            Lookup::NotFound => Response::status(StatusCode::NOT_FOUND),
        }
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

// ── Route registration ────────────────────────────────────────────────────────

/// Registers a set of routes onto a [`Router`].
///
/// Implemented for any `FnOnce(Router) -> Router`, so a closure or a plain
/// function is enough:
///
/// ```rust,no_run
/// # use webtest::{Request, Response, Router};
/// # async fn list_teams(_: Request) -> Response { Response::text("") }
/// fn team_routes(router: Router) -> Router {
///     router.get("/api/teams", list_teams)
/// }
/// ```
pub trait RouteRegister {
    fn register(self, router: Router) -> Router;
}

impl<F> RouteRegister for F
where
    F: FnOnce(Router) -> Router,
{
    fn register(self, router: Router) -> Router {
        self(router)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    async fn show_user(req: Request) -> String {
        format!("user {}", req.param("id").unwrap_or("?"))
    }

    fn request(method: Method, path: &str) -> Request {
        http::Request::builder()
            .method(method)
            .uri(path)
            .body(Bytes::new())
            .unwrap()
            .into()
    }

    #[tokio::test]
    async fn dispatch_extracts_path_params() {
        let router = Router::new().get("/users/{id}", show_user);
        let res = router.dispatch(request(Method::GET, "/users/7")).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.body(), b"user 7");
    }

    #[tokio::test]
    async fn known_path_with_other_method_is_405() {
        let router = Router::new().get("/users/{id}", show_user);
        let res = router.dispatch(request(Method::POST, "/users/7")).await;
        assert_eq!(res.status_code(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn unknown_path_is_404() {
        let router = Router::new().get("/users/{id}", show_user);
        let res = router.dispatch(request(Method::GET, "/teams")).await;
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    #[should_panic(expected = "invalid route")]
    fn conflicting_route_panics() {
        let _ = Router::new()
            .get("/users/{id}", show_user)
            .get("/users/{name}", show_user);
    }
}
