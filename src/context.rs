//! The request context handed to route handlers.
//!
//! Every request served by a [`TestServer`](crate::TestServer) gets a fresh
//! live [`ReqContext`] in its extensions. Handlers read it with
//! [`ReqContext::from_request`].

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::Span;

use crate::request::Request;

/// Organisation role of a signed-in user.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum OrgRole {
    #[default]
    Viewer,
    Editor,
    Admin,
}

impl OrgRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Viewer => "Viewer",
            Self::Editor => "Editor",
            Self::Admin  => "Admin",
        }
    }
}

impl fmt::Display for OrgRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of the user a request is made on behalf of.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SignedInUser {
    pub user_id: i64,
    pub org_id: i64,
    pub org_name: String,
    pub org_role: OrgRole,
    pub login: String,
    pub name: String,
    pub email: String,
    pub is_server_admin: bool,
}

/// Session token the user authenticated with.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct UserToken {
    pub id: i64,
    pub user_id: i64,
    pub auth_token: String,
    pub prev_auth_token: String,
    pub user_agent: String,
    pub client_ip: String,
    pub rotation_count: u32,
}

/// Cloneable handle to a named duration recorder.
///
/// Clones share their samples, so a handler observing into the live
/// context's timer is visible through the handle the test registered.
#[derive(Clone, Debug)]
pub struct PerfmonTimer {
    name: Arc<str>,
    samples: Arc<Mutex<Vec<Duration>>>,
}

impl PerfmonTimer {
    pub fn new(name: &str) -> Self {
        Self { name: Arc::from(name), samples: Arc::default() }
    }

    pub fn name(&self) -> &str { &self.name }

    pub fn observe(&self, elapsed: Duration) {
        self.samples.lock().push(elapsed);
    }

    pub fn samples(&self) -> Vec<Duration> {
        self.samples.lock().clone()
    }

    /// True when both handles record into the same storage.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.samples, &other.samples)
    }
}

/// Error recorded when resolving the session token failed.
pub type LookupTokenError = Arc<dyn StdError + Send + Sync>;

/// Per-request identity, session and caching state.
#[derive(Clone, Debug)]
pub struct ReqContext {
    pub signed_in_user: Option<SignedInUser>,
    pub user_token: Option<UserToken>,
    pub is_signed_in: bool,
    pub is_render_call: bool,
    pub allow_anonymous: bool,
    pub skip_cache: bool,
    pub request_nonce: String,
    pub perfmon_timer: Option<PerfmonTimer>,
    pub lookup_token_err: Option<LookupTokenError>,
    /// Span opened for this request by the server's entry middleware.
    pub logger: Span,
}

impl Default for ReqContext {
    fn default() -> Self {
        Self {
            signed_in_user: None,
            user_token: None,
            is_signed_in: false,
            is_render_call: false,
            allow_anonymous: false,
            skip_cache: false,
            request_nonce: String::new(),
            perfmon_timer: None,
            lookup_token_err: None,
            logger: Span::none(),
        }
    }
}

impl ReqContext {
    /// A context with only `signed_in_user` set.
    pub fn signed_in(user: SignedInUser) -> Self {
        Self { signed_in_user: Some(user), ..Self::default() }
    }

    /// The live context of a request, if the entry middleware attached one.
    pub fn from_request(req: &Request) -> Option<&Self> {
        req.extensions().get::<Self>()
    }

    /// Overwrites every identity and session field with `other`'s.
    ///
    /// The logger is request-scoped and stays as it is.
    pub fn copy_identity_from(&mut self, other: &Self) {
        self.signed_in_user = other.signed_in_user.clone();
        self.user_token = other.user_token.clone();
        self.is_signed_in = other.is_signed_in;
        self.is_render_call = other.is_render_call;
        self.allow_anonymous = other.allow_anonymous;
        self.skip_cache = other.skip_cache;
        self.request_nonce = other.request_nonce.clone();
        self.perfmon_timer = other.perfmon_timer.clone();
        self.lookup_token_err = other.lookup_token_err.clone();
    }
}
