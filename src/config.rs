//! Test server configuration.

use std::net::{Ipv4Addr, SocketAddr};

/// Settings for a [`TestServer`](crate::TestServer).
///
/// ```rust
/// use webtest::Config;
///
/// let config = Config::default()
///     .with_logger_name("teams-api-test")
///     .with_strict_registration(false);
/// assert_eq!(config.addr.port(), 0);
/// ```
#[derive(Clone, Debug)]
pub struct Config {
    /// Listener address. Port `0` picks a free port.
    pub addr: SocketAddr,
    /// Recorded on every request span as `logger`.
    pub logger_name: String,
    /// When set, a request whose test id has no registered context is
    /// answered with `500` before any route runs. When cleared, it runs with
    /// the server's default context instead.
    pub strict_registration: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            logger_name: "api-test".to_owned(),
            strict_registration: true,
        }
    }
}

impl Config {
    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_logger_name(mut self, name: impl Into<String>) -> Self {
        self.logger_name = name.into();
        self
    }

    pub fn with_strict_registration(mut self, strict: bool) -> Self {
        self.strict_registration = strict;
        self
    }
}
