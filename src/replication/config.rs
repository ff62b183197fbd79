//! Dial configuration (C4 surface): a plain struct with consuming `with_*`
//! builder methods, so callers can assemble a `Config` either by struct
//! literal or by chaining builder calls.

use std::net::SocketAddr;
use std::time::Duration;

/// Dial options the replication driver actually consumes — not a general
/// client configuration catalog.
#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub connect_timeout: Option<Duration>,
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
    pub keep_alive: Option<Duration>,
    pub password: Option<String>,
    /// Whether to negotiate TLS. Wiring an actual TLS stream is left to the
    /// embedding application; this crate's `connect` only opens a plain
    /// `TcpStream`.
    pub tls: bool,
    pub tls_skip_verify: bool,
    pub local_port: Option<u16>,
    /// The replica-of-master toggle: when set, the driver re-targets the
    /// connection to `master_host:master_port` read from the initial
    /// `INFO` reply if this server doesn't report itself as the master.
    pub discover_master: bool,
}

impl Config {
    pub fn new(addr: SocketAddr) -> Self {
        Config {
            addr,
            connect_timeout: None,
            read_timeout: None,
            write_timeout: None,
            keep_alive: None,
            password: None,
            tls: false,
            tls_skip_verify: false,
            local_port: None,
            discover_master: false,
        }
    }

    pub fn with_connect_timeout(mut self, d: Duration) -> Self {
        self.connect_timeout = Some(d);
        self
    }

    pub fn with_read_timeout(mut self, d: Duration) -> Self {
        self.read_timeout = Some(d);
        self
    }

    pub fn with_write_timeout(mut self, d: Duration) -> Self {
        self.write_timeout = Some(d);
        self
    }

    pub fn with_keep_alive(mut self, d: Duration) -> Self {
        self.keep_alive = Some(d);
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_tls(mut self, enabled: bool) -> Self {
        self.tls = enabled;
        self
    }

    pub fn with_tls_skip_verify(mut self, skip: bool) -> Self {
        self.tls_skip_verify = skip;
        self
    }

    pub fn with_local_port(mut self, port: u16) -> Self {
        self.local_port = Some(port);
        self
    }

    /// Enables the replica-of-master toggle.
    pub fn with_discover_master(mut self, enabled: bool) -> Self {
        self.discover_master = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_methods_compose() {
        let cfg = Config::new("127.0.0.1:6379".parse().unwrap())
            .with_password("secret")
            .with_discover_master(true)
            .with_read_timeout(Duration::from_secs(5));
        assert_eq!(cfg.password.as_deref(), Some("secret"));
        assert!(cfg.discover_master);
        assert_eq!(cfg.read_timeout, Some(Duration::from_secs(5)));
        assert!(!cfg.tls);
    }
}
