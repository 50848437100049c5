//! Session construction options.

use std::time::Duration;
use zk_protocol::SessionId;

/// Receive timeout used when none is configured. Also the session timeout
/// negotiated with the ensemble.
pub const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Options for [`Session::with_options`](crate::Session::with_options).
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub(crate) servers: Vec<String>,
    pub(crate) recv_timeout: Duration,
    pub(crate) session_id: Option<SessionId>,
}

impl SessionOptions {
    pub fn builder() -> SessionOptionsBuilder {
        SessionOptionsBuilder::default()
    }

    /// Candidate ensemble addresses, used for the initial dial and every
    /// redial.
    pub fn servers(&self) -> &[String] {
        &self.servers
    }

    pub fn recv_timeout(&self) -> Duration {
        self.recv_timeout
    }

    /// Resumption token of a prior logical session, if resuming.
    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            recv_timeout: DEFAULT_RECV_TIMEOUT,
            session_id: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct SessionOptionsBuilder {
    options: SessionOptions,
}

impl SessionOptionsBuilder {
    pub fn servers<I, S>(mut self, servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options.servers = servers.into_iter().map(Into::into).collect();
        self
    }

    /// Parses a comma-separated server list, the format the original
    /// command-line tooling hands around.
    pub fn servers_csv(mut self, servers: &str) -> Self {
        self.options.servers = servers
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        self
    }

    pub fn recv_timeout(mut self, recv_timeout: Duration) -> Self {
        self.options.recv_timeout = recv_timeout;
        self
    }

    pub fn session_id(mut self, session_id: SessionId) -> Self {
        self.options.session_id = Some(session_id);
        self
    }

    pub fn build(self) -> SessionOptions {
        self.options
    }
}
