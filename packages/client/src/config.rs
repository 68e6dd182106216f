//! Client configuration.

use std::time::Duration;

use reqwest::Url;

use crate::{domain::ReconnectPolicy, error::ClientError};

/// Default collaborator address used by the local development server.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(20);
const DEFAULT_PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Liveness probe settings for an open push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Time between two `ping` frames
    pub interval: Duration,
    /// How long to wait for the matching `pong` before declaring the channel dead
    pub pong_timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_PING_INTERVAL,
            pong_timeout: DEFAULT_PONG_TIMEOUT,
        }
    }
}

/// Everything a session view needs to reach the collaborators.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Published base address of the REST collaborator (e.g. `https://api.example.com`)
    pub base_url: Url,
    pub reconnect: ReconnectPolicy,
    pub heartbeat: HeartbeatConfig,
}

impl SyncConfig {
    /// Create a configuration with default reconnect and heartbeat settings.
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let base_url =
            Url::parse(base_url).map_err(|e| ClientError::InvalidUrl(format!("{base_url}: {e}")))?;

        match base_url.scheme() {
            "http" | "https" => Ok(Self {
                base_url,
                reconnect: ReconnectPolicy::default(),
                heartbeat: HeartbeatConfig::default(),
            }),
            other => Err(ClientError::InvalidUrl(format!(
                "unsupported scheme '{other}' (expected http or https)"
            ))),
        }
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn with_heartbeat(mut self, heartbeat: HeartbeatConfig) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    /// Push-channel target for a session.
    ///
    /// `http` maps to `ws` and `https` to `wss`; the path is
    /// `/ws/sessions/{session_id}` below the base address.
    pub fn push_channel_url(&self, session_id: &str) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| ClientError::InvalidUrl(format!("cannot use scheme {scheme}")))?;

        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["ws", "sessions", session_id]);

        Ok(url)
    }

    /// Entry point of the identity-provider login redirect.
    pub fn login_url(&self) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .push("login");
        Ok(url)
    }
}
