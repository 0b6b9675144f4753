//! Downloading asset bytes.

use crate::document::Locator;
use crate::errors::FetchError;
use std::time::Duration;
use tracing::debug;
use ureq::Agent;

/// Fetches the bytes behind a locator.
pub trait AssetFetcher: Send + Sync {
    fn fetch(&self, locator: &Locator) -> Result<Vec<u8>, FetchError>;
}

/// Blocking HTTP fetcher.
///
/// One agent (connection pool) per fetcher; the timeout bounds the whole
/// request including the body, and bodies above `max_bytes` are rejected.
#[derive(Clone)]
pub struct HttpFetcher {
    agent: Agent,
    max_bytes: u64,
}

impl HttpFetcher {
    /// Timeout sized for large media downloads.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

    /// Default body size limit (64 MiB).
    pub const DEFAULT_MAX_BYTES: u64 = 64 * 1024 * 1024;

    pub fn new(timeout: Duration, max_bytes: u64) -> Self {
        let agent: Agent = Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();

        Self { agent, max_bytes }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TIMEOUT, Self::DEFAULT_MAX_BYTES)
    }
}

impl AssetFetcher for HttpFetcher {
    fn fetch(&self, locator: &Locator) -> Result<Vec<u8>, FetchError> {
        debug!(%locator, "downloading");
        let mut response = self.agent.get(locator.as_str()).call()?;
        let bytes = response
            .body_mut()
            .with_config()
            .limit(self.max_bytes)
            .read_to_vec()?;
        Ok(bytes)
    }
}

impl From<ureq::Error> for FetchError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => FetchError::Status(code),
            ureq::Error::Timeout(_) => FetchError::Timeout,
            other => FetchError::Transport(other.to_string()),
        }
    }
}
