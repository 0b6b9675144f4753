//! Client for a remote control endpoint.
//!
//! Lets an export run against a source environment that only exposes the
//! `resolve-attachments` endpoint: IDs go out in one batch, the URL map comes
//! back with unresolvable IDs simply absent.

use crate::document::AssetId;
use crate::storage::AssetLookup;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tracing::debug;
use ureq::Agent;

/// Request body of the control endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveRequest {
    pub attachment_ids: Vec<AssetId>,
}

/// Response body of the control endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveResponse {
    pub success: bool,
    /// Resolvable IDs (as strings) to their URLs
    #[serde(default)]
    pub urls: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Batched [`AssetLookup`] over HTTP.
#[derive(Clone)]
pub struct ControlClient {
    endpoint: String,
    token: Option<String>,
    agent: Agent,
}

impl ControlClient {
    /// Client for `endpoint` (the full URL of `resolve-attachments`).
    pub fn new(endpoint: impl Into<String>, token: Option<String>, timeout: Duration) -> Self {
        let agent: Agent = Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();

        Self {
            endpoint: endpoint.into(),
            token,
            agent,
        }
    }

    /// Endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl AssetLookup for ControlClient {
    fn url_for_id(&self, id: AssetId) -> Result<Option<String>> {
        Ok(self.urls_for_ids(&BTreeSet::from([id]))?.remove(&id))
    }

    fn urls_for_ids(&self, ids: &BTreeSet<AssetId>) -> Result<BTreeMap<AssetId, String>> {
        if ids.is_empty() {
            return Ok(BTreeMap::new());
        }

        let body = serde_json::to_string(&ResolveRequest {
            attachment_ids: ids.iter().copied().collect(),
        })?;

        let mut request = self
            .agent
            .post(&self.endpoint)
            .header("Content-Type", "application/json");
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        debug!(endpoint = %self.endpoint, count = ids.len(), "resolving attachment IDs");
        let mut response = request.send(body.as_bytes()).map_err(|err| match err {
            ureq::Error::StatusCode(code) => {
                anyhow!("control endpoint {} answered HTTP {}", self.endpoint, code)
            }
            other => anyhow!("control endpoint {} unreachable: {}", self.endpoint, other),
        })?;

        let text = response
            .body_mut()
            .read_to_string()
            .context("Failed to read control endpoint response")?;
        let parsed: ResolveResponse =
            serde_json::from_str(&text).context("Control endpoint returned malformed JSON")?;

        if !parsed.success {
            return Err(anyhow!(
                "control endpoint rejected the request: {}",
                parsed.message.unwrap_or_else(|| "no reason given".to_string())
            ));
        }

        // Keys arrive as strings; anything that is not a requested ID is dropped.
        Ok(parsed
            .urls
            .into_iter()
            .filter_map(|(key, url)| {
                let id = key.parse::<AssetId>().ok()?;
                ids.contains(&id).then_some((id, url))
            })
            .collect())
    }
}
