//! Sends a built replay over the wire.

use async_trait::async_trait;
use iast_builder::RequestDraft;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("replay timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
}

/// Sends one [`RequestDraft`] and returns once the send completed (not once
/// the agent's correlated record arrived — that is the Correlator's job).
#[async_trait]
pub trait ReplaySender: Send + Sync {
    async fn send(&self, draft: &RequestDraft) -> Result<(), ReplayError>;
}

/// Sends replays over real HTTP via `reqwest`, grounded on the same client
/// pattern used for outbound provider calls elsewhere in this workspace.
pub struct ReqwestReplaySender {
    client: reqwest::Client,
}

impl ReqwestReplaySender {
    pub fn new(timeout: Duration) -> Self {
        Self::with_proxy(timeout, None)
    }

    /// Builds a sender that routes replays through `proxy_url`
    ///.
    pub fn with_proxy(timeout: Duration, proxy_url: Option<&str>) -> Self {
        let mut builder = reqwest::Client::builder().timeout(timeout);
        if let Some(url) = proxy_url {
            match reqwest::Proxy::all(url) {
                Ok(proxy) => builder = builder.proxy(proxy),
                Err(e) => tracing::warn!(proxy = url, error = %e, "ignoring invalid replay proxy"),
            }
        }
        Self { client: builder.build().expect("failed to build HTTP client") }
    }
}

#[async_trait]
impl ReplaySender for ReqwestReplaySender {
    async fn send(&self, draft: &RequestDraft) -> Result<(), ReplayError> {
        let query = draft.query_string();
        let url = if query.is_empty() {
            format!("http://{}:{}{}", draft.host, draft.port, draft.path)
        } else {
            format!("http://{}:{}{}?{}", draft.host, draft.port, draft.path, query)
        };

        let method = reqwest::Method::from_bytes(draft.method.to_ascii_uppercase().as_bytes())
            .unwrap_or(reqwest::Method::GET);

        let mut req = self.client.request(method, &url);
        for (name, values) in draft.headers.iter() {
            for value in values {
                req = req.header(name, value);
            }
        }
        if !draft.cookies.is_empty() {
            req = req.header("cookie", draft.cookie_header_value());
        }
        req = req.header("scan-request-id", draft.scan_request_id.as_str());
        req = req.body(draft.body_bytes());

        req.send().await.map_err(|e| {
            if e.is_timeout() {
                ReplayError::Timeout
            } else {
                ReplayError::Transport(e.to_string())
            }
        })?;
        Ok(())
    }
}
