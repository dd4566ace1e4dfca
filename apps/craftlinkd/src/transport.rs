use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use craftlink_protocol::{Endpoint, LinkError, LinkResult, Transport};
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

/// JSON-over-HTTP transport to the planning service.
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed building http client")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn url(&self, endpoint: Endpoint) -> String {
        join_url(&self.base_url, endpoint.path())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, endpoint: Endpoint, body: String) -> LinkResult<String> {
        let url = self.url(endpoint);
        debug!(%url, bytes = body.len(), "posting");
        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|error| LinkError::Transport(format!("{url}: {error}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|error| LinkError::Transport(format!("{url}: {error}")))?;
        if !status.is_success() {
            return Err(LinkError::Transport(format!(
                "{url} answered {status}: {text}"
            )));
        }
        Ok(text)
    }
}

fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}
