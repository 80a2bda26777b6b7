//! HTTP transport for the search backend.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::ExplorerBackend;
use crate::config::BackendConfig;
use crate::error::{ExplorerError, ExplorerResult};
use crate::query::GraphQlRequest;

/// [`ExplorerBackend`] over HTTP with reqwest.
///
/// No retries and no auth headers; wrap the client for either.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    graphql_url: Url,
    status_url: Url,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> ExplorerResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Self::with_client(client, config)
    }

    /// Use a preconfigured client (proxies, default headers).
    pub fn with_client(client: reqwest::Client, config: &BackendConfig) -> ExplorerResult<Self> {
        Ok(Self {
            client,
            graphql_url: config.backend_url.join(&config.graphql_path)?,
            status_url: config.backend_url.join(&config.status_path)?,
        })
    }

    pub fn graphql_url(&self) -> &Url {
        &self.graphql_url
    }

    async fn read_json(response: reqwest::Response) -> ExplorerResult<Value> {
        let status = response.status();
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            ExplorerError::Decode(format!("HTTP {status}: response is not JSON: {e}"))
        })
    }
}

#[async_trait]
impl ExplorerBackend for HttpBackend {
    async fn graphql(&self, request: &GraphQlRequest) -> ExplorerResult<Value> {
        debug!(url = %self.graphql_url, "posting graphql request");
        let response = self
            .client
            .post(self.graphql_url.clone())
            .json(request)
            .send()
            .await?;
        Self::read_json(response).await
    }

    async fn field_status(&self) -> ExplorerResult<Value> {
        debug!(url = %self.status_url, "fetching index status");
        let response = self
            .client
            .get(self.status_url.clone())
            .send()
            .await?
            .error_for_status()?;
        Self::read_json(response).await
    }
}
