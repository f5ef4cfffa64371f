//! HTTP collector transport
//!
//! POSTs JSON bodies to the collector with an optional bearer credential.
//! Any non-2xx response counts as a failed send; the body is ignored.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use shoptrace_core::{
    config::DeliveryConfig,
    domain::{AdminAlert, BatchPayload, LogEntry},
    ports::{EnvToken, ICollectorTransport, StaticToken, TokenSource, TransportError},
};
use tracing::debug;

const DEFAULT_BATCH_PATH: &str = "/api/errors/batch";
const DEFAULT_CRITICAL_PATH: &str = "/api/errors/critical";
const DEFAULT_ADMIN_ALERT_PATH: &str = "/api/admin/alerts";

/// Collector reached over HTTP
pub struct HttpCollector {
    client: Client,
    base_url: String,
    batch_path: String,
    critical_path: String,
    admin_alert_path: String,
    token: Arc<dyn TokenSource>,
}

impl HttpCollector {
    /// Creates a collector for `base_url` with the default endpoint paths
    /// and no credential.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            batch_path: DEFAULT_BATCH_PATH.to_string(),
            critical_path: DEFAULT_CRITICAL_PATH.to_string(),
            admin_alert_path: DEFAULT_ADMIN_ALERT_PATH.to_string(),
            token: Arc::new(StaticToken::none()),
        }
    }

    /// Builds the collector described by `config`, or `None` when no
    /// collector URL is configured.
    pub fn from_config(config: &DeliveryConfig) -> anyhow::Result<Option<Self>> {
        let Some(url) = config.collector_url.as_deref() else {
            return Ok(None);
        };

        let mut builder = Client::builder();
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build()?;

        let collector = Self::new(url)
            .with_client(client)
            .with_paths(
                &config.batch_path,
                &config.critical_path,
                &config.admin_alert_path,
            )
            .with_token_source(Arc::new(EnvToken::new(&config.token_env)));
        Ok(Some(collector))
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_paths(
        mut self,
        batch: impl Into<String>,
        critical: impl Into<String>,
        admin_alert: impl Into<String>,
    ) -> Self {
        self.batch_path = batch.into();
        self.critical_path = critical.into();
        self.admin_alert_path = admin_alert.into();
        self
    }

    pub fn with_token_source(mut self, token: Arc<dyn TokenSource>) -> Self {
        self.token = token;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST request for `path`, with the bearer header when a token is
    /// available
    pub fn request(&self, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let request = self.client.post(url);
        match self.token.bearer_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<(), TransportError> {
        let response = self
            .request(path)
            .json(body)
            .send()
            .await
            .map_err(|e| TransportError::Request {
                endpoint: path.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                endpoint: path.to_string(),
                status: status.as_u16(),
            });
        }

        debug!(path, status = status.as_u16(), "Collector accepted request");
        Ok(())
    }
}

#[async_trait]
impl ICollectorTransport for HttpCollector {
    async fn send_batch(&self, payload: &BatchPayload) -> Result<(), TransportError> {
        self.post_json(&self.batch_path, payload).await
    }

    async fn send_critical(&self, entry: &LogEntry) -> Result<(), TransportError> {
        self.post_json(&self.critical_path, entry).await
    }

    async fn send_admin_alert(&self, alert: &AdminAlert) -> Result<(), TransportError> {
        self.post_json(&self.admin_alert_path, alert).await
    }
}
