//! Mail-status service client
//!
//! Records message lifecycle events in the mail database over HTTP.
//! Transport failures are retried with exponential backoff; any response
//! other than 200 is returned as an error carrying the response body.

use async_trait::async_trait;
use mailflow_common::config::MailDbConfig;
use mailflow_common::{Error, Result};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Unique identifier for messages
pub type MessageId = Uuid;

/// Longest delay between two retries
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Records message lifecycle events
#[async_trait]
pub trait StatusReporter: Send + Sync {
    /// Register a new message
    async fn new_message(&self, domain: &str, id: MessageId) -> Result<()>;

    /// Update the lifecycle status of a message
    async fn update_status(&self, domain: &str, id: MessageId, status: i64) -> Result<()>;

    /// Set an arbitrary string field of a message
    async fn set_field(&self, domain: &str, id: MessageId, field: &str, value: &str)
        -> Result<()>;
}

/// HTTP client for the mail-status service
#[derive(Clone)]
pub struct MailDbClient {
    config: MailDbConfig,
    client: Client,
}

impl MailDbClient {
    /// Create a new client with its own HTTP connection pool
    pub fn new(config: MailDbConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self::with_client(config, client))
    }

    /// Create a new client sharing an existing HTTP client
    pub fn with_client(config: MailDbConfig, client: Client) -> Self {
        Self { config, client }
    }

    fn endpoint(&self, domain: &str, operation: &str, id: MessageId) -> String {
        format!(
            "{}/domain/{}/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            domain,
            operation,
            id
        )
    }

    /// Send a request, retrying transport failures
    async fn execute(&self, method: Method, url: &str, body: Option<serde_json::Value>) -> Result<()> {
        let payload = match body {
            Some(body) => serde_json::to_vec(&body)
                .map_err(|e| Error::Other(anyhow::anyhow!("could not marshal value: {}", e)))?,
            None => Vec::new(),
        };

        let mut attempt = 0;
        loop {
            let mut request = self.client.request(method.clone(), url).body(payload.clone());
            if !payload.is_empty() {
                request = request.header(CONTENT_TYPE, "application/json");
            }
            if let Some(ref token) = self.config.token {
                request = request.header(AUTHORIZATION, format!("Bearer {}", token));
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status == StatusCode::OK {
                        return Ok(());
                    }

                    let body = response
                        .text()
                        .await
                        .map_err(|e| Error::Transport(format!("could not read response body: {}", e)))?;
                    return Err(Error::MailDb {
                        endpoint: url.to_string(),
                        status: status.as_u16(),
                        body,
                    });
                }
                Err(e) if attempt < self.config.max_retries && is_retryable(&e) => {
                    let delay = retry_delay(self.config.retry_base_delay_ms, attempt);
                    attempt += 1;
                    warn!(
                        "maildb {} {} failed (attempt {}), retrying in {:?}: {}",
                        method, url, attempt, delay, e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return Err(Error::Transport(format!("{} {}: {}", method, url, e)));
                }
            }
        }
    }
}

#[async_trait]
impl StatusReporter for MailDbClient {
    async fn new_message(&self, domain: &str, id: MessageId) -> Result<()> {
        info!("maildb: create new email {}", id);
        let url = self.endpoint(domain, "new", id);
        self.execute(Method::POST, &url, None).await
    }

    async fn update_status(&self, domain: &str, id: MessageId, status: i64) -> Result<()> {
        info!("maildb: update status {} {}", id, status);
        let url = self.endpoint(domain, "update", id);
        self.execute(Method::PUT, &url, Some(serde_json::json!({ "status": status })))
            .await
    }

    async fn set_field(
        &self,
        domain: &str,
        id: MessageId,
        field: &str,
        value: &str,
    ) -> Result<()> {
        debug!("maildb: update {} {} {}", field, id, value);
        let url = self.endpoint(domain, "update", id);

        let mut body = serde_json::Map::new();
        body.insert(field.to_string(), serde_json::Value::from(value));
        self.execute(Method::PUT, &url, Some(serde_json::Value::Object(body)))
            .await
    }
}

/// Failures worth another attempt: the request never got a response
fn is_retryable(error: &reqwest::Error) -> bool {
    error.is_connect() || error.is_timeout() || error.is_request()
}

/// Exponential backoff: `base * 2^attempt`, capped
fn retry_delay(base_ms: u64, attempt: u32) -> Duration {
    let factor = 2u64.saturating_pow(attempt);
    Duration::from_millis(base_ms.saturating_mul(factor)).min(MAX_RETRY_DELAY)
}
