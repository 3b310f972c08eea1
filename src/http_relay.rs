use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use relay_bridge::{BatchResponse, ClassifierRelay, FeedbackPayload, FeedbackRelay, RelayError};
use sentinel_core_types::Classification;
use sentinel_policy_center::RelayPolicy;

pub const API_KEY_HEADER: &str = "X-API-Key";

#[derive(Debug, Clone)]
pub struct HttpRelayConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl HttpRelayConfig {
    pub fn from_policy(policy: &RelayPolicy) -> Self {
        Self {
            base_url: policy.base_url.clone(),
            api_key: policy.api_key.clone().filter(|key| !key.is_empty()),
            timeout: Duration::from_millis(policy.timeout_ms),
        }
    }
}

#[derive(Serialize)]
struct SingleRequest<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct BatchRequest<'a> {
    texts: &'a [String],
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Classifier and feedback relay talking to one backend host.
pub struct HttpRelay {
    client: Client,
    config: HttpRelayConfig,
}

impl HttpRelay {
    pub fn new(config: HttpRelayConfig) -> Result<Self, RelayError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| RelayError::Internal(format!("failed to build HTTP client: {err}")))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &HttpRelayConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, RelayError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut request = self.client.post(self.url(path)).json(body);
        if let Some(key) = &self.config.api_key {
            request = request.header(API_KEY_HEADER, key);
        }
        let response = request
            .send()
            .await
            .map_err(|err| RelayError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<response unavailable>".to_string());
            let message = serde_json::from_str::<ErrorBody>(&text)
                .map(|body| body.error)
                .unwrap_or(text);
            warn!(target: "relay.http", path, status = status.as_u16(), %message, "request rejected");
            return Err(RelayError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        debug!(target: "relay.http", path, status = status.as_u16(), "request ok");
        response
            .json::<T>()
            .await
            .map_err(|err| RelayError::Internal(format!("invalid response body: {err}")))
    }
}

#[async_trait]
impl ClassifierRelay for HttpRelay {
    async fn classify_single(&self, text: &str) -> Result<Classification, RelayError> {
        self.post("/predict", &SingleRequest { text }).await
    }

    async fn classify_batch(&self, texts: &[String]) -> Result<BatchResponse, RelayError> {
        self.post("/predict/batch", &BatchRequest { texts }).await
    }
}

#[async_trait]
impl FeedbackRelay for HttpRelay {
    async fn submit_feedback(&self, payload: &FeedbackPayload) -> Result<(), RelayError> {
        let _: Value = self.post("/report", payload).await?;
        Ok(())
    }
}
