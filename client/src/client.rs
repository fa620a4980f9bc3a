use crate::{
    algod::{Algod, NodeStatus, PendingTransaction},
    Error, Result,
};
use avmkit_types::{transaction::Digest, SuggestedParams};
use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use reqwest::{
    header::{HeaderMap, HeaderValue, CONTENT_TYPE},
    Method, Response, StatusCode,
};
use serde::{de::DeserializeOwned, Deserialize};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};
use url::Url;

/// Header carrying the node's API token.
pub const TOKEN_HEADER: &str = "X-Algo-API-Token";

/// Validity window given to transactions built from suggested params.
const VALIDITY_WINDOW: u64 = 1000;

/// How requests are retried on transport errors and retryable statuses.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Also retry POSTs. A resubmitted transaction is rejected as a
    /// duplicate, so this is safe for submission.
    pub retry_non_idempotent: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
            retry_non_idempotent: false,
        }
    }
}

fn is_retryable(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

#[derive(Deserialize)]
struct SubmitResponse {
    #[serde(rename = "txId")]
    tx_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ParamsResponse {
    fee: u64,
    genesis_hash: String,
    genesis_id: String,
    last_round: u64,
}

/// HTTP client for a node's v2 REST API.
#[derive(Clone)]
pub struct Client {
    pub base_url: Url,
    pub http_client: reqwest::Client,
    retry_policy: RetryPolicy,
}

impl Client {
    /// `token` may be empty for nodes that need none.
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        let mut base_url = Url::parse(base_url)?;
        match base_url.scheme() {
            "http" | "https" => {}
            other => return Err(Error::InvalidScheme(other.to_string())),
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let mut headers = HeaderMap::new();
        if !token.is_empty() {
            let value = HeaderValue::from_str(token).map_err(|_| Error::InvalidToken)?;
            headers.insert(TOKEN_HEADER, value);
        }
        let http_client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;
        Ok(Self {
            base_url,
            http_client,
            retry_policy: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    fn backoff(&self, attempt: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt as u32).unwrap_or(u32::MAX);
        self.retry_policy
            .initial_backoff
            .saturating_mul(factor)
            .min(self.retry_policy.max_backoff)
    }

    async fn send_with_retry(&self, method: Method, url: Url, body: Option<Bytes>) -> Result<Response> {
        let retries_allowed = method == Method::GET || self.retry_policy.retry_non_idempotent;
        let max_attempts = if retries_allowed {
            self.retry_policy.max_attempts.max(1)
        } else {
            1
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut request = self.http_client.request(method.clone(), url.clone());
            if let Some(body) = &body {
                request = request
                    .header(CONTENT_TYPE, "application/x-binary")
                    .body(body.clone());
            }
            let last_attempt = attempt >= max_attempts;
            match request.send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) if is_retryable(response.status()) && !last_attempt => {
                    warn!(%method, %url, status = %response.status(), attempt, "retrying request");
                }
                Ok(response) => {
                    let status = response.status();
                    let text = response.text().await.unwrap_or_default();
                    return Err(Error::FailedWithBody {
                        status,
                        body: format!("{method} {url}: {text}"),
                    });
                }
                Err(err) if !last_attempt => {
                    warn!(%method, %url, ?err, attempt, "retrying request");
                }
                Err(err) => return Err(err.into()),
            }
            sleep(self.backoff(attempt - 1)).await;
        }
    }

    pub async fn get_with_retry(&self, url: Url) -> Result<Response> {
        self.send_with_retry(Method::GET, url, None).await
    }

    pub async fn post_bytes_with_retry(&self, url: Url, body: Bytes) -> Result<Response> {
        self.send_with_retry(Method::POST, url, Some(body)).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path)?;
        let bytes = self.get_with_retry(url).await?.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Parameters for new transactions, valid from the node's last round for
    /// the next 1000 rounds.
    pub async fn suggested_params(&self) -> Result<SuggestedParams> {
        let params: ParamsResponse = self.get_json("v2/transactions/params").await?;
        let genesis_hash: Digest = general_purpose::STANDARD
            .decode(&params.genesis_hash)
            .ok()
            .and_then(|hash| hash.try_into().ok())
            .ok_or_else(|| Error::UnexpectedResponse("malformed genesis hash".to_string()))?;
        Ok(SuggestedParams {
            fee: params.fee,
            flat_fee: false,
            first_valid: params.last_round,
            last_valid: params.last_round + VALIDITY_WINDOW,
            genesis_id: params.genesis_id,
            genesis_hash,
        })
    }
}

impl Algod for Client {
    async fn status(&self) -> Result<NodeStatus> {
        self.get_json("v2/status").await
    }

    async fn status_after_block(&self, round: u64) -> Result<NodeStatus> {
        self.get_json(&format!("v2/status/wait-for-block-after/{round}"))
            .await
    }

    async fn pending_transaction_info(&self, txid: &str) -> Result<PendingTransaction> {
        self.get_json(&format!("v2/transactions/pending/{txid}?format=json"))
            .await
    }

    async fn send_raw_transaction(&self, bytes: Vec<u8>) -> Result<String> {
        let url = self.base_url.join("v2/transactions")?;
        let response = self.post_bytes_with_retry(url, Bytes::from(bytes)).await?;
        let submitted: SubmitResponse = serde_json::from_slice(&response.bytes().await?)?;
        debug!(txid = %submitted.tx_id, "submitted transactions");
        Ok(submitted.tx_id)
    }
}
