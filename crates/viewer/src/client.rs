//! HTTP client for the impview file access service.

use impview_common::{ErrorBody, IMAGE_ROUTE, LOGS_ROUTE, LogsResponse, STATUS_ROUTE, StatusResponse};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Server the CLI talks to unless told otherwise.
pub const DEFAULT_SERVER: &str = "http://127.0.0.1:3001";

const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Why a request to the service failed.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The server address is not an http(s) base URL.
    #[error("Invalid server URL '{url}': {reason}")]
    InvalidUrl {
        /// Address as given.
        url: String,
        /// Why it was refused.
        reason: String,
    },

    /// Connecting, sending or reading the response failed.
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("HTTP error! status: {status}: {message}")]
    Status {
        /// Status line received.
        status: StatusCode,
        /// `error` of the JSON body, or the raw body text.
        message: String,
    },

    /// The response body is not the expected JSON.
    #[error("Unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Where the watcher gets log contents and freshness markers from.
pub trait LogSource: Send + Sync + 'static {
    /// Full contents of `file`, newest record first.
    fn fetch_logs(
        &self,
        file: &str,
    ) -> impl Future<Output = Result<LogsResponse, ClientError>> + Send;

    /// Freshness marker of `file` only.
    fn fetch_status(
        &self,
        file: &str,
    ) -> impl Future<Output = Result<StatusResponse, ClientError>> + Send;
}

/// URL of `route` under `base` with a single query parameter.
pub fn endpoint_url(base: &Url, route: &str, key: &str, value: &str) -> Url {
    let mut url = base.clone();
    let prefix = base.path().trim_end_matches('/');
    url.set_path(&format!("{prefix}{route}"));
    url.query_pairs_mut().clear().append_pair(key, value);
    url
}

/// URL serving the image a record refers to.
pub fn image_url(base: &Url, reference: &str) -> Url {
    endpoint_url(base, IMAGE_ROUTE, "path", reference)
}

/// reqwest-backed [`LogSource`].
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
}

impl ApiClient {
    /// Client for the service at `server`, e.g. `http://127.0.0.1:3001`.
    pub fn new(server: &str) -> Result<Self, ClientError> {
        let base = Url::parse(server).map_err(|e| ClientError::InvalidUrl {
            url: server.to_string(),
            reason: e.to_string(),
        })?;
        if base.cannot_be_a_base() || !matches!(base.scheme(), "http" | "https") {
            return Err(ClientError::InvalidUrl {
                url: server.to_string(),
                reason: "expected an http(s) URL".to_string(),
            });
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|err| {
                warn!(error = %err, "Failed to build HTTP client.");
                ClientError::Transport(err)
            })?;

        Ok(Self { http, base })
    }

    /// Base URL requests are built on.
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// `GET /api/logs` for `file`.
    pub async fn logs(&self, file: &str) -> Result<LogsResponse, ClientError> {
        let response: LogsResponse = self
            .get_json(endpoint_url(&self.base, LOGS_ROUTE, "file", file))
            .await?;
        debug!(
            file,
            records = response.records.len(),
            last_modified = response.last_modified,
            "Received logs."
        );
        Ok(response)
    }

    /// `GET /api/logs/status` for `file`.
    pub async fn status(&self, file: &str) -> Result<StatusResponse, ClientError> {
        self.get_json(endpoint_url(&self.base, STATUS_ROUTE, "file", file))
            .await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ClientError> {
        debug!(%url, "Sending request.");
        let response = self.http.get(url.clone()).send().await.map_err(|err| {
            debug!(error = %err, %url, "Request failed.");
            ClientError::Transport(err)
        })?;

        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            let message = serde_json::from_slice::<ErrorBody>(&body).map_or_else(
                |_| String::from_utf8_lossy(&body).trim().to_string(),
                |b| b.error,
            );
            return Err(ClientError::Status { status, message });
        }

        Ok(serde_json::from_slice(&body)?)
    }
}

impl LogSource for ApiClient {
    async fn fetch_logs(&self, file: &str) -> Result<LogsResponse, ClientError> {
        self.logs(file).await
    }

    async fn fetch_status(&self, file: &str) -> Result<StatusResponse, ClientError> {
        self.status(file).await
    }
}
