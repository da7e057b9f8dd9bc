//! HTTP client for the apiforge daemon.

use std::time::Duration;

use apiforge_core::{
    HealthResponse, ResourceDescriptor, ResourceType, SearchPage, SearchStats, SyncReport,
    SyncStatusResponse,
};
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

/// Requests give up after this long instead of hanging on a wedged daemon.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Default daemon address.
pub const DEFAULT_DAEMON_URL: &str = "http://127.0.0.1:4680";

/// Errors talking to the daemon.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Nothing is listening at the daemon address.
    #[error("apiforge daemon is not reachable at {url}")]
    Unreachable {
        /// Daemon address.
        url: String,
        /// Underlying error.
        #[source]
        source: reqwest::Error,
    },

    /// The daemon accepted the connection but did not answer in time.
    #[error("request to {url} timed out after {secs}s")]
    Timeout {
        /// Request URL.
        url: String,
        /// Timeout that elapsed.
        secs: u64,
    },

    /// The daemon answered with an error body.
    #[error("{message}")]
    Api {
        /// HTTP status.
        status: u16,
        /// Machine-readable error code.
        code: String,
        /// Message from the daemon.
        message: String,
    },

    /// The daemon URL cannot carry a path.
    #[error("invalid daemon URL: {0}")]
    InvalidUrl(String),

    /// Building or sending the request failed otherwise.
    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),

    /// The response body did not have the expected shape.
    #[error("unexpected response from daemon: {0}")]
    Decode(#[source] reqwest::Error),
}

/// Result alias for client calls.
pub type ClientResult<T> = Result<T, ClientError>;

/// Filters and paging for a search call.
#[derive(Debug, Clone, Default)]
pub struct SearchParams {
    pub query: String,
    pub resource_type: Option<ResourceType>,
    pub source: Option<String>,
    pub package: Option<String>,
    pub page: Option<usize>,
    pub size: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    message: String,
}

#[derive(Debug, Serialize)]
struct SyncRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<&'a str>,
}

/// HTTP client for the daemon's REST API.
#[derive(Debug, Clone)]
pub struct ApiforgeClient {
    client: reqwest::Client,
    base_url: Url,
}

impl ApiforgeClient {
    /// Client for the daemon at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: Url) -> ClientResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(ClientError::Request)?;

        Ok(Self { client, base_url })
    }

    pub async fn health(&self) -> ClientResult<HealthResponse> {
        let url = self.endpoint(&["health"])?;
        self.send(self.client.get(url)).await
    }

    pub async fn search(&self, params: &SearchParams) -> ClientResult<SearchPage> {
        let mut url = self.endpoint(&["api", "data", "search"])?;
        {
            let mut query = url.query_pairs_mut();
            if !params.query.trim().is_empty() {
                query.append_pair("query", &params.query);
            }
            if let Some(resource_type) = params.resource_type {
                query.append_pair("type", resource_type.as_str());
            }
            if let Some(source) = &params.source {
                query.append_pair("source", source);
            }
            if let Some(package) = &params.package {
                query.append_pair("pkg", package);
            }
            if let Some(page) = params.page {
                query.append_pair("page", &page.to_string());
            }
            if let Some(size) = params.size {
                query.append_pair("size", &size.to_string());
            }
        }
        self.send(self.client.get(url)).await
    }

    pub async fn descriptor(&self, id: &str) -> ClientResult<ResourceDescriptor> {
        let url = self.endpoint(&["api", "data", id])?;
        self.send(self.client.get(url)).await
    }

    pub async fn touch(&self, id: &str) -> ClientResult<ResourceDescriptor> {
        let url = self.endpoint(&["api", "data", id, "touch"])?;
        self.send(self.client.post(url)).await
    }

    pub async fn recent(&self, limit: Option<usize>) -> ClientResult<Vec<ResourceDescriptor>> {
        let mut url = self.endpoint(&["api", "data", "recent"])?;
        if let Some(limit) = limit {
            url.query_pairs_mut().append_pair("limit", &limit.to_string());
        }
        self.send(self.client.get(url)).await
    }

    pub async fn stats(&self, usage: bool) -> ClientResult<SearchStats> {
        let mut url = self.endpoint(&["api", "data", "stats"])?;
        if usage {
            url.query_pairs_mut().append_pair("usage", "true");
        }
        self.send(self.client.get(url)).await
    }

    pub async fn sync(&self, source: Option<&str>) -> ClientResult<SyncReport> {
        let url = self.endpoint(&["api", "sync"])?;
        self.send(self.client.post(url).json(&SyncRequest { source }))
            .await
    }

    pub async fn sync_status(&self, key: &str) -> ClientResult<SyncStatusResponse> {
        let url = self.endpoint(&["api", "sync", key])?;
        self.send(self.client.get(url)).await
    }

    /// Base URL with `segments` appended, each percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> ClientResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ClientError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> ClientResult<T> {
        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        debug!(url = %response.url(), %status, "Daemon responded");

        if status.is_success() {
            return response.json().await.map_err(ClientError::Decode);
        }

        let (code, message) = match response.json::<ErrorBody>().await {
            Ok(body) => (body.error, body.message),
            Err(_) => (
                "unknown".to_string(),
                format!("daemon returned {status}"),
            ),
        };
        Err(ClientError::Api {
            status: status.as_u16(),
            code,
            message,
        })
    }

    fn transport_error(&self, error: reqwest::Error) -> ClientError {
        if error.is_timeout() {
            ClientError::Timeout {
                url: error
                    .url()
                    .map_or_else(|| self.base_url.to_string(), ToString::to_string),
                secs: REQUEST_TIMEOUT.as_secs(),
            }
        } else if error.is_connect() {
            ClientError::Unreachable {
                url: self.base_url.to_string(),
                source: error,
            }
        } else {
            ClientError::Request(error)
        }
    }
}
