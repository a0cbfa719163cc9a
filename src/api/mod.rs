use anyhow::{Context, Result};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::config::ApiConfig;
use crate::history::RetentionWindow;

/// Why a single fetch produced no data. Both variants are caught at the
/// request boundary and downgraded to an "unavailable" snapshot field;
/// neither ever aborts a poll cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Transport failure or non-2xx status.
    #[error("network failure: {0}")]
    Network(String),
    /// Body not parseable as the expected shape.
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Per-request result. Errors carry enough context to render an N/A marker
/// with a reason, never to crash the cycle.
pub type FetchResult<T> = Result<T, FetchError>;

/// One monitored container as listed by the API.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Entity {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub status: String,
}

/// Host/daemon level information.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct HostInfo {
    #[serde(rename = "ContainersRunning", default)]
    pub containers_running: u64,
    #[serde(rename = "Containers", default)]
    pub containers_total: u64,
    #[serde(rename = "Images", default)]
    pub images: u64,
    #[serde(rename = "ServerVersion", default)]
    pub server_version: String,
    #[serde(rename = "OperatingSystem", default)]
    pub operating_system: String,
    #[serde(rename = "Name", default)]
    pub hostname: String,
    #[serde(rename = "MemTotal", default)]
    pub mem_total_bytes: u64,
}

/// One stats sample for a container. Omitted numeric fields decode as 0 so
/// NaN can never reach the history series.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ContainerStats {
    #[serde(rename = "cpu_percent", default)]
    pub cpu_percent: f64,
    #[serde(rename = "memory_usage", default)]
    pub memory_usage_bytes: u64,
    #[serde(rename = "memory_limit", default)]
    pub memory_limit_bytes: u64,
    #[serde(rename = "memory_percent", default)]
    pub memory_percent: f64,
    #[serde(rename = "pids", default)]
    pub pid_count: u64,
    /// Sample time as reported by the API, opaque to the core.
    #[serde(rename = "time", default)]
    pub timestamp: String,
}

/// Cumulative network counters for a container.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
pub struct NetworkCounters {
    #[serde(default)]
    pub rx_bytes: u64,
    #[serde(default)]
    pub tx_bytes: u64,
}

/// Raw log tail, pre-split by the API into access and error lines.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct LogTail {
    #[serde(default)]
    pub access: Vec<String>,
    #[serde(default)]
    pub error: Vec<String>,
}

/// Metrics API client trait. The poll cycle is written against this seam so
/// tests can script responses without a server.
pub trait MetricsApi: Send + Sync {
    /// Fetch the ordered container listing.
    fn fetch_entities(&self) -> impl std::future::Future<Output = FetchResult<Vec<Entity>>> + Send;

    /// Fetch host/daemon information.
    fn fetch_host_info(&self) -> impl std::future::Future<Output = FetchResult<HostInfo>> + Send;

    /// Fetch the latest stats sample for one container.
    fn fetch_stats(
        &self,
        id: &str,
    ) -> impl std::future::Future<Output = FetchResult<ContainerStats>> + Send;

    /// Fetch network counters for one container.
    fn fetch_network(
        &self,
        id: &str,
    ) -> impl std::future::Future<Output = FetchResult<NetworkCounters>> + Send;

    /// Fetch the log tail for one container.
    fn fetch_logs(&self, id: &str)
        -> impl std::future::Future<Output = FetchResult<LogTail>> + Send;
}

/// HTTP-based metrics API client.
pub struct Client {
    http: reqwest::Client,
    endpoint: String,
    window: Option<RetentionWindow>,
}

impl Client {
    /// Create a new client. Requests are bounded by the configured timeout
    /// so a hung remote cannot stall a poll cycle indefinitely.
    pub fn new(cfg: &ApiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .context("building HTTP client")?;

        Ok(Self {
            http,
            endpoint: cfg.endpoint.trim_end_matches('/').to_string(),
            window: None,
        })
    }

    /// Request the given history window on id-scoped endpoints.
    pub fn with_window(mut self, window: RetentionWindow) -> Self {
        self.window = Some(window);
        self
    }

    /// Perform a GET request and deserialize the JSON response.
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        windowed: bool,
    ) -> FetchResult<T> {
        let url = build_url(&self.endpoint, path, if windowed { self.window } else { None });
        debug!(%url, "fetching");

        let response = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| FetchError::Network(format!("requesting {path}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Network(format!(
                "unexpected status {status} from {path}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| FetchError::Malformed(format!("decoding response from {path}: {e}")))
    }
}

/// Build a request URL from the base endpoint, path, and optional window.
fn build_url(endpoint: &str, path: &str, window: Option<RetentionWindow>) -> String {
    match window {
        Some(w) => format!("{endpoint}/{path}?window={}", w.as_str()),
        None => format!("{endpoint}/{path}"),
    }
}

impl MetricsApi for Client {
    async fn fetch_entities(&self) -> FetchResult<Vec<Entity>> {
        self.get_json("containers", false).await
    }

    async fn fetch_host_info(&self) -> FetchResult<HostInfo> {
        self.get_json("system", false).await
    }

    async fn fetch_stats(&self, id: &str) -> FetchResult<ContainerStats> {
        self.get_json(&format!("stats/{id}"), true).await
    }

    async fn fetch_network(&self, id: &str) -> FetchResult<NetworkCounters> {
        self.get_json(&format!("network/{id}"), true).await
    }

    async fn fetch_logs(&self, id: &str) -> FetchResult<LogTail> {
        self.get_json(&format!("logs/{id}"), true).await
    }
}
