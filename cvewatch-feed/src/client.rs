// ---------------------------------------------------------------------------
// NVD vulnerability feed client
// ---------------------------------------------------------------------------
//
// Fetches CVE entries for a single CPE from the NIST NVD 2.0 API. The
// `VulnFeed` trait is the seam the sync job and the API handlers program
// against, so tests can substitute a canned feed without touching the
// network.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

/// NVD 2.0 API base URL.
pub const DEFAULT_FEED_URL: &str = "https://services.nvd.nist.gov/rest/json/cves/2.0";

/// Maximum results requested per feed call. First page only; no pagination.
const RESULTS_PER_PAGE: usize = 50;

/// Pause before each unauthenticated request. NVD allows ~5 requests per
/// 30 seconds without an API key.
const RATE_LIMIT_PAUSE: Duration = Duration::from_secs(6);

/// HTTP request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("feed request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("feed returned status {0}")]
    Status(StatusCode),
    #[error("malformed feed response: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl FeedError {
    /// Whether retrying the same request later could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FeedError::Transport(_) => true,
            FeedError::Status(code) => {
                code.is_server_error() || *code == StatusCode::TOO_MANY_REQUESTS
            }
            FeedError::Malformed(_) => false,
        }
    }
}

/// A source of vulnerability records keyed by CPE.
#[async_trait]
pub trait VulnFeed: Send + Sync {
    /// Fetch the known vulnerabilities for one platform identifier.
    ///
    /// An empty result is not an error; `Err` means the feed itself failed
    /// and the caller decides whether the failure is worth retrying.
    async fn fetch_for_cpe(&self, cpe: &str) -> Result<Vec<RawVulnerability>, FeedError>;
}

/// Production `VulnFeed` backed by the NVD 2.0 REST API.
pub struct NvdClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl NvdClient {
    /// Build a client against the public NVD endpoint.
    pub fn new(api_key: Option<String>) -> Result<Self, FeedError> {
        Self::with_base_url(DEFAULT_FEED_URL, api_key)
    }

    /// Build a client against a specific endpoint (tests point this at a
    /// local server).
    pub fn with_base_url(base_url: &str, api_key: Option<String>) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent("cvewatch/0.2")
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl VulnFeed for NvdClient {
    async fn fetch_for_cpe(&self, cpe: &str) -> Result<Vec<RawVulnerability>, FeedError> {
        if self.api_key.is_none() {
            tokio::time::sleep(RATE_LIMIT_PAUSE).await;
        }

        let page_size = RESULTS_PER_PAGE.to_string();
        let mut request = self
            .client
            .get(&self.base_url)
            .query(&[("cpeName", cpe), ("resultsPerPage", page_size.as_str())])
            .header("Accept", "application/json");
        if let Some(key) = &self.api_key {
            request = request.header("apiKey", key);
        }

        let resp = request.send().await?;

        // NVD answers 404 for CPEs it has no entries for; that is "no data",
        // not a failure.
        if resp.status() == StatusCode::NOT_FOUND {
            debug!(cpe, "feed has no entries for this CPE");
            return Ok(Vec::new());
        }
        if !resp.status().is_success() {
            return Err(FeedError::Status(resp.status()));
        }

        let body = resp.bytes().await?;
        let parsed: FeedResponse = serde_json::from_slice(&body)?;
        Ok(parsed
            .vulnerabilities
            .into_iter()
            .map(|entry| entry.cve)
            .collect())
    }
}

#[derive(Debug, serde::Deserialize)]
struct FeedResponse {
    #[serde(default)]
    vulnerabilities: Vec<FeedEntry>,
}

#[derive(Debug, serde::Deserialize)]
struct FeedEntry {
    cve: RawVulnerability,
}

/// One CVE entry as the NVD 2.0 API returns it (the `cve` object).
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawVulnerability {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub descriptions: Vec<Description>,
    pub published: Option<String>,
    pub last_modified: Option<String>,
    #[serde(default)]
    pub metrics: Metrics,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Description {
    pub lang: String,
    pub value: String,
}

/// CVSS metric blocks. Only v3.1 and v2 are consulted.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    #[serde(default)]
    pub cvss_metric_v31: Vec<MetricEntry>,
    #[serde(default)]
    pub cvss_metric_v2: Vec<MetricEntry>,
}

/// One entry of a CVSS metric block. CVSS v3.1 carries `baseSeverity` inside
/// `cvssData`; CVSS v2 carries it at this level.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricEntry {
    #[serde(default)]
    pub cvss_data: CvssData,
    pub base_severity: Option<String>,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CvssData {
    pub base_score: Option<f64>,
    pub base_severity: Option<String>,
}
