//! Backend API clients
//!
//! Two seams, both injected into the controller as trait objects:
//! - [`VideoApi`]: video sources and subtitle documents
//! - [`AnalyticsTransport`]: batched analytics delivery plus a
//!   fire-and-forget beacon path used on teardown

use crate::{
    analytics::EventBatch,
    types::{ApiConfig, SubtitleDocument, VideoSourceSet},
    Error, Result,
};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

/// Fallback message when a failed response carries no `error.message`
const GENERIC_LOAD_FAILURE: &str = "Failed to load video";

/// Video metadata endpoints
#[async_trait]
pub trait VideoApi: Send + Sync {
    /// Fetch the playable renditions of a video
    async fn fetch_sources(&self, video_id: &str) -> Result<VideoSourceSet>;

    /// Fetch the subtitle document of a video in one language
    async fn fetch_subtitles(&self, video_id: &str, language: &str) -> Result<SubtitleDocument>;
}

/// Analytics delivery
#[async_trait]
pub trait AnalyticsTransport: Send + Sync {
    /// Deliver a batch, resolving once the server has answered
    async fn send(&self, batch: &EventBatch) -> Result<()>;

    /// Deliver a batch without waiting for, or reporting, the outcome
    fn beacon(&self, batch: EventBatch);
}

/// Shared HTTP plumbing: base URL plus a client with a request timeout
#[derive(Debug, Clone)]
struct HttpClient {
    client: Client,
    base_url: Url,
}

impl HttpClient {
    fn new(config: &ApiConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(Error::InvalidConfig(format!(
                "base URL cannot carry paths: {}",
                config.base_url
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self { client, base_url })
    }

    /// Append path segments (percent-encoded) to the base URL
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// GET a JSON document, mapping failures to a display message
    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> std::result::Result<T, String> {
        let response = self.client.get(url).send().await.map_err(|e| e.to_string())?;
        read_json(response).await
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> std::result::Result<T, String> {
    let status = response.status();
    let body = response.text().await.map_err(|e| e.to_string())?;

    if !status.is_success() {
        return Err(error_message(&body).unwrap_or_else(|| {
            format!("{} ({})", GENERIC_LOAD_FAILURE, status.as_u16())
        }));
    }

    serde_json::from_str(&body).map_err(|e| format!("Invalid response: {}", e))
}

/// `error.message` of an error body, if present
fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .pointer("/error/message")
        .and_then(|m| m.as_str())
        .map(str::to_string)
}

/// [`VideoApi`] over the site's REST endpoints
#[derive(Debug, Clone)]
pub struct HttpVideoApi {
    http: HttpClient,
}

impl HttpVideoApi {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new(config)?,
        })
    }

    pub fn sources_url(&self, video_id: &str) -> Url {
        self.http.endpoint(&["api", "videos", video_id, "sources"])
    }

    pub fn subtitles_url(&self, video_id: &str, language: &str) -> Url {
        let mut url = self.http.endpoint(&["api", "videos", video_id, "subtitles"]);
        url.query_pairs_mut().append_pair("lang", language);
        url
    }
}

#[async_trait]
impl VideoApi for HttpVideoApi {
    #[instrument(skip(self))]
    async fn fetch_sources(&self, video_id: &str) -> Result<VideoSourceSet> {
        let url = self.sources_url(video_id);
        debug!(url = %url, "Fetching video sources");

        self.http
            .get_json(url)
            .await
            .map_err(|message| Error::SourceFetch {
                video_id: video_id.to_string(),
                message,
            })
    }

    #[instrument(skip(self))]
    async fn fetch_subtitles(&self, video_id: &str, language: &str) -> Result<SubtitleDocument> {
        let url = self.subtitles_url(video_id, language);
        debug!(url = %url, "Fetching subtitles");

        self.http
            .get_json(url)
            .await
            .map_err(|message| Error::SubtitleFetch {
                video_id: video_id.to_string(),
                language: language.to_string(),
                message,
            })
    }
}

/// [`AnalyticsTransport`] posting to `/api/analytics/events`
#[derive(Debug, Clone)]
pub struct HttpAnalyticsTransport {
    http: HttpClient,
}

impl HttpAnalyticsTransport {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new(config)?,
        })
    }

    pub fn events_url(&self) -> Url {
        self.http.endpoint(&["api", "analytics", "events"])
    }
}

#[async_trait]
impl AnalyticsTransport for HttpAnalyticsTransport {
    async fn send(&self, batch: &EventBatch) -> Result<()> {
        let count = batch.len();
        self.http
            .client
            .post(self.events_url())
            .json(batch)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| Error::delivery(count, e.to_string()))?;

        debug!(count, "Analytics batch delivered");
        Ok(())
    }

    fn beacon(&self, batch: EventBatch) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(count = batch.len(), "No runtime for analytics beacon, events dropped");
            return;
        };

        let transport = self.clone();
        runtime.spawn(async move {
            if let Err(e) = transport.send(&batch).await {
                debug!(error = %e, "Analytics beacon failed");
            }
        });
    }
}
