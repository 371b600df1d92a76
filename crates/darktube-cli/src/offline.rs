//! Offline backends for running the player without a server

use anyhow::Context;
use async_trait::async_trait;
use darktube_core::analytics::EventBatch;
use darktube_core::{
    AnalyticsTransport, Error, Result, SubtitleDocument, SubtitleFormat, VideoApi, VideoSourceSet,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

/// Serves a source set read from disk for any video id
pub struct FileVideoApi {
    sources: VideoSourceSet,
    subtitles: HashMap<String, SubtitleDocument>,
}

impl FileVideoApi {
    /// Read a `{"sources": {...}, "thumbnails": [...]}` file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading sources {}", path.display()))?;
        let sources: VideoSourceSet = serde_json::from_str(&raw)
            .with_context(|| format!("parsing sources {}", path.display()))?;
        Ok(Self {
            sources,
            subtitles: HashMap::new(),
        })
    }

    /// Serve `<dir>/<language>.vtt` or `.srt` when it exists
    pub fn with_subtitles_from(mut self, dir: &Path, language: &str) -> Self {
        for format in [SubtitleFormat::Vtt, SubtitleFormat::Srt] {
            let path = dir.join(format!("{}.{}", language, format));
            if let Ok(content) = std::fs::read_to_string(&path) {
                self.subtitles
                    .insert(language.to_string(), SubtitleDocument { content, format });
                break;
            }
        }
        self
    }
}

#[async_trait]
impl VideoApi for FileVideoApi {
    async fn fetch_sources(&self, _video_id: &str) -> Result<VideoSourceSet> {
        Ok(self.sources.clone())
    }

    async fn fetch_subtitles(&self, video_id: &str, language: &str) -> Result<SubtitleDocument> {
        self.subtitles
            .get(language)
            .cloned()
            .ok_or_else(|| Error::SubtitleFetch {
                video_id: video_id.to_string(),
                language: language.to_string(),
                message: "No subtitle file".to_string(),
            })
    }
}

/// Logs analytics batches instead of posting them
#[derive(Default)]
pub struct LoggingTransport {
    delivered: AtomicUsize,
}

impl LoggingTransport {
    /// Number of events seen so far, beacons included
    pub fn delivered(&self) -> usize {
        self.delivered.load(Ordering::SeqCst)
    }

    fn log(&self, batch: &EventBatch, beacon: bool) {
        for event in &batch.events {
            info!(
                event = %event.event_type,
                beacon,
                data = %serde_json::Value::Object(event.data.clone()),
                "Analytics event"
            );
        }
        self.delivered.fetch_add(batch.len(), Ordering::SeqCst);
    }
}

#[async_trait]
impl AnalyticsTransport for LoggingTransport {
    async fn send(&self, batch: &EventBatch) -> Result<()> {
        self.log(batch, false);
        Ok(())
    }

    fn beacon(&self, batch: EventBatch) {
        self.log(&batch, true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_logging_transport_counts() {
        let transport = LoggingTransport::default();
        let batch: EventBatch = serde_json::from_value(serde_json::json!({
            "events": [{
                "type": "video_view",
                "videoId": "v1",
                "sessionId": "00000000-0000-0000-0000-000000000000",
                "timestamp": "2026-01-01T00:00:00Z",
                "data": {}
            }]
        }))
        .unwrap();
        assert_eq!(batch.events[0].data_str("missing"), None);

        transport.send(&batch).await.unwrap();
        transport.beacon(batch);
        assert_eq!(transport.delivered(), 2);
    }

    #[tokio::test]
    async fn test_missing_subtitles() {
        let api = FileVideoApi {
            sources: VideoSourceSet::default(),
            subtitles: HashMap::new(),
        };
        let err = api.fetch_subtitles("v1", "fr").await.unwrap_err();
        assert_eq!(err.error_code(), "SUBTITLE_FETCH");
        assert!(!err.is_user_visible());
    }
}
