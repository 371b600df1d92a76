//! Core types for DarkTube Core

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

/// Quality label meaning "let the player decide"
pub const AUTO_QUALITY: &str = "auto";

/// Qualities tried, in order, after the preferred one
pub const FALLBACK_QUALITIES: [&str; 2] = ["720p", "360p"];

/// Unique identifier correlating all analytics events of one controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Vertical resolution encoded in a quality label ("720p" -> 720, "4K" -> 2160)
pub fn quality_height(label: &str) -> Option<u32> {
    if label.eq_ignore_ascii_case("4k") {
        return Some(2160);
    }
    label.strip_suffix('p')?.parse().ok()
}

/// Playable renditions of one video, as returned by the sources endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoSourceSet {
    /// Quality label -> media URL
    pub sources: BTreeMap<String, String>,
    /// Preview thumbnails spread evenly over the timeline
    #[serde(default)]
    pub thumbnails: Vec<String>,
}

impl VideoSourceSet {
    /// Media URL for a quality label
    pub fn get(&self, quality: &str) -> Option<&str> {
        self.sources.get(quality).map(String::as_str)
    }

    pub fn contains(&self, quality: &str) -> bool {
        self.sources.contains_key(quality)
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Available quality labels, highest resolution first
    pub fn qualities(&self) -> Vec<&str> {
        let mut labels: Vec<&str> = self.sources.keys().map(String::as_str).collect();
        labels.sort_by(|a, b| quality_height(b).cmp(&quality_height(a)));
        labels
    }

    /// Pick the source to play: the preferred quality, then 720p, then 360p
    pub fn select(&self, preferred: &str) -> Option<(&str, &str)> {
        std::iter::once(preferred)
            .chain(FALLBACK_QUALITIES)
            .find_map(|quality| {
                self.sources
                    .get_key_value(quality)
                    .map(|(label, url)| (label.as_str(), url.as_str()))
            })
    }

    /// Thumbnail to show when hovering `time` on the progress bar
    pub fn preview_thumbnail(&self, time: f64, duration: f64) -> Option<&str> {
        if self.thumbnails.is_empty() || duration <= 0.0 {
            return None;
        }
        let count = self.thumbnails.len();
        let index = ((time / duration) * count as f64).floor().max(0.0) as usize;
        self.thumbnails.get(index.min(count - 1)).map(String::as_str)
    }
}

/// Observable playback state owned by the player controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    pub is_playing: bool,
    /// Playback position in seconds
    pub current_time: f64,
    /// Media duration in seconds (0 until metadata is loaded)
    pub duration: f64,
    /// Volume in [0, 1]
    pub volume: f64,
    pub muted: bool,
    /// Active quality label, or "auto"
    pub quality: String,
    pub subtitles_enabled: bool,
    pub cinema_mode: bool,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self {
            is_playing: false,
            current_time: 0.0,
            duration: 0.0,
            volume: 1.0,
            muted: false,
            quality: AUTO_QUALITY.to_string(),
            subtitles_enabled: false,
            cinema_mode: false,
            is_loading: false,
            error: None,
        }
    }
}

impl PlayerState {
    /// Playback progress in [0, 100], 0 when duration is unknown
    pub fn progress_percent(&self) -> f64 {
        if self.duration > 0.0 {
            (self.current_time / self.duration * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        }
    }

    /// Check the state invariants
    pub fn is_consistent(&self) -> bool {
        let time_in_range = self.duration <= 0.0
            || (0.0..=self.duration).contains(&self.current_time);
        let loading_ok = !self.is_loading || self.error.is_none();
        let playing_ok = !self.is_playing || !self.is_loading;
        let volume_ok = (0.0..=1.0).contains(&self.volume);
        time_in_range && loading_ok && playing_ok && volume_ok
    }
}

/// One timed subtitle cue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleSegment {
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    pub text: String,
}

impl SubtitleSegment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }

    /// Both bounds are inclusive
    pub fn is_active_at(&self, time: f64) -> bool {
        time >= self.start && time <= self.end
    }
}

/// Subtitle file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubtitleFormat {
    Vtt,
    Srt,
}

impl SubtitleFormat {
    /// Guess the format from a file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "vtt" => Some(SubtitleFormat::Vtt),
            "srt" => Some(SubtitleFormat::Srt),
            _ => None,
        }
    }
}

impl std::fmt::Display for SubtitleFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubtitleFormat::Vtt => write!(f, "vtt"),
            SubtitleFormat::Srt => write!(f, "srt"),
        }
    }
}

/// Subtitle document as returned by the subtitles endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleDocument {
    pub content: String,
    pub format: SubtitleFormat,
}

/// Player configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Start playback as soon as metadata is loaded
    pub autoplay: bool,
    /// Quality requested when the caller does not name one
    pub preferred_quality: String,
    /// Subtitle language loaded when subtitles are enabled
    pub subtitle_language: String,
    /// Seek distance for arrow keys (seconds)
    pub seek_step: f64,
    /// Volume change for arrow keys
    pub volume_step: f64,
    /// Pointer inactivity before controls hide (milliseconds)
    pub controls_hide_delay_ms: u64,
    /// Enable analytics
    pub analytics_enabled: bool,
    /// Analytics batching settings
    pub analytics: AnalyticsConfig,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            autoplay: false,
            preferred_quality: AUTO_QUALITY.to_string(),
            subtitle_language: "en".to_string(),
            seek_step: 10.0,
            volume_step: 0.1,
            controls_hide_delay_ms: 3000,
            analytics_enabled: true,
            analytics: AnalyticsConfig::default(),
        }
    }
}

impl PlayerConfig {
    pub fn controls_hide_delay(&self) -> Duration {
        Duration::from_millis(self.controls_hide_delay_ms)
    }

    /// Reject settings the player cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(self.seek_step.is_finite() && self.seek_step > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "seek_step must be a positive number, got {}",
                self.seek_step
            )));
        }
        self.analytics.validate()
    }
}

/// Analytics batching configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Quiet period after the last enqueue before a flush (milliseconds)
    pub debounce_ms: u64,
    /// Forced flush interval (milliseconds)
    pub flush_interval_ms: u64,
    /// Queue length that triggers an immediate flush
    pub max_queue_size: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 5_000,
            flush_interval_ms: 30_000,
            max_queue_size: 50,
        }
    }
}

impl AnalyticsConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Never zero, so the periodic timer always has a valid period
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms.max(1))
    }

    pub fn validate(&self) -> Result<()> {
        if self.flush_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "analytics.flush_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// HTTP API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL the `/api/...` paths are resolved against
    pub base_url: String,
    /// Request timeout in milliseconds
    pub request_timeout_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            request_timeout_ms: 10_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sources(labels: &[&str]) -> VideoSourceSet {
        VideoSourceSet {
            sources: labels
                .iter()
                .map(|l| (l.to_string(), format!("https://cdn.example.com/{}.mp4", l)))
                .collect(),
            thumbnails: Vec::new(),
        }
    }

    #[test]
    fn test_select_preferred() {
        let set = sources(&["360p", "720p", "1080p"]);
        assert_eq!(set.select("1080p").map(|s| s.0), Some("1080p"));
    }

    #[test]
    fn test_select_falls_back_in_order() {
        let set = sources(&["360p", "720p"]);
        assert_eq!(set.select("1080p").map(|s| s.0), Some("720p"));
        assert_eq!(set.select("auto").map(|s| s.0), Some("720p"));

        let set = sources(&["360p", "144p"]);
        assert_eq!(set.select("1080p").map(|s| s.0), Some("360p"));

        let set = sources(&["144p"]);
        assert!(set.select("1080p").is_none());
    }

    #[test]
    fn test_qualities_sorted_by_height() {
        let set = sources(&["360p", "1080p", "720p", "4K"]);
        assert_eq!(set.qualities(), vec!["4K", "1080p", "720p", "360p"]);
    }

    #[test]
    fn test_preview_thumbnail() {
        let mut set = sources(&["720p"]);
        assert!(set.preview_thumbnail(10.0, 100.0).is_none());

        set.thumbnails = vec!["a".into(), "b".into(), "c".into(), "d".into()];
        assert_eq!(set.preview_thumbnail(0.0, 100.0), Some("a"));
        assert_eq!(set.preview_thumbnail(30.0, 100.0), Some("b"));
        assert_eq!(set.preview_thumbnail(100.0, 100.0), Some("d"));
        assert!(set.preview_thumbnail(50.0, 0.0).is_none());
    }

    #[test]
    fn test_sources_json_shape() {
        let json = r#"{"sources":{"720p":"https://cdn/720.mp4"},"thumbnails":["t0.jpg"]}"#;
        let set: VideoSourceSet = serde_json::from_str(json).unwrap();
        assert_eq!(set.get("720p"), Some("https://cdn/720.mp4"));
        assert_eq!(set.thumbnails.len(), 1);

        let without_thumbs: VideoSourceSet =
            serde_json::from_str(r#"{"sources":{}}"#).unwrap();
        assert!(without_thumbs.thumbnails.is_empty());
    }

    #[test]
    fn test_player_state_defaults() {
        let state = PlayerState::default();
        assert_eq!(state.volume, 1.0);
        assert_eq!(state.quality, AUTO_QUALITY);
        assert!(state.is_consistent());
        assert_eq!(state.progress_percent(), 0.0);
    }

    #[test]
    fn test_subtitle_format_serde() {
        let doc: SubtitleDocument =
            serde_json::from_str(r#"{"content":"WEBVTT","format":"vtt"}"#).unwrap();
        assert_eq!(doc.format, SubtitleFormat::Vtt);
        assert_eq!(SubtitleFormat::from_extension("SRT"), Some(SubtitleFormat::Srt));
    }

    #[test]
    fn test_config_partial_json() {
        let config: PlayerConfig =
            serde_json::from_str(r#"{"autoplay":true,"analytics":{"debounce_ms":100}}"#).unwrap();
        assert!(config.autoplay);
        assert_eq!(config.seek_step, 10.0);
        assert_eq!(config.analytics.debounce(), Duration::from_millis(100));
        assert_eq!(config.analytics.flush_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_config_validation() {
        assert!(PlayerConfig::default().validate().is_ok());

        let config: PlayerConfig =
            serde_json::from_str(r#"{"analytics":{"flush_interval_ms":0}}"#).unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
        assert_eq!(config.analytics.flush_interval(), Duration::from_millis(1));

        let config = PlayerConfig {
            seek_step: -1.0,
            ..Default::default()
        };
        assert_eq!(config.validate().unwrap_err().error_code(), "INVALID_CONFIG");
    }
}
