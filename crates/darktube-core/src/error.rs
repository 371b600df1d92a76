//! Error types for DarkTube Core

use thiserror::Error;

/// Result type alias for player operations
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse error taxonomy used to decide how a failure is surfaced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Source or subtitle fetch failed, or no compatible quality exists
    Load,
    /// The media element reported a runtime decode/network fault
    Playback,
    /// Analytics delivery failed
    Delivery,
    /// Invalid configuration
    Config,
}

/// Player error types
#[derive(Error, Debug)]
pub enum Error {
    // Load errors
    #[error("Failed to load video sources for {video_id}: {message}")]
    SourceFetch { video_id: String, message: String },

    #[error("Failed to load subtitles for {video_id} ({language}): {message}")]
    SubtitleFetch {
        video_id: String,
        language: String,
        message: String,
    },

    #[error("No compatible quality found for {video_id}")]
    NoCompatibleQuality { video_id: String },

    #[error("Quality not available: {quality}")]
    UnknownQuality { quality: String },

    // Playback errors
    #[error("{0}")]
    Playback(String),

    // Delivery errors
    #[error("Failed to deliver {count} analytics events: {message}")]
    Delivery { count: usize, message: String },

    // Network errors
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl Error {
    /// Create a playback error
    pub fn playback(msg: impl Into<String>) -> Self {
        Error::Playback(msg.into())
    }

    /// Create a delivery error
    pub fn delivery(count: usize, msg: impl Into<String>) -> Self {
        Error::Delivery {
            count,
            message: msg.into(),
        }
    }

    /// Returns the taxonomy bucket for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::SourceFetch { .. }
            | Error::SubtitleFetch { .. }
            | Error::NoCompatibleQuality { .. }
            | Error::UnknownQuality { .. }
            | Error::Network(_) => ErrorKind::Load,
            Error::Playback(_) => ErrorKind::Playback,
            Error::Delivery { .. } => ErrorKind::Delivery,
            Error::InvalidConfig(_) | Error::InvalidUrl(_) => ErrorKind::Config,
        }
    }

    /// Returns true if the host must replace the controls with an error indicator
    pub fn is_user_visible(&self) -> bool {
        match self {
            Error::UnknownQuality { .. } | Error::SubtitleFetch { .. } => false,
            other => matches!(other.kind(), ErrorKind::Load | ErrorKind::Playback),
        }
    }

    /// Returns the error code for analytics
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::SourceFetch { .. } => "SOURCE_FETCH",
            Error::SubtitleFetch { .. } => "SUBTITLE_FETCH",
            Error::NoCompatibleQuality { .. } => "NO_QUALITY",
            Error::UnknownQuality { .. } => "UNKNOWN_QUALITY",
            Error::Playback(_) => "PLAYBACK",
            Error::Delivery { .. } => "DELIVERY",
            Error::Network(_) => "NETWORK",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::InvalidUrl(_) => "INVALID_URL",
        }
    }
}
