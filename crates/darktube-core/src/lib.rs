//! DarkTube Core - Video Player Library for DarkTube
//!
//! This crate provides the core of the DarkTube watch page:
//! - Player state controller (loading, quality fallback, commands)
//! - Analytics event pipeline with batching and beacon delivery
//! - WebVTT / SRT subtitle parsing
//! - Keyboard shortcuts and control-bar auto-hide
//! - Display formatting helpers
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        DarkTube Core                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐           │
//! │  │   VideoApi   │  │  Subtitles   │  │   Controls   │           │
//! │  │   (HTTP)     │  │   Parser     │  │  (keyboard)  │           │
//! │  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘           │
//! │         │                 │                 │                   │
//! │         └─────────────────┼─────────────────┘                   │
//! │                           │                                     │
//! │                    ┌──────┴──────┐        ┌──────────────┐      │
//! │                    │   Player    │───────▶│    Media     │      │
//! │                    │ Controller  │        │   Element    │      │
//! │                    └──────┬──────┘        └──────────────┘      │
//! │                           │                                     │
//! │  ┌──────────────┐  ┌──────┴──────┐  ┌──────────────┐            │
//! │  │    State     │  │  Analytics  │  │  Analytics   │            │
//! │  │    Watch     │  │  Pipeline   │──│  Transport   │            │
//! │  └──────────────┘  └─────────────┘  └──────────────┘            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod types;
pub mod api;
pub mod media;
pub mod subtitles;
pub mod analytics;
pub mod controls;
pub mod controller;
pub mod format;

pub use error::{Error, ErrorKind, Result};
pub use types::*;
pub use api::{AnalyticsTransport, HttpAnalyticsTransport, HttpVideoApi, VideoApi};
pub use media::{MediaElement, MediaEvent, SimulatedMediaElement};
pub use subtitles::{parse_subtitles, to_srt, to_webvtt, SrtParser, SubtitleTrack, WebVttParser};
pub use analytics::{
    AnalyticsEvent, AnalyticsPipeline, ClientContext, ClientContextSource, EventBatch, EventType,
    FlushOutcome, PageAnalytics, ProgressTracker,
};
pub use controls::{ControlsVisibility, KeyCommand};
pub use controller::{LoadStatus, LoadTicket, PlayerCallbacks, PlayerController, PlayerServices};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the player library with default configuration
pub fn init() {
    tracing::info!(version = VERSION, "DarkTube Core initialized");
}
