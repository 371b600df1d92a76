//! Player controller - single owner of playback state
//!
//! Coordinates:
//! - Source loading with quality fallback and supersession
//! - Media element commands and callbacks
//! - Subtitle loading and cue lookup
//! - Keyboard shortcuts and control-bar visibility
//! - Analytics tracking for every user-visible transition
//!
//! The controller runs on a single-threaded cooperative model: every operation
//! takes `&mut self` and runs to completion. Loading is split into
//! [`begin_load`](PlayerController::begin_load),
//! [`fetch_load`](PlayerController::fetch_load) and
//! [`apply_load`](PlayerController::apply_load) so a host can fetch without
//! holding the controller and still have superseded results discarded.

use crate::{
    analytics::{AnalyticsPipeline, ClientContext, ClientContextSource},
    api::{AnalyticsTransport, VideoApi},
    controls::{ControlsVisibility, KeyCommand},
    media::{MediaElement, MediaEvent},
    subtitles::SubtitleTrack,
    types::*,
    Error, Result,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

/// State error shown for any media element failure
pub const PLAYBACK_ERROR_MESSAGE: &str = "Video playback error";

/// Volume restored when unmuting from zero
const UNMUTE_VOLUME: f64 = 0.5;

/// Backend services the controller depends on
#[derive(Clone)]
pub struct PlayerServices {
    pub api: Arc<dyn VideoApi>,
    pub transport: Arc<dyn AnalyticsTransport>,
    pub context: Arc<dyn ClientContextSource>,
}

impl PlayerServices {
    pub fn new(api: Arc<dyn VideoApi>, transport: Arc<dyn AnalyticsTransport>) -> Self {
        Self {
            api,
            transport,
            context: Arc::new(ClientContext::default()),
        }
    }

    pub fn with_context(mut self, context: Arc<dyn ClientContextSource>) -> Self {
        self.context = context;
        self
    }
}

/// Host notifications
#[derive(Default)]
pub struct PlayerCallbacks {
    pub on_error: Option<Box<dyn Fn(&Error) + Send + Sync>>,
    pub on_time_update: Option<Box<dyn Fn(f64) + Send + Sync>>,
    pub on_ended: Option<Box<dyn Fn() + Send + Sync>>,
}

/// Identifies one load attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    video_id: String,
    generation: u64,
    preferred_quality: String,
}

impl LoadTicket {
    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn preferred_quality(&self) -> &str {
        &self.preferred_quality
    }
}

/// Result of applying a fetched source set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    /// The media element now points at this quality
    Ready { quality: String },
    /// A newer load superseded this one; nothing changed
    Stale,
}

/// Player controller
pub struct PlayerController {
    /// Correlates analytics across every video this controller plays
    session_id: SessionId,
    config: PlayerConfig,
    services: PlayerServices,
    media: Box<dyn MediaElement>,
    callbacks: PlayerCallbacks,
    state: PlayerState,
    state_tx: watch::Sender<PlayerState>,
    /// Current target video
    video_id: Option<String>,
    load_generation: u64,
    sources: Option<VideoSourceSet>,
    /// Start offset applied on the first metadata of a load
    pending_start: Option<f64>,
    autoplay_pending: bool,
    subtitle_language: String,
    subtitle_tracks: HashMap<(String, String), SubtitleTrack>,
    active_subtitle: Option<String>,
    controls: ControlsVisibility,
    analytics: Option<AnalyticsPipeline>,
}

impl PlayerController {
    pub fn new(config: PlayerConfig, services: PlayerServices, media: Box<dyn MediaElement>) -> Self {
        let state = PlayerState {
            quality: config.preferred_quality.clone(),
            ..Default::default()
        };
        let (state_tx, _) = watch::channel(state.clone());

        Self {
            session_id: SessionId::new(),
            subtitle_language: config.subtitle_language.clone(),
            controls: ControlsVisibility::new(config.controls_hide_delay()),
            config,
            services,
            media,
            callbacks: PlayerCallbacks::default(),
            state,
            state_tx,
            video_id: None,
            load_generation: 0,
            sources: None,
            pending_start: None,
            autoplay_pending: false,
            subtitle_tracks: HashMap::new(),
            active_subtitle: None,
            analytics: None,
        }
    }

    pub fn with_callbacks(mut self, callbacks: PlayerCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn state(&self) -> &PlayerState {
        &self.state
    }

    /// Subscribe to state snapshots
    pub fn subscribe_state(&self) -> watch::Receiver<PlayerState> {
        self.state_tx.subscribe()
    }

    pub fn video_id(&self) -> Option<&str> {
        self.video_id.as_deref()
    }

    pub fn sources(&self) -> Option<&VideoSourceSet> {
        self.sources.as_ref()
    }

    /// Quality labels of the loaded video, highest first
    pub fn available_qualities(&self) -> Vec<&str> {
        self.sources.as_ref().map(|s| s.qualities()).unwrap_or_default()
    }

    pub fn analytics(&self) -> Option<&AnalyticsPipeline> {
        self.analytics.as_ref()
    }

    /// Video API handle for [`fetch_load`](Self::fetch_load)
    pub fn api(&self) -> Arc<dyn VideoApi> {
        Arc::clone(&self.services.api)
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.state.clone());
    }

    /// A source is attached and the player is not in an error state
    fn has_media(&self) -> bool {
        self.sources.is_some() && self.state.error.is_none()
    }

    fn is_ready(&self) -> bool {
        self.has_media() && !self.state.is_loading
    }

    fn clamp_time(&self, time: f64) -> f64 {
        if self.state.duration > 0.0 {
            time.clamp(0.0, self.state.duration)
        } else {
            time.max(0.0)
        }
    }

    async fn track_interaction(&self, kind: &str, data: Value) {
        if let Some(analytics) = &self.analytics {
            analytics.track_interaction(kind, data).await;
        }
    }

    /// Record an engagement (like, share, subscribe...) for the current video
    pub async fn track_engagement(&self, kind: &str, data: Value) {
        if let Some(analytics) = &self.analytics {
            analytics.track_engagement(kind, data).await;
        }
    }

    // ------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------

    /// Fetch and attach the sources of a video in one step
    pub async fn load_video(
        &mut self,
        video_id: &str,
        preferred_quality: Option<&str>,
        start_time: f64,
    ) -> Result<LoadStatus> {
        let ticket = self.begin_load(video_id, preferred_quality, start_time).await;
        let result = Self::fetch_load(self.services.api.as_ref(), &ticket).await;
        self.apply_load(ticket, result).await
    }

    /// Retarget the controller and reset playback state for a new load
    #[instrument(skip(self))]
    pub async fn begin_load(
        &mut self,
        video_id: &str,
        preferred_quality: Option<&str>,
        start_time: f64,
    ) -> LoadTicket {
        self.load_generation += 1;

        if self.video_id.as_deref() != Some(video_id) {
            self.retarget(video_id).await;
        }

        let preferred_quality = preferred_quality
            .unwrap_or(&self.config.preferred_quality)
            .to_string();

        self.media.pause();
        self.sources = None;
        self.active_subtitle = None;
        self.pending_start = (start_time.is_finite() && start_time > 0.0).then_some(start_time);
        self.autoplay_pending = self.config.autoplay;
        self.state = PlayerState {
            volume: self.state.volume,
            muted: self.state.muted,
            subtitles_enabled: self.state.subtitles_enabled,
            cinema_mode: self.state.cinema_mode,
            quality: preferred_quality.clone(),
            is_loading: true,
            ..Default::default()
        };
        self.controls.playback_stopped();
        self.publish();

        info!(video_id, generation = self.load_generation, "Loading video");

        LoadTicket {
            video_id: video_id.to_string(),
            generation: self.load_generation,
            preferred_quality,
        }
    }

    /// Fetch the source set for a ticket; borrows nothing from the controller
    pub async fn fetch_load(api: &dyn VideoApi, ticket: &LoadTicket) -> Result<VideoSourceSet> {
        api.fetch_sources(&ticket.video_id).await
    }

    /// Attach a fetched source set, unless a newer load superseded the ticket
    #[instrument(skip(self, result), fields(video_id = %ticket.video_id, generation = ticket.generation))]
    pub async fn apply_load(
        &mut self,
        ticket: LoadTicket,
        result: Result<VideoSourceSet>,
    ) -> Result<LoadStatus> {
        let current = self.video_id.as_deref() == Some(ticket.video_id.as_str())
            && self.load_generation == ticket.generation;
        if !current {
            debug!("Discarding stale load result");
            return Ok(LoadStatus::Stale);
        }

        let sources = match result {
            Ok(sources) => sources,
            Err(e) => return Err(self.fail(e, "load_error").await),
        };

        let (quality, url) = match sources.select(&ticket.preferred_quality) {
            Some((quality, url)) => (quality.to_string(), url.to_string()),
            None => {
                let err = Error::NoCompatibleQuality {
                    video_id: ticket.video_id.clone(),
                };
                return Err(self.fail(err, "load_error").await);
            }
        };

        if quality != ticket.preferred_quality {
            debug!(requested = %ticket.preferred_quality, selected = %quality, "Preferred quality unavailable");
        }

        self.media.set_source(&url);
        self.media.set_volume(self.state.volume);
        self.media.set_muted(self.state.muted);
        self.sources = Some(sources);
        self.state.quality = quality.clone();
        self.publish();

        info!(quality = %quality, "Video source attached");
        Ok(LoadStatus::Ready { quality })
    }

    async fn retarget(&mut self, video_id: &str) {
        if let Some(previous) = self.analytics.take() {
            previous.teardown().await;
        }

        self.video_id = Some(video_id.to_string());
        self.analytics = self.config.analytics_enabled.then(|| {
            AnalyticsPipeline::new(
                video_id,
                self.session_id,
                self.config.analytics.clone(),
                Arc::clone(&self.services.transport),
                Arc::clone(&self.services.context),
            )
        });
    }

    /// Enter the error state and report `error` to analytics and the host
    async fn fail(&mut self, error: Error, error_type: &str) -> Error {
        self.state.is_loading = false;
        self.state.is_playing = false;
        self.state.error = Some(error.to_string());
        self.controls.playback_stopped();
        self.publish();

        warn!(error = %error, code = error.error_code(), "Player error");

        if let Some(analytics) = &self.analytics {
            analytics
                .track_error(
                    error_type,
                    json!({
                        "error_message": error.to_string(),
                        "error_code": error.error_code(),
                        "current_time": self.state.current_time,
                    }),
                )
                .await;
        }
        if let Some(on_error) = &self.callbacks.on_error {
            on_error(&error);
        }

        error
    }

    // ------------------------------------------------------------------
    // Media element callbacks
    // ------------------------------------------------------------------

    /// Route a media element notification to its handler
    pub async fn handle_media_event(&mut self, event: MediaEvent) {
        match event {
            MediaEvent::MetadataLoaded { duration } => self.on_metadata_loaded(duration).await,
            MediaEvent::TimeUpdate { time } => self.on_time_update(time).await,
            MediaEvent::Play => self.on_play().await,
            MediaEvent::Pause => self.on_pause().await,
            MediaEvent::Ended => self.on_ended().await,
            MediaEvent::VolumeChange { volume } => self.on_volume_change(volume),
            MediaEvent::Error { detail } => self.on_media_error(&detail).await,
        }
    }

    pub async fn on_metadata_loaded(&mut self, duration: f64) {
        if !self.has_media() {
            debug!("Metadata without an attached source, ignoring");
            return;
        }

        self.state.duration = if duration.is_finite() && duration > 0.0 {
            duration
        } else {
            0.0
        };
        self.state.is_loading = false;

        let target = match self.pending_start.take() {
            Some(start) => Some(self.clamp_time(start)),
            None => {
                let clamped = self.clamp_time(self.state.current_time);
                (clamped != self.state.current_time).then_some(clamped)
            }
        };
        if let Some(target) = target {
            self.media.set_current_time(target);
            self.state.current_time = target;
        }
        self.refresh_subtitle();
        self.publish();

        debug!(duration = self.state.duration, "Metadata loaded");

        if let Some(analytics) = &self.analytics {
            analytics.track_view().await;
        }

        if std::mem::take(&mut self.autoplay_pending) {
            self.play().await;
        }
    }

    pub async fn on_time_update(&mut self, time: f64) {
        if !self.has_media() || time.is_nan() {
            return;
        }

        let time = self.clamp_time(time);
        self.state.current_time = time;
        self.refresh_subtitle();
        self.publish();

        if let Some(on_time_update) = &self.callbacks.on_time_update {
            on_time_update(time);
        }
        if let Some(analytics) = &self.analytics {
            analytics.track_progress(time, self.state.duration).await;
        }
    }

    /// The element started playing on its own
    pub async fn on_play(&mut self) {
        self.set_playing(true).await;
    }

    /// The element paused on its own
    pub async fn on_pause(&mut self) {
        self.set_playing(false).await;
    }

    pub async fn on_ended(&mut self) {
        self.state.is_playing = false;
        self.controls.playback_stopped();
        self.publish();

        self.track_interaction("ended", json!({ "duration": self.state.duration }))
            .await;
        if let Some(on_ended) = &self.callbacks.on_ended {
            on_ended();
        }
    }

    pub fn on_volume_change(&mut self, volume: f64) {
        if volume.is_nan() {
            return;
        }
        self.state.volume = volume.clamp(0.0, 1.0);
        self.state.muted = self.state.volume == 0.0;
        self.publish();
    }

    pub async fn on_media_error(&mut self, detail: &str) {
        error!(detail, "Media element error");
        self.media.pause();
        self.fail(Error::playback(PLAYBACK_ERROR_MESSAGE), "playback_error")
            .await;
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Apply a playing/paused transition, tracking it once
    async fn set_playing(&mut self, playing: bool) -> bool {
        if self.state.is_playing == playing {
            return false;
        }
        if playing && !self.is_ready() {
            return false;
        }

        self.state.is_playing = playing;
        if playing {
            self.controls.playback_started(Instant::now());
        } else {
            self.controls.playback_stopped();
        }
        self.publish();

        let kind = if playing { "play" } else { "pause" };
        self.track_interaction(kind, json!({ "currentTime": self.state.current_time }))
            .await;
        true
    }

    /// Start playback; ignored until the source is ready
    pub async fn play(&mut self) {
        if self.state.is_playing {
            return;
        }
        if !self.is_ready() {
            debug!(is_loading = self.state.is_loading, "Play requested before media is ready");
            return;
        }

        match self.media.play() {
            Ok(()) => {
                self.set_playing(true).await;
            }
            Err(e) => debug!(error = %e, "Media element rejected play"),
        }
    }

    pub async fn pause(&mut self) {
        if !self.state.is_playing {
            return;
        }
        self.media.pause();
        self.set_playing(false).await;
    }

    pub async fn toggle_play(&mut self) {
        if self.state.is_playing {
            self.pause().await;
        } else {
            self.play().await;
        }
    }

    /// Seek, clamped to [0, duration]; ignored until metadata is loaded
    pub async fn seek(&mut self, time: f64) {
        if !self.is_ready() || time.is_nan() {
            return;
        }

        let from = self.state.current_time;
        let to = self.clamp_time(time);
        self.media.set_current_time(to);
        self.state.current_time = to;
        self.refresh_subtitle();
        self.publish();

        debug!(from, to, "Seeking");
        self.track_interaction("seek", json!({ "from": from, "to": to }))
            .await;
    }

    /// Set volume, clamped to [0, 1]; zero means muted
    pub fn set_volume(&mut self, volume: f64) {
        if volume.is_nan() {
            return;
        }
        let volume = volume.clamp(0.0, 1.0);
        let muted = volume == 0.0;

        self.media.set_volume(volume);
        self.media.set_muted(muted);
        self.state.volume = volume;
        self.state.muted = muted;
        self.publish();
    }

    pub fn toggle_mute(&mut self) {
        let volume = if self.state.muted { UNMUTE_VOLUME } else { 0.0 };
        self.set_volume(volume);
    }

    /// Switch rendition, keeping position and play state
    #[instrument(skip(self))]
    pub async fn change_quality(&mut self, quality: &str) -> Result<()> {
        let url = self
            .sources
            .as_ref()
            .and_then(|s| s.get(quality))
            .map(str::to_string)
            .ok_or_else(|| Error::UnknownQuality {
                quality: quality.to_string(),
            })?;

        if self.state.quality == quality {
            return Ok(());
        }

        let time = self.state.current_time;
        self.media.set_source(&url);
        self.media.set_current_time(time);
        if self.state.is_playing {
            if let Err(e) = self.media.play() {
                warn!(error = %e, "Resuming after quality change failed");
            }
        }

        self.state.quality = quality.to_string();
        self.publish();

        info!(quality, position = time, "Quality changed");
        self.track_interaction("quality_change", json!({ "quality": quality }))
            .await;
        Ok(())
    }

    pub async fn toggle_subtitles(&mut self) -> bool {
        self.state.subtitles_enabled = !self.state.subtitles_enabled;
        let enabled = self.state.subtitles_enabled;
        self.refresh_subtitle();
        self.publish();

        self.track_interaction("subtitles_toggle", json!({ "enabled": enabled }))
            .await;
        enabled
    }

    pub async fn toggle_cinema_mode(&mut self) -> bool {
        self.state.cinema_mode = !self.state.cinema_mode;
        let enabled = self.state.cinema_mode;
        self.publish();

        self.track_interaction("cinema_mode", json!({ "enabled": enabled }))
            .await;
        enabled
    }

    pub fn toggle_fullscreen(&mut self) {
        let target = !self.media.is_fullscreen();
        if let Err(e) = self.media.set_fullscreen(target) {
            warn!(error = %e, "Fullscreen request refused");
        }
    }

    pub fn is_fullscreen(&self) -> bool {
        self.media.is_fullscreen()
    }

    // ------------------------------------------------------------------
    // Subtitles
    // ------------------------------------------------------------------

    /// Load and select the subtitle track for `language`
    ///
    /// Each (video, language) pair is fetched once. Failures are returned
    /// but never put the player into an error state.
    pub async fn load_subtitles(&mut self, language: &str) -> Result<usize> {
        let Some(video_id) = self.video_id.clone() else {
            return Err(Error::SubtitleFetch {
                video_id: String::new(),
                language: language.to_string(),
                message: "No video loaded".to_string(),
            });
        };

        let key = (video_id, language.to_string());
        if !self.subtitle_tracks.contains_key(&key) {
            let document = self
                .services
                .api
                .fetch_subtitles(&key.0, language)
                .await
                .inspect_err(|e| warn!(error = %e, "Subtitle load failed"))?;

            let track = SubtitleTrack::from_document(language, &document);
            debug!(language, cues = track.len(), "Subtitles loaded");
            self.subtitle_tracks.insert(key.clone(), track);
        }

        self.subtitle_language = language.to_string();
        self.refresh_subtitle();
        Ok(self.subtitle_tracks.get(&key).map_or(0, SubtitleTrack::len))
    }

    pub fn subtitle_language(&self) -> &str {
        &self.subtitle_language
    }

    /// Cue text to render now, if subtitles are enabled
    pub fn active_subtitle(&self) -> Option<&str> {
        self.active_subtitle.as_deref()
    }

    fn refresh_subtitle(&mut self) {
        self.active_subtitle = if self.state.subtitles_enabled {
            self.video_id.as_ref().and_then(|video_id| {
                self.subtitle_tracks
                    .get(&(video_id.clone(), self.subtitle_language.clone()))
                    .and_then(|track| track.active_at(self.state.current_time))
                    .map(|segment| segment.text.clone())
            })
        } else {
            None
        };
    }

    // ------------------------------------------------------------------
    // Input and chrome
    // ------------------------------------------------------------------

    /// Handle a key press; returns true if the key was consumed
    pub async fn handle_key(&mut self, code: &str) -> bool {
        let Some(command) = KeyCommand::from_code(code) else {
            return false;
        };
        if !self.has_media() {
            debug!(code, "Key ignored, no media loaded");
            return false;
        }

        self.execute(command).await;
        true
    }

    pub async fn execute(&mut self, command: KeyCommand) {
        match command {
            KeyCommand::TogglePlay => self.toggle_play().await,
            KeyCommand::SeekBackward => {
                let target = self.state.current_time - self.config.seek_step;
                self.seek(target).await;
            }
            KeyCommand::SeekForward => {
                let target = self.state.current_time + self.config.seek_step;
                self.seek(target).await;
            }
            KeyCommand::VolumeUp => {
                let target = round_volume(self.state.volume + self.config.volume_step);
                self.set_volume(target);
            }
            KeyCommand::VolumeDown => {
                let target = round_volume(self.state.volume - self.config.volume_step);
                self.set_volume(target);
            }
            KeyCommand::ToggleFullscreen => self.toggle_fullscreen(),
            KeyCommand::ToggleSubtitles => {
                self.toggle_subtitles().await;
            }
            KeyCommand::ToggleCinemaMode => {
                self.toggle_cinema_mode().await;
            }
        }
    }

    pub fn controls_visible(&self) -> bool {
        self.controls.is_visible()
    }

    pub fn pointer_moved(&mut self, now: Instant) {
        self.controls.pointer_moved(now);
    }

    pub fn pointer_left(&mut self) {
        self.controls.pointer_left();
    }

    /// Drive the control-bar hide timer; true if the controls just hid
    pub fn tick_controls(&mut self, now: Instant) -> bool {
        self.controls.tick(now)
    }

    /// Thumbnail for a progress-bar hover position
    pub fn preview_thumbnail(&self, time: f64) -> Option<&str> {
        self.sources
            .as_ref()
            .and_then(|s| s.preview_thumbnail(time, self.state.duration))
    }

    /// Stop playback and tear down analytics
    pub async fn unmount(&mut self) {
        self.media.pause();
        if self.state.is_playing {
            self.state.is_playing = false;
            self.publish();
        }
        if let Some(analytics) = self.analytics.take() {
            analytics.teardown().await;
        }
        info!(session_id = %self.session_id, "Player unmounted");
    }
}

/// Keep keyboard volume steps on a 0.01 grid
fn round_volume(volume: f64) -> f64 {
    (volume * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::{AnalyticsEvent, EventBatch, EventType};
    use crate::media::SimulatedMediaElement;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct MockApi {
        sources: HashMap<String, VideoSourceSet>,
        subtitles: HashMap<(String, String), SubtitleDocument>,
        subtitle_calls: AtomicUsize,
    }

    impl MockApi {
        fn with_video(mut self, video_id: &str, qualities: &[&str]) -> Self {
            let sources = qualities
                .iter()
                .map(|q| (q.to_string(), format!("https://cdn.example.com/{}/{}.mp4", video_id, q)))
                .collect();
            self.sources.insert(
                video_id.to_string(),
                VideoSourceSet {
                    sources,
                    thumbnails: vec!["t0.jpg".into(), "t1.jpg".into()],
                },
            );
            self
        }

        fn with_subtitles(mut self, video_id: &str, language: &str, content: &str) -> Self {
            self.subtitles.insert(
                (video_id.to_string(), language.to_string()),
                SubtitleDocument {
                    content: content.to_string(),
                    format: SubtitleFormat::Vtt,
                },
            );
            self
        }
    }

    #[async_trait]
    impl VideoApi for MockApi {
        async fn fetch_sources(&self, video_id: &str) -> Result<VideoSourceSet> {
            self.sources.get(video_id).cloned().ok_or_else(|| Error::SourceFetch {
                video_id: video_id.to_string(),
                message: "Video not found".to_string(),
            })
        }

        async fn fetch_subtitles(&self, video_id: &str, language: &str) -> Result<SubtitleDocument> {
            self.subtitle_calls.fetch_add(1, Ordering::SeqCst);
            self.subtitles
                .get(&(video_id.to_string(), language.to_string()))
                .cloned()
                .ok_or_else(|| Error::SubtitleFetch {
                    video_id: video_id.to_string(),
                    language: language.to_string(),
                    message: "Subtitles not found".to_string(),
                })
        }
    }

    #[derive(Default)]
    struct NullTransport {
        beacons: Mutex<Vec<EventBatch>>,
    }

    #[async_trait]
    impl AnalyticsTransport for NullTransport {
        async fn send(&self, _batch: &EventBatch) -> Result<()> {
            Ok(())
        }

        fn beacon(&self, batch: EventBatch) {
            self.beacons.lock().unwrap().push(batch);
        }
    }

    struct Harness {
        controller: PlayerController,
        media: SimulatedMediaElement,
        api: Arc<MockApi>,
        transport: Arc<NullTransport>,
    }

    impl Harness {
        fn new(api: MockApi, config: PlayerConfig) -> Self {
            let api = Arc::new(api);
            let transport = Arc::new(NullTransport::default());
            let media = SimulatedMediaElement::new(120.0);
            let services = PlayerServices::new(api.clone(), transport.clone());
            let controller = PlayerController::new(config, services, Box::new(media.clone()));
            Self {
                controller,
                media,
                api,
                transport,
            }
        }

        async fn tick(&mut self, dt: f64) {
            for event in self.media.tick(dt) {
                self.controller.handle_media_event(event).await;
            }
        }

        async fn events(&self) -> Vec<AnalyticsEvent> {
            match self.controller.analytics() {
                Some(analytics) => analytics.pending_events().await,
                None => Vec::new(),
            }
        }

        async fn interactions(&self) -> Vec<String> {
            self.events()
                .await
                .iter()
                .filter(|e| e.event_type == EventType::VideoInteraction)
                .filter_map(|e| e.data_str("interaction_type").map(str::to_string))
                .collect()
        }
    }

    async fn ready(qualities: &[&str]) -> Harness {
        let mut h = Harness::new(
            MockApi::default().with_video("v1", qualities),
            PlayerConfig::default(),
        );
        h.controller.load_video("v1", None, 0.0).await.unwrap();
        h.tick(0.0).await;
        h
    }

    #[tokio::test]
    async fn test_load_falls_back_and_applies_start_time() {
        let mut h = Harness::new(
            MockApi::default().with_video("v1", &["360p", "720p"]),
            PlayerConfig::default(),
        );

        let status = h.controller.load_video("v1", Some("1080p"), 30.0).await.unwrap();
        assert_eq!(status, LoadStatus::Ready { quality: "720p".into() });
        assert!(h.controller.state().is_loading);
        assert_eq!(
            h.media.source().as_deref(),
            Some("https://cdn.example.com/v1/720p.mp4")
        );

        h.tick(0.0).await;
        let state = h.controller.state();
        assert!(!state.is_loading);
        assert_eq!(state.duration, 120.0);
        assert_eq!(state.current_time, 30.0);
        assert_eq!(h.media.current_time(), 30.0);
        assert!(state.is_consistent());

        let views = h
            .events()
            .await
            .iter()
            .filter(|e| e.event_type == EventType::VideoView)
            .count();
        assert_eq!(views, 1);
    }

    #[tokio::test]
    async fn test_no_compatible_quality() {
        let errors = Arc::new(AtomicUsize::new(0));
        let seen = errors.clone();
        let mut h = Harness::new(
            MockApi::default().with_video("v1", &["144p"]),
            PlayerConfig::default(),
        );
        h.controller = h.controller.with_callbacks(PlayerCallbacks {
            on_error: Some(Box::new(move |e: &Error| {
                assert!(e.is_user_visible());
                seen.fetch_add(1, Ordering::SeqCst);
            })),
            ..Default::default()
        });

        let err = h.controller.load_video("v1", Some("1080p"), 0.0).await.unwrap_err();
        assert!(matches!(err, Error::NoCompatibleQuality { .. }));

        let state = h.controller.state();
        assert!(!state.is_loading);
        assert!(state.error.is_some());
        assert!(state.is_consistent());
        assert_eq!(errors.load(Ordering::SeqCst), 1);

        let tracked = h.events().await;
        assert_eq!(tracked.last().map(|e| e.event_type), Some(EventType::VideoError));
    }

    #[tokio::test]
    async fn test_source_fetch_failure() {
        let mut h = Harness::new(MockApi::default(), PlayerConfig::default());
        let err = h.controller.load_video("missing", None, 0.0).await.unwrap_err();
        assert!(matches!(err, Error::SourceFetch { .. }));
        assert!(h.controller.state().error.as_deref().unwrap().contains("Video not found"));

        // Nothing to play
        h.controller.play().await;
        assert!(!h.controller.state().is_playing);
    }

    #[tokio::test]
    async fn test_stale_results_are_discarded() {
        let mut h = Harness::new(
            MockApi::default()
                .with_video("v1", &["720p"])
                .with_video("v2", &["720p"]),
            PlayerConfig::default(),
        );
        let api = h.controller.api();

        let first = h.controller.begin_load("v1", None, 0.0).await;
        let first_result = PlayerController::fetch_load(api.as_ref(), &first).await;

        let second = h.controller.begin_load("v2", None, 0.0).await;
        let second_result = PlayerController::fetch_load(api.as_ref(), &second).await;
        assert!(matches!(
            h.controller.apply_load(second, second_result).await,
            Ok(LoadStatus::Ready { .. })
        ));

        assert_eq!(
            h.controller.apply_load(first, first_result).await.unwrap(),
            LoadStatus::Stale
        );
        assert_eq!(h.controller.video_id(), Some("v2"));
        assert_eq!(
            h.media.source().as_deref(),
            Some("https://cdn.example.com/v2/720p.mp4")
        );
    }

    #[tokio::test]
    async fn test_reload_of_same_video_supersedes() {
        let mut h = Harness::new(
            MockApi::default().with_video("v1", &["720p", "360p"]),
            PlayerConfig::default(),
        );
        let api = h.controller.api();

        let old = h.controller.begin_load("v1", Some("360p"), 0.0).await;
        let new = h.controller.begin_load("v1", Some("720p"), 0.0).await;
        let old_result = PlayerController::fetch_load(api.as_ref(), &old).await;

        assert_eq!(
            h.controller.apply_load(old, old_result).await.unwrap(),
            LoadStatus::Stale
        );
        assert!(h.media.source().is_none());

        let new_result = PlayerController::fetch_load(api.as_ref(), &new).await;
        assert_eq!(
            h.controller.apply_load(new, new_result).await.unwrap(),
            LoadStatus::Ready { quality: "720p".into() }
        );
    }

    #[tokio::test]
    async fn test_play_before_ready_is_ignored() {
        let mut h = Harness::new(
            MockApi::default().with_video("v1", &["720p"]),
            PlayerConfig::default(),
        );
        h.controller.load_video("v1", None, 0.0).await.unwrap();

        h.controller.play().await;
        assert!(!h.controller.state().is_playing);
        assert!(!h.media.is_playing());
        assert!(h.interactions().await.is_empty());

        h.tick(0.0).await;
        h.controller.play().await;
        assert!(h.controller.state().is_playing);
        assert!(h.media.is_playing());
    }

    #[tokio::test]
    async fn test_play_pause_tracked_once_per_transition() {
        let mut h = ready(&["720p"]).await;

        h.controller.play().await;
        h.controller.play().await;
        h.controller.on_play().await;
        h.controller.pause().await;
        h.controller.pause().await;
        h.controller.on_pause().await;

        assert_eq!(h.interactions().await, vec!["play", "pause"]);
    }

    #[tokio::test]
    async fn test_autoplay() {
        let config = PlayerConfig {
            autoplay: true,
            ..Default::default()
        };
        let mut h = Harness::new(MockApi::default().with_video("v1", &["720p"]), config);
        h.controller.load_video("v1", None, 0.0).await.unwrap();
        assert!(!h.controller.state().is_playing);

        h.tick(0.0).await;
        assert!(h.controller.state().is_playing);
    }

    #[tokio::test]
    async fn test_seek_clamps() {
        let mut h = ready(&["720p"]).await;

        for t in [0.0, 42.5, 120.0] {
            h.controller.seek(t).await;
            assert_eq!(h.controller.state().current_time, t);
        }

        h.controller.seek(500.0).await;
        assert_eq!(h.controller.state().current_time, 120.0);
        h.controller.seek(-5.0).await;
        assert_eq!(h.controller.state().current_time, 0.0);

        let seeks = h
            .events()
            .await
            .into_iter()
            .filter(|e| e.data_str("interaction_type") == Some("seek"))
            .collect::<Vec<_>>();
        assert_eq!(seeks.len(), 5);
        assert_eq!(seeks[3].data["from"], json!(120.0));
        assert_eq!(seeks[3].data["to"], json!(120.0));
    }

    #[tokio::test]
    async fn test_volume_and_mute() {
        let mut h = ready(&["720p"]).await;

        h.controller.set_volume(1.7);
        assert_eq!(h.controller.state().volume, 1.0);

        h.controller.set_volume(0.0);
        assert!(h.controller.state().muted);
        assert!(h.media.is_muted());

        h.controller.toggle_mute();
        assert_eq!(h.controller.state().volume, 0.5);
        assert!(!h.controller.state().muted);

        h.controller.toggle_mute();
        assert_eq!(h.controller.state().volume, 0.0);
        assert!(h.controller.state().muted);
    }

    #[tokio::test]
    async fn test_change_quality_preserves_position_and_playing() {
        let mut h = ready(&["1080p", "720p"]).await;
        assert_eq!(h.controller.state().quality, "720p");

        // Re-selecting the active quality is a no-op
        h.controller.change_quality("720p").await.unwrap();

        h.controller.play().await;
        h.controller.seek(47.0).await;
        h.controller.change_quality("1080p").await.unwrap();

        let state = h.controller.state();
        assert_eq!(state.quality, "1080p");
        assert_eq!(state.current_time, 47.0);
        assert!(state.is_playing);
        assert!(state.is_consistent());
        assert_eq!(h.media.current_time(), 47.0);
        assert!(h.media.is_playing());
        assert_eq!(
            h.media.source().as_deref(),
            Some("https://cdn.example.com/v1/1080p.mp4")
        );

        let changes: Vec<_> = h
            .events()
            .await
            .into_iter()
            .filter(|e| e.data_str("interaction_type") == Some("quality_change"))
            .map(|e| e.data_str("quality").unwrap_or_default().to_string())
            .collect();
        assert_eq!(changes, vec!["1080p"]);
    }

    #[tokio::test]
    async fn test_unknown_quality_leaves_state_unchanged() {
        let mut h = ready(&["720p"]).await;
        let before = h.controller.state().clone();

        let err = h.controller.change_quality("4K").await.unwrap_err();
        assert!(matches!(err, Error::UnknownQuality { .. }));
        assert!(!err.is_user_visible());
        assert_eq!(h.controller.state(), &before);
    }

    #[tokio::test]
    async fn test_toggles_track_new_state() {
        let mut h = ready(&["720p"]).await;

        assert!(h.controller.toggle_subtitles().await);
        assert!(h.controller.toggle_cinema_mode().await);
        assert!(!h.controller.toggle_cinema_mode().await);

        let enabled: Vec<_> = h
            .events()
            .await
            .into_iter()
            .filter(|e| e.event_type == EventType::VideoInteraction)
            .map(|e| (e.data_str("interaction_type").unwrap().to_string(), e.data["enabled"].clone()))
            .collect();
        assert_eq!(
            enabled,
            vec![
                ("subtitles_toggle".to_string(), json!(true)),
                ("cinema_mode".to_string(), json!(true)),
                ("cinema_mode".to_string(), json!(false)),
            ]
        );
    }

    #[tokio::test]
    async fn test_subtitles_loaded_once_and_looked_up() {
        let vtt = "WEBVTT\n\n00:00:01.000 --> 00:00:03.000\nHello\n\n00:00:05.000 --> 00:00:07.000\nWorld";
        let mut h = Harness::new(
            MockApi::default()
                .with_video("v1", &["720p"])
                .with_subtitles("v1", "en", vtt),
            PlayerConfig::default(),
        );
        h.controller.load_video("v1", None, 0.0).await.unwrap();
        h.tick(0.0).await;

        assert_eq!(h.controller.load_subtitles("en").await.unwrap(), 2);
        assert_eq!(h.controller.load_subtitles("en").await.unwrap(), 2);
        assert_eq!(h.api.subtitle_calls.load(Ordering::SeqCst), 1);

        h.controller.seek(2.0).await;
        assert_eq!(h.controller.active_subtitle(), None);

        h.controller.toggle_subtitles().await;
        assert_eq!(h.controller.active_subtitle(), Some("Hello"));

        h.controller.on_time_update(6.0).await;
        assert_eq!(h.controller.active_subtitle(), Some("World"));

        h.controller.on_time_update(4.0).await;
        assert_eq!(h.controller.active_subtitle(), None);
    }

    #[tokio::test]
    async fn test_subtitle_failure_does_not_halt_player() {
        let mut h = ready(&["720p"]).await;

        let err = h.controller.load_subtitles("fr").await.unwrap_err();
        assert!(matches!(err, Error::SubtitleFetch { .. }));
        assert!(h.controller.state().error.is_none());

        h.controller.play().await;
        assert!(h.controller.state().is_playing);
    }

    #[tokio::test]
    async fn test_keyboard_without_media_is_noop() {
        let mut h = Harness::new(MockApi::default(), PlayerConfig::default());
        assert!(!h.controller.handle_key("Space").await);
        assert!(!h.controller.handle_key("ArrowRight").await);
        assert_eq!(h.controller.state(), &PlayerState::default());
    }

    #[tokio::test]
    async fn test_keyboard_commands() {
        let mut h = ready(&["720p"]).await;

        assert!(h.controller.handle_key("Space").await);
        assert!(h.controller.state().is_playing);

        assert!(h.controller.handle_key("ArrowRight").await);
        assert_eq!(h.controller.state().current_time, 10.0);
        assert!(h.controller.handle_key("ArrowLeft").await);
        assert!(h.controller.handle_key("ArrowLeft").await);
        assert_eq!(h.controller.state().current_time, 0.0);

        assert!(h.controller.handle_key("ArrowDown").await);
        assert_eq!(h.controller.state().volume, 0.9);
        assert!(h.controller.handle_key("ArrowUp").await);
        assert!(h.controller.handle_key("ArrowUp").await);
        assert_eq!(h.controller.state().volume, 1.0);

        assert!(h.controller.handle_key("KeyF").await);
        assert!(h.controller.is_fullscreen());
        assert!(h.controller.handle_key("KeyC").await);
        assert!(h.controller.state().subtitles_enabled);
        assert!(h.controller.handle_key("KeyT").await);
        assert!(h.controller.state().cinema_mode);

        assert!(!h.controller.handle_key("KeyQ").await);
    }

    #[tokio::test]
    async fn test_media_error() {
        let reported = Arc::new(Mutex::new(Vec::new()));
        let sink = reported.clone();
        let mut h = ready(&["720p"]).await;
        h.controller = h.controller.with_callbacks(PlayerCallbacks {
            on_error: Some(Box::new(move |e: &Error| sink.lock().unwrap().push(e.kind()))),
            ..Default::default()
        });
        h.controller.play().await;

        h.media.inject_error("MEDIA_ERR_DECODE");
        h.tick(1.0).await;

        let state = h.controller.state();
        assert_eq!(state.error.as_deref(), Some(PLAYBACK_ERROR_MESSAGE));
        assert!(!state.is_playing);
        assert!(!state.is_loading);
        assert_eq!(*reported.lock().unwrap(), vec![crate::ErrorKind::Playback]);

        let last = h.events().await.pop().unwrap();
        assert_eq!(last.event_type, EventType::VideoError);
        assert_eq!(last.data_str("error_type"), Some("playback_error"));

        // Keyboard is inert in the error state
        assert!(!h.controller.handle_key("Space").await);
    }

    #[tokio::test]
    async fn test_time_update_and_ended_callbacks() {
        let times = Arc::new(Mutex::new(Vec::new()));
        let ended = Arc::new(AtomicUsize::new(0));
        let (times_sink, ended_sink) = (times.clone(), ended.clone());

        let mut h = Harness::new(
            MockApi::default().with_video("v1", &["720p"]),
            PlayerConfig::default(),
        );
        h.controller = h.controller.with_callbacks(PlayerCallbacks {
            on_time_update: Some(Box::new(move |t: f64| times_sink.lock().unwrap().push(t))),
            on_ended: Some(Box::new(move || {
                ended_sink.fetch_add(1, Ordering::SeqCst);
            })),
            ..Default::default()
        });
        h.controller.load_video("v1", None, 0.0).await.unwrap();
        h.tick(0.0).await;
        h.controller.play().await;

        h.tick(60.0).await;
        h.tick(60.0).await;

        assert_eq!(*times.lock().unwrap(), vec![60.0, 120.0]);
        assert_eq!(ended.load(Ordering::SeqCst), 1);
        assert!(!h.controller.state().is_playing);
        assert!(h.controller.controls_visible());

        let milestones: Vec<_> = h
            .events()
            .await
            .into_iter()
            .filter(|e| e.event_type == EventType::VideoProgress)
            .map(|e| e.data["progress_percent"].as_u64().unwrap())
            .collect();
        assert_eq!(milestones, vec![25, 50, 75, 95]);
    }

    #[tokio::test]
    async fn test_seek_before_metadata_is_ignored() {
        let mut h = Harness::new(
            MockApi::default().with_video("v1", &["720p"]),
            PlayerConfig::default(),
        );
        h.controller.load_video("v1", None, 0.0).await.unwrap();

        assert!(h.controller.handle_key("ArrowRight").await);
        h.controller.seek(500.0).await;
        assert_eq!(h.controller.state().current_time, 0.0);
        assert!(!h.interactions().await.contains(&"seek".to_string()));

        h.tick(0.0).await;
        let state = h.controller.state();
        assert_eq!(state.current_time, 0.0);
        assert_eq!(h.media.current_time(), 0.0);
        assert!(state.is_consistent());
    }

    #[tokio::test]
    async fn test_metadata_clamps_position_to_new_duration() {
        let mut h = ready(&["720p"]).await;
        h.controller.seek(100.0).await;

        h.controller.on_metadata_loaded(40.0).await;
        let state = h.controller.state();
        assert_eq!(state.duration, 40.0);
        assert_eq!(state.current_time, 40.0);
        assert_eq!(h.media.current_time(), 40.0);
        assert!(state.is_consistent());
    }

    #[tokio::test]
    async fn test_state_subscription() {
        let mut h = ready(&["720p"]).await;
        let mut rx = h.controller.subscribe_state();

        h.controller.seek(15.0).await;
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().current_time, 15.0);
    }

    #[tokio::test]
    async fn test_controls_hide_while_playing() {
        let mut h = ready(&["720p"]).await;
        h.controller.play().await;

        let now = Instant::now();
        h.controller.pointer_moved(now);
        assert!(!h.controller.tick_controls(now + Duration::from_secs(2)));
        assert!(h.controller.tick_controls(now + Duration::from_secs(3)));
        assert!(!h.controller.controls_visible());

        h.controller.pause().await;
        assert!(h.controller.controls_visible());
    }

    #[tokio::test]
    async fn test_preview_thumbnail() {
        let h = ready(&["720p"]).await;
        assert_eq!(h.controller.preview_thumbnail(10.0), Some("t0.jpg"));
        assert_eq!(h.controller.preview_thumbnail(119.0), Some("t1.jpg"));
    }

    #[tokio::test]
    async fn test_retarget_and_unmount_beacon_queued_events() {
        let mut h = Harness::new(
            MockApi::default()
                .with_video("v1", &["720p"])
                .with_video("v2", &["720p"]),
            PlayerConfig::default(),
        );
        let session = h.controller.session_id();

        h.controller.load_video("v1", None, 0.0).await.unwrap();
        h.tick(0.0).await;
        assert_eq!(h.transport.beacons.lock().unwrap().len(), 0);

        h.controller.load_video("v2", None, 0.0).await.unwrap();
        assert_eq!(h.transport.beacons.lock().unwrap().len(), 1);
        let analytics = h.controller.analytics().unwrap();
        assert_eq!(analytics.video_id(), "v2");
        assert_eq!(analytics.session_id(), session);

        h.tick(0.0).await;
        h.controller.unmount().await;
        assert!(h.controller.analytics().is_none());
        assert_eq!(h.transport.beacons.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_analytics_disabled() {
        let config = PlayerConfig {
            analytics_enabled: false,
            ..Default::default()
        };
        let mut h = Harness::new(MockApi::default().with_video("v1", &["720p"]), config);
        h.controller.load_video("v1", None, 0.0).await.unwrap();
        h.tick(0.0).await;
        h.controller.play().await;

        assert!(h.controller.analytics().is_none());
        assert!(h.controller.state().is_playing);
    }
}
