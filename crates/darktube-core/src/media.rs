//! Media element abstraction
//!
//! The controller is the only component allowed to command the element. The
//! element reports back through [`MediaEvent`]s that the host forwards to
//! [`PlayerController::handle_media_event`](crate::controller::PlayerController::handle_media_event).

use crate::{Error, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Commands the controller issues to a platform media element
pub trait MediaElement: Send + Sync {
    /// Point the element at a new media URL (destructive)
    fn set_source(&mut self, url: &str);

    /// Currently loaded media URL
    fn source(&self) -> Option<String>;

    /// Begin playback; may be rejected by the element
    fn play(&mut self) -> Result<()>;

    fn pause(&mut self);

    fn set_current_time(&mut self, time: f64);

    fn current_time(&self) -> f64;

    fn set_volume(&mut self, volume: f64);

    fn set_muted(&mut self, muted: bool);

    fn is_fullscreen(&self) -> bool;

    /// Enter or exit fullscreen; platforms may refuse
    fn set_fullscreen(&mut self, fullscreen: bool) -> Result<()>;
}

/// Notifications emitted by a media element
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    MetadataLoaded { duration: f64 },
    TimeUpdate { time: f64 },
    Play,
    Pause,
    Ended,
    VolumeChange { volume: f64 },
    Error { detail: String },
}

#[derive(Debug, Default)]
struct SimulatedState {
    source: Option<String>,
    media_duration: f64,
    ready: bool,
    playing: bool,
    current_time: f64,
    volume: f64,
    muted: bool,
    fullscreen: bool,
    pending_error: Option<String>,
}

/// Headless media element driven by an explicit clock
///
/// Clones share the same underlying element, so a host can hand one clone to
/// the controller and keep another to advance time and observe commands.
#[derive(Debug, Clone)]
pub struct SimulatedMediaElement {
    inner: Arc<Mutex<SimulatedState>>,
}

impl SimulatedMediaElement {
    /// Create an element whose media is `media_duration` seconds long
    pub fn new(media_duration: f64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SimulatedState {
                media_duration: media_duration.max(0.0),
                volume: 1.0,
                ..Default::default()
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimulatedState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_playing(&self) -> bool {
        self.state().playing
    }

    pub fn volume(&self) -> f64 {
        self.state().volume
    }

    pub fn is_muted(&self) -> bool {
        self.state().muted
    }

    /// Make the next tick report a decode failure
    pub fn inject_error(&self, detail: impl Into<String>) {
        self.state().pending_error = Some(detail.into());
    }

    /// Advance the element clock by `dt` seconds and collect the events it
    /// would fire
    pub fn tick(&self, dt: f64) -> Vec<MediaEvent> {
        let mut state = self.state();
        let mut events = Vec::new();

        if state.source.is_none() {
            return events;
        }

        if let Some(detail) = state.pending_error.take() {
            state.playing = false;
            events.push(MediaEvent::Error { detail });
            return events;
        }

        if !state.ready {
            state.ready = true;
            events.push(MediaEvent::MetadataLoaded {
                duration: state.media_duration,
            });
            return events;
        }

        if state.playing {
            state.current_time = (state.current_time + dt.max(0.0)).min(state.media_duration);
            events.push(MediaEvent::TimeUpdate {
                time: state.current_time,
            });

            if state.current_time >= state.media_duration {
                state.playing = false;
                events.push(MediaEvent::Ended);
            }
        }

        events
    }
}

impl MediaElement for SimulatedMediaElement {
    fn set_source(&mut self, url: &str) {
        let mut state = self.state();
        state.source = Some(url.to_string());
        state.ready = false;
        state.playing = false;
        state.current_time = 0.0;
    }

    fn source(&self) -> Option<String> {
        self.state().source.clone()
    }

    fn play(&mut self) -> Result<()> {
        let mut state = self.state();
        if state.source.is_none() {
            return Err(Error::playback("No media source"));
        }
        if state.current_time >= state.media_duration && state.ready {
            state.current_time = 0.0;
        }
        state.playing = true;
        Ok(())
    }

    fn pause(&mut self) {
        self.state().playing = false;
    }

    fn set_current_time(&mut self, time: f64) {
        let mut state = self.state();
        state.current_time = time.clamp(0.0, state.media_duration);
    }

    fn current_time(&self) -> f64 {
        self.state().current_time
    }

    fn set_volume(&mut self, volume: f64) {
        self.state().volume = volume.clamp(0.0, 1.0);
    }

    fn set_muted(&mut self, muted: bool) {
        self.state().muted = muted;
    }

    fn is_fullscreen(&self) -> bool {
        self.state().fullscreen
    }

    fn set_fullscreen(&mut self, fullscreen: bool) -> Result<()> {
        self.state().fullscreen = fullscreen;
        Ok(())
    }
}
