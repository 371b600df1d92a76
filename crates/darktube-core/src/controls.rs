//! Keyboard commands and control-bar visibility

use std::time::{Duration, Instant};

/// Keyboard shortcut actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCommand {
    TogglePlay,
    SeekBackward,
    SeekForward,
    VolumeUp,
    VolumeDown,
    ToggleFullscreen,
    ToggleSubtitles,
    ToggleCinemaMode,
}

impl KeyCommand {
    /// Map a DOM `KeyboardEvent.code` (or the equivalent `key`) to a command
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "Space" | " " => Some(KeyCommand::TogglePlay),
            "ArrowLeft" => Some(KeyCommand::SeekBackward),
            "ArrowRight" => Some(KeyCommand::SeekForward),
            "ArrowUp" => Some(KeyCommand::VolumeUp),
            "ArrowDown" => Some(KeyCommand::VolumeDown),
            "KeyF" | "f" | "F" => Some(KeyCommand::ToggleFullscreen),
            "KeyC" | "c" | "C" => Some(KeyCommand::ToggleSubtitles),
            "KeyT" | "t" | "T" => Some(KeyCommand::ToggleCinemaMode),
            _ => None,
        }
    }
}

/// Auto-hide state of the control bar
///
/// While playing, controls hide after `hide_delay` without pointer activity.
/// The host passes its own clock into every call and polls [`tick`](Self::tick).
#[derive(Debug, Clone)]
pub struct ControlsVisibility {
    hide_delay: Duration,
    visible: bool,
    playing: bool,
    hide_at: Option<Instant>,
}

impl ControlsVisibility {
    pub fn new(hide_delay: Duration) -> Self {
        Self {
            hide_delay,
            visible: true,
            playing: false,
            hide_at: None,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// When the controls will hide, if a hide is scheduled
    pub fn deadline(&self) -> Option<Instant> {
        self.hide_at
    }

    /// Pointer moved over the player: show and restart the timer
    pub fn pointer_moved(&mut self, now: Instant) {
        self.visible = true;
        if self.playing {
            self.hide_at = Some(now + self.hide_delay);
        }
    }

    /// Pointer left the player surface
    pub fn pointer_left(&mut self) {
        self.visible = false;
        self.hide_at = None;
    }

    pub fn playback_started(&mut self, now: Instant) {
        self.playing = true;
        if self.visible {
            self.hide_at = Some(now + self.hide_delay);
        }
    }

    /// Pausing (or ending) shows the controls and suspends the timer
    pub fn playback_stopped(&mut self) {
        self.playing = false;
        self.visible = true;
        self.hide_at = None;
    }

    /// Apply an elapsed deadline; returns true if the controls just hid
    pub fn tick(&mut self, now: Instant) -> bool {
        match self.hide_at {
            Some(at) if now >= at => {
                self.visible = false;
                self.hide_at = None;
                true
            }
            _ => false,
        }
    }
}

impl Default for ControlsVisibility {
    fn default() -> Self {
        Self::new(Duration::from_secs(3))
    }
}
