use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::library::TrackRef;
use crate::util::format_time;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlaybackStatus {
    /// No track selected.
    #[default]
    Idle,
    /// Source bound and play requested, not yet confirmed.
    Loading,
    Playing,
    Paused,
}

/// The one process-wide transport state. Not tied to the displayed playlist.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlaybackState {
    pub playing_track: Option<TrackRef>,
    pub status: PlaybackStatus,
    pub is_looped: bool,
    pub progress_secs: f64,
    pub duration_secs: f64,
    pub buffered_percent: f64,
}

impl PlaybackState {
    pub fn is_playing(&self) -> bool {
        self.status == PlaybackStatus::Playing
    }

    /// Played share of the track, 0-100.
    pub fn progress_percent(&self) -> f64 {
        if self.duration_secs > 0.0 {
            (self.progress_secs / self.duration_secs * 100.0).min(100.0)
        } else {
            0.0
        }
    }

    /// `MM:SS / MM:SS`
    pub fn time_label(&self) -> String {
        format!(
            "{} / {}",
            format_time(self.progress_secs),
            format_time(self.duration_secs)
        )
    }
}

/// Progress callbacks raised by the playback primitive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackEvent {
    /// A play request was honoured and audio is running.
    Started,
    TimeUpdate(f64),
    DurationKnown(f64),
    /// End of the furthest buffered range, in seconds.
    BufferProgress(f64),
    Ended,
}

/// The audio-producing primitive the controller drives.
pub trait AudioOutput: Send {
    /// Binds a new source, replacing the current one.
    fn load(&mut self, source: &TrackRef) -> Result<()>;
    fn unload(&mut self);
    fn source(&self) -> Option<&TrackRef>;

    /// Requests playback. An error means the runtime refused to start.
    fn play(&mut self) -> Result<()>;
    fn pause(&mut self);
    /// Live transport state, independent of what the controller believes.
    fn is_paused(&self) -> bool;

    fn set_looped(&mut self, looped: bool);
    fn is_looped(&self) -> bool;

    fn seek(&mut self, position_secs: f64) -> Result<()>;
}
