//! Owns the "currently playing" identity and drives the audio primitive.
//!
//! The playing track is held by identity, never by index. Next/Previous
//! derive an index on demand from whatever list is displayed at the time.

use tracing::{debug, warn};

use crate::library::TrackRef;
use crate::player::traits::{AudioOutput, PlaybackEvent, PlaybackState, PlaybackStatus};

pub struct PlaybackController {
    output: Box<dyn AudioOutput>,
    state: PlaybackState,
    /// Name of the collection the playing track was picked from.
    source: Option<String>,
}

impl PlaybackController {
    pub fn new(output: Box<dyn AudioOutput>) -> Self {
        let state = PlaybackState {
            is_looped: output.is_looped(),
            ..PlaybackState::default()
        };
        Self {
            output,
            state,
            source: None,
        }
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn playing_track(&self) -> Option<&TrackRef> {
        self.state.playing_track.as_ref()
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn set_source(&mut self, name: impl Into<String>) {
        self.source = Some(name.into());
    }

    pub fn output(&self) -> &dyn AudioOutput {
        self.output.as_ref()
    }

    /// Makes `track` the playing track. A track that is already bound keeps
    /// its position; a new one is bound from zero and started.
    pub fn select_track(&mut self, track: TrackRef) {
        let already_bound = self.output.source() == Some(&track);
        self.state.playing_track = Some(track.clone());
        if already_bound {
            return;
        }

        self.state.progress_secs = 0.0;
        self.state.duration_secs = 0.0;
        self.state.buffered_percent = 0.0;

        if let Err(e) = self.output.load(&track) {
            warn!(track = %track, error = %e, "failed to bind source");
            self.state.status = PlaybackStatus::Paused;
            return;
        }
        debug!(track = %track, "source bound");
        self.request_play();
    }

    /// Pauses or resumes based on the primitive's live state.
    pub fn toggle_play_pause(&mut self) {
        if self.output.source().is_none() {
            return;
        }
        if self.output.is_paused() {
            self.request_play();
        } else {
            self.output.pause();
            self.state.status = PlaybackStatus::Paused;
        }
    }

    pub fn toggle_loop(&mut self) {
        let looped = !self.output.is_looped();
        self.output.set_looped(looped);
        self.state.is_looped = looped;
    }

    /// Advances within `displayed`, wrapping at the end. No-op when the list
    /// is empty or the playing track is not in it.
    pub fn next(&mut self, displayed: &[TrackRef]) -> bool {
        self.step(displayed, 1)
    }

    pub fn previous(&mut self, displayed: &[TrackRef]) -> bool {
        self.step(displayed, -1)
    }

    pub fn on_time_update(&mut self, position_secs: f64) {
        self.state.progress_secs = position_secs;
    }

    pub fn on_duration_known(&mut self, duration_secs: f64) {
        self.state.duration_secs = if duration_secs.is_finite() && duration_secs > 0.0 {
            duration_secs
        } else {
            0.0
        };
    }

    /// `buffered_end` is the end of the furthest buffered range, in seconds.
    pub fn on_buffer_progress(&mut self, buffered_end: f64) {
        self.state.buffered_percent = if self.state.duration_secs > 0.0 {
            (buffered_end / self.state.duration_secs * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        };
    }

    /// Forwards the seek and shows the new position right away.
    pub fn seek(&mut self, target_secs: f64) {
        if self.output.source().is_none() {
            return;
        }
        let mut target = target_secs.max(0.0);
        if self.state.duration_secs > 0.0 {
            target = target.min(self.state.duration_secs);
        }
        match self.output.seek(target) {
            Ok(()) => self.state.progress_secs = target,
            Err(e) => warn!(error = %e, "seek rejected"),
        }
    }

    pub fn handle_event(&mut self, event: PlaybackEvent, displayed: &[TrackRef]) {
        match event {
            // Confirms a pending play request only
            PlaybackEvent::Started => {
                if self.state.status == PlaybackStatus::Loading {
                    self.state.status = PlaybackStatus::Playing;
                }
            }
            PlaybackEvent::TimeUpdate(secs) => self.on_time_update(secs),
            PlaybackEvent::DurationKnown(secs) => self.on_duration_known(secs),
            PlaybackEvent::BufferProgress(end) => self.on_buffer_progress(end),
            PlaybackEvent::Ended => self.on_ended(displayed),
        }
    }

    /// Reassigns playback after the playing track was removed at
    /// `removed_index` of its collection, leaving `remaining`.
    pub fn on_track_removed(&mut self, removed_index: usize, remaining: &[TrackRef]) {
        let Some(last) = remaining.len().checked_sub(1) else {
            debug!("source collection emptied, stopping");
            self.stop();
            return;
        };
        let replacement = remaining[removed_index.min(last)].clone();
        debug!(track = %replacement, "playing track removed, moving on");
        self.select_track(replacement);
    }

    /// Unbinds the source and returns to `Idle`.
    pub fn stop(&mut self) {
        self.output.pause();
        self.output.unload();
        self.source = None;
        self.state = PlaybackState {
            is_looped: self.state.is_looped,
            ..PlaybackState::default()
        };
    }

    fn request_play(&mut self) {
        match self.output.play() {
            Ok(()) => self.state.status = PlaybackStatus::Loading,
            Err(e) => {
                warn!(error = %e, "play request rejected");
                self.state.status = PlaybackStatus::Paused;
            }
        }
    }

    fn neighbour(&self, displayed: &[TrackRef], offset: isize) -> Option<TrackRef> {
        let playing = self.state.playing_track.as_ref()?;
        let index = displayed.iter().position(|t| t == playing)?;
        let len = displayed.len() as isize;
        let target = (index as isize + offset).rem_euclid(len) as usize;
        Some(displayed[target].clone())
    }

    fn step(&mut self, displayed: &[TrackRef], offset: isize) -> bool {
        match self.neighbour(displayed, offset) {
            Some(track) => {
                self.select_track(track);
                true
            }
            None => false,
        }
    }

    fn on_ended(&mut self, displayed: &[TrackRef]) {
        if self.state.is_looped {
            return;
        }
        match self.neighbour(displayed, 1) {
            None => self.stop(),
            Some(track) if self.state.playing_track.as_ref() == Some(&track) => {
                self.state.progress_secs = 0.0;
                if let Err(e) = self.output.seek(0.0) {
                    warn!(error = %e, "failed to rewind");
                }
                self.request_play();
            }
            Some(track) => self.select_track(track),
        }
    }
}
