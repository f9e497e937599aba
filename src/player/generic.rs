use anyhow::{bail, Result};

use crate::library::TrackRef;
use crate::player::traits::AudioOutput;

/// Tracks transport state without producing sound. Used where no audio
/// device is attached (the CLI, tests).
#[derive(Debug, Default)]
pub struct SilentOutput {
    source: Option<TrackRef>,
    paused: bool,
    looped: bool,
    position: f64,
    block_play: bool,
}

impl SilentOutput {
    pub fn new() -> Self {
        Self {
            paused: true,
            ..Self::default()
        }
    }

    /// Rejects every play request, like a runtime autoplay policy.
    pub fn autoplay_blocked() -> Self {
        Self {
            block_play: true,
            ..Self::new()
        }
    }

    pub fn position(&self) -> f64 {
        self.position
    }
}

impl AudioOutput for SilentOutput {
    fn load(&mut self, source: &TrackRef) -> Result<()> {
        self.source = Some(source.clone());
        self.paused = true;
        self.position = 0.0;
        Ok(())
    }

    fn unload(&mut self) {
        self.source = None;
        self.paused = true;
        self.position = 0.0;
    }

    fn source(&self) -> Option<&TrackRef> {
        self.source.as_ref()
    }

    fn play(&mut self) -> Result<()> {
        if self.source.is_none() {
            bail!("no source loaded");
        }
        if self.block_play {
            bail!("playback blocked until user interaction");
        }
        self.paused = false;
        Ok(())
    }

    fn pause(&mut self) {
        self.paused = true;
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn set_looped(&mut self, looped: bool) {
        self.looped = looped;
    }

    fn is_looped(&self) -> bool {
        self.looped
    }

    fn seek(&mut self, position_secs: f64) -> Result<()> {
        if self.source.is_none() {
            bail!("no source loaded");
        }
        self.position = position_secs.max(0.0);
        Ok(())
    }
}
