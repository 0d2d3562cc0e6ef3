//! Player configuration.
//!
//! Stored as JSON. Every field has a default, so a config file only needs
//! to name what it changes (usually just the SoundFont).

use crate::error::PlayerError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Sample rate for audio synthesis (44.1 kHz standard).
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Interval between mailbox polls when no command is waiting.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Upper bound on loading a single track.
pub const DEFAULT_LOAD_TIMEOUT_MS: u64 = 5000;

/// Sample rates the synthesizer accepts.
const SAMPLE_RATE_RANGE: std::ops::RangeInclusive<u32> = 16000..=192000;

/// Settings for [`crate::MidiPlayer`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// SoundFont (.sf2) used by the synthesizer.
    pub soundfont: PathBuf,
    pub sample_rate: u32,
    pub poll_interval_ms: u64,
    /// `None` (`null` in JSON) lets a track load take as long as it needs.
    pub load_timeout_ms: Option<u64>,
    /// Volume level applied when the first track starts.
    pub initial_volume: i32,
    /// Whether tracks posted by name loop forever.
    pub loop_tracks: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            soundfont: PathBuf::from("assets/TimGM6mb.sf2"),
            sample_rate: DEFAULT_SAMPLE_RATE,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            load_timeout_ms: Some(DEFAULT_LOAD_TIMEOUT_MS),
            initial_volume: 0,
            loop_tracks: true,
        }
    }
}

impl PlayerConfig {
    /// Creates a default configuration using the given SoundFont.
    pub fn with_soundfont<P: AsRef<Path>>(soundfont: P) -> Self {
        Self {
            soundfont: soundfont.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// Parses a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, PlayerError> {
        serde_json::from_str(json).map_err(|e| PlayerError::Config(e.to_string()))
    }

    /// Serializes the configuration to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, PlayerError> {
        serde_json::to_string_pretty(self).map_err(|e| PlayerError::Config(e.to_string()))
    }

    /// Loads and validates a configuration file.
    ///
    /// Relative SoundFont paths are resolved against the file's directory.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, PlayerError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)?;
        let mut config = Self::from_json(&json)?;

        if config.soundfont.is_relative() {
            if let Some(dir) = path.parent() {
                config.soundfont = dir.join(&config.soundfont);
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks that the settings can drive a player.
    pub fn validate(&self) -> Result<(), PlayerError> {
        if self.poll_interval_ms == 0 {
            return Err(PlayerError::Config(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if !SAMPLE_RATE_RANGE.contains(&self.sample_rate) {
            return Err(PlayerError::Config(format!(
                "sample_rate {} is outside {}..={}",
                self.sample_rate,
                SAMPLE_RATE_RANGE.start(),
                SAMPLE_RATE_RANGE.end()
            )));
        }
        if self.load_timeout_ms == Some(0) {
            return Err(PlayerError::Config(
                "load_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn load_timeout(&self) -> Option<Duration> {
        self.load_timeout_ms.map(Duration::from_millis)
    }
}
