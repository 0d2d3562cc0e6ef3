//! Error types for the playback controller.
//!
//! Only `DeviceUnavailable` and `Config` are fatal, and only at startup.
//! Everything that can go wrong while a command is being handled is
//! contained in the poll loop and logged.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors produced by the player and its collaborators.
#[derive(Debug, Error)]
pub enum PlayerError {
    /// No compatible sequencer/synthesizer could be acquired.
    #[error("MIDI device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The requested track does not exist.
    #[error("MIDI file not found: {}", .0.display())]
    TrackNotFound(PathBuf),

    /// The track exists but is not a playable Standard MIDI File.
    #[error("failed to decode {}: {reason}", path.display())]
    DecodeError { path: PathBuf, reason: String },

    /// Loading the track took longer than the configured bound.
    #[error("loading {} timed out after {timeout:?}", path.display())]
    LoadTimeout { path: PathBuf, timeout: Duration },

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Underlying I/O failure other than a missing file.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PlayerError {
    /// Returns true for failures that only abandon the current command.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PlayerError::TrackNotFound(_)
                | PlayerError::DecodeError { .. }
                | PlayerError::LoadTimeout { .. }
                | PlayerError::Io(_)
        )
    }
}
