//! Playback commands and the producer string protocol.
//!
//! Producers speak a small string protocol: `"stop"` stops playback,
//! `"voladjust"` carries a volume-only update, and anything else names a
//! track to play. [`Command::decode`] turns that into the typed form the
//! poll loop works with.

use std::fmt;
use std::path::PathBuf;

/// Keyword that requests a stop.
pub const STOP_KEYWORD: &str = "stop";

/// Keyword that marks a volume-only update.
pub const VOLUME_KEYWORD: &str = "voladjust";

/// A decoded playback request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Load a track and start playing it.
    Play { track: PathBuf, looping: bool },
    /// Stop playback.
    Stop,
    /// Change the master volume (logarithmic level).
    VolumeAdjust { level: i32 },
}

impl Command {
    /// Creates a looping play command.
    pub fn play_looping(track: impl Into<PathBuf>) -> Self {
        Command::Play {
            track: track.into(),
            looping: true,
        }
    }

    /// Decodes a producer request.
    ///
    /// `volume` is only meaningful for [`VOLUME_KEYWORD`]; tracks are played
    /// with `loop_tracks` as their looping mode.
    ///
    /// # Examples
    ///
    /// ```
    /// use midiloop::command::Command;
    ///
    /// assert_eq!(Command::decode("stop", 0, true), Command::Stop);
    /// assert_eq!(
    ///     Command::decode("voladjust", -600, true),
    ///     Command::VolumeAdjust { level: -600 }
    /// );
    /// ```
    pub fn decode(track_or_keyword: &str, volume: i32, loop_tracks: bool) -> Self {
        match track_or_keyword {
            STOP_KEYWORD => Command::Stop,
            VOLUME_KEYWORD => Command::VolumeAdjust { level: volume },
            track => Command::Play {
                track: PathBuf::from(track),
                looping: loop_tracks,
            },
        }
    }

    /// Returns true for commands that are never deduplicated.
    pub fn is_volume(&self) -> bool {
        matches!(self, Command::VolumeAdjust { .. })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Play { track, looping } => {
                write!(f, "play {}", track.display())?;
                if *looping {
                    write!(f, " (looping)")?;
                }
                Ok(())
            }
            Command::Stop => write!(f, "stop"),
            Command::VolumeAdjust { level } => write!(f, "volume {}", level),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_keywords() {
        assert_eq!(Command::decode("stop", -300, true), Command::Stop);
        assert_eq!(
            Command::decode("voladjust", -300, true),
            Command::VolumeAdjust { level: -300 }
        );
    }

    #[test]
    fn test_decode_track() {
        assert_eq!(
            Command::decode("music/theme.mid", -300, true),
            Command::play_looping("music/theme.mid")
        );
        assert_eq!(
            Command::decode("jingle.mid", 0, false),
            Command::Play {
                track: PathBuf::from("jingle.mid"),
                looping: false,
            }
        );
    }

    #[test]
    fn test_keywords_are_case_sensitive() {
        // Only the exact keywords are special; anything else is a path.
        assert!(matches!(
            Command::decode("STOP", 0, true),
            Command::Play { .. }
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(Command::play_looping("a.mid").to_string(), "play a.mid (looping)");
        assert_eq!(Command::Stop.to_string(), "stop");
        assert_eq!(
            Command::VolumeAdjust { level: -600 }.to_string(),
            "volume -600"
        );
    }
}
