//! midiloop - background MIDI playback driven by fire-and-forget commands.
//!
//! Producers post commands into a single-slot [`Mailbox`]; a dedicated
//! thread polls it, drops repeated play/stop requests, and drives a
//! sequencer wired to a SoundFont synthesizer.

pub mod command;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod mailbox;
pub mod poller;
pub mod track;
pub mod volume;

// Re-export commonly used types
pub use command::Command;
pub use config::PlayerConfig;
pub use controller::MidiPlayer;
pub use engine::{PlaybackEngine, PlayerState, Transport, VolumeOutcome};
pub use error::PlayerError;
pub use mailbox::Mailbox;
pub use track::{Sequence, SmfLoader, TrackLoader};
