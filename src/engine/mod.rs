//! Playback engine.
//!
//! Owns the sequencer/synthesizer device and the player state. The engine
//! is driven by exactly one thread (the command poller); nothing in here is
//! shared.

pub mod device;
pub mod sequencer;
pub mod synth;

use crate::command::Command;
use crate::error::PlayerError;
use crate::track::{load_with_timeout, Sequence, TrackLoader};
use crate::volume;
use device::MidiDevice;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub use device::MIDI_CHANNELS;
pub use synth::SynthDevice;

/// Transport phase of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transport {
    /// Nothing has played since the engine was opened.
    #[default]
    Idle,
    /// A track is loaded and the sequencer is running.
    Playing,
    /// Playback was halted or the track ran out.
    Stopped,
}

/// Player state as seen by the poll loop.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlayerState {
    /// Track currently (or most recently) playing.
    pub current_track: Option<PathBuf>,
    /// Master volume level, logarithmic.
    pub current_volume: i32,
    pub transport: Transport,
    /// Last play/stop command acted on, for deduplication.
    pub last_dispatched: Option<Command>,
}

/// Result of a volume change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeOutcome {
    /// The channel volume was sent to every channel.
    Applied { channel_volume: u8 },
    /// The device is closed; the level was only remembered.
    Ignored,
}

/// Sequencer/synthesizer owner with load, start, stop and volume control.
pub struct PlaybackEngine<D: MidiDevice> {
    device: D,
    loader: Arc<dyn TrackLoader>,
    load_timeout: Option<Duration>,
    state: PlayerState,
}

impl<D: MidiDevice> PlaybackEngine<D> {
    /// Creates an engine around a closed device.
    pub fn new(device: D, loader: Arc<dyn TrackLoader>) -> Self {
        Self {
            device,
            loader,
            load_timeout: None,
            state: PlayerState::default(),
        }
    }

    /// Bounds how long a track load may take.
    pub fn with_load_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.load_timeout = timeout;
        self
    }

    /// Sets the level applied when the first track starts.
    pub fn with_volume(mut self, level: i32) -> Self {
        self.state.current_volume = level;
        self
    }

    /// Acquires the sequencer and synthesizer.
    ///
    /// # Errors
    ///
    /// Returns `DeviceUnavailable` if either resource cannot be acquired.
    pub fn open(&mut self) -> Result<(), PlayerError> {
        self.device.open()?;
        tracing::info!("MIDI player initialized: {}", self.device.description());
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.device.is_open()
    }

    /// Loads `track` and starts playing it.
    ///
    /// Any track in flight is halted first. If the new track cannot be
    /// loaded, transport drops to `Stopped` when something was playing and
    /// is otherwise left as it was.
    ///
    /// # Errors
    ///
    /// - `TrackNotFound` / `DecodeError` / `LoadTimeout` if the track cannot be loaded
    /// - `DeviceUnavailable` if the engine is closed or the sequencer refuses to start
    pub fn play(&mut self, track: &Path, looping: bool) -> Result<(), PlayerError> {
        if !self.device.is_open() {
            return Err(PlayerError::DeviceUnavailable(
                "playback engine is not open".to_string(),
            ));
        }

        if self.device.is_running() {
            self.device.stop();
        }

        let sequence = match load_with_timeout(&self.loader, track, self.load_timeout) {
            Ok(sequence) => sequence,
            Err(e) => {
                if self.state.transport == Transport::Playing {
                    self.state.transport = Transport::Stopped;
                }
                return Err(e);
            }
        };
        if sequence.is_empty() {
            tracing::warn!("{} has no channel events", track.display());
        }

        match self.start_sequence(Arc::new(sequence), looping) {
            Ok(()) => {
                self.state.transport = Transport::Playing;
                self.state.current_track = Some(track.to_path_buf());
                tracing::info!(
                    "Playing MIDI: {}{}",
                    track.display(),
                    if looping { " (looping)" } else { "" }
                );
                Ok(())
            }
            Err(e) => {
                // The previous track was already halted.
                self.device.stop();
                self.state.transport = Transport::Stopped;
                Err(e)
            }
        }
    }

    fn start_sequence(
        &mut self,
        sequence: Arc<Sequence>,
        looping: bool,
    ) -> Result<(), PlayerError> {
        self.device.set_sequence(sequence)?;
        self.device.set_loop(looping);
        self.push_volume();
        self.device.start()
    }

    /// Halts playback. A no-op unless something is playing.
    pub fn stop(&mut self) {
        if self.state.transport != Transport::Playing && !self.device.is_running() {
            return;
        }
        self.device.stop();
        self.state.transport = Transport::Stopped;
        tracing::info!("MIDI playback stopped");
    }

    /// Sets the master volume and pushes it to every channel.
    ///
    /// The level is always remembered for the next track. If the device is
    /// closed nothing is sent and the change is not an error.
    pub fn apply_volume(&mut self, level: i32) -> VolumeOutcome {
        self.state.current_volume = level;
        if !self.device.is_open() {
            return VolumeOutcome::Ignored;
        }
        VolumeOutcome::Applied {
            channel_volume: self.push_volume(),
        }
    }

    fn push_volume(&mut self) -> u8 {
        volume::apply_to_channels(&mut self.device, self.state.current_volume)
    }

    /// Marks a single-shot track that ran out as stopped.
    ///
    /// Returns true if the transport changed.
    pub fn sync_transport(&mut self) -> bool {
        if self.state.transport == Transport::Playing && !self.device.is_running() {
            tracing::debug!("Sequence finished");
            self.state.transport = Transport::Stopped;
            return true;
        }
        false
    }

    /// Stops playback and releases the device. Safe to call repeatedly.
    ///
    /// The state is reset even if the device was already lost.
    pub fn close(&mut self) {
        if self.device.is_open() {
            if self.device.is_running() {
                self.device.stop();
            }
            self.device.close();
            tracing::info!("MIDI player stopped");
        }
        self.state.transport = Transport::Idle;
        self.state.current_track = None;
        self.state.last_dispatched = None;
    }

    pub fn state(&self) -> &PlayerState {
        &self.state
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Records the play/stop command about to be acted on.
    pub(crate) fn record_dispatch(&mut self, command: Command) {
        self.state.last_dispatched = Some(command);
    }
}
