//! Device capability set used by the playback engine.
//!
//! A device is a sequencer wired to a synthesizer: the sequencer replays a
//! loaded [`Sequence`] into the synthesizer, and the synthesizer exposes
//! per-channel controllers. The engine only ever talks to this trait, so
//! the real rustysynth device and the test double are interchangeable.

use crate::error::PlayerError;
use crate::track::Sequence;
use std::sync::Arc;

/// Number of MIDI channels on a General MIDI synthesizer.
pub const MIDI_CHANNELS: u8 = 16;

/// Sequencer and synthesizer pair.
pub trait MidiDevice {
    /// Human-readable description of the sequencer and synthesizer.
    fn description(&self) -> String;

    /// Acquires both resources and connects the sequencer to the synthesizer.
    ///
    /// Opening an open device is a no-op.
    fn open(&mut self) -> Result<(), PlayerError>;

    /// Releases both resources. Closing a closed device is a no-op.
    fn close(&mut self);

    fn is_open(&self) -> bool;

    /// Replaces the loaded sequence and rewinds to its start.
    fn set_sequence(&mut self, sequence: Arc<Sequence>) -> Result<(), PlayerError>;

    /// Selects infinite (`true`) or single-shot (`false`) playback.
    fn set_loop(&mut self, looping: bool);

    /// Starts the sequencer from its current position.
    fn start(&mut self) -> Result<(), PlayerError>;

    /// Halts the sequencer and silences sounding notes.
    fn stop(&mut self);

    /// Returns true while the sequencer is running.
    ///
    /// A single-shot sequence stops running on its own when it ends.
    fn is_running(&self) -> bool;

    /// Number of output channels that controllers can address.
    fn channel_count(&self) -> u8 {
        MIDI_CHANNELS
    }

    /// Sends a control change to one channel.
    fn set_channel_controller(&mut self, channel: u8, controller: u8, value: u8);
}

#[cfg(test)]
pub(crate) mod mock {
    //! Device double that records every call.

    use super::*;
    use std::sync::Mutex;

    /// A call made against [`RecordingDevice`].
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum DeviceCall {
        Open,
        Close,
        SetSequence { events: usize },
        SetLoop(bool),
        Start,
        Stop,
        Controller { channel: u8, controller: u8, value: u8 },
    }

    /// Shared call log, readable from other threads.
    pub type CallLog = Arc<Mutex<Vec<DeviceCall>>>;

    #[derive(Debug, Default)]
    pub struct RecordingDevice {
        log: CallLog,
        open: bool,
        running: bool,
        loaded: bool,
        fail_open: bool,
        fail_start: bool,
    }

    impl RecordingDevice {
        pub fn new() -> Self {
            Self::default()
        }

        /// A device whose `open` always fails.
        pub fn unavailable() -> Self {
            Self {
                fail_open: true,
                ..Self::default()
            }
        }

        /// A device whose `start` always fails.
        pub fn failing_start() -> Self {
            Self {
                fail_start: true,
                ..Self::default()
            }
        }

        pub fn log(&self) -> CallLog {
            Arc::clone(&self.log)
        }

        pub fn calls(&self) -> Vec<DeviceCall> {
            self.log.lock().unwrap().clone()
        }

        /// Simulates a single-shot sequence reaching its end.
        pub fn finish_playback(&mut self) {
            self.running = false;
        }

        fn record(&self, call: DeviceCall) {
            self.log.lock().unwrap().push(call);
        }
    }

    /// Counts calls in `log` matching `predicate`.
    pub fn count(log: &CallLog, predicate: impl Fn(&DeviceCall) -> bool) -> usize {
        log.lock().unwrap().iter().filter(|c| predicate(*c)).count()
    }

    impl MidiDevice for RecordingDevice {
        fn description(&self) -> String {
            "recording sequencer -> recording synthesizer".to_string()
        }

        fn open(&mut self) -> Result<(), PlayerError> {
            if self.fail_open {
                return Err(PlayerError::DeviceUnavailable(
                    "no synthesizer available".to_string(),
                ));
            }
            self.record(DeviceCall::Open);
            self.open = true;
            Ok(())
        }

        fn close(&mut self) {
            if !self.open {
                return;
            }
            self.record(DeviceCall::Close);
            self.open = false;
            self.running = false;
        }

        fn is_open(&self) -> bool {
            self.open
        }

        fn set_sequence(&mut self, sequence: Arc<Sequence>) -> Result<(), PlayerError> {
            self.record(DeviceCall::SetSequence {
                events: sequence.events().len(),
            });
            self.loaded = true;
            Ok(())
        }

        fn set_loop(&mut self, looping: bool) {
            self.record(DeviceCall::SetLoop(looping));
        }

        fn start(&mut self) -> Result<(), PlayerError> {
            if self.fail_start {
                return Err(PlayerError::DeviceUnavailable("output stalled".to_string()));
            }
            self.record(DeviceCall::Start);
            self.running = self.loaded;
            Ok(())
        }

        fn stop(&mut self) {
            self.record(DeviceCall::Stop);
            self.running = false;
        }

        fn is_running(&self) -> bool {
            self.running
        }

        fn set_channel_controller(&mut self, channel: u8, controller: u8, value: u8) {
            self.record(DeviceCall::Controller {
                channel,
                controller,
                value,
            });
        }
    }
}
