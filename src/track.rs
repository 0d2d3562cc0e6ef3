//! Standard MIDI File loading.
//!
//! Tracks are decoded into a [`Sequence`]: every channel event of every
//! track, merged and converted from ticks to seconds through the tempo map,
//! so the sequencer only has to compare timestamps while playing.
//!
//! # Limitations
//!
//! - Format 2 (sequential) files are rejected
//! - SysEx and meta events other than tempo are dropped

use crate::error::PlayerError;
use midly::{Format, MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

/// Tempo assumed until the file sets one (120 BPM).
const DEFAULT_MICROS_PER_BEAT: u32 = 500_000;

/// Status nibbles understood by the synthesizer.
pub mod status {
    pub const NOTE_OFF: u8 = 0x80;
    pub const NOTE_ON: u8 = 0x90;
    pub const KEY_PRESSURE: u8 = 0xA0;
    pub const CONTROL_CHANGE: u8 = 0xB0;
    pub const PROGRAM_CHANGE: u8 = 0xC0;
    pub const CHANNEL_PRESSURE: u8 = 0xD0;
    pub const PITCH_BEND: u8 = 0xE0;
}

/// A channel message scheduled at an absolute time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MidiEvent {
    /// Seconds from the start of the sequence.
    pub time: f64,
    /// MIDI channel (0-15).
    pub channel: u8,
    /// Status nibble, see [`status`].
    pub command: u8,
    pub data1: u8,
    pub data2: u8,
}

impl MidiEvent {
    pub fn new(time: f64, channel: u8, command: u8, data1: u8, data2: u8) -> Self {
        Self {
            time,
            channel,
            command,
            data1,
            data2,
        }
    }
}

/// A decoded track ready for playback.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Sequence {
    events: Vec<MidiEvent>,
    duration: f64,
}

impl Sequence {
    /// Creates a sequence from events sorted by time.
    ///
    /// The duration is never shorter than the last event.
    pub fn new(events: Vec<MidiEvent>, duration: f64) -> Self {
        let last = events.last().map(|e| e.time).unwrap_or(0.0);
        Self {
            events,
            duration: duration.max(last),
        }
    }

    /// Decodes a Standard MIDI File held in memory.
    pub fn from_smf_bytes(data: &[u8]) -> Result<Self, String> {
        let smf = Smf::parse(data).map_err(|e| e.to_string())?;

        if smf.header.format == Format::Sequential {
            return Err("format 2 (sequential) MIDI files are not supported".to_string());
        }

        // Merge all tracks on absolute ticks. Tempo changes ride along so the
        // tick-to-seconds conversion can follow them.
        let mut timeline: Vec<(u64, TimelineEntry)> = Vec::new();
        let mut end_tick: u64 = 0;

        for track in &smf.tracks {
            let mut tick: u64 = 0;
            for event in track {
                tick += event.delta.as_int() as u64;
                let entry = match event.kind {
                    TrackEventKind::Meta(MetaMessage::Tempo(micros)) => {
                        TimelineEntry::Tempo(micros.as_int())
                    }
                    TrackEventKind::Midi { channel, message } => {
                        let (command, data1, data2) = encode_message(message);
                        TimelineEntry::Channel {
                            channel: channel.as_int(),
                            command,
                            data1,
                            data2,
                        }
                    }
                    _ => continue,
                };
                timeline.push((tick, entry));
            }
            end_tick = end_tick.max(tick);
        }

        // Stable sort keeps per-track order for events sharing a tick.
        timeline.sort_by_key(|(tick, _)| *tick);

        let mut clock = TickClock::new(smf.header.timing);
        let mut events = Vec::with_capacity(timeline.len());
        for (tick, entry) in timeline {
            let time = clock.seconds_at(tick);
            match entry {
                TimelineEntry::Tempo(micros) => clock.set_tempo(tick, micros),
                TimelineEntry::Channel {
                    channel,
                    command,
                    data1,
                    data2,
                } => events.push(MidiEvent::new(time, channel, command, data1, data2)),
            }
        }
        let duration = clock.seconds_at(end_tick);

        Ok(Self::new(events, duration))
    }

    /// Events in playback order.
    pub fn events(&self) -> &[MidiEvent] {
        &self.events
    }

    /// Length of one pass in seconds.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

enum TimelineEntry {
    Tempo(u32),
    Channel {
        channel: u8,
        command: u8,
        data1: u8,
        data2: u8,
    },
}

/// Converts absolute ticks to seconds across tempo changes.
struct TickClock {
    /// Ticks per beat for metrical files, `None` for timecode.
    ticks_per_beat: Option<f64>,
    seconds_per_tick: f64,
    anchor_tick: u64,
    anchor_seconds: f64,
}

impl TickClock {
    fn new(timing: Timing) -> Self {
        match timing {
            Timing::Metrical(tpb) => {
                let tpb = (tpb.as_int() as f64).max(1.0);
                Self {
                    ticks_per_beat: Some(tpb),
                    seconds_per_tick: DEFAULT_MICROS_PER_BEAT as f64 / 1_000_000.0 / tpb,
                    anchor_tick: 0,
                    anchor_seconds: 0.0,
                }
            }
            Timing::Timecode(fps, subframes) => {
                let ticks_per_second = (fps.as_f32() as f64 * subframes as f64).max(1.0);
                Self {
                    ticks_per_beat: None,
                    seconds_per_tick: 1.0 / ticks_per_second,
                    anchor_tick: 0,
                    anchor_seconds: 0.0,
                }
            }
        }
    }

    fn seconds_at(&self, tick: u64) -> f64 {
        self.anchor_seconds + (tick.saturating_sub(self.anchor_tick)) as f64 * self.seconds_per_tick
    }

    /// Applies a tempo change taking effect at `tick`.
    fn set_tempo(&mut self, tick: u64, micros_per_beat: u32) {
        // Timecode timing is absolute; tempo events do not affect it.
        let Some(tpb) = self.ticks_per_beat else {
            return;
        };
        if micros_per_beat == 0 {
            return;
        }
        self.anchor_seconds = self.seconds_at(tick);
        self.anchor_tick = tick;
        self.seconds_per_tick = micros_per_beat as f64 / 1_000_000.0 / tpb;
    }
}

/// Flattens a midly message into (status nibble, data1, data2).
fn encode_message(message: MidiMessage) -> (u8, u8, u8) {
    match message {
        MidiMessage::NoteOff { key, vel } => (status::NOTE_OFF, key.as_int(), vel.as_int()),
        MidiMessage::NoteOn { key, vel } => (status::NOTE_ON, key.as_int(), vel.as_int()),
        MidiMessage::Aftertouch { key, vel } => {
            (status::KEY_PRESSURE, key.as_int(), vel.as_int())
        }
        MidiMessage::Controller { controller, value } => {
            (status::CONTROL_CHANGE, controller.as_int(), value.as_int())
        }
        MidiMessage::ProgramChange { program } => (status::PROGRAM_CHANGE, program.as_int(), 0),
        MidiMessage::ChannelAftertouch { vel } => (status::CHANNEL_PRESSURE, vel.as_int(), 0),
        MidiMessage::PitchBend { bend } => {
            let raw = bend.0.as_int();
            (status::PITCH_BEND, (raw & 0x7F) as u8, (raw >> 7) as u8)
        }
    }
}

/// Source of decoded tracks.
pub trait TrackLoader: Send + Sync {
    /// Loads and decodes the track at `path`.
    fn load(&self, path: &Path) -> Result<Sequence, PlayerError>;
}

/// Loads Standard MIDI Files from the filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmfLoader;

impl TrackLoader for SmfLoader {
    fn load(&self, path: &Path) -> Result<Sequence, PlayerError> {
        let data = fs::read(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => PlayerError::TrackNotFound(path.to_path_buf()),
            _ => PlayerError::Io(e),
        })?;

        Sequence::from_smf_bytes(&data).map_err(|reason| PlayerError::DecodeError {
            path: path.to_path_buf(),
            reason,
        })
    }
}

/// Loads a track, giving up after `timeout`.
///
/// The load runs on a helper thread. A load that overruns is abandoned and
/// finishes in the background; its result is discarded.
pub fn load_with_timeout(
    loader: &Arc<dyn TrackLoader>,
    path: &Path,
    timeout: Option<Duration>,
) -> Result<Sequence, PlayerError> {
    let Some(timeout) = timeout else {
        return loader.load(path);
    };

    let (tx, rx) = mpsc::sync_channel(1);
    let worker_loader = Arc::clone(loader);
    let worker_path: PathBuf = path.to_path_buf();
    thread::Builder::new()
        .name("midiloop-load".to_string())
        .spawn(move || {
            // The receiver may be gone after a timeout.
            let _ = tx.send(worker_loader.load(&worker_path));
        })?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(PlayerError::LoadTimeout {
            path: path.to_path_buf(),
            timeout,
        }),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(PlayerError::DecodeError {
            path: path.to_path_buf(),
            reason: "loader thread panicked".to_string(),
        }),
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::{single_note, smf, track_chunk, write_temp};
    use super::*;

    #[test]
    fn test_single_note_timing() {
        let sequence = Sequence::from_smf_bytes(&single_note()).unwrap();
        let events = sequence.events();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].command, status::NOTE_ON);
        assert_eq!(events[0].data1, 60);
        assert_eq!(events[0].time, 0.0);
        // 480 ticks at 120 BPM = one beat = 0.5 s
        assert!((events[1].time - 0.5).abs() < 1e-9);
        assert!((sequence.duration() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_tempo_change_applies_from_its_tick() {
        // Tempo track: 60 BPM after the first beat.
        let tempo_track = track_chunk(&[(480, &[0xFF, 0x51, 0x03, 0x0F, 0x42, 0x40])]);
        let notes = track_chunk(&[
            (0, &[0x90, 60, 100]),
            (480, &[0x80, 60, 0]),
            (0, &[0x90, 62, 100]),
            (480, &[0x80, 62, 0]),
        ]);
        let sequence = Sequence::from_smf_bytes(&smf(1, 480, &[tempo_track, notes])).unwrap();
        let times: Vec<f64> = sequence.events().iter().map(|e| e.time).collect();

        assert_eq!(times.len(), 4);
        assert!((times[1] - 0.5).abs() < 1e-9);
        assert!((times[2] - 0.5).abs() < 1e-9);
        // Second beat runs at 60 BPM: one full second.
        assert!((times[3] - 1.5).abs() < 1e-9);
        assert!((sequence.duration() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_timecode_division_ignores_tempo() {
        // 25 fps x 40 subframes: 1000 ticks per second.
        let tempo_track = track_chunk(&[(250, &[0xFF, 0x51, 0x03, 0x0F, 0x42, 0x40])]);
        let notes = track_chunk(&[
            (0, &[0x90, 60, 100]),
            (500, &[0x80, 60, 0]),
            (0, &[0x90, 62, 100]),
            (1000, &[0x80, 62, 0]),
        ]);
        let sequence = Sequence::from_smf_bytes(&smf(1, 0xE728, &[tempo_track, notes])).unwrap();
        let times: Vec<f64> = sequence.events().iter().map(|e| e.time).collect();

        assert_eq!(times.len(), 4);
        assert_eq!(times[0], 0.0);
        assert!((times[1] - 0.5).abs() < 1e-9);
        assert!((times[2] - 0.5).abs() < 1e-9);
        assert!((times[3] - 1.5).abs() < 1e-9);
        assert!((sequence.duration() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_tracks_are_merged_in_time_order() {
        let a = track_chunk(&[(240, &[0x90, 64, 90]), (240, &[0x80, 64, 0])]);
        let b = track_chunk(&[(0, &[0xC1, 5]), (120, &[0x91, 48, 80]), (600, &[0x81, 48, 0])]);
        let sequence = Sequence::from_smf_bytes(&smf(1, 480, &[a, b])).unwrap();
        let events = sequence.events();

        assert!(events.windows(2).all(|w| w[0].time <= w[1].time));
        assert_eq!(events[0].command, status::PROGRAM_CHANGE);
        assert_eq!(events[0].channel, 1);
        assert_eq!(events[0].data1, 5);
    }

    #[test]
    fn test_pitch_bend_split() {
        let track = track_chunk(&[(0, &[0xE0, 0x01, 0x40])]);
        let sequence = Sequence::from_smf_bytes(&smf(0, 96, &[track])).unwrap();
        let bend = sequence.events()[0];
        assert_eq!((bend.command, bend.data1, bend.data2), (status::PITCH_BEND, 0x01, 0x40));
    }

    #[test]
    fn test_sequential_format_rejected() {
        let data = smf(2, 480, &[track_chunk(&[(0, &[0x90, 60, 100])])]);
        assert!(Sequence::from_smf_bytes(&data).is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(Sequence::from_smf_bytes(b"definitely not a midi file").is_err());
    }

    #[test]
    fn test_loader_errors() {
        let missing = SmfLoader.load(Path::new("/nonexistent/midiloop/theme.mid"));
        assert!(matches!(missing, Err(PlayerError::TrackNotFound(_))));

        let corrupt = write_temp("corrupt.mid", b"not a midi file at all");
        let decoded = SmfLoader.load(&corrupt);
        assert!(matches!(decoded, Err(PlayerError::DecodeError { .. })));
    }

    #[test]
    fn test_loader_reads_file() {
        let path = write_temp("loader_single.mid", &single_note());
        let sequence = SmfLoader.load(&path).unwrap();
        assert_eq!(sequence.events().len(), 2);
    }

    struct SlowLoader;

    impl TrackLoader for SlowLoader {
        fn load(&self, _path: &Path) -> Result<Sequence, PlayerError> {
            thread::sleep(Duration::from_millis(500));
            Ok(Sequence::default())
        }
    }

    #[test]
    fn test_load_timeout() {
        let loader: Arc<dyn TrackLoader> = Arc::new(SlowLoader);
        let result = load_with_timeout(
            &loader,
            Path::new("slow.mid"),
            Some(Duration::from_millis(20)),
        );
        assert!(matches!(result, Err(PlayerError::LoadTimeout { .. })));
    }

    #[test]
    fn test_load_without_timeout_is_direct() {
        let path = write_temp("direct.mid", &single_note());
        let loader: Arc<dyn TrackLoader> = Arc::new(SmfLoader);
        let sequence = load_with_timeout(&loader, &path, None).unwrap();
        assert!(!sequence.is_empty());
    }
}
