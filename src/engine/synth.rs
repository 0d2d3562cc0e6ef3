//! SoundFont synthesizer device.
//!
//! Provides the real [`MidiDevice`]: a [`Sequencer`] feeding a rustysynth
//! synthesizer, rendered to the default audio output through rodio. The
//! sequencer and synthesizer share one lock so that events are dispatched
//! on the audio thread, sample-block accurate.

use super::device::MidiDevice;
use super::sequencer::{EventReceiver, Sequencer};
use crate::error::PlayerError;
use crate::track::{status, MidiEvent, Sequence};
use rodio::{OutputStream, OutputStreamHandle, Source};
use rustysynth::{SoundFont, Synthesizer, SynthesizerSettings};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Audio buffer size for low-latency playback.
/// Events are scheduled with this granularity.
const BUFFER_SIZE: usize = 256;

impl EventReceiver for Synthesizer {
    fn send(&mut self, event: &MidiEvent) {
        self.process_midi_message(
            event.channel as i32,
            event.command as i32,
            event.data1 as i32,
            event.data2 as i32,
        );
    }

    fn silence(&mut self) {
        self.note_off_all(false);
    }
}

/// The sequencer wired to the synthesizer it drives.
struct Rack {
    sequencer: Sequencer,
    synth: Synthesizer,
}

/// Audio source that advances the sequencer and renders the synthesizer.
struct RackSource {
    rack: Arc<Mutex<Rack>>,
    sample_rate: u32,
    left_buf: Vec<f32>,
    right_buf: Vec<f32>,
    buf_pos: usize,
    /// Current channel (0 = left, 1 = right).
    channel: usize,
}

impl RackSource {
    fn new(rack: Arc<Mutex<Rack>>, sample_rate: u32) -> Self {
        Self {
            rack,
            sample_rate,
            left_buf: vec![0.0; BUFFER_SIZE],
            right_buf: vec![0.0; BUFFER_SIZE],
            buf_pos: BUFFER_SIZE, // Start at end to trigger first render
            channel: 0,
        }
    }

    fn render_block(&mut self) {
        let block_seconds = BUFFER_SIZE as f64 / self.sample_rate as f64;
        if let Ok(mut guard) = self.rack.lock() {
            let Rack { sequencer, synth } = &mut *guard;
            sequencer.advance(synth, block_seconds);
            synth.render(&mut self.left_buf, &mut self.right_buf);
        } else {
            self.left_buf.fill(0.0);
            self.right_buf.fill(0.0);
        }
        self.buf_pos = 0;
    }
}

impl Iterator for RackSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.buf_pos >= BUFFER_SIZE {
            self.render_block();
        }

        // Interleave stereo samples: L, R, L, R, ...
        let sample = if self.channel == 0 {
            self.left_buf[self.buf_pos]
        } else {
            self.right_buf[self.buf_pos]
        };

        self.channel = 1 - self.channel;
        if self.channel == 0 {
            self.buf_pos += 1;
        }

        Some(sample)
    }
}

impl Source for RackSource {
    fn current_frame_len(&self) -> Option<usize> {
        None // Continuous stream
    }

    fn channels(&self) -> u16 {
        2 // Stereo
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None // Infinite stream
    }
}

/// Live resources held while the device is open.
struct Output {
    rack: Arc<Mutex<Rack>>,
    /// Audio output stream (must be kept alive).
    _stream: OutputStream,
    _stream_handle: OutputStreamHandle,
}

/// Sequencer + rustysynth synthesizer + rodio output.
///
/// The output stream is not `Send`, so the device must be opened and used
/// on a single thread.
pub struct SynthDevice {
    soundfont_path: PathBuf,
    sample_rate: u32,
    output: Option<Output>,
}

impl SynthDevice {
    /// Creates a closed device that will synthesize with the given SoundFont.
    pub fn new<P: AsRef<Path>>(soundfont_path: P, sample_rate: u32) -> Self {
        Self {
            soundfont_path: soundfont_path.as_ref().to_path_buf(),
            sample_rate,
            output: None,
        }
    }

    fn load_synthesizer(&self) -> Result<Synthesizer, PlayerError> {
        let file = File::open(&self.soundfont_path).map_err(|e| {
            PlayerError::DeviceUnavailable(format!(
                "failed to open SoundFont {}: {}",
                self.soundfont_path.display(),
                e
            ))
        })?;
        let mut reader = BufReader::new(file);
        let soundfont = Arc::new(SoundFont::new(&mut reader).map_err(|e| {
            PlayerError::DeviceUnavailable(format!("failed to load SoundFont: {:?}", e))
        })?);

        let settings = SynthesizerSettings::new(self.sample_rate as i32);
        Synthesizer::new(&soundfont, &settings).map_err(|e| {
            PlayerError::DeviceUnavailable(format!("failed to create synthesizer: {:?}", e))
        })
    }

    /// Runs `f` against the rack if the device is open.
    fn with_rack<T>(&self, f: impl FnOnce(&mut Rack) -> T) -> Option<T> {
        let output = self.output.as_ref()?;
        let mut rack = output.rack.lock().ok()?;
        Some(f(&mut *rack))
    }
}

impl MidiDevice for SynthDevice {
    fn description(&self) -> String {
        let soundfont = self
            .soundfont_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.soundfont_path.display().to_string());
        format!(
            "sequencer -> rustysynth ({}, {} Hz)",
            soundfont, self.sample_rate
        )
    }

    fn open(&mut self) -> Result<(), PlayerError> {
        if self.output.is_some() {
            return Ok(());
        }

        let synth = self.load_synthesizer()?;
        let rack = Arc::new(Mutex::new(Rack {
            sequencer: Sequencer::new(),
            synth,
        }));

        let (stream, stream_handle) = OutputStream::try_default().map_err(|e| {
            PlayerError::DeviceUnavailable(format!("failed to open audio output: {}", e))
        })?;
        stream_handle
            .play_raw(RackSource::new(Arc::clone(&rack), self.sample_rate))
            .map_err(|e| {
                PlayerError::DeviceUnavailable(format!("failed to start audio output: {}", e))
            })?;

        self.output = Some(Output {
            rack,
            _stream: stream,
            _stream_handle: stream_handle,
        });
        Ok(())
    }

    fn close(&mut self) {
        self.stop();
        // Dropping the stream halts the audio callback.
        self.output = None;
    }

    fn is_open(&self) -> bool {
        self.output.is_some()
    }

    fn set_sequence(&mut self, sequence: Arc<Sequence>) -> Result<(), PlayerError> {
        self.with_rack(|rack| rack.sequencer.load(sequence))
            .ok_or_else(|| PlayerError::DeviceUnavailable("sequencer is not open".to_string()))
    }

    fn set_loop(&mut self, looping: bool) {
        self.with_rack(|rack| rack.sequencer.set_looping(looping));
    }

    fn start(&mut self) -> Result<(), PlayerError> {
        match self.with_rack(|rack| rack.sequencer.start()) {
            Some(true) => Ok(()),
            Some(false) => Err(PlayerError::DeviceUnavailable(
                "sequencer has no sequence loaded".to_string(),
            )),
            None => Err(PlayerError::DeviceUnavailable(
                "sequencer is not open".to_string(),
            )),
        }
    }

    fn stop(&mut self) {
        self.with_rack(|rack| {
            rack.sequencer.stop();
            rack.synth.note_off_all(true);
        });
    }

    fn is_running(&self) -> bool {
        self.with_rack(|rack| rack.sequencer.is_running())
            .unwrap_or(false)
    }

    fn set_channel_controller(&mut self, channel: u8, controller: u8, value: u8) {
        self.with_rack(|rack| {
            rack.synth.process_midi_message(
                channel as i32,
                status::CONTROL_CHANGE as i32,
                controller as i32,
                value as i32,
            );
        });
    }
}
