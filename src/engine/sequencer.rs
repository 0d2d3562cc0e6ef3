//! Real-time sequencer.
//!
//! Replays a [`Sequence`] into an [`EventReceiver`] as the audio clock
//! advances. The audio thread calls [`Sequencer::advance`] once per rendered
//! block with the block length in seconds; every event that falls inside the
//! block is sent before the block is rendered.

use crate::track::{MidiEvent, Sequence};
use std::sync::Arc;

/// Sequences shorter than this never loop (avoids spinning on empty files).
const MIN_LOOP_SECONDS: f64 = 1e-3;

/// Destination for sequenced events (the synthesizer's input).
pub trait EventReceiver {
    /// Delivers one channel message.
    fn send(&mut self, event: &MidiEvent);

    /// Releases every sounding note.
    fn silence(&mut self);
}

/// Playback cursor over a loaded sequence.
#[derive(Debug, Default)]
pub struct Sequencer {
    sequence: Option<Arc<Sequence>>,
    looping: bool,
    running: bool,
    /// Seconds into the current pass.
    position: f64,
    /// Index of the next event to send.
    next_event: usize,
    /// Completed passes since the sequence was loaded.
    passes: u64,
}

impl Sequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a sequence and rewinds. Playback state is left unchanged.
    pub fn load(&mut self, sequence: Arc<Sequence>) {
        self.sequence = Some(sequence);
        self.rewind();
        self.passes = 0;
    }

    /// Moves back to the start of the sequence.
    pub fn rewind(&mut self) {
        self.position = 0.0;
        self.next_event = 0;
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    /// Starts playback. Returns false if nothing is loaded.
    pub fn start(&mut self) -> bool {
        if self.sequence.is_none() {
            return false;
        }
        // A finished single-shot pass restarts from the top.
        if self.at_end() {
            self.rewind();
        }
        self.running = true;
        true
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn passes(&self) -> u64 {
        self.passes
    }

    fn at_end(&self) -> bool {
        self.sequence
            .as_ref()
            .is_some_and(|s| self.next_event >= s.events().len() && self.position >= s.duration())
    }

    /// Advances the cursor by `seconds`, sending every event that comes due.
    pub fn advance<R: EventReceiver + ?Sized>(&mut self, receiver: &mut R, seconds: f64) {
        if !self.running {
            return;
        }
        let Some(sequence) = self.sequence.clone() else {
            self.running = false;
            return;
        };
        let events = sequence.events();
        let duration = sequence.duration();
        let mut target = self.position + seconds.max(0.0);

        loop {
            while let Some(event) = events.get(self.next_event) {
                if event.time > target {
                    break;
                }
                receiver.send(event);
                self.next_event += 1;
            }

            if target < duration {
                self.position = target;
                return;
            }

            self.passes += 1;
            receiver.silence();

            if !self.looping || duration < MIN_LOOP_SECONDS {
                self.position = duration;
                self.running = false;
                return;
            }

            target -= duration;
            self.rewind();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::status;

    #[derive(Default)]
    struct Recorder {
        sent: Vec<(u8, u8)>,
        silenced: usize,
    }

    impl EventReceiver for Recorder {
        fn send(&mut self, event: &MidiEvent) {
            self.sent.push((event.command, event.data1));
        }

        fn silence(&mut self) {
            self.silenced += 1;
        }
    }

    /// Note on at 0.0, note off at 0.5, one-second pass.
    fn one_note() -> Arc<Sequence> {
        Arc::new(Sequence::new(
            vec![
                MidiEvent::new(0.0, 0, status::NOTE_ON, 60, 100),
                MidiEvent::new(0.5, 0, status::NOTE_OFF, 60, 0),
            ],
            1.0,
        ))
    }

    #[test]
    fn test_events_sent_when_due() {
        let mut sequencer = Sequencer::new();
        let mut recorder = Recorder::default();
        sequencer.load(one_note());
        assert!(sequencer.start());

        sequencer.advance(&mut recorder, 0.25);
        assert_eq!(recorder.sent, vec![(status::NOTE_ON, 60)]);

        sequencer.advance(&mut recorder, 0.25);
        assert_eq!(recorder.sent.len(), 2);
        assert!(sequencer.is_running());
    }

    #[test]
    fn test_single_shot_stops_at_end() {
        let mut sequencer = Sequencer::new();
        let mut recorder = Recorder::default();
        sequencer.load(one_note());
        sequencer.set_looping(false);
        sequencer.start();

        sequencer.advance(&mut recorder, 3.0);
        assert_eq!(recorder.sent.len(), 2);
        assert_eq!(recorder.silenced, 1);
        assert!(!sequencer.is_running());
        assert_eq!(sequencer.passes(), 1);

        // Restarting a finished pass plays it again from the top.
        assert!(sequencer.start());
        sequencer.advance(&mut recorder, 0.1);
        assert_eq!(recorder.sent.len(), 3);
    }

    #[test]
    fn test_looping_wraps() {
        let mut sequencer = Sequencer::new();
        let mut recorder = Recorder::default();
        sequencer.load(one_note());
        sequencer.set_looping(true);
        sequencer.start();

        sequencer.advance(&mut recorder, 2.25);
        // Two full passes plus the start of a third.
        assert_eq!(recorder.sent.len(), 5);
        assert_eq!(sequencer.passes(), 2);
        assert!((sequencer.position() - 0.25).abs() < 1e-9);
        assert!(sequencer.is_running());
    }

    #[test]
    fn test_stopped_sequencer_sends_nothing() {
        let mut sequencer = Sequencer::new();
        let mut recorder = Recorder::default();
        sequencer.load(one_note());

        sequencer.advance(&mut recorder, 1.0);
        assert!(recorder.sent.is_empty());

        sequencer.start();
        sequencer.stop();
        sequencer.advance(&mut recorder, 1.0);
        assert!(recorder.sent.is_empty());
    }

    #[test]
    fn test_start_without_sequence() {
        let mut sequencer = Sequencer::new();
        assert!(!sequencer.start());
        assert!(!sequencer.is_running());
    }

    #[test]
    fn test_empty_sequence_does_not_spin() {
        let mut sequencer = Sequencer::new();
        let mut recorder = Recorder::default();
        sequencer.load(Arc::new(Sequence::default()));
        sequencer.set_looping(true);
        sequencer.start();

        sequencer.advance(&mut recorder, 1.0);
        assert!(!sequencer.is_running());
        assert_eq!(sequencer.passes(), 1);
    }
}
