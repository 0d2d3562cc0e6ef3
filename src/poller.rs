//! The background command loop.
//!
//! Each tick takes whatever is waiting in the mailbox and acts on it:
//!
//! - volume changes are always applied, even when the level is unchanged
//! - play and stop are applied only if they differ from the last play/stop
//!   acted on, so a producer can keep re-posting the track it wants without
//!   restarting it
//!
//! When the mailbox is empty the loop sleeps for the poll interval. The
//! sleep doubles as the wait for a shutdown signal, so a stop request is
//! seen immediately rather than at the next tick.

use crate::command::Command;
use crate::engine::device::MidiDevice;
use crate::engine::{PlaybackEngine, PlayerState, VolumeOutcome};
use crate::mailbox::Mailbox;
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The mailbox was empty.
    Empty,
    /// A volume change was applied (or remembered while closed).
    Volume(VolumeOutcome),
    /// A play or stop command was acted on.
    Dispatched(Command),
    /// The command matched the last one acted on and was dropped.
    Duplicate,
    /// The command failed; the loop carries on.
    Failed,
    /// The device was lost; the loop must end.
    Fatal,
}

/// Polls the mailbox and drives the playback engine.
pub struct CommandPoller<D: MidiDevice> {
    mailbox: Arc<Mailbox>,
    engine: PlaybackEngine<D>,
    interval: Duration,
    status: Option<Arc<Mutex<PlayerState>>>,
}

impl<D: MidiDevice> CommandPoller<D> {
    pub fn new(mailbox: Arc<Mailbox>, engine: PlaybackEngine<D>, interval: Duration) -> Self {
        Self {
            mailbox,
            engine,
            interval,
            status: None,
        }
    }

    /// Publishes a copy of the player state here after every command and
    /// whenever a single-shot track runs out.
    pub fn with_status(mut self, status: Arc<Mutex<PlayerState>>) -> Self {
        self.status = Some(status);
        self
    }

    pub fn engine(&self) -> &PlaybackEngine<D> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut PlaybackEngine<D> {
        &mut self.engine
    }

    /// Takes one command from the mailbox and handles it.
    pub fn tick(&mut self) -> TickOutcome {
        if self.engine.sync_transport() {
            self.publish();
        }

        let Some(command) = self.mailbox.take() else {
            return TickOutcome::Empty;
        };
        let outcome = self.handle(command);
        self.publish();
        outcome
    }

    fn handle(&mut self, command: Command) -> TickOutcome {
        match command {
            Command::VolumeAdjust { level } => self.adjust_volume(level),
            command => self.dispatch(command),
        }
    }

    fn adjust_volume(&mut self, level: i32) -> TickOutcome {
        let outcome = self.engine.apply_volume(level);
        match outcome {
            VolumeOutcome::Applied { channel_volume } => {
                tracing::info!(
                    "MIDI volume adjusted to: {} (channel volume {})",
                    level,
                    channel_volume
                );
            }
            VolumeOutcome::Ignored => {
                tracing::debug!("MIDI volume {} stored; synthesizer not open", level);
            }
        }
        TickOutcome::Volume(outcome)
    }

    fn dispatch(&mut self, command: Command) -> TickOutcome {
        if self.engine.state().last_dispatched.as_ref() == Some(&command) {
            tracing::trace!("Ignoring repeated command: {}", command);
            return TickOutcome::Duplicate;
        }
        self.engine.record_dispatch(command.clone());
        tracing::debug!("Dispatching: {}", command);

        // Only play and stop reach here.
        let result = if let Command::Play { track, looping } = &command {
            self.engine.play(track, *looping)
        } else {
            self.engine.stop();
            Ok(())
        };

        match result {
            Ok(()) => TickOutcome::Dispatched(command),
            Err(e) if !self.engine.is_open() => {
                tracing::error!("MIDI device lost while handling {}: {}", command, e);
                TickOutcome::Fatal
            }
            Err(e) => {
                tracing::error!("Error playing MIDI: {}", e);
                TickOutcome::Failed
            }
        }
    }

    fn publish(&self) {
        if let Some(status) = &self.status {
            *status.lock().unwrap_or_else(PoisonError::into_inner) = self.engine.state().clone();
        }
    }

    /// Runs until `shutdown` fires or disconnects, then hands the engine back.
    ///
    /// The engine is returned still open; closing it is up to the caller.
    pub fn run(mut self, shutdown: &Receiver<()>) -> PlaybackEngine<D> {
        tracing::info!("MIDI player thread started");

        loop {
            match shutdown.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {}
            }

            match self.tick() {
                TickOutcome::Fatal => break,
                TickOutcome::Empty => match shutdown.recv_timeout(self.interval) {
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                },
                _ => {}
            }
        }

        tracing::info!("MIDI player thread stopped");
        self.engine
    }
}
