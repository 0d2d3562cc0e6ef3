//! Player lifecycle.
//!
//! [`MidiPlayer`] owns the background thread. Starting it opens the device
//! on that thread (the audio output cannot move between threads) and waits
//! for the result, so a missing device is reported to the caller and the
//! loop never starts. Stopping it signals the loop, which closes the engine
//! before the thread exits.

use crate::command::Command;
use crate::config::PlayerConfig;
use crate::engine::device::MidiDevice;
use crate::engine::{PlaybackEngine, PlayerState, SynthDevice};
use crate::error::PlayerError;
use crate::mailbox::Mailbox;
use crate::poller::CommandPoller;
use crate::track::{SmfLoader, TrackLoader};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

/// Handle to a running player.
///
/// Producers post commands through the handle (or a shared [`Mailbox`]
/// obtained from it); they never block and never touch the engine.
pub struct MidiPlayer {
    mailbox: Arc<Mailbox>,
    status: Arc<Mutex<PlayerState>>,
    shutdown: Option<mpsc::Sender<()>>,
    worker: Option<JoinHandle<()>>,
    loop_tracks: bool,
}

impl MidiPlayer {
    /// Starts a player with the SoundFont synthesizer and SMF loader.
    ///
    /// # Errors
    ///
    /// - `Config` if the configuration is invalid
    /// - `DeviceUnavailable` if the synthesizer or audio output cannot be opened
    pub fn start(config: &PlayerConfig) -> Result<Self, PlayerError> {
        let soundfont = config.soundfont.clone();
        let sample_rate = config.sample_rate;
        Self::start_with(config, Arc::new(SmfLoader), move || {
            SynthDevice::new(soundfont, sample_rate)
        })
    }

    /// Starts a player with a custom device and track loader.
    ///
    /// `make_device` runs on the player thread, so the device itself does
    /// not need to be `Send`.
    pub fn start_with<D, F>(
        config: &PlayerConfig,
        loader: Arc<dyn TrackLoader>,
        make_device: F,
    ) -> Result<Self, PlayerError>
    where
        D: MidiDevice + 'static,
        F: FnOnce() -> D + Send + 'static,
    {
        config.validate()?;

        let mailbox = Arc::new(Mailbox::new());
        let status = Arc::new(Mutex::new(PlayerState {
            current_volume: config.initial_volume,
            ..PlayerState::default()
        }));
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), PlayerError>>(1);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let interval = config.poll_interval();
        let load_timeout = config.load_timeout();
        let initial_volume = config.initial_volume;
        let worker_mailbox = Arc::clone(&mailbox);
        let worker_status = Arc::clone(&status);

        let worker = thread::Builder::new()
            .name("midiloop-player".to_string())
            .spawn(move || {
                let mut engine = PlaybackEngine::new(make_device(), loader)
                    .with_load_timeout(load_timeout)
                    .with_volume(initial_volume);

                if let Err(e) = engine.open() {
                    tracing::error!("MIDI unavailable: {}", e);
                    let _ = ready_tx.send(Err(e));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                let poller = CommandPoller::new(worker_mailbox, engine, interval)
                    .with_status(Arc::clone(&worker_status));
                let mut engine = poller.run(&shutdown_rx);
                engine.close();

                *worker_status.lock().unwrap_or_else(PoisonError::into_inner) =
                    engine.state().clone();
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                mailbox,
                status,
                shutdown: Some(shutdown_tx),
                worker: Some(worker),
                loop_tracks: config.loop_tracks,
            }),
            Ok(Err(e)) => {
                let _ = worker.join();
                Err(e)
            }
            Err(_) => {
                let _ = worker.join();
                Err(PlayerError::DeviceUnavailable(
                    "player thread exited during startup".to_string(),
                ))
            }
        }
    }

    /// Posts a command, replacing any the loop has not picked up yet.
    pub fn post(&self, command: Command) {
        self.mailbox.post(command);
    }

    /// Posts a request in the producer string protocol.
    ///
    /// `"stop"` stops, `"voladjust"` sets the volume to `volume`, anything
    /// else is a track path to play.
    pub fn post_command(&self, track_or_keyword: &str, volume: i32) {
        self.mailbox
            .post_command(track_or_keyword, volume, self.loop_tracks);
    }

    /// Shared mailbox for producers on other threads.
    pub fn mailbox(&self) -> Arc<Mailbox> {
        Arc::clone(&self.mailbox)
    }

    /// Copy of the state as of the last handled command.
    pub fn status(&self) -> PlayerState {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns true while the background loop is alive.
    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Stops the loop, closes the engine and joins the thread.
    ///
    /// Safe to call more than once.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        if let Some(shutdown) = self.shutdown.take() {
            // Fails only if the loop already ended on its own.
            let _ = shutdown.send(());
        }
        if worker.join().is_err() {
            tracing::error!("MIDI player thread panicked");
        }
    }
}

impl Drop for MidiPlayer {
    fn drop(&mut self) {
        self.stop();
    }
}
