//! Single-slot command handoff between producers and the poll loop.
//!
//! A post overwrites whatever is waiting; the poll loop takes the slot and
//! leaves it empty. Commands describe desired steady state, so only the most
//! recent one matters and nothing is queued.

use crate::command::Command;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Overwrite-on-write command slot.
#[derive(Debug, Default)]
pub struct Mailbox {
    slot: Mutex<Option<Command>>,
}

impl Mailbox {
    /// Creates an empty mailbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Posts a command, replacing any unread one.
    ///
    /// Returns the command that was overwritten, if any.
    pub fn post(&self, command: Command) -> Option<Command> {
        let replaced = self.lock().replace(command);
        if let Some(ref lost) = replaced {
            tracing::debug!("Mailbox overwrote unread command: {}", lost);
        }
        replaced
    }

    /// Decodes a producer request and posts it.
    ///
    /// See [`Command::decode`] for the string protocol.
    pub fn post_command(&self, track_or_keyword: &str, volume: i32, loop_tracks: bool) {
        self.post(Command::decode(track_or_keyword, volume, loop_tracks));
    }

    /// Takes the waiting command, leaving the slot empty.
    pub fn take(&self) -> Option<Command> {
        self.lock().take()
    }

    /// Returns true if no command is waiting.
    pub fn is_empty(&self) -> bool {
        self.lock().is_none()
    }

    /// The slot only ever holds plain data, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, Option<Command>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
