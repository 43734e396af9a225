//! In-memory PlaybackBridge for tests and dry runs.

use crate::bridge::{BridgeError, PlaybackBridge, PlaybackEvent};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// A command the controller issued to the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeCommand {
    LoadAndPlay {
        uri: String,
        start_position_millis: u64,
    },
    Pause,
    Resume,
    Seek(u64),
}

#[derive(Debug, Default)]
struct MockState {
    commands: Vec<BridgeCommand>,
    position_millis: u64,
    controls_visible: bool,
    fail_next_load: bool,
    seek_unsupported: bool,
    queued_events: VecDeque<PlaybackEvent>,
}

/// Records every command; position and events are driven by the test.
/// Clones share state, so a test can keep one while the controller owns another.
#[derive(Debug, Clone, Default)]
pub struct MockBridge {
    state: Arc<Mutex<MockState>>,
}

impl MockBridge {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A panicking test thread must not hide the recorded commands.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn commands(&self) -> Vec<BridgeCommand> {
        self.lock().commands.clone()
    }

    pub fn set_position(&self, millis: u64) {
        self.lock().position_millis = millis;
    }

    pub fn controls_visible(&self) -> bool {
        self.lock().controls_visible
    }

    /// Make the next `load_and_play` fail as if the source could not be opened.
    pub fn fail_next_load(&self) {
        self.lock().fail_next_load = true;
    }

    pub fn set_seek_unsupported(&self, unsupported: bool) {
        self.lock().seek_unsupported = unsupported;
    }

    /// Queue an event for `poll_event`.
    pub fn push_event(&self, event: PlaybackEvent) {
        self.lock().queued_events.push_back(event);
    }
}

impl PlaybackBridge for MockBridge {
    fn load_and_play(&mut self, uri: &str, start_position_millis: u64) -> Result<(), BridgeError> {
        let mut state = self.lock();
        if state.fail_next_load {
            state.fail_next_load = false;
            return Err(BridgeError::Open {
                uri: uri.to_string(),
                reason: "mock load failure".to_string(),
            });
        }
        state.commands.push(BridgeCommand::LoadAndPlay {
            uri: uri.to_string(),
            start_position_millis,
        });
        state.position_millis = 0;
        Ok(())
    }

    fn pause(&mut self) {
        self.lock().commands.push(BridgeCommand::Pause);
    }

    fn resume(&mut self) {
        self.lock().commands.push(BridgeCommand::Resume);
    }

    fn seek(&mut self, position_millis: u64) -> Result<(), BridgeError> {
        let mut state = self.lock();
        if state.seek_unsupported {
            return Err(BridgeError::Seek("stream is not seekable".to_string()));
        }
        state.commands.push(BridgeCommand::Seek(position_millis));
        state.position_millis = position_millis;
        Ok(())
    }

    fn current_position(&self) -> u64 {
        self.lock().position_millis
    }

    fn set_controls_visible(&mut self, visible: bool) {
        self.lock().controls_visible = visible;
    }

    fn poll_event(&mut self) -> Option<PlaybackEvent> {
        self.lock().queued_events.pop_front()
    }
}
