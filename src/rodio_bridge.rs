use crate::bridge::{BridgeError, PlaybackBridge, PlaybackEvent};
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
use std::collections::VecDeque;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::{Duration, Instant};

/// rodio's try_seek flushes the buffer, so `empty()` reads true for a moment after a seek.
const SEEK_COOLDOWN: Duration = Duration::from_millis(500);

/// PlaybackBridge over the default audio output. URIs are local file paths.
///
/// Not `Send` (the output stream must stay on its thread), so build it inside
/// the session runtime's bridge factory.
pub struct RodioBridge {
    _stream: OutputStream,
    stream_handle: OutputStreamHandle,
    sink: Option<Sink>,
    playing: bool,
    last_seek: Option<Instant>,
    events: VecDeque<PlaybackEvent>,
}

impl RodioBridge {
    /// Open the default audio output.
    pub fn new() -> Result<Self, BridgeError> {
        let (stream, handle) =
            OutputStream::try_default().map_err(|e| BridgeError::Output(e.to_string()))?;
        Ok(RodioBridge {
            _stream: stream,
            stream_handle: handle,
            sink: None,
            playing: false,
            last_seek: None,
            events: VecDeque::new(),
        })
    }

    fn open(&self, uri: &str) -> Result<Decoder<BufReader<File>>, BridgeError> {
        let file = File::open(Path::new(uri)).map_err(|e| BridgeError::Open {
            uri: uri.to_string(),
            reason: e.to_string(),
        })?;
        Decoder::new(BufReader::new(file)).map_err(|e| BridgeError::Decode {
            uri: uri.to_string(),
            reason: e.to_string(),
        })
    }

    fn in_seek_cooldown(&self) -> bool {
        self.last_seek
            .map(|t| t.elapsed() < SEEK_COOLDOWN)
            .unwrap_or(false)
    }
}

impl PlaybackBridge for RodioBridge {
    fn load_and_play(&mut self, uri: &str, start_position_millis: u64) -> Result<(), BridgeError> {
        if let Some(old) = self.sink.take() {
            old.stop();
        }
        self.playing = false;

        let source = self.open(uri)?;
        let sink =
            Sink::try_new(&self.stream_handle).map_err(|e| BridgeError::Output(e.to_string()))?;
        sink.append(source);
        if start_position_millis > 0 {
            match sink.try_seek(Duration::from_millis(start_position_millis)) {
                Ok(()) => self.last_seek = Some(Instant::now()),
                Err(e) => log::warn!("Cannot resume '{}' at {} ms: {}", uri, start_position_millis, e),
            }
        }
        sink.play();
        self.sink = Some(sink);
        self.playing = true;
        self.events.push_back(PlaybackEvent::Started);
        Ok(())
    }

    fn pause(&mut self) {
        if let Some(sink) = &self.sink {
            sink.pause();
        }
    }

    fn resume(&mut self) {
        if let Some(sink) = &self.sink {
            sink.play();
            if self.playing {
                self.events.push_back(PlaybackEvent::Started);
            }
        }
    }

    fn seek(&mut self, position_millis: u64) -> Result<(), BridgeError> {
        let sink = self
            .sink
            .as_ref()
            .ok_or_else(|| BridgeError::Seek("nothing loaded".to_string()))?;
        sink.try_seek(Duration::from_millis(position_millis))
            .map_err(|e| BridgeError::Seek(e.to_string()))?;
        self.last_seek = Some(Instant::now());
        Ok(())
    }

    fn current_position(&self) -> u64 {
        self.sink
            .as_ref()
            .map_or(0, |sink| sink.get_pos().as_millis() as u64)
    }

    fn poll_event(&mut self) -> Option<PlaybackEvent> {
        if let Some(event) = self.events.pop_front() {
            return Some(event);
        }
        if !self.playing || self.in_seek_cooldown() {
            return None;
        }
        let finished = self.sink.as_ref().is_some_and(|sink| sink.empty());
        if finished {
            self.playing = false;
            return Some(PlaybackEvent::Completed);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bridge_creation_succeeds_or_fails_gracefully() {
        match RodioBridge::new() {
            Ok(mut bridge) => {
                assert_eq!(bridge.current_position(), 0);
                assert_eq!(bridge.poll_event(), None);
            }
            Err(e) => assert!(matches!(e, BridgeError::Output(_))),
        }
    }

    #[test]
    fn load_rejects_missing_file() {
        if let Ok(mut bridge) = RodioBridge::new() {
            let err = bridge
                .load_and_play("__nonexistent_ad__.mp3", 0)
                .unwrap_err();
            assert!(matches!(err, BridgeError::Open { .. }));
            assert_eq!(bridge.poll_event(), None);
        }
    }

    #[test]
    fn seek_without_source_fails() {
        if let Ok(mut bridge) = RodioBridge::new() {
            assert!(bridge.seek(1000).is_err());
        }
    }
}
