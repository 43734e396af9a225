//! PlaybackBridge: the controller's only edge to the media engine.
//!
//! Commands go down through the trait; engine events come back as
//! [`PlaybackEvent`] values posted on the session's sequencing context
//! (see `runtime`), or drained via [`PlaybackBridge::poll_event`] by bridges
//! that observe their engine by polling.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Engine-level error codes, modelled on the usual media-player taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineErrorCode {
    /// The engine could not identify or decode the stream.
    Unknown,
    /// The media server or its connection went away.
    ServerDied,
    /// The source could not be opened.
    Io,
    /// Any other engine-specific code.
    Other(i32),
}

/// Events a bridge reports back to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    Started,
    Completed,
    Error(EngineErrorCode),
    TouchDown,
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("cannot open '{uri}': {reason}")]
    Open { uri: String, reason: String },
    #[error("cannot decode '{uri}': {reason}")]
    Decode { uri: String, reason: String },
    #[error("audio output unavailable: {0}")]
    Output(String),
    #[error("seek failed: {0}")]
    Seek(String),
}

impl BridgeError {
    /// Engine code equivalent of a failed command, for ad-failure mapping.
    pub fn engine_code(&self) -> EngineErrorCode {
        match self {
            BridgeError::Decode { .. } => EngineErrorCode::Unknown,
            BridgeError::Open { .. } | BridgeError::Seek(_) => EngineErrorCode::Io,
            BridgeError::Output(_) => EngineErrorCode::Other(-1),
        }
    }
}

/// Adapter over the host's media engine.
///
/// URIs are opaque; the host decides how to resolve them.
pub trait PlaybackBridge {
    /// Bind `uri` and start playing from `start_position_millis`.
    fn load_and_play(&mut self, uri: &str, start_position_millis: u64) -> Result<(), BridgeError>;

    fn pause(&mut self);

    /// Continue playback of the bound stream.
    fn resume(&mut self);

    fn seek(&mut self, position_millis: u64) -> Result<(), BridgeError>;

    /// Current position in milliseconds; zero until the engine produces samples.
    fn current_position(&self) -> u64;

    /// Show or hide the host's playback controls.
    fn set_controls_visible(&mut self, _visible: bool) {}

    /// Next engine event observed by polling, if this bridge works that way.
    fn poll_event(&mut self) -> Option<PlaybackEvent> {
        None
    }
}

impl<B: PlaybackBridge + ?Sized> PlaybackBridge for Box<B> {
    fn load_and_play(&mut self, uri: &str, start_position_millis: u64) -> Result<(), BridgeError> {
        (**self).load_and_play(uri, start_position_millis)
    }

    fn pause(&mut self) {
        (**self).pause()
    }

    fn resume(&mut self) {
        (**self).resume()
    }

    fn seek(&mut self, position_millis: u64) -> Result<(), BridgeError> {
        (**self).seek(position_millis)
    }

    fn current_position(&self) -> u64 {
        (**self).current_position()
    }

    fn set_controls_visible(&mut self, visible: bool) {
        (**self).set_controls_visible(visible)
    }

    fn poll_event(&mut self) -> Option<PlaybackEvent> {
        (**self).poll_event()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bridge_errors_map_to_engine_codes() {
        let decode = BridgeError::Decode {
            uri: "a.mp3".into(),
            reason: "bad header".into(),
        };
        assert_eq!(decode.engine_code(), EngineErrorCode::Unknown);

        let open = BridgeError::Open {
            uri: "a.mp3".into(),
            reason: "missing".into(),
        };
        assert_eq!(open.engine_code(), EngineErrorCode::Io);
        assert_eq!(
            BridgeError::Output("no device".into()).engine_code(),
            EngineErrorCode::Other(-1)
        );
    }

    #[test]
    fn bridge_error_messages_name_the_uri() {
        let err = BridgeError::Open {
            uri: "ads/spot.mp3".into(),
            reason: "not found".into(),
        };
        assert_eq!(err.to_string(), "cannot open 'ads/spot.mp3': not found");
    }
}
