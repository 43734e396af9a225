use crate::bridge::BridgeError;
use crate::controller::PlaybackPhase;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControllerError {
    /// A directive or host command arrived in a phase that does not accept it.
    #[error("'{input}' is not valid while {phase}")]
    InvalidTransition {
        input: &'static str,
        phase: PlaybackPhase,
    },
    /// The ad session flagged an out-of-order report under the strict policy.
    #[error("ad session reported an illegal operation: {0}")]
    ProtocolViolation(String),
    /// The ad-timeout fired with no ad bound; a cancellation was missed.
    #[error("ad timeout fired with no current ad")]
    TimeoutWithoutAd,
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    #[error("cannot spawn session runtime: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("session runtime panicked")]
    RuntimePanicked,
}

impl ControllerError {
    /// Fatal errors end the session; the rest are rejections the host may log.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ControllerError::ProtocolViolation(_) | ControllerError::TimeoutWithoutAd
        )
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot write '{path}': {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("cannot serialise transcript: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("cannot write transcript '{path}': {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}
