//! The ad-decision session's side of the contract: directives it issues and
//! the lifecycle reports it consumes.

use crate::bridge::EngineErrorCode;
use crate::rendition::MediaRendition;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// An ad chosen by the decision service. Shared read-only with the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoAd {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub click_through_url: Option<String>,
    #[serde(default)]
    pub media_files: Vec<MediaRendition>,
}

impl VideoAd {
    pub fn new(id: impl Into<String>, media_files: Vec<MediaRendition>) -> Self {
        VideoAd {
            id: id.into(),
            title: None,
            click_through_url: None,
            media_files,
        }
    }
}

/// Closed set of reasons an ad can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdFailureReason {
    UnsupportedMedia,
    TimedOut,
    CouldNotPlay,
}

impl AdFailureReason {
    pub fn from_engine_code(code: EngineErrorCode) -> Self {
        match code {
            EngineErrorCode::Unknown => AdFailureReason::UnsupportedMedia,
            EngineErrorCode::ServerDied => AdFailureReason::TimedOut,
            EngineErrorCode::Io | EngineErrorCode::Other(_) => AdFailureReason::CouldNotPlay,
        }
    }
}

impl fmt::Display for AdFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdFailureReason::UnsupportedMedia => write!(f, "no supported media file"),
            AdFailureReason::TimedOut => write!(f, "timed out"),
            AdFailureReason::CouldNotPlay => write!(f, "could not play"),
        }
    }
}

/// Directives issued by the ad session.
#[derive(Debug, Clone)]
pub enum Directive {
    StartContent,
    StartAdBreak,
    StartAdPlayback {
        ad: Arc<VideoAd>,
        renditions: Vec<MediaRendition>,
        timeout: Duration,
    },
    SessionEnded,
    IllegalOperation { reason: String },
}

impl Directive {
    /// Ad playback directive using the ad's own media files as candidates.
    pub fn play_ad(ad: Arc<VideoAd>, timeout: Duration) -> Self {
        let renditions = ad.media_files.clone();
        Directive::StartAdPlayback {
            ad,
            renditions,
            timeout,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Directive::StartContent => "start content",
            Directive::StartAdBreak => "start ad break",
            Directive::StartAdPlayback { .. } => "start ad playback",
            Directive::SessionEnded => "session ended",
            Directive::IllegalOperation { .. } => "illegal operation",
        }
    }
}

/// Lifecycle reports consumed by the ad session.
///
/// Ad-scoped reports carry the ad they refer to, as handed over in
/// [`Directive::StartAdPlayback`].
pub trait AdSessionProtocol {
    fn content_started(&mut self);
    fn content_finished(&mut self);
    /// Content position in whole seconds.
    fn content_position_changed(&mut self, seconds: f64);

    fn ad_started(&mut self, ad: &VideoAd);
    fn ad_paused(&mut self, ad: &VideoAd);
    fn ad_resumed(&mut self, ad: &VideoAd);
    fn ad_finished(&mut self, ad: &VideoAd);
    fn ad_failed(&mut self, ad: &VideoAd, reason: AdFailureReason);
    /// Ad position in fractional seconds.
    fn ad_position_changed(&mut self, ad: &VideoAd, seconds: f64);
    fn ad_click_through_triggered(&mut self, ad: &VideoAd);

    /// Tear the ad session down. Nothing is reported after this call.
    fn stop_session(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_codes_map_to_failure_reasons() {
        assert_eq!(
            AdFailureReason::from_engine_code(EngineErrorCode::Unknown),
            AdFailureReason::UnsupportedMedia
        );
        assert_eq!(
            AdFailureReason::from_engine_code(EngineErrorCode::ServerDied),
            AdFailureReason::TimedOut
        );
        assert_eq!(
            AdFailureReason::from_engine_code(EngineErrorCode::Other(-1004)),
            AdFailureReason::CouldNotPlay
        );
        assert_eq!(
            AdFailureReason::from_engine_code(EngineErrorCode::Io),
            AdFailureReason::CouldNotPlay
        );
    }

    #[test]
    fn play_ad_uses_media_files_as_candidates() {
        let ad = Arc::new(VideoAd::new(
            "spot-1",
            vec![MediaRendition::new("a.mp4", 500), MediaRendition::new("b.mp4", 900)],
        ));
        match Directive::play_ad(ad, Duration::from_secs(10)) {
            Directive::StartAdPlayback {
                renditions, timeout, ..
            } => {
                assert_eq!(renditions.len(), 2);
                assert_eq!(timeout, Duration::from_secs(10));
            }
            other => panic!("unexpected directive: {:?}", other),
        }
    }

    #[test]
    fn failure_reason_serializes_snake_case() {
        let json = serde_json::to_string(&AdFailureReason::TimedOut).unwrap();
        assert_eq!(json, "\"timed_out\"");
    }
}
