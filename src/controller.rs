//! AdInsertionSessionController: the state machine at the centre of a session.
//!
//! One controller exists per content-playback session. It is the only owner
//! of the playback phase, the content/ad state and both timers; the bridge
//! and the ad session only feed it inputs through the `handle_*` entry points
//! and receive commands/reports back. Every entry point runs to completion
//! before the next input is taken, so no state here needs locking.

use crate::bridge::{EngineErrorCode, PlaybackBridge, PlaybackEvent};
use crate::config::{SessionConfig, ViolationPolicy};
use crate::error::ControllerError;
use crate::protocol::{AdFailureReason, AdSessionProtocol, Directive, VideoAd};
use crate::rendition::{select_best_rendition, MediaRendition};
use crate::timer::{Clock, SystemClock, Timer, TimerHandle};
use log::{debug, error, info, trace, warn};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Invoked once per click-through with the ad that was clicked.
pub type ClickThroughCallback = Box<dyn FnMut(&VideoAd) + Send>;

// ── State ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackPhase {
    Idle,
    ContentPlaying,
    ContentPaused,
    AdBreakEntered,
    AdLoading,
    AdPlaying,
    AdPausedForClickThrough,
    SessionEnded,
}

impl fmt::Display for PlaybackPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlaybackPhase::Idle => "idle",
            PlaybackPhase::ContentPlaying => "content playing",
            PlaybackPhase::ContentPaused => "content paused",
            PlaybackPhase::AdBreakEntered => "in ad break",
            PlaybackPhase::AdLoading => "ad loading",
            PlaybackPhase::AdPlaying => "ad playing",
            PlaybackPhase::AdPausedForClickThrough => "ad paused for click-through",
            PlaybackPhase::SessionEnded => "session ended",
        };
        write!(f, "{}", name)
    }
}

/// Where content stands while the phase is `ContentPlaying`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentPlayback {
    /// Loaded, waiting for the engine to confirm playback.
    Pending,
    Advancing,
    Finished,
    /// The engine reported an error; waiting for the next directive.
    Stalled,
}

#[derive(Debug, Clone)]
pub struct ContentState {
    pub content_uri: String,
    pub last_known_position_millis: u64,
    /// Latch: flips to true the first time content start is reported, never back.
    pub content_start_reported: bool,
    pub playback: ContentPlayback,
}

#[derive(Debug, Clone, Default)]
pub struct AdState {
    pub current_ad: Option<Arc<VideoAd>>,
    pub selected_rendition_url: Option<String>,
    pub timeout: Duration,
    pub last_known_position_millis: u64,
    pub click_through_pending: bool,
}

// ── Controller ───────────────────────────────────────────────────────────────

pub struct AdInsertionSessionController<B, P, C = SystemClock> {
    phase: PlaybackPhase,
    content: ContentState,
    ad: AdState,
    ad_timeout: Timer,
    progress: Timer,
    policy: ViolationPolicy,
    bridge: B,
    /// `None` once the ad session has been stopped; reports are dropped after that.
    protocol: Option<P>,
    clock: C,
    click_through: Option<ClickThroughCallback>,
}

impl<B, P, C> AdInsertionSessionController<B, P, C>
where
    B: PlaybackBridge,
    P: AdSessionProtocol,
    C: Clock,
{
    pub fn new(
        content_uri: impl Into<String>,
        config: &SessionConfig,
        bridge: B,
        protocol: P,
        clock: C,
    ) -> Self {
        AdInsertionSessionController {
            phase: PlaybackPhase::Idle,
            content: ContentState {
                content_uri: content_uri.into(),
                last_known_position_millis: 0,
                content_start_reported: false,
                playback: ContentPlayback::Pending,
            },
            ad: AdState::default(),
            ad_timeout: Timer::one_shot("ad-timeout"),
            progress: Timer::periodic("progress-sampler", config.progress_interval()),
            policy: config.illegal_operation_policy,
            bridge,
            protocol: Some(protocol),
            clock,
            click_through: None,
        }
    }

    pub fn set_click_through_callback(&mut self, callback: ClickThroughCallback) {
        self.click_through = Some(callback);
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn phase(&self) -> PlaybackPhase {
        self.phase
    }

    pub fn content(&self) -> &ContentState {
        &self.content
    }

    pub fn ad(&self) -> &AdState {
        &self.ad
    }

    pub fn ad_timeout(&self) -> TimerHandle {
        self.ad_timeout.handle()
    }

    pub fn progress_sampler(&self) -> TimerHandle {
        self.progress.handle()
    }

    pub fn bridge(&self) -> &B {
        &self.bridge
    }

    pub fn bridge_mut(&mut self) -> &mut B {
        &mut self.bridge
    }

    /// The ad session, unless it has been stopped.
    pub fn protocol(&self) -> Option<&P> {
        self.protocol.as_ref()
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn is_ended(&self) -> bool {
        self.phase == PlaybackPhase::SessionEnded
    }

    /// Content is playing and the engine has confirmed it.
    pub fn is_content_advancing(&self) -> bool {
        self.phase == PlaybackPhase::ContentPlaying
            && self.content.playback == ContentPlayback::Advancing
    }

    /// An ad is playing and its start (or resume) has been confirmed.
    pub fn is_ad_advancing(&self) -> bool {
        self.phase == PlaybackPhase::AdPlaying && !self.ad_timeout.is_scheduled()
    }

    /// Earliest pending timer deadline, on the controller's clock.
    pub fn next_deadline(&self) -> Option<Duration> {
        match (self.ad_timeout.deadline(), self.progress.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    // ── Directives ───────────────────────────────────────────────────────────

    pub fn handle_directive(&mut self, directive: Directive) -> Result<(), ControllerError> {
        if self.is_ended() {
            return Err(self.reject(directive.name()));
        }
        match directive {
            Directive::StartContent => self.start_content(),
            Directive::StartAdBreak => self.start_ad_break(),
            Directive::StartAdPlayback {
                ad,
                renditions,
                timeout,
            } => self.start_ad_playback(ad, &renditions, timeout),
            Directive::SessionEnded => {
                self.end_session();
                Ok(())
            }
            Directive::IllegalOperation { reason } => self.illegal_operation(reason),
        }
    }

    fn start_content(&mut self) -> Result<(), ControllerError> {
        match self.phase {
            PlaybackPhase::Idle | PlaybackPhase::AdBreakEntered | PlaybackPhase::ContentPaused => {
                self.discard_ad();
                self.begin_content();
                Ok(())
            }
            _ => Err(self.reject("start content")),
        }
    }

    fn start_ad_break(&mut self) -> Result<(), ControllerError> {
        match self.phase {
            // A break needs content the engine has confirmed; the sampler is armed there.
            PlaybackPhase::ContentPlaying | PlaybackPhase::ContentPaused
                if self.content.content_start_reported =>
            {
                info!("Ad break started.");
                self.bridge.pause();
                self.bridge.set_controls_visible(false);
                self.phase = PlaybackPhase::AdBreakEntered;
                Ok(())
            }
            _ => Err(self.reject("start ad break")),
        }
    }

    fn start_ad_playback(
        &mut self,
        ad: Arc<VideoAd>,
        renditions: &[MediaRendition],
        timeout: Duration,
    ) -> Result<(), ControllerError> {
        if self.phase != PlaybackPhase::AdBreakEntered {
            return Err(self.reject("start ad playback"));
        }

        self.ad = AdState {
            current_ad: Some(ad),
            timeout,
            ..AdState::default()
        };

        let Some(rendition) = select_best_rendition(renditions) else {
            warn!("Ad has no playable rendition, reporting it as failed");
            self.fail_current_ad(AdFailureReason::UnsupportedMedia);
            return Ok(());
        };
        let url = rendition.url.clone();
        info!(
            "Starting ad playback: {} ({} kbps, timeout {:?})",
            url, rendition.bitrate, timeout
        );
        self.ad.selected_rendition_url = Some(url.clone());

        let now = self.clock.now();
        self.ad_timeout.schedule(now, timeout);
        self.phase = PlaybackPhase::AdLoading;

        if let Err(e) = self.bridge.load_and_play(&url, 0) {
            warn!("Ad load failed: {}", e);
            self.fail_current_ad(AdFailureReason::from_engine_code(e.engine_code()));
        }
        Ok(())
    }

    fn end_session(&mut self) {
        info!("Session ended");
        self.ad_timeout.cancel();
        self.progress.cancel();
        self.content.last_known_position_millis = 0;
        self.phase = PlaybackPhase::SessionEnded;
    }

    fn illegal_operation(&mut self, reason: String) -> Result<(), ControllerError> {
        match self.policy {
            ViolationPolicy::Strict => {
                error!("Illegal operation reported by ad session: {}", reason);
                self.end_session();
                Err(ControllerError::ProtocolViolation(reason))
            }
            ViolationPolicy::Lenient => {
                warn!(
                    "Illegal operation reported by ad session, dropping it and resuming content: {}",
                    reason
                );
                if let Some(mut protocol) = self.protocol.take() {
                    protocol.stop_session();
                }
                self.discard_ad();
                self.begin_content();
                Ok(())
            }
        }
    }

    // ── Host commands ────────────────────────────────────────────────────────

    /// Called by the host when the user returns from a click-through page.
    pub fn resume_after_click_through(&mut self) -> Result<(), ControllerError> {
        if self.phase != PlaybackPhase::AdPausedForClickThrough || self.ad.current_ad.is_none() {
            return Err(self.reject("resume after click-through"));
        }

        self.report_ad(|p, ad| p.ad_resumed(ad));
        self.ad.click_through_pending = false;

        let now = self.clock.now();
        self.ad_timeout.schedule(now, self.ad.timeout);

        // Ads that cannot seek restart from the beginning.
        if let Err(e) = self.bridge.seek(self.ad.last_known_position_millis) {
            warn!("Could not seek ad back to {} ms: {}", self.ad.last_known_position_millis, e);
        }
        self.bridge.resume();
        self.phase = PlaybackPhase::AdPlaying;
        Ok(())
    }

    /// User paused content from the playback controls.
    pub fn pause_content(&mut self) -> Result<(), ControllerError> {
        if self.phase != PlaybackPhase::ContentPlaying {
            return Err(self.reject("pause content"));
        }
        self.bridge.pause();
        self.phase = PlaybackPhase::ContentPaused;
        Ok(())
    }

    /// User resumed content from the playback controls.
    pub fn resume_content(&mut self) -> Result<(), ControllerError> {
        if self.phase != PlaybackPhase::ContentPaused {
            return Err(self.reject("resume content"));
        }
        self.content.playback = ContentPlayback::Pending;
        self.bridge.resume();
        self.phase = PlaybackPhase::ContentPlaying;
        Ok(())
    }

    // ── Playback events ──────────────────────────────────────────────────────

    pub fn handle_playback_event(&mut self, event: PlaybackEvent) {
        if self.is_ended() {
            debug!("Ignoring {:?} after session end", event);
            return;
        }
        match event {
            PlaybackEvent::Started => self.on_started(),
            PlaybackEvent::Completed => self.on_completed(),
            PlaybackEvent::Error(code) => self.on_engine_error(code),
            PlaybackEvent::TouchDown => self.on_touch_down(),
        }
    }

    fn on_started(&mut self) {
        match self.phase {
            PlaybackPhase::ContentPlaying => {
                self.bridge.set_controls_visible(true);
                if !self.content.content_start_reported {
                    self.content.content_start_reported = true;
                    self.report(|p| p.content_started());
                    info!("Content playback started.");
                } else {
                    info!("Content playback resumed.");
                }
                self.content.playback = ContentPlayback::Advancing;
                let now = self.clock.now();
                self.progress.start_if_idle(now);
            }
            PlaybackPhase::AdLoading => {
                self.ad_timeout.cancel();
                info!("Ad playback started.");
                self.report_ad(|p, ad| p.ad_started(ad));
                self.phase = PlaybackPhase::AdPlaying;
            }
            PlaybackPhase::AdPlaying if self.ad_timeout.is_scheduled() => {
                self.ad_timeout.cancel();
                self.bridge.set_controls_visible(false);
                info!("Ad playback resumed.");
            }
            phase => debug!("Ignoring playback start while {}", phase),
        }
    }

    fn on_completed(&mut self) {
        match self.phase {
            PlaybackPhase::ContentPlaying if self.content.playback != ContentPlayback::Finished => {
                info!("Content playback completed.");
                self.content.playback = ContentPlayback::Finished;
                self.report(|p| p.content_finished());
            }
            PlaybackPhase::AdPlaying => {
                self.ad_timeout.cancel();
                info!("Ad playback completed.");
                self.report_ad(|p, ad| p.ad_finished(ad));
                self.discard_ad();
                self.phase = PlaybackPhase::AdBreakEntered;
            }
            phase => debug!("Ignoring playback completion while {}", phase),
        }
    }

    fn on_engine_error(&mut self, code: EngineErrorCode) {
        match self.phase {
            PlaybackPhase::ContentPlaying | PlaybackPhase::ContentPaused => {
                warn!("Content playback error ({}), playback stalled", describe(code));
                self.content.playback = ContentPlayback::Stalled;
            }
            PlaybackPhase::AdLoading
            | PlaybackPhase::AdPlaying
            | PlaybackPhase::AdPausedForClickThrough => {
                warn!("Ad playback error ({})", describe(code));
                self.fail_current_ad(AdFailureReason::from_engine_code(code));
            }
            phase => debug!("Ignoring engine error {:?} while {}", code, phase),
        }
    }

    fn on_touch_down(&mut self) {
        // Touches before the ad is confirmed playing would pause an ad that never started.
        if !self.is_ad_advancing() || self.ad.click_through_pending {
            trace!("Ignoring touch while {}", self.phase);
            return;
        }

        self.bridge.pause();
        let position = self.bridge.current_position();
        if position != 0 {
            self.ad.last_known_position_millis = position;
        }
        self.ad.click_through_pending = true;
        self.phase = PlaybackPhase::AdPausedForClickThrough;

        self.report_ad(|p, ad| p.ad_paused(ad));
        self.report_ad(|p, ad| p.ad_click_through_triggered(ad));
        if let (Some(callback), Some(ad)) = (self.click_through.as_mut(), self.ad.current_ad.as_deref()) {
            callback(ad);
        }
        info!("ClickThrough occurred.");
    }

    // ── Timers ───────────────────────────────────────────────────────────────

    /// Fire whichever timers are due. Only a broken timeout invariant errors.
    pub fn poll_timers(&mut self) -> Result<(), ControllerError> {
        let now = self.clock.now();
        if self.ad_timeout.poll(now) {
            self.on_ad_timeout()?;
        }
        if self.progress.poll(now) {
            self.sample_progress();
        }
        Ok(())
    }

    fn on_ad_timeout(&mut self) -> Result<(), ControllerError> {
        if self.ad.current_ad.is_none() {
            error!("Ad timeout fired with no current ad, ending session");
            self.end_session();
            return Err(ControllerError::TimeoutWithoutAd);
        }
        info!("Time out for ad playback is reached");
        self.fail_current_ad(AdFailureReason::TimedOut);
        Ok(())
    }

    fn sample_progress(&mut self) {
        let position = self.bridge.current_position();
        if self.is_content_advancing() {
            if position == 0 {
                trace!("Content position not available yet");
                return;
            }
            self.content.last_known_position_millis = position;
            self.report(|p| p.content_position_changed((position / 1000) as f64));
        } else if self.is_ad_advancing() {
            if position == 0 {
                trace!("Ad position not available yet");
                return;
            }
            self.ad.last_known_position_millis = position;
            self.report_ad(|p, ad| p.ad_position_changed(ad, position as f64 / 1000.0));
        }
    }

    // ── Helpers ──────────────────────────────────────────────────────────────

    fn begin_content(&mut self) {
        self.bridge.set_controls_visible(true);
        self.content.playback = ContentPlayback::Pending;
        self.phase = PlaybackPhase::ContentPlaying;
        let uri = self.content.content_uri.clone();
        info!(
            "Starting content playback at {} ms",
            self.content.last_known_position_millis
        );
        if let Err(e) = self
            .bridge
            .load_and_play(&uri, self.content.last_known_position_millis)
        {
            warn!("Content load failed, playback stalled: {}", e);
            self.content.playback = ContentPlayback::Stalled;
        }
    }

    fn fail_current_ad(&mut self, reason: AdFailureReason) {
        self.ad_timeout.cancel();
        info!("Ad failed: {}", reason);
        self.report_ad(|p, ad| p.ad_failed(ad, reason));
        self.discard_ad();
        self.phase = PlaybackPhase::AdBreakEntered;
    }

    /// Forget the current ad. The timeout goes with it so it can never fire ad-less.
    fn discard_ad(&mut self) {
        self.ad_timeout.cancel();
        self.ad = AdState::default();
    }

    fn reject(&self, input: &'static str) -> ControllerError {
        warn!("Rejected '{}' while {}", input, self.phase);
        ControllerError::InvalidTransition {
            input,
            phase: self.phase,
        }
    }

    fn report(&mut self, f: impl FnOnce(&mut P)) {
        if let Some(protocol) = self.protocol.as_mut() {
            f(protocol);
        }
    }

    fn report_ad(&mut self, f: impl FnOnce(&mut P, &VideoAd)) {
        if let (Some(protocol), Some(ad)) = (self.protocol.as_mut(), self.ad.current_ad.as_deref()) {
            f(protocol, ad);
        }
    }
}

fn describe(code: EngineErrorCode) -> String {
    match code {
        EngineErrorCode::Unknown => "unknown media playback error".to_string(),
        EngineErrorCode::ServerDied => "server connection died".to_string(),
        EngineErrorCode::Io => "source could not be opened".to_string(),
        EngineErrorCode::Other(code) => format!("generic playback error {}", code),
    }
}
