//! SessionRuntime: dedicated session thread with channel-based input dispatch.
//!
//! The thread owns the controller, the bridge and the ad session, so none of
//! them need to be `Send`; they are built on the thread by the factories
//! passed to [`spawn_session_runtime`]. Everything else talks to the session
//! through [`SessionHandle`], which wraps an `mpsc::Sender`. The loop waits
//! with `recv_timeout` until the next timer deadline (capped at the bridge
//! poll interval), so directives, engine events and timer firings are handled
//! strictly one at a time.

use crate::bridge::{BridgeError, PlaybackBridge, PlaybackEvent};
use crate::config::SessionConfig;
use crate::controller::{AdInsertionSessionController, ClickThroughCallback, PlaybackPhase};
use crate::error::ControllerError;
use crate::protocol::{AdSessionProtocol, Directive};
use crate::timer::Clock;
use crate::video_item::{ContentMetadata, RequestSettings, VideoItem};
use log::{error, info, warn};
use std::sync::mpsc;
use std::thread;

// ── Inputs ───────────────────────────────────────────────────────────────────

/// Everything that can be posted onto the session's sequencing context.
#[derive(Debug, Clone)]
pub enum SessionInput {
    Directive(Directive),
    Playback(PlaybackEvent),
    ResumeAfterClickThrough,
    PauseContent,
    ResumeContent,
    Shutdown,
}

// ── Handle ───────────────────────────────────────────────────────────────────

/// Cloneable, `Send` handle for posting inputs to a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionInput>,
}

impl SessionHandle {
    /// Post an input. Returns false once the session thread has exited.
    pub fn post(&self, input: SessionInput) -> bool {
        self.tx.send(input).is_ok()
    }

    pub fn directive(&self, directive: Directive) -> bool {
        self.post(SessionInput::Directive(directive))
    }

    pub fn playback(&self, event: PlaybackEvent) -> bool {
        self.post(SessionInput::Playback(event))
    }

    pub fn touch_down(&self) -> bool {
        self.playback(PlaybackEvent::TouchDown)
    }

    pub fn resume_after_click_through(&self) -> bool {
        self.post(SessionInput::ResumeAfterClickThrough)
    }

    pub fn pause_content(&self) -> bool {
        self.post(SessionInput::PauseContent)
    }

    pub fn resume_content(&self) -> bool {
        self.post(SessionInput::ResumeContent)
    }

    pub fn shutdown(&self) -> bool {
        self.post(SessionInput::Shutdown)
    }
}

// ── Runtime ──────────────────────────────────────────────────────────────────

pub struct SessionRuntime {
    handle: SessionHandle,
    thread: thread::JoinHandle<Result<PlaybackPhase, ControllerError>>,
}

impl SessionRuntime {
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Wait for the session to finish. Returns the final phase, or the fatal
    /// error that ended it.
    pub fn join(self) -> Result<PlaybackPhase, ControllerError> {
        self.thread
            .join()
            .map_err(|_| ControllerError::RuntimePanicked)?
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }
}

/// Spawn a session for `item` on a dedicated thread.
///
/// `make_bridge` and `make_protocol` run on the session thread and receive a
/// handle so their engine/ad-session callbacks can post back into the loop.
pub fn spawn_session_runtime<B, P, C, FB, FP>(
    config: SessionConfig,
    item: VideoItem,
    clock: C,
    make_bridge: FB,
    make_protocol: FP,
    click_through: Option<ClickThroughCallback>,
) -> Result<SessionRuntime, ControllerError>
where
    B: PlaybackBridge,
    P: AdSessionProtocol,
    C: Clock + Send + 'static,
    FB: FnOnce(SessionHandle) -> Result<B, BridgeError> + Send + 'static,
    FP: FnOnce(&ContentMetadata, &RequestSettings, SessionHandle) -> P + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<SessionInput>();
    let handle = SessionHandle { tx };
    let thread_handle = handle.clone();

    let thread = thread::Builder::new()
        .name("ad-session".into())
        .spawn(move || {
            let bridge = make_bridge(thread_handle.clone())?;
            let protocol = make_protocol(
                &item.content_metadata(),
                &item.request_settings(),
                thread_handle,
            );
            let mut controller =
                AdInsertionSessionController::new(item.content_url, &config, bridge, protocol, clock);
            if let Some(callback) = click_through {
                controller.set_click_through_callback(callback);
            }
            session_loop(rx, &mut controller, &config)
        })?;

    Ok(SessionRuntime { handle, thread })
}

/// Main loop for the session thread. Owns the controller.
fn session_loop<B, P, C>(
    rx: mpsc::Receiver<SessionInput>,
    controller: &mut AdInsertionSessionController<B, P, C>,
    config: &SessionConfig,
) -> Result<PlaybackPhase, ControllerError>
where
    B: PlaybackBridge,
    P: AdSessionProtocol,
    C: Clock,
{
    let poll_interval = config.bridge_poll_interval();

    loop {
        let wait = controller
            .next_deadline()
            .map(|deadline| deadline.saturating_sub(controller.clock().now()))
            .map_or(poll_interval, |until| until.min(poll_interval));

        match rx.recv_timeout(wait) {
            Ok(SessionInput::Shutdown) => {
                info!("Session runtime shut down by host");
                break;
            }
            Ok(input) => {
                if let Err(e) = dispatch(controller, input) {
                    if e.is_fatal() {
                        error!("Session aborted: {}", e);
                        return Err(e);
                    }
                    warn!("Input rejected: {}", e);
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }

        while let Some(event) = controller.bridge_mut().poll_event() {
            controller.handle_playback_event(event);
        }

        if let Err(e) = controller.poll_timers() {
            error!("Session aborted: {}", e);
            return Err(e);
        }

        if controller.is_ended() {
            break;
        }
    }

    Ok(controller.phase())
}

fn dispatch<B, P, C>(
    controller: &mut AdInsertionSessionController<B, P, C>,
    input: SessionInput,
) -> Result<(), ControllerError>
where
    B: PlaybackBridge,
    P: AdSessionProtocol,
    C: Clock,
{
    match input {
        SessionInput::Directive(directive) => controller.handle_directive(directive),
        SessionInput::Playback(event) => {
            controller.handle_playback_event(event);
            Ok(())
        }
        SessionInput::ResumeAfterClickThrough => controller.resume_after_click_through(),
        SessionInput::PauseContent => controller.pause_content(),
        SessionInput::ResumeContent => controller.resume_content(),
        SessionInput::Shutdown => Ok(()),
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBridge;
    use crate::report::{Report, ReportRecorder};
    use crate::timer::SystemClock;
    use std::time::Duration;

    #[test]
    fn handle_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SessionHandle>();
    }

    #[test]
    fn shutdown_stops_thread() {
        let runtime = spawn_session_runtime(
            SessionConfig::default(),
            VideoItem::new("content.mp4"),
            SystemClock::new(),
            |_| Ok(MockBridge::new()),
            |_, _, _| ReportRecorder::new(),
            None,
        )
        .unwrap();
        runtime.handle().shutdown();
        assert_eq!(runtime.join().unwrap(), PlaybackPhase::Idle);
    }

    #[test]
    fn bridge_factory_failure_ends_runtime() {
        let runtime = spawn_session_runtime(
            SessionConfig::default(),
            VideoItem::new("content.mp4"),
            SystemClock::new(),
            |_| -> Result<MockBridge, BridgeError> {
                Err(BridgeError::Output("no device".into()))
            },
            |_, _, _| ReportRecorder::new(),
            None,
        )
        .unwrap();
        assert!(matches!(
            runtime.join(),
            Err(ControllerError::Bridge(BridgeError::Output(_)))
        ));
    }

    #[test]
    fn protocol_factory_receives_request_settings() {
        let mut item = VideoItem::new("content.mp4");
        item.midroll_positions = vec![12.0];
        item.category = Some("news".into());
        let (tx, rx) = mpsc::channel();
        let runtime = spawn_session_runtime(
            SessionConfig::default(),
            item,
            SystemClock::new(),
            |_| Ok(MockBridge::new()),
            move |meta, settings, _| {
                let _ = tx.send((meta.clone(), settings.clone()));
                ReportRecorder::new()
            },
            None,
        )
        .unwrap();
        let (meta, settings) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(meta.category.as_deref(), Some("news"));
        assert_eq!(settings.linear_playback_positions, vec![12.0]);
        runtime.handle().shutdown();
        runtime.join().unwrap();
    }

    #[test]
    fn polled_bridge_events_reach_controller() {
        let bridge = MockBridge::new();
        let recorder = ReportRecorder::new();
        let transcript = recorder.transcript();
        let bridge_clone = bridge.clone();
        let runtime = spawn_session_runtime(
            SessionConfig::default(),
            VideoItem::new("content.mp4"),
            SystemClock::new(),
            move |_| Ok(bridge_clone),
            move |_, _, _| recorder,
            None,
        )
        .unwrap();
        let handle = runtime.handle();
        handle.directive(Directive::StartContent);
        std::thread::sleep(Duration::from_millis(100));
        bridge.set_position(5000);
        bridge.push_event(PlaybackEvent::Started);

        std::thread::sleep(Duration::from_millis(500));
        handle.directive(Directive::SessionEnded);
        assert_eq!(runtime.join().unwrap(), PlaybackPhase::SessionEnded);

        let reports = transcript.reports();
        assert_eq!(reports.first(), Some(&Report::ContentStarted));
        assert!(reports.contains(&Report::ContentPositionChanged { seconds: 5.0 }));
    }

    #[test]
    fn strict_violation_returns_fatal_error() {
        let runtime = spawn_session_runtime(
            SessionConfig::strict(),
            VideoItem::new("content.mp4"),
            SystemClock::new(),
            |_| Ok(MockBridge::new()),
            |_, _, _| ReportRecorder::new(),
            None,
        )
        .unwrap();
        let handle = runtime.handle();
        handle.directive(Directive::StartContent);
        handle.directive(Directive::IllegalOperation {
            reason: "ad finished before started".into(),
        });
        assert!(matches!(
            runtime.join(),
            Err(ControllerError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn rejected_input_keeps_runtime_alive() {
        let runtime = spawn_session_runtime(
            SessionConfig::default(),
            VideoItem::new("content.mp4"),
            SystemClock::new(),
            |_| Ok(MockBridge::new()),
            |_, _, _| ReportRecorder::new(),
            None,
        )
        .unwrap();
        let handle = runtime.handle();
        handle.directive(Directive::StartAdBreak);
        handle.resume_after_click_through();
        handle.directive(Directive::StartContent);
        handle.directive(Directive::SessionEnded);
        assert_eq!(runtime.join().unwrap(), PlaybackPhase::SessionEnded);
    }
}
