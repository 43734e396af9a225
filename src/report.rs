//! Session transcript: every report sent to the ad session, timestamped.
//!
//! `ReportRecorder` sits in the protocol slot of the controller. On its own it
//! only records; with [`ReportRecorder::tee`] it also forwards each report to
//! a real ad session. The recorded [`Transcript`] is shared, so callers keep a
//! clone and read it after the controller has taken the recorder.

use crate::error::ReportError;
use crate::protocol::{AdFailureReason, AdSessionProtocol, VideoAd};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// One outbound report, with the ad identified by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "report", rename_all = "snake_case")]
pub enum Report {
    ContentStarted,
    ContentFinished,
    ContentPositionChanged { seconds: f64 },
    AdStarted { ad_id: String },
    AdPaused { ad_id: String },
    AdResumed { ad_id: String },
    AdFinished { ad_id: String },
    AdFailed { ad_id: String, reason: AdFailureReason },
    AdPositionChanged { ad_id: String, seconds: f64 },
    AdClickThroughTriggered { ad_id: String },
    SessionStopped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedReport {
    pub at: DateTime<Local>,
    #[serde(flatten)]
    pub report: Report,
}

#[derive(Debug, Clone, Default)]
pub struct Transcript {
    entries: Arc<Mutex<Vec<RecordedReport>>>,
}

impl Transcript {
    fn lock(&self) -> MutexGuard<'_, Vec<RecordedReport>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push(&self, report: Report) {
        self.lock().push(RecordedReport {
            at: Local::now(),
            report,
        });
    }

    pub fn entries(&self) -> Vec<RecordedReport> {
        self.lock().clone()
    }

    /// Reports without timestamps, in the order they were sent.
    pub fn reports(&self) -> Vec<Report> {
        self.lock().iter().map(|e| e.report.clone()).collect()
    }

    /// Number of recorded reports matching `pred`.
    pub fn count(&self, pred: impl Fn(&Report) -> bool) -> usize {
        self.lock().iter().filter(|e| pred(&e.report)).count()
    }

    pub fn save_json(&self, path: &Path) -> Result<(), ReportError> {
        let json = serde_json::to_string_pretty(&*self.lock())?;
        fs::write(path, json).map_err(|source| ReportError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

pub struct ReportRecorder {
    transcript: Transcript,
    inner: Option<Box<dyn AdSessionProtocol + Send>>,
}

impl ReportRecorder {
    pub fn new() -> Self {
        ReportRecorder {
            transcript: Transcript::default(),
            inner: None,
        }
    }

    /// Record and forward every report to `inner`.
    pub fn tee(inner: impl AdSessionProtocol + Send + 'static) -> Self {
        ReportRecorder {
            transcript: Transcript::default(),
            inner: Some(Box::new(inner)),
        }
    }

    /// Record into an existing transcript instead of a fresh one.
    pub fn with_transcript(mut self, transcript: Transcript) -> Self {
        self.transcript = transcript;
        self
    }

    pub fn transcript(&self) -> Transcript {
        self.transcript.clone()
    }

    fn forward(&mut self, report: Report, f: impl FnOnce(&mut dyn AdSessionProtocol)) {
        self.transcript.push(report);
        if let Some(inner) = self.inner.as_mut() {
            f(inner.as_mut());
        }
    }
}

impl Default for ReportRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl AdSessionProtocol for ReportRecorder {
    fn content_started(&mut self) {
        self.forward(Report::ContentStarted, |p| p.content_started());
    }

    fn content_finished(&mut self) {
        self.forward(Report::ContentFinished, |p| p.content_finished());
    }

    fn content_position_changed(&mut self, seconds: f64) {
        self.forward(Report::ContentPositionChanged { seconds }, |p| {
            p.content_position_changed(seconds)
        });
    }

    fn ad_started(&mut self, ad: &VideoAd) {
        let ad_id = ad.id.clone();
        self.forward(Report::AdStarted { ad_id }, |p| p.ad_started(ad));
    }

    fn ad_paused(&mut self, ad: &VideoAd) {
        let ad_id = ad.id.clone();
        self.forward(Report::AdPaused { ad_id }, |p| p.ad_paused(ad));
    }

    fn ad_resumed(&mut self, ad: &VideoAd) {
        let ad_id = ad.id.clone();
        self.forward(Report::AdResumed { ad_id }, |p| p.ad_resumed(ad));
    }

    fn ad_finished(&mut self, ad: &VideoAd) {
        let ad_id = ad.id.clone();
        self.forward(Report::AdFinished { ad_id }, |p| p.ad_finished(ad));
    }

    fn ad_failed(&mut self, ad: &VideoAd, reason: AdFailureReason) {
        let ad_id = ad.id.clone();
        self.forward(Report::AdFailed { ad_id, reason }, |p| p.ad_failed(ad, reason));
    }

    fn ad_position_changed(&mut self, ad: &VideoAd, seconds: f64) {
        let ad_id = ad.id.clone();
        self.forward(Report::AdPositionChanged { ad_id, seconds }, |p| {
            p.ad_position_changed(ad, seconds)
        });
    }

    fn ad_click_through_triggered(&mut self, ad: &VideoAd) {
        let ad_id = ad.id.clone();
        self.forward(Report::AdClickThroughTriggered { ad_id }, |p| {
            p.ad_click_through_triggered(ad)
        });
    }

    fn stop_session(&mut self) {
        self.forward(Report::SessionStopped, |p| p.stop_session());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter {
        calls: Arc<Mutex<usize>>,
    }

    impl AdSessionProtocol for Counter {
        fn content_started(&mut self) {
            *self.calls.lock().unwrap() += 1;
        }
        fn content_finished(&mut self) {}
        fn content_position_changed(&mut self, _seconds: f64) {}
        fn ad_started(&mut self, _ad: &VideoAd) {
            *self.calls.lock().unwrap() += 1;
        }
        fn ad_paused(&mut self, _ad: &VideoAd) {}
        fn ad_resumed(&mut self, _ad: &VideoAd) {}
        fn ad_finished(&mut self, _ad: &VideoAd) {}
        fn ad_failed(&mut self, _ad: &VideoAd, _reason: AdFailureReason) {}
        fn ad_position_changed(&mut self, _ad: &VideoAd, _seconds: f64) {}
        fn ad_click_through_triggered(&mut self, _ad: &VideoAd) {}
    }

    #[test]
    fn records_in_order() {
        let mut recorder = ReportRecorder::new();
        let transcript = recorder.transcript();
        let ad = VideoAd::new("spot", Vec::new());
        recorder.content_started();
        recorder.ad_started(&ad);
        recorder.ad_failed(&ad, AdFailureReason::TimedOut);
        assert_eq!(
            transcript.reports(),
            vec![
                Report::ContentStarted,
                Report::AdStarted {
                    ad_id: "spot".into()
                },
                Report::AdFailed {
                    ad_id: "spot".into(),
                    reason: AdFailureReason::TimedOut
                },
            ]
        );
        assert_eq!(
            transcript.count(|r| matches!(r, Report::AdFailed { .. })),
            1
        );
    }

    #[test]
    fn tee_forwards_to_inner_session() {
        let calls = Arc::new(Mutex::new(0));
        let mut recorder = ReportRecorder::tee(Counter {
            calls: calls.clone(),
        });
        recorder.content_started();
        recorder.ad_started(&VideoAd::new("spot", Vec::new()));
        assert_eq!(*calls.lock().unwrap(), 2);
        assert_eq!(recorder.transcript().reports().len(), 2);
    }

    #[test]
    fn transcript_saves_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transcript.json");
        let mut recorder = ReportRecorder::new();
        recorder.content_position_changed(5.0);
        recorder.transcript().save_json(&path).unwrap();

        let data = fs::read_to_string(&path).unwrap();
        let loaded: Vec<RecordedReport> = serde_json::from_str(&data).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].report, Report::ContentPositionChanged { seconds: 5.0 });
        assert!(data.contains("\"report\": \"content_position_changed\""));
    }

    #[test]
    fn transcript_write_failure_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("transcript.json");
        let err = Transcript::default().save_json(&path).unwrap_err();
        match err {
            ReportError::Write { path: failed, .. } => assert_eq!(failed, path),
            other => panic!("expected write error, got {}", other),
        }
    }
}
