//! ScriptedAdSession: a local stand-in for an ad-decision service.
//!
//! Plays every configured ad at each mid-roll position, in order. Directives
//! are posted back through the session handle, never issued from inside a
//! report callback, so the controller finishes the current input first.

use crate::protocol::{AdFailureReason, AdSessionProtocol, Directive, VideoAd};
use crate::runtime::SessionHandle;
use crate::video_item::RequestSettings;
use log::info;
use std::sync::Arc;
use std::time::Duration;

pub struct ScriptedAdSession {
    handle: SessionHandle,
    midrolls: Vec<f64>,
    next_midroll: usize,
    ads: Vec<Arc<VideoAd>>,
    ad_cursor: Option<usize>,
    timeout: Duration,
}

impl ScriptedAdSession {
    /// Create the session and ask for content playback straight away.
    pub fn start(
        settings: &RequestSettings,
        ads: Vec<Arc<VideoAd>>,
        timeout: Duration,
        handle: SessionHandle,
    ) -> Self {
        let mut midrolls = settings.linear_playback_positions.clone();
        midrolls.sort_by(|a, b| a.total_cmp(b));
        handle.directive(Directive::StartContent);
        ScriptedAdSession {
            handle,
            midrolls,
            next_midroll: 0,
            ads,
            ad_cursor: None,
            timeout,
        }
    }

    pub fn in_ad_break(&self) -> bool {
        self.ad_cursor.is_some()
    }

    fn play_ad_at(&mut self, index: usize) {
        match self.ads.get(index) {
            Some(ad) => {
                self.ad_cursor = Some(index);
                self.handle
                    .directive(Directive::play_ad(ad.clone(), self.timeout));
            }
            None => {
                info!("Ad break over, back to content");
                self.ad_cursor = None;
                self.handle.directive(Directive::StartContent);
            }
        }
    }

    fn advance(&mut self) {
        let next = self.ad_cursor.map_or(0, |i| i + 1);
        self.play_ad_at(next);
    }
}

impl AdSessionProtocol for ScriptedAdSession {
    fn content_started(&mut self) {}

    fn content_finished(&mut self) {
        self.handle.directive(Directive::SessionEnded);
    }

    fn content_position_changed(&mut self, seconds: f64) {
        if self.in_ad_break() {
            return;
        }
        let Some(&position) = self.midrolls.get(self.next_midroll) else {
            return;
        };
        if seconds >= position {
            info!("Mid-roll at {}s reached", position);
            self.next_midroll += 1;
            self.handle.directive(Directive::StartAdBreak);
            self.play_ad_at(0);
        }
    }

    fn ad_started(&mut self, _ad: &VideoAd) {}

    fn ad_paused(&mut self, _ad: &VideoAd) {}

    fn ad_resumed(&mut self, _ad: &VideoAd) {}

    fn ad_finished(&mut self, _ad: &VideoAd) {
        self.advance();
    }

    fn ad_failed(&mut self, ad: &VideoAd, reason: AdFailureReason) {
        info!("Ad {} failed ({}), moving on", ad.id, reason);
        self.advance();
    }

    fn ad_position_changed(&mut self, _ad: &VideoAd, _seconds: f64) {}

    fn ad_click_through_triggered(&mut self, _ad: &VideoAd) {}
}
