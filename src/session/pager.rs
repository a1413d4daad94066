//! Automatic page advance.
//!
//! The device actor ticks [`PagerState::tick`] every `advance_pages`. A page report the
//! scheduler did not cause is a manual change: it skips the next tick and holds off
//! paging until `advance_page_pause` has elapsed.
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Default, Clone)]
pub struct PagerState {
    paused_until: Option<Instant>,
    manual_since_tick: bool,
    /// Page requested by the last tick, awaiting its echo report.
    forced: Option<u8>,
}

impl PagerState {
    /// Record a page report. Returns true when it counts as a manual change.
    pub fn note_page_report(&mut self, page: u8, now: Instant, pause: Duration) -> bool {
        if self.forced.take() == Some(page) {
            return false;
        }
        self.paused_until = Some(now + pause);
        self.manual_since_tick = true;
        true
    }

    /// Next page to show, or `None` to stay put.
    pub fn tick(&mut self, current: Option<u8>, page_count: usize, now: Instant) -> Option<u8> {
        if std::mem::take(&mut self.manual_since_tick) {
            return None;
        }
        if let Some(until) = self.paused_until {
            if now < until {
                return None;
            }
            self.paused_until = None;
        }
        let current = current?;
        if page_count == 0 {
            return None;
        }
        let next = ((usize::from(current) + 1) % page_count) as u8;
        self.forced = Some(next);
        Some(next)
    }

    pub fn is_paused(&self, now: Instant) -> bool {
        self.manual_since_tick || self.paused_until.is_some_and(|until| now < until)
    }
}
