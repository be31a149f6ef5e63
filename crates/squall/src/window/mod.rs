//! Time windows and the paced window walker.
//!
//! The walker produces the lazy, restartable sequence of half-open
//! `[start, end)` slices the extraction loop processes. It paces itself
//! against wall-clock time: the source's log data for very recent time is
//! not guaranteed complete, so a window whose end would pass
//! `now - safety_lag` is deferred, never fabricated.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// A fixed-length, half-open epoch-second interval; `end` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: i64,
    pub end: i64,
}

impl TimeWindow {
    /// Per-day destination name derived from the window start in the
    /// source timezone, e.g. `myapp-2014-03-01.log`.
    pub fn destination(&self, app_name: &str, tz: Tz) -> String {
        format!("{app_name}-{}.log", self.start_day(tz, "%Y-%m-%d"))
    }

    /// Dot-separated index date derived the same way, e.g. `2014.03.01`.
    pub fn index_date(&self, tz: Tz) -> String {
        self.start_day(tz, "%Y.%m.%d")
    }

    fn start_day(&self, tz: Tz, fmt: &str) -> String {
        let utc = DateTime::<Utc>::from_timestamp(self.start, 0)
            .unwrap_or_else(|| DateTime::<Utc>::UNIX_EPOCH);
        utc.with_timezone(&tz).format(fmt).to_string()
    }
}

/// Produces contiguous, non-overlapping windows in strictly increasing
/// order, pausing while the next candidate would reach into time the
/// source has not finished flushing.
pub struct WindowWalker {
    slice: i64,
    safety_lag: i64,
    next_start: i64,
    end_bound: Option<i64>,
    shutdown: CancellationToken,
}

impl WindowWalker {
    /// Create a walker.
    ///
    /// `start_after` defaults to `now - safety_lag - slice`: the newest
    /// window whose data the source has had time to flush. With an
    /// `end_bound` the sequence is finite and terminates exactly when
    /// `start >= end_bound`; without one it tails forever.
    pub fn new(
        slice_secs: u64,
        safety_lag_secs: u64,
        start_after: Option<i64>,
        end_bound: Option<i64>,
        shutdown: CancellationToken,
    ) -> Self {
        let slice = slice_secs.max(1) as i64;
        let safety_lag = safety_lag_secs as i64;
        let next_start = start_after.unwrap_or_else(|| Utc::now().timestamp() - safety_lag - slice);

        info!(
            slice_secs = slice,
            safety_lag_secs = safety_lag,
            start = next_start,
            end = ?end_bound,
            "Window walker starting"
        );

        Self {
            slice,
            safety_lag,
            next_start,
            end_bound,
            shutdown,
        }
    }

    /// Produce the next window, pausing while paced.
    ///
    /// Returns `None` when the end bound is reached or shutdown was
    /// requested; the stop signal is observed at the top of each
    /// iteration and during the pacing sleep.
    pub async fn next_window(&mut self) -> Option<TimeWindow> {
        loop {
            if self.shutdown.is_cancelled() {
                debug!("Shutdown requested, stopping window walk");
                return None;
            }

            if let Some(bound) = self.end_bound {
                if self.next_start >= bound {
                    info!(bound, "End bound reached, window walk complete");
                    return None;
                }
            }

            let mut end = self.next_start + self.slice;
            if let Some(bound) = self.end_bound {
                end = end.min(bound);
            }

            // The source needs time to flush recent writes; wait rather
            // than claim complete data for too-recent time.
            let horizon = Utc::now().timestamp() - self.safety_lag;
            if end > horizon {
                let pause = Duration::from_secs((2 * self.slice) as u64);
                debug!(
                    candidate_end = end,
                    horizon,
                    pause_secs = pause.as_secs(),
                    "Next window too recent, pausing"
                );
                tokio::select! {
                    _ = self.shutdown.cancelled() => {
                        debug!("Shutdown requested during pacing pause");
                        return None;
                    }
                    _ = tokio::time::sleep(pause) => {}
                }
                continue;
            }

            let window = TimeWindow {
                start: self.next_start,
                end,
            };
            self.next_start = end;
            return Some(window);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> CancellationToken {
        CancellationToken::new()
    }

    #[tokio::test]
    async fn bounded_walk_is_contiguous_and_non_overlapping() {
        let mut walker = WindowWalker::new(10, 180, Some(1000), Some(1050), token());

        let mut windows = Vec::new();
        while let Some(w) = walker.next_window().await {
            windows.push(w);
        }

        assert_eq!(windows.len(), 5);
        assert_eq!(windows[0].start, 1000);
        for pair in windows.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        assert_eq!(windows.last().unwrap().end, 1050);
    }

    #[tokio::test]
    async fn bounded_walk_clamps_final_window_to_bound() {
        let mut walker = WindowWalker::new(10, 180, Some(1000), Some(1035), token());

        let mut windows = Vec::new();
        while let Some(w) = walker.next_window().await {
            windows.push(w);
        }

        assert_eq!(windows.len(), 4);
        assert_eq!(windows[3], TimeWindow { start: 1030, end: 1035 });
    }

    #[tokio::test]
    async fn emitted_windows_never_pass_the_safety_horizon() {
        let start = Utc::now().timestamp() - 3600;
        let mut walker = WindowWalker::new(10, 180, Some(start), None, token());

        for _ in 0..20 {
            let w = walker.next_window().await.unwrap();
            assert!(
                w.end <= Utc::now().timestamp() - 180,
                "window end {} passes the safety horizon",
                w.end
            );
        }
    }

    #[tokio::test]
    async fn default_start_sits_one_slice_behind_the_horizon() {
        let before = Utc::now().timestamp();
        let mut walker = WindowWalker::new(10, 180, None, None, token());
        let w = walker.next_window().await.unwrap();
        let after = Utc::now().timestamp();

        assert!(w.start >= before - 180 - 10);
        assert!(w.start <= after - 180 - 10);
        assert_eq!(w.end - w.start, 10);
    }

    #[tokio::test]
    async fn cancellation_interrupts_the_pacing_pause() {
        let shutdown = token();
        // Start right at the horizon so the walker has to pause.
        let start = Utc::now().timestamp() - 180;
        let mut walker = WindowWalker::new(10, 180, Some(start), None, shutdown.clone());

        let handle = tokio::spawn(async move { walker.next_window().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();

        let result = tokio::time::timeout(Duration::from_millis(900), handle)
            .await
            .expect("walker must stop promptly on cancellation")
            .unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn cancelled_walker_stops_before_yielding() {
        let shutdown = token();
        shutdown.cancel();
        let mut walker = WindowWalker::new(10, 180, Some(1000), Some(2000), shutdown);
        assert_eq!(walker.next_window().await, None);
    }

    #[test]
    fn destination_and_index_date_derive_from_start() {
        // 2014-03-01 18:00:00 UTC == 2014-03-01 10:00:00 US/Pacific
        let window = TimeWindow {
            start: 1393696800,
            end: 1393696810,
        };
        let tz: Tz = "US/Pacific".parse().unwrap();

        assert_eq!(window.destination("myapp", tz), "myapp-2014-03-01.log");
        assert_eq!(window.index_date(tz), "2014.03.01");
    }

    #[test]
    fn day_bucketing_follows_the_source_timezone() {
        // 2014-03-02 02:00:00 UTC is still 2014-03-01 in US/Pacific.
        let window = TimeWindow {
            start: 1393725600,
            end: 1393725610,
        };
        let tz: Tz = "US/Pacific".parse().unwrap();

        assert_eq!(window.index_date(tz), "2014.03.01");
    }
}
