//! Progress extraction from downloader output.
//!
//! The stream downloader prints free-form progress lines such as
//! `Vid 1920x1080 | 45.2% 602.51MB/1.71GB 12.5MB/s ETA: 00:02:10`.
//! [`parse_progress`] turns one line into a [`ProgressUpdate`]; [`ProgressThrottle`]
//! decides which of those updates are worth writing to the store.

use regex::{Regex, RegexBuilder};
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use crate::types::ProgressUpdate;

/// Speed sentinel reported while the downloader merges segments
pub const MERGING_SPEED: &str = "merging...";
/// ETA sentinel reported while the downloader merges segments
pub const MERGING_ETA: &str = "please wait";

struct Patterns {
    percent: Regex,
    speed: Regex,
    sizes: Regex,
    eta_label: Regex,
    clock: Regex,
}

// Literal patterns; compilation is exercised by the unit tests below
#[allow(clippy::expect_used)]
static PATTERNS: LazyLock<Patterns> = LazyLock::new(|| Patterns {
    percent: Regex::new(r"(\d+(?:\.\d+)?)\s*%").expect("percent pattern"),
    speed: RegexBuilder::new(r"(\d+(?:\.\d+)?\s*[KMGT]?B(?:ps|/s))")
        .case_insensitive(true)
        .build()
        .expect("speed pattern"),
    sizes: RegexBuilder::new(r"(\d+(?:\.\d+)?\s*[KMGT]?B)\s*/\s*(\d+(?:\.\d+)?\s*[KMGT]?B)")
        .case_insensitive(true)
        .build()
        .expect("size pattern"),
    eta_label: RegexBuilder::new(r"ETA[:\s]+(\d{2}:\d{2}:\d{2})")
        .case_insensitive(true)
        .build()
        .expect("eta pattern"),
    clock: Regex::new(r"\d{2}:\d{2}:\d{2}").expect("clock pattern"),
});

/// Parse one line of downloader output.
///
/// Returns `None` when the line carries no percentage. A line that also
/// announces the merge/mux phase reports 100 with sentinel speed and ETA.
pub fn parse_progress(line: &str) -> Option<ProgressUpdate> {
    let patterns = &*PATTERNS;

    let progress: f64 = patterns
        .percent
        .captures(line)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())?;

    let speed = patterns
        .speed
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());

    let (downloaded_size, total_size) = match patterns.sizes.captures(line) {
        Some(c) => (
            c.get(1).map(|m| m.as_str().to_string()),
            c.get(2).map(|m| m.as_str().to_string()),
        ),
        None => (None, None),
    };

    let mut update = ProgressUpdate {
        progress,
        speed,
        eta: parse_eta(patterns, line),
        downloaded_size,
        total_size,
    };

    if is_merging(line) {
        update.progress = 100.0;
        update.speed = Some(MERGING_SPEED.to_string());
        update.eta = Some(MERGING_ETA.to_string());
    }

    Some(update)
}

fn is_merging(line: &str) -> bool {
    line.contains("Merging") || line.to_lowercase().contains("muxing")
}

/// `ETA:`-labelled clock first; otherwise a bare clock only when it ends the line
/// (a leading `[hh:mm:ss]` is the log timestamp, not an ETA).
fn parse_eta(patterns: &Patterns, line: &str) -> Option<String> {
    if let Some(m) = patterns.eta_label.captures(line).and_then(|c| c.get(1)) {
        return Some(m.as_str().to_string());
    }

    let last = patterns.clock.find_iter(line).last()?;
    if line.trim_end().ends_with(last.as_str()) {
        Some(last.as_str().to_string())
    } else {
        None
    }
}

/// Rate limiter for progress writes.
///
/// The first update always passes. After that an update passes when at least
/// `interval` elapsed since the last accepted one, or when progress moved by at
/// least `delta_threshold` percentage points.
#[derive(Debug)]
pub struct ProgressThrottle {
    interval: Duration,
    delta_threshold: f64,
    last: Option<(Instant, f64)>,
}

impl ProgressThrottle {
    /// Create a throttle
    pub fn new(interval: Duration, delta_threshold: f64) -> Self {
        Self {
            interval,
            delta_threshold,
            last: None,
        }
    }

    /// Decide whether an update observed now should be written
    pub fn should_write(&mut self, progress: f64) -> bool {
        self.should_write_at(progress, Instant::now())
    }

    fn should_write_at(&mut self, progress: f64, now: Instant) -> bool {
        let accept = match self.last {
            None => true,
            Some((at, last_progress)) => {
                now.duration_since(at) >= self.interval
                    || (progress - last_progress).abs() >= self.delta_threshold
            }
        };

        if accept {
            self.last = Some((now, progress));
        }
        accept
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_progress_line() {
        let update =
            parse_progress("Downloading... 45.2% 12.5MB/s 602.51MB/1.71GB ETA: 00:02:10").unwrap();

        assert_eq!(update.progress, 45.2);
        assert_eq!(update.speed.as_deref(), Some("12.5MB/s"));
        assert_eq!(update.downloaded_size.as_deref(), Some("602.51MB"));
        assert_eq!(update.total_size.as_deref(), Some("1.71GB"));
        assert_eq!(update.eta.as_deref(), Some("00:02:10"));
    }

    #[test]
    fn line_without_percentage_yields_nothing() {
        assert_eq!(parse_progress("12.5MB/s 602.51MB/1.71GB ETA: 00:02:10"), None);
        assert_eq!(parse_progress("INFO : Loading URL"), None);
        assert_eq!(parse_progress(""), None);
    }

    #[test]
    fn speed_accepts_bps_suffix_and_any_case() {
        let update = parse_progress("Vid 30.00% 24.69MBps").unwrap();
        assert_eq!(update.speed.as_deref(), Some("24.69MBps"));

        let update = parse_progress("Aud 10% 800 kb/s").unwrap();
        assert_eq!(update.speed.as_deref(), Some("800 kb/s"));
    }

    #[test]
    fn trailing_clock_is_eta_but_leading_timestamp_is_not() {
        let update = parse_progress("[00:51:53] Vid 12.0% 1.2MBps 00:00:48").unwrap();
        assert_eq!(update.eta.as_deref(), Some("00:00:48"));

        let update = parse_progress("[00:51:53] Vid 12.0% 1.2MBps").unwrap();
        assert_eq!(update.eta, None);
    }

    #[test]
    fn merging_forces_completion_with_sentinels() {
        let update = parse_progress("Vid 97.3% Merging segments...").unwrap();
        assert_eq!(update.progress, 100.0);
        assert_eq!(update.speed.as_deref(), Some(MERGING_SPEED));
        assert_eq!(update.eta.as_deref(), Some(MERGING_ETA));

        let update = parse_progress("Aud 12.0% 3.1MB/9.4MB Binary Muxing...").unwrap();
        assert_eq!(update.progress, 100.0);
        assert_eq!(update.downloaded_size.as_deref(), Some("3.1MB"));
    }

    #[test]
    fn merge_keyword_without_percentage_yields_nothing() {
        assert_eq!(parse_progress("[INFO] Merging segments..."), None);
        assert_eq!(parse_progress("Binary Muxing..."), None);
        assert_eq!(parse_progress("MUXING to mp4"), None);
    }

    #[test]
    fn merge_keyword_is_case_sensitive_but_mux_is_not() {
        assert_eq!(parse_progress("50% merging later").unwrap().progress, 50.0);
        assert_eq!(parse_progress("50% MUXING to mp4").unwrap().progress, 100.0);
    }

    #[test]
    fn sizes_require_a_slash_pair() {
        let update = parse_progress("50% 602.51MB of 1.71GB").unwrap();
        assert_eq!(update.downloaded_size, None);
        assert_eq!(update.total_size, None);
    }

    #[test]
    fn first_update_always_written() {
        let mut throttle = ProgressThrottle::new(Duration::from_secs(1), 0.5);
        assert!(throttle.should_write(0.1));
    }

    #[test]
    fn small_changes_within_interval_are_dropped() {
        let mut throttle = ProgressThrottle::new(Duration::from_secs(1), 0.5);
        let start = Instant::now();

        assert!(throttle.should_write_at(10.0, start));
        assert!(!throttle.should_write_at(10.2, start + Duration::from_millis(100)));
        assert!(!throttle.should_write_at(10.4, start + Duration::from_millis(200)));
    }

    #[test]
    fn large_delta_bypasses_interval() {
        let mut throttle = ProgressThrottle::new(Duration::from_secs(1), 0.5);
        let start = Instant::now();

        assert!(throttle.should_write_at(10.0, start));
        assert!(throttle.should_write_at(10.5, start + Duration::from_millis(10)));
        assert!(!throttle.should_write_at(10.6, start + Duration::from_millis(20)));
    }

    #[test]
    fn elapsed_interval_allows_any_change() {
        let mut throttle = ProgressThrottle::new(Duration::from_secs(1), 0.5);
        let start = Instant::now();

        assert!(throttle.should_write_at(10.0, start));
        assert!(throttle.should_write_at(10.1, start + Duration::from_secs(1)));
    }
}
