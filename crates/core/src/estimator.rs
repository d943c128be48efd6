// crates/core/src/estimator.rs
//! Progress estimation for a conversion that reports no real progress.
//!
//! `ebook-convert` prints free-form log lines and nothing else, so the
//! percentage is derived from elapsed time plus a few recognizable markers
//! in the output. The markers live in an ordered rule list that can be
//! replaced, or emptied to fall back to the pure elapsed-time ramp.

use std::time::{Duration, Instant};

/// One `(progress, message)` pair to write into a job record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Estimate {
    pub progress: u8,
    pub message: String,
}

/// Conversion stage a marker rule recognizes. Each stage owns its formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Cover page handling; pinned at 20.
    Cover,
    /// Images and body content; 30 + 0.4/s, capped at 70.
    Content,
    /// PDF output rendering; 70 + 0.2/s, capped at 90.
    Rendering,
}

impl Stage {
    fn estimate(self, elapsed: f64) -> Estimate {
        let secs = elapsed as u64;
        match self {
            Stage::Cover => Estimate {
                progress: 20,
                message: "Processing cover...".to_string(),
            },
            Stage::Content => Estimate {
                progress: ramp(30.0, elapsed * 0.4, 70),
                message: format!("Processing images and content... ({secs}s)"),
            },
            Stage::Rendering => Estimate {
                progress: ramp(70.0, elapsed * 0.2, 90),
                message: format!("Generating PDF... ({secs}s)"),
            },
        }
    }
}

/// Maps output lines containing any of `markers` to a stage.
#[derive(Debug, Clone)]
pub struct MarkerRule {
    pub stage: Stage,
    markers: Vec<String>,
}

impl MarkerRule {
    pub fn new<I, S>(stage: Stage, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            stage,
            markers: markers
                .into_iter()
                .map(|m| m.into().to_lowercase())
                .collect(),
        }
    }

    fn matches(&self, lowered_line: &str) -> bool {
        self.markers.iter().any(|m| lowered_line.contains(m.as_str()))
    }
}

/// `base + floor(increment)`, capped.
fn ramp(base: f64, increment: f64, cap: u8) -> u8 {
    let value = base + increment.max(0.0).floor();
    value.min(f64::from(cap)) as u8
}

/// Ordered list of marker rules; the first match wins.
#[derive(Debug, Clone)]
pub struct ProgressEstimator {
    rules: Vec<MarkerRule>,
}

impl Default for ProgressEstimator {
    /// Rules tuned to Calibre's `ebook-convert` log output (English and
    /// Chinese locales).
    fn default() -> Self {
        Self::new(vec![
            MarkerRule::new(Stage::Cover, ["cover", "封面"]),
            MarkerRule::new(Stage::Content, ["image", "图片"]),
            MarkerRule::new(Stage::Rendering, ["pdf", "generating", "render"]),
        ])
    }
}

impl ProgressEstimator {
    pub fn new(rules: Vec<MarkerRule>) -> Self {
        Self { rules }
    }

    /// Estimator with no marker rules: every line uses the elapsed-time ramp.
    pub fn elapsed_only() -> Self {
        Self { rules: Vec::new() }
    }

    /// Estimate after the tool printed `line`.
    pub fn on_output(&self, elapsed: Duration, line: &str) -> Estimate {
        let elapsed = elapsed.as_secs_f64();
        let lowered = line.to_lowercase();
        match self.rules.iter().find(|r| r.matches(&lowered)) {
            Some(rule) => rule.stage.estimate(elapsed),
            None => Self::generic(elapsed),
        }
    }

    /// Estimate when the tool has been silent for a while, so the client
    /// never sees a frozen indicator.
    pub fn on_idle(&self, elapsed: Duration) -> Estimate {
        let elapsed = elapsed.as_secs_f64();
        Estimate {
            progress: ramp(30.0, elapsed * 0.5, 85),
            message: format!("Processing... ({}s)", elapsed as u64),
        }
    }

    /// Two-phase ramp: fast for the first 10 seconds, then slower.
    fn generic(elapsed: f64) -> Estimate {
        let progress = if elapsed < 10.0 {
            ramp(10.0, elapsed * 2.0, 30)
        } else {
            ramp(30.0, (elapsed - 10.0) * 0.6, 85)
        };
        Estimate {
            progress,
            message: format!("Converting... ({}s)", elapsed as u64),
        }
    }
}

/// Bounds how often estimates are written to the job store.
///
/// Output lines may update at most once per `line_interval`; the idle
/// estimate is only due after `idle_interval` with no update at all.
#[derive(Debug, Clone)]
pub struct UpdateThrottle {
    last_update: Instant,
    line_interval: Duration,
    idle_interval: Duration,
}

impl UpdateThrottle {
    pub const DEFAULT_LINE_INTERVAL: Duration = Duration::from_millis(500);
    pub const DEFAULT_IDLE_INTERVAL: Duration = Duration::from_secs(2);

    pub fn new(start: Instant, line_interval: Duration, idle_interval: Duration) -> Self {
        Self {
            last_update: start,
            line_interval,
            idle_interval,
        }
    }

    pub fn idle_interval(&self) -> Duration {
        self.idle_interval
    }

    /// Whether an output line at `now` should produce a store write.
    pub fn line_due(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_update) >= self.line_interval
    }

    /// Whether the idle estimate is due at `now`.
    pub fn idle_due(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_update) >= self.idle_interval
    }

    pub fn mark(&mut self, now: Instant) {
        self.last_update = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    #[test]
    fn test_generic_line_early_phase() {
        let est = ProgressEstimator::default().on_output(secs(5.0), "Parsing all content...");
        assert_eq!(est.progress, 20);
        assert_eq!(est.message, "Converting... (5s)");
    }

    #[test]
    fn test_generic_line_caps_early_phase_at_30() {
        let est = ProgressEstimator::default().on_output(secs(9.9), "Parsing");
        assert_eq!(est.progress, 29);
        let est = ProgressEstimator::default().on_output(secs(10.0), "Parsing");
        assert_eq!(est.progress, 30);
    }

    #[test]
    fn test_generic_line_late_phase() {
        let est = ProgressEstimator::default().on_output(secs(60.0), "Parsing");
        assert_eq!(est.progress, 60);
        let est = ProgressEstimator::default().on_output(secs(500.0), "Parsing");
        assert_eq!(est.progress, 85);
    }

    #[test]
    fn test_generating_marker() {
        let est = ProgressEstimator::default().on_output(secs(20.0), "Generating output...");
        assert_eq!(est.progress, 74);
        assert_eq!(est.message, "Generating PDF... (20s)");
    }

    #[test]
    fn test_rendering_marker_caps_at_90() {
        let est = ProgressEstimator::default().on_output(secs(300.0), "Rendering page 12");
        assert_eq!(est.progress, 90);
    }

    #[test]
    fn test_image_marker() {
        let est = ProgressEstimator::default().on_output(secs(25.0), "Processing IMAGE 3");
        assert_eq!(est.progress, 40);
        let est = ProgressEstimator::default().on_output(secs(400.0), "image");
        assert_eq!(est.progress, 70);
    }

    #[test]
    fn test_cover_marker_pins_progress_even_late() {
        let est = ProgressEstimator::default().on_output(secs(45.0), "Found Cover image");
        assert_eq!(est.progress, 20);
        assert_eq!(est.message, "Processing cover...");
    }

    #[test]
    fn test_rules_are_checked_in_order() {
        // "cover" wins over "pdf" because it comes first.
        let est = ProgressEstimator::default().on_output(secs(20.0), "cover.pdf");
        assert_eq!(est.progress, 20);
    }

    #[test]
    fn test_chinese_markers() {
        let est = ProgressEstimator::default().on_output(secs(1.0), "正在处理封面");
        assert_eq!(est.progress, 20);
    }

    #[test]
    fn test_elapsed_only_ignores_markers() {
        let est = ProgressEstimator::elapsed_only().on_output(secs(20.0), "Generating output...");
        assert_eq!(est.progress, 36);
    }

    #[test]
    fn test_custom_rules_replace_defaults() {
        let est = ProgressEstimator::new(vec![MarkerRule::new(Stage::Rendering, ["Writing"])])
            .on_output(secs(0.0), "writing chapter 1");
        assert_eq!(est.progress, 70);
    }

    #[test]
    fn test_idle_estimate() {
        let est = ProgressEstimator::default().on_idle(secs(4.0));
        assert_eq!(est.progress, 32);
        assert_eq!(est.message, "Processing... (4s)");
        assert_eq!(ProgressEstimator::default().on_idle(secs(1000.0)).progress, 85);
    }

    #[test]
    fn test_throttle_intervals() {
        let start = Instant::now();
        let mut throttle = UpdateThrottle::new(
            start,
            UpdateThrottle::DEFAULT_LINE_INTERVAL,
            UpdateThrottle::DEFAULT_IDLE_INTERVAL,
        );
        assert!(!throttle.line_due(start + Duration::from_millis(100)));
        assert!(throttle.line_due(start + Duration::from_millis(500)));
        assert!(!throttle.idle_due(start + Duration::from_secs(1)));
        assert!(throttle.idle_due(start + Duration::from_secs(2)));

        throttle.mark(start + Duration::from_secs(2));
        assert!(!throttle.line_due(start + Duration::from_millis(2100)));
        assert!(!throttle.idle_due(start + Duration::from_secs(3)));
    }
}
