//! Terminal progress for a migration run
//!
//! Purely observational: nothing here feeds back into the migration. The
//! display mode (bar, spinner, silent) and per-item narration are
//! independent switches.

use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

use crate::models::{ProgressMode, RunStats, rate_per_second};

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) ETA {eta}";
const SPINNER_TEMPLATE: &str = "{spinner:.cyan} {msg}";
/// Rotation glyphs; the last entry is shown once finished
const SPINNER_GLYPHS: &[&str] = &["|", "/", "-", "\\", "*"];

pub struct ProgressReporter {
    mode: ProgressMode,
    narrate: bool,
    bar: ProgressBar,
    started: Instant,
}

impl ProgressReporter {
    /// `progress_only` turns narration off regardless of `mode`
    #[must_use]
    pub fn new(mode: ProgressMode, progress_only: bool) -> Self {
        Self {
            mode,
            narrate: !progress_only,
            bar: ProgressBar::hidden(),
            started: Instant::now(),
        }
    }

    /// No display and no narration
    #[must_use]
    pub fn silent() -> Self {
        Self::new(ProgressMode::Silent, true)
    }

    /// Whether the run needs a counting pass before processing
    #[must_use]
    pub fn needs_total(&self) -> bool {
        self.mode == ProgressMode::Bar
    }

    /// Show the bar or spinner; `total` is only used by the bar
    pub fn start(&mut self, total: Option<u64>) {
        self.started = Instant::now();
        self.bar = match self.mode {
            ProgressMode::Bar => {
                let bar = ProgressBar::new(total.unwrap_or(0));
                bar.set_style(
                    ProgressStyle::with_template(BAR_TEMPLATE)
                        .unwrap_or_else(|_| ProgressStyle::default_bar()),
                );
                bar
            }
            ProgressMode::Spinner => {
                let spinner = ProgressBar::new_spinner();
                spinner.set_style(
                    ProgressStyle::with_template(SPINNER_TEMPLATE)
                        .unwrap_or_else(|_| ProgressStyle::default_spinner())
                        .tick_strings(SPINNER_GLYPHS),
                );
                spinner.set_message("starting");
                spinner
            }
            ProgressMode::Silent => ProgressBar::hidden(),
        };
    }

    /// Print a per-item line unless narration is off
    pub fn narrate(&self, line: &str) {
        if self.narrate {
            self.bar.suspend(|| println!("{line}"));
        }
    }

    /// One key reached a terminal state
    pub fn advance(&self, stats: &RunStats) {
        match self.mode {
            ProgressMode::Bar => self.bar.inc(1),
            ProgressMode::Spinner => {
                self.bar
                    .set_message(spinner_message(stats.processed, self.started.elapsed()));
                self.bar.tick();
            }
            ProgressMode::Silent => {}
        }
    }

    pub fn finish(&self) {
        match self.mode {
            ProgressMode::Bar => {
                self.bar.finish();
                eprintln!();
            }
            ProgressMode::Spinner => self.bar.finish(),
            ProgressMode::Silent => {}
        }
    }

    /// Final one-line summary, printed in every mode
    pub fn summary(&self, line: &str) {
        self.bar.suspend(|| println!("{line}"));
    }
}

fn spinner_message(processed: u64, elapsed: Duration) -> String {
    let elapsed = elapsed.as_secs_f64();
    format!(
        "{processed} processed | {elapsed:.1}s elapsed | {:.1}/s",
        rate_per_second(processed, elapsed)
    )
}

/// `Done. processed=.. copied=.. ...` line for the end of a run
#[must_use]
pub fn summary_line(stats: &RunStats, dry_run: bool) -> String {
    let prefix = if dry_run { "Dry run complete." } else { "Done." };
    format!(
        "{prefix} processed={} copied={} skipped={} deleted={} failed={} elapsed={:.2}s rate={:.2}/s",
        stats.processed,
        stats.copied,
        stats.skipped,
        stats.deleted_count,
        stats.failed,
        stats.elapsed_seconds,
        stats.rate_per_second,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_bar_mode_needs_a_total() {
        assert!(ProgressReporter::new(ProgressMode::Bar, false).needs_total());
        assert!(!ProgressReporter::new(ProgressMode::Spinner, false).needs_total());
        assert!(!ProgressReporter::silent().needs_total());
    }

    #[test]
    fn test_spinner_message_reports_rate() {
        assert_eq!(
            spinner_message(10, Duration::from_secs(4)),
            "10 processed | 4.0s elapsed | 2.5/s"
        );
        assert_eq!(
            spinner_message(3, Duration::ZERO),
            "3 processed | 0.0s elapsed | 3.0/s"
        );
    }

    #[test]
    fn test_summary_line() {
        let stats = RunStats {
            processed: 3,
            copied: 2,
            skipped: 1,
            elapsed_seconds: 1.5,
            rate_per_second: 2.0,
            ..RunStats::default()
        };
        assert_eq!(
            summary_line(&stats, false),
            "Done. processed=3 copied=2 skipped=1 deleted=0 failed=0 elapsed=1.50s rate=2.00/s"
        );
        assert!(summary_line(&stats, true).starts_with("Dry run complete."));
    }

    #[test]
    fn test_hidden_reporter_accepts_every_call() {
        let mut reporter = ProgressReporter::silent();
        reporter.start(Some(3));
        reporter.narrate("Found: src/a -> dst/a");
        reporter.advance(&RunStats::default());
        reporter.finish();
        assert!(!reporter.needs_total());
    }
}
