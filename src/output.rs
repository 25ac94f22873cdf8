//! Terminal rendering for run progress and bag listings

use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};

use bagslice_filter::ProgressView;
use bagslice_types::{Channel, TimeBounds};

/// Progress display for the observer loop
pub enum ProgressDisplay {
    /// indicatif bar on stderr
    Bar(ProgressBar),
    /// One line per whole-percent change, for non-interactive output
    Lines { last: Option<u64> },
}

impl ProgressDisplay {
    pub fn new(use_bar: bool) -> Self {
        if !use_bar {
            return Self::Lines { last: None };
        }

        let bar = ProgressBar::new(100);
        let style = ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        bar.set_style(style);
        bar.set_message("filtering");
        Self::Bar(bar)
    }
}

impl ProgressView for ProgressDisplay {
    fn on_progress(&mut self, percent: f64) {
        let whole = percent.floor() as u64;
        match self {
            Self::Bar(bar) => bar.set_position(whole),
            Self::Lines { last } => {
                if *last != Some(whole) {
                    eprintln!("progress: {:>3}%", whole);
                    *last = Some(whole);
                }
            }
        }
    }

    fn on_success(&mut self) {
        match self {
            Self::Bar(bar) => bar.finish_with_message("done"),
            Self::Lines { .. } => eprintln!("progress: done"),
        }
    }

    fn on_failure(&mut self, message: &str) {
        match self {
            Self::Bar(bar) => bar.abandon_with_message(format!("failed: {}", message)),
            Self::Lines { .. } => eprintln!("progress: failed: {}", message),
        }
    }

    fn on_idle(&mut self) {
        if let Self::Bar(bar) = self
            && !bar.is_finished()
        {
            bar.abandon_with_message("stopped");
        }
    }
}

/// Render the channel table and time bounds of a bag
pub fn format_info(path: &Path, channels: &[Channel], bounds: TimeBounds) -> String {
    let mut out = String::new();
    out.push_str(&format!("Bag:      {}\n", path.display()));
    out.push_str(&format!(
        "Start:    {} ({} ns)\n",
        bounds.start_utc().format("%Y-%m-%d %H:%M:%S%.3f UTC"),
        bounds.start_ns
    ));
    out.push_str(&format!(
        "End:      {} ({} ns)\n",
        bounds.end_utc().format("%Y-%m-%d %H:%M:%S%.3f UTC"),
        bounds.end_ns
    ));
    out.push_str(&format!("Duration: {:.3} s\n", bounds.duration_secs()));

    let total: u64 = channels.iter().map(|c| c.message_count).sum();
    out.push_str(&format!(
        "Channels: {} ({} messages)\n",
        channels.len(),
        total
    ));
    for channel in channels {
        out.push_str(&format!("  {}\n", channel.label()));
    }
    out
}
