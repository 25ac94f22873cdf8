use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use bagslice_filter::{ObserverLoop, RunOutcome, RunState, RunTrigger, Selection};
use bagslice_storage::{FileStore, MetadataProvider};
use bagslice_types::{Channel, TimeBounds};

use crate::config::Config;
use crate::output::ProgressDisplay;

#[derive(Args, Debug)]
pub struct FilterArgs {
    /// Source bag directory
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Destination bag directory (must not already hold a bag)
    #[arg(value_name = "OUTPUT")]
    pub output: PathBuf,

    /// Channel to keep (repeatable); defaults to the first channel of the bag
    #[arg(short, long = "channel", value_name = "NAME")]
    pub channels: Vec<String>,

    /// Keep every channel
    #[arg(long, conflicts_with = "channels")]
    pub all: bool,

    /// Window start in seconds from the first record
    #[arg(long, value_name = "SECS", conflicts_with_all = ["start_ns", "end_ns"])]
    pub start: Option<f64>,

    /// Window end in seconds from the first record (default: end of the bag)
    #[arg(long, value_name = "SECS", conflicts_with_all = ["start_ns", "end_ns"])]
    pub end: Option<f64>,

    /// Absolute window start in nanoseconds
    #[arg(long, value_name = "NS")]
    pub start_ns: Option<i64>,

    /// Absolute window end in nanoseconds
    #[arg(long, value_name = "NS")]
    pub end_ns: Option<i64>,

    /// Observer tick in milliseconds (overrides the config file)
    #[arg(long, value_name = "MS")]
    pub poll_interval_ms: Option<u64>,

    /// Print plain percentage lines instead of a progress bar
    #[arg(long)]
    pub no_progress_bar: bool,
}

impl FilterArgs {
    /// Turn the command line into a validated selection
    pub fn selection(&self, catalog: &[Channel], bounds: TimeBounds) -> Result<Selection> {
        let channels: Vec<String> = if self.all {
            catalog.iter().map(|c| c.name.clone()).collect()
        } else if !self.channels.is_empty() {
            self.channels.clone()
        } else {
            catalog.iter().take(1).map(|c| c.name.clone()).collect()
        };

        let selection = if self.start_ns.is_some() || self.end_ns.is_some() {
            let selection = Selection::new(
                channels,
                self.start_ns.unwrap_or(bounds.start_ns),
                self.end_ns.unwrap_or(bounds.end_ns),
            )?;
            selection.check_bounds(bounds)?;
            selection
        } else {
            Selection::from_offsets(channels, bounds, self.start.unwrap_or(0.0), self.end)?
        };

        Ok(selection)
    }
}

pub async fn run(args: FilterArgs, mut config: Config) -> Result<()> {
    if let Some(ms) = args.poll_interval_ms {
        config.run.poll_interval_ms = ms;
        config.validate()?;
    }
    if args.no_progress_bar {
        config.output.progress_bar = false;
    }

    let storage = Arc::new(FileStore::new());
    let catalog = storage
        .list_channels(&args.input)
        .with_context(|| format!("Failed to read channels of {}", args.input.display()))?;
    let bounds = storage
        .time_bounds(&args.input)
        .with_context(|| format!("Failed to read time bounds of {}", args.input.display()))?;

    let selection = args.selection(&catalog, bounds).context("Invalid selection")?;
    info!(
        channels = ?selection.channels(),
        start_ns = selection.start_ns(),
        end_ns = selection.end_ns(),
        "Selection ready"
    );

    let state = RunState::new();
    let trigger = RunTrigger::new(storage)
        .with_options(config.run_options())
        .with_state(state.clone());
    let handle = trigger
        .start_run(&args.input, &args.output, selection)
        .context("Failed to start run")?;

    let shutdown = CancellationToken::new();
    let interrupt = spawn_interrupt_watcher(state, shutdown.clone());

    let mut observer = ObserverLoop::new(ProgressDisplay::new(config.output.progress_bar))
        .with_interval(config.poll_interval());
    let report = observer.watch(handle).await;

    shutdown.cancel();
    let _ = interrupt.await;

    match report.outcome {
        RunOutcome::Succeeded => {
            println!(
                "Wrote {} of {} scanned records to {}",
                report.stats.written,
                report.stats.scanned,
                args.output.display()
            );
            Ok(())
        }
        RunOutcome::Failed(message) => anyhow::bail!("Processing failed: {}", message),
        RunOutcome::Cancelled => anyhow::bail!(
            "Run cancelled after {} records; {} is incomplete",
            report.stats.scanned,
            args.output.display()
        ),
    }
}

/// What an interrupt does to the current run
#[derive(Debug, PartialEq, Eq)]
enum InterruptAction {
    /// First interrupt: ask the worker to stop at its next record
    CancelRun,
    /// The run was already cancelled and the worker is still stuck
    Exit,
}

fn on_interrupt(state: &RunState) -> InterruptAction {
    if state.is_processing() {
        state.cancel();
        InterruptAction::CancelRun
    } else {
        InterruptAction::Exit
    }
}

/// Cancel on the first Ctrl-C and exit on the next, until `shutdown` fires
fn spawn_interrupt_watcher(
    state: RunState,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        warn!(error = %e, "Cannot listen for interrupts");
                        break;
                    }
                    match on_interrupt(&state) {
                        InterruptAction::CancelRun => {
                            warn!("Interrupt received, stopping run (press Ctrl-C again to exit)");
                        }
                        InterruptAction::Exit => {
                            warn!("Second interrupt received, exiting");
                            std::process::exit(130);
                        }
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bagslice_storage::{SequentialWriter, Storage};
    use bagslice_types::ValidationError;
    use tempfile::TempDir;

    fn args() -> FilterArgs {
        FilterArgs {
            input: PathBuf::from("in"),
            output: PathBuf::from("out"),
            channels: Vec::new(),
            all: false,
            start: None,
            end: None,
            start_ns: None,
            end_ns: None,
            poll_interval_ms: None,
            no_progress_bar: false,
        }
    }

    fn catalog() -> Vec<Channel> {
        vec![Channel::new("/a", "T1", 3), Channel::new("/b", "T2", 4)]
    }

    const BOUNDS: TimeBounds = TimeBounds {
        start_ns: 1_000_000_000,
        end_ns: 11_000_000_000,
    };

    #[test]
    fn test_defaults_to_first_channel_and_whole_bag() {
        let selection = args().selection(&catalog(), BOUNDS).unwrap();
        assert_eq!(selection.channels().len(), 1);
        assert!(selection.includes_channel("/a"));
        assert_eq!(selection.start_ns(), BOUNDS.start_ns);
        assert_eq!(selection.end_ns(), BOUNDS.end_ns);
    }

    #[test]
    fn test_all_channels_with_offsets() {
        let mut args = args();
        args.all = true;
        args.start = Some(2.0);
        args.end = Some(4.5);
        let selection = args.selection(&catalog(), BOUNDS).unwrap();
        assert_eq!(selection.channels().len(), 2);
        assert_eq!(selection.start_ns(), 3_000_000_000);
        assert_eq!(selection.end_ns(), 5_500_000_000);
    }

    #[test]
    fn test_absolute_window() {
        let mut args = args();
        args.channels = vec!["/b".to_string()];
        args.start_ns = Some(2_000_000_000);
        let selection = args.selection(&catalog(), BOUNDS).unwrap();
        assert!(selection.includes_channel("/b"));
        assert_eq!(selection.start_ns(), 2_000_000_000);
        assert_eq!(selection.end_ns(), BOUNDS.end_ns);
    }

    #[test]
    fn test_empty_bag_has_nothing_to_select() {
        let err = args().selection(&[], BOUNDS).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ValidationError>(),
            Some(&ValidationError::NoChannels)
        );
    }

    #[test]
    fn test_end_before_start_rejected() {
        let mut args = args();
        args.start = Some(5.0);
        args.end = Some(1.0);
        let err = args.selection(&catalog(), BOUNDS).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ValidationError>(),
            Some(ValidationError::EndBeforeStart { .. })
        ));
    }

    #[test]
    fn test_second_interrupt_exits() {
        let state = RunState::new();
        let _ticket = state.begin().expect("state is free");

        assert_eq!(on_interrupt(&state), InterruptAction::CancelRun);
        assert!(!state.is_processing());
        assert_eq!(on_interrupt(&state), InterruptAction::Exit);
    }

    #[tokio::test]
    async fn test_bag_without_channels_never_starts_a_run() {
        let temp = TempDir::new().expect("temp dir");
        let input = temp.path().join("empty");
        let writer: Box<dyn SequentialWriter> = FileStore::new().open_writer(&input).unwrap();
        writer.finish().unwrap();

        let mut args = args();
        args.input = input;
        args.output = temp.path().join("out");
        args.no_progress_bar = true;
        let output = args.output.clone();

        let err = run(args, Config::default()).await.unwrap_err();
        assert!(format!("{:#}", err).contains("no channels selected"));
        assert!(!output.exists());
    }
}
