//! Fixed-cadence polling of a run's progress events

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use bagslice_types::ProgressEvent;

use crate::engine::RunStats;
use crate::progress::ProgressReceiver;
use crate::runner::RunHandle;

/// Default observer tick
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Where the observer reports what it drains
pub trait ProgressView {
    fn on_progress(&mut self, percent: f64);

    fn on_success(&mut self);

    fn on_failure(&mut self, message: &str);

    /// Polling has stopped; whatever triggered the run may be re-enabled
    fn on_idle(&mut self) {}
}

/// How a run ended from the observer's point of view
#[derive(Clone, Debug, PartialEq)]
pub enum RunOutcome {
    Succeeded,
    Failed(String),
    /// Stopped without a terminal event
    Cancelled,
}

/// Final state after polling stops
#[derive(Clone, Debug, PartialEq)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Last displayed percentage
    pub percent: f64,
    pub stats: RunStats,
}

/// Polling consumer of a run's progress channel
pub struct ObserverLoop<V> {
    view: V,
    interval: Duration,
    percent: f64,
    terminal: Option<RunOutcome>,
}

impl<V: ProgressView> ObserverLoop<V> {
    pub fn new(view: V) -> Self {
        Self {
            view,
            interval: DEFAULT_POLL_INTERVAL,
            percent: 0.0,
            terminal: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn percent(&self) -> f64 {
        self.percent
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn into_view(self) -> V {
        self.view
    }

    /// One tick: apply every queued event without waiting, returns how many
    pub fn drain(&mut self, receiver: &mut ProgressReceiver) -> usize {
        let events = receiver.drain();
        for event in &events {
            match event {
                ProgressEvent::Progress(fraction) => {
                    self.percent = *fraction;
                    self.view.on_progress(*fraction);
                }
                ProgressEvent::Success => {
                    self.terminal = Some(RunOutcome::Succeeded);
                    self.view.on_success();
                }
                ProgressEvent::Failure(message) => {
                    self.terminal = Some(RunOutcome::Failed(message.clone()));
                    self.view.on_failure(message);
                }
            }
        }
        events.len()
    }

    /// Poll until the run stops processing, then collect its outcome
    pub async fn watch(&mut self, handle: RunHandle) -> RunReport {
        let (mut receiver, state, task) = handle.into_parts();
        self.percent = 0.0;
        self.terminal = None;

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.drain(&mut receiver);
            if !state.is_processing() || task.is_finished() {
                break;
            }
        }

        // A cancelled worker exits within one record
        let stats = match task.await {
            Ok(stats) => stats,
            Err(e) => {
                warn!(error = %e, "Filter worker did not complete");
                if self.terminal.is_none() {
                    let message = format!("worker terminated unexpectedly: {}", e);
                    self.view.on_failure(&message);
                    self.terminal = Some(RunOutcome::Failed(message));
                }
                RunStats::default()
            }
        };
        self.drain(&mut receiver);

        let outcome = self.terminal.take().unwrap_or(RunOutcome::Cancelled);
        debug!(?outcome, percent = self.percent, "Observer stopped");
        self.view.on_idle();

        RunReport {
            outcome,
            percent: self.percent,
            stats,
        }
    }
}
