use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::debug;

use bagslice_storage::{MetadataProvider, Storage, StorageError};
use bagslice_types::{DEFAULT_SERIALIZATION_FORMAT, Selection, ValidationError};

use crate::engine::{FilterEngine, RunJob, RunStats};
use crate::progress::{ProgressReceiver, progress_channel};
use crate::state::RunState;

/// Reasons a run is refused before the worker starts
#[derive(Debug, Error)]
pub enum StartError {
    #[error("invalid selection: {0}")]
    Validation(#[from] ValidationError),

    #[error("cannot read source metadata: {0}")]
    Metadata(#[from] StorageError),

    #[error("a run is already in progress")]
    AlreadyRunning,
}

/// Per-run settings
#[derive(Clone, Debug)]
pub struct RunOptions {
    /// Tag used when declaring channels on the destination
    pub serialization_format: String,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            serialization_format: DEFAULT_SERIALIZATION_FORMAT.to_string(),
        }
    }
}

/// Starts filter runs on a worker, one at a time
pub struct RunTrigger<S> {
    storage: Arc<S>,
    state: RunState,
    options: RunOptions,
}

impl<S: Storage> RunTrigger<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self {
            storage,
            state: RunState::new(),
            options: RunOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Use an existing process-wide run flag
    pub fn with_state(mut self, state: RunState) -> Self {
        self.state = state;
        self
    }

    /// Shared run flag; clear it to cancel the active run
    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// False until the worker of the last run has exited
    pub fn is_available(&self) -> bool {
        !self.state.is_active()
    }

    /// Validate `selection` against the source and start copying on a worker
    ///
    /// Must be called from within a Tokio runtime. Nothing is written when
    /// this returns an error.
    pub fn start_run(
        &self,
        source: &Path,
        destination: &Path,
        selection: Selection,
    ) -> Result<RunHandle, StartError> {
        let bounds = self.storage.time_bounds(source)?;
        selection.check_bounds(bounds)?;
        let catalog = self.storage.list_channels(source)?;

        let ticket = self.state.begin().ok_or(StartError::AlreadyRunning)?;

        let job = RunJob {
            source: source.to_path_buf(),
            destination: destination.to_path_buf(),
            selection,
            catalog,
        };
        let engine = FilterEngine::new(Arc::clone(&self.storage))
            .with_serialization_format(self.options.serialization_format.clone());
        let (mut sender, receiver) = progress_channel();

        debug!(source = %job.source.display(), "Spawning filter worker");
        let task = tokio::task::spawn_blocking(move || engine.run(&job, &mut sender, ticket));

        Ok(RunHandle {
            receiver,
            state: self.state.clone(),
            task,
        })
    }
}

/// The caller's side of an active run
pub struct RunHandle {
    receiver: ProgressReceiver,
    state: RunState,
    task: JoinHandle<RunStats>,
}

impl RunHandle {
    /// Request cooperative cancellation
    pub fn cancel(&self) {
        self.state.cancel();
    }

    /// Split into the event receiver, run flag and worker handle
    pub fn into_parts(self) -> (ProgressReceiver, RunState, JoinHandle<RunStats>) {
        (self.receiver, self.state, self.task)
    }
}
