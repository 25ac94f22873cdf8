use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use bagslice_storage::{Storage, StorageError, StorageFilter};
use bagslice_types::{Channel, DEFAULT_SERIALIZATION_FORMAT, ProgressEvent, Selection};

use crate::predicate::WindowFilter;
use crate::progress::ProgressSender;
use crate::state::RunTicket;

/// Everything one run needs, moved onto the worker
#[derive(Clone, Debug)]
pub struct RunJob {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub selection: Selection,
    /// Channels reported by the metadata provider for `source`
    pub catalog: Vec<Channel>,
}

/// Counters for one run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Records read from the source
    pub scanned: u64,
    /// Records written to the destination
    pub written: u64,
    /// The run stopped on a cancellation request
    pub cancelled: bool,
}

/// Failures that abort a run
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to open source {path}: {source}")]
    OpenSource { path: String, source: StorageError },

    #[error("failed to open destination {path}: {source}")]
    OpenDestination { path: String, source: StorageError },

    #[error("channel {0} is not present in the source")]
    InvalidChannel(String),

    #[error("failed to declare channel {name}: {source}")]
    Declare { name: String, source: StorageError },

    #[error("failed to read source: {0}")]
    Read(#[source] StorageError),

    #[error("failed to write destination: {0}")]
    Write(#[source] StorageError),

    #[error("failed to finalize destination: {0}")]
    Finish(#[source] StorageError),
}

/// Single-pass channel + time window copy from one log into another
pub struct FilterEngine<S> {
    storage: Arc<S>,
    serialization_format: String,
}

impl<S: Storage> FilterEngine<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self {
            storage,
            serialization_format: DEFAULT_SERIALIZATION_FORMAT.to_string(),
        }
    }

    /// Tag used when declaring channels on the destination
    pub fn with_serialization_format(mut self, format: impl Into<String>) -> Self {
        self.serialization_format = format.into();
        self
    }

    /// Execute a run to completion, failure or cancellation
    ///
    /// Blocks on storage I/O; run it on a worker. Errors never escape: they
    /// become `Progress(0)` followed by `Failure`. A cancelled run emits no
    /// terminal event. The ticket is released on return or unwind.
    pub fn run(&self, job: &RunJob, progress: &mut ProgressSender, ticket: RunTicket) -> RunStats {
        info!(
            source = %job.source.display(),
            destination = %job.destination.display(),
            channels = job.selection.channels().len(),
            start_ns = job.selection.start_ns(),
            end_ns = job.selection.end_ns(),
            "Starting filter run"
        );

        let mut stats = RunStats::default();
        match self.copy(job, progress, &ticket, &mut stats) {
            Ok(()) if stats.cancelled => {
                warn!(
                    scanned = stats.scanned,
                    written = stats.written,
                    "Run cancelled, destination left incomplete"
                );
            }
            Ok(()) => {
                progress.progress(100.0);
                progress.send(ProgressEvent::Success);
                info!(
                    scanned = stats.scanned,
                    written = stats.written,
                    "Filter run complete"
                );
            }
            Err(err) => {
                warn!(error = %err, scanned = stats.scanned, "Filter run failed");
                progress.progress(0.0);
                progress.send(ProgressEvent::Failure(err.to_string()));
            }
        }

        drop(ticket);
        stats
    }

    fn copy(
        &self,
        job: &RunJob,
        progress: &mut ProgressSender,
        ticket: &RunTicket,
        stats: &mut RunStats,
    ) -> Result<(), EngineError> {
        let selection = &job.selection;
        let filter = WindowFilter::new(selection.clone());

        let mut reader = self
            .storage
            .open_reader(&job.source, &StorageFilter::new(selection.channels().iter().cloned()))
            .map_err(|source| EngineError::OpenSource {
                path: job.source.display().to_string(),
                source,
            })?;

        let mut writer = self
            .storage
            .open_writer(&job.destination)
            .map_err(|source| EngineError::OpenDestination {
                path: job.destination.display().to_string(),
                source,
            })?;

        for name in selection.channels() {
            let known = job
                .catalog
                .iter()
                .find(|c| &c.name == name)
                .ok_or_else(|| EngineError::InvalidChannel(name.clone()))?;

            let declaration = Channel {
                message_count: 0,
                serialization_format: self.serialization_format.clone(),
                ..known.clone()
            };
            writer
                .declare_channel(&declaration)
                .map_err(|source| EngineError::Declare {
                    name: name.clone(),
                    source,
                })?;
            debug!(channel = %name, type_name = %known.type_name, "Declared channel");
        }

        loop {
            if ticket.is_cancelled() {
                stats.cancelled = true;
                // Dropping the writer without finishing leaves no index behind
                return Ok(());
            }

            if !reader.has_next().map_err(EngineError::Read)? {
                break;
            }
            let record = reader.read_next().map_err(EngineError::Read)?;
            stats.scanned += 1;

            progress.progress(filter.progress(record.timestamp_ns));

            if filter.matches(&record) {
                writer.write(&record).map_err(EngineError::Write)?;
                stats.written += 1;
            }
        }

        writer.finish().map_err(EngineError::Finish)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use bagslice_storage::MemoryStore;
    use bagslice_types::Record;

    use super::*;
    use crate::progress::progress_channel;
    use crate::state::RunState;

    fn alternating_store() -> MemoryStore {
        let store = MemoryStore::new();
        let records = (0..10)
            .map(|ts| {
                let channel = if ts % 2 == 0 { "A" } else { "B" };
                Record::new(channel, vec![ts as u8], ts)
            })
            .collect();
        store.insert_bag(
            "in",
            vec![Channel::new("A", "T1", 0), Channel::new("B", "T2", 0)],
            records,
        );
        store
    }

    fn job(store: &MemoryStore, selection: Selection) -> RunJob {
        RunJob {
            source: PathBuf::from("in"),
            destination: PathBuf::from("out"),
            selection,
            catalog: bagslice_storage::MetadataProvider::list_channels(store, Path::new("in"))
                .unwrap(),
        }
    }

    fn run(store: &MemoryStore, job: &RunJob) -> (RunStats, Vec<ProgressEvent>) {
        let engine = FilterEngine::new(Arc::new(store.clone()));
        let (mut tx, mut rx) = progress_channel();
        let state = RunState::new();
        let ticket = state.begin().expect("state is free");
        let stats = engine.run(job, &mut tx, ticket);
        assert!(!state.is_processing());
        assert!(!state.is_active());
        (stats, rx.drain())
    }

    #[test]
    fn test_copies_selected_channel_inside_window() {
        let store = alternating_store();
        let job = job(&store, Selection::new(["A"], 2, 6).unwrap());
        let (stats, events) = run(&store, &job);

        let out = store.bag(Path::new("out")).unwrap();
        let stamps: Vec<i64> = out.records.iter().map(|r| r.timestamp_ns).collect();
        assert_eq!(stamps, vec![2, 4, 6]);
        assert_eq!(out.channels.len(), 1);
        assert_eq!(out.channels[0].name, "A");
        assert_eq!(out.channels[0].type_name, "T1");
        assert_eq!(out.channels[0].serialization_format, "cdr");
        assert!(out.finished);

        assert_eq!(stats.written, 3);
        assert_eq!(stats.scanned, 5);
        assert_eq!(events.last(), Some(&ProgressEvent::Success));
        assert_eq!(
            events[events.len() - 2],
            ProgressEvent::Progress(100.0)
        );
    }

    #[test]
    fn test_unknown_channel_fails_run() {
        let store = alternating_store();
        let job = job(&store, Selection::new(["C"], 0, 9).unwrap());
        let (stats, events) = run(&store, &job);

        assert_eq!(stats.written, 0);
        assert_eq!(
            &events[..],
            &[
                ProgressEvent::Progress(0.0),
                ProgressEvent::Failure("channel C is not present in the source".to_string()),
            ]
        );
    }

    #[test]
    fn test_serialization_format_is_configurable() {
        let store = alternating_store();
        let job = job(&store, Selection::new(["B"], 0, 9).unwrap());
        let engine = FilterEngine::new(Arc::new(store.clone())).with_serialization_format("json");
        let (mut tx, _rx) = progress_channel();
        let state = RunState::new();
        engine.run(&job, &mut tx, state.begin().expect("state is free"));

        let out = store.bag(Path::new("out")).unwrap();
        assert_eq!(out.channels[0].serialization_format, "json");
    }

    #[test]
    fn test_cancel_before_first_record() {
        let store = alternating_store();
        let job = job(&store, Selection::new(["A"], 0, 9).unwrap());
        let engine = FilterEngine::new(Arc::new(store.clone()));
        let (mut tx, mut rx) = progress_channel();

        let state = RunState::new();
        let ticket = state.begin().expect("state is free");
        state.cancel();

        let stats = engine.run(&job, &mut tx, ticket);
        assert!(stats.cancelled);
        assert_eq!(stats.scanned, 0);
        assert!(rx.drain().is_empty());
        assert!(!store.bag(Path::new("out")).unwrap().finished);
    }
}
