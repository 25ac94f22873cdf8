use std::collections::BTreeSet;
use std::path::Path;

use bagslice_types::{Channel, Record, TimeBounds};

use crate::StorageError;

/// Channel restriction pushed down to a reader (empty = every channel)
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StorageFilter {
    pub channels: BTreeSet<String>,
}

impl StorageFilter {
    pub fn new<I, S>(channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            channels: channels.into_iter().map(Into::into).collect(),
        }
    }

    pub fn matches(&self, channel: &str) -> bool {
        self.channels.is_empty() || self.channels.contains(channel)
    }
}

/// Reads a log's index without touching its records
pub trait MetadataProvider {
    /// Channels declared in the log, in declaration order
    fn list_channels(&self, source: &Path) -> Result<Vec<Channel>, StorageError>;

    /// Minimum and maximum record timestamps
    fn time_bounds(&self, source: &Path) -> Result<TimeBounds, StorageError>;
}

/// Forward-only cursor over a log's records
pub trait SequentialReader: Send {
    fn has_next(&mut self) -> Result<bool, StorageError>;

    /// Next record in source order; `Exhausted` once `has_next` is false
    fn read_next(&mut self) -> Result<Record, StorageError>;
}

/// Append-only sink for a new log
pub trait SequentialWriter: Send {
    /// Declare a channel; must precede any `write` on it
    fn declare_channel(&mut self, channel: &Channel) -> Result<(), StorageError>;

    fn write(&mut self, record: &Record) -> Result<(), StorageError>;

    /// Flush records and persist the index
    fn finish(self: Box<Self>) -> Result<(), StorageError>;
}

/// A storage layer able to open readers and writers on log locations
pub trait Storage: MetadataProvider + Send + Sync + 'static {
    fn open_reader(
        &self,
        source: &Path,
        filter: &StorageFilter,
    ) -> Result<Box<dyn SequentialReader>, StorageError>;

    fn open_writer(&self, destination: &Path) -> Result<Box<dyn SequentialWriter>, StorageError>;
}
