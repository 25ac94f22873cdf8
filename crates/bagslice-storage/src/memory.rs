//! In-memory storage
//!
//! Keeps bags in a shared map keyed by location. Writers append to the
//! shared map as they go, so a failed or abandoned write stays visible
//! exactly like a partially written directory would.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use bagslice_types::{Channel, Record, TimeBounds};

use crate::{
    MetadataProvider, SequentialReader, SequentialWriter, Storage, StorageError, StorageFilter,
};

/// A bag held in memory
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MemoryBag {
    pub channels: Vec<Channel>,
    pub records: Vec<Record>,
    /// Set once the writer has finished; unfinished bags have no index
    pub finished: bool,
    /// Cleared to simulate an unreadable index
    pub index_readable: bool,
}

impl MemoryBag {
    fn bounds(&self) -> TimeBounds {
        let mut iter = self.records.iter().map(|r| r.timestamp_ns);
        match iter.next() {
            Some(first) => iter.fold(TimeBounds::new(first, first), |mut bounds, ts| {
                bounds.extend(ts);
                bounds
            }),
            None => TimeBounds::default(),
        }
    }
}

/// Thread-safe in-memory store
#[derive(Clone, Default)]
pub struct MemoryStore {
    bags: Arc<RwLock<HashMap<PathBuf, MemoryBag>>>,

    /// Number of writes accepted per writer before reporting a full disk
    write_limit: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every writer's write after `limit` successful ones
    pub fn with_write_limit(mut self, limit: usize) -> Self {
        self.write_limit = Some(limit);
        self
    }

    /// Store a finished bag; message counts are derived from `records`
    pub fn insert_bag(&self, location: impl Into<PathBuf>, channels: Vec<Channel>, records: Vec<Record>) {
        let channels = channels
            .into_iter()
            .map(|mut channel| {
                channel.message_count =
                    records.iter().filter(|r| r.channel == channel.name).count() as u64;
                channel
            })
            .collect();

        self.bags.write().insert(
            location.into(),
            MemoryBag {
                channels,
                records,
                finished: true,
                index_readable: true,
            },
        );
    }

    /// Make the index at `location` unreadable
    pub fn corrupt_index(&self, location: &Path) {
        if let Some(bag) = self.bags.write().get_mut(location) {
            bag.index_readable = false;
        }
    }

    /// Snapshot of the bag at `location`, finished or not
    pub fn bag(&self, location: &Path) -> Option<MemoryBag> {
        self.bags.read().get(location).cloned()
    }

    pub fn contains(&self, location: &Path) -> bool {
        self.bags.read().contains_key(location)
    }

    fn indexed_bag(&self, location: &Path) -> Result<MemoryBag, StorageError> {
        self.bags
            .read()
            .get(location)
            .filter(|bag| bag.finished && bag.index_readable)
            .cloned()
            .ok_or_else(|| StorageError::not_found(location.display().to_string()))
    }
}

impl MetadataProvider for MemoryStore {
    fn list_channels(&self, source: &Path) -> Result<Vec<Channel>, StorageError> {
        Ok(self.indexed_bag(source)?.channels)
    }

    fn time_bounds(&self, source: &Path) -> Result<TimeBounds, StorageError> {
        Ok(self.indexed_bag(source)?.bounds())
    }
}

impl Storage for MemoryStore {
    fn open_reader(
        &self,
        source: &Path,
        filter: &StorageFilter,
    ) -> Result<Box<dyn SequentialReader>, StorageError> {
        let bag = self.indexed_bag(source)?;
        let records = bag
            .records
            .into_iter()
            .filter(|r| filter.matches(&r.channel))
            .collect::<Vec<_>>();

        Ok(Box::new(MemoryReader {
            records: records.into_iter(),
            pending: None,
        }))
    }

    fn open_writer(&self, destination: &Path) -> Result<Box<dyn SequentialWriter>, StorageError> {
        let mut bags = self.bags.write();
        if bags.get(destination).is_some_and(|bag| bag.finished) {
            return Err(StorageError::AlreadyExists(destination.display().to_string()));
        }
        bags.insert(
            destination.to_path_buf(),
            MemoryBag {
                index_readable: true,
                ..MemoryBag::default()
            },
        );

        Ok(Box::new(MemoryWriter {
            bags: Arc::clone(&self.bags),
            location: destination.to_path_buf(),
            written: 0,
            write_limit: self.write_limit,
        }))
    }
}

struct MemoryReader {
    records: std::vec::IntoIter<Record>,
    pending: Option<Record>,
}

impl SequentialReader for MemoryReader {
    fn has_next(&mut self) -> Result<bool, StorageError> {
        if self.pending.is_none() {
            self.pending = self.records.next();
        }
        Ok(self.pending.is_some())
    }

    fn read_next(&mut self) -> Result<Record, StorageError> {
        self.pending
            .take()
            .or_else(|| self.records.next())
            .ok_or(StorageError::Exhausted)
    }
}

struct MemoryWriter {
    bags: Arc<RwLock<HashMap<PathBuf, MemoryBag>>>,
    location: PathBuf,
    written: usize,
    write_limit: Option<usize>,
}

impl MemoryWriter {
    fn with_bag<T>(&self, f: impl FnOnce(&mut MemoryBag) -> Result<T, StorageError>) -> Result<T, StorageError> {
        let mut bags = self.bags.write();
        let bag = bags
            .get_mut(&self.location)
            .ok_or_else(|| StorageError::io(format!("{} was removed", self.location.display())))?;
        f(bag)
    }
}

impl SequentialWriter for MemoryWriter {
    fn declare_channel(&mut self, channel: &Channel) -> Result<(), StorageError> {
        self.with_bag(|bag| {
            match bag.channels.iter().find(|c| c.name == channel.name) {
                Some(existing) if existing.type_name != channel.type_name => {
                    Err(StorageError::invalid_channel(format!(
                        "{} already declared as {}",
                        channel.name, existing.type_name
                    )))
                }
                Some(_) => Ok(()),
                None => {
                    bag.channels.push(Channel {
                        message_count: 0,
                        ..channel.clone()
                    });
                    Ok(())
                }
            }
        })
    }

    fn write(&mut self, record: &Record) -> Result<(), StorageError> {
        if self.write_limit.is_some_and(|limit| self.written >= limit) {
            return Err(StorageError::io("no space left on device"));
        }

        self.with_bag(|bag| {
            let channel = bag
                .channels
                .iter_mut()
                .find(|c| c.name == record.channel)
                .ok_or_else(|| StorageError::invalid_channel(record.channel.clone()))?;
            channel.message_count += 1;
            bag.records.push(record.clone());
            Ok(())
        })?;

        self.written += 1;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<(), StorageError> {
        self.with_bag(|bag| {
            bag.finished = true;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_store() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert_bag(
            "in",
            vec![Channel::new("/a", "T1", 0), Channel::new("/b", "T2", 0)],
            vec![
                Record::new("/a", vec![1], 10),
                Record::new("/b", vec![2], 20),
                Record::new("/a", vec![3], 30),
            ],
        );
        store
    }

    #[test]
    fn test_metadata_counts_and_bounds() {
        let store = sample_store();
        let channels = store.list_channels(Path::new("in")).unwrap();
        assert_eq!(channels[0].message_count, 2);
        assert_eq!(channels[1].message_count, 1);
        assert_eq!(
            store.time_bounds(Path::new("in")).unwrap(),
            TimeBounds::new(10, 30)
        );
    }

    #[test]
    fn test_reader_applies_filter() {
        let store = sample_store();
        let mut reader = store
            .open_reader(Path::new("in"), &StorageFilter::new(["/b"]))
            .unwrap();
        assert!(reader.has_next().unwrap());
        assert_eq!(reader.read_next().unwrap().timestamp_ns, 20);
        assert!(!reader.has_next().unwrap());
        assert!(matches!(reader.read_next(), Err(StorageError::Exhausted)));
    }

    #[test]
    fn test_corrupt_index_is_not_found() {
        let store = sample_store();
        store.corrupt_index(Path::new("in"));
        assert!(matches!(
            store.list_channels(Path::new("in")),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn test_write_to_undeclared_channel() {
        let store = MemoryStore::new();
        let mut writer = store.open_writer(Path::new("out")).unwrap();
        let err = writer.write(&Record::new("/x", vec![], 1)).unwrap_err();
        assert!(matches!(err, StorageError::InvalidChannel(_)));
    }

    #[test]
    fn test_write_limit_leaves_partial_bag() {
        let store = MemoryStore::new().with_write_limit(1);
        let mut writer = store.open_writer(Path::new("out")).unwrap();
        writer.declare_channel(&Channel::new("/a", "T1", 0)).unwrap();
        writer.write(&Record::new("/a", vec![1], 1)).unwrap();
        assert!(matches!(
            writer.write(&Record::new("/a", vec![2], 2)),
            Err(StorageError::Io(_))
        ));

        let bag = store.bag(Path::new("out")).unwrap();
        assert_eq!(bag.records.len(), 1);
        assert!(!bag.finished);
    }

    #[test]
    fn test_finished_destination_is_refused() {
        let store = sample_store();
        assert!(matches!(
            store.open_writer(Path::new("in")),
            Err(StorageError::AlreadyExists(_))
        ));
    }
}
