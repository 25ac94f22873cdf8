//! File-backed bag format
//!
//! A bag is a directory holding `metadata.json` (channel table, time
//! bounds, counts) and `records.bin` (length-prefixed postcard frames in
//! write order).

mod index;
mod reader;
mod writer;

use std::path::Path;

use bagslice_types::{Channel, TimeBounds};

use crate::{
    MetadataProvider, SequentialReader, SequentialWriter, Storage, StorageError, StorageFilter,
};

pub use index::{BagIndex, INDEX_FILE, IndexedChannel, MAX_FRAME_LEN, RECORDS_FILE};
pub use reader::BagReader;
pub use writer::BagWriter;

/// Storage backed by bag directories on the local filesystem
#[derive(Clone, Copy, Debug, Default)]
pub struct FileStore;

impl FileStore {
    pub fn new() -> Self {
        Self
    }
}

impl MetadataProvider for FileStore {
    fn list_channels(&self, source: &Path) -> Result<Vec<Channel>, StorageError> {
        Ok(BagIndex::load(source)?.channels())
    }

    fn time_bounds(&self, source: &Path) -> Result<TimeBounds, StorageError> {
        Ok(BagIndex::load(source)?.bounds())
    }
}

impl Storage for FileStore {
    fn open_reader(
        &self,
        source: &Path,
        filter: &StorageFilter,
    ) -> Result<Box<dyn SequentialReader>, StorageError> {
        Ok(Box::new(BagReader::open(source, filter)?))
    }

    fn open_writer(&self, destination: &Path) -> Result<Box<dyn SequentialWriter>, StorageError> {
        Ok(Box::new(BagWriter::create(destination)?))
    }
}
