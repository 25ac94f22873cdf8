use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use bagslice_types::{Channel, TimeBounds};

use crate::StorageError;

pub const INDEX_FILE: &str = "metadata.json";
pub const RECORDS_FILE: &str = "records.bin";
pub const STORAGE_IDENTIFIER: &str = "bagslice";
pub const FORMAT_VERSION: u32 = 1;

/// Largest accepted frame, guards against reading garbage lengths
pub const MAX_FRAME_LEN: usize = 256 * 1024 * 1024;

/// Contents of `metadata.json`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BagIndex {
    pub version: u32,
    pub storage_identifier: String,
    pub channels: Vec<IndexedChannel>,
    pub start_ns: i64,
    pub end_ns: i64,
    pub message_count: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexedChannel {
    pub id: u32,
    #[serde(flatten)]
    pub channel: Channel,
}

/// One record as laid out in `records.bin` (after the length prefix)
#[derive(Debug, Serialize, Deserialize)]
pub struct Frame {
    pub channel_id: u32,
    pub timestamp_ns: i64,
    pub payload: Vec<u8>,
}

/// Borrowed twin of [`Frame`] so writes don't clone payloads
#[derive(Debug, Serialize)]
pub struct FrameRef<'a> {
    pub channel_id: u32,
    pub timestamp_ns: i64,
    pub payload: &'a [u8],
}

impl BagIndex {
    /// Load and check the index of the bag at `dir`
    ///
    /// Anything that is not a readable bagslice index is reported as
    /// `NotFound`.
    pub fn load(dir: &Path) -> Result<Self, StorageError> {
        let path = dir.join(INDEX_FILE);
        let content = fs::read_to_string(&path)
            .map_err(|e| StorageError::not_found(format!("{} ({})", dir.display(), e)))?;
        let index: BagIndex = serde_json::from_str(&content)
            .map_err(|e| StorageError::not_found(format!("{} ({})", dir.display(), e)))?;

        if index.storage_identifier != STORAGE_IDENTIFIER || index.version != FORMAT_VERSION {
            return Err(StorageError::not_found(format!(
                "{} (unsupported format {} v{})",
                dir.display(),
                index.storage_identifier,
                index.version
            )));
        }

        Ok(index)
    }

    pub fn save(&self, dir: &Path) -> Result<(), StorageError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| StorageError::io(format!("failed to encode index: {}", e)))?;
        fs::write(dir.join(INDEX_FILE), content)?;
        Ok(())
    }

    pub fn channels(&self) -> Vec<Channel> {
        self.channels.iter().map(|c| c.channel.clone()).collect()
    }

    pub fn bounds(&self) -> TimeBounds {
        TimeBounds::new(self.start_ns, self.end_ns)
    }
}
