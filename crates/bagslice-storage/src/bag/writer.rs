use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use bagslice_types::{Channel, Record, TimeBounds};

use super::index::{
    BagIndex, FORMAT_VERSION, FrameRef, INDEX_FILE, IndexedChannel, MAX_FRAME_LEN, RECORDS_FILE,
    STORAGE_IDENTIFIER,
};
use crate::{SequentialWriter, StorageError};

/// Append-only writer producing a bag directory
///
/// Records stream straight to `records.bin`; `metadata.json` is only
/// written by `finish`, so an interrupted write leaves a directory that
/// readers do not recognize as a bag.
pub struct BagWriter {
    dir: PathBuf,
    writer: BufWriter<File>,
    channels: Vec<IndexedChannel>,
    ids: HashMap<String, u32>,
    bounds: Option<TimeBounds>,
    message_count: u64,
}

impl BagWriter {
    #[instrument(skip_all, fields(destination = %dir.display()))]
    pub fn create(dir: &Path) -> Result<Self, StorageError> {
        if dir.join(INDEX_FILE).exists() {
            return Err(StorageError::AlreadyExists(dir.display().to_string()));
        }

        fs::create_dir_all(dir)?;
        let file = File::create(dir.join(RECORDS_FILE))?;

        debug!("Created bag for writing");

        Ok(Self {
            dir: dir.to_path_buf(),
            writer: BufWriter::new(file),
            channels: Vec::new(),
            ids: HashMap::new(),
            bounds: None,
            message_count: 0,
        })
    }
}

impl SequentialWriter for BagWriter {
    fn declare_channel(&mut self, channel: &Channel) -> Result<(), StorageError> {
        if let Some(&id) = self.ids.get(&channel.name) {
            let existing = &self.channels[id as usize].channel;
            if existing.type_name != channel.type_name {
                return Err(StorageError::invalid_channel(format!(
                    "{} already declared as {}",
                    channel.name, existing.type_name
                )));
            }
            return Ok(());
        }

        let id = self.channels.len() as u32;
        self.ids.insert(channel.name.clone(), id);
        self.channels.push(IndexedChannel {
            id,
            channel: Channel {
                message_count: 0,
                ..channel.clone()
            },
        });
        Ok(())
    }

    fn write(&mut self, record: &Record) -> Result<(), StorageError> {
        let id = *self
            .ids
            .get(&record.channel)
            .ok_or_else(|| StorageError::invalid_channel(record.channel.clone()))?;

        if record.payload.len() > MAX_FRAME_LEN {
            return Err(StorageError::record_too_large(record.payload.len()));
        }

        let frame = postcard::to_allocvec(&FrameRef {
            channel_id: id,
            timestamp_ns: record.timestamp_ns,
            payload: &record.payload,
        })
        .map_err(|e| StorageError::io(format!("failed to encode record: {}", e)))?;

        // Readers reject frames above the limit
        if frame.len() > MAX_FRAME_LEN {
            return Err(StorageError::record_too_large(frame.len()));
        }
        let frame_len = u32::try_from(frame.len())
            .map_err(|_| StorageError::record_too_large(frame.len()))?;

        self.writer.write_all(&frame_len.to_be_bytes())?;
        self.writer.write_all(&frame)?;

        self.channels[id as usize].channel.message_count += 1;
        self.message_count += 1;
        match &mut self.bounds {
            Some(bounds) => bounds.extend(record.timestamp_ns),
            None => self.bounds = Some(TimeBounds::new(record.timestamp_ns, record.timestamp_ns)),
        }
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<(), StorageError> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;

        let bounds = self.bounds.unwrap_or_default();
        let index = BagIndex {
            version: FORMAT_VERSION,
            storage_identifier: STORAGE_IDENTIFIER.to_string(),
            channels: std::mem::take(&mut self.channels),
            start_ns: bounds.start_ns,
            end_ns: bounds.end_ns,
            message_count: self.message_count,
        };
        index.save(&self.dir)?;

        info!(
            destination = %self.dir.display(),
            messages = self.message_count,
            "Bag written"
        );
        Ok(())
    }
}
