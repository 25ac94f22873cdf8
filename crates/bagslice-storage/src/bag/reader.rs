use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use tracing::{debug, instrument};

use bagslice_types::Record;

use super::index::{BagIndex, Frame, MAX_FRAME_LEN, RECORDS_FILE};
use crate::{SequentialReader, StorageError, StorageFilter};

/// Sequential reader over `records.bin`
pub struct BagReader {
    reader: BufReader<File>,
    channel_names: HashMap<u32, String>,
    filter: StorageFilter,
    pending: Option<Record>,
    offset: u64,
    exhausted: bool,
}

impl BagReader {
    #[instrument(skip_all, fields(source = %dir.display()))]
    pub fn open(dir: &Path, filter: &StorageFilter) -> Result<Self, StorageError> {
        let index = BagIndex::load(dir)?;
        let file = File::open(dir.join(RECORDS_FILE))?;

        let channel_names = index
            .channels
            .iter()
            .map(|c| (c.id, c.channel.name.clone()))
            .collect();

        debug!(
            channels = index.channels.len(),
            messages = index.message_count,
            "Opened bag for reading"
        );

        Ok(Self {
            reader: BufReader::new(file),
            channel_names,
            filter: filter.clone(),
            pending: None,
            offset: 0,
            exhausted: false,
        })
    }

    /// Read one frame, `None` at a clean end of file
    fn read_frame(&mut self) -> Result<Option<Frame>, StorageError> {
        let mut len_buf = [0u8; 4];
        let mut filled = 0;
        while filled < len_buf.len() {
            match self.reader.read(&mut len_buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        // A clean end has no partial length prefix
        if filled == 0 {
            return Ok(None);
        }
        if filled < len_buf.len() {
            return Err(StorageError::corrupt(format!(
                "truncated frame header at offset {}",
                self.offset
            )));
        }

        let frame_len = u32::from_be_bytes(len_buf) as usize;
        if frame_len == 0 || frame_len > MAX_FRAME_LEN {
            return Err(StorageError::corrupt(format!(
                "invalid frame length {} at offset {}",
                frame_len, self.offset
            )));
        }

        let mut frame_buf = vec![0u8; frame_len];
        self.reader.read_exact(&mut frame_buf).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => {
                StorageError::corrupt(format!("truncated frame at offset {}", self.offset))
            }
            _ => e.into(),
        })?;

        let frame: Frame = postcard::from_bytes(&frame_buf)?;
        self.offset += 4 + frame_len as u64;
        Ok(Some(frame))
    }

    /// Advance to the next record passing the filter
    fn fill(&mut self) -> Result<(), StorageError> {
        while self.pending.is_none() && !self.exhausted {
            let Some(frame) = self.read_frame()? else {
                self.exhausted = true;
                break;
            };

            let channel = self.channel_names.get(&frame.channel_id).ok_or_else(|| {
                StorageError::corrupt(format!(
                    "record references unknown channel id {}",
                    frame.channel_id
                ))
            })?;

            if self.filter.matches(channel) {
                self.pending = Some(Record::new(
                    channel.clone(),
                    frame.payload,
                    frame.timestamp_ns,
                ));
            }
        }
        Ok(())
    }
}

impl SequentialReader for BagReader {
    fn has_next(&mut self) -> Result<bool, StorageError> {
        self.fill()?;
        Ok(self.pending.is_some())
    }

    fn read_next(&mut self) -> Result<Record, StorageError> {
        self.fill()?;
        self.pending.take().ok_or(StorageError::Exhausted)
    }
}
