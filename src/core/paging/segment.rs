//! On-disk page segment format.
//!
//! ```text
//! header : magic[8] | version u32 LE | reserved u32
//! record : len u32 LE | crc32 u32 LE | payload[len]
//! ```
//!
//! Records are append-only. A record's slot stays readable until it is
//! released; released slots are never rewritten.

use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use crc32fast::Hasher as Crc32Hasher;
use parking_lot::Mutex;

use super::{PageError, PagePosition};

const SEGMENT_MAGIC: &[u8; 8] = b"PAGEMQ\0\0";
const SEGMENT_VERSION: u32 = 1;
pub(crate) const SEGMENT_HEADER_LEN: u64 = 16;
pub(crate) const RECORD_HEADER_LEN: u64 = 4 + 4;

const SEGMENT_PREFIX: &str = "page-";
const SEGMENT_SUFFIX: &str = ".page";

pub(crate) fn segment_file_name(id: u64) -> String {
    format!("{SEGMENT_PREFIX}{id:010}{SEGMENT_SUFFIX}")
}

pub(crate) fn parse_segment_file_name(name: &str) -> Option<u64> {
    name.strip_prefix(SEGMENT_PREFIX)
        .and_then(|s| s.strip_suffix(SEGMENT_SUFFIX))
        .and_then(|s| s.parse().ok())
}

#[derive(Debug)]
pub(crate) struct Segment {
    id: u64,
    path: PathBuf,
    file: Mutex<File>,
    /// Offsets of records that have not been released yet.
    live: Mutex<BTreeSet<u64>>,
}

impl Segment {
    pub(crate) fn create(dir: &Path, id: u64) -> Result<Self, PageError> {
        let path = dir.join(segment_file_name(id));
        let mut file = OpenOptions::new()
            .create_new(true)
            .read(true)
            .write(true)
            .open(&path)?;

        let mut header = [0u8; SEGMENT_HEADER_LEN as usize];
        header[..8].copy_from_slice(SEGMENT_MAGIC);
        header[8..12].copy_from_slice(&SEGMENT_VERSION.to_le_bytes());
        file.write_all(&header)?;

        Ok(Self {
            id,
            path,
            file: Mutex::new(file),
            live: Mutex::new(BTreeSet::new()),
        })
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Writes one record at `offset` and marks the slot live. Returns the
    /// number of bytes the record occupies.
    pub(crate) fn write_record(&self, offset: u64, payload: &[u8], sync: bool) -> Result<u64, PageError> {
        let len = u32::try_from(payload.len())
            .map_err(|_| PageError::Corruption("record too large for a page segment".to_string()))?;

        let mut hasher = Crc32Hasher::new();
        hasher.update(payload);
        let crc = hasher.finalize();

        let mut buf = Vec::with_capacity(RECORD_HEADER_LEN as usize + payload.len());
        buf.extend_from_slice(&len.to_le_bytes());
        buf.extend_from_slice(&crc.to_le_bytes());
        buf.extend_from_slice(payload);

        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(offset))?;
            file.write_all(&buf)?;
            if sync {
                file.sync_data()?;
            }
        }

        self.live.lock().insert(offset);
        Ok(buf.len() as u64)
    }

    pub(crate) fn read_record(&self, position: &PagePosition) -> Result<Bytes, PageError> {
        if !self.live.lock().contains(&position.offset) {
            return Err(PageError::Reclaimed(*position));
        }

        let mut header = [0u8; RECORD_HEADER_LEN as usize];
        let mut payload = vec![0u8; position.length as usize];
        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(position.offset))?;
            file.read_exact(&mut header)?;
            file.read_exact(&mut payload)?;
        }

        let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        if len != position.length {
            return Err(PageError::Corruption(format!(
                "length mismatch at {position}: record says {len}"
            )));
        }

        let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        let mut hasher = Crc32Hasher::new();
        hasher.update(&payload);
        let actual_crc = hasher.finalize();
        if actual_crc != expected_crc {
            return Err(PageError::Corruption(format!(
                "CRC mismatch at {position}: expected {expected_crc:08x}, got {actual_crc:08x}"
            )));
        }

        Ok(Bytes::from(payload))
    }

    /// Releases a slot. Returns false when it was not live.
    pub(crate) fn release(&self, offset: u64) -> bool {
        self.live.lock().remove(&offset)
    }

    pub(crate) fn is_drained(&self) -> bool {
        self.live.lock().is_empty()
    }

    pub(crate) fn live_records(&self) -> usize {
        self.live.lock().len()
    }

    pub(crate) fn remove_file(&self) -> Result<(), PageError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn position(segment: &Segment, offset: u64, len: usize) -> PagePosition {
        PagePosition {
            segment_id: segment.id(),
            offset,
            length: len as u32,
        }
    }

    #[test]
    fn file_names_round_trip() {
        assert_eq!(segment_file_name(7), "page-0000000007.page");
        assert_eq!(parse_segment_file_name("page-0000000007.page"), Some(7));
        assert_eq!(parse_segment_file_name("wal-0000000007.log"), None);
    }

    #[test]
    fn released_slots_are_not_readable() {
        let dir = TempDir::new().unwrap();
        let segment = Segment::create(dir.path(), 1).unwrap();

        let written = segment
            .write_record(SEGMENT_HEADER_LEN, b"first", false)
            .unwrap();
        let second_offset = SEGMENT_HEADER_LEN + written;
        segment.write_record(second_offset, b"second", false).unwrap();

        let first = position(&segment, SEGMENT_HEADER_LEN, 5);
        assert_eq!(segment.read_record(&first).unwrap(), Bytes::from_static(b"first"));

        assert!(segment.release(SEGMENT_HEADER_LEN));
        assert!(!segment.release(SEGMENT_HEADER_LEN));
        assert!(matches!(segment.read_record(&first), Err(PageError::Reclaimed(_))));

        let second = position(&segment, second_offset, 6);
        assert_eq!(segment.read_record(&second).unwrap(), Bytes::from_static(b"second"));
        assert_eq!(segment.live_records(), 1);
    }

    #[test]
    fn flipped_byte_is_reported_as_corruption() {
        let dir = TempDir::new().unwrap();
        let segment = Segment::create(dir.path(), 3).unwrap();
        segment
            .write_record(SEGMENT_HEADER_LEN, b"payload", false)
            .unwrap();

        {
            let mut file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(segment.path())
                .unwrap();
            file.seek(SeekFrom::End(-1)).unwrap();
            let mut byte = [0u8; 1];
            file.read_exact(&mut byte).unwrap();
            byte[0] ^= 0xFF;
            file.seek(SeekFrom::End(-1)).unwrap();
            file.write_all(&byte).unwrap();
        }

        let err = segment
            .read_record(&position(&segment, SEGMENT_HEADER_LEN, 7))
            .unwrap_err();
        assert!(matches!(err, PageError::Corruption(_)));
    }
}
