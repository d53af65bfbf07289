//! Page store: bounded, append-only segment files per address.
//!
//! While an address is paging, every new message is written to the open
//! segment of that address and the queue keeps only a [`PagePosition`].
//! A segment is sealed once the next record would push it past
//! `page_size_bytes`, and deleted once every slot in it has been acked.

mod segment;

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::message::{CodecError, Message};
use crate::metrics;

use segment::{parse_segment_file_name, Segment, RECORD_HEADER_LEN, SEGMENT_HEADER_LEN};

#[derive(Debug, Error)]
pub enum PageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("page corruption: {0}")]
    Corruption(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("page slot {0} was already reclaimed")]
    Reclaimed(PagePosition),
}

/// Location of one paged message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PagePosition {
    pub segment_id: u64,
    pub offset: u64,
    /// Payload length, excluding the record header.
    pub length: u32,
}

impl fmt::Display for PagePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}+{}", self.segment_id, self.offset, self.length)
    }
}

/// Root of all per-address page directories.
#[derive(Debug)]
pub struct PageStore {
    root: PathBuf,
    page_size_bytes: u64,
    sync_on_write: bool,
    addresses: DashMap<String, Arc<AddressPages>>,
}

impl PageStore {
    pub fn open<P: AsRef<Path>>(root: P, page_size_bytes: u64, sync_on_write: bool) -> Result<Self, PageError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            page_size_bytes,
            sync_on_write,
            addresses: DashMap::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the page store of an address, opening its directory on first use.
    pub fn address(&self, address: &str) -> Result<Arc<AddressPages>, PageError> {
        if let Some(existing) = self.addresses.get(address) {
            return Ok(Arc::clone(&*existing));
        }

        match self.addresses.entry(address.to_string()) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let dir = self.root.join(directory_name(address));
                let pages = Arc::new(AddressPages::open(
                    address,
                    dir,
                    self.page_size_bytes,
                    self.sync_on_write,
                )?);
                entry.insert(Arc::clone(&pages));
                Ok(pages)
            }
        }
    }

    pub fn append(&self, address: &str, message: &Message) -> Result<PagePosition, PageError> {
        self.address(address)?.append(message)
    }

    pub fn read(&self, address: &str, position: &PagePosition) -> Result<Message, PageError> {
        self.address(address)?.read(position)
    }

    pub fn ack(&self, address: &str, position: &PagePosition) -> Result<bool, PageError> {
        self.address(address)?.ack(position)
    }

    pub fn segment_count(&self, address: &str) -> usize {
        self.addresses
            .get(address)
            .map(|pages| pages.segment_count())
            .unwrap_or(0)
    }
}

/// Directory-safe form of an address name.
fn directory_name(address: &str) -> String {
    address
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[derive(Debug)]
struct OpenSegment {
    segment: Arc<Segment>,
    written: u64,
}

#[derive(Debug)]
struct WriterState {
    current: Option<OpenSegment>,
    next_segment_id: u64,
}

/// Segments of one address.
#[derive(Debug)]
pub struct AddressPages {
    address: String,
    dir: PathBuf,
    page_size_bytes: u64,
    sync_on_write: bool,
    writer: Mutex<WriterState>,
    segments: RwLock<BTreeMap<u64, Arc<Segment>>>,
    records_written: AtomicU64,
    bytes_written: AtomicU64,
}

impl AddressPages {
    fn open(address: &str, dir: PathBuf, page_size_bytes: u64, sync_on_write: bool) -> Result<Self, PageError> {
        fs::create_dir_all(&dir)?;

        // Queue state is not recovered across restarts, so leftover
        // segments can never be acked.
        let mut stale = 0usize;
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            let is_segment = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(parse_segment_file_name)
                .is_some();
            if is_segment {
                fs::remove_file(&path)?;
                stale += 1;
            }
        }
        if stale > 0 {
            warn!(
                target: "pagemq::paging",
                address,
                stale,
                "removed page segments left by a previous run"
            );
        }

        Ok(Self {
            address: address.to_string(),
            dir,
            page_size_bytes,
            sync_on_write,
            writer: Mutex::new(WriterState {
                current: None,
                next_segment_id: 1,
            }),
            segments: RwLock::new(BTreeMap::new()),
            records_written: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }

    /// Appends a message. The returned position is readable as soon as this returns.
    pub fn append(&self, message: &Message) -> Result<PagePosition, PageError> {
        let payload = message.encode()?;
        let record_len = RECORD_HEADER_LEN + payload.len() as u64;

        let mut writer = self.writer.lock();

        let needs_rotation = writer.current.as_ref().is_some_and(|open| {
            open.written > SEGMENT_HEADER_LEN && open.written + record_len > self.page_size_bytes
        });
        if needs_rotation {
            if let Some(sealed) = writer.current.take() {
                debug!(
                    target: "pagemq::paging",
                    address = %self.address,
                    segment = sealed.segment.id(),
                    bytes = sealed.written,
                    "sealed page segment"
                );
            }
        }

        if writer.current.is_none() {
            let id = writer.next_segment_id;
            let segment = Arc::new(Segment::create(&self.dir, id)?);
            writer.next_segment_id += 1;
            self.segments.write().insert(id, Arc::clone(&segment));
            metrics::inc_page_segments_created(1);
            debug!(
                target: "pagemq::paging",
                address = %self.address,
                segment = id,
                "opened page segment"
            );
            writer.current = Some(OpenSegment {
                segment,
                written: SEGMENT_HEADER_LEN,
            });
        }

        let Some(open) = writer.current.as_mut() else {
            return Err(PageError::Corruption("no open page segment".to_string()));
        };

        let offset = open.written;
        let written = open.segment.write_record(offset, &payload, self.sync_on_write)?;
        open.written += written;

        self.records_written.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(written, Ordering::Relaxed);

        Ok(PagePosition {
            segment_id: open.segment.id(),
            offset,
            length: payload.len() as u32,
        })
    }

    pub fn read(&self, position: &PagePosition) -> Result<Message, PageError> {
        let segment = self
            .segments
            .read()
            .get(&position.segment_id)
            .cloned()
            .ok_or(PageError::Reclaimed(*position))?;
        let payload = segment.read_record(position)?;
        Ok(Message::decode(&payload)?)
    }

    /// Marks a slot reclaimable; deletes its segment once every slot is acked.
    /// Returns false when the slot was already acked.
    pub fn ack(&self, position: &PagePosition) -> Result<bool, PageError> {
        let mut writer = self.writer.lock();

        let Some(segment) = self.segments.read().get(&position.segment_id).cloned() else {
            return Ok(false);
        };
        if !segment.release(position.offset) {
            return Ok(false);
        }
        if !segment.is_drained() {
            return Ok(true);
        }

        let is_current = writer
            .current
            .as_ref()
            .is_some_and(|open| open.segment.id() == segment.id());
        if is_current {
            writer.current = None;
        }
        self.segments.write().remove(&segment.id());
        segment.remove_file()?;
        metrics::inc_page_segments_deleted(1);
        debug!(
            target: "pagemq::paging",
            address = %self.address,
            segment = segment.id(),
            path = %segment.path().display(),
            "deleted drained page segment"
        );
        Ok(true)
    }

    pub fn segment_count(&self) -> usize {
        self.segments.read().len()
    }

    pub fn live_records(&self) -> usize {
        self.segments.read().values().map(|s| s.live_records()).sum()
    }

    /// Records appended and bytes written since this store was opened.
    pub fn stats(&self) -> (u64, u64) {
        (
            self.records_written.load(Ordering::Relaxed),
            self.bytes_written.load(Ordering::Relaxed),
        )
    }
}
