use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use crate::core::message::Message;
use crate::core::paging::{AddressPages, PageError, PagePosition};

/// Where a referenced message body lives.
#[derive(Debug, Clone)]
pub(crate) enum Body {
    Memory(Arc<Message>),
    Paged(PagePosition),
}

/// Queue-side handle to one enqueued message.
///
/// Snapshots clone the `Arc<MessageReference>`, never the message, so a scan
/// can outlive the reference's removal from the queue. `removed` is set once,
/// before the backing storage is released.
#[derive(Debug)]
pub(crate) struct MessageReference {
    pub(crate) sequence: u64,
    /// Encoded size, used for memory accounting.
    pub(crate) size: u64,
    pub(crate) body: Body,
    removed: AtomicBool,
    delivery_count: AtomicU32,
}

impl MessageReference {
    pub(crate) fn new(sequence: u64, size: u64, body: Body) -> Self {
        Self {
            sequence,
            size,
            body,
            removed: AtomicBool::new(false),
            delivery_count: AtomicU32::new(0),
        }
    }

    /// Returns true for the caller that performed the removal.
    pub(crate) fn mark_removed(&self) -> bool {
        !self.removed.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }

    pub(crate) fn is_paged(&self) -> bool {
        matches!(self.body, Body::Paged(_))
    }

    pub(crate) fn delivery_count(&self) -> u32 {
        self.delivery_count.load(Ordering::Acquire)
    }

    pub(crate) fn record_delivery(&self) -> u32 {
        self.delivery_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Resolves the message, reading it back from its page segment when paged.
    pub(crate) fn load(&self, pages: &AddressPages) -> Result<Arc<Message>, PageError> {
        match &self.body {
            Body::Memory(message) => Ok(Arc::clone(message)),
            Body::Paged(position) => pages.read(position).map(Arc::new),
        }
    }
}
