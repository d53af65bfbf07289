//! Queue core.
//!
//! A queue holds an ordered sequence of [`MessageReference`]s. A reference
//! is either in memory or a position in the address's page store, depending
//! on whether the address was paging when the message arrived. Deliveries
//! move a reference from `pending` to `inflight`; an ack retires it, an
//! expired or released delivery puts it back in sequence order.
//!
//! Management scans copy the reference handles under the state lock and do
//! everything else (page reads, filter evaluation) without it.

mod reference;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, trace_span};

use crate::core::address::{AddressMemoryMonitor, Placement};
use crate::core::error::QueueError;
use crate::core::filter::{self, Filter};
use crate::core::message::Message;
use crate::core::paging::{AddressPages, PageError};
use crate::metrics;

use reference::{Body, MessageReference};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeliveryTag(u64);

impl DeliveryTag {
    pub fn value(self) -> u64 {
        self.0
    }

    pub fn from_raw(value: u64) -> Self {
        DeliveryTag(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConsumerId(u64);

impl ConsumerId {
    pub fn value(self) -> u64 {
        self.0
    }

    pub fn from_raw(value: u64) -> Self {
        ConsumerId(value)
    }
}

/// A message handed to a consumer. Must be acked with its tag.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub tag: DeliveryTag,
    pub consumer: ConsumerId,
    /// 1 on first delivery.
    pub delivery_count: u32,
    pub message: Message,
}

/// A message materialized by a management scan.
#[derive(Debug, Clone)]
pub struct ListedMessage {
    pub message: Arc<Message>,
    pub delivery_count: u32,
    pub paged: bool,
}

/// Construction parameters for a [`Queue`].
#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub name: String,
    pub address: String,
    pub durable: bool,
    pub filter: Option<Filter>,
    pub redelivery_timeout: Duration,
}

#[derive(Debug)]
struct InFlight {
    reference: Arc<MessageReference>,
    consumer: ConsumerId,
    /// `None` when the redelivery timeout is too large to represent.
    deadline: Option<Instant>,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<Arc<MessageReference>>,
    inflight: HashMap<DeliveryTag, InFlight>,
    next_tag: u64,
    closed: bool,
}

impl QueueState {
    /// Puts a reference back where its sequence id belongs.
    fn requeue(&mut self, reference: Arc<MessageReference>) {
        let idx = self
            .pending
            .partition_point(|r| r.sequence < reference.sequence);
        self.pending.insert(idx, reference);
    }

    fn next_redelivery(&self) -> Option<Instant> {
        self.inflight.values().filter_map(|f| f.deadline).min()
    }
}

#[derive(Debug)]
pub struct Queue {
    name: String,
    address: String,
    durable: bool,
    filter: Option<Filter>,
    monitor: Arc<AddressMemoryMonitor>,
    pages: Arc<AddressPages>,
    redelivery_timeout: Duration,
    /// Next sequence id. Held for the whole enqueue so ids and pending order agree.
    next_sequence: Mutex<u64>,
    state: Mutex<QueueState>,
    available: Condvar,
    messages_added: AtomicU64,
    messages_acknowledged: AtomicU64,
}

impl Queue {
    pub fn new(settings: QueueSettings, monitor: Arc<AddressMemoryMonitor>, pages: Arc<AddressPages>) -> Self {
        Self {
            name: settings.name,
            address: settings.address,
            durable: settings.durable,
            filter: settings.filter,
            monitor,
            pages,
            redelivery_timeout: settings.redelivery_timeout,
            next_sequence: Mutex::new(1),
            state: Mutex::new(QueueState {
                next_tag: 1,
                ..QueueState::default()
            }),
            available: Condvar::new(),
            messages_added: AtomicU64::new(0),
            messages_acknowledged: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn is_durable(&self) -> bool {
        self.durable
    }

    pub fn filter(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }

    pub fn is_paging(&self) -> bool {
        self.monitor.is_paging()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Whether the queue's own filter lets `message` in.
    pub fn accepts(&self, message: &Message) -> bool {
        filter::matches(message, self.filter.as_ref())
    }

    /// Stores a message and returns its sequence id, or `None` when the
    /// address dropped it for lack of memory.
    ///
    /// The sequence id only advances once the message is stored, so a failed
    /// page write never leaves a gap.
    pub fn enqueue(&self, mut message: Message) -> Result<Option<u64>, QueueError> {
        let mut next_sequence = self.next_sequence.lock();
        if self.state.lock().closed {
            return Err(QueueError::QueueClosed(self.name.clone()));
        }

        let sequence = *next_sequence;
        message.set_sequence(sequence);
        let size = message.encoded_len() as u64;

        let body = match self.monitor.on_enqueue(size) {
            Placement::Memory => Body::Memory(Arc::new(message)),
            Placement::Page => match self.pages.append(&message) {
                Ok(position) => {
                    metrics::inc_paged(1);
                    Body::Paged(position)
                }
                Err(e) => {
                    self.monitor.on_page_released();
                    error!(
                        target: "pagemq::queue",
                        queue = %self.name,
                        sequence,
                        error = %e,
                        "failed to page message"
                    );
                    return Err(e.into());
                }
            },
            Placement::Drop => {
                metrics::inc_dropped_address_full(1);
                debug!(
                    target: "pagemq::queue",
                    queue = %self.name,
                    size,
                    "address full, message dropped"
                );
                return Ok(None);
            }
            Placement::Reject => return Err(QueueError::AddressFull(self.address.clone())),
        };

        let reference = Arc::new(MessageReference::new(sequence, size, body));
        {
            let mut state = self.state.lock();
            if state.closed {
                drop(state);
                self.retire(&reference)?;
                return Err(QueueError::QueueClosed(self.name.clone()));
            }
            state.pending.push_back(reference);
        }

        *next_sequence += 1;
        self.messages_added.fetch_add(1, Ordering::Relaxed);
        self.available.notify_one();
        Ok(Some(sequence))
    }

    /// Waits up to `timeout` for the head message and hands it to `consumer`.
    ///
    /// Returns `Ok(None)` on timeout. A timeout too large to represent
    /// (such as `Duration::MAX`) waits until a message arrives or the queue
    /// closes. The delivery stays in flight until it is acked, released, or
    /// its redelivery deadline passes.
    pub fn receive(&self, consumer: ConsumerId, timeout: Duration) -> Result<Option<Delivery>, QueueError> {
        let give_up_at = Instant::now().checked_add(timeout);

        let (tag, reference) = {
            let mut state = self.state.lock();
            loop {
                if state.closed {
                    return Err(QueueError::QueueClosed(self.name.clone()));
                }

                let now = Instant::now();
                self.requeue_expired(&mut state, now);

                if let Some(reference) = state.pending.pop_front() {
                    let tag = DeliveryTag(state.next_tag);
                    state.next_tag += 1;
                    state.inflight.insert(
                        tag,
                        InFlight {
                            reference: Arc::clone(&reference),
                            consumer,
                            deadline: now.checked_add(self.redelivery_timeout),
                        },
                    );
                    break (tag, reference);
                }

                if give_up_at.is_some_and(|t| now >= t) {
                    return Ok(None);
                }
                let wake_at = match (state.next_redelivery(), give_up_at) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                };
                match wake_at {
                    Some(at) => {
                        self.available.wait_until(&mut state, at);
                    }
                    None => self.available.wait(&mut state),
                }
            }
        };

        let span = trace_span!("queue_deliver", queue = %self.name, sequence = reference.sequence);
        let _guard = span.enter();

        match reference.load(&self.pages) {
            Ok(message) => Ok(Some(Delivery {
                tag,
                consumer,
                delivery_count: reference.record_delivery(),
                message: (*message).clone(),
            })),
            Err(_) if reference.is_removed() => Err(QueueError::QueueClosed(self.name.clone())),
            Err(e) => {
                self.release(&[tag]);
                error!(
                    target: "pagemq::queue",
                    queue = %self.name,
                    sequence = reference.sequence,
                    error = %e,
                    "failed to read paged message"
                );
                Err(e.into())
            }
        }
    }

    /// Acknowledges a delivery. Returns `Ok(false)` when the tag is no longer
    /// in flight (already acked, released or redelivered).
    pub fn ack(&self, tag: DeliveryTag) -> Result<bool, QueueError> {
        let Some(entry) = self.state.lock().inflight.remove(&tag) else {
            return Ok(false);
        };

        // The reference leaves the queue even if freeing its page fails.
        let retired = self.retire(&entry.reference);
        self.messages_acknowledged.fetch_add(1, Ordering::Relaxed);
        metrics::inc_acknowledged(1);
        retired?;
        Ok(true)
    }

    /// Returns in-flight deliveries to the queue without waiting for their deadline.
    pub fn release(&self, tags: &[DeliveryTag]) -> usize {
        let released = {
            let mut state = self.state.lock();
            let mut released = 0;
            for tag in tags {
                if let Some(entry) = state.inflight.remove(tag) {
                    state.requeue(entry.reference);
                    released += 1;
                }
            }
            released
        };
        if released > 0 {
            self.available.notify_all();
        }
        released
    }

    /// Releases every delivery currently held by `consumer`.
    pub fn release_consumer(&self, consumer: ConsumerId) -> usize {
        let tags: Vec<DeliveryTag> = self
            .state
            .lock()
            .inflight
            .iter()
            .filter(|(_, f)| f.consumer == consumer)
            .map(|(tag, _)| *tag)
            .collect();
        self.release(&tags)
    }

    /// Requeues deliveries whose redelivery deadline is at or before `now`.
    pub fn maintenance_tick(&self, now: Instant) -> usize {
        let requeued = {
            let mut state = self.state.lock();
            self.requeue_expired(&mut state, now)
        };
        if requeued > 0 {
            self.available.notify_all();
        }
        requeued
    }

    fn requeue_expired(&self, state: &mut QueueState, now: Instant) -> usize {
        let expired: Vec<DeliveryTag> = state
            .inflight
            .iter()
            .filter(|(_, f)| f.deadline.is_some_and(|d| d <= now))
            .map(|(tag, _)| *tag)
            .collect();

        for tag in &expired {
            if let Some(entry) = state.inflight.remove(tag) {
                state.requeue(entry.reference);
            }
        }

        if !expired.is_empty() {
            metrics::inc_redelivered(expired.len() as u64);
            debug!(
                target: "pagemq::queue",
                queue = %self.name,
                count = expired.len(),
                "redelivery deadline passed, messages requeued"
            );
        }
        expired.len()
    }

    /// Frees the storage behind a reference exactly once.
    fn retire(&self, reference: &MessageReference) -> Result<(), PageError> {
        if !reference.mark_removed() {
            return Ok(());
        }
        match &reference.body {
            Body::Memory(_) => {
                self.monitor.on_dequeue(reference.size);
                Ok(())
            }
            Body::Paged(position) => {
                let result = self.pages.ack(position);
                self.monitor.on_page_released();
                metrics::inc_depaged(1);
                result.map(|_| ())
            }
        }
    }

    /// Handles to every reference still in the queue, in sequence order.
    fn snapshot(&self) -> Result<Vec<Arc<MessageReference>>, QueueError> {
        let mut references: Vec<Arc<MessageReference>> = {
            let state = self.state.lock();
            if state.closed {
                return Err(QueueError::QueueClosed(self.name.clone()));
            }
            state
                .pending
                .iter()
                .cloned()
                .chain(state.inflight.values().map(|f| Arc::clone(&f.reference)))
                .collect()
        };
        references.sort_unstable_by_key(|r| r.sequence);
        Ok(references)
    }

    /// Visits every snapshotted message accepted by `filter`.
    ///
    /// References removed after the snapshot are skipped, both before and
    /// while their page record is read. Any other read failure fails the scan.
    fn scan<F>(&self, filter: Option<&Filter>, mut visit: F) -> Result<(), QueueError>
    where
        F: FnMut(&MessageReference, Arc<Message>),
    {
        for reference in self.snapshot()? {
            if reference.is_removed() {
                continue;
            }
            let message = match reference.load(&self.pages) {
                Ok(message) => message,
                Err(_) if reference.is_removed() => continue,
                Err(e) => {
                    error!(
                        target: "pagemq::queue",
                        queue = %self.name,
                        sequence = reference.sequence,
                        error = %e,
                        "scan failed to read paged message"
                    );
                    return Err(e.into());
                }
            };
            if filter::matches(&message, filter) {
                visit(&reference, message);
            }
        }
        Ok(())
    }

    pub fn count(&self, filter: Option<&Filter>) -> Result<u64, QueueError> {
        if filter.is_none() {
            // Counting everything does not need the message bodies.
            return Ok(self
                .snapshot()?
                .iter()
                .filter(|r| !r.is_removed())
                .count() as u64);
        }
        let mut count = 0u64;
        self.scan(filter, |_, _| count += 1)?;
        Ok(count)
    }

    pub fn list(&self, filter: Option<&Filter>) -> Result<Vec<ListedMessage>, QueueError> {
        let mut listed = Vec::new();
        self.scan(filter, |reference, message| {
            listed.push(ListedMessage {
                message,
                delivery_count: reference.delivery_count(),
                paged: reference.is_paged(),
            })
        })?;
        Ok(listed)
    }

    /// Pending plus in-flight messages.
    pub fn message_count(&self) -> u64 {
        let state = self.state.lock();
        (state.pending.len() + state.inflight.len()) as u64
    }

    pub fn delivering_count(&self) -> u64 {
        self.state.lock().inflight.len() as u64
    }

    pub fn messages_added(&self) -> u64 {
        self.messages_added.load(Ordering::Relaxed)
    }

    pub fn messages_acknowledged(&self) -> u64 {
        self.messages_acknowledged.load(Ordering::Relaxed)
    }

    /// Shuts the queue: blocked receivers fail with `QueueClosed` and every
    /// remaining message is discarded.
    pub fn close(&self) -> Result<(), QueueError> {
        let remaining: Vec<Arc<MessageReference>> = {
            let mut state = self.state.lock();
            if state.closed {
                return Ok(());
            }
            state.closed = true;
            let inflight = std::mem::take(&mut state.inflight);
            state
                .pending
                .drain(..)
                .chain(inflight.into_values().map(|f| f.reference))
                .collect()
        };
        self.available.notify_all();

        let discarded = remaining.len();
        let mut first_error = None;
        for reference in &remaining {
            if let Err(e) = self.retire(reference) {
                first_error.get_or_insert(e);
            }
        }

        info!(
            target: "pagemq::queue",
            queue = %self.name,
            address = %self.address,
            discarded,
            "queue closed"
        );
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::address::AddressFullPolicy;
    use crate::core::paging::PageStore;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        monitor: Arc<AddressMemoryMonitor>,
        pages: Arc<AddressPages>,
        queue: Queue,
    }

    fn fixture(max_size_bytes: u64, redelivery: Duration) -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = PageStore::open(dir.path(), 1024, false).unwrap();
        let pages = store.address("addr").unwrap();
        let monitor = Arc::new(AddressMemoryMonitor::new(
            "addr",
            max_size_bytes,
            AddressFullPolicy::Page,
        ));
        let queue = Queue::new(
            QueueSettings {
                name: "q".to_string(),
                address: "addr".to_string(),
                durable: true,
                filter: None,
                redelivery_timeout: redelivery,
            },
            Arc::clone(&monitor),
            Arc::clone(&pages),
        );
        Fixture {
            _dir: dir,
            monitor,
            pages,
            queue,
        }
    }

    fn message(i: i64) -> Message {
        Message::new(true)
            .with_body(vec![0u8; 64])
            .with_property("i", i)
            .with_property("parity", if i % 2 == 0 { "even" } else { "odd" })
    }

    const C: ConsumerId = ConsumerId(1);
    const SHORT: Duration = Duration::from_millis(10);

    #[test]
    fn sequence_ids_are_assigned_in_order() {
        let f = fixture(0, Duration::from_secs(30));
        for i in 0..5 {
            assert_eq!(f.queue.enqueue(message(i)).unwrap(), Some(i as u64 + 1));
        }
        for i in 0..5 {
            let d = f.queue.receive(C, SHORT).unwrap().unwrap();
            assert_eq!(d.message.sequence(), i as u64 + 1);
            assert!(f.queue.ack(d.tag).unwrap());
        }
        assert!(f.queue.receive(C, SHORT).unwrap().is_none());
    }

    #[test]
    fn paged_messages_are_delivered_in_order_and_reclaimed() {
        let f = fixture(300, Duration::from_secs(30));
        for i in 0..20 {
            f.queue.enqueue(message(i)).unwrap();
        }
        assert!(f.queue.is_paging());
        assert!(f.pages.segment_count() > 0);

        for i in 0..20 {
            let d = f.queue.receive(C, SHORT).unwrap().unwrap();
            assert_eq!(d.message.property("i").and_then(|v| v.as_i64()), Some(i));
            f.queue.ack(d.tag).unwrap();
        }
        assert!(!f.queue.is_paging());
        assert_eq!(f.pages.segment_count(), 0);
        assert_eq!(f.monitor.bytes_in_memory(), 0);
    }

    #[test]
    fn count_and_list_cover_pending_and_inflight() {
        let f = fixture(300, Duration::from_secs(30));
        for i in 0..10 {
            f.queue.enqueue(message(i)).unwrap();
        }
        let held = f.queue.receive(C, SHORT).unwrap().unwrap();

        assert_eq!(f.queue.count(None).unwrap(), 10);
        let even: Filter = "parity = 'even'".parse().unwrap();
        assert_eq!(f.queue.count(Some(&even)).unwrap(), 5);

        let listed = f.queue.list(None).unwrap();
        let sequences: Vec<u64> = listed.iter().map(|l| l.message.sequence()).collect();
        assert_eq!(sequences, (1..=10).collect::<Vec<_>>());
        assert_eq!(listed[0].delivery_count, 1);
        assert!(listed.iter().any(|l| l.paged));

        f.queue.ack(held.tag).unwrap();
        assert_eq!(f.queue.count(None).unwrap(), 9);
    }

    #[test]
    fn expired_delivery_is_redelivered_and_stale_ack_is_ignored() {
        let f = fixture(0, Duration::from_millis(20));
        f.queue.enqueue(message(1)).unwrap();

        let first = f.queue.receive(C, SHORT).unwrap().unwrap();
        std::thread::sleep(Duration::from_millis(30));
        let second = f
            .queue
            .receive(ConsumerId(2), Duration::from_millis(100))
            .unwrap()
            .unwrap();

        assert_eq!(second.message.sequence(), first.message.sequence());
        assert_eq!(second.delivery_count, 2);
        assert!(!f.queue.ack(first.tag).unwrap());
        assert!(f.queue.ack(second.tag).unwrap());
        assert_eq!(f.queue.message_count(), 0);
    }

    #[test]
    fn released_messages_keep_their_position() {
        let f = fixture(0, Duration::from_secs(30));
        for i in 0..3 {
            f.queue.enqueue(message(i)).unwrap();
        }
        let a = f.queue.receive(C, SHORT).unwrap().unwrap();
        let b = f.queue.receive(C, SHORT).unwrap().unwrap();
        assert_eq!(f.queue.release_consumer(C), 2);
        assert_eq!(f.queue.release(&[a.tag, b.tag]), 0);

        let again = f.queue.receive(C, SHORT).unwrap().unwrap();
        assert_eq!(again.message.sequence(), a.message.sequence());
    }

    #[test]
    fn maintenance_tick_requeues_expired_deliveries() {
        let f = fixture(0, Duration::from_millis(5));
        f.queue.enqueue(message(1)).unwrap();
        f.queue.receive(C, SHORT).unwrap().unwrap();
        assert_eq!(f.queue.delivering_count(), 1);

        let later = Instant::now() + Duration::from_millis(50);
        assert_eq!(f.queue.maintenance_tick(later), 1);
        assert_eq!(f.queue.delivering_count(), 0);
        assert_eq!(f.queue.message_count(), 1);
    }

    #[test]
    fn close_wakes_receivers_and_releases_storage() {
        let f = fixture(300, Duration::from_secs(30));
        for i in 0..10 {
            f.queue.enqueue(message(i)).unwrap();
        }
        let queue = Arc::new(f.queue);
        while queue.receive(C, SHORT).unwrap().is_some() {}

        let waiter = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || queue.receive(ConsumerId(9), Duration::from_secs(5)))
        };
        std::thread::sleep(Duration::from_millis(20));
        queue.close().unwrap();

        assert!(matches!(waiter.join().unwrap(), Err(QueueError::QueueClosed(_))));
        assert!(matches!(queue.enqueue(message(99)), Err(QueueError::QueueClosed(_))));
        assert_eq!(f.pages.segment_count(), 0);
        assert_eq!(f.monitor.bytes_in_memory(), 0);
        assert!(!f.monitor.is_paging());
    }

    #[test]
    fn scan_skips_messages_acked_after_snapshot() {
        let f = fixture(0, Duration::from_secs(30));
        for i in 0..4 {
            f.queue.enqueue(message(i)).unwrap();
        }
        let snapshot = f.queue.snapshot().unwrap();
        let d = f.queue.receive(C, SHORT).unwrap().unwrap();
        f.queue.ack(d.tag).unwrap();

        let live = snapshot.iter().filter(|r| !r.is_removed()).count();
        assert_eq!(live, 3);
        assert_eq!(f.queue.count(None).unwrap(), 3);
    }

    fn segment_paths(pages: &AddressPages) -> Vec<std::path::PathBuf> {
        let mut paths: Vec<_> = std::fs::read_dir(pages.directory())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        paths.sort();
        paths
    }

    fn flip_last_byte(path: &std::path::Path) {
        let mut bytes = std::fs::read(path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn unbounded_receive_timeout_waits_for_a_message() {
        let f = fixture(0, Duration::MAX);
        f.queue.enqueue(message(1)).unwrap();

        let d = f.queue.receive(C, Duration::MAX).unwrap().unwrap();
        assert_eq!(d.message.sequence(), 1);
        assert_eq!(f.queue.maintenance_tick(Instant::now()), 0);

        let queue = Arc::new(f.queue);
        let sender = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                queue.enqueue(message(2)).unwrap();
            })
        };
        let next = queue.receive(ConsumerId(2), Duration::MAX).unwrap().unwrap();
        sender.join().unwrap();
        assert_eq!(next.message.sequence(), 2);
    }

    #[test]
    fn failed_page_read_does_not_count_as_a_delivery() {
        let f = fixture(1, Duration::from_secs(30));
        f.queue.enqueue(message(1)).unwrap();
        assert!(f.queue.is_paging());
        flip_last_byte(&segment_paths(&f.pages)[0]);

        assert!(matches!(f.queue.receive(C, SHORT), Err(QueueError::PageIo(_))));
        assert_eq!(f.queue.delivering_count(), 0);
        assert_eq!(f.queue.message_count(), 1);
        assert_eq!(f.queue.snapshot().unwrap()[0].delivery_count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn ack_counts_the_message_even_when_segment_delete_fails() {
        let f = fixture(1, Duration::from_secs(30));
        f.queue.enqueue(message(1)).unwrap();
        let d = f.queue.receive(C, SHORT).unwrap().unwrap();

        // A non-empty directory where the segment file was makes the delete fail.
        let path = segment_paths(&f.pages).remove(0);
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), b"x").unwrap();

        assert!(matches!(f.queue.ack(d.tag), Err(QueueError::PageIo(_))));
        assert_eq!(f.queue.messages_acknowledged(), 1);
        assert_eq!(f.queue.message_count(), 0);
        assert!(!f.queue.is_paging());
        assert!(!f.queue.ack(d.tag).unwrap());
    }
}
