//! Addresses: memory accounting, paging-mode transitions and routing to bound queues.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use tracing::{debug, info};

use crate::core::error::QueueError;
use crate::core::message::Message;
use crate::core::paging::AddressPages;
use crate::core::queue::Queue;
use crate::metrics;

/// What an address does with new messages once `max_size_bytes` is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AddressFullPolicy {
    Page,
    Block,
    Drop,
    Fail,
}

impl FromStr for AddressFullPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PAGE" => Ok(AddressFullPolicy::Page),
            "BLOCK" => Ok(AddressFullPolicy::Block),
            "DROP" => Ok(AddressFullPolicy::Drop),
            "FAIL" => Ok(AddressFullPolicy::Fail),
            other => Err(format!("unknown address full policy `{other}`")),
        }
    }
}

impl fmt::Display for AddressFullPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AddressFullPolicy::Page => "PAGE",
            AddressFullPolicy::Block => "BLOCK",
            AddressFullPolicy::Drop => "DROP",
            AddressFullPolicy::Fail => "FAIL",
        })
    }
}

/// Where the monitor placed a new message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Memory,
    Page,
    Drop,
    Reject,
}

/// Per-address memory accounting and the paging-mode switch.
///
/// Only this type flips paging mode. Paging starts when an enqueue would push
/// the in-memory byte count past `max_size_bytes`, and stays on until every
/// paged message has been released, not merely until memory drops below the
/// threshold.
#[derive(Debug)]
pub struct AddressMemoryMonitor {
    address: String,
    /// Zero means unbounded.
    max_size_bytes: u64,
    policy: AddressFullPolicy,
    bytes_in_memory: AtomicU64,
    paging: AtomicBool,
    /// Paged messages not yet released. Guards the paging transitions.
    paged_backlog: Mutex<u64>,
}

impl AddressMemoryMonitor {
    pub fn new(address: impl Into<String>, max_size_bytes: u64, policy: AddressFullPolicy) -> Self {
        Self {
            address: address.into(),
            max_size_bytes,
            policy,
            bytes_in_memory: AtomicU64::new(0),
            paging: AtomicBool::new(false),
            paged_backlog: Mutex::new(0),
        }
    }

    /// Accounts for a message about to be enqueued and decides where it goes.
    ///
    /// A `Page` placement reserves a backlog slot that must be returned with
    /// [`on_page_released`](Self::on_page_released), also when the page write fails.
    pub fn on_enqueue(&self, size_bytes: u64) -> Placement {
        let mut backlog = self.paged_backlog.lock();
        if self.paging.load(Ordering::Acquire) {
            *backlog += 1;
            return Placement::Page;
        }

        let max = self.max_size_bytes;
        let reserved = self
            .bytes_in_memory
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                let next = current.saturating_add(size_bytes);
                (max == 0 || next <= max).then_some(next)
            });
        if reserved.is_ok() {
            return Placement::Memory;
        }

        match self.policy {
            AddressFullPolicy::Page => {
                self.paging.store(true, Ordering::Release);
                *backlog += 1;
                info!(
                    target: "pagemq::address",
                    address = %self.address,
                    bytes_in_memory = self.bytes_in_memory.load(Ordering::Relaxed),
                    max_size_bytes = max,
                    "address entered paging mode"
                );
                Placement::Page
            }
            AddressFullPolicy::Drop => Placement::Drop,
            AddressFullPolicy::Fail | AddressFullPolicy::Block => Placement::Reject,
        }
    }

    /// An in-memory message left the address.
    pub fn on_dequeue(&self, size_bytes: u64) {
        let _ = self
            .bytes_in_memory
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_sub(size_bytes))
            });
    }

    /// A paged message left the address (or its page write failed).
    pub fn on_page_released(&self) {
        let mut backlog = self.paged_backlog.lock();
        *backlog = backlog.saturating_sub(1);
        if *backlog == 0 && self.paging.load(Ordering::Acquire) {
            self.paging.store(false, Ordering::Release);
            info!(
                target: "pagemq::address",
                address = %self.address,
                "page backlog drained, address left paging mode"
            );
        }
    }

    pub fn is_paging(&self) -> bool {
        self.paging.load(Ordering::Acquire)
    }

    pub fn bytes_in_memory(&self) -> u64 {
        self.bytes_in_memory.load(Ordering::Acquire)
    }

    pub fn paged_backlog(&self) -> u64 {
        *self.paged_backlog.lock()
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }

    pub fn policy(&self) -> AddressFullPolicy {
        self.policy
    }
}

/// A routing key with its bound queues.
#[derive(Debug)]
pub struct Address {
    name: String,
    monitor: Arc<AddressMemoryMonitor>,
    pages: Arc<AddressPages>,
    queues: RwLock<Vec<Arc<Queue>>>,
}

impl Address {
    pub fn new(name: impl Into<String>, monitor: Arc<AddressMemoryMonitor>, pages: Arc<AddressPages>) -> Self {
        Self {
            name: name.into(),
            monitor,
            pages,
            queues: RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn monitor(&self) -> &Arc<AddressMemoryMonitor> {
        &self.monitor
    }

    pub fn pages(&self) -> &Arc<AddressPages> {
        &self.pages
    }

    pub fn bind(&self, queue: Arc<Queue>) {
        self.queues.write().push(queue);
    }

    pub fn unbind(&self, queue_name: &str) -> Option<Arc<Queue>> {
        let mut queues = self.queues.write();
        let idx = queues.iter().position(|q| q.name() == queue_name)?;
        Some(queues.remove(idx))
    }

    pub fn queue_names(&self) -> Vec<String> {
        self.queues.read().iter().map(|q| q.name().to_string()).collect()
    }

    /// Enqueues a copy of `message` on every bound queue whose filter accepts it.
    /// Returns the number of queues that stored the message.
    pub fn route(&self, message: Message) -> Result<usize, QueueError> {
        let targets: Vec<Arc<Queue>> = self
            .queues
            .read()
            .iter()
            .filter(|q| q.accepts(&message))
            .cloned()
            .collect();

        if targets.is_empty() {
            debug!(
                target: "pagemq::address",
                address = %self.name,
                "no queue bound for message, discarding"
            );
            return Ok(0);
        }

        let mut stored = 0;
        let last = targets.len() - 1;
        let mut message = Some(message);
        for (i, queue) in targets.iter().enumerate() {
            let copy = if i == last {
                message.take()
            } else {
                message.clone()
            };
            let Some(copy) = copy else { break };
            if queue.enqueue(copy)?.is_some() {
                stored += 1;
            }
        }

        metrics::inc_routed(stored as u64);
        Ok(stored)
    }
}
