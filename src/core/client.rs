//! Producer and consumer handles. Each handle is meant to be owned by one worker.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::core::address::Address;
use crate::core::error::QueueError;
use crate::core::message::Message;
use crate::core::queue::{ConsumerId, Delivery, DeliveryTag, Queue};

/// Sends messages to an address.
#[derive(Debug, Clone)]
pub struct Producer {
    address: Arc<Address>,
}

impl Producer {
    pub(crate) fn new(address: Arc<Address>) -> Self {
        Self { address }
    }

    pub fn address(&self) -> &str {
        self.address.name()
    }

    /// Routes a message to every matching queue bound to the address.
    /// Returns how many queues stored it.
    pub fn send(&self, message: Message) -> Result<usize, QueueError> {
        self.address.route(message)
    }
}

/// Receives from one queue.
///
/// Acknowledgements are staged by [`acknowledge`](Self::acknowledge) and
/// applied by [`commit`](Self::commit). Anything received but not committed
/// goes back to the queue on [`rollback`](Self::rollback) or drop.
#[derive(Debug)]
pub struct Consumer {
    id: ConsumerId,
    queue: Arc<Queue>,
    outstanding: HashSet<DeliveryTag>,
    staged: Vec<DeliveryTag>,
}

impl Consumer {
    pub(crate) fn new(id: ConsumerId, queue: Arc<Queue>) -> Self {
        Self {
            id,
            queue,
            outstanding: HashSet::new(),
            staged: Vec::new(),
        }
    }

    pub fn id(&self) -> ConsumerId {
        self.id
    }

    pub fn queue_name(&self) -> &str {
        self.queue.name()
    }

    /// Waits up to `timeout` for the next message; `Ok(None)` on timeout.
    pub fn receive(&mut self, timeout: Duration) -> Result<Option<Delivery>, QueueError> {
        let delivery = self.queue.receive(self.id, timeout)?;
        if let Some(d) = &delivery {
            self.outstanding.insert(d.tag);
        }
        Ok(delivery)
    }

    /// Marks a delivery for acknowledgement at the next commit.
    /// Returns false if the delivery was not received by this consumer.
    pub fn acknowledge(&mut self, delivery: &Delivery) -> bool {
        if self.outstanding.remove(&delivery.tag) {
            self.staged.push(delivery.tag);
            true
        } else {
            false
        }
    }

    /// Acks every staged delivery. Returns how many were still in flight;
    /// deliveries that were already redelivered elsewhere are skipped.
    pub fn commit(&mut self) -> Result<usize, QueueError> {
        let mut acked = 0;
        let mut first_error = None;
        for tag in self.staged.drain(..) {
            match self.queue.ack(tag) {
                Ok(true) => acked += 1,
                Ok(false) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(acked),
        }
    }

    /// Returns every uncommitted delivery to the queue.
    pub fn rollback(&mut self) -> usize {
        let tags: Vec<DeliveryTag> = self
            .staged
            .drain(..)
            .chain(self.outstanding.drain())
            .collect();
        if tags.is_empty() {
            return 0;
        }
        let released = self.queue.release(&tags);
        debug!(
            target: "pagemq::client",
            queue = %self.queue.name(),
            consumer = self.id.value(),
            released,
            "rolled back uncommitted deliveries"
        );
        released
    }

    pub fn close(mut self) -> usize {
        self.rollback()
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        self.rollback();
    }
}
