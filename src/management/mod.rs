//! Read-only management view of a queue.
//!
//! Every call works on a snapshot of the queue's references, so it can run
//! alongside producers and consumers without blocking them.

mod poller;

pub use poller::{ManagementPoller, PollReport};

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::core::error::QueueError;
use crate::core::filter::Filter;
use crate::core::message::{Properties, PropertyValue};
use crate::core::queue::Queue;
use crate::metrics;

/// One listed message: its properties plus the standard fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageSummary {
    #[serde(rename = "messageID")]
    pub message_id: u64,
    pub durable: bool,
    #[serde(rename = "bodySize")]
    pub body_size: usize,
    pub address: String,
    #[serde(rename = "deliveryCount")]
    pub delivery_count: u32,
    #[serde(skip)]
    pub properties: Properties,
}

impl MessageSummary {
    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    /// JSON object with every property, then the standard fields.
    /// A property named like a standard field is shadowed by it.
    pub fn to_json(&self) -> Result<Value, serde_json::Error> {
        let mut object = Map::new();
        for (name, value) in &self.properties {
            object.insert(name.clone(), serde_json::to_value(value)?);
        }
        if let Value::Object(standard) = serde_json::to_value(self)? {
            object.extend(standard);
        }
        Ok(Value::Object(object))
    }
}

/// Management handle for one queue.
#[derive(Debug, Clone)]
pub struct QueueControl {
    queue: Arc<Queue>,
}

impl QueueControl {
    pub fn new(queue: Arc<Queue>) -> Self {
        Self { queue }
    }

    pub fn name(&self) -> &str {
        self.queue.name()
    }

    pub fn address(&self) -> &str {
        self.queue.address()
    }

    pub fn is_durable(&self) -> bool {
        self.queue.is_durable()
    }

    pub fn is_paging(&self) -> bool {
        self.queue.is_paging()
    }

    pub fn message_count(&self) -> u64 {
        self.queue.message_count()
    }

    pub fn delivering_count(&self) -> u64 {
        self.queue.delivering_count()
    }

    pub fn messages_added(&self) -> u64 {
        self.queue.messages_added()
    }

    pub fn messages_acknowledged(&self) -> u64 {
        self.queue.messages_acknowledged()
    }

    /// Counts messages matching `filter`; `None` or blank text counts all.
    pub fn count_messages(&self, filter: Option<&str>) -> Result<u64, QueueError> {
        let filter = Filter::parse_optional(filter)?;
        metrics::inc_management_scans(1);
        self.queue.count(filter.as_ref())
    }

    /// Matching messages in sequence order.
    pub fn list_messages(&self, filter: Option<&str>) -> Result<Vec<MessageSummary>, QueueError> {
        let filter = Filter::parse_optional(filter)?;
        metrics::inc_management_scans(1);
        let address = self.queue.address().to_string();
        Ok(self
            .queue
            .list(filter.as_ref())?
            .into_iter()
            .map(|listed| MessageSummary {
                message_id: listed.message.sequence(),
                durable: listed.message.is_durable(),
                body_size: listed.message.body_size(),
                address: address.clone(),
                delivery_count: listed.delivery_count,
                properties: listed.message.properties().clone(),
            })
            .collect())
    }

    /// [`list_messages`](Self::list_messages) rendered as a JSON array.
    pub fn list_messages_as_json(&self, filter: Option<&str>) -> Result<String, QueueError> {
        let items = self
            .list_messages(filter)?
            .iter()
            .map(MessageSummary::to_json)
            .collect::<Result<Vec<Value>, _>>()?;
        Ok(serde_json::to_string(&Value::Array(items))?)
    }
}
