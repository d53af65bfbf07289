//! Server: owns the page store, addresses and queues, and hands out client handles.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{Config, ConfigError, PagingConfig, QueueConfig};
use crate::core::address::{Address, AddressFullPolicy, AddressMemoryMonitor};
use crate::core::client::{Consumer, Producer};
use crate::core::error::QueueError;
use crate::core::filter::Filter;
use crate::core::paging::{PageError, PageStore};
use crate::core::queue::{ConsumerId, Queue, QueueSettings};
use crate::management::QueueControl;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to open page store: {0}")]
    Page(#[from] PageError),
}

#[derive(Debug)]
pub struct Server {
    paging: PagingConfig,
    queue_defaults: QueueConfig,
    pages: PageStore,
    addresses: DashMap<String, Arc<Address>>,
    queues: DashMap<String, Arc<Queue>>,
    next_consumer_id: AtomicU64,
}

impl Server {
    pub fn start(config: &Config) -> Result<Self, ServerError> {
        config.validate()?;
        if config.paging.address_full_policy == AddressFullPolicy::Block {
            return Err(ConfigError::Unsupported(
                "address_full_policy BLOCK is not supported; use PAGE, DROP or FAIL".into(),
            )
            .into());
        }

        let pages = PageStore::open(
            &config.server.data_dir,
            config.paging.page_size_bytes,
            config.paging.sync_on_write,
        )?;

        info!(
            target: "pagemq::server",
            data_dir = %config.server.data_dir,
            page_size_bytes = config.paging.page_size_bytes,
            max_size_bytes = config.paging.max_size_bytes,
            policy = %config.paging.address_full_policy,
            "server started"
        );

        Ok(Self {
            paging: config.paging.clone(),
            queue_defaults: config.queues.clone(),
            pages,
            addresses: DashMap::new(),
            queues: DashMap::new(),
            next_consumer_id: AtomicU64::new(1),
        })
    }

    pub fn data_dir(&self) -> &Path {
        self.pages.root()
    }

    pub fn page_store(&self) -> &PageStore {
        &self.pages
    }

    pub fn queue_defaults(&self) -> &QueueConfig {
        &self.queue_defaults
    }

    fn address(&self, name: &str) -> Result<Arc<Address>, QueueError> {
        if let Some(existing) = self.addresses.get(name) {
            return Ok(Arc::clone(&*existing));
        }

        match self.addresses.entry(name.to_string()) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let pages = self.pages.address(name)?;
                let monitor = Arc::new(AddressMemoryMonitor::new(
                    name,
                    self.paging.max_size_bytes,
                    self.paging.address_full_policy,
                ));
                let address = Arc::new(Address::new(name, monitor, pages));
                entry.insert(Arc::clone(&address));
                Ok(address)
            }
        }
    }

    /// Creates a queue bound to `address`. An optional filter restricts which
    /// messages routed to the address land in the queue.
    pub fn create_queue(
        &self,
        address: &str,
        name: &str,
        filter: Option<&str>,
        durable: bool,
    ) -> Result<Arc<Queue>, QueueError> {
        let filter = Filter::parse_optional(filter)?;
        let address = self.address(address)?;

        let queue = match self.queues.entry(name.to_string()) {
            Entry::Occupied(_) => return Err(QueueError::QueueExists(name.to_string())),
            Entry::Vacant(entry) => {
                let queue = Arc::new(Queue::new(
                    QueueSettings {
                        name: name.to_string(),
                        address: address.name().to_string(),
                        durable,
                        filter,
                        redelivery_timeout: self.queue_defaults.redelivery_timeout(),
                    },
                    Arc::clone(address.monitor()),
                    Arc::clone(address.pages()),
                ));
                entry.insert(Arc::clone(&queue));
                queue
            }
        };
        address.bind(Arc::clone(&queue));

        info!(
            target: "pagemq::server",
            queue = name,
            address = %address.name(),
            durable,
            filter = ?queue.filter().map(|f| f.to_string()),
            "queue created"
        );
        Ok(queue)
    }

    /// Unbinds and closes a queue, discarding its messages.
    pub fn destroy_queue(&self, name: &str) -> Result<(), QueueError> {
        let (_, queue) = self
            .queues
            .remove(name)
            .ok_or_else(|| QueueError::QueueNotFound(name.to_string()))?;
        if let Some(address) = self.addresses.get(queue.address()) {
            address.unbind(name);
        }
        queue.close()?;
        info!(target: "pagemq::server", queue = name, "queue destroyed");
        Ok(())
    }

    pub fn queue(&self, name: &str) -> Result<Arc<Queue>, QueueError> {
        self.queues
            .get(name)
            .map(|q| Arc::clone(&*q))
            .ok_or_else(|| QueueError::QueueNotFound(name.to_string()))
    }

    pub fn queue_names(&self) -> Vec<String> {
        self.queues.iter().map(|e| e.key().clone()).collect()
    }

    pub fn create_producer(&self, address: &str) -> Result<Producer, QueueError> {
        Ok(Producer::new(self.address(address)?))
    }

    pub fn create_consumer(&self, queue: &str) -> Result<Consumer, QueueError> {
        let queue = self.queue(queue)?;
        if queue.is_closed() {
            return Err(QueueError::QueueClosed(queue.name().to_string()));
        }
        let id = ConsumerId::from_raw(self.next_consumer_id.fetch_add(1, Ordering::Relaxed));
        Ok(Consumer::new(id, queue))
    }

    pub fn queue_control(&self, queue: &str) -> Result<QueueControl, QueueError> {
        Ok(QueueControl::new(self.queue(queue)?))
    }

    /// Requeues expired deliveries on every queue. Returns how many were requeued.
    pub fn maintenance_tick(&self, now: Instant) -> usize {
        let queues: Vec<Arc<Queue>> = self.queues.iter().map(|e| Arc::clone(e.value())).collect();
        queues.iter().map(|q| q.maintenance_tick(now)).sum()
    }

    /// Closes every queue. Remaining messages are discarded.
    pub fn shutdown(&self) {
        let names = self.queue_names();
        for name in names {
            if let Err(e) = self.destroy_queue(&name) {
                warn!(target: "pagemq::server", queue = %name, error = %e, "failed to close queue");
            }
        }
        info!(target: "pagemq::server", "server stopped");
    }
}
