pub mod address;
pub mod client;
pub mod error;
pub mod filter;
pub mod message;
pub mod paging;
pub mod queue;
pub mod server;

pub use address::{AddressFullPolicy, AddressMemoryMonitor};
pub use client::{Consumer, Producer};
pub use error::QueueError;
pub use filter::{Filter, FilterError};
pub use message::{Message, PropertyValue};
pub use queue::{Delivery, DeliveryTag, Queue};
pub use server::{Server, ServerError};
