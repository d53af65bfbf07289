//! PageMQ – an embeddable message queue that pages overflow to disk.
//!
//! This crate exports
//!  * `core`       – messages, filters, page store, queues and the server
//!  * `management` – read-only count/list views over live queues
//!  * `config`     – TOML-driven runtime configuration
//!
//! A [`Server`] hands out producers, consumers and [`QueueControl`]s; all of
//! them are safe to use from separate threads at the same time.

// ───────────────────────────────────────────────────────────
// Public modules
// ───────────────────────────────────────────────────────────
pub mod config;
pub mod core;
pub mod logging;
pub mod management;
pub mod metrics;

// ───────────────────────────────────────────────────────────
// Re-exports
// ───────────────────────────────────────────────────────────
pub use config::{load_config, Config};
pub use crate::core::{Consumer, Message, Producer, QueueError, Server};
pub use management::{ManagementPoller, QueueControl};
