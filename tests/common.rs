#![allow(dead_code)]

use std::sync::Once;
use std::time::Duration;

use pagemq::{Config, Consumer, Message, Producer, Server};
use tempfile::TempDir;
use uuid::Uuid;

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        pagemq::logging::init_logging();
    });
}

/// Server over a fresh temporary data directory with the default
/// 5120-byte pages and 10240-byte address limit.
pub fn start_server() -> (TempDir, Server) {
    start_server_with(|_| {})
}

pub fn start_server_with(tweak: impl FnOnce(&mut Config)) -> (TempDir, Server) {
    init_logging();
    let dir = TempDir::new().expect("temp dir");
    let mut config = Config::default();
    config.server.data_dir = dir.path().display().to_string();
    tweak(&mut config);
    let server = Server::start(&config).expect("server start");
    (dir, server)
}

pub fn unique_name(prefix: &str) -> String {
    format!("{prefix}.{}", Uuid::new_v4().simple())
}

/// Message with a 128-byte body, an `i` long property and `parity` = even/odd.
pub fn numbered_message(i: u64) -> Message {
    Message::new(true)
        .with_body(vec![(i % 256) as u8; 128])
        .with_property("i", i as i64)
        .with_property("parity", if i % 2 == 0 { "even" } else { "odd" })
}

pub fn send_numbered(producer: &Producer, count: u64) {
    for i in 0..count {
        assert_eq!(producer.send(numbered_message(i)).expect("send"), 1);
    }
}

/// Receives, acknowledges and commits `count` messages, checking they arrive in order.
pub fn drain_in_order(consumer: &mut Consumer, count: u64) {
    for expected in 0..count {
        let delivery = consumer
            .receive(Duration::from_secs(5))
            .expect("receive")
            .unwrap_or_else(|| panic!("timed out waiting for message {expected}"));
        assert_eq!(
            delivery.message.property("i").and_then(|v| v.as_i64()),
            Some(expected as i64)
        );
        assert!(consumer.acknowledge(&delivery));
        consumer.commit().expect("commit");
    }
}
