mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::*;
use pagemq::ManagementPoller;
use serde_json::Value;

const N: u64 = 1000;

#[test]
fn count_tracks_send_and_drain_while_paging() {
    let (_dir, server) = start_server();
    let address = unique_name("addr");
    let queue = unique_name("q");
    server.create_queue(&address, &queue, None, true).unwrap();
    let control = server.queue_control(&queue).unwrap();

    let producer = server.create_producer(&address).unwrap();
    send_numbered(&producer, N);
    assert_eq!(control.count_messages(None).unwrap(), N);
    assert!(control.is_paging());
    assert!(server.page_store().segment_count(&address) > 0);

    let mut consumer = server.create_consumer(&queue).unwrap();
    drain_in_order(&mut consumer, N);

    assert_eq!(control.count_messages(None).unwrap(), 0);
    assert!(!control.is_paging());
    assert_eq!(server.page_store().segment_count(&address), 0);
}

#[test]
fn filtered_count_and_list_see_every_other_message() {
    let (_dir, server) = start_server();
    let address = unique_name("addr");
    let queue = unique_name("q");
    server.create_queue(&address, &queue, None, true).unwrap();
    let control = server.queue_control(&queue).unwrap();

    let producer = server.create_producer(&address).unwrap();
    send_numbered(&producer, N);

    let filter = Some("parity = 'odd'");
    assert_eq!(control.count_messages(filter).unwrap(), N / 2);

    let json: Value = serde_json::from_str(&control.list_messages_as_json(filter).unwrap()).unwrap();
    let items = json.as_array().unwrap();
    assert_eq!(items.len() as u64, N / 2);
    assert!(items.iter().all(|item| item["parity"] == "odd"));

    let ids: Vec<u64> = items.iter().map(|item| item["messageID"].as_u64().unwrap()).collect();
    assert!(ids.windows(2).all(|w| w[0] < w[1]), "listing must follow enqueue order");

    let numeric = control.count_messages(Some("i >= 500")).unwrap();
    assert_eq!(numeric, N / 2);
}

#[test]
fn listing_twice_without_traffic_is_identical() {
    let (_dir, server) = start_server();
    let address = unique_name("addr");
    let queue = unique_name("q");
    server.create_queue(&address, &queue, None, true).unwrap();
    let control = server.queue_control(&queue).unwrap();

    send_numbered(&server.create_producer(&address).unwrap(), 200);

    let first = control.list_messages_as_json(None).unwrap();
    let second = control.list_messages_as_json(None).unwrap();
    assert_eq!(first, second);
    assert_eq!(
        serde_json::from_str::<Value>(&first).unwrap().as_array().unwrap().len(),
        200
    );
}

#[test]
fn scans_run_concurrently_with_producer_and_consumer() {
    let (_dir, server) = start_server();
    let address = unique_name("addr");
    let queue = unique_name("q");
    server.create_queue(&address, &queue, None, true).unwrap();
    let control = server.queue_control(&queue).unwrap();

    let producer = server.create_producer(&address).unwrap();
    let mut consumer = server.create_consumer(&queue).unwrap();
    let (result_tx, result_rx) = flume::unbounded::<Result<&'static str, String>>();
    let done = Arc::new(AtomicBool::new(false));

    let scanner = {
        let control = control.clone();
        let done = Arc::clone(&done);
        let result_tx = result_tx.clone();
        thread::spawn(move || {
            let mut scans = 0u64;
            while !done.load(Ordering::Acquire) {
                let outcome = control
                    .count_messages(None)
                    .and_then(|_| control.list_messages_as_json(None))
                    .and_then(|_| control.count_messages(Some("parity = 'even'")));
                if let Err(e) = outcome {
                    let _ = result_tx.send(Err(format!("scan failed: {e}")));
                    return;
                }
                scans += 1;
            }
            let _ = result_tx.send(if scans > 0 {
                Ok("scanner")
            } else {
                Err("scanner never ran".to_string())
            });
        })
    };

    let producing = {
        let result_tx = result_tx.clone();
        thread::spawn(move || {
            for i in 0..N {
                if let Err(e) = producer.send(numbered_message(i)) {
                    let _ = result_tx.send(Err(format!("send {i} failed: {e}")));
                    return;
                }
            }
            let _ = result_tx.send(Ok("producer"));
        })
    };
    producing.join().unwrap();
    assert_eq!(result_rx.recv().unwrap(), Ok("producer"));

    let consuming = {
        let result_tx = result_tx.clone();
        thread::spawn(move || {
            drain_in_order(&mut consumer, N);
            let _ = result_tx.send(Ok("consumer"));
        })
    };
    consuming.join().unwrap();
    assert_eq!(result_rx.recv().unwrap(), Ok("consumer"));

    done.store(true, Ordering::Release);
    scanner.join().unwrap();
    assert_eq!(result_rx.recv().unwrap(), Ok("scanner"));

    assert_eq!(control.count_messages(None).unwrap(), 0);
}

#[test]
fn poller_producer_and_consumer_complete_together() {
    let (_dir, server) = start_server();
    let address = unique_name("addr");
    let queue = unique_name("q");
    server.create_queue(&address, &queue, None, true).unwrap();
    let control = server.queue_control(&queue).unwrap();

    let poller = ManagementPoller::spawn(control.clone(), Duration::from_millis(20)).unwrap();
    let producer = server.create_producer(&address).unwrap();
    let mut consumer = server.create_consumer(&queue).unwrap();

    let producing = thread::spawn(move || {
        for i in 0..N {
            producer.send(numbered_message(i)).unwrap();
            if i % 100 == 0 {
                thread::sleep(Duration::from_millis(1));
            }
        }
    });
    let consuming = thread::spawn(move || drain_in_order(&mut consumer, N));

    producing.join().unwrap();
    consuming.join().unwrap();
    let report = poller.stop();

    assert!(report.error.is_none(), "poller failed: {:?}", report.error);
    assert!(report.polls >= 1);
    assert_eq!(control.count_messages(None).unwrap(), 0);
    assert_eq!(server.page_store().segment_count(&address), 0);
}
