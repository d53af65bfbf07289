use std::io;
use std::panic;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use flume::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use tracing::{debug, warn};

use super::QueueControl;
use crate::core::error::QueueError;

/// Outcome of a stopped [`ManagementPoller`].
#[derive(Debug)]
pub struct PollReport {
    pub polls: u64,
    /// The error that ended polling early, if any.
    pub error: Option<QueueError>,
}

/// Background thread that counts and lists a queue every `interval`
/// until stopped or until a call fails.
#[derive(Debug)]
pub struct ManagementPoller {
    stop_tx: Sender<()>,
    handle: JoinHandle<PollReport>,
}

impl ManagementPoller {
    pub fn spawn(control: QueueControl, interval: Duration) -> io::Result<Self> {
        let (stop_tx, stop_rx) = flume::bounded(1);
        let handle = thread::Builder::new()
            .name(format!("pagemq-poller-{}", control.name()))
            .spawn(move || poll_loop(control, interval, stop_rx))?;
        Ok(Self { stop_tx, handle })
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signals the poller and waits for its report.
    pub fn stop(self) -> PollReport {
        let _ = self.stop_tx.try_send(());
        match self.handle.join() {
            Ok(report) => report,
            Err(payload) => panic::resume_unwind(payload),
        }
    }
}

fn poll_loop(control: QueueControl, interval: Duration, stop_rx: Receiver<()>) -> PollReport {
    let mut polls = 0u64;
    loop {
        match stop_rx.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => break,
            Err(TryRecvError::Empty) => {}
        }

        let result = control
            .count_messages(None)
            .and_then(|count| control.list_messages_as_json(None).map(|json| (count, json.len())));
        match result {
            Ok((count, json_len)) => {
                polls += 1;
                debug!(
                    target: "pagemq::management",
                    queue = %control.name(),
                    count,
                    json_len,
                    paging = control.is_paging(),
                    "polled queue"
                );
            }
            Err(e) => {
                warn!(target: "pagemq::management", queue = %control.name(), error = %e, "poll failed");
                return PollReport {
                    polls,
                    error: Some(e),
                };
            }
        }

        match stop_rx.recv_timeout(interval) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }
    PollReport { polls, error: None }
}
