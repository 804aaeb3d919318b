//! `JobQueue` capability (SPEC_FULL.md §4.8): the dispatcher's only view of
//! its message broker. Ships one in-process implementation backed by
//! `crossbeam-channel`, standing in for the original Redis list queue
//! without requiring a server to run the crate.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};

/// Push/pop over named byte-payload queues.
pub trait JobQueue: Send + Sync {
    fn push(&self, queue: &str, payload: Vec<u8>);
    fn blpop(&self, queue: &str, timeout: Duration) -> Option<Vec<u8>>;
}

const QUEUE_CAPACITY: usize = 4096;

/// In-process multi-queue: named queues keyed by string, created lazily on
/// first use and kept open for the lifetime of the dispatcher.
pub struct InProcessQueue {
    queues: Mutex<HashMap<String, (Sender<Vec<u8>>, Receiver<Vec<u8>>)>>,
}

impl InProcessQueue {
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
        }
    }

    fn channel_for(&self, queue: &str) -> (Sender<Vec<u8>>, Receiver<Vec<u8>>) {
        let mut queues = self.queues.lock().expect("queue registry poisoned");
        queues
            .entry(queue.to_string())
            .or_insert_with(|| bounded(QUEUE_CAPACITY))
            .clone()
    }
}

impl Default for InProcessQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl JobQueue for InProcessQueue {
    fn push(&self, queue: &str, payload: Vec<u8>) {
        let (tx, _rx) = self.channel_for(queue);
        // A full queue is a backpressure signal, not a fatal error; block
        // the caller rather than silently dropping the payload.
        let _ = tx.send(payload);
    }

    fn blpop(&self, queue: &str, timeout: Duration) -> Option<Vec<u8>> {
        let (_tx, rx) = self.channel_for(queue);
        rx.recv_timeout(timeout).ok()
    }
}
