// crates/resilience/src/bundling/timer.rs
//! Background thread that flushes bundles once their delay elapses

use super::descriptor::BundleKey;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::thread;
use std::time::Instant;

/// A pending flush of batch `batch_id` under `key`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Scheduled {
    due: Instant,
    batch_id: u64,
    key: BundleKey,
}

/// One timer thread shared by every bundle of an executor
///
/// Fires call the supplied callback with the key and batch id. The thread
/// stops when the timer is dropped; unfired entries are discarded.
pub(crate) struct FlushTimer {
    sender: Option<Sender<Scheduled>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl FlushTimer {
    /// Starts the timer thread
    pub(crate) fn start<F>(on_fire: F) -> std::io::Result<Self>
    where
        F: Fn(BundleKey, u64) + Send + 'static,
    {
        let (sender, receiver) = unbounded();
        let handle = thread::Builder::new()
            .name("bundle-flush-timer".to_string())
            .spawn(move || timer_loop(receiver, on_fire))?;

        Ok(Self {
            sender: Some(sender),
            handle: Some(handle),
        })
    }

    /// Requests a fire for `batch_id` at `due`
    pub(crate) fn schedule(&self, key: BundleKey, batch_id: u64, due: Instant) {
        if let Some(sender) = &self.sender {
            if sender.send(Scheduled { due, batch_id, key }).is_err() {
                log::error!("Bundle flush timer has stopped; batch {} relies on drain", batch_id);
            }
        }
    }
}

impl Drop for FlushTimer {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            // Dropped from a callback on the timer thread itself
            if handle.thread().id() == thread::current().id() {
                return;
            }
            let _ = handle.join();
        }
    }
}

fn timer_loop<F>(receiver: Receiver<Scheduled>, on_fire: F)
where
    F: Fn(BundleKey, u64),
{
    let mut pending: BinaryHeap<Reverse<Scheduled>> = BinaryHeap::new();

    loop {
        let now = Instant::now();
        while pending.peek().is_some_and(|Reverse(next)| next.due <= now) {
            if let Some(Reverse(fired)) = pending.pop() {
                on_fire(fired.key, fired.batch_id);
            }
        }

        let received = match pending.peek() {
            Some(Reverse(next)) => {
                receiver.recv_timeout(next.due.saturating_duration_since(Instant::now()))
            }
            None => receiver.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match received {
            Ok(scheduled) => pending.push(Reverse(scheduled)),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    log::debug!("Bundle flush timer stopped with {} unfired entries", pending.len());
}
