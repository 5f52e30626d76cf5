// crates/resilience/src/bundling/executor.rs
//! Registry of live bundles and the triggers that send them

use super::batch::Batch;
use super::descriptor::{BundleDescriptor, BundleKey, BundleThresholds};
use super::future::{Cancel, ResultFuture};
use super::timer::FlushTimer;
use crate::call::Call;
use crate::clock::deadline_after;
use crate::message::Message;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;
use std::time::Instant;

/// Bundles requests per key and sends each bundle as one physical call
///
/// At most one bundle is live per key. A bundle is sent when a count or
/// byte threshold is reached during [`schedule`](Executor::schedule), when
/// its delay threshold elapses, or on [`flush`](Executor::flush) and
/// [`drain`](Executor::drain). Whichever trigger removes the bundle from
/// the registry first sends it; later triggers find nothing to do.
///
/// Threshold and explicit flushes send on the calling thread. Delay flushes
/// send on a short-lived thread per bundle, so one slow bundle never
/// delays the timer for other keys.
///
/// Pending bundles are not sent on drop. Call `drain` before shutting down.
pub struct Executor<Req: Message, Resp: Message> {
    shared: Arc<Shared<Req, Resp>>,
    timer: Option<FlushTimer>,
}

struct Shared<Req: Message, Resp: Message> {
    thresholds: BundleThresholds,
    registry: Mutex<HashMap<BundleKey, Batch<Req, Resp>>>,
    next_id: AtomicU64,
}

impl<Req: Message, Resp: Message> Shared<Req, Resp> {
    fn registry(&self) -> MutexGuard<'_, HashMap<BundleKey, Batch<Req, Resp>>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Takes the batch under `key` out of the registry if it is still
    /// batch `batch_id`
    fn take_if_current(&self, key: &BundleKey, batch_id: u64) -> Option<Batch<Req, Resp>> {
        let mut registry = self.registry();
        match registry.get(key) {
            Some(batch) if batch.id() == batch_id => registry.remove(key),
            _ => None,
        }
    }

    fn cancel(&self, key: &BundleKey, entry_id: u64) -> bool {
        let mut registry = self.registry();
        let removed = registry
            .get_mut(key)
            .is_some_and(|batch| batch.remove(entry_id));
        if removed {
            log::debug!("Cancelled request {} in bundle {}", entry_id, key);
        }
        removed
    }
}

/// Withdraws one request from the live bundle of its key
///
/// Requests are identified by a unique entry id rather than a position,
/// since other cancellations shift positions.
struct CancelToken<Req: Message, Resp: Message> {
    shared: Weak<Shared<Req, Resp>>,
    key: BundleKey,
    entry_id: u64,
}

impl<Req: Message, Resp: Message> Cancel for CancelToken<Req, Resp> {
    fn cancel(&self) -> bool {
        self.shared
            .upgrade()
            .is_some_and(|shared| shared.cancel(&self.key, self.entry_id))
    }
}

impl<Req: Message, Resp: Message> Executor<Req, Resp> {
    /// Creates an executor; starts the timer thread when a delay is set
    pub fn new(thresholds: BundleThresholds) -> std::io::Result<Self> {
        if thresholds.has_limits() {
            log::warn!(
                "Bundle hard limits (elements: {}, bytes: {}) are accepted but not enforced",
                thresholds.element_count_limit,
                thresholds.request_byte_limit
            );
        }

        let shared = Arc::new(Shared {
            thresholds,
            registry: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        });

        let timer = if thresholds.delay_threshold.is_zero() {
            None
        } else {
            let weak = Arc::downgrade(&shared);
            Some(FlushTimer::start(move |key, batch_id| {
                let batch = weak
                    .upgrade()
                    .and_then(|shared| shared.take_if_current(&key, batch_id));
                if let Some(batch) = batch {
                    log::debug!("Delay threshold elapsed for bundle {}", key);
                    run_detached(batch);
                }
            })?)
        };

        Ok(Self { shared, timer })
    }

    /// Returns the thresholds
    pub fn thresholds(&self) -> &BundleThresholds {
        &self.shared.thresholds
    }

    /// Adds `request` to the bundle for `key`
    ///
    /// The first request of a new bundle supplies its non-bundled fields
    /// and `call`. If this request makes the bundle reach a count or byte
    /// threshold, the bundle is sent before returning and the returned
    /// future is already resolved.
    pub fn schedule(
        &self,
        call: Call<Req, Resp>,
        key: BundleKey,
        descriptor: &BundleDescriptor,
        request: Req,
    ) -> ResultFuture<Resp> {
        let elements = request
            .elements(&descriptor.bundled_field)
            .unwrap_or_default();
        let entry_id = self.shared.next_id();
        let future = ResultFuture::with_canceller(Box::new(CancelToken {
            shared: Arc::downgrade(&self.shared),
            key: key.clone(),
            entry_id,
        }));

        let (created, ready) = {
            let mut registry = self.shared.registry();
            let mut created = None;
            let batch = match registry.entry(key.clone()) {
                Entry::Occupied(occupied) => occupied.into_mut(),
                Entry::Vacant(vacant) => {
                    let id = self.shared.next_id();
                    created = Some(id);
                    vacant.insert(Batch::new(
                        id,
                        key.clone(),
                        call,
                        Arc::new(descriptor.clone()),
                        request,
                    ))
                }
            };
            batch.push(entry_id, elements, future.clone());

            let full = self
                .shared
                .thresholds
                .is_reached(batch.element_count(), batch.byte_count());
            (created, if full { registry.remove(&key) } else { None })
        };

        match ready {
            Some(batch) => {
                log::debug!("Threshold reached for bundle {}", key);
                batch.run();
            }
            None => {
                if let (Some(batch_id), Some(timer)) = (created, &self.timer) {
                    let due = deadline_after(Instant::now(), self.shared.thresholds.delay_threshold);
                    timer.schedule(key, batch_id, due);
                }
            }
        }

        future
    }

    /// Sends the bundle for `key` now; false if there is none
    pub fn flush(&self, key: &BundleKey) -> bool {
        let batch = self.shared.registry().remove(key);
        match batch {
            Some(batch) => {
                batch.run();
                true
            }
            None => false,
        }
    }

    /// Sends every live bundle; returns how many were sent
    pub fn drain(&self) -> usize {
        let batches: Vec<Batch<Req, Resp>> = {
            let mut registry = self.shared.registry();
            registry.drain().map(|(_, batch)| batch).collect()
        };
        let count = batches.len();
        for batch in batches {
            batch.run();
        }
        if count > 0 {
            log::debug!("Drained {} bundles", count);
        }
        count
    }

    /// Number of live bundles
    pub fn pending_batches(&self) -> usize {
        self.shared.registry().len()
    }

    /// Number of requests waiting in the live bundle for `key`
    pub fn pending_requests(&self, key: &BundleKey) -> usize {
        self.shared
            .registry()
            .get(key)
            .map_or(0, |batch| batch.request_count())
    }

    /// True if no bundle is live
    pub fn is_empty(&self) -> bool {
        self.pending_batches() == 0
    }
}

/// Sends `batch` on its own thread so a slow call never holds up the timer
///
/// Falls back to the current thread if no thread can be spawned.
fn run_detached<Req: Message, Resp: Message>(batch: Batch<Req, Resp>) {
    let slot = Arc::new(Mutex::new(Some(batch)));
    let worker_slot = Arc::clone(&slot);
    let spawned = thread::Builder::new()
        .name("bundle-flush".to_string())
        .spawn(move || {
            if let Some(batch) = take(&worker_slot) {
                batch.run();
            }
        });

    if let Err(e) = spawned {
        log::warn!("Could not start bundle flush thread: {}; sending on timer thread", e);
        if let Some(batch) = take(&slot) {
            batch.run();
        }
    }
}

fn take<T>(slot: &Mutex<Option<T>>) -> Option<T> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).take()
}

impl<Req: Message, Resp: Message> Drop for Executor<Req, Resp> {
    fn drop(&mut self) {
        let pending = self.pending_batches();
        if pending > 0 {
            log::warn!("Dropping bundling executor with {} undrained bundles", pending);
        }
    }
}
