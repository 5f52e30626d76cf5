// crates/resilience/src/bundling/batch.rs
//! A bundle of requests waiting to be sent as one physical call

use super::descriptor::{BundleDescriptor, BundleKey};
use super::future::ResultFuture;
use crate::call::Call;
use crate::error::CallError;
use crate::message::Message;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Elements contributed by one scheduled request, paired with its future
struct Entry<E, Resp> {
    id: u64,
    elements: Vec<E>,
    bytes: usize,
    future: ResultFuture<Resp>,
}

/// Requests sharing one bundle key, in enqueue order
///
/// Entries keep each request's elements together with its future, so the
/// two can never drift apart.
pub(crate) struct Batch<Req: Message, Resp: Message> {
    id: u64,
    key: BundleKey,
    call: Call<Req, Resp>,
    descriptor: Arc<BundleDescriptor>,
    template: Req,
    entries: Vec<Entry<Req::Element, Resp>>,
    element_count: usize,
    byte_count: usize,
}

impl<Req: Message, Resp: Message> Batch<Req, Resp> {
    /// Creates an empty batch; `template` supplies every non-bundled field
    pub(crate) fn new(
        id: u64,
        key: BundleKey,
        call: Call<Req, Resp>,
        descriptor: Arc<BundleDescriptor>,
        template: Req,
    ) -> Self {
        Self {
            id,
            key,
            call,
            descriptor,
            template,
            entries: Vec::new(),
            element_count: 0,
            byte_count: 0,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn element_count(&self) -> usize {
        self.element_count
    }

    pub(crate) fn byte_count(&self) -> usize {
        self.byte_count
    }

    pub(crate) fn request_count(&self) -> usize {
        self.entries.len()
    }

    /// Appends one request's elements as a new group
    pub(crate) fn push(&mut self, id: u64, elements: Vec<Req::Element>, future: ResultFuture<Resp>) {
        let bytes: usize = elements.iter().map(Req::element_size).sum();
        self.element_count += elements.len();
        self.byte_count += bytes;
        self.entries.push(Entry {
            id,
            elements,
            bytes,
            future,
        });
    }

    /// Removes the group with entry `id`; false if it is not here
    pub(crate) fn remove(&mut self, id: u64) -> bool {
        let Some(index) = self.entries.iter().position(|e| e.id == id) else {
            return false;
        };
        let entry = self.entries.remove(index);
        self.element_count -= entry.elements.len();
        self.byte_count -= entry.bytes;
        true
    }

    /// Sends the bundle and resolves every future
    ///
    /// Does nothing when no request is pending. Failures, including a
    /// panicking call, are delivered through the futures.
    pub(crate) fn run(self) {
        if self.entries.is_empty() {
            return;
        }
        let Batch {
            key,
            call,
            descriptor,
            mut template,
            entries,
            element_count,
            ..
        } = self;

        log::debug!(
            "Sending bundle {} with {} elements from {} requests",
            key,
            element_count,
            entries.len()
        );

        let elements: Vec<Req::Element> = entries
            .iter()
            .flat_map(|e| e.elements.iter().cloned())
            .collect();
        template.set_elements(&descriptor.bundled_field, elements);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| call(&template)))
            .unwrap_or_else(|_| Err(CallError::unknown_message("bundled call panicked")));

        match outcome {
            Ok(response) => deliver(&descriptor, &key, response, entries, element_count),
            Err(error) => {
                for entry in entries {
                    entry.future.set_result(Err(error.clone()));
                }
            }
        }
    }
}

/// Resolves each future with its slice of the subresponse field, or with
/// the whole response when there is nothing to slice
fn deliver<E, Resp: Message>(
    descriptor: &BundleDescriptor,
    key: &BundleKey,
    response: Resp,
    entries: Vec<Entry<E, Resp>>,
    element_count: usize,
) {
    let subresponses = descriptor.subresponse_field.as_ref().and_then(|field| {
        match response.elements(field) {
            Some(items) if items.len() == element_count => Some((field, items)),
            Some(items) => {
                log::warn!(
                    "Bundle {} expected {} entries in {}, got {}; delivering full response",
                    key,
                    element_count,
                    field,
                    items.len()
                );
                None
            }
            None => {
                log::warn!(
                    "Bundle {} response has no {}; delivering full response",
                    key,
                    field
                );
                None
            }
        }
    });

    match subresponses {
        Some((field, items)) => {
            let mut offset = 0;
            for entry in entries {
                let end = offset + entry.elements.len();
                let mut sliced = response.clone();
                sliced.set_elements(field, items[offset..end].to_vec());
                offset = end;
                entry.future.set_result(Ok(sliced));
            }
        }
        None => {
            for entry in entries {
                entry.future.set_result(Ok(response.clone()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CallResult;
    use crate::status::StatusCode;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn descriptor(subresponse: Option<&str>) -> Arc<BundleDescriptor> {
        let mut d = BundleDescriptor::new("messages").with_discriminator("topic");
        if let Some(field) = subresponse {
            d = d.with_subresponse_field(field);
        }
        Arc::new(d)
    }

    fn echo_ids() -> Call<Value, Value> {
        Arc::new(|req: &Value| {
            let ids: Vec<Value> = req["messages"]
                .as_array()
                .map(|m| m.iter().map(|v| json!(format!("id-{}", v.as_str().unwrap_or("")))).collect())
                .unwrap_or_default();
            Ok(json!({"ids": ids}))
        })
    }

    fn batch(call: Call<Value, Value>, subresponse: Option<&str>) -> Batch<Value, Value> {
        Batch::new(
            1,
            BundleKey::from_values(["t"]),
            call,
            descriptor(subresponse),
            json!({"topic": "t"}),
        )
    }

    fn strings(items: &[&str]) -> Vec<Value> {
        items.iter().map(|s| json!(s)).collect()
    }

    #[test]
    fn test_push_and_remove_track_counts() {
        let mut b = batch(echo_ids(), None);
        b.push(1, strings(&["ab", "c"]), ResultFuture::new());
        b.push(2, strings(&["def"]), ResultFuture::new());

        assert_eq!(b.element_count(), 3);
        assert_eq!(b.byte_count(), 6);
        assert_eq!(b.request_count(), 2);

        assert!(b.remove(1));
        assert!(!b.remove(1));
        assert_eq!(b.element_count(), 1);
        assert_eq!(b.byte_count(), 3);
        assert_eq!(b.request_count(), 1);
    }

    #[test]
    fn test_run_empty_makes_no_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let call: Call<Value, Value> = Arc::new(move |_req: &Value| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(json!({}))
        });

        batch(call, None).run();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_run_concatenates_in_order_and_demuxes() {
        let mut b = batch(echo_ids(), Some("ids"));
        let futures: Vec<ResultFuture<Value>> = (0..3).map(|_| ResultFuture::new()).collect();
        b.push(1, strings(&["a"]), futures[0].clone());
        b.push(2, strings(&["b", "c"]), futures[1].clone());
        b.push(3, strings(&["d", "e", "f"]), futures[2].clone());

        b.run();

        let results: Vec<Value> = futures
            .iter()
            .filter_map(|f| f.result().and_then(Result::ok))
            .collect();
        assert_eq!(
            results,
            vec![
                json!({"ids": ["id-a"]}),
                json!({"ids": ["id-b", "id-c"]}),
                json!({"ids": ["id-d", "id-e", "id-f"]}),
            ]
        );
    }

    #[test]
    fn test_run_mismatch_delivers_full_response() {
        let call: Call<Value, Value> = Arc::new(|_req: &Value| Ok(json!({"ids": ["only-one"]})));
        let mut b = batch(call, Some("ids"));
        let first = ResultFuture::new();
        let second = ResultFuture::new();
        b.push(1, strings(&["a"]), first.clone());
        b.push(2, strings(&["b"]), second.clone());

        b.run();

        let expected = json!({"ids": ["only-one"]});
        assert_eq!(first.result().and_then(Result::ok), Some(expected.clone()));
        assert_eq!(second.result().and_then(Result::ok), Some(expected));
    }

    #[test]
    fn test_run_failure_reaches_every_future() {
        let call: Call<Value, Value> =
            Arc::new(|_req: &Value| Err(CallError::transport(StatusCode::Unavailable, "down")));
        let mut b = batch(call, None);
        let futures: Vec<ResultFuture<Value>> = (0..2).map(|_| ResultFuture::new()).collect();
        for (i, f) in futures.iter().enumerate() {
            b.push(i as u64, strings(&["x"]), f.clone());
        }

        b.run();

        for f in &futures {
            let code = f.result().and_then(|r| r.err()).and_then(|e| e.code());
            assert_eq!(code, Some(StatusCode::Unavailable));
        }
    }

    #[test]
    fn test_run_panicking_call_is_reported() {
        let call: Call<Value, Value> = Arc::new(|_req: &Value| -> CallResult<Value> { panic!("transport exploded") });
        let mut b = batch(call, None);
        let future = ResultFuture::new();
        b.push(1, strings(&["x"]), future.clone());

        b.run();

        assert!(matches!(future.result(), Some(Err(CallError::Unknown(_)))));
    }
}
