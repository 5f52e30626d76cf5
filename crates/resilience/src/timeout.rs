// crates/resilience/src/timeout.rs
//! Single-attempt calls bounded by a fixed timeout

use crate::call::{Call, RawCall};
use crate::clock::{deadline_after, system_clock, Clock};
use crate::error::CallResult;
use crate::settings::{CallContext, Metadata};
use std::sync::Arc;
use std::time::Duration;

/// Executes `operation` once with a deadline `timeout` from now
pub fn with_timeout<Req, Resp, F>(timeout: Duration, request: &Req, operation: F) -> CallResult<Resp>
where
    F: FnOnce(&Req, &CallContext) -> CallResult<Resp>,
{
    Timeout::new(timeout).call(operation, request)
}

/// Timeout wrapper for calls that are never retried
#[derive(Debug, Clone)]
pub struct Timeout {
    duration: Duration,
    metadata: Metadata,
    clock: Arc<dyn Clock>,
}

impl Timeout {
    /// Creates a new timeout
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            metadata: Metadata::new(),
            clock: system_clock(),
        }
    }

    /// Sets the clock used to compute the deadline
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the metadata passed to the call
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Gets the timeout duration
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Performs one attempt of `operation`
    pub fn call<Req, Resp, F>(&self, operation: F, request: &Req) -> CallResult<Resp>
    where
        F: FnOnce(&Req, &CallContext) -> CallResult<Resp>,
    {
        let context = CallContext {
            deadline: deadline_after(self.clock.now(), self.duration),
            timeout: self.duration,
            attempt: 1,
            metadata: self.metadata.clone(),
        };
        operation(request, &context)
    }

    /// Binds this timeout to `call`, producing a decorated call
    pub fn wrap<Req, Resp>(self, call: RawCall<Req, Resp>) -> Call<Req, Resp>
    where
        Req: 'static,
        Resp: 'static,
    {
        Arc::new(move |request: &Req| self.call(|r, ctx| call(r, ctx), request))
    }
}
