// crates/resilience/src/retry.rs
//! Deadline-bounded retry with exponential backoff

use crate::backoff::Backoff;
use crate::call::{Call, RawCall};
use crate::clock::{deadline_after, system_clock, Clock};
use crate::error::{CallError, CallResult};
use crate::settings::{CallContext, Metadata, RetryOptions};
use std::sync::Arc;

/// Retries transient transport failures until the total timeout passes
///
/// The deadline is fixed before the first attempt. After a retryable
/// failure the calling thread sleeps for the current delay, then delay and
/// attempt timeout grow by their multipliers. Failures that are not
/// transport errors, or whose status is not in the retry set, are returned
/// unchanged after a single attempt.
#[derive(Debug, Clone)]
pub struct Retry {
    options: RetryOptions,
    metadata: Metadata,
    clock: Arc<dyn Clock>,
}

impl Retry {
    /// Creates a retry engine on the system clock
    pub fn new(options: RetryOptions) -> Self {
        Self {
            options,
            metadata: Metadata::new(),
            clock: system_clock(),
        }
    }

    /// Sets the clock used for deadlines and sleeps
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the metadata passed to every attempt
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Returns the retry options
    pub fn options(&self) -> &RetryOptions {
        &self.options
    }

    /// Runs `call` for `request`, retrying per the options
    pub fn call<Req, Resp, F>(&self, call: F, request: &Req) -> CallResult<Resp>
    where
        F: Fn(&Req, &CallContext) -> CallResult<Resp>,
    {
        let total_timeout = self.options.backoff.total_timeout;
        let deadline = deadline_after(self.clock.now(), total_timeout);
        let mut backoff = Backoff::new(&self.options.backoff);
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            let remaining = deadline.saturating_duration_since(self.clock.now());
            let context = CallContext {
                deadline,
                timeout: backoff.rpc_timeout().min(remaining),
                attempt: attempts,
                metadata: self.metadata.clone(),
            };

            let error = match call(request, &context) {
                Ok(response) => return Ok(response),
                Err(e) => e,
            };

            if !error.is_retryable_in(&self.options.retry_codes) {
                return Err(error);
            }

            if self.clock.now() >= deadline {
                log::debug!("Retry deadline reached after {} attempts: {}", attempts, error);
                return Err(CallError::RetryExhausted {
                    attempts: attempts as usize,
                    timeout: total_timeout,
                    cause: Box::new(error),
                });
            }

            log::debug!(
                "Attempt {} failed with {}, retrying in {:?}",
                attempts,
                error,
                backoff.delay()
            );
            self.clock.sleep(backoff.delay());
            backoff.advance();
        }
    }

    /// Binds this engine to `call`, producing a decorated call
    pub fn wrap<Req, Resp>(self, call: RawCall<Req, Resp>) -> Call<Req, Resp>
    where
        Req: 'static,
        Resp: 'static,
    {
        Arc::new(move |request: &Req| self.call(|r, ctx| call(r, ctx), request))
    }
}

/// Executes `operation` with retry logic
pub fn with_retry<Req, Resp, F>(options: &RetryOptions, request: &Req, operation: F) -> CallResult<Resp>
where
    F: Fn(&Req, &CallContext) -> CallResult<Resp>,
{
    Retry::new(options.clone()).call(operation, request)
}
