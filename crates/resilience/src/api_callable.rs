// crates/resilience/src/api_callable.rs
//! Composition of raw calls with retry, timeout and bundling

use crate::bundling::{Executor, ResultFuture};
use crate::call::{Call, RawCall};
use crate::clock::{system_clock, Clock};
use crate::error::{CallError, CallResult};
use crate::message::Message;
use crate::retry::Retry;
use crate::settings::{CallOptions, CallSettings};
use crate::timeout::Timeout;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Replaces the default error envelope of non-bundled calls
pub type ErrorTransform = Arc<dyn Fn(CallError) -> CallError + Send + Sync>;

/// What a composed call produced
#[derive(Debug)]
pub enum Outcome<Resp> {
    /// The response of a non-bundled call
    Completed(Resp),
    /// A bundled call; resolves when its bundle is sent
    Bundled(ResultFuture<Resp>),
}

impl<Resp: Clone> Outcome<Resp> {
    /// True if the call was handed to the bundling executor
    pub fn is_bundled(&self) -> bool {
        matches!(self, Outcome::Bundled(_))
    }

    /// Returns the response, waiting up to `timeout` for a bundled one
    ///
    /// `None` if the bundle was not sent in time or the request was
    /// cancelled.
    pub fn wait(self, timeout: Option<Duration>) -> Option<CallResult<Resp>> {
        match self {
            Outcome::Completed(response) => Some(Ok(response)),
            Outcome::Bundled(future) => future.wait_result(timeout),
        }
    }

    /// Returns the future of a bundled call
    pub fn into_future(self) -> Option<ResultFuture<Resp>> {
        match self {
            Outcome::Completed(_) => None,
            Outcome::Bundled(future) => Some(future),
        }
    }
}

/// A raw call decorated according to its [`CallSettings`]
///
/// Calls with retry codes are wrapped in [`Retry`], others in a single
/// attempt [`Timeout`]. When bundling is configured the decorated call is
/// handed to an [`Executor`] owned by this callable and every invocation
/// returns [`Outcome::Bundled`]. Errors of non-bundled calls are wrapped
/// in [`CallError::Api`] unless an error transform is set.
///
/// # Example
///
/// ```rust
/// use callwright_resilience::{raw_call, ApiCallable, CallContext, CallSettings, Outcome};
/// use serde_json::{json, Value};
/// use std::time::Duration;
///
/// let echo = raw_call(|req: &Value, _ctx: &CallContext| Ok(req.clone()));
/// let callable = ApiCallable::new(echo, CallSettings::new(Duration::from_secs(5))).unwrap();
///
/// match callable.call(json!({"name": "shelf"}), None).unwrap() {
///     Outcome::Completed(resp) => assert_eq!(resp["name"], "shelf"),
///     Outcome::Bundled(_) => unreachable!(),
/// }
/// ```
pub struct ApiCallable<Req: Message, Resp: Message> {
    call: RawCall<Req, Resp>,
    settings: CallSettings,
    executor: Option<Arc<Executor<Req, Resp>>>,
    error_transform: Option<ErrorTransform>,
    clock: Arc<dyn Clock>,
}

impl<Req: Message, Resp: Message> ApiCallable<Req, Resp> {
    /// Composes `call` with `settings`
    ///
    /// Fails with [`CallError::BundlingConfig`] when the settings configure
    /// both bundling and page streaming.
    pub fn new(call: RawCall<Req, Resp>, settings: CallSettings) -> CallResult<Self> {
        if settings.is_bundled() && settings.is_paged() {
            return Err(CallError::BundlingConfig(
                "bundling and page streaming cannot both be configured".to_string(),
            ));
        }

        let executor = match &settings.bundling {
            Some(bundling) => Some(Arc::new(
                Executor::new(bundling.thresholds).map_err(CallError::unknown)?,
            )),
            None => None,
        };

        Ok(Self {
            call,
            settings,
            executor,
            error_transform: None,
            clock: system_clock(),
        })
    }

    /// Sets the hook applied to errors of non-bundled calls
    pub fn with_error_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(CallError) -> CallError + Send + Sync + 'static,
    {
        self.error_transform = Some(Arc::new(transform));
        self
    }

    /// Sets the clock used by retry and timeout handling
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the settings this callable was built with
    pub fn settings(&self) -> &CallSettings {
        &self.settings
    }

    /// Returns the bundling executor, if bundling is configured
    pub fn executor(&self) -> Option<&Arc<Executor<Req, Resp>>> {
        self.executor.as_ref()
    }

    /// Invokes the call with optional per-call overrides
    ///
    /// Bundling thresholds and descriptor always come from the settings the
    /// callable was built with; `options` only affects retry, timeout and
    /// metadata.
    pub fn call(&self, request: Req, options: Option<&CallOptions>) -> CallResult<Outcome<Resp>> {
        let merged;
        let settings = match options {
            Some(options) => {
                merged = self.settings.merge(options);
                &merged
            }
            None => &self.settings,
        };
        let call = self.decorate(settings);

        match (&self.executor, &self.settings.bundling) {
            (Some(executor), Some(bundling)) => {
                let key = bundling.descriptor.bundle_key(&request);
                Ok(Outcome::Bundled(executor.schedule(
                    call,
                    key,
                    &bundling.descriptor,
                    request,
                )))
            }
            _ => call(&request)
                .map(Outcome::Completed)
                .map_err(|error| self.transform(error)),
        }
    }

    /// Sends every pending bundle; returns how many were sent
    pub fn drain(&self) -> usize {
        self.executor.as_ref().map_or(0, |executor| executor.drain())
    }

    fn decorate(&self, settings: &CallSettings) -> Call<Req, Resp> {
        let call = Arc::clone(&self.call);
        match &settings.retry {
            Some(retry) if !retry.is_empty() => Retry::new(retry.clone())
                .with_clock(Arc::clone(&self.clock))
                .with_metadata(settings.metadata.clone())
                .wrap(call),
            _ => Timeout::new(settings.timeout)
                .with_clock(Arc::clone(&self.clock))
                .with_metadata(settings.metadata.clone())
                .wrap(call),
        }
    }

    fn transform(&self, error: CallError) -> CallError {
        match &self.error_transform {
            Some(transform) => transform(error),
            None => CallError::Api {
                message: error.to_string(),
                cause: Box::new(error),
            },
        }
    }
}

impl<Req: Message, Resp: Message> fmt::Debug for ApiCallable<Req, Resp> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCallable")
            .field("settings", &self.settings)
            .field("bundled", &self.executor.is_some())
            .field("error_transform", &self.error_transform.is_some())
            .finish()
    }
}
