// crates/resilience/src/lib.rs
//! Call decoration for RPC clients
//!
//! This crate wraps a raw call function with:
//! - Deadline-bounded retry with exponential backoff
//! - Single-attempt timeout handling
//! - Request bundling with count, byte and delay thresholds
//!
//! # Example
//!
//! ```rust
//! use callwright_resilience::{BackoffSettings, CallSettings, RetryOptions, StatusCode};
//! use std::time::Duration;
//!
//! let backoff = BackoffSettings::new(Duration::from_secs(60))
//!     .with_delays(Duration::from_millis(100), 1.3, Duration::from_secs(10));
//! let settings = CallSettings::new(Duration::from_secs(30))
//!     .with_retry(RetryOptions::new([StatusCode::Unavailable], backoff));
//!
//! assert!(settings.retries_enabled());
//! ```

mod api_callable;
mod backoff;
mod bundling;
mod call;
mod clock;
mod error;
mod message;
mod retry;
mod settings;
mod status;
mod timeout;

pub use api_callable::{ApiCallable, ErrorTransform, Outcome};
pub use backoff::{Backoff, BackoffSettings};
pub use bundling::{BundleDescriptor, BundleKey, BundleThresholds, Cancel, Executor, ResultFuture};
pub use call::{raw_call, Call, RawCall};
pub use clock::{system_clock, Clock, SystemClock};
#[cfg(any(test, feature = "test-utils"))]
pub use clock::ManualClock;
pub use error::{CallError, CallResult};
pub use message::{FieldPath, Message};
pub use retry::{with_retry, Retry};
pub use settings::{
    BundleOptions, CallContext, CallOptions, CallSettings, Metadata, Override, PageDescriptor,
    RetryOptions,
};
pub use status::{StatusCode, UnknownStatusCode};
pub use timeout::{with_timeout, Timeout};
