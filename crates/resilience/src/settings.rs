// crates/resilience/src/settings.rs
//! Immutable call settings and per-call overrides

use crate::backoff::BackoffSettings;
use crate::bundling::{BundleDescriptor, BundleThresholds};
use crate::status::StatusCode;
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

/// Request metadata forwarded to the raw call
pub type Metadata = BTreeMap<String, String>;

/// Which failures are retried and how long to back off between attempts
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOptions {
    /// Transport status codes that are considered transient
    pub retry_codes: BTreeSet<StatusCode>,
    /// Delay and timeout growth
    pub backoff: BackoffSettings,
}

impl RetryOptions {
    /// Creates retry options for the given codes
    pub fn new<I>(retry_codes: I, backoff: BackoffSettings) -> Self
    where
        I: IntoIterator<Item = StatusCode>,
    {
        Self {
            retry_codes: retry_codes.into_iter().collect(),
            backoff,
        }
    }

    /// Returns true if no code is retryable
    pub fn is_empty(&self) -> bool {
        self.retry_codes.is_empty()
    }
}

/// Field names describing a paginated method
///
/// Only consulted to reject settings that combine paging with bundling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageDescriptor {
    pub request_page_token_field: String,
    pub response_page_token_field: String,
    pub resource_field: String,
}

/// Bundling descriptor and the thresholds that trigger a flush
#[derive(Debug, Clone, PartialEq)]
pub struct BundleOptions {
    pub descriptor: BundleDescriptor,
    pub thresholds: BundleThresholds,
}

/// Complete description of how a call is decorated
///
/// Built once when a client is set up and never mutated afterwards; use
/// [`CallSettings::merge`] to derive the settings of a single call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallSettings {
    /// Timeout of a single attempt when retrying is disabled
    pub timeout: Duration,
    /// Retry behavior, `None` to never retry
    pub retry: Option<RetryOptions>,
    /// Present when the method returns paginated results
    pub page_descriptor: Option<PageDescriptor>,
    /// Present when requests should be bundled
    pub bundling: Option<BundleOptions>,
    /// Metadata sent with every attempt
    pub metadata: Metadata,
}

impl CallSettings {
    /// Creates settings with a single-attempt timeout and nothing else
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            retry: None,
            page_descriptor: None,
            bundling: None,
            metadata: Metadata::new(),
        }
    }

    /// Sets the retry options
    pub fn with_retry(mut self, retry: RetryOptions) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Sets the page descriptor
    pub fn with_page_descriptor(mut self, descriptor: PageDescriptor) -> Self {
        self.page_descriptor = Some(descriptor);
        self
    }

    /// Enables bundling
    pub fn with_bundling(mut self, descriptor: BundleDescriptor, thresholds: BundleThresholds) -> Self {
        self.bundling = Some(BundleOptions {
            descriptor,
            thresholds,
        });
        self
    }

    /// Adds a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Returns true when retrying is configured with at least one code
    pub fn retries_enabled(&self) -> bool {
        self.retry.as_ref().is_some_and(|r| !r.is_empty())
    }

    /// Returns true when bundling is configured
    pub fn is_bundled(&self) -> bool {
        self.bundling.is_some()
    }

    /// Returns true when paging is configured
    pub fn is_paged(&self) -> bool {
        self.page_descriptor.is_some()
    }

    /// Produces the effective settings for one call
    ///
    /// Every field of `options` that is not [`Override::Inherit`] replaces
    /// the corresponding field; metadata entries are layered on top.
    pub fn merge(&self, options: &CallOptions) -> CallSettings {
        let mut merged = self.clone();
        if let Override::Set(timeout) = options.timeout {
            merged.timeout = timeout;
        }
        if let Override::Set(retry) = &options.retry {
            merged.retry = retry.clone();
        }
        merged
            .metadata
            .extend(options.metadata.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }
}

impl Default for CallSettings {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

/// Per-call override value
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Override<T> {
    /// Keep the value from the base settings
    #[default]
    Inherit,
    /// Replace the base value
    Set(T),
}

/// Overrides supplied with a single call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallOptions {
    pub timeout: Override<Duration>,
    /// `Set(None)` disables retrying for the call
    pub retry: Override<Option<RetryOptions>>,
    pub metadata: Metadata,
}

impl CallOptions {
    /// Creates options that inherit everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Override::Set(timeout);
        self
    }

    /// Overrides the retry options
    pub fn with_retry(mut self, retry: Option<RetryOptions>) -> Self {
        self.retry = Override::Set(retry);
        self
    }

    /// Adds a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// What the raw call is told about the attempt it is performing
#[derive(Debug, Clone, PartialEq)]
pub struct CallContext {
    /// Absolute point after which no further attempt is made
    pub deadline: Instant,
    /// Timeout for this attempt, never past `deadline`
    pub timeout: Duration,
    /// 1-based attempt number
    pub attempt: u32,
    pub metadata: Metadata,
}
