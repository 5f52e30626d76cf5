// crates/resilience/src/error.rs
//! Error types for decorated calls

use crate::status::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Result type for decorated calls
pub type CallResult<T> = Result<T, CallError>;

/// Errors that can be produced by a raw or decorated call
///
/// The type is `Clone` so a single batch failure can be delivered to every
/// waiting [`ResultFuture`](crate::ResultFuture).
#[derive(Debug, Clone, Error)]
pub enum CallError {
    /// Failure reported by the transport, classified with a status code
    #[error("Transport error {code}: {message}")]
    Transport { code: StatusCode, message: String },

    /// The retry deadline passed while the last failure was still retryable
    #[error("Retry deadline of {timeout:?} exceeded after {attempts} attempts: {cause}")]
    RetryExhausted {
        attempts: usize,
        timeout: Duration,
        #[source]
        cause: Box<CallError>,
    },

    /// Bundling and page streaming were both configured
    #[error("Incompatible call settings: {0}")]
    BundlingConfig(String),

    /// Any failure that did not come from the transport
    #[error("{0}")]
    Unknown(Arc<dyn std::error::Error + Send + Sync>),

    /// Uniform envelope around an uncaught call failure
    #[error("API call failed: {message}")]
    Api {
        message: String,
        #[source]
        cause: Box<CallError>,
    },
}

impl CallError {
    /// Creates a classified transport error
    pub fn transport(code: StatusCode, message: impl Into<String>) -> Self {
        CallError::Transport {
            code,
            message: message.into(),
        }
    }

    /// Wraps a non-transport error
    pub fn unknown<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        CallError::Unknown(Arc::new(error))
    }

    /// Wraps a plain message as a non-transport error
    pub fn unknown_message(message: impl Into<String>) -> Self {
        let message: String = message.into();
        CallError::Unknown(Arc::from(Box::<dyn std::error::Error + Send + Sync>::from(
            message,
        )))
    }

    /// Returns the status code when this is a classified transport error,
    /// looking through the [`CallError::Api`] envelope
    pub fn code(&self) -> Option<StatusCode> {
        match self.unwrap_envelope() {
            CallError::Transport { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns true if this is a transport error whose code is in `codes`
    pub fn is_retryable_in<'a, I>(&self, codes: I) -> bool
    where
        I: IntoIterator<Item = &'a StatusCode>,
    {
        match self.code() {
            Some(code) => codes.into_iter().any(|c| *c == code),
            None => false,
        }
    }

    /// Returns true if retrying stopped because the deadline passed
    pub fn is_retry_exhausted(&self) -> bool {
        matches!(self.unwrap_envelope(), CallError::RetryExhausted { .. })
    }

    /// Strips the [`CallError::Api`] envelope, if any
    pub fn unwrap_envelope(&self) -> &CallError {
        match self {
            CallError::Api { cause, .. } => cause.unwrap_envelope(),
            other => other,
        }
    }

    /// Follows envelopes and retry wrappers down to the original failure
    pub fn root_cause(&self) -> &CallError {
        match self {
            CallError::Api { cause, .. } | CallError::RetryExhausted { cause, .. } => {
                cause.root_cause()
            }
            other => other,
        }
    }
}
