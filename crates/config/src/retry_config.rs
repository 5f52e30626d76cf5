//! Retry code sets and backoff parameter sections

use crate::validation::{ConfigSection, ValidationError, Validator};
use callwright_resilience::{BackoffSettings, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// A status code written either as its name or as its integer value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CodeRef {
    Number(i32),
    Name(String),
}

impl CodeRef {
    /// Resolves to a status code; `field` is used for the error
    pub fn resolve(&self, field: &str) -> Result<StatusCode, ValidationError> {
        match self {
            CodeRef::Number(n) => StatusCode::from_code(*n)
                .ok_or_else(|| ValidationError::with_value(field, "unknown status code", n)),
            CodeRef::Name(name) => name
                .parse()
                .map_err(|_| ValidationError::with_value(field, "unknown status code", name)),
        }
    }
}

impl From<StatusCode> for CodeRef {
    fn from(code: StatusCode) -> Self {
        CodeRef::Name(code.as_str().to_string())
    }
}

impl fmt::Display for CodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodeRef::Number(n) => write!(f, "{}", n),
            CodeRef::Name(name) => f.write_str(name),
        }
    }
}

/// Resolves every code of a named set
pub fn resolve_codes(name: &str, codes: &[CodeRef]) -> Result<Vec<StatusCode>, Vec<ValidationError>> {
    let mut resolved = Vec::with_capacity(codes.len());
    let mut errors = Vec::new();
    for (i, code) in codes.iter().enumerate() {
        match code.resolve(&format!("retry_codes.{}[{}]", name, i)) {
            Ok(code) => resolved.push(code),
            Err(e) => errors.push(e),
        }
    }
    if errors.is_empty() {
        Ok(resolved)
    } else {
        Err(errors)
    }
}

/// Backoff parameters, in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryParams {
    /// Delay before the first retry
    pub initial_retry_delay_millis: u64,

    /// Growth factor applied to the delay after each retry
    pub retry_delay_multiplier: f64,

    /// Upper bound on the delay
    pub max_retry_delay_millis: u64,

    /// Timeout of the first attempt
    pub initial_rpc_timeout_millis: u64,

    /// Growth factor applied to the attempt timeout after each retry
    pub rpc_timeout_multiplier: f64,

    /// Upper bound on the attempt timeout
    pub max_rpc_timeout_millis: u64,

    /// Overall retry deadline, measured from the first attempt
    pub total_timeout_millis: u64,
}

impl RetryParams {
    /// Converts to the backoff settings used by the retry engine
    pub fn to_backoff(&self) -> BackoffSettings {
        BackoffSettings::new(Duration::from_millis(self.total_timeout_millis))
            .with_delays(
                Duration::from_millis(self.initial_retry_delay_millis),
                self.retry_delay_multiplier,
                Duration::from_millis(self.max_retry_delay_millis),
            )
            .with_rpc_timeouts(
                Duration::from_millis(self.initial_rpc_timeout_millis),
                self.rpc_timeout_multiplier,
                Duration::from_millis(self.max_rpc_timeout_millis),
            )
    }
}

impl Default for RetryParams {
    fn default() -> Self {
        Self {
            initial_retry_delay_millis: 100,
            retry_delay_multiplier: 1.3,
            max_retry_delay_millis: 60_000,
            initial_rpc_timeout_millis: 20_000,
            rpc_timeout_multiplier: 1.0,
            max_rpc_timeout_millis: 20_000,
            total_timeout_millis: 600_000,
        }
    }
}

impl ConfigSection for RetryParams {
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        Validator::collect_errors(vec![
            Validator::in_range(
                self.retry_delay_multiplier,
                1.0,
                10.0,
                "retry_delay_multiplier",
            ),
            Validator::in_range(
                self.rpc_timeout_multiplier,
                1.0,
                10.0,
                "rpc_timeout_multiplier",
            ),
            Validator::at_most(
                self.initial_retry_delay_millis,
                self.max_retry_delay_millis,
                "initial_retry_delay_millis",
                "max_retry_delay_millis",
            ),
            Validator::at_most(
                self.initial_rpc_timeout_millis,
                self.max_rpc_timeout_millis,
                "initial_rpc_timeout_millis",
                "max_rpc_timeout_millis",
            ),
            Validator::in_range(
                self.total_timeout_millis,
                1,
                u64::MAX,
                "total_timeout_millis",
            ),
        ])
    }

    fn merge(&mut self, other: Self) {
        self.initial_retry_delay_millis = other.initial_retry_delay_millis;
        self.retry_delay_multiplier = other.retry_delay_multiplier;
        self.max_retry_delay_millis = other.max_retry_delay_millis;
        self.initial_rpc_timeout_millis = other.initial_rpc_timeout_millis;
        self.rpc_timeout_multiplier = other.rpc_timeout_multiplier;
        self.max_rpc_timeout_millis = other.max_rpc_timeout_millis;
        self.total_timeout_millis = other.total_timeout_millis;
    }

    fn section_name(&self) -> &'static str {
        "retry_params"
    }
}
