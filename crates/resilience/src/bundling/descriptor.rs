// crates/resilience/src/bundling/descriptor.rs
//! Which requests may be bundled together and when a bundle is sent

use crate::message::{FieldPath, Message};
use std::fmt;
use std::time::Duration;

/// Describes how requests of one method are merged into a bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleDescriptor {
    /// Repeated request field whose elements are concatenated
    pub bundled_field: FieldPath,
    /// Request fields that must match for two requests to share a bundle
    pub discriminator_fields: Vec<FieldPath>,
    /// Repeated response field holding one entry per bundled element
    pub subresponse_field: Option<FieldPath>,
}

impl BundleDescriptor {
    /// Creates a descriptor bundling `bundled_field` with no discriminators
    pub fn new(bundled_field: impl Into<FieldPath>) -> Self {
        Self {
            bundled_field: bundled_field.into(),
            discriminator_fields: Vec::new(),
            subresponse_field: None,
        }
    }

    /// Adds a discriminator field
    pub fn with_discriminator(mut self, field: impl Into<FieldPath>) -> Self {
        self.discriminator_fields.push(field.into());
        self
    }

    /// Sets the subresponse field used to split the bundled response
    pub fn with_subresponse_field(mut self, field: impl Into<FieldPath>) -> Self {
        self.subresponse_field = Some(field.into());
        self
    }

    /// Computes the key of the bundle `request` belongs to
    ///
    /// Absent discriminator fields contribute a null placeholder.
    pub fn bundle_key<M: Message>(&self, request: &M) -> BundleKey {
        BundleKey(
            self.discriminator_fields
                .iter()
                .map(|field| request.key_value(field))
                .collect(),
        )
    }
}

/// Discriminator values identifying one bundle
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BundleKey(pub Vec<Option<String>>);

impl BundleKey {
    /// Creates a key from present values
    pub fn from_values<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(values.into_iter().map(|v| Some(v.into())).collect())
    }
}

impl fmt::Display for BundleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, value) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match value {
                Some(v) => write!(f, "{v:?}")?,
                None => f.write_str("null")?,
            }
        }
        f.write_str("]")
    }
}

/// Limits that cause a bundle to be sent; zero disables a limit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BundleThresholds {
    /// Send once this many elements are bundled
    pub element_count_threshold: usize,
    /// Hard cap on elements per bundle (accepted, not enforced)
    pub element_count_limit: usize,
    /// Send once the bundled elements reach this many bytes
    pub request_byte_threshold: usize,
    /// Hard cap on bytes per bundle (accepted, not enforced)
    pub request_byte_limit: usize,
    /// Send this long after a bundle is created
    pub delay_threshold: Duration,
}

impl BundleThresholds {
    /// Thresholds that never trigger
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the element count threshold
    pub fn with_element_count(mut self, threshold: usize) -> Self {
        self.element_count_threshold = threshold;
        self
    }

    /// Sets the byte threshold
    pub fn with_request_bytes(mut self, threshold: usize) -> Self {
        self.request_byte_threshold = threshold;
        self
    }

    /// Sets the delay threshold
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay_threshold = delay;
        self
    }

    /// Sets the hard limits
    pub fn with_limits(mut self, element_count_limit: usize, request_byte_limit: usize) -> Self {
        self.element_count_limit = element_count_limit;
        self.request_byte_limit = request_byte_limit;
        self
    }

    /// True if a bundle of this size must be sent now
    pub fn is_reached(&self, element_count: usize, byte_count: usize) -> bool {
        (self.element_count_threshold > 0 && element_count >= self.element_count_threshold)
            || (self.request_byte_threshold > 0 && byte_count >= self.request_byte_threshold)
    }

    /// True if any hard limit is configured
    pub fn has_limits(&self) -> bool {
        self.element_count_limit > 0 || self.request_byte_limit > 0
    }

    /// True if at least one flush trigger is configured
    pub fn has_trigger(&self) -> bool {
        self.element_count_threshold > 0
            || self.request_byte_threshold > 0
            || !self.delay_threshold.is_zero()
    }
}
