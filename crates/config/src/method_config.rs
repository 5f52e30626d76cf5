//! Per-method call configuration section

use crate::validation::{ConfigSection, ValidationError, Validator};
use callwright_resilience::{BundleDescriptor, BundleThresholds};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How one method is called
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MethodConfig {
    /// Timeout of a single attempt when the method is not retried
    pub timeout_millis: u64,

    /// Name of the retry code set, if the method is retried
    pub retry_codes_name: Option<String>,

    /// Name of the backoff parameters; the defaults apply when unset
    pub retry_params_name: Option<String>,

    /// Request bundling, if enabled for the method
    pub bundling: Option<BundlingConfig>,
}

impl MethodConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_millis)
    }
}

impl Default for MethodConfig {
    fn default() -> Self {
        Self {
            timeout_millis: 30_000,
            retry_codes_name: None,
            retry_params_name: None,
            bundling: None,
        }
    }
}

impl ConfigSection for MethodConfig {
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        if let Err(e) = Validator::in_range(self.timeout_millis, 1, u64::MAX, "timeout_millis") {
            errors.push(e);
        }
        if let Some(bundling) = &self.bundling {
            if let Err(e) = bundling.validate() {
                errors.extend(e.into_iter().map(|e| e.within("bundling")));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn merge(&mut self, other: Self) {
        self.timeout_millis = other.timeout_millis;
        self.retry_codes_name = other.retry_codes_name;
        self.retry_params_name = other.retry_params_name;
        match (&mut self.bundling, other.bundling) {
            (Some(base), Some(other)) => base.merge(other),
            (base, other) => *base = other,
        }
    }

    fn section_name(&self) -> &'static str {
        "methods"
    }
}

/// Bundling descriptor and thresholds; zero disables a threshold
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct BundlingConfig {
    pub element_count_threshold: usize,
    pub element_count_limit: usize,
    pub request_byte_threshold: usize,
    pub request_byte_limit: usize,
    pub delay_threshold_millis: u64,

    /// Dotted path of the repeated request field to concatenate
    pub bundled_field: String,

    /// Dotted paths of the fields that partition bundles
    pub discriminator_fields: Vec<String>,

    /// Dotted path of the repeated response field to split
    pub subresponse_field: Option<String>,
}

impl BundlingConfig {
    pub fn descriptor(&self) -> BundleDescriptor {
        let descriptor = self
            .discriminator_fields
            .iter()
            .fold(BundleDescriptor::new(self.bundled_field.as_str()), |d, field| {
                d.with_discriminator(field.as_str())
            });
        match &self.subresponse_field {
            Some(field) => descriptor.with_subresponse_field(field.as_str()),
            None => descriptor,
        }
    }

    pub fn thresholds(&self) -> BundleThresholds {
        BundleThresholds::new()
            .with_element_count(self.element_count_threshold)
            .with_request_bytes(self.request_byte_threshold)
            .with_delay(Duration::from_millis(self.delay_threshold_millis))
            .with_limits(self.element_count_limit, self.request_byte_limit)
    }
}

impl ConfigSection for BundlingConfig {
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut results = vec![Validator::not_empty(&self.bundled_field, "bundled_field")];
        for (i, field) in self.discriminator_fields.iter().enumerate() {
            results.push(Validator::not_empty(
                field,
                &format!("discriminator_fields[{}]", i),
            ));
        }
        if let Some(field) = &self.subresponse_field {
            results.push(Validator::not_empty(field, "subresponse_field"));
        }
        if !self.thresholds().has_trigger() {
            results.push(Err(ValidationError::new(
                "element_count_threshold",
                "at least one of element_count_threshold, request_byte_threshold or delay_threshold_millis must be set",
            )));
        }
        if self.element_count_limit > 0 {
            results.push(Validator::at_most(
                self.element_count_threshold,
                self.element_count_limit,
                "element_count_threshold",
                "element_count_limit",
            ));
        }
        if self.request_byte_limit > 0 {
            results.push(Validator::at_most(
                self.request_byte_threshold,
                self.request_byte_limit,
                "request_byte_threshold",
                "request_byte_limit",
            ));
        }
        Validator::collect_errors(results)
    }

    fn merge(&mut self, other: Self) {
        *self = other;
    }

    fn section_name(&self) -> &'static str {
        "bundling"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callwright_resilience::FieldPath;

    fn publish_bundling() -> BundlingConfig {
        BundlingConfig {
            element_count_threshold: 100,
            request_byte_threshold: 1024,
            delay_threshold_millis: 10,
            bundled_field: "messages".to_string(),
            discriminator_fields: vec!["topic".to_string()],
            subresponse_field: Some("message_ids".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_method_is_valid() {
        assert!(MethodConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_timeout_invalid() {
        let config = MethodConfig {
            timeout_millis: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_descriptor_and_thresholds() {
        let bundling = publish_bundling();
        let descriptor = bundling.descriptor();
        assert_eq!(descriptor.bundled_field, FieldPath::new("messages"));
        assert_eq!(descriptor.discriminator_fields, vec![FieldPath::new("topic")]);
        assert_eq!(descriptor.subresponse_field, Some(FieldPath::new("message_ids")));

        let thresholds = bundling.thresholds();
        assert_eq!(thresholds.element_count_threshold, 100);
        assert_eq!(thresholds.delay_threshold, Duration::from_millis(10));
        assert!(!thresholds.has_limits());
    }

    #[test]
    fn test_bundling_without_trigger_invalid() {
        let bundling = BundlingConfig {
            bundled_field: "messages".to_string(),
            ..Default::default()
        };
        let errors = bundling.validate().unwrap_err();
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_bundling_errors_are_prefixed() {
        let config = MethodConfig {
            bundling: Some(BundlingConfig {
                bundled_field: String::new(),
                ..publish_bundling()
            }),
            ..Default::default()
        };
        let errors = config.validate().unwrap_err();
        assert_eq!(errors[0].field, "bundling.bundled_field");
    }

    #[test]
    fn test_threshold_above_limit_invalid() {
        let bundling = BundlingConfig {
            element_count_limit: 50,
            ..publish_bundling()
        };
        assert!(bundling.validate().is_err());
    }

    #[test]
    fn test_merge_takes_other_bundling() {
        let mut base = MethodConfig {
            bundling: Some(publish_bundling()),
            ..Default::default()
        };
        let other = MethodConfig {
            timeout_millis: 5_000,
            ..Default::default()
        };
        base.merge(other);
        assert_eq!(base.timeout_millis, 5_000);
        assert!(base.bundling.is_none());
    }
}
