//! Error types for client configuration

use std::path::PathBuf;
use thiserror::Error;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that can occur while loading or applying a client configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to write config file
    #[error("Failed to write config file at {path}: {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to parse a TOML config file
    #[error("Failed to parse config file at {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// Failed to parse a JSON config file
    #[error("Failed to parse JSON config file at {path}: {source}")]
    JsonParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Config text is not valid TOML
    #[error("Invalid config: {0}")]
    InvalidToml(#[from] toml::de::Error),

    /// Failed to serialize config
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// Config contains invalid values or dangling references
    #[error("Config validation failed: {0}")]
    ValidationError(String),

    /// No method with this name is configured
    #[error("No configuration for method '{0}'")]
    UnknownMethod(String),

    /// Generic I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ConfigError {
    /// Joins field-level errors into one validation error
    pub fn from_validation(errors: &[ValidationError]) -> Self {
        ConfigError::ValidationError(
            errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// Validation error for a specific config field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Path to the field (e.g., "methods.publish.timeout_millis")
    pub field: String,

    /// Human-readable error message
    pub message: String,

    /// The invalid value, if available
    pub value: Option<String>,
}

impl ValidationError {
    /// Creates a new validation error
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            value: None,
        }
    }

    /// Creates a validation error with the invalid value
    pub fn with_value(
        field: impl Into<String>,
        message: impl Into<String>,
        value: impl ToString,
    ) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            value: Some(value.to_string()),
        }
    }

    /// Prefixes the field path, e.g. `bundling.x` within `methods.publish`
    pub fn within(mut self, prefix: &str) -> Self {
        self.field = format!("{}.{}", prefix, self.field);
        self
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Field '{}': {}", self.field, self.message)?;
        if let Some(ref value) = self.value {
            write!(f, " (got: {})", value)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_with_value() {
        let err = ValidationError::with_value("timeout_millis", "must be positive", 0);
        assert_eq!(
            err.to_string(),
            "Field 'timeout_millis': must be positive (got: 0)"
        );
    }

    #[test]
    fn test_within_prefixes_field() {
        let err = ValidationError::new("bundling.bundled_field", "must not be empty")
            .within("methods.publish");
        assert_eq!(err.field, "methods.publish.bundling.bundled_field");
    }

    #[test]
    fn test_from_validation_joins() {
        let err = ConfigError::from_validation(&[
            ValidationError::new("a", "bad"),
            ValidationError::new("b", "worse"),
        ]);
        assert_eq!(
            err.to_string(),
            "Config validation failed: Field 'a': bad; Field 'b': worse"
        );
    }

    #[test]
    fn test_unknown_method_display() {
        let err = ConfigError::UnknownMethod("DeleteShelf".to_string());
        assert!(err.to_string().contains("DeleteShelf"));
    }
}
