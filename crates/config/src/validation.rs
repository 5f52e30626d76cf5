//! Validation system for configuration values
//!
//! Each config section implements the `ConfigSection` trait. Field paths in
//! the errors it reports are relative to the section; the enclosing config
//! prefixes them with [`ValidationError::within`].

pub use crate::error::ValidationError;

/// Trait for configuration sections that can validate themselves
pub trait ConfigSection: Default {
    /// Validates the configuration section
    ///
    /// Returns every violation found, not just the first.
    fn validate(&self) -> Result<(), Vec<ValidationError>>;

    /// Merges another config section into this one
    ///
    /// Values from `other` take precedence. This is used for override chains.
    fn merge(&mut self, other: Self);

    /// Returns the section name for error reporting
    fn section_name(&self) -> &'static str;
}

/// Common validators for config values
pub struct Validator;

impl Validator {
    /// Validates that a numeric value is within a range
    pub fn in_range<T>(value: T, min: T, max: T, field: &str) -> Result<(), ValidationError>
    where
        T: PartialOrd + std::fmt::Display + Copy,
    {
        if value < min || value > max {
            Err(ValidationError::with_value(
                field,
                format!("must be between {} and {}", min, max),
                value,
            ))
        } else {
            Ok(())
        }
    }

    /// Validates that `value` does not exceed `max`, naming the other field
    pub fn at_most<T>(value: T, max: T, field: &str, max_field: &str) -> Result<(), ValidationError>
    where
        T: PartialOrd + std::fmt::Display + Copy,
    {
        if value > max {
            Err(ValidationError::with_value(
                field,
                format!("must not exceed {} ({})", max_field, max),
                value,
            ))
        } else {
            Ok(())
        }
    }

    /// Validates that a string is not empty
    pub fn not_empty(value: &str, field: &str) -> Result<(), ValidationError> {
        if value.trim().is_empty() {
            Err(ValidationError::new(field, "must not be empty"))
        } else {
            Ok(())
        }
    }

    /// Validates that a name refers to one of the defined entries
    pub fn defined<'a, I>(name: &str, defined: I, field: &str) -> Result<(), ValidationError>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let defined: Vec<&String> = defined.into_iter().collect();
        if defined.iter().any(|d| d.as_str() == name) {
            Ok(())
        } else {
            let allowed = defined
                .iter()
                .map(|d| d.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            Err(ValidationError::with_value(
                field,
                format!("must name one of: [{}]", allowed),
                name,
            ))
        }
    }

    /// Collects multiple validation results into a single result
    pub fn collect_errors(
        results: Vec<Result<(), ValidationError>>,
    ) -> Result<(), Vec<ValidationError>> {
        let errors: Vec<ValidationError> = results.into_iter().filter_map(|r| r.err()).collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_range() {
        assert!(Validator::in_range(1.3, 1.0, 10.0, "test").is_ok());
        assert!(Validator::in_range(1.0, 1.0, 10.0, "test").is_ok());
        assert!(Validator::in_range(0.5, 1.0, 10.0, "test").is_err());
    }

    #[test]
    fn test_at_most() {
        assert!(Validator::at_most(100, 200, "initial", "max").is_ok());
        let err = Validator::at_most(300, 200, "initial", "max").unwrap_err();
        assert_eq!(err.to_string(), "Field 'initial': must not exceed max (200) (got: 300)");
    }

    #[test]
    fn test_not_empty() {
        assert!(Validator::not_empty("messages", "test").is_ok());
        assert!(Validator::not_empty("   ", "test").is_err());
    }

    #[test]
    fn test_defined() {
        let names = vec!["idempotent".to_string(), "non_idempotent".to_string()];
        assert!(Validator::defined("idempotent", &names, "test").is_ok());

        let err = Validator::defined("retry_all", &names, "test").unwrap_err();
        assert_eq!(err.value.as_deref(), Some("retry_all"));
        assert!(err.message.contains("idempotent, non_idempotent"));
    }

    #[test]
    fn test_collect_errors_some_err() {
        let results = vec![
            Ok(()),
            Err(ValidationError::new("field1", "error1")),
            Ok(()),
            Err(ValidationError::new("field2", "error2")),
        ];
        let result = Validator::collect_errors(results);
        assert_eq!(result.unwrap_err().len(), 2);
    }
}
