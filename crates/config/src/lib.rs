//! Client configuration for decorated calls
//!
//! A client configuration names retry code sets and backoff parameter sets
//! once and lets each method refer to them by name. It is read from TOML
//! (or JSON) and turned into the [`CallSettings`] a method is composed with.
//!
//! # Example
//!
//! ```rust
//! use callwright_config::ClientConfig;
//!
//! let config = ClientConfig::from_toml_str(r#"
//!     [retry_codes]
//!     idempotent = ["DEADLINE_EXCEEDED", "UNAVAILABLE"]
//!
//!     [retry_params.default]
//!     total_timeout_millis = 60000
//!
//!     [methods.GetShelf]
//!     retry_codes_name = "idempotent"
//!     retry_params_name = "default"
//! "#).expect("valid config");
//!
//! let settings = config.call_settings("GetShelf").expect("known method");
//! assert!(settings.retries_enabled());
//! ```

mod error;
mod method_config;
mod retry_config;
mod validation;

pub use error::{ConfigError, ConfigResult, ValidationError};
pub use method_config::{BundlingConfig, MethodConfig};
pub use retry_config::{resolve_codes, CodeRef, RetryParams};
pub use validation::{ConfigSection, Validator};

use callwright_resilience::{BackoffSettings, CallSettings, RetryOptions};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Current config file format version
pub const CONFIG_VERSION: u32 = 1;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Config file format version
    pub version: u32,

    /// Named sets of retryable status codes
    pub retry_codes: BTreeMap<String, Vec<CodeRef>>,

    /// Named backoff parameter sets
    pub retry_params: BTreeMap<String, RetryParams>,

    /// Per-method settings, keyed by method name
    pub methods: BTreeMap<String, MethodConfig>,
}

impl ClientConfig {
    /// Creates an empty config
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and validates a TOML config
    pub fn from_toml_str(contents: &str) -> ConfigResult<Self> {
        let config: ClientConfig = toml::from_str(contents)?;
        config.check()?;
        Ok(config)
    }

    /// Loads and validates a config file
    ///
    /// Files ending in `.json` are parsed as JSON, anything else as TOML.
    /// A missing or empty file is an error.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        if contents.trim().is_empty() {
            return Err(ConfigError::ReadError {
                path: path.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "Config file is empty or contains only whitespace",
                ),
            });
        }

        let is_json = path.extension().is_some_and(|ext| ext == "json");
        let config: ClientConfig = if is_json {
            serde_json::from_str(&contents).map_err(|e| ConfigError::JsonParseError {
                path: path.to_path_buf(),
                source: e,
            })?
        } else {
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
                path: path.to_path_buf(),
                source: e,
            })?
        };

        if let Err(e) = config.check() {
            log::warn!("Rejecting client config at {}: {}", path.display(), e);
            return Err(e);
        }
        log::info!(
            "Loaded client config from {} ({} methods)",
            path.display(),
            config.methods.len()
        );
        Ok(config)
    }

    /// Writes the config as TOML, atomically replacing `path`
    pub fn save(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let path = path.as_ref();
        self.check()?;
        let contents = self.to_toml_string()?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut temp_file = NamedTempFile::new_in(dir)?;
        temp_file.write_all(contents.as_bytes())?;
        temp_file.flush()?;
        temp_file
            .persist(path)
            .map_err(|e| ConfigError::WriteError {
                path: path.to_path_buf(),
                source: e.error,
            })?;

        log::info!("Client config saved to {}", path.display());
        Ok(())
    }

    /// Serializes the config as TOML
    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validates every section and every name reference
    ///
    /// Returns all validation errors found across all sections.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = Validator::in_range(self.version, 1, CONFIG_VERSION, "version") {
            errors.push(e);
        }

        for (name, codes) in &self.retry_codes {
            if let Err(mut e) = resolve_codes(name, codes) {
                errors.append(&mut e);
            }
        }

        for (name, params) in &self.retry_params {
            if let Err(e) = params.validate() {
                let prefix = format!("{}.{}", params.section_name(), name);
                errors.extend(e.into_iter().map(|e| e.within(&prefix)));
            }
        }

        for (name, method) in &self.methods {
            let prefix = format!("{}.{}", method.section_name(), name);
            if let Err(e) = method.validate() {
                errors.extend(e.into_iter().map(|e| e.within(&prefix)));
            }
            if let Some(codes_name) = &method.retry_codes_name {
                if let Err(e) = Validator::defined(
                    codes_name,
                    self.retry_codes.keys(),
                    &format!("{}.retry_codes_name", prefix),
                ) {
                    errors.push(e);
                }
            }
            if let Some(params_name) = &method.retry_params_name {
                if let Err(e) = Validator::defined(
                    params_name,
                    self.retry_params.keys(),
                    &format!("{}.retry_params_name", prefix),
                ) {
                    errors.push(e);
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Merges this config with another, preferring values from `other`
    ///
    /// Named entries present in both are merged section by section; entries
    /// only in `other` are added.
    pub fn merge(&mut self, other: ClientConfig) {
        self.version = other.version;
        self.retry_codes.extend(other.retry_codes);
        merge_sections(&mut self.retry_params, other.retry_params);
        merge_sections(&mut self.methods, other.methods);
    }

    /// Names of the configured methods
    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    /// Builds the call settings for `method`
    ///
    /// A method naming retry codes is retried with its named backoff
    /// parameters, or the default parameters when none are named. A method
    /// without retry codes gets a single attempt bounded by its timeout.
    pub fn call_settings(&self, method: &str) -> ConfigResult<CallSettings> {
        let config = self
            .methods
            .get(method)
            .ok_or_else(|| ConfigError::UnknownMethod(method.to_string()))?;
        let prefix = format!("methods.{}", method);

        let mut settings = CallSettings::new(config.timeout());

        if let Some(codes_name) = &config.retry_codes_name {
            let codes = self.retry_codes.get(codes_name).ok_or_else(|| {
                ConfigError::from_validation(&[ValidationError::with_value(
                    format!("{}.retry_codes_name", prefix),
                    "names an undefined retry code set",
                    codes_name,
                )])
            })?;
            let codes = resolve_codes(codes_name, codes)
                .map_err(|errors| ConfigError::from_validation(&errors))?;

            let backoff = match &config.retry_params_name {
                Some(params_name) => self
                    .retry_params
                    .get(params_name)
                    .map(RetryParams::to_backoff)
                    .ok_or_else(|| {
                        ConfigError::from_validation(&[ValidationError::with_value(
                            format!("{}.retry_params_name", prefix),
                            "names an undefined retry parameter set",
                            params_name,
                        )])
                    })?,
                None => BackoffSettings::default(),
            };

            settings = settings.with_retry(RetryOptions::new(codes, backoff));
        }

        if let Some(bundling) = &config.bundling {
            settings = settings.with_bundling(bundling.descriptor(), bundling.thresholds());
        }

        Ok(settings)
    }

    fn check(&self) -> ConfigResult<()> {
        self.validate()
            .map_err(|errors| ConfigError::from_validation(&errors))
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            retry_codes: BTreeMap::new(),
            retry_params: BTreeMap::new(),
            methods: BTreeMap::new(),
        }
    }
}

fn merge_sections<S: ConfigSection>(base: &mut BTreeMap<String, S>, other: BTreeMap<String, S>) {
    for (name, section) in other {
        match base.get_mut(&name) {
            Some(existing) => existing.merge(section),
            None => {
                base.insert(name, section);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callwright_resilience::StatusCode;
    use std::time::Duration;

    const LIBRARY_CONFIG: &str = r#"
        version = 1

        [retry_codes]
        idempotent = ["DEADLINE_EXCEEDED", 14]
        non_idempotent = []

        [retry_params.default]
        initial_retry_delay_millis = 100
        retry_delay_multiplier = 1.3
        max_retry_delay_millis = 60000
        initial_rpc_timeout_millis = 20000
        rpc_timeout_multiplier = 1.0
        max_rpc_timeout_millis = 20000
        total_timeout_millis = 600000

        [methods.GetShelf]
        timeout_millis = 10000
        retry_codes_name = "idempotent"
        retry_params_name = "default"

        [methods.CreateShelf]
        timeout_millis = 5000
        retry_codes_name = "non_idempotent"

        [methods.PublishSeries]
        [methods.PublishSeries.bundling]
        element_count_threshold = 6
        delay_threshold_millis = 50
        bundled_field = "books"
        discriminator_fields = ["shelf.name"]
        subresponse_field = "book_names"
    "#;

    #[test]
    fn test_default_config_is_valid() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.version, CONFIG_VERSION);
    }

    #[test]
    fn test_parse_and_build_retrying_method() {
        let config = ClientConfig::from_toml_str(LIBRARY_CONFIG).expect("valid config");
        let settings = config.call_settings("GetShelf").expect("known method");

        assert_eq!(settings.timeout, Duration::from_secs(10));
        let retry = settings.retry.expect("retry configured");
        assert_eq!(
            retry.retry_codes.into_iter().collect::<Vec<_>>(),
            vec![StatusCode::DeadlineExceeded, StatusCode::Unavailable]
        );
        assert_eq!(retry.backoff.total_timeout, Duration::from_secs(600));
    }

    #[test]
    fn test_empty_code_set_disables_retry() {
        let config = ClientConfig::from_toml_str(LIBRARY_CONFIG).expect("valid config");
        let settings = config.call_settings("CreateShelf").expect("known method");
        assert!(!settings.retries_enabled());
        assert_eq!(settings.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_bundled_method() {
        let config = ClientConfig::from_toml_str(LIBRARY_CONFIG).expect("valid config");
        let settings = config.call_settings("PublishSeries").expect("known method");
        let bundling = settings.bundling.expect("bundling configured");
        assert_eq!(bundling.thresholds.element_count_threshold, 6);
        assert_eq!(bundling.descriptor.discriminator_fields.len(), 1);
        assert_eq!(settings.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_unknown_method() {
        let config = ClientConfig::from_toml_str(LIBRARY_CONFIG).expect("valid config");
        assert!(matches!(
            config.call_settings("DeleteShelf"),
            Err(ConfigError::UnknownMethod(name)) if name == "DeleteShelf"
        ));
    }

    #[test]
    fn test_dangling_reference_is_invalid() {
        let result = ClientConfig::from_toml_str(
            r#"
            [methods.GetShelf]
            retry_codes_name = "missing"
            "#,
        );
        match result {
            Err(ConfigError::ValidationError(message)) => {
                assert!(message.contains("methods.GetShelf.retry_codes_name"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_code_name_is_invalid() {
        let result = ClientConfig::from_toml_str(
            r#"
            [retry_codes]
            idempotent = ["SOMETIMES"]
            "#,
        );
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_malformed_toml() {
        let result = ClientConfig::from_toml_str("[methods.GetShelf\ntimeout_millis = ");
        assert!(matches!(result, Err(ConfigError::InvalidToml(_))));
    }

    #[test]
    fn test_merge_other_wins() {
        let mut base = ClientConfig::from_toml_str(LIBRARY_CONFIG).expect("valid config");
        let overrides = ClientConfig::from_toml_str(
            r#"
            [retry_params.default]
            total_timeout_millis = 30000

            [methods.GetShelf]
            timeout_millis = 2000
            retry_codes_name = "idempotent"

            [methods.ListShelves]
            timeout_millis = 1000
            "#,
        );
        // overrides refer to a code set only the base defines
        assert!(overrides.is_err());

        let mut overrides = ClientConfig::new();
        overrides.methods.insert(
            "GetShelf".to_string(),
            MethodConfig {
                timeout_millis: 2000,
                retry_codes_name: Some("idempotent".to_string()),
                ..Default::default()
            },
        );
        overrides
            .methods
            .insert("ListShelves".to_string(), MethodConfig::default());

        base.merge(overrides);
        assert!(base.validate().is_ok());
        assert_eq!(base.methods.len(), 4);

        let settings = base.call_settings("GetShelf").expect("known method");
        assert_eq!(settings.timeout, Duration::from_secs(2));
        // retry_params_name was cleared by the override
        assert_eq!(
            settings.retry.map(|r| r.backoff),
            Some(BackoffSettings::default())
        );
    }

    #[test]
    fn test_toml_round_trip_keeps_settings() {
        let config = ClientConfig::from_toml_str(LIBRARY_CONFIG).expect("valid config");
        let text = config.to_toml_string().expect("serializable");
        let reparsed = ClientConfig::from_toml_str(&text).expect("valid config");
        assert_eq!(
            reparsed.call_settings("PublishSeries").ok(),
            config.call_settings("PublishSeries").ok()
        );
    }
}
