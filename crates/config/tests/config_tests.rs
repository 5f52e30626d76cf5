//! Integration tests for loading client configs and composing calls from them

use callwright_config::{ClientConfig, ConfigError, CONFIG_VERSION};
use callwright_resilience::{
    raw_call, ApiCallable, CallContext, CallError, ManualClock, StatusCode,
};
use serde_json::{json, Value};
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const PUBSUB_CONFIG: &str = r#"
version = 1

[retry_codes]
idempotent = ["DEADLINE_EXCEEDED", "UNAVAILABLE"]
non_idempotent = []

[retry_params.messaging]
initial_retry_delay_millis = 100
retry_delay_multiplier = 1.3
max_retry_delay_millis = 60000
initial_rpc_timeout_millis = 12000
rpc_timeout_multiplier = 1.0
max_rpc_timeout_millis = 12000
total_timeout_millis = 1000

[methods.Pull]
timeout_millis = 12000
retry_codes_name = "idempotent"
retry_params_name = "messaging"

[methods.Publish]
timeout_millis = 12000
retry_codes_name = "non_idempotent"

[methods.Publish.bundling]
element_count_threshold = 3
element_count_limit = 1000
request_byte_threshold = 1024
request_byte_limit = 10485760
delay_threshold_millis = 1000
bundled_field = "messages"
discriminator_fields = ["topic"]
subresponse_field = "message_ids"
"#;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn write_config(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).expect("write config");
    path
}

#[test]
fn test_load_from_file() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let temp_dir = TempDir::new()?;
    let path = write_config(&temp_dir, "pubsub.toml", PUBSUB_CONFIG);

    let config = ClientConfig::load(&path)?;
    assert_eq!(config.version, CONFIG_VERSION);
    assert_eq!(config.method_names().collect::<Vec<_>>(), vec!["Publish", "Pull"]);

    Ok(())
}

#[test]
fn test_missing_file_is_error() {
    let temp_dir = TempDir::new().expect("temp dir");
    let result = ClientConfig::load(temp_dir.path().join("absent.toml"));
    assert!(matches!(result, Err(ConfigError::ReadError { .. })));
}

#[test]
fn test_empty_file_is_error() {
    let temp_dir = TempDir::new().expect("temp dir");
    let path = write_config(&temp_dir, "empty.toml", "  \n");
    assert!(matches!(ClientConfig::load(&path), Err(ConfigError::ReadError { .. })));
}

#[test]
fn test_corrupted_file_reports_path() {
    let temp_dir = TempDir::new().expect("temp dir");
    let path = write_config(&temp_dir, "broken.toml", "this is not valid TOML {{{");

    match ClientConfig::load(&path) {
        Err(ConfigError::ParseError { path: reported, .. }) => assert_eq!(reported, path),
        other => panic!("expected parse error, got {other:?}"),
    }
}

#[test]
fn test_invalid_values_are_rejected_on_load() {
    let temp_dir = TempDir::new().expect("temp dir");
    let path = write_config(
        &temp_dir,
        "invalid.toml",
        r#"
        [retry_params.fast]
        retry_delay_multiplier = 0.1

        [methods.Pull]
        retry_codes_name = "idempotent"
        retry_params_name = "fast"
        "#,
    );

    match ClientConfig::load(&path) {
        Err(ConfigError::ValidationError(message)) => {
            assert!(message.contains("retry_params.fast.retry_delay_multiplier"));
            assert!(message.contains("methods.Pull.retry_codes_name"));
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn test_load_json() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = TempDir::new()?;
    let path = write_config(
        &temp_dir,
        "client.json",
        r#"{
            "retry_codes": {"idempotent": [4, "UNAVAILABLE"]},
            "methods": {"Pull": {"timeout_millis": 2000, "retry_codes_name": "idempotent"}}
        }"#,
    );

    let config = ClientConfig::load(&path)?;
    let settings = config.call_settings("Pull")?;
    let codes = settings.retry.map(|r| r.retry_codes.len());
    assert_eq!(codes, Some(2));

    Ok(())
}

#[test]
fn test_save_and_reload() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let temp_dir = TempDir::new()?;
    let config = ClientConfig::from_toml_str(PUBSUB_CONFIG)?;
    let path = temp_dir.path().join("saved.toml");

    config.save(&path)?;
    let reloaded = ClientConfig::load(&path)?;
    assert_eq!(reloaded, config);

    Ok(())
}

#[test]
fn test_configured_retry_drives_callable() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let config = ClientConfig::from_toml_str(PUBSUB_CONFIG)?;
    let settings = config.call_settings("Pull")?;

    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let call = raw_call::<Value, Value, _>(move |_req: &Value, ctx: &CallContext| {
        counter.fetch_add(1, Ordering::SeqCst);
        assert!(ctx.timeout <= Duration::from_secs(1));
        Err(CallError::transport(StatusCode::Unavailable, "unavailable"))
    });
    let clock = ManualClock::new();
    let callable = ApiCallable::new(call, settings)?.with_clock(Arc::new(clock.clone()));

    let err = callable.call(json!({"subscription": "s"}), None).unwrap_err();
    assert!(err.is_retry_exhausted());
    assert!(attempts.load(Ordering::SeqCst) > 1);
    assert!(clock.sleeps().iter().all(|d| *d <= Duration::from_secs(60)));

    Ok(())
}

#[test]
fn test_configured_bundling_drives_callable() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let config = ClientConfig::from_toml_str(PUBSUB_CONFIG)?;
    let settings = config.call_settings("Publish")?;

    let call = raw_call(|req: &Value, _ctx: &CallContext| {
        let n = req["messages"].as_array().map_or(0, Vec::len);
        let ids: Vec<String> = (0..n).map(|i| format!("m{i}")).collect();
        Ok(json!({"message_ids": ids}))
    });
    let callable = ApiCallable::new(call, settings)?;

    let outcomes = ["a", "b", "c"]
        .into_iter()
        .map(|m| callable.call(json!({"topic": "t", "messages": [m]}), None))
        .collect::<Result<Vec<_>, _>>()?;

    let ids: Vec<Value> = outcomes
        .into_iter()
        .filter_map(|o| o.wait(Some(Duration::ZERO)))
        .filter_map(Result::ok)
        .map(|resp| resp["message_ids"].clone())
        .collect();
    assert_eq!(ids, vec![json!(["m0"]), json!(["m1"]), json!(["m2"])]);

    Ok(())
}
