//! Fuzzing harness for client config parsing
//!
//! Arbitrary input must only ever produce errors, never panics, including
//! when a parsed config is turned into call settings.
//! Run with: cargo fuzz run config_parser

#![no_main]
use callwright_config::ClientConfig;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(config) = ClientConfig::from_toml_str(s) {
            for method in config.method_names() {
                let _ = config.call_settings(method);
            }
        }
    }
});
