#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse and validation errors are fine; panics are not.
    if let Ok(cfg) = microflow_config::load_toml(data) {
        if cfg.validate().is_ok() {
            let settings = microflow_core::conversions::sim_settings(&cfg);
            assert!(!settings.tick.is_zero());
        }
    }
});
