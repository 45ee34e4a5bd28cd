#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    let Ok(file) = microflow_config::load_sequence_toml(data) else {
        return;
    };
    if file.validate().is_err() {
        return;
    }
    // A validated file must convert unless a mode name is unknown.
    if let Ok(steps) = microflow_core::conversions::sequence_steps(&file) {
        assert_eq!(steps.len(), file.steps.len());
    }
});
