use microflow_config::{load_sequence_toml, load_toml};
use rstest::rstest;

#[rstest]
#[case("[simulation]\ntick_ms = 0\n", "tick_ms must be > 0")]
#[case("[simulation]\nstop_timeout_ms = 0\n", "stop_timeout_ms must be > 0")]
#[case("[faults]\npump_probability = 1.5\n", "pump_probability must be within")]
#[case("[faults]\natomizer_probability = -0.1\n", "atomizer_probability must be within")]
#[case("[[pumps]]\nid = \"P1\"\ninitial_volume = -1.0\n", "initial_volume must be >= 0")]
#[case("[[pumps]]\nid = \"P1\"\n[[pumps]]\nid = \"P1\"\n", "duplicate pump id")]
#[case("[[pumps]]\nid = \" \"\n", "pumps.id must not be empty")]
#[case("[atomizer]\nid = \"\"\n", "atomizer.id must not be empty")]
#[case("[logging]\nrotation = \"weekly\"\n", "logging.rotation must be one of")]
fn rejects_invalid_config(#[case] toml: &str, #[case] needle: &str) {
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should be rejected");
    assert!(
        format!("{err}").contains(needle),
        "unexpected message: {err}"
    );
}

#[test]
fn accepts_full_config() {
    let toml = r#"
[simulation]
tick_ms = 50
stop_timeout_ms = 500
atomizer_warmup_ms = 0
seed = 42

[faults]
enabled = true
pump_probability = 0.01
atomizer_probability = 0.0

[[pumps]]
id = "P1"
initial_volume = 25.0

[[pumps]]
id = "P2"

[atomizer]
id = "A9"

[logging]
level = "debug"
rotation = "daily"
"#;
    let cfg = load_toml(toml).expect("parse TOML");
    cfg.validate().expect("valid config should pass");
    assert_eq!(cfg.simulation.seed, Some(42));
    assert_eq!(cfg.pumps.len(), 2);
    assert_eq!(cfg.pumps[1].initial_volume, 100.0);
    assert_eq!(cfg.atomizer.id, "A9");
}

#[test]
fn unknown_action_fails_to_parse() {
    let toml = r#"
[[steps]]
[[steps.actions]]
pump = "P1"
action = "explode"
"#;
    assert!(load_sequence_toml(toml).is_err());
}

#[test]
fn dispense_requires_volume() {
    let toml = r#"
[[steps]]
[[steps.actions]]
pump = "P1"
action = "dispense"
rate = 3.0
"#;
    assert!(load_sequence_toml(toml).is_err());
}

#[rstest]
#[case("[[steps]]\ndelay_s = -1.0\n", "delay_s must be >= 0")]
#[case("[[steps]]\ndelay_s = nan\n", "delay_s must be >= 0")]
#[case(
    "[[steps]]\n[[steps.actions]]\npump = \"\"\naction = \"stop\"\n",
    "pump must not be empty"
)]
#[case(
    "[[steps]]\n[[steps.actions]]\npump = \"P1\"\naction = \"set_flow\"\nrate = inf\n",
    "non-finite"
)]
fn rejects_invalid_sequence(#[case] toml: &str, #[case] needle: &str) {
    let seq = load_sequence_toml(toml).expect("parse TOML");
    let err = seq.validate().expect_err("should be rejected");
    assert!(format!("{err}").contains(needle), "unexpected message: {err}");
}

#[test]
fn sequence_file_from_disk() {
    use std::io::Write;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("seq.toml");
    let mut f = std::fs::File::create(&path).unwrap();
    writeln!(
        f,
        r#"
[[steps]]
[[steps.actions]]
pump = "P1"
action = "set_frequency"
frequency = 150

[[steps]]
delay_s = 0.5
[[steps.actions]]
pump = "P1"
action = "set_mode"
mode = "analog"
"#
    )
    .unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    let seq = load_sequence_toml(&text).unwrap();
    seq.validate().unwrap();
    assert_eq!(seq.steps.len(), 2);
    assert_eq!(seq.steps[1].delay_s, 0.5);
}
