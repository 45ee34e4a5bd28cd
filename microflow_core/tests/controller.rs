mod common;

use common::{deplete, faulty_atomizer_controller, manual_controller, rates, realtime_controller, wait_until};
use microflow_core::{AtomizerCommand, AtomizerParams, ControlError, DeviceKind, PumpParameters};
use microflow_hardware::{DeviceError, PumpMode};
use microflow_traits::DeviceState;
use rstest::rstest;
use std::time::{Duration, Instant};

#[test]
fn with_pumps_registers_devices() {
    let (c, _, _) = manual_controller();
    assert_eq!(c.pump_ids(), ["P1", "P2", "P3", "P4"]);
    assert_eq!(c.registry().atomizer_ids(), ["A1"]);
    let ids: Vec<String> = c.pump_statuses().into_iter().map(|s| s.pump_id).collect();
    assert_eq!(ids, ["P1", "P2", "P3", "P4"]);
}

#[test]
fn start_all_then_stop_all() {
    let (c, _, _) = manual_controller();
    let report = c.start_all(Some(&rates(&[
        ("P1", 5.0),
        ("P2", 8.0),
        ("P3", 10.0),
        ("P4", 3.0),
    ])));
    assert_eq!(report.len(), 4);
    assert!(report.success(), "{report}");
    for s in c.pump_statuses() {
        assert_eq!(s.state, DeviceState::On);
    }
    assert_eq!(c.pump_statuses()[1].target_flow_rate, 8.0);

    let report = c.stop_all();
    assert!(report.success(), "{report}");
    for s in c.pump_statuses() {
        assert_eq!(s.state, DeviceState::Off);
        assert_eq!(s.flow_rate, 0.0);
    }
}

#[test]
fn start_all_starts_pump_with_rejected_rate() {
    let (c, _, _) = manual_controller();
    let report = c.start_all(Some(&rates(&[("P1", 20.0), ("P2", 4.0)])));
    assert!(matches!(
        report.get("P1"),
        Some(Err(ControlError::Device {
            source: DeviceError::Validation { .. },
            ..
        }))
    ));
    assert_eq!(report.succeeded(), 3);
    let p1 = c.pump("P1").unwrap().status();
    assert_eq!(p1.state, DeviceState::On);
    // previous target kept
    assert_eq!(p1.target_flow_rate, 0.0);
    assert_eq!(c.pump("P2").unwrap().state(), DeviceState::On);
    assert_eq!(c.pump("P2").unwrap().status().target_flow_rate, 4.0);
    c.shutdown();
}

#[test]
fn clear_faults_then_restart() {
    let (c, clock, _) = manual_controller();
    deplete(&c, &clock, "P1");
    assert!(matches!(
        c.start_pumps(&["P1".to_string()]).get("P1"),
        Some(Err(ControlError::Device {
            source: DeviceError::Faulted,
            ..
        }))
    ));

    let report = c.clear_faults(&["P1".to_string(), "P2".to_string()]);
    assert_eq!(report.get("P1"), Some(&Ok(())));
    assert!(matches!(
        report.get("P2"),
        Some(Err(ControlError::Device {
            source: DeviceError::InvalidState { .. },
            ..
        }))
    ));
    assert_eq!(c.pump("P1").unwrap().state(), DeviceState::Off);

    let report = c.start_pumps(&["P1".to_string()]);
    assert!(report.success(), "{report}");
    assert_eq!(c.pump("P1").unwrap().state(), DeviceState::On);
    c.shutdown();
}

#[test]
fn stop_all_reports_each_failure() {
    let (c, _, _) = manual_controller();
    c.start_pumps(&["P1".to_string()]);
    let report = c.stop_all();
    assert_eq!(report.succeeded(), 1);
    assert_eq!(report.failures().count(), 3);
}

#[test]
fn fan_out_reports_unknown_pump() {
    let (c, _, _) = manual_controller();
    let report = c.start_pumps(&["P1".to_string(), "P9".to_string()]);
    assert_eq!(report.get("P1"), Some(&Ok(())));
    assert_eq!(
        report.get("P9"),
        Some(&Err(ControlError::NotFound {
            kind: DeviceKind::Pump,
            id: "P9".into()
        }))
    );
    c.shutdown();
}

#[test]
fn dispense_volumes_books_exact_amounts() {
    let (c, clock, _) = manual_controller();
    let volumes = rates(&[("P1", 2.0), ("P2", 3.0), ("P3", 1.5), ("P4", 4.0)]);
    let flow = rates(&[("P1", 6.0), ("P2", 9.0), ("P3", 12.0), ("P4", 7.0)]);
    let report = c.dispense_volumes(&volumes, Some(&flow));
    assert!(report.success(), "{report}");
    // parallel dispenses overlap: only the longest (4 ml at 7 ml/min) costs time
    let longest = 4.0 / 7.0 * 60.0;
    assert!((clock.elapsed().as_secs_f64() - longest).abs() < 1e-3, "{:?}", clock.elapsed());
    for s in c.pump_statuses() {
        let v = volumes[&s.pump_id];
        assert_eq!(s.total_dispensed, v);
        assert_eq!(s.volume_remaining, 100.0 - v);
        assert_eq!(s.state, DeviceState::Off);
    }
}

#[test]
fn parallel_dispenses_cost_the_longest_on_manual_clock() {
    let (c, clock, _) = manual_controller();
    // 1 ml at 6 ml/min is 10 s per pump
    let volumes = rates(&[("P1", 1.0), ("P2", 1.0), ("P3", 1.0), ("P4", 1.0)]);
    let flow = rates(&[("P1", 6.0), ("P2", 6.0), ("P3", 6.0), ("P4", 6.0)]);
    let report = c.dispense_volumes(&volumes, Some(&flow));
    assert!(report.success(), "{report}");
    let elapsed = clock.elapsed().as_secs_f64();
    assert!((elapsed - 10.0).abs() < 1e-3, "four overlapping dispenses took {elapsed} s");
}

#[test]
fn running_pump_books_only_overlapped_dispense_time() {
    let (c, clock, _) = manual_controller();
    let p4 = c.pump("P4").unwrap();
    p4.set_flow_rate(6.0).unwrap();
    p4.start().unwrap();
    let volumes = rates(&[("P1", 1.0), ("P2", 1.0), ("P3", 1.0)]);
    let flow = rates(&[("P1", 6.0), ("P2", 6.0), ("P3", 6.0)]);
    assert!(c.dispense_volumes(&volumes, Some(&flow)).success());
    assert!(wait_until(Duration::from_secs(2), || p4.status().total_dispensed > 0.0));
    // at most 6 ml/min over the 10 s of device time that passed
    assert!(p4.status().total_dispensed <= 1.0 + 1e-9, "{:?}", p4.status());
    assert!((clock.elapsed().as_secs_f64() - 10.0).abs() < 1e-3);
    c.shutdown();
}

#[test]
fn dispense_runs_concurrently() {
    let c = realtime_controller();
    // 0.07 ml at 14 ml/min is 300 ms per pump
    let volumes = rates(&[("P1", 0.07), ("P2", 0.07), ("P3", 0.07), ("P4", 0.07)]);
    let flow = rates(&[("P1", 14.0), ("P2", 14.0), ("P3", 14.0), ("P4", 14.0)]);
    let t0 = Instant::now();
    let report = c.dispense_volumes(&volumes, Some(&flow));
    let elapsed = t0.elapsed();
    assert!(report.success(), "{report}");
    assert!(elapsed >= Duration::from_millis(290));
    assert!(elapsed < Duration::from_millis(1000), "took {elapsed:?}");
}

#[test]
fn flow_ramps_toward_each_target_on_real_clock() {
    let c = realtime_controller();
    let targets = rates(&[("P1", 1.0), ("P2", 4.0), ("P3", 6.0), ("P4", 3.0)]);
    let t0 = Instant::now();
    assert!(c.start_all(Some(&targets)).success());
    std::thread::sleep(Duration::from_secs(1));
    let statuses = c.pump_statuses();
    let upper = t0.elapsed().as_secs_f64();
    // a tick of staleness plus scheduling slack
    let lower = 1.0 - 0.15;
    for s in &statuses {
        let target = targets[&s.pump_id];
        assert!(s.flow_rate <= target.min(2.0 * upper) + 1e-9, "{s:?}");
        assert!(s.flow_rate >= target.min(2.0 * lower), "{s:?}");
    }
    assert_eq!(statuses[0].flow_rate, 1.0);

    assert!(wait_until(Duration::from_secs(6), || {
        c.pump_statuses()
            .iter()
            .all(|s| s.flow_rate == targets[&s.pump_id])
    }));
    assert!(c.stop_all().success());
}

#[test]
fn set_parameters_applies_in_order() {
    let (c, _, _) = manual_controller();
    let report = c
        .set_parameters(
            "P1",
            &PumpParameters {
                frequency: Some(120.0),
                amplitude: Some(80.0),
                mode: Some(PumpMode::Digital),
                flow_rate: None,
            },
        )
        .unwrap();
    assert!(report.success());
    assert!(report.flow_rate.is_none());
    let s = c.pump("P1").unwrap().status();
    assert_eq!(s.frequency, 120.0);
    assert_eq!(s.amplitude, 80.0);
    assert_eq!(s.mode, PumpMode::Digital);
    assert!((s.target_flow_rate - 11.2).abs() < 1e-9);
}

#[test]
fn set_parameters_partial_failure() {
    let (c, _, _) = manual_controller();
    let report = c
        .set_parameters(
            "P2",
            &PumpParameters {
                frequency: Some(900.0),
                flow_rate: Some(3.0),
                ..PumpParameters::default()
            },
        )
        .unwrap();
    assert!(!report.success());
    assert!(matches!(report.frequency, Some(Err(_))));
    assert_eq!(report.flow_rate, Some(Ok(())));
    assert_eq!(c.pump("P2").unwrap().status().frequency, 100.0);
}

#[test]
fn set_parameters_unknown_pump() {
    let (c, _, _) = manual_controller();
    assert!(matches!(
        c.set_parameters("P7", &PumpParameters::default()),
        Err(ControlError::NotFound { .. })
    ));
}

#[rstest]
#[case("explode", AtomizerParams::default(), ControlError::UnknownAction("explode".into()))]
#[case("set_power", AtomizerParams::default(), ControlError::MissingParameter("level"))]
#[case(
    "set_frequency",
    AtomizerParams { level: Some(10.0), frequency: None },
    ControlError::MissingParameter("frequency")
)]
fn atomizer_action_errors(
    #[case] action: &str,
    #[case] params: AtomizerParams,
    #[case] expected: ControlError,
) {
    let (c, _, _) = manual_controller();
    assert_eq!(c.control_atomizer(action, &params), Err(expected));
}

#[test]
fn atomizer_control_round_trip() {
    let (c, clock, _) = manual_controller();
    c.control_atomizer(
        "set_frequency",
        &AtomizerParams {
            frequency: Some(115.0),
            ..AtomizerParams::default()
        },
    )
    .unwrap();
    c.control_atomizer(
        "set_power",
        &AtomizerParams {
            level: Some(75.0),
            ..AtomizerParams::default()
        },
    )
    .unwrap();
    c.control_atomizer("on", &AtomizerParams::default()).unwrap();
    clock.advance(Duration::from_secs(5));
    let s = c.atomizer_status().unwrap();
    assert_eq!(s.state, DeviceState::On);
    assert_eq!(s.frequency, 115.0);
    assert_eq!(s.atomization_rate, 22.5);
    assert!(s.operation_time >= 5.0);
    c.apply_atomizer(AtomizerCommand::Off).unwrap();
    assert!(matches!(
        c.apply_atomizer(AtomizerCommand::Off),
        Err(ControlError::Device {
            source: DeviceError::InvalidState { .. },
            ..
        })
    ));
}

#[test]
fn atomizer_fault_is_cleared_by_command() {
    let c = faulty_atomizer_controller();
    assert_eq!(
        AtomizerCommand::parse("clear_fault", &AtomizerParams::default()),
        Ok(AtomizerCommand::ClearFault)
    );
    c.apply_atomizer(AtomizerCommand::On).unwrap();
    assert!(wait_until(Duration::from_secs(2), || {
        c.atomizer_status().unwrap().state == DeviceState::Error
    }));
    assert!(matches!(
        c.apply_atomizer(AtomizerCommand::On),
        Err(ControlError::Device {
            source: DeviceError::Faulted,
            ..
        })
    ));
    c.control_atomizer("clear_fault", &AtomizerParams::default()).unwrap();
    assert_eq!(c.atomizer_status().unwrap().state, DeviceState::Off);
    assert!(c.apply_atomizer(AtomizerCommand::ClearFault).is_err());
}

#[test]
fn shutdown_stops_everything_running() {
    let (c, _, _) = manual_controller();
    c.start_all(None);
    c.apply_atomizer(AtomizerCommand::On).unwrap();
    assert_eq!(c.shutdown(), 5);
    let snap = c.registry().snapshot();
    assert!(snap.pumps.values().all(|s| s.state == DeviceState::Off));
    assert!(snap.atomizers.values().all(|s| s.state == DeviceState::Off));
    assert_eq!(c.shutdown(), 0);
}
