use microflow_hardware::PumpModel;
use microflow_hardware::pump::{MAX_FLOW_RATE, MAX_PRESSURE_MBAR};
use microflow_traits::{DeviceState, RandomSource};
use proptest::prelude::*;
use std::time::{Duration, Instant};

struct Replay(Vec<f64>, usize);

impl RandomSource for Replay {
    fn next_f64(&mut self) -> f64 {
        let v = self.0[self.1 % self.0.len()];
        self.1 += 1;
        v
    }
}

proptest! {
    #[test]
    fn amplitude_tracks_flow_rate(rate in 0.0..=MAX_FLOW_RATE) {
        let mut m = PumpModel::new(100.0);
        m.apply_flow_rate(rate).unwrap();
        let expected = (rate / MAX_FLOW_RATE * 100.0).min(100.0).round();
        prop_assert_eq!(m.amplitude, expected);
    }

    #[test]
    fn tick_preserves_invariants(
        initial in 0.0f64..5.0,
        target in 0.0..=MAX_FLOW_RATE,
        steps in prop::collection::vec(1u64..2_000, 1..50),
        draws in prop::collection::vec(0.0f64..1.0, 1..16),
    ) {
        let t0 = Instant::now();
        let mut m = PumpModel::new(initial);
        m.apply_flow_rate(target).unwrap();
        m.state = DeviceState::On;
        m.last_tick = Some(t0);
        let mut rng = Replay(draws, 0);
        let mut now = t0;
        let mut prev_total = 0.0;
        for ms in steps {
            now += Duration::from_millis(ms);
            m.tick(now, &mut rng, 0.0);
            prop_assert!(m.volume_remaining >= 0.0);
            prop_assert!((0.0..=MAX_PRESSURE_MBAR).contains(&m.pressure));
            prop_assert!(m.flow_rate >= 0.0 && m.flow_rate <= target + 1e-12);
            prop_assert!(m.total_dispensed >= prev_total);
            prop_assert!((m.total_dispensed + m.volume_remaining - initial).abs() < 1e-9);
            prev_total = m.total_dispensed;
            if m.state == DeviceState::Error {
                break;
            }
        }
    }
}
