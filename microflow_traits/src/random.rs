//! Random sources consumed by the device loops (pressure jitter, output
//! variability, fault injection).

/// Source of uniformly distributed numbers.
///
/// Each running device owns one source, so implementations need `Send` but
/// not `Sync`.
pub trait RandomSource: Send {
    /// Uniform sample in `[0.0, 1.0)`.
    fn next_f64(&mut self) -> f64;

    /// Uniform sample in `[low, high)`.
    fn uniform(&mut self, low: f64, high: f64) -> f64 {
        low + (high - low) * self.next_f64()
    }

    /// Bernoulli trial with probability `p`. `p <= 0` never fires, `p >= 1` always does.
    fn chance(&mut self, p: f64) -> bool {
        if p <= 0.0 {
            return false;
        }
        if p >= 1.0 {
            return true;
        }
        self.next_f64() < p
    }
}

/// Source that always yields the same value.
///
/// `FixedRandom::midpoint()` makes every jitter term zero and every
/// low-probability fault check fail, which turns the simulation deterministic.
#[derive(Debug, Clone, Copy)]
pub struct FixedRandom(pub f64);

impl FixedRandom {
    pub fn midpoint() -> Self {
        Self(0.5)
    }
}

impl RandomSource for FixedRandom {
    fn next_f64(&mut self) -> f64 {
        self.0
    }
}

/// Source that replays a script of values, then repeats the last one.
#[derive(Debug, Clone)]
pub struct ScriptedRandom {
    values: Vec<f64>,
    idx: usize,
}

impl ScriptedRandom {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values, idx: 0 }
    }
}

impl RandomSource for ScriptedRandom {
    fn next_f64(&mut self) -> f64 {
        let v = self
            .values
            .get(self.idx)
            .or_else(|| self.values.last())
            .copied()
            .unwrap_or(0.5);
        self.idx = self.idx.saturating_add(1);
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chance_edges() {
        let mut r = FixedRandom(0.0);
        assert!(!r.chance(0.0));
        assert!(r.chance(1.0));
        assert!(r.chance(0.001));
        let mut r = FixedRandom::midpoint();
        assert!(!r.chance(0.001));
    }

    #[test]
    fn uniform_maps_midpoint_to_center() {
        let mut r = FixedRandom::midpoint();
        assert_eq!(r.uniform(-10.0, 10.0), 0.0);
        assert!((r.uniform(0.95, 1.05) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn scripted_repeats_last_value() {
        let mut r = ScriptedRandom::new(vec![0.1, 0.9]);
        assert_eq!(r.next_f64(), 0.1);
        assert_eq!(r.next_f64(), 0.9);
        assert_eq!(r.next_f64(), 0.9);
    }
}
