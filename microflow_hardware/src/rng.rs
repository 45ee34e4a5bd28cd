//! Seeded random sources for reproducible device behavior.
use microflow_traits::RandomSource;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;

/// ChaCha8-backed random source.
#[derive(Debug, Clone)]
pub struct SeededRandom {
    inner: ChaCha8Rng,
}

impl SeededRandom {
    /// Create a source with an optional seed; `None` draws a seed from the OS.
    pub fn new(seed: Option<u64>) -> Self {
        let inner = match seed {
            Some(s) => ChaCha8Rng::seed_from_u64(s),
            None => ChaCha8Rng::from_entropy(),
        };
        Self { inner }
    }
}

impl RandomSource for SeededRandom {
    fn next_f64(&mut self) -> f64 {
        self.inner.r#gen::<f64>()
    }
}

/// Produces the random source for a device, keyed by device id.
pub type RandomFactory = Arc<dyn Fn(&str) -> Box<dyn RandomSource> + Send + Sync>;

/// Factory handing every device its own ChaCha stream.
///
/// With a base seed, each device's stream is derived from the seed and its id,
/// so runs are reproducible and two devices never share a stream.
pub fn seeded_factory(base_seed: Option<u64>) -> RandomFactory {
    Arc::new(move |id: &str| -> Box<dyn RandomSource> {
        Box::new(SeededRandom::new(base_seed.map(|s| s ^ fnv1a(id))))
    })
}

/// Factory returning a clone of `source` for every device.
pub fn fixed_factory<R>(source: R) -> RandomFactory
where
    R: RandomSource + Clone + Sync + 'static,
{
    Arc::new(move |_id: &str| -> Box<dyn RandomSource> { Box::new(source.clone()) })
}

fn fnv1a(s: &str) -> u64 {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for b in s.bytes() {
        h ^= u64::from(b);
        h = h.wrapping_mul(0x0100_0000_01b3);
    }
    h
}
