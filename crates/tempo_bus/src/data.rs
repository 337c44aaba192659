//! Byte and packet sources for building stimulus.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Uniformly random bytes from a seeded stream.
#[derive(Debug, Clone)]
pub struct RandomBytes {
    rng: ChaCha8Rng,
}

impl Iterator for RandomBytes {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        Some(self.rng.gen())
    }
}

/// Random bytes, reproducible from `seed`.
pub fn random_data(seed: u64) -> RandomBytes {
    RandomBytes {
        rng: ChaCha8Rng::seed_from_u64(seed),
    }
}

/// `0, step, 2*step, ...` wrapping at 256.
pub fn incrementing_data(step: u8) -> impl Iterator<Item = u8> + Clone + Send {
    std::iter::successors(Some(0u8), move |v| Some(v.wrapping_add(step)))
}

/// Cycles through `pattern` forever. An empty pattern repeats `0x00`.
pub fn repeating_bytes(pattern: &[u8]) -> std::iter::Cycle<std::vec::IntoIter<u8>> {
    let pattern = if pattern.is_empty() {
        vec![0]
    } else {
        pattern.to_vec()
    };
    pattern.into_iter().cycle()
}

/// Takes the next `n` bytes from `source`.
pub fn get_bytes<I: Iterator<Item = u8>>(n: usize, source: &mut I) -> Vec<u8> {
    source.by_ref().take(n).collect()
}

/// `count` packet sizes drawn uniformly from `min..=max`.
pub fn random_packet_sizes(min: usize, max: usize, count: usize, seed: u64) -> Vec<usize> {
    let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..count).map(|_| rng.gen_range(lo..=hi)).collect()
}

/// Builds one packet per size, filling each from `source` in turn.
pub fn packets<I: Iterator<Item = u8>>(sizes: &[usize], source: &mut I) -> Vec<Vec<u8>> {
    sizes.iter().map(|&n| get_bytes(n, source)).collect()
}
