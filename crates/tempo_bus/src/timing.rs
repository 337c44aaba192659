//! On/off cycle patterns for backpressure and idle insertion.
//!
//! Every generator here is an ordinary [`Iterator`] that never ends. Random
//! sources are seeded ChaCha8 streams, so building the same generator twice
//! with the same seed restarts the same sequence. [`TimingShape`] captures a
//! preset together with its parameters and can hand out a fresh sequence as
//! often as needed.

use std::f64::consts::TAU;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use tempo_config::TimingSpec;

/// A boxed, never-ending `(on_cycles, off_cycles)` sequence.
pub type TimingSequence = Box<dyn Iterator<Item = (u32, u32)> + Send>;

/// Converts a real-valued length into a cycle count: `|round(x)|`.
///
/// NaN maps to zero and values past `u32::MAX` saturate.
pub fn to_cycles(value: f64) -> u32 {
    value.round().abs() as u32
}

/// A sine wave sampled at `period` points per cycle.
#[derive(Debug, Clone)]
pub struct SineWave {
    amplitude: f64,
    period: u32,
    offset: f64,
    phase: u32,
}

/// Repeating sine wave: `amplitude * sin(2π·i/period) + offset`.
///
/// A zero period yields `offset` forever.
pub fn sine(amplitude: f64, period: u32, offset: f64) -> SineWave {
    SineWave {
        amplitude,
        period,
        offset,
        phase: 0,
    }
}

impl Iterator for SineWave {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        if self.period == 0 {
            return Some(self.offset);
        }
        let angle = TAU * f64::from(self.phase) / f64::from(self.period);
        self.phase = (self.phase + 1) % self.period;
        Some(self.amplitude * angle.sin() + self.offset)
    }
}

/// Normally distributed samples from a seeded stream.
#[derive(Debug, Clone)]
pub struct Gaussian {
    mean: f64,
    sigma: f64,
    rng: ChaCha8Rng,
}

/// Gaussian samples around `mean`. `sigma` defaults to `mean / 4`.
pub fn gaussian(mean: f64, sigma: Option<f64>, seed: u64) -> Gaussian {
    Gaussian {
        mean,
        sigma: sigma.unwrap_or(mean / 4.0).abs(),
        rng: ChaCha8Rng::seed_from_u64(seed),
    }
}

impl Iterator for Gaussian {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        let z: f64 = self.rng.sample(StandardNormal);
        Some(self.mean + self.sigma * z)
    }
}

/// Pairs an on-length source with an off-length source.
#[derive(Debug, Clone)]
pub struct Toggle<A, B> {
    on: A,
    off: B,
}

/// Zips two real-valued sources into `(|round(on)|, |round(off)|)` pairs.
pub fn toggle<A, B>(on: A, off: B) -> Toggle<A::IntoIter, B::IntoIter>
where
    A: IntoIterator<Item = f64>,
    B: IntoIterator<Item = f64>,
{
    Toggle {
        on: on.into_iter(),
        off: off.into_iter(),
    }
}

impl<A, B> Iterator for Toggle<A, B>
where
    A: Iterator<Item = f64>,
    B: Iterator<Item = f64>,
{
    type Item = (u32, u32);

    fn next(&mut self) -> Option<(u32, u32)> {
        let on = self.on.next()?;
        let off = self.off.next()?;
        Some((to_cycles(on), to_cycles(off)))
    }
}

/// Yields `value` forever, or `times` times when given.
pub fn repeat<T: Clone>(value: T, times: Option<usize>) -> std::iter::Take<std::iter::Repeat<T>> {
    std::iter::repeat(value).take(times.unwrap_or(usize::MAX))
}

/// Chains several sequences one after another.
pub fn combine<I>(sequences: I) -> std::iter::Flatten<I::IntoIter>
where
    I: IntoIterator,
    I::Item: IntoIterator,
{
    sequences.into_iter().flatten()
}

/// Sine-modulated on and off lengths.
pub fn wave(
    on_amplitude: f64,
    on_period: u32,
    off_amplitude: f64,
    off_period: u32,
) -> Toggle<SineWave, SineWave> {
    toggle(
        sine(on_amplitude, on_period, 0.0),
        sine(off_amplitude, off_period, 0.0),
    )
}

/// Gaussian-length on periods separated by single idle cycles.
pub fn intermittent_single_cycles(
    mean: f64,
    sigma: Option<f64>,
    seed: u64,
) -> Toggle<Gaussian, std::iter::Take<std::iter::Repeat<f64>>> {
    toggle(gaussian(mean, sigma, seed), repeat(1.0, None))
}

/// Roughly 50% duty cycle: each sample sets both the on and the off length.
pub fn random_50_percent(
    mean: f64,
    sigma: Option<f64>,
    seed: u64,
) -> impl Iterator<Item = (u32, u32)> + Clone + Send {
    gaussian(mean, sigma, seed).map(|d| {
        let cycles = to_cycles(d);
        (cycles, cycles)
    })
}

/// A preset timing pattern with its parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum TimingShape {
    /// See [`wave`].
    Wave {
        /// Peak on-length deviation.
        on_amplitude: f64,
        /// Samples per on-wave cycle.
        on_period: u32,
        /// Peak off-length deviation.
        off_amplitude: f64,
        /// Samples per off-wave cycle.
        off_period: u32,
    },
    /// See [`intermittent_single_cycles`].
    Intermittent {
        /// Mean on-length.
        mean: f64,
        /// Standard deviation.
        sigma: Option<f64>,
        /// Random stream seed.
        seed: u64,
    },
    /// See [`random_50_percent`].
    Random50 {
        /// Mean length.
        mean: f64,
        /// Standard deviation.
        sigma: Option<f64>,
        /// Random stream seed.
        seed: u64,
    },
}

impl TimingShape {
    /// Builds a shape from a configured pattern, seeding random sources
    /// with `seed`.
    pub fn from_spec(spec: &TimingSpec, seed: u64) -> Self {
        match *spec {
            TimingSpec::Wave {
                on_amplitude,
                on_period,
                off_amplitude,
                off_period,
            } => TimingShape::Wave {
                on_amplitude,
                on_period,
                off_amplitude,
                off_period,
            },
            TimingSpec::Intermittent { mean, sigma } => TimingShape::Intermittent { mean, sigma, seed },
            TimingSpec::Random50 { mean, sigma } => TimingShape::Random50 { mean, sigma, seed },
        }
    }

    /// A fresh sequence starting from the beginning of the pattern.
    pub fn sequence(&self) -> TimingSequence {
        match *self {
            TimingShape::Wave {
                on_amplitude,
                on_period,
                off_amplitude,
                off_period,
            } => Box::new(wave(on_amplitude, on_period, off_amplitude, off_period)),
            TimingShape::Intermittent { mean, sigma, seed } => {
                Box::new(intermittent_single_cycles(mean, sigma, seed))
            }
            TimingShape::Random50 { mean, sigma, seed } => {
                Box::new(random_50_percent(mean, sigma, seed))
            }
        }
    }
}

impl Default for TimingShape {
    /// The default wave: on 30/200, off 10/100.
    fn default() -> Self {
        TimingShape::Wave {
            on_amplitude: 30.0,
            on_period: 200,
            off_amplitude: 10.0,
            off_period: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sine_repeats_every_period() {
        let first: Vec<f64> = sine(2.0, 4, 1.0).take(4).collect();
        let second: Vec<f64> = sine(2.0, 4, 1.0).skip(4).take(4).collect();
        assert_eq!(first, second);
        assert!((first[0] - 1.0).abs() < 1e-9);
        assert!((first[1] - 3.0).abs() < 1e-9);
        assert!((first[3] + 1.0).abs() < 1e-9);
    }

    #[test]
    fn zero_period_sine_is_constant() {
        assert!(sine(5.0, 0, 2.5).take(3).all(|v| v == 2.5));
    }

    #[test]
    fn gaussian_is_restartable() {
        let a: Vec<f64> = gaussian(10.0, None, 7).take(16).collect();
        let b: Vec<f64> = gaussian(10.0, None, 7).take(16).collect();
        let c: Vec<f64> = gaussian(10.0, None, 8).take(16).collect();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn gaussian_mean_is_close() {
        let n = 4000;
        let sum: f64 = gaussian(10.0, None, 1).take(n).sum();
        let mean = sum / n as f64;
        assert!((mean - 10.0).abs() < 0.3, "mean {mean}");
    }

    #[test]
    fn zero_sigma_is_constant() {
        assert!(gaussian(6.0, Some(0.0), 3).take(10).all(|v| v == 6.0));
    }

    #[test]
    fn toggle_rounds_and_takes_absolute_value() {
        let pairs: Vec<(u32, u32)> =
            toggle(vec![2.4, -2.6, 0.5, -0.0], vec![-7.5, 3.49, f64::NAN, 1e12]).collect();
        assert_eq!(pairs, vec![(2, 8), (3, 3), (1, 0), (0, u32::MAX)]);
    }

    #[test]
    fn toggle_ends_with_shorter_source() {
        assert_eq!(toggle(vec![1.0, 2.0], vec![3.0]).count(), 1);
    }

    #[test]
    fn wave_produces_nonzero_lengths() {
        assert!(wave(30.0, 200, 10.0, 100)
            .take(400)
            .any(|(on, off)| on > 0 && off > 0));
    }

    #[test]
    fn intermittent_has_single_cycle_gaps() {
        assert!(intermittent_single_cycles(10.0, None, 5)
            .take(50)
            .all(|(_, off)| off == 1));
    }

    #[test]
    fn random_50_is_symmetric() {
        assert!(random_50_percent(10.0, Some(3.0), 9)
            .take(50)
            .all(|(on, off)| on == off));
    }

    #[test]
    fn repeat_and_combine() {
        assert_eq!(repeat(3, Some(2)).collect::<Vec<_>>(), vec![3, 3]);
        assert_eq!(repeat('a', None).take(5).count(), 5);
        let joined: Vec<u32> = combine(vec![vec![1, 2], vec![], vec![3]]).collect();
        assert_eq!(joined, vec![1, 2, 3]);
    }

    #[test]
    fn shape_sequences_restart() {
        let shape = TimingShape::Random50 {
            mean: 8.0,
            sigma: None,
            seed: 11,
        };
        let a: Vec<(u32, u32)> = shape.sequence().take(10).collect();
        let b: Vec<(u32, u32)> = shape.sequence().take(10).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn shape_from_config() {
        let spec = TimingSpec::Intermittent {
            mean: 4.0,
            sigma: Some(1.0),
        };
        assert_eq!(
            TimingShape::from_spec(&spec, 99),
            TimingShape::Intermittent {
                mean: 4.0,
                sigma: Some(1.0),
                seed: 99
            }
        );
        assert_eq!(TimingShape::default().sequence().next(), Some((0, 0)));
    }
}
