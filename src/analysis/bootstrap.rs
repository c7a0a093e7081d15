//! Paired bootstrap confidence intervals
//!
//! For paired arrays `A` and `B` of length `n` the estimator reports
//! `mean(A) - mean(B)` and a 95% interval from resampling: every iteration
//! draws `n` indices uniformly with replacement and applies the same index set
//! to both arrays, so the pairing is preserved. Percentiles interpolate
//! linearly between order statistics.
//!
//! The random generator is owned by the estimator. Reusing one estimator for
//! several groups consumes the stream in call order, so callers that need
//! stable tables must visit groups in a fixed order.

use super::join::PairedArrays;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Resampling iterations
pub const N_BOOTSTRAP: usize = 10_000;

/// Seed of the default generator
pub const DEFAULT_SEED: u64 = 42;

/// Invalid bootstrap input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapError {
    /// Paired arrays must have the same length
    LengthMismatch { a: usize, b: usize },
    /// At least one iteration is required
    NoIterations,
}

impl std::fmt::Display for BootstrapError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BootstrapError::LengthMismatch { a, b } => {
                write!(f, "paired arrays differ in length ({} vs {})", a, b)
            }
            BootstrapError::NoIterations => write!(f, "bootstrap needs at least one iteration"),
        }
    }
}

impl std::error::Error for BootstrapError {}

/// Observed delta with its resampled interval
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BootstrapEstimate {
    pub observed: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub n_paired: usize,
}

impl BootstrapEstimate {
    fn undefined() -> Self {
        Self {
            observed: f64::NAN,
            ci_lower: f64::NAN,
            ci_upper: f64::NAN,
            n_paired: 0,
        }
    }

    /// `(lower, upper)` when both bounds are finite
    pub fn interval(&self) -> Option<(f64, f64)> {
        (self.ci_lower.is_finite() && self.ci_upper.is_finite())
            .then_some((self.ci_lower, self.ci_upper))
    }
}

/// Paired bootstrap over an injected random generator
#[derive(Debug, Clone)]
pub struct BootstrapEstimator<R = ChaCha8Rng> {
    rng: R,
    iterations: usize,
}

impl BootstrapEstimator<ChaCha8Rng> {
    /// ChaCha8 generator seeded with `seed`; identical across platforms
    pub fn seeded(seed: u64) -> Self {
        Self::new(ChaCha8Rng::seed_from_u64(seed))
    }
}

impl Default for BootstrapEstimator<ChaCha8Rng> {
    fn default() -> Self {
        Self::seeded(DEFAULT_SEED)
    }
}

impl<R: Rng> BootstrapEstimator<R> {
    pub fn new(rng: R) -> Self {
        Self {
            rng,
            iterations: N_BOOTSTRAP,
        }
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Estimate `mean(a) - mean(b)` over paired samples
    ///
    /// `n == 0` is not an error: every value of the estimate is NaN.
    pub fn paired_delta(&mut self, a: &[f64], b: &[f64]) -> Result<BootstrapEstimate, BootstrapError> {
        if a.len() != b.len() {
            return Err(BootstrapError::LengthMismatch {
                a: a.len(),
                b: b.len(),
            });
        }
        if self.iterations == 0 {
            return Err(BootstrapError::NoIterations);
        }
        let n = a.len();
        if n == 0 {
            return Ok(BootstrapEstimate::undefined());
        }

        let observed = mean(a) - mean(b);
        let mut deltas = Vec::with_capacity(self.iterations);
        for _ in 0..self.iterations {
            let mut sum_a = 0.0;
            let mut sum_b = 0.0;
            for _ in 0..n {
                let idx = draw_index(&mut self.rng, n);
                sum_a += a[idx];
                sum_b += b[idx];
            }
            deltas.push(sum_a / n as f64 - sum_b / n as f64);
        }
        deltas.sort_by(f64::total_cmp);

        Ok(BootstrapEstimate {
            observed,
            ci_lower: percentile(&deltas, 2.5),
            ci_upper: percentile(&deltas, 97.5),
            n_paired: n,
        })
    }

    /// Estimate `mean(A) - mean(B)` over joined arrays
    pub fn estimate(&mut self, paired: &PairedArrays) -> Result<BootstrapEstimate, BootstrapError> {
        self.paired_delta(&paired.a, &paired.b)
    }
}

/// Uniform index in `0..n`
///
/// Drawn as a `u64` so the stream consumed from the generator does not depend
/// on the target's pointer width.
fn draw_index<R: Rng>(rng: &mut R, n: usize) -> usize {
    rng.gen_range(0..n as u64) as usize
}

/// Arithmetic mean, NaN when empty
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// `q`-th percentile (0..=100) of sorted data, linear interpolation
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        len => {
            let rank = (q / 100.0).clamp(0.0, 1.0) * (len - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let frac = rank - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_interpolates() {
        let data = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&data, 0.0), 1.0);
        assert_eq!(percentile(&data, 50.0), 3.0);
        assert_eq!(percentile(&data, 100.0), 5.0);
        // rank 0.1 between 1.0 and 2.0
        assert!((percentile(&data, 2.5) - 1.1).abs() < 1e-12);
        assert!((percentile(&data, 97.5) - 4.9).abs() < 1e-12);
    }

    #[test]
    fn test_empty_input_is_nan() {
        let mut est = BootstrapEstimator::default();
        let r = est.paired_delta(&[], &[]).unwrap();
        assert!(r.observed.is_nan());
        assert!(r.ci_lower.is_nan() && r.ci_upper.is_nan());
        assert_eq!(r.n_paired, 0);
        assert_eq!(r.interval(), None);
    }

    #[test]
    fn test_length_mismatch_is_error() {
        let mut est = BootstrapEstimator::default();
        assert_eq!(
            est.paired_delta(&[1.0], &[]),
            Err(BootstrapError::LengthMismatch { a: 1, b: 0 })
        );
    }

    #[test]
    fn test_same_seed_same_interval() {
        let a = [1.0, 0.0, 1.0, 1.0, 0.0, 1.0];
        let b = [0.0, 0.0, 1.0, 0.0, 0.0, 1.0];
        let r1 = BootstrapEstimator::seeded(7).paired_delta(&a, &b).unwrap();
        let r2 = BootstrapEstimator::seeded(7).paired_delta(&a, &b).unwrap();
        assert_eq!(r1, r2);
        assert!((r1.observed - 1.0 / 3.0).abs() < 1e-12);
        assert!(r1.ci_lower <= r1.observed && r1.observed <= r1.ci_upper);
    }

    #[test]
    fn test_index_stream_is_u64_draws() {
        let a = [1.0, 0.0, 1.0, 1.0, 0.0];
        let b = [0.0, 1.0, 1.0, 0.0, 0.0];
        let iterations = 200;
        let r = BootstrapEstimator::seeded(11)
            .with_iterations(iterations)
            .paired_delta(&a, &b)
            .unwrap();

        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let n = a.len();
        let mut deltas: Vec<f64> = (0..iterations)
            .map(|_| {
                let (mut sa, mut sb) = (0.0, 0.0);
                for _ in 0..n {
                    let i = rng.gen_range(0..n as u64) as usize;
                    sa += a[i];
                    sb += b[i];
                }
                sa / n as f64 - sb / n as f64
            })
            .collect();
        deltas.sort_by(f64::total_cmp);

        assert_eq!(r.ci_lower.to_bits(), percentile(&deltas, 2.5).to_bits());
        assert_eq!(r.ci_upper.to_bits(), percentile(&deltas, 97.5).to_bits());
    }

    #[test]
    fn test_constant_difference_has_degenerate_interval() {
        let a = [1.0; 8];
        let b = [0.0; 8];
        let r = BootstrapEstimator::default().paired_delta(&a, &b).unwrap();
        assert_eq!(r.observed, 1.0);
        assert_eq!(r.interval(), Some((1.0, 1.0)));
    }

    #[test]
    fn test_single_pair() {
        let r = BootstrapEstimator::default()
            .with_iterations(50)
            .paired_delta(&[1.0], &[0.0])
            .unwrap();
        assert_eq!((r.observed, r.ci_lower, r.ci_upper, r.n_paired), (1.0, 1.0, 1.0, 1));
    }
}
