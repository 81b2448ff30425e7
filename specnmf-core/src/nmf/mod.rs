//! Non-negative matrix factorization of magnitude spectrograms.
//!
//! Factors an `F × B` magnitude matrix `V` into activations `A` (`F × K`) and
//! bases `W` (`K × B`) with `V ≈ A · W`, minimizing the generalized
//! Kullback-Leibler divergence by multiplicative updates:
//!
//! ```text
//! A ← A ⊙ ((V ⊘ (A·W + ε)) · Wᵀ) ⊘ (1 · Wᵀ + ε)
//! W ← W ⊙ (Aᵀ · (V ⊘ (A·W + ε))) ⊘ (Aᵀ · 1 + ε)
//! ```
//!
//! Each factor is rescaled by a ratio of non-negative numbers with a positive
//! floor in the denominator, so neither factor can ever turn negative.

pub mod estimate;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

pub use estimate::{estimate, estimate_total};

use crate::listener::{NoOpListener, PipelineEvent, PipelineListener};
use crate::{cast, Matrix, NmfConfig, NmfError, Result, Sample};

/// Output of [`Nmf::factorize`].
#[derive(Debug, Clone)]
pub struct Factorization<T> {
    /// `K × B` spectral templates.
    pub bases: Matrix<T>,
    /// `F × K` time-varying gains.
    pub activations: Matrix<T>,
    /// `F × B`, `activations · bases` after the last update.
    pub reconstruction: Matrix<T>,
    /// Update passes actually performed.
    pub iterations: usize,
    /// `true` when no tolerance is configured; otherwise whether the
    /// tolerance was met before the iteration budget ran out.
    pub converged: bool,
}

/// Factorization parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Nmf {
    components: usize,
    iterations: usize,
    seed: Option<u64>,
    tolerance: Option<f64>,
}

impl Nmf {
    pub fn new(components: usize, iterations: usize) -> Self {
        Self {
            components,
            iterations,
            seed: None,
            tolerance: None,
        }
    }

    pub fn from_config(config: &NmfConfig) -> Self {
        Self {
            components: config.components(),
            iterations: config.iterations(),
            seed: config.seed(),
            tolerance: config.tolerance(),
        }
    }

    /// Fixes the initialization seed; `None` draws one from system entropy.
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_tolerance(mut self, tolerance: Option<f64>) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn factorize<T: Sample>(&self, magnitude: &Matrix<T>) -> Result<Factorization<T>> {
        self.factorize_with_listener(magnitude, &mut NoOpListener)
    }

    pub fn factorize_with_listener<T: Sample, L: PipelineListener>(
        &self,
        magnitude: &Matrix<T>,
        listener: &mut L,
    ) -> Result<Factorization<T>> {
        self.validate(magnitude)?;

        let (frames, bins) = magnitude.shape();
        let k = self.components;
        let eps = T::epsilon();

        let mut rng = self.rng();
        let mut activations = Matrix::from_fn(frames, k, |_, _| cast::<T>(rng.random::<f64>()));
        let mut bases = Matrix::from_fn(k, bins, |_, _| cast::<T>(rng.random::<f64>()));

        let mut reconstruction = Matrix::zeros(frames, bins);
        let mut ratio = Matrix::zeros(frames, bins);
        let mut numerator = Matrix::zeros(k, bins);
        let mut denominator = vec![T::zero(); k];

        let track_cost = self.tolerance.is_some() || listener.wants_cost();
        let mut previous_cost: Option<f64> = None;
        let mut performed = 0;
        let mut converged = self.tolerance.is_none();

        estimate::estimate_total_into(&bases, &activations, &mut reconstruction);

        for iteration in 0..self.iterations {
            // Activations: A[f,k] *= Σ_b Q[f,b] W[k,b] / (Σ_b W[k,b] + ε)
            observed_ratio(magnitude, &reconstruction, &mut ratio);
            for (d, basis) in denominator.iter_mut().zip(bases.iter_rows()) {
                *d = basis.iter().copied().sum::<T>() + eps;
            }
            for f in 0..frames {
                let q = ratio.row(f);
                for (c, (a, &d)) in activations.row_mut(f).iter_mut().zip(&denominator).enumerate() {
                    let projected: T = q.iter().zip(bases.row(c)).map(|(&r, &w)| r * w).sum();
                    *a = *a * (projected / d);
                }
            }

            // Bases: W[k,b] *= Σ_f A[f,k] Q[f,b] / (Σ_f A[f,k] + ε)
            estimate::estimate_total_into(&bases, &activations, &mut reconstruction);
            observed_ratio(magnitude, &reconstruction, &mut ratio);
            numerator.as_mut_slice().fill(T::zero());
            denominator.fill(eps);
            for f in 0..frames {
                let q = ratio.row(f);
                for (c, &a) in activations.row(f).iter().enumerate() {
                    denominator[c] += a;
                    numerator
                        .row_mut(c)
                        .iter_mut()
                        .zip(q)
                        .for_each(|(n, &r)| *n += a * r);
                }
            }
            for c in 0..k {
                let d = denominator[c];
                bases
                    .row_mut(c)
                    .iter_mut()
                    .zip(numerator.row(c))
                    .for_each(|(w, &n)| *w = *w * (n / d));
            }

            estimate::estimate_total_into(&bases, &activations, &mut reconstruction);
            performed = iteration + 1;

            let cost = track_cost.then(|| divergence(magnitude, &reconstruction));
            listener.on_event(PipelineEvent::Iteration {
                index: iteration,
                total: self.iterations,
                cost,
            });

            if let (Some(tolerance), Some(cost)) = (self.tolerance, cost) {
                if let Some(previous) = previous_cost {
                    let change = (previous - cost).abs() / previous.max(f64::EPSILON);
                    if change < tolerance {
                        log::debug!(
                            "nmf converged after {performed} iterations (relative change {change:.3e})"
                        );
                        converged = true;
                        break;
                    }
                }
                previous_cost = Some(cost);
            }
        }

        listener.on_event(PipelineEvent::Factorized {
            iterations: performed,
            converged,
        });

        Ok(Factorization {
            bases,
            activations,
            reconstruction,
            iterations: performed,
            converged,
        })
    }

    fn validate<T: Sample>(&self, magnitude: &Matrix<T>) -> Result<()> {
        if self.components < 1 {
            return Err(NmfError::Configuration(
                "component count must be at least 1".into(),
            ));
        }
        if self.iterations < 1 {
            return Err(NmfError::Configuration(
                "iteration count must be at least 1".into(),
            ));
        }
        if magnitude.is_empty() {
            return Err(NmfError::Configuration("magnitude matrix is empty".into()));
        }
        if magnitude
            .as_slice()
            .iter()
            .any(|&v| !v.is_finite() || v < T::zero())
        {
            return Err(NmfError::Configuration(
                "magnitude matrix must be finite and non-negative".into(),
            ));
        }
        Ok(())
    }

    fn rng(&self) -> ChaCha8Rng {
        let seed = match self.seed {
            Some(seed) => seed,
            None => {
                let seed = rand::rng().random::<u64>();
                log::debug!("nmf seed drawn from entropy: {seed}");
                seed
            }
        };
        ChaCha8Rng::seed_from_u64(seed)
    }
}

/// `Q = V ⊘ (R + ε)`
fn observed_ratio<T: Sample>(magnitude: &Matrix<T>, reconstruction: &Matrix<T>, out: &mut Matrix<T>) {
    let eps = T::epsilon();
    out.as_mut_slice()
        .iter_mut()
        .zip(magnitude.as_slice().iter().zip(reconstruction.as_slice()))
        .for_each(|(q, (&v, &r))| *q = v / (r + eps));
}

/// Generalized KL divergence `Σ V ln(V / R) − V + R`, accumulated in `f64`.
fn divergence<T: Sample>(magnitude: &Matrix<T>, reconstruction: &Matrix<T>) -> f64 {
    let eps = f64::EPSILON;
    magnitude
        .as_slice()
        .iter()
        .zip(reconstruction.as_slice())
        .map(|(&v, &r)| {
            let v = v.to_f64().unwrap_or(0.0);
            let r = r.to_f64().unwrap_or(0.0);
            v * ((v + eps) / (r + eps)).ln() - v + r
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use std::f64::consts::PI;

    use super::*;
    use crate::dsp::{magnitude::magnitude, stft::Stft};
    use crate::listener::RecordingListener;
    use crate::WindowKind;

    fn noise_magnitude(frames: usize, bins: usize) -> Matrix<f64> {
        let mut rng = ChaCha8Rng::seed_from_u64(99);
        Matrix::from_fn(frames, bins, |_, _| rng.random::<f64>() * 4.0)
    }

    #[test]
    fn output_shapes() {
        let v = noise_magnitude(20, 33);
        let out = Nmf::new(3, 10).with_seed(Some(1)).factorize(&v).unwrap();
        assert_eq!(out.bases.shape(), (3, 33));
        assert_eq!(out.activations.shape(), (20, 3));
        assert_eq!(out.reconstruction.shape(), (20, 33));
        assert_eq!(out.iterations, 10);
        assert!(out.converged);
    }

    #[test]
    fn factors_stay_non_negative() {
        let v = noise_magnitude(16, 17);
        for iterations in [1, 5, 50] {
            let out = Nmf::new(4, iterations).with_seed(Some(3)).factorize(&v).unwrap();
            assert!(out.bases.as_slice().iter().all(|&x| x >= 0.0));
            assert!(out.activations.as_slice().iter().all(|&x| x >= 0.0));
            assert!(out.reconstruction.as_slice().iter().all(|&x| x >= 0.0));
        }
    }

    #[test]
    fn reconstruction_matches_factors() {
        let v = noise_magnitude(8, 9);
        let out = Nmf::new(2, 5).with_seed(Some(5)).factorize(&v).unwrap();
        let total = estimate_total(&out.bases, &out.activations).unwrap();
        assert_eq!(total, out.reconstruction);
    }

    #[test]
    fn same_seed_is_reproducible() {
        let v = noise_magnitude(12, 10);
        let nmf = Nmf::new(3, 20).with_seed(Some(42));
        let a = nmf.factorize(&v).unwrap();
        let b = nmf.factorize(&v).unwrap();
        assert_eq!(a.bases, b.bases);
        assert_eq!(a.activations, b.activations);
    }

    #[test]
    fn different_seeds_differ() {
        let v = noise_magnitude(12, 10);
        let a = Nmf::new(3, 5).with_seed(Some(1)).factorize(&v).unwrap();
        let b = Nmf::new(3, 5).with_seed(Some(2)).factorize(&v).unwrap();
        assert_ne!(a.bases, b.bases);
    }

    #[test]
    fn silence_factors_to_zero() {
        let v = Matrix::<f64>::zeros(10, 17);
        let out = Nmf::new(1, 10).factorize(&v).unwrap();
        assert!(out.converged);
        assert!(out.bases.as_slice().iter().all(|&x| x == 0.0));
        assert!(out.activations.as_slice().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn divergence_decreases() {
        let v = noise_magnitude(24, 20);
        let mut listener = RecordingListener {
            with_cost: true,
            ..Default::default()
        };
        Nmf::new(3, 30)
            .with_seed(Some(8))
            .factorize_with_listener(&v, &mut listener)
            .unwrap();

        let costs: Vec<f64> = listener
            .events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::Iteration { cost, .. } => *cost,
                _ => None,
            })
            .collect();
        assert_eq!(costs.len(), 30);
        for pair in costs.windows(2) {
            assert!(pair[1] <= pair[0] * (1.0 + 1e-9), "divergence rose: {pair:?}");
        }
    }

    #[test]
    fn tolerance_stops_early() {
        let v = noise_magnitude(10, 10);
        // rank-1 KL updates reach their fixed point in a single pass
        let out = Nmf::new(1, 500)
            .with_seed(Some(4))
            .with_tolerance(Some(1e-6))
            .factorize(&v)
            .unwrap();
        assert!(out.converged);
        assert!(out.iterations < 500, "ran {} iterations", out.iterations);
    }

    #[test]
    fn exhausted_budget_with_tolerance_is_not_converged() {
        let v = noise_magnitude(30, 30);
        let out = Nmf::new(8, 2)
            .with_seed(Some(4))
            .with_tolerance(Some(1e-15))
            .factorize(&v)
            .unwrap();
        assert_eq!(out.iterations, 2);
        assert!(!out.converged);
    }

    #[test]
    fn single_sine_is_captured_by_one_component() {
        // bin 32 of a 1024-point FFT, exactly periodic in the window
        let n = 64 * 512;
        let signal: Vec<f64> = (0..n)
            .map(|i| (2.0 * PI * 32.0 * i as f64 / 1024.0).sin())
            .collect();
        let stft = Stft::<f64>::new(1024, 1024, 512, WindowKind::Hann).unwrap();
        let v = magnitude(&stft.analyze(&signal).unwrap());

        let out = Nmf::new(1, 50).with_seed(Some(0)).factorize(&v).unwrap();
        let total = estimate_total(&out.bases, &out.activations).unwrap();

        let err: f64 = v
            .as_slice()
            .iter()
            .zip(total.as_slice())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f64>()
            .sqrt();
        let norm: f64 = v.as_slice().iter().map(|a| a * a).sum::<f64>().sqrt();
        assert!(err / norm < 0.02, "relative error {}", err / norm);
    }

    #[test]
    fn rejects_invalid_parameters() {
        let v = noise_magnitude(4, 4);
        assert!(matches!(
            Nmf::new(0, 10).factorize(&v),
            Err(NmfError::Configuration(_))
        ));
        assert!(matches!(
            Nmf::new(1, 0).factorize(&v),
            Err(NmfError::Configuration(_))
        ));
        assert!(matches!(
            Nmf::new(1, 10).factorize(&Matrix::<f64>::zeros(0, 0)),
            Err(NmfError::Configuration(_))
        ));
        let negative = Matrix::from_vec(1, 2, vec![1.0, -1.0]).unwrap();
        assert!(matches!(
            Nmf::new(1, 10).factorize(&negative),
            Err(NmfError::Configuration(_))
        ));
    }
}
