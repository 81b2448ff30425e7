use serde::{Deserialize, Serialize};

use crate::dsp::{magnitude::magnitude, stft::Stft};
use crate::listener::{NoOpListener, PipelineEvent, PipelineListener};
use crate::mask::RatioMask;
use crate::nmf::{self, Nmf};
use crate::{Matrix, NmfConfig, NmfError, NmfOptions, Result, Sample, Spectrogram};

/// Result of [`NmfPipeline::decompose`].
///
/// Self-contained: it can be persisted and later handed back to
/// [`NmfPipeline::resynthesize_component`] together with the same signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>"))]
pub struct Decomposition<T> {
    /// `K × B` spectral templates, one row per component.
    pub bases: Matrix<T>,
    /// `F × K` gains, one column per component.
    pub activations: Matrix<T>,
    pub components: usize,
    /// Update passes performed.
    pub iterations: usize,
    pub converged: bool,
}

/// Decomposes a signal into NMF components and resynthesizes them.
///
/// Holds only the immutable configuration and the FFT plans derived from it;
/// every matrix is allocated per call and dropped when the call returns, so
/// a pipeline can be shared between threads.
///
/// **decompose:** STFT → magnitude → NMF.
///
/// **resynthesize:** STFT (for phase) → per-component and total estimates →
/// ratio mask on the complex spectrum → iSTFT, trimmed to the input length.
pub struct NmfPipeline<T: Sample> {
    config: NmfConfig,
    stft: Stft<T>,
}

impl<T: Sample> NmfPipeline<T> {
    pub fn new(config: NmfConfig) -> Result<Self> {
        let stft = Stft::new(
            config.window_size(),
            config.fft_size(),
            config.hop_size(),
            config.window(),
        )?;
        Ok(Self { config, stft })
    }

    pub fn from_options(options: &NmfOptions) -> Result<Self> {
        Self::new(options.build()?)
    }

    pub fn config(&self) -> &NmfConfig {
        &self.config
    }

    pub fn decompose(&self, signal: &[T]) -> Result<Decomposition<T>> {
        self.decompose_with_listener(signal, &mut NoOpListener)
    }

    pub fn decompose_with_listener<L: PipelineListener>(
        &self,
        signal: &[T],
        listener: &mut L,
    ) -> Result<Decomposition<T>> {
        self.check_signal(signal)?;

        let magnitude = magnitude(&self.analyze(signal, listener)?);

        let factorization =
            Nmf::from_config(&self.config).factorize_with_listener(&magnitude, listener)?;

        Ok(Decomposition {
            bases: factorization.bases,
            activations: factorization.activations,
            components: self.config.components(),
            iterations: factorization.iterations,
            converged: factorization.converged,
        })
    }

    /// Resynthesizes component `component` of a factorization of `signal`.
    ///
    /// `bases` and `activations` may come from anywhere (a previous
    /// `decompose`, a file, a hand-built model) as long as they fit the frame
    /// and bin grid this configuration implies for `signal`. The component
    /// count is taken from `bases`. The output has `signal.len()` samples.
    pub fn resynthesize_component(
        &self,
        signal: &[T],
        bases: &Matrix<T>,
        activations: &Matrix<T>,
        component: usize,
    ) -> Result<Vec<T>> {
        self.resynthesize_component_with_listener(
            signal,
            bases,
            activations,
            component,
            &mut NoOpListener,
        )
    }

    pub fn resynthesize_component_with_listener<L: PipelineListener>(
        &self,
        signal: &[T],
        bases: &Matrix<T>,
        activations: &Matrix<T>,
        component: usize,
        listener: &mut L,
    ) -> Result<Vec<T>> {
        let components = self.check_factors(signal, bases, activations)?;
        if component >= components {
            return Err(NmfError::IndexOutOfRange {
                index: component,
                count: components,
            });
        }

        let spectrum = self.analyze(signal, listener)?;
        let mask = RatioMask::init(nmf::estimate_total(bases, activations)?);
        self.extract(signal.len(), &spectrum, &mask, bases, activations, component, listener)
    }

    /// Resynthesizes every component; entry `k` equals
    /// `resynthesize_component(signal, bases, activations, k)`.
    pub fn resynthesize_all(
        &self,
        signal: &[T],
        bases: &Matrix<T>,
        activations: &Matrix<T>,
    ) -> Result<Vec<Vec<T>>> {
        self.resynthesize_all_with_listener(signal, bases, activations, &mut NoOpListener)
    }

    pub fn resynthesize_all_with_listener<L: PipelineListener>(
        &self,
        signal: &[T],
        bases: &Matrix<T>,
        activations: &Matrix<T>,
        listener: &mut L,
    ) -> Result<Vec<Vec<T>>> {
        let components = self.check_factors(signal, bases, activations)?;

        let spectrum = self.analyze(signal, listener)?;
        let mask = RatioMask::init(nmf::estimate_total(bases, activations)?);
        (0..components)
            .map(|k| self.extract(signal.len(), &spectrum, &mask, bases, activations, k, listener))
            .collect()
    }

    fn analyze<L: PipelineListener>(&self, signal: &[T], listener: &mut L) -> Result<Spectrogram<T>> {
        let spectrum = self.stft.analyze(signal)?;
        listener.on_event(PipelineEvent::Analyzed {
            frames: spectrum.rows(),
            bins: spectrum.cols(),
        });
        Ok(spectrum)
    }

    #[allow(clippy::too_many_arguments)]
    fn extract<L: PipelineListener>(
        &self,
        length: usize,
        spectrum: &Spectrogram<T>,
        mask: &RatioMask<T>,
        bases: &Matrix<T>,
        activations: &Matrix<T>,
        component: usize,
        listener: &mut L,
    ) -> Result<Vec<T>> {
        let estimate = nmf::estimate(bases, activations, component)?;
        let masked = mask.process(spectrum, &estimate, T::one())?;
        listener.on_event(PipelineEvent::Masked {
            component,
            components: bases.rows(),
        });

        let output = self.stft.synthesize(&masked, length)?;
        listener.on_event(PipelineEvent::Resynthesized {
            component,
            samples: output.len(),
        });
        Ok(output)
    }

    fn check_signal(&self, signal: &[T]) -> Result<()> {
        let window_size = self.config.window_size();
        if signal.len() < window_size {
            return Err(NmfError::InputTooShort {
                len: signal.len(),
                window_size,
            });
        }
        log::debug!(
            "{} samples → {} frames x {} bins",
            signal.len(),
            self.config.num_frames(signal.len()),
            self.config.num_bins()
        );
        Ok(())
    }

    /// Validates a caller-supplied factorization against the grid implied by
    /// `signal`; returns the component count.
    fn check_factors(&self, signal: &[T], bases: &Matrix<T>, activations: &Matrix<T>) -> Result<usize> {
        self.check_signal(signal)?;
        let frames = self.config.num_frames(signal.len());
        let bins = self.config.num_bins();
        let components = bases.rows();

        bases.expect_shape("bases", components, bins)?;
        activations.expect_shape("activations", frames, components)?;
        Ok(components)
    }
}
