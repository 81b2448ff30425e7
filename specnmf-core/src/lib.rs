//! Spectral decomposition of monophonic audio.
//!
//! The pipeline frames a signal, takes its short-time Fourier transform,
//! factors the magnitude spectrogram into `bases × activations` with
//! non-negative matrix factorization, and can resynthesize any single
//! component through a soft ratio mask applied to the original spectrum.

use std::iter::Sum;
use std::ops::AddAssign;

use realfft::num_traits::Float;
use realfft::FftNum;

pub mod config;
pub mod dsp;
pub mod error;
pub mod listener;
pub mod mask;
pub mod matrix;
pub mod nmf;
pub mod pipeline;

pub use config::{NmfConfig, NmfOptions};
pub use dsp::window::WindowKind;
pub use error::{NmfError, Result};
pub use matrix::{Matrix, Spectrogram};
pub use pipeline::{Decomposition, NmfPipeline};

/// Real sample type the whole pipeline is generic over (`f32` or `f64`).
pub trait Sample: FftNum + Float + Default + Sum + AddAssign {}

impl Sample for f32 {}
impl Sample for f64 {}

/// Converts an `f64` constant into the working sample type.
pub(crate) fn cast<T: Sample>(value: f64) -> T {
    T::from_f64(value).unwrap_or_else(T::zero)
}

pub(crate) const DEFAULT_COMPONENTS: usize = 1;
pub(crate) const DEFAULT_ITERATIONS: usize = 100;
pub(crate) const DEFAULT_FFT_SIZE: usize = 1024;
