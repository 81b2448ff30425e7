use crate::{Matrix, Sample, Spectrogram};

/// Elementwise complex modulus of a spectrogram.
pub fn magnitude<T: Sample>(spectrogram: &Spectrogram<T>) -> Matrix<T> {
    spectrogram.map(|c| c.norm())
}
