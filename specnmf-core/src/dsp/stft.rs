use std::sync::Arc;

use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};

use super::{framer::Framer, window::WindowKind};
use crate::{Matrix, NmfError, Result, Sample, Spectrogram};

/// Short-Time Fourier Transform (STFT) and its inverse (ISTFT).
///
/// **Forward (`analyze`):**
///   1. Frame `i` reads `window_size` samples laid out by [`Framer`]
///   2. Multiply by the analysis window
///   3. Zero-pad to `fft_size` and take the real FFT → `fft_size/2 + 1` bins
///   4. `floor((len + hop) / hop)` frames, one spectrogram row each
///
/// **Inverse (`synthesize`):**
///   1. Inverse real FFT per row, scaled by `1 / fft_size`
///   2. Keep the first `window_size` samples and apply the synthesis window
///   3. Overlap-add, then divide by the overlap-added squared window
///   4. Output has exactly the requested length
///
/// The forward transform is unnormalized; the inverse `1 / fft_size` and the
/// squared-window envelope cancel both the FFT gain and the window gain, so
/// an untouched spectrogram reproduces its input. The frame layout gives
/// every sample a non-zero window weight, so that holds over the whole
/// signal.
pub struct Stft<T: Sample> {
    framer: Framer,
    fft_size: usize,
    window: Vec<T>,
    forward_plan: Arc<dyn RealToComplex<T>>,
    inverse_plan: Arc<dyn ComplexToReal<T>>,
}

impl<T: Sample> Stft<T> {
    /// Plans the transforms. Requires `0 < window_size <= fft_size` and
    /// `hop_size > 0`.
    pub fn new(
        window_size: usize,
        fft_size: usize,
        hop_size: usize,
        window: WindowKind,
    ) -> Result<Self> {
        let framer = Framer::new(window_size, hop_size)?;
        if window_size > fft_size {
            return Err(NmfError::Configuration(format!(
                "window size {} exceeds fft size {}",
                window_size, fft_size
            )));
        }
        let mut planner = RealFftPlanner::<T>::new();
        Ok(Stft {
            framer,
            fft_size,
            window: window.generate(window_size),
            forward_plan: planner.plan_fft_forward(fft_size),
            inverse_plan: planner.plan_fft_inverse(fft_size),
        })
    }

    /// Computes the forward STFT: a `num_frames(len) × num_bins()` spectrogram.
    pub fn analyze(&self, signal: &[T]) -> Result<Spectrogram<T>> {
        let num_frames = self.num_frames(signal.len());
        let bins = self.num_bins();
        let mut spectrogram = Spectrogram::zeros(num_frames, bins);

        let mut scratch = self.forward_plan.make_scratch_vec();
        let mut frame_time = self.forward_plan.make_input_vec();

        for f in 0..num_frames {
            // The FFT consumes its input buffer, so the zero-padding is restored per frame
            let (frame, padding) = frame_time.split_at_mut(self.framer.window_size());
            padding.fill(T::zero());
            self.framer.extract_frame_into(signal, f, frame);
            frame
                .iter_mut()
                .zip(self.window.iter())
                .for_each(|(x, &w)| *x = *x * w);

            self.forward_plan
                .process_with_scratch(&mut frame_time, spectrogram.row_mut(f), &mut scratch)
                .map_err(|e| NmfError::Dsp(format!("forward FFT failed: {}", e)))?;
        }

        Ok(spectrogram)
    }

    /// Computes the inverse STFT, reconstructing exactly `length` samples.
    pub fn synthesize(&self, spectrogram: &Spectrogram<T>, length: usize) -> Result<Vec<T>> {
        let bins = self.num_bins();
        if spectrogram.cols() != bins {
            return Err(NmfError::ShapeMismatch {
                what: "spectrogram",
                expected: (spectrogram.rows(), bins),
                actual: spectrogram.shape(),
            });
        }
        let num_frames = spectrogram.rows();

        let mut frames = Matrix::zeros(num_frames, self.framer.window_size());
        let mut frame_freq = self.inverse_plan.make_input_vec();
        let mut frame_time = self.inverse_plan.make_output_vec();
        let mut scratch = self.inverse_plan.make_scratch_vec();
        let norm = T::one() / crate::cast::<T>(self.fft_size as f64);

        for f in 0..num_frames {
            frame_freq.copy_from_slice(spectrogram.row(f));

            // realfft requires DC and Nyquist to have zero imaginary part
            frame_freq[0].im = T::zero();
            frame_freq[bins - 1].im = T::zero();

            self.inverse_plan
                .process_with_scratch(&mut frame_freq, &mut frame_time, &mut scratch)
                .map_err(|e| NmfError::Dsp(format!("inverse FFT failed: {}", e)))?;

            frames
                .row_mut(f)
                .iter_mut()
                .zip(frame_time.iter().zip(self.window.iter()))
                .for_each(|(out, (&x, &w))| *out = x * norm * w);
        }

        let mut output = self.framer.overlap_add(&frames, length);
        let envelope = self.framer.window_envelope(&self.window, num_frames, length);

        // Only reached when the rows do not cover the signal (hop > window)
        let floor = T::min_positive_value();
        for (x, &e) in output.iter_mut().zip(envelope.iter()) {
            if e > floor {
                *x = *x / e;
            }
        }

        Ok(output)
    }

    /// Number of frequency bins per frame (`fft_size / 2 + 1`).
    pub fn num_bins(&self) -> usize {
        self.fft_size / 2 + 1
    }

    /// Number of frames for a signal of `len` samples.
    pub fn num_frames(&self, len: usize) -> usize {
        self.framer.frame_count(len)
    }
}
