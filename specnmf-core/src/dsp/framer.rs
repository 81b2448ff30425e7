//! Splitting a signal into hop-aligned analysis frames and summing
//! synthesis frames back into a signal.
//!
//! Frames are laid out on the signal padded with `margin` zeros at each end.
//! Frame `i` starts at padded offset `i * hop`, but never past the point
//! where it would run off the padded end: trailing frames are pulled back to
//! end exactly at `len + margin`, so every frame other than the edge ones is
//! made of signal samples only. The margin is a small fraction of the window,
//! so the outermost samples keep a non-zero window weight while the cut to
//! zero falls where the taper has almost decayed.

use crate::{Matrix, NmfError, Result, Sample};

/// Frame grid for one window size and hop size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Framer {
    window_size: usize,
    hop_size: usize,
    margin: usize,
}

impl Framer {
    pub fn new(window_size: usize, hop_size: usize) -> Result<Self> {
        if window_size == 0 {
            return Err(NmfError::Configuration("window size must be positive".into()));
        }
        if hop_size == 0 {
            return Err(NmfError::Configuration("hop size must be positive".into()));
        }
        // 2 * margin <= window - hop keeps the pulled-back last frame within
        // one hop of its predecessor
        let margin = (window_size / 32).min(window_size.saturating_sub(hop_size) / 2);
        Ok(Self {
            window_size,
            hop_size,
            margin,
        })
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    /// Zeros of padding on each side of the signal.
    pub fn margin(&self) -> usize {
        self.margin
    }

    /// Number of frames for a signal of `signal_len` samples:
    /// `floor((signal_len + hop_size) / hop_size)`.
    ///
    /// The window size does not enter the count.
    pub fn frame_count(&self, signal_len: usize) -> usize {
        (signal_len + self.hop_size) / self.hop_size
    }

    /// Start of frame `frame_index` in padded coordinates (signal sample `s`
    /// sits at `s + margin`).
    pub fn frame_start(&self, frame_index: usize, signal_len: usize) -> usize {
        let last = (signal_len + 2 * self.margin).saturating_sub(self.window_size);
        (frame_index * self.hop_size).min(last)
    }

    /// The part of frame `frame_index` that holds signal samples, as
    /// `(offset into the frame, first signal sample, length)`.
    fn overlap(&self, frame_index: usize, signal_len: usize) -> (usize, usize, usize) {
        let start = self.frame_start(frame_index, signal_len);
        let first = start.max(self.margin);
        let end = (start + self.window_size).min(self.margin + signal_len);
        (first - start, first - self.margin, end.saturating_sub(first))
    }

    /// Copies frame `frame_index` into `out` (whose length is the window
    /// size), reading zeros outside `signal`.
    pub fn extract_frame_into<T: Sample>(&self, signal: &[T], frame_index: usize, out: &mut [T]) {
        out.fill(T::zero());
        let (offset, first, len) = self.overlap(frame_index, signal.len());
        let len = len.min(out.len().saturating_sub(offset));
        if len > 0 {
            out[offset..offset + len].copy_from_slice(&signal[first..first + len]);
        }
    }

    /// Returns frame `frame_index` as a new `window_size`-length vector.
    pub fn extract_frame<T: Sample>(&self, signal: &[T], frame_index: usize) -> Vec<T> {
        let mut frame = vec![T::zero(); self.window_size];
        self.extract_frame_into(signal, frame_index, &mut frame);
        frame
    }

    /// Sums the rows of `frames` (one synthesis frame per row) at the
    /// positions `extract_frame` read them from, for a signal of
    /// `output_len` samples.
    ///
    /// Frame content that lands in the padding is dropped.
    pub fn overlap_add<T: Sample>(&self, frames: &Matrix<T>, output_len: usize) -> Vec<T> {
        let mut output = vec![T::zero(); output_len];
        for (i, frame) in frames.iter_rows().enumerate() {
            self.accumulate(&mut output, frame, i);
        }
        output
    }

    /// Overlap-add of `frame_count` copies of the squared window: the gain a
    /// windowed analysis/synthesis pair applies to every output sample.
    pub fn window_envelope<T: Sample>(
        &self,
        window: &[T],
        frame_count: usize,
        output_len: usize,
    ) -> Vec<T> {
        let squared: Vec<T> = window.iter().map(|&w| w * w).collect();
        let mut envelope = vec![T::zero(); output_len];
        for i in 0..frame_count {
            self.accumulate(&mut envelope, &squared, i);
        }
        envelope
    }

    fn accumulate<T: Sample>(&self, output: &mut [T], frame: &[T], frame_index: usize) {
        let (offset, first, len) = self.overlap(frame_index, output.len());
        let len = len.min(frame.len().saturating_sub(offset));
        output[first..first + len]
            .iter_mut()
            .zip(&frame[offset..offset + len])
            .for_each(|(o, &x)| *o += x);
    }
}
