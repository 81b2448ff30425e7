use realfft::num_complex::Complex;

use crate::{Matrix, Result, Sample, Spectrogram};

/// Soft ratio mask isolating one component's share of the total estimate.
///
/// Two-phase: [`RatioMask::init`] captures the total magnitude once, then
/// [`RatioMask::process`] may be called for any number of components. Per bin
///
/// ```text
/// mask = clamp((component / max(total, ε))^exponent, 0, 1)
/// ```
///
/// and bins whose total is at or below `ε` get a mask of exactly zero.
/// Applying the mask scales the complex bin by a real non-negative factor,
/// so the original phase is kept.
pub struct RatioMask<T: Sample> {
    total: Matrix<T>,
}

impl<T: Sample> RatioMask<T> {
    pub fn init(total: Matrix<T>) -> Self {
        Self { total }
    }

    pub fn shape(&self) -> (usize, usize) {
        self.total.shape()
    }

    /// The mask values for `component`, one per bin.
    pub fn mask(&self, component: &Matrix<T>, exponent: T) -> Result<Matrix<T>> {
        let (rows, cols) = self.shape();
        component.expect_shape("component magnitude", rows, cols)?;

        let mut mask = Matrix::zeros(rows, cols);
        mask.as_mut_slice()
            .iter_mut()
            .zip(component.as_slice().iter().zip(self.total.as_slice()))
            .for_each(|(m, (&c, &t))| *m = mask_value(c, t, exponent));
        Ok(mask)
    }

    /// Writes the masked `spectrum` into `out`.
    pub fn process_into(
        &self,
        spectrum: &Spectrogram<T>,
        component: &Matrix<T>,
        exponent: T,
        out: &mut Spectrogram<T>,
    ) -> Result<()> {
        let (rows, cols) = self.shape();
        spectrum.expect_shape("spectrum", rows, cols)?;
        component.expect_shape("component magnitude", rows, cols)?;
        out.expect_shape("masked spectrum", rows, cols)?;

        out.as_mut_slice()
            .iter_mut()
            .zip(spectrum.as_slice())
            .zip(component.as_slice().iter().zip(self.total.as_slice()))
            .for_each(|((o, &x), (&c, &t))| {
                let m = mask_value(c, t, exponent);
                *o = Complex::new(x.re * m, x.im * m);
            });
        Ok(())
    }

    /// Returns the masked copy of `spectrum`.
    pub fn process(
        &self,
        spectrum: &Spectrogram<T>,
        component: &Matrix<T>,
        exponent: T,
    ) -> Result<Spectrogram<T>> {
        let (rows, cols) = self.shape();
        let mut out = Spectrogram::zeros(rows, cols);
        self.process_into(spectrum, component, exponent, &mut out)?;
        Ok(out)
    }
}

fn mask_value<T: Sample>(component: T, total: T, exponent: T) -> T {
    let eps = T::epsilon();
    if total.is_nan() || total <= eps {
        return T::zero();
    }
    let ratio = (component / total.max(eps)).powf(exponent);
    // NaN compares false on both sides and falls through to zero
    if ratio >= T::one() {
        T::one()
    } else if ratio > T::zero() {
        ratio
    } else {
        T::zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spectrum(values: &[(f64, f64)]) -> Spectrogram<f64> {
        let data = values.iter().map(|&(re, im)| Complex::new(re, im)).collect();
        Matrix::from_vec(1, values.len(), data).unwrap()
    }

    fn row(values: &[f64]) -> Matrix<f64> {
        Matrix::from_vec(1, values.len(), values.to_vec()).unwrap()
    }

    #[test]
    fn zero_total_gives_zero_mask() {
        let mask = RatioMask::init(row(&[0.0, 0.0, 1e-300]));
        let m = mask.mask(&row(&[0.0, 1.0, 1e-300]), 1.0).unwrap();
        assert_eq!(m.as_slice(), &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn mask_is_bounded() {
        let totals = [0.0, 1e-20, 0.5, 1.0, 3.0, 1e6];
        let components = [0.0, 1e-20, 0.25, 1.0, 5.0, 1e7];
        for &t in &totals {
            for &c in &components {
                for exponent in [0.5, 1.0, 2.0] {
                    let mask = RatioMask::init(row(&[t]));
                    let m = mask.mask(&row(&[c]), exponent).unwrap()[(0, 0)];
                    assert!(m.is_finite() && (0.0..=1.0).contains(&m), "mask {m} for {c}/{t}");
                }
            }
        }
    }

    #[test]
    fn masks_over_all_components_sum_to_one() {
        let parts = [row(&[1.0, 0.0, 2.5]), row(&[3.0, 0.0, 0.5]), row(&[0.5, 0.0, 7.0])];
        let mut total = row(&[0.0, 0.0, 0.0]);
        for p in &parts {
            for (t, &x) in total.as_mut_slice().iter_mut().zip(p.as_slice()) {
                *t += x;
            }
        }
        let mask = RatioMask::init(total);
        let mut sum = [0.0; 3];
        for p in &parts {
            let m = mask.mask(p, 1.0).unwrap();
            for (s, &x) in sum.iter_mut().zip(m.as_slice()) {
                *s += x;
            }
        }
        assert!((sum[0] - 1.0).abs() < 1e-12);
        assert_eq!(sum[1], 0.0);
        assert!((sum[2] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn process_scales_magnitude_and_keeps_phase() {
        let mask = RatioMask::init(row(&[4.0, 2.0]));
        let out = mask
            .process(&spectrum(&[(3.0, 4.0), (-1.0, 1.0)]), &row(&[1.0, 2.0]), 1.0)
            .unwrap();
        assert!((out[(0, 0)].re - 0.75).abs() < 1e-12);
        assert!((out[(0, 0)].im - 1.0).abs() < 1e-12);
        assert_eq!(out[(0, 1)], Complex::new(-1.0, 1.0));
        let phase_in = (4.0f64).atan2(3.0);
        assert!((out[(0, 0)].arg() - phase_in).abs() < 1e-12);
    }

    #[test]
    fn exponent_sharpens_mask() {
        let mask = RatioMask::init(row(&[4.0]));
        let soft = mask.mask(&row(&[2.0]), 1.0).unwrap()[(0, 0)];
        let hard = mask.mask(&row(&[2.0]), 2.0).unwrap()[(0, 0)];
        assert!((soft - 0.5).abs() < 1e-12);
        assert!((hard - 0.25).abs() < 1e-12);
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let mask = RatioMask::init(row(&[1.0, 1.0]));
        assert!(mask.mask(&row(&[1.0]), 1.0).is_err());
        assert!(mask
            .process(&spectrum(&[(1.0, 0.0)]), &row(&[1.0, 1.0]), 1.0)
            .is_err());
    }
}
