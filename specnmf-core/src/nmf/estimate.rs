//! Per-component and total magnitude estimates from a factorization.
//!
//! `estimate_total` is built from the very same accumulation `estimate`
//! performs, in component order, so summing every per-component estimate
//! yields the total bit for bit.

use crate::{Matrix, NmfError, Result, Sample};

/// Magnitude contribution of one component: the outer product of
/// activations column `component` (`F`) and bases row `component` (`B`).
pub fn estimate<T: Sample>(
    bases: &Matrix<T>,
    activations: &Matrix<T>,
    component: usize,
) -> Result<Matrix<T>> {
    check_factors(bases, activations)?;
    if component >= bases.rows() {
        return Err(NmfError::IndexOutOfRange {
            index: component,
            count: bases.rows(),
        });
    }
    let mut out = Matrix::zeros(activations.rows(), bases.cols());
    accumulate_component(bases, activations, component, &mut out);
    Ok(out)
}

/// Sum of every component's estimate, i.e. `activations · bases`.
pub fn estimate_total<T: Sample>(bases: &Matrix<T>, activations: &Matrix<T>) -> Result<Matrix<T>> {
    check_factors(bases, activations)?;
    let mut out = Matrix::zeros(activations.rows(), bases.cols());
    estimate_total_into(bases, activations, &mut out);
    Ok(out)
}

/// Overwrites `out` with `activations · bases`. Shapes must already agree.
pub(crate) fn estimate_total_into<T: Sample>(
    bases: &Matrix<T>,
    activations: &Matrix<T>,
    out: &mut Matrix<T>,
) {
    out.as_mut_slice().fill(T::zero());
    for k in 0..bases.rows() {
        accumulate_component(bases, activations, k, out);
    }
}

/// `out[f, b] += activations[f, k] * bases[k, b]`
fn accumulate_component<T: Sample>(
    bases: &Matrix<T>,
    activations: &Matrix<T>,
    k: usize,
    out: &mut Matrix<T>,
) {
    let basis = bases.row(k);
    for f in 0..activations.rows() {
        let gain = activations[(f, k)];
        out.row_mut(f)
            .iter_mut()
            .zip(basis)
            .for_each(|(o, &w)| *o += gain * w);
    }
}

/// Bases are `K × B`, activations `F × K`; the two `K` must agree.
fn check_factors<T>(bases: &Matrix<T>, activations: &Matrix<T>) -> Result<()> {
    if bases.rows() != activations.cols() {
        return Err(NmfError::ShapeMismatch {
            what: "activations",
            expected: (activations.rows(), bases.rows()),
            actual: activations.shape(),
        });
    }
    Ok(())
}
