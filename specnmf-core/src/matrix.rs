use std::ops::{Index, IndexMut};

use realfft::num_complex::Complex;
use realfft::num_traits::Zero;
use serde::{Deserialize, Serialize};

use crate::{NmfError, Result};

/// Dense row-major matrix.
///
/// Every matrix in the pipeline uses frames (or components) as rows, so the
/// layout matches the flat `[frame × bin]` buffers the STFT produces:
/// `data[row * cols + col]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMatrix<E>", bound(deserialize = "E: Deserialize<'de>"))]
pub struct Matrix<E> {
    rows: usize,
    cols: usize,
    data: Vec<E>,
}

/// Complex `F × B` spectrogram, one row per frame.
pub type Spectrogram<T> = Matrix<Complex<T>>;

#[derive(Deserialize)]
struct RawMatrix<E> {
    rows: usize,
    cols: usize,
    data: Vec<E>,
}

impl<E> TryFrom<RawMatrix<E>> for Matrix<E> {
    type Error = NmfError;

    fn try_from(raw: RawMatrix<E>) -> Result<Self> {
        Matrix::from_vec(raw.rows, raw.cols, raw.data)
    }
}

impl<E> Matrix<E> {
    /// Wraps a flat row-major buffer, checking that it holds `rows * cols` values.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<E>) -> Result<Self> {
        if rows.checked_mul(cols) != Some(data.len()) {
            return Err(NmfError::ShapeMismatch {
                what: "matrix buffer",
                expected: (rows, cols),
                actual: (data.len() / cols.max(1), cols),
            });
        }
        Ok(Self { rows, cols, data })
    }

    /// Builds a matrix by calling `f(row, col)` in row-major order.
    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> E) -> Self {
        let mut data = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                data.push(f(r, c));
            }
        }
        Self { rows, cols, data }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn row(&self, row: usize) -> &[E] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn row_mut(&mut self, row: usize) -> &mut [E] {
        &mut self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[E]> {
        // chunks_exact panics on a zero chunk size
        self.data.chunks_exact(self.cols.max(1)).take(self.rows)
    }

    pub fn as_slice(&self) -> &[E] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [E] {
        &mut self.data
    }

    /// Applies `f` elementwise, producing a matrix of the same shape.
    pub fn map<U>(&self, f: impl FnMut(&E) -> U) -> Matrix<U> {
        Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(f).collect(),
        }
    }

    /// Fails with `ShapeMismatch` unless the matrix is `rows × cols`.
    pub(crate) fn expect_shape(&self, what: &'static str, rows: usize, cols: usize) -> Result<()> {
        if self.shape() != (rows, cols) {
            return Err(NmfError::ShapeMismatch {
                what,
                expected: (rows, cols),
                actual: self.shape(),
            });
        }
        Ok(())
    }
}

impl<E: Clone> Matrix<E> {
    pub fn from_elem(rows: usize, cols: usize, value: E) -> Self {
        Self {
            rows,
            cols,
            data: vec![value; rows * cols],
        }
    }

    /// Builds a matrix from nested rows; every row must have the same length.
    pub fn from_rows(rows: &[Vec<E>]) -> Result<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            if row.len() != cols {
                return Err(NmfError::ShapeMismatch {
                    what: "matrix row",
                    expected: (1, cols),
                    actual: (1, row.len()),
                });
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data,
        })
    }

    pub fn to_rows(&self) -> Vec<Vec<E>> {
        self.iter_rows().map(<[E]>::to_vec).collect()
    }
}

impl<E: Clone + Zero> Matrix<E> {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self::from_elem(rows, cols, E::zero())
    }
}

impl<E> Index<(usize, usize)> for Matrix<E> {
    type Output = E;

    fn index(&self, (row, col): (usize, usize)) -> &E {
        debug_assert!(row < self.rows && col < self.cols);
        &self.data[row * self.cols + col]
    }
}

impl<E> IndexMut<(usize, usize)> for Matrix<E> {
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut E {
        debug_assert!(row < self.rows && col < self.cols);
        &mut self.data[row * self.cols + col]
    }
}
