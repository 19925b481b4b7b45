//! Dense row-major matrices and the serial reference product
//!
//! The benchmark only ever multiplies square matrices, but the type keeps
//! `rows`/`cols` separate so shape errors are caught instead of silently
//! indexing out of range.
//!
//! # Example
//!
//! ```
//! use tiled_matmul::Matrix;
//!
//! let a = Matrix::from_vec(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
//! let b = Matrix::from_vec(2, 2, vec![5.0, 6.0, 7.0, 8.0]).unwrap();
//! let c = a.matmul_serial(&b).unwrap();
//! assert_eq!(c.as_slice(), &[19.0, 22.0, 43.0, 50.0]);
//! ```

use std::fmt;

use rand::Rng;
use serde::Serialize;
use tracing::instrument;

use crate::error::{MatmulError, Result};

/// A 2D matrix with row-major storage
///
/// For a 2x3 matrix:
/// ```text
/// [[a, b, c],
///  [d, e, f]]
/// ```
/// Data is stored as: [a, b, c, d, e, f]. This is also the layout uploaded
/// to the GPU, so element `(i, j)` lives at `i * cols + j` on both sides.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

/// First element at which two matrices differ bitwise
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Mismatch {
    /// Row index
    pub row: usize,
    /// Column index
    pub col: usize,
    /// Value in the left-hand matrix
    pub left: f32,
    /// Value in the right-hand matrix
    pub right: f32,
}

impl Matrix {
    /// Creates a `rows x cols` matrix filled with zeros
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Matrix {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Creates an `n x n` matrix filled with zeros
    pub fn square(n: usize) -> Self {
        Self::zeros(n, n)
    }

    /// Creates a matrix from row-major data
    ///
    /// # Errors
    ///
    /// Returns `SizeMismatch` if `data.len() != rows * cols`
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(MatmulError::SizeMismatch {
                expected: rows * cols,
                actual: data.len(),
            });
        }
        Ok(Matrix { rows, cols, data })
    }

    /// Fills a matrix with integers drawn uniformly from `0..max_exclusive`,
    /// stored as `f32`
    ///
    /// Small non-negative integers keep every partial sum exactly
    /// representable, which is what makes a bitwise comparison between the
    /// serial and GPU products meaningful.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if `max_exclusive` is zero
    pub fn random_integers<R: Rng + ?Sized>(
        rows: usize,
        cols: usize,
        max_exclusive: u32,
        rng: &mut R,
    ) -> Result<Self> {
        if max_exclusive == 0 {
            return Err(MatmulError::InvalidInput(
                "random value bound must be at least 1".to_string(),
            ));
        }
        let data = (0..rows * cols)
            .map(|_| rng.gen_range(0..max_exclusive) as f32)
            .collect();
        Ok(Matrix { rows, cols, data })
    }

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// `(rows, cols)`
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Whether the matrix is `n x n`
    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    /// Element at `(row, col)`, `None` when out of bounds
    pub fn get(&self, row: usize, col: usize) -> Option<&f32> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.data.get(row * self.cols + col)
    }

    /// Mutable element at `(row, col)`, `None` when out of bounds
    pub fn get_mut(&mut self, row: usize, col: usize) -> Option<&mut f32> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.data.get_mut(row * self.cols + col)
    }

    /// Row-major backing slice
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Consumes the matrix and returns its row-major data
    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// Naive O(n³) product, `C[i][j] += A[i][k] * B[k][j]` with `k` ascending
    ///
    /// This is the reference the GPU result is checked against: the
    /// accumulation order per output element is the same as the kernel's.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the inner dimensions differ
    #[instrument(skip(self, other), fields(dims = %format!("{}x{} @ {}x{}", self.rows, self.cols, other.rows, other.cols)))]
    pub fn matmul_serial(&self, other: &Matrix) -> Result<Matrix> {
        if self.cols != other.rows {
            return Err(MatmulError::InvalidInput(format!(
                "Matrix dimension mismatch for multiplication: {}×{} × {}×{}",
                self.rows, self.cols, other.rows, other.cols
            )));
        }

        let n = other.cols;
        let mut result = Matrix::zeros(self.rows, n);
        for i in 0..self.rows {
            for j in 0..n {
                let out = &mut result.data[i * n + j];
                for k in 0..self.cols {
                    *out += self.data[i * self.cols + k] * other.data[k * n + j];
                }
            }
        }
        Ok(result)
    }

    /// Exact element-wise equality on the bit patterns
    ///
    /// Unlike `PartialEq`, `-0.0` and `0.0` differ and identical NaNs match.
    pub fn bitwise_eq(&self, other: &Matrix) -> bool {
        self.shape() == other.shape() && self.first_mismatch(other).is_none()
    }

    /// First `(row, col)` in row-major order where the bit patterns differ
    ///
    /// Returns `None` when the matrices are identical. A shape mismatch is
    /// reported at `(0, 0)`.
    pub fn first_mismatch(&self, other: &Matrix) -> Option<Mismatch> {
        if self.shape() != other.shape() {
            return Some(Mismatch {
                row: 0,
                col: 0,
                left: self.data.first().copied().unwrap_or(f32::NAN),
                right: other.data.first().copied().unwrap_or(f32::NAN),
            });
        }
        self.data
            .iter()
            .zip(&other.data)
            .position(|(l, r)| l.to_bits() != r.to_bits())
            .map(|idx| Mismatch {
                row: idx / self.cols,
                col: idx % self.cols,
                left: self.data[idx],
                right: other.data[idx],
            })
    }

    /// Renders the matrix under a `Matrix <tag>:` header
    pub fn to_tagged_string(&self, tag: &str) -> String {
        format!("Matrix {tag}:\n{self}")
    }
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.data.chunks(self.cols.max(1)).take(self.rows) {
            for value in row {
                write!(f, "{value:6.1}   ")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_matrix_zeros() {
        let m = Matrix::zeros(2, 3);
        assert_eq!(m.shape(), (2, 3));
        assert!(m.as_slice().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_matrix_from_vec_invalid_size() {
        let err = Matrix::from_vec(2, 2, vec![1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(
            err,
            MatmulError::SizeMismatch {
                expected: 4,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_matrix_get_out_of_bounds() {
        let m = Matrix::square(2);
        assert_eq!(m.get(0, 1), Some(&0.0));
        assert_eq!(m.get(2, 0), None);
        assert_eq!(m.get(0, 2), None);
    }

    #[test]
    fn test_get_mut_writes_row_major() {
        let mut m = Matrix::zeros(2, 3);
        *m.get_mut(1, 2).unwrap() = 7.0;
        assert_eq!(m.as_slice()[5], 7.0);
    }

    #[test]
    fn test_random_integers_range() {
        let mut rng = StdRng::seed_from_u64(42);
        let m = Matrix::random_integers(16, 16, 10, &mut rng).unwrap();
        assert!(m
            .as_slice()
            .iter()
            .all(|&x| (0.0..10.0).contains(&x) && x.fract() == 0.0));
    }

    #[test]
    fn test_random_integers_seeded_is_reproducible() {
        let a = Matrix::random_integers(8, 8, 10, &mut StdRng::seed_from_u64(7)).unwrap();
        let b = Matrix::random_integers(8, 8, 10, &mut StdRng::seed_from_u64(7)).unwrap();
        assert!(a.bitwise_eq(&b));
    }

    #[test]
    fn test_random_integers_zero_bound() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(Matrix::random_integers(2, 2, 0, &mut rng).is_err());
    }

    #[test]
    fn test_matmul_serial_basic() {
        let a = Matrix::from_vec(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let b = Matrix::from_vec(2, 2, vec![5.0, 6.0, 7.0, 8.0]).unwrap();
        let c = a.matmul_serial(&b).unwrap();
        assert_eq!(c.as_slice(), &[19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn test_matmul_serial_non_square() {
        let a = Matrix::from_vec(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let b = Matrix::from_vec(3, 1, vec![1.0, 0.0, 2.0]).unwrap();
        let c = a.matmul_serial(&b).unwrap();
        assert_eq!(c.shape(), (2, 1));
        assert_eq!(c.as_slice(), &[7.0, 16.0]);
    }

    #[test]
    fn test_matmul_serial_dimension_mismatch() {
        let a = Matrix::zeros(2, 3);
        let b = Matrix::zeros(2, 3);
        assert!(matches!(
            a.matmul_serial(&b),
            Err(MatmulError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_first_mismatch_reports_position() {
        let a = Matrix::from_vec(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let mut b = a.clone();
        *b.get_mut(1, 0).unwrap() = 3.5;
        let m = a.first_mismatch(&b).unwrap();
        assert_eq!((m.row, m.col), (1, 0));
        assert_eq!((m.left, m.right), (3.0, 3.5));
        assert!(!a.bitwise_eq(&b));
    }

    #[test]
    fn test_bitwise_eq_distinguishes_signed_zero() {
        let a = Matrix::from_vec(1, 1, vec![0.0]).unwrap();
        let b = Matrix::from_vec(1, 1, vec![-0.0]).unwrap();
        assert_eq!(a, b);
        assert!(!a.bitwise_eq(&b));
    }

    #[test]
    fn test_bitwise_eq_shape_mismatch() {
        let a = Matrix::zeros(2, 3);
        let b = Matrix::zeros(3, 2);
        assert!(!a.bitwise_eq(&b));
    }

    #[test]
    fn test_tagged_string_layout() {
        let m = Matrix::from_vec(1, 2, vec![1.0, 12.5]).unwrap();
        assert_eq!(m.to_tagged_string("A"), "Matrix A:\n   1.0     12.5   \n");
    }
}
