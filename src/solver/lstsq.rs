//! SVD least squares with a relative singular-value cutoff
//!
//! Rank deficiency is not an error here: singular values at or below
//! `rcond * s_max` are discarded and the minimum-norm solution is returned.

use crate::core::{GapError, Result};
use log::debug;
use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, ArrayView1, ArrayView2};

/// Result of a least-squares solve
#[derive(Debug, Clone)]
pub struct LeastSquares {
    /// Minimum-norm solution
    pub solution: Array1<f64>,
    /// Number of singular values kept
    pub rank: usize,
    /// Singular values of the system matrix
    pub singular_values: Array1<f64>,
    /// Absolute cutoff applied to the singular values
    pub cutoff: f64,
}

/// Default relative cutoff: machine precision times the largest dimension
pub fn default_rcond(rows: usize, cols: usize) -> f64 {
    f64::EPSILON * rows.max(cols) as f64
}

/// Solve `a x = b` in the least-squares sense
///
/// `rcond` is relative to the largest singular value; `None` uses
/// [`default_rcond`], which only drops singular values that are zero to
/// working precision.
pub fn lstsq(a: ArrayView2<f64>, b: ArrayView1<f64>, rcond: Option<f64>) -> Result<LeastSquares> {
    let (rows, cols) = a.dim();
    if b.len() != rows {
        return Err(GapError::dimension("least-squares right-hand side", rows, b.len()));
    }
    if let Some(r) = rcond {
        if !r.is_finite() || r < 0.0 {
            return Err(GapError::InvalidParameter(format!(
                "rcond must be finite and non-negative, got: {r}"
            )));
        }
    }

    if a.iter().any(|v| !v.is_finite()) {
        return Err(GapError::NumericalError(
            "least-squares system matrix contains non-finite values".to_string(),
        ));
    }
    if b.iter().any(|v| !v.is_finite()) {
        return Err(GapError::NumericalError(
            "least-squares right-hand side contains non-finite values".to_string(),
        ));
    }

    if rows == 0 || cols == 0 {
        return Ok(LeastSquares {
            solution: Array1::zeros(cols),
            rank: 0,
            singular_values: Array1::zeros(0),
            cutoff: 0.0,
        });
    }

    let rcond = rcond.unwrap_or_else(|| default_rcond(rows, cols));
    let matrix = DMatrix::from_fn(rows, cols, |i, j| a[[i, j]]);
    let rhs = DVector::from_iterator(rows, b.iter().copied());

    let svd = matrix
        .try_svd(true, true, f64::EPSILON, 0)
        .ok_or_else(|| GapError::NumericalError("SVD did not converge".to_string()))?;

    let s_max = svd.singular_values.iter().copied().fold(0.0, f64::max);
    let cutoff = rcond * s_max;
    let rank = svd.singular_values.iter().filter(|&&s| s > cutoff).count();
    if rank < rows.min(cols) {
        debug!(
            "Least-squares system is rank deficient: rank {} of {} (cutoff {:e})",
            rank,
            rows.min(cols),
            cutoff
        );
    }

    let x = svd
        .solve(&rhs, cutoff)
        .map_err(|e| GapError::NumericalError(e.to_string()))?;

    Ok(LeastSquares {
        solution: x.iter().copied().collect(),
        rank,
        singular_values: svd.singular_values.iter().copied().collect(),
        cutoff,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_square_system() {
        let a = array![[4.0, 1.0], [1.0, 3.0]];
        let b = array![1.0, 2.0];
        let result = lstsq(a.view(), b.view(), None).unwrap();

        assert_eq!(result.rank, 2);
        // Exact solution: [1/11, 7/11]
        assert_relative_eq!(result.solution[0], 1.0 / 11.0, epsilon = 1e-12);
        assert_relative_eq!(result.solution[1], 7.0 / 11.0, epsilon = 1e-12);
    }

    #[test]
    fn test_overdetermined_line_fit() {
        // y = 2x + 1 sampled exactly
        let a = array![[0.0, 1.0], [1.0, 1.0], [2.0, 1.0], [3.0, 1.0]];
        let b = array![1.0, 3.0, 5.0, 7.0];
        let result = lstsq(a.view(), b.view(), None).unwrap();

        assert_relative_eq!(result.solution[0], 2.0, epsilon = 1e-10);
        assert_relative_eq!(result.solution[1], 1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_singular_system_gives_minimum_norm_solution() {
        let a = array![[1.0, 1.0], [1.0, 1.0]];
        let b = array![2.0, 2.0];
        let result = lstsq(a.view(), b.view(), None).unwrap();

        assert_eq!(result.rank, 1);
        assert_relative_eq!(result.solution[0], 1.0, epsilon = 1e-10);
        assert_relative_eq!(result.solution[1], 1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_rcond_discards_small_singular_values() {
        let a = array![[1.0, 0.0], [0.0, 1e-10]];
        let b = array![1.0, 1.0];

        let default = lstsq(a.view(), b.view(), None).unwrap();
        assert_eq!(default.rank, 2);
        assert_relative_eq!(default.solution[1], 1e10, max_relative = 1e-6);

        let clipped = lstsq(a.view(), b.view(), Some(1e-6)).unwrap();
        assert_eq!(clipped.rank, 1);
        assert_relative_eq!(clipped.solution[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(clipped.solution[1], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_invalid_rcond() {
        let a = array![[1.0]];
        let b = array![1.0];
        assert!(lstsq(a.view(), b.view(), Some(-1.0)).is_err());
        assert!(lstsq(a.view(), b.view(), Some(f64::NAN)).is_err());
    }

    #[test]
    fn test_non_finite_input_is_error() {
        let a = array![[1.0, 0.0], [0.0, f64::NAN]];
        let b = array![1.0, 1.0];
        assert!(matches!(
            lstsq(a.view(), b.view(), None),
            Err(GapError::NumericalError(_))
        ));

        let a = array![[1.0, 0.0], [0.0, 1.0]];
        let b = array![f64::INFINITY, 1.0];
        assert!(matches!(
            lstsq(a.view(), b.view(), None),
            Err(GapError::NumericalError(_))
        ));
    }

    #[test]
    fn test_rhs_length_mismatch() {
        let a = array![[1.0, 0.0], [0.0, 1.0]];
        let b = array![1.0, 2.0, 3.0];
        assert!(matches!(
            lstsq(a.view(), b.view(), None),
            Err(GapError::DimensionMismatch {
                expected: 2,
                actual: 3,
                ..
            })
        ));
    }

    #[test]
    fn test_empty_system() {
        let a = ndarray::Array2::<f64>::zeros((0, 0));
        let b = ndarray::Array1::<f64>::zeros(0);
        let result = lstsq(a.view(), b.view(), None).unwrap();
        assert!(result.solution.is_empty());
        assert_eq!(result.rank, 0);
    }

    #[test]
    fn test_repeated_solves_are_identical() {
        let a = array![[2.0, 0.3, 0.1], [0.3, 1.5, 0.2], [0.1, 0.2, 1.1]];
        let b = array![0.4, -1.2, 2.5];
        let first = lstsq(a.view(), b.view(), None).unwrap();
        let second = lstsq(a.view(), b.view(), None).unwrap();
        assert_eq!(first.solution, second.solution);
    }
}
