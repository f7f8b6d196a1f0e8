//! Kernel trait definition

use crate::core::{KernelConfig, RepresentationSet, Result, SparsePoints};
use ndarray::Array2;

/// Similarity kernel between representation vectors and sparse points
///
/// The exponent is part of the kernel: every matrix returned here is already
/// raised to it.
pub trait Kernel: Send + Sync {
    /// Hyperparameters of this kernel
    fn config(&self) -> &KernelConfig;

    /// Sparse-sparse kernel (M x M)
    fn evaluate(&self, points: &SparsePoints) -> Result<Array2<f64>>;

    /// Cross kernel between structures and sparse points
    ///
    /// Returns the energy kernel (N x M), or with `gradients` set the
    /// derivative of it with respect to atomic positions (3P x M).
    fn evaluate_cross(
        &self,
        set: &RepresentationSet,
        points: &SparsePoints,
        gradients: bool,
    ) -> Result<Array2<f64>>;
}
