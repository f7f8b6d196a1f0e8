//! Dot-product power kernel
//!
//! The kernel between a structure representation `x` and a sparse point `s` is
//! K(x, s) = (x · s)^ζ
//!
//! Where ζ (the exponent) introduces the nonlinearity. Common configurations:
//! - Linear kernel: ζ=1
//! - Default GAP kernel: ζ=2
//!
//! Position gradients follow from the chain rule:
//! ∂K/∂r = ζ (x · s)^(ζ-1) (∂x/∂r · s)

use crate::core::{GapError, KernelConfig, RepresentationSet, Result, SparsePoints};
use crate::kernel::traits::Kernel;
use log::debug;
use ndarray::Array2;

/// Dot-product kernel raised to an integer exponent
#[derive(Debug, Clone, PartialEq)]
pub struct PowerKernel {
    config: KernelConfig,
}

impl PowerKernel {
    /// Creates a kernel from a validated configuration
    ///
    /// # Examples
    /// ```
    /// use rgap::core::KernelConfig;
    /// use rgap::kernel::PowerKernel;
    ///
    /// let kernel = PowerKernel::new(KernelConfig::default()).unwrap();
    /// assert_eq!(kernel.exponent(), 2);
    /// ```
    pub fn new(config: KernelConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Creates a whole-structure sparse kernel with the given exponent
    ///
    /// # Examples
    /// ```
    /// use rgap::kernel::PowerKernel;
    ///
    /// assert!(PowerKernel::with_exponent(3).is_ok());
    /// assert!(PowerKernel::with_exponent(0).is_err());
    /// ```
    pub fn with_exponent(exponent: u32) -> Result<Self> {
        Self::new(KernelConfig::with_exponent(exponent))
    }

    pub fn exponent(&self) -> u32 {
        self.config.exponent
    }

    fn value(&self, dot: f64) -> f64 {
        dot.powi(self.config.exponent as i32)
    }

    /// dK/d(dot)
    fn derivative(&self, dot: f64) -> f64 {
        let zeta = self.config.exponent as i32;
        f64::from(zeta) * dot.powi(zeta - 1)
    }

    fn check_dim(&self, expected: usize, points: &SparsePoints) -> Result<()> {
        if points.dim() != expected {
            return Err(GapError::dimension(
                "sparse point feature dimension",
                expected,
                points.dim(),
            ));
        }
        Ok(())
    }
}

impl Kernel for PowerKernel {
    fn config(&self) -> &KernelConfig {
        &self.config
    }

    fn evaluate(&self, points: &SparsePoints) -> Result<Array2<f64>> {
        let p = points.points();
        Ok(p.dot(&p.t()).mapv(|d| self.value(d)))
    }

    fn evaluate_cross(
        &self,
        set: &RepresentationSet,
        points: &SparsePoints,
        gradients: bool,
    ) -> Result<Array2<f64>> {
        self.check_dim(set.dim(), points)?;
        let dots = set.features().dot(&points.points().t());

        if !gradients {
            return Ok(dots.mapv(|d| self.value(d)));
        }

        let feature_gradients = set.gradients().ok_or_else(|| {
            GapError::InvalidParameter(
                "Gradient kernel requested but the representation has no gradients".to_string(),
            )
        })?;
        let mut grad = feature_gradients.dot(&points.points().t());
        debug!(
            "Gradient kernel: {} rows x {} sparse points",
            grad.nrows(),
            grad.ncols()
        );

        // Rows of atom a (of structure i) scale with dK/d(dot) at (i, m)
        let mut row = 0;
        for (i, &n_atoms) in set.atom_counts().iter().enumerate() {
            let scale = dots.row(i).mapv(|d| self.derivative(d));
            for _ in 0..3 * n_atoms {
                let mut grad_row = grad.row_mut(row);
                grad_row *= &scale;
                row += 1;
            }
        }

        Ok(grad)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn sparse(points: Array2<f64>) -> SparsePoints {
        let n = points.nrows();
        SparsePoints::new(points, vec![1; n]).unwrap()
    }

    #[test]
    fn test_power_kernel_creation() {
        let kernel = PowerKernel::with_exponent(4).unwrap();
        assert_eq!(kernel.exponent(), 4);
        assert_eq!(kernel.config().exponent, 4);
    }

    #[test]
    fn test_sparse_sparse_kernel() {
        let kernel = PowerKernel::with_exponent(2).unwrap();
        let points = sparse(array![[1.0, 2.0], [2.0, 1.0]]);

        // Dots: [[5, 4], [4, 5]] -> squared
        let k_mm = kernel.evaluate(&points).unwrap();
        assert_eq!(k_mm.dim(), (2, 2));
        assert_relative_eq!(k_mm[[0, 0]], 25.0, epsilon = 1e-12);
        assert_relative_eq!(k_mm[[0, 1]], 16.0, epsilon = 1e-12);
        assert_relative_eq!(k_mm[[1, 0]], 16.0, epsilon = 1e-12);
        assert_relative_eq!(k_mm[[1, 1]], 25.0, epsilon = 1e-12);
    }

    #[test]
    fn test_energy_cross_kernel() {
        let kernel = PowerKernel::with_exponent(3).unwrap();
        let set =
            RepresentationSet::new(array![[1.0, 0.0], [0.5, 0.5], [0.0, 2.0]], vec![1, 2, 1])
                .unwrap();
        let points = sparse(array![[1.0, 1.0]]);

        let k_nm = kernel.evaluate_cross(&set, &points, false).unwrap();
        assert_eq!(k_nm.dim(), (3, 1));
        assert_relative_eq!(k_nm[[0, 0]], 1.0, epsilon = 1e-12);
        assert_relative_eq!(k_nm[[1, 0]], 1.0, epsilon = 1e-12);
        assert_relative_eq!(k_nm[[2, 0]], 8.0, epsilon = 1e-12);
    }

    #[test]
    fn test_gradient_kernel_chain_rule() {
        let kernel = PowerKernel::with_exponent(2).unwrap();
        // One structure of one atom; feature x = [1, 2]
        // dx/dr_x = [1, 0], dx/dr_y = [0, 1], dx/dr_z = [0, 0]
        let set = RepresentationSet::new(array![[1.0, 2.0]], vec![1])
            .unwrap()
            .with_gradients(array![[1.0, 0.0], [0.0, 1.0], [0.0, 0.0]])
            .unwrap();
        let points = sparse(array![[3.0, 1.0]]);

        // x·s = 5, dK/d(dot) = 2 * 5 = 10
        let grad = kernel.evaluate_cross(&set, &points, true).unwrap();
        assert_eq!(grad.dim(), (3, 1));
        assert_relative_eq!(grad[[0, 0]], 30.0, epsilon = 1e-12);
        assert_relative_eq!(grad[[1, 0]], 10.0, epsilon = 1e-12);
        assert_relative_eq!(grad[[2, 0]], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_gradient_rows_follow_owning_structure() {
        let kernel = PowerKernel::with_exponent(2).unwrap();
        // Structure 0 has 1 atom, structure 1 has 2 atoms
        let mut gradients = Array2::zeros((9, 1));
        gradients.fill(1.0);
        let set = RepresentationSet::new(array![[1.0], [3.0]], vec![1, 2])
            .unwrap()
            .with_gradients(gradients)
            .unwrap();
        let points = sparse(array![[1.0]]);

        let grad = kernel.evaluate_cross(&set, &points, true).unwrap();
        assert_eq!(grad.nrows(), 9);
        // Structure 0: 2 * 1 = 2; structure 1: 2 * 3 = 6
        for r in 0..3 {
            assert_relative_eq!(grad[[r, 0]], 2.0, epsilon = 1e-12);
        }
        for r in 3..9 {
            assert_relative_eq!(grad[[r, 0]], 6.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_linear_kernel_gradient_is_feature_gradient() {
        let kernel = PowerKernel::with_exponent(1).unwrap();
        let set = RepresentationSet::new(array![[0.0, 0.0]], vec![1])
            .unwrap()
            .with_gradients(array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]])
            .unwrap();
        let points = sparse(array![[1.0, 1.0]]);

        let grad = kernel.evaluate_cross(&set, &points, true).unwrap();
        assert_relative_eq!(grad[[0, 0]], 3.0, epsilon = 1e-12);
        assert_relative_eq!(grad[[1, 0]], 7.0, epsilon = 1e-12);
        assert_relative_eq!(grad[[2, 0]], 11.0, epsilon = 1e-12);
    }

    #[test]
    fn test_gradient_requires_representation_gradients() {
        let kernel = PowerKernel::with_exponent(2).unwrap();
        let set = RepresentationSet::new(array![[1.0, 0.0]], vec![1]).unwrap();
        let points = sparse(array![[1.0, 0.0]]);
        let result = kernel.evaluate_cross(&set, &points, true);
        assert!(matches!(result, Err(GapError::InvalidParameter(_))));
    }

    #[test]
    fn test_dimension_mismatch() {
        let kernel = PowerKernel::with_exponent(2).unwrap();
        let set = RepresentationSet::new(array![[1.0, 0.0]], vec![1]).unwrap();
        let points = sparse(array![[1.0, 0.0, 0.0]]);
        let result = kernel.evaluate_cross(&set, &points, false);
        assert!(matches!(
            result,
            Err(GapError::DimensionMismatch {
                expected: 2,
                actual: 3,
                ..
            })
        ));
    }
}
