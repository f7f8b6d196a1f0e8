//! Kernel assembly for a sparse GAP fit
//!
//! Builds the three kernel matrices the fitting core consumes:
//! - sparse-sparse `K_MM` (M x M), optional when only evaluating a fit
//! - train-sparse energy kernel `K_NM_E` (N x M)
//! - train-sparse gradient kernel `K_NM_F` (3P x M), only when fitting forces
//!
//! Every non-empty matrix is also handed to an [`ArtifactSink`].

use crate::core::{KernelConfig, RepresentationSet, Result, SparsePoints};
use crate::kernel::{Kernel, PowerKernel};
use crate::sink::{ArtifactSink, ENERGY_KERNEL, GRADIENT_KERNEL, SPARSE_KERNEL};
use log::info;
use ndarray::Array2;

/// Which matrices to build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssemblyOptions {
    /// Build `K_MM`; not needed to evaluate an existing fit on new data
    pub compute_sparse_kernel: bool,
    /// Build the gradient kernel for force fitting
    pub do_gradients: bool,
}

impl Default for AssemblyOptions {
    fn default() -> Self {
        Self {
            compute_sparse_kernel: true,
            do_gradients: true,
        }
    }
}

/// Output of kernel assembly
#[derive(Debug, Clone)]
pub struct KernelSet<K: Kernel> {
    /// The kernel, carrying its hyperparameters
    pub kernel: K,
    /// `K_MM`, or a 0x0 array when it was skipped
    pub sparse: Array2<f64>,
    /// `K_NM_E`
    pub energy: Array2<f64>,
    /// `K_NM_F`, present only when gradients were requested
    pub gradient: Option<Array2<f64>>,
}

/// Kernel assembler with builder-style options
pub struct KernelAssembler<K: Kernel = PowerKernel> {
    kernel: K,
    options: AssemblyOptions,
}

impl KernelAssembler<PowerKernel> {
    /// Assembler for the dot-product power kernel described by `config`
    pub fn new(config: KernelConfig) -> Result<Self> {
        Ok(Self::with_kernel(PowerKernel::new(config)?))
    }
}

impl<K: Kernel> KernelAssembler<K> {
    /// Assembler using a custom kernel
    pub fn with_kernel(kernel: K) -> Self {
        Self {
            kernel,
            options: AssemblyOptions::default(),
        }
    }

    pub fn with_options(mut self, options: AssemblyOptions) -> Self {
        self.options = options;
        self
    }

    /// Whether to build `K_MM`
    pub fn with_sparse_kernel(mut self, compute: bool) -> Self {
        self.options.compute_sparse_kernel = compute;
        self
    }

    /// Whether to build the gradient kernel
    pub fn with_gradients(mut self, compute: bool) -> Self {
        self.options.do_gradients = compute;
        self
    }

    pub fn options(&self) -> &AssemblyOptions {
        &self.options
    }

    /// Build the requested kernels, persisting each through `sink`
    pub fn assemble<S: ArtifactSink>(
        self,
        set: &RepresentationSet,
        points: &SparsePoints,
        sink: &mut S,
    ) -> Result<KernelSet<K>> {
        info!(
            "Assembling kernels: {} structures, {} atoms, {} sparse points, exponent {}",
            set.n_structures(),
            set.n_atoms(),
            points.len(),
            self.kernel.config().exponent
        );

        let sparse = if self.options.compute_sparse_kernel {
            let k_mm = self.kernel.evaluate(points)?;
            sink.write_matrix(SPARSE_KERNEL, &k_mm)?;
            k_mm
        } else {
            Array2::zeros((0, 0))
        };

        let energy = self.kernel.evaluate_cross(set, points, false)?;
        sink.write_matrix(ENERGY_KERNEL, &energy)?;

        let gradient = if self.options.do_gradients {
            let k_grad = self.kernel.evaluate_cross(set, points, true)?;
            sink.write_matrix(GRADIENT_KERNEL, &k_grad)?;
            Some(k_grad)
        } else {
            None
        };

        Ok(KernelSet {
            kernel: self.kernel,
            sparse,
            energy,
            gradient,
        })
    }
}

/// Build the kernels for a GAP fit with the power kernel described by `config`
pub fn compute_kernels<S: ArtifactSink>(
    config: KernelConfig,
    set: &RepresentationSet,
    points: &SparsePoints,
    options: AssemblyOptions,
    sink: &mut S,
) -> Result<KernelSet<PowerKernel>> {
    KernelAssembler::new(config)?
        .with_options(options)
        .assemble(set, points, sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::GapError;
    use crate::sink::{MemorySink, NullSink};
    use ndarray::array;

    fn training_set(with_gradients: bool) -> RepresentationSet {
        let set = RepresentationSet::new(array![[1.0, 0.0], [0.6, 0.8]], vec![1, 2]).unwrap();
        if with_gradients {
            set.with_gradients(Array2::from_elem((9, 2), 0.1)).unwrap()
        } else {
            set
        }
    }

    fn sparse_points() -> SparsePoints {
        SparsePoints::new(array![[1.0, 0.0], [0.0, 1.0], [0.6, 0.8]], vec![1, 1, 8]).unwrap()
    }

    #[test]
    fn test_assemble_all_kernels() {
        let mut sink = MemorySink::new();
        let kernels = KernelAssembler::new(KernelConfig::default())
            .unwrap()
            .assemble(&training_set(true), &sparse_points(), &mut sink)
            .unwrap();

        assert_eq!(kernels.sparse.dim(), (3, 3));
        assert_eq!(kernels.energy.dim(), (2, 3));
        assert_eq!(kernels.gradient.as_ref().unwrap().dim(), (9, 3));
        assert_eq!(kernels.kernel.exponent(), 2);

        assert_eq!(sink.matrices.len(), 3);
        assert_eq!(sink.matrix(SPARSE_KERNEL), Some(&kernels.sparse));
        assert_eq!(sink.matrix(ENERGY_KERNEL), Some(&kernels.energy));
        assert_eq!(sink.matrix(GRADIENT_KERNEL), kernels.gradient.as_ref());
    }

    #[test]
    fn test_skip_sparse_kernel() {
        let mut sink = MemorySink::new();
        let kernels = KernelAssembler::new(KernelConfig::default())
            .unwrap()
            .with_sparse_kernel(false)
            .with_gradients(false)
            .assemble(&training_set(false), &sparse_points(), &mut sink)
            .unwrap();

        assert_eq!(kernels.sparse.dim(), (0, 0));
        assert!(kernels.gradient.is_none());
        assert!(sink.matrix(SPARSE_KERNEL).is_none());
        assert!(sink.matrix(GRADIENT_KERNEL).is_none());
        assert!(sink.matrix(ENERGY_KERNEL).is_some());
    }

    #[test]
    fn test_exponent_is_applied_by_kernel() {
        let set = training_set(false);
        let points = sparse_points();
        let linear = compute_kernels(
            KernelConfig::with_exponent(1),
            &set,
            &points,
            AssemblyOptions {
                compute_sparse_kernel: false,
                do_gradients: false,
            },
            &mut NullSink,
        )
        .unwrap();
        let cubic = compute_kernels(
            KernelConfig::with_exponent(3),
            &set,
            &points,
            AssemblyOptions {
                compute_sparse_kernel: false,
                do_gradients: false,
            },
            &mut NullSink,
        )
        .unwrap();

        assert_eq!(cubic.energy, linear.energy.mapv(|v| v.powi(3)));
    }

    #[test]
    fn test_gradients_without_representation_gradients_fail() {
        let result = KernelAssembler::new(KernelConfig::default())
            .unwrap()
            .assemble(&training_set(false), &sparse_points(), &mut NullSink);
        assert!(matches!(result, Err(GapError::InvalidParameter(_))));
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(KernelAssembler::new(KernelConfig::with_exponent(0)).is_err());
    }
}
