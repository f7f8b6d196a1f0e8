//! Sparse kernel-ridge fitting of Gaussian Approximation Potentials (GAP)
//!
//! Fits per-sparse-point weights to total energies and optionally forces of
//! atomic structures, given representation vectors computed elsewhere:
//! energy baselines, kernel assembly, the regularized least-squares fit and
//! loading a fitted model for prediction.

pub mod api;
pub mod assembler;
pub mod baseline;
pub mod core;
pub mod data;
pub mod fit;
pub mod kernel;
pub mod model;
pub mod persistence;
pub mod representation;
pub mod sink;
pub mod solver;

// Re-export main types for convenience
pub use crate::api::GapTrainer;
pub use crate::assembler::{compute_kernels, AssemblyOptions, KernelAssembler, KernelSet};
pub use crate::baseline::{energy_baseline, energy_baselines};
pub use crate::core::traits::*;
pub use crate::core::types::*;
pub use crate::core::{GapError, Result};
pub use crate::data::{ExtXyzReader, TrainingSet};
pub use crate::fit::{fit_gap, FitProblem};
pub use crate::kernel::{Kernel, PowerKernel};
pub use crate::model::{load_potential, GapModel, ModelSource, Potential};
pub use crate::persistence::SerializableModel;
pub use crate::representation::{
    calculate_and_sparsify, calculate_representation, FilterConfig, RepresentationConfig,
};

// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
