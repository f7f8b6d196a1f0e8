//! High-level API for fitting GAP models
//!
//! [`GapTrainer`] runs kernel assembly and the regularized fit in one call
//! and returns a [`GapModel`] that carries everything needed to predict.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use rgap::api::GapTrainer;
//! use rgap::core::{KernelConfig, RepresentationSet, SparsePoints};
//! use rgap::data::ExtXyzReader;
//! use rgap::persistence::SerializableModel;
//! use rgap::sink::{read_json, NullSink};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let training = ExtXyzReader::new().read_file("train.xyz")?;
//! let features: RepresentationSet = read_json("features.json")?;
//! let sparse_points: SparsePoints = read_json("sparsepoints.json")?;
//!
//! let model = GapTrainer::new(KernelConfig::default())
//!     .with_energy_regularizer(0.001)
//!     .with_force_regularizer(0.1)
//!     .train_dataset(&training, &features, &sparse_points, &mut NullSink)?;
//!
//! SerializableModel::from_model(&model).save_to_file("model.json")?;
//! # Ok(())
//! # }
//! ```

use crate::assembler::{AssemblyOptions, KernelAssembler};
use crate::core::{BaselineTable, KernelConfig, Regularizer, RepresentationSet, Result, SparsePoints, Structure};
use crate::data::TrainingSet;
use crate::fit::FitProblem;
use crate::model::GapModel;
use crate::representation::check_transform;
use crate::sink::ArtifactSink;
use log::info;
use ndarray::{ArrayView1, ArrayView2};

/// Default energy regularizer, per sqrt(atom)
pub const DEFAULT_ENERGY_REGULARIZER: f64 = 1e-3;

/// High-level GAP trainer with builder pattern
#[derive(Debug, Clone)]
pub struct GapTrainer {
    kernel: KernelConfig,
    regularizer: Regularizer,
    baseline: BaselineTable,
    rcond: Option<f64>,
    options: AssemblyOptions,
}

impl Default for GapTrainer {
    fn default() -> Self {
        Self::new(KernelConfig::default())
    }
}

impl GapTrainer {
    /// Create a trainer for the power kernel described by `kernel`
    pub fn new(kernel: KernelConfig) -> Self {
        Self {
            kernel,
            regularizer: Regularizer::new(DEFAULT_ENERGY_REGULARIZER),
            baseline: BaselineTable::new(),
            rcond: None,
            options: AssemblyOptions::default(),
        }
    }

    /// Set the energy regularizer per sqrt(atom)
    pub fn with_energy_regularizer(mut self, energy_per_atom: f64) -> Self {
        self.regularizer.energy_per_atom = energy_per_atom;
        self
    }

    /// Set the force regularizer; only used when forces are supplied
    pub fn with_force_regularizer(mut self, force: f64) -> Self {
        self.regularizer.force = Some(force);
        self
    }

    /// Set the per-species energy baseline
    pub fn with_baseline(mut self, baseline: BaselineTable) -> Self {
        self.baseline = baseline;
        self
    }

    /// Set the relative singular value cutoff of the solve
    pub fn with_rcond(mut self, rcond: f64) -> Self {
        self.rcond = Some(rcond);
        self
    }

    /// Set kernel assembly options
    ///
    /// `K_MM` is always computed for training; `do_gradients` only matters
    /// when forces are supplied.
    pub fn with_options(mut self, options: AssemblyOptions) -> Self {
        self.options = options;
        self
    }

    pub fn kernel(&self) -> &KernelConfig {
        &self.kernel
    }

    pub fn regularizer(&self) -> &Regularizer {
        &self.regularizer
    }

    /// Assemble kernels and fit weights to energies and optional forces
    ///
    /// `forces` is P x 3 in the atom order of `structures`.
    pub fn train<S: ArtifactSink>(
        &self,
        structures: &[Structure],
        energies: ArrayView1<'_, f64>,
        forces: Option<ArrayView2<'_, f64>>,
        set: &RepresentationSet,
        sparse_points: &SparsePoints,
        sink: &mut S,
    ) -> Result<GapModel> {
        self.regularizer.validate()?;
        check_transform(structures, set)?;
        let options = AssemblyOptions {
            compute_sparse_kernel: true,
            do_gradients: self.options.do_gradients && forces.is_some(),
        };
        let kernels = KernelAssembler::new(self.kernel)?
            .with_options(options)
            .assemble(set, sparse_points, sink)?;

        let mut problem = FitProblem::new(
            structures,
            kernels.sparse.view(),
            energies.reborrow(),
            kernels.energy.view(),
            self.regularizer.energy_per_atom,
        )
        .with_baseline(&self.baseline);
        if let Some(rcond) = self.rcond {
            problem = problem.with_rcond(rcond);
        }

        let regularizer = match forces {
            Some(forces) => {
                problem = problem.with_forces(forces.reborrow());
                if let Some(gradient) = &kernels.gradient {
                    problem = problem.with_gradient_kernel(gradient.view());
                }
                if let Some(force) = self.regularizer.force {
                    problem = problem.with_force_regularizer(force);
                }
                self.regularizer
            }
            None => Regularizer::new(self.regularizer.energy_per_atom),
        };

        let weights = problem.fit()?;
        info!("Trained GAP model with {} sparse points", sparse_points.len());
        GapModel::new(
            self.kernel,
            sparse_points.clone(),
            weights,
            self.baseline.clone(),
            regularizer,
        )
    }

    /// Train on a loaded data set, fitting forces when every structure has them
    pub fn train_dataset<S: ArtifactSink>(
        &self,
        training: &TrainingSet,
        set: &RepresentationSet,
        sparse_points: &SparsePoints,
        sink: &mut S,
    ) -> Result<GapModel> {
        let forces = if self.regularizer.force.is_some() {
            training.stacked_forces()?
        } else {
            None
        };
        self.train(
            training.structures(),
            training.energies().view(),
            forces.as_ref().map(|f| f.view()),
            set,
            sparse_points,
            sink,
        )
    }
}
