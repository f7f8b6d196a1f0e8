//! Regularized least-squares fitting of GAP weights
//!
//! Combines baseline-shifted energies, optional forces and the assembled
//! kernels into one regularized least-squares problem
//!
//! (K_MM + K_NM^T K_NM) w = K_NM^T Y
//!
//! where `K_NM` stacks the normalized energy rows (and gradient rows when
//! fitting forces) and `Y` the matching normalized targets.
//!
//! An ill-conditioned system is not an error: the solve discards singular
//! values below `rcond * s_max` and may return a non-unique minimum-norm
//! solution. Adjusting the regularizers is left to the caller.
//!
//! The weights alone do not define a model; keep the kernel configuration,
//! sparse points, baseline table and regularizers alongside them (see
//! [`crate::model::GapModel`]).

use crate::baseline::energy_baselines;
use crate::core::{
    check_positive, total_atoms, BaselineTable, GapError, Result, Structure,
};
use crate::solver::{
    energy_regularizers, lstsq, normal_equations, normalize_energy_block,
    normalize_gradient_block, stack_blocks, DesignBlock,
};
use log::{debug, info, warn};
use ndarray::{concatenate, Array1, Array2, ArrayView, ArrayView1, ArrayView2, ArrayViewD, Axis, Dimension};

/// Inputs of a GAP fit, configured builder-style
///
/// # Example
/// ```
/// use ndarray::array;
/// use rgap::core::{BaselineTable, Structure};
/// use rgap::fit::FitProblem;
///
/// let structures = vec![Structure::new(vec![1]), Structure::new(vec![1])];
/// let k_mm = array![[1.0]];
/// let k_nm = array![[1.0], [2.0]];
/// let energies = array![3.0, 5.0];
/// let baseline = BaselineTable::new();
///
/// let weights = FitProblem::new(&structures, k_mm.view(), energies.view(), k_nm.view(), 1.0)
///     .with_baseline(&baseline)
///     .fit()
///     .unwrap();
/// assert!((weights[0] - 13.0 / 6.0).abs() < 1e-8);
/// ```
#[derive(Debug, Clone)]
pub struct FitProblem<'a> {
    structures: &'a [Structure],
    k_mm: ArrayView2<'a, f64>,
    energies: ArrayView1<'a, f64>,
    k_nm_energy: ArrayView2<'a, f64>,
    energy_regularizer_per_atom: f64,
    baseline: Option<&'a BaselineTable>,
    forces: Option<ArrayViewD<'a, f64>>,
    k_nm_gradient: Option<ArrayView2<'a, f64>>,
    force_regularizer: Option<f64>,
    rcond: Option<f64>,
}

impl<'a> FitProblem<'a> {
    /// Energy-only problem with no baseline
    pub fn new(
        structures: &'a [Structure],
        k_mm: ArrayView2<'a, f64>,
        energies: ArrayView1<'a, f64>,
        k_nm_energy: ArrayView2<'a, f64>,
        energy_regularizer_per_atom: f64,
    ) -> Self {
        Self {
            structures,
            k_mm,
            energies,
            k_nm_energy,
            energy_regularizer_per_atom,
            baseline: None,
            forces: None,
            k_nm_gradient: None,
            force_regularizer: None,
            rcond: None,
        }
    }

    /// Per-species energy baseline subtracted from the targets
    pub fn with_baseline(mut self, baseline: &'a BaselineTable) -> Self {
        self.baseline = Some(baseline);
        self
    }

    /// Forces of all training atoms, any shape that flattens to 3P entries
    /// (e.g. P x 3, or N x Q x 3 with N*Q = P)
    pub fn with_forces<D: Dimension>(mut self, forces: ArrayView<'a, f64, D>) -> Self {
        self.forces = Some(forces.into_dyn());
        self
    }

    /// Gradient kernel `K_NM_F` (3P x M)
    pub fn with_gradient_kernel(mut self, k_nm_gradient: ArrayView2<'a, f64>) -> Self {
        self.k_nm_gradient = Some(k_nm_gradient);
        self
    }

    /// Force regularizer, in energy / distance
    pub fn with_force_regularizer(mut self, force_regularizer: f64) -> Self {
        self.force_regularizer = Some(force_regularizer);
        self
    }

    /// Relative singular-value cutoff for the solve
    pub fn with_rcond(mut self, rcond: f64) -> Self {
        self.rcond = Some(rcond);
        self
    }

    /// Number of sparse points (M)
    pub fn n_sparse(&self) -> usize {
        self.k_nm_energy.ncols()
    }

    /// Check every shape and argument; nothing is computed before this passes
    pub fn validate(&self) -> Result<()> {
        let n = self.structures.len();
        if n == 0 {
            return Err(GapError::EmptyDataset);
        }
        if self.energies.len() != n {
            return Err(GapError::dimension("energies", n, self.energies.len()));
        }
        if self.k_nm_energy.nrows() != n {
            return Err(GapError::dimension(
                "energy kernel K_NM_E (rows)",
                n,
                self.k_nm_energy.nrows(),
            ));
        }
        let m = self.n_sparse();
        if self.k_mm.nrows() != m {
            return Err(GapError::dimension("sparse kernel K_MM (rows)", m, self.k_mm.nrows()));
        }
        if self.k_mm.ncols() != m {
            return Err(GapError::dimension(
                "sparse kernel K_MM (columns)",
                m,
                self.k_mm.ncols(),
            ));
        }
        check_positive("energy regularizer", self.energy_regularizer_per_atom)?;
        if let Some(i) = self.structures.iter().position(|s| s.n_atoms() == 0) {
            return Err(GapError::InvalidDataset(format!("structure {i} has no atoms")));
        }

        let Some(forces) = &self.forces else {
            return Ok(());
        };
        let k_nm_gradient = self
            .k_nm_gradient
            .ok_or_else(|| GapError::MissingForceInput("gradient kernel K_NM_F".to_string()))?;
        let force_regularizer = self
            .force_regularizer
            .ok_or_else(|| GapError::MissingForceInput("force regularizer".to_string()))?;
        check_positive("force regularizer", force_regularizer)?;

        let gradient_rows = 3 * total_atoms(self.structures);
        if forces.len() != gradient_rows {
            return Err(GapError::dimension("flattened forces", gradient_rows, forces.len()));
        }
        if k_nm_gradient.nrows() != gradient_rows {
            return Err(GapError::dimension(
                "gradient kernel K_NM_F (rows)",
                gradient_rows,
                k_nm_gradient.nrows(),
            ));
        }
        if k_nm_gradient.ncols() != m {
            return Err(GapError::dimension(
                "gradient kernel K_NM_F (columns)",
                m,
                k_nm_gradient.ncols(),
            ));
        }
        Ok(())
    }

    /// The stacked, normalized design matrix and targets
    pub fn design(&self) -> Result<DesignBlock> {
        self.validate()?;

        let shifted = match self.baseline {
            Some(table) => {
                let missing = table.missing_species(self.structures);
                if !missing.is_empty() {
                    warn!(
                        "Species {:?} have no baseline entry and contribute zero baseline energy",
                        missing
                    );
                }
                &self.energies - &energy_baselines(self.structures, table)
            }
            None => self.energies.to_owned(),
        };

        let regularizers = energy_regularizers(self.structures, self.energy_regularizer_per_atom);
        let energy_block =
            normalize_energy_block(self.k_nm_energy, shifted.view(), regularizers.view())?;

        let gradient_block = match (&self.forces, self.k_nm_gradient, self.force_regularizer) {
            (Some(forces), Some(k_nm_gradient), Some(force_regularizer)) => {
                let flat: Array1<f64> = forces.iter().copied().collect();
                Some(normalize_gradient_block(
                    k_nm_gradient,
                    flat.view(),
                    force_regularizer,
                )?)
            }
            (None, gradient, regularizer) => {
                if gradient.is_some() || regularizer.is_some() {
                    warn!("No forces supplied; ignoring gradient kernel and force regularizer");
                }
                None
            }
            _ => None,
        };

        stack_blocks(energy_block, gradient_block)
    }

    /// Solve for the weight vector (length M)
    pub fn fit(&self) -> Result<Array1<f64>> {
        let design = self.design()?;
        info!(
            "Fitting {} sparse points to {} structures ({} design rows{})",
            self.n_sparse(),
            self.structures.len(),
            design.n_rows(),
            if self.forces.is_some() { ", with forces" } else { "" }
        );

        let system = normal_equations(self.k_mm, &design)?;
        let solution = lstsq(system.matrix.view(), system.rhs.view(), self.rcond)?;
        debug!(
            "Normal equations solved with rank {} of {}",
            solution.rank,
            self.n_sparse()
        );
        Ok(solution.solution)
    }
}

/// Fit GAP weights to total energies and optionally forces
///
/// Thin wrapper over [`FitProblem`]. `forces`, `k_nm_gradient` and
/// `force_regularizer` must be supplied together; without `forces` the other
/// two are ignored.
#[allow(clippy::too_many_arguments)]
pub fn fit_gap<'a>(
    structures: &'a [Structure],
    k_mm: ArrayView2<'a, f64>,
    energies: ArrayView1<'a, f64>,
    k_nm_energy: ArrayView2<'a, f64>,
    energy_regularizer_per_atom: f64,
    baseline: &'a BaselineTable,
    forces: Option<ArrayViewD<'a, f64>>,
    k_nm_gradient: Option<ArrayView2<'a, f64>>,
    force_regularizer: Option<f64>,
    rcond: Option<f64>,
) -> Result<Array1<f64>> {
    let mut problem = FitProblem::new(
        structures,
        k_mm,
        energies,
        k_nm_energy,
        energy_regularizer_per_atom,
    )
    .with_baseline(baseline);
    if let Some(forces) = forces {
        problem = problem.with_forces(forces);
    }
    if let Some(k_nm_gradient) = k_nm_gradient {
        problem = problem.with_gradient_kernel(k_nm_gradient);
    }
    if let Some(force_regularizer) = force_regularizer {
        problem = problem.with_force_regularizer(force_regularizer);
    }
    if let Some(rcond) = rcond {
        problem = problem.with_rcond(rcond);
    }
    problem.fit()
}

/// Stack the per-structure forces into one P x 3 array
///
/// Returns `None` when no structure carries forces; a mix of structures with
/// and without forces is an error.
pub fn stack_structure_forces(structures: &[Structure]) -> Result<Option<Array2<f64>>> {
    let with_forces = structures.iter().filter(|s| s.forces().is_some()).count();
    if with_forces == 0 {
        return Ok(None);
    }
    if with_forces != structures.len() {
        return Err(GapError::InvalidDataset(format!(
            "{} of {} structures have forces; force fitting needs all of them",
            with_forces,
            structures.len()
        )));
    }
    let views: Vec<ArrayView2<f64>> = structures
        .iter()
        .filter_map(|s| s.forces().map(|f| f.view()))
        .collect();
    let stacked = concatenate(Axis(0), &views)
        .map_err(|e| GapError::InvalidDataset(e.to_string()))?;
    Ok(Some(stacked))
}
