//! Regularized design-matrix assembly
//!
//! Each kernel row and its target are divided by the regularizer of that
//! observation, so the stacked problem weighs residuals by the ratio of
//! expected error to expected target variance:
//! - energy rows of structure i by `energy_reg_per_atom * sqrt(n_atoms_i)`
//! - gradient rows uniformly by `force_reg`
//!
//! Mismatched operand shapes are reported as `DimensionMismatch`.

use crate::core::{GapError, Result, Structure};
use ndarray::{concatenate, Array1, Array2, ArrayView1, ArrayView2, Axis};

/// A block of normalized kernel rows with their normalized targets
#[derive(Debug, Clone, PartialEq)]
pub struct DesignBlock {
    pub kernel: Array2<f64>,
    pub targets: Array1<f64>,
}

impl DesignBlock {
    pub fn n_rows(&self) -> usize {
        self.kernel.nrows()
    }
}

/// The regularized normal equations `(K_MM + K_NM^T K_NM) w = K_NM^T Y`
#[derive(Debug, Clone, PartialEq)]
pub struct NormalEquations {
    pub matrix: Array2<f64>,
    pub rhs: Array1<f64>,
}

/// Per-structure energy regularizers: `per_atom * sqrt(n_atoms)`
///
/// Larger structures get proportionally looser regularization since per-atom
/// noise averages out over more atoms.
pub fn energy_regularizers(structures: &[Structure], per_atom: f64) -> Array1<f64> {
    structures
        .iter()
        .map(|s| per_atom * (s.n_atoms() as f64).sqrt())
        .collect()
}

/// Divide each energy-kernel row and its target by that structure's regularizer
pub fn normalize_energy_block(
    k_nm_energy: ArrayView2<f64>,
    shifted_energies: ArrayView1<f64>,
    regularizers: ArrayView1<f64>,
) -> Result<DesignBlock> {
    let n = k_nm_energy.nrows();
    if shifted_energies.len() != n {
        return Err(GapError::dimension("energy targets", n, shifted_energies.len()));
    }
    if regularizers.len() != n {
        return Err(GapError::dimension("energy regularizers", n, regularizers.len()));
    }
    let row_scale = regularizers.insert_axis(Axis(1));
    Ok(DesignBlock {
        kernel: &k_nm_energy / &row_scale,
        targets: &shifted_energies / &regularizers,
    })
}

/// Build the gradient block from flattened forces
///
/// Gradients are the negated forces; kernel and targets are divided by the
/// scalar `force_regularizer`.
pub fn normalize_gradient_block(
    k_nm_gradient: ArrayView2<f64>,
    flat_forces: ArrayView1<f64>,
    force_regularizer: f64,
) -> Result<DesignBlock> {
    if flat_forces.len() != k_nm_gradient.nrows() {
        return Err(GapError::dimension(
            "force components",
            k_nm_gradient.nrows(),
            flat_forces.len(),
        ));
    }
    Ok(DesignBlock {
        kernel: &k_nm_gradient / force_regularizer,
        targets: flat_forces.mapv(|f| -f / force_regularizer),
    })
}

/// Stack the energy block and the optional gradient block, energies first
pub fn stack_blocks(energy: DesignBlock, gradient: Option<DesignBlock>) -> Result<DesignBlock> {
    let Some(gradient) = gradient else {
        return Ok(energy);
    };
    let kernel = concatenate(Axis(0), &[energy.kernel.view(), gradient.kernel.view()])
        .map_err(|_| {
            GapError::dimension(
                "stacked design matrix (columns)",
                energy.kernel.ncols(),
                gradient.kernel.ncols(),
            )
        })?;
    let targets = concatenate(Axis(0), &[energy.targets.view(), gradient.targets.view()])
        .map_err(|e| GapError::InvalidParameter(e.to_string()))?;
    Ok(DesignBlock { kernel, targets })
}

/// Form `K = K_MM + K_NM^T K_NM` and `K_NM^T Y`
pub fn normal_equations(k_mm: ArrayView2<f64>, design: &DesignBlock) -> Result<NormalEquations> {
    let m = design.kernel.ncols();
    if k_mm.dim() != (m, m) {
        return Err(GapError::dimension("sparse kernel size", m, k_mm.nrows()));
    }
    if design.targets.len() != design.n_rows() {
        return Err(GapError::dimension(
            "design targets",
            design.n_rows(),
            design.targets.len(),
        ));
    }
    let k_nm_t = design.kernel.t();
    Ok(NormalEquations {
        matrix: &k_mm + &k_nm_t.dot(&design.kernel),
        rhs: k_nm_t.dot(&design.targets),
    })
}
