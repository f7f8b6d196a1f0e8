//! Fitted GAP models and the model loader
//!
//! A weight vector alone cannot reproduce predictions: [`GapModel`] keeps it
//! together with the kernel, sparse points, baseline and regularizers it was
//! fitted with. [`load_potential`] binds such a model to a representation so
//! it can be evaluated on new structures.

use crate::baseline::energy_baselines;
use crate::core::{
    total_atoms, BaselineTable, GapError, KernelConfig, Regularizer, Representation,
    RepresentationBuilder, RepresentationSet, Result, SparsePoints, Structure,
};
use crate::kernel::{Kernel, PowerKernel};
use crate::persistence::SerializableModel;
use crate::representation::RepresentationConfig;
use log::info;
use ndarray::{Array1, Array2};
use std::path::{Path, PathBuf};

/// Everything needed to evaluate a fitted GAP
#[derive(Debug, Clone, PartialEq)]
pub struct GapModel {
    kernel: PowerKernel,
    sparse_points: SparsePoints,
    weights: Array1<f64>,
    baseline: BaselineTable,
    regularizer: Regularizer,
}

impl GapModel {
    /// Bundle fitted weights with the configuration they belong to
    pub fn new(
        kernel: KernelConfig,
        sparse_points: SparsePoints,
        weights: Array1<f64>,
        baseline: BaselineTable,
        regularizer: Regularizer,
    ) -> Result<Self> {
        if weights.len() != sparse_points.len() {
            return Err(GapError::dimension(
                "model weights",
                sparse_points.len(),
                weights.len(),
            ));
        }
        Ok(Self {
            kernel: PowerKernel::new(kernel)?,
            sparse_points,
            weights,
            baseline,
            regularizer,
        })
    }

    pub fn kernel(&self) -> &PowerKernel {
        &self.kernel
    }

    pub fn kernel_config(&self) -> &KernelConfig {
        self.kernel.config()
    }

    pub fn sparse_points(&self) -> &SparsePoints {
        &self.sparse_points
    }

    pub fn weights(&self) -> &Array1<f64> {
        &self.weights
    }

    pub fn baseline(&self) -> &BaselineTable {
        &self.baseline
    }

    pub fn regularizer(&self) -> &Regularizer {
        &self.regularizer
    }

    /// Number of sparse points (M)
    pub fn n_sparse(&self) -> usize {
        self.sparse_points.len()
    }

    /// Total energies: `K_NM_E · w` plus each structure's baseline
    pub fn predict_energies(
        &self,
        set: &RepresentationSet,
        structures: &[Structure],
    ) -> Result<Array1<f64>> {
        if set.n_structures() != structures.len() {
            return Err(GapError::dimension(
                "representation rows",
                structures.len(),
                set.n_structures(),
            ));
        }
        let k_nm = self.kernel.evaluate_cross(set, &self.sparse_points, false)?;
        Ok(k_nm.dot(&self.weights) + energy_baselines(structures, &self.baseline))
    }

    /// Forces (P x 3): the negated gradient `K_NM_F · w`
    pub fn predict_forces(&self, set: &RepresentationSet) -> Result<Array2<f64>> {
        let k_grad = self.kernel.evaluate_cross(set, &self.sparse_points, true)?;
        let forces = -k_grad.dot(&self.weights);
        forces
            .into_shape_with_order((set.n_atoms(), 3))
            .map_err(|e| GapError::InvalidDataset(e.to_string()))
    }
}

/// Where to take a fitted model from
#[derive(Debug, Clone)]
pub enum ModelSource {
    /// An in-memory model, used as-is
    Handle(GapModel),
    /// A model file written by [`SerializableModel::save_to_file`]
    File(PathBuf),
}

impl ModelSource {
    /// Produce the model, reading it from disk if needed
    pub fn resolve(self) -> Result<GapModel> {
        match self {
            ModelSource::Handle(model) => Ok(model),
            ModelSource::File(path) => {
                info!("Loading model from: {path:?}");
                SerializableModel::load_from_file(&path)?.to_model()
            }
        }
    }
}

impl From<GapModel> for ModelSource {
    fn from(model: GapModel) -> Self {
        ModelSource::Handle(model)
    }
}

impl From<PathBuf> for ModelSource {
    fn from(path: PathBuf) -> Self {
        ModelSource::File(path)
    }
}

impl From<&Path> for ModelSource {
    fn from(path: &Path) -> Self {
        ModelSource::File(path.to_path_buf())
    }
}

/// A fitted model bound to the representation it evaluates with
pub struct Potential {
    model: GapModel,
    representation: Box<dyn Representation>,
}

impl Potential {
    pub fn model(&self) -> &GapModel {
        &self.model
    }

    pub fn representation(&self) -> &dyn Representation {
        self.representation.as_ref()
    }

    /// Total energies of `structures`
    pub fn predict_energies(&self, structures: &[Structure]) -> Result<Array1<f64>> {
        let set = self.representation.transform(structures)?;
        self.model.predict_energies(&set, structures)
    }

    /// Forces on every atom of `structures`, stacked P x 3
    pub fn predict_forces(&self, structures: &[Structure]) -> Result<Array2<f64>> {
        let set = self.representation.transform(structures)?;
        if set.n_atoms() != total_atoms(structures) {
            return Err(GapError::dimension(
                "representation atoms",
                total_atoms(structures),
                set.n_atoms(),
            ));
        }
        self.model.predict_forces(&set)
    }
}

/// Load a fitted model and bind it to a representation
///
/// No numerical work happens here: a handle is used as-is, a file is
/// deserialized, and the representation is built from `config`.
pub fn load_potential<S, B>(
    source: S,
    config: &RepresentationConfig,
    builder: &B,
) -> Result<Potential>
where
    S: Into<ModelSource>,
    B: RepresentationBuilder + ?Sized,
{
    let model = source.into().resolve()?;
    config.validate()?;
    let representation = builder.build(config)?;
    Ok(Potential {
        model,
        representation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn model() -> GapModel {
        GapModel::new(
            KernelConfig::with_exponent(1),
            SparsePoints::new(array![[1.0, 0.0], [0.0, 1.0]], vec![1, 8]).unwrap(),
            array![2.0, -1.0],
            BaselineTable::new().with(1, -0.5),
            Regularizer::new(0.01),
        )
        .unwrap()
    }

    #[test]
    fn test_weight_count_must_match_sparse_points() {
        let result = GapModel::new(
            KernelConfig::default(),
            SparsePoints::new(array![[1.0, 0.0]], vec![1]).unwrap(),
            array![1.0, 2.0],
            BaselineTable::new(),
            Regularizer::new(0.01),
        );
        assert!(matches!(result, Err(GapError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_predict_energies_adds_baseline() {
        let model = model();
        let structures = vec![Structure::new(vec![1, 1]), Structure::new(vec![8])];
        let set = RepresentationSet::new(array![[1.0, 1.0], [0.5, 2.0]], vec![2, 1]).unwrap();

        let energies = model.predict_energies(&set, &structures).unwrap();
        // Linear kernel: x · (2, -1) plus baseline
        assert_relative_eq!(energies[0], 1.0 - 1.0, epsilon = 1e-12);
        assert_relative_eq!(energies[1], -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_predict_forces_negates_gradient() {
        let model = model();
        let set = RepresentationSet::new(array![[1.0, 1.0]], vec![1])
            .unwrap()
            .with_gradients(array![[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]])
            .unwrap();

        let forces = model.predict_forces(&set).unwrap();
        assert_eq!(forces.dim(), (1, 3));
        assert_relative_eq!(forces[[0, 0]], -2.0, epsilon = 1e-12);
        assert_relative_eq!(forces[[0, 1]], 1.0, epsilon = 1e-12);
        assert_relative_eq!(forces[[0, 2]], -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_model_source_handle_is_used_as_is() {
        let original = model();
        let resolved = ModelSource::from(original.clone()).resolve().unwrap();
        assert_eq!(resolved, original);
    }

    #[test]
    fn test_model_source_missing_file() {
        let result = ModelSource::from(PathBuf::from("/nonexistent/model.json")).resolve();
        assert!(matches!(result, Err(GapError::IoError(_))));
    }
}
