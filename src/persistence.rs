//! Model serialization and persistence
//!
//! This module provides functionality to save and load fitted GAP models
//! for use with the CLI application and the model loader.

use crate::core::{BaselineTable, GapError, KernelConfig, Regularizer, Result, SparsePoints, Species};
use crate::model::GapModel;
use crate::sink::{read_json, write_json};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Serializable representation of a fitted GAP model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializableModel {
    /// Kernel hyperparameters
    pub kernel: KernelConfig,
    /// Support points the weights refer to
    pub sparse_points: SparsePoints,
    /// One weight per sparse point
    pub weights: Vec<f64>,
    /// Per-species energy baseline
    pub baseline: BaselineTable,
    /// Regularizers used for the fit
    pub regularizer: Regularizer,
    /// Model metadata
    pub metadata: ModelMetadata,
}

/// Model metadata for tracking and validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Library version used to create the model
    pub library_version: String,
    /// Number of sparse points
    pub n_sparse_points: usize,
    /// Sparse points per species
    pub sparse_points_per_species: BTreeMap<Species, usize>,
    /// Creation timestamp
    pub created_at: String,
}

impl SerializableModel {
    /// Create a serializable model from a fitted model
    pub fn from_model(model: &GapModel) -> Self {
        Self {
            kernel: *model.kernel_config(),
            sparse_points: model.sparse_points().clone(),
            weights: model.weights().to_vec(),
            baseline: model.baseline().clone(),
            regularizer: *model.regularizer(),
            metadata: ModelMetadata {
                library_version: env!("CARGO_PKG_VERSION").to_string(),
                n_sparse_points: model.n_sparse(),
                sparse_points_per_species: model.sparse_points().counts_per_species(),
                created_at: chrono::Utc::now().to_rfc3339(),
            },
        }
    }

    /// Save model to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_json(path, self)
    }

    /// Load model from file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        read_json(path)
    }

    /// Convert back to a fitted model, re-checking every invariant
    pub fn to_model(&self) -> Result<GapModel> {
        self.sparse_points.validate()?;
        self.regularizer.validate()?;
        if self.metadata.n_sparse_points != self.sparse_points.len() {
            return Err(GapError::dimension(
                "model metadata sparse point count",
                self.sparse_points.len(),
                self.metadata.n_sparse_points,
            ));
        }
        GapModel::new(
            self.kernel,
            self.sparse_points.clone(),
            Array1::from(self.weights.clone()),
            self.baseline.clone(),
            self.regularizer,
        )
    }

    /// Print model summary
    pub fn print_summary(&self) {
        println!("=== GAP Model Summary ===");
        println!("Kernel Exponent: {}", self.kernel.exponent);
        println!("Sparse Points: {}", self.metadata.n_sparse_points);
        for (species, count) in &self.metadata.sparse_points_per_species {
            println!("  Species {species}: {count}");
        }
        println!("Feature Dimension: {}", self.sparse_points.dim());
        println!("Library Version: {}", self.metadata.library_version);
        println!("Created: {}", self.metadata.created_at);
        println!("Regularizers:");
        println!("  Energy (per atom): {}", self.regularizer.energy_per_atom);
        match self.regularizer.force {
            Some(force) => println!("  Force: {force}"),
            None => println!("  Force: not fitted"),
        }
        println!("Baseline:");
        if self.baseline.is_empty() {
            println!("  (none)");
        }
        for (species, energy) in self.baseline.iter() {
            println!("  Species {species}: {energy}");
        }
    }
}
