//! Core type definitions for GAP fitting

use crate::core::{GapError, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Atomic species, identified by atomic number
pub type Species = u32;

/// Atomic configuration as seen by the fitting pipeline
///
/// Only composition and (optionally) forces matter here; positions live in
/// whatever representation produced the kernels.
#[derive(Debug, Clone, PartialEq)]
pub struct Structure {
    species: Vec<Species>,
    forces: Option<Array2<f64>>,
}

impl Structure {
    /// Create a structure from the species of its atoms
    pub fn new(species: Vec<Species>) -> Self {
        Self {
            species,
            forces: None,
        }
    }

    /// Attach per-atom forces (shape `n_atoms x 3`)
    pub fn with_forces(mut self, forces: Array2<f64>) -> Result<Self> {
        if forces.nrows() != self.species.len() {
            return Err(GapError::dimension(
                "structure forces (rows)",
                self.species.len(),
                forces.nrows(),
            ));
        }
        if forces.ncols() != 3 {
            return Err(GapError::dimension("structure forces (columns)", 3, forces.ncols()));
        }
        self.forces = Some(forces);
        Ok(self)
    }

    /// Number of atoms
    pub fn n_atoms(&self) -> usize {
        self.species.len()
    }

    /// Species of each atom, in atom order
    pub fn species(&self) -> &[Species] {
        &self.species
    }

    /// Per-atom forces, if known
    pub fn forces(&self) -> Option<&Array2<f64>> {
        self.forces.as_ref()
    }

    /// Number of atoms of the given species
    pub fn count_species(&self, species: Species) -> usize {
        self.species.iter().filter(|&&s| s == species).count()
    }
}

/// Total number of atoms across a set of structures
pub fn total_atoms(structures: &[Structure]) -> usize {
    structures.iter().map(Structure::n_atoms).sum()
}

/// Per-species energy contribution (energy per atom)
///
/// Species missing from the table contribute nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BaselineTable {
    contributions: BTreeMap<Species, f64>,
}

impl BaselineTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, species: Species, energy_per_atom: f64) -> Self {
        self.contributions.insert(species, energy_per_atom);
        self
    }

    /// Set the contribution of a species, returning the previous value
    pub fn insert(&mut self, species: Species, energy_per_atom: f64) -> Option<f64> {
        self.contributions.insert(species, energy_per_atom)
    }

    /// Look up a species
    pub fn get(&self, species: Species) -> Option<f64> {
        self.contributions.get(&species).copied()
    }

    /// Contribution of one atom of `species` (0 if the species is absent)
    pub fn contribution(&self, species: Species) -> f64 {
        self.get(species).unwrap_or(0.0)
    }

    /// Iterate over `(species, energy_per_atom)` pairs in species order
    pub fn iter(&self) -> impl Iterator<Item = (Species, f64)> + '_ {
        self.contributions.iter().map(|(&s, &e)| (s, e))
    }

    pub fn len(&self) -> usize {
        self.contributions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contributions.is_empty()
    }

    /// Species that occur in `structures` but have no entry in the table
    pub fn missing_species(&self, structures: &[Structure]) -> BTreeSet<Species> {
        structures
            .iter()
            .flat_map(|s| s.species().iter().copied())
            .filter(|s| !self.contributions.contains_key(s))
            .collect()
    }
}

impl FromIterator<(Species, f64)> for BaselineTable {
    fn from_iter<I: IntoIterator<Item = (Species, f64)>>(iter: I) -> Self {
        Self {
            contributions: iter.into_iter().collect(),
        }
    }
}

/// Energy and force regularizers
///
/// These are ratios of the expected error in a property to the expected
/// variance of the fitted surface, not raw noise magnitudes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Regularizer {
    /// Energy regularizer, in energy units per sqrt(atom)
    pub energy_per_atom: f64,
    /// Force regularizer, in energy / distance (component-wise)
    pub force: Option<f64>,
}

impl Regularizer {
    pub fn new(energy_per_atom: f64) -> Self {
        Self {
            energy_per_atom,
            force: None,
        }
    }

    pub fn with_force(mut self, force: f64) -> Self {
        self.force = Some(force);
        self
    }

    /// Both regularizers must be finite and strictly positive
    pub fn validate(&self) -> Result<()> {
        check_positive("energy regularizer", self.energy_per_atom)?;
        if let Some(force) = self.force {
            check_positive("force regularizer", force)?;
        }
        Ok(())
    }
}

pub(crate) fn check_positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(GapError::InvalidParameter(format!(
            "{name} must be finite and positive, got: {value}"
        )))
    }
}

/// Representation vectors of a set of structures
///
/// One feature row per structure. Gradient row `3a + c` holds the derivative
/// of the owning structure's feature row with respect to Cartesian component
/// `c` of atom `a`, atoms numbered consecutively across structures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepresentationSet {
    features: Array2<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    gradients: Option<Array2<f64>>,
    atom_counts: Vec<usize>,
}

impl RepresentationSet {
    /// Create a set from structure features and the atom count of each structure
    pub fn new(features: Array2<f64>, atom_counts: Vec<usize>) -> Result<Self> {
        let set = Self {
            features,
            gradients: None,
            atom_counts,
        };
        set.validate()?;
        Ok(set)
    }

    /// Attach position gradients (shape `3P x D`)
    pub fn with_gradients(mut self, gradients: Array2<f64>) -> Result<Self> {
        self.gradients = Some(gradients);
        self.validate()?;
        Ok(self)
    }

    /// Check internal shape consistency (needed after deserialization)
    pub fn validate(&self) -> Result<()> {
        if self.atom_counts.len() != self.features.nrows() {
            return Err(GapError::dimension(
                "representation atom counts",
                self.features.nrows(),
                self.atom_counts.len(),
            ));
        }
        if let Some(gradients) = &self.gradients {
            if gradients.nrows() != 3 * self.n_atoms() {
                return Err(GapError::dimension(
                    "representation gradients (rows)",
                    3 * self.n_atoms(),
                    gradients.nrows(),
                ));
            }
            if gradients.ncols() != self.dim() {
                return Err(GapError::dimension(
                    "representation gradients (columns)",
                    self.dim(),
                    gradients.ncols(),
                ));
            }
        }
        Ok(())
    }

    /// Number of structures (N)
    pub fn n_structures(&self) -> usize {
        self.features.nrows()
    }

    /// Total number of atoms (P)
    pub fn n_atoms(&self) -> usize {
        self.atom_counts.iter().sum()
    }

    /// Feature dimension (D)
    pub fn dim(&self) -> usize {
        self.features.ncols()
    }

    pub fn features(&self) -> &Array2<f64> {
        &self.features
    }

    pub fn gradients(&self) -> Option<&Array2<f64>> {
        self.gradients.as_ref()
    }

    pub fn atom_counts(&self) -> &[usize] {
        &self.atom_counts
    }

    pub fn has_gradients(&self) -> bool {
        self.gradients.is_some()
    }
}

/// Support points selected by a sparsification filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparsePoints {
    points: Array2<f64>,
    species: Vec<Species>,
}

impl SparsePoints {
    /// Create sparse points from their feature rows and the species each was drawn for
    pub fn new(points: Array2<f64>, species: Vec<Species>) -> Result<Self> {
        let sparse = Self { points, species };
        sparse.validate()?;
        Ok(sparse)
    }

    pub fn validate(&self) -> Result<()> {
        if self.species.len() != self.points.nrows() {
            return Err(GapError::dimension(
                "sparse point species",
                self.points.nrows(),
                self.species.len(),
            ));
        }
        Ok(())
    }

    /// Number of sparse points (M)
    pub fn len(&self) -> usize {
        self.points.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.points.nrows() == 0
    }

    /// Feature dimension (D)
    pub fn dim(&self) -> usize {
        self.points.ncols()
    }

    pub fn points(&self) -> &Array2<f64> {
        &self.points
    }

    pub fn species(&self) -> &[Species] {
        &self.species
    }

    /// Number of sparse points per species
    pub fn counts_per_species(&self) -> BTreeMap<Species, usize> {
        let mut counts = BTreeMap::new();
        for &s in &self.species {
            *counts.entry(s).or_insert(0) += 1;
        }
        counts
    }
}

/// What a kernel row describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    /// One row per structure
    Structure,
    /// One row per atomic environment
    Atom,
}

/// Whether the kernel is taken against sparse points or the full training set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelType {
    Sparse,
    Full,
}

/// Kernel hyperparameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelConfig {
    /// Power applied to the dot-product kernel (default 2)
    pub exponent: u32,
    pub target_type: TargetType,
    pub kernel_type: KernelType,
}

impl KernelConfig {
    pub fn with_exponent(exponent: u32) -> Self {
        Self {
            exponent,
            ..Self::default()
        }
    }

    /// Only whole-structure sparse kernels with a positive exponent are supported
    pub fn validate(&self) -> Result<()> {
        if self.exponent == 0 {
            return Err(GapError::InvalidParameter(
                "Kernel exponent must be at least 1".to_string(),
            ));
        }
        if self.target_type != TargetType::Structure {
            return Err(GapError::InvalidParameter(format!(
                "Unsupported kernel target type: {:?}",
                self.target_type
            )));
        }
        if self.kernel_type != KernelType::Sparse {
            return Err(GapError::InvalidParameter(format!(
                "Unsupported kernel type: {:?}",
                self.kernel_type
            )));
        }
        Ok(())
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            exponent: 2,
            target_type: TargetType::Structure,
            kernel_type: KernelType::Sparse,
        }
    }
}
