//! Energy baseline estimation
//!
//! The baseline of a structure depends only on its composition: every atom
//! contributes the per-species value from a [`BaselineTable`].

use crate::core::{BaselineTable, Structure};
use ndarray::Array1;

/// Energy baseline of a single structure
///
/// Species without an entry in `table` contribute zero.
pub fn energy_baseline(structure: &Structure, table: &BaselineTable) -> f64 {
    structure
        .species()
        .iter()
        .map(|&species| table.contribution(species))
        .sum()
}

/// Energy baselines of a set of structures, one entry per structure
pub fn energy_baselines(structures: &[Structure], table: &BaselineTable) -> Array1<f64> {
    structures
        .iter()
        .map(|s| energy_baseline(s, table))
        .collect()
}
