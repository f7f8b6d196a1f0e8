//! Representation configuration and the representation/sparsification steps
//!
//! Representations and sparsification filters are external collaborators
//! reached through [`Representation`], [`RepresentationBuilder`] and
//! [`SparsificationFilter`]. This module owns their explicit configuration
//! and the glue that runs them ahead of kernel assembly.

use crate::core::{
    GapError, Representation, RepresentationBuilder, RepresentationSet, Result, SparsePoints,
    SparsificationFilter, Species, Structure,
};
use crate::sink::ArtifactSink;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Representation family and its hyperparameters
///
/// Serialized externally tagged, e.g. `{"spherical_invariants": {"max_radial": 6}}`.
/// Unknown option names are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepresentationConfig {
    SphericalInvariants(SphericalInvariantsConfig),
}

impl RepresentationConfig {
    /// Check option ranges
    pub fn validate(&self) -> Result<()> {
        match self {
            RepresentationConfig::SphericalInvariants(config) => config.validate(),
        }
    }

    /// Whether the representation will provide position gradients
    pub fn computes_gradients(&self) -> bool {
        match self {
            RepresentationConfig::SphericalInvariants(config) => config.compute_gradients,
        }
    }
}

impl Default for RepresentationConfig {
    fn default() -> Self {
        RepresentationConfig::SphericalInvariants(SphericalInvariantsConfig::default())
    }
}

/// Width model of the atomic Gaussian densities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GaussianSigmaType {
    Constant,
    PerSpecies,
    Radial,
}

/// Body order of the invariants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SoapType {
    RadialSpectrum,
    PowerSpectrum,
    BiSpectrum,
}

/// Radial basis used for the density expansion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RadialBasis {
    #[serde(rename = "GTO")]
    Gto,
    #[serde(rename = "DVR")]
    Dvr,
}

/// Options of a SOAP-like spherical-invariant representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SphericalInvariantsConfig {
    /// Neighbour cutoff radius (default 5.0)
    pub interaction_cutoff: f64,
    /// Width of the smooth cutoff region (default 0.5)
    pub cutoff_smooth_width: f64,
    /// Number of radial basis functions (default 8)
    pub max_radial: usize,
    /// Maximum angular channel (default 6)
    pub max_angular: usize,
    /// Gaussian width model (default constant)
    pub gaussian_sigma_type: GaussianSigmaType,
    /// Gaussian width for the constant model (default 0.3)
    pub gaussian_sigma_constant: f64,
    /// Invariant body order (default power spectrum)
    pub soap_type: SoapType,
    /// Radial basis (default GTO)
    pub radial_basis: RadialBasis,
    /// Normalize each feature vector (default true)
    pub normalize: bool,
    /// Also compute position gradients, needed to fit forces (default false)
    pub compute_gradients: bool,
    /// Species channels to expand on; empty means all species present
    pub global_species: Vec<Species>,
}

impl Default for SphericalInvariantsConfig {
    fn default() -> Self {
        Self {
            interaction_cutoff: 5.0,
            cutoff_smooth_width: 0.5,
            max_radial: 8,
            max_angular: 6,
            gaussian_sigma_type: GaussianSigmaType::Constant,
            gaussian_sigma_constant: 0.3,
            soap_type: SoapType::PowerSpectrum,
            radial_basis: RadialBasis::Gto,
            normalize: true,
            compute_gradients: false,
            global_species: Vec::new(),
        }
    }
}

impl SphericalInvariantsConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.interaction_cutoff.is_finite() && self.interaction_cutoff > 0.0) {
            return Err(GapError::InvalidParameter(format!(
                "interaction_cutoff must be positive, got: {}",
                self.interaction_cutoff
            )));
        }
        if !(self.cutoff_smooth_width >= 0.0 && self.cutoff_smooth_width < self.interaction_cutoff)
        {
            return Err(GapError::InvalidParameter(format!(
                "cutoff_smooth_width must lie in [0, interaction_cutoff), got: {}",
                self.cutoff_smooth_width
            )));
        }
        if self.max_radial == 0 {
            return Err(GapError::InvalidParameter(
                "max_radial must be at least 1".to_string(),
            ));
        }
        if self.soap_type == SoapType::RadialSpectrum && self.max_angular != 0 {
            return Err(GapError::InvalidParameter(
                "max_angular must be 0 for the radial spectrum".to_string(),
            ));
        }
        if !(self.gaussian_sigma_constant.is_finite() && self.gaussian_sigma_constant > 0.0) {
            return Err(GapError::InvalidParameter(format!(
                "gaussian_sigma_constant must be positive, got: {}",
                self.gaussian_sigma_constant
            )));
        }
        Ok(())
    }
}

/// What a sparsification filter samples over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingGranularity {
    /// Select a separate set of points for each species
    #[default]
    SamplePerSpecies,
    /// Select points across all samples
    Sample,
    /// Select feature columns
    Feature,
}

/// Parameters of a sparsification filter
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterConfig {
    /// Number of sparse points requested per species
    pub n_sparse: BTreeMap<Species, usize>,
    #[serde(default)]
    pub act_on: SamplingGranularity,
}

impl FilterConfig {
    pub fn new(n_sparse: BTreeMap<Species, usize>) -> Self {
        Self {
            n_sparse,
            act_on: SamplingGranularity::default(),
        }
    }

    /// Total number of requested sparse points
    pub fn total(&self) -> usize {
        self.n_sparse.values().sum()
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_sparse.is_empty() {
            return Err(GapError::InvalidParameter(
                "At least one species needs a sparse point count".to_string(),
            ));
        }
        if let Some((species, _)) = self.n_sparse.iter().find(|(_, &n)| n == 0) {
            return Err(GapError::InvalidParameter(format!(
                "Sparse point count for species {species} must be positive"
            )));
        }
        Ok(())
    }
}

/// Build a representation from `config` and transform `structures`
pub fn calculate_representation<B: RepresentationBuilder + ?Sized>(
    structures: &[Structure],
    config: &RepresentationConfig,
    builder: &B,
) -> Result<(Box<dyn Representation>, RepresentationSet)> {
    config.validate()?;
    let representation = builder.build(config)?;
    let set = representation.transform(structures)?;
    check_transform(structures, &set)?;
    debug!(
        "Representation: {} structures x {} features{}",
        set.n_structures(),
        set.dim(),
        if set.has_gradients() { " (with gradients)" } else { "" }
    );
    Ok((representation, set))
}

/// Compute representations and select sparse points from them
///
/// The selected points are written to `sink` as `sparsepoints`.
pub fn calculate_and_sparsify<B, F, S>(
    structures: &[Structure],
    config: &RepresentationConfig,
    builder: &B,
    filter: &mut F,
    sink: &mut S,
) -> Result<(Box<dyn Representation>, RepresentationSet, SparsePoints)>
where
    B: RepresentationBuilder + ?Sized,
    F: SparsificationFilter + ?Sized,
    S: ArtifactSink + ?Sized,
{
    filter.config().validate()?;
    let (representation, set) = calculate_representation(structures, config, builder)?;
    let sparse_points = filter.fit_transform(&set)?;
    sparse_points.validate()?;
    if sparse_points.dim() != set.dim() {
        return Err(GapError::dimension(
            "sparse point feature dimension",
            set.dim(),
            sparse_points.dim(),
        ));
    }
    sink.write_sparse_points(&sparse_points)?;
    info!(
        "Selected {} sparse points ({} requested): {:?}",
        sparse_points.len(),
        filter.config().total(),
        sparse_points.counts_per_species()
    );
    Ok((representation, set, sparse_points))
}

/// Row and per-structure atom counts of `set` must follow `structures`
pub(crate) fn check_transform(structures: &[Structure], set: &RepresentationSet) -> Result<()> {
    if set.n_structures() != structures.len() {
        return Err(GapError::dimension(
            "representation rows",
            structures.len(),
            set.n_structures(),
        ));
    }
    let mismatch = structures
        .iter()
        .zip(set.atom_counts())
        .position(|(s, &n)| s.n_atoms() != n);
    if let Some(i) = mismatch {
        return Err(GapError::dimension(
            format!("representation atom count of structure {i}"),
            structures[i].n_atoms(),
            set.atom_counts()[i],
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use ndarray::{Array2, Axis};

    struct CompositionRepresentation {
        config: RepresentationConfig,
    }

    impl Representation for CompositionRepresentation {
        fn config(&self) -> &RepresentationConfig {
            &self.config
        }

        fn transform(&self, structures: &[Structure]) -> Result<RepresentationSet> {
            let features = Array2::from_shape_fn((structures.len(), 2), |(i, j)| {
                structures[i].count_species([1, 8][j]) as f64
            });
            RepresentationSet::new(
                features,
                structures.iter().map(Structure::n_atoms).collect(),
            )
        }
    }

    struct CompositionBuilder;

    impl RepresentationBuilder for CompositionBuilder {
        fn build(&self, config: &RepresentationConfig) -> Result<Box<dyn Representation>> {
            Ok(Box::new(CompositionRepresentation {
                config: config.clone(),
            }))
        }
    }

    struct FirstRowsFilter {
        config: FilterConfig,
    }

    impl SparsificationFilter for FirstRowsFilter {
        fn config(&self) -> &FilterConfig {
            &self.config
        }

        fn fit_transform(&mut self, features: &RepresentationSet) -> Result<SparsePoints> {
            let n = self.config.total().min(features.n_structures());
            let rows: Vec<usize> = (0..n).collect();
            SparsePoints::new(features.features().select(Axis(0), &rows), vec![1; n])
        }
    }

    #[test]
    fn test_spherical_invariants_defaults() {
        let config: RepresentationConfig =
            serde_json::from_str(r#"{"spherical_invariants": {}}"#).unwrap();
        assert_eq!(config, RepresentationConfig::default());
        assert!(config.validate().is_ok());
        assert!(!config.computes_gradients());
    }

    #[test]
    fn test_spherical_invariants_overrides() {
        let config: RepresentationConfig = serde_json::from_str(
            r#"{"spherical_invariants": {"max_radial": 4, "radial_basis": "DVR", "compute_gradients": true}}"#,
        )
        .unwrap();
        let RepresentationConfig::SphericalInvariants(inner) = &config;
        assert_eq!(inner.max_radial, 4);
        assert_eq!(inner.radial_basis, RadialBasis::Dvr);
        assert_eq!(inner.max_angular, 6);
        assert!(config.computes_gradients());
    }

    #[test]
    fn test_unknown_options_rejected() {
        let result: std::result::Result<RepresentationConfig, _> = serde_json::from_str(
            r#"{"spherical_invariants": {"max_radial": 4, "max_radail": 6}}"#,
        );
        assert!(result.is_err());

        let result: std::result::Result<RepresentationConfig, _> =
            serde_json::from_str(r#"{"behler_parrinello": {}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_spherical_invariants_validation() {
        let mut config = SphericalInvariantsConfig::default();
        config.cutoff_smooth_width = 6.0;
        assert!(config.validate().is_err());

        let mut config = SphericalInvariantsConfig::default();
        config.soap_type = SoapType::RadialSpectrum;
        assert!(config.validate().is_err());
        config.max_angular = 0;
        assert!(config.validate().is_ok());

        let mut config = SphericalInvariantsConfig::default();
        config.max_radial = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_filter_config() {
        let config: FilterConfig =
            serde_json::from_str(r#"{"n_sparse": {"1": 10, "8": 5}}"#).unwrap();
        assert_eq!(config.total(), 15);
        assert_eq!(config.act_on, SamplingGranularity::SamplePerSpecies);
        assert!(config.validate().is_ok());

        assert!(FilterConfig::default().validate().is_err());
        let zero = FilterConfig::new([(1, 0)].into_iter().collect());
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_calculate_representation() {
        let structures = vec![Structure::new(vec![8, 1, 1]), Structure::new(vec![1])];
        let (rep, set) = calculate_representation(
            &structures,
            &RepresentationConfig::default(),
            &CompositionBuilder,
        )
        .unwrap();
        assert_eq!(rep.config(), &RepresentationConfig::default());
        assert_eq!(set.n_structures(), 2);
        assert_eq!(set.features()[[0, 0]], 2.0);
        assert_eq!(set.features()[[0, 1]], 1.0);
    }

    #[test]
    fn test_calculate_and_sparsify_persists_points() {
        let structures = vec![
            Structure::new(vec![8, 1, 1]),
            Structure::new(vec![1]),
            Structure::new(vec![8]),
        ];
        let mut filter = FirstRowsFilter {
            config: FilterConfig::new([(1, 2)].into_iter().collect()),
        };
        let mut sink = MemorySink::new();
        let (_, set, sparse) = calculate_and_sparsify(
            &structures,
            &RepresentationConfig::default(),
            &CompositionBuilder,
            &mut filter,
            &mut sink,
        )
        .unwrap();

        assert_eq!(set.n_structures(), 3);
        assert_eq!(sparse.len(), 2);
        assert_eq!(sink.sparse_points, Some(sparse));
    }

    #[test]
    fn test_transform_shape_checked() {
        let structures = vec![Structure::new(vec![1])];
        let wrong_atoms = RepresentationSet::new(Array2::zeros((1, 2)), vec![2]).unwrap();
        assert!(check_transform(&structures, &wrong_atoms).is_err());

        let wrong_rows = RepresentationSet::new(Array2::zeros((2, 2)), vec![1, 1]).unwrap();
        assert!(check_transform(&structures, &wrong_rows).is_err());
    }
}
