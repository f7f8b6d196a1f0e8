//! Capability interfaces for the collaborators around the fitting core
//!
//! The fitting pipeline never depends on a concrete representation or
//! sparsification scheme, only on these traits.

use crate::core::{RepresentationSet, Result, SparsePoints, Structure};
use crate::representation::{FilterConfig, RepresentationConfig};

/// A structural representation (e.g. a SOAP-like descriptor)
pub trait Representation: Send + Sync {
    /// Configuration this representation was built from
    fn config(&self) -> &RepresentationConfig;

    /// Compute one representation row per structure
    fn transform(&self, structures: &[Structure]) -> Result<RepresentationSet>;
}

/// Builds representations from an explicit configuration
pub trait RepresentationBuilder {
    fn build(&self, config: &RepresentationConfig) -> Result<Box<dyn Representation>>;
}

/// Selects sparse (support) points from a representation set
pub trait SparsificationFilter {
    /// Parameters the filter samples with
    fn config(&self) -> &FilterConfig;

    /// Select sparse points from `features`
    fn fit_transform(&mut self, features: &RepresentationSet) -> Result<SparsePoints>;
}
