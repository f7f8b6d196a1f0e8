//! Training data loading
//!
//! Structures and reference energies (and forces) come from extended XYZ
//! files; representation features are produced elsewhere and read from JSON.

pub mod elements;
pub mod xyz;

pub use self::elements::{atomic_number, symbol};
pub use self::xyz::*;
