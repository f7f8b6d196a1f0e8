//! Linear-algebra side of the GAP fit
//!
//! `design` turns baseline-shifted targets and kernels into a jointly
//! regularized least-squares problem; `lstsq` solves it.

pub mod design;
pub mod lstsq;

pub use self::design::*;
pub use self::lstsq::*;
