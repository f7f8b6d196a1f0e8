//! Kernel functions for GAP fitting

pub mod power;
pub mod traits;

pub use self::power::*;
pub use self::traits::*;
