//! Compilation units
//!
//! The engine is IR agnostic: it only needs to tell units apart and to walk
//! the functions of a module. Any IR that implements these two traits can
//! be driven by an [`Executor`](crate::executor::Executor).

use std::fmt;

/// Identity of a compilation unit, unique within one compilation session
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnitId(pub u64);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit#{}", self.0)
    }
}

/// Anything a stage can run on
pub trait Unit {
    /// Get the unit identity used to key cached analyses
    fn unit_id(&self) -> UnitId;
}

/// A module: the outermost unit, owning its functions
pub trait Module: Unit {
    /// Function unit type
    type Function: Unit;

    /// Get the functions of this module, in layout order
    fn functions(&self) -> &[Self::Function];

    /// Get mutable access to the functions of this module
    fn functions_mut(&mut self) -> &mut [Self::Function];

    /// Collect the identities of all functions
    fn function_ids(&self) -> Vec<UnitId> {
        self.functions().iter().map(Unit::unit_id).collect()
    }
}
