// Formulation layer: problem families
//
// Each family turns typed input into a fresh `OptimizationProblem` plus a
// layout recording which `VariableId` stands for which decision, then reads
// a solved `Solution` back through that layout.

pub mod allocation;
pub mod coverage;
pub mod decode;
pub mod facility_location;
pub mod geometry;
pub mod job_shop;
pub mod resource_tuning;

#[cfg(test)]
pub(crate) mod testing;

use crate::domain::{OptimizationProblem, Result, Solution};

/// A freshly built model and the variable layout needed to decode it
#[derive(Debug, Clone, PartialEq)]
pub struct Formulated<L> {
    pub problem: OptimizationProblem,
    pub layout: L,
}

/// Build → solve → decode contract shared by every problem family
pub trait Formulation {
    type Layout;
    type Output;

    /// Reject structurally inconsistent input before any model is built.
    fn validate(&self) -> Result<()>;

    /// Build a new model from the input. Never reuses a previous model.
    fn build(&self) -> Result<Formulated<Self::Layout>>;

    /// Map an optimal solution back into domain results.
    fn decode(&self, layout: &Self::Layout, solution: &Solution) -> Result<Self::Output>;
}
