// Thresholding policy shared by every decoder
//
// Solver output carries floating-point noise. Binary decisions are read
// through `is_selected` (or `is_one` where a site must be fully open)
// and fractional flows through `is_active` so that all problem families
// round the same way.

use crate::domain::{Result, Solution, SolverError, VariableId};

/// Tolerance under which a solved value counts as zero.
pub const EPSILON: f64 = 1e-6;

/// A binary variable is true strictly above this value.
pub const BINARY_CUTOFF: f64 = 0.5;

pub fn is_selected(value: f64) -> bool {
    value > BINARY_CUTOFF
}

pub fn is_active(value: f64) -> bool {
    value > EPSILON
}

/// Within `EPSILON` of one, for decisions that must be fully taken.
pub fn is_one(value: f64) -> bool {
    value > 1.0 - EPSILON
}

/// Round for display, e.g. `round_to(12.345, 2) == 12.35`.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Solved value of `variable`, failing when the backend left it out.
pub fn read_value(solution: &Solution, variable: VariableId) -> Result<f64> {
    solution.value(variable).ok_or_else(|| {
        SolverError::InconsistentSolution(format!(
            "no value for variable {} ({} values returned)",
            variable,
            solution.variable_values.len()
        ))
    })
}
