// Solver contract: the only boundary the formulation layer depends on

use super::models::{OptimizationProblem, Solution};
use super::value_objects::SolutionStatus;

/// Errors raised while formulating, solving or decoding a problem
#[derive(Debug, thiserror::Error)]
pub enum SolverError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid problem: {0}")]
    InvalidProblem(String),

    #[error("Infeasible: {0}")]
    Infeasible(String),

    #[error("Solver finished with status {status}: {message}")]
    NotOptimal {
        status: SolutionStatus,
        message: String,
    },

    #[error("Solver not available: {0}")]
    SolverNotAvailable(String),

    #[error("Solver execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Inconsistent solution: {0}")]
    InconsistentSolution(String),

    #[error("Resource sampling failed: {0}")]
    Sampling(String),
}

pub type Result<T> = std::result::Result<T, SolverError>;

/// Capability interface over an external LP/MIP engine.
///
/// Implementations must not mutate the model and may block for as long as
/// the engine needs. Any time limit is taken from `problem.solver_config`.
pub trait SolverService: Send + Sync {
    /// Solve an optimization problem
    fn solve(&self, problem: &OptimizationProblem) -> Result<Solution>;

    /// Validate a problem without solving it
    fn validate(&self, problem: &OptimizationProblem) -> Result<()> {
        let mut errors = Vec::new();

        if problem.num_variables() == 0 {
            errors.push("Problem must have at least one variable".to_string());
        }

        for (i, var) in problem.variables().iter().enumerate() {
            if let Some(upper) = var.upper_bound {
                if var.lower_bound > upper {
                    errors.push(format!(
                        "Variable {} '{}' has lower bound ({}) > upper bound ({})",
                        i, var.name, var.lower_bound, upper
                    ));
                }
            }
        }

        for (i, constraint) in problem.constraints().iter().enumerate() {
            if !constraint.bound.is_finite()
                || constraint.terms.iter().any(|(_, c)| !c.is_finite())
            {
                errors.push(format!(
                    "Constraint {} '{}' has a non-finite coefficient or bound",
                    i, constraint.name
                ));
            }
        }

        if problem
            .objective()
            .expression
            .terms()
            .iter()
            .any(|(_, c)| !c.is_finite())
        {
            errors.push("Objective has a non-finite coefficient".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(SolverError::InvalidProblem(errors.join("; ")))
        }
    }

    /// Get the name of this solver backend
    fn name(&self) -> &str;

    /// Check if this solver supports mixed-integer programming
    fn supports_mip(&self) -> bool;
}
