// Application layer: build → solve → decode for any problem family

use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::{
    OptimizationProblem, Result, Solution, SolutionQuality, SolutionStatus, SolverConfig,
    SolverError, SolverService, SolverStatistics,
};
use crate::formulation::{Formulated, Formulation};

/// Violation above which a returned optimum is logged as suspicious
const QUALITY_WARNING_THRESHOLD: f64 = 1e-5;

/// Decoded output of one solve together with what the engine reported
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Plan<T> {
    pub output: T,
    pub objective_value: f64,
    pub statistics: SolverStatistics,
    pub quality: SolutionQuality,
}

/// Runs problem families against one injected solver.
///
/// Holds no state between solves: every call builds a fresh model.
#[derive(Clone)]
pub struct PlanningService {
    solver: Arc<dyn SolverService>,
    config: SolverConfig,
}

impl PlanningService {
    pub fn new(solver: Arc<dyn SolverService>) -> Self {
        Self {
            solver,
            config: SolverConfig::default(),
        }
    }

    /// Configuration stamped onto every model before it is solved
    pub fn with_config(mut self, config: SolverConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn solver_name(&self) -> &str {
        self.solver.name()
    }

    pub fn solve<F: Formulation>(&self, input: &F) -> Result<Plan<F::Output>> {
        let Formulated { problem, layout } = input.build()?;
        let problem = problem.with_config(self.config.clone());
        let solution = self.solve_model(&problem)?;

        let output = input.decode(&layout, &solution)?;
        Ok(Plan {
            output,
            objective_value: solution
                .optimal_value
                .unwrap_or_else(|| problem.objective().value(&solution.variable_values)),
            statistics: solution.statistics,
            quality: solution.quality,
        })
    }

    /// Solve a built model, turning every non-optimal outcome into an error.
    pub fn solve_model(&self, problem: &OptimizationProblem) -> Result<Solution> {
        self.solver.validate(problem)?;

        info!(
            problem = %problem.name,
            solver = self.solver.name(),
            variables = problem.num_variables(),
            constraints = problem.num_constraints(),
            integer_variables = problem.num_integer_variables(),
            "solving"
        );
        if problem.is_mixed_integer() && !self.solver.supports_mip() {
            return Err(SolverError::SolverNotAvailable(format!(
                "{} does not support integer variables",
                self.solver.name()
            )));
        }

        let solution = self.solver.solve(problem)?;
        info!(
            problem = %problem.name,
            status = %solution.status,
            objective = solution.optimal_value,
            solve_time_ms = solution.statistics.solve_time_ms,
            "solver finished"
        );

        match solution.status {
            SolutionStatus::Optimal => {}
            SolutionStatus::Infeasible => {
                return Err(SolverError::Infeasible(solution.message));
            }
            status => {
                return Err(SolverError::NotOptimal {
                    status,
                    message: solution.message,
                });
            }
        }

        if solution.variable_values.len() != problem.num_variables() {
            return Err(SolverError::InconsistentSolution(format!(
                "solver returned {} values for {} variables",
                solution.variable_values.len(),
                problem.num_variables()
            )));
        }
        if solution.quality.max_constraint_violation > QUALITY_WARNING_THRESHOLD {
            warn!(
                problem = %problem.name,
                violation = solution.quality.max_constraint_violation,
                "optimal solution violates a constraint"
            );
        }
        Ok(solution)
    }
}
