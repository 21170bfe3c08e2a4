// HiGHS Solver Adapter
// Translates the sparse domain model into a HiGHS row problem

use crate::domain::{
    models::{OptimizationProblem, Solution as DomainSolution, SolutionQuality, SolverStatistics},
    solver_service::{Result, SolverError, SolverService},
    value_objects::{ConstraintType, OptimizationType, SolutionStatus as DomainSolutionStatus},
};
use highs::{HighsModelStatus, RowProblem, Sense};
use std::time::Instant;
use tracing::debug;

pub struct HighsSolver;

impl HighsSolver {
    pub fn new() -> Self {
        Self
    }
}

impl Default for HighsSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl SolverService for HighsSolver {
    fn solve(&self, problem: &OptimizationProblem) -> Result<DomainSolution> {
        self.validate(problem)?;

        let start_time = Instant::now();
        let objective = problem.objective_coefficients();

        let mut pb = RowProblem::default();
        let columns: Vec<_> = problem
            .variables()
            .iter()
            .zip(&objective)
            .map(|(var_def, &obj_coeff)| {
                let lower = var_def.lower_bound;
                let upper = var_def.upper_bound.unwrap_or(f64::INFINITY);
                if var_def.is_integer() {
                    pb.add_integer_column(obj_coeff, lower..=upper)
                } else {
                    pb.add_column(obj_coeff, lower..=upper)
                }
            })
            .collect();

        for constraint in problem.constraints() {
            let terms: Vec<_> = constraint
                .terms
                .iter()
                .map(|&(var, coeff)| (columns[var.index()], coeff))
                .collect();

            match constraint.constraint_type {
                ConstraintType::LessThanOrEqual => {
                    pb.add_row(..=constraint.bound, &terms);
                }
                ConstraintType::Equal => {
                    pb.add_row(constraint.bound..=constraint.bound, &terms);
                }
                ConstraintType::GreaterThanOrEqual => {
                    pb.add_row(constraint.bound.., &terms);
                }
            }
        }

        let sense = match problem.objective().optimization_type {
            OptimizationType::Maximize => Sense::Maximise,
            OptimizationType::Minimize => Sense::Minimise,
        };

        let config = &problem.solver_config;
        let mut model = pb.optimise(sense);
        if !config.verbose {
            model.make_quiet();
        }
        model.set_option("output_flag", config.verbose);
        if let Some(limit) = config.time_limit {
            model.set_option("time_limit", limit);
        }
        if let Some(gap) = config.gap_tolerance {
            model.set_option("mip_rel_gap", gap);
        }

        let solved = model.solve();
        let statistics =
            SolverStatistics::for_problem(problem, start_time.elapsed().as_secs_f64() * 1000.0);
        debug!(status = ?solved.status(), solve_time_ms = statistics.solve_time_ms, "HiGHS returned");

        let (status, message) = match solved.status() {
            HighsModelStatus::Optimal | HighsModelStatus::ModelEmpty => {
                let variable_values = solved.get_solution().columns().to_vec();
                let quality = SolutionQuality::measure(problem, &variable_values);
                let solution =
                    DomainSolution::optimal(problem.objective().value(&variable_values), variable_values)
                        .with_statistics(statistics)
                        .with_quality(quality);
                return Ok(DomainSolution {
                    message: format!("Optimal solution found for '{}'", problem.name),
                    ..solution
                });
            }
            other => non_optimal_status(other).ok_or_else(|| {
                SolverError::ExecutionFailed(format!("HiGHS solver returned status: {:?}", other))
            })?,
        };

        Ok(DomainSolution::new(status, message).with_statistics(statistics))
    }

    fn name(&self) -> &str {
        "HiGHS"
    }

    fn supports_mip(&self) -> bool {
        true
    }
}

/// Domain status and message for a terminal status without a usable optimum.
fn non_optimal_status(status: HighsModelStatus) -> Option<(DomainSolutionStatus, &'static str)> {
    match status {
        HighsModelStatus::Infeasible => Some((
            DomainSolutionStatus::Infeasible,
            "Problem is infeasible: no solution satisfies all constraints",
        )),
        HighsModelStatus::Unbounded => Some((
            DomainSolutionStatus::Unbounded,
            "Problem is unbounded: objective can be improved infinitely",
        )),
        HighsModelStatus::UnboundedOrInfeasible => Some((
            DomainSolutionStatus::UnboundedOrInfeasible,
            "Presolve found the problem unbounded or infeasible",
        )),
        HighsModelStatus::ReachedTimeLimit => Some((
            DomainSolutionStatus::TimeLimit,
            "Time limit reached before optimality was proven",
        )),
        HighsModelStatus::ReachedIterationLimit => Some((
            DomainSolutionStatus::IterationLimit,
            "Iteration limit reached before optimality was proven",
        )),
        _ => None,
    }
}
