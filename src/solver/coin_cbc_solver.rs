use crate::domain::{
    models::{OptimizationProblem, Solution as DomainSolution, SolutionQuality, SolverStatistics},
    solver_service::{Result, SolverError, SolverService},
    value_objects::{ConstraintType, OptimizationType, SolutionStatus as DomainSolutionStatus},
};
use good_lp::{
    solvers::{coin_cbc, SolutionStatus as EngineStatus},
    variable, variables, Expression, ResolutionError, Solution as GoodLpSolutionTrait,
    SolverModel, Variable as GoodLpVariable,
};
use std::time::Instant;
use tracing::debug;

pub struct CoinCbcSolver;

impl CoinCbcSolver {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CoinCbcSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl SolverService for CoinCbcSolver {
    fn solve(&self, problem: &OptimizationProblem) -> Result<DomainSolution> {
        self.validate(problem)?;

        let start_time = Instant::now();

        let mut vars = variables!();
        let lp_variables: Vec<GoodLpVariable> = problem
            .variables()
            .iter()
            .map(|var_def| {
                let lower = var_def.lower_bound;
                let upper = var_def.upper_bound.unwrap_or(f64::INFINITY);
                if var_def.is_integer() {
                    vars.add(variable().integer().min(lower).max(upper))
                } else {
                    vars.add(variable().min(lower).max(upper))
                }
            })
            .collect();

        // good_lp minimizes, so negate for maximization
        let is_maximize = problem.objective().optimization_type == OptimizationType::Maximize;
        let mut obj_expr: Expression = 0.into();
        for (&var, coeff) in lp_variables.iter().zip(problem.objective_coefficients()) {
            if coeff != 0.0 {
                let c = if is_maximize { -coeff } else { coeff };
                obj_expr += c * var;
            }
        }

        let mut lp_model = vars.minimise(obj_expr).using(coin_cbc::coin_cbc);

        let config = &problem.solver_config;
        lp_model.set_parameter("log", if config.verbose { "1" } else { "0" });
        if let Some(limit) = config.time_limit {
            lp_model.set_parameter("seconds", &limit.to_string());
        }
        if let Some(gap) = config.gap_tolerance {
            lp_model.set_parameter("ratioGap", &gap.to_string());
        }

        for constraint in problem.constraints() {
            let mut lhs: Expression = 0.into();
            for &(var, coeff) in &constraint.terms {
                lhs += coeff * lp_variables[var.index()];
            }

            lp_model = match constraint.constraint_type {
                ConstraintType::LessThanOrEqual => lp_model.with(lhs.leq(constraint.bound)),
                ConstraintType::Equal => lp_model.with(lhs.eq(constraint.bound)),
                ConstraintType::GreaterThanOrEqual => lp_model.with(lhs.geq(constraint.bound)),
            };
        }

        let solution_result = lp_model.solve();
        let statistics =
            SolverStatistics::for_problem(problem, start_time.elapsed().as_secs_f64() * 1000.0);
        debug!(
            ok = solution_result.is_ok(),
            solve_time_ms = statistics.solve_time_ms,
            "CBC returned"
        );

        match solution_result {
            Ok(sol) => {
                let variable_values: Vec<f64> =
                    lp_variables.iter().map(|&var| sol.value(var)).collect();
                let quality = SolutionQuality::measure(problem, &variable_values);
                let objective = problem.objective().value(&variable_values);

                let solution = match engine_status(sol.status()) {
                    (DomainSolutionStatus::Optimal, _) => DomainSolution {
                        message: format!("Optimal solution found for '{}'", problem.name),
                        ..DomainSolution::optimal(objective, variable_values)
                    },
                    (status, message) => DomainSolution {
                        optimal_value: Some(objective),
                        variable_values,
                        ..DomainSolution::new(status, message)
                    },
                };

                Ok(solution.with_statistics(statistics).with_quality(quality))
            }
            Err(ResolutionError::Infeasible) => Ok(DomainSolution::new(
                DomainSolutionStatus::Infeasible,
                "Problem is infeasible: no solution satisfies all constraints",
            )
            .with_statistics(statistics)),
            Err(ResolutionError::Unbounded) => Ok(DomainSolution::new(
                DomainSolutionStatus::Unbounded,
                "Problem is unbounded: objective can be improved infinitely",
            )
            .with_statistics(statistics)),
            Err(e) => Err(SolverError::ExecutionFailed(format!("{:?}", e))),
        }
    }

    fn name(&self) -> &str {
        "COIN-OR CBC"
    }

    fn supports_mip(&self) -> bool {
        true
    }
}

/// CBC returns its incumbent when a limit stops the search.
fn engine_status(status: EngineStatus) -> (DomainSolutionStatus, &'static str) {
    match status {
        EngineStatus::Optimal => (DomainSolutionStatus::Optimal, "Optimal solution found"),
        EngineStatus::TimeLimit => (
            DomainSolutionStatus::TimeLimit,
            "Time limit reached; returning the best solution found",
        ),
        EngineStatus::GapLimit => (
            DomainSolutionStatus::Feasible,
            "Gap tolerance reached; returning the best solution found",
        ),
    }
}
