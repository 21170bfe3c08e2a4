use std::sync::atomic::{AtomicU64, Ordering};

use super::expression::{LinearExpression, VariableId};
use super::solver_service::{Result, SolverError};
use super::value_objects::{
    ConstraintType, OptimizationType, SolutionStatus, SolverBackend, VariableType,
};

/// Decision variable in an optimization problem
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub variable_type: VariableType,
    pub lower_bound: f64,
    pub upper_bound: Option<f64>,
    pub name: String,
}

impl Variable {
    /// Continuous variable, x ≥ 0
    pub fn continuous(name: impl Into<String>) -> Self {
        Self {
            variable_type: VariableType::Continuous,
            lower_bound: 0.0,
            upper_bound: None,
            name: name.into(),
        }
    }

    /// Continuous variable, 0 ≤ x ≤ 1
    pub fn fraction(name: impl Into<String>) -> Self {
        Self::continuous(name).with_bounds(0.0, Some(1.0))
    }

    /// Integer variable, x ≥ 0
    pub fn integer(name: impl Into<String>) -> Self {
        Self {
            variable_type: VariableType::Integer,
            lower_bound: 0.0,
            upper_bound: None,
            name: name.into(),
        }
    }

    pub fn binary(name: impl Into<String>) -> Self {
        Self {
            variable_type: VariableType::Binary,
            lower_bound: 0.0,
            upper_bound: Some(1.0),
            name: name.into(),
        }
    }

    pub fn with_bounds(mut self, lower: f64, upper: Option<f64>) -> Self {
        self.lower_bound = lower;
        self.upper_bound = upper;
        self
    }

    pub fn is_integer(&self) -> bool {
        self.variable_type.is_integral()
    }
}

/// Objective function to minimize or maximize
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectiveFunction {
    pub optimization_type: OptimizationType,
    pub expression: LinearExpression,
}

impl ObjectiveFunction {
    pub fn new(optimization_type: OptimizationType, expression: impl Into<LinearExpression>) -> Self {
        Self {
            optimization_type,
            expression: expression.into(),
        }
    }

    pub fn minimize(expression: impl Into<LinearExpression>) -> Self {
        Self::new(OptimizationType::Minimize, expression)
    }

    pub fn maximize(expression: impl Into<LinearExpression>) -> Self {
        Self::new(OptimizationType::Maximize, expression)
    }

    pub fn value(&self, values: &[f64]) -> f64 {
        self.expression.evaluate(values)
    }
}

/// Linear constraint `Σ coefficient·variable (op) bound`.
///
/// Built from two expressions and normalized so every variable term sits
/// on the left and every constant on the right.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub constraint_type: ConstraintType,
    pub terms: Vec<(VariableId, f64)>,
    pub bound: f64,
    pub name: String,
}

impl Constraint {
    pub fn new(
        constraint_type: ConstraintType,
        lhs: impl Into<LinearExpression>,
        rhs: impl Into<LinearExpression>,
    ) -> Self {
        let difference = lhs.into() - rhs.into();
        Self {
            constraint_type,
            terms: difference.compacted(),
            bound: -difference.offset(),
            name: String::new(),
        }
    }

    pub fn leq(lhs: impl Into<LinearExpression>, rhs: impl Into<LinearExpression>) -> Self {
        Self::new(ConstraintType::LessThanOrEqual, lhs, rhs)
    }

    pub fn geq(lhs: impl Into<LinearExpression>, rhs: impl Into<LinearExpression>) -> Self {
        Self::new(ConstraintType::GreaterThanOrEqual, lhs, rhs)
    }

    pub fn eq(lhs: impl Into<LinearExpression>, rhs: impl Into<LinearExpression>) -> Self {
        Self::new(ConstraintType::Equal, lhs, rhs)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn num_variables(&self) -> usize {
        self.terms.len()
    }

    /// Left-hand side evaluated at `values`.
    pub fn activity(&self, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|&(var, coeff)| coeff * values.get(var.index()).copied().unwrap_or(0.0))
            .sum()
    }

    /// How far `values` are from satisfying this row; zero when satisfied.
    pub fn violation(&self, values: &[f64]) -> f64 {
        let activity = self.activity(values);
        match self.constraint_type {
            ConstraintType::LessThanOrEqual => (activity - self.bound).max(0.0),
            ConstraintType::GreaterThanOrEqual => (self.bound - activity).max(0.0),
            ConstraintType::Equal => (activity - self.bound).abs(),
        }
    }
}

/// Configuration for the solver
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SolverConfig {
    pub backend: SolverBackend,
    /// Wall-clock limit in seconds
    pub time_limit: Option<f64>,
    /// Relative MIP gap at which the backend may stop
    pub gap_tolerance: Option<f64>,
    pub verbose: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            backend: SolverBackend::Auto,
            time_limit: None,
            gap_tolerance: None,
            verbose: false,
        }
    }
}

impl SolverConfig {
    pub fn with_backend(mut self, backend: SolverBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_time_limit(mut self, seconds: f64) -> Self {
        self.time_limit = Some(seconds);
        self
    }

    pub fn with_gap_tolerance(mut self, gap: f64) -> Self {
        self.gap_tolerance = Some(gap);
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

// Token 0 is never handed out
static NEXT_MODEL_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Complete optimization model handed to a `SolverService`.
///
/// Variables, constraints and the objective are only reachable through
/// methods that check every referenced `VariableId` belongs to this model.
/// Clones share the token and so accept each other's ids.
#[derive(Debug, Clone)]
pub struct OptimizationProblem {
    token: u64,
    pub name: String,
    pub description: String,
    pub solver_config: SolverConfig,
    objective: ObjectiveFunction,
    constraints: Vec<Constraint>,
    variables: Vec<Variable>,
}

impl OptimizationProblem {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            token: NEXT_MODEL_TOKEN.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            description: String::new(),
            solver_config: SolverConfig::default(),
            objective: ObjectiveFunction::minimize(LinearExpression::new()),
            constraints: Vec::new(),
            variables: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_config(mut self, config: SolverConfig) -> Self {
        self.solver_config = config;
        self
    }

    pub fn add_variable(&mut self, variable: Variable) -> VariableId {
        let id = VariableId::new(self.token, self.variables.len());
        self.variables.push(variable);
        id
    }

    pub fn add_constraint(&mut self, constraint: Constraint) -> Result<()> {
        if let Some(var) = constraint.terms.iter().map(|&(v, _)| v).find(|v| !self.owns(*v)) {
            return Err(SolverError::InvalidProblem(format!(
                "Constraint '{}' references unknown variable {}",
                constraint.name, var
            )));
        }
        self.constraints.push(constraint);
        Ok(())
    }

    pub fn set_objective(&mut self, objective: ObjectiveFunction) -> Result<()> {
        if let Some(var) = objective.expression.variables().find(|v| !self.owns(*v)) {
            return Err(SolverError::InvalidProblem(format!(
                "Objective references unknown variable {}",
                var
            )));
        }
        self.objective = objective;
        Ok(())
    }

    fn owns(&self, var: VariableId) -> bool {
        var.model() == self.token && var.index() < self.variables.len()
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn variable(&self, id: VariableId) -> Option<&Variable> {
        self.variables.get(id.index())
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn objective(&self) -> &ObjectiveFunction {
        &self.objective
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    pub fn num_integer_variables(&self) -> usize {
        self.variables.iter().filter(|v| v.is_integer()).count()
    }

    pub fn num_binary_variables(&self) -> usize {
        self.variables
            .iter()
            .filter(|v| v.variable_type == VariableType::Binary)
            .count()
    }

    pub fn is_mixed_integer(&self) -> bool {
        self.num_integer_variables() > 0
    }

    /// Dense objective coefficients, one per variable, duplicates summed.
    pub fn objective_coefficients(&self) -> Vec<f64> {
        let mut coefficients = vec![0.0; self.variables.len()];
        for &(var, coeff) in self.objective.expression.terms() {
            coefficients[var.index()] += coeff;
        }
        coefficients
    }

    pub fn max_constraint_violation(&self, values: &[f64]) -> f64 {
        self.constraints
            .iter()
            .map(|c| c.violation(values))
            .fold(0.0, f64::max)
    }

    pub fn max_integrality_violation(&self, values: &[f64]) -> f64 {
        self.variables
            .iter()
            .zip(values)
            .filter(|(var, _)| var.is_integer())
            .map(|(_, value)| (value - value.round()).abs())
            .fold(0.0, f64::max)
    }
}

/// Structural equality: the model token is ignored.
impl PartialEq for OptimizationProblem {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.description == other.description
            && self.solver_config == other.solver_config
            && self.objective == other.objective
            && self.constraints == other.constraints
            && self.variables == other.variables
    }
}

/// Statistics about the solve process
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SolverStatistics {
    pub solve_time_ms: f64,
    pub num_variables: u32,
    pub num_constraints: u32,
    pub num_integer_vars: u32,
    pub num_binary_vars: u32,
}

impl SolverStatistics {
    pub fn for_problem(problem: &OptimizationProblem, solve_time_ms: f64) -> Self {
        Self {
            solve_time_ms,
            num_variables: problem.num_variables() as u32,
            num_constraints: problem.num_constraints() as u32,
            num_integer_vars: (problem.num_integer_variables() - problem.num_binary_variables())
                as u32,
            num_binary_vars: problem.num_binary_variables() as u32,
        }
    }
}

/// Quality metrics for the solution
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SolutionQuality {
    pub max_constraint_violation: f64,
    pub max_integrality_violation: f64,
}

impl SolutionQuality {
    pub fn measure(problem: &OptimizationProblem, values: &[f64]) -> Self {
        Self {
            max_constraint_violation: problem.max_constraint_violation(values),
            max_integrality_violation: problem.max_integrality_violation(values),
        }
    }
}

/// Raw result of one solve: status and, when optimal, a value per variable
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub status: SolutionStatus,
    pub optimal_value: Option<f64>,
    pub variable_values: Vec<f64>,
    pub message: String,
    pub statistics: SolverStatistics,
    pub quality: SolutionQuality,
}

impl Solution {
    pub fn new(status: SolutionStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            optimal_value: None,
            variable_values: Vec::new(),
            message: message.into(),
            statistics: SolverStatistics::default(),
            quality: SolutionQuality::default(),
        }
    }

    pub fn optimal(value: f64, variable_values: Vec<f64>) -> Self {
        Self {
            status: SolutionStatus::Optimal,
            optimal_value: Some(value),
            variable_values,
            message: "Optimal solution found".to_string(),
            statistics: SolverStatistics::default(),
            quality: SolutionQuality::default(),
        }
    }

    pub fn with_statistics(mut self, statistics: SolverStatistics) -> Self {
        self.statistics = statistics;
        self
    }

    pub fn with_quality(mut self, quality: SolutionQuality) -> Self {
        self.quality = quality;
        self
    }

    pub fn is_optimal(&self) -> bool {
        self.status.is_optimal()
    }

    pub fn value(&self, variable: VariableId) -> Option<f64> {
        self.variable_values.get(variable.index()).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraint_normalizes_both_sides() {
        let mut problem = OptimizationProblem::new("t");
        let x = problem.add_variable(Variable::integer("x"));
        let y = problem.add_variable(Variable::integer("y"));

        // x + 3 <= y + 10  =>  x - y <= 7
        let row = Constraint::leq(x + 3.0, y + 10.0);
        assert_eq!(row.terms, vec![(x, 1.0), (y, -1.0)]);
        assert_eq!(row.bound, 7.0);
        assert_eq!(row.violation(&[9.0, 1.0]), 1.0);
        assert_eq!(row.violation(&[1.0, 1.0]), 0.0);
    }

    #[test]
    fn foreign_variables_are_rejected() {
        let mut other = OptimizationProblem::new("other");
        other.add_variable(Variable::continuous("a"));
        let foreign = other.add_variable(Variable::continuous("b"));

        let mut problem = OptimizationProblem::new("t");
        problem.add_variable(Variable::continuous("x"));

        let err = problem
            .add_constraint(Constraint::geq(foreign, 1.0).with_name("bad"))
            .unwrap_err();
        assert!(matches!(err, SolverError::InvalidProblem(_)));
        assert!(err.to_string().contains("bad"));
        assert!(problem
            .set_objective(ObjectiveFunction::minimize(foreign))
            .is_err());
        assert_eq!(problem.num_constraints(), 0);
    }

    #[test]
    fn foreign_ids_within_range_are_rejected() {
        let mut other = OptimizationProblem::new("other");
        let foreign = other.add_variable(Variable::continuous("a"));

        let mut problem = OptimizationProblem::new("t");
        let own = problem.add_variable(Variable::continuous("x"));
        assert_eq!(own.index(), foreign.index());

        assert!(matches!(
            problem.add_constraint(Constraint::geq(foreign, 1.0)),
            Err(SolverError::InvalidProblem(_))
        ));
        assert!(problem
            .set_objective(ObjectiveFunction::minimize(foreign))
            .is_err());
        assert!(problem.add_constraint(Constraint::geq(own, 1.0)).is_ok());

        let mut copy = problem.clone();
        assert!(copy.add_constraint(Constraint::leq(own, 5.0)).is_ok());
    }

    #[test]
    fn rebuilding_yields_equal_models() {
        let build = || {
            let mut problem = OptimizationProblem::new("t");
            let x = problem.add_variable(Variable::integer("x"));
            problem.add_constraint(Constraint::leq(x, 3.0)).unwrap();
            problem
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn counts_and_dense_objective() {
        let mut problem = OptimizationProblem::new("t");
        let x = problem.add_variable(Variable::binary("x"));
        problem.add_variable(Variable::integer("y"));
        let z = problem.add_variable(Variable::fraction("z"));
        problem
            .set_objective(ObjectiveFunction::minimize(x * 2.0 + z + LinearExpression::from(x)))
            .unwrap();

        assert_eq!(problem.objective_coefficients(), vec![3.0, 0.0, 1.0]);
        assert_eq!(problem.num_integer_variables(), 2);
        assert_eq!(problem.num_binary_variables(), 1);
        assert!(problem.is_mixed_integer());
        assert_eq!(problem.variable(z).unwrap().upper_bound, Some(1.0));
        assert_eq!(problem.max_integrality_violation(&[0.0, 2.25, 0.5]), 0.25);

        let stats = SolverStatistics::for_problem(&problem, 1.0);
        assert_eq!(stats.num_integer_vars, 1);
        assert_eq!(stats.num_binary_vars, 1);
    }

    #[test]
    fn solution_value_lookup() {
        let solution = Solution::optimal(4.0, vec![1.0, 3.0]);
        assert_eq!(solution.value(VariableId::new(0, 1)), Some(3.0));
        assert_eq!(solution.value(VariableId::new(0, 2)), None);
        assert!(solution.is_optimal());
    }
}
