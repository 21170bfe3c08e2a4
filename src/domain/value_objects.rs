// Value objects shared by every model the formulation layer builds

use std::fmt;

/// Domain of a decision variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum VariableType {
    /// Real value within the variable bounds
    Continuous,
    /// Whole number within the variable bounds
    Integer,
    /// 0 or 1
    Binary,
}

impl VariableType {
    pub fn is_integral(self) -> bool {
        matches!(self, VariableType::Integer | VariableType::Binary)
    }
}

/// Relation between the two sides of a linear constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConstraintType {
    /// lhs ≤ rhs
    LessThanOrEqual,
    /// lhs = rhs
    Equal,
    /// lhs ≥ rhs
    GreaterThanOrEqual,
}

impl fmt::Display for ConstraintType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintType::LessThanOrEqual => write!(f, "<="),
            ConstraintType::Equal => write!(f, "="),
            ConstraintType::GreaterThanOrEqual => write!(f, ">="),
        }
    }
}

/// Direction of optimization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OptimizationType {
    Minimize,
    Maximize,
}

/// Terminal status reported by a solver backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SolutionStatus {
    /// Proven optimal solution
    Optimal,
    /// Feasible solution without an optimality proof
    Feasible,
    /// No assignment satisfies every constraint
    Infeasible,
    /// Objective can be improved without limit
    Unbounded,
    /// Presolve found the model unbounded or infeasible without telling which
    UnboundedOrInfeasible,
    /// Time limit reached
    TimeLimit,
    /// Iteration limit reached
    IterationLimit,
    /// Node limit reached (MIP)
    NodeLimit,
    /// Backend reported an error
    Error,
    /// Solve interrupted
    Interrupted,
}

impl SolutionStatus {
    pub fn is_optimal(self) -> bool {
        matches!(self, SolutionStatus::Optimal)
    }

    pub fn is_infeasible(self) -> bool {
        matches!(self, SolutionStatus::Infeasible)
    }
}

impl fmt::Display for SolutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolutionStatus::Optimal => write!(f, "Optimal"),
            SolutionStatus::Feasible => write!(f, "Feasible"),
            SolutionStatus::Infeasible => write!(f, "Infeasible"),
            SolutionStatus::Unbounded => write!(f, "Unbounded"),
            SolutionStatus::UnboundedOrInfeasible => write!(f, "Unbounded or Infeasible"),
            SolutionStatus::TimeLimit => write!(f, "Time Limit Reached"),
            SolutionStatus::IterationLimit => write!(f, "Iteration Limit Reached"),
            SolutionStatus::NodeLimit => write!(f, "Node Limit Reached"),
            SolutionStatus::Error => write!(f, "Error"),
            SolutionStatus::Interrupted => write!(f, "Interrupted"),
        }
    }
}

/// Solver backend to hand models to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum SolverBackend {
    /// Let the factory decide
    #[default]
    Auto,
    /// COIN-OR CBC through good_lp
    CoinCbc,
    /// HiGHS
    Highs,
}

impl fmt::Display for SolverBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverBackend::Auto => write!(f, "Auto"),
            SolverBackend::CoinCbc => write!(f, "COIN-OR CBC"),
            SolverBackend::Highs => write!(f, "HiGHS"),
        }
    }
}
