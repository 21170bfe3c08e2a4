// Domain layer: generic LP/MIP model and the solver contract
pub mod domain;

// Formulation layer: problem families built on top of the domain model
pub mod formulation;

// Application layer: build → solve → decode orchestration
pub mod application;

// Infrastructure layer: process sampling and logging setup
pub mod infrastructure;

// Solver adapters: Concrete implementations of SolverService
#[cfg(feature = "solvers")]
pub mod solver;

// Re-export commonly used types
pub use domain::{
    Constraint, ConstraintType, LinearExpression, ObjectiveFunction, OptimizationProblem,
    OptimizationType, Result, Solution, SolutionStatus, SolverBackend, SolverConfig, SolverError,
    SolverService, Variable, VariableId, VariableType,
};

pub use formulation::{Formulated, Formulation};

pub use application::{Plan, PlanningService};

pub use infrastructure::{init_logging, ResourceSampler, SampledRun};

#[cfg(feature = "solvers")]
pub use solver::{CoinCbcSolver, HighsSolver, SolverFactory};
