// Application layer: use cases that tie formulations to a solver

pub mod planner;

pub use planner::{Plan, PlanningService};
