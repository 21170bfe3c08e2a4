// Budget and multi-resource allocation
//
// One continuous "units" variable per project, maximizing priority-weighted
// return under per-resource capacities and per-project unit bounds.

use std::fmt;

use tracing::debug;

use super::decode::{read_value, round_to};
use super::{Formulated, Formulation};
use crate::domain::{
    Constraint, LinearExpression, ObjectiveFunction, OptimizationProblem, Result, Solution,
    SolverError, Variable, VariableId,
};

/// Project priority rank, 1 being the most important.
///
/// Ranks map onto objective weights `1 → 1.0`, `2 → 0.8`, `≥3 → 0.5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u32", into = "u32"))]
pub enum Priority {
    First,
    Second,
    Lower,
}

impl Priority {
    pub fn weight(self) -> f64 {
        match self {
            Priority::First => 1.0,
            Priority::Second => 0.8,
            Priority::Lower => 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidRank(pub u32);

impl fmt::Display for InvalidRank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "priority rank must be at least 1, got {}", self.0)
    }
}

impl std::error::Error for InvalidRank {}

impl TryFrom<u32> for Priority {
    type Error = InvalidRank;

    fn try_from(rank: u32) -> std::result::Result<Self, Self::Error> {
        match rank {
            0 => Err(InvalidRank(rank)),
            1 => Ok(Priority::First),
            2 => Ok(Priority::Second),
            _ => Ok(Priority::Lower),
        }
    }
}

impl From<Priority> for u32 {
    fn from(priority: Priority) -> u32 {
        match priority {
            Priority::First => 1,
            Priority::Second => 2,
            Priority::Lower => 3,
        }
    }
}

/// A limited resource shared by all projects
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Resource {
    pub name: String,
    pub capacity: f64,
}

impl Resource {
    pub fn new(name: impl Into<String>, capacity: f64) -> Self {
        Self {
            name: name.into(),
            capacity,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Project {
    pub name: String,
    pub unit_return: f64,
    pub min_units: f64,
    pub max_units: f64,
    /// Amount of each resource one unit consumes, in resource order.
    pub consumption: Vec<f64>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub priority: Option<Priority>,
}

impl Project {
    pub fn new(name: impl Into<String>, unit_return: f64, min_units: f64, max_units: f64) -> Self {
        Self {
            name: name.into(),
            unit_return,
            min_units,
            max_units,
            consumption: Vec::new(),
            priority: None,
        }
    }

    pub fn with_consumption(mut self, consumption: Vec<f64>) -> Self {
        self.consumption = consumption;
        self
    }

    /// Single-budget shorthand: each unit costs `cost`.
    pub fn with_unit_cost(self, cost: f64) -> Self {
        self.with_consumption(vec![cost])
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn weight(&self) -> f64 {
        self.priority.map_or(1.0, Priority::weight)
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AllocationProblem {
    pub resources: Vec<Resource>,
    pub projects: Vec<Project>,
}

impl AllocationProblem {
    pub fn new(resources: Vec<Resource>, projects: Vec<Project>) -> Self {
        Self {
            resources,
            projects,
        }
    }

    /// Single scalar budget; projects give their cost through `with_unit_cost`.
    pub fn with_budget(total: f64, projects: Vec<Project>) -> Self {
        Self::new(vec![Resource::new("budget", total)], projects)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AllocationLayout {
    pub units: Vec<VariableId>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ProjectAllocation {
    pub project: String,
    pub units: f64,
    /// `units` rounded to two decimals
    pub display_units: f64,
    /// Resource consumed by this project, in resource order
    pub consumption: Vec<f64>,
    pub weighted_return: f64,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ResourceUsage {
    pub resource: String,
    pub used: f64,
    pub capacity: f64,
}

impl ResourceUsage {
    pub fn remaining(&self) -> f64 {
        self.capacity - self.used
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct AllocationPlan {
    pub allocations: Vec<ProjectAllocation>,
    pub usage: Vec<ResourceUsage>,
    pub total_return: f64,
}

impl Formulation for AllocationProblem {
    type Layout = AllocationLayout;
    type Output = AllocationPlan;

    fn validate(&self) -> Result<()> {
        if self.projects.is_empty() {
            return Err(SolverError::InvalidInput(
                "allocation needs at least one project".into(),
            ));
        }
        if self.resources.is_empty() {
            return Err(SolverError::InvalidInput(
                "allocation needs at least one resource".into(),
            ));
        }
        if let Some(res) = self.resources.iter().find(|r| !r.capacity.is_finite()) {
            return Err(SolverError::InvalidInput(format!(
                "resource '{}' has a non-finite capacity",
                res.name
            )));
        }
        for project in &self.projects {
            if project.consumption.len() != self.resources.len() {
                return Err(SolverError::InvalidInput(format!(
                    "project '{}' lists {} consumption values for {} resources",
                    project.name,
                    project.consumption.len(),
                    self.resources.len()
                )));
            }
            let numbers = [project.unit_return, project.min_units, project.max_units];
            if numbers
                .iter()
                .chain(&project.consumption)
                .any(|v| !v.is_finite())
            {
                return Err(SolverError::InvalidInput(format!(
                    "project '{}' has a non-finite value",
                    project.name
                )));
            }
        }
        // Contradictory bounds make the model infeasible; report it as such.
        if let Some(project) = self.projects.iter().find(|p| p.min_units > p.max_units) {
            return Err(SolverError::Infeasible(format!(
                "project '{}' requires at least {} units but allows at most {}",
                project.name, project.min_units, project.max_units
            )));
        }
        Ok(())
    }

    fn build(&self) -> Result<Formulated<AllocationLayout>> {
        self.validate()?;

        let mut problem = OptimizationProblem::new("resource_allocation").with_description(
            format!(
                "{} projects competing for {} resources",
                self.projects.len(),
                self.resources.len()
            ),
        );

        let units: Vec<VariableId> = (0..self.projects.len())
            .map(|i| problem.add_variable(Variable::continuous(format!("units_{i}"))))
            .collect();

        let total_return: LinearExpression = self
            .projects
            .iter()
            .zip(&units)
            .map(|(p, &x)| (x, p.unit_return * p.weight()))
            .collect();
        problem.set_objective(ObjectiveFunction::maximize(total_return))?;

        for (j, resource) in self.resources.iter().enumerate() {
            let consumed: LinearExpression = self
                .projects
                .iter()
                .zip(&units)
                .map(|(p, &x)| (x, p.consumption[j]))
                .collect();
            problem.add_constraint(
                Constraint::leq(consumed, resource.capacity)
                    .with_name(format!("capacity_{}", resource.name)),
            )?;
        }

        for (i, (project, &x)) in self.projects.iter().zip(&units).enumerate() {
            problem.add_constraint(
                Constraint::geq(x, project.min_units).with_name(format!("min_units_{i}")),
            )?;
            problem.add_constraint(
                Constraint::leq(x, project.max_units).with_name(format!("max_units_{i}")),
            )?;
        }

        debug!(
            variables = problem.num_variables(),
            constraints = problem.num_constraints(),
            "built allocation model"
        );

        Ok(Formulated {
            problem,
            layout: AllocationLayout { units },
        })
    }

    fn decode(&self, layout: &AllocationLayout, solution: &Solution) -> Result<AllocationPlan> {
        let mut allocations = Vec::with_capacity(self.projects.len());
        let mut used = vec![0.0; self.resources.len()];

        for (project, &var) in self.projects.iter().zip(&layout.units) {
            let units = read_value(solution, var)?;
            let consumption: Vec<f64> = project.consumption.iter().map(|need| need * units).collect();
            for (total, amount) in used.iter_mut().zip(&consumption) {
                *total += amount;
            }
            allocations.push(ProjectAllocation {
                project: project.name.clone(),
                units,
                display_units: round_to(units, 2),
                consumption,
                weighted_return: project.unit_return * project.weight() * units,
            });
        }

        let usage = self
            .resources
            .iter()
            .zip(used)
            .map(|(resource, used)| ResourceUsage {
                resource: resource.name.clone(),
                used,
                capacity: resource.capacity,
            })
            .collect();
        let total_return = allocations.iter().map(|a| a.weighted_return).sum();

        Ok(AllocationPlan {
            allocations,
            usage,
            total_return,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ConstraintType, OptimizationType};
    use crate::formulation::testing::{assert_feasible, solved};
    use proptest::prelude::*;

    fn two_projects() -> AllocationProblem {
        AllocationProblem::new(
            vec![Resource::new("steel", 100.0)],
            vec![
                Project::new("a", 10.0, 0.0, 10.0).with_consumption(vec![2.0]),
                Project::new("b", 8.0, 0.0, 10.0).with_consumption(vec![1.0]),
            ],
        )
    }

    #[test]
    fn priority_ranks_map_to_weights() {
        assert_eq!(Priority::try_from(1).unwrap().weight(), 1.0);
        assert_eq!(Priority::try_from(2).unwrap().weight(), 0.8);
        assert_eq!(Priority::try_from(3).unwrap().weight(), 0.5);
        assert_eq!(Priority::try_from(10).unwrap(), Priority::Lower);
        assert_eq!(Priority::try_from(0), Err(InvalidRank(0)));
        assert_eq!(u32::from(Priority::Second), 2);
    }

    #[test]
    fn model_structure() {
        let built = two_projects().build().unwrap();
        let problem = &built.problem;

        assert_eq!(problem.num_variables(), 2);
        // one capacity row, then min/max per project
        assert_eq!(problem.num_constraints(), 5);
        assert_eq!(problem.objective().optimization_type, OptimizationType::Maximize);
        assert_eq!(problem.objective_coefficients(), vec![10.0, 8.0]);

        let capacity = &problem.constraints()[0];
        assert_eq!(capacity.name, "capacity_steel");
        assert_eq!(capacity.constraint_type, ConstraintType::LessThanOrEqual);
        assert_eq!(capacity.bound, 100.0);
        assert_eq!(capacity.terms, vec![(built.layout.units[0], 2.0), (built.layout.units[1], 1.0)]);
    }

    #[test]
    fn priority_scales_objective() {
        let problem = AllocationProblem::with_budget(
            50.0,
            vec![
                Project::new("a", 10.0, 0.0, 5.0)
                    .with_unit_cost(1.0)
                    .with_priority(Priority::Second),
                Project::new("b", 10.0, 0.0, 5.0)
                    .with_unit_cost(1.0)
                    .with_priority(Priority::Lower),
                Project::new("c", 10.0, 0.0, 5.0).with_unit_cost(1.0),
            ],
        );
        let built = problem.build().unwrap();
        assert_eq!(built.problem.objective_coefficients(), vec![8.0, 5.0, 10.0]);
        assert_eq!(built.problem.constraints()[0].name, "capacity_budget");
    }

    #[test]
    fn decode_reports_units_and_consumption() {
        let input = two_projects();
        let built = input.build().unwrap();
        let values = vec![10.0, 10.0];
        assert_feasible(&built.problem, &values);

        let plan = input
            .decode(&built.layout, &solved(&built.problem, values))
            .unwrap();

        assert_eq!(plan.allocations[0].units, 10.0);
        assert_eq!(plan.allocations[0].consumption, vec![20.0]);
        assert_eq!(plan.allocations[1].consumption, vec![10.0]);
        assert_eq!(plan.usage[0].used, 30.0);
        assert_eq!(plan.usage[0].remaining(), 70.0);
        assert_eq!(plan.total_return, 180.0);
    }

    #[test]
    fn display_units_are_rounded() {
        let input = two_projects();
        let built = input.build().unwrap();
        let plan = input
            .decode(&built.layout, &solved(&built.problem, vec![3.14159, 0.0]))
            .unwrap();
        assert_eq!(plan.allocations[0].display_units, 3.14);
        assert_eq!(plan.allocations[0].units, 3.14159);
    }

    #[test]
    fn contradictory_bounds_are_infeasible() {
        let mut input = two_projects();
        input.projects[1].min_units = 12.0;
        assert!(matches!(input.build(), Err(SolverError::Infeasible(_))));
    }

    #[test]
    fn structural_errors_are_invalid_input() {
        let empty = AllocationProblem::new(vec![Resource::new("r", 1.0)], vec![]);
        assert!(matches!(empty.build(), Err(SolverError::InvalidInput(_))));

        let no_resources =
            AllocationProblem::new(vec![], vec![Project::new("a", 1.0, 0.0, 1.0)]);
        assert!(matches!(no_resources.build(), Err(SolverError::InvalidInput(_))));

        let mut mismatch = two_projects();
        mismatch.projects[0].consumption.push(4.0);
        let err = mismatch.build().unwrap_err();
        assert!(err.to_string().contains("2 consumption values for 1 resources"));
    }

    #[test]
    fn truncated_solution_is_inconsistent() {
        let input = two_projects();
        let built = input.build().unwrap();
        let result = input.decode(&built.layout, &Solution::optimal(0.0, vec![1.0]));
        assert!(matches!(result, Err(SolverError::InconsistentSolution(_))));
    }

    fn instance() -> impl Strategy<Value = AllocationProblem> {
        (1usize..4, 1usize..6).prop_flat_map(|(m, n)| {
            let resources = prop::collection::vec(1.0f64..100.0, m);
            let projects = prop::collection::vec(
                (
                    0.0f64..20.0,
                    0.0f64..5.0,
                    0.0f64..10.0,
                    prop::collection::vec(0.0f64..5.0, m),
                    prop::option::of(1u32..5),
                ),
                n,
            );
            (resources, projects).prop_map(|(resources, projects)| {
                AllocationProblem::new(
                    resources
                        .into_iter()
                        .enumerate()
                        .map(|(j, c)| Resource::new(format!("r{j}"), c))
                        .collect(),
                    projects
                        .into_iter()
                        .enumerate()
                        .map(|(i, (ret, min, extra, needs, rank))| {
                            let mut p = Project::new(format!("p{i}"), ret, min, min + extra)
                                .with_consumption(needs);
                            p.priority = rank.map(|r| Priority::try_from(r).unwrap());
                            p
                        })
                        .collect(),
                )
            })
        })
    }

    proptest! {
        #[test]
        fn building_twice_yields_identical_models(input in instance()) {
            let first = input.build().unwrap();
            let second = input.build().unwrap();
            prop_assert_eq!(first.problem.num_variables(), input.projects.len());
            prop_assert_eq!(
                first.problem.num_constraints(),
                input.resources.len() + 2 * input.projects.len()
            );
            prop_assert_eq!(first, second);
        }

        #[test]
        fn feasible_values_decode_within_bounds_and_capacity(
            input in instance(),
            fractions in prop::collection::vec(0.0f64..=1.0, 6),
        ) {
            let built = input.build().unwrap();
            let values: Vec<f64> = input
                .projects
                .iter()
                .zip(&fractions)
                .map(|(p, f)| (p.min_units + f * (p.max_units - p.min_units)).min(p.max_units))
                .collect();
            let feasible = built.problem.max_constraint_violation(&values) <= 1e-9;
            let plan = input.decode(&built.layout, &solved(&built.problem, values)).unwrap();

            let within = plan
                .allocations
                .iter()
                .zip(&input.projects)
                .all(|(a, p)| p.min_units <= a.units && a.units <= p.max_units);
            prop_assert!(within);
            let fits = plan.usage.iter().all(|u| u.used <= u.capacity + 1e-9);
            prop_assert_eq!(feasible, fits);
        }
    }
}
