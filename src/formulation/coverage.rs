// Coverage siting: open as few facilities as possible so that every
// customer is assigned to exactly one open facility.
//
// Customer radii are informational unless `enforce_radius` is set. With
// the default the model is a pure cardinality-minimizing assignment and a
// customer may end up assigned to a facility outside its radius; each
// decoded pair says whether it lies inside the radius.

use tracing::{debug, warn};

use super::decode::{is_selected, read_value};
use super::geometry::Point;
use super::{Formulated, Formulation};
use crate::domain::{
    Constraint, LinearExpression, ObjectiveFunction, OptimizationProblem, Result, Solution,
    SolverError, Variable, VariableId,
};

/// Zone to be covered: its centre and how far a facility may be
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CoverageCustomer {
    pub location: Point,
    pub radius: f64,
}

impl CoverageCustomer {
    pub fn new(location: impl Into<Point>, radius: f64) -> Self {
        Self {
            location: location.into(),
            radius,
        }
    }

    pub fn reaches(&self, facility: &Point) -> bool {
        self.location.distance_to(facility) <= self.radius
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CoverageProblem {
    pub customers: Vec<CoverageCustomer>,
    pub facilities: Vec<Point>,
    /// Forbid assignments to facilities outside the customer's radius
    #[cfg_attr(feature = "serde", serde(default))]
    pub enforce_radius: bool,
}

impl CoverageProblem {
    pub fn new(customers: Vec<CoverageCustomer>, facilities: Vec<Point>) -> Self {
        Self {
            customers,
            facilities,
            enforce_radius: false,
        }
    }

    pub fn with_enforced_radius(mut self) -> Self {
        self.enforce_radius = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoverageLayout {
    pub open: Vec<VariableId>,
    /// `cover[c][f]`: customer `c` is assigned to facility `f`
    pub cover: Vec<Vec<VariableId>>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CoveragePair {
    pub customer: usize,
    pub facility: usize,
    pub distance: f64,
    pub within_radius: bool,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CoveragePlan {
    pub selected: Vec<usize>,
    pub assignments: Vec<CoveragePair>,
}

impl CoveragePlan {
    pub fn facilities_for(&self, customer: usize) -> impl Iterator<Item = usize> + '_ {
        self.assignments
            .iter()
            .filter(move |p| p.customer == customer)
            .map(|p| p.facility)
    }

    /// Assignments the radius test would reject.
    pub fn out_of_radius(&self) -> impl Iterator<Item = &CoveragePair> {
        self.assignments.iter().filter(|p| !p.within_radius)
    }
}

impl Formulation for CoverageProblem {
    type Layout = CoverageLayout;
    type Output = CoveragePlan;

    fn validate(&self) -> Result<()> {
        if self.customers.is_empty() {
            return Err(SolverError::InvalidInput(
                "coverage needs at least one customer zone".into(),
            ));
        }
        if self.facilities.is_empty() {
            return Err(SolverError::InvalidInput(
                "coverage needs at least one candidate facility".into(),
            ));
        }
        for (c, customer) in self.customers.iter().enumerate() {
            if !customer.location.is_finite() {
                return Err(SolverError::InvalidInput(format!(
                    "customer {c} has a non-finite coordinate"
                )));
            }
            if !customer.radius.is_finite() || customer.radius < 0.0 {
                return Err(SolverError::InvalidInput(format!(
                    "customer {c} has an invalid radius {}",
                    customer.radius
                )));
            }
        }
        if let Some(f) = self.facilities.iter().position(|p| !p.is_finite()) {
            return Err(SolverError::InvalidInput(format!(
                "facility {f} has a non-finite coordinate"
            )));
        }
        Ok(())
    }

    fn build(&self) -> Result<Formulated<CoverageLayout>> {
        self.validate()?;

        let mut problem = OptimizationProblem::new("coverage").with_description(format!(
            "{} zones, {} candidate facilities",
            self.customers.len(),
            self.facilities.len()
        ));

        let open: Vec<VariableId> = (0..self.facilities.len())
            .map(|f| problem.add_variable(Variable::binary(format!("open_{f}"))))
            .collect();
        let cover: Vec<Vec<VariableId>> = (0..self.customers.len())
            .map(|c| {
                (0..self.facilities.len())
                    .map(|f| problem.add_variable(Variable::binary(format!("cover_{c}_{f}"))))
                    .collect()
            })
            .collect();

        let opened: LinearExpression = open.iter().map(|&y| (y, 1.0)).collect();
        problem.set_objective(ObjectiveFunction::minimize(opened))?;

        for (c, row) in cover.iter().enumerate() {
            let assigned: LinearExpression = row.iter().map(|&x| (x, 1.0)).collect();
            problem.add_constraint(Constraint::eq(assigned, 1.0).with_name(format!("covered_{c}")))?;
        }
        for (c, row) in cover.iter().enumerate() {
            for (f, &x) in row.iter().enumerate() {
                problem.add_constraint(
                    Constraint::leq(x, open[f]).with_name(format!("cover_if_open_{c}_{f}")),
                )?;
            }
        }
        if self.enforce_radius {
            for (c, customer) in self.customers.iter().enumerate() {
                for (f, site) in self.facilities.iter().enumerate() {
                    if !customer.reaches(site) {
                        problem.add_constraint(
                            Constraint::eq(cover[c][f], 0.0)
                                .with_name(format!("out_of_radius_{c}_{f}")),
                        )?;
                    }
                }
            }
        }

        debug!(
            variables = problem.num_variables(),
            constraints = problem.num_constraints(),
            enforce_radius = self.enforce_radius,
            "built coverage model"
        );

        Ok(Formulated {
            problem,
            layout: CoverageLayout { open, cover },
        })
    }

    fn decode(&self, layout: &CoverageLayout, solution: &Solution) -> Result<CoveragePlan> {
        let mut selected = Vec::new();
        for (f, &y) in layout.open.iter().enumerate() {
            if is_selected(read_value(solution, y)?) {
                selected.push(f);
            }
        }

        let mut assignments = Vec::new();
        for (c, row) in layout.cover.iter().enumerate() {
            for &f in &selected {
                if is_selected(read_value(solution, row[f])?) {
                    let customer = &self.customers[c];
                    let site = &self.facilities[f];
                    assignments.push(CoveragePair {
                        customer: c,
                        facility: f,
                        distance: customer.location.distance_to(site),
                        within_radius: customer.reaches(site),
                    });
                }
            }
        }

        let plan = CoveragePlan {
            selected,
            assignments,
        };
        let outside = plan.out_of_radius().count();
        if outside > 0 {
            warn!(outside, "coverage assignments fall outside the customer radius");
        }
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ConstraintType;
    use crate::formulation::testing::{assert_feasible, solved};
    use proptest::prelude::*;

    fn zones() -> CoverageProblem {
        CoverageProblem::new(
            vec![
                CoverageCustomer::new((0.0, 0.0), 2.0),
                CoverageCustomer::new((1.0, 1.0), 2.0),
                CoverageCustomer::new((10.0, 10.0), 1.0),
            ],
            vec![Point::new(0.5, 0.5), Point::new(9.5, 10.0), Point::new(20.0, 20.0)],
        )
    }

    /// Assign every customer to facility `f` and open only that one.
    fn everyone_to(layout: &CoverageLayout, f: usize) -> Vec<f64> {
        let n = layout.open.len() * (1 + layout.cover.len());
        let mut values = vec![0.0; n];
        values[layout.open[f].index()] = 1.0;
        for row in &layout.cover {
            values[row[f].index()] = 1.0;
        }
        values
    }

    #[test]
    fn model_structure() {
        let built = zones().build().unwrap();
        let problem = &built.problem;

        assert_eq!(problem.num_variables(), 3 + 9);
        assert_eq!(problem.num_binary_variables(), 12);
        assert_eq!(problem.num_constraints(), 3 + 9);
        assert_eq!(
            problem.objective_coefficients(),
            [vec![1.0; 3], vec![0.0; 9]].concat()
        );
        assert_eq!(problem.constraints()[0].constraint_type, ConstraintType::Equal);
        assert_eq!(problem.constraints()[0].name, "covered_0");
    }

    #[test]
    fn radius_is_not_enforced_by_default() {
        let input = zones();
        let built = input.build().unwrap();
        // A single far-away facility satisfies every row of the default model.
        let values = everyone_to(&built.layout, 2);
        assert_feasible(&built.problem, &values);

        let plan = input.decode(&built.layout, &solved(&built.problem, values)).unwrap();
        assert_eq!(plan.selected, vec![2]);
        assert_eq!(plan.assignments.len(), 3);
        assert_eq!(plan.out_of_radius().count(), 3);
        assert_eq!(plan.facilities_for(1).collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn enforced_radius_fixes_distant_pairs_to_zero() {
        let input = zones().with_enforced_radius();
        let built = input.build().unwrap();

        // (0,0)/(1,1) reach facility 0 only, (10,10) reaches facility 1 only.
        assert_eq!(built.problem.num_constraints(), 3 + 9 + 6);
        let values = everyone_to(&built.layout, 2);
        assert!(built.problem.max_constraint_violation(&values) > 0.5);

        let mut values = vec![0.0; built.problem.num_variables()];
        let layout = &built.layout;
        for idx in [
            layout.open[0],
            layout.open[1],
            layout.cover[0][0],
            layout.cover[1][0],
            layout.cover[2][1],
        ] {
            values[idx.index()] = 1.0;
        }
        assert_feasible(&built.problem, &values);
        let plan = input.decode(layout, &solved(&built.problem, values)).unwrap();
        assert_eq!(plan.selected, vec![0, 1]);
        assert_eq!(plan.out_of_radius().count(), 0);
        assert!((plan.assignments[2].distance - 0.5).abs() < 1e-12);
    }

    #[test]
    fn cover_of_closed_facility_is_ignored() {
        let input = zones();
        let built = input.build().unwrap();
        let mut values = everyone_to(&built.layout, 0);
        // solver noise on a closed facility
        values[built.layout.cover[2][1].index()] = 0.4;

        let plan = input.decode(&built.layout, &solved(&built.problem, values)).unwrap();
        assert_eq!(plan.selected, vec![0]);
        assert!(plan.assignments.iter().all(|p| p.facility == 0));
    }

    #[test]
    fn rejects_bad_radius() {
        let mut input = zones();
        input.customers[0].radius = -1.0;
        assert!(matches!(input.build(), Err(SolverError::InvalidInput(_))));

        let input = CoverageProblem::new(vec![], vec![Point::default()]);
        assert!(matches!(input.build(), Err(SolverError::InvalidInput(_))));
    }

    proptest! {
        #[test]
        fn every_customer_lands_on_one_selected_facility(
            customers in prop::collection::vec((-50.0f64..50.0, -50.0f64..50.0, 0.0f64..30.0), 1..6),
            sites in prop::collection::vec((-50.0f64..50.0, -50.0f64..50.0), 1..5),
            pick in any::<prop::sample::Index>(),
        ) {
            let input = CoverageProblem::new(
                customers.into_iter().map(|(x, y, r)| CoverageCustomer::new((x, y), r)).collect(),
                sites.into_iter().map(Point::from).collect(),
            );
            let built = input.build().unwrap();
            prop_assert_eq!(&built, &input.build().unwrap());

            let f = pick.index(input.facilities.len());
            let values = everyone_to(&built.layout, f);
            assert_feasible(&built.problem, &values);
            let plan = input.decode(&built.layout, &solved(&built.problem, values)).unwrap();

            for c in 0..input.customers.len() {
                let assigned: Vec<usize> = plan.facilities_for(c).collect();
                prop_assert_eq!(assigned.len(), 1);
                prop_assert!(plan.selected.contains(&assigned[0]));
            }
        }
    }
}
