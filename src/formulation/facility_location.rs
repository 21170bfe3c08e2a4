// Uncapacitated facility location with fractional sourcing

use tracing::debug;

use super::decode::{is_active, is_one, read_value, round_to};
use super::geometry::{distance_matrix, Point};
use super::{Formulated, Formulation};
use crate::domain::{
    Constraint, LinearExpression, ObjectiveFunction, OptimizationProblem, Result, Solution,
    SolverError, Variable, VariableId,
};

/// Candidate site with a one-off opening cost
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Facility {
    pub location: Point,
    pub setup_cost: f64,
}

impl Facility {
    pub fn new(location: impl Into<Point>, setup_cost: f64) -> Self {
        Self {
            location: location.into(),
            setup_cost,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FacilityLocationProblem {
    pub customers: Vec<Point>,
    pub facilities: Vec<Facility>,
    /// Transport cost per unit of distance
    pub cost_per_distance: f64,
}

impl FacilityLocationProblem {
    pub fn new(customers: Vec<Point>, facilities: Vec<Facility>, cost_per_distance: f64) -> Self {
        Self {
            customers,
            facilities,
            cost_per_distance,
        }
    }

    /// `cost[c][f]`: cost of serving all of customer `c` from facility `f`.
    pub fn shipping_costs(&self) -> Vec<Vec<f64>> {
        let sites: Vec<Point> = self.facilities.iter().map(|f| f.location).collect();
        distance_matrix(&self.customers, &sites)
            .into_iter()
            .map(|row| row.into_iter().map(|d| d * self.cost_per_distance).collect())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FacilityLayout {
    pub open: Vec<VariableId>,
    /// `serve[c][f]`: fraction of customer `c` served by facility `f`
    pub serve: Vec<Vec<VariableId>>,
    pub shipping_cost: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Shipment {
    pub customer: usize,
    pub facility: usize,
    pub fraction: f64,
    /// Share of the customer's demand, in percent, two decimals
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FacilityPlan {
    /// Indices of the facilities to open, ascending
    pub selected: Vec<usize>,
    /// Active (customer, facility) flows only
    pub shipments: Vec<Shipment>,
    pub setup_cost: f64,
    pub shipping_cost: f64,
}

impl FacilityPlan {
    pub fn total_cost(&self) -> f64 {
        self.setup_cost + self.shipping_cost
    }

    pub fn served_fraction(&self, customer: usize) -> f64 {
        self.shipments
            .iter()
            .filter(|s| s.customer == customer)
            .map(|s| s.fraction)
            .sum()
    }
}

impl Formulation for FacilityLocationProblem {
    type Layout = FacilityLayout;
    type Output = FacilityPlan;

    fn validate(&self) -> Result<()> {
        if self.customers.is_empty() {
            return Err(SolverError::InvalidInput(
                "facility location needs at least one customer".into(),
            ));
        }
        if self.facilities.is_empty() {
            return Err(SolverError::InvalidInput(
                "facility location needs at least one candidate facility".into(),
            ));
        }
        if let Some(c) = self.customers.iter().position(|p| !p.is_finite()) {
            return Err(SolverError::InvalidInput(format!(
                "customer {c} has a non-finite coordinate"
            )));
        }
        for (f, facility) in self.facilities.iter().enumerate() {
            if !facility.location.is_finite() {
                return Err(SolverError::InvalidInput(format!(
                    "facility {f} has a non-finite coordinate"
                )));
            }
            if !facility.setup_cost.is_finite() || facility.setup_cost < 0.0 {
                return Err(SolverError::InvalidInput(format!(
                    "facility {f} has an invalid setup cost {}",
                    facility.setup_cost
                )));
            }
        }
        if !self.cost_per_distance.is_finite() || self.cost_per_distance < 0.0 {
            return Err(SolverError::InvalidInput(format!(
                "cost per distance must be a non-negative number, got {}",
                self.cost_per_distance
            )));
        }
        Ok(())
    }

    fn build(&self) -> Result<Formulated<FacilityLayout>> {
        self.validate()?;
        let shipping_cost = self.shipping_costs();

        let mut problem = OptimizationProblem::new("facility_location").with_description(format!(
            "{} customers, {} candidate facilities",
            self.customers.len(),
            self.facilities.len()
        ));

        let open: Vec<VariableId> = (0..self.facilities.len())
            .map(|f| problem.add_variable(Variable::binary(format!("open_{f}"))))
            .collect();
        let serve: Vec<Vec<VariableId>> = (0..self.customers.len())
            .map(|c| {
                (0..self.facilities.len())
                    .map(|f| problem.add_variable(Variable::fraction(format!("serve_{c}_{f}"))))
                    .collect()
            })
            .collect();

        let mut total_cost: LinearExpression = self
            .facilities
            .iter()
            .zip(&open)
            .map(|(facility, &y)| (y, facility.setup_cost))
            .collect();
        for (row, costs) in serve.iter().zip(&shipping_cost) {
            for (&x, &cost) in row.iter().zip(costs) {
                total_cost.add_term(x, cost);
            }
        }
        problem.set_objective(ObjectiveFunction::minimize(total_cost))?;

        for (c, row) in serve.iter().enumerate() {
            for (f, &x) in row.iter().enumerate() {
                problem.add_constraint(
                    Constraint::leq(x, open[f]).with_name(format!("ship_if_open_{c}_{f}")),
                )?;
            }
        }
        for (c, row) in serve.iter().enumerate() {
            let served: LinearExpression = row.iter().map(|&x| (x, 1.0)).collect();
            problem.add_constraint(Constraint::eq(served, 1.0).with_name(format!("demand_{c}")))?;
        }

        debug!(
            variables = problem.num_variables(),
            constraints = problem.num_constraints(),
            "built facility location model"
        );

        Ok(Formulated {
            problem,
            layout: FacilityLayout {
                open,
                serve,
                shipping_cost,
            },
        })
    }

    fn decode(&self, layout: &FacilityLayout, solution: &Solution) -> Result<FacilityPlan> {
        let mut selected = Vec::new();
        let mut setup_cost = 0.0;
        for (f, &y) in layout.open.iter().enumerate() {
            if is_one(read_value(solution, y)?) {
                selected.push(f);
                setup_cost += self.facilities[f].setup_cost;
            }
        }

        let mut shipments = Vec::new();
        let mut shipping_cost = 0.0;
        for (c, row) in layout.serve.iter().enumerate() {
            for (f, &x) in row.iter().enumerate() {
                let fraction = read_value(solution, x)?;
                if is_active(fraction) {
                    shipping_cost += layout.shipping_cost[c][f] * fraction;
                    shipments.push(Shipment {
                        customer: c,
                        facility: f,
                        fraction,
                        percent: round_to(100.0 * fraction, 2),
                    });
                }
            }
        }

        Ok(FacilityPlan {
            selected,
            shipments,
            setup_cost,
            shipping_cost,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OptimizationType;
    use crate::formulation::decode::EPSILON;
    use crate::formulation::testing::{assert_feasible, solved};
    use proptest::prelude::*;

    fn small() -> FacilityLocationProblem {
        FacilityLocationProblem::new(
            vec![Point::new(0.0, 1.5), Point::new(2.5, 1.2)],
            vec![
                Facility::new((0.0, 0.0), 3.0),
                Facility::new((3.0, 0.0), 2.0),
                Facility::new((0.0, 4.0), 5.0),
            ],
            2.0,
        )
    }

    /// Every customer goes entirely to its cheapest facility.
    fn nearest_assignment(input: &FacilityLocationProblem, layout: &FacilityLayout) -> Vec<f64> {
        let n = layout.open.len() + layout.serve.len() * layout.open.len();
        let mut values = vec![0.0; n];
        for (c, costs) in layout.shipping_cost.iter().enumerate() {
            let best = costs
                .iter()
                .enumerate()
                .min_by(|a, b| a.1.total_cmp(b.1))
                .map(|(f, _)| f)
                .unwrap();
            values[layout.serve[c][best].index()] = 1.0;
            values[layout.open[best].index()] = 1.0;
        }
        assert_eq!(input.customers.len(), layout.serve.len());
        values
    }

    #[test]
    fn shipping_cost_is_rate_times_distance() {
        let costs = small().shipping_costs();
        assert_eq!(costs[0][0], 3.0);
        assert!((costs[1][1] - 2.0 * 0.5f64.hypot(1.2)).abs() < 1e-12);
    }

    #[test]
    fn model_structure() {
        let input = small();
        let built = input.build().unwrap();
        let problem = &built.problem;

        assert_eq!(problem.num_variables(), 3 + 2 * 3);
        assert_eq!(problem.num_constraints(), 2 * 3 + 2);
        assert_eq!(problem.num_binary_variables(), 3);
        assert_eq!(problem.objective().optimization_type, OptimizationType::Minimize);

        let coefficients = problem.objective_coefficients();
        assert_eq!(&coefficients[..3], &[3.0, 2.0, 5.0]);
        assert_eq!(coefficients[built.layout.serve[0][0].index()], 3.0);

        let serve = problem.variable(built.layout.serve[1][2]).unwrap();
        assert_eq!(serve.name, "serve_1_2");
        assert_eq!(serve.upper_bound, Some(1.0));
    }

    #[test]
    fn decode_filters_noise() {
        let input = small();
        let built = input.build().unwrap();
        let layout = &built.layout;
        let mut values = nearest_assignment(&input, layout);
        values[layout.open[2].index()] = 1e-8;
        values[layout.serve[0][2].index()] = 1e-8;

        let plan = input.decode(layout, &solved(&built.problem, values)).unwrap();
        assert_eq!(plan.selected, vec![0, 1]);
        assert_eq!(plan.shipments.len(), 2);
        assert_eq!(plan.setup_cost, 5.0);
        assert_eq!(plan.shipments[0].percent, 100.0);
    }

    #[test]
    fn sites_count_as_open_only_next_to_one() {
        let input = small();
        let built = input.build().unwrap();
        let layout = &built.layout;
        let mut values = nearest_assignment(&input, layout);
        values[layout.open[0].index()] = 1.0 - EPSILON / 2.0;
        values[layout.open[2].index()] = 0.9;

        let plan = input.decode(layout, &solved(&built.problem, values)).unwrap();
        assert_eq!(plan.selected, vec![0, 1]);
        assert_eq!(plan.setup_cost, 5.0);
    }

    #[test]
    fn split_demand_is_reported_as_percentages() {
        let input = small();
        let built = input.build().unwrap();
        let layout = &built.layout;
        let mut values = nearest_assignment(&input, layout);
        values[layout.open[0].index()] = 1.0;
        values[layout.open[1].index()] = 1.0;
        values[layout.serve[1][1].index()] = 2.0 / 3.0;
        values[layout.serve[1][0].index()] = 1.0 / 3.0;
        assert_feasible(&built.problem, &values);

        let plan = input.decode(layout, &solved(&built.problem, values)).unwrap();
        let customer_one: Vec<f64> = plan
            .shipments
            .iter()
            .filter(|s| s.customer == 1)
            .map(|s| s.percent)
            .collect();
        assert_eq!(customer_one, vec![33.33, 66.67]);
        assert!((plan.served_fraction(1) - 1.0).abs() < EPSILON);
    }

    #[test]
    fn rejects_empty_and_negative_input() {
        let mut input = small();
        input.customers.clear();
        assert!(matches!(input.build(), Err(SolverError::InvalidInput(_))));

        let mut input = small();
        input.facilities.clear();
        assert!(matches!(input.build(), Err(SolverError::InvalidInput(_))));

        let mut input = small();
        input.cost_per_distance = -1.0;
        assert!(matches!(input.build(), Err(SolverError::InvalidInput(_))));

        let mut input = small();
        input.facilities[1].setup_cost = f64::NAN;
        assert!(matches!(input.build(), Err(SolverError::InvalidInput(_))));
    }

    fn point() -> impl Strategy<Value = Point> {
        (-100.0f64..100.0, -100.0f64..100.0).prop_map(|(x, y)| Point::new(x, y))
    }

    fn instance() -> impl Strategy<Value = FacilityLocationProblem> {
        (
            prop::collection::vec(point(), 1..6),
            prop::collection::vec((point(), 0.0f64..20.0), 1..5),
            0.0f64..5.0,
        )
            .prop_map(|(customers, sites, rate)| {
                FacilityLocationProblem::new(
                    customers,
                    sites.into_iter().map(|(p, cost)| Facility::new(p, cost)).collect(),
                    rate,
                )
            })
    }

    proptest! {
        #[test]
        fn decoded_flows_cover_each_customer_from_open_sites(input in instance()) {
            let built = input.build().unwrap();
            prop_assert_eq!(&built, &input.build().unwrap());

            let values = nearest_assignment(&input, &built.layout);
            assert_feasible(&built.problem, &values);
            let plan = input.decode(&built.layout, &solved(&built.problem, values)).unwrap();

            for c in 0..input.customers.len() {
                prop_assert!((plan.served_fraction(c) - 1.0).abs() <= EPSILON);
            }
            for shipment in &plan.shipments {
                prop_assert!(plan.selected.contains(&shipment.facility));
            }
            prop_assert!(
                (plan.total_cost() - built.problem.objective().value(
                    &nearest_assignment(&input, &built.layout)
                )).abs() < 1e-6
            );
        }
    }
}
