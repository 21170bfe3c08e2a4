use crate::domain::{OptimizationProblem, Solution};

pub(crate) fn assert_feasible(problem: &OptimizationProblem, values: &[f64]) {
    let violation = problem.max_constraint_violation(values);
    assert!(
        violation <= 1e-9,
        "values violate '{}' by {violation}",
        problem.name
    );
}

/// Optimal solution carrying `values`, objective evaluated from the model.
pub(crate) fn solved(problem: &OptimizationProblem, values: Vec<f64>) -> Solution {
    Solution::optimal(problem.objective().value(&values), values)
}
